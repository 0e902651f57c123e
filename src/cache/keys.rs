//! Cache key definitions.
//!
//! Defines the request-side inputs (`RequestContext`, `Variants`) and the
//! `CanonicalKey` digest the artifact store uses as its lookup key.

use std::fmt;

use serde::{Deserialize, Serialize, Serializer};
use serde_json::Value;
use xxhash_rust::xxh3::xxh3_128;

use super::error::InputError;
use super::normalize::{NormalizedVariants, normalize_path, normalize_variants};

/// Stable identifier for one cacheable variant of one URL.
///
/// A 128-bit XXH3 digest of the normalized path and variant set. Keys are
/// only ever compared for equality; they carry no structure.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct CanonicalKey(u128);

impl CanonicalKey {
    pub const fn from_u128(value: u128) -> Self {
        Self(value)
    }

    pub const fn as_u128(&self) -> u128 {
        self.0
    }

    /// Lowercase hex rendering, 32 characters.
    pub fn to_hex(&self) -> String {
        hex::encode(self.0.to_be_bytes())
    }
}

impl fmt::Display for CanonicalKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_hex())
    }
}

impl Serialize for CanonicalKey {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.to_hex())
    }
}

/// A single cache-dimension value.
#[derive(Debug, Clone, PartialEq)]
pub enum VariantValue {
    Null,
    Bool(bool),
    Int(i64),
    Float(f64),
    Str(String),
    Map(Variants),
}

impl From<bool> for VariantValue {
    fn from(value: bool) -> Self {
        Self::Bool(value)
    }
}

impl From<i64> for VariantValue {
    fn from(value: i64) -> Self {
        Self::Int(value)
    }
}

impl From<i32> for VariantValue {
    fn from(value: i32) -> Self {
        Self::Int(value.into())
    }
}

impl From<f64> for VariantValue {
    fn from(value: f64) -> Self {
        Self::Float(value)
    }
}

impl From<&str> for VariantValue {
    fn from(value: &str) -> Self {
        Self::Str(value.to_string())
    }
}

impl From<String> for VariantValue {
    fn from(value: String) -> Self {
        Self::Str(value)
    }
}

impl From<Variants> for VariantValue {
    fn from(value: Variants) -> Self {
        Self::Map(value)
    }
}

/// Insertion-ordered mapping of cache dimensions (locale, device, currency, ...).
///
/// Order is preserved only for inspection; canonicalization sorts keys.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(try_from = "Value")]
pub struct Variants {
    entries: Vec<(String, VariantValue)>,
}

impl Variants {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert or replace a dimension, keeping the original position on replace.
    pub fn insert(&mut self, key: impl Into<String>, value: impl Into<VariantValue>) {
        let key = key.into();
        let value = value.into();
        match self.entries.iter_mut().find(|(existing, _)| *existing == key) {
            Some((_, slot)) => *slot = value,
            None => self.entries.push((key, value)),
        }
    }

    pub fn with(mut self, key: impl Into<String>, value: impl Into<VariantValue>) -> Self {
        self.insert(key, value);
        self
    }

    pub fn get(&self, key: &str) -> Option<&VariantValue> {
        self.entries
            .iter()
            .find(|(existing, _)| existing == key)
            .map(|(_, value)| value)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &VariantValue)> {
        self.entries.iter().map(|(key, value)| (key.as_str(), value))
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub(crate) fn from_json(field: &str, value: &Value) -> Result<Self, InputError> {
        let Value::Object(map) = value else {
            return Err(InputError::not_a_mapping(field, value));
        };

        let mut variants = Self::new();
        for (key, value) in map {
            let nested = format!("{field}.{key}");
            variants.insert(key.clone(), variant_value_from_json(&nested, value)?);
        }
        Ok(variants)
    }
}

impl<K, V> FromIterator<(K, V)> for Variants
where
    K: Into<String>,
    V: Into<VariantValue>,
{
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        let mut variants = Self::new();
        for (key, value) in iter {
            variants.insert(key, value);
        }
        variants
    }
}

impl TryFrom<Value> for Variants {
    type Error = InputError;

    fn try_from(value: Value) -> Result<Self, Self::Error> {
        Self::from_json("variants", &value)
    }
}

fn variant_value_from_json(field: &str, value: &Value) -> Result<VariantValue, InputError> {
    match value {
        Value::Null => Ok(VariantValue::Null),
        Value::Bool(flag) => Ok(VariantValue::Bool(*flag)),
        Value::Number(number) => {
            if let Some(int) = number.as_i64() {
                Ok(VariantValue::Int(int))
            } else if number.is_u64() {
                Err(InputError::unsupported(
                    field,
                    format!("integer {number} exceeds the signed 64-bit range"),
                ))
            } else {
                number
                    .as_f64()
                    .map(VariantValue::Float)
                    .ok_or_else(|| InputError::unsupported(field, "number is not representable"))
            }
        }
        Value::String(text) => Ok(VariantValue::Str(text.clone())),
        Value::Object(_) => Variants::from_json(field, value).map(VariantValue::Map),
        Value::Array(_) => Err(InputError::not_a_mapping(field, value)),
    }
}

/// A request as seen by the cache: path plus variant dimensions.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(try_from = "Value")]
pub struct RequestContext {
    pub path: String,
    pub variants: Variants,
}

impl RequestContext {
    pub fn new(path: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            variants: Variants::new(),
        }
    }

    pub fn with_variant(mut self, key: impl Into<String>, value: impl Into<VariantValue>) -> Self {
        self.variants.insert(key, value);
        self
    }

    pub fn with_variants(mut self, variants: Variants) -> Self {
        self.variants = variants;
        self
    }

    /// Build a context from `{ "path": ..., "variants": {...} }`.
    ///
    /// A missing path defaults to the empty string and missing variants to
    /// an empty set. Non-mapping inputs are rejected.
    pub fn from_json(value: &Value) -> Result<Self, InputError> {
        let Value::Object(map) = value else {
            return Err(InputError::not_a_mapping("request", value));
        };

        let path = match map.get("path") {
            None | Some(Value::Null) => String::new(),
            Some(Value::String(path)) => path.clone(),
            Some(other) => {
                return Err(InputError::unsupported(
                    "path",
                    format!("expected a string, found {}", super::error::json_kind(other)),
                ));
            }
        };

        let variants = match map.get("variants") {
            None | Some(Value::Null) => Variants::new(),
            Some(value) => Variants::from_json("variants", value)?,
        };

        Ok(Self { path, variants })
    }
}

impl TryFrom<Value> for RequestContext {
    type Error = InputError;

    fn try_from(value: Value) -> Result<Self, Self::Error> {
        Self::from_json(&value)
    }
}

#[derive(Serialize)]
struct KeyMaterial<'a> {
    path: &'a str,
    variants: &'a NormalizedVariants,
}

/// Derives `CanonicalKey`s from request contexts.
///
/// Stateless; a single instance may be shared freely across threads.
#[derive(Debug, Clone, Copy, Default)]
pub struct KeyCanonicalizer;

impl KeyCanonicalizer {
    pub fn new() -> Self {
        Self
    }

    pub fn canonicalize(&self, context: &RequestContext) -> CanonicalKey {
        self.canonicalize_parts(&context.path, &context.variants)
    }

    pub fn canonicalize_parts(&self, path: &str, variants: &Variants) -> CanonicalKey {
        let path = normalize_path(path);
        let variants = normalize_variants(variants);
        self.digest_normalized(&path, &variants)
    }

    /// Canonicalize every context; output index `i` belongs to input index `i`.
    pub fn canonicalize_batch(&self, contexts: &[RequestContext]) -> Vec<CanonicalKey> {
        contexts
            .iter()
            .map(|context| self.canonicalize(context))
            .collect()
    }

    pub fn verify_equivalence(&self, a: &RequestContext, b: &RequestContext) -> bool {
        self.canonicalize(a) == self.canonicalize(b)
    }

    /// Digest an already-normalized path and variant set.
    pub(crate) fn digest_normalized(&self, path: &str, variants: &NormalizedVariants) -> CanonicalKey {
        let material = KeyMaterial { path, variants };
        // String-keyed maps of tagged scalars have no unencodable values.
        let bytes = serde_json::to_vec(&material).unwrap_or_default();
        CanonicalKey(xxh3_128(&bytes))
    }
}

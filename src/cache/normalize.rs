//! Path and variant normalization ahead of key digesting.

use std::collections::BTreeMap;

use serde::Serialize;
use url::{Url, form_urlencoded};

use super::keys::{VariantValue, Variants};

const ROOT: &str = "/";
const SCHEME_SEPARATOR: &str = "://";
const PLACEHOLDER_ORIGIN: &str = "http://regen-cache.invalid";

/// Variant value after normalization, tagged by type.
///
/// Floats are carried by bit pattern so every value has a total, exact
/// encoding and `Bool(true)`, `Int(1)` and `Float(1.0)` stay distinct.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize)]
pub enum NormalizedValue {
    Null,
    Bool(bool),
    Int(i64),
    Float(u64),
    Str(String),
    Map(NormalizedVariants),
}

pub type NormalizedVariants = BTreeMap<String, NormalizedValue>;

/// Normalize a request path or URL.
///
/// Local paths without a query take the collapse-and-trim fast path. URLs
/// with a scheme or query are decomposed; anything that fails to decompose
/// is treated as an opaque local path.
pub fn normalize_path(raw: &str) -> String {
    if raw.is_empty() {
        return ROOT.to_string();
    }

    if !raw.contains('?') && !raw.contains(SCHEME_SEPARATOR) {
        return collapse_path(raw);
    }

    decompose(raw).unwrap_or_else(|| collapse_path(raw))
}

/// Merge repeated separators, drop a trailing one, ensure a leading one.
fn collapse_path(raw: &str) -> String {
    let mut collapsed = String::with_capacity(raw.len() + 1);
    for segment in raw.split('/').filter(|segment| !segment.is_empty()) {
        collapsed.push('/');
        collapsed.push_str(segment);
    }
    if collapsed.is_empty() {
        collapsed.push_str(ROOT);
    }
    collapsed
}

fn decompose(raw: &str) -> Option<String> {
    let (head, query) = match raw.split_once('?') {
        Some((head, query)) => (head, Some(query)),
        None => (raw, None),
    };

    // Only a scheme ahead of the query makes the input absolute; `://`
    // inside a query value does not.
    if head.contains(SCHEME_SEPARATOR) {
        let url = Url::parse(raw).ok()?;
        let host = url.host_str()?;

        let mut normalized = format!("{}://{}", url.scheme(), host);
        if let Some(port) = url.port() {
            normalized.push(':');
            normalized.push_str(&port.to_string());
        }
        normalized.push_str(&collapse_path(url.path()));
        append_sorted_query(&mut normalized, &url);
        return Some(normalized);
    }

    // Relative input: collapse the path first so `//host/x` stays a path,
    // then resolve against a placeholder origin to parse the query.
    let mut relative = collapse_path(head);
    if let Some(query) = query {
        relative.push('?');
        relative.push_str(query);
    }

    let url = Url::parse(PLACEHOLDER_ORIGIN).ok()?.join(&relative).ok()?;
    let mut normalized = collapse_path(url.path());
    append_sorted_query(&mut normalized, &url);
    Some(normalized)
}

fn append_sorted_query(target: &mut String, url: &Url) {
    let mut pairs: Vec<(String, String)> = url.query_pairs().into_owned().collect();
    if pairs.is_empty() {
        return;
    }

    // Stable: repeated keys keep their relative order.
    pairs.sort_by(|left, right| left.0.cmp(&right.0));

    let query = form_urlencoded::Serializer::new(String::new())
        .extend_pairs(pairs)
        .finish();
    target.push('?');
    target.push_str(&query);
}

/// Normalize a variant set into a sorted, type-tagged structure.
///
/// Returns a new value; the input is never modified.
pub fn normalize_variants(variants: &Variants) -> NormalizedVariants {
    variants
        .iter()
        .map(|(key, value)| (key.to_string(), normalize_value(value)))
        .collect()
}

fn normalize_value(value: &VariantValue) -> NormalizedValue {
    match value {
        VariantValue::Null => NormalizedValue::Null,
        VariantValue::Bool(flag) => NormalizedValue::Bool(*flag),
        VariantValue::Int(int) => NormalizedValue::Int(*int),
        VariantValue::Float(float) => NormalizedValue::Float(float.to_bits()),
        VariantValue::Str(text) => NormalizedValue::Str(text.trim().to_lowercase()),
        VariantValue::Map(nested) => NormalizedValue::Map(normalize_variants(nested)),
    }
}

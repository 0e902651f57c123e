//! Content-mutation events.
//!
//! An event names what happened (`event_type`), which entity it happened to,
//! and any further surfaces the caller knows depend on the change.

use std::collections::BTreeMap;

use serde::Deserialize;
use serde_json::{Map, Value};

use super::error::{InputError, json_kind};
use super::keys::Variants;

pub const POST_CREATED: &str = "post_created";
pub const POST_UPDATED: &str = "post_updated";
pub const POST_DELETED: &str = "post_deleted";
pub const COMMENT_ADDED: &str = "comment_added";
pub const COMMENT_UPDATED: &str = "comment_updated";
pub const COMMENT_DELETED: &str = "comment_deleted";
pub const AUTHOR_UPDATED: &str = "author_updated";
pub const CATEGORY_UPDATED: &str = "category_updated";
pub const PAGE_UPDATED: &str = "page_updated";
pub const PAGE_DELETED: &str = "page_deleted";

/// A mutation reported by the content source.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(try_from = "Value")]
pub struct InvalidationEvent {
    pub event_type: String,
    pub entity_type: String,
    pub entity_id: Option<String>,
    /// Surface kind → concrete discriminators (ids, slugs, section names).
    pub dependencies: BTreeMap<String, Vec<String>>,
    /// Variant sets to purge for every affected path; empty means "no variants".
    pub variant_sets: Vec<Variants>,
}

impl InvalidationEvent {
    pub fn new(event_type: impl Into<String>) -> Self {
        Self {
            event_type: event_type.into(),
            ..Default::default()
        }
    }

    pub fn for_entity(
        event_type: impl Into<String>,
        entity_type: impl Into<String>,
        entity_id: impl ToString,
    ) -> Self {
        Self {
            event_type: event_type.into(),
            entity_type: entity_type.into(),
            entity_id: Some(entity_id.to_string()),
            ..Default::default()
        }
    }

    pub fn post_created(post_id: impl ToString) -> Self {
        Self::for_entity(POST_CREATED, "post", post_id)
    }

    pub fn post_updated(post_id: impl ToString) -> Self {
        Self::for_entity(POST_UPDATED, "post", post_id)
    }

    pub fn post_deleted(post_id: impl ToString) -> Self {
        Self::for_entity(POST_DELETED, "post", post_id)
    }

    /// A comment on `post_id` was added; the post page is the dependency.
    pub fn comment_added(post_id: impl ToString) -> Self {
        Self::new(COMMENT_ADDED).with_dependency("post_page", post_id)
    }

    pub fn with_dependency(mut self, surface: impl Into<String>, discriminator: impl ToString) -> Self {
        self.dependencies
            .entry(surface.into())
            .or_default()
            .push(discriminator.to_string());
        self
    }

    pub fn with_variants(mut self, variants: Variants) -> Self {
        self.variant_sets.push(variants);
        self
    }

    pub fn dependencies_for(&self, surface: &str) -> &[String] {
        self.dependencies
            .get(surface)
            .map(Vec::as_slice)
            .unwrap_or_default()
    }

    /// Parse an event from JSON, defaulting absent fields.
    ///
    /// Accepts camelCase or snake_case field names. Ids and discriminators
    /// may be strings or numbers; a single discriminator may be given
    /// without a list.
    pub fn from_json(value: &Value) -> Result<Self, InputError> {
        let Value::Object(map) = value else {
            return Err(InputError::not_a_mapping("event", value));
        };

        let event_type = string_field(map, &["event_type", "eventType"])?;
        let entity_type = string_field(map, &["entity_type", "entityType"])?;

        let entity_id = match field(map, &["entity_id", "entityId"]) {
            None | Some(Value::Null) => None,
            Some(value) => Some(discriminator("entity_id", value)?),
        };

        let mut dependencies = BTreeMap::new();
        match field(map, &["dependencies"]) {
            None | Some(Value::Null) => {}
            Some(Value::Object(entries)) => {
                for (surface, value) in entries {
                    let name = format!("dependencies.{surface}");
                    let discriminators = match value {
                        Value::Null => Vec::new(),
                        Value::Array(items) => items
                            .iter()
                            .map(|item| discriminator(&name, item))
                            .collect::<Result<Vec<_>, _>>()?,
                        scalar => vec![discriminator(&name, scalar)?],
                    };
                    dependencies.insert(surface.clone(), discriminators);
                }
            }
            Some(other) => return Err(InputError::not_a_mapping("dependencies", other)),
        }

        let variant_sets = match field(map, &["variant_sets", "variantSets"]) {
            None | Some(Value::Null) => Vec::new(),
            Some(Value::Array(items)) => items
                .iter()
                .enumerate()
                .map(|(index, item)| Variants::from_json(&format!("variant_sets[{index}]"), item))
                .collect::<Result<Vec<_>, _>>()?,
            Some(other) => return Err(InputError::not_a_list("variant_sets", other)),
        };

        Ok(Self {
            event_type,
            entity_type,
            entity_id,
            dependencies,
            variant_sets,
        })
    }

    pub fn from_json_str(input: &str) -> Result<Self, InputError> {
        let value: Value = serde_json::from_str(input)?;
        Self::from_json(&value)
    }
}

impl TryFrom<Value> for InvalidationEvent {
    type Error = InputError;

    fn try_from(value: Value) -> Result<Self, Self::Error> {
        Self::from_json(&value)
    }
}

fn field<'a>(map: &'a Map<String, Value>, names: &[&str]) -> Option<&'a Value> {
    names.iter().find_map(|name| map.get(*name))
}

fn string_field(map: &Map<String, Value>, names: &[&str]) -> Result<String, InputError> {
    match field(map, names) {
        None | Some(Value::Null) => Ok(String::new()),
        Some(Value::String(text)) => Ok(text.clone()),
        Some(other) => Err(InputError::unsupported(
            names[0],
            format!("expected a string, found {}", json_kind(other)),
        )),
    }
}

fn discriminator(field: &str, value: &Value) -> Result<String, InputError> {
    match value {
        Value::String(text) => Ok(text.clone()),
        Value::Number(number) => Ok(number.to_string()),
        other => Err(InputError::unsupported(
            field,
            format!("expected a string or number, found {}", json_kind(other)),
        )),
    }
}

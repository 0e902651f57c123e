use serde_json::Value;
use thiserror::Error;

/// Structurally invalid caller input that cannot be defaulted.
///
/// Everything else (missing fields, malformed URLs, unknown events) has a
/// total default behavior and never surfaces as an error.
#[derive(Debug, Error)]
pub enum InputError {
    #[error("expected a mapping for `{field}`, found {found}")]
    NotAMapping { field: String, found: &'static str },
    #[error("expected a list for `{field}`, found {found}")]
    NotAList { field: String, found: &'static str },
    #[error("unsupported value for `{field}`: {reason}")]
    Unsupported { field: String, reason: String },
    #[error("malformed JSON input: {0}")]
    Json(#[from] serde_json::Error),
}

impl InputError {
    pub fn not_a_mapping(field: impl Into<String>, found: &Value) -> Self {
        Self::NotAMapping {
            field: field.into(),
            found: json_kind(found),
        }
    }

    pub fn not_a_list(field: impl Into<String>, found: &Value) -> Self {
        Self::NotAList {
            field: field.into(),
            found: json_kind(found),
        }
    }

    pub fn unsupported(field: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::Unsupported {
            field: field.into(),
            reason: reason.into(),
        }
    }
}

pub(crate) fn json_kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "a boolean",
        Value::Number(_) => "a number",
        Value::String(_) => "a string",
        Value::Array(_) => "a list",
        Value::Object(_) => "a mapping",
    }
}

//! Error types for state containers.

use serde_json::Value;
use thiserror::Error;

/// Errors raised synchronously by container operations.
///
/// Every variant is returned before the failing call mutates anything.
#[derive(Debug, Error)]
pub enum StateError {
    /// A dynamic input had the wrong JSON shape.
    #[error("expected {expected}, found {found}")]
    Shape {
        expected: &'static str,
        found: &'static str,
    },

    /// A partial write named a field that cannot be written.
    #[error("field `{0}` is read-only")]
    ReadOnlyField(String),

    /// The requested binding would make a signal mirror itself.
    #[error("binding would create a cycle between signals")]
    BindingCycle,

    #[error("snapshot conversion failed: {0}")]
    Serde(#[from] serde_json::Error),
}

impl StateError {
    pub(crate) fn shape(expected: &'static str, found: &Value) -> Self {
        StateError::Shape {
            expected,
            found: kind_of(found),
        }
    }
}

pub type Result<T, E = StateError> = std::result::Result<T, E>;

/// Name of a JSON value's kind, for error messages.
pub fn kind_of(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn shape_error_names_both_kinds() {
        let err = StateError::shape("object", &json!([1, 2]));
        assert_eq!(err.to_string(), "expected object, found array");
    }

    #[test]
    fn read_only_message() {
        let err = StateError::ReadOnlyField("total".into());
        assert_eq!(err.to_string(), "field `total` is read-only");
    }
}

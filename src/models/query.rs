//! Query-related data models.
//!
//! This module defines bound parameter values and result rows.

use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;

/// A result row: column name to value, in result-column order.
pub type Row = serde_json::Map<String, JsonValue>;

/// A parameter value for parameterized statements.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, schemars::JsonSchema)]
#[serde(untagged)]
pub enum QueryParam {
    /// NULL value
    Null,
    /// Boolean value
    Bool(bool),
    /// Integer value (stored as i64 for maximum range)
    Int(i64),
    /// Floating point value
    Float(f64),
    /// String value
    String(String),
    /// Arrays and objects, bound as `jsonb`
    Json(JsonValue),
}

impl From<JsonValue> for QueryParam {
    fn from(value: JsonValue) -> Self {
        match value {
            JsonValue::Null => Self::Null,
            JsonValue::Bool(b) => Self::Bool(b),
            JsonValue::Number(n) => match n.as_i64() {
                Some(i) => Self::Int(i),
                // u64 beyond i64::MAX and real numbers
                None => Self::Float(n.as_f64().unwrap_or(f64::NAN)),
            },
            JsonValue::String(s) => Self::String(s),
            other => Self::Json(other),
        }
    }
}

impl From<&str> for QueryParam {
    fn from(value: &str) -> Self {
        Self::String(value.to_string())
    }
}

impl From<i64> for QueryParam {
    fn from(value: i64) -> Self {
        Self::Int(value)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_from_json_value() {
        assert_eq!(QueryParam::from(json!(null)), QueryParam::Null);
        assert_eq!(QueryParam::from(json!(7)), QueryParam::Int(7));
        assert_eq!(QueryParam::from(json!(1.5)), QueryParam::Float(1.5));
        assert_eq!(QueryParam::from(json!("x")), QueryParam::from("x"));
        assert_eq!(
            QueryParam::from(json!({"a": 1})),
            QueryParam::Json(json!({"a": 1}))
        );
        assert_eq!(QueryParam::from(json!([1, 2])), QueryParam::Json(json!([1, 2])));
    }

    #[test]
    fn test_deserialize_untagged() {
        let params: Vec<QueryParam> =
            serde_json::from_str(r#"[null, true, 3, 2.5, "s", {"k": [1]}]"#).unwrap();
        assert_eq!(
            params,
            vec![
                QueryParam::Null,
                QueryParam::Bool(true),
                QueryParam::Int(3),
                QueryParam::Float(2.5),
                QueryParam::from("s"),
                QueryParam::Json(json!({"k": [1]})),
            ]
        );
    }
}

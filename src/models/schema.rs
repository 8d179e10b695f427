//! Schema-related data models.
//!
//! This module defines the column specification accepted by `create_table`.

use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;

/// One column of a table to create.
#[derive(Debug, Clone, Serialize, Deserialize, schemars::JsonSchema)]
pub struct ColumnSpec {
    /// Column name
    pub name: String,
    /// PostgreSQL type, e.g. "integer", "varchar(255)", "numeric(10, 2)", "text[]"
    #[serde(rename = "type")]
    pub data_type: String,
    /// Whether the column accepts NULL (default: true)
    #[serde(default = "default_nullable")]
    pub nullable: bool,
    /// Whether the column is part of the primary key (default: false)
    #[serde(default)]
    pub primary_key: bool,
    /// Literal default value (number, boolean, string or null)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub default: Option<JsonValue>,
    /// Default expression such as CURRENT_TIMESTAMP, now() or gen_random_uuid()
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub default_expression: Option<String>,
}

fn default_nullable() -> bool {
    true
}

impl ColumnSpec {
    /// Create a nullable, non-key column without a default.
    pub fn new(name: impl Into<String>, data_type: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            data_type: data_type.into(),
            nullable: true,
            primary_key: false,
            default: None,
            default_expression: None,
        }
    }

    /// Mark the column NOT NULL.
    pub fn not_null(mut self) -> Self {
        self.nullable = false;
        self
    }

    /// Mark the column as part of the primary key.
    pub fn primary_key(mut self) -> Self {
        self.primary_key = true;
        self
    }

    /// Set a literal default.
    pub fn with_default(mut self, value: JsonValue) -> Self {
        self.default = Some(value);
        self
    }

    /// Set a default expression.
    pub fn with_default_expression(mut self, expr: impl Into<String>) -> Self {
        self.default_expression = Some(expr.into());
        self
    }
}

//! MCP tool implementations.
//!
//! This module contains all database tool handlers:
//! - `query`: Execute one SQL statement (`execute_query`)
//! - `schema`: `list_tables`, `describe_table`, `list_schemas`
//! - `write`: `create_table`, `insert_data`, `update_data`
//! - `classify`: Decide whether a statement returns rows

pub mod classify;
pub mod query;
pub mod schema;
pub mod write;

pub use query::{ExecuteQueryInput, QueryToolHandler};
pub use schema::{DescribeTableInput, ListSchemasInput, ListTablesInput, SchemaToolHandler};
pub use write::{CreateTableInput, InsertDataInput, InsertRows, UpdateDataInput, WriteToolHandler};

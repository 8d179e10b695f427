//! Data models for the PostgreSQL MCP Server.
//!
//! This module re-exports all model types used throughout the application.

pub mod operation;
pub mod query;
pub mod schema;

// Re-export commonly used types
pub use operation::{ErrorInfo, OperationResult};
pub use query::{QueryParam, Row};
pub use schema::ColumnSpec;

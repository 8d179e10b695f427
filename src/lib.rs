//! PG MCP Server Library
//!
//! This library provides MCP (Model Context Protocol) tools for AI assistants
//! to query, inspect and modify a PostgreSQL database over one managed
//! connection.

pub mod config;
pub mod db;
pub mod error;
pub mod mcp;
pub mod models;
pub mod tools;
pub mod transport;

pub use config::{Config, ConnectionProfile, ProfileOverrides};
pub use error::{DbError, DbResult};
pub use mcp::PgService;

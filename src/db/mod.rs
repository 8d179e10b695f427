//! Database abstraction layer.
//!
//! This module provides database access functionality:
//! - Connection lifecycle with retry and reconnect
//! - Statement building with validated identifiers and bound parameters
//! - Statement execution
//! - Type mappings

pub mod connection;
pub mod executor;
pub mod identifier;
pub mod params;
pub mod sql_scan;
pub mod statement;
pub mod types;

pub use connection::{
    ConnectionManager, ConnectionState, Connector, DEFAULT_RETRY_BASE_DELAY, PgConnectionManager,
    PgConnector, RetryPolicy,
};
pub use statement::StatementPlan;

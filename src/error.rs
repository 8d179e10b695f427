//! Error types for the PostgreSQL MCP Server.
//!
//! This module defines all error types using `thiserror` for ergonomic error handling.
//! Each variant carries enough structure for the tool layer to render a stable
//! [`ErrorInfo`](crate::models::ErrorInfo) instead of a raw driver exception.

use serde::Serialize;
use thiserror::Error;

/// Why establishing a connection failed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, schemars::JsonSchema)]
#[serde(rename_all = "snake_case")]
pub enum ConnectErrorKind {
    /// Server could not be reached (refused, reset, I/O, server starting up)
    Unreachable,
    /// A connection attempt exceeded the configured timeout
    Timeout,
    /// Credentials were rejected or malformed
    AuthFailed,
    /// The target database does not exist
    DatabaseMissing,
}

impl ConnectErrorKind {
    /// Only transient causes consume retry budget.
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::Unreachable | Self::Timeout)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Unreachable => "unreachable",
            Self::Timeout => "timeout",
            Self::AuthFailed => "auth_failed",
            Self::DatabaseMissing => "database_missing",
        }
    }
}

impl std::fmt::Display for ConnectErrorKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Why the database rejected a well-formed request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, schemars::JsonSchema)]
#[serde(rename_all = "snake_case")]
pub enum ExecErrorKind {
    Syntax,
    ConstraintViolation,
    UndefinedObject,
    TypeMismatch,
    Unknown,
}

impl ExecErrorKind {
    /// Classify a PostgreSQL SQLSTATE code.
    pub fn from_sql_state(code: &str) -> Self {
        match code {
            "42601" | "42000" => Self::Syntax,
            "42P01" | "42703" | "42883" | "42704" | "3F000" | "42P02" => Self::UndefinedObject,
            "42804" | "42846" | "42P18" => Self::TypeMismatch,
            _ if code.starts_with("23") => Self::ConstraintViolation,
            _ if code.starts_with("22") => Self::TypeMismatch,
            _ => Self::Unknown,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Syntax => "syntax",
            Self::ConstraintViolation => "constraint_violation",
            Self::UndefinedObject => "undefined_object",
            Self::TypeMismatch => "type_mismatch",
            Self::Unknown => "unknown",
        }
    }

    fn suggestion(&self) -> &'static str {
        match self {
            Self::Syntax => "Check the SQL syntax",
            Self::ConstraintViolation => "The data violates a table constraint (unique, not null, foreign key or check)",
            Self::UndefinedObject => "Check that the referenced table, column or function exists",
            Self::TypeMismatch => "Check that parameter values match the column types",
            Self::Unknown => "Check the SQL statement and referenced objects",
        }
    }
}

impl std::fmt::Display for ExecErrorKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Error, Debug)]
pub enum DbError {
    #[error("Configuration error: {message}")]
    Config { message: String },

    #[error("Connection failed ({reason}) after {attempts} attempt(s): {message}")]
    Connect {
        reason: ConnectErrorKind,
        message: String,
        attempts: u32,
        suggestion: String,
    },

    #[error("Invalid input: {message}")]
    Validation { message: String },

    #[error("Schema mismatch: {message}")]
    SchemaMismatch { message: String },

    #[error("Database error ({kind}): {message}")]
    Exec {
        kind: ExecErrorKind,
        message: String,
        /// e.g., "42P01" for undefined table
        sql_state: Option<String>,
    },

    #[error("Internal error: {message}")]
    Internal { message: String },
}

impl DbError {
    /// Create a configuration error.
    pub fn config(message: impl Into<String>) -> Self {
        Self::Config {
            message: message.into(),
        }
    }

    /// Create a connection error for a single failed attempt.
    pub fn connect(reason: ConnectErrorKind, message: impl Into<String>) -> Self {
        Self::Connect {
            reason,
            message: message.into(),
            attempts: 1,
            suggestion: connect_suggestion(reason).to_string(),
        }
    }

    /// Create a validation error.
    pub fn validation(message: impl Into<String>) -> Self {
        Self::Validation {
            message: message.into(),
        }
    }

    /// Create a row-shape mismatch error.
    pub fn schema_mismatch(message: impl Into<String>) -> Self {
        Self::SchemaMismatch {
            message: message.into(),
        }
    }

    /// Create an execution error with optional SQL state.
    pub fn exec(kind: ExecErrorKind, message: impl Into<String>, sql_state: Option<String>) -> Self {
        Self::Exec {
            kind,
            message: message.into(),
            sql_state,
        }
    }

    /// Create an internal error.
    pub fn internal(message: impl Into<String>) -> Self {
        Self::Internal {
            message: message.into(),
        }
    }

    /// Record how many attempts were made before this connection error surfaced.
    pub fn with_attempts(self, total: u32) -> Self {
        match self {
            Self::Connect {
                reason,
                message,
                suggestion,
                ..
            } => Self::Connect {
                reason,
                message,
                attempts: total,
                suggestion,
            },
            other => other,
        }
    }

    /// Stable category name used in tool responses.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Config { .. } => "config_error",
            Self::Connect { .. } => "connect_error",
            Self::Validation { .. } | Self::SchemaMismatch { .. } => "validation_error",
            Self::Exec { .. } => "exec_error",
            Self::Internal { .. } => "internal_error",
        }
    }

    /// Sub-classification within the category, if any.
    pub fn reason(&self) -> Option<&'static str> {
        match self {
            Self::Connect { reason, .. } => Some(reason.as_str()),
            Self::Exec { kind, .. } => Some(kind.as_str()),
            Self::SchemaMismatch { .. } => Some("schema_mismatch"),
            _ => None,
        }
    }

    /// Get the suggestion for this error, if available.
    pub fn suggestion(&self) -> Option<&str> {
        match self {
            Self::Connect { suggestion, .. } => Some(suggestion),
            Self::Exec { kind, .. } => Some(kind.suggestion()),
            _ => None,
        }
    }

    /// SQLSTATE reported by the server, if any.
    pub fn sql_state(&self) -> Option<&str> {
        match self {
            Self::Exec { sql_state, .. } => sql_state.as_deref(),
            _ => None,
        }
    }

    /// Check if this error is retryable.
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::Connect { reason, .. } if reason.is_retryable())
    }

    /// True when the error means the connection itself can no longer be trusted.
    pub fn is_connection_failure(&self) -> bool {
        matches!(self, Self::Connect { .. })
    }
}

fn connect_suggestion(reason: ConnectErrorKind) -> &'static str {
    match reason {
        ConnectErrorKind::Unreachable => "Check that the PostgreSQL server is running and the host and port are correct",
        ConnectErrorKind::Timeout => "The server did not answer in time; check network connectivity or raise the connection timeout",
        ConnectErrorKind::AuthFailed => "Verify the user name and password",
        ConnectErrorKind::DatabaseMissing => "Check that the database name exists",
    }
}

/// Classify a failed connection attempt.
pub fn classify_connect_error(err: &sqlx::Error) -> ConnectErrorKind {
    match err {
        sqlx::Error::Database(db_err) => match db_err.code().as_deref() {
            Some("28P01") | Some("28000") => ConnectErrorKind::AuthFailed,
            Some("3D000") => ConnectErrorKind::DatabaseMissing,
            _ => {
                let msg = db_err.message().to_lowercase();
                if msg.contains("password authentication failed") {
                    ConnectErrorKind::AuthFailed
                } else if msg.contains("does not exist") && msg.contains("database") {
                    ConnectErrorKind::DatabaseMissing
                } else {
                    // 57P03 (server starting up), 53300 (too many connections), ...
                    ConnectErrorKind::Unreachable
                }
            }
        },
        sqlx::Error::Configuration(_) => ConnectErrorKind::AuthFailed,
        sqlx::Error::PoolTimedOut => ConnectErrorKind::Timeout,
        sqlx::Error::Io(io_err) if io_err.kind() == std::io::ErrorKind::TimedOut => {
            ConnectErrorKind::Timeout
        }
        _ => ConnectErrorKind::Unreachable,
    }
}

/// Convert sqlx errors raised while executing a statement to DbError.
impl From<sqlx::Error> for DbError {
    fn from(err: sqlx::Error) -> Self {
        match err {
            sqlx::Error::Database(db_err) => {
                let code = db_err.code().map(|c| c.to_string());
                let kind = code
                    .as_deref()
                    .map(ExecErrorKind::from_sql_state)
                    .unwrap_or(ExecErrorKind::Unknown);
                DbError::exec(kind, db_err.message(), code)
            }
            sqlx::Error::RowNotFound => {
                DbError::exec(ExecErrorKind::Unknown, "No rows returned", None)
            }
            sqlx::Error::Io(io_err) => DbError::connect(
                ConnectErrorKind::Unreachable,
                format!("I/O error: {}", io_err),
            ),
            sqlx::Error::Tls(tls_err) => DbError::connect(
                ConnectErrorKind::Unreachable,
                format!("TLS error: {}", tls_err),
            ),
            sqlx::Error::Protocol(msg) => DbError::connect(
                ConnectErrorKind::Unreachable,
                format!("Protocol error: {}", msg),
            ),
            sqlx::Error::PoolTimedOut => {
                DbError::connect(ConnectErrorKind::Timeout, "Timed out waiting for a connection")
            }
            sqlx::Error::PoolClosed => {
                DbError::connect(ConnectErrorKind::Unreachable, "Connection is closed")
            }
            sqlx::Error::Configuration(msg) => DbError::config(msg.to_string()),
            sqlx::Error::TypeNotFound { type_name } => DbError::exec(
                ExecErrorKind::UndefinedObject,
                format!("Type not found: {}", type_name),
                None,
            ),
            sqlx::Error::ColumnNotFound(col) => DbError::exec(
                ExecErrorKind::UndefinedObject,
                format!("Column not found: {}", col),
                None,
            ),
            sqlx::Error::ColumnIndexOutOfBounds { index, len } => DbError::internal(format!(
                "Column index {} out of bounds (len: {})",
                index, len
            )),
            sqlx::Error::ColumnDecode { index, source } => DbError::exec(
                ExecErrorKind::TypeMismatch,
                format!("Failed to decode column {}: {}", index, source),
                None,
            ),
            sqlx::Error::Decode(source) => DbError::exec(
                ExecErrorKind::TypeMismatch,
                format!("Decode error: {}", source),
                None,
            ),
            sqlx::Error::WorkerCrashed => DbError::internal("Database worker crashed"),
            _ => DbError::internal(format!("Unknown database error: {}", err)),
        }
    }
}

/// Result type alias for database operations.
pub type DbResult<T> = Result<T, DbError>;

//! Configuration handling for the PostgreSQL MCP Server.
//!
//! Server options come from CLI arguments and `MCP_*` environment variables.
//! The database connection profile is resolved separately from defaults,
//! `POSTGRES_*` environment variables and explicit overrides, in that order of
//! increasing precedence.

use crate::error::{DbError, DbResult};
use clap::{Parser, ValueEnum};
use serde::Deserialize;
use std::collections::HashMap;
use std::time::Duration;

pub const DEFAULT_HTTP_HOST: &str = "127.0.0.1";
pub const DEFAULT_HTTP_PORT: u16 = 8080;
pub const DEFAULT_MCP_ENDPOINT: &str = "/";

// Connection profile defaults
pub const DEFAULT_PG_HOST: &str = "localhost";
pub const DEFAULT_PG_PORT: u16 = 5432;
pub const DEFAULT_PG_USER: &str = "postgres";
pub const DEFAULT_PG_PASSWORD: &str = "postgres";
pub const DEFAULT_PG_DATABASE: &str = "postgres";
pub const DEFAULT_CONNECT_TIMEOUT_SECS: u64 = 10;
pub const DEFAULT_MAX_RETRIES: u32 = 3;

pub const ENV_HOST: &str = "POSTGRES_HOST";
pub const ENV_PORT: &str = "POSTGRES_PORT";
pub const ENV_USER: &str = "POSTGRES_USER";
pub const ENV_PASSWORD: &str = "POSTGRES_PASSWORD";
pub const ENV_DATABASE: &str = "POSTGRES_DATABASE";
pub const ENV_CONNECT_TIMEOUT: &str = "POSTGRES_CONNECTION_TIMEOUT";
pub const ENV_RETRY_COUNT: &str = "POSTGRES_CONNECT_RETRY_COUNT";

/// Everything needed to open one PostgreSQL connection.
///
/// Immutable once resolved. The password is redacted from `Debug` output and
/// is never serialized.
#[derive(Clone, PartialEq, Eq)]
pub struct ConnectionProfile {
    pub host: String,
    pub port: u16,
    pub user: String,
    pub password: String,
    pub database: String,
    /// Per-attempt timeout; 0 disables the timeout.
    pub connect_timeout_seconds: u64,
    /// Retries after the initial attempt; 0 means fail fast.
    pub max_retries: u32,
}

impl std::fmt::Debug for ConnectionProfile {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ConnectionProfile")
            .field("host", &self.host)
            .field("port", &self.port)
            .field("user", &self.user)
            .field("password", &"<redacted>")
            .field("database", &self.database)
            .field("connect_timeout_seconds", &self.connect_timeout_seconds)
            .field("max_retries", &self.max_retries)
            .finish()
    }
}

impl Default for ConnectionProfile {
    fn default() -> Self {
        Self {
            host: DEFAULT_PG_HOST.to_string(),
            port: DEFAULT_PG_PORT,
            user: DEFAULT_PG_USER.to_string(),
            password: DEFAULT_PG_PASSWORD.to_string(),
            database: DEFAULT_PG_DATABASE.to_string(),
            connect_timeout_seconds: DEFAULT_CONNECT_TIMEOUT_SECS,
            max_retries: DEFAULT_MAX_RETRIES,
        }
    }
}

/// Connection parameters supplied explicitly, either on the command line or
/// per call as `db_config`. Every field is optional; unset fields fall through
/// to the next source.
#[derive(Clone, Default, Deserialize, schemars::JsonSchema)]
#[serde(deny_unknown_fields)]
pub struct ProfileOverrides {
    /// Database server host name or address
    #[serde(default)]
    pub host: Option<String>,
    /// Database server port
    #[serde(default)]
    pub port: Option<u16>,
    /// User name to authenticate as
    #[serde(default)]
    pub user: Option<String>,
    /// Password for the user
    #[serde(default)]
    pub password: Option<String>,
    /// Database name
    #[serde(default)]
    pub database: Option<String>,
    /// Per-attempt connect timeout in seconds (0 = no timeout)
    #[serde(default, alias = "connect_timeout")]
    pub connect_timeout_seconds: Option<i64>,
    /// Number of retries after the first failed attempt (negative values mean 0)
    #[serde(default, alias = "connect_retry_count")]
    pub max_retries: Option<i64>,
}

impl std::fmt::Debug for ProfileOverrides {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ProfileOverrides")
            .field("host", &self.host)
            .field("port", &self.port)
            .field("user", &self.user)
            .field("password", &self.password.as_ref().map(|_| "<redacted>"))
            .field("database", &self.database)
            .field("connect_timeout_seconds", &self.connect_timeout_seconds)
            .field("max_retries", &self.max_retries)
            .finish()
    }
}

impl ProfileOverrides {
    pub fn is_empty(&self) -> bool {
        self.host.is_none()
            && self.port.is_none()
            && self.user.is_none()
            && self.password.is_none()
            && self.database.is_none()
            && self.connect_timeout_seconds.is_none()
            && self.max_retries.is_none()
    }
}

impl ConnectionProfile {
    /// Resolve a profile: overrides > environment > defaults.
    ///
    /// `env` is a snapshot of the relevant environment variables; empty values
    /// are treated as unset. Numeric environment values that do not parse as
    /// non-negative integers are a configuration error.
    pub fn resolve(
        defaults: &ConnectionProfile,
        env: &HashMap<String, String>,
        overrides: &ProfileOverrides,
    ) -> DbResult<Self> {
        let lookup = |key: &str| env.get(key).map(|v| v.trim()).filter(|v| !v.is_empty());

        let mut profile = defaults.clone();
        if let Some(v) = lookup(ENV_HOST) {
            profile.host = v.to_string();
        }
        if let Some(v) = lookup(ENV_PORT) {
            profile.port = parse_port(ENV_PORT, v)?;
        }
        if let Some(v) = lookup(ENV_USER) {
            profile.user = v.to_string();
        }
        if let Some(v) = env.get(ENV_PASSWORD).filter(|v| !v.is_empty()) {
            profile.password = v.clone();
        }
        if let Some(v) = lookup(ENV_DATABASE) {
            profile.database = v.to_string();
        }
        if let Some(v) = lookup(ENV_CONNECT_TIMEOUT) {
            profile.connect_timeout_seconds = parse_non_negative(ENV_CONNECT_TIMEOUT, v)?;
        }
        if let Some(v) = lookup(ENV_RETRY_COUNT) {
            let retries = parse_non_negative(ENV_RETRY_COUNT, v)?;
            profile.max_retries = u32::try_from(retries).map_err(|_| {
                DbError::config(format!("{ENV_RETRY_COUNT} is out of range: {v}"))
            })?;
        }

        profile.overlay(overrides)
    }

    /// Read the `POSTGRES_*` variables from the process environment once.
    pub fn process_env() -> HashMap<String, String> {
        [
            ENV_HOST,
            ENV_PORT,
            ENV_USER,
            ENV_PASSWORD,
            ENV_DATABASE,
            ENV_CONNECT_TIMEOUT,
            ENV_RETRY_COUNT,
        ]
        .iter()
        .filter_map(|key| std::env::var(key).ok().map(|v| (key.to_string(), v)))
        .collect()
    }

    /// Resolve from built-in defaults, the process environment and `overrides`.
    pub fn from_process_env(overrides: &ProfileOverrides) -> DbResult<Self> {
        Self::resolve(&Self::default(), &Self::process_env(), overrides)
    }

    /// Derive a new profile with `overrides` applied on top of this one.
    pub fn overlay(&self, overrides: &ProfileOverrides) -> DbResult<Self> {
        let mut profile = self.clone();
        if let Some(host) = &overrides.host {
            if host.trim().is_empty() {
                return Err(DbError::config("host must not be empty"));
            }
            profile.host = host.clone();
        }
        if let Some(port) = overrides.port {
            if port == 0 {
                return Err(DbError::config("port must be between 1 and 65535"));
            }
            profile.port = port;
        }
        if let Some(user) = &overrides.user {
            profile.user = user.clone();
        }
        if let Some(password) = &overrides.password {
            profile.password = password.clone();
        }
        if let Some(database) = &overrides.database {
            profile.database = database.clone();
        }
        if let Some(timeout) = overrides.connect_timeout_seconds {
            profile.connect_timeout_seconds = u64::try_from(timeout).map_err(|_| {
                DbError::config(format!(
                    "connect timeout must not be negative (got {timeout})"
                ))
            })?;
        }
        if let Some(retries) = overrides.max_retries {
            profile.max_retries = u32::try_from(retries.max(0)).unwrap_or(u32::MAX);
        }
        Ok(profile)
    }

    /// Per-attempt connect timeout, `None` when disabled.
    pub fn connect_timeout(&self) -> Option<Duration> {
        (self.connect_timeout_seconds > 0).then(|| Duration::from_secs(self.connect_timeout_seconds))
    }

    /// Total attempts a connect makes before giving up.
    pub fn max_attempts(&self) -> u32 {
        self.max_retries.saturating_add(1)
    }

    /// `host:port/database` for log lines. Never includes credentials.
    pub fn target(&self) -> String {
        format!("{}:{}/{}", self.host, self.port, self.database)
    }
}

fn parse_non_negative(key: &str, value: &str) -> DbResult<u64> {
    value.parse::<u64>().map_err(|_| {
        DbError::config(format!(
            "{key} must be a non-negative integer, got '{value}'"
        ))
    })
}

fn parse_port(key: &str, value: &str) -> DbResult<u16> {
    match value.parse::<u16>() {
        Ok(port) if port > 0 => Ok(port),
        _ => Err(DbError::config(format!(
            "{key} must be a port number between 1 and 65535, got '{value}'"
        ))),
    }
}

/// Transport mode for the MCP server.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, ValueEnum)]
pub enum TransportMode {
    /// Standard input/output (for CLI integration)
    #[default]
    Stdio,
    /// Streamable HTTP (for web clients)
    Http,
}

impl std::fmt::Display for TransportMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Stdio => write!(f, "stdio"),
            Self::Http => write!(f, "http"),
        }
    }
}

/// Configuration for the PostgreSQL MCP Server.
#[derive(Debug, Clone, Parser)]
#[command(
    name = "pg-mcp-server",
    about = "MCP server for PostgreSQL - query, introspect and modify a database through one managed connection",
    version,
    author
)]
pub struct Config {
    /// PostgreSQL host (overrides POSTGRES_HOST)
    #[arg(long)]
    pub host: Option<String>,

    /// PostgreSQL port (overrides POSTGRES_PORT)
    #[arg(long)]
    pub port: Option<u16>,

    /// PostgreSQL user (overrides POSTGRES_USER)
    #[arg(long)]
    pub user: Option<String>,

    /// PostgreSQL password (overrides POSTGRES_PASSWORD)
    #[arg(long)]
    pub password: Option<String>,

    /// PostgreSQL database name (overrides POSTGRES_DATABASE)
    #[arg(long)]
    pub database: Option<String>,

    /// Per-attempt connect timeout in seconds (overrides POSTGRES_CONNECTION_TIMEOUT)
    #[arg(long = "connection-timeout", value_name = "SECONDS")]
    pub connection_timeout: Option<u64>,

    /// Retries after a failed connect (overrides POSTGRES_CONNECT_RETRY_COUNT)
    #[arg(long = "connect-retry-count", value_name = "COUNT")]
    pub connect_retry_count: Option<u32>,

    /// Establish the shared connection before serving requests
    #[arg(long, env = "MCP_CONNECT_ON_STARTUP")]
    pub connect_on_startup: bool,

    /// Transport mode (stdio or http)
    #[arg(
        short,
        long,
        value_enum,
        default_value = "stdio",
        env = "MCP_TRANSPORT"
    )]
    pub transport: TransportMode,

    /// HTTP host to bind to (only used with http transport)
    #[arg(
        long,
        default_value = DEFAULT_HTTP_HOST,
        env = "MCP_HTTP_HOST"
    )]
    pub http_host: String,

    /// HTTP port to bind to (only used with http transport)
    #[arg(
        long,
        default_value_t = DEFAULT_HTTP_PORT,
        env = "MCP_HTTP_PORT"
    )]
    pub http_port: u16,

    /// MCP endpoint path (only used with http transport)
    #[arg(
        long,
        default_value = DEFAULT_MCP_ENDPOINT,
        env = "MCP_ENDPOINT"
    )]
    pub mcp_endpoint: String,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long, default_value = "info", env = "MCP_LOG_LEVEL")]
    pub log_level: String,

    /// Enable JSON logging format
    #[arg(long, env = "MCP_JSON_LOGS")]
    pub json_logs: bool,

    /// Enable logging output (disabled by default to avoid interfering with stdio transport)
    #[arg(long, env = "MCP_ENABLE_LOGS")]
    pub enable_logs: bool,
}

impl Config {
    /// Parse configuration from command line arguments.
    pub fn parse_args() -> Self {
        Self::parse()
    }

    /// Create a default configuration (useful for testing).
    pub fn default_config() -> Self {
        Self {
            host: None,
            port: None,
            user: None,
            password: None,
            database: None,
            connection_timeout: None,
            connect_retry_count: None,
            connect_on_startup: false,
            transport: TransportMode::Stdio,
            http_host: DEFAULT_HTTP_HOST.to_string(),
            http_port: DEFAULT_HTTP_PORT,
            mcp_endpoint: DEFAULT_MCP_ENDPOINT.to_string(),
            log_level: "info".to_string(),
            json_logs: false,
            enable_logs: false,
        }
    }

    /// The connection flags as explicit overrides.
    pub fn profile_overrides(&self) -> ProfileOverrides {
        ProfileOverrides {
            host: self.host.clone(),
            port: self.port,
            user: self.user.clone(),
            password: self.password.clone(),
            database: self.database.clone(),
            connect_timeout_seconds: self
                .connection_timeout
                .map(|t| i64::try_from(t).unwrap_or(i64::MAX)),
            max_retries: self.connect_retry_count.map(i64::from),
        }
    }

    /// Resolve the base connection profile against the process environment.
    pub fn connection_profile(&self) -> DbResult<ConnectionProfile> {
        ConnectionProfile::from_process_env(&self.profile_overrides())
    }

    /// Get the HTTP bind address.
    pub fn http_bind_addr(&self) -> String {
        format!("{}:{}", self.http_host, self.http_port)
    }
}

impl Default for Config {
    fn default() -> Self {
        Self::default_config()
    }
}

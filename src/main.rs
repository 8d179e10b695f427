//! PG MCP Server - Main entry point.
//!
//! This server provides MCP (Model Context Protocol) tools for AI assistants
//! to query, inspect and modify a PostgreSQL database.

use pg_mcp_server::config::{Config, TransportMode};
use pg_mcp_server::db::{PgConnectionManager, PgConnector};
use pg_mcp_server::transport::{HttpTransport, StdioTransport, Transport};
use std::sync::Arc;
use tracing::{error, info, warn};
use tracing_subscriber::{EnvFilter, fmt, prelude::*};

/// Initialize the tracing subscriber for logging.
///
/// Logs go to stderr; stdout carries the stdio transport's frames.
fn init_tracing(config: &Config) {
    if !config.enable_logs {
        return;
    }

    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&config.log_level));

    let subscriber = tracing_subscriber::registry().with(filter);

    if config.json_logs {
        subscriber
            .with(fmt::layer().json().with_writer(std::io::stderr))
            .init();
    } else {
        subscriber
            .with(
                fmt::layer()
                    .with_writer(std::io::stderr)
                    .with_target(true)
                    .with_thread_ids(false),
            )
            .init();
    }
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let config = Config::parse_args();

    init_tracing(&config);

    let profile = match config.connection_profile() {
        Ok(profile) => profile,
        Err(e) => {
            eprintln!("Error: {e}");
            std::process::exit(2);
        }
    };

    info!(
        transport = %config.transport,
        target_db = %profile.target(),
        "Starting PG MCP Server v{}",
        env!("CARGO_PKG_VERSION")
    );

    let mut connector = PgConnector::new();
    if let Some(limit) = profile.connect_timeout() {
        connector = connector.with_ping_timeout(limit);
    }
    let connection_manager = Arc::new(PgConnectionManager::new(connector, profile));

    if config.connect_on_startup {
        match connection_manager.warm_up().await {
            Ok(()) => info!("Connected to PostgreSQL at startup"),
            Err(e) => warn!(
                error = %e,
                "Startup connection failed; will retry on first use"
            ),
        }
    }

    let result = match config.transport {
        TransportMode::Stdio => {
            info!("Using stdio transport");
            let transport = StdioTransport::new(connection_manager);
            transport.run().await
        }
        TransportMode::Http => {
            info!(
                host = %config.http_host,
                port = config.http_port,
                endpoint = %config.mcp_endpoint,
                "Using HTTP transport"
            );
            let transport = HttpTransport::new(
                connection_manager,
                &config.http_host,
                config.http_port,
                &config.mcp_endpoint,
            );
            transport.run().await
        }
    };

    if let Err(e) = result {
        error!(error = %e, "Server error");
        return Err(e.into());
    }

    info!("Server shutdown complete");
    Ok(())
}

//! Query execution tool.
//!
//! This module implements the `execute_query` MCP tool. The caller's SQL is
//! passed through after placeholder checks; statements that produce a result
//! set return rows, everything else returns an affected-row count.

use crate::config::ProfileOverrides;
use crate::db::executor;
use crate::db::statement::build_select_passthrough;
use crate::db::PgConnectionManager;
use crate::error::DbResult;
use crate::models::{OperationResult, QueryParam};
use crate::tools::classify::{StatementOutput, classify};
use schemars::JsonSchema;
use serde::Deserialize;
use std::sync::Arc;
use std::time::Instant;
use tracing::info;

/// Input for the execute_query tool.
#[derive(Debug, Clone, Deserialize, JsonSchema)]
#[serde(deny_unknown_fields)]
pub struct ExecuteQueryInput {
    /// A single SQL statement. Use $1, $2, ... (or %s) placeholders for values.
    pub query: String,
    /// Positional parameters bound to the placeholders, in order
    #[serde(default)]
    pub params: Vec<QueryParam>,
    /// Connection settings for this call only. Omit to use the server's connection.
    #[serde(default)]
    pub db_config: Option<ProfileOverrides>,
}

pub struct QueryToolHandler {
    connection_manager: Arc<PgConnectionManager>,
}

impl QueryToolHandler {
    pub fn new(connection_manager: Arc<PgConnectionManager>) -> Self {
        Self { connection_manager }
    }

    pub async fn execute_query(&self, input: ExecuteQueryInput) -> DbResult<OperationResult> {
        let plan = build_select_passthrough(&input.query, input.params)?;
        let output = classify(plan.text());
        let start = Instant::now();

        match output {
            StatementOutput::Rows => {
                let rows = self
                    .connection_manager
                    .with_connection(input.db_config.as_ref(), move |conn| {
                        Box::pin(async move {
                            let plan = executor::cast_text_parameters(conn, plan).await?;
                            executor::fetch_rows(conn, &plan).await
                        })
                    })
                    .await?;
                info!(
                    row_count = rows.len(),
                    execution_time_ms = start.elapsed().as_millis() as u64,
                    "Query executed"
                );
                Ok(OperationResult::rows(rows))
            }
            StatementOutput::AffectedCount => {
                let affected = self
                    .connection_manager
                    .with_connection(input.db_config.as_ref(), move |conn| {
                        Box::pin(async move {
                            let plan = executor::cast_text_parameters(conn, plan).await?;
                            executor::execute(conn, &plan).await
                        })
                    })
                    .await?;
                info!(
                    affected_count = affected,
                    execution_time_ms = start.elapsed().as_millis() as u64,
                    "Statement executed"
                );
                Ok(OperationResult::affected(affected))
            }
        }
    }
}

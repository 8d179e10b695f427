//! MCP service implementation using rmcp.
//!
//! This module defines the PgService struct with all database tools exposed
//! via the MCP protocol using the rmcp framework's macros. Every tool answers
//! with an `OperationResult`; database failures are reported inside it rather
//! than as protocol errors.

use crate::db::PgConnectionManager;
use crate::models::OperationResult;
use crate::tools::query::{ExecuteQueryInput, QueryToolHandler};
use crate::tools::schema::{
    DescribeTableInput, ListSchemasInput, ListTablesInput, SchemaToolHandler,
};
use crate::tools::write::{CreateTableInput, InsertDataInput, UpdateDataInput, WriteToolHandler};
use rmcp::Json;
use rmcp::{
    ServerHandler,
    handler::server::tool::ToolRouter,
    handler::server::wrapper::Parameters,
    model::{Implementation, ProtocolVersion, ServerCapabilities, ServerInfo},
    tool, tool_handler, tool_router,
};
use std::sync::Arc;
use tracing::warn;

#[derive(Clone)]
pub struct PgService {
    /// Shared connection manager for all database operations
    connection_manager: Arc<PgConnectionManager>,
    /// Tool router for MCP tool dispatch (auto-generated)
    tool_router: ToolRouter<Self>,
}

impl PgService {
    pub fn new(connection_manager: Arc<PgConnectionManager>) -> Self {
        Self {
            connection_manager,
            tool_router: Self::tool_router(),
        }
    }

    fn finish(tool: &str, result: crate::error::DbResult<OperationResult>) -> Json<OperationResult> {
        if let Err(e) = &result {
            warn!(tool, kind = e.kind(), error = %e, "Tool call failed");
        }
        Json(result.into())
    }
}

#[tool_router]
impl PgService {
    #[tool(
        description = "Execute one SQL statement.\nUse $1, $2, ... or %s placeholders and pass values in params.\nSELECT, EXPLAIN, SHOW, VALUES and statements with RETURNING return rows; other statements return affected_count.\nOptional db_config overrides connection settings for this call."
    )]
    async fn execute_query(
        &self,
        Parameters(input): Parameters<ExecuteQueryInput>,
    ) -> Json<OperationResult> {
        let handler = QueryToolHandler::new(self.connection_manager.clone());
        Self::finish("execute_query", handler.execute_query(input).await)
    }

    #[tool(
        description = "List tables and views in a schema (default: public).\nReturns rows of {table_name, table_type}."
    )]
    async fn list_tables(
        &self,
        Parameters(input): Parameters<ListTablesInput>,
    ) -> Json<OperationResult> {
        let handler = SchemaToolHandler::new(self.connection_manager.clone());
        Self::finish("list_tables", handler.list_tables(input).await)
    }

    #[tool(
        description = "Describe the columns of a table.\nReturns rows of {column_name, type, max_length, nullable, default, primary_key} in column order."
    )]
    async fn describe_table(
        &self,
        Parameters(input): Parameters<DescribeTableInput>,
    ) -> Json<OperationResult> {
        let handler = SchemaToolHandler::new(self.connection_manager.clone());
        Self::finish("describe_table", handler.describe_table(input).await)
    }

    #[tool(description = "List non-system schemas in the database, ordered by name.")]
    async fn list_schemas(
        &self,
        Parameters(input): Parameters<ListSchemasInput>,
    ) -> Json<OperationResult> {
        let handler = SchemaToolHandler::new(self.connection_manager.clone());
        Self::finish("list_schemas", handler.list_schemas(input).await)
    }

    #[tool(
        description = "Create a table from column definitions {name, type, nullable, primary_key, default | default_expression}.\nif_not_exists defaults to true."
    )]
    async fn create_table(
        &self,
        Parameters(input): Parameters<CreateTableInput>,
    ) -> Json<OperationResult> {
        let handler = WriteToolHandler::new(self.connection_manager.clone());
        Self::finish("create_table", handler.create_table(input).await)
    }

    #[tool(
        description = "Insert one row object or a list of row objects.\nAll rows must have the same columns. The insert is atomic."
    )]
    async fn insert_data(
        &self,
        Parameters(input): Parameters<InsertDataInput>,
    ) -> Json<OperationResult> {
        let handler = WriteToolHandler::new(self.connection_manager.clone());
        Self::finish("insert_data", handler.insert_data(input).await)
    }

    #[tool(
        description = "Update rows: SET the columns in data WHERE condition.\nCondition placeholders ($1.. or %s) refer to params.\nAn empty condition is rejected unless allow_unconditional is true."
    )]
    async fn update_data(
        &self,
        Parameters(input): Parameters<UpdateDataInput>,
    ) -> Json<OperationResult> {
        let handler = WriteToolHandler::new(self.connection_manager.clone());
        Self::finish("update_data", handler.update_data(input).await)
    }
}

#[tool_handler]
impl ServerHandler for PgService {
    fn get_info(&self) -> ServerInfo {
        ServerInfo {
            protocol_version: ProtocolVersion::V_2025_03_26,
            capabilities: ServerCapabilities::builder().enable_tools().build(),
            server_info: Implementation {
                name: "pg-mcp-server".to_owned(),
                title: Some("PostgreSQL MCP Server".to_owned()),
                version: env!("CARGO_PKG_VERSION").to_owned(),
                icons: None,
                website_url: None,
            },
            instructions: Some(
                "PostgreSQL tools over a single managed connection.\n\
                \n\
                ## Tools\n\
                - `execute_query`: run one statement with bound parameters\n\
                - `list_schemas`, `list_tables`, `describe_table`: inspect the catalog\n\
                - `create_table`, `insert_data`, `update_data`: structured writes\n\
                \n\
                ## Results\n\
                Every tool returns `{success, rows?, row_count?, affected_count?, message?, error?}`.\n\
                On failure `error.kind` is one of config_error, connect_error, validation_error,\n\
                exec_error or internal_error, with the database message and SQLSTATE when available.\n\
                \n\
                ## Per-call connections\n\
                Pass `db_config` ({host, port, user, password, database, connect_timeout_seconds,\n\
                max_retries}) to run one call against a different server or database."
                    .to_string(),
            ),
        }
    }
}

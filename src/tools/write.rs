//! Write operation tools.
//!
//! This module implements the `create_table`, `insert_data` and `update_data`
//! MCP tools. Input is validated and turned into statement plans before a
//! connection is touched.

use crate::config::ProfileOverrides;
use crate::db::executor;
use crate::db::statement::{
    build_create_table, build_insert, build_insert_typed, build_update, build_update_typed,
};
use crate::db::PgConnectionManager;
use crate::error::DbResult;
use crate::models::{ColumnSpec, OperationResult, QueryParam, Row};
use crate::tools::schema::default_schema;
use schemars::JsonSchema;
use serde::Deserialize;
use std::sync::Arc;
use tracing::{debug, info};

fn default_true() -> bool {
    true
}

/// Input for the create_table tool.
#[derive(Debug, Clone, Deserialize, JsonSchema)]
#[serde(deny_unknown_fields)]
pub struct CreateTableInput {
    /// Name of the table to create
    pub table_name: String,
    /// Column definitions, in table order
    pub columns: Vec<ColumnSpec>,
    /// Schema to create the table in. Default: "public"
    #[serde(default = "default_schema")]
    pub schema_name: String,
    /// Succeed without changes when the table already exists. Default: true
    #[serde(default = "default_true")]
    pub if_not_exists: bool,
    /// Connection settings for this call only. Omit to use the server's connection.
    #[serde(default)]
    pub db_config: Option<ProfileOverrides>,
}

/// One row or a list of rows.
#[derive(Debug, Clone, Deserialize, JsonSchema)]
#[serde(untagged)]
pub enum InsertRows {
    One(Row),
    Many(Vec<Row>),
}

impl InsertRows {
    pub fn into_rows(self) -> Vec<Row> {
        match self {
            InsertRows::One(row) => vec![row],
            InsertRows::Many(rows) => rows,
        }
    }
}

/// Input for the insert_data tool.
#[derive(Debug, Clone, Deserialize, JsonSchema)]
#[serde(deny_unknown_fields)]
pub struct InsertDataInput {
    /// Target table
    pub table_name: String,
    /// A row object or a list of row objects; every row must have the same columns
    pub data: InsertRows,
    /// Schema containing the table. Default: "public"
    #[serde(default = "default_schema")]
    pub schema_name: String,
    /// Connection settings for this call only. Omit to use the server's connection.
    #[serde(default)]
    pub db_config: Option<ProfileOverrides>,
}

/// Input for the update_data tool.
#[derive(Debug, Clone, Deserialize, JsonSchema)]
#[serde(deny_unknown_fields)]
pub struct UpdateDataInput {
    /// Target table
    pub table_name: String,
    /// Column values to set
    pub data: Row,
    /// WHERE expression without the WHERE keyword, e.g. "id = $1" or "id = %s"
    #[serde(default)]
    pub condition: String,
    /// Parameters for placeholders in the condition
    #[serde(default)]
    pub params: Vec<QueryParam>,
    /// Schema containing the table. Default: "public"
    #[serde(default = "default_schema")]
    pub schema_name: String,
    /// Allow an empty condition, updating every row. Default: false
    #[serde(default)]
    pub allow_unconditional: bool,
    /// Connection settings for this call only. Omit to use the server's connection.
    #[serde(default)]
    pub db_config: Option<ProfileOverrides>,
}

pub struct WriteToolHandler {
    connection_manager: Arc<PgConnectionManager>,
}

impl WriteToolHandler {
    pub fn new(connection_manager: Arc<PgConnectionManager>) -> Self {
        Self { connection_manager }
    }

    pub async fn create_table(&self, input: CreateTableInput) -> DbResult<OperationResult> {
        let plan = build_create_table(
            &input.schema_name,
            &input.table_name,
            &input.columns,
            input.if_not_exists,
        )?;

        self.connection_manager
            .with_connection(input.db_config.as_ref(), move |conn| {
                Box::pin(async move { executor::execute(conn, &plan).await })
            })
            .await?;

        info!(
            schema = %input.schema_name,
            table = %input.table_name,
            columns = input.columns.len(),
            "Table created"
        );
        Ok(OperationResult::message(format!(
            "Table {}.{} created",
            input.schema_name, input.table_name
        )))
    }

    /// Insert all rows in one transaction.
    ///
    /// Text and NULL values are cast to the table's column types so strings
    /// like `"2024-01-31"` land in date columns.
    pub async fn insert_data(&self, input: InsertDataInput) -> DbResult<OperationResult> {
        let rows = input.data.into_rows();
        let plans = build_insert(&input.schema_name, &input.table_name, &rows)?;
        let schema = input.schema_name.clone();
        let table = input.table_name.clone();

        let affected = self
            .connection_manager
            .with_connection(input.db_config.as_ref(), move |conn| {
                Box::pin(async move {
                    let column_types = executor::fetch_column_types(conn, &schema, &table).await?;
                    let plans = if column_types.is_empty() {
                        plans
                    } else {
                        build_insert_typed(&schema, &table, &rows, &column_types)?
                    };
                    debug!(statements = plans.len(), "Inserting rows");
                    executor::execute_in_transaction(conn, &plans).await
                })
            })
            .await?;

        info!(
            schema = %input.schema_name,
            table = %input.table_name,
            affected_count = affected,
            "Rows inserted"
        );
        Ok(OperationResult::affected(affected).with_message(format!(
            "Inserted {} row(s) into {}.{}",
            affected, input.schema_name, input.table_name
        )))
    }

    pub async fn update_data(&self, input: UpdateDataInput) -> DbResult<OperationResult> {
        let plan = build_update(
            &input.schema_name,
            &input.table_name,
            &input.data,
            &input.condition,
            input.params.clone(),
            input.allow_unconditional,
        )?;
        let UpdateDataInput {
            table_name,
            data,
            condition,
            params,
            schema_name,
            allow_unconditional,
            db_config,
        } = input;
        let (schema, table) = (schema_name.clone(), table_name.clone());

        let affected = self
            .connection_manager
            .with_connection(db_config.as_ref(), move |conn| {
                Box::pin(async move {
                    let column_types = executor::fetch_column_types(conn, &schema, &table).await?;
                    let plan = if column_types.is_empty() {
                        plan
                    } else {
                        build_update_typed(
                            &schema,
                            &table,
                            &data,
                            &condition,
                            params,
                            allow_unconditional,
                            &column_types,
                        )?
                    };
                    let plan = executor::cast_text_parameters(conn, plan).await?;
                    executor::execute(conn, &plan).await
                })
            })
            .await?;

        info!(
            schema = %schema_name,
            table = %table_name,
            affected_count = affected,
            "Rows updated"
        );
        Ok(OperationResult::affected(affected).with_message(format!(
            "Updated {} row(s) in {}.{}",
            affected, schema_name, table_name
        )))
    }
}

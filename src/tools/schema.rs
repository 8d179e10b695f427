//! Schema introspection tools.
//!
//! This module implements the `list_tables`, `describe_table` and
//! `list_schemas` MCP tools. Each runs a fixed catalog query with the caller's
//! names bound as parameters.

use crate::config::ProfileOverrides;
use crate::db::executor;
use crate::db::identifier::validate_identifier;
use crate::db::statement::{StatementPlan, build_catalog_query};
use crate::db::PgConnectionManager;
use crate::error::{DbError, DbResult, ExecErrorKind};
use crate::models::{OperationResult, QueryParam, Row};
use schemars::JsonSchema;
use serde::Deserialize;
use std::sync::Arc;
use tracing::info;

const LIST_TABLES_SQL: &str = "\
SELECT table_name::text AS table_name, table_type::text AS table_type
FROM information_schema.tables
WHERE table_schema = $1
ORDER BY table_name";

const DESCRIBE_TABLE_SQL: &str = "\
SELECT c.column_name::text AS column_name,
       c.data_type::text AS type,
       c.character_maximum_length::int4 AS max_length,
       (c.is_nullable::text = 'YES') AS nullable,
       c.column_default::text AS \"default\",
       EXISTS (
           SELECT 1
           FROM pg_catalog.pg_index i
           JOIN pg_catalog.pg_class cl ON cl.oid = i.indrelid
           JOIN pg_catalog.pg_namespace n ON n.oid = cl.relnamespace
           JOIN pg_catalog.pg_attribute a ON a.attrelid = i.indrelid AND a.attnum = ANY(i.indkey)
           WHERE i.indisprimary
             AND n.nspname = $1
             AND cl.relname = $2
             AND a.attname = c.column_name::text
       ) AS primary_key
FROM information_schema.columns c
WHERE c.table_schema = $1 AND c.table_name = $2
ORDER BY c.ordinal_position";

const LIST_SCHEMAS_SQL: &str = "\
SELECT schema_name::text AS schema_name
FROM information_schema.schemata
WHERE schema_name NOT LIKE 'pg\\_%'
  AND schema_name <> 'information_schema'
ORDER BY schema_name";

pub(crate) fn default_schema() -> String {
    "public".to_string()
}

/// Input for the list_tables tool.
#[derive(Debug, Clone, Deserialize, JsonSchema)]
#[serde(deny_unknown_fields)]
pub struct ListTablesInput {
    /// Schema to list. Default: "public"
    #[serde(default = "default_schema")]
    pub schema_name: String,
    /// Connection settings for this call only. Omit to use the server's connection.
    #[serde(default)]
    pub db_config: Option<ProfileOverrides>,
}

/// Input for the describe_table tool.
#[derive(Debug, Clone, Deserialize, JsonSchema)]
#[serde(deny_unknown_fields)]
pub struct DescribeTableInput {
    /// Table to describe
    pub table_name: String,
    /// Schema containing the table. Default: "public"
    #[serde(default = "default_schema")]
    pub schema_name: String,
    /// Connection settings for this call only. Omit to use the server's connection.
    #[serde(default)]
    pub db_config: Option<ProfileOverrides>,
}

/// Input for the list_schemas tool.
#[derive(Debug, Clone, Default, Deserialize, JsonSchema)]
#[serde(deny_unknown_fields)]
pub struct ListSchemasInput {
    /// Connection settings for this call only. Omit to use the server's connection.
    #[serde(default)]
    pub db_config: Option<ProfileOverrides>,
}

pub struct SchemaToolHandler {
    connection_manager: Arc<PgConnectionManager>,
}

impl SchemaToolHandler {
    pub fn new(connection_manager: Arc<PgConnectionManager>) -> Self {
        Self { connection_manager }
    }

    async fn fetch(
        &self,
        overrides: Option<&ProfileOverrides>,
        plan: StatementPlan,
    ) -> DbResult<Vec<Row>> {
        self.connection_manager
            .with_connection(overrides, move |conn| {
                Box::pin(async move { executor::fetch_rows(conn, &plan).await })
            })
            .await
    }

    /// Tables and views in a schema, `{table_name, table_type}` ordered by name.
    pub async fn list_tables(&self, input: ListTablesInput) -> DbResult<OperationResult> {
        validate_identifier("schema", &input.schema_name)?;
        let plan = build_catalog_query(
            LIST_TABLES_SQL,
            vec![QueryParam::from(input.schema_name.as_str())],
        );
        let rows = self.fetch(input.db_config.as_ref(), plan).await?;

        info!(schema = %input.schema_name, count = rows.len(), "Listed tables");
        Ok(OperationResult::rows(rows))
    }

    /// Columns of a table in ordinal order.
    pub async fn describe_table(&self, input: DescribeTableInput) -> DbResult<OperationResult> {
        validate_identifier("schema", &input.schema_name)?;
        validate_identifier("table", &input.table_name)?;
        let plan = build_catalog_query(
            DESCRIBE_TABLE_SQL,
            vec![
                QueryParam::from(input.schema_name.as_str()),
                QueryParam::from(input.table_name.as_str()),
            ],
        );
        let rows = self.fetch(input.db_config.as_ref(), plan).await?;

        if rows.is_empty() {
            return Err(DbError::exec(
                ExecErrorKind::UndefinedObject,
                format!(
                    "Table {}.{} does not exist or has no columns",
                    input.schema_name, input.table_name
                ),
                None,
            ));
        }

        info!(
            schema = %input.schema_name,
            table = %input.table_name,
            columns = rows.len(),
            "Described table"
        );
        Ok(OperationResult::rows(rows))
    }

    /// Non-system schemas ordered by name.
    pub async fn list_schemas(&self, input: ListSchemasInput) -> DbResult<OperationResult> {
        let plan = build_catalog_query(LIST_SCHEMAS_SQL, Vec::new());
        let rows = self.fetch(input.db_config.as_ref(), plan).await?;

        info!(count = rows.len(), "Listed schemas");
        Ok(OperationResult::rows(rows))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ConnectionProfile;
    use crate::db::sql_scan::scan;
    use crate::db::{ConnectionState, PgConnector};

    fn unreachable_manager() -> Arc<PgConnectionManager> {
        let profile = ConnectionProfile {
            port: 1,
            max_retries: 0,
            ..ConnectionProfile::default()
        };
        Arc::new(PgConnectionManager::new(PgConnector::new(), profile))
    }

    #[test]
    fn test_catalog_queries_have_expected_placeholders() {
        assert_eq!(scan(LIST_TABLES_SQL).placeholder_count().unwrap(), 1);
        assert_eq!(scan(DESCRIBE_TABLE_SQL).placeholder_count().unwrap(), 2);
        assert_eq!(scan(LIST_SCHEMAS_SQL).placeholder_count().unwrap(), 0);
    }

    #[test]
    fn test_schema_name_defaults_to_public() {
        let input: ListTablesInput = serde_json::from_str("{}").unwrap();
        assert_eq!(input.schema_name, "public");

        let input: DescribeTableInput =
            serde_json::from_str(r#"{"table_name": "users"}"#).unwrap();
        assert_eq!(input.schema_name, "public");
        assert_eq!(input.table_name, "users");
    }

    #[test]
    fn test_unknown_fields_rejected() {
        assert!(serde_json::from_str::<ListSchemasInput>(r#"{"bogus": 1}"#).is_err());
    }

    #[tokio::test]
    async fn test_describe_rejects_bad_table_name() {
        let manager = unreachable_manager();
        let handler = SchemaToolHandler::new(manager.clone());
        let err = handler
            .describe_table(DescribeTableInput {
                table_name: "users; DROP TABLE users".to_string(),
                schema_name: default_schema(),
                db_config: None,
            })
            .await
            .unwrap_err();
        assert!(matches!(err, DbError::Validation { .. }));
        assert_eq!(manager.state(), ConnectionState::Absent);
    }

    #[tokio::test]
    async fn test_list_tables_rejects_bad_schema_name() {
        let handler = SchemaToolHandler::new(unreachable_manager());
        let err = handler
            .list_tables(ListTablesInput {
                schema_name: "1schema".to_string(),
                db_config: None,
            })
            .await
            .unwrap_err();
        assert!(matches!(err, DbError::Validation { .. }));
    }
}

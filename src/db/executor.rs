//! Statement execution on a single PostgreSQL connection.
//!
//! Plans without parameters go through the simple query protocol (text
//! results, no prepare step); the rest are sent unprepared via the extended
//! protocol so no server-side statement outlives the call.

use crate::db::identifier::qualified_table;
use crate::db::params::bind_postgres_param;
use crate::db::statement::{ColumnTypes, StatementPlan};
use crate::db::types::RowToJson;
use crate::error::DbResult;
use crate::models::Row as JsonRow;
use sqlx::postgres::{PgArguments, PgConnection};
use sqlx::{Connection, Executor, Postgres, Row, Statement, TypeInfo};
use tracing::{debug, warn};

fn bind_plan(plan: &StatementPlan) -> sqlx::query::Query<'_, Postgres, PgArguments> {
    let mut query = sqlx::query(plan.text()).persistent(false);
    for param in plan.parameters() {
        query = bind_postgres_param(query, param);
    }
    query
}

/// Cast text parameters to the types the server infers for their placeholders.
///
/// Strings are bound as `text`, which has no operators against `uuid`,
/// `date` or `numeric`. Preparing the text with no declared types lets the
/// server report what each placeholder should be. When it cannot (for
/// example `$1 IS NULL` alone), the plan runs unchanged.
pub async fn cast_text_parameters(
    conn: &mut PgConnection,
    plan: StatementPlan,
) -> DbResult<StatementPlan> {
    if !plan.has_text_parameters() {
        return Ok(plan);
    }

    let prepared = (&mut *conn)
        .prepare_with(plan.text(), &[])
        .await
        .map(|statement| {
            statement
                .parameters()
                .and_then(|params| params.left())
                .map(|types| types.iter().map(|t| t.name().to_string()).collect::<Vec<_>>())
                .unwrap_or_default()
        });
    let inferred = match prepared {
        Ok(types) => types,
        Err(e) => {
            debug!(error = %e, "Parameter types could not be inferred");
            return Ok(plan);
        }
    };
    // The cache is keyed by text; an entry with inferred types must not
    // serve a later bind that declares its own.
    conn.clear_cached_statements().await?;

    debug!(types = ?inferred, "Inferred parameter types");
    Ok(plan.with_parameter_casts(&inferred))
}

/// Run a row-returning statement and convert every row to JSON.
pub async fn fetch_rows(conn: &mut PgConnection, plan: &StatementPlan) -> DbResult<Vec<JsonRow>> {
    debug!(
        sql = %plan.text(),
        params = plan.parameters().len(),
        "Executing query"
    );

    let rows = if plan.parameters().is_empty() {
        (&mut *conn).fetch_all(plan.text()).await?
    } else {
        bind_plan(plan).fetch_all(&mut *conn).await?
    };

    debug!(rows = rows.len(), "Query returned rows");
    Ok(rows.iter().map(RowToJson::to_json_map).collect())
}

/// Run a statement and return the number of affected rows.
pub async fn execute(conn: &mut PgConnection, plan: &StatementPlan) -> DbResult<u64> {
    debug!(
        sql = %plan.text(),
        params = plan.parameters().len(),
        "Executing statement"
    );

    let result = if plan.parameters().is_empty() {
        (&mut *conn).execute(plan.text()).await?
    } else {
        bind_plan(plan).execute(&mut *conn).await?
    };
    Ok(result.rows_affected())
}

/// Run every plan in one transaction. Any failure rolls back all of them.
pub async fn execute_in_transaction(
    conn: &mut PgConnection,
    plans: &[StatementPlan],
) -> DbResult<u64> {
    let mut tx = conn.begin().await?;
    let mut affected = 0u64;

    for (index, plan) in plans.iter().enumerate() {
        debug!(
            statement = index + 1,
            of = plans.len(),
            params = plan.parameters().len(),
            "Executing statement in transaction"
        );
        match bind_plan(plan).execute(&mut *tx).await {
            Ok(result) => affected += result.rows_affected(),
            Err(e) => {
                if let Err(rollback_err) = tx.rollback().await {
                    warn!(error = %rollback_err, "Rollback failed");
                }
                return Err(e.into());
            }
        }
    }

    tx.commit().await?;
    Ok(affected)
}

/// Column name to `format_type` rendering for an existing table.
///
/// An unknown table yields an empty map; the statement that follows reports it.
pub async fn fetch_column_types(
    conn: &mut PgConnection,
    schema: &str,
    table: &str,
) -> DbResult<ColumnTypes> {
    let target = qualified_table(schema, table)?;
    let rows = sqlx::query(
        "SELECT a.attname::text AS column_name, \
                format_type(a.atttypid, a.atttypmod) AS data_type \
         FROM pg_catalog.pg_attribute a \
         WHERE a.attrelid = to_regclass($1) AND a.attnum > 0 AND NOT a.attisdropped",
    )
    .persistent(false)
    .bind(target)
    .fetch_all(&mut *conn)
    .await?;

    let mut types = ColumnTypes::with_capacity(rows.len());
    for row in rows {
        let name: String = row.try_get("column_name")?;
        let data_type: String = row.try_get("data_type")?;
        types.insert(name, data_type);
    }
    Ok(types)
}

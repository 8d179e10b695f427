//! Statement plans: SQL text plus the parameters bound to it.
//!
//! Every builder validates its structured input, quotes identifiers and
//! places caller values in the parameter list, never in the text. Column
//! types and default expressions are the only caller strings that reach the
//! text, and both are checked against conservative patterns first.

use crate::db::identifier::{qualified_table, quote_identifier};
use crate::db::sql_scan::scan;
use crate::error::{DbError, DbResult};
use crate::models::{ColumnSpec, QueryParam, Row};
use serde_json::Value as JsonValue;
use std::collections::{HashMap, HashSet};

/// PostgreSQL's limit on bind parameters per statement.
pub const MAX_BIND_PARAMS: usize = 65535;

/// Server-reported column types, keyed by column name.
pub type ColumnTypes = HashMap<String, String>;

/// SQL text paired with its ordered parameters.
///
/// `parameters().len()` always equals the number of placeholders in `text()`.
#[derive(Debug, Clone, PartialEq)]
pub struct StatementPlan {
    text: String,
    parameters: Vec<QueryParam>,
}

impl StatementPlan {
    fn new(text: String, parameters: Vec<QueryParam>) -> Self {
        Self { text, parameters }
    }

    pub fn text(&self) -> &str {
        &self.text
    }

    pub fn parameters(&self) -> &[QueryParam] {
        &self.parameters
    }

    /// True when any parameter is sent as text.
    pub fn has_text_parameters(&self) -> bool {
        self.parameters
            .iter()
            .any(|p| matches!(p, QueryParam::String(_)))
    }

    /// Cast text parameters to the types the server inferred for them.
    ///
    /// `inferred[i]` names the type of `$i+1`. Placeholders that already
    /// carry a `::` cast, textual types and names that are not plain type
    /// names are left untouched.
    pub fn with_parameter_casts(self, inferred: &[String]) -> StatementPlan {
        let scanned = scan(&self.text);
        let mut text = String::with_capacity(self.text.len() + 16);
        let mut cursor = 0;

        for (start, end, n) in scanned.positional_spans() {
            let Some(param) = n.checked_sub(1).and_then(|i| self.parameters.get(i)) else {
                continue;
            };
            let Some(ty) = inferred.get(n - 1).filter(|ty| needs_cast(ty)) else {
                continue;
            };
            if !matches!(param, QueryParam::String(_)) || self.text[end..].starts_with("::") {
                continue;
            }
            text.push_str(&self.text[cursor..start]);
            text.push_str(&placeholder(n, param, Some(ty)));
            cursor = end;
        }
        text.push_str(&self.text[cursor..]);

        StatementPlan::new(text, self.parameters)
    }
}

/// Pass caller SQL through after checking shape and parameter count.
///
/// `%s` markers are rewritten to `$1..$n`; a single trailing `;` is allowed.
pub fn build_select_passthrough(query_text: &str, params: Vec<QueryParam>) -> DbResult<StatementPlan> {
    if query_text.trim().is_empty() {
        return Err(DbError::validation("Query must not be empty"));
    }

    let scanned = scan(query_text);
    if scanned.has_multiple_statements() {
        return Err(DbError::validation(
            "Multiple statements are not supported; send one statement per call",
        ));
    }

    let (text, expected) = scanned.renumber(0, true)?;
    if text.trim().is_empty() {
        return Err(DbError::validation("Query must not be empty"));
    }
    // An unterminated literal hides placeholders; let the server report it.
    if scanned.is_complete() && expected != params.len() {
        return Err(DbError::validation(format!(
            "Query expects {} parameter(s) but {} were given",
            expected,
            params.len()
        )));
    }

    Ok(StatementPlan::new(text, params))
}

/// A fixed catalog query whose text is part of the server; only `params` come from callers.
pub fn build_catalog_query(text: &'static str, params: Vec<QueryParam>) -> StatementPlan {
    debug_assert_eq!(
        scan(text).placeholder_count().ok(),
        Some(params.len()),
        "catalog query placeholder count"
    );
    StatementPlan::new(text.to_string(), params)
}

/// `CREATE TABLE [IF NOT EXISTS] "schema"."table" (...)`.
pub fn build_create_table(
    schema: &str,
    table: &str,
    columns: &[ColumnSpec],
    if_not_exists: bool,
) -> DbResult<StatementPlan> {
    let target = qualified_table(schema, table)?;
    if columns.is_empty() {
        return Err(DbError::validation("A table needs at least one column"));
    }

    let mut seen = HashSet::new();
    let mut clauses = Vec::with_capacity(columns.len() + 1);
    let mut primary_keys = Vec::new();

    for column in columns {
        let name = quote_identifier("column", &column.name)?;
        if !seen.insert(column.name.as_str()) {
            return Err(DbError::validation(format!(
                "Duplicate column name '{}'",
                column.name
            )));
        }
        validate_column_type(&column.data_type)?;

        let mut clause = format!("{} {}", name, column.data_type.trim());
        if !column.nullable {
            clause.push_str(" NOT NULL");
        }
        match (&column.default, &column.default_expression) {
            (Some(_), Some(_)) => {
                return Err(DbError::validation(format!(
                    "Column '{}' sets both default and default_expression",
                    column.name
                )));
            }
            (Some(value), None) => {
                clause.push_str(" DEFAULT ");
                clause.push_str(&render_default_literal(&column.name, value)?);
            }
            (None, Some(expr)) => {
                clause.push_str(" DEFAULT ");
                clause.push_str(&validate_default_expression(&column.name, expr)?);
            }
            (None, None) => {}
        }
        clauses.push(clause);

        if column.primary_key {
            primary_keys.push(name);
        }
    }

    if !primary_keys.is_empty() {
        clauses.push(format!("PRIMARY KEY ({})", primary_keys.join(", ")));
    }

    let text = format!(
        "CREATE TABLE {}{} ({})",
        if if_not_exists { "IF NOT EXISTS " } else { "" },
        target,
        clauses.join(", ")
    );
    Ok(StatementPlan::new(text, Vec::new()))
}

/// Multi-row `INSERT`, chunked to stay under the bind parameter limit.
pub fn build_insert(schema: &str, table: &str, rows: &[Row]) -> DbResult<Vec<StatementPlan>> {
    build_insert_typed(schema, table, rows, &ColumnTypes::new())
}

/// Like [`build_insert`], casting text and NULL parameters to the known column types.
pub fn build_insert_typed(
    schema: &str,
    table: &str,
    rows: &[Row],
    column_types: &ColumnTypes,
) -> DbResult<Vec<StatementPlan>> {
    let target = qualified_table(schema, table)?;
    let first = rows
        .first()
        .ok_or_else(|| DbError::validation("No rows to insert"))?;
    if first.is_empty() {
        return Err(DbError::validation("Rows to insert must not be empty"));
    }

    let columns: Vec<&String> = first.keys().collect();
    let quoted = columns
        .iter()
        .map(|c| quote_identifier("column", c))
        .collect::<DbResult<Vec<_>>>()?;

    for (index, row) in rows.iter().enumerate().skip(1) {
        if row.len() != columns.len() || !columns.iter().all(|c| row.contains_key(c.as_str())) {
            return Err(DbError::schema_mismatch(format!(
                "Row {} has columns [{}] but the first row has [{}]",
                index + 1,
                row.keys().map(String::as_str).collect::<Vec<_>>().join(", "),
                columns.iter().map(|c| c.as_str()).collect::<Vec<_>>().join(", ")
            )));
        }
    }

    if columns.len() > MAX_BIND_PARAMS {
        return Err(DbError::validation(format!(
            "Too many columns ({}) for one statement",
            columns.len()
        )));
    }
    let rows_per_chunk = MAX_BIND_PARAMS / columns.len();
    let header = format!("INSERT INTO {} ({}) VALUES ", target, quoted.join(", "));

    let mut plans = Vec::with_capacity(rows.len().div_ceil(rows_per_chunk));
    for chunk in rows.chunks(rows_per_chunk) {
        let mut text = header.clone();
        let mut parameters = Vec::with_capacity(chunk.len() * columns.len());
        for (row_index, row) in chunk.iter().enumerate() {
            if row_index > 0 {
                text.push_str(", ");
            }
            text.push('(');
            for (col_index, column) in columns.iter().enumerate() {
                if col_index > 0 {
                    text.push_str(", ");
                }
                let value = row.get(column.as_str()).cloned().unwrap_or(JsonValue::Null);
                let param = QueryParam::from(value);
                text.push_str(&placeholder(parameters.len() + 1, &param, column_types.get(column.as_str())));
                parameters.push(param);
            }
            text.push(')');
        }
        plans.push(StatementPlan::new(text, parameters));
    }
    Ok(plans)
}

/// `UPDATE "schema"."table" SET ... WHERE condition`.
///
/// SET values take `$1..$k`; placeholders in `condition` (either `$n` relative
/// to `condition_params` or `%s`) are shifted to follow them.
pub fn build_update(
    schema: &str,
    table: &str,
    data: &Row,
    condition: &str,
    condition_params: Vec<QueryParam>,
    allow_unconditional: bool,
) -> DbResult<StatementPlan> {
    build_update_typed(
        schema,
        table,
        data,
        condition,
        condition_params,
        allow_unconditional,
        &ColumnTypes::new(),
    )
}

/// Like [`build_update`], casting text and NULL SET values to the known column types.
pub fn build_update_typed(
    schema: &str,
    table: &str,
    data: &Row,
    condition: &str,
    condition_params: Vec<QueryParam>,
    allow_unconditional: bool,
    column_types: &ColumnTypes,
) -> DbResult<StatementPlan> {
    let target = qualified_table(schema, table)?;
    if data.is_empty() {
        return Err(DbError::validation("No columns to update"));
    }

    let mut parameters = Vec::with_capacity(data.len() + condition_params.len());
    let mut assignments = Vec::with_capacity(data.len());
    for (column, value) in data {
        let name = quote_identifier("column", column)?;
        let param = QueryParam::from(value.clone());
        assignments.push(format!(
            "{} = {}",
            name,
            placeholder(parameters.len() + 1, &param, column_types.get(column.as_str()))
        ));
        parameters.push(param);
    }

    let mut text = format!("UPDATE {} SET {}", target, assignments.join(", "));

    if condition.trim().is_empty() {
        if !allow_unconditional {
            return Err(DbError::validation(
                "An update needs a condition; set allow_unconditional to update every row",
            ));
        }
        if !condition_params.is_empty() {
            return Err(DbError::validation(
                "Parameters were given for an empty condition",
            ));
        }
        return Ok(StatementPlan::new(text, parameters));
    }

    let scanned = scan(condition);
    if scanned.separator_count() > 0 {
        return Err(DbError::validation(
            "Condition must be a single expression without ';'",
        ));
    }
    if !scanned.is_complete() {
        return Err(DbError::validation(
            "Condition has an unterminated literal or comment",
        ));
    }
    let (condition_text, expected) = scanned.renumber(parameters.len(), false)?;
    if expected != condition_params.len() {
        return Err(DbError::validation(format!(
            "Condition expects {} parameter(s) but {} were given",
            expected,
            condition_params.len()
        )));
    }

    text.push_str(" WHERE ");
    text.push_str(condition_text.trim());
    parameters.extend(condition_params);
    Ok(StatementPlan::new(text, parameters))
}

/// Text already compares with these; `char` without a length would truncate.
const TEXTUAL_TYPES: &[&str] = &["text", "varchar", "char", "bpchar", "name", "unknown"];

fn needs_cast(type_name: &str) -> bool {
    !TEXTUAL_TYPES.contains(&type_name.to_ascii_lowercase().as_str())
        && validate_column_type(type_name).is_ok()
}

fn placeholder(index: usize, param: &QueryParam, column_type: Option<&String>) -> String {
    match (param, column_type) {
        (QueryParam::String(_) | QueryParam::Null, Some(ty)) => format!("${index}::{ty}"),
        _ => format!("${index}"),
    }
}

/// Accept type names like `integer`, `varchar(255)`, `numeric(10, 2)`,
/// `timestamp with time zone` and `text[]`.
pub fn validate_column_type(data_type: &str) -> DbResult<()> {
    let invalid = || {
        DbError::validation(format!(
            "Invalid column type '{data_type}': use a type name with optional (n[, m]) modifiers and [] suffixes"
        ))
    };

    let mut base = data_type.trim();
    if base.is_empty() {
        return Err(DbError::validation("Column type must not be empty"));
    }
    if base.len() > 128 {
        return Err(invalid());
    }
    while let Some(rest) = base.strip_suffix("[]") {
        base = rest.trim_end();
    }
    if !base.starts_with(|c: char| c.is_ascii_alphabetic()) {
        return Err(invalid());
    }

    let mut in_parens = false;
    for c in base.chars() {
        match c {
            '(' if !in_parens => in_parens = true,
            ')' if in_parens => in_parens = false,
            c if in_parens && (c.is_ascii_digit() || c == ',' || c == ' ') => {}
            c if !in_parens && (c.is_ascii_alphanumeric() || c == '_' || c == ' ') => {}
            _ => return Err(invalid()),
        }
    }
    if in_parens {
        return Err(invalid());
    }
    Ok(())
}

fn render_default_literal(column: &str, value: &JsonValue) -> DbResult<String> {
    match value {
        JsonValue::Null => Ok("NULL".to_string()),
        JsonValue::Bool(b) => Ok(if *b { "TRUE" } else { "FALSE" }.to_string()),
        JsonValue::Number(n) => Ok(n.to_string()),
        JsonValue::String(s) if s.contains('\\') => Ok(format!(
            "E'{}'",
            s.replace('\\', "\\\\").replace('\'', "''")
        )),
        JsonValue::String(s) => Ok(format!("'{}'", s.replace('\'', "''"))),
        JsonValue::Array(_) | JsonValue::Object(_) => Err(DbError::validation(format!(
            "Default for column '{column}' must be a number, boolean, string or null"
        ))),
    }
}

/// A keyword or function call without arguments, or a signed number.
fn validate_default_expression(column: &str, expr: &str) -> DbResult<String> {
    let expr = expr.trim();
    let invalid = || {
        DbError::validation(format!(
            "Unsupported default expression for column '{column}': '{expr}'. Use a literal default, a keyword such as CURRENT_TIMESTAMP, a call such as now(), or a number"
        ))
    };

    let unsigned = expr.strip_prefix(['+', '-']).unwrap_or(expr);
    let is_number = !unsigned.is_empty()
        && unsigned.chars().filter(|&c| c == '.').count() <= 1
        && unsigned.chars().all(|c| c.is_ascii_digit() || c == '.')
        && unsigned.chars().any(|c| c.is_ascii_digit());
    if is_number {
        return Ok(expr.to_string());
    }

    let name = expr
        .strip_suffix("()")
        .map(str::trim_end)
        .unwrap_or(expr);
    let mut chars = name.chars();
    let starts_ok = chars
        .next()
        .is_some_and(|c| c.is_ascii_alphabetic() || c == '_');
    if starts_ok && chars.all(|c| c.is_ascii_alphanumeric() || c == '_') && name.len() <= 63 {
        Ok(expr.to_string())
    } else {
        Err(invalid())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn row(value: JsonValue) -> Row {
        match value {
            JsonValue::Object(map) => map,
            _ => panic!("row must be an object"),
        }
    }

    fn placeholders(plan: &StatementPlan) -> usize {
        scan(plan.text()).placeholder_count().unwrap()
    }

    #[test]
    fn test_passthrough_counts_and_accepts() {
        let plan = build_select_passthrough(
            "SELECT * FROM users WHERE id = $1",
            vec![QueryParam::Int(1)],
        )
        .unwrap();
        assert_eq!(plan.text(), "SELECT * FROM users WHERE id = $1");
        assert_eq!(plan.parameters().len(), placeholders(&plan));
    }

    #[test]
    fn test_passthrough_param_count_mismatch() {
        let result = build_select_passthrough("SELECT $1, $2", vec![QueryParam::Int(1)]);
        assert!(matches!(result, Err(DbError::Validation { .. })));

        let result = build_select_passthrough("SELECT 1", vec![QueryParam::Int(1)]);
        assert!(matches!(result, Err(DbError::Validation { .. })));
    }

    #[test]
    fn test_passthrough_rewrites_format_markers() {
        let plan = build_select_passthrough(
            "SELECT * FROM t WHERE name LIKE %s AND note = '100%%';",
            vec![QueryParam::from("a%")],
        )
        .unwrap();
        assert_eq!(plan.text(), "SELECT * FROM t WHERE name LIKE $1 AND note = '100%'");
    }

    #[test]
    fn test_passthrough_rejects_empty_and_multi_statement() {
        assert!(build_select_passthrough("   ", vec![]).is_err());
        assert!(build_select_passthrough(";", vec![]).is_err());
        assert!(build_select_passthrough("SELECT 1; DROP TABLE users", vec![]).is_err());
        assert!(build_select_passthrough("SELECT 1;", vec![]).is_ok());
    }

    #[test]
    fn test_create_table_shape() {
        let columns = vec![
            ColumnSpec::new("id", "serial").primary_key(),
            ColumnSpec::new("email", "varchar(255)").not_null(),
            ColumnSpec::new("active", "boolean").with_default(json!(true)),
            ColumnSpec::new("created_at", "timestamp with time zone")
                .with_default_expression("CURRENT_TIMESTAMP"),
        ];
        let plan = build_create_table("public", "users", &columns, true).unwrap();
        assert_eq!(
            plan.text(),
            "CREATE TABLE IF NOT EXISTS \"public\".\"users\" (\"id\" serial, \
             \"email\" varchar(255) NOT NULL, \"active\" boolean DEFAULT TRUE, \
             \"created_at\" timestamp with time zone DEFAULT CURRENT_TIMESTAMP, \
             PRIMARY KEY (\"id\"))"
        );
        assert!(plan.parameters().is_empty());
    }

    #[test]
    fn test_create_table_composite_key_in_order() {
        let columns = vec![
            ColumnSpec::new("tenant", "integer").primary_key(),
            ColumnSpec::new("note", "text"),
            ColumnSpec::new("id", "bigint").primary_key(),
        ];
        let plan = build_create_table("app", "notes", &columns, false).unwrap();
        assert!(plan.text().starts_with("CREATE TABLE \"app\".\"notes\""));
        assert!(plan.text().ends_with("PRIMARY KEY (\"tenant\", \"id\"))"));
    }

    #[test]
    fn test_create_table_rejects_bad_input() {
        assert!(build_create_table("public", "t", &[], true).is_err());
        assert!(
            build_create_table(
                "public",
                "t",
                &[ColumnSpec::new("a", "int"), ColumnSpec::new("a", "text")],
                true
            )
            .is_err()
        );
        assert!(build_create_table("public", "t; DROP", &[ColumnSpec::new("a", "int")], true).is_err());
        assert!(build_create_table("public", "t", &[ColumnSpec::new("a", "int); DROP TABLE x; --")], true).is_err());
        assert!(
            build_create_table(
                "public",
                "t",
                &[ColumnSpec::new("a", "int").with_default_expression("1); DROP TABLE x")],
                true
            )
            .is_err()
        );
    }

    #[test]
    fn test_default_literal_escaping() {
        let plan = build_create_table(
            "public",
            "t",
            &[ColumnSpec::new("note", "text").with_default(json!("it's"))],
            true,
        )
        .unwrap();
        assert!(plan.text().contains("DEFAULT 'it''s'"));

        let plan = build_create_table(
            "public",
            "t",
            &[ColumnSpec::new("path", "text").with_default(json!("C:\\tmp"))],
            true,
        )
        .unwrap();
        assert!(plan.text().contains("DEFAULT E'C:\\\\tmp'"));
    }

    #[test]
    fn test_column_type_pattern() {
        for ok in [
            "integer",
            "varchar(255)",
            "numeric(10, 2)",
            "double precision",
            "text[]",
            "integer[][]",
            "timestamp(3) with time zone",
        ] {
            assert!(validate_column_type(ok).is_ok(), "{ok}");
        }
        for bad in ["", "1int", "text'", "int;", "int -- x", "numeric((1))", "varchar(255", "int/*"] {
            assert!(validate_column_type(bad).is_err(), "{bad}");
        }
    }

    #[test]
    fn test_default_expressions() {
        assert!(validate_default_expression("c", "now()").is_ok());
        assert!(validate_default_expression("c", "gen_random_uuid()").is_ok());
        assert!(validate_default_expression("c", "-1.5").is_ok());
        assert!(validate_default_expression("c", "CURRENT_DATE").is_ok());
        assert!(validate_default_expression("c", "now() + 1").is_err());
        assert!(validate_default_expression("c", "pg_sleep(10)").is_err());
        assert!(validate_default_expression("c", "").is_err());
    }

    #[test]
    fn test_insert_single_row() {
        let rows = vec![row(json!({"name": "Alice", "age": 30}))];
        let plans = build_insert("public", "users", &rows).unwrap();
        assert_eq!(plans.len(), 1);
        assert_eq!(
            plans[0].text(),
            "INSERT INTO \"public\".\"users\" (\"name\", \"age\") VALUES ($1, $2)"
        );
        assert_eq!(
            plans[0].parameters(),
            &[QueryParam::from("Alice"), QueryParam::Int(30)]
        );
    }

    #[test]
    fn test_insert_multi_row_uses_first_row_order() {
        let rows = vec![
            row(json!({"a": 1, "b": 2})),
            row(json!({"b": 4, "a": 3})),
        ];
        let plans = build_insert("public", "t", &rows).unwrap();
        assert_eq!(
            plans[0].text(),
            "INSERT INTO \"public\".\"t\" (\"a\", \"b\") VALUES ($1, $2), ($3, $4)"
        );
        assert_eq!(
            plans[0].parameters(),
            &[
                QueryParam::Int(1),
                QueryParam::Int(2),
                QueryParam::Int(3),
                QueryParam::Int(4)
            ]
        );
        assert_eq!(plans[0].parameters().len(), placeholders(&plans[0]));
    }

    #[test]
    fn test_insert_mismatched_keys() {
        let rows = vec![row(json!({"a": 1, "b": 2})), row(json!({"a": 1, "c": 2}))];
        assert!(matches!(
            build_insert("public", "t", &rows),
            Err(DbError::SchemaMismatch { .. })
        ));

        let rows = vec![row(json!({"a": 1})), row(json!({"a": 1, "b": 2}))];
        assert!(matches!(
            build_insert("public", "t", &rows),
            Err(DbError::SchemaMismatch { .. })
        ));
    }

    #[test]
    fn test_insert_rejects_empty() {
        assert!(build_insert("public", "t", &[]).is_err());
        assert!(build_insert("public", "t", &[Row::new()]).is_err());
        assert!(build_insert("public", "t", &[row(json!({"bad col": 1}))]).is_err());
    }

    #[test]
    fn test_insert_chunks_at_parameter_limit() {
        let rows: Vec<Row> = (0..40_000)
            .map(|i| row(json!({"a": i, "b": i})))
            .collect();
        let plans = build_insert("public", "t", &rows).unwrap();
        assert_eq!(plans.len(), 2);
        assert_eq!(plans[0].parameters().len(), 65534);
        assert_eq!(plans[1].parameters().len(), 80_000 - 65534);
        for plan in &plans {
            assert!(plan.parameters().len() <= MAX_BIND_PARAMS);
            assert_eq!(plan.parameters().len(), placeholders(plan));
        }
    }

    #[test]
    fn test_insert_casts_text_to_known_types() {
        let rows = vec![row(json!({"born": "2020-01-01", "n": 1, "note": null}))];
        let types: ColumnTypes = [
            ("born".to_string(), "date".to_string()),
            ("n".to_string(), "integer".to_string()),
            ("note".to_string(), "text".to_string()),
        ]
        .into_iter()
        .collect();
        let plans = build_insert_typed("public", "t", &rows, &types).unwrap();
        assert!(plans[0].text().ends_with("VALUES ($1::date, $2, $3::text)"));
    }

    #[test]
    fn test_update_shifts_condition_params() {
        let data = row(json!({"name": "Bob", "age": 31}));
        let plan = build_update(
            "public",
            "users",
            &data,
            "id = $1 AND org = $2",
            vec![QueryParam::Int(7), QueryParam::Int(9)],
            false,
        )
        .unwrap();
        assert_eq!(
            plan.text(),
            "UPDATE \"public\".\"users\" SET \"name\" = $1, \"age\" = $2 WHERE id = $3 AND org = $4"
        );
        assert_eq!(
            plan.parameters(),
            &[
                QueryParam::from("Bob"),
                QueryParam::Int(31),
                QueryParam::Int(7),
                QueryParam::Int(9)
            ]
        );
    }

    #[test]
    fn test_update_with_format_condition() {
        let data = row(json!({"active": false}));
        let plan = build_update("public", "users", &data, "id = %s", vec![QueryParam::Int(3)], false)
            .unwrap();
        assert!(plan.text().ends_with("SET \"active\" = $1 WHERE id = $2"));
        assert_eq!(plan.parameters().len(), placeholders(&plan));
    }

    #[test]
    fn test_update_requires_condition_unless_allowed() {
        let data = row(json!({"active": false}));
        assert!(matches!(
            build_update("public", "users", &data, "  ", vec![], false),
            Err(DbError::Validation { .. })
        ));
        let plan = build_update("public", "users", &data, "", vec![], true).unwrap();
        assert_eq!(plan.text(), "UPDATE \"public\".\"users\" SET \"active\" = $1");
    }

    #[test]
    fn test_parameter_casts_follow_inferred_types() {
        let plan = build_select_passthrough(
            "SELECT * FROM t WHERE id = %s AND born < %s AND name = %s AND n > %s",
            vec![
                QueryParam::from("0b0c6f0e-0000-4000-8000-000000000001"),
                QueryParam::from("2000-01-01"),
                QueryParam::from("alice"),
                QueryParam::Int(3),
            ],
        )
        .unwrap();
        assert!(plan.has_text_parameters());

        let inferred = ["UUID", "DATE", "TEXT", "INT4"].map(String::from);
        let cast = plan.with_parameter_casts(&inferred);
        assert_eq!(
            cast.text(),
            "SELECT * FROM t WHERE id = $1::UUID AND born < $2::DATE AND name = $3 AND n > $4"
        );
        assert_eq!(cast.parameters().len(), 4);
    }

    #[test]
    fn test_parameter_casts_skip_existing_casts_and_odd_names() {
        let plan = build_update_typed(
            "public",
            "people",
            &row(json!({"born": "1990-01-01"})),
            "code = $1 AND flag = $2",
            vec![QueryParam::from("x"), QueryParam::from("y")],
            false,
            &ColumnTypes::from([("born".to_string(), "date".to_string())]),
        )
        .unwrap();
        let inferred = ["date", "\"char\"", "NUMERIC"].map(String::from);
        let cast = plan.with_parameter_casts(&inferred);
        assert_eq!(
            cast.text(),
            "UPDATE \"public\".\"people\" SET \"born\" = $1::date WHERE code = $2 AND flag = $3::NUMERIC"
        );
    }

    #[test]
    fn test_plan_without_text_parameters() {
        let plan = build_select_passthrough("SELECT $1", vec![QueryParam::Int(1)]).unwrap();
        assert!(!plan.has_text_parameters());
        assert_eq!(plan.clone().with_parameter_casts(&["INT8".to_string()]), plan);
    }

    #[test]
    fn test_update_rejects_bad_condition() {
        let data = row(json!({"a": 1}));
        assert!(build_update("public", "t", &data, "id = 1; DROP TABLE t", vec![], false).is_err());
        assert!(build_update("public", "t", &data, "id = 1;", vec![], false).is_err());
        assert!(build_update("public", "t", &data, "id = $1", vec![], false).is_err());
        assert!(build_update("public", "t", &Row::new(), "id = 1", vec![], false).is_err());
        assert!(build_update("public", "t", &data, "id = $1 OR id = %s", vec![QueryParam::Int(1)], false).is_err());
    }
}

//! The uniform result shape returned by every operation.

use crate::error::DbError;
use crate::models::Row;
use serde::Serialize;

/// Serializable projection of a [`DbError`].
#[derive(Debug, Clone, PartialEq, Serialize, schemars::JsonSchema)]
pub struct ErrorInfo {
    /// config_error, connect_error, validation_error, exec_error or internal_error
    pub kind: String,
    /// Sub-classification, e.g. "auth_failed" or "constraint_violation"
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
    pub detail: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub sql_state: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub suggestion: Option<String>,
}

impl From<&DbError> for ErrorInfo {
    fn from(err: &DbError) -> Self {
        Self {
            kind: err.kind().to_string(),
            reason: err.reason().map(String::from),
            detail: err.to_string(),
            sql_state: err.sql_state().map(String::from),
            suggestion: err.suggestion().map(String::from),
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, schemars::JsonSchema)]
pub struct OperationResult {
    pub success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub rows: Option<Vec<Row>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub row_count: Option<usize>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub affected_count: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<ErrorInfo>,
}

impl OperationResult {
    /// A successful row-returning result.
    pub fn rows(rows: Vec<Row>) -> Self {
        Self {
            success: true,
            row_count: Some(rows.len()),
            rows: Some(rows),
            ..Default::default()
        }
    }

    /// A successful write result.
    pub fn affected(count: u64) -> Self {
        Self {
            success: true,
            affected_count: Some(count),
            ..Default::default()
        }
    }

    /// A successful result carrying only a message.
    pub fn message(message: impl Into<String>) -> Self {
        Self {
            success: true,
            message: Some(message.into()),
            ..Default::default()
        }
    }

    pub fn with_message(mut self, message: impl Into<String>) -> Self {
        self.message = Some(message.into());
        self
    }

    pub fn failure(err: &DbError) -> Self {
        Self {
            success: false,
            error: Some(ErrorInfo::from(err)),
            ..Default::default()
        }
    }
}

impl From<Result<OperationResult, DbError>> for OperationResult {
    fn from(result: Result<OperationResult, DbError>) -> Self {
        result.unwrap_or_else(|e| Self::failure(&e))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::{ConnectErrorKind, ExecErrorKind};
    use serde_json::json;

    #[test]
    fn test_rows_result_serialization() {
        let mut row = Row::new();
        row.insert("id".into(), json!(1));
        let value = serde_json::to_value(OperationResult::rows(vec![row])).unwrap();
        assert_eq!(
            value,
            json!({"success": true, "rows": [{"id": 1}], "row_count": 1})
        );
    }

    #[test]
    fn test_affected_result_serialization() {
        let value =
            serde_json::to_value(OperationResult::affected(3).with_message("3 rows updated"))
                .unwrap();
        assert_eq!(
            value,
            json!({"success": true, "affected_count": 3, "message": "3 rows updated"})
        );
    }

    #[test]
    fn test_failure_carries_error_info() {
        let err = DbError::exec(
            ExecErrorKind::UndefinedObject,
            "relation \"nope\" does not exist",
            Some("42P01".into()),
        );
        let result = OperationResult::failure(&err);
        assert!(!result.success);
        let info = result.error.unwrap();
        assert_eq!(info.kind, "exec_error");
        assert_eq!(info.reason.as_deref(), Some("undefined_object"));
        assert_eq!(info.sql_state.as_deref(), Some("42P01"));
        assert!(info.detail.contains("nope"));
    }

    #[test]
    fn test_connect_failure_projection() {
        let err = DbError::connect(ConnectErrorKind::AuthFailed, "password authentication failed");
        let info = ErrorInfo::from(&err);
        assert_eq!(info.kind, "connect_error");
        assert_eq!(info.reason.as_deref(), Some("auth_failed"));
        assert!(info.suggestion.is_some());
        assert!(info.sql_state.is_none());
    }

    #[test]
    fn test_from_result() {
        let ok: OperationResult = Ok(OperationResult::message("done")).into();
        assert!(ok.success);
        let err: OperationResult = Err(DbError::validation("empty")).into();
        assert!(!err.success);
        assert_eq!(err.error.unwrap().kind, "validation_error");
    }
}

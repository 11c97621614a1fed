use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use sea_orm::{DbErr, SqlErr};
use serde::Serialize;
use thiserror::Error;

/// Why a write was refused because of existing state
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum Conflict {
    #[error("a category named '{name}' already exists under {}", parent_label(.parent_id))]
    DuplicateName { parent_id: Option<i64>, name: String },

    #[error("category {id} has {count} subcategories")]
    HasChildren { id: i64, count: u64 },

    #[error("category {id} has {count} dependent products")]
    HasProducts { id: i64, count: u64 },

    #[error("unique constraint violated: {0}")]
    UniqueViolation(String),
}

/// Structural changes the tree cannot accept
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum InvalidOperation {
    #[error("circular reference: category {parent_id} cannot become the parent of category {id}")]
    CircularReference { id: i64, parent_id: i64 },

    #[error("unsupported bulk operation '{0}'")]
    UnsupportedBulkOperation(String),
}

fn parent_label(parent_id: &Option<i64>) -> String {
    match parent_id {
        Some(id) => format!("category {}", id),
        None => "the root".to_string(),
    }
}

/// Application error types
#[derive(Error, Debug)]
pub enum AppError {
    #[error("{entity} not found: {id}")]
    NotFound { entity: &'static str, id: i64 },

    #[error("Conflict: {0}")]
    Conflict(#[from] Conflict),

    #[error("Invalid operation: {0}")]
    InvalidOperation(#[from] InvalidOperation),

    #[error("Validation error on '{field}': {message}")]
    Validation { field: &'static str, message: String },

    #[error("Database error: {0}")]
    Database(DbErr),

    #[error("Internal server error: {0}")]
    Internal(String),
}

impl AppError {
    pub fn validation(field: &'static str, message: impl Into<String>) -> Self {
        AppError::Validation {
            field,
            message: message.into(),
        }
    }

    /// Stable machine-readable discriminator sent to clients
    pub fn code(&self) -> &'static str {
        match self {
            AppError::NotFound { .. } => "NOT_FOUND",
            AppError::Conflict(_) => "CONFLICT",
            AppError::InvalidOperation(_) => "INVALID_OPERATION",
            AppError::Validation { .. } => "VALIDATION_ERROR",
            AppError::Database(_) | AppError::Internal(_) => "INTERNAL_ERROR",
        }
    }

    pub fn status(&self) -> StatusCode {
        match self {
            AppError::NotFound { .. } => StatusCode::NOT_FOUND,
            AppError::Conflict(_) => StatusCode::CONFLICT,
            AppError::InvalidOperation(_) | AppError::Validation { .. } => StatusCode::BAD_REQUEST,
            AppError::Database(_) | AppError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

/// Unique violations raised by the storage layer are the same conflict the
/// service pre-checks for; everything else is an internal failure.
impl From<DbErr> for AppError {
    fn from(err: DbErr) -> Self {
        match err.sql_err() {
            Some(SqlErr::UniqueConstraintViolation(detail)) => {
                AppError::Conflict(Conflict::UniqueViolation(detail))
            }
            _ => AppError::Database(err),
        }
    }
}

/// Error response body
#[derive(Serialize)]
struct ErrorResponse {
    code: &'static str,
    status: u16,
    message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    details: Option<serde_json::Value>,
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let status = self.status();
        let (message, details) = match &self {
            AppError::NotFound { entity, id } => (
                self.to_string(),
                Some(serde_json::json!({ "entity": entity, "id": id })),
            ),
            AppError::Conflict(Conflict::DuplicateName { parent_id, name }) => (
                self.to_string(),
                Some(serde_json::json!({ "parentId": parent_id, "name": name })),
            ),
            AppError::Conflict(Conflict::HasChildren { id, count })
            | AppError::Conflict(Conflict::HasProducts { id, count }) => (
                self.to_string(),
                Some(serde_json::json!({ "id": id, "count": count })),
            ),
            AppError::Conflict(Conflict::UniqueViolation(_)) => {
                tracing::warn!("Storage-level conflict: {}", self);
                ("Conflict: duplicate category".to_string(), None)
            }
            AppError::InvalidOperation(InvalidOperation::CircularReference { id, parent_id }) => (
                self.to_string(),
                Some(serde_json::json!({ "id": id, "parentId": parent_id })),
            ),
            AppError::InvalidOperation(_) => (self.to_string(), None),
            AppError::Validation { field, .. } => (
                self.to_string(),
                Some(serde_json::json!({ "field": field })),
            ),
            AppError::Database(err) => {
                tracing::error!("Database error: {}", err);
                ("Database Error".to_string(), None)
            }
            AppError::Internal(msg) => {
                tracing::error!("Internal error: {}", msg);
                ("Internal Server Error".to_string(), None)
            }
        };

        let body = ErrorResponse {
            code: self.code(),
            status: status.as_u16(),
            message,
            details,
        };

        (status, Json(body)).into_response()
    }
}

/// Result type alias for application
pub type AppResult<T> = Result<T, AppError>;

/// Helper trait for converting Option to AppError::NotFound
pub trait OptionExt<T> {
    fn ok_or_not_found(self, entity: &'static str, id: i64) -> AppResult<T>;
}

impl<T> OptionExt<T> for Option<T> {
    fn ok_or_not_found(self, entity: &'static str, id: i64) -> AppResult<T> {
        self.ok_or(AppError::NotFound { entity, id })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_response_status() {
        let cases = [
            (AppError::NotFound { entity: "Category", id: 7 }, StatusCode::NOT_FOUND),
            (
                AppError::Conflict(Conflict::HasChildren { id: 1, count: 2 }),
                StatusCode::CONFLICT,
            ),
            (
                AppError::InvalidOperation(InvalidOperation::CircularReference { id: 1, parent_id: 2 }),
                StatusCode::BAD_REQUEST,
            ),
            (AppError::validation("ids", "empty"), StatusCode::BAD_REQUEST),
            (AppError::Internal("boom".into()), StatusCode::INTERNAL_SERVER_ERROR),
        ];
        for (err, status) in cases {
            assert_eq!(err.into_response().status(), status);
        }
    }

    #[test]
    fn test_codes_distinguish_kinds() {
        assert_eq!(AppError::NotFound { entity: "Category", id: 1 }.code(), "NOT_FOUND");
        assert_eq!(
            AppError::from(Conflict::UniqueViolation("x".into())).code(),
            "CONFLICT"
        );
        assert_eq!(
            AppError::from(InvalidOperation::UnsupportedBulkOperation("merge".into())).code(),
            "INVALID_OPERATION"
        );
        assert_eq!(AppError::validation("name", "empty").code(), "VALIDATION_ERROR");
    }

    #[test]
    fn test_duplicate_name_message() {
        let root = Conflict::DuplicateName { parent_id: None, name: "Laptops".into() };
        assert_eq!(root.to_string(), "a category named 'Laptops' already exists under the root");
        let nested = Conflict::DuplicateName { parent_id: Some(3), name: "Laptops".into() };
        assert!(nested.to_string().ends_with("under category 3"));
    }

    #[test]
    fn test_plain_db_error_is_internal() {
        let err = AppError::from(DbErr::Custom("connection reset".into()));
        assert!(matches!(err, AppError::Database(_)));
        assert_eq!(err.status(), StatusCode::INTERNAL_SERVER_ERROR);
    }

    #[test]
    fn test_option_ext() {
        let opt: Option<i32> = None;
        let result = opt.ok_or_not_found("Category", 42);
        assert!(matches!(result, Err(AppError::NotFound { id: 42, .. })));
    }
}

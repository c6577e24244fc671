//! Typed errors and HTTP mapping.

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::Serialize;
use serde_json::Value;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum RegistryError {
    #[error("duplicate entity: {0}")]
    DuplicateEntity(String),
    #[error("duplicate route: {0}")]
    DuplicateRoute(String),
    #[error("unknown entity: {0}")]
    UnknownEntity(String),
    #[error("entity {entity}: {reason}")]
    InvalidDefinition { entity: String, reason: String },
    #[error("catalog load: {0}")]
    Load(String),
}

/// Failures reported by the storage collaborator.
#[derive(Error, Debug)]
pub enum StoreError {
    #[error("database: {0}")]
    Db(#[from] sqlx::Error),
    #[error("storage: {0}")]
    Backend(String),
}

/// One field-level violation in a write payload.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct FieldViolation {
    pub field: String,
    pub reason: String,
}

impl FieldViolation {
    pub fn new(field: impl Into<String>, reason: impl Into<String>) -> Self {
        FieldViolation {
            field: field.into(),
            reason: reason.into(),
        }
    }
}

#[derive(Error, Debug)]
pub enum AppError {
    #[error(transparent)]
    Registry(#[from] RegistryError),
    #[error("{entity} with id {key} not found")]
    NotFound { entity: String, key: String },
    #[error("{entity} has no relationship '{name}'")]
    UnknownRelationship { entity: String, name: String },
    #[error("validation failed: {} violation(s)", .0.len())]
    Validation(Vec<FieldViolation>),
    #[error("{entity} has no column '{column}' to filter on")]
    InvalidFilterColumn { entity: String, column: String },
    #[error("{entity} has no column '{column}' to sort by")]
    InvalidSortColumn { entity: String, column: String },
    #[error("{entity} {id} was created but could not be associated")]
    Association {
        entity: String,
        id: Value,
        #[source]
        source: StoreError,
    },
    #[error("bad request: {0}")]
    BadRequest(String),
    #[error(transparent)]
    Storage(#[from] StoreError),
}

impl AppError {
    pub fn not_found(entity: &str, key: &Value) -> Self {
        AppError::NotFound {
            entity: entity.to_string(),
            key: key_display(key),
        }
    }

    pub fn status_and_code(&self) -> (StatusCode, &'static str) {
        match self {
            AppError::Registry(RegistryError::UnknownEntity(_)) => (StatusCode::NOT_FOUND, "unknown_entity"),
            AppError::Registry(_) => (StatusCode::INTERNAL_SERVER_ERROR, "registry_error"),
            AppError::NotFound { .. } => (StatusCode::NOT_FOUND, "not_found"),
            AppError::UnknownRelationship { .. } => (StatusCode::NOT_FOUND, "unknown_relationship"),
            AppError::Validation(_) => (StatusCode::UNPROCESSABLE_ENTITY, "validation_error"),
            AppError::InvalidFilterColumn { .. } => (StatusCode::BAD_REQUEST, "invalid_filter_column"),
            AppError::InvalidSortColumn { .. } => (StatusCode::BAD_REQUEST, "invalid_sort_column"),
            AppError::Association { .. } => (StatusCode::INTERNAL_SERVER_ERROR, "association_error"),
            AppError::BadRequest(_) => (StatusCode::BAD_REQUEST, "bad_request"),
            AppError::Storage(_) => (StatusCode::INTERNAL_SERVER_ERROR, "storage_error"),
        }
    }
}

/// Renders a key the way a client typed it: strings unquoted, numbers as-is.
pub fn key_display(key: &Value) -> String {
    match key {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

#[derive(Serialize)]
pub struct ErrorBody {
    pub error: ErrorDetail,
}

#[derive(Serialize)]
pub struct ErrorDetail {
    pub code: String,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<Value>,
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let (status, code) = self.status_and_code();
        let (message, details) = match &self {
            AppError::Validation(violations) => (
                self.to_string(),
                serde_json::to_value(violations).ok(),
            ),
            AppError::Association { entity, id, source } => {
                tracing::error!(entity = %entity, id = %id, error = %source, "association failed after insert");
                (self.to_string(), Some(serde_json::json!({ "orphaned_id": id })))
            }
            AppError::Storage(e) => {
                tracing::error!(error = %e, "storage failure");
                ("storage error".to_string(), None)
            }
            AppError::Registry(e @ RegistryError::UnknownEntity(_)) => (e.to_string(), None),
            AppError::Registry(e) => {
                tracing::error!(error = %e, "registry failure");
                ("registry error".to_string(), None)
            }
            _ => (self.to_string(), None),
        };
        let body = ErrorBody {
            error: ErrorDetail {
                code: code.to_string(),
                message,
                details,
            },
        };
        (status, Json(body)).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn not_found_names_entity_and_key() {
        let e = AppError::not_found("Item", &serde_json::json!(999));
        assert_eq!(e.to_string(), "Item with id 999 not found");
        assert_eq!(e.status_and_code().0, StatusCode::NOT_FOUND);
    }

    #[test]
    fn string_keys_render_without_quotes() {
        let key = serde_json::json!("7c9e6679-7425-40de-944b-e07fc1f90ae7");
        assert_eq!(key_display(&key), "7c9e6679-7425-40de-944b-e07fc1f90ae7");
    }

    #[test]
    fn storage_failures_map_to_500() {
        let e = AppError::from(StoreError::Backend("connection reset".into()));
        assert_eq!(e.status_and_code(), (StatusCode::INTERNAL_SERVER_ERROR, "storage_error"));
    }
}

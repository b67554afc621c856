use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use chrono::NaiveDate;
use serde_json::json;
use uuid::Uuid;

/// Error types for capacity ledger and allocator operations
#[derive(Debug, thiserror::Error)]
pub enum CapacityError {
    #[error("Storage error: {0}")]
    StoreError(String),

    #[error("Resource not found: {0}")]
    ResourceNotFound(Uuid),

    #[error("Insufficient capacity on resource {resource_id} for {date}: requested {requested}, available {available}")]
    InsufficientCapacity {
        resource_id: Uuid,
        date: NaiveDate,
        requested: i32,
        available: i32,
    },

    #[error("Capacity already committed for booking {booking_id} on resource {resource_id}")]
    AlreadyCommitted {
        booking_id: Uuid,
        resource_id: Uuid,
    },

    #[error("Validation error: {0}")]
    ValidationError(String),
}

impl From<sqlx::Error> for CapacityError {
    fn from(err: sqlx::Error) -> Self {
        CapacityError::StoreError(err.to_string())
    }
}

impl IntoResponse for CapacityError {
    fn into_response(self) -> Response {
        let (status, error_code) = match &self {
            CapacityError::StoreError(msg) => {
                tracing::error!("Capacity store error: {}", msg);
                (StatusCode::INTERNAL_SERVER_ERROR, "STORE_ERROR")
            }
            CapacityError::ResourceNotFound(_) => (StatusCode::NOT_FOUND, "NOT_FOUND"),
            CapacityError::InsufficientCapacity { .. } => {
                (StatusCode::CONFLICT, "INSUFFICIENT_CAPACITY")
            }
            CapacityError::AlreadyCommitted { .. } => (StatusCode::CONFLICT, "ALREADY_COMMITTED"),
            CapacityError::ValidationError(_) => (StatusCode::BAD_REQUEST, "VALIDATION_ERROR"),
        };

        let message = match &self {
            // Internals stay out of client responses
            CapacityError::StoreError(_) => "A storage error occurred".to_string(),
            other => other.to_string(),
        };

        let body = Json(json!({
            "error_code": error_code,
            "error": message,
        }));

        (status, body).into_response()
    }
}

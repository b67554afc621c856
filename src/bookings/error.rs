use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;
use uuid::Uuid;

use crate::capacity::CapacityError;
use crate::pricing::PricingError;

/// Error types for booking lifecycle operations
#[derive(Debug, thiserror::Error)]
pub enum BookingError {
    #[error("Storage error: {0}")]
    StoreError(String),

    #[error("Booking not found: {0}")]
    NotFound(Uuid),

    #[error("Validation error: {0}")]
    ValidationError(String),

    /// The booking is not in a status that permits the requested operation,
    /// including a confirm attempt that lost a concurrent race or arrived
    /// past the hold expiry.
    #[error("Invalid state transition: {0}")]
    InvalidStateTransition(String),

    #[error(transparent)]
    Capacity(#[from] CapacityError),

    #[error(transparent)]
    Pricing(#[from] PricingError),
}

impl From<sqlx::Error> for BookingError {
    fn from(err: sqlx::Error) -> Self {
        BookingError::StoreError(err.to_string())
    }
}

impl IntoResponse for BookingError {
    fn into_response(self) -> Response {
        // Capacity and pricing failures keep their own taxonomy so clients
        // can distinguish a 409 INSUFFICIENT_CAPACITY from a 409
        // RULE_EXPIRED_OR_EXHAUSTED on the same confirm endpoint.
        match self {
            BookingError::Capacity(inner) => inner.into_response(),
            BookingError::Pricing(inner) => inner.into_response(),
            other => {
                let (status, error_code) = match &other {
                    BookingError::StoreError(msg) => {
                        tracing::error!("Booking store error: {}", msg);
                        (StatusCode::INTERNAL_SERVER_ERROR, "STORE_ERROR")
                    }
                    BookingError::NotFound(_) => (StatusCode::NOT_FOUND, "NOT_FOUND"),
                    BookingError::ValidationError(_) => {
                        (StatusCode::BAD_REQUEST, "VALIDATION_ERROR")
                    }
                    BookingError::InvalidStateTransition(_) => {
                        (StatusCode::CONFLICT, "INVALID_STATE_TRANSITION")
                    }
                    BookingError::Capacity(_) | BookingError::Pricing(_) => unreachable!(),
                };

                let message = match &other {
                    BookingError::StoreError(_) => "A storage error occurred".to_string(),
                    err => err.to_string(),
                };

                let body = Json(json!({
                    "error_code": error_code,
                    "error": message,
                }));
                (status, body).into_response()
            }
        }
    }
}

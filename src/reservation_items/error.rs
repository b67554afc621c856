use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;
use uuid::Uuid;

/// Error types for the reservation item ledger
#[derive(Debug, thiserror::Error)]
pub enum ReservationItemError {
    #[error("Storage error: {0}")]
    StoreError(String),

    #[error("Reservation item not found: {0}")]
    NotFound(Uuid),

    #[error("Booking not found: {0}")]
    BookingNotFound(Uuid),

    /// Items can only be attached while the parent booking is live
    #[error("Booking {0} is closed and cannot accept items")]
    BookingClosed(Uuid),

    /// A confirmed booking's items carry committed capacity; adjustments
    /// go through cancelling the booking itself
    #[error("Item {0} belongs to a confirmed booking and cannot be cancelled on its own")]
    ItemCommitted(Uuid),

    #[error("Validation error: {0}")]
    ValidationError(String),
}

impl From<sqlx::Error> for ReservationItemError {
    fn from(err: sqlx::Error) -> Self {
        ReservationItemError::StoreError(err.to_string())
    }
}

impl IntoResponse for ReservationItemError {
    fn into_response(self) -> Response {
        let (status, error_code) = match &self {
            ReservationItemError::StoreError(msg) => {
                tracing::error!("Reservation item store error: {}", msg);
                (StatusCode::INTERNAL_SERVER_ERROR, "STORE_ERROR")
            }
            ReservationItemError::NotFound(_) | ReservationItemError::BookingNotFound(_) => {
                (StatusCode::NOT_FOUND, "NOT_FOUND")
            }
            ReservationItemError::BookingClosed(_) | ReservationItemError::ItemCommitted(_) => {
                (StatusCode::CONFLICT, "INVALID_STATE_TRANSITION")
            }
            ReservationItemError::ValidationError(_) => {
                (StatusCode::BAD_REQUEST, "VALIDATION_ERROR")
            }
        };

        let message = match &self {
            ReservationItemError::StoreError(_) => "A storage error occurred".to_string(),
            other => other.to_string(),
        };

        let body = Json(json!({
            "error_code": error_code,
            "error": message,
        }));
        (status, body).into_response()
    }
}

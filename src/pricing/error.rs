use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;
use uuid::Uuid;

/// Error types for pricing-rule evaluation and usage accounting
#[derive(Debug, thiserror::Error)]
pub enum PricingError {
    #[error("Storage error: {0}")]
    StoreError(String),

    #[error("Pricing rule not found: {0}")]
    RuleNotFound(Uuid),

    /// The promo code or rule the client relied on is no longer eligible:
    /// expired window, exhausted global uses, or exhausted per-customer uses.
    /// Distinct from a capacity conflict so clients can drop the code and
    /// re-price instead of re-checking availability.
    #[error("Rule expired or exhausted: {0}")]
    RuleExpiredOrExhausted(String),

    #[error("Validation error: {0}")]
    ValidationError(String),
}

impl From<sqlx::Error> for PricingError {
    fn from(err: sqlx::Error) -> Self {
        PricingError::StoreError(err.to_string())
    }
}

impl IntoResponse for PricingError {
    fn into_response(self) -> Response {
        let (status, error_code) = match &self {
            PricingError::StoreError(msg) => {
                tracing::error!("Pricing store error: {}", msg);
                (StatusCode::INTERNAL_SERVER_ERROR, "STORE_ERROR")
            }
            PricingError::RuleNotFound(_) => (StatusCode::NOT_FOUND, "NOT_FOUND"),
            PricingError::RuleExpiredOrExhausted(_) => {
                (StatusCode::CONFLICT, "RULE_EXPIRED_OR_EXHAUSTED")
            }
            PricingError::ValidationError(_) => (StatusCode::BAD_REQUEST, "VALIDATION_ERROR"),
        };

        let message = match &self {
            PricingError::StoreError(_) => "A storage error occurred".to_string(),
            other => other.to_string(),
        };

        let body = Json(json!({
            "error_code": error_code,
            "error": message,
        }));

        (status, body).into_response()
    }
}

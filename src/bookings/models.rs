use chrono::{DateTime, NaiveDate, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use utoipa::ToSchema;
use uuid::Uuid;
use validator::Validate;

use crate::models::{CustomerSegment, ServiceType};

/// Lifecycle status of a booking
///
/// Pending bookings are provisional and expire; Cancelled, Refunded, and
/// Expired are terminal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type, ToSchema)]
#[sqlx(type_name = "varchar", rename_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum BookingStatus {
    Pending,
    Confirmed,
    Cancelled,
    Refunded,
    Expired,
}

impl BookingStatus {
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            BookingStatus::Cancelled | BookingStatus::Refunded | BookingStatus::Expired
        )
    }
}

impl fmt::Display for BookingStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            BookingStatus::Pending => write!(f, "pending"),
            BookingStatus::Confirmed => write!(f, "confirmed"),
            BookingStatus::Cancelled => write!(f, "cancelled"),
            BookingStatus::Refunded => write!(f, "refunded"),
            BookingStatus::Expired => write!(f, "expired"),
        }
    }
}

impl FromStr for BookingStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pending" => Ok(BookingStatus::Pending),
            "confirmed" => Ok(BookingStatus::Confirmed),
            "cancelled" => Ok(BookingStatus::Cancelled),
            "refunded" => Ok(BookingStatus::Refunded),
            "expired" => Ok(BookingStatus::Expired),
            _ => Err(format!("Invalid booking status: {}", s)),
        }
    }
}

/// Payment state, tracked independently of the lifecycle status
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type, ToSchema)]
#[sqlx(type_name = "varchar", rename_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum PaymentStatus {
    Unpaid,
    Paid,
    Refunded,
}

impl fmt::Display for PaymentStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PaymentStatus::Unpaid => write!(f, "unpaid"),
            PaymentStatus::Paid => write!(f, "paid"),
            PaymentStatus::Refunded => write!(f, "refunded"),
        }
    }
}

/// A booking row
///
/// Price fields always satisfy `total_price = base_price - discount_amount`
/// with `0 <= discount_amount <= base_price`. `expires_at` is set while
/// Pending and cleared on confirmation.
#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow, ToSchema)]
pub struct Booking {
    pub id: Uuid,
    pub customer_id: Uuid,
    pub service_type: ServiceType,
    pub status: BookingStatus,
    pub pax_count: i32,
    pub lead_name: String,
    pub lead_email: String,
    pub lead_phone: Option<String>,
    pub start_date: NaiveDate,
    pub end_date: Option<NaiveDate>,
    pub base_price: Decimal,
    pub discount_amount: Decimal,
    pub total_price: Decimal,
    pub currency: String,
    pub customer_segment: Option<CustomerSegment>,
    pub promo_code: Option<String>,
    pub payment_status: PaymentStatus,
    pub payment_reference: Option<String>,
    /// Rules whose usage was consumed at confirmation, in applied order
    pub applied_rules: Vec<Uuid>,
    pub cancellation_reason: Option<String>,
    pub cancelled_by: Option<String>,
    pub cancelled_at: Option<DateTime<Utc>>,
    pub refund_amount: Option<Decimal>,
    pub confirmed_at: Option<DateTime<Utc>>,
    pub expires_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Request body for POST /api/bookings
#[derive(Debug, Clone, Deserialize, Validate, ToSchema)]
pub struct CreateBookingRequest {
    pub customer_id: Uuid,
    pub service_type: ServiceType,
    #[validate(range(min = 1, max = 50, message = "pax_count must be between 1 and 50"))]
    pub pax_count: i32,
    #[validate(length(min = 1, max = 200))]
    pub lead_name: String,
    #[validate(email(message = "lead_email must be a valid email address"))]
    pub lead_email: String,
    #[validate(length(max = 30))]
    pub lead_phone: Option<String>,
    pub start_date: NaiveDate,
    pub end_date: Option<NaiveDate>,
    #[validate(custom = "crate::validation::validate_non_negative_amount")]
    pub base_price: Decimal,
    #[validate(custom = "crate::validation::validate_currency")]
    #[serde(default = "crate::pricing::models::default_currency")]
    pub currency: String,
    pub customer_segment: Option<CustomerSegment>,
    pub promo_code: Option<String>,
}

/// Request body for POST /api/bookings/:id/confirm
#[derive(Debug, Clone, Deserialize, Validate, ToSchema)]
pub struct ConfirmBookingRequest {
    #[validate(length(max = 100))]
    pub payment_reference: Option<String>,
}

/// Request body for POST /api/bookings/:id/cancel
#[derive(Debug, Clone, Deserialize, Validate, ToSchema)]
pub struct CancelBookingRequest {
    #[validate(length(min = 1, max = 500))]
    pub reason: String,
    #[validate(length(max = 100))]
    pub cancelled_by: Option<String>,
    #[validate(custom = "crate::validation::validate_non_negative_amount")]
    pub refund_amount: Option<Decimal>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[test]
    fn test_terminal_statuses() {
        assert!(!BookingStatus::Pending.is_terminal());
        assert!(!BookingStatus::Confirmed.is_terminal());
        assert!(BookingStatus::Cancelled.is_terminal());
        assert!(BookingStatus::Refunded.is_terminal());
        assert!(BookingStatus::Expired.is_terminal());
    }

    #[test]
    fn test_status_round_trips_through_str() {
        for status in [
            BookingStatus::Pending,
            BookingStatus::Confirmed,
            BookingStatus::Cancelled,
            BookingStatus::Refunded,
            BookingStatus::Expired,
        ] {
            assert_eq!(status.to_string().parse::<BookingStatus>(), Ok(status));
        }
        assert!("unknown".parse::<BookingStatus>().is_err());
    }

    #[test]
    fn test_create_request_validation() {
        let request = CreateBookingRequest {
            customer_id: Uuid::new_v4(),
            service_type: ServiceType::Tour,
            pax_count: 0,
            lead_name: "Jane Doe".to_string(),
            lead_email: "not-an-email".to_string(),
            lead_phone: None,
            start_date: NaiveDate::from_ymd_opt(2026, 9, 1).unwrap(),
            end_date: None,
            base_price: dec!(100),
            currency: "USD".to_string(),
            customer_segment: None,
            promo_code: None,
        };
        let errors = request.validate().unwrap_err();
        assert!(errors.field_errors().contains_key("pax_count"));
        assert!(errors.field_errors().contains_key("lead_email"));
    }
}

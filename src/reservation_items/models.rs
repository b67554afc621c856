use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::fmt;
use utoipa::ToSchema;
use uuid::Uuid;
use validator::Validate;

/// Kind of service line a reservation item represents
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type, ToSchema)]
#[sqlx(type_name = "varchar", rename_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum ReservationItemType {
    Accommodation,
    Transport,
    Activity,
    Guide,
    Meal,
    Insurance,
}

impl fmt::Display for ReservationItemType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ReservationItemType::Accommodation => write!(f, "accommodation"),
            ReservationItemType::Transport => write!(f, "transport"),
            ReservationItemType::Activity => write!(f, "activity"),
            ReservationItemType::Guide => write!(f, "guide"),
            ReservationItemType::Meal => write!(f, "meal"),
            ReservationItemType::Insurance => write!(f, "insurance"),
        }
    }
}

/// One line item on a booking
///
/// `total_price` is fixed at creation as `unit_price * quantity`. When
/// `resource_id` is set, confirming the parent booking commits `quantity`
/// units of that resource over the booking's date range.
#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow, ToSchema)]
pub struct ReservationItem {
    pub id: Uuid,
    pub booking_id: Uuid,
    pub item_type: ReservationItemType,
    pub name: String,
    pub quantity: i32,
    pub unit_price: Decimal,
    pub total_price: Decimal,
    pub resource_id: Option<Uuid>,
    pub is_confirmed: bool,
    pub is_cancelled: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl ReservationItem {
    /// Whether confirming the parent booking must reserve capacity for this item
    pub fn needs_capacity(&self) -> Option<Uuid> {
        if self.is_cancelled {
            None
        } else {
            self.resource_id
        }
    }
}

/// Request body for POST /api/reservation-items
#[derive(Debug, Clone, Deserialize, Validate, ToSchema)]
pub struct CreateReservationItemRequest {
    pub booking_id: Uuid,
    pub item_type: ReservationItemType,
    #[validate(length(min = 1, max = 200))]
    pub name: String,
    #[validate(range(min = 1, max = 1000, message = "quantity must be between 1 and 1000"))]
    pub quantity: i32,
    #[validate(custom = "crate::validation::validate_non_negative_amount")]
    pub unit_price: Decimal,
    pub resource_id: Option<Uuid>,
}

impl CreateReservationItemRequest {
    /// Builds the stored item, computing the line total
    pub fn into_item(self) -> ReservationItem {
        let now = Utc::now();
        ReservationItem {
            id: Uuid::new_v4(),
            booking_id: self.booking_id,
            item_type: self.item_type,
            name: self.name,
            quantity: self.quantity,
            unit_price: self.unit_price,
            total_price: self.unit_price * Decimal::from(self.quantity),
            resource_id: self.resource_id,
            is_confirmed: false,
            is_cancelled: false,
            created_at: now,
            updated_at: now,
        }
    }
}

/// Response body for GET /api/bookings/:id/items
#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct BookingItemsResponse {
    pub items: Vec<ReservationItem>,
    /// Sum of total_price over non-cancelled items, computed at read time
    pub items_total: Decimal,
}

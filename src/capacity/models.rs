use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use utoipa::ToSchema;
use uuid::Uuid;
use validator::Validate;

use crate::models::ResourceType;

/// A reservable resource (vehicle, guide, room block)
#[derive(Debug, Clone, Serialize, Deserialize, FromRow, ToSchema)]
pub struct Resource {
    pub id: Uuid,
    pub name: String,
    pub resource_type: ResourceType,
    pub created_at: DateTime<Utc>,
}

/// One capacity cell: the smallest atomically-updatable unit of availability,
/// keyed by (resource, date)
#[derive(Debug, Clone, Serialize, Deserialize, FromRow, ToSchema)]
pub struct CapacityRecord {
    pub resource_id: Uuid,
    pub date: NaiveDate,
    pub total_capacity: i32,
    pub held_capacity: i32,
}

impl CapacityRecord {
    /// Units still available in this cell
    pub fn available_capacity(&self) -> i32 {
        self.total_capacity - self.held_capacity
    }
}

/// Request body for POST /api/availability/check
#[derive(Debug, Clone, Deserialize, Validate, ToSchema)]
pub struct AvailabilityCheckRequest {
    pub resource_type: Option<ResourceType>,
    pub resource_ids: Option<Vec<Uuid>>,
    pub start_date: NaiveDate,
    pub end_date: Option<NaiveDate>,
    #[validate(range(min = 1, message = "required_capacity must be at least 1"))]
    pub required_capacity: i32,
}

/// Per-resource slice of an availability report
#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct ResourceAvailability {
    pub resource_id: Uuid,
    pub resource_name: String,
    pub resource_type: ResourceType,
    /// Smallest cell total across the requested range
    pub total_capacity: i32,
    /// Smallest available count across the requested range; a missing cell
    /// counts as zero
    pub available_capacity: i32,
    pub is_available: bool,
}

/// Aggregate answer to an availability check; advisory only, never a hold
#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct AvailabilityReport {
    pub has_availability: bool,
    /// Number of resources that can satisfy the request
    pub total_available: i32,
    pub resources: Vec<ResourceAvailability>,
}

/// Request body for POST /api/resources: registers a resource and seeds its
/// capacity cells over a date span
#[derive(Debug, Clone, Deserialize, Validate, ToSchema)]
pub struct CreateResourceRequest {
    #[validate(length(min = 1, max = 200))]
    pub name: String,
    pub resource_type: ResourceType,
    #[validate(range(min = 1, message = "total_capacity must be at least 1"))]
    pub total_capacity: i32,
    pub start_date: NaiveDate,
    pub end_date: Option<NaiveDate>,
}

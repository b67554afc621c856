// Shared domain type definitions
// Enums used across the booking, pricing, and capacity modules

use serde::{Deserialize, Serialize};
use std::fmt;
use utoipa::ToSchema;

/// Kind of service a booking is for
///
/// Drives pricing-rule matching; a rule can be restricted to one service type.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type, ToSchema)]
#[sqlx(type_name = "varchar", rename_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum ServiceType {
    /// Multi-day guided tour
    Tour,

    /// Point-to-point transfer
    Transfer,

    /// Accommodation-only booking
    Accommodation,

    /// Single activity or excursion
    Activity,

    /// Bundled package (tour + accommodation + transfers)
    Package,
}

impl fmt::Display for ServiceType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ServiceType::Tour => write!(f, "tour"),
            ServiceType::Transfer => write!(f, "transfer"),
            ServiceType::Accommodation => write!(f, "accommodation"),
            ServiceType::Activity => write!(f, "activity"),
            ServiceType::Package => write!(f, "package"),
        }
    }
}

impl std::str::FromStr for ServiceType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "tour" => Ok(ServiceType::Tour),
            "transfer" => Ok(ServiceType::Transfer),
            "accommodation" => Ok(ServiceType::Accommodation),
            "activity" => Ok(ServiceType::Activity),
            "package" => Ok(ServiceType::Package),
            _ => Err(format!("Invalid service type: {}", s)),
        }
    }
}

/// Kind of reservable resource tracked by the capacity ledger
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type, ToSchema)]
#[sqlx(type_name = "varchar", rename_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum ResourceType {
    /// Safari vehicle, minibus, boat
    Vehicle,

    /// Tour guide or driver-guide
    Guide,

    /// Lodge room, campsite pitch
    Accommodation,
}

impl fmt::Display for ResourceType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ResourceType::Vehicle => write!(f, "vehicle"),
            ResourceType::Guide => write!(f, "guide"),
            ResourceType::Accommodation => write!(f, "accommodation"),
        }
    }
}

impl std::str::FromStr for ResourceType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "vehicle" => Ok(ResourceType::Vehicle),
            "guide" => Ok(ResourceType::Guide),
            "accommodation" => Ok(ResourceType::Accommodation),
            _ => Err(format!("Invalid resource type: {}", s)),
        }
    }
}

/// Customer segment used by pricing-rule conditions
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type, ToSchema)]
#[sqlx(type_name = "varchar", rename_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum CustomerSegment {
    Retail,
    Corporate,
    Agent,
    Repeat,
}

impl fmt::Display for CustomerSegment {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CustomerSegment::Retail => write!(f, "retail"),
            CustomerSegment::Corporate => write!(f, "corporate"),
            CustomerSegment::Agent => write!(f, "agent"),
            CustomerSegment::Repeat => write!(f, "repeat"),
        }
    }
}

impl std::str::FromStr for CustomerSegment {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "retail" => Ok(CustomerSegment::Retail),
            "corporate" => Ok(CustomerSegment::Corporate),
            "agent" => Ok(CustomerSegment::Agent),
            "repeat" => Ok(CustomerSegment::Repeat),
            _ => Err(format!("Invalid customer segment: {}", s)),
        }
    }
}

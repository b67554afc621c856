// Capacity module
//
// Tracks available units of each reservable resource per calendar date and
// answers availability queries. The ledger owns the per-(resource, date)
// capacity cells; the allocator is the advisory/commit facade the booking
// engine talks to.

pub mod allocator;
pub mod error;
pub mod handlers;
pub mod ledger;
pub mod models;

pub use allocator::AvailabilityAllocator;
pub use error::CapacityError;
pub use ledger::{CapacityStore, InMemoryCapacityLedger, PgCapacityLedger};
pub use models::{
    AvailabilityCheckRequest, AvailabilityReport, CapacityRecord, CreateResourceRequest,
    Resource, ResourceAvailability,
};

// Reservation items module
//
// Line items attached to a booking: rooms, transfers, activities, and so
// on. Ownership is one-directional; a booking never stores item ids. An
// item carrying a resource_id is what drives capacity commits when the
// parent booking is confirmed.

pub mod error;
pub mod handlers;
pub mod models;
pub mod repository;

pub use error::ReservationItemError;
pub use models::{
    BookingItemsResponse, CreateReservationItemRequest, ReservationItem, ReservationItemType,
};
pub use repository::{InMemoryReservationItemStore, PgReservationItemStore, ReservationItemStore};

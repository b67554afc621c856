// Bookings module
//
// Owns the booking lifecycle. Every status mutation goes through the
// state machine and the service; handlers never write status directly.
// Pending bookings hold no capacity; capacity is committed at confirm
// and released on cancellation of a confirmed booking.

pub mod error;
pub mod expiry;
pub mod handlers;
pub mod models;
pub mod repository;
pub mod service;
pub mod status_machine;

pub use error::BookingError;
pub use models::{
    Booking, BookingStatus, CancelBookingRequest, ConfirmBookingRequest, CreateBookingRequest,
    PaymentStatus,
};
pub use repository::{BookingStore, InMemoryBookingStore, PgBookingStore};
pub use service::BookingService;
pub use status_machine::StatusMachine;

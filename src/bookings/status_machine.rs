use crate::bookings::BookingStatus;

/// Service for managing booking status transitions
pub struct StatusMachine;

impl StatusMachine {
    /// Check if a status transition is valid
    ///
    /// # Arguments
    /// * `from` - Current booking status
    /// * `to` - Desired new status
    ///
    /// # Returns
    /// `true` if the transition is valid, `false` otherwise
    ///
    /// # Valid Transitions
    /// - Pending → Confirmed, Cancelled, Expired
    /// - Confirmed → Cancelled, Refunded
    /// - Cancelled, Refunded, Expired → (terminal, no transitions)
    ///
    /// Repeating the current status is NOT valid: confirming an already
    /// confirmed booking is a conflict the caller must surface, never a
    /// silent success that could double-commit capacity.
    pub fn is_valid_transition(from: BookingStatus, to: BookingStatus) -> bool {
        match (from, to) {
            (BookingStatus::Pending, BookingStatus::Confirmed) => true,
            (BookingStatus::Pending, BookingStatus::Cancelled) => true,
            (BookingStatus::Pending, BookingStatus::Expired) => true,

            (BookingStatus::Confirmed, BookingStatus::Cancelled) => true,
            (BookingStatus::Confirmed, BookingStatus::Refunded) => true,

            _ => false,
        }
    }

    /// Attempt to transition from one status to another
    ///
    /// # Returns
    /// `Ok(to)` if the transition is valid, `Err(message)` otherwise
    pub fn transition(from: BookingStatus, to: BookingStatus) -> Result<BookingStatus, String> {
        if Self::is_valid_transition(from, to) {
            Ok(to)
        } else {
            Err(format!("Invalid status transition from {} to {}", from, to))
        }
    }
}

// Background expiry sweep
//
// Periodically moves lapsed Pending bookings to Expired. The sweep is a
// pure status pass; Pending bookings hold no capacity, so there is nothing
// to release. Races with in-flight confirms are resolved by the store CAS.

use std::time::Duration;
use tracing::{debug, error};

use crate::bookings::service::BookingService;

/// Spawn the sweep loop on the runtime; runs until the process exits
pub fn spawn_expiry_sweep(service: BookingService, interval: Duration) {
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(interval);
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
        loop {
            ticker.tick().await;
            match service.expire_due_bookings().await {
                Ok(0) => debug!("Expiry sweep: nothing to do"),
                Ok(n) => debug!("Expiry sweep: expired {} booking(s)", n),
                Err(err) => error!("Expiry sweep failed: {}", err),
            }
        }
    });
}

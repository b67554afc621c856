use chrono::{Duration, Utc};
use std::collections::HashMap;
use std::sync::Arc;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::bookings::error::BookingError;
use crate::bookings::models::{
    Booking, BookingStatus, CancelBookingRequest, ConfirmBookingRequest, CreateBookingRequest,
    PaymentStatus,
};
use crate::bookings::repository::BookingStore;
use crate::bookings::status_machine::StatusMachine;
use crate::capacity::AvailabilityAllocator;
use crate::pricing::{PricingContext, PricingEngine};
use crate::reservation_items::ReservationItemStore;

/// Orchestrates the booking lifecycle
///
/// All status changes flow through here. The service composes the capacity
/// allocator and the pricing engine so that confirmation is all-or-nothing:
/// either every side effect lands (capacity committed, usage consumed,
/// prices finalized) or every side effect is compensated and the booking
/// stays Pending.
#[derive(Clone)]
pub struct BookingService {
    store: Arc<dyn BookingStore>,
    items: Arc<dyn ReservationItemStore>,
    allocator: AvailabilityAllocator,
    pricing: PricingEngine,
    hold_duration: Duration,
}

impl BookingService {
    pub fn new(
        store: Arc<dyn BookingStore>,
        items: Arc<dyn ReservationItemStore>,
        allocator: AvailabilityAllocator,
        pricing: PricingEngine,
        hold_duration: Duration,
    ) -> Self {
        Self {
            store,
            items,
            allocator,
            pricing,
            hold_duration,
        }
    }

    /// Create a new Pending booking
    ///
    /// Prices are a preview: rules are evaluated but no usage is consumed
    /// and no capacity is touched. The booking carries an `expires_at`
    /// deadline after which it can no longer be confirmed.
    ///
    /// # Arguments
    /// * `request` - Validated booking details
    ///
    /// # Returns
    /// * `Ok(Booking)` - The stored Pending booking with preview prices
    /// * `Err(BookingError::Pricing)` - The supplied promo code is not
    ///   applicable
    pub async fn create(&self, request: CreateBookingRequest) -> Result<Booking, BookingError> {
        let now = Utc::now();
        let ctx = PricingContext {
            service_type: request.service_type,
            base_price: request.base_price,
            pax_count: request.pax_count,
            start_date: request.start_date,
            end_date: request.end_date,
            customer_id: Some(request.customer_id),
            customer_segment: request.customer_segment,
            promo_code: request.promo_code.clone(),
            item_count: None,
        };
        let preview = self.pricing.evaluate(&ctx, now).await?;

        let booking = Booking {
            id: Uuid::new_v4(),
            customer_id: request.customer_id,
            service_type: request.service_type,
            status: BookingStatus::Pending,
            pax_count: request.pax_count,
            lead_name: request.lead_name,
            lead_email: request.lead_email,
            lead_phone: request.lead_phone,
            start_date: request.start_date,
            end_date: request.end_date,
            base_price: preview.base_price,
            discount_amount: preview.discount_amount,
            total_price: preview.total_price,
            currency: request.currency,
            customer_segment: request.customer_segment,
            promo_code: request.promo_code,
            payment_status: PaymentStatus::Unpaid,
            payment_reference: None,
            applied_rules: vec![],
            cancellation_reason: None,
            cancelled_by: None,
            cancelled_at: None,
            refund_amount: None,
            confirmed_at: None,
            expires_at: Some(now + self.hold_duration),
            created_at: now,
            updated_at: now,
        };
        self.store.create(&booking).await?;

        info!(
            "Created booking {} for customer {} ({} pax, total {})",
            booking.id, booking.customer_id, booking.pax_count, booking.total_price
        );
        Ok(booking)
    }

    pub async fn get(&self, id: Uuid) -> Result<Booking, BookingError> {
        self.store
            .find_by_id(id)
            .await?
            .ok_or(BookingError::NotFound(id))
    }

    /// Confirm a Pending booking
    ///
    /// The status row is claimed first with a compare-and-set, which
    /// serializes concurrent confirm attempts and shuts out the expiry
    /// sweep. The winner then finalizes the price, commits capacity for
    /// every live item carrying a resource, and consumes promo usage. Any
    /// failure after the claim compensates in full and reverts the booking
    /// to Pending, so an insufficient-capacity conflict is retryable. A
    /// cancel that lands after the claim wins instead: the final write is
    /// guarded on the claim still standing, and a lost guard compensates
    /// and leaves the terminal status in place.
    ///
    /// # Arguments
    /// * `id` - Booking to confirm
    /// * `request` - Optional payment reference recorded on success
    ///
    /// # Returns
    /// * `Ok(Booking)` - The confirmed booking with finalized prices
    /// * `Err(BookingError::InvalidStateTransition)` - Not Pending, past
    ///   its hold expiry, or lost a concurrent race
    /// * `Err(BookingError::Capacity)` - A resource ran out; booking stays
    ///   Pending
    /// * `Err(BookingError::Pricing)` - Promo no longer applicable or
    ///   exhausted; booking stays Pending
    pub async fn confirm(
        &self,
        id: Uuid,
        request: ConfirmBookingRequest,
    ) -> Result<Booking, BookingError> {
        let now = Utc::now();
        let booking = self.get(id).await?;

        if booking.status != BookingStatus::Pending {
            return Err(BookingError::InvalidStateTransition(format!(
                "booking {} is {} and cannot be confirmed",
                id, booking.status
            )));
        }
        if let Some(expires_at) = booking.expires_at {
            if expires_at < now {
                // Lapsed hold; expire it eagerly rather than waiting for
                // the sweep
                let _ = self
                    .store
                    .transition_status(id, BookingStatus::Pending, BookingStatus::Expired)
                    .await;
                return Err(BookingError::InvalidStateTransition(format!(
                    "booking {} hold expired at {}",
                    id, expires_at
                )));
            }
        }

        // Claim the row. The loser of a concurrent confirm (or a sweep
        // that fired between the checks above) stops here.
        let claimed = self
            .store
            .transition_status(id, BookingStatus::Pending, BookingStatus::Confirmed)
            .await?;
        let mut booking = match claimed {
            Some(b) => b,
            None => {
                return Err(BookingError::InvalidStateTransition(format!(
                    "booking {} was confirmed, cancelled, or expired concurrently",
                    id
                )))
            }
        };

        match self.finalize_confirmation(&mut booking, request, now).await {
            Ok(()) => {
                info!(
                    "Confirmed booking {} (total {}, {} rules applied)",
                    booking.id,
                    booking.total_price,
                    booking.applied_rules.len()
                );
                Ok(booking)
            }
            Err(err) => {
                // Give the claim back so the client can retry
                let reverted = self
                    .store
                    .transition_status(id, BookingStatus::Confirmed, BookingStatus::Pending)
                    .await;
                if let Err(revert_err) = reverted {
                    warn!(
                        "Failed to revert booking {} to pending after confirm failure: {}",
                        id, revert_err
                    );
                }
                Err(err)
            }
        }
    }

    /// Side effects of a claimed confirmation; compensates internally so
    /// the caller only has to revert the status claim
    async fn finalize_confirmation(
        &self,
        booking: &mut Booking,
        request: ConfirmBookingRequest,
        now: chrono::DateTime<chrono::Utc>,
    ) -> Result<(), BookingError> {
        let items = self
            .items
            .list_by_booking(booking.id)
            .await
            .map_err(|e| BookingError::StoreError(e.to_string()))?;
        let live_items: Vec<_> = items.iter().filter(|i| !i.is_cancelled).collect();

        // Items may share a resource; the ledger keys holds per
        // (booking, resource), so quantities are aggregated first
        let mut demand: HashMap<Uuid, i32> = HashMap::new();
        for item in &live_items {
            if let Some(resource_id) = item.needs_capacity() {
                *demand.entry(resource_id).or_insert(0) += item.quantity;
            }
        }

        // Final price, with the item count the preview did not have
        let ctx = PricingContext {
            service_type: booking.service_type,
            base_price: booking.base_price,
            pax_count: booking.pax_count,
            start_date: booking.start_date,
            end_date: booking.end_date,
            customer_id: Some(booking.customer_id),
            customer_segment: booking.customer_segment,
            promo_code: booking.promo_code.clone(),
            item_count: Some(live_items.len() as i32),
        };
        let result = self.pricing.evaluate(&ctx, now).await?;

        let mut granted: Vec<Uuid> = Vec::with_capacity(demand.len());
        for (&resource_id, &amount) in &demand {
            match self
                .allocator
                .reserve(booking.id, resource_id, booking.start_date, booking.end_date, amount)
                .await
            {
                Ok(()) => granted.push(resource_id),
                Err(err) => {
                    self.release_all(booking.id, &granted).await;
                    return Err(err.into());
                }
            }
        }

        if let Err(err) = self
            .pricing
            .consume_usage(&result.applied_rules, booking.customer_id)
            .await
        {
            self.release_all(booking.id, &granted).await;
            return Err(err.into());
        }

        booking.status = BookingStatus::Confirmed;
        booking.base_price = result.base_price;
        booking.discount_amount = result.discount_amount;
        booking.total_price = result.total_price;
        booking.applied_rules = result.applied_rules.iter().map(|r| r.rule_id).collect();
        booking.payment_reference = request.payment_reference;
        if booking.payment_reference.is_some() {
            booking.payment_status = PaymentStatus::Paid;
        }
        booking.confirmed_at = Some(now);
        booking.expires_at = None;

        // The final write is guarded on the claim still standing. A cancel
        // that lands between the claim and this point has already moved the
        // row to a terminal status; that status must win, so a lost guard
        // undoes the capacity and usage side effects instead of writing.
        match self.store.update_if_status(booking, BookingStatus::Confirmed).await {
            Ok(true) => {}
            Ok(false) => {
                self.release_all(booking.id, &granted).await;
                if let Err(rb) = self
                    .pricing
                    .rollback_usage(&result.applied_rules, booking.customer_id)
                    .await
                {
                    warn!("Usage rollback failed for booking {}: {}", booking.id, rb);
                }
                return Err(BookingError::InvalidStateTransition(format!(
                    "booking {} was cancelled while confirming",
                    booking.id
                )));
            }
            Err(err) => {
                self.release_all(booking.id, &granted).await;
                if let Err(rb) = self
                    .pricing
                    .rollback_usage(&result.applied_rules, booking.customer_id)
                    .await
                {
                    warn!("Usage rollback failed for booking {}: {}", booking.id, rb);
                }
                return Err(err);
            }
        }

        // Item confirmation flags are bookkeeping, not part of the atomic
        // commit; a failure here is logged and the items stay unflagged
        for item in live_items {
            let mut flagged = item.clone();
            flagged.is_confirmed = true;
            if let Err(err) = self.items.update(&flagged).await {
                warn!("Failed to flag item {} confirmed: {}", item.id, err);
            }
        }
        Ok(())
    }

    /// Cancel a Pending or Confirmed booking
    ///
    /// A Confirmed cancellation releases every capacity hold the booking
    /// owns; the release tokens make this safe to repeat. When a refund
    /// amount is supplied and the booking was paid, the terminal status is
    /// Refunded instead of Cancelled.
    ///
    /// # Arguments
    /// * `id` - Booking to cancel
    /// * `request` - Reason, optional actor, optional refund amount
    pub async fn cancel(
        &self,
        id: Uuid,
        request: CancelBookingRequest,
    ) -> Result<Booking, BookingError> {
        let now = Utc::now();
        let booking = self.get(id).await?;

        let target = if booking.status == BookingStatus::Confirmed
            && booking.payment_status == PaymentStatus::Paid
            && request.refund_amount.is_some()
        {
            BookingStatus::Refunded
        } else {
            BookingStatus::Cancelled
        };

        StatusMachine::transition(booking.status, target)
            .map_err(BookingError::InvalidStateTransition)?;

        let prior_status = booking.status;
        let claimed = self
            .store
            .transition_status(id, prior_status, target)
            .await?;
        let mut booking = match claimed {
            Some(b) => b,
            None => {
                return Err(BookingError::InvalidStateTransition(format!(
                    "booking {} changed status concurrently",
                    id
                )))
            }
        };
        if prior_status == BookingStatus::Confirmed {
            let items = self
                .items
                .list_by_booking(id)
                .await
                .map_err(|e| BookingError::StoreError(e.to_string()))?;
            let mut resources: Vec<Uuid> =
                items.iter().filter_map(|i| i.resource_id).collect();
            resources.sort();
            resources.dedup();
            for resource_id in resources {
                match self.allocator.release(id, resource_id).await {
                    Ok(true) => debug!("Released hold {}/{}", id, resource_id),
                    Ok(false) => {}
                    Err(err) => warn!(
                        "Failed to release hold {}/{} on cancellation: {}",
                        id, resource_id, err
                    ),
                }
            }
        }

        booking.cancellation_reason = Some(request.reason);
        booking.cancelled_by = request.cancelled_by;
        booking.cancelled_at = Some(now);
        booking.refund_amount = request.refund_amount;
        booking.expires_at = None;
        if target == BookingStatus::Refunded {
            booking.payment_status = PaymentStatus::Refunded;
        }
        self.store.update(&booking).await?;

        info!("Booking {} moved to {}", booking.id, booking.status);
        Ok(booking)
    }

    /// Move every lapsed Pending booking to Expired
    ///
    /// Pending bookings hold no capacity, so expiry is a pure status
    /// change. A booking that gets confirmed between the scan and the
    /// compare-and-set simply loses the CAS and is skipped.
    ///
    /// # Returns
    /// Number of bookings expired in this pass
    pub async fn expire_due_bookings(&self) -> Result<usize, BookingError> {
        let now = Utc::now();
        let due = self.store.find_expired_pending(now).await?;
        let mut expired = 0;
        for booking in due {
            match self
                .store
                .transition_status(booking.id, BookingStatus::Pending, BookingStatus::Expired)
                .await?
            {
                Some(_) => {
                    expired += 1;
                    info!("Expired booking {} (deadline {:?})", booking.id, booking.expires_at);
                }
                None => {
                    debug!("Booking {} escaped expiry, skipping", booking.id);
                }
            }
        }
        Ok(expired)
    }

    async fn release_all(&self, booking_id: Uuid, resources: &[Uuid]) {
        for &resource_id in resources {
            if let Err(err) = self.allocator.release(booking_id, resource_id).await {
                warn!(
                    "Compensating release failed for {}/{}: {}",
                    booking_id, resource_id, err
                );
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bookings::repository::InMemoryBookingStore;
    use crate::capacity::ledger::{new_resource, InMemoryCapacityLedger};
    use crate::capacity::{CapacityError, CapacityStore};
    use crate::models::{ResourceType, ServiceType};
    use crate::pricing::store::{InMemoryRuleStore, PricingRuleStore};
    use crate::pricing::{CreateRuleRequest, DiscountType, PricingError, PricingRule, RuleCondition};
    use crate::reservation_items::repository::InMemoryReservationItemStore;
    use crate::reservation_items::{CreateReservationItemRequest, ReservationItemType};
    use async_trait::async_trait;
    use chrono::NaiveDate;
    use rust_decimal_macros::dec;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct Fixture {
        service: BookingService,
        capacity: Arc<InMemoryCapacityLedger>,
        rules: Arc<InMemoryRuleStore>,
        items: Arc<InMemoryReservationItemStore>,
        bookings: Arc<InMemoryBookingStore>,
    }

    fn fixture() -> Fixture {
        let capacity = Arc::new(InMemoryCapacityLedger::new());
        let rules = Arc::new(InMemoryRuleStore::new());
        let items = Arc::new(InMemoryReservationItemStore::new());
        let bookings = Arc::new(InMemoryBookingStore::new());
        let service = BookingService::new(
            bookings.clone(),
            items.clone(),
            AvailabilityAllocator::new(capacity.clone()),
            PricingEngine::new(rules.clone()),
            Duration::minutes(30),
        );
        Fixture {
            service,
            capacity,
            rules,
            items,
            bookings,
        }
    }

    fn start_date() -> NaiveDate {
        Utc::now().date_naive() + Duration::days(14)
    }

    fn create_request() -> CreateBookingRequest {
        CreateBookingRequest {
            customer_id: Uuid::new_v4(),
            service_type: ServiceType::Tour,
            pax_count: 2,
            lead_name: "Jane Doe".to_string(),
            lead_email: "jane@example.com".to_string(),
            lead_phone: None,
            start_date: start_date(),
            end_date: None,
            base_price: dec!(1000),
            currency: "USD".to_string(),
            customer_segment: None,
            promo_code: None,
        }
    }

    async fn seeded_resource(fx: &Fixture, total: i32) -> Uuid {
        let resource = new_resource("Minibus", ResourceType::Vehicle);
        fx.capacity.create_resource(&resource).await.unwrap();
        fx.capacity
            .set_capacity(resource.id, &[start_date()], total)
            .await
            .unwrap();
        resource.id
    }

    async fn attach_item(fx: &Fixture, booking_id: Uuid, resource_id: Option<Uuid>, quantity: i32) {
        let item = CreateReservationItemRequest {
            booking_id,
            item_type: ReservationItemType::Transport,
            name: "Seat".to_string(),
            quantity,
            unit_price: dec!(10),
            resource_id,
        }
        .into_item();
        fx.items.create(&item).await.unwrap();
    }

    #[tokio::test]
    async fn test_create_sets_pending_with_expiry() {
        let fx = fixture();
        let booking = fx.service.create(create_request()).await.unwrap();
        assert_eq!(booking.status, BookingStatus::Pending);
        assert!(booking.expires_at.unwrap() > Utc::now());
        assert_eq!(booking.total_price, dec!(1000));
        assert!(booking.applied_rules.is_empty());
    }

    #[tokio::test]
    async fn test_confirm_commits_capacity_and_finalizes() {
        let fx = fixture();
        let resource_id = seeded_resource(&fx, 10).await;
        let booking = fx.service.create(create_request()).await.unwrap();
        attach_item(&fx, booking.id, Some(resource_id), 4).await;

        let confirmed = fx
            .service
            .confirm(
                booking.id,
                ConfirmBookingRequest {
                    payment_reference: Some("PAY-1".to_string()),
                },
            )
            .await
            .unwrap();

        assert_eq!(confirmed.status, BookingStatus::Confirmed);
        assert_eq!(confirmed.payment_status, PaymentStatus::Paid);
        assert!(confirmed.expires_at.is_none());
        assert!(confirmed.confirmed_at.is_some());

        let cells = fx
            .capacity
            .get_cells(resource_id, &[start_date()])
            .await
            .unwrap();
        assert_eq!(cells[0].held_capacity, 4);

        let stored = fx.items.list_by_booking(booking.id).await.unwrap();
        assert!(stored[0].is_confirmed);
    }

    #[tokio::test]
    async fn test_confirm_insufficient_capacity_leaves_pending() {
        let fx = fixture();
        let resource_id = seeded_resource(&fx, 3).await;
        let booking = fx.service.create(create_request()).await.unwrap();
        attach_item(&fx, booking.id, Some(resource_id), 4).await;

        let result = fx
            .service
            .confirm(booking.id, ConfirmBookingRequest { payment_reference: None })
            .await;
        assert!(matches!(
            result,
            Err(BookingError::Capacity(CapacityError::InsufficientCapacity { .. }))
        ));

        let stored = fx.bookings.find_by_id(booking.id).await.unwrap().unwrap();
        assert_eq!(stored.status, BookingStatus::Pending);
        let cells = fx
            .capacity
            .get_cells(resource_id, &[start_date()])
            .await
            .unwrap();
        assert_eq!(cells[0].held_capacity, 0);
    }

    #[tokio::test]
    async fn test_confirm_aggregates_items_sharing_a_resource() {
        let fx = fixture();
        let resource_id = seeded_resource(&fx, 10).await;
        let booking = fx.service.create(create_request()).await.unwrap();
        attach_item(&fx, booking.id, Some(resource_id), 3).await;
        attach_item(&fx, booking.id, Some(resource_id), 2).await;

        fx.service
            .confirm(booking.id, ConfirmBookingRequest { payment_reference: None })
            .await
            .unwrap();

        let cells = fx
            .capacity
            .get_cells(resource_id, &[start_date()])
            .await
            .unwrap();
        assert_eq!(cells[0].held_capacity, 5);
    }

    #[tokio::test]
    async fn test_second_confirm_is_rejected() {
        let fx = fixture();
        let booking = fx.service.create(create_request()).await.unwrap();
        fx.service
            .confirm(booking.id, ConfirmBookingRequest { payment_reference: None })
            .await
            .unwrap();

        let second = fx
            .service
            .confirm(booking.id, ConfirmBookingRequest { payment_reference: None })
            .await;
        assert!(matches!(
            second,
            Err(BookingError::InvalidStateTransition(_))
        ));
    }

    #[tokio::test]
    async fn test_expired_booking_cannot_confirm() {
        let fx = fixture();
        let booking = fx.service.create(create_request()).await.unwrap();

        // Force the deadline into the past
        let mut lapsed = fx.bookings.find_by_id(booking.id).await.unwrap().unwrap();
        lapsed.expires_at = Some(Utc::now() - Duration::minutes(1));
        fx.bookings.update(&lapsed).await.unwrap();

        let result = fx
            .service
            .confirm(booking.id, ConfirmBookingRequest { payment_reference: None })
            .await;
        assert!(matches!(
            result,
            Err(BookingError::InvalidStateTransition(_))
        ));

        // The lapsed hold was expired eagerly
        let stored = fx.bookings.find_by_id(booking.id).await.unwrap().unwrap();
        assert_eq!(stored.status, BookingStatus::Expired);
    }

    #[tokio::test]
    async fn test_confirm_consumes_promo_usage_once() {
        let fx = fixture();
        let rule = CreateRuleRequest {
            code: "ONCE10".to_string(),
            name: "One per customer".to_string(),
            discount_type: DiscountType::Percentage,
            discount_percentage: Some(dec!(10)),
            discount_amount: None,
            conditions: vec![RuleCondition::PromoCodeIs {
                code: "ONCE10".to_string(),
            }],
            valid_from: None,
            valid_until: None,
            max_uses: None,
            max_uses_per_customer: 1,
            priority: 0,
            is_active: true,
            is_combinable: false,
        }
        .into_rule();
        fx.rules.create_rule(&rule).await.unwrap();

        let customer_id = Uuid::new_v4();
        let mut request = create_request();
        request.customer_id = customer_id;
        request.promo_code = Some("ONCE10".to_string());
        let first = fx.service.create(request.clone()).await.unwrap();

        let confirmed = fx
            .service
            .confirm(first.id, ConfirmBookingRequest { payment_reference: None })
            .await
            .unwrap();
        assert_eq!(confirmed.discount_amount, dec!(100.00));
        assert_eq!(confirmed.applied_rules, vec![rule.id]);

        // Same customer, same code: the rule is burned, and because the
        // code can no longer apply the whole create is a conflict
        let second = fx.service.create(request).await;
        assert!(matches!(
            second,
            Err(BookingError::Pricing(PricingError::RuleExpiredOrExhausted(_)))
        ));
    }

    #[tokio::test]
    async fn test_cancel_confirmed_releases_capacity() {
        let fx = fixture();
        let resource_id = seeded_resource(&fx, 10).await;
        let booking = fx.service.create(create_request()).await.unwrap();
        attach_item(&fx, booking.id, Some(resource_id), 4).await;
        fx.service
            .confirm(booking.id, ConfirmBookingRequest { payment_reference: None })
            .await
            .unwrap();

        let cancelled = fx
            .service
            .cancel(
                booking.id,
                CancelBookingRequest {
                    reason: "Change of plans".to_string(),
                    cancelled_by: Some("customer".to_string()),
                    refund_amount: None,
                },
            )
            .await
            .unwrap();
        assert_eq!(cancelled.status, BookingStatus::Cancelled);
        assert!(cancelled.cancelled_at.is_some());

        let cells = fx
            .capacity
            .get_cells(resource_id, &[start_date()])
            .await
            .unwrap();
        assert_eq!(cells[0].held_capacity, 0);
    }

    /// Delegating rule store that stalls the confirm-time rule fetch so a
    /// concurrent cancel can land inside the confirmation window
    struct StallingRuleStore {
        inner: InMemoryRuleStore,
        fetches: AtomicUsize,
    }

    #[async_trait]
    impl PricingRuleStore for StallingRuleStore {
        async fn create_rule(&self, rule: &PricingRule) -> Result<(), PricingError> {
            self.inner.create_rule(rule).await
        }

        async fn get_rules(&self) -> Result<Vec<PricingRule>, PricingError> {
            // The first fetch is the create-time preview; the second runs
            // inside the claimed confirmation
            if self.fetches.fetch_add(1, Ordering::SeqCst) == 1 {
                tokio::time::sleep(std::time::Duration::from_millis(200)).await;
            }
            self.inner.get_rules().await
        }

        async fn customer_uses(
            &self,
            rule_id: Uuid,
            customer_id: Uuid,
        ) -> Result<i32, PricingError> {
            self.inner.customer_uses(rule_id, customer_id).await
        }

        async fn try_consume(&self, rule_id: Uuid, customer_id: Uuid) -> Result<(), PricingError> {
            self.inner.try_consume(rule_id, customer_id).await
        }

        async fn rollback_consume(
            &self,
            rule_id: Uuid,
            customer_id: Uuid,
        ) -> Result<(), PricingError> {
            self.inner.rollback_consume(rule_id, customer_id).await
        }
    }

    #[tokio::test]
    async fn test_cancel_during_confirm_keeps_terminal_status() {
        let capacity = Arc::new(InMemoryCapacityLedger::new());
        let items = Arc::new(InMemoryReservationItemStore::new());
        let bookings = Arc::new(InMemoryBookingStore::new());
        let rules = Arc::new(StallingRuleStore {
            inner: InMemoryRuleStore::new(),
            fetches: AtomicUsize::new(0),
        });
        let service = BookingService::new(
            bookings.clone(),
            items.clone(),
            AvailabilityAllocator::new(capacity.clone()),
            PricingEngine::new(rules),
            Duration::minutes(30),
        );

        let resource = new_resource("Minibus", ResourceType::Vehicle);
        capacity.create_resource(&resource).await.unwrap();
        capacity
            .set_capacity(resource.id, &[start_date()], 10)
            .await
            .unwrap();

        let booking = service.create(create_request()).await.unwrap();
        let item = CreateReservationItemRequest {
            booking_id: booking.id,
            item_type: ReservationItemType::Transport,
            name: "Seat".to_string(),
            quantity: 4,
            unit_price: dec!(10),
            resource_id: Some(resource.id),
        }
        .into_item();
        items.create(&item).await.unwrap();

        let confirm = tokio::spawn({
            let service = service.clone();
            let id = booking.id;
            async move {
                service
                    .confirm(id, ConfirmBookingRequest { payment_reference: None })
                    .await
            }
        });
        // Let the confirm claim the row and stall in its rule fetch
        tokio::time::sleep(std::time::Duration::from_millis(50)).await;

        let cancelled = service
            .cancel(
                booking.id,
                CancelBookingRequest {
                    reason: "Changed my mind".to_string(),
                    cancelled_by: Some("customer".to_string()),
                    refund_amount: None,
                },
            )
            .await
            .unwrap();
        assert_eq!(cancelled.status, BookingStatus::Cancelled);

        // The racing confirm loses: the terminal status stands and its
        // capacity commit is undone
        let result = confirm.await.unwrap();
        assert!(matches!(
            result,
            Err(BookingError::InvalidStateTransition(_))
        ));

        let stored = bookings.find_by_id(booking.id).await.unwrap().unwrap();
        assert_eq!(stored.status, BookingStatus::Cancelled);
        assert!(stored.cancelled_at.is_some());

        let cells = capacity
            .get_cells(resource.id, &[start_date()])
            .await
            .unwrap();
        assert_eq!(cells[0].held_capacity, 0);
    }

    #[tokio::test]
    async fn test_paid_cancellation_with_refund_becomes_refunded() {
        let fx = fixture();
        let booking = fx.service.create(create_request()).await.unwrap();
        fx.service
            .confirm(
                booking.id,
                ConfirmBookingRequest {
                    payment_reference: Some("PAY-9".to_string()),
                },
            )
            .await
            .unwrap();

        let refunded = fx
            .service
            .cancel(
                booking.id,
                CancelBookingRequest {
                    reason: "Weather".to_string(),
                    cancelled_by: None,
                    refund_amount: Some(dec!(800)),
                },
            )
            .await
            .unwrap();
        assert_eq!(refunded.status, BookingStatus::Refunded);
        assert_eq!(refunded.payment_status, PaymentStatus::Refunded);
        assert_eq!(refunded.refund_amount, Some(dec!(800)));
    }

    #[tokio::test]
    async fn test_cancel_terminal_booking_rejected() {
        let fx = fixture();
        let booking = fx.service.create(create_request()).await.unwrap();
        let cancel = CancelBookingRequest {
            reason: "No".to_string(),
            cancelled_by: None,
            refund_amount: None,
        };
        fx.service.cancel(booking.id, cancel.clone()).await.unwrap();

        let second = fx.service.cancel(booking.id, cancel).await;
        assert!(matches!(
            second,
            Err(BookingError::InvalidStateTransition(_))
        ));
    }

    #[tokio::test]
    async fn test_expiry_sweep_expires_only_lapsed_pending() {
        let fx = fixture();
        let lapsed = fx.service.create(create_request()).await.unwrap();
        let fresh = fx.service.create(create_request()).await.unwrap();

        let mut row = fx.bookings.find_by_id(lapsed.id).await.unwrap().unwrap();
        row.expires_at = Some(Utc::now() - Duration::minutes(1));
        fx.bookings.update(&row).await.unwrap();

        let expired = fx.service.expire_due_bookings().await.unwrap();
        assert_eq!(expired, 1);

        let lapsed_row = fx.bookings.find_by_id(lapsed.id).await.unwrap().unwrap();
        assert_eq!(lapsed_row.status, BookingStatus::Expired);
        let fresh_row = fx.bookings.find_by_id(fresh.id).await.unwrap().unwrap();
        assert_eq!(fresh_row.status, BookingStatus::Pending);
    }
}

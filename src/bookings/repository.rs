// Booking persistence
//
// `transition_status` is the store-level compare-and-set the service relies
// on: it only moves a row whose current status still matches `from`, so
// concurrent confirm attempts and the expiry sweep serialize on it.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::PgPool;
use std::collections::HashMap;
use tokio::sync::RwLock;
use uuid::Uuid;

use crate::bookings::error::BookingError;
use crate::bookings::models::{Booking, BookingStatus};

#[async_trait]
pub trait BookingStore: Send + Sync {
    async fn create(&self, booking: &Booking) -> Result<(), BookingError>;

    async fn find_by_id(&self, id: Uuid) -> Result<Option<Booking>, BookingError>;

    /// Full-row update; the service owns the invariants
    async fn update(&self, booking: &Booking) -> Result<(), BookingError>;

    /// Full-row update that only lands while the stored status still matches
    /// `expected`. Returns `false` when the row is missing or its status
    /// moved underneath the caller, leaving the row untouched.
    async fn update_if_status(
        &self,
        booking: &Booking,
        expected: BookingStatus,
    ) -> Result<bool, BookingError>;

    /// Compare-and-set on status. Returns the updated row, or `None` when
    /// the booking is missing or its status no longer matches `from`.
    async fn transition_status(
        &self,
        id: Uuid,
        from: BookingStatus,
        to: BookingStatus,
    ) -> Result<Option<Booking>, BookingError>;

    /// Pending bookings whose hold window has lapsed
    async fn find_expired_pending(
        &self,
        now: DateTime<Utc>,
    ) -> Result<Vec<Booking>, BookingError>;
}

/// In-memory booking store; the CAS runs under a single write guard
pub struct InMemoryBookingStore {
    bookings: RwLock<HashMap<Uuid, Booking>>,
}

impl InMemoryBookingStore {
    pub fn new() -> Self {
        Self {
            bookings: RwLock::new(HashMap::new()),
        }
    }
}

impl Default for InMemoryBookingStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl BookingStore for InMemoryBookingStore {
    async fn create(&self, booking: &Booking) -> Result<(), BookingError> {
        let mut bookings = self.bookings.write().await;
        bookings.insert(booking.id, booking.clone());
        Ok(())
    }

    async fn find_by_id(&self, id: Uuid) -> Result<Option<Booking>, BookingError> {
        let bookings = self.bookings.read().await;
        Ok(bookings.get(&id).cloned())
    }

    async fn update(&self, booking: &Booking) -> Result<(), BookingError> {
        let mut bookings = self.bookings.write().await;
        if !bookings.contains_key(&booking.id) {
            return Err(BookingError::NotFound(booking.id));
        }
        let mut updated = booking.clone();
        updated.updated_at = Utc::now();
        bookings.insert(booking.id, updated);
        Ok(())
    }

    async fn update_if_status(
        &self,
        booking: &Booking,
        expected: BookingStatus,
    ) -> Result<bool, BookingError> {
        let mut bookings = self.bookings.write().await;
        match bookings.get(&booking.id) {
            Some(current) if current.status == expected => {
                let mut updated = booking.clone();
                updated.updated_at = Utc::now();
                bookings.insert(booking.id, updated);
                Ok(true)
            }
            _ => Ok(false),
        }
    }

    async fn transition_status(
        &self,
        id: Uuid,
        from: BookingStatus,
        to: BookingStatus,
    ) -> Result<Option<Booking>, BookingError> {
        let mut bookings = self.bookings.write().await;
        match bookings.get_mut(&id) {
            Some(booking) if booking.status == from => {
                booking.status = to;
                booking.updated_at = Utc::now();
                Ok(Some(booking.clone()))
            }
            _ => Ok(None),
        }
    }

    async fn find_expired_pending(
        &self,
        now: DateTime<Utc>,
    ) -> Result<Vec<Booking>, BookingError> {
        let bookings = self.bookings.read().await;
        Ok(bookings
            .values()
            .filter(|b| {
                b.status == BookingStatus::Pending
                    && b.expires_at.map(|at| at < now).unwrap_or(false)
            })
            .cloned()
            .collect())
    }
}

/// Postgres-backed booking store
pub struct PgBookingStore {
    pool: PgPool,
}

impl PgBookingStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl BookingStore for PgBookingStore {
    async fn create(&self, booking: &Booking) -> Result<(), BookingError> {
        sqlx::query(
            r#"
            INSERT INTO bookings
                (id, customer_id, service_type, status, pax_count, lead_name, lead_email,
                 lead_phone, start_date, end_date, base_price, discount_amount, total_price,
                 currency, customer_segment, promo_code, payment_status, payment_reference,
                 applied_rules, cancellation_reason, cancelled_by, cancelled_at, refund_amount,
                 confirmed_at, expires_at, created_at, updated_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14, $15, $16,
                    $17, $18, $19, $20, $21, $22, $23, $24, $25, $26, $27)
            "#,
        )
        .bind(booking.id)
        .bind(booking.customer_id)
        .bind(booking.service_type)
        .bind(booking.status)
        .bind(booking.pax_count)
        .bind(&booking.lead_name)
        .bind(&booking.lead_email)
        .bind(&booking.lead_phone)
        .bind(booking.start_date)
        .bind(booking.end_date)
        .bind(booking.base_price)
        .bind(booking.discount_amount)
        .bind(booking.total_price)
        .bind(&booking.currency)
        .bind(booking.customer_segment)
        .bind(&booking.promo_code)
        .bind(booking.payment_status)
        .bind(&booking.payment_reference)
        .bind(&booking.applied_rules)
        .bind(&booking.cancellation_reason)
        .bind(&booking.cancelled_by)
        .bind(booking.cancelled_at)
        .bind(booking.refund_amount)
        .bind(booking.confirmed_at)
        .bind(booking.expires_at)
        .bind(booking.created_at)
        .bind(booking.updated_at)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn find_by_id(&self, id: Uuid) -> Result<Option<Booking>, BookingError> {
        let booking = sqlx::query_as::<_, Booking>("SELECT * FROM bookings WHERE id = $1")
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;
        Ok(booking)
    }

    async fn update(&self, booking: &Booking) -> Result<(), BookingError> {
        let result = sqlx::query(
            r#"
            UPDATE bookings SET
                status = $2, pax_count = $3, lead_name = $4, lead_email = $5,
                lead_phone = $6, start_date = $7, end_date = $8, base_price = $9,
                discount_amount = $10, total_price = $11, currency = $12,
                customer_segment = $13, promo_code = $14, payment_status = $15,
                payment_reference = $16, applied_rules = $17, cancellation_reason = $18,
                cancelled_by = $19, cancelled_at = $20, refund_amount = $21,
                confirmed_at = $22, expires_at = $23, updated_at = NOW()
            WHERE id = $1
            "#,
        )
        .bind(booking.id)
        .bind(booking.status)
        .bind(booking.pax_count)
        .bind(&booking.lead_name)
        .bind(&booking.lead_email)
        .bind(&booking.lead_phone)
        .bind(booking.start_date)
        .bind(booking.end_date)
        .bind(booking.base_price)
        .bind(booking.discount_amount)
        .bind(booking.total_price)
        .bind(&booking.currency)
        .bind(booking.customer_segment)
        .bind(&booking.promo_code)
        .bind(booking.payment_status)
        .bind(&booking.payment_reference)
        .bind(&booking.applied_rules)
        .bind(&booking.cancellation_reason)
        .bind(&booking.cancelled_by)
        .bind(booking.cancelled_at)
        .bind(booking.refund_amount)
        .bind(booking.confirmed_at)
        .bind(booking.expires_at)
        .execute(&self.pool)
        .await?;

        if result.rows_affected() == 0 {
            return Err(BookingError::NotFound(booking.id));
        }
        Ok(())
    }

    async fn update_if_status(
        &self,
        booking: &Booking,
        expected: BookingStatus,
    ) -> Result<bool, BookingError> {
        let result = sqlx::query(
            r#"
            UPDATE bookings SET
                status = $2, pax_count = $3, lead_name = $4, lead_email = $5,
                lead_phone = $6, start_date = $7, end_date = $8, base_price = $9,
                discount_amount = $10, total_price = $11, currency = $12,
                customer_segment = $13, promo_code = $14, payment_status = $15,
                payment_reference = $16, applied_rules = $17, cancellation_reason = $18,
                cancelled_by = $19, cancelled_at = $20, refund_amount = $21,
                confirmed_at = $22, expires_at = $23, updated_at = NOW()
            WHERE id = $1 AND status = $24
            "#,
        )
        .bind(booking.id)
        .bind(booking.status)
        .bind(booking.pax_count)
        .bind(&booking.lead_name)
        .bind(&booking.lead_email)
        .bind(&booking.lead_phone)
        .bind(booking.start_date)
        .bind(booking.end_date)
        .bind(booking.base_price)
        .bind(booking.discount_amount)
        .bind(booking.total_price)
        .bind(&booking.currency)
        .bind(booking.customer_segment)
        .bind(&booking.promo_code)
        .bind(booking.payment_status)
        .bind(&booking.payment_reference)
        .bind(&booking.applied_rules)
        .bind(&booking.cancellation_reason)
        .bind(&booking.cancelled_by)
        .bind(booking.cancelled_at)
        .bind(booking.refund_amount)
        .bind(booking.confirmed_at)
        .bind(booking.expires_at)
        .bind(expected)
        .execute(&self.pool)
        .await?;
        Ok(result.rows_affected() > 0)
    }

    async fn transition_status(
        &self,
        id: Uuid,
        from: BookingStatus,
        to: BookingStatus,
    ) -> Result<Option<Booking>, BookingError> {
        let booking = sqlx::query_as::<_, Booking>(
            r#"
            UPDATE bookings
            SET status = $3, updated_at = NOW()
            WHERE id = $1 AND status = $2
            RETURNING *
            "#,
        )
        .bind(id)
        .bind(from)
        .bind(to)
        .fetch_optional(&self.pool)
        .await?;
        Ok(booking)
    }

    async fn find_expired_pending(
        &self,
        now: DateTime<Utc>,
    ) -> Result<Vec<Booking>, BookingError> {
        let bookings = sqlx::query_as::<_, Booking>(
            "SELECT * FROM bookings WHERE status = 'pending' AND expires_at < $1",
        )
        .bind(now)
        .fetch_all(&self.pool)
        .await?;
        Ok(bookings)
    }
}

/// Test fixture shared by the booking unit and integration tests
#[cfg(test)]
pub(crate) fn pending_booking() -> Booking {
    use crate::models::ServiceType;
    use chrono::Duration;
    use rust_decimal::Decimal;

    let now = Utc::now();
    Booking {
        id: Uuid::new_v4(),
        customer_id: Uuid::new_v4(),
        service_type: ServiceType::Tour,
        status: BookingStatus::Pending,
        pax_count: 2,
        lead_name: "Jane Doe".to_string(),
        lead_email: "jane@example.com".to_string(),
        lead_phone: None,
        start_date: now.date_naive() + Duration::days(14),
        end_date: None,
        base_price: Decimal::from(500),
        discount_amount: Decimal::ZERO,
        total_price: Decimal::from(500),
        currency: "USD".to_string(),
        customer_segment: None,
        promo_code: None,
        payment_status: crate::bookings::PaymentStatus::Unpaid,
        payment_reference: None,
        applied_rules: vec![],
        cancellation_reason: None,
        cancelled_by: None,
        cancelled_at: None,
        refund_amount: None,
        confirmed_at: None,
        expires_at: Some(now + Duration::minutes(30)),
        created_at: now,
        updated_at: now,
    }
}

use async_trait::async_trait;
use chrono::Utc;
use sqlx::PgPool;
use std::collections::HashMap;
use tokio::sync::RwLock;
use uuid::Uuid;

use crate::reservation_items::error::ReservationItemError;
use crate::reservation_items::models::ReservationItem;

#[async_trait]
pub trait ReservationItemStore: Send + Sync {
    async fn create(&self, item: &ReservationItem) -> Result<(), ReservationItemError>;

    async fn find_by_id(&self, id: Uuid) -> Result<Option<ReservationItem>, ReservationItemError>;

    /// Items for one booking, oldest first
    async fn list_by_booking(
        &self,
        booking_id: Uuid,
    ) -> Result<Vec<ReservationItem>, ReservationItemError>;

    async fn update(&self, item: &ReservationItem) -> Result<(), ReservationItemError>;
}

/// In-memory item store
pub struct InMemoryReservationItemStore {
    items: RwLock<HashMap<Uuid, ReservationItem>>,
}

impl InMemoryReservationItemStore {
    pub fn new() -> Self {
        Self {
            items: RwLock::new(HashMap::new()),
        }
    }
}

impl Default for InMemoryReservationItemStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl ReservationItemStore for InMemoryReservationItemStore {
    async fn create(&self, item: &ReservationItem) -> Result<(), ReservationItemError> {
        let mut items = self.items.write().await;
        items.insert(item.id, item.clone());
        Ok(())
    }

    async fn find_by_id(
        &self,
        id: Uuid,
    ) -> Result<Option<ReservationItem>, ReservationItemError> {
        let items = self.items.read().await;
        Ok(items.get(&id).cloned())
    }

    async fn list_by_booking(
        &self,
        booking_id: Uuid,
    ) -> Result<Vec<ReservationItem>, ReservationItemError> {
        let items = self.items.read().await;
        let mut result: Vec<ReservationItem> = items
            .values()
            .filter(|i| i.booking_id == booking_id)
            .cloned()
            .collect();
        result.sort_by(|a, b| a.created_at.cmp(&b.created_at).then(a.id.cmp(&b.id)));
        Ok(result)
    }

    async fn update(&self, item: &ReservationItem) -> Result<(), ReservationItemError> {
        let mut items = self.items.write().await;
        if !items.contains_key(&item.id) {
            return Err(ReservationItemError::NotFound(item.id));
        }
        let mut updated = item.clone();
        updated.updated_at = Utc::now();
        items.insert(item.id, updated);
        Ok(())
    }
}

/// Postgres-backed item store
pub struct PgReservationItemStore {
    pool: PgPool,
}

impl PgReservationItemStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl ReservationItemStore for PgReservationItemStore {
    async fn create(&self, item: &ReservationItem) -> Result<(), ReservationItemError> {
        sqlx::query(
            r#"
            INSERT INTO reservation_items
                (id, booking_id, item_type, name, quantity, unit_price, total_price,
                 resource_id, is_confirmed, is_cancelled, created_at, updated_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12)
            "#,
        )
        .bind(item.id)
        .bind(item.booking_id)
        .bind(item.item_type)
        .bind(&item.name)
        .bind(item.quantity)
        .bind(item.unit_price)
        .bind(item.total_price)
        .bind(item.resource_id)
        .bind(item.is_confirmed)
        .bind(item.is_cancelled)
        .bind(item.created_at)
        .bind(item.updated_at)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn find_by_id(
        &self,
        id: Uuid,
    ) -> Result<Option<ReservationItem>, ReservationItemError> {
        let item =
            sqlx::query_as::<_, ReservationItem>("SELECT * FROM reservation_items WHERE id = $1")
                .bind(id)
                .fetch_optional(&self.pool)
                .await?;
        Ok(item)
    }

    async fn list_by_booking(
        &self,
        booking_id: Uuid,
    ) -> Result<Vec<ReservationItem>, ReservationItemError> {
        let items = sqlx::query_as::<_, ReservationItem>(
            "SELECT * FROM reservation_items WHERE booking_id = $1 ORDER BY created_at, id",
        )
        .bind(booking_id)
        .fetch_all(&self.pool)
        .await?;
        Ok(items)
    }

    async fn update(&self, item: &ReservationItem) -> Result<(), ReservationItemError> {
        let result = sqlx::query(
            r#"
            UPDATE reservation_items SET
                name = $2, quantity = $3, unit_price = $4, total_price = $5,
                resource_id = $6, is_confirmed = $7, is_cancelled = $8, updated_at = NOW()
            WHERE id = $1
            "#,
        )
        .bind(item.id)
        .bind(&item.name)
        .bind(item.quantity)
        .bind(item.unit_price)
        .bind(item.total_price)
        .bind(item.resource_id)
        .bind(item.is_confirmed)
        .bind(item.is_cancelled)
        .execute(&self.pool)
        .await?;

        if result.rows_affected() == 0 {
            return Err(ReservationItemError::NotFound(item.id));
        }
        Ok(())
    }
}

// Capacity Ledger
//
// The only shared mutable state on the availability side is the
// per-(resource, date) capacity cell. Every mutation is an atomic
// check-and-update: in memory the whole check-and-debit runs under a single
// write guard, in Postgres it is a conditional UPDATE inside a transaction.
// Committed holds are recorded per (booking, resource) so that release is
// idempotent: a duplicate release finds no hold and becomes a no-op instead
// of a double credit.

use async_trait::async_trait;
use chrono::{NaiveDate, Utc};
use sqlx::{PgPool, Row};
use std::collections::HashMap;
use tokio::sync::RwLock;
use uuid::Uuid;

use crate::capacity::error::CapacityError;
use crate::capacity::models::{CapacityRecord, Resource};
use crate::models::ResourceType;

/// Storage contract for the capacity ledger
///
/// `commit` and `release` are the concurrency-critical operations; both are
/// single-shot and atomic per implementation. `get_cells` is a lock-free
/// read and may be stale by the time a commit runs.
#[async_trait]
pub trait CapacityStore: Send + Sync {
    /// Register a resource in the ledger
    async fn create_resource(&self, resource: &Resource) -> Result<(), CapacityError>;

    /// List resources, optionally filtered by type and/or explicit ids
    async fn list_resources(
        &self,
        resource_type: Option<ResourceType>,
        ids: Option<&[Uuid]>,
    ) -> Result<Vec<Resource>, CapacityError>;

    /// Create or resize capacity cells for the given dates. Resizing below
    /// the currently held amount is rejected.
    async fn set_capacity(
        &self,
        resource_id: Uuid,
        dates: &[NaiveDate],
        total_capacity: i32,
    ) -> Result<(), CapacityError>;

    /// Read the existing cells for the given dates (missing cells are simply
    /// absent from the result)
    async fn get_cells(
        &self,
        resource_id: Uuid,
        dates: &[NaiveDate],
    ) -> Result<Vec<CapacityRecord>, CapacityError>;

    /// Atomic check-and-debit across every date cell: either all cells have
    /// `available >= amount` and all are debited, or nothing changes and
    /// `InsufficientCapacity` names the first shortfall. Records a hold for
    /// (booking, resource) so the debit can be released exactly once.
    async fn commit(
        &self,
        booking_id: Uuid,
        resource_id: Uuid,
        dates: &[NaiveDate],
        amount: i32,
    ) -> Result<(), CapacityError>;

    /// Credit a previously committed hold back. Returns `true` when a hold
    /// was released, `false` when no hold existed (duplicate release; no-op).
    async fn release(&self, booking_id: Uuid, resource_id: Uuid) -> Result<bool, CapacityError>;
}

/// Hold record: what a booking has committed against a resource
#[derive(Debug, Clone)]
struct Hold {
    amount: i32,
    dates: Vec<NaiveDate>,
}

#[derive(Default)]
struct LedgerState {
    resources: HashMap<Uuid, Resource>,
    cells: HashMap<(Uuid, NaiveDate), CapacityRecord>,
    holds: HashMap<(Uuid, Uuid), Hold>,
}

/// In-memory capacity ledger
///
/// The whole ledger sits behind one RwLock; `commit` and `release` take the
/// write guard for the duration of the check-and-update, which is what makes
/// the per-cell mutation atomic under concurrent confirms.
pub struct InMemoryCapacityLedger {
    state: RwLock<LedgerState>,
}

impl InMemoryCapacityLedger {
    pub fn new() -> Self {
        Self {
            state: RwLock::new(LedgerState::default()),
        }
    }
}

impl Default for InMemoryCapacityLedger {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl CapacityStore for InMemoryCapacityLedger {
    async fn create_resource(&self, resource: &Resource) -> Result<(), CapacityError> {
        let mut state = self.state.write().await;
        state.resources.insert(resource.id, resource.clone());
        Ok(())
    }

    async fn list_resources(
        &self,
        resource_type: Option<ResourceType>,
        ids: Option<&[Uuid]>,
    ) -> Result<Vec<Resource>, CapacityError> {
        let state = self.state.read().await;
        let mut resources: Vec<Resource> = state
            .resources
            .values()
            .filter(|r| resource_type.map_or(true, |t| r.resource_type == t))
            .filter(|r| ids.map_or(true, |ids| ids.contains(&r.id)))
            .cloned()
            .collect();
        resources.sort_by_key(|r| (r.created_at, r.id));
        Ok(resources)
    }

    async fn set_capacity(
        &self,
        resource_id: Uuid,
        dates: &[NaiveDate],
        total_capacity: i32,
    ) -> Result<(), CapacityError> {
        let mut state = self.state.write().await;
        if !state.resources.contains_key(&resource_id) {
            return Err(CapacityError::ResourceNotFound(resource_id));
        }

        for date in dates {
            match state.cells.entry((resource_id, *date)) {
                std::collections::hash_map::Entry::Occupied(mut entry) => {
                    let cell = entry.get_mut();
                    if cell.held_capacity > total_capacity {
                        return Err(CapacityError::ValidationError(format!(
                            "cannot shrink capacity on {} below {} held units",
                            date, cell.held_capacity
                        )));
                    }
                    cell.total_capacity = total_capacity;
                }
                std::collections::hash_map::Entry::Vacant(entry) => {
                    entry.insert(CapacityRecord {
                        resource_id,
                        date: *date,
                        total_capacity,
                        held_capacity: 0,
                    });
                }
            }
        }
        Ok(())
    }

    async fn get_cells(
        &self,
        resource_id: Uuid,
        dates: &[NaiveDate],
    ) -> Result<Vec<CapacityRecord>, CapacityError> {
        let state = self.state.read().await;
        Ok(dates
            .iter()
            .filter_map(|date| state.cells.get(&(resource_id, *date)).cloned())
            .collect())
    }

    async fn commit(
        &self,
        booking_id: Uuid,
        resource_id: Uuid,
        dates: &[NaiveDate],
        amount: i32,
    ) -> Result<(), CapacityError> {
        let mut state = self.state.write().await;

        if state.holds.contains_key(&(booking_id, resource_id)) {
            return Err(CapacityError::AlreadyCommitted {
                booking_id,
                resource_id,
            });
        }

        // Check every cell before touching any: all-or-nothing across the span
        for date in dates {
            let available = state
                .cells
                .get(&(resource_id, *date))
                .map(|c| c.available_capacity())
                .unwrap_or(0);
            if available < amount {
                return Err(CapacityError::InsufficientCapacity {
                    resource_id,
                    date: *date,
                    requested: amount,
                    available,
                });
            }
        }

        for date in dates {
            if let Some(cell) = state.cells.get_mut(&(resource_id, *date)) {
                cell.held_capacity += amount;
            }
        }
        state.holds.insert(
            (booking_id, resource_id),
            Hold {
                amount,
                dates: dates.to_vec(),
            },
        );

        tracing::debug!(
            "Committed {} units of resource {} for booking {} across {} cells",
            amount,
            resource_id,
            booking_id,
            dates.len()
        );
        Ok(())
    }

    async fn release(&self, booking_id: Uuid, resource_id: Uuid) -> Result<bool, CapacityError> {
        let mut state = self.state.write().await;

        let hold = match state.holds.remove(&(booking_id, resource_id)) {
            Some(hold) => hold,
            None => {
                tracing::debug!(
                    "No hold for booking {} on resource {}; release is a no-op",
                    booking_id,
                    resource_id
                );
                return Ok(false);
            }
        };

        for date in &hold.dates {
            if let Some(cell) = state.cells.get_mut(&(resource_id, *date)) {
                cell.held_capacity = (cell.held_capacity - hold.amount).max(0);
            }
        }

        tracing::debug!(
            "Released {} units of resource {} for booking {}",
            hold.amount,
            resource_id,
            booking_id
        );
        Ok(true)
    }
}

/// Postgres-backed capacity ledger
///
/// The check-and-debit is a single conditional UPDATE per cell inside one
/// transaction; a zero-row update means the cell was missing or short, and
/// the transaction rolls back untouched. Holds live in `capacity_holds` with
/// a (booking_id, resource_id) primary key.
pub struct PgCapacityLedger {
    pool: PgPool,
}

impl PgCapacityLedger {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl CapacityStore for PgCapacityLedger {
    async fn create_resource(&self, resource: &Resource) -> Result<(), CapacityError> {
        sqlx::query(
            "INSERT INTO resources (id, name, resource_type, created_at) VALUES ($1, $2, $3, $4)",
        )
        .bind(resource.id)
        .bind(&resource.name)
        .bind(resource.resource_type)
        .bind(resource.created_at)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn list_resources(
        &self,
        resource_type: Option<ResourceType>,
        ids: Option<&[Uuid]>,
    ) -> Result<Vec<Resource>, CapacityError> {
        let resources = sqlx::query_as::<_, Resource>(
            r#"
            SELECT id, name, resource_type, created_at
            FROM resources
            WHERE ($1::varchar IS NULL OR resource_type = $1)
              AND ($2::uuid[] IS NULL OR id = ANY($2))
            ORDER BY created_at, id
            "#,
        )
        .bind(resource_type.map(|t| t.to_string()))
        .bind(ids.map(|ids| ids.to_vec()))
        .fetch_all(&self.pool)
        .await?;
        Ok(resources)
    }

    async fn set_capacity(
        &self,
        resource_id: Uuid,
        dates: &[NaiveDate],
        total_capacity: i32,
    ) -> Result<(), CapacityError> {
        let exists: Option<bool> =
            sqlx::query_scalar("SELECT EXISTS(SELECT 1 FROM resources WHERE id = $1)")
                .bind(resource_id)
                .fetch_one(&self.pool)
                .await?;
        if !exists.unwrap_or(false) {
            return Err(CapacityError::ResourceNotFound(resource_id));
        }

        let mut tx = self.pool.begin().await?;
        for date in dates {
            let result = sqlx::query(
                r#"
                INSERT INTO capacity_records (resource_id, date, total_capacity, held_capacity)
                VALUES ($1, $2, $3, 0)
                ON CONFLICT (resource_id, date)
                DO UPDATE SET total_capacity = EXCLUDED.total_capacity
                WHERE capacity_records.held_capacity <= EXCLUDED.total_capacity
                "#,
            )
            .bind(resource_id)
            .bind(date)
            .bind(total_capacity)
            .execute(&mut *tx)
            .await?;

            if result.rows_affected() == 0 {
                return Err(CapacityError::ValidationError(format!(
                    "cannot shrink capacity on {} below currently held units",
                    date
                )));
            }
        }
        tx.commit().await?;
        Ok(())
    }

    async fn get_cells(
        &self,
        resource_id: Uuid,
        dates: &[NaiveDate],
    ) -> Result<Vec<CapacityRecord>, CapacityError> {
        let cells = sqlx::query_as::<_, CapacityRecord>(
            r#"
            SELECT resource_id, date, total_capacity, held_capacity
            FROM capacity_records
            WHERE resource_id = $1 AND date = ANY($2)
            ORDER BY date
            "#,
        )
        .bind(resource_id)
        .bind(dates.to_vec())
        .fetch_all(&self.pool)
        .await?;
        Ok(cells)
    }

    async fn commit(
        &self,
        booking_id: Uuid,
        resource_id: Uuid,
        dates: &[NaiveDate],
        amount: i32,
    ) -> Result<(), CapacityError> {
        let mut tx = self.pool.begin().await?;

        for date in dates {
            let result = sqlx::query(
                r#"
                UPDATE capacity_records
                SET held_capacity = held_capacity + $3
                WHERE resource_id = $1 AND date = $2
                  AND total_capacity - held_capacity >= $3
                "#,
            )
            .bind(resource_id)
            .bind(date)
            .bind(amount)
            .execute(&mut *tx)
            .await?;

            if result.rows_affected() == 0 {
                // Rolled back on drop; report what the client raced against
                let available: Option<i32> = sqlx::query_scalar(
                    "SELECT total_capacity - held_capacity FROM capacity_records
                     WHERE resource_id = $1 AND date = $2",
                )
                .bind(resource_id)
                .bind(date)
                .fetch_optional(&self.pool)
                .await?;

                return Err(CapacityError::InsufficientCapacity {
                    resource_id,
                    date: *date,
                    requested: amount,
                    available: available.unwrap_or(0),
                });
            }
        }

        let start = dates.first().copied();
        let end = dates.last().copied();
        let hold = sqlx::query(
            r#"
            INSERT INTO capacity_holds (booking_id, resource_id, amount, start_date, end_date)
            VALUES ($1, $2, $3, $4, $5)
            ON CONFLICT (booking_id, resource_id) DO NOTHING
            "#,
        )
        .bind(booking_id)
        .bind(resource_id)
        .bind(amount)
        .bind(start)
        .bind(end)
        .execute(&mut *tx)
        .await?;

        if hold.rows_affected() == 0 {
            return Err(CapacityError::AlreadyCommitted {
                booking_id,
                resource_id,
            });
        }

        tx.commit().await?;
        Ok(())
    }

    async fn release(&self, booking_id: Uuid, resource_id: Uuid) -> Result<bool, CapacityError> {
        let mut tx = self.pool.begin().await?;

        let hold = sqlx::query(
            r#"
            DELETE FROM capacity_holds
            WHERE booking_id = $1 AND resource_id = $2
            RETURNING amount, start_date, end_date
            "#,
        )
        .bind(booking_id)
        .bind(resource_id)
        .fetch_optional(&mut *tx)
        .await?;

        let row = match hold {
            Some(row) => row,
            None => return Ok(false),
        };

        let amount: i32 = row.get("amount");
        let start_date: NaiveDate = row.get("start_date");
        let end_date: NaiveDate = row.get("end_date");

        sqlx::query(
            r#"
            UPDATE capacity_records
            SET held_capacity = GREATEST(held_capacity - $3, 0)
            WHERE resource_id = $1 AND date BETWEEN $2 AND $4
            "#,
        )
        .bind(resource_id)
        .bind(start_date)
        .bind(amount)
        .bind(end_date)
        .execute(&mut *tx)
        .await?;

        tx.commit().await?;
        Ok(true)
    }
}

/// Convenience constructor for a freshly registered resource
pub fn new_resource(name: &str, resource_type: ResourceType) -> Resource {
    Resource {
        id: Uuid::new_v4(),
        name: name.to_string(),
        resource_type,
        created_at: Utc::now(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::validation::date_span;

    fn date(d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(2025, 7, d).unwrap()
    }

    async fn seeded_ledger(total: i32, from: u32, to: u32) -> (InMemoryCapacityLedger, Uuid) {
        let ledger = InMemoryCapacityLedger::new();
        let resource = new_resource("Land Cruiser 1", ResourceType::Vehicle);
        let id = resource.id;
        ledger.create_resource(&resource).await.unwrap();
        ledger
            .set_capacity(id, &date_span(date(from), Some(date(to))), total)
            .await
            .unwrap();
        (ledger, id)
    }

    #[tokio::test]
    async fn test_commit_debits_every_cell_in_range() {
        let (ledger, rid) = seeded_ledger(10, 1, 3).await;
        let booking = Uuid::new_v4();
        let dates = date_span(date(1), Some(date(3)));

        ledger.commit(booking, rid, &dates, 4).await.unwrap();

        for cell in ledger.get_cells(rid, &dates).await.unwrap() {
            assert_eq!(cell.held_capacity, 4);
            assert_eq!(cell.available_capacity(), 6);
        }
    }

    #[tokio::test]
    async fn test_commit_is_all_or_nothing_across_span() {
        let (ledger, rid) = seeded_ledger(10, 1, 3).await;
        // Drain the middle day so the span cannot be satisfied
        ledger
            .commit(Uuid::new_v4(), rid, &[date(2)], 8)
            .await
            .unwrap();

        let result = ledger
            .commit(Uuid::new_v4(), rid, &date_span(date(1), Some(date(3))), 4)
            .await;
        assert!(matches!(
            result,
            Err(CapacityError::InsufficientCapacity { available: 2, .. })
        ));

        // Days 1 and 3 must be untouched by the failed commit
        let cells = ledger
            .get_cells(rid, &[date(1), date(3)])
            .await
            .unwrap();
        assert!(cells.iter().all(|c| c.held_capacity == 0));
    }

    #[tokio::test]
    async fn test_missing_cell_counts_as_zero() {
        let (ledger, rid) = seeded_ledger(10, 1, 2).await;
        // Day 3 was never seeded
        let result = ledger
            .commit(Uuid::new_v4(), rid, &date_span(date(1), Some(date(3))), 1)
            .await;
        assert!(matches!(
            result,
            Err(CapacityError::InsufficientCapacity { available: 0, .. })
        ));
    }

    #[tokio::test]
    async fn test_release_round_trips_and_duplicate_is_noop() {
        let (ledger, rid) = seeded_ledger(12, 1, 1).await;
        let booking = Uuid::new_v4();

        ledger.commit(booking, rid, &[date(1)], 4).await.unwrap();
        assert_eq!(
            ledger.get_cells(rid, &[date(1)]).await.unwrap()[0].held_capacity,
            4
        );

        assert!(ledger.release(booking, rid).await.unwrap());
        assert_eq!(
            ledger.get_cells(rid, &[date(1)]).await.unwrap()[0].held_capacity,
            0
        );

        // Second release finds no hold: no double credit
        assert!(!ledger.release(booking, rid).await.unwrap());
        assert_eq!(
            ledger.get_cells(rid, &[date(1)]).await.unwrap()[0].held_capacity,
            0
        );
    }

    #[tokio::test]
    async fn test_double_commit_same_booking_rejected() {
        let (ledger, rid) = seeded_ledger(12, 1, 1).await;
        let booking = Uuid::new_v4();
        ledger.commit(booking, rid, &[date(1)], 2).await.unwrap();
        let result = ledger.commit(booking, rid, &[date(1)], 2).await;
        assert!(matches!(result, Err(CapacityError::AlreadyCommitted { .. })));
    }

    #[tokio::test]
    async fn test_shrink_below_held_rejected() {
        let (ledger, rid) = seeded_ledger(10, 1, 1).await;
        ledger
            .commit(Uuid::new_v4(), rid, &[date(1)], 6)
            .await
            .unwrap();
        let result = ledger.set_capacity(rid, &[date(1)], 5).await;
        assert!(matches!(result, Err(CapacityError::ValidationError(_))));
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_concurrent_commits_never_oversell() {
        let (ledger, rid) = seeded_ledger(12, 1, 1).await;
        let ledger = std::sync::Arc::new(ledger);

        let mut handles = Vec::new();
        for _ in 0..8 {
            let ledger = ledger.clone();
            handles.push(tokio::spawn(async move {
                ledger.commit(Uuid::new_v4(), rid, &[date(1)], 4).await
            }));
        }

        let mut successes = 0;
        for handle in handles {
            if handle.await.unwrap().is_ok() {
                successes += 1;
            }
        }

        // 12 / 4 = exactly 3 winners, no matter the interleaving
        assert_eq!(successes, 3);
        let cell = &ledger.get_cells(rid, &[date(1)]).await.unwrap()[0];
        assert_eq!(cell.held_capacity, 12);
        assert!(cell.held_capacity <= cell.total_capacity);
    }
}

// Pricing rule storage
//
// Usage counters (global current_uses, per-customer redemption counts) are
// the only mutable state here, and the check-and-increment is atomic per
// implementation: in memory it runs under one write guard, in Postgres it is
// a conditional UPDATE. `try_consume` is single-shot; callers decide whether
// to retry with fresh data.

use async_trait::async_trait;
use chrono::Utc;
use sqlx::{PgPool, Row};
use std::collections::HashMap;
use tokio::sync::RwLock;
use uuid::Uuid;

use crate::pricing::error::PricingError;
use crate::pricing::models::{PricingRule, RuleCondition};

/// Storage contract for pricing rules and their usage counters
#[async_trait]
pub trait PricingRuleStore: Send + Sync {
    /// Persist a new rule; rule codes are unique
    async fn create_rule(&self, rule: &PricingRule) -> Result<(), PricingError>;

    /// All rules, active or not; the engine filters
    async fn get_rules(&self) -> Result<Vec<PricingRule>, PricingError>;

    /// How many times this customer has redeemed this rule
    async fn customer_uses(&self, rule_id: Uuid, customer_id: Uuid)
        -> Result<i32, PricingError>;

    /// Atomic check-and-increment of both the global counter and the
    /// per-customer count. Fails with `RuleExpiredOrExhausted` when either
    /// cap is already reached, leaving both counters untouched.
    async fn try_consume(&self, rule_id: Uuid, customer_id: Uuid) -> Result<(), PricingError>;

    /// Undo one `try_consume`, used when a confirm attempt fails after
    /// consuming usage. Floors at zero.
    async fn rollback_consume(&self, rule_id: Uuid, customer_id: Uuid)
        -> Result<(), PricingError>;
}

#[derive(Default)]
struct RuleState {
    rules: HashMap<Uuid, PricingRule>,
    customer_uses: HashMap<(Uuid, Uuid), i32>,
}

/// In-memory rule store; all counter mutations run under one write guard
pub struct InMemoryRuleStore {
    state: RwLock<RuleState>,
}

impl InMemoryRuleStore {
    pub fn new() -> Self {
        Self {
            state: RwLock::new(RuleState::default()),
        }
    }
}

impl Default for InMemoryRuleStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl PricingRuleStore for InMemoryRuleStore {
    async fn create_rule(&self, rule: &PricingRule) -> Result<(), PricingError> {
        let mut state = self.state.write().await;
        if state.rules.values().any(|r| r.code == rule.code) {
            return Err(PricingError::ValidationError(format!(
                "rule code '{}' already exists",
                rule.code
            )));
        }
        state.rules.insert(rule.id, rule.clone());
        Ok(())
    }

    async fn get_rules(&self) -> Result<Vec<PricingRule>, PricingError> {
        let state = self.state.read().await;
        Ok(state.rules.values().cloned().collect())
    }

    async fn customer_uses(
        &self,
        rule_id: Uuid,
        customer_id: Uuid,
    ) -> Result<i32, PricingError> {
        let state = self.state.read().await;
        Ok(*state.customer_uses.get(&(rule_id, customer_id)).unwrap_or(&0))
    }

    async fn try_consume(&self, rule_id: Uuid, customer_id: Uuid) -> Result<(), PricingError> {
        let mut state = self.state.write().await;

        let (max_uses, max_per_customer, current_uses) = {
            let rule = state
                .rules
                .get(&rule_id)
                .ok_or(PricingError::RuleNotFound(rule_id))?;
            (rule.max_uses, rule.max_uses_per_customer, rule.current_uses)
        };

        if let Some(max) = max_uses {
            if current_uses >= max {
                return Err(PricingError::RuleExpiredOrExhausted(format!(
                    "rule {} has no redemptions left",
                    rule_id
                )));
            }
        }

        let per_customer = *state.customer_uses.get(&(rule_id, customer_id)).unwrap_or(&0);
        if per_customer >= max_per_customer {
            return Err(PricingError::RuleExpiredOrExhausted(format!(
                "customer {} has exhausted rule {}",
                customer_id, rule_id
            )));
        }

        if let Some(rule) = state.rules.get_mut(&rule_id) {
            rule.current_uses += 1;
            rule.updated_at = Utc::now();
        }
        *state.customer_uses.entry((rule_id, customer_id)).or_insert(0) += 1;
        Ok(())
    }

    async fn rollback_consume(
        &self,
        rule_id: Uuid,
        customer_id: Uuid,
    ) -> Result<(), PricingError> {
        let mut state = self.state.write().await;
        if let Some(rule) = state.rules.get_mut(&rule_id) {
            rule.current_uses = (rule.current_uses - 1).max(0);
            rule.updated_at = Utc::now();
        }
        if let Some(uses) = state.customer_uses.get_mut(&(rule_id, customer_id)) {
            *uses = (*uses - 1).max(0);
        }
        Ok(())
    }
}

/// Postgres-backed rule store
///
/// Conditions are stored as a JSONB array of tagged objects; counters live
/// on the rule row plus a (rule_id, customer_id) usage table.
pub struct PgRuleStore {
    pool: PgPool,
}

impl PgRuleStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    fn rule_from_row(row: &sqlx::postgres::PgRow) -> Result<PricingRule, PricingError> {
        let conditions_json: serde_json::Value = row.get("conditions");
        let conditions: Vec<RuleCondition> = serde_json::from_value(conditions_json)
            .map_err(|e| PricingError::StoreError(format!("bad conditions payload: {}", e)))?;

        Ok(PricingRule {
            id: row.get("id"),
            code: row.get("code"),
            name: row.get("name"),
            discount_type: row.get("discount_type"),
            discount_percentage: row.get("discount_percentage"),
            discount_amount: row.get("discount_amount"),
            conditions,
            valid_from: row.get("valid_from"),
            valid_until: row.get("valid_until"),
            max_uses: row.get("max_uses"),
            max_uses_per_customer: row.get("max_uses_per_customer"),
            current_uses: row.get("current_uses"),
            priority: row.get("priority"),
            is_active: row.get("is_active"),
            is_combinable: row.get("is_combinable"),
            created_at: row.get("created_at"),
            updated_at: row.get("updated_at"),
        })
    }
}

#[async_trait]
impl PricingRuleStore for PgRuleStore {
    async fn create_rule(&self, rule: &PricingRule) -> Result<(), PricingError> {
        let conditions = serde_json::to_value(&rule.conditions)
            .map_err(|e| PricingError::StoreError(e.to_string()))?;

        sqlx::query(
            r#"
            INSERT INTO pricing_rules
                (id, code, name, discount_type, discount_percentage, discount_amount,
                 conditions, valid_from, valid_until, max_uses, max_uses_per_customer,
                 current_uses, priority, is_active, is_combinable, created_at, updated_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14, $15, $16, $17)
            "#,
        )
        .bind(rule.id)
        .bind(&rule.code)
        .bind(&rule.name)
        .bind(rule.discount_type)
        .bind(rule.discount_percentage)
        .bind(rule.discount_amount)
        .bind(conditions)
        .bind(rule.valid_from)
        .bind(rule.valid_until)
        .bind(rule.max_uses)
        .bind(rule.max_uses_per_customer)
        .bind(rule.current_uses)
        .bind(rule.priority)
        .bind(rule.is_active)
        .bind(rule.is_combinable)
        .bind(rule.created_at)
        .bind(rule.updated_at)
        .execute(&self.pool)
        .await
        .map_err(|e| match &e {
            sqlx::Error::Database(db) if db.is_unique_violation() => {
                PricingError::ValidationError(format!("rule code '{}' already exists", rule.code))
            }
            _ => PricingError::StoreError(e.to_string()),
        })?;
        Ok(())
    }

    async fn get_rules(&self) -> Result<Vec<PricingRule>, PricingError> {
        let rows = sqlx::query("SELECT * FROM pricing_rules ORDER BY priority, created_at, id")
            .fetch_all(&self.pool)
            .await?;
        rows.iter().map(Self::rule_from_row).collect()
    }

    async fn customer_uses(
        &self,
        rule_id: Uuid,
        customer_id: Uuid,
    ) -> Result<i32, PricingError> {
        let uses: Option<i32> = sqlx::query_scalar(
            "SELECT uses FROM rule_customer_usage WHERE rule_id = $1 AND customer_id = $2",
        )
        .bind(rule_id)
        .bind(customer_id)
        .fetch_optional(&self.pool)
        .await?;
        Ok(uses.unwrap_or(0))
    }

    async fn try_consume(&self, rule_id: Uuid, customer_id: Uuid) -> Result<(), PricingError> {
        let mut tx = self.pool.begin().await?;

        // Global cap: conditional increment, zero rows means exhausted
        let global = sqlx::query(
            r#"
            UPDATE pricing_rules
            SET current_uses = current_uses + 1, updated_at = NOW()
            WHERE id = $1 AND (max_uses IS NULL OR current_uses < max_uses)
            RETURNING max_uses_per_customer
            "#,
        )
        .bind(rule_id)
        .fetch_optional(&mut *tx)
        .await?;

        let max_per_customer: i32 = match global {
            Some(row) => row.get("max_uses_per_customer"),
            None => {
                let exists: Option<bool> =
                    sqlx::query_scalar("SELECT EXISTS(SELECT 1 FROM pricing_rules WHERE id = $1)")
                        .bind(rule_id)
                        .fetch_one(&self.pool)
                        .await?;
                if !exists.unwrap_or(false) {
                    return Err(PricingError::RuleNotFound(rule_id));
                }
                return Err(PricingError::RuleExpiredOrExhausted(format!(
                    "rule {} has no redemptions left",
                    rule_id
                )));
            }
        };

        // Per-customer cap: conditional upsert inside the same transaction
        let per_customer = sqlx::query(
            r#"
            INSERT INTO rule_customer_usage (rule_id, customer_id, uses)
            VALUES ($1, $2, 1)
            ON CONFLICT (rule_id, customer_id)
            DO UPDATE SET uses = rule_customer_usage.uses + 1
            WHERE rule_customer_usage.uses < $3
            "#,
        )
        .bind(rule_id)
        .bind(customer_id)
        .bind(max_per_customer)
        .execute(&mut *tx)
        .await?;

        if per_customer.rows_affected() == 0 {
            // Dropping the transaction rolls the global increment back
            return Err(PricingError::RuleExpiredOrExhausted(format!(
                "customer {} has exhausted rule {}",
                customer_id, rule_id
            )));
        }

        tx.commit().await?;
        Ok(())
    }

    async fn rollback_consume(
        &self,
        rule_id: Uuid,
        customer_id: Uuid,
    ) -> Result<(), PricingError> {
        let mut tx = self.pool.begin().await?;

        sqlx::query(
            r#"
            UPDATE pricing_rules
            SET current_uses = GREATEST(current_uses - 1, 0), updated_at = NOW()
            WHERE id = $1
            "#,
        )
        .bind(rule_id)
        .execute(&mut *tx)
        .await?;

        sqlx::query(
            r#"
            UPDATE rule_customer_usage
            SET uses = GREATEST(uses - 1, 0)
            WHERE rule_id = $1 AND customer_id = $2
            "#,
        )
        .bind(rule_id)
        .bind(customer_id)
        .execute(&mut *tx)
        .await?;

        tx.commit().await?;
        Ok(())
    }
}

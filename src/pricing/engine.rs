use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use std::sync::Arc;
use tracing::{debug, warn};
use uuid::Uuid;

use crate::pricing::error::PricingError;
use crate::pricing::models::{
    AppliedRule, PricingContext, PricingResult, PricingRule, RuleCondition,
};
use crate::pricing::store::PricingRuleStore;

/// Evaluates pricing rules against a booking context
///
/// Evaluation is pure with respect to usage counters: a quote can be taken
/// any number of times without consuming redemptions. Counters move only
/// through `consume_usage` at confirmation time.
#[derive(Clone)]
pub struct PricingEngine {
    store: Arc<dyn PricingRuleStore>,
}

impl PricingEngine {
    pub fn new(store: Arc<dyn PricingRuleStore>) -> Self {
        Self { store }
    }

    /// Computes the discounted price for a context
    ///
    /// Rules are filtered to those active, inside their validity window,
    /// not exhausted, and with every condition satisfied, then sorted by
    /// (priority, created_at, id). The best rule applies first; when it is
    /// combinable, following combinable rules stack on top until the first
    /// non-combinable rule ends the chain.
    ///
    /// # Arguments
    /// * `ctx` - Booking or quote context to evaluate against
    /// * `now` - Evaluation instant, used for validity windows and lead time
    ///
    /// # Returns
    /// * `Ok(PricingResult)` - Base price, total discount, and applied rules
    /// * `Err(PricingError::RuleExpiredOrExhausted)` - A promo code was
    ///   supplied but no applied rule carries it
    pub async fn evaluate(
        &self,
        ctx: &PricingContext,
        now: DateTime<Utc>,
    ) -> Result<PricingResult, PricingError> {
        let mut candidates: Vec<PricingRule> = Vec::new();
        for rule in self.store.get_rules().await? {
            if !self.is_candidate(&rule, ctx, now).await? {
                continue;
            }
            candidates.push(rule);
        }

        candidates.sort_by(|a, b| {
            a.priority
                .cmp(&b.priority)
                .then(a.created_at.cmp(&b.created_at))
                .then(a.id.cmp(&b.id))
        });

        let mut discount = Decimal::ZERO;
        let mut applied: Vec<AppliedRule> = Vec::new();

        for (index, rule) in candidates.iter().enumerate() {
            if index > 0 && !rule.is_combinable {
                break;
            }
            let slice = discount_for(rule, ctx.base_price, discount);
            if slice > Decimal::ZERO {
                discount += slice;
                applied.push(AppliedRule {
                    rule_id: rule.id,
                    code: rule.code.clone(),
                    discount_type: rule.discount_type,
                    discount_amount: slice,
                });
            }
            if index == 0 && !rule.is_combinable {
                break;
            }
        }

        // Total discount never exceeds the base price and never goes negative
        discount = discount.clamp(Decimal::ZERO, ctx.base_price);

        if let Some(code) = &ctx.promo_code {
            let code_applied = applied
                .iter()
                .any(|a| a.code.eq_ignore_ascii_case(code));
            if !code_applied {
                // An eligible code can still lose to a non-combinable rule
                // that sorts ahead of it; tell the client which case this is
                let shadowed = candidates
                    .iter()
                    .any(|r| r.code.eq_ignore_ascii_case(code));
                warn!(promo_code = %code, shadowed, "promo code supplied but not applied");
                let reason = if shadowed {
                    format!(
                        "promo code '{}' is valid but a higher-priority promotion takes precedence",
                        code
                    )
                } else {
                    format!("promo code '{}' is not applicable to this booking", code)
                };
                return Err(PricingError::RuleExpiredOrExhausted(reason));
            }
        }

        debug!(
            base_price = %ctx.base_price,
            discount = %discount,
            rules = applied.len(),
            "price evaluated"
        );

        Ok(PricingResult {
            base_price: ctx.base_price,
            discount_amount: discount,
            total_price: ctx.base_price - discount,
            applied_rules: applied,
        })
    }

    /// Consumes one redemption per applied rule, all or nothing
    ///
    /// On a cap failure partway through, rules already consumed in this call
    /// are rolled back before the error is returned.
    pub async fn consume_usage(
        &self,
        applied: &[AppliedRule],
        customer_id: Uuid,
    ) -> Result<(), PricingError> {
        let mut consumed: Vec<Uuid> = Vec::with_capacity(applied.len());
        for rule in applied {
            match self.store.try_consume(rule.rule_id, customer_id).await {
                Ok(()) => consumed.push(rule.rule_id),
                Err(e) => {
                    for rule_id in consumed {
                        if let Err(rb) = self.store.rollback_consume(rule_id, customer_id).await {
                            warn!(%rule_id, error = %rb, "usage rollback failed");
                        }
                    }
                    return Err(e);
                }
            }
        }
        Ok(())
    }

    /// Undoes a previous `consume_usage`, used by confirm compensation
    pub async fn rollback_usage(
        &self,
        applied: &[AppliedRule],
        customer_id: Uuid,
    ) -> Result<(), PricingError> {
        for rule in applied {
            self.store.rollback_consume(rule.rule_id, customer_id).await?;
        }
        Ok(())
    }

    async fn is_candidate(
        &self,
        rule: &PricingRule,
        ctx: &PricingContext,
        now: DateTime<Utc>,
    ) -> Result<bool, PricingError> {
        if !rule.is_active {
            return Ok(false);
        }
        if rule.valid_from > now {
            return Ok(false);
        }
        if let Some(until) = rule.valid_until {
            if until <= now {
                return Ok(false);
            }
        }
        if let Some(max) = rule.max_uses {
            if rule.current_uses >= max {
                return Ok(false);
            }
        }
        if let Some(customer_id) = ctx.customer_id {
            let uses = self.store.customer_uses(rule.id, customer_id).await?;
            if uses >= rule.max_uses_per_customer {
                return Ok(false);
            }
        }
        Ok(rule
            .conditions
            .iter()
            .all(|c| condition_holds(c, ctx, now)))
    }
}

fn condition_holds(condition: &RuleCondition, ctx: &PricingContext, now: DateTime<Utc>) -> bool {
    match condition {
        RuleCondition::MinPax { min_pax } => ctx.pax_count >= *min_pax,
        RuleCondition::ServiceTypeIs { service_type } => ctx.service_type == *service_type,
        RuleCondition::PromoCodeIs { code } => ctx
            .promo_code
            .as_deref()
            .map(|c| c.eq_ignore_ascii_case(code))
            .unwrap_or(false),
        RuleCondition::CustomerSegmentIs { segment } => ctx.customer_segment == Some(*segment),
        RuleCondition::MinLeadTimeDays { days } => {
            (ctx.start_date - now.date_naive()).num_days() >= *days
        }
        RuleCondition::MinItemCount { count } => ctx.item_count.unwrap_or(0) >= *count,
    }
}

/// Discount one rule contributes on top of what is already accumulated
///
/// Percentage-valued rules take their slice of the base price; fixed-amount
/// rules are capped so the cumulative discount never exceeds the base.
fn discount_for(rule: &PricingRule, base_price: Decimal, accumulated: Decimal) -> Decimal {
    let raw = if let Some(pct) = rule.discount_percentage {
        (base_price * pct / Decimal::from(100)).round_dp(2)
    } else if let Some(amount) = rule.discount_amount {
        amount
    } else {
        Decimal::ZERO
    };
    raw.min(base_price - accumulated).max(Decimal::ZERO)
}

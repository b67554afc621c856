use chrono::{DateTime, NaiveDate, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::fmt;
use utoipa::ToSchema;
use uuid::Uuid;
use validator::Validate;

use crate::models::{CustomerSegment, ServiceType};

/// How a rule's discount value is interpreted
///
/// EarlyBird, GroupDiscount, and BuyXGetY share the arithmetic of Percentage
/// or FixedAmount; what distinguishes them is the condition gate they are
/// normally paired with (lead time, pax threshold, item count).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type, ToSchema)]
#[sqlx(type_name = "varchar", rename_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum DiscountType {
    Percentage,
    FixedAmount,
    BuyXGetY,
    EarlyBird,
    GroupDiscount,
}

impl fmt::Display for DiscountType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DiscountType::Percentage => write!(f, "percentage"),
            DiscountType::FixedAmount => write!(f, "fixed_amount"),
            DiscountType::BuyXGetY => write!(f, "buy_x_get_y"),
            DiscountType::EarlyBird => write!(f, "early_bird"),
            DiscountType::GroupDiscount => write!(f, "group_discount"),
        }
    }
}

/// Condition predicate attached to a pricing rule
///
/// A closed set of kinds evaluated by a small interpreter, never free-form
/// expressions, so rule behavior stays auditable.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, ToSchema)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum RuleCondition {
    /// Booking party must have at least this many passengers
    MinPax { min_pax: i32 },

    /// Booking must be for this service type
    ServiceTypeIs { service_type: ServiceType },

    /// Context must carry exactly this promo code
    PromoCodeIs { code: String },

    /// Customer must belong to this segment
    CustomerSegmentIs { segment: CustomerSegment },

    /// Booking start date must be at least this many days out
    MinLeadTimeDays { days: i64 },

    /// Booking must carry at least this many reservation items
    MinItemCount { count: i32 },
}

/// A promotional pricing rule
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct PricingRule {
    pub id: Uuid,
    /// Unique short code, e.g. "EARLY25"
    pub code: String,
    pub name: String,
    pub discount_type: DiscountType,
    /// Exactly one of discount_percentage / discount_amount is set
    pub discount_percentage: Option<Decimal>,
    pub discount_amount: Option<Decimal>,
    pub conditions: Vec<RuleCondition>,
    pub valid_from: DateTime<Utc>,
    pub valid_until: Option<DateTime<Utc>>,
    /// Global redemption cap; None = unlimited
    pub max_uses: Option<i64>,
    pub max_uses_per_customer: i32,
    /// Monotonic redemption counter, incremented only at confirmation
    pub current_uses: i64,
    /// Lower value wins; ties break on (created_at, id)
    pub priority: i32,
    pub is_active: bool,
    /// Whether this rule may stack with other combinable rules
    pub is_combinable: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl PricingRule {
    /// Checks the percentage-xor-amount shape for this rule
    pub fn validate_discount_shape(&self) -> Result<(), String> {
        match (self.discount_percentage, self.discount_amount) {
            (Some(_), Some(_)) => {
                Err("discount_percentage and discount_amount are mutually exclusive".to_string())
            }
            (None, None) => {
                Err("one of discount_percentage or discount_amount is required".to_string())
            }
            (Some(pct), None) => {
                if pct <= Decimal::ZERO || pct > Decimal::from(100) {
                    Err("discount_percentage must be in (0, 100]".to_string())
                } else {
                    Ok(())
                }
            }
            (None, Some(amount)) => {
                if amount <= Decimal::ZERO {
                    Err("discount_amount must be positive".to_string())
                } else {
                    Ok(())
                }
            }
        }
    }

    /// Whether this rule requires a promo code to match
    pub fn required_promo_code(&self) -> Option<&str> {
        self.conditions.iter().find_map(|c| match c {
            RuleCondition::PromoCodeIs { code } => Some(code.as_str()),
            _ => None,
        })
    }
}

/// Everything the engine needs to evaluate rules for one booking or quote
#[derive(Debug, Clone)]
pub struct PricingContext {
    pub service_type: ServiceType,
    pub base_price: Decimal,
    pub pax_count: i32,
    pub start_date: NaiveDate,
    pub end_date: Option<NaiveDate>,
    pub customer_id: Option<Uuid>,
    pub customer_segment: Option<CustomerSegment>,
    pub promo_code: Option<String>,
    /// Number of reservation items, when known (confirm time)
    pub item_count: Option<i32>,
}

/// One rule that contributed to a computed discount
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct AppliedRule {
    pub rule_id: Uuid,
    pub code: String,
    pub discount_type: DiscountType,
    /// The slice of the total discount this rule produced
    pub discount_amount: Decimal,
}

/// Outcome of a rule evaluation; evaluation alone never consumes usage
#[derive(Debug, Clone)]
pub struct PricingResult {
    pub base_price: Decimal,
    pub discount_amount: Decimal,
    pub total_price: Decimal,
    /// Rules in the order they were applied, for auditability
    pub applied_rules: Vec<AppliedRule>,
}

/// Request body for POST /api/pricing/calculate
#[derive(Debug, Clone, Deserialize, Validate, ToSchema)]
pub struct CalculatePriceRequest {
    pub service_type: ServiceType,
    #[validate(custom = "crate::validation::validate_non_negative_amount")]
    pub base_price: Decimal,
    #[validate(range(min = 1, max = 50, message = "pax_count must be between 1 and 50"))]
    pub pax_count: i32,
    pub start_date: NaiveDate,
    pub end_date: Option<NaiveDate>,
    pub customer_id: Option<Uuid>,
    pub customer_segment: Option<CustomerSegment>,
    pub promo_code: Option<String>,
    pub item_count: Option<i32>,
    #[validate(custom = "crate::validation::validate_currency")]
    #[serde(default = "default_currency")]
    pub currency: String,
}

pub(crate) fn default_currency() -> String {
    "USD".to_string()
}

/// Response body for POST /api/pricing/calculate
#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct PriceQuoteResponse {
    pub base_price: Decimal,
    pub discount_amount: Decimal,
    pub total_price: Decimal,
    pub applied_rules: Vec<AppliedRule>,
    pub currency: String,
}

/// Request body for POST /api/pricing/rules
#[derive(Debug, Clone, Deserialize, Validate, ToSchema)]
pub struct CreateRuleRequest {
    #[validate(length(min = 1, max = 50))]
    pub code: String,
    #[validate(length(min = 1, max = 200))]
    pub name: String,
    pub discount_type: DiscountType,
    pub discount_percentage: Option<Decimal>,
    pub discount_amount: Option<Decimal>,
    #[serde(default)]
    pub conditions: Vec<RuleCondition>,
    pub valid_from: Option<DateTime<Utc>>,
    pub valid_until: Option<DateTime<Utc>>,
    pub max_uses: Option<i64>,
    #[serde(default = "default_max_uses_per_customer")]
    #[validate(range(min = 1))]
    pub max_uses_per_customer: i32,
    #[serde(default)]
    pub priority: i32,
    #[serde(default = "default_true")]
    pub is_active: bool,
    #[serde(default)]
    pub is_combinable: bool,
}

fn default_max_uses_per_customer() -> i32 {
    1
}

fn default_true() -> bool {
    true
}

impl CreateRuleRequest {
    /// Builds the stored rule, stamping id and timestamps
    pub fn into_rule(self) -> PricingRule {
        let now = Utc::now();
        PricingRule {
            id: Uuid::new_v4(),
            code: self.code,
            name: self.name,
            discount_type: self.discount_type,
            discount_percentage: self.discount_percentage,
            discount_amount: self.discount_amount,
            conditions: self.conditions,
            valid_from: self.valid_from.unwrap_or(now),
            valid_until: self.valid_until,
            max_uses: self.max_uses,
            max_uses_per_customer: self.max_uses_per_customer,
            current_uses: 0,
            priority: self.priority,
            is_active: self.is_active,
            is_combinable: self.is_combinable,
            created_at: now,
            updated_at: now,
        }
    }
}

// Pricing module
//
// Evaluates a booking context against the set of active promotional rules
// and produces a discount. Evaluation is read-only; usage counters are
// consumed only at booking confirmation, atomically with the capacity
// commit, so a pricing preview can never burn a promo redemption.

pub mod engine;
pub mod error;
pub mod handlers;
pub mod models;
pub mod store;

pub use engine::PricingEngine;
pub use error::PricingError;
pub use models::{
    AppliedRule, CalculatePriceRequest, CreateRuleRequest, DiscountType, PriceQuoteResponse,
    PricingContext, PricingResult, PricingRule, RuleCondition,
};
pub use store::{InMemoryRuleStore, PgRuleStore, PricingRuleStore};

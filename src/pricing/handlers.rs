// HTTP handlers for pricing endpoints

use axum::{extract::State, http::StatusCode, Json};
use chrono::Utc;
use validator::Validate;

use crate::pricing::error::PricingError;
use crate::pricing::models::{
    CalculatePriceRequest, CreateRuleRequest, PriceQuoteResponse, PricingContext, PricingRule,
};
use crate::validation::check_date_range;

/// Handler for POST /api/pricing/calculate
/// Read-only price quote; never consumes promo redemptions
#[utoipa::path(
    post,
    path = "/api/pricing/calculate",
    request_body = CalculatePriceRequest,
    responses(
        (status = 200, description = "Price quote", body = PriceQuoteResponse),
        (status = 400, description = "Invalid input"),
        (status = 409, description = "Promo code not applicable"),
    ),
    tag = "pricing"
)]
pub async fn calculate_price_handler(
    State(state): State<crate::AppState>,
    Json(request): Json<CalculatePriceRequest>,
) -> Result<Json<PriceQuoteResponse>, PricingError> {
    request
        .validate()
        .map_err(|e| PricingError::ValidationError(e.to_string()))?;
    check_date_range(request.start_date, request.end_date)
        .map_err(PricingError::ValidationError)?;

    let ctx = PricingContext {
        service_type: request.service_type,
        base_price: request.base_price,
        pax_count: request.pax_count,
        start_date: request.start_date,
        end_date: request.end_date,
        customer_id: request.customer_id,
        customer_segment: request.customer_segment,
        promo_code: request.promo_code.clone(),
        item_count: request.item_count,
    };

    let result = state.pricing.evaluate(&ctx, Utc::now()).await?;

    Ok(Json(PriceQuoteResponse {
        base_price: result.base_price,
        discount_amount: result.discount_amount,
        total_price: result.total_price,
        applied_rules: result.applied_rules,
        currency: request.currency,
    }))
}

/// Handler for POST /api/pricing/rules
#[utoipa::path(
    post,
    path = "/api/pricing/rules",
    request_body = CreateRuleRequest,
    responses(
        (status = 201, description = "Rule created", body = PricingRule),
        (status = 400, description = "Invalid rule definition"),
    ),
    tag = "pricing"
)]
pub async fn create_rule_handler(
    State(state): State<crate::AppState>,
    Json(request): Json<CreateRuleRequest>,
) -> Result<(StatusCode, Json<PricingRule>), PricingError> {
    request
        .validate()
        .map_err(|e| PricingError::ValidationError(e.to_string()))?;

    if let (Some(from), Some(until)) = (request.valid_from, request.valid_until) {
        if until <= from {
            return Err(PricingError::ValidationError(
                "valid_until must be after valid_from".to_string(),
            ));
        }
    }

    let rule = request.into_rule();
    rule.validate_discount_shape()
        .map_err(PricingError::ValidationError)?;

    state.rule_store.create_rule(&rule).await?;

    tracing::info!(
        "Created pricing rule {} ({}) priority={} combinable={}",
        rule.code,
        rule.id,
        rule.priority,
        rule.is_combinable
    );
    Ok((StatusCode::CREATED, Json(rule)))
}

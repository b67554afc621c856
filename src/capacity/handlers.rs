// HTTP handlers for availability and resource endpoints

use axum::{extract::State, http::StatusCode, Json};
use validator::Validate;

use crate::capacity::error::CapacityError;
use crate::capacity::ledger::new_resource;
use crate::capacity::models::{
    AvailabilityCheckRequest, AvailabilityReport, CreateResourceRequest, Resource,
};
use crate::validation::{check_date_range, date_span};

/// Handler for POST /api/availability/check
/// Advisory availability query; never reserves anything
#[utoipa::path(
    post,
    path = "/api/availability/check",
    request_body = AvailabilityCheckRequest,
    responses(
        (status = 200, description = "Availability report", body = AvailabilityReport),
        (status = 400, description = "Invalid query"),
    ),
    tag = "availability"
)]
pub async fn check_availability_handler(
    State(state): State<crate::AppState>,
    Json(request): Json<AvailabilityCheckRequest>,
) -> Result<Json<AvailabilityReport>, CapacityError> {
    tracing::debug!(
        "Availability check: type={:?} start={} required={}",
        request.resource_type,
        request.start_date,
        request.required_capacity
    );

    request
        .validate()
        .map_err(|e| CapacityError::ValidationError(e.to_string()))?;
    check_date_range(request.start_date, request.end_date)
        .map_err(CapacityError::ValidationError)?;

    let report = state
        .allocator
        .check(
            request.resource_type,
            request.resource_ids.as_deref(),
            request.start_date,
            request.end_date,
            request.required_capacity,
        )
        .await?;

    Ok(Json(report))
}

/// Handler for POST /api/resources
/// Registers a resource and seeds its capacity cells over the given span
#[utoipa::path(
    post,
    path = "/api/resources",
    request_body = CreateResourceRequest,
    responses(
        (status = 201, description = "Resource created", body = Resource),
        (status = 400, description = "Invalid input"),
    ),
    tag = "availability"
)]
pub async fn create_resource_handler(
    State(state): State<crate::AppState>,
    Json(request): Json<CreateResourceRequest>,
) -> Result<(StatusCode, Json<Resource>), CapacityError> {
    request
        .validate()
        .map_err(|e| CapacityError::ValidationError(e.to_string()))?;
    check_date_range(request.start_date, request.end_date)
        .map_err(CapacityError::ValidationError)?;

    let resource = new_resource(&request.name, request.resource_type);
    state.capacity_store.create_resource(&resource).await?;
    state
        .capacity_store
        .set_capacity(
            resource.id,
            &date_span(request.start_date, request.end_date),
            request.total_capacity,
        )
        .await?;

    tracing::info!(
        "Registered {} resource {} ({}) with capacity {}",
        resource.resource_type,
        resource.name,
        resource.id,
        request.total_capacity
    );
    Ok((StatusCode::CREATED, Json(resource)))
}

// HTTP handlers for booking lifecycle endpoints

use axum::{
    extract::{Path, State},
    http::StatusCode,
    Json,
};
use uuid::Uuid;
use validator::Validate;

use crate::bookings::error::BookingError;
use crate::bookings::models::{
    Booking, CancelBookingRequest, ConfirmBookingRequest, CreateBookingRequest,
};
use crate::validation::check_date_range;

/// Handler for POST /api/bookings
#[utoipa::path(
    post,
    path = "/api/bookings",
    request_body = CreateBookingRequest,
    responses(
        (status = 201, description = "Pending booking created", body = Booking),
        (status = 400, description = "Invalid input"),
        (status = 409, description = "Promo code not applicable"),
    ),
    tag = "bookings"
)]
pub async fn create_booking_handler(
    State(state): State<crate::AppState>,
    Json(request): Json<CreateBookingRequest>,
) -> Result<(StatusCode, Json<Booking>), BookingError> {
    request
        .validate()
        .map_err(|e| BookingError::ValidationError(e.to_string()))?;
    check_date_range(request.start_date, request.end_date)
        .map_err(BookingError::ValidationError)?;

    let booking = state.booking_service.create(request).await?;
    Ok((StatusCode::CREATED, Json(booking)))
}

/// Handler for GET /api/bookings/:id
#[utoipa::path(
    get,
    path = "/api/bookings/{id}",
    params(("id" = Uuid, Path, description = "Booking id")),
    responses(
        (status = 200, description = "Booking", body = Booking),
        (status = 404, description = "Booking not found"),
    ),
    tag = "bookings"
)]
pub async fn get_booking_handler(
    State(state): State<crate::AppState>,
    Path(id): Path<Uuid>,
) -> Result<Json<Booking>, BookingError> {
    let booking = state.booking_service.get(id).await?;
    Ok(Json(booking))
}

/// Handler for POST /api/bookings/:id/confirm
#[utoipa::path(
    post,
    path = "/api/bookings/{id}/confirm",
    params(("id" = Uuid, Path, description = "Booking id")),
    request_body = ConfirmBookingRequest,
    responses(
        (status = 200, description = "Booking confirmed", body = Booking),
        (status = 404, description = "Booking not found"),
        (status = 409, description = "Conflict: not confirmable, capacity, or promo"),
    ),
    tag = "bookings"
)]
pub async fn confirm_booking_handler(
    State(state): State<crate::AppState>,
    Path(id): Path<Uuid>,
    Json(request): Json<ConfirmBookingRequest>,
) -> Result<Json<Booking>, BookingError> {
    request
        .validate()
        .map_err(|e| BookingError::ValidationError(e.to_string()))?;

    let booking = state.booking_service.confirm(id, request).await?;
    Ok(Json(booking))
}

/// Handler for POST /api/bookings/:id/cancel
#[utoipa::path(
    post,
    path = "/api/bookings/{id}/cancel",
    params(("id" = Uuid, Path, description = "Booking id")),
    request_body = CancelBookingRequest,
    responses(
        (status = 200, description = "Booking cancelled or refunded", body = Booking),
        (status = 404, description = "Booking not found"),
        (status = 409, description = "Booking is not cancellable"),
    ),
    tag = "bookings"
)]
pub async fn cancel_booking_handler(
    State(state): State<crate::AppState>,
    Path(id): Path<Uuid>,
    Json(request): Json<CancelBookingRequest>,
) -> Result<Json<Booking>, BookingError> {
    request
        .validate()
        .map_err(|e| BookingError::ValidationError(e.to_string()))?;

    let booking = state.booking_service.cancel(id, request).await?;
    Ok(Json(booking))
}

// HTTP handlers for reservation items

use axum::{
    extract::{Path, State},
    http::StatusCode,
    Json,
};
use rust_decimal::Decimal;
use uuid::Uuid;
use validator::Validate;

use crate::bookings::BookingStatus;
use crate::reservation_items::error::ReservationItemError;
use crate::reservation_items::models::{
    BookingItemsResponse, CreateReservationItemRequest, ReservationItem,
};

/// Handler for POST /api/reservation-items
/// Attaches a line item to a live booking
#[utoipa::path(
    post,
    path = "/api/reservation-items",
    request_body = CreateReservationItemRequest,
    responses(
        (status = 201, description = "Item attached", body = ReservationItem),
        (status = 400, description = "Invalid input"),
        (status = 404, description = "Booking not found"),
        (status = 409, description = "Booking is closed"),
    ),
    tag = "reservation-items"
)]
pub async fn create_item_handler(
    State(state): State<crate::AppState>,
    Json(request): Json<CreateReservationItemRequest>,
) -> Result<(StatusCode, Json<ReservationItem>), ReservationItemError> {
    request
        .validate()
        .map_err(|e| ReservationItemError::ValidationError(e.to_string()))?;

    let booking = state
        .booking_store
        .find_by_id(request.booking_id)
        .await
        .map_err(|e| ReservationItemError::StoreError(e.to_string()))?
        .ok_or(ReservationItemError::BookingNotFound(request.booking_id))?;

    if booking.status.is_terminal() {
        return Err(ReservationItemError::BookingClosed(booking.id));
    }

    let item = request.into_item();
    state.item_store.create(&item).await?;

    tracing::info!(
        "Attached {} item '{}' x{} to booking {}",
        item.item_type,
        item.name,
        item.quantity,
        item.booking_id
    );
    Ok((StatusCode::CREATED, Json(item)))
}

/// Handler for POST /api/reservation-items/:id/cancel
/// Flags a line item cancelled while the parent booking is still Pending
///
/// A cancelled item is dropped from the capacity demand computed at
/// confirmation and from the read-time items total. Repeating the call on
/// an already cancelled item is a no-op.
#[utoipa::path(
    post,
    path = "/api/reservation-items/{id}/cancel",
    params(("id" = Uuid, Path, description = "Reservation item id")),
    responses(
        (status = 200, description = "Item cancelled", body = ReservationItem),
        (status = 404, description = "Item not found"),
        (status = 409, description = "Parent booking is confirmed or closed"),
    ),
    tag = "reservation-items"
)]
pub async fn cancel_item_handler(
    State(state): State<crate::AppState>,
    Path(id): Path<Uuid>,
) -> Result<Json<ReservationItem>, ReservationItemError> {
    let item = state
        .item_store
        .find_by_id(id)
        .await?
        .ok_or(ReservationItemError::NotFound(id))?;
    if item.is_cancelled {
        return Ok(Json(item));
    }

    let booking = state
        .booking_store
        .find_by_id(item.booking_id)
        .await
        .map_err(|e| ReservationItemError::StoreError(e.to_string()))?
        .ok_or(ReservationItemError::BookingNotFound(item.booking_id))?;
    if booking.status.is_terminal() {
        return Err(ReservationItemError::BookingClosed(booking.id));
    }
    if booking.status != BookingStatus::Pending {
        return Err(ReservationItemError::ItemCommitted(item.id));
    }

    let mut cancelled = item;
    cancelled.is_cancelled = true;
    state.item_store.update(&cancelled).await?;

    tracing::info!(
        "Cancelled item '{}' on booking {}",
        cancelled.name,
        cancelled.booking_id
    );
    Ok(Json(cancelled))
}

/// Handler for GET /api/bookings/:id/items
/// Lists a booking's items with a read-time total
#[utoipa::path(
    get,
    path = "/api/bookings/{id}/items",
    params(("id" = Uuid, Path, description = "Booking id")),
    responses(
        (status = 200, description = "Items and total", body = BookingItemsResponse),
        (status = 404, description = "Booking not found"),
    ),
    tag = "reservation-items"
)]
pub async fn list_items_handler(
    State(state): State<crate::AppState>,
    Path(booking_id): Path<Uuid>,
) -> Result<Json<BookingItemsResponse>, ReservationItemError> {
    state
        .booking_store
        .find_by_id(booking_id)
        .await
        .map_err(|e| ReservationItemError::StoreError(e.to_string()))?
        .ok_or(ReservationItemError::BookingNotFound(booking_id))?;

    let items = state.item_store.list_by_booking(booking_id).await?;
    let items_total: Decimal = items
        .iter()
        .filter(|i| !i.is_cancelled)
        .map(|i| i.total_price)
        .sum();

    Ok(Json(BookingItemsResponse { items, items_total }))
}

//! Booking API endpoints.
//!
//! - POST /bookings/:event_id - Reserve seats (requires auth)
//! - DELETE /bookings/:id - Cancel a reservation (owner or admin)
//! - GET /bookings - List the caller's reservations

use super::{BookingView, json_body, parse_id};
use crate::server::state::AppState;
use axum::{
    Json,
    extract::{Path, State, rejection::JsonRejection},
    http::StatusCode,
};
use serde::{Deserialize, Serialize};
use ticketing_core::{EventId, PaymentReference, ReservationId, ReservationRequest};
use ticketing_web::{AppError, Identity, RequestId};

// ============================================================================
// Request/Response Types
// ============================================================================

/// Request to reserve seats.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateBookingRequest {
    /// Seats requested; missing counts as zero and is rejected
    #[serde(default)]
    pub quantity: i64,
    /// Checkout session already started for this booking
    #[serde(default)]
    pub payment_reference: Option<String>,
}

/// Response after reserving seats.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateBookingResponse {
    /// Success message
    pub message: &'static str,
    /// The new booking
    pub booking: BookingView,
    /// Seats added to the event
    pub incremented_by: u32,
    /// Event reserved count after the booking
    pub reserved_count: u32,
}

/// Response after cancelling a reservation.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CancelBookingResponse {
    /// Success message
    pub message: &'static str,
    /// Seats returned to the event
    pub decremented_by: u32,
}

/// The caller's bookings.
#[derive(Debug, Serialize)]
pub struct ListBookingsResponse {
    /// Number of bookings
    pub count: usize,
    /// Bookings, newest first
    pub bookings: Vec<BookingView>,
}

// ============================================================================
// Handlers
// ============================================================================

/// Reserve seats on an event.
///
/// # Example
///
/// ```bash
/// curl -X POST http://localhost:8080/bookings/<event_id> \
///   -H "X-User-Id: <user_id>" \
///   -H "Content-Type: application/json" \
///   -d '{"quantity": 2}'
/// ```
///
/// # Errors
///
/// - 400 for a bad id, bad quantity, past event, full event or duplicate booking
/// - 401 without caller identity
/// - 404 if the event does not exist
#[tracing::instrument(skip(state, request_id, caller, payload), fields(request_id = %request_id.0, user_id = %caller.id))]
pub async fn create_booking(
    State(state): State<AppState>,
    request_id: RequestId,
    Identity(caller): Identity,
    Path(event_id): Path<String>,
    payload: Result<Json<CreateBookingRequest>, JsonRejection>,
) -> Result<(StatusCode, Json<CreateBookingResponse>), AppError> {
    let event_id = EventId::from_uuid(parse_id(&event_id, "event")?);
    let body = json_body(payload)?;
    let payment_reference = body
        .payment_reference
        .map(PaymentReference::new)
        .transpose()?;

    let booked = state
        .coordinator
        .create(ReservationRequest {
            event_id,
            attendee_id: caller.id,
            quantity: body.quantity,
            payment_reference,
        })
        .await?;

    let incremented_by = booked.booking.reservation.quantity.get();
    Ok((
        StatusCode::CREATED,
        Json(CreateBookingResponse {
            message: "Booking created successfully",
            booking: booked.booking.into(),
            incremented_by,
            reserved_count: booked.ledger.reserved_count,
        }),
    ))
}

/// Cancel a reservation and release its seats.
///
/// # Errors
///
/// - 400 for a bad id
/// - 403 unless the caller holds the booking or is an admin
/// - 404 if the booking does not exist
#[tracing::instrument(skip(state, request_id, caller), fields(request_id = %request_id.0, user_id = %caller.id))]
pub async fn cancel_booking(
    State(state): State<AppState>,
    request_id: RequestId,
    Identity(caller): Identity,
    Path(id): Path<String>,
) -> Result<Json<CancelBookingResponse>, AppError> {
    let id = ReservationId::from_uuid(parse_id(&id, "booking")?);
    let cancelled = state.coordinator.cancel(id, caller).await?;

    Ok(Json(CancelBookingResponse {
        message: "Booking deleted successfully",
        decremented_by: cancelled.released(),
    }))
}

/// List the caller's bookings with event details.
///
/// # Errors
///
/// 503 if storage is unavailable.
pub async fn list_bookings(
    State(state): State<AppState>,
    Identity(caller): Identity,
) -> Result<Json<ListBookingsResponse>, AppError> {
    let bookings: Vec<BookingView> = state
        .coordinator
        .bookings_for(caller.id)
        .await?
        .into_iter()
        .map(BookingView::from)
        .collect();

    Ok(Json(ListBookingsResponse {
        count: bookings.len(),
        bookings,
    }))
}

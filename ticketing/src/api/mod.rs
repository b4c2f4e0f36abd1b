//! HTTP API endpoints.
//!
//! - `bookings`: create, cancel and list reservations
//! - `payments`: payment verification and processor webhooks
//! - `events`: event publishing and maintenance
//!
//! Response bodies use camelCase field names.

pub mod bookings;
pub mod events;
pub mod payments;

use axum::{Json, extract::rejection::JsonRejection};
use chrono::{DateTime, Utc};
use serde::Serialize;
use ticketing_core::{Booking, Event, EventSummary, PaymentStatus, Reservation};
use ticketing_web::AppError;
use uuid::Uuid;

// ============================================================================
// Views
// ============================================================================

/// Event fields shown on a booking.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct EventSummaryView {
    /// Event ID
    pub id: Uuid,
    /// Event title
    pub title: String,
    /// Venue
    pub location: String,
    /// Event start time
    pub starts_at: DateTime<Utc>,
    /// Current price per seat in cents
    pub price_cents: u64,
}

impl From<EventSummary> for EventSummaryView {
    fn from(summary: EventSummary) -> Self {
        Self {
            id: *summary.id.as_uuid(),
            title: summary.title,
            location: summary.location,
            starts_at: summary.starts_at,
            price_cents: summary.price.cents(),
        }
    }
}

/// A reservation as returned by the API.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct BookingView {
    /// Reservation ID
    pub id: Uuid,
    /// Booked event
    pub event_id: Uuid,
    /// Attendee holding the seats
    pub user_id: Uuid,
    /// Seats held
    pub quantity: u32,
    /// Price paid or owed, in cents
    pub total_price_cents: u64,
    /// Checkout session or local reference
    pub payment_reference: String,
    /// `pending`, `success` or `failed`
    pub payment_status: PaymentStatus,
    /// Whether the booking is paid
    pub paid: bool,
    /// Created timestamp
    pub created_at: DateTime<Utc>,
    /// When the payment was confirmed
    #[serde(skip_serializing_if = "Option::is_none")]
    pub settled_at: Option<DateTime<Utc>>,
    /// Event details, absent when only the reservation is known
    #[serde(skip_serializing_if = "Option::is_none")]
    pub event: Option<EventSummaryView>,
}

impl From<Reservation> for BookingView {
    fn from(reservation: Reservation) -> Self {
        Self {
            id: *reservation.id.as_uuid(),
            event_id: *reservation.event_id.as_uuid(),
            user_id: *reservation.attendee_id.as_uuid(),
            quantity: reservation.quantity.get(),
            total_price_cents: reservation.total_price.cents(),
            payment_reference: reservation.payment_reference.into(),
            payment_status: reservation.payment_status,
            paid: reservation.paid,
            created_at: reservation.created_at,
            settled_at: reservation.settled_at,
            event: None,
        }
    }
}

impl From<Booking> for BookingView {
    fn from(booking: Booking) -> Self {
        Self {
            event: Some(booking.event.into()),
            ..Self::from(booking.reservation)
        }
    }
}

/// An event as returned by the API.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct EventView {
    /// Event ID
    pub id: Uuid,
    /// Event title
    pub title: String,
    /// Venue
    pub location: String,
    /// Event start time
    pub starts_at: DateTime<Utc>,
    /// Price per seat in cents
    pub price_cents: u64,
    /// Seat limit, `null` when unlimited
    pub capacity: Option<u32>,
    /// Seats currently held
    pub reserved_count: u32,
    /// Seats left, `null` when unlimited
    pub remaining: Option<u32>,
    /// Organizer
    pub owner_id: Uuid,
    /// Created timestamp
    pub created_at: DateTime<Utc>,
}

impl From<Event> for EventView {
    fn from(event: Event) -> Self {
        Self {
            id: *event.id.as_uuid(),
            remaining: event.remaining(),
            capacity: event.capacity.limit(),
            reserved_count: event.reserved_count,
            price_cents: event.price.cents(),
            owner_id: *event.owner_id.as_uuid(),
            created_at: event.created_at,
            starts_at: event.starts_at,
            title: event.title,
            location: event.location,
        }
    }
}

// ============================================================================
// Input helpers
// ============================================================================

/// Parses a path segment as a UUID, answering 400 with `what` in the message.
pub(crate) fn parse_id(raw: &str, what: &str) -> Result<Uuid, AppError> {
    Uuid::parse_str(raw.trim())
        .map_err(|_| AppError::bad_request(format!("Invalid {what} ID format")))
}

/// Unwraps a JSON body, turning extractor rejections into API errors.
pub(crate) fn json_body<T>(payload: Result<Json<T>, JsonRejection>) -> Result<T, AppError> {
    payload
        .map(|Json(body)| body)
        .map_err(|rejection| AppError::bad_request(rejection.body_text()))
}

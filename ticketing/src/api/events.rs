//! Event management API endpoints.
//!
//! - GET /events - Every event with seat availability
//! - GET /events/mine - Events published by the caller (requires auth)
//! - POST /events - Publish an event (requires auth)
//! - GET /events/:id - Event details with seat availability
//! - PATCH /events/:id - Edit metadata (owner or admin)
//! - DELETE /events/:id - Delete an event and its bookings (owner or admin)

use super::{EventView, json_body, parse_id};
use crate::server::state::AppState;
use axum::{
    Json,
    extract::{Path, State, rejection::JsonRejection},
    http::StatusCode,
};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use ticketing_core::{Capacity, EventChanges, EventDetails, EventId, Money};
use ticketing_web::{AppError, Identity};

// ============================================================================
// Request/Response Types
// ============================================================================

/// Request to publish an event.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateEventRequest {
    /// Event title
    pub title: String,
    /// Venue
    pub location: String,
    /// Event start time
    pub starts_at: DateTime<Utc>,
    /// Price per seat in cents, zero for free events
    #[serde(default)]
    pub price_cents: u64,
    /// Seat limit, omitted for unlimited
    #[serde(default)]
    pub capacity: Option<i64>,
}

/// Request to edit an event. Omitted fields stay unchanged.
#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UpdateEventRequest {
    /// New title
    pub title: Option<String>,
    /// New venue
    pub location: Option<String>,
    /// New start time
    pub starts_at: Option<DateTime<Utc>>,
    /// New price per seat in cents
    pub price_cents: Option<u64>,
    /// New seat limit
    pub capacity: Option<i64>,
    /// Remove the seat limit
    #[serde(default)]
    pub unlimited_capacity: bool,
}

impl UpdateEventRequest {
    fn into_changes(self) -> Result<EventChanges, AppError> {
        let capacity = match (self.capacity, self.unlimited_capacity) {
            (Some(_), true) => {
                return Err(AppError::bad_request(
                    "capacity and unlimitedCapacity are mutually exclusive",
                ));
            },
            (Some(limit), false) => Some(Capacity::from_limit(Some(limit))?),
            (None, true) => Some(Capacity::Unlimited),
            (None, false) => None,
        };
        Ok(EventChanges {
            title: self.title,
            location: self.location,
            starts_at: self.starts_at,
            price: self.price_cents.map(Money::from_cents),
            capacity,
        })
    }
}

/// Response after publishing an event.
#[derive(Debug, Serialize)]
pub struct CreateEventResponse {
    /// Success message
    pub message: &'static str,
    /// The new event
    pub event: EventView,
}

/// Response after deleting an event.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DeleteEventResponse {
    /// Success message
    pub message: &'static str,
    /// Bookings deleted along with the event
    pub bookings_removed: u64,
}

// ============================================================================
// Handlers
// ============================================================================

/// Publish a new event owned by the caller.
///
/// # Example
///
/// ```bash
/// curl -X POST http://localhost:8080/events \
///   -H "X-User-Id: <user_id>" \
///   -H "Content-Type: application/json" \
///   -d '{
///     "title": "Rust Meetup",
///     "location": "Main Hall",
///     "startsAt": "2026-06-01T18:00:00Z",
///     "priceCents": 2500,
///     "capacity": 80
///   }'
/// ```
///
/// # Errors
///
/// 400 if the title or location is blank, the start time is not in the
/// future or the capacity is not positive.
pub async fn create_event(
    State(state): State<AppState>,
    Identity(caller): Identity,
    payload: Result<Json<CreateEventRequest>, JsonRejection>,
) -> Result<(StatusCode, Json<CreateEventResponse>), AppError> {
    let body = json_body(payload)?;
    let details = EventDetails {
        title: body.title,
        location: body.location,
        starts_at: body.starts_at,
        price: Money::from_cents(body.price_cents),
        capacity: Capacity::from_limit(body.capacity)?,
    };

    let event = state.catalog.create(caller, details).await?;
    Ok((
        StatusCode::CREATED,
        Json(CreateEventResponse {
            message: "Event created successfully",
            event: event.into(),
        }),
    ))
}

/// List every event, soonest first.
///
/// # Errors
///
/// 503 if storage is unavailable.
pub async fn list_events(State(state): State<AppState>) -> Result<Json<Vec<EventView>>, AppError> {
    let events = state.catalog.list().await?;
    Ok(Json(events.into_iter().map(EventView::from).collect()))
}

/// List the events the caller published, soonest first.
///
/// # Errors
///
/// - 401 without a valid identity
/// - 503 if storage is unavailable
pub async fn my_events(
    State(state): State<AppState>,
    Identity(caller): Identity,
) -> Result<Json<Vec<EventView>>, AppError> {
    let events = state.catalog.list_owned_by(caller.id).await?;
    Ok(Json(events.into_iter().map(EventView::from).collect()))
}

/// Get an event with its seat availability.
///
/// # Errors
///
/// - 400 for a bad id
/// - 404 if the event does not exist
pub async fn get_event(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<EventView>, AppError> {
    let id = EventId::from_uuid(parse_id(&id, "event")?);
    let event = state.catalog.get(id).await?;
    Ok(Json(event.into()))
}

/// Edit event metadata.
///
/// Existing bookings keep the price they were made at.
///
/// # Errors
///
/// - 400 for bad input or a capacity below the seats already reserved
/// - 403 unless the caller owns the event or is an admin
/// - 404 if the event does not exist
pub async fn update_event(
    State(state): State<AppState>,
    Identity(caller): Identity,
    Path(id): Path<String>,
    payload: Result<Json<UpdateEventRequest>, JsonRejection>,
) -> Result<Json<EventView>, AppError> {
    let id = EventId::from_uuid(parse_id(&id, "event")?);
    let changes = json_body(payload)?.into_changes()?;

    let event = state.catalog.update(id, caller, changes).await?;
    Ok(Json(event.into()))
}

/// Delete an event together with its bookings.
///
/// # Errors
///
/// - 400 for a bad id
/// - 403 unless the caller owns the event or is an admin
/// - 404 if the event does not exist
pub async fn delete_event(
    State(state): State<AppState>,
    Identity(caller): Identity,
    Path(id): Path<String>,
) -> Result<Json<DeleteEventResponse>, AppError> {
    let id = EventId::from_uuid(parse_id(&id, "event")?);
    let bookings_removed = state.catalog.delete(id, caller).await?;

    Ok(Json(DeleteEventResponse {
        message: "Event deleted successfully",
        bookings_removed,
    }))
}

//! Router configuration for the ticketing service.

use super::state::AppState;
use crate::api::{bookings, events, payments};
use axum::{
    Router,
    routing::{delete, get, patch, post},
};
use ticketing_web::handlers::{health_check, readiness};
use ticketing_web::request_id_layer;
use tower_http::trace::TraceLayer;

/// Build the complete Axum router.
///
/// Health checks need no identity. Every booking, payment and event route
/// except the webhook and event reads expects the `X-User-Id` header.
pub fn build_router(state: AppState) -> Router {
    Router::new()
        // Health checks
        .route("/health", get(health_check))
        .route("/ready", get(readiness))
        // Bookings
        .route("/bookings", get(bookings::list_bookings))
        .route("/bookings/:id", post(bookings::create_booking))
        .route("/bookings/:id", delete(bookings::cancel_booking))
        // Payments
        .route("/payments/verify", post(payments::verify_payment))
        .route("/payments/webhook", post(payments::webhook))
        // Events
        .route("/events", get(events::list_events))
        .route("/events", post(events::create_event))
        .route("/events/mine", get(events::my_events))
        .route("/events/:id", get(events::get_event))
        .route("/events/:id", patch(events::update_event))
        .route("/events/:id", delete(events::delete_event))
        .layer(TraceLayer::new_for_http())
        .layer(request_id_layer())
        .with_state(state)
}

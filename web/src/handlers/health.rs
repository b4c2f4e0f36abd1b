//! Health check endpoints.
//!
//! These endpoints are used by load balancers and orchestrators to decide
//! whether the process is alive and whether it can serve bookings.

use axum::{Json, extract::State, http::StatusCode};
use serde::Serialize;
use std::sync::Arc;
use ticketing_core::BookingStore;

/// Liveness endpoint.
///
/// Returns 200 OK whenever the process is running. It does NOT check the
/// database.
///
/// ```text
/// GET /health
/// ```
#[allow(clippy::unused_async)]
pub async fn health_check() -> (StatusCode, &'static str) {
    (StatusCode::OK, "ok")
}

/// Readiness report.
#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct Readiness {
    /// `ready` or `unavailable`
    pub status: &'static str,
    /// Failure detail when the store is unreachable
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

/// Readiness endpoint.
///
/// Pings the booking store.
///
/// - 200 OK: the store answered
/// - 503 Service Unavailable: it did not
///
/// ```text
/// GET /ready
/// ```
pub async fn readiness(
    State(store): State<Arc<dyn BookingStore>>,
) -> (StatusCode, Json<Readiness>) {
    match store.ping().await {
        Ok(()) => (
            StatusCode::OK,
            Json(Readiness {
                status: "ready",
                error: None,
            }),
        ),
        Err(err) => {
            tracing::warn!(error = %err, "Readiness check failed");
            (
                StatusCode::SERVICE_UNAVAILABLE,
                Json(Readiness {
                    status: "unavailable",
                    error: Some(err.to_string()),
                }),
            )
        },
    }
}

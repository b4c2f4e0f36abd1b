//! Application state for the ticketing HTTP server.
//!
//! Holds the booking services every handler needs. Cloning is cheap: every
//! field is reference counted.

use axum::extract::FromRef;
use std::sync::Arc;
use ticketing_core::webhook::WebhookVerifier;
use ticketing_core::{
    BookingStore, Clock, EventCatalog, PaymentGateway, PaymentReconciler, ReservationCoordinator,
    RetryPolicy,
};

/// Application state shared across all HTTP handlers.
#[derive(Clone)]
pub struct AppState {
    /// Create, cancel and list reservations
    pub coordinator: ReservationCoordinator,
    /// Finalize paid reservations
    pub reconciler: PaymentReconciler,
    /// Event publishing and maintenance
    pub catalog: EventCatalog,
    /// Backing store, also used by the readiness check
    pub store: Arc<dyn BookingStore>,
    /// Webhook signature verification, `None` when no secret is configured
    pub webhooks: Option<Arc<WebhookVerifier>>,
    /// Time source
    pub clock: Arc<dyn Clock>,
}

impl AppState {
    /// Wires the booking services over one store, gateway and clock.
    #[must_use]
    pub fn new(
        store: Arc<dyn BookingStore>,
        gateway: Arc<dyn PaymentGateway>,
        clock: Arc<dyn Clock>,
        retry: RetryPolicy,
    ) -> Self {
        let coordinator = ReservationCoordinator::new(store.clone(), gateway.clone(), clock.clone())
            .with_retry_policy(retry.clone());
        let reconciler = PaymentReconciler::new(store.clone(), gateway, clock.clone())
            .with_retry_policy(retry);
        let catalog = EventCatalog::new(store.clone(), clock.clone());

        Self {
            coordinator,
            reconciler,
            catalog,
            store,
            webhooks: None,
            clock,
        }
    }

    /// Enables webhook intake with `verifier`.
    #[must_use]
    pub fn with_webhooks(mut self, verifier: WebhookVerifier) -> Self {
        self.webhooks = Some(Arc::new(verifier));
        self
    }
}

impl FromRef<AppState> for Arc<dyn BookingStore> {
    fn from_ref(app_state: &AppState) -> Self {
        app_state.store.clone()
    }
}

//! Event ticketing booking service.
//!
//! Wires the booking core to the outside world:
//!
//! - [`config`]: environment-driven settings
//! - [`api`]: HTTP handlers for bookings, payments and events
//! - [`server`]: shared state and the router
//! - [`gateway`]: HTTP client for the payment processor
//! - [`reclaimer`]: background expiry of unpaid reservations
//! - [`metrics`]: Prometheus exporter
//!
//! # Architecture
//!
//! ```text
//!   HTTP (axum) ──► ReservationCoordinator ──┐
//!                   PaymentReconciler ───────┼──► BookingStore (PostgreSQL | in-memory)
//!                   EventCatalog ────────────┘
//!                          │
//!                          └──► PaymentGateway (processor API)
//! ```

pub mod api;
pub mod config;
pub mod gateway;
pub mod metrics;
pub mod reclaimer;
pub mod server;

pub use config::Config;
pub use gateway::HttpPaymentGateway;
pub use server::{AppState, build_router};

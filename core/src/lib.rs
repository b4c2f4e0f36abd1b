//! # Ticketing Core
//!
//! Booking and capacity consistency for an event-ticketing service.
//!
//! Organizers publish events with a seat capacity, attendees reserve seats,
//! and paid reservations are finalized when the payment processor confirms
//! the checkout session. This crate owns the rules that keep those three
//! things consistent under concurrent requests:
//!
//! - **Capacity Ledger**: per-event reserved count, changed only by atomic
//!   conditional reserve and release ([`store::CapacityLedger`])
//! - **Reservation Store**: one reservation per (event, attendee) and per
//!   payment reference ([`store::ReservationStore`])
//! - **Reservation Coordinator**: create, cancel and expire workflows that
//!   pair ledger and reservation writes in one unit of work
//!   ([`coordinator::ReservationCoordinator`])
//! - **Payment Reconciliation**: exactly-once finalization of paid bookings
//!   ([`reconciliation::PaymentReconciler`])
//!
//! Storage backends live in other crates and implement [`store::BookingStore`].
//!
//! ## Invariants
//!
//! - `0 <= reserved_count <= capacity` for every bounded event
//! - `reserved_count` equals the summed quantity of the event's reservations
//! - a reservation is paid exactly when its payment status is `success`

// Re-export commonly used types
pub use chrono::{DateTime, Utc};

pub mod catalog;
pub mod coordinator;
pub mod environment;
pub mod error;
pub mod metrics;
pub mod payment;
pub mod reconciliation;
pub mod retry;
pub mod store;
pub mod types;
pub mod webhook;

mod unit;

pub use catalog::EventCatalog;
pub use coordinator::{Booked, Cancelled, ReclaimReport, ReservationCoordinator, ReservationRequest};
pub use environment::{Clock, SystemClock};
pub use error::{BookingError, UniqueKey};
pub use payment::{
    CheckoutSession, CheckoutStatus, GatewayResult, PaymentGateway, PaymentGatewayError,
};
pub use reconciliation::{PaymentConfirmation, PaymentReconciler, Reconciled};
pub use retry::RetryPolicy;
pub use store::{BookingStore, StoreError, UnitOfWork};
pub use types::*;

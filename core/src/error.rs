//! Error taxonomy of the booking operations.
//!
//! [`BookingError`] is what the coordinator, the reconciler and the catalog
//! return to callers. Storage backends speak [`StoreError`](crate::store::StoreError)
//! instead, which is converted at the coordinator boundary.

use crate::types::{AttendeeId, EventId, PaymentReference, ReservationId};
use chrono::{DateTime, Utc};
use thiserror::Error;

/// Unique key that a conflicting write collided with.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum UniqueKey {
    /// One reservation per (event, attendee)
    EventAttendee {
        /// Event of the existing reservation
        event_id: EventId,
        /// Attendee of the existing reservation
        attendee_id: AttendeeId,
    },
    /// One reservation per payment reference
    PaymentReference(PaymentReference),
}

impl std::fmt::Display for UniqueKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::EventAttendee {
                event_id,
                attendee_id,
            } => write!(f, "attendee {attendee_id} on event {event_id}"),
            Self::PaymentReference(reference) => write!(f, "payment reference {reference}"),
        }
    }
}

/// Errors returned by booking, cancellation, reconciliation and catalog operations.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum BookingError {
    /// Requested quantity below one or out of range.
    #[error("Quantity must be at least 1, got {0}")]
    InvalidQuantity(i64),

    /// Payment reference was blank.
    #[error("Payment reference must not be empty")]
    InvalidPaymentReference,

    /// Event metadata failed validation.
    #[error("Invalid event: {0}")]
    InvalidEvent(String),

    /// No event with this id.
    #[error("Event not found: {0}")]
    EventNotFound(EventId),

    /// No reservation with this id.
    #[error("Reservation not found: {0}")]
    ReservationNotFound(ReservationId),

    /// The processor knows no checkout session with this reference.
    #[error("Payment not found: {0}")]
    PaymentNotFound(PaymentReference),

    /// The event has already started.
    #[error("Cannot book past event {event_id} (started at {starts_at})")]
    EventInPast {
        /// Event that was requested
        event_id: EventId,
        /// Its start time
        starts_at: DateTime<Utc>,
    },

    /// Not enough seats left.
    #[error("Not enough spots available. Only {remaining} spots left")]
    CapacityExceeded {
        /// Event that was requested
        event_id: EventId,
        /// Seats asked for
        requested: u32,
        /// Seats left when the reservation was attempted
        remaining: u32,
    },

    /// A reservation already exists for this key.
    #[error("Reservation already exists for {0}")]
    DuplicateReservation(UniqueKey),

    /// An update would drop capacity below the seats already reserved.
    #[error("Capacity {requested} is below the {reserved} seats already reserved")]
    CapacityBelowReserved {
        /// Requested seat limit
        requested: u32,
        /// Seats currently held
        reserved: u32,
    },

    /// Caller is neither the owner nor an administrator.
    #[error("Not allowed to modify this resource")]
    Forbidden,

    /// The checkout session exists but has not been paid.
    #[error("Payment not completed for {0}")]
    PaymentNotCompleted(PaymentReference),

    /// The payment processor could not be reached.
    #[error("Payment processor unavailable: {0}")]
    PaymentGatewayUnavailable(String),

    /// Stored state contradicts a ledger invariant.
    #[error("Invariant violation: {0}")]
    InvariantViolation(String),

    /// Storage failed or stayed contended after retries.
    #[error("Storage unavailable: {0}")]
    StorageUnavailable(String),
}

impl BookingError {
    /// Whether the caller may retry the same request later.
    #[must_use]
    pub const fn is_retryable(&self) -> bool {
        matches!(
            self,
            Self::StorageUnavailable(_) | Self::PaymentGatewayUnavailable(_)
        )
    }

    /// Short label used for metrics and logs.
    #[must_use]
    pub const fn kind(&self) -> &'static str {
        match self {
            Self::InvalidQuantity(_) => "invalid_quantity",
            Self::InvalidPaymentReference => "invalid_payment_reference",
            Self::InvalidEvent(_) => "invalid_event",
            Self::EventNotFound(_) => "event_not_found",
            Self::ReservationNotFound(_) => "reservation_not_found",
            Self::PaymentNotFound(_) => "payment_not_found",
            Self::EventInPast { .. } => "event_in_past",
            Self::CapacityExceeded { .. } => "capacity_exceeded",
            Self::DuplicateReservation(_) => "duplicate_reservation",
            Self::CapacityBelowReserved { .. } => "capacity_below_reserved",
            Self::Forbidden => "forbidden",
            Self::PaymentNotCompleted(_) => "payment_not_completed",
            Self::PaymentGatewayUnavailable(_) => "payment_gateway_unavailable",
            Self::InvariantViolation(_) => "invariant_violation",
            Self::StorageUnavailable(_) => "storage_unavailable",
        }
    }
}

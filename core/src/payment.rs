//! Payment-processor boundary.
//!
//! The service never charges cards itself. It only asks the processor what
//! became of a checkout session, identified by the [`PaymentReference`] that
//! the reservation carries.

use crate::types::{AttendeeId, EventId, Money, PaymentReference, Quantity};
use std::future::Future;
use std::pin::Pin;
use thiserror::Error;

/// Payment gateway result
pub type GatewayResult<T> = Result<T, PaymentGatewayError>;

/// Payment gateway error
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum PaymentGatewayError {
    /// Request did not complete in time
    #[error("Gateway timeout")]
    Timeout,

    /// Processor rejected our credentials or request
    #[error("Gateway rejected request: {0}")]
    Rejected(String),

    /// Processor answered with a body we could not interpret
    #[error("Malformed gateway response: {0}")]
    Malformed(String),

    /// Transport failure or processor 5xx
    #[error("Gateway unavailable: {0}")]
    Unavailable(String),
}

/// Processor-side state of a checkout session.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum CheckoutStatus {
    /// Created, awaiting the attendee
    Open,
    /// Paid in full
    Paid,
    /// Abandoned or expired
    Expired,
}

/// Checkout session as reported by the processor, with the booking metadata
/// attached when it was created.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct CheckoutSession {
    /// Session reference
    pub reference: PaymentReference,
    /// Session status
    pub status: CheckoutStatus,
    /// Event named in the session metadata
    pub event_id: EventId,
    /// Attendee named in the session metadata
    pub attendee_id: AttendeeId,
    /// Seats named in the session metadata
    pub quantity: Quantity,
    /// Amount charged, if reported
    pub amount_total: Option<Money>,
}

impl CheckoutSession {
    /// Whether the session has been paid
    #[must_use]
    pub fn is_paid(&self) -> bool {
        self.status == CheckoutStatus::Paid
    }

    /// Whether this paid session covers the given booking.
    #[must_use]
    pub fn covers(&self, event_id: EventId, attendee_id: AttendeeId, quantity: Quantity) -> bool {
        self.is_paid()
            && self.event_id == event_id
            && self.attendee_id == attendee_id
            && self.quantity == quantity
    }
}

/// Payment gateway trait
///
/// Abstraction over the processor's checkout-session lookup.
pub trait PaymentGateway: Send + Sync {
    /// Fetch a checkout session by reference.
    ///
    /// Returns `Ok(None)` when the processor does not know the reference.
    ///
    /// # Errors
    ///
    /// Returns error if the processor cannot be queried
    fn checkout_session(
        &self,
        reference: &PaymentReference,
    ) -> Pin<Box<dyn Future<Output = GatewayResult<Option<CheckoutSession>>> + Send + '_>>;
}

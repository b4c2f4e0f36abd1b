//! Scriptable payment gateway.

use std::collections::HashMap;
use std::future::Future;
use std::pin::Pin;
use std::sync::{Arc, Mutex, PoisonError};
use ticketing_core::{
    AttendeeId, CheckoutSession, CheckoutStatus, EventId, GatewayResult, PaymentGateway,
    PaymentGatewayError, PaymentReference, Quantity,
};

/// In-memory [`PaymentGateway`] whose sessions are set up by the test.
///
/// Unknown references resolve to `Ok(None)`.
#[derive(Clone, Debug, Default)]
pub struct InMemoryPaymentGateway {
    sessions: Arc<Mutex<HashMap<PaymentReference, CheckoutSession>>>,
    outage: Arc<Mutex<Option<PaymentGatewayError>>>,
    lookups: Arc<Mutex<u32>>,
}

impl InMemoryPaymentGateway {
    /// Create a gateway with no sessions
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a paid session for the given booking and returns its reference.
    pub fn complete(
        &self,
        event_id: EventId,
        attendee_id: AttendeeId,
        quantity: Quantity,
    ) -> PaymentReference {
        self.insert(event_id, attendee_id, quantity, CheckoutStatus::Paid)
    }

    /// Registers an unpaid session for the given booking and returns its reference.
    pub fn open(
        &self,
        event_id: EventId,
        attendee_id: AttendeeId,
        quantity: Quantity,
    ) -> PaymentReference {
        self.insert(event_id, attendee_id, quantity, CheckoutStatus::Open)
    }

    /// Marks an existing session paid.
    pub fn mark_paid(&self, reference: &PaymentReference) {
        if let Some(session) = self
            .sessions
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .get_mut(reference)
        {
            session.status = CheckoutStatus::Paid;
        }
    }

    /// Makes every lookup fail with `error` until cleared with `None`.
    pub fn set_outage(&self, error: Option<PaymentGatewayError>) {
        *self.outage.lock().unwrap_or_else(PoisonError::into_inner) = error;
    }

    /// Number of lookups served so far.
    #[must_use]
    pub fn lookups(&self) -> u32 {
        *self.lookups.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn insert(
        &self,
        event_id: EventId,
        attendee_id: AttendeeId,
        quantity: Quantity,
        status: CheckoutStatus,
    ) -> PaymentReference {
        let reference = PaymentReference::generate();
        let session = CheckoutSession {
            reference: reference.clone(),
            status,
            event_id,
            attendee_id,
            quantity,
            amount_total: None,
        };
        self.sessions
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(reference.clone(), session);
        reference
    }
}

impl PaymentGateway for InMemoryPaymentGateway {
    fn checkout_session(
        &self,
        reference: &PaymentReference,
    ) -> Pin<Box<dyn Future<Output = GatewayResult<Option<CheckoutSession>>> + Send + '_>> {
        *self.lookups.lock().unwrap_or_else(PoisonError::into_inner) += 1;
        let outage = self
            .outage
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone();
        let result = match outage {
            Some(err) => Err(err),
            None => Ok(self
                .sessions
                .lock()
                .unwrap_or_else(PoisonError::into_inner)
                .get(reference)
                .cloned()),
        };
        Box::pin(std::future::ready(result))
    }
}

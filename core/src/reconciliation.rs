//! Payment reconciliation.
//!
//! Turns a "checkout session paid" signal into exactly one paid reservation,
//! no matter how often or how concurrently the same confirmation arrives.
//! Lookups go by payment reference first, then by (event, attendee); only if
//! both miss is a new reservation created, with the pair re-checked inside
//! the unit of work after the event row is locked.

use crate::environment::Clock;
use crate::error::{BookingError, UniqueKey};
use crate::metrics;
use crate::payment::{CheckoutSession, PaymentGateway};
use crate::retry::{RetryPolicy, retry_when};
use crate::store::{BookingStore, StoreError, UnitOfWork};
use crate::types::{
    AttendeeId, Booking, EventId, PaymentReference, PaymentStatus, Quantity, Reservation,
    ReservationId,
};
use crate::unit::{Failure, Staged, finish};
use chrono::{DateTime, Utc};
use std::sync::Arc;

/// A confirmed payment and the booking it pays for.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct PaymentConfirmation {
    /// Checkout session reference
    pub reference: PaymentReference,
    /// Event from the session metadata
    pub event_id: EventId,
    /// Attendee from the session metadata
    pub attendee_id: AttendeeId,
    /// Seats from the session metadata
    pub quantity: Quantity,
}

impl From<CheckoutSession> for PaymentConfirmation {
    fn from(session: CheckoutSession) -> Self {
        Self {
            reference: session.reference,
            event_id: session.event_id,
            attendee_id: session.attendee_id,
            quantity: session.quantity,
        }
    }
}

/// Outcome of reconciling one confirmation.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Reconciled {
    /// The paid reservation
    pub booking: Booking,
    /// True if an earlier delivery already finalized it
    pub already_processed: bool,
}

/// Paid reservation and whether this call was the one that paid it.
type Resolution = (Reservation, bool);

enum Insert {
    Created(Reservation),
    Found(Reservation),
}

/// Finalizes reservations from payment confirmations.
#[derive(Clone)]
pub struct PaymentReconciler {
    store: Arc<dyn BookingStore>,
    gateway: Arc<dyn PaymentGateway>,
    clock: Arc<dyn Clock>,
    retry: RetryPolicy,
}

impl PaymentReconciler {
    /// Creates a reconciler over the given backends.
    #[must_use]
    pub fn new(
        store: Arc<dyn BookingStore>,
        gateway: Arc<dyn PaymentGateway>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self {
            store,
            gateway,
            clock,
            retry: RetryPolicy::default(),
        }
    }

    /// Replaces the retry policy used for contended units.
    #[must_use]
    pub fn with_retry_policy(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    /// Asks the processor about `reference` and reconciles it if paid.
    ///
    /// # Errors
    ///
    /// - [`BookingError::PaymentNotFound`] if the processor does not know it
    /// - [`BookingError::PaymentNotCompleted`] if it is not paid yet
    /// - [`BookingError::PaymentGatewayUnavailable`] if the processor failed
    /// - any error of [`PaymentReconciler::reconcile`]
    #[tracing::instrument(skip(self), fields(payment_reference = %reference))]
    pub async fn verify(&self, reference: PaymentReference) -> Result<Reconciled, BookingError> {
        let session = self
            .gateway
            .checkout_session(&reference)
            .await
            .map_err(|e| BookingError::PaymentGatewayUnavailable(e.to_string()))?
            .ok_or_else(|| BookingError::PaymentNotFound(reference.clone()))?;

        if !session.is_paid() {
            return Err(BookingError::PaymentNotCompleted(reference));
        }
        self.reconcile(session.into()).await
    }

    /// Finalizes the reservation paid by `confirmation`, creating it if needed.
    ///
    /// Safe under repeated and concurrent delivery: every caller gets the same
    /// reservation back, and exactly one of them sees `already_processed ==
    /// false`. The start-time check of booking is skipped since the attendee
    /// has already paid; capacity is still enforced.
    ///
    /// # Errors
    ///
    /// - [`BookingError::EventNotFound`] if a new reservation is needed and
    ///   the event is gone
    /// - [`BookingError::CapacityExceeded`] if a new reservation no longer fits
    /// - [`BookingError::StorageUnavailable`] if storage failed or stayed contended
    #[tracing::instrument(skip(self, confirmation), fields(payment_reference = %confirmation.reference))]
    pub async fn reconcile(
        &self,
        confirmation: PaymentConfirmation,
    ) -> Result<Reconciled, BookingError> {
        let result = self.reconcile_inner(&confirmation).await;
        if let Err(err) = &result {
            metrics::rejected(err);
            tracing::error!(
                event_id = %confirmation.event_id,
                attendee_id = %confirmation.attendee_id,
                error = %err,
                "Payment could not be reconciled"
            );
        }
        result
    }

    async fn reconcile_inner(
        &self,
        confirmation: &PaymentConfirmation,
    ) -> Result<Reconciled, BookingError> {
        let (reservation, already_processed) = retry_when(
            &self.retry,
            || self.reconcile_once(confirmation),
            Failure::is_transient,
        )
        .await
        .map_err(BookingError::from)?;

        let event = self
            .store
            .event(reservation.event_id)
            .await?
            .ok_or(BookingError::EventNotFound(reservation.event_id))?;

        tracing::info!(
            reservation_id = %reservation.id,
            already_processed,
            "Payment reconciled"
        );

        Ok(Reconciled {
            booking: Booking {
                reservation,
                event: event.summary(),
            },
            already_processed,
        })
    }

    async fn reconcile_once(&self, confirmation: &PaymentConfirmation) -> Result<Resolution, Failure> {
        if let Some(existing) = self.lookup_existing(confirmation).await? {
            return self.finalize_existing(existing, confirmation).await;
        }

        match self.insert_paid(confirmation).await {
            Ok(Insert::Created(reservation)) => {
                metrics::reservation_created(PaymentStatus::Success, reservation.quantity.get());
                metrics::payment_reconciled("created");
                Ok((reservation, false))
            },
            Ok(Insert::Found(existing)) => self.finalize_existing(existing, confirmation).await,
            Err(Failure::Fatal(BookingError::DuplicateReservation(key))) => {
                // A concurrent reconciliation committed between our lookups and insert.
                match self.lookup_existing(confirmation).await? {
                    Some(existing) => self.finalize_existing(existing, confirmation).await,
                    None => Err(Failure::Transient(StoreError::Conflict(key))),
                }
            },
            Err(Failure::Fatal(err @ BookingError::CapacityExceeded { .. })) => {
                // Full because a concurrent delivery of this payment took the seats.
                match self.lookup_existing(confirmation).await? {
                    Some(existing) => self.finalize_existing(existing, confirmation).await,
                    None => Err(Failure::Fatal(err)),
                }
            },
            Err(err) => Err(err),
        }
    }

    async fn lookup_existing(
        &self,
        confirmation: &PaymentConfirmation,
    ) -> Result<Option<Reservation>, Failure> {
        if let Some(existing) = self
            .store
            .reservation_by_payment(confirmation.reference.clone())
            .await?
        {
            return Ok(Some(existing));
        }
        Ok(self
            .store
            .reservation_for(confirmation.event_id, confirmation.attendee_id)
            .await?)
    }

    async fn insert_paid(&self, confirmation: &PaymentConfirmation) -> Result<Insert, Failure> {
        let event = self
            .store
            .event(confirmation.event_id)
            .await?
            .ok_or(BookingError::EventNotFound(confirmation.event_id))?;
        let total_price = event
            .price
            .checked_multiply(confirmation.quantity.get())
            .ok_or_else(|| BookingError::InvariantViolation("total price overflows".into()))?;

        let now = self.clock.now();
        let reservation = Reservation {
            id: ReservationId::new(),
            event_id: confirmation.event_id,
            attendee_id: confirmation.attendee_id,
            quantity: confirmation.quantity,
            total_price,
            payment_reference: confirmation.reference.clone(),
            payment_status: PaymentStatus::Success,
            paid: true,
            created_at: now,
            settled_at: Some(now),
        };

        let mut unit = self.store.begin().await?;
        let staged = Self::stage_insert(unit.as_mut(), reservation).await;
        finish(unit, staged).await
    }

    async fn stage_insert(
        unit: &mut dyn UnitOfWork,
        reservation: Reservation,
    ) -> Result<Staged<Insert>, Failure> {
        unit.lock_event(reservation.event_id).await?;

        if let Some(existing) = unit
            .find_by_payment_reference(reservation.payment_reference.clone())
            .await?
        {
            return Ok(Staged::Discard(Insert::Found(existing)));
        }
        if let Some(existing) = unit
            .find_by_event_and_attendee(reservation.event_id, reservation.attendee_id)
            .await?
        {
            return Ok(Staged::Discard(Insert::Found(existing)));
        }

        unit.try_reserve(reservation.event_id, reservation.quantity)
            .await?;
        unit.create(reservation.clone()).await?;
        Ok(Staged::Commit(Insert::Created(reservation)))
    }

    async fn finalize_existing(
        &self,
        existing: Reservation,
        confirmation: &PaymentConfirmation,
    ) -> Result<Resolution, Failure> {
        if existing.paid {
            metrics::payment_reconciled("already_processed");
            return Ok((existing, true));
        }
        if existing.quantity != confirmation.quantity {
            tracing::warn!(
                reservation_id = %existing.id,
                payment_reference = %confirmation.reference,
                paid_quantity = confirmation.quantity.get(),
                held_quantity = existing.quantity.get(),
                "Paid quantity differs from the pending reservation"
            );
        }

        let reference = &confirmation.reference;
        let mut unit = self.store.begin().await?;
        let staged = Self::stage_settle(unit.as_mut(), existing.id, reference, self.clock.now()).await;
        match finish(unit, staged).await {
            Ok(Some(settled)) => {
                metrics::payment_reconciled("settled");
                tracing::info!(
                    reservation_id = %settled.id,
                    from = %PaymentStatus::Pending,
                    to = %PaymentStatus::Success,
                    "Pending reservation settled"
                );
                Ok((settled, false))
            },
            Ok(None) => self.after_lost_settle(existing.id).await,
            Err(Failure::Fatal(BookingError::DuplicateReservation(UniqueKey::PaymentReference(
                taken,
            )))) => {
                // The reference was attached to another reservation meanwhile.
                match self.store.reservation_by_payment(taken.clone()).await? {
                    Some(winner) if winner.paid => {
                        metrics::payment_reconciled("already_processed");
                        Ok((winner, true))
                    },
                    _ => Err(Failure::Transient(StoreError::Conflict(
                        UniqueKey::PaymentReference(taken),
                    ))),
                }
            },
            Err(err) => Err(err),
        }
    }

    async fn stage_settle(
        unit: &mut dyn UnitOfWork,
        id: ReservationId,
        reference: &PaymentReference,
        at: DateTime<Utc>,
    ) -> Result<Staged<Option<Reservation>>, Failure> {
        match unit.settle(id, reference.clone(), at).await? {
            Some(settled) => Ok(Staged::Commit(Some(settled))),
            None => Ok(Staged::Discard(None)),
        }
    }

    /// Someone else moved the reservation out of pending first.
    async fn after_lost_settle(&self, id: ReservationId) -> Result<Resolution, Failure> {
        match self.store.reservation(id).await? {
            Some(current) if current.paid => {
                metrics::payment_reconciled("already_processed");
                Ok((current, true))
            },
            // Cancelled or expired in between: start over from the lookups.
            _ => Err(Failure::Transient(StoreError::Contention(format!(
                "reservation {id} changed during settlement"
            )))),
        }
    }
}

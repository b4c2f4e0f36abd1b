//! Reservation creation, cancellation and pending expiry.
//!
//! The coordinator validates requests against the event, then performs the
//! paired ledger and reservation mutation inside one unit of work. Storage
//! is the final arbiter of capacity and uniqueness: the application-level
//! checks here only produce earlier, friendlier errors and never replace the
//! conditional increment or the unique indexes.
//!
//! # Example
//!
//! ```ignore
//! let outcome = coordinator
//!     .create(ReservationRequest {
//!         event_id,
//!         attendee_id,
//!         quantity: 2,
//!         payment_reference: None,
//!     })
//!     .await?;
//! assert_eq!(outcome.ledger.reserved_count, 2);
//! ```

use crate::environment::Clock;
use crate::error::{BookingError, UniqueKey};
use crate::metrics;
use crate::payment::PaymentGateway;
use crate::retry::{RetryPolicy, retry_when};
use crate::store::{BookingStore, UnitOfWork};
use crate::types::{
    AttendeeId, Booking, Caller, EventId, LedgerEntry, Money, PaymentReference, PaymentStatus,
    Quantity, Reservation, ReservationId,
};
use crate::unit::{Failure, Staged, finish};
use std::sync::Arc;

/// Input of [`ReservationCoordinator::create`].
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ReservationRequest {
    /// Event to book
    pub event_id: EventId,
    /// Who books
    pub attendee_id: AttendeeId,
    /// Seats requested, validated to be at least one
    pub quantity: i64,
    /// Checkout session the attendee already started, if any
    pub payment_reference: Option<PaymentReference>,
}

/// Result of a successful booking.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Booked {
    /// The new reservation with its event summary
    pub booking: Booking,
    /// Ledger state right after the increment
    pub ledger: LedgerEntry,
}

/// Result of a successful cancellation.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Cancelled {
    /// The deleted reservation
    pub reservation: Reservation,
    /// Ledger state right after the release
    pub ledger: LedgerEntry,
}

impl Cancelled {
    /// Seats returned to the event
    #[must_use]
    pub const fn released(&self) -> u32 {
        self.reservation.quantity.get()
    }
}

/// Summary of one pending-expiry sweep.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct ReclaimReport {
    /// Reservations expired and deleted
    pub expired: u32,
    /// Seats returned to ledgers
    pub seats_released: u64,
    /// Reservations settled before they could be expired
    pub skipped: u32,
    /// Reservations left in place because storage failed
    pub failed: u32,
}

/// Validated reservation ready to be written.
struct Plan {
    reservation: Reservation,
}

/// Creates and cancels reservations against event capacity.
#[derive(Clone)]
pub struct ReservationCoordinator {
    store: Arc<dyn BookingStore>,
    gateway: Arc<dyn PaymentGateway>,
    clock: Arc<dyn Clock>,
    retry: RetryPolicy,
}

impl ReservationCoordinator {
    /// Creates a coordinator over the given backends.
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

    /// Reserves seats for an attendee.
    ///
    /// Checks run in this order: quantity, event existence, start time,
    /// existing reservation for the pair, then capacity inside the unit of work.
    ///
    /// Free events are paid on creation. Paid events start pending unless the
    /// supplied payment reference already resolves to a paid checkout session
    /// for this event, attendee and quantity.
    ///
    /// # Errors
    ///
    /// - [`BookingError::InvalidQuantity`] for a quantity below one
    /// - [`BookingError::EventNotFound`] if the event does not exist
    /// - [`BookingError::EventInPast`] if the event has started
    /// - [`BookingError::DuplicateReservation`] if the attendee already holds a
    ///   reservation or the payment reference is taken
    /// - [`BookingError::CapacityExceeded`] with the seats remaining
    /// - [`BookingError::StorageUnavailable`] if storage failed or stayed contended
    #[tracing::instrument(skip(self, request), fields(event_id = %request.event_id, attendee_id = %request.attendee_id))]
    pub async fn create(&self, request: ReservationRequest) -> Result<Booked, BookingError> {
        let result = self.create_inner(request).await;
        if let Err(err) = &result {
            metrics::rejected(err);
        }
        result
    }

    async fn create_inner(&self, request: ReservationRequest) -> Result<Booked, BookingError> {
        let quantity = Quantity::new(request.quantity)?;
        let event = self
            .store
            .event(request.event_id)
            .await?
            .ok_or(BookingError::EventNotFound(request.event_id))?;

        let now = self.clock.now();
        if event.has_started(now) {
            return Err(BookingError::EventInPast {
                event_id: event.id,
                starts_at: event.starts_at,
            });
        }

        if self
            .store
            .reservation_for(event.id, request.attendee_id)
            .await?
            .is_some()
        {
            return Err(BookingError::DuplicateReservation(UniqueKey::EventAttendee {
                event_id: event.id,
                attendee_id: request.attendee_id,
            }));
        }

        let total_price = event
            .price
            .checked_multiply(quantity.get())
            .ok_or_else(|| BookingError::InvariantViolation("total price overflows".into()))?;

        let (payment_reference, payment_status) = self
            .initial_payment(
                event.id,
                event.price,
                request.attendee_id,
                quantity,
                request.payment_reference,
            )
            .await;

        let paid = payment_status == PaymentStatus::Success;
        let plan = Plan {
            reservation: Reservation {
                id: ReservationId::new(),
                event_id: event.id,
                attendee_id: request.attendee_id,
                quantity,
                total_price,
                payment_reference,
                payment_status,
                paid,
                created_at: now,
                settled_at: paid.then_some(now),
            },
        };

        let ledger = retry_when(&self.retry, || self.create_once(&plan), Failure::is_transient)
            .await
            .map_err(BookingError::from)?;

        let reservation = plan.reservation;
        metrics::reservation_created(reservation.payment_status, quantity.get());
        tracing::info!(
            reservation_id = %reservation.id,
            quantity = quantity.get(),
            status = %reservation.payment_status,
            reserved_count = ledger.reserved_count,
            "Reservation created"
        );

        Ok(Booked {
            booking: Booking {
                reservation,
                event: event.summary(),
            },
            ledger,
        })
    }

    async fn initial_payment(
        &self,
        event_id: EventId,
        price: Money,
        attendee_id: AttendeeId,
        quantity: Quantity,
        supplied: Option<PaymentReference>,
    ) -> (PaymentReference, PaymentStatus) {
        if price.is_zero() {
            return (
                supplied.unwrap_or_else(PaymentReference::generate),
                PaymentStatus::Success,
            );
        }
        let Some(reference) = supplied else {
            return (PaymentReference::generate(), PaymentStatus::Pending);
        };

        let status = match self.gateway.checkout_session(&reference).await {
            Ok(Some(session)) if session.covers(event_id, attendee_id, quantity) => {
                PaymentStatus::Success
            },
            Ok(_) => PaymentStatus::Pending,
            Err(err) => {
                tracing::warn!(
                    payment_reference = %reference,
                    error = %err,
                    "Payment lookup failed, booking stays pending until reconciled"
                );
                PaymentStatus::Pending
            },
        };
        (reference, status)
    }

    async fn create_once(&self, plan: &Plan) -> Result<LedgerEntry, Failure> {
        let mut unit = self.store.begin().await?;
        let staged = Self::stage_create(unit.as_mut(), plan).await;
        finish(unit, staged).await
    }

    async fn stage_create(
        unit: &mut dyn UnitOfWork,
        plan: &Plan,
    ) -> Result<Staged<LedgerEntry>, Failure> {
        let reservation = &plan.reservation;
        unit.lock_event(reservation.event_id).await?;

        // Duplicates are reported ahead of capacity, even on a full event.
        if unit
            .find_by_event_and_attendee(reservation.event_id, reservation.attendee_id)
            .await?
            .is_some()
        {
            return Err(BookingError::DuplicateReservation(UniqueKey::EventAttendee {
                event_id: reservation.event_id,
                attendee_id: reservation.attendee_id,
            })
            .into());
        }
        if unit
            .find_by_payment_reference(reservation.payment_reference.clone())
            .await?
            .is_some()
        {
            return Err(BookingError::DuplicateReservation(UniqueKey::PaymentReference(
                reservation.payment_reference.clone(),
            ))
            .into());
        }

        let ledger = unit
            .try_reserve(reservation.event_id, reservation.quantity)
            .await?;
        unit.create(reservation.clone()).await?;
        Ok(Staged::Commit(ledger))
    }

    /// Cancels a reservation and returns its seats to the event.
    ///
    /// # Errors
    ///
    /// - [`BookingError::ReservationNotFound`] if it does not exist (or was
    ///   cancelled concurrently)
    /// - [`BookingError::Forbidden`] unless the caller holds it or is an admin
    /// - [`BookingError::InvariantViolation`] if the ledger would go negative
    /// - [`BookingError::StorageUnavailable`] if storage failed
    #[tracing::instrument(skip(self), fields(caller = %caller.id))]
    pub async fn cancel(
        &self,
        id: ReservationId,
        caller: Caller,
    ) -> Result<Cancelled, BookingError> {
        let result = self.cancel_inner(id, caller).await;
        if let Err(err) = &result {
            metrics::rejected(err);
        }
        result
    }

    async fn cancel_inner(&self, id: ReservationId, caller: Caller) -> Result<Cancelled, BookingError> {
        let reservation = self
            .store
            .reservation(id)
            .await?
            .ok_or(BookingError::ReservationNotFound(id))?;

        if !caller.may_act_for(reservation.attendee_id) {
            tracing::warn!(reservation_id = %id, "Cancellation refused for non-owner");
            return Err(BookingError::Forbidden);
        }

        let ledger = retry_when(
            &self.retry,
            || self.cancel_once(&reservation),
            Failure::is_transient,
        )
        .await
        .map_err(BookingError::from)?;

        metrics::reservation_released("cancelled", reservation.quantity.get());
        tracing::info!(
            reservation_id = %id,
            released = reservation.quantity.get(),
            reserved_count = ledger.reserved_count,
            "Reservation cancelled"
        );

        Ok(Cancelled {
            reservation,
            ledger,
        })
    }

    async fn cancel_once(&self, reservation: &Reservation) -> Result<LedgerEntry, Failure> {
        let mut unit = self.store.begin().await?;
        let staged = Self::stage_cancel(unit.as_mut(), reservation).await;
        finish(unit, staged).await
    }

    async fn stage_cancel(
        unit: &mut dyn UnitOfWork,
        reservation: &Reservation,
    ) -> Result<Staged<LedgerEntry>, Failure> {
        // Ledger first: same lock order as creation.
        let ledger = unit
            .release(reservation.event_id, reservation.quantity)
            .await?;
        unit.delete(reservation.id)
            .await?
            .ok_or(BookingError::ReservationNotFound(reservation.id))?;
        Ok(Staged::Commit(ledger))
    }

    /// Lists every booking held by `attendee_id`, newest first.
    ///
    /// # Errors
    ///
    /// [`BookingError::StorageUnavailable`] if storage failed.
    pub async fn bookings_for(&self, attendee_id: AttendeeId) -> Result<Vec<Booking>, BookingError> {
        Ok(self.store.bookings_for_attendee(attendee_id).await?)
    }

    /// Expires pending reservations created more than `ttl` ago.
    ///
    /// Each reservation is handled in its own unit: its seats are released and
    /// it is deleted only if it is still pending, so a payment that settles
    /// during the sweep always wins.
    ///
    /// # Errors
    ///
    /// [`BookingError::StorageUnavailable`] if the candidates could not be listed.
    /// Failures on individual reservations are counted in the report instead.
    pub async fn reclaim_expired(&self, ttl: chrono::Duration) -> Result<ReclaimReport, BookingError> {
        let cutoff = self.clock.now() - ttl;
        let candidates = self.store.pending_created_before(cutoff).await?;
        let mut report = ReclaimReport::default();

        for reservation in candidates {
            match retry_when(
                &self.retry,
                || self.reclaim_once(&reservation),
                Failure::is_transient,
            )
            .await
            {
                Ok(Some(expired)) => {
                    report.expired += 1;
                    report.seats_released += u64::from(expired.quantity.get());
                    metrics::reservation_released("expired", expired.quantity.get());
                    tracing::info!(
                        reservation_id = %expired.id,
                        event_id = %expired.event_id,
                        payment_reference = %expired.payment_reference,
                        from = %PaymentStatus::Pending,
                        to = %PaymentStatus::Failed,
                        "Pending reservation expired"
                    );
                },
                Ok(None) => report.skipped += 1,
                Err(err) => {
                    report.failed += 1;
                    tracing::error!(
                        reservation_id = %reservation.id,
                        error = %err,
                        "Failed to expire pending reservation"
                    );
                },
            }
        }

        if report.expired > 0 || report.failed > 0 {
            tracing::info!(
                expired = report.expired,
                seats_released = report.seats_released,
                skipped = report.skipped,
                failed = report.failed,
                "Pending reservation sweep finished"
            );
        }
        Ok(report)
    }

    async fn reclaim_once(&self, reservation: &Reservation) -> Result<Option<Reservation>, Failure> {
        let mut unit = self.store.begin().await?;
        let staged = Self::stage_reclaim(unit.as_mut(), reservation).await;
        finish(unit, staged).await
    }

    async fn stage_reclaim(
        unit: &mut dyn UnitOfWork,
        reservation: &Reservation,
    ) -> Result<Staged<Option<Reservation>>, Failure> {
        unit.release(reservation.event_id, reservation.quantity)
            .await?;
        match unit.delete_if_pending(reservation.id).await? {
            Some(expired) => Ok(Staged::Commit(Some(expired))),
            None => Ok(Staged::Discard(None)),
        }
    }
}

//! Storage abstractions for events, the capacity ledger and reservations.
//!
//! Every write that touches both the ledger and the reservation set runs in
//! a [`UnitOfWork`]: a transaction that exposes [`CapacityLedger`] and
//! [`ReservationStore`] together and either commits both effects or neither.
//!
//! # Implementations
//!
//! - `PostgresBookingStore` (in `ticketing-postgres`): production backend using
//!   a conditional `UPDATE` on the event row and unique indexes on reservations.
//! - `InMemoryBookingStore` (in `ticketing-testing`): a single lock over staged
//!   state, used by tests and local development.
//!
//! # Lock order
//!
//! Units that touch an existing event always call into the ledger first, which
//! locks the event row, and only then touch reservation rows. Creation and
//! cancellation therefore acquire locks in the same order and cannot deadlock
//! each other.
//!
//! # Dyn Compatibility
//!
//! The traits return `Pin<Box<dyn Future>>` instead of using `async fn` so the
//! coordinator can hold an `Arc<dyn BookingStore>` and work on a
//! `Box<dyn UnitOfWork>`.

use crate::error::{BookingError, UniqueKey};
use crate::types::{
    AttendeeId, Booking, Event, EventChanges, EventId, LedgerEntry, PaymentReference, Quantity,
    Reservation, ReservationId,
};
use chrono::{DateTime, Utc};
use std::future::Future;
use std::pin::Pin;
use thiserror::Error;

/// Boxed future returned by storage operations.
pub type StoreFuture<'a, T> = Pin<Box<dyn Future<Output = Result<T, StoreError>> + Send + 'a>>;

/// Errors reported by storage backends.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum StoreError {
    /// The event row does not exist.
    #[error("Event not found: {0}")]
    EventNotFound(EventId),

    /// The conditional increment was refused.
    #[error("Capacity exceeded on event {event_id}: requested {requested}, remaining {remaining}")]
    CapacityExceeded {
        /// Event whose ledger refused the increment
        event_id: EventId,
        /// Seats asked for
        requested: u32,
        /// Seats left at the time of the attempt
        remaining: u32,
    },

    /// A unique index rejected the write.
    #[error("Unique constraint violated for {0}")]
    Conflict(UniqueKey),

    /// An event update would drop capacity below the reserved count.
    #[error("Capacity {requested} below reserved count {reserved}")]
    CapacityBelowReserved {
        /// Requested seat limit
        requested: u32,
        /// Seats currently held
        reserved: u32,
    },

    /// Stored state contradicts an invariant (for example a release below zero).
    #[error("Invariant violated: {0}")]
    Invariant(String),

    /// Serialization failure or deadlock; the whole unit may be retried.
    #[error("Transient contention: {0}")]
    Contention(String),

    /// Connection, pool or I/O failure.
    #[error("Storage unavailable: {0}")]
    Unavailable(String),
}

impl StoreError {
    /// Whether retrying the unit from scratch may succeed.
    #[must_use]
    pub const fn is_transient(&self) -> bool {
        matches!(self, Self::Contention(_))
    }
}

impl From<StoreError> for BookingError {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::EventNotFound(id) => Self::EventNotFound(id),
            StoreError::CapacityExceeded {
                event_id,
                requested,
                remaining,
            } => Self::CapacityExceeded {
                event_id,
                requested,
                remaining,
            },
            StoreError::Conflict(key) => Self::DuplicateReservation(key),
            StoreError::CapacityBelowReserved {
                requested,
                reserved,
            } => Self::CapacityBelowReserved {
                requested,
                reserved,
            },
            StoreError::Invariant(msg) => Self::InvariantViolation(msg),
            StoreError::Contention(msg) | StoreError::Unavailable(msg) => {
                Self::StorageUnavailable(msg)
            },
        }
    }
}

/// Authoritative per-event count of reserved seats.
pub trait CapacityLedger: Send {
    /// Locks the event row until the unit ends and returns its ledger.
    ///
    /// Reads made after the lock see every unit that touched the event and
    /// committed before it was granted.
    ///
    /// # Errors
    ///
    /// [`StoreError::EventNotFound`] if the event does not exist.
    fn lock_event(&mut self, event_id: EventId) -> StoreFuture<'_, LedgerEntry>;

    /// Adds `quantity` to the event's reserved count if the result stays within
    /// capacity.
    ///
    /// The increment and the capacity check are one atomic step; the event row
    /// stays locked until the unit ends.
    ///
    /// # Errors
    ///
    /// - [`StoreError::EventNotFound`] if the event does not exist
    /// - [`StoreError::CapacityExceeded`] with the seats remaining at the time
    fn try_reserve(&mut self, event_id: EventId, quantity: Quantity)
    -> StoreFuture<'_, LedgerEntry>;

    /// Subtracts `quantity` from the event's reserved count.
    ///
    /// # Errors
    ///
    /// - [`StoreError::EventNotFound`] if the event does not exist
    /// - [`StoreError::Invariant`] if the count would drop below zero
    fn release(&mut self, event_id: EventId, quantity: Quantity) -> StoreFuture<'_, LedgerEntry>;
}

/// The set of reservations, at most one per (event, attendee) pair.
pub trait ReservationStore: Send {
    /// Inserts a reservation.
    ///
    /// # Errors
    ///
    /// [`StoreError::Conflict`] if the pair or the payment reference is taken.
    fn create(&mut self, reservation: Reservation) -> StoreFuture<'_, ()>;

    /// Looks up a reservation by id.
    fn find_by_id(&mut self, id: ReservationId) -> StoreFuture<'_, Option<Reservation>>;

    /// Looks up the reservation of `attendee_id` on `event_id`.
    fn find_by_event_and_attendee(
        &mut self,
        event_id: EventId,
        attendee_id: AttendeeId,
    ) -> StoreFuture<'_, Option<Reservation>>;

    /// Looks up the reservation carrying `reference`.
    fn find_by_payment_reference(
        &mut self,
        reference: PaymentReference,
    ) -> StoreFuture<'_, Option<Reservation>>;

    /// Removes a reservation, returning it if it existed.
    fn delete(&mut self, id: ReservationId) -> StoreFuture<'_, Option<Reservation>>;

    /// Removes a reservation only while it is still pending.
    fn delete_if_pending(&mut self, id: ReservationId) -> StoreFuture<'_, Option<Reservation>>;

    /// Moves a pending reservation to paid under `reference`.
    ///
    /// Returns `None` when the reservation is missing or no longer pending, so
    /// that concurrent settlements finalize it exactly once.
    ///
    /// # Errors
    ///
    /// [`StoreError::Conflict`] if `reference` is attached to another reservation.
    fn settle(
        &mut self,
        id: ReservationId,
        reference: PaymentReference,
        at: DateTime<Utc>,
    ) -> StoreFuture<'_, Option<Reservation>>;
}

/// One atomic unit over the ledger and the reservation set.
///
/// Dropping a unit without calling [`UnitOfWork::commit`] discards its writes.
pub trait UnitOfWork: CapacityLedger + ReservationStore {
    /// Makes every write of the unit visible.
    ///
    /// # Errors
    ///
    /// [`StoreError::Contention`] on serialization failure,
    /// [`StoreError::Unavailable`] otherwise.
    fn commit(self: Box<Self>) -> StoreFuture<'static, ()>;

    /// Discards every write of the unit.
    ///
    /// # Errors
    ///
    /// [`StoreError::Unavailable`] if the backend could not be reached.
    fn rollback(self: Box<Self>) -> StoreFuture<'static, ()>;
}

/// Backend handle shared by the coordinator, the reconciler and the catalog.
pub trait BookingStore: Send + Sync {
    /// Opens a unit of work.
    ///
    /// # Errors
    ///
    /// [`StoreError::Unavailable`] if no connection could be acquired.
    fn begin(&self) -> StoreFuture<'_, Box<dyn UnitOfWork>>;

    /// Reads an event.
    fn event(&self, id: EventId) -> StoreFuture<'_, Option<Event>>;

    /// Reads a reservation by id.
    fn reservation(&self, id: ReservationId) -> StoreFuture<'_, Option<Reservation>>;

    /// Reads the reservation of an (event, attendee) pair.
    fn reservation_for(
        &self,
        event_id: EventId,
        attendee_id: AttendeeId,
    ) -> StoreFuture<'_, Option<Reservation>>;

    /// Reads the reservation carrying a payment reference.
    fn reservation_by_payment(
        &self,
        reference: PaymentReference,
    ) -> StoreFuture<'_, Option<Reservation>>;

    /// All bookings of an attendee, newest first.
    fn bookings_for_attendee(&self, attendee_id: AttendeeId) -> StoreFuture<'_, Vec<Booking>>;

    /// Pending reservations created strictly before `cutoff`.
    fn pending_created_before(&self, cutoff: DateTime<Utc>) -> StoreFuture<'_, Vec<Reservation>>;

    /// All events, soonest first.
    fn list_events(&self) -> StoreFuture<'_, Vec<Event>>;

    /// Events published by `owner_id`, soonest first.
    fn events_owned_by(&self, owner_id: AttendeeId) -> StoreFuture<'_, Vec<Event>>;

    /// Inserts a new event.
    fn insert_event(&self, event: Event) -> StoreFuture<'_, ()>;

    /// Applies metadata changes and returns the updated event.
    ///
    /// The reserved count is never written here.
    ///
    /// # Errors
    ///
    /// - [`StoreError::EventNotFound`] if the event does not exist
    /// - [`StoreError::CapacityBelowReserved`] if the new limit is too small
    fn update_event(&self, id: EventId, changes: EventChanges) -> StoreFuture<'_, Event>;

    /// Deletes an event and its reservations, returning how many reservations went with it.
    ///
    /// # Errors
    ///
    /// [`StoreError::EventNotFound`] if the event does not exist.
    fn delete_event(&self, id: EventId) -> StoreFuture<'_, u64>;

    /// Checks that the backend is reachable.
    fn ping(&self) -> StoreFuture<'_, ()>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn only_contention_is_transient() {
        assert!(StoreError::Contention("40001".into()).is_transient());
        assert!(!StoreError::Unavailable("pool closed".into()).is_transient());
        assert!(!StoreError::EventNotFound(EventId::new()).is_transient());
    }

    #[test]
    fn conflicts_become_duplicate_reservations() {
        let key = UniqueKey::PaymentReference(PaymentReference::generate());
        assert_eq!(
            BookingError::from(StoreError::Conflict(key.clone())),
            BookingError::DuplicateReservation(key)
        );
        assert!(BookingError::from(StoreError::Contention("deadlock".into())).is_retryable());
    }
}

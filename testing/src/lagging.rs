//! Store wrapper whose reservation lookups lag behind commits.

use std::sync::Arc;
use std::sync::atomic::{AtomicU32, Ordering};
use ticketing_core::store::{BookingStore, StoreFuture, UnitOfWork};
use ticketing_core::{
    AttendeeId, Booking, DateTime, Event, EventChanges, EventId, PaymentReference, Reservation,
    ReservationId, Utc,
};

/// Wraps a [`BookingStore`] so that its next `n` pool-level reservation
/// lookups miss, as if a concurrent unit had not committed yet.
///
/// Units of work and every other read go straight to the inner store.
///
/// # Example
///
/// ```
/// use ticketing_testing::{InMemoryBookingStore, LaggingStore};
///
/// let store = LaggingStore::new(InMemoryBookingStore::new(), 2);
/// assert_eq!(store.stale_lookups_left(), 2);
/// ```
#[derive(Clone, Debug)]
pub struct LaggingStore<S> {
    inner: S,
    stale: Arc<AtomicU32>,
}

impl<S: BookingStore> LaggingStore<S> {
    /// Wraps `inner`, missing its next `stale_lookups` reservation lookups.
    #[must_use]
    pub fn new(inner: S, stale_lookups: u32) -> Self {
        Self {
            inner,
            stale: Arc::new(AtomicU32::new(stale_lookups)),
        }
    }

    /// Stale lookups not served yet
    #[must_use]
    pub fn stale_lookups_left(&self) -> u32 {
        self.stale.load(Ordering::SeqCst)
    }

    fn take_stale(&self) -> bool {
        self.stale
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok()
    }
}

impl<S: BookingStore> BookingStore for LaggingStore<S> {
    fn begin(&self) -> StoreFuture<'_, Box<dyn UnitOfWork>> {
        self.inner.begin()
    }

    fn event(&self, id: EventId) -> StoreFuture<'_, Option<Event>> {
        self.inner.event(id)
    }

    fn reservation(&self, id: ReservationId) -> StoreFuture<'_, Option<Reservation>> {
        self.inner.reservation(id)
    }

    fn reservation_for(
        &self,
        event_id: EventId,
        attendee_id: AttendeeId,
    ) -> StoreFuture<'_, Option<Reservation>> {
        if self.take_stale() {
            return Box::pin(std::future::ready(Ok(None)));
        }
        self.inner.reservation_for(event_id, attendee_id)
    }

    fn reservation_by_payment(
        &self,
        reference: PaymentReference,
    ) -> StoreFuture<'_, Option<Reservation>> {
        if self.take_stale() {
            return Box::pin(std::future::ready(Ok(None)));
        }
        self.inner.reservation_by_payment(reference)
    }

    fn bookings_for_attendee(&self, attendee_id: AttendeeId) -> StoreFuture<'_, Vec<Booking>> {
        self.inner.bookings_for_attendee(attendee_id)
    }

    fn pending_created_before(&self, cutoff: DateTime<Utc>) -> StoreFuture<'_, Vec<Reservation>> {
        self.inner.pending_created_before(cutoff)
    }

    fn list_events(&self) -> StoreFuture<'_, Vec<Event>> {
        self.inner.list_events()
    }

    fn events_owned_by(&self, owner_id: AttendeeId) -> StoreFuture<'_, Vec<Event>> {
        self.inner.events_owned_by(owner_id)
    }

    fn insert_event(&self, event: Event) -> StoreFuture<'_, ()> {
        self.inner.insert_event(event)
    }

    fn update_event(&self, id: EventId, changes: EventChanges) -> StoreFuture<'_, Event> {
        self.inner.update_event(id, changes)
    }

    fn delete_event(&self, id: EventId) -> StoreFuture<'_, u64> {
        self.inner.delete_event(id)
    }

    fn ping(&self) -> StoreFuture<'_, ()> {
        self.inner.ping()
    }
}

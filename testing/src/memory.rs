//! In-memory booking store.
//!
//! A single async mutex guards the whole state. A unit of work holds the lock
//! for its lifetime and writes into a staged copy; `commit` publishes the copy
//! and dropping the unit throws it away. This gives every unit serializable
//! isolation, which is stricter than the `PostgreSQL` backend but enforces the
//! same capacity and uniqueness rules.

use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use ticketing_core::store::{
    BookingStore, CapacityLedger, ReservationStore, StoreError, StoreFuture, UnitOfWork,
};
use ticketing_core::{
    AttendeeId, Booking, DateTime, Event, EventChanges, EventId, LedgerEntry, PaymentReference,
    PaymentStatus, Quantity, Reservation, ReservationId, UniqueKey, Utc,
};
use tokio::sync::{Mutex, OwnedMutexGuard};

#[derive(Clone, Debug, Default)]
struct State {
    events: HashMap<EventId, Event>,
    reservations: HashMap<ReservationId, Reservation>,
}

impl State {
    fn try_reserve(&mut self, event_id: EventId, quantity: Quantity) -> Result<LedgerEntry, StoreError> {
        let event = self
            .events
            .get_mut(&event_id)
            .ok_or(StoreError::EventNotFound(event_id))?;
        let wanted = u64::from(event.reserved_count) + u64::from(quantity.get());
        let next = u32::try_from(wanted)
            .ok()
            .filter(|next| event.capacity.admits(u64::from(*next)))
            .ok_or_else(|| StoreError::CapacityExceeded {
                event_id,
                requested: quantity.get(),
                remaining: event.remaining().unwrap_or(u32::MAX),
            })?;
        event.reserved_count = next;
        Ok(event.ledger())
    }

    fn release(&mut self, event_id: EventId, quantity: Quantity) -> Result<LedgerEntry, StoreError> {
        let event = self
            .events
            .get_mut(&event_id)
            .ok_or(StoreError::EventNotFound(event_id))?;
        event.reserved_count = event
            .reserved_count
            .checked_sub(quantity.get())
            .ok_or_else(|| {
                StoreError::Invariant(format!(
                    "releasing {quantity} seats from event {event_id} holding {}",
                    event.reserved_count
                ))
            })?;
        Ok(event.ledger())
    }

    fn find_pair(&self, event_id: EventId, attendee_id: AttendeeId) -> Option<&Reservation> {
        self.reservations
            .values()
            .find(|r| r.event_id == event_id && r.attendee_id == attendee_id)
    }

    fn find_reference(&self, reference: &PaymentReference) -> Option<&Reservation> {
        self.reservations
            .values()
            .find(|r| &r.payment_reference == reference)
    }

    fn create(&mut self, reservation: Reservation) -> Result<(), StoreError> {
        if !self.events.contains_key(&reservation.event_id) {
            return Err(StoreError::EventNotFound(reservation.event_id));
        }
        if self
            .find_pair(reservation.event_id, reservation.attendee_id)
            .is_some()
        {
            return Err(StoreError::Conflict(UniqueKey::EventAttendee {
                event_id: reservation.event_id,
                attendee_id: reservation.attendee_id,
            }));
        }
        if self.find_reference(&reservation.payment_reference).is_some() {
            return Err(StoreError::Conflict(UniqueKey::PaymentReference(
                reservation.payment_reference,
            )));
        }
        self.reservations.insert(reservation.id, reservation);
        Ok(())
    }

    fn settle(
        &mut self,
        id: ReservationId,
        reference: PaymentReference,
        at: DateTime<Utc>,
    ) -> Result<Option<Reservation>, StoreError> {
        if !self.reservations.get(&id).is_some_and(Reservation::is_pending) {
            return Ok(None);
        }
        if self
            .find_reference(&reference)
            .is_some_and(|holder| holder.id != id)
        {
            return Err(StoreError::Conflict(UniqueKey::PaymentReference(reference)));
        }
        let Some(reservation) = self.reservations.get_mut(&id) else {
            return Ok(None);
        };
        reservation.settle(reference, at);
        Ok(Some(reservation.clone()))
    }

    fn delete_if_pending(&mut self, id: ReservationId) -> Option<Reservation> {
        if self.reservations.get(&id).is_some_and(Reservation::is_pending) {
            self.reservations.remove(&id)
        } else {
            None
        }
    }

    fn update_event(&mut self, id: EventId, changes: &EventChanges) -> Result<Event, StoreError> {
        let event = self
            .events
            .get_mut(&id)
            .ok_or(StoreError::EventNotFound(id))?;
        if let Some(limit) = changes.capacity.and_then(ticketing_core::Capacity::limit) {
            if limit < event.reserved_count {
                return Err(StoreError::CapacityBelowReserved {
                    requested: limit,
                    reserved: event.reserved_count,
                });
            }
        }
        changes.apply_to(event);
        Ok(event.clone())
    }

    fn delete_event(&mut self, id: EventId) -> Result<u64, StoreError> {
        self.events
            .remove(&id)
            .ok_or(StoreError::EventNotFound(id))?;
        let before = self.reservations.len();
        self.reservations.retain(|_, r| r.event_id != id);
        Ok((before - self.reservations.len()) as u64)
    }

    fn events_where(&self, keep: impl Fn(&Event) -> bool) -> Vec<Event> {
        let mut events: Vec<Event> = self.events.values().filter(|e| keep(e)).cloned().collect();
        events.sort_by_key(|e| (e.starts_at, e.created_at));
        events
    }

    fn booking(&self, reservation: &Reservation) -> Option<Booking> {
        self.events.get(&reservation.event_id).map(|event| Booking {
            reservation: reservation.clone(),
            event: event.summary(),
        })
    }
}

/// Failure switches shared between the store and its open units.
#[derive(Debug, Default)]
struct Faults {
    unavailable: AtomicBool,
    contended_commits: AtomicU32,
}

impl Faults {
    fn check_available(&self) -> Result<(), StoreError> {
        if self.unavailable.load(Ordering::SeqCst) {
            return Err(StoreError::Unavailable("store marked unavailable".into()));
        }
        Ok(())
    }

    fn take_contention(&self) -> bool {
        self.contended_commits
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok()
    }
}

/// In-memory [`BookingStore`] for tests and local development.
///
/// # Example
///
/// ```
/// use ticketing_testing::InMemoryBookingStore;
///
/// let store = InMemoryBookingStore::new();
/// store.fail_next_commits(1);
/// ```
#[derive(Clone, Debug, Default)]
pub struct InMemoryBookingStore {
    state: Arc<Mutex<State>>,
    faults: Arc<Faults>,
}

impl InMemoryBookingStore {
    /// Create a new empty store
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Makes every operation fail with `StoreError::Unavailable` until reset.
    pub fn set_unavailable(&self, unavailable: bool) {
        self.faults.unavailable.store(unavailable, Ordering::SeqCst);
    }

    /// Makes the next `count` commits fail with `StoreError::Contention`,
    /// discarding their writes as a serialization failure would.
    pub fn fail_next_commits(&self, count: u32) {
        self.faults.contended_commits.store(count, Ordering::SeqCst);
    }

    /// Seeds an event directly, bypassing the catalog.
    pub async fn put_event(&self, event: Event) {
        self.state.lock().await.events.insert(event.id, event);
    }

    /// All reservations on an event, in no particular order.
    pub async fn reservations_on(&self, event_id: EventId) -> Vec<Reservation> {
        self.state
            .lock()
            .await
            .reservations
            .values()
            .filter(|r| r.event_id == event_id)
            .cloned()
            .collect()
    }

    /// Number of reservations across all events.
    pub async fn reservation_count(&self) -> usize {
        self.state.lock().await.reservations.len()
    }
}

impl BookingStore for InMemoryBookingStore {
    fn begin(&self) -> StoreFuture<'_, Box<dyn UnitOfWork>> {
        Box::pin(async move {
            self.faults.check_available()?;
            let guard = Arc::clone(&self.state).lock_owned().await;
            let staged = guard.clone();
            Ok(Box::new(InMemoryUnitOfWork {
                guard,
                staged,
                faults: Arc::clone(&self.faults),
            }) as Box<dyn UnitOfWork>)
        })
    }

    fn event(&self, id: EventId) -> StoreFuture<'_, Option<Event>> {
        Box::pin(async move {
            self.faults.check_available()?;
            Ok(self.state.lock().await.events.get(&id).cloned())
        })
    }

    fn reservation(&self, id: ReservationId) -> StoreFuture<'_, Option<Reservation>> {
        Box::pin(async move {
            self.faults.check_available()?;
            Ok(self.state.lock().await.reservations.get(&id).cloned())
        })
    }

    fn reservation_for(
        &self,
        event_id: EventId,
        attendee_id: AttendeeId,
    ) -> StoreFuture<'_, Option<Reservation>> {
        Box::pin(async move {
            self.faults.check_available()?;
            Ok(self
                .state
                .lock()
                .await
                .find_pair(event_id, attendee_id)
                .cloned())
        })
    }

    fn reservation_by_payment(
        &self,
        reference: PaymentReference,
    ) -> StoreFuture<'_, Option<Reservation>> {
        Box::pin(async move {
            self.faults.check_available()?;
            Ok(self.state.lock().await.find_reference(&reference).cloned())
        })
    }

    fn bookings_for_attendee(&self, attendee_id: AttendeeId) -> StoreFuture<'_, Vec<Booking>> {
        Box::pin(async move {
            self.faults.check_available()?;
            let state = self.state.lock().await;
            let mut bookings: Vec<Booking> = state
                .reservations
                .values()
                .filter(|r| r.attendee_id == attendee_id)
                .filter_map(|r| state.booking(r))
                .collect();
            bookings.sort_by(|a, b| b.reservation.created_at.cmp(&a.reservation.created_at));
            Ok(bookings)
        })
    }

    fn pending_created_before(&self, cutoff: DateTime<Utc>) -> StoreFuture<'_, Vec<Reservation>> {
        Box::pin(async move {
            self.faults.check_available()?;
            let state = self.state.lock().await;
            let mut pending: Vec<Reservation> = state
                .reservations
                .values()
                .filter(|r| r.payment_status == PaymentStatus::Pending && r.created_at < cutoff)
                .cloned()
                .collect();
            pending.sort_by_key(|r| r.created_at);
            Ok(pending)
        })
    }

    fn list_events(&self) -> StoreFuture<'_, Vec<Event>> {
        Box::pin(async move {
            self.faults.check_available()?;
            Ok(self.state.lock().await.events_where(|_| true))
        })
    }

    fn events_owned_by(&self, owner_id: AttendeeId) -> StoreFuture<'_, Vec<Event>> {
        Box::pin(async move {
            self.faults.check_available()?;
            Ok(self
                .state
                .lock()
                .await
                .events_where(|e| e.owner_id == owner_id))
        })
    }

    fn insert_event(&self, event: Event) -> StoreFuture<'_, ()> {
        Box::pin(async move {
            self.faults.check_available()?;
            self.state.lock().await.events.insert(event.id, event);
            Ok(())
        })
    }

    fn update_event(&self, id: EventId, changes: EventChanges) -> StoreFuture<'_, Event> {
        Box::pin(async move {
            self.faults.check_available()?;
            self.state.lock().await.update_event(id, &changes)
        })
    }

    fn delete_event(&self, id: EventId) -> StoreFuture<'_, u64> {
        Box::pin(async move {
            self.faults.check_available()?;
            self.state.lock().await.delete_event(id)
        })
    }

    fn ping(&self) -> StoreFuture<'_, ()> {
        Box::pin(async move { self.faults.check_available() })
    }
}

/// Unit of work over a staged copy of the store state.
struct InMemoryUnitOfWork {
    guard: OwnedMutexGuard<State>,
    staged: State,
    faults: Arc<Faults>,
}

impl CapacityLedger for InMemoryUnitOfWork {
    // The unit already holds the store lock.
    fn lock_event(&mut self, event_id: EventId) -> StoreFuture<'_, LedgerEntry> {
        Box::pin(std::future::ready(
            self.staged
                .events
                .get(&event_id)
                .map(Event::ledger)
                .ok_or(StoreError::EventNotFound(event_id)),
        ))
    }

    fn try_reserve(
        &mut self,
        event_id: EventId,
        quantity: Quantity,
    ) -> StoreFuture<'_, LedgerEntry> {
        Box::pin(std::future::ready(self.staged.try_reserve(event_id, quantity)))
    }

    fn release(&mut self, event_id: EventId, quantity: Quantity) -> StoreFuture<'_, LedgerEntry> {
        Box::pin(std::future::ready(self.staged.release(event_id, quantity)))
    }
}

impl ReservationStore for InMemoryUnitOfWork {
    fn create(&mut self, reservation: Reservation) -> StoreFuture<'_, ()> {
        Box::pin(std::future::ready(self.staged.create(reservation)))
    }

    fn find_by_id(&mut self, id: ReservationId) -> StoreFuture<'_, Option<Reservation>> {
        Box::pin(std::future::ready(Ok(self.staged.reservations.get(&id).cloned())))
    }

    fn find_by_event_and_attendee(
        &mut self,
        event_id: EventId,
        attendee_id: AttendeeId,
    ) -> StoreFuture<'_, Option<Reservation>> {
        Box::pin(std::future::ready(Ok(self
            .staged
            .find_pair(event_id, attendee_id)
            .cloned())))
    }

    fn find_by_payment_reference(
        &mut self,
        reference: PaymentReference,
    ) -> StoreFuture<'_, Option<Reservation>> {
        Box::pin(std::future::ready(Ok(self
            .staged
            .find_reference(&reference)
            .cloned())))
    }

    fn delete(&mut self, id: ReservationId) -> StoreFuture<'_, Option<Reservation>> {
        Box::pin(std::future::ready(Ok(self.staged.reservations.remove(&id))))
    }

    fn delete_if_pending(&mut self, id: ReservationId) -> StoreFuture<'_, Option<Reservation>> {
        Box::pin(std::future::ready(Ok(self.staged.delete_if_pending(id))))
    }

    fn settle(
        &mut self,
        id: ReservationId,
        reference: PaymentReference,
        at: DateTime<Utc>,
    ) -> StoreFuture<'_, Option<Reservation>> {
        Box::pin(std::future::ready(self.staged.settle(id, reference, at)))
    }
}

impl UnitOfWork for InMemoryUnitOfWork {
    fn commit(self: Box<Self>) -> StoreFuture<'static, ()> {
        let Self {
            mut guard,
            staged,
            faults,
        } = *self;
        Box::pin(async move {
            faults.check_available()?;
            if faults.take_contention() {
                return Err(StoreError::Contention(
                    "could not serialize access due to concurrent update".into(),
                ));
            }
            *guard = staged;
            Ok(())
        })
    }

    fn rollback(self: Box<Self>) -> StoreFuture<'static, ()> {
        drop(self);
        Box::pin(std::future::ready(Ok(())))
    }
}

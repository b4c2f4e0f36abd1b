//! # Ticketing Testing
//!
//! Testing utilities for the ticketing service.
//!
//! This crate provides:
//! - [`InMemoryBookingStore`]: transactional in-memory backend with fault injection
//! - [`InMemoryPaymentGateway`]: scriptable checkout sessions
//! - [`LaggingStore`]: reservation lookups that miss recent commits
//! - Deterministic clocks ([`FixedClock`], [`ManualClock`])
//! - [`EventBuilder`] for event fixtures
//!
//! ## Example
//!
//! ```ignore
//! use ticketing_testing::{EventBuilder, InMemoryBookingStore, harness};
//!
//! #[tokio::test]
//! async fn books_a_free_event() {
//!     let h = harness();
//!     let event = EventBuilder::new().capacity(1).build();
//!     h.store.put_event(event.clone()).await;
//!     // ...
//! }
//! ```

use std::sync::Arc;
use ticketing_core::{
    AttendeeId, Capacity, Clock, DateTime, Event, EventId, EventSummary, Money, PaymentGateway,
    PaymentReconciler, ReservationCoordinator, RetryPolicy, Utc,
};

mod gateway;
mod lagging;
mod memory;

pub use gateway::InMemoryPaymentGateway;
pub use lagging::LaggingStore;
pub use memory::InMemoryBookingStore;

/// Mock implementations of Environment traits
pub mod mocks {
    use chrono::{DateTime, Duration, Utc};
    use std::sync::{Arc, Mutex, PoisonError};
    use ticketing_core::Clock;

    /// Fixed clock for deterministic tests
    ///
    /// Always returns the same time, making tests reproducible.
    ///
    /// # Example
    ///
    /// ```
    /// use ticketing_testing::mocks::FixedClock;
    /// use ticketing_core::Clock;
    /// use chrono::Utc;
    ///
    /// let clock = FixedClock::new(Utc::now());
    /// assert_eq!(clock.now(), clock.now());
    /// ```
    #[derive(Debug, Clone)]
    pub struct FixedClock {
        time: DateTime<Utc>,
    }

    impl FixedClock {
        /// Create a new fixed clock with the given time
        #[must_use]
        pub const fn new(time: DateTime<Utc>) -> Self {
            Self { time }
        }
    }

    impl Clock for FixedClock {
        fn now(&self) -> DateTime<Utc> {
            self.time
        }
    }

    /// Clock that only moves when the test advances it.
    ///
    /// Clones share the same time.
    #[derive(Debug, Clone)]
    pub struct ManualClock {
        time: Arc<Mutex<DateTime<Utc>>>,
    }

    impl ManualClock {
        /// Create a clock starting at `time`
        #[must_use]
        pub fn new(time: DateTime<Utc>) -> Self {
            Self {
                time: Arc::new(Mutex::new(time)),
            }
        }

        /// Move the clock forward by `by`
        pub fn advance(&self, by: Duration) {
            let mut time = self.time.lock().unwrap_or_else(PoisonError::into_inner);
            *time += by;
        }
    }

    impl Clock for ManualClock {
        fn now(&self) -> DateTime<Utc> {
            *self.time.lock().unwrap_or_else(PoisonError::into_inner)
        }
    }

    /// Start of every test timeline (2025-01-01 00:00:00 UTC)
    #[must_use]
    pub fn epoch() -> DateTime<Utc> {
        DateTime::<Utc>::from_timestamp(1_735_689_600, 0).unwrap_or_default()
    }

    /// Create a default fixed clock for tests (2025-01-01 00:00:00 UTC)
    #[must_use]
    pub fn test_clock() -> FixedClock {
        FixedClock::new(epoch())
    }
}

pub use mocks::{FixedClock, ManualClock, epoch, test_clock};

/// Builder for event fixtures.
///
/// Defaults: free, capacity 10, starting 30 days after [`epoch`], random owner.
#[derive(Debug, Clone)]
pub struct EventBuilder {
    event: Event,
}

impl EventBuilder {
    /// Start from the defaults
    #[must_use]
    pub fn new() -> Self {
        let starts_at = epoch() + chrono::Duration::days(30);
        Self {
            event: Event {
                id: EventId::new(),
                title: "Rust Meetup".into(),
                location: "Main Hall".into(),
                starts_at,
                price: Money::ZERO,
                capacity: Capacity::from_limit(Some(10)).unwrap_or(Capacity::Unlimited),
                reserved_count: 0,
                owner_id: AttendeeId::new(),
                created_at: epoch(),
            },
        }
    }

    /// Seat limit; zero or negative means unlimited
    #[must_use]
    pub fn capacity(mut self, seats: i64) -> Self {
        self.event.capacity = Capacity::from_limit(Some(seats)).unwrap_or(Capacity::Unlimited);
        self
    }

    /// No seat limit
    #[must_use]
    pub const fn unlimited(mut self) -> Self {
        self.event.capacity = Capacity::Unlimited;
        self
    }

    /// Price per seat in cents
    #[must_use]
    pub const fn price_cents(mut self, cents: u64) -> Self {
        self.event.price = Money::from_cents(cents);
        self
    }

    /// Start time
    #[must_use]
    pub const fn starts_at(mut self, starts_at: DateTime<Utc>) -> Self {
        self.event.starts_at = starts_at;
        self
    }

    /// Organizer
    #[must_use]
    pub const fn owner(mut self, owner: AttendeeId) -> Self {
        self.event.owner_id = owner;
        self
    }

    /// Build the event
    #[must_use]
    pub fn build(self) -> Event {
        self.event
    }

    /// Build only the summary that bookings carry
    #[must_use]
    pub fn summary(self) -> EventSummary {
        self.event.summary()
    }
}

impl Default for EventBuilder {
    fn default() -> Self {
        Self::new()
    }
}

/// Coordinator, reconciler and their in-memory backends wired together.
#[derive(Clone)]
pub struct Harness {
    /// Shared store
    pub store: InMemoryBookingStore,
    /// Shared gateway
    pub gateway: InMemoryPaymentGateway,
    /// Shared clock
    pub clock: ManualClock,
    /// Coordinator over the store
    pub coordinator: ReservationCoordinator,
    /// Reconciler over the store
    pub reconciler: PaymentReconciler,
}

/// Builds a [`Harness`] at [`epoch`] with fast retries.
#[must_use]
pub fn harness() -> Harness {
    let store = InMemoryBookingStore::new();
    let gateway = InMemoryPaymentGateway::new();
    let clock = ManualClock::new(epoch());
    let retry = RetryPolicy::default()
        .with_initial_delay(std::time::Duration::from_millis(1))
        .with_max_delay(std::time::Duration::from_millis(5));

    let shared_store: Arc<dyn ticketing_core::BookingStore> = Arc::new(store.clone());
    let shared_gateway: Arc<dyn PaymentGateway> = Arc::new(gateway.clone());
    let shared_clock: Arc<dyn Clock> = Arc::new(clock.clone());

    let coordinator = ReservationCoordinator::new(
        Arc::clone(&shared_store),
        Arc::clone(&shared_gateway),
        Arc::clone(&shared_clock),
    )
    .with_retry_policy(retry.clone());
    let reconciler = PaymentReconciler::new(shared_store, shared_gateway, shared_clock)
        .with_retry_policy(retry);

    Harness {
        store,
        gateway,
        clock,
        coordinator,
        reconciler,
    }
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used, clippy::expect_used)]

    use super::*;
    use ticketing_core::store::BookingStore;
    use ticketing_core::{Quantity, StoreError};

    #[test]
    fn fixed_clock_never_moves() {
        let clock = test_clock();
        assert_eq!(clock.now(), clock.now());
        assert_eq!(clock.now(), epoch());
    }

    #[test]
    fn manual_clock_advances_all_clones() {
        let clock = ManualClock::new(epoch());
        let other = clock.clone();
        clock.advance(chrono::Duration::minutes(5));
        assert_eq!(other.now(), epoch() + chrono::Duration::minutes(5));
    }

    #[tokio::test]
    async fn dropped_unit_discards_writes() {
        let store = InMemoryBookingStore::new();
        let event = EventBuilder::new().capacity(2).build();
        store.put_event(event.clone()).await;

        {
            let mut unit = store.begin().await.unwrap();
            unit.try_reserve(event.id, Quantity::new(2).unwrap())
                .await
                .unwrap();
        }

        let stored = store.event(event.id).await.unwrap().unwrap();
        assert_eq!(stored.reserved_count, 0);
    }

    #[tokio::test]
    async fn committed_unit_publishes_writes() {
        let store = InMemoryBookingStore::new();
        let event = EventBuilder::new().capacity(2).build();
        store.put_event(event.clone()).await;

        let mut unit = store.begin().await.unwrap();
        let ledger = unit
            .try_reserve(event.id, Quantity::new(2).unwrap())
            .await
            .unwrap();
        assert_eq!(ledger.remaining(), Some(0));
        unit.commit().await.unwrap();

        let stored = store.event(event.id).await.unwrap().unwrap();
        assert_eq!(stored.reserved_count, 2);
    }

    #[tokio::test]
    async fn injected_contention_fails_commit_once() {
        let store = InMemoryBookingStore::new();
        let event = EventBuilder::new().build();
        store.put_event(event.clone()).await;
        store.fail_next_commits(1);

        let mut unit = store.begin().await.unwrap();
        unit.try_reserve(event.id, Quantity::new(1).unwrap())
            .await
            .unwrap();
        assert!(matches!(
            unit.commit().await,
            Err(StoreError::Contention(_))
        ));

        let mut unit = store.begin().await.unwrap();
        unit.try_reserve(event.id, Quantity::new(1).unwrap())
            .await
            .unwrap();
        unit.commit().await.unwrap();
        assert_eq!(store.event(event.id).await.unwrap().unwrap().reserved_count, 1);
    }

    #[tokio::test]
    async fn lock_event_reports_the_staged_ledger() {
        let store = InMemoryBookingStore::new();
        let event = EventBuilder::new().capacity(3).build();
        store.put_event(event.clone()).await;

        let mut unit = store.begin().await.unwrap();
        unit.try_reserve(event.id, Quantity::new(2).unwrap())
            .await
            .unwrap();
        let ledger = unit.lock_event(event.id).await.unwrap();
        assert_eq!(ledger.reserved_count, 2);
        assert_eq!(ledger.remaining(), Some(1));

        let missing = EventId::new();
        assert_eq!(
            unit.lock_event(missing).await,
            Err(StoreError::EventNotFound(missing))
        );
    }

    #[tokio::test]
    async fn lagging_store_misses_only_the_first_lookups() {
        let store = InMemoryBookingStore::new();
        let event = EventBuilder::new().build();
        store.put_event(event.clone()).await;
        let reservation = ticketing_core::Reservation {
            id: ticketing_core::ReservationId::new(),
            event_id: event.id,
            attendee_id: AttendeeId::new(),
            quantity: Quantity::new(1).unwrap(),
            total_price: Money::ZERO,
            payment_reference: ticketing_core::PaymentReference::generate(),
            payment_status: ticketing_core::PaymentStatus::Success,
            paid: true,
            created_at: epoch(),
            settled_at: Some(epoch()),
        };
        let mut unit = store.begin().await.unwrap();
        unit.create(reservation.clone()).await.unwrap();
        unit.commit().await.unwrap();

        let lagging = LaggingStore::new(store, 1);
        let first = lagging
            .reservation_for(event.id, reservation.attendee_id)
            .await
            .unwrap();
        let second = lagging
            .reservation_for(event.id, reservation.attendee_id)
            .await
            .unwrap();

        assert_eq!(first, None);
        assert_eq!(second, Some(reservation));
        assert_eq!(lagging.stale_lookups_left(), 0);
    }

    #[tokio::test]
    async fn release_below_zero_is_an_invariant_violation() {
        let store = InMemoryBookingStore::new();
        let event = EventBuilder::new().build();
        store.put_event(event.clone()).await;

        let mut unit = store.begin().await.unwrap();
        assert!(matches!(
            unit.release(event.id, Quantity::new(1).unwrap()).await,
            Err(StoreError::Invariant(_))
        ));
    }

    #[tokio::test]
    async fn unavailable_store_fails_ping() {
        let store = InMemoryBookingStore::new();
        store.set_unavailable(true);
        assert!(matches!(store.ping().await, Err(StoreError::Unavailable(_))));
        store.set_unavailable(false);
        assert!(store.ping().await.is_ok());
    }
}

//! Event catalog: publishing rules, listings and edits.

#![allow(clippy::unwrap_used, clippy::expect_used)] // Test code can use unwrap/expect

use chrono::Duration;
use std::sync::Arc;
use ticketing_core::{
    AttendeeId, BookingError, BookingStore, Capacity, Caller, EventCatalog, EventChanges,
    EventDetails, Money,
};
use ticketing_testing::{EventBuilder, InMemoryBookingStore, ManualClock, epoch};

fn catalog() -> (EventCatalog, InMemoryBookingStore, ManualClock) {
    let store = InMemoryBookingStore::new();
    let clock = ManualClock::new(epoch());
    let catalog = EventCatalog::new(Arc::new(store.clone()), Arc::new(clock.clone()));
    (catalog, store, clock)
}

fn details(starts_in: Duration) -> EventDetails {
    EventDetails {
        title: "  Jazz Evening ".into(),
        location: "Blue Room".into(),
        starts_at: epoch() + starts_in,
        price: Money::from_cents(1_200),
        capacity: Capacity::Unlimited,
    }
}

fn past_date() -> BookingError {
    BookingError::InvalidEvent("Event date cannot be in the past".into())
}

#[tokio::test]
async fn published_event_is_trimmed_and_owned_by_caller() {
    let (catalog, _, _) = catalog();
    let owner = AttendeeId::new();

    let event = catalog
        .create(Caller::user(owner), details(Duration::days(2)))
        .await
        .unwrap();

    assert_eq!(event.title, "Jazz Evening");
    assert_eq!(event.owner_id, owner);
    assert_eq!(event.reserved_count, 0);
    assert_eq!(event.created_at, epoch());
    assert_eq!(catalog.get(event.id).await.unwrap(), event);
}

#[tokio::test]
async fn events_must_start_after_now() {
    let (catalog, store, _) = catalog();
    let owner = Caller::user(AttendeeId::new());

    let past = catalog.create(owner, details(-Duration::hours(1))).await;
    let now = catalog.create(owner, details(Duration::zero())).await;

    assert_eq!(past, Err(past_date()));
    assert_eq!(now, Err(past_date()));
    assert!(store.list_events().await.unwrap().is_empty());
}

#[tokio::test]
async fn moving_an_event_into_the_past_is_refused() {
    let (catalog, store, clock) = catalog();
    let owner = AttendeeId::new();
    let event = EventBuilder::new()
        .owner(owner)
        .starts_at(epoch() + Duration::days(3))
        .build();
    store.put_event(event.clone()).await;

    clock.advance(Duration::days(1));
    let moved = catalog
        .update(
            event.id,
            Caller::user(owner),
            EventChanges {
                starts_at: Some(epoch() + Duration::hours(12)),
                ..EventChanges::default()
            },
        )
        .await;
    assert_eq!(moved, Err(past_date()));

    let renamed = catalog
        .update(
            event.id,
            Caller::user(owner),
            EventChanges {
                title: Some("Late Show".into()),
                starts_at: Some(epoch() + Duration::days(4)),
                ..EventChanges::default()
            },
        )
        .await
        .unwrap();
    assert_eq!(renamed.title, "Late Show");
    assert_eq!(renamed.starts_at, epoch() + Duration::days(4));
}

#[tokio::test]
async fn listings_are_ordered_by_start_and_filtered_by_owner() {
    let (catalog, store, _) = catalog();
    let owner = AttendeeId::new();
    let late = EventBuilder::new()
        .owner(owner)
        .starts_at(epoch() + Duration::days(20))
        .build();
    let early = EventBuilder::new()
        .starts_at(epoch() + Duration::days(5))
        .build();
    let middle = EventBuilder::new()
        .owner(owner)
        .starts_at(epoch() + Duration::days(10))
        .build();
    for event in [&late, &early, &middle] {
        store.put_event(event.clone()).await;
    }

    let all: Vec<_> = catalog.list().await.unwrap().into_iter().map(|e| e.id).collect();
    let mine: Vec<_> = catalog
        .list_owned_by(owner)
        .await
        .unwrap()
        .into_iter()
        .map(|e| e.id)
        .collect();

    assert_eq!(all, vec![early.id, middle.id, late.id]);
    assert_eq!(mine, vec![middle.id, late.id]);
    assert!(catalog.list_owned_by(AttendeeId::new()).await.unwrap().is_empty());
}

#[tokio::test]
async fn listing_fails_when_storage_is_down() {
    let (catalog, store, _) = catalog();
    store.set_unavailable(true);

    assert!(matches!(
        catalog.list().await,
        Err(BookingError::StorageUnavailable(_))
    ));
}

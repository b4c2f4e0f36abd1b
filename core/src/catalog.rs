//! Event publishing and maintenance.
//!
//! The catalog edits event metadata only. The reserved count belongs to the
//! ledger and is never written from here, except that deleting an event takes
//! its reservations along in the same atomic step.

use crate::environment::Clock;
use crate::error::BookingError;
use crate::store::BookingStore;
use crate::types::{AttendeeId, Caller, Event, EventChanges, EventDetails, EventId};
use chrono::{DateTime, Utc};
use std::sync::Arc;

/// Creates, reads, updates and deletes events.
#[derive(Clone)]
pub struct EventCatalog {
    store: Arc<dyn BookingStore>,
    clock: Arc<dyn Clock>,
}

impl EventCatalog {
    /// Creates a catalog over the given store.
    #[must_use]
    pub fn new(store: Arc<dyn BookingStore>, clock: Arc<dyn Clock>) -> Self {
        Self { store, clock }
    }

    /// Publishes a new event owned by `owner`.
    ///
    /// # Errors
    ///
    /// - [`BookingError::InvalidEvent`] if the title or location is blank or
    ///   the start time is not in the future
    /// - [`BookingError::StorageUnavailable`] if storage failed
    pub async fn create(&self, owner: Caller, details: EventDetails) -> Result<Event, BookingError> {
        validate_text("title", &details.title)?;
        validate_text("location", &details.location)?;
        let now = self.clock.now();
        validate_start(details.starts_at, now)?;

        let event = Event {
            id: EventId::new(),
            title: details.title.trim().to_owned(),
            location: details.location.trim().to_owned(),
            starts_at: details.starts_at,
            price: details.price,
            capacity: details.capacity,
            reserved_count: 0,
            owner_id: owner.id,
            created_at: now,
        };
        self.store.insert_event(event.clone()).await?;

        tracing::info!(event_id = %event.id, owner_id = %owner.id, "Event created");
        Ok(event)
    }

    /// Reads an event.
    ///
    /// # Errors
    ///
    /// [`BookingError::EventNotFound`] if it does not exist.
    pub async fn get(&self, id: EventId) -> Result<Event, BookingError> {
        self.store
            .event(id)
            .await?
            .ok_or(BookingError::EventNotFound(id))
    }

    /// Lists every event, soonest first.
    ///
    /// # Errors
    ///
    /// [`BookingError::StorageUnavailable`] if storage failed.
    pub async fn list(&self) -> Result<Vec<Event>, BookingError> {
        Ok(self.store.list_events().await?)
    }

    /// Lists the events published by `owner`, soonest first.
    ///
    /// # Errors
    ///
    /// [`BookingError::StorageUnavailable`] if storage failed.
    pub async fn list_owned_by(&self, owner: AttendeeId) -> Result<Vec<Event>, BookingError> {
        Ok(self.store.events_owned_by(owner).await?)
    }

    /// Applies metadata changes on behalf of `caller`.
    ///
    /// Existing reservations keep the price they were booked at.
    ///
    /// # Errors
    ///
    /// - [`BookingError::EventNotFound`] if it does not exist
    /// - [`BookingError::Forbidden`] unless the caller owns it or is an admin
    /// - [`BookingError::InvalidEvent`] if a new title or location is blank or
    ///   a new start time is not in the future
    /// - [`BookingError::CapacityBelowReserved`] if the new limit is too small
    pub async fn update(
        &self,
        id: EventId,
        caller: Caller,
        mut changes: EventChanges,
    ) -> Result<Event, BookingError> {
        let event = self.get(id).await?;
        if !caller.may_act_for(event.owner_id) {
            return Err(BookingError::Forbidden);
        }
        if let Some(title) = changes.title.as_mut() {
            validate_text("title", title)?;
            *title = title.trim().to_owned();
        }
        if let Some(location) = changes.location.as_mut() {
            validate_text("location", location)?;
            *location = location.trim().to_owned();
        }
        if let Some(starts_at) = changes.starts_at {
            validate_start(starts_at, self.clock.now())?;
        }

        let updated = self.store.update_event(id, changes).await?;
        tracing::info!(event_id = %id, "Event updated");
        Ok(updated)
    }

    /// Deletes an event and every reservation on it.
    ///
    /// Returns the number of reservations removed.
    ///
    /// # Errors
    ///
    /// - [`BookingError::EventNotFound`] if it does not exist
    /// - [`BookingError::Forbidden`] unless the caller owns it or is an admin
    pub async fn delete(&self, id: EventId, caller: Caller) -> Result<u64, BookingError> {
        let event = self.get(id).await?;
        if !caller.may_act_for(event.owner_id) {
            return Err(BookingError::Forbidden);
        }

        let removed = self.store.delete_event(id).await?;
        tracing::info!(event_id = %id, reservations_removed = removed, "Event deleted");
        Ok(removed)
    }
}

fn validate_text(field: &str, value: &str) -> Result<(), BookingError> {
    if value.trim().is_empty() {
        return Err(BookingError::InvalidEvent(format!("{field} must not be empty")));
    }
    Ok(())
}

fn validate_start(starts_at: DateTime<Utc>, now: DateTime<Utc>) -> Result<(), BookingError> {
    if starts_at <= now {
        return Err(BookingError::InvalidEvent(
            "Event date cannot be in the past".into(),
        ));
    }
    Ok(())
}

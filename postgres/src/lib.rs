//! `PostgreSQL` backend for the ticketing booking store.
//!
//! Implements [`BookingStore`] and [`UnitOfWork`] from `ticketing-core` on a
//! sqlx connection pool:
//!
//! - The capacity ledger is the `reserved_count` column on `events`, moved only
//!   by a conditional `UPDATE ... RETURNING` that checks capacity in the same
//!   statement
//! - Reservations carry unique constraints on `(event_id, attendee_id)` and on
//!   `payment_reference`, so duplicates lose at commit time whatever the race
//! - A unit of work is one transaction; dropping it rolls back
//!
//! # Example
//!
//! ```no_run
//! use ticketing_postgres::PostgresBookingStore;
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let store = PostgresBookingStore::connect("postgres://localhost/ticketing", 10).await?;
//! store.migrate().await?;
//! # Ok(())
//! # }
//! ```
//!
//! [`UnitOfWork`]: ticketing_core::store::UnitOfWork

#![forbid(unsafe_code)]
#![warn(missing_docs)]

mod queries;
mod rows;
mod unit;

use chrono::{DateTime, Utc};
use sqlx::PgPool;
use sqlx::postgres::PgPoolOptions;
use ticketing_core::store::{BookingStore, StoreError, StoreFuture, UnitOfWork};
use ticketing_core::{
    AttendeeId, Booking, Event, EventChanges, EventId, PaymentReference, Reservation,
    ReservationId,
};
use unit::PostgresUnitOfWork;

/// [`BookingStore`] backed by a `PostgreSQL` pool.
#[derive(Clone, Debug)]
pub struct PostgresBookingStore {
    pool: PgPool,
}

impl PostgresBookingStore {
    /// Connects a pool of at most `max_connections` to `database_url`.
    ///
    /// # Errors
    ///
    /// [`StoreError::Unavailable`] if the database cannot be reached.
    pub async fn connect(database_url: &str, max_connections: u32) -> Result<Self, StoreError> {
        let pool = PgPoolOptions::new()
            .max_connections(max_connections)
            .connect(database_url)
            .await
            .map_err(queries::map_sqlx)?;
        tracing::info!(max_connections, "Connected to PostgreSQL");
        Ok(Self { pool })
    }

    /// Wraps an existing pool.
    #[must_use]
    pub const fn from_pool(pool: PgPool) -> Self {
        Self { pool }
    }

    /// The underlying pool.
    #[must_use]
    pub const fn pool(&self) -> &PgPool {
        &self.pool
    }

    /// Applies the embedded schema migrations.
    ///
    /// # Errors
    ///
    /// [`StoreError::Unavailable`] if a migration fails.
    pub async fn migrate(&self) -> Result<(), StoreError> {
        sqlx::migrate!("./migrations")
            .run(&self.pool)
            .await
            .map_err(|e| StoreError::Unavailable(format!("migration failed: {e}")))?;
        tracing::info!("Database migrations applied");
        Ok(())
    }
}

impl BookingStore for PostgresBookingStore {
    fn begin(&self) -> StoreFuture<'_, Box<dyn UnitOfWork>> {
        Box::pin(async move {
            let tx = self.pool.begin().await.map_err(queries::map_sqlx)?;
            Ok(Box::new(PostgresUnitOfWork::new(tx)) as Box<dyn UnitOfWork>)
        })
    }

    fn event(&self, id: EventId) -> StoreFuture<'_, Option<Event>> {
        Box::pin(async move { queries::find_event(&self.pool, id).await })
    }

    fn reservation(&self, id: ReservationId) -> StoreFuture<'_, Option<Reservation>> {
        Box::pin(async move { queries::find_reservation(&self.pool, id).await })
    }

    fn reservation_for(
        &self,
        event_id: EventId,
        attendee_id: AttendeeId,
    ) -> StoreFuture<'_, Option<Reservation>> {
        Box::pin(async move { queries::find_by_pair(&self.pool, event_id, attendee_id).await })
    }

    fn reservation_by_payment(
        &self,
        reference: PaymentReference,
    ) -> StoreFuture<'_, Option<Reservation>> {
        Box::pin(async move { queries::find_by_reference(&self.pool, &reference).await })
    }

    fn bookings_for_attendee(&self, attendee_id: AttendeeId) -> StoreFuture<'_, Vec<Booking>> {
        Box::pin(async move { queries::bookings_for(&self.pool, attendee_id).await })
    }

    fn pending_created_before(&self, cutoff: DateTime<Utc>) -> StoreFuture<'_, Vec<Reservation>> {
        Box::pin(async move { queries::pending_before(&self.pool, cutoff).await })
    }

    fn list_events(&self) -> StoreFuture<'_, Vec<Event>> {
        Box::pin(async move { queries::list_events(&self.pool, None).await })
    }

    fn events_owned_by(&self, owner_id: AttendeeId) -> StoreFuture<'_, Vec<Event>> {
        Box::pin(async move { queries::list_events(&self.pool, Some(owner_id)).await })
    }

    fn insert_event(&self, event: Event) -> StoreFuture<'_, ()> {
        Box::pin(async move { queries::insert_event(&self.pool, &event).await })
    }

    fn update_event(&self, id: EventId, changes: EventChanges) -> StoreFuture<'_, Event> {
        Box::pin(async move {
            let mut tx = self.pool.begin().await.map_err(queries::map_sqlx)?;
            let mut event = queries::lock_event(&mut *tx, id)
                .await?
                .ok_or(StoreError::EventNotFound(id))?;
            changes.apply_to(&mut event);
            if let Some(limit) = event.capacity.limit() {
                if limit < event.reserved_count {
                    return Err(StoreError::CapacityBelowReserved {
                        requested: limit,
                        reserved: event.reserved_count,
                    });
                }
            }
            let updated = queries::write_event_metadata(&mut *tx, &event).await?;
            tx.commit().await.map_err(queries::map_sqlx)?;
            Ok(updated)
        })
    }

    fn delete_event(&self, id: EventId) -> StoreFuture<'_, u64> {
        Box::pin(async move {
            let mut tx = self.pool.begin().await.map_err(queries::map_sqlx)?;
            queries::lock_event(&mut *tx, id)
                .await?
                .ok_or(StoreError::EventNotFound(id))?;
            let removed = queries::delete_reservations_of(&mut *tx, id).await?;
            queries::delete_event(&mut *tx, id).await?;
            tx.commit().await.map_err(queries::map_sqlx)?;
            tracing::info!(event_id = %id, reservations = removed, "Event deleted");
            Ok(removed)
        })
    }

    fn ping(&self) -> StoreFuture<'_, ()> {
        Box::pin(async move {
            sqlx::query("SELECT 1")
                .execute(&self.pool)
                .await
                .map_err(queries::map_sqlx)?;
            Ok(())
        })
    }
}

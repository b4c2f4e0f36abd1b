//! Transaction-backed unit of work.

use crate::queries;
use chrono::{DateTime, Utc};
use sqlx::{Postgres, Transaction};
use ticketing_core::store::{CapacityLedger, ReservationStore, StoreError, StoreFuture, UnitOfWork};
use ticketing_core::{
    AttendeeId, EventId, LedgerEntry, PaymentReference, Quantity, Reservation, ReservationId,
};

/// A unit of work holding one open `READ COMMITTED` transaction.
///
/// [`CapacityLedger::lock_event`] and the conditional `UPDATE` in
/// [`CapacityLedger::try_reserve`] take the event row lock, so concurrent units
/// on the same event serialize behind it until commit or rollback. Statements
/// after the lock see what those units committed. Dropping the unit rolls the
/// transaction back.
pub(crate) struct PostgresUnitOfWork {
    tx: Transaction<'static, Postgres>,
}

impl PostgresUnitOfWork {
    pub(crate) const fn new(tx: Transaction<'static, Postgres>) -> Self {
        Self { tx }
    }
}

impl CapacityLedger for PostgresUnitOfWork {
    fn lock_event(&mut self, event_id: EventId) -> StoreFuture<'_, LedgerEntry> {
        Box::pin(async move {
            queries::lock_event(&mut *self.tx, event_id)
                .await?
                .map(|event| event.ledger())
                .ok_or(StoreError::EventNotFound(event_id))
        })
    }

    fn try_reserve(
        &mut self,
        event_id: EventId,
        quantity: Quantity,
    ) -> StoreFuture<'_, LedgerEntry> {
        Box::pin(async move {
            if let Some(entry) = queries::try_reserve(&mut *self.tx, event_id, quantity).await? {
                return Ok(entry);
            }
            let row = queries::ledger(&mut *self.tx, event_id)
                .await?
                .ok_or(StoreError::EventNotFound(event_id))?;
            let entry = LedgerEntry::try_from(row)?;
            Err(StoreError::CapacityExceeded {
                event_id,
                requested: quantity.get(),
                remaining: entry.remaining().unwrap_or(0),
            })
        })
    }

    fn release(&mut self, event_id: EventId, quantity: Quantity) -> StoreFuture<'_, LedgerEntry> {
        Box::pin(async move {
            if let Some(entry) = queries::release(&mut *self.tx, event_id, quantity).await? {
                return Ok(entry);
            }
            let row = queries::ledger(&mut *self.tx, event_id)
                .await?
                .ok_or(StoreError::EventNotFound(event_id))?;
            Err(StoreError::Invariant(format!(
                "release of {} seats on event {event_id} exceeds reserved count {}",
                quantity.get(),
                row.reserved_count
            )))
        })
    }
}

impl ReservationStore for PostgresUnitOfWork {
    fn create(&mut self, reservation: Reservation) -> StoreFuture<'_, ()> {
        Box::pin(async move { queries::insert_reservation(&mut *self.tx, &reservation).await })
    }

    fn find_by_id(&mut self, id: ReservationId) -> StoreFuture<'_, Option<Reservation>> {
        Box::pin(async move { queries::find_reservation(&mut *self.tx, id).await })
    }

    fn find_by_event_and_attendee(
        &mut self,
        event_id: EventId,
        attendee_id: AttendeeId,
    ) -> StoreFuture<'_, Option<Reservation>> {
        Box::pin(async move { queries::find_by_pair(&mut *self.tx, event_id, attendee_id).await })
    }

    fn find_by_payment_reference(
        &mut self,
        reference: PaymentReference,
    ) -> StoreFuture<'_, Option<Reservation>> {
        Box::pin(async move { queries::find_by_reference(&mut *self.tx, &reference).await })
    }

    fn delete(&mut self, id: ReservationId) -> StoreFuture<'_, Option<Reservation>> {
        Box::pin(async move { queries::delete_reservation(&mut *self.tx, id, false).await })
    }

    fn delete_if_pending(&mut self, id: ReservationId) -> StoreFuture<'_, Option<Reservation>> {
        Box::pin(async move { queries::delete_reservation(&mut *self.tx, id, true).await })
    }

    fn settle(
        &mut self,
        id: ReservationId,
        reference: PaymentReference,
        at: DateTime<Utc>,
    ) -> StoreFuture<'_, Option<Reservation>> {
        Box::pin(async move { queries::settle(&mut *self.tx, id, &reference, at).await })
    }
}

impl UnitOfWork for PostgresUnitOfWork {
    fn commit(self: Box<Self>) -> StoreFuture<'static, ()> {
        let this = *self;
        Box::pin(async move { this.tx.commit().await.map_err(queries::map_sqlx) })
    }

    fn rollback(self: Box<Self>) -> StoreFuture<'static, ()> {
        let this = *self;
        Box::pin(async move { this.tx.rollback().await.map_err(queries::map_sqlx) })
    }
}

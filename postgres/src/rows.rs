//! Row types and their conversion into domain values.

use chrono::{DateTime, Utc};
use sqlx::FromRow;
use ticketing_core::store::StoreError;
use ticketing_core::{
    AttendeeId, Booking, Capacity, Event, EventId, EventSummary, LedgerEntry, Money,
    PaymentReference, PaymentStatus, Quantity, Reservation, ReservationId,
};
use uuid::Uuid;

/// Columns selected for every event query.
macro_rules! event_columns {
    () => {
        "id, title, location, starts_at, price_cents, capacity_limit, reserved_count, owner_id, created_at"
    };
}

/// Columns selected for every reservation query.
macro_rules! reservation_columns {
    () => {
        "id, event_id, attendee_id, quantity, total_price_cents, payment_reference, \
         payment_status, paid, created_at, settled_at"
    };
}

pub(crate) use {event_columns, reservation_columns};

fn corrupt(what: &str, detail: impl std::fmt::Display) -> StoreError {
    StoreError::Invariant(format!("stored {what} is invalid: {detail}"))
}

pub(crate) fn cents_to_money(cents: i64) -> Result<Money, StoreError> {
    u64::try_from(cents)
        .map(Money::from_cents)
        .map_err(|_| corrupt("amount", cents))
}

pub(crate) fn money_to_cents(money: Money) -> Result<i64, StoreError> {
    i64::try_from(money.cents()).map_err(|_| corrupt("amount", money))
}

fn count_to_u32(what: &str, count: i64) -> Result<u32, StoreError> {
    u32::try_from(count).map_err(|_| corrupt(what, count))
}

fn capacity_from(limit: Option<i64>) -> Result<Capacity, StoreError> {
    Capacity::from_limit(limit).map_err(|e| corrupt("capacity", e))
}

pub(crate) fn capacity_to_limit(capacity: Capacity) -> Option<i64> {
    capacity.limit().map(i64::from)
}

#[derive(Debug, FromRow)]
pub(crate) struct EventRow {
    id: Uuid,
    title: String,
    location: String,
    starts_at: DateTime<Utc>,
    price_cents: i64,
    capacity_limit: Option<i64>,
    reserved_count: i64,
    owner_id: Uuid,
    created_at: DateTime<Utc>,
}

impl TryFrom<EventRow> for Event {
    type Error = StoreError;

    fn try_from(row: EventRow) -> Result<Self, Self::Error> {
        Ok(Self {
            id: EventId::from_uuid(row.id),
            title: row.title,
            location: row.location,
            starts_at: row.starts_at,
            price: cents_to_money(row.price_cents)?,
            capacity: capacity_from(row.capacity_limit)?,
            reserved_count: count_to_u32("reserved count", row.reserved_count)?,
            owner_id: AttendeeId::from_uuid(row.owner_id),
            created_at: row.created_at,
        })
    }
}

/// Result of a ledger `UPDATE ... RETURNING`.
#[derive(Debug, FromRow)]
pub(crate) struct LedgerRow {
    pub(crate) id: Uuid,
    pub(crate) reserved_count: i64,
    pub(crate) capacity_limit: Option<i64>,
}

impl TryFrom<LedgerRow> for LedgerEntry {
    type Error = StoreError;

    fn try_from(row: LedgerRow) -> Result<Self, Self::Error> {
        Ok(Self {
            event_id: EventId::from_uuid(row.id),
            reserved_count: count_to_u32("reserved count", row.reserved_count)?,
            capacity: capacity_from(row.capacity_limit)?,
        })
    }
}

#[derive(Debug, FromRow)]
pub(crate) struct ReservationRow {
    id: Uuid,
    event_id: Uuid,
    attendee_id: Uuid,
    quantity: i64,
    total_price_cents: i64,
    payment_reference: String,
    payment_status: String,
    paid: bool,
    created_at: DateTime<Utc>,
    settled_at: Option<DateTime<Utc>>,
}

impl TryFrom<ReservationRow> for Reservation {
    type Error = StoreError;

    fn try_from(row: ReservationRow) -> Result<Self, Self::Error> {
        let payment_status = PaymentStatus::parse(&row.payment_status)
            .ok_or_else(|| corrupt("payment status", &row.payment_status))?;
        Ok(Self {
            id: ReservationId::from_uuid(row.id),
            event_id: EventId::from_uuid(row.event_id),
            attendee_id: AttendeeId::from_uuid(row.attendee_id),
            quantity: Quantity::new(row.quantity).map_err(|e| corrupt("quantity", e))?,
            total_price: cents_to_money(row.total_price_cents)?,
            payment_reference: PaymentReference::new(row.payment_reference)
                .map_err(|e| corrupt("payment reference", e))?,
            payment_status,
            paid: row.paid,
            created_at: row.created_at,
            settled_at: row.settled_at,
        })
    }
}

/// Reservation joined with its event's summary columns.
#[derive(Debug, FromRow)]
pub(crate) struct BookingRow {
    #[sqlx(flatten)]
    reservation: ReservationRow,
    event_title: String,
    event_location: String,
    event_starts_at: DateTime<Utc>,
    event_price_cents: i64,
}

impl TryFrom<BookingRow> for Booking {
    type Error = StoreError;

    fn try_from(row: BookingRow) -> Result<Self, Self::Error> {
        let reservation = Reservation::try_from(row.reservation)?;
        Ok(Self {
            event: EventSummary {
                id: reservation.event_id,
                title: row.event_title,
                location: row.event_location,
                starts_at: row.event_starts_at,
                price: cents_to_money(row.event_price_cents)?,
            },
            reservation,
        })
    }
}

//! SQL shared by the pool-level store and the transaction-level unit of work.
//!
//! Every function is generic over the executor so the same statement runs on
//! `&PgPool` for reads and on the open transaction inside a unit of work.

use crate::rows::{
    BookingRow, EventRow, LedgerRow, ReservationRow, capacity_to_limit, event_columns,
    money_to_cents, reservation_columns,
};
use chrono::{DateTime, Utc};
use sqlx::PgExecutor;
use ticketing_core::store::StoreError;
use ticketing_core::{
    AttendeeId, Booking, Event, EventId, LedgerEntry, PaymentReference, PaymentStatus, Quantity,
    Reservation, ReservationId, UniqueKey,
};

/// Unique constraint on (event, attendee).
pub(crate) const EVENT_ATTENDEE_KEY: &str = "reservations_event_attendee_key";
/// Unique constraint on the payment reference.
pub(crate) const PAYMENT_REFERENCE_KEY: &str = "reservations_payment_reference_key";

/// Maps driver errors that carry no domain meaning.
pub(crate) fn map_sqlx(err: sqlx::Error) -> StoreError {
    if let sqlx::Error::Database(db) = &err {
        match db.code().as_deref() {
            // serialization_failure, deadlock_detected
            Some("40001" | "40P01") => {
                metrics::counter!("ticketing_store_contention_total").increment(1);
                return StoreError::Contention(db.message().to_owned());
            },
            // check_violation
            Some("23514") => return StoreError::Invariant(db.message().to_owned()),
            _ => {},
        }
    }
    tracing::error!(error = %err, "Database operation failed");
    StoreError::Unavailable(err.to_string())
}

/// Maps a failed reservation write, naming the unique key it collided with.
fn map_write(err: sqlx::Error, reservation: &Reservation) -> StoreError {
    if let sqlx::Error::Database(db) = &err {
        if db.is_unique_violation() {
            return StoreError::Conflict(match db.constraint() {
                Some(PAYMENT_REFERENCE_KEY) => {
                    UniqueKey::PaymentReference(reservation.payment_reference.clone())
                },
                _ => UniqueKey::EventAttendee {
                    event_id: reservation.event_id,
                    attendee_id: reservation.attendee_id,
                },
            });
        }
        if db.is_foreign_key_violation() {
            return StoreError::EventNotFound(reservation.event_id);
        }
    }
    map_sqlx(err)
}

fn quantity_param(quantity: Quantity) -> i64 {
    i64::from(quantity.get())
}

fn optional<R, T>(row: Option<R>) -> Result<Option<T>, StoreError>
where
    T: TryFrom<R, Error = StoreError>,
{
    row.map(T::try_from).transpose()
}

// ============================================================================
// Ledger
// ============================================================================

pub(crate) async fn try_reserve<'e, E>(
    exec: E,
    event_id: EventId,
    quantity: Quantity,
) -> Result<Option<LedgerEntry>, StoreError>
where
    E: PgExecutor<'e>,
{
    let row: Option<LedgerRow> = sqlx::query_as(
        r"
        UPDATE events
        SET reserved_count = reserved_count + $2
        WHERE id = $1
          AND (capacity_limit IS NULL OR reserved_count + $2 <= capacity_limit)
        RETURNING id, reserved_count, capacity_limit
        ",
    )
    .bind(event_id.as_uuid())
    .bind(quantity_param(quantity))
    .fetch_optional(exec)
    .await
    .map_err(map_sqlx)?;

    optional(row)
}

pub(crate) async fn release<'e, E>(
    exec: E,
    event_id: EventId,
    quantity: Quantity,
) -> Result<Option<LedgerEntry>, StoreError>
where
    E: PgExecutor<'e>,
{
    let row: Option<LedgerRow> = sqlx::query_as(
        r"
        UPDATE events
        SET reserved_count = reserved_count - $2
        WHERE id = $1 AND reserved_count >= $2
        RETURNING id, reserved_count, capacity_limit
        ",
    )
    .bind(event_id.as_uuid())
    .bind(quantity_param(quantity))
    .fetch_optional(exec)
    .await
    .map_err(map_sqlx)?;
    optional(row)
}

pub(crate) async fn ledger<'e, E>(exec: E, event_id: EventId) -> Result<Option<LedgerRow>, StoreError>
where
    E: PgExecutor<'e>,
{
    sqlx::query_as("SELECT id, reserved_count, capacity_limit FROM events WHERE id = $1")
        .bind(event_id.as_uuid())
        .fetch_optional(exec)
        .await
        .map_err(map_sqlx)
}

// ============================================================================
// Events
// ============================================================================

pub(crate) async fn find_event<'e, E>(exec: E, id: EventId) -> Result<Option<Event>, StoreError>
where
    E: PgExecutor<'e>,
{
    let row: Option<EventRow> =
        sqlx::query_as(concat!("SELECT ", event_columns!(), " FROM events WHERE id = $1"))
            .bind(id.as_uuid())
            .fetch_optional(exec)
            .await
            .map_err(map_sqlx)?;
    optional(row)
}

pub(crate) async fn list_events<'e, E>(
    exec: E,
    owner_id: Option<AttendeeId>,
) -> Result<Vec<Event>, StoreError>
where
    E: PgExecutor<'e>,
{
    let rows: Vec<EventRow> = sqlx::query_as(concat!(
        "SELECT ",
        event_columns!(),
        " FROM events WHERE $1::uuid IS NULL OR owner_id = $1 \
         ORDER BY starts_at, created_at"
    ))
    .bind(owner_id.map(|id| *id.as_uuid()))
    .fetch_all(exec)
    .await
    .map_err(map_sqlx)?;
    rows.into_iter().map(Event::try_from).collect()
}

pub(crate) async fn lock_event<'e, E>(exec: E, id: EventId) -> Result<Option<Event>, StoreError>
where
    E: PgExecutor<'e>,
{
    let row: Option<EventRow> = sqlx::query_as(concat!(
        "SELECT ",
        event_columns!(),
        " FROM events WHERE id = $1 FOR UPDATE"
    ))
    .bind(id.as_uuid())
    .fetch_optional(exec)
    .await
    .map_err(map_sqlx)?;
    optional(row)
}

pub(crate) async fn insert_event<'e, E>(exec: E, event: &Event) -> Result<(), StoreError>
where
    E: PgExecutor<'e>,
{
    sqlx::query(
        r"
        INSERT INTO events
            (id, title, location, starts_at, price_cents, capacity_limit, reserved_count, owner_id, created_at)
        VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9)
        ",
    )
    .bind(event.id.as_uuid())
    .bind(&event.title)
    .bind(&event.location)
    .bind(event.starts_at)
    .bind(money_to_cents(event.price)?)
    .bind(capacity_to_limit(event.capacity))
    .bind(i64::from(event.reserved_count))
    .bind(event.owner_id.as_uuid())
    .bind(event.created_at)
    .execute(exec)
    .await
    .map_err(map_sqlx)?;
    Ok(())
}

/// Writes the metadata columns. `reserved_count` is deliberately absent.
pub(crate) async fn write_event_metadata<'e, E>(exec: E, event: &Event) -> Result<Event, StoreError>
where
    E: PgExecutor<'e>,
{
    let row: EventRow = sqlx::query_as(concat!(
        "UPDATE events SET title = $2, location = $3, starts_at = $4, price_cents = $5, \
         capacity_limit = $6 WHERE id = $1 RETURNING ",
        event_columns!()
    ))
    .bind(event.id.as_uuid())
    .bind(&event.title)
    .bind(&event.location)
    .bind(event.starts_at)
    .bind(money_to_cents(event.price)?)
    .bind(capacity_to_limit(event.capacity))
    .fetch_one(exec)
    .await
    .map_err(map_sqlx)?;
    Event::try_from(row)
}

pub(crate) async fn delete_reservations_of<'e, E>(exec: E, id: EventId) -> Result<u64, StoreError>
where
    E: PgExecutor<'e>,
{
    let result = sqlx::query("DELETE FROM reservations WHERE event_id = $1")
        .bind(id.as_uuid())
        .execute(exec)
        .await
        .map_err(map_sqlx)?;
    Ok(result.rows_affected())
}

pub(crate) async fn delete_event<'e, E>(exec: E, id: EventId) -> Result<bool, StoreError>
where
    E: PgExecutor<'e>,
{
    let result = sqlx::query("DELETE FROM events WHERE id = $1")
        .bind(id.as_uuid())
        .execute(exec)
        .await
        .map_err(map_sqlx)?;
    Ok(result.rows_affected() > 0)
}

// ============================================================================
// Reservations
// ============================================================================

pub(crate) async fn insert_reservation<'e, E>(
    exec: E,
    reservation: &Reservation,
) -> Result<(), StoreError>
where
    E: PgExecutor<'e>,
{
    sqlx::query(concat!(
        "INSERT INTO reservations (",
        reservation_columns!(),
        ") VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10)"
    ))
    .bind(reservation.id.as_uuid())
    .bind(reservation.event_id.as_uuid())
    .bind(reservation.attendee_id.as_uuid())
    .bind(quantity_param(reservation.quantity))
    .bind(money_to_cents(reservation.total_price)?)
    .bind(reservation.payment_reference.as_str())
    .bind(reservation.payment_status.as_str())
    .bind(reservation.paid)
    .bind(reservation.created_at)
    .bind(reservation.settled_at)
    .execute(exec)
    .await
    .map_err(|e| map_write(e, reservation))?;
    Ok(())
}

pub(crate) async fn find_reservation<'e, E>(
    exec: E,
    id: ReservationId,
) -> Result<Option<Reservation>, StoreError>
where
    E: PgExecutor<'e>,
{
    let row: Option<ReservationRow> = sqlx::query_as(concat!(
        "SELECT ",
        reservation_columns!(),
        " FROM reservations WHERE id = $1"
    ))
    .bind(id.as_uuid())
    .fetch_optional(exec)
    .await
    .map_err(map_sqlx)?;
    optional(row)
}

pub(crate) async fn find_by_pair<'e, E>(
    exec: E,
    event_id: EventId,
    attendee_id: AttendeeId,
) -> Result<Option<Reservation>, StoreError>
where
    E: PgExecutor<'e>,
{
    let row: Option<ReservationRow> = sqlx::query_as(concat!(
        "SELECT ",
        reservation_columns!(),
        " FROM reservations WHERE event_id = $1 AND attendee_id = $2"
    ))
    .bind(event_id.as_uuid())
    .bind(attendee_id.as_uuid())
    .fetch_optional(exec)
    .await
    .map_err(map_sqlx)?;
    optional(row)
}

pub(crate) async fn find_by_reference<'e, E>(
    exec: E,
    reference: &PaymentReference,
) -> Result<Option<Reservation>, StoreError>
where
    E: PgExecutor<'e>,
{
    let row: Option<ReservationRow> = sqlx::query_as(concat!(
        "SELECT ",
        reservation_columns!(),
        " FROM reservations WHERE payment_reference = $1"
    ))
    .bind(reference.as_str())
    .fetch_optional(exec)
    .await
    .map_err(map_sqlx)?;
    optional(row)
}

pub(crate) async fn delete_reservation<'e, E>(
    exec: E,
    id: ReservationId,
    only_pending: bool,
) -> Result<Option<Reservation>, StoreError>
where
    E: PgExecutor<'e>,
{
    let row: Option<ReservationRow> = sqlx::query_as(concat!(
        "DELETE FROM reservations WHERE id = $1 AND (NOT $2 OR payment_status = 'pending') RETURNING ",
        reservation_columns!()
    ))
    .bind(id.as_uuid())
    .bind(only_pending)
    .fetch_optional(exec)
    .await
    .map_err(map_sqlx)?;
    optional(row)
}

pub(crate) async fn settle<'e, E>(
    exec: E,
    id: ReservationId,
    reference: &PaymentReference,
    at: DateTime<Utc>,
) -> Result<Option<Reservation>, StoreError>
where
    E: PgExecutor<'e>,
{
    let row: Option<ReservationRow> = sqlx::query_as(concat!(
        "UPDATE reservations SET payment_reference = $2, payment_status = $3, paid = TRUE, \
         settled_at = $4 WHERE id = $1 AND payment_status = 'pending' RETURNING ",
        reservation_columns!()
    ))
    .bind(id.as_uuid())
    .bind(reference.as_str())
    .bind(PaymentStatus::Success.as_str())
    .bind(at)
    .fetch_optional(exec)
    .await
    .map_err(|err| match &err {
        sqlx::Error::Database(db) if db.is_unique_violation() => {
            StoreError::Conflict(UniqueKey::PaymentReference(reference.clone()))
        },
        _ => map_sqlx(err),
    })?;
    optional(row)
}

pub(crate) async fn bookings_for<'e, E>(
    exec: E,
    attendee_id: AttendeeId,
) -> Result<Vec<Booking>, StoreError>
where
    E: PgExecutor<'e>,
{
    let rows: Vec<BookingRow> = sqlx::query_as(
        r"
        SELECT r.id, r.event_id, r.attendee_id, r.quantity, r.total_price_cents,
               r.payment_reference, r.payment_status, r.paid, r.created_at, r.settled_at,
               e.title AS event_title, e.location AS event_location,
               e.starts_at AS event_starts_at, e.price_cents AS event_price_cents
        FROM reservations r
        JOIN events e ON e.id = r.event_id
        WHERE r.attendee_id = $1
        ORDER BY r.created_at DESC
        ",
    )
    .bind(attendee_id.as_uuid())
    .fetch_all(exec)
    .await
    .map_err(map_sqlx)?;
    rows.into_iter().map(Booking::try_from).collect()
}

pub(crate) async fn pending_before<'e, E>(
    exec: E,
    cutoff: DateTime<Utc>,
) -> Result<Vec<Reservation>, StoreError>
where
    E: PgExecutor<'e>,
{
    let rows: Vec<ReservationRow> = sqlx::query_as(concat!(
        "SELECT ",
        reservation_columns!(),
        " FROM reservations WHERE payment_status = 'pending' AND created_at < $1 \
         ORDER BY created_at"
    ))
    .bind(cutoff)
    .fetch_all(exec)
    .await
    .map_err(map_sqlx)?;
    rows.into_iter().map(Reservation::try_from).collect()
}

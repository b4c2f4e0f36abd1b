//! Business metrics recorded by the booking workflows.
//!
//! # Exported Metrics
//!
//! - `ticketing_reservations_total{status}` - reservations by outcome
//!   (`created_paid`, `created_pending`, `cancelled`, `expired`)
//! - `ticketing_seats_reserved_total` - seats added to ledgers
//! - `ticketing_seats_released_total` - seats returned to ledgers
//! - `ticketing_payments_reconciled_total{outcome}` - reconciliation outcomes
//!   (`created`, `settled`, `already_processed`)
//! - `ticketing_booking_rejections_total{reason}` - failed operations by error kind
//!
//! Descriptions are registered by [`describe`], called once at startup.

use crate::error::BookingError;
use crate::types::PaymentStatus;
use metrics::{counter, describe_counter};

/// Reservation outcome counter
pub const RESERVATIONS_TOTAL: &str = "ticketing_reservations_total";
/// Seats reserved counter
pub const SEATS_RESERVED_TOTAL: &str = "ticketing_seats_reserved_total";
/// Seats released counter
pub const SEATS_RELEASED_TOTAL: &str = "ticketing_seats_released_total";
/// Reconciliation outcome counter
pub const PAYMENTS_RECONCILED_TOTAL: &str = "ticketing_payments_reconciled_total";
/// Rejection counter
pub const BOOKING_REJECTIONS_TOTAL: &str = "ticketing_booking_rejections_total";

/// Register descriptions for every booking metric.
pub fn describe() {
    describe_counter!(
        RESERVATIONS_TOTAL,
        "Reservations by outcome (created_paid, created_pending, cancelled, expired)"
    );
    describe_counter!(SEATS_RESERVED_TOTAL, "Seats added to event ledgers");
    describe_counter!(SEATS_RELEASED_TOTAL, "Seats returned to event ledgers");
    describe_counter!(
        PAYMENTS_RECONCILED_TOTAL,
        "Payment confirmations by outcome (created, settled, already_processed)"
    );
    describe_counter!(
        BOOKING_REJECTIONS_TOTAL,
        "Booking operations that failed, by error kind"
    );
}

pub(crate) fn reservation_created(status: PaymentStatus, seats: u32) {
    let label = if status == PaymentStatus::Success {
        "created_paid"
    } else {
        "created_pending"
    };
    counter!(RESERVATIONS_TOTAL, "status" => label).increment(1);
    counter!(SEATS_RESERVED_TOTAL).increment(u64::from(seats));
}

pub(crate) fn reservation_released(status: &'static str, seats: u32) {
    counter!(RESERVATIONS_TOTAL, "status" => status).increment(1);
    counter!(SEATS_RELEASED_TOTAL).increment(u64::from(seats));
}

pub(crate) fn payment_reconciled(outcome: &'static str) {
    counter!(PAYMENTS_RECONCILED_TOTAL, "outcome" => outcome).increment(1);
}

pub(crate) fn rejected(err: &BookingError) {
    counter!(BOOKING_REJECTIONS_TOTAL, "reason" => err.kind()).increment(1);
}

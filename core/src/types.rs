//! Domain types for the booking service.
//!
//! Value objects and entities shared by the coordinator, the reconciler and
//! every storage backend. Amounts are kept in minor currency units and
//! identifiers are UUID newtypes so that an event id can never be passed
//! where a reservation id is expected.

use crate::error::BookingError;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::num::NonZeroU32;
use uuid::Uuid;

// ============================================================================
// Identifiers
// ============================================================================

macro_rules! uuid_id {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
        #[serde(transparent)]
        pub struct $name(Uuid);

        impl $name {
            #[doc = concat!("Creates a new random `", stringify!($name), "`")]
            #[must_use]
            pub fn new() -> Self {
                Self(Uuid::new_v4())
            }

            #[doc = concat!("Create a `", stringify!($name), "` from a `Uuid`")]
            #[must_use]
            pub const fn from_uuid(uuid: Uuid) -> Self {
                Self(uuid)
            }

            /// Get the inner UUID
            #[must_use]
            pub const fn as_uuid(&self) -> &Uuid {
                &self.0
            }
        }

        impl Default for $name {
            fn default() -> Self {
                Self::new()
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "{}", self.0)
            }
        }
    };
}

uuid_id!(
    /// Unique identifier for an event
    EventId
);

uuid_id!(
    /// Unique identifier for a reservation
    ReservationId
);

uuid_id!(
    /// Identity of a caller as supplied by the upstream auth layer.
    ///
    /// Organizers and attendees share the same identity space: the owner of
    /// an event and the attendee on a reservation are both `AttendeeId`s.
    AttendeeId
);

// ============================================================================
// Money (minor units to avoid floating point errors)
// ============================================================================

/// Money in minor currency units (cents)
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Money(u64);

impl Money {
    /// Zero amount, the price of a free event
    pub const ZERO: Self = Self(0);

    /// Creates a `Money` value from cents
    #[must_use]
    pub const fn from_cents(cents: u64) -> Self {
        Self(cents)
    }

    /// Returns the amount in cents
    #[must_use]
    pub const fn cents(&self) -> u64 {
        self.0
    }

    /// Checks if the amount is zero
    #[must_use]
    pub const fn is_zero(&self) -> bool {
        self.0 == 0
    }

    /// Multiplies money by a quantity with overflow checking
    #[must_use]
    pub const fn checked_multiply(self, quantity: u32) -> Option<Self> {
        match self.0.checked_mul(quantity as u64) {
            Some(result) => Some(Self(result)),
            None => None,
        }
    }
}

impl fmt::Display for Money {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{:02}", self.0 / 100, self.0 % 100)
    }
}

// ============================================================================
// Quantity and capacity
// ============================================================================

/// Number of seats requested by one reservation, always at least one.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "i64", into = "u32")]
pub struct Quantity(NonZeroU32);

impl Quantity {
    /// Validates a caller-supplied quantity.
    ///
    /// # Errors
    ///
    /// Returns [`BookingError::InvalidQuantity`] when `raw` is below one or
    /// does not fit a `u32`.
    pub fn new(raw: i64) -> Result<Self, BookingError> {
        u32::try_from(raw)
            .ok()
            .and_then(NonZeroU32::new)
            .map(Self)
            .ok_or(BookingError::InvalidQuantity(raw))
    }

    /// Number of seats
    #[must_use]
    pub const fn get(self) -> u32 {
        self.0.get()
    }
}

impl TryFrom<i64> for Quantity {
    type Error = BookingError;

    fn try_from(raw: i64) -> Result<Self, Self::Error> {
        Self::new(raw)
    }
}

impl From<Quantity> for u32 {
    fn from(quantity: Quantity) -> Self {
        quantity.get()
    }
}

impl fmt::Display for Quantity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Seat limit of an event.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", tag = "kind", content = "seats")]
pub enum Capacity {
    /// No upper bound on reservations
    Unlimited,
    /// At most this many seats may be reserved
    Limited(NonZeroU32),
}

impl Capacity {
    /// Builds a capacity from an optional seat limit.
    ///
    /// `None` means unlimited.
    ///
    /// # Errors
    ///
    /// Returns [`BookingError::InvalidEvent`] when a limit is given but is not
    /// a positive number.
    pub fn from_limit(limit: Option<i64>) -> Result<Self, BookingError> {
        match limit {
            None => Ok(Self::Unlimited),
            Some(raw) => u32::try_from(raw)
                .ok()
                .and_then(NonZeroU32::new)
                .map(Self::Limited)
                .ok_or_else(|| {
                    BookingError::InvalidEvent(format!("capacity must be positive, got {raw}"))
                }),
        }
    }

    /// The seat limit, if bounded
    #[must_use]
    pub const fn limit(self) -> Option<u32> {
        match self {
            Self::Unlimited => None,
            Self::Limited(seats) => Some(seats.get()),
        }
    }

    /// Seats still available once `reserved` seats are taken.
    ///
    /// `None` means unlimited.
    #[must_use]
    pub const fn remaining(self, reserved: u32) -> Option<u32> {
        match self {
            Self::Unlimited => None,
            Self::Limited(seats) => Some(seats.get().saturating_sub(reserved)),
        }
    }

    /// Whether `reserved` seats fit within this capacity.
    #[must_use]
    pub const fn admits(self, reserved: u64) -> bool {
        match self {
            Self::Unlimited => true,
            Self::Limited(seats) => reserved <= seats.get() as u64,
        }
    }
}

// ============================================================================
// Payment
// ============================================================================

/// Reference tying a reservation to a payment-processor checkout session.
///
/// Unique across all reservations.
#[derive(Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct PaymentReference(String);

impl PaymentReference {
    /// Wraps a processor-issued reference.
    ///
    /// # Errors
    ///
    /// Returns [`BookingError::InvalidPaymentReference`] when the reference is
    /// empty or only whitespace.
    pub fn new(raw: impl Into<String>) -> Result<Self, BookingError> {
        let raw = raw.into();
        let trimmed = raw.trim();
        if trimmed.is_empty() {
            return Err(BookingError::InvalidPaymentReference);
        }
        Ok(Self(trimmed.to_owned()))
    }

    /// Generates a local reference for bookings made without a checkout session.
    #[must_use]
    pub fn generate() -> Self {
        Self(format!("PAY-{}", Uuid::new_v4()))
    }

    /// String form of the reference
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl TryFrom<String> for PaymentReference {
    type Error = BookingError;

    fn try_from(raw: String) -> Result<Self, Self::Error> {
        Self::new(raw)
    }
}

impl From<PaymentReference> for String {
    fn from(reference: PaymentReference) -> Self {
        reference.0
    }
}

impl fmt::Display for PaymentReference {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Settlement state of a reservation's payment.
///
/// `Pending` moves to `Success` exactly once when the processor confirms the
/// payment. `Success` is terminal.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PaymentStatus {
    /// Awaiting confirmation from the processor
    Pending,
    /// Paid, or free
    Success,
    /// Expired or declined before confirmation
    Failed,
}

impl PaymentStatus {
    /// Converts to the stored string form
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Success => "success",
            Self::Failed => "failed",
        }
    }

    /// Parses the stored string form
    #[must_use]
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "pending" => Some(Self::Pending),
            "success" => Some(Self::Success),
            "failed" => Some(Self::Failed),
            _ => None,
        }
    }
}

impl fmt::Display for PaymentStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// ============================================================================
// Callers
// ============================================================================

/// Role claimed by the upstream identity layer.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    /// Regular attendee or organizer
    #[default]
    User,
    /// May cancel or edit anything
    Admin,
}

impl Role {
    /// Converts to the header string form
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::User => "user",
            Self::Admin => "admin",
        }
    }

    /// Parses the header string form (case-insensitive)
    #[must_use]
    pub fn parse(s: &str) -> Option<Self> {
        match s.to_ascii_lowercase().as_str() {
            "user" => Some(Self::User),
            "admin" => Some(Self::Admin),
            _ => None,
        }
    }
}

/// Authenticated caller of an operation.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Caller {
    /// Caller identity
    pub id: AttendeeId,
    /// Caller role
    pub role: Role,
}

impl Caller {
    /// A regular user
    #[must_use]
    pub const fn user(id: AttendeeId) -> Self {
        Self { id, role: Role::User }
    }

    /// An administrator
    #[must_use]
    pub const fn admin(id: AttendeeId) -> Self {
        Self { id, role: Role::Admin }
    }

    /// Owner-or-admin rule shared by cancellation and event management.
    #[must_use]
    pub fn may_act_for(&self, owner: AttendeeId) -> bool {
        self.id == owner || self.role == Role::Admin
    }
}

// ============================================================================
// Entities
// ============================================================================

/// A scheduled event with a seat capacity.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Event {
    /// Event identity
    pub id: EventId,
    /// Display title
    pub title: String,
    /// Venue
    pub location: String,
    /// Scheduled start
    pub starts_at: DateTime<Utc>,
    /// Price per seat, zero when free
    pub price: Money,
    /// Seat limit
    pub capacity: Capacity,
    /// Seats held by live reservations; written only by the ledger
    pub reserved_count: u32,
    /// Organizer
    pub owner_id: AttendeeId,
    /// Creation time
    pub created_at: DateTime<Utc>,
}

impl Event {
    /// Seats left, `None` when unlimited
    #[must_use]
    pub const fn remaining(&self) -> Option<u32> {
        self.capacity.remaining(self.reserved_count)
    }

    /// Whether the event has started at `now`
    #[must_use]
    pub fn has_started(&self, now: DateTime<Utc>) -> bool {
        self.starts_at <= now
    }

    /// Event fields denormalized onto bookings
    #[must_use]
    pub fn summary(&self) -> EventSummary {
        EventSummary {
            id: self.id,
            title: self.title.clone(),
            location: self.location.clone(),
            starts_at: self.starts_at,
            price: self.price,
        }
    }

    /// Current ledger state of this event
    #[must_use]
    pub const fn ledger(&self) -> LedgerEntry {
        LedgerEntry {
            event_id: self.id,
            reserved_count: self.reserved_count,
            capacity: self.capacity,
        }
    }
}

/// Editable event fields supplied when an event is published.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct EventDetails {
    /// Display title
    pub title: String,
    /// Venue
    pub location: String,
    /// Scheduled start
    pub starts_at: DateTime<Utc>,
    /// Price per seat
    pub price: Money,
    /// Seat limit
    pub capacity: Capacity,
}

/// Partial update of event metadata. `None` leaves a field unchanged.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct EventChanges {
    /// New title
    pub title: Option<String>,
    /// New venue
    pub location: Option<String>,
    /// New start time
    pub starts_at: Option<DateTime<Utc>>,
    /// New price; existing reservations keep their snapshot
    pub price: Option<Money>,
    /// New seat limit; may not drop below the reserved count
    pub capacity: Option<Capacity>,
}

impl EventChanges {
    /// Applies the changes to `event` in place.
    pub fn apply_to(&self, event: &mut Event) {
        if let Some(title) = &self.title {
            event.title.clone_from(title);
        }
        if let Some(location) = &self.location {
            event.location.clone_from(location);
        }
        if let Some(starts_at) = self.starts_at {
            event.starts_at = starts_at;
        }
        if let Some(price) = self.price {
            event.price = price;
        }
        if let Some(capacity) = self.capacity {
            event.capacity = capacity;
        }
    }
}

/// Event fields carried on a booking.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct EventSummary {
    /// Event identity
    pub id: EventId,
    /// Display title
    pub title: String,
    /// Venue
    pub location: String,
    /// Scheduled start
    pub starts_at: DateTime<Utc>,
    /// Current price per seat
    pub price: Money,
}

/// A claim of seats on one event by one attendee.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Reservation {
    /// Reservation identity
    pub id: ReservationId,
    /// Reserved event
    pub event_id: EventId,
    /// Holder of the seats
    pub attendee_id: AttendeeId,
    /// Seats held
    pub quantity: Quantity,
    /// Quantity times the unit price at booking time
    pub total_price: Money,
    /// Checkout session or generated local reference
    pub payment_reference: PaymentReference,
    /// Settlement state
    pub payment_status: PaymentStatus,
    /// True exactly when `payment_status` is `Success`
    pub paid: bool,
    /// Creation time
    pub created_at: DateTime<Utc>,
    /// When the payment was confirmed
    pub settled_at: Option<DateTime<Utc>>,
}

impl Reservation {
    /// Whether the reservation still awaits payment
    #[must_use]
    pub fn is_pending(&self) -> bool {
        self.payment_status == PaymentStatus::Pending
    }

    /// Marks the reservation paid under `reference`.
    pub fn settle(&mut self, reference: PaymentReference, at: DateTime<Utc>) {
        self.payment_reference = reference;
        self.payment_status = PaymentStatus::Success;
        self.paid = true;
        self.settled_at = Some(at);
    }
}

/// Reservation together with the event it belongs to.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Booking {
    /// The reservation
    pub reservation: Reservation,
    /// Event summary at read time
    pub event: EventSummary,
}

/// Ledger state of one event after a reserve or release.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct LedgerEntry {
    /// Event identity
    pub event_id: EventId,
    /// Seats currently held
    pub reserved_count: u32,
    /// Seat limit
    pub capacity: Capacity,
}

impl LedgerEntry {
    /// Seats left, `None` when unlimited
    #[must_use]
    pub const fn remaining(&self) -> Option<u32> {
        self.capacity.remaining(self.reserved_count)
    }
}

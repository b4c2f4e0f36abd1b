//! Commit/rollback plumbing shared by the workflows that open units of work.

use crate::error::BookingError;
use crate::store::{StoreError, UnitOfWork};
use std::fmt;

/// What a staged unit decided to do with its writes.
pub(crate) enum Staged<T> {
    /// Publish the writes
    Commit(T),
    /// Throw the writes away but still report `T`
    Discard(T),
}

/// Failure of one attempt at a unit of work.
#[derive(Debug)]
pub(crate) enum Failure {
    /// Worth rerunning the unit from scratch
    Transient(StoreError),
    /// Final answer for the caller
    Fatal(BookingError),
}

impl Failure {
    pub(crate) const fn is_transient(&self) -> bool {
        matches!(self, Self::Transient(_))
    }
}

impl fmt::Display for Failure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Transient(err) => write!(f, "{err}"),
            Self::Fatal(err) => write!(f, "{err}"),
        }
    }
}

impl From<StoreError> for Failure {
    fn from(err: StoreError) -> Self {
        if err.is_transient() {
            Self::Transient(err)
        } else {
            Self::Fatal(err.into())
        }
    }
}

impl From<BookingError> for Failure {
    fn from(err: BookingError) -> Self {
        Self::Fatal(err)
    }
}

impl From<Failure> for BookingError {
    fn from(failure: Failure) -> Self {
        match failure {
            Failure::Transient(err) => err.into(),
            Failure::Fatal(err) => err,
        }
    }
}

/// Ends `unit` according to `staged`.
///
/// Errors roll the unit back before they are returned. A failed rollback is
/// logged and otherwise ignored since the backend discards the transaction
/// anyway once the connection is released.
pub(crate) async fn finish<T>(
    unit: Box<dyn UnitOfWork>,
    staged: Result<Staged<T>, Failure>,
) -> Result<T, Failure> {
    match staged {
        Ok(Staged::Commit(value)) => {
            unit.commit().await?;
            Ok(value)
        },
        Ok(Staged::Discard(value)) => {
            unit.rollback().await?;
            Ok(value)
        },
        Err(err) => {
            if let Err(rollback_err) = unit.rollback().await {
                tracing::warn!(error = %rollback_err, "Rollback failed after aborted unit of work");
            }
            Err(err)
        },
    }
}

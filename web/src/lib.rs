//! Axum integration for the ticketing service.
//!
//! Shared HTTP plumbing that is independent of any particular route table:
//!
//! - [`AppError`]: maps [`BookingError`](ticketing_core::BookingError) onto
//!   status codes and a JSON body `{ code, message, details? }`
//! - [`Identity`]: the caller forwarded by the upstream auth proxy in
//!   `X-User-Id` / `X-User-Role`
//! - [`request_id_layer`]: assigns and echoes `x-request-id`
//! - Liveness and readiness handlers
//!
//! # Request Flow
//!
//! 1. **HTTP Request** arrives and gets a request id
//! 2. **Extract** the caller identity, path and JSON body
//! 3. **Call** the coordinator, reconciler or catalog
//! 4. **Map** the result or the `BookingError` to an HTTP response
//!
//! # Example
//!
//! ```ignore
//! use ticketing_web::{AppError, Identity};
//!
//! async fn cancel_booking(
//!     State(state): State<AppState>,
//!     Identity(caller): Identity,
//!     Path(id): Path<ReservationId>,
//! ) -> Result<Json<CancelResponse>, AppError> {
//!     let cancelled = state.coordinator.cancel(id, caller).await?;
//!     Ok(Json(CancelResponse::from(cancelled)))
//! }
//! ```

#![forbid(unsafe_code)]
#![warn(missing_docs, clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]

pub mod error;
pub mod extractors;
pub mod handlers;
pub mod middleware;

pub use error::AppError;
pub use extractors::{Identity, RequestId, USER_ID_HEADER, USER_ROLE_HEADER};
pub use middleware::{REQUEST_ID_HEADER, request_id_layer};

/// Result type alias for web handlers.
pub type WebResult<T> = Result<T, AppError>;

//! Error types for web handlers.
//!
//! [`AppError`] bridges [`BookingError`] and HTTP responses and implements
//! Axum's `IntoResponse`, so handlers can return `Result<_, AppError>` and use
//! `?` on coordinator calls.

use axum::{
    Json,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use serde::Serialize;
use serde_json::{Value, json};
use std::fmt;
use ticketing_core::BookingError;

/// Application error type for web handlers.
///
/// # Examples
///
/// ```ignore
/// async fn handler(State(state): State<AppState>) -> Result<Json<Body>, AppError> {
///     let booked = state.coordinator.create(request).await?;
///     Ok(Json(body_from(booked)))
/// }
/// ```
#[derive(Debug)]
pub struct AppError {
    /// HTTP status code
    status: StatusCode,
    /// Error message (user-facing)
    message: String,
    /// Error code (for client error handling)
    code: String,
    /// Structured context for the client
    details: Option<Value>,
    /// Internal error (for logging, not exposed to client)
    source: Option<anyhow::Error>,
}

impl AppError {
    /// Create a new application error.
    #[must_use]
    pub const fn new(status: StatusCode, message: String, code: String) -> Self {
        Self {
            status,
            message,
            code,
            details: None,
            source: None,
        }
    }

    /// Attach structured details to the response body.
    #[must_use]
    pub fn with_details(mut self, details: Value) -> Self {
        self.details = Some(details);
        self
    }

    /// Create a new error with a source error.
    #[must_use]
    pub fn with_source(mut self, source: anyhow::Error) -> Self {
        self.source = Some(source);
        self
    }

    /// HTTP status of the response.
    #[must_use]
    pub const fn status(&self) -> StatusCode {
        self.status
    }

    /// Machine-readable error code.
    #[must_use]
    pub fn code(&self) -> &str {
        &self.code
    }

    /// Create a 400 Bad Request error.
    #[must_use]
    pub fn bad_request(message: impl Into<String>) -> Self {
        Self::new(StatusCode::BAD_REQUEST, message.into(), "BAD_REQUEST".to_string())
    }

    /// Create a 401 Unauthorized error.
    #[must_use]
    pub fn unauthorized(message: impl Into<String>) -> Self {
        Self::new(StatusCode::UNAUTHORIZED, message.into(), "UNAUTHORIZED".to_string())
    }

    /// Create a 403 Forbidden error.
    #[must_use]
    pub fn forbidden(message: impl Into<String>) -> Self {
        Self::new(StatusCode::FORBIDDEN, message.into(), "FORBIDDEN".to_string())
    }

    /// Create a 404 Not Found error.
    #[must_use]
    pub fn not_found(resource: impl fmt::Display, id: impl fmt::Display) -> Self {
        Self::new(
            StatusCode::NOT_FOUND,
            format!("{resource} with id {id} not found"),
            "NOT_FOUND".to_string(),
        )
    }

    /// Create a 500 Internal Server Error.
    #[must_use]
    pub fn internal(message: impl Into<String>) -> Self {
        Self::new(
            StatusCode::INTERNAL_SERVER_ERROR,
            message.into(),
            "INTERNAL_SERVER_ERROR".to_string(),
        )
    }

    /// Create a 503 Service Unavailable error.
    #[must_use]
    pub fn unavailable(message: impl Into<String>) -> Self {
        Self::new(
            StatusCode::SERVICE_UNAVAILABLE,
            message.into(),
            "SERVICE_UNAVAILABLE".to_string(),
        )
    }

    fn coded(status: StatusCode, code: &str, message: impl Into<String>) -> Self {
        Self::new(status, message.into(), code.to_string())
    }
}

impl fmt::Display for AppError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}] {}", self.code, self.message)
    }
}

impl std::error::Error for AppError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        self.source
            .as_ref()
            .map(|e| e.as_ref() as &(dyn std::error::Error + 'static))
    }
}

/// Error response body (JSON).
#[derive(Debug, Serialize)]
struct ErrorResponse {
    /// Error code (for client error handling).
    code: String,
    /// Human-readable error message.
    message: String,
    /// Structured context, omitted when empty.
    #[serde(skip_serializing_if = "Option::is_none")]
    details: Option<Value>,
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        if self.status.is_server_error() {
            if let Some(source) = &self.source {
                tracing::error!(
                    status = %self.status,
                    code = %self.code,
                    message = %self.message,
                    error = %source,
                    "Internal server error"
                );
            } else {
                tracing::error!(
                    status = %self.status,
                    code = %self.code,
                    message = %self.message,
                    "Internal server error"
                );
            }
        }

        let body = ErrorResponse {
            code: self.code,
            message: self.message,
            details: self.details,
        };

        (self.status, Json(body)).into_response()
    }
}

/// Convert `anyhow::Error` to `AppError`.
impl From<anyhow::Error> for AppError {
    fn from(err: anyhow::Error) -> Self {
        Self::internal("An internal error occurred").with_source(err)
    }
}

impl From<BookingError> for AppError {
    fn from(err: BookingError) -> Self {
        let message = err.to_string();
        match &err {
            BookingError::InvalidQuantity(quantity) => {
                Self::coded(StatusCode::BAD_REQUEST, "INVALID_QUANTITY", message)
                    .with_details(json!({ "quantity": quantity }))
            },
            BookingError::InvalidPaymentReference => {
                Self::coded(StatusCode::BAD_REQUEST, "INVALID_PAYMENT_REFERENCE", message)
            },
            BookingError::InvalidEvent(_) => {
                Self::coded(StatusCode::BAD_REQUEST, "INVALID_EVENT", message)
            },
            BookingError::EventInPast {
                event_id,
                starts_at,
            } => Self::coded(StatusCode::BAD_REQUEST, "EVENT_IN_PAST", message)
                .with_details(json!({ "eventId": event_id, "startsAt": starts_at })),
            BookingError::CapacityExceeded {
                event_id,
                requested,
                remaining,
            } => Self::coded(StatusCode::BAD_REQUEST, "CAPACITY_EXCEEDED", message).with_details(
                json!({ "eventId": event_id, "requested": requested, "remaining": remaining }),
            ),
            BookingError::DuplicateReservation(_) => {
                Self::coded(StatusCode::BAD_REQUEST, "DUPLICATE_RESERVATION", message)
            },
            BookingError::CapacityBelowReserved {
                requested,
                reserved,
            } => Self::coded(StatusCode::BAD_REQUEST, "CAPACITY_BELOW_RESERVED", message)
                .with_details(json!({ "requested": requested, "reserved": reserved })),
            BookingError::PaymentNotCompleted(_) => {
                Self::coded(StatusCode::BAD_REQUEST, "PAYMENT_NOT_COMPLETED", message)
            },
            BookingError::EventNotFound(id) => Self::not_found("Event", id),
            BookingError::ReservationNotFound(id) => Self::not_found("Booking", id),
            BookingError::PaymentNotFound(reference) => Self::not_found("Payment", reference),
            BookingError::Forbidden => Self::forbidden(message),
            BookingError::InvariantViolation(_) => {
                Self::internal("An internal error occurred")
                    .with_source(anyhow::Error::new(err.clone()))
            },
            BookingError::PaymentGatewayUnavailable(_) | BookingError::StorageUnavailable(_) => {
                Self::unavailable("Service temporarily unavailable, please retry")
                    .with_source(anyhow::Error::new(err.clone()))
            },
        }
    }
}

//! Payment API endpoints.
//!
//! - POST /payments/verify - Finalize a booking from a paid checkout session
//! - POST /payments/webhook - Signed processor notifications

use super::{BookingView, json_body};
use crate::metrics::{WEBHOOK_REJECTIONS_TOTAL, WEBHOOKS_TOTAL};
use crate::server::state::AppState;
use axum::{
    Json,
    body::Bytes,
    extract::{State, rejection::JsonRejection},
    http::{HeaderMap, StatusCode},
};
use serde::{Deserialize, Serialize};
use ticketing_core::{Clock, PaymentReference};
use ticketing_core::webhook::WebhookEventKind;
use ticketing_web::{AppError, Identity, RequestId};

/// Header carrying the webhook signature.
pub const SIGNATURE_HEADER: &str = "Stripe-Signature";

/// Request to verify a payment.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VerifyPaymentRequest {
    /// Checkout session reference
    #[serde(default)]
    pub payment_reference: Option<String>,
}

/// Result of a payment verification.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct VerifyPaymentResponse {
    /// Human-readable outcome
    pub message: &'static str,
    /// The paid booking
    pub booking: BookingView,
    /// True when an earlier call already finalized this payment
    pub already_processed: bool,
}

/// Webhook acknowledgement.
#[derive(Debug, Serialize)]
pub struct WebhookAck {
    /// Always true
    pub received: bool,
}

/// Verify a checkout session with the processor and finalize its booking.
///
/// Answers 201 when this call created or settled the booking and 200 when
/// it had already been processed.
///
/// # Errors
///
/// - 400 if the reference is missing, the session is unpaid, or the booking
///   cannot be created (full event, duplicate)
/// - 404 if the processor does not know the session
/// - 503 if the processor or storage is unavailable
#[tracing::instrument(skip(state, request_id, caller, payload), fields(request_id = %request_id.0, user_id = %caller.id))]
pub async fn verify_payment(
    State(state): State<AppState>,
    request_id: RequestId,
    Identity(caller): Identity,
    payload: Result<Json<VerifyPaymentRequest>, JsonRejection>,
) -> Result<(StatusCode, Json<VerifyPaymentResponse>), AppError> {
    let body = json_body(payload)?;
    let reference = PaymentReference::new(body.payment_reference.unwrap_or_default())?;

    let reconciled = state.reconciler.verify(reference).await?;

    let (status, message) = if reconciled.already_processed {
        (StatusCode::OK, "Booking already processed")
    } else {
        (StatusCode::CREATED, "Payment verified and booking created successfully")
    };
    Ok((
        status,
        Json(VerifyPaymentResponse {
            message,
            booking: reconciled.booking.into(),
            already_processed: reconciled.already_processed,
        }),
    ))
}

/// Receive a signed processor notification.
///
/// Deliveries are verified and logged. Bookings are finalized through
/// `/payments/verify`, not here.
///
/// # Errors
///
/// - 400 if the signature is missing, invalid or stale
/// - 503 if no signing secret is configured
pub async fn webhook(
    State(state): State<AppState>,
    headers: HeaderMap,
    body: Bytes,
) -> Result<Json<WebhookAck>, AppError> {
    let verifier = state
        .webhooks
        .as_ref()
        .ok_or_else(|| AppError::unavailable("Webhook signing secret is not configured"))?;

    let signature = headers
        .get(SIGNATURE_HEADER)
        .and_then(|v| v.to_str().ok())
        .unwrap_or_default();

    let event = verifier
        .verify(&body, signature, state.clock.now())
        .map_err(|err| {
            metrics::counter!(WEBHOOK_REJECTIONS_TOTAL).increment(1);
            tracing::warn!(error = %err, "Webhook signature verification failed");
            AppError::bad_request(format!("Webhook Error: {err}"))
        })?;

    let kind = match &event.kind {
        WebhookEventKind::CheckoutCompleted { session_id } => {
            tracing::info!(event_id = %event.id, session_id = ?session_id, "Checkout session completed");
            "checkout.session.completed"
        },
        WebhookEventKind::CheckoutExpired { session_id } => {
            tracing::info!(event_id = %event.id, session_id = ?session_id, "Checkout session expired");
            "checkout.session.expired"
        },
        WebhookEventKind::Other(kind) => {
            tracing::debug!(event_id = %event.id, kind = %kind, "Ignoring webhook event");
            "other"
        },
    };
    metrics::counter!(WEBHOOKS_TOTAL, "kind" => kind).increment(1);

    Ok(Json(WebhookAck { received: true }))
}

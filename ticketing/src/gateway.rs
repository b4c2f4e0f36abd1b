//! Checkout-session lookups against a Stripe-compatible processor API.
//!
//! Sessions are created by the client-facing checkout flow with metadata
//! `eventId`, `userId` and `quantity`. This client only reads them back.

use crate::config::PaymentsConfig;
use reqwest::{Client, StatusCode, Url};
use serde::Deserialize;
use std::collections::HashMap;
use std::future::Future;
use std::pin::Pin;
use std::time::Duration;
use ticketing_core::{
    AttendeeId, CheckoutSession, CheckoutStatus, EventId, GatewayResult, Money, PaymentGateway,
    PaymentGatewayError, PaymentReference, Quantity,
};
use uuid::Uuid;

/// Processor client over HTTPS.
#[derive(Clone, Debug)]
pub struct HttpPaymentGateway {
    client: Client,
    api_base: Url,
    api_key: Option<String>,
}

impl HttpPaymentGateway {
    /// Builds a client from configuration.
    ///
    /// # Errors
    ///
    /// Fails if the base URL does not parse or the TLS backend cannot start.
    pub fn new(config: &PaymentsConfig) -> anyhow::Result<Self> {
        let client = Client::builder()
            .timeout(Duration::from_secs(config.request_timeout))
            .build()?;
        let api_base = Url::parse(&config.api_base)?;
        if config.api_key.is_none() {
            tracing::warn!("No payment API key configured; paid bookings cannot be verified");
        }
        Ok(Self {
            client,
            api_base,
            api_key: config.api_key.clone(),
        })
    }

    fn session_url(&self, reference: &PaymentReference) -> GatewayResult<Url> {
        let mut url = self.api_base.clone();
        url.path_segments_mut()
            .map_err(|()| PaymentGatewayError::Rejected("payment API base cannot be a base URL".into()))?
            .pop_if_empty()
            .extend(["v1", "checkout", "sessions", reference.as_str()]);
        Ok(url)
    }

    async fn fetch(&self, reference: PaymentReference) -> GatewayResult<Option<CheckoutSession>> {
        let api_key = self
            .api_key
            .as_deref()
            .ok_or_else(|| PaymentGatewayError::Rejected("no payment API key configured".into()))?;
        let url = self.session_url(&reference)?;

        let response = self
            .client
            .get(url)
            .bearer_auth(api_key)
            .send()
            .await
            .map_err(transport_error)?;

        match response.status() {
            StatusCode::NOT_FOUND => return Ok(None),
            status if status.is_server_error() => {
                return Err(PaymentGatewayError::Unavailable(format!("processor returned {status}")));
            },
            status if !status.is_success() => {
                return Err(PaymentGatewayError::Rejected(format!("processor returned {status}")));
            },
            _ => {},
        }

        let body: SessionBody = response
            .json()
            .await
            .map_err(|e| PaymentGatewayError::Malformed(e.to_string()))?;
        tracing::debug!(reference = %reference, payment_status = %body.payment_status, "Checkout session fetched");
        body.into_session().map(Some)
    }
}

impl PaymentGateway for HttpPaymentGateway {
    fn checkout_session(
        &self,
        reference: &PaymentReference,
    ) -> Pin<Box<dyn Future<Output = GatewayResult<Option<CheckoutSession>>> + Send + '_>> {
        let reference = reference.clone();
        Box::pin(self.fetch(reference))
    }
}

fn transport_error(err: reqwest::Error) -> PaymentGatewayError {
    if err.is_timeout() {
        PaymentGatewayError::Timeout
    } else {
        PaymentGatewayError::Unavailable(err.to_string())
    }
}

/// Checkout session as the processor serializes it.
#[derive(Debug, Deserialize)]
struct SessionBody {
    id: String,
    #[serde(default)]
    status: Option<String>,
    payment_status: String,
    #[serde(default)]
    amount_total: Option<u64>,
    #[serde(default)]
    metadata: HashMap<String, String>,
}

impl SessionBody {
    fn into_session(self) -> GatewayResult<CheckoutSession> {
        let status = match (self.payment_status.as_str(), self.status.as_deref()) {
            ("paid" | "no_payment_required", _) => CheckoutStatus::Paid,
            (_, Some("expired")) => CheckoutStatus::Expired,
            _ => CheckoutStatus::Open,
        };
        let reference = PaymentReference::new(self.id.clone())
            .map_err(|e| PaymentGatewayError::Malformed(e.to_string()))?;
        let event_id = EventId::from_uuid(self.uuid_field("eventId")?);
        let attendee_id = AttendeeId::from_uuid(self.uuid_field("userId")?);
        let quantity = self
            .metadata
            .get("quantity")
            .and_then(|raw| raw.trim().parse::<i64>().ok())
            .and_then(|raw| Quantity::new(raw).ok())
            .ok_or_else(|| missing("quantity"))?;

        Ok(CheckoutSession {
            reference,
            status,
            event_id,
            attendee_id,
            quantity,
            amount_total: self.amount_total.map(Money::from_cents),
        })
    }

    fn uuid_field(&self, key: &str) -> GatewayResult<Uuid> {
        self.metadata
            .get(key)
            .and_then(|raw| Uuid::parse_str(raw.trim()).ok())
            .ok_or_else(|| missing(key))
    }
}

fn missing(key: &str) -> PaymentGatewayError {
    PaymentGatewayError::Malformed(format!("session metadata lacks a valid {key}"))
}

//! Signature verification for processor webhooks.
//!
//! Deliveries carry a `Stripe-Signature`-style header of the form
//! `t=<unix seconds>,v1=<hex hmac>` where the HMAC-SHA256 is computed over
//! `"<t>.<raw body>"` with the shared endpoint secret.

use chrono::{DateTime, Utc};
use hmac::{Hmac, Mac};
use serde::Deserialize;
use sha2::Sha256;
use std::time::Duration;
use thiserror::Error;

type HmacSha256 = Hmac<Sha256>;

/// Why a delivery was rejected.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum WebhookError {
    /// Header missing a `t=` or `v1=` part
    #[error("Malformed signature header")]
    MalformedHeader,

    /// Timestamp outside the tolerance window
    #[error("Signature timestamp outside tolerance")]
    Stale,

    /// No `v1` signature matched the payload
    #[error("Signature mismatch")]
    Mismatch,

    /// Body is not a processor event
    #[error("Invalid webhook payload: {0}")]
    Payload(String),
}

/// Kinds of webhook events the service reacts to.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum WebhookEventKind {
    /// `checkout.session.completed`
    CheckoutCompleted {
        /// Session id
        session_id: Option<String>,
    },
    /// `checkout.session.expired`
    CheckoutExpired {
        /// Session id
        session_id: Option<String>,
    },
    /// Anything else, acknowledged and ignored
    Other(String),
}

/// Verified webhook delivery.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct WebhookEvent {
    /// Processor event id
    pub id: String,
    /// Interpreted kind
    pub kind: WebhookEventKind,
}

#[derive(Deserialize)]
struct RawEvent {
    id: String,
    #[serde(rename = "type")]
    kind: String,
    #[serde(default)]
    data: Option<RawData>,
}

#[derive(Deserialize)]
struct RawData {
    object: RawObject,
}

#[derive(Deserialize)]
struct RawObject {
    #[serde(default)]
    id: Option<String>,
}

/// Verifies and parses webhook deliveries.
#[derive(Clone)]
pub struct WebhookVerifier {
    secret: String,
    tolerance: Duration,
}

impl std::fmt::Debug for WebhookVerifier {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WebhookVerifier")
            .field("secret", &"<redacted>")
            .field("tolerance", &self.tolerance)
            .finish()
    }
}

impl WebhookVerifier {
    /// Creates a verifier for the endpoint secret.
    ///
    /// The secret is used as the HMAC key exactly as given, `whsec_` prefix
    /// included.
    #[must_use]
    pub fn new(secret: impl Into<String>, tolerance: Duration) -> Self {
        Self {
            secret: secret.into(),
            tolerance,
        }
    }

    /// Checks the signature of `payload` and parses it.
    ///
    /// # Errors
    ///
    /// Returns a [`WebhookError`] describing the first check that failed.
    pub fn verify(
        &self,
        payload: &[u8],
        header: &str,
        now: DateTime<Utc>,
    ) -> Result<WebhookEvent, WebhookError> {
        let mut timestamp: Option<i64> = None;
        let mut signatures = Vec::new();
        for part in header.split(',') {
            match part.trim().split_once('=') {
                Some(("t", value)) => timestamp = value.parse().ok(),
                Some(("v1", value)) => signatures.push(value),
                _ => {},
            }
        }
        let timestamp = timestamp.ok_or(WebhookError::MalformedHeader)?;
        if signatures.is_empty() {
            return Err(WebhookError::MalformedHeader);
        }

        let tolerance = i64::try_from(self.tolerance.as_secs()).unwrap_or(i64::MAX);
        if (now.timestamp() - timestamp).abs() > tolerance {
            return Err(WebhookError::Stale);
        }

        let matched = signatures.iter().any(|candidate| {
            hex::decode(candidate).is_ok_and(|expected| {
                self.mac(timestamp, payload)
                    .is_ok_and(|mac| mac.verify_slice(&expected).is_ok())
            })
        });
        if !matched {
            return Err(WebhookError::Mismatch);
        }

        let raw: RawEvent =
            serde_json::from_slice(payload).map_err(|e| WebhookError::Payload(e.to_string()))?;
        let session_id = raw.data.and_then(|data| data.object.id);
        let kind = match raw.kind.as_str() {
            "checkout.session.completed" => WebhookEventKind::CheckoutCompleted { session_id },
            "checkout.session.expired" => WebhookEventKind::CheckoutExpired { session_id },
            _ => WebhookEventKind::Other(raw.kind),
        };
        Ok(WebhookEvent { id: raw.id, kind })
    }

    /// Produces a signature header for `payload` at `timestamp`.
    ///
    /// Used by tests and local tooling to simulate processor deliveries.
    ///
    /// # Errors
    ///
    /// Returns [`WebhookError::MalformedHeader`] if the secret cannot key the MAC.
    pub fn sign(&self, payload: &[u8], timestamp: i64) -> Result<String, WebhookError> {
        let mac = self.mac(timestamp, payload)?;
        Ok(format!(
            "t={timestamp},v1={}",
            hex::encode(mac.finalize().into_bytes())
        ))
    }

    fn mac(&self, timestamp: i64, payload: &[u8]) -> Result<HmacSha256, WebhookError> {
        let mut mac = HmacSha256::new_from_slice(self.secret.as_bytes())
            .map_err(|_| WebhookError::MalformedHeader)?;
        mac.update(timestamp.to_string().as_bytes());
        mac.update(b".");
        mac.update(payload);
        Ok(mac)
    }
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used, clippy::expect_used)]

    use super::*;
    use chrono::TimeZone;

    const BODY: &[u8] =
        br#"{"id":"evt_1","type":"checkout.session.completed","data":{"object":{"id":"cs_42"}}}"#;

    fn verifier() -> WebhookVerifier {
        WebhookVerifier::new("whsec_test_secret", Duration::from_secs(300))
    }

    fn at(secs: i64) -> DateTime<Utc> {
        Utc.timestamp_opt(secs, 0).unwrap()
    }

    #[test]
    fn accepts_signed_completed_session() {
        let header = verifier().sign(BODY, 1_700_000_000).unwrap();
        let event = verifier().verify(BODY, &header, at(1_700_000_100)).unwrap();

        assert_eq!(event.id, "evt_1");
        assert_eq!(
            event.kind,
            WebhookEventKind::CheckoutCompleted {
                session_id: Some("cs_42".into())
            }
        );
    }

    #[test]
    fn full_endpoint_secret_keys_the_signature() {
        let mut mac = Hmac::<Sha256>::new_from_slice(b"whsec_abc123").unwrap();
        mac.update(b"1700000000.");
        mac.update(BODY);
        let header = format!("t=1700000000,v1={}", hex::encode(mac.finalize().into_bytes()));

        let verifier = WebhookVerifier::new("whsec_abc123", Duration::from_secs(300));
        assert!(verifier.verify(BODY, &header, at(1_700_000_000)).is_ok());

        let unprefixed = WebhookVerifier::new("abc123", Duration::from_secs(300));
        assert_eq!(
            unprefixed.verify(BODY, &header, at(1_700_000_000)),
            Err(WebhookError::Mismatch)
        );
    }

    #[test]
    fn rejects_tampered_body() {
        let header = verifier().sign(BODY, 1_700_000_000).unwrap();
        let tampered = br#"{"id":"evt_1","type":"checkout.session.completed","data":{"object":{"id":"cs_43"}}}"#;

        assert_eq!(
            verifier().verify(tampered, &header, at(1_700_000_000)),
            Err(WebhookError::Mismatch)
        );
    }

    #[test]
    fn rejects_stale_timestamp() {
        let header = verifier().sign(BODY, 1_700_000_000).unwrap();

        assert_eq!(
            verifier().verify(BODY, &header, at(1_700_000_301)),
            Err(WebhookError::Stale)
        );
    }

    #[test]
    fn rejects_header_without_signature() {
        assert_eq!(
            verifier().verify(BODY, "t=1700000000", at(1_700_000_000)),
            Err(WebhookError::MalformedHeader)
        );
        assert_eq!(
            verifier().verify(BODY, "garbage", at(1_700_000_000)),
            Err(WebhookError::MalformedHeader)
        );
    }

    #[test]
    fn unknown_event_types_are_passed_through() {
        let body = br#"{"id":"evt_2","type":"invoice.paid"}"#;
        let header = verifier().sign(body, 1_700_000_000).unwrap();
        let event = verifier().verify(body, &header, at(1_700_000_000)).unwrap();

        assert_eq!(event.kind, WebhookEventKind::Other("invoice.paid".into()));
    }
}

//! Stripe webhook adapter.
//!
//! Verification is unconditional - there is no unsigned path. The
//! `Stripe-Signature` header carries `t=<unix>,v1=<hmac>`; the HMAC is
//! SHA-256 over `"{t}.{raw_body}"` keyed by the endpoint secret, and the
//! timestamp must be within the configured drift bound.

use serde::Deserialize;

use super::super::error::NormalizeError;
use super::super::signature::verify_hmac_sha256;
use super::super::types::{EventStatus, PaymentEvent, PaymentProvider, RawWebhook};
use super::super::Normalizer;
use crate::config::StripeConfig;

pub struct StripeNormalizer {
    config: Option<StripeConfig>,
}

impl StripeNormalizer {
    pub fn new(config: Option<StripeConfig>) -> Self {
        Self { config }
    }

    fn verify_at(&self, webhook: &RawWebhook<'_>, now_ts: i64) -> Result<PaymentEvent, NormalizeError> {
        let config = self
            .config
            .as_ref()
            .ok_or(NormalizeError::MissingSecret(PaymentProvider::Stripe))?;

        let header = webhook.header("stripe-signature").ok_or_else(|| {
            NormalizeError::SignatureInvalid {
                provider: PaymentProvider::Stripe,
                reason: "missing Stripe-Signature header".into(),
            }
        })?;

        let (timestamp, signatures) = parse_signature_header(header)?;

        let drift = (now_ts - timestamp).abs();
        if drift > config.tolerance_secs {
            return Err(NormalizeError::SignatureInvalid {
                provider: PaymentProvider::Stripe,
                reason: format!("timestamp outside tolerance ({}s drift)", drift),
            });
        }

        // Signed payload is "{t}.{raw_body}"
        let mut message = timestamp.to_string().into_bytes();
        message.push(b'.');
        message.extend_from_slice(webhook.body);

        let verified = signatures
            .iter()
            .any(|sig| verify_hmac_sha256(config.webhook_secret.as_bytes(), &message, sig));
        if !verified {
            return Err(NormalizeError::SignatureInvalid {
                provider: PaymentProvider::Stripe,
                reason: "no v1 signature matched".into(),
            });
        }

        normalize_event(webhook.body)
    }
}

impl Normalizer for StripeNormalizer {
    fn provider(&self) -> PaymentProvider {
        PaymentProvider::Stripe
    }

    fn verify(&self, webhook: &RawWebhook<'_>) -> Result<PaymentEvent, NormalizeError> {
        self.verify_at(webhook, chrono::Utc::now().timestamp())
    }
}

/// Parse `t=...,v1=...,v1=...` (v0 entries are ignored).
fn parse_signature_header(header: &str) -> Result<(i64, Vec<&str>), NormalizeError> {
    let mut timestamp = None;
    let mut signatures = Vec::new();
    for part in header.split(',') {
        match part.trim().split_once('=') {
            Some(("t", v)) => {
                timestamp = v.parse::<i64>().ok();
            }
            Some(("v1", v)) => signatures.push(v),
            _ => {}
        }
    }
    let timestamp = timestamp.ok_or_else(|| NormalizeError::SignatureInvalid {
        provider: PaymentProvider::Stripe,
        reason: "missing timestamp in signature header".into(),
    })?;
    if signatures.is_empty() {
        return Err(NormalizeError::SignatureInvalid {
            provider: PaymentProvider::Stripe,
            reason: "missing v1 signature".into(),
        });
    }
    Ok((timestamp, signatures))
}

#[derive(Deserialize)]
struct StripeEvent {
    #[serde(rename = "type")]
    event_type: String,
    data: StripeEventData,
}

#[derive(Deserialize)]
struct StripeEventData {
    object: StripeObject,
}

#[derive(Deserialize)]
struct StripeObject {
    id: String,
    #[serde(default)]
    amount_total: Option<i64>,
    #[serde(default)]
    payment_intent: Option<String>,
    #[serde(default)]
    metadata: std::collections::HashMap<String, String>,
}

fn normalize_event(body: &[u8]) -> Result<PaymentEvent, NormalizeError> {
    let event: StripeEvent = serde_json::from_slice(body)
        .map_err(|e| NormalizeError::MalformedPayload(format!("invalid Stripe event: {}", e)))?;

    let status = match event.event_type.as_str() {
        "checkout.session.completed" => EventStatus::Completed,
        "checkout.session.async_payment_failed" | "payment_intent.payment_failed" => {
            EventStatus::Failed
        }
        other => return Err(NormalizeError::IgnoredEvent(other.to_string())),
    };

    let object = event.data.object;
    let order_no = object
        .metadata
        .get("order_no")
        .cloned()
        .ok_or_else(|| NormalizeError::MalformedPayload("missing metadata.order_no".into()))?;

    let paid_amount = match status {
        EventStatus::Completed => object.amount_total.ok_or_else(|| {
            NormalizeError::MalformedPayload("missing amount_total on completed session".into())
        })?,
        // amount is irrelevant on a failure notification
        EventStatus::Failed => object.amount_total.unwrap_or(0),
    };

    let provider_tx_id = object.payment_intent.unwrap_or(object.id);

    Ok(PaymentEvent {
        provider: PaymentProvider::Stripe,
        order_no,
        provider_tx_id,
        paid_amount,
        status,
    })
}

#[cfg(test)]
mod tests {
    use super::super::super::signature::hmac_sha256_hex;
    use super::*;
    use std::collections::HashMap;

    const SECRET: &str = "whsec_test_secret";

    fn normalizer() -> StripeNormalizer {
        StripeNormalizer::new(Some(StripeConfig {
            webhook_secret: SECRET.to_string(),
            tolerance_secs: 300,
        }))
    }

    fn session_body(order_no: &str, amount: i64) -> String {
        format!(
            r#"{{"id":"evt_1","type":"checkout.session.completed","data":{{"object":{{"id":"cs_1","amount_total":{},"payment_intent":"pi_123","metadata":{{"order_no":"{}"}}}}}}}}"#,
            amount, order_no
        )
    }

    fn sign(body: &str, ts: i64) -> String {
        let message = format!("{}.{}", ts, body);
        format!("t={},v1={}", ts, hmac_sha256_hex(SECRET.as_bytes(), message.as_bytes()))
    }

    #[test]
    fn test_valid_signature() {
        let body = session_body("ORD1", 9999);
        let ts = 1_700_000_000;
        let mut headers = HashMap::new();
        headers.insert("stripe-signature".to_string(), sign(&body, ts));

        let webhook = RawWebhook {
            body: body.as_bytes(),
            headers: &headers,
        };
        let event = normalizer().verify_at(&webhook, ts + 10).unwrap();
        assert_eq!(event.order_no, "ORD1");
        assert_eq!(event.paid_amount, 9999);
        assert_eq!(event.provider_tx_id, "pi_123");
        assert_eq!(event.status, EventStatus::Completed);
    }

    #[test]
    fn test_tampered_body_rejected() {
        let body = session_body("ORD1", 9999);
        let ts = 1_700_000_000;
        let mut headers = HashMap::new();
        headers.insert("stripe-signature".to_string(), sign(&body, ts));

        let tampered = session_body("ORD1", 1);
        let webhook = RawWebhook {
            body: tampered.as_bytes(),
            headers: &headers,
        };
        let err = normalizer().verify_at(&webhook, ts + 10).unwrap_err();
        assert!(err.is_auth_failure());
    }

    #[test]
    fn test_stale_timestamp_rejected() {
        let body = session_body("ORD1", 9999);
        let ts = 1_700_000_000;
        let mut headers = HashMap::new();
        headers.insert("stripe-signature".to_string(), sign(&body, ts));

        let webhook = RawWebhook {
            body: body.as_bytes(),
            headers: &headers,
        };
        let err = normalizer().verify_at(&webhook, ts + 301).unwrap_err();
        assert!(err.is_auth_failure());
    }

    #[test]
    fn test_missing_secret_fails_closed() {
        let body = session_body("ORD1", 9999);
        let mut headers = HashMap::new();
        headers.insert("stripe-signature".to_string(), sign(&body, 0));

        let webhook = RawWebhook {
            body: body.as_bytes(),
            headers: &headers,
        };
        let err = StripeNormalizer::new(None).verify_at(&webhook, 0).unwrap_err();
        assert!(matches!(err, NormalizeError::MissingSecret(_)));
    }

    #[test]
    fn test_uninteresting_event_ignored() {
        let body = r#"{"id":"evt_2","type":"customer.updated","data":{"object":{"id":"cus_1","metadata":{}}}}"#;
        let ts = 1_700_000_000;
        let mut headers = HashMap::new();
        headers.insert("stripe-signature".to_string(), sign(body, ts));

        let webhook = RawWebhook {
            body: body.as_bytes(),
            headers: &headers,
        };
        let err = normalizer().verify_at(&webhook, ts).unwrap_err();
        assert!(matches!(err, NormalizeError::IgnoredEvent(_)));
    }
}

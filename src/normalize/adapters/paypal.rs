//! PayPal webhook adapter.
//!
//! The transmission signature is checked as HMAC-SHA256 over
//! `"{transmission_id}|{transmission_time}|{webhook_id}|{raw_body}"`,
//! keyed by the configured webhook secret. The SDK's certificate chain
//! dance is a black-box concern of the gateway integration; the core
//! only depends on this verification contract.

use serde::Deserialize;

use super::super::error::NormalizeError;
use super::super::signature::verify_hmac_sha256;
use super::super::types::{EventStatus, PaymentEvent, PaymentProvider, RawWebhook};
use super::super::Normalizer;
use crate::config::PaypalConfig;
use crate::money;

pub struct PaypalNormalizer {
    config: Option<PaypalConfig>,
}

impl PaypalNormalizer {
    pub fn new(config: Option<PaypalConfig>) -> Self {
        Self { config }
    }
}

impl Normalizer for PaypalNormalizer {
    fn provider(&self) -> PaymentProvider {
        PaymentProvider::Paypal
    }

    fn verify(&self, webhook: &RawWebhook<'_>) -> Result<PaymentEvent, NormalizeError> {
        let config = self
            .config
            .as_ref()
            .ok_or(NormalizeError::MissingSecret(PaymentProvider::Paypal))?;

        let transmission_id = required_header(webhook, "paypal-transmission-id")?;
        let transmission_time = required_header(webhook, "paypal-transmission-time")?;
        let signature = required_header(webhook, "paypal-transmission-sig")?;

        let mut message = format!(
            "{}|{}|{}|",
            transmission_id, transmission_time, config.webhook_id
        )
        .into_bytes();
        message.extend_from_slice(webhook.body);

        if !verify_hmac_sha256(config.webhook_secret.as_bytes(), &message, signature) {
            return Err(NormalizeError::SignatureInvalid {
                provider: PaymentProvider::Paypal,
                reason: "transmission signature mismatch".into(),
            });
        }

        normalize_event(webhook.body)
    }
}

fn required_header<'a>(
    webhook: &RawWebhook<'a>,
    name: &str,
) -> Result<&'a str, NormalizeError> {
    webhook
        .header(name)
        .ok_or_else(|| NormalizeError::SignatureInvalid {
            provider: PaymentProvider::Paypal,
            reason: format!("missing {} header", name),
        })
}

#[derive(Deserialize)]
struct PaypalEvent {
    event_type: String,
    resource: PaypalResource,
}

#[derive(Deserialize)]
struct PaypalResource {
    id: String,
    #[serde(default)]
    custom_id: Option<String>,
    #[serde(default)]
    amount: Option<PaypalAmount>,
}

#[derive(Deserialize)]
struct PaypalAmount {
    value: String,
}

fn normalize_event(body: &[u8]) -> Result<PaymentEvent, NormalizeError> {
    let event: PaypalEvent = serde_json::from_slice(body)
        .map_err(|e| NormalizeError::MalformedPayload(format!("invalid PayPal event: {}", e)))?;

    let status = match event.event_type.as_str() {
        "PAYMENT.CAPTURE.COMPLETED" => EventStatus::Completed,
        "PAYMENT.CAPTURE.DENIED" | "PAYMENT.CAPTURE.DECLINED" => EventStatus::Failed,
        other => return Err(NormalizeError::IgnoredEvent(other.to_string())),
    };

    let order_no = event
        .resource
        .custom_id
        .filter(|s| !s.is_empty())
        .ok_or_else(|| NormalizeError::MalformedPayload("missing resource.custom_id".into()))?;

    let paid_amount = match (&status, &event.resource.amount) {
        (EventStatus::Completed, Some(amount)) => money::parse_amount(&amount.value)
            .map_err(|e| NormalizeError::MalformedPayload(format!("bad amount: {}", e)))?,
        (EventStatus::Completed, None) => {
            return Err(NormalizeError::MalformedPayload(
                "missing resource.amount on completed capture".into(),
            ));
        }
        (EventStatus::Failed, _) => 0,
    };

    Ok(PaymentEvent {
        provider: PaymentProvider::Paypal,
        order_no,
        provider_tx_id: event.resource.id,
        paid_amount,
        status,
    })
}

#[cfg(test)]
mod tests {
    use super::super::super::signature::hmac_sha256_hex;
    use super::*;
    use std::collections::HashMap;

    const SECRET: &str = "pp_secret";
    const WEBHOOK_ID: &str = "WH-ID-1";

    fn normalizer() -> PaypalNormalizer {
        PaypalNormalizer::new(Some(PaypalConfig {
            webhook_id: WEBHOOK_ID.to_string(),
            webhook_secret: SECRET.to_string(),
        }))
    }

    fn capture_body(order_no: &str, value: &str) -> String {
        format!(
            r#"{{"id":"WH-EV-1","event_type":"PAYMENT.CAPTURE.COMPLETED","resource":{{"id":"CAP-9","custom_id":"{}","amount":{{"value":"{}","currency_code":"USD"}}}}}}"#,
            order_no, value
        )
    }

    fn signed_headers(body: &str) -> HashMap<String, String> {
        let message = format!("TX-1|2026-01-01T00:00:00Z|{}|{}", WEBHOOK_ID, body);
        let mut headers = HashMap::new();
        headers.insert("paypal-transmission-id".to_string(), "TX-1".to_string());
        headers.insert(
            "paypal-transmission-time".to_string(),
            "2026-01-01T00:00:00Z".to_string(),
        );
        headers.insert(
            "paypal-transmission-sig".to_string(),
            hmac_sha256_hex(SECRET.as_bytes(), message.as_bytes()),
        );
        headers
    }

    #[test]
    fn test_valid_capture() {
        let body = capture_body("ORD7", "99.99");
        let headers = signed_headers(&body);
        let webhook = RawWebhook {
            body: body.as_bytes(),
            headers: &headers,
        };
        let event = normalizer().verify(&webhook).unwrap();
        assert_eq!(event.order_no, "ORD7");
        assert_eq!(event.paid_amount, 9999);
        assert_eq!(event.provider_tx_id, "CAP-9");
        assert_eq!(event.status, EventStatus::Completed);
    }

    #[test]
    fn test_bad_signature_rejected() {
        let body = capture_body("ORD7", "99.99");
        let mut headers = signed_headers(&body);
        headers.insert(
            "paypal-transmission-sig".to_string(),
            "deadbeef".to_string(),
        );
        let webhook = RawWebhook {
            body: body.as_bytes(),
            headers: &headers,
        };
        assert!(normalizer().verify(&webhook).unwrap_err().is_auth_failure());
    }

    #[test]
    fn test_missing_header_rejected() {
        let body = capture_body("ORD7", "99.99");
        let mut headers = signed_headers(&body);
        headers.remove("paypal-transmission-id");
        let webhook = RawWebhook {
            body: body.as_bytes(),
            headers: &headers,
        };
        assert!(normalizer().verify(&webhook).unwrap_err().is_auth_failure());
    }

    #[test]
    fn test_missing_secret_fails_closed() {
        let body = capture_body("ORD7", "99.99");
        let headers = signed_headers(&body);
        let webhook = RawWebhook {
            body: body.as_bytes(),
            headers: &headers,
        };
        let err = PaypalNormalizer::new(None).verify(&webhook).unwrap_err();
        assert!(matches!(err, NormalizeError::MissingSecret(_)));
    }
}

//! USDT/crypto gateway adapter.
//!
//! Verification is unconditional: HMAC-SHA256 of the raw body in the
//! `X-Signature` header, keyed by the gateway API token. There is no
//! unsigned path.

use serde::Deserialize;

use super::super::error::NormalizeError;
use super::super::signature::verify_hmac_sha256;
use super::super::types::{EventStatus, PaymentEvent, PaymentProvider, RawWebhook};
use super::super::Normalizer;
use crate::config::SignKeyConfig;
use crate::money;

pub struct UsdtNormalizer {
    config: Option<SignKeyConfig>,
}

impl UsdtNormalizer {
    pub fn new(config: Option<SignKeyConfig>) -> Self {
        Self { config }
    }
}

#[derive(Deserialize)]
struct UsdtNotify {
    order_no: String,
    txid: String,
    /// Settlement-currency value of the transfer, decimal string.
    amount: String,
    status: String,
}

impl Normalizer for UsdtNormalizer {
    fn provider(&self) -> PaymentProvider {
        PaymentProvider::Usdt
    }

    fn verify(&self, webhook: &RawWebhook<'_>) -> Result<PaymentEvent, NormalizeError> {
        let config = self
            .config
            .as_ref()
            .ok_or(NormalizeError::MissingSecret(PaymentProvider::Usdt))?;

        let signature =
            webhook
                .header("x-signature")
                .ok_or_else(|| NormalizeError::SignatureInvalid {
                    provider: PaymentProvider::Usdt,
                    reason: "missing X-Signature header".into(),
                })?;

        if !verify_hmac_sha256(config.key.as_bytes(), webhook.body, signature) {
            return Err(NormalizeError::SignatureInvalid {
                provider: PaymentProvider::Usdt,
                reason: "body HMAC mismatch".into(),
            });
        }

        let notify: UsdtNotify = serde_json::from_slice(webhook.body)
            .map_err(|e| NormalizeError::MalformedPayload(format!("invalid notify: {}", e)))?;

        let status = match notify.status.as_str() {
            "confirmed" => EventStatus::Completed,
            "failed" | "expired" => EventStatus::Failed,
            other => return Err(NormalizeError::IgnoredEvent(other.to_string())),
        };

        let paid_amount = match status {
            EventStatus::Completed => money::parse_amount(&notify.amount)
                .map_err(|e| NormalizeError::MalformedPayload(format!("bad amount: {}", e)))?,
            EventStatus::Failed => 0,
        };

        Ok(PaymentEvent {
            provider: PaymentProvider::Usdt,
            order_no: notify.order_no,
            provider_tx_id: notify.txid,
            paid_amount,
            status,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::super::super::signature::hmac_sha256_hex;
    use super::*;
    use std::collections::HashMap;

    const KEY: &str = "usdt_token";

    fn webhook_parts(body: &str) -> HashMap<String, String> {
        let mut headers = HashMap::new();
        headers.insert(
            "x-signature".to_string(),
            hmac_sha256_hex(KEY.as_bytes(), body.as_bytes()),
        );
        headers
    }

    #[test]
    fn test_confirmed_transfer() {
        let body = r#"{"order_no":"RC8","txid":"0xabc","amount":"25.00","status":"confirmed"}"#;
        let headers = webhook_parts(body);
        let webhook = RawWebhook {
            body: body.as_bytes(),
            headers: &headers,
        };
        let event = UsdtNormalizer::new(Some(SignKeyConfig { key: KEY.into() }))
            .verify(&webhook)
            .unwrap();
        assert_eq!(event.order_no, "RC8");
        assert_eq!(event.paid_amount, 2500);
        assert_eq!(event.status, EventStatus::Completed);
    }

    #[test]
    fn test_unsigned_rejected() {
        let body = r#"{"order_no":"RC8","txid":"0xabc","amount":"25.00","status":"confirmed"}"#;
        let headers = HashMap::new();
        let webhook = RawWebhook {
            body: body.as_bytes(),
            headers: &headers,
        };
        let err = UsdtNormalizer::new(Some(SignKeyConfig { key: KEY.into() }))
            .verify(&webhook)
            .unwrap_err();
        assert!(err.is_auth_failure());
    }

    #[test]
    fn test_no_secret_is_fail_closed() {
        let body = r#"{"order_no":"RC8","txid":"0xabc","amount":"25.00","status":"confirmed"}"#;
        let headers = webhook_parts(body);
        let webhook = RawWebhook {
            body: body.as_bytes(),
            headers: &headers,
        };
        let err = UsdtNormalizer::new(None).verify(&webhook).unwrap_err();
        assert!(matches!(err, NormalizeError::MissingSecret(_)));
    }
}

//! YiPay aggregator notify adapter (sorted-parameter MD5 signing).

use super::super::error::NormalizeError;
use super::super::signature::verify_md5_param_sign;
use super::super::types::{EventStatus, PaymentEvent, PaymentProvider, RawWebhook};
use super::super::Normalizer;
use super::{parse_param_map, require_param};
use crate::config::SignKeyConfig;
use crate::money;

pub struct YipayNormalizer {
    config: Option<SignKeyConfig>,
}

impl YipayNormalizer {
    pub fn new(config: Option<SignKeyConfig>) -> Self {
        Self { config }
    }
}

impl Normalizer for YipayNormalizer {
    fn provider(&self) -> PaymentProvider {
        PaymentProvider::Yipay
    }

    fn verify(&self, webhook: &RawWebhook<'_>) -> Result<PaymentEvent, NormalizeError> {
        let config = self
            .config
            .as_ref()
            .ok_or(NormalizeError::MissingSecret(PaymentProvider::Yipay))?;

        let params = parse_param_map(webhook.body)?;
        let signature = require_param(&params, "sign").map_err(|_| {
            NormalizeError::SignatureInvalid {
                provider: PaymentProvider::Yipay,
                reason: "missing sign field".into(),
            }
        })?;

        if !verify_md5_param_sign(&params, &config.key, signature) {
            return Err(NormalizeError::SignatureInvalid {
                provider: PaymentProvider::Yipay,
                reason: "MD5 signature mismatch".into(),
            });
        }

        let trade_status = require_param(&params, "trade_status")?;
        if trade_status != "TRADE_SUCCESS" {
            return Err(NormalizeError::IgnoredEvent(trade_status.to_string()));
        }

        let order_no = require_param(&params, "out_trade_no")?.to_string();
        let provider_tx_id = require_param(&params, "trade_no")?.to_string();
        let paid_amount = money::parse_amount(require_param(&params, "money")?)
            .map_err(|e| NormalizeError::MalformedPayload(format!("bad money: {}", e)))?;

        Ok(PaymentEvent {
            provider: PaymentProvider::Yipay,
            order_no,
            provider_tx_id,
            paid_amount,
            status: EventStatus::Completed,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::super::super::signature::md5_param_sign;
    use super::*;
    use std::collections::{BTreeMap, HashMap};

    const KEY: &str = "yipay_key";

    fn signed_body(order_no: &str, amount: &str) -> String {
        let mut params = BTreeMap::new();
        params.insert("out_trade_no".to_string(), order_no.to_string());
        params.insert("trade_no".to_string(), "Y2026".to_string());
        params.insert("money".to_string(), amount.to_string());
        params.insert("trade_status".to_string(), "TRADE_SUCCESS".to_string());
        let sign = md5_param_sign(&params, KEY);
        format!(
            r#"{{"out_trade_no":"{}","trade_no":"Y2026","money":"{}","trade_status":"TRADE_SUCCESS","sign":"{}"}}"#,
            order_no, amount, sign
        )
    }

    #[test]
    fn test_valid_notify() {
        let body = signed_body("ORD9", "12.50");
        let headers = HashMap::new();
        let webhook = RawWebhook {
            body: body.as_bytes(),
            headers: &headers,
        };
        let event = YipayNormalizer::new(Some(SignKeyConfig { key: KEY.into() }))
            .verify(&webhook)
            .unwrap();
        assert_eq!(event.order_no, "ORD9");
        assert_eq!(event.paid_amount, 1250);
        assert_eq!(event.provider_tx_id, "Y2026");
    }

    #[test]
    fn test_bad_sign_rejected() {
        let body = signed_body("ORD9", "12.50").replace("12.50", "99.99");
        let headers = HashMap::new();
        let webhook = RawWebhook {
            body: body.as_bytes(),
            headers: &headers,
        };
        let err = YipayNormalizer::new(Some(SignKeyConfig { key: KEY.into() }))
            .verify(&webhook)
            .unwrap_err();
        assert!(err.is_auth_failure());
    }
}

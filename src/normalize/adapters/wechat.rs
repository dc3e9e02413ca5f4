//! WeChat Pay notify adapter (v2-style MD5 parameter signing).
//!
//! `total_fee` is already in minor units (fen).

use super::super::error::NormalizeError;
use super::super::signature::verify_md5_param_sign;
use super::super::types::{EventStatus, PaymentEvent, PaymentProvider, RawWebhook};
use super::super::Normalizer;
use super::{parse_param_map, require_param};
use crate::config::SignKeyConfig;

pub struct WechatNormalizer {
    config: Option<SignKeyConfig>,
}

impl WechatNormalizer {
    pub fn new(config: Option<SignKeyConfig>) -> Self {
        Self { config }
    }
}

impl Normalizer for WechatNormalizer {
    fn provider(&self) -> PaymentProvider {
        PaymentProvider::Wechat
    }

    fn verify(&self, webhook: &RawWebhook<'_>) -> Result<PaymentEvent, NormalizeError> {
        let config = self
            .config
            .as_ref()
            .ok_or(NormalizeError::MissingSecret(PaymentProvider::Wechat))?;

        let params = parse_param_map(webhook.body)?;
        let signature = require_param(&params, "sign").map_err(|_| {
            NormalizeError::SignatureInvalid {
                provider: PaymentProvider::Wechat,
                reason: "missing sign field".into(),
            }
        })?;

        if !verify_md5_param_sign(&params, &config.key, signature) {
            return Err(NormalizeError::SignatureInvalid {
                provider: PaymentProvider::Wechat,
                reason: "MD5 signature mismatch".into(),
            });
        }

        let order_no = require_param(&params, "out_trade_no")?.to_string();
        let provider_tx_id = require_param(&params, "transaction_id")?.to_string();
        let result_code = require_param(&params, "result_code")?;

        let status = match result_code {
            "SUCCESS" => EventStatus::Completed,
            _ => EventStatus::Failed,
        };

        let paid_amount = match status {
            EventStatus::Completed => require_param(&params, "total_fee")?
                .parse::<i64>()
                .map_err(|_| NormalizeError::MalformedPayload("total_fee not an integer".into()))?,
            EventStatus::Failed => 0,
        };

        Ok(PaymentEvent {
            provider: PaymentProvider::Wechat,
            order_no,
            provider_tx_id,
            paid_amount,
            status,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::super::super::signature::md5_param_sign;
    use super::*;
    use std::collections::{BTreeMap, HashMap};

    const KEY: &str = "wx_api_key";

    fn signed_body(order_no: &str, fee: &str, result: &str) -> String {
        let mut params = BTreeMap::new();
        params.insert("out_trade_no".to_string(), order_no.to_string());
        params.insert("transaction_id".to_string(), "4200001".to_string());
        params.insert("total_fee".to_string(), fee.to_string());
        params.insert("result_code".to_string(), result.to_string());
        let sign = md5_param_sign(&params, KEY);
        format!(
            r#"{{"out_trade_no":"{}","transaction_id":"4200001","total_fee":{},"result_code":"{}","sign":"{}"}}"#,
            order_no, fee, result, sign
        )
    }

    #[test]
    fn test_valid_notify() {
        let body = signed_body("ORD2", "9999", "SUCCESS");
        let headers = HashMap::new();
        let webhook = RawWebhook {
            body: body.as_bytes(),
            headers: &headers,
        };
        let event = WechatNormalizer::new(Some(SignKeyConfig { key: KEY.into() }))
            .verify(&webhook)
            .unwrap();
        assert_eq!(event.order_no, "ORD2");
        assert_eq!(event.paid_amount, 9999);
        assert_eq!(event.status, EventStatus::Completed);
    }

    #[test]
    fn test_failed_result_code() {
        let body = signed_body("ORD2", "9999", "FAIL");
        let headers = HashMap::new();
        let webhook = RawWebhook {
            body: body.as_bytes(),
            headers: &headers,
        };
        let event = WechatNormalizer::new(Some(SignKeyConfig { key: KEY.into() }))
            .verify(&webhook)
            .unwrap();
        assert_eq!(event.status, EventStatus::Failed);
        assert_eq!(event.paid_amount, 0);
    }

    #[test]
    fn test_wrong_key_rejected() {
        let body = signed_body("ORD2", "9999", "SUCCESS");
        let headers = HashMap::new();
        let webhook = RawWebhook {
            body: body.as_bytes(),
            headers: &headers,
        };
        let err = WechatNormalizer::new(Some(SignKeyConfig { key: "other".into() }))
            .verify(&webhook)
            .unwrap_err();
        assert!(err.is_auth_failure());
    }

    #[test]
    fn test_missing_secret_fails_closed() {
        let body = signed_body("ORD2", "9999", "SUCCESS");
        let headers = HashMap::new();
        let webhook = RawWebhook {
            body: body.as_bytes(),
            headers: &headers,
        };
        let err = WechatNormalizer::new(None).verify(&webhook).unwrap_err();
        assert!(matches!(err, NormalizeError::MissingSecret(_)));
    }
}

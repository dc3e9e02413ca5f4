//! Alipay F2F notify adapter (legacy MD5 parameter signing).
//!
//! `total_amount` is a decimal string ("99.99").

use super::super::error::NormalizeError;
use super::super::signature::verify_md5_param_sign;
use super::super::types::{EventStatus, PaymentEvent, PaymentProvider, RawWebhook};
use super::super::Normalizer;
use super::{parse_param_map, require_param};
use crate::config::SignKeyConfig;
use crate::money;

pub struct AlipayNormalizer {
    config: Option<SignKeyConfig>,
}

impl AlipayNormalizer {
    pub fn new(config: Option<SignKeyConfig>) -> Self {
        Self { config }
    }
}

impl Normalizer for AlipayNormalizer {
    fn provider(&self) -> PaymentProvider {
        PaymentProvider::Alipay
    }

    fn verify(&self, webhook: &RawWebhook<'_>) -> Result<PaymentEvent, NormalizeError> {
        let config = self
            .config
            .as_ref()
            .ok_or(NormalizeError::MissingSecret(PaymentProvider::Alipay))?;

        let params = parse_param_map(webhook.body)?;
        let signature = require_param(&params, "sign").map_err(|_| {
            NormalizeError::SignatureInvalid {
                provider: PaymentProvider::Alipay,
                reason: "missing sign field".into(),
            }
        })?;

        if !verify_md5_param_sign(&params, &config.key, signature) {
            return Err(NormalizeError::SignatureInvalid {
                provider: PaymentProvider::Alipay,
                reason: "MD5 signature mismatch".into(),
            });
        }

        let trade_status = require_param(&params, "trade_status")?;
        let status = match trade_status {
            "TRADE_SUCCESS" | "TRADE_FINISHED" => EventStatus::Completed,
            "TRADE_CLOSED" => EventStatus::Failed,
            // Buyer has not paid yet; nothing to settle
            other => return Err(NormalizeError::IgnoredEvent(other.to_string())),
        };

        let order_no = require_param(&params, "out_trade_no")?.to_string();
        let provider_tx_id = require_param(&params, "trade_no")?.to_string();

        let paid_amount = match status {
            EventStatus::Completed => {
                let raw = require_param(&params, "total_amount")?;
                money::parse_amount(raw)
                    .map_err(|e| NormalizeError::MalformedPayload(format!("bad total_amount: {}", e)))?
            }
            EventStatus::Failed => 0,
        };

        Ok(PaymentEvent {
            provider: PaymentProvider::Alipay,
            order_no,
            provider_tx_id,
            paid_amount,
            status,
        })
    }
}

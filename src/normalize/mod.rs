//! Payment gateway reconciliation layer.
//!
//! One adapter per provider. Each adapter verifies a signature or
//! credential against its configured secret and produces a normalized
//! [`PaymentEvent`]; the reconciler is written once against that type.
//! A provider without a configured secret is fail-closed: every
//! delivery is rejected, none are silently accepted.

pub mod adapters;
pub mod error;
pub mod signature;
pub mod types;

use std::collections::HashMap;

pub use error::NormalizeError;
pub use types::{EventStatus, PaymentEvent, PaymentProvider, RawWebhook};

use crate::config::ProvidersConfig;

/// Per-provider verification + normalization seam.
pub trait Normalizer: Send + Sync {
    fn provider(&self) -> PaymentProvider;

    /// Verify the delivery's signature and normalize the payload.
    /// Signature failures must be reported before any payload parsing
    /// is trusted.
    fn verify(&self, webhook: &RawWebhook<'_>) -> Result<PaymentEvent, NormalizeError>;
}

/// Routes a webhook delivery to the right provider adapter.
pub struct NormalizerRegistry {
    adapters: HashMap<PaymentProvider, Box<dyn Normalizer>>,
}

impl NormalizerRegistry {
    pub fn from_config(config: &ProvidersConfig) -> Self {
        let mut adapters: HashMap<PaymentProvider, Box<dyn Normalizer>> = HashMap::new();
        adapters.insert(
            PaymentProvider::Stripe,
            Box::new(adapters::stripe::StripeNormalizer::new(
                config.stripe.clone(),
            )),
        );
        adapters.insert(
            PaymentProvider::Paypal,
            Box::new(adapters::paypal::PaypalNormalizer::new(
                config.paypal.clone(),
            )),
        );
        adapters.insert(
            PaymentProvider::Wechat,
            Box::new(adapters::wechat::WechatNormalizer::new(
                config.wechat.clone(),
            )),
        );
        adapters.insert(
            PaymentProvider::Alipay,
            Box::new(adapters::alipay::AlipayNormalizer::new(
                config.alipay.clone(),
            )),
        );
        adapters.insert(
            PaymentProvider::Yipay,
            Box::new(adapters::yipay::YipayNormalizer::new(config.yipay.clone())),
        );
        adapters.insert(
            PaymentProvider::Usdt,
            Box::new(adapters::usdt::UsdtNormalizer::new(config.usdt.clone())),
        );
        Self { adapters }
    }

    pub fn get(&self, provider: PaymentProvider) -> Option<&dyn Normalizer> {
        self.adapters.get(&provider).map(|b| b.as_ref())
    }
}

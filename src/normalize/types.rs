//! Normalized payment event types.
//!
//! Every provider adapter verifies its own signature scheme and emits
//! this one event shape; the reconciler never sees provider payloads.

use std::collections::HashMap;
use std::fmt;
use std::str::FromStr;

use crate::money::Cents;

/// Supported payment gateways.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PaymentProvider {
    Paypal,
    Stripe,
    Wechat,
    Alipay,
    Yipay,
    Usdt,
    /// Internal wallet balance - no webhook, settled synchronously.
    Balance,
}

impl PaymentProvider {
    pub fn as_str(&self) -> &'static str {
        match self {
            PaymentProvider::Paypal => "paypal",
            PaymentProvider::Stripe => "stripe",
            PaymentProvider::Wechat => "wechat",
            PaymentProvider::Alipay => "alipay",
            PaymentProvider::Yipay => "yipay",
            PaymentProvider::Usdt => "usdt",
            PaymentProvider::Balance => "balance",
        }
    }

    /// Providers that deliver webhooks (everything but the wallet).
    pub fn webhook_providers() -> &'static [PaymentProvider] {
        &[
            PaymentProvider::Paypal,
            PaymentProvider::Stripe,
            PaymentProvider::Wechat,
            PaymentProvider::Alipay,
            PaymentProvider::Yipay,
            PaymentProvider::Usdt,
        ]
    }
}

impl fmt::Display for PaymentProvider {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl FromStr for PaymentProvider {
    type Err = ();

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "paypal" => Ok(PaymentProvider::Paypal),
            "stripe" => Ok(PaymentProvider::Stripe),
            "wechat" => Ok(PaymentProvider::Wechat),
            "alipay" => Ok(PaymentProvider::Alipay),
            "yipay" => Ok(PaymentProvider::Yipay),
            "usdt" => Ok(PaymentProvider::Usdt),
            "balance" => Ok(PaymentProvider::Balance),
            _ => Err(()),
        }
    }
}

/// Normalized outcome reported by the gateway.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EventStatus {
    Completed,
    Failed,
}

/// Provider-agnostic payment notification.
///
/// `order_no` carries either an order number or a recharge number; the
/// reconciler dispatches on the prefix.
#[derive(Debug, Clone)]
pub struct PaymentEvent {
    pub provider: PaymentProvider,
    pub order_no: String,
    pub provider_tx_id: String,
    pub paid_amount: Cents,
    pub status: EventStatus,
}

/// Raw webhook delivery handed to an adapter: body plus the headers it
/// needs for signature verification (keys lowercased by the HTTP layer).
pub struct RawWebhook<'a> {
    pub body: &'a [u8],
    pub headers: &'a HashMap<String, String>,
}

impl<'a> RawWebhook<'a> {
    pub fn header(&self, name: &str) -> Option<&'a str> {
        self.headers.get(name).map(|s| s.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_provider_roundtrip() {
        for p in PaymentProvider::webhook_providers() {
            assert_eq!(p.as_str().parse::<PaymentProvider>(), Ok(*p));
        }
        assert!("venmo".parse::<PaymentProvider>().is_err());
    }
}

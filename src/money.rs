//! Money Conversion Module
//!
//! Unified conversion between the internal i64 minor-unit (cent)
//! representation and the client/provider-facing string/Decimal
//! representation. All conversions MUST go through this module.
//!
//! ## Internal Representation
//! - All amounts are stored as `i64` cents (2 decimal places).
//! - Storage columns are `NUMERIC(20,2)`; conversion happens at the edge.
//! - The legacy 0.01 amount tolerance becomes "within one cent" here.

use rust_decimal::Decimal;
use rust_decimal::prelude::ToPrimitive;
use thiserror::Error;

/// Amount in minor units (cents). Signed: ledger log amounts carry sign.
pub type Cents = i64;

/// Settlement amount tolerance, in cents. Absorbs currency rounding in
/// amounts reported by external gateways.
pub const AMOUNT_TOLERANCE_CENTS: Cents = 1;

const SCALE: u32 = 2;

/// Money conversion errors
#[derive(Debug, Error)]
pub enum MoneyError {
    #[error("Precision overflow: provided {provided} decimals, max allowed {max}")]
    PrecisionOverflow { provided: u32, max: u32 },

    #[error("Amount must be positive")]
    InvalidAmount,

    #[error("Amount too large, would overflow")]
    Overflow,

    #[error("Invalid format: {0}")]
    InvalidFormat(String),
}

/// Convert a provider/client decimal amount to cents.
///
/// Rejects negative, zero and sub-cent amounts - gateways never report
/// a settled payment of 0.001.
pub fn parse_decimal(amount: Decimal) -> Result<Cents, MoneyError> {
    if amount.is_sign_negative() || amount.is_zero() {
        return Err(MoneyError::InvalidAmount);
    }
    decimal_to_cents(amount)
}

/// Convert a provider/client string amount (e.g. "99.99") to cents.
pub fn parse_amount(amount_str: &str) -> Result<Cents, MoneyError> {
    let amount_str = amount_str.trim();
    if amount_str.is_empty() {
        return Err(MoneyError::InvalidFormat("empty string".into()));
    }
    let decimal: Decimal = amount_str
        .parse()
        .map_err(|_| MoneyError::InvalidFormat(format!("not a number: {}", amount_str)))?;
    parse_decimal(decimal)
}

/// Signed Decimal -> cents conversion for storage reads.
///
/// Balances may legitimately be negative after an admin adjustment, so
/// sign is preserved. Sub-cent precision is rejected, never truncated.
pub fn decimal_to_cents(amount: Decimal) -> Result<Cents, MoneyError> {
    if amount.scale() > SCALE {
        // Normalize trailing zeros first: 1.500 is fine, 1.505 is not
        let normalized = amount.normalize();
        if normalized.scale() > SCALE {
            return Err(MoneyError::PrecisionOverflow {
                provided: amount.scale(),
                max: SCALE,
            });
        }
    }
    let scaled = amount * Decimal::from(100);
    scaled.trunc().to_i64().ok_or(MoneyError::Overflow)
}

/// Cents -> Decimal for storage writes and API responses.
pub fn cents_to_decimal(cents: Cents) -> Decimal {
    Decimal::new(cents, SCALE)
}

/// Format cents for human-readable log output ("99.99").
pub fn format_cents(cents: Cents) -> String {
    cents_to_decimal(cents).to_string()
}

/// Settlement amount check: the gateway-reported amount must match the
/// order's frozen price within [`AMOUNT_TOLERANCE_CENTS`].
#[inline]
pub fn amounts_match(expected: Cents, paid: Cents) -> bool {
    (expected - paid).abs() <= AMOUNT_TOLERANCE_CENTS
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_amount() {
        assert_eq!(parse_amount("99.99").unwrap(), 9999);
        assert_eq!(parse_amount("100").unwrap(), 10000);
        assert_eq!(parse_amount("0.01").unwrap(), 1);
        assert_eq!(parse_amount(" 1.50 ").unwrap(), 150);
    }

    #[test]
    fn test_parse_amount_rejects() {
        assert!(parse_amount("").is_err());
        assert!(parse_amount("abc").is_err());
        assert!(parse_amount("-5").is_err());
        assert!(parse_amount("0").is_err());
        assert!(parse_amount("1.999").is_err());
    }

    #[test]
    fn test_decimal_roundtrip() {
        let d = cents_to_decimal(9999);
        assert_eq!(d.to_string(), "99.99");
        assert_eq!(decimal_to_cents(d).unwrap(), 9999);
        // Negative balances survive the storage roundtrip
        assert_eq!(decimal_to_cents(cents_to_decimal(-250)).unwrap(), -250);
    }

    #[test]
    fn test_trailing_zeros_accepted() {
        let d: Decimal = "1.500".parse().unwrap();
        assert_eq!(decimal_to_cents(d).unwrap(), 150);
    }

    #[test]
    fn test_amounts_match_tolerance() {
        // price=99.99, paid=99.98 -> within tolerance
        assert!(amounts_match(9999, 9998));
        assert!(amounts_match(9999, 9999));
        assert!(amounts_match(9999, 10000));
        // price=99.99, paid=99.50 -> mismatch
        assert!(!amounts_match(9999, 9950));
        assert!(!amounts_match(9999, 9997));
    }
}

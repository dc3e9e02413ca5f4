//! Recharge promotion definitions.

use chrono::{DateTime, Utc};
use std::fmt;

use crate::money::Cents;

/// What the promo's `value` means.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(i16)]
pub enum PromoType {
    /// Flat reduction of the amount the user must pay, in cents.
    Discount = 1,
    /// Flat extra credit beyond the paid amount, in cents.
    Bonus = 2,
    /// Extra credit as a percentage of the recharge amount, capped at
    /// `max_bonus` when set.
    Percent = 3,
}

impl PromoType {
    #[inline]
    pub fn id(&self) -> i16 {
        *self as i16
    }

    pub fn from_id(id: i16) -> Option<Self> {
        match id {
            1 => Some(PromoType::Discount),
            2 => Some(PromoType::Bonus),
            3 => Some(PromoType::Percent),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            PromoType::Discount => "discount",
            PromoType::Bonus => "bonus",
            PromoType::Percent => "percent",
        }
    }
}

impl fmt::Display for PromoType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// How a promo combines with others.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(i16)]
pub enum StackMode {
    /// Compete in the single-winner pool by bonus+discount value.
    Best = 1,
    /// Compete in the single-winner pool by priority.
    First = 2,
    /// Always applies when eligible, on top of the single winner.
    All = 3,
}

impl StackMode {
    #[inline]
    pub fn id(&self) -> i16 {
        *self as i16
    }

    pub fn from_id(id: i16) -> Option<Self> {
        match id {
            1 => Some(StackMode::Best),
            2 => Some(StackMode::First),
            3 => Some(StackMode::All),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            StackMode::Best => "best",
            StackMode::First => "first",
            StackMode::All => "all",
        }
    }
}

impl fmt::Display for StackMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// One administrator-defined recharge offer.
#[derive(Debug, Clone)]
pub struct RechargePromo {
    pub id: i64,
    pub name: String,
    pub promo_type: PromoType,
    pub min_amount: Cents,
    /// 0 = unbounded.
    pub max_amount: Cents,
    /// Two implied decimals, like every money column: cents for
    /// discount/bonus, hundredths of a percent for percent (500 = 5%).
    pub value: i64,
    /// Cap for percent bonuses. 0 = uncapped.
    pub max_bonus: Cents,
    pub priority: i32,
    pub stack_mode: StackMode,
    /// 0 = unlimited per user.
    pub per_user_limit: i32,
    /// 0 = unlimited total redemptions.
    pub total_limit: i64,
    pub used_count: i64,
    pub start_at: DateTime<Utc>,
    pub end_at: DateTime<Utc>,
    pub enabled: bool,
}

impl RechargePromo {
    /// Enabled, inside its window, and not exhausted.
    pub fn is_active(&self, now: DateTime<Utc>) -> bool {
        self.enabled
            && self.start_at <= now
            && now <= self.end_at
            && (self.total_limit == 0 || self.used_count < self.total_limit)
    }

    /// Amount falls within `[min_amount, max_amount-or-unbounded]`.
    pub fn in_range(&self, amount: Cents) -> bool {
        amount >= self.min_amount && (self.max_amount == 0 || amount <= self.max_amount)
    }

    pub fn is_eligible(&self, amount: Cents, now: DateTime<Utc>) -> bool {
        self.is_active(now) && self.in_range(amount)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    fn promo(min: Cents, max: Cents) -> RechargePromo {
        let now = Utc::now();
        RechargePromo {
            id: 1,
            name: "test".into(),
            promo_type: PromoType::Bonus,
            min_amount: min,
            max_amount: max,
            value: 500,
            max_bonus: 0,
            priority: 0,
            stack_mode: StackMode::Best,
            per_user_limit: 0,
            total_limit: 0,
            used_count: 0,
            start_at: now - Duration::hours(1),
            end_at: now + Duration::hours(1),
            enabled: true,
        }
    }

    #[test]
    fn test_range_check() {
        let p = promo(5000, 20000);
        assert!(!p.in_range(4999));
        assert!(p.in_range(5000));
        assert!(p.in_range(20000));
        assert!(!p.in_range(20001));

        // max_amount = 0 means unbounded
        let p = promo(5000, 0);
        assert!(p.in_range(i64::MAX));
    }

    #[test]
    fn test_active_window() {
        let now = Utc::now();
        let mut p = promo(0, 0);
        assert!(p.is_active(now));

        p.enabled = false;
        assert!(!p.is_active(now));
        p.enabled = true;

        assert!(!p.is_active(now + Duration::hours(2)));
        assert!(!p.is_active(now - Duration::hours(2)));
    }

    #[test]
    fn test_total_limit_exhaustion() {
        let now = Utc::now();
        let mut p = promo(0, 0);
        p.total_limit = 10;
        p.used_count = 9;
        assert!(p.is_active(now));
        p.used_count = 10;
        assert!(!p.is_active(now));
    }
}

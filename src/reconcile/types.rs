//! Order and recharge-order types and their state machines.
//!
//! Status IDs are stored as SMALLINT. Legal transitions are encoded on
//! the enums; everything else in the crate asks the enum instead of
//! comparing raw ids.

use chrono::{DateTime, Utc};
use std::fmt;
use ulid::Ulid;

use crate::money::Cents;
use crate::promo::PromoApplication;

/// Product order lifecycle:
/// `pending -> paid -> completed`; `pending -> cancelled`;
/// `paid|completed -> refunded`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(i16)]
pub enum OrderStatus {
    Pending = 0,
    Paid = 1,
    Completed = 2,
    Cancelled = 3,
    Refunded = 4,
}

impl OrderStatus {
    #[inline]
    pub fn id(&self) -> i16 {
        *self as i16
    }

    pub fn from_id(id: i16) -> Option<Self> {
        match id {
            0 => Some(OrderStatus::Pending),
            1 => Some(OrderStatus::Paid),
            2 => Some(OrderStatus::Completed),
            3 => Some(OrderStatus::Cancelled),
            4 => Some(OrderStatus::Refunded),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            OrderStatus::Pending => "pending",
            OrderStatus::Paid => "paid",
            OrderStatus::Completed => "completed",
            OrderStatus::Cancelled => "cancelled",
            OrderStatus::Refunded => "refunded",
        }
    }

    pub fn can_transition_to(&self, next: OrderStatus) -> bool {
        use OrderStatus::*;
        matches!(
            (self, next),
            (Pending, Paid) | (Paid, Completed) | (Pending, Cancelled) | (Paid, Refunded) | (Completed, Refunded)
        )
    }

    #[inline]
    pub fn is_terminal(&self) -> bool {
        matches!(self, OrderStatus::Cancelled | OrderStatus::Refunded)
    }
}

impl fmt::Display for OrderStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Recharge order lifecycle:
/// `pending -> paid`; `pending -> cancelled`; `paid -> refunded`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(i16)]
pub enum RechargeStatus {
    Pending = 0,
    Paid = 1,
    Cancelled = 2,
    Refunded = 3,
}

impl RechargeStatus {
    #[inline]
    pub fn id(&self) -> i16 {
        *self as i16
    }

    pub fn from_id(id: i16) -> Option<Self> {
        match id {
            0 => Some(RechargeStatus::Pending),
            1 => Some(RechargeStatus::Paid),
            2 => Some(RechargeStatus::Cancelled),
            3 => Some(RechargeStatus::Refunded),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            RechargeStatus::Pending => "pending",
            RechargeStatus::Paid => "paid",
            RechargeStatus::Cancelled => "cancelled",
            RechargeStatus::Refunded => "refunded",
        }
    }

    pub fn can_transition_to(&self, next: RechargeStatus) -> bool {
        use RechargeStatus::*;
        matches!(
            (self, next),
            (Pending, Paid) | (Pending, Cancelled) | (Paid, Refunded)
        )
    }
}

impl fmt::Display for RechargeStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

const ORDER_PREFIX: &str = "ORD";
const RECHARGE_PREFIX: &str = "RC";

/// Generate a new order number. ULID keeps them sortable without any
/// coordination between nodes.
pub fn new_order_no() -> String {
    format!("{}{}", ORDER_PREFIX, Ulid::new())
}

pub fn new_recharge_no() -> String {
    format!("{}{}", RECHARGE_PREFIX, Ulid::new())
}

/// A gateway event's order number tells us which table it settles.
pub fn is_recharge_no(no: &str) -> bool {
    no.starts_with(RECHARGE_PREFIX) && !no.starts_with(ORDER_PREFIX)
}

/// One paid purchase of a product. `price` is frozen at creation;
/// `paid_amount` is set exactly once, at the transition into paid.
#[derive(Debug, Clone)]
pub struct Order {
    pub id: i64,
    pub order_no: String,
    pub user_id: i64,
    pub product_id: i64,
    pub quantity: i32,
    pub original_price: Cents,
    pub discount_amount: Cents,
    pub price: Cents,
    pub paid_amount: Option<Cents>,
    pub status: OrderStatus,
    pub payment_method: Option<String>,
    pub payment_no: Option<String>,
    pub payment_time: Option<DateTime<Utc>>,
    pub kami_code: Option<String>,
    pub created_at: DateTime<Utc>,
}

/// One wallet top-up. `amount` is the credit the user is buying,
/// `pay_amount` what they actually owe after discounts.
#[derive(Debug, Clone)]
pub struct RechargeOrder {
    pub id: i64,
    pub recharge_no: String,
    pub user_id: i64,
    pub amount: Cents,
    pub pay_amount: Cents,
    pub bonus_amount: Cents,
    pub total_credit: Cents,
    pub promo_id: Option<i64>,
    /// Promo applications frozen at creation. The discounts in here are
    /// the ones actually baked into `pay_amount`; settlement charges
    /// them even if the promo set changed since.
    pub promo_quote: Vec<PromoApplication>,
    pub status: RechargeStatus,
    pub payment_method: Option<String>,
    pub payment_no: Option<String>,
    pub expire_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
}

/// Outcome of applying a payment event.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Applied {
    /// The order transitioned to paid (and for recharges, the wallet
    /// was credited) in this call.
    Settled {
        order_no: String,
        paid_amount: Cents,
    },
    /// The order was not pending - an earlier (possibly duplicate)
    /// delivery already settled it. Success for the caller: the
    /// provider must receive an acknowledgement to stop retrying.
    AlreadyProcessed,
    /// Failure notification or uninteresting status; nothing to do.
    Ignored,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_order_transitions() {
        use OrderStatus::*;
        assert!(Pending.can_transition_to(Paid));
        assert!(Pending.can_transition_to(Cancelled));
        assert!(Paid.can_transition_to(Completed));
        assert!(Paid.can_transition_to(Refunded));
        assert!(Completed.can_transition_to(Refunded));

        assert!(!Paid.can_transition_to(Cancelled));
        assert!(!Cancelled.can_transition_to(Paid));
        assert!(!Refunded.can_transition_to(Pending));
        assert!(!Pending.can_transition_to(Completed));
    }

    #[test]
    fn test_recharge_transitions() {
        use RechargeStatus::*;
        assert!(Pending.can_transition_to(Paid));
        assert!(Pending.can_transition_to(Cancelled));
        assert!(Paid.can_transition_to(Refunded));
        assert!(!Paid.can_transition_to(Cancelled));
        assert!(!Cancelled.can_transition_to(Paid));
    }

    #[test]
    fn test_status_roundtrip() {
        for id in 0..=4 {
            let s = OrderStatus::from_id(id).unwrap();
            assert_eq!(OrderStatus::from_id(s.id()), Some(s));
        }
        assert_eq!(OrderStatus::from_id(5), None);
        assert_eq!(RechargeStatus::from_id(4), None);
    }

    #[test]
    fn test_order_no_dispatch() {
        let ord = new_order_no();
        let rc = new_recharge_no();
        assert!(ord.starts_with("ORD"));
        assert!(rc.starts_with("RC"));
        assert!(!is_recharge_no(&ord));
        assert!(is_recharge_no(&rc));
        assert_ne!(new_order_no(), new_order_no());
    }
}

//! Ledger Core Types
//!
//! Log/operator enums use SMALLINT ids for PostgreSQL storage.

use chrono::{DateTime, Utc};
use std::fmt;

use crate::money::Cents;

/// Kind of balance mutation. One log row per mutation, tagged with this.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(i16)]
pub enum LogType {
    Recharge = 1,
    Consume = 2,
    Refund = 3,
    Withdraw = 4,
    Freeze = 5,
    Unfreeze = 6,
    Gift = 7,
    Adjust = 8,
}

impl LogType {
    #[inline]
    pub fn id(&self) -> i16 {
        *self as i16
    }

    pub fn from_id(id: i16) -> Option<Self> {
        match id {
            1 => Some(LogType::Recharge),
            2 => Some(LogType::Consume),
            3 => Some(LogType::Refund),
            4 => Some(LogType::Withdraw),
            5 => Some(LogType::Freeze),
            6 => Some(LogType::Unfreeze),
            7 => Some(LogType::Gift),
            8 => Some(LogType::Adjust),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            LogType::Recharge => "recharge",
            LogType::Consume => "consume",
            LogType::Refund => "refund",
            LogType::Withdraw => "withdraw",
            LogType::Freeze => "freeze",
            LogType::Unfreeze => "unfreeze",
            LogType::Gift => "gift",
            LogType::Adjust => "adjust",
        }
    }

    /// Whether a credit of this type counts toward `total_in`.
    #[inline]
    pub fn counts_total_in(&self) -> bool {
        matches!(self, LogType::Recharge | LogType::Refund | LogType::Gift)
    }
}

impl fmt::Display for LogType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Who initiated a mutation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(i16)]
pub enum OperatorType {
    User = 1,
    Admin = 2,
    System = 3,
}

impl OperatorType {
    #[inline]
    pub fn id(&self) -> i16 {
        *self as i16
    }

    pub fn from_id(id: i16) -> Option<Self> {
        match id {
            1 => Some(OperatorType::User),
            2 => Some(OperatorType::Admin),
            3 => Some(OperatorType::System),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            OperatorType::User => "user",
            OperatorType::Admin => "admin",
            OperatorType::System => "system",
        }
    }
}

impl fmt::Display for OperatorType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Optional references attached to a log row.
#[derive(Debug, Clone, Default)]
pub struct LedgerRefs {
    pub order_no: Option<String>,
    pub recharge_no: Option<String>,
    pub remark: Option<String>,
}

impl LedgerRefs {
    pub fn order(order_no: &str) -> Self {
        Self {
            order_no: Some(order_no.to_string()),
            ..Default::default()
        }
    }

    pub fn recharge(recharge_no: &str) -> Self {
        Self {
            recharge_no: Some(recharge_no.to_string()),
            ..Default::default()
        }
    }

    pub fn remark(remark: &str) -> Self {
        Self {
            remark: Some(remark.to_string()),
            ..Default::default()
        }
    }
}

/// One append-only ledger row. Never updated or deleted.
///
/// `amount` is signed: credits positive, debits/freezes negative, so
/// summing a user's rows in id order reproduces the current balance.
#[derive(Debug, Clone)]
pub struct BalanceLog {
    pub id: i64,
    pub user_id: i64,
    pub log_type: LogType,
    pub amount: Cents,
    pub before_balance: Cents,
    pub after_balance: Cents,
    pub order_no: Option<String>,
    pub recharge_no: Option<String>,
    pub operator: OperatorType,
    pub remark: Option<String>,
    pub created_at: DateTime<Utc>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_log_type_roundtrip() {
        for id in 1..=8 {
            let t = LogType::from_id(id).unwrap();
            assert_eq!(LogType::from_id(t.id()), Some(t));
        }
        assert_eq!(LogType::from_id(0), None);
        assert_eq!(LogType::from_id(9), None);
    }

    #[test]
    fn test_counts_total_in() {
        assert!(LogType::Recharge.counts_total_in());
        assert!(LogType::Refund.counts_total_in());
        assert!(LogType::Gift.counts_total_in());
        assert!(!LogType::Consume.counts_total_in());
        assert!(!LogType::Unfreeze.counts_total_in());
    }

    #[test]
    fn test_operator_roundtrip() {
        assert_eq!(OperatorType::from_id(2), Some(OperatorType::Admin));
        assert_eq!(OperatorType::from_id(4), None);
        assert_eq!(OperatorType::System.as_str(), "system");
    }
}

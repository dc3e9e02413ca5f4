//! Idempotent balance ledger.
//!
//! Owns `UserBalance` rows and the append-only `BalanceLog`. Exposes
//! atomic credit/debit/freeze/unfreeze/adjust primitives. No knowledge
//! of orders or promos - callers pass references for the log row only.

pub mod error;
pub mod service;
pub mod types;
pub mod wallet;

pub use error::LedgerError;
pub use service::BalanceLedger;
pub use types::{BalanceLog, LedgerRefs, LogType, OperatorType};
pub use wallet::Wallet;

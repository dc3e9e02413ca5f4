use thiserror::Error;

use crate::ledger::LedgerError;
use crate::money::{Cents, MoneyError};

#[derive(Error, Debug)]
pub enum ReconcileError {
    #[error("Database error: {0}")]
    DatabaseError(#[from] sqlx::Error),

    #[error("Ledger error: {0}")]
    Ledger(#[from] LedgerError),

    #[error("Money conversion error: {0}")]
    Money(#[from] MoneyError),

    #[error("Order not found: {0}")]
    OrderNotFound(String),

    /// Gateway-reported amount differs from the frozen price beyond
    /// tolerance. The order stays pending; an administrator reviews the
    /// critical alert this raises. Never auto-accepted, never
    /// auto-refunded.
    #[error("Amount mismatch on {order_no}: expected {expected} cents, got {got} cents")]
    AmountMismatch {
        order_no: String,
        expected: Cents,
        got: Cents,
    },

    #[error("Order {0} cannot be cancelled in its current state")]
    NotCancellable(String),

    #[error("Invalid amount: {0}")]
    InvalidAmount(String),
}

impl ReconcileError {
    /// Domain errors are expected business outcomes (HTTP 4xx);
    /// persistence failures are the only 5xx.
    pub fn is_internal(&self) -> bool {
        matches!(
            self,
            ReconcileError::DatabaseError(_)
                | ReconcileError::Ledger(LedgerError::DatabaseError(_))
        )
    }
}

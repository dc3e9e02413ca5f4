use thiserror::Error;

#[derive(Error, Debug)]
pub enum LedgerError {
    #[error("Database error: {0}")]
    DatabaseError(#[from] sqlx::Error),

    #[error("Insufficient balance")]
    InsufficientBalance,

    #[error("Insufficient frozen funds")]
    InsufficientFrozen,

    #[error("Invalid amount: {0}")]
    InvalidAmount(&'static str),

    #[error("Money conversion error: {0}")]
    Money(#[from] crate::money::MoneyError),
}

impl LedgerError {
    /// Map the wallet type's arithmetic errors onto the ledger taxonomy.
    pub(crate) fn from_wallet(e: &'static str) -> Self {
        match e {
            "Insufficient balance" | "Insufficient balance to freeze" => {
                LedgerError::InsufficientBalance
            }
            "Insufficient frozen funds" => LedgerError::InsufficientFrozen,
            other => LedgerError::InvalidAmount(other),
        }
    }
}

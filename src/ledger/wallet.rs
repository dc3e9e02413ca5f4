/// ENFORCED WALLET TYPE - Used by BalanceLedger
///
/// This is the single source of truth for balance arithmetic.
/// ALL wallet mutations MUST go through these methods.
///
/// # Enforcement Strategy:
/// 1. Fields are PRIVATE - no direct access
/// 2. All mutations return Result - errors are explicit
/// 3. checked arithmetic - overflow protection
/// 4. Negative balances are representable but only reachable through
///    `adjust` - the alert monitor flags them, nothing clamps them

/// Wallet state for a single user, in cents.
///
/// # Invariants (enforced by private fields):
/// - `credit`/`debit`/`freeze`/`unfreeze` never drive `balance` or
///   `frozen` negative
/// - `total_in`/`total_out` are monotonically non-decreasing
/// - Replaying the signed log amounts of every mutation reproduces
///   `balance` (the ledger service writes exactly one log row per call)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Wallet {
    balance: i64,
    frozen: i64,
    total_in: i64,
    total_out: i64,
}

impl Wallet {
    /// Rebuild wallet state from a storage row.
    pub fn from_row(balance: i64, frozen: i64, total_in: i64, total_out: i64) -> Self {
        Self {
            balance,
            frozen,
            total_in,
            total_out,
        }
    }

    #[inline(always)]
    pub const fn balance(&self) -> i64 {
        self.balance
    }

    #[inline(always)]
    pub const fn frozen(&self) -> i64 {
        self.frozen
    }

    #[inline(always)]
    pub const fn total_in(&self) -> i64 {
        self.total_in
    }

    #[inline(always)]
    pub const fn total_out(&self) -> i64 {
        self.total_out
    }

    /// Add spendable funds.
    ///
    /// `count_in` controls whether the mutation is an inflow for audit
    /// purposes (recharge/refund/gift) or an internal move.
    pub fn credit(&mut self, amount: i64, count_in: bool) -> Result<(), &'static str> {
        if amount <= 0 {
            return Err("Credit amount must be positive");
        }
        self.balance = self.balance.checked_add(amount).ok_or("Credit overflow")?;
        if count_in {
            self.total_in = self
                .total_in
                .checked_add(amount)
                .ok_or("TotalIn overflow")?;
        }
        Ok(())
    }

    /// Remove spendable funds. No overdraft.
    pub fn debit(&mut self, amount: i64) -> Result<(), &'static str> {
        if amount <= 0 {
            return Err("Debit amount must be positive");
        }
        if self.balance < amount {
            return Err("Insufficient balance");
        }
        self.balance = self.balance.checked_sub(amount).ok_or("Debit underflow")?;
        self.total_out = self
            .total_out
            .checked_add(amount)
            .ok_or("TotalOut overflow")?;
        Ok(())
    }

    /// Move funds from spendable to frozen (e.g. pending withdrawal).
    pub fn freeze(&mut self, amount: i64) -> Result<(), &'static str> {
        if amount <= 0 {
            return Err("Freeze amount must be positive");
        }
        if self.balance < amount {
            return Err("Insufficient balance to freeze");
        }
        self.balance = self
            .balance
            .checked_sub(amount)
            .ok_or("Freeze balance underflow")?;
        self.frozen = self
            .frozen
            .checked_add(amount)
            .ok_or("Freeze frozen overflow")?;
        Ok(())
    }

    /// Move funds from frozen back to spendable.
    pub fn unfreeze(&mut self, amount: i64) -> Result<(), &'static str> {
        if amount <= 0 {
            return Err("Unfreeze amount must be positive");
        }
        if self.frozen < amount {
            return Err("Insufficient frozen funds");
        }
        self.frozen = self
            .frozen
            .checked_sub(amount)
            .ok_or("Unfreeze frozen underflow")?;
        self.balance = self
            .balance
            .checked_add(amount)
            .ok_or("Unfreeze balance overflow")?;
        Ok(())
    }

    /// Admin adjustment: unrestricted sign, may leave the balance
    /// negative. The anomaly is the monitor's job, not this type's.
    pub fn adjust(&mut self, signed_amount: i64) -> Result<(), &'static str> {
        if signed_amount == 0 {
            return Err("Adjust amount must be non-zero");
        }
        self.balance = self
            .balance
            .checked_add(signed_amount)
            .ok_or("Adjust overflow")?;
        if signed_amount > 0 {
            self.total_in = self
                .total_in
                .checked_add(signed_amount)
                .ok_or("TotalIn overflow")?;
        } else {
            self.total_out = self
                .total_out
                .checked_add(-signed_amount)
                .ok_or("TotalOut overflow")?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_credit() {
        let mut w = Wallet::default();
        w.credit(100, true).unwrap();
        assert_eq!(w.balance(), 100);
        assert_eq!(w.total_in(), 100);

        w.credit(50, false).unwrap();
        assert_eq!(w.balance(), 150);
        assert_eq!(w.total_in(), 100); // internal move, no inflow
    }

    #[test]
    fn test_debit_insufficient() {
        let mut w = Wallet::default();
        w.credit(50, true).unwrap();

        assert!(w.debit(100).is_err());
        assert_eq!(w.balance(), 50); // Unchanged
        assert_eq!(w.total_out(), 0);
    }

    #[test]
    fn test_debit() {
        let mut w = Wallet::default();
        w.credit(100, true).unwrap();
        w.debit(60).unwrap();
        assert_eq!(w.balance(), 40);
        assert_eq!(w.total_out(), 60);
    }

    #[test]
    fn test_freeze_unfreeze() {
        let mut w = Wallet::default();
        w.credit(100, true).unwrap();

        w.freeze(60).unwrap();
        assert_eq!(w.balance(), 40);
        assert_eq!(w.frozen(), 60);

        assert!(w.freeze(50).is_err()); // only 40 spendable

        w.unfreeze(20).unwrap();
        assert_eq!(w.balance(), 60);
        assert_eq!(w.frozen(), 40);

        assert!(w.unfreeze(100).is_err());
    }

    #[test]
    fn test_adjust_can_go_negative() {
        let mut w = Wallet::default();
        w.credit(30, true).unwrap();
        w.adjust(-50).unwrap();
        assert_eq!(w.balance(), -20);
        assert_eq!(w.total_out(), 50);

        w.adjust(100).unwrap();
        assert_eq!(w.balance(), 80);
        assert_eq!(w.total_in(), 130);
    }

    #[test]
    fn test_rejects_non_positive() {
        let mut w = Wallet::default();
        assert!(w.credit(0, true).is_err());
        assert!(w.credit(-5, true).is_err());
        assert!(w.debit(0).is_err());
        assert!(w.freeze(-1).is_err());
        assert!(w.adjust(0).is_err());
    }

    #[test]
    fn test_overflow_protection() {
        let mut w = Wallet::default();
        w.credit(i64::MAX, false).unwrap();
        assert!(w.credit(1, false).is_err());
    }
}

//! BalanceLedger - transactional wallet mutation service.
//!
//! Exclusively owns writes to `user_balances_tb` and `balance_logs_tb`.
//! Every public operation is one transaction producing exactly one log
//! row, with `before_balance`/`after_balance` captured under the row
//! lock so the running balance and its log can never diverge.
//!
//! The `*_tx` variants run inside a caller-supplied transaction so the
//! reconciler can make "recharge paid and wallet credited" atomic.

use sqlx::{PgPool, Postgres, Row, Transaction};
use std::sync::Arc;
use tracing::{debug, info, warn};

use super::error::LedgerError;
use super::types::{BalanceLog, LedgerRefs, LogType, OperatorType};
use super::wallet::Wallet;
use crate::alert::AlertMonitor;
use crate::money::{Cents, cents_to_decimal, decimal_to_cents, format_cents};

pub struct BalanceLedger {
    pool: PgPool,
    monitor: Arc<AlertMonitor>,
}

impl BalanceLedger {
    pub fn new(pool: PgPool, monitor: Arc<AlertMonitor>) -> Self {
        Self { pool, monitor }
    }

    // ============================================================
    // PUBLIC OPERATIONS (one transaction, one log row each)
    // ============================================================

    /// Add spendable funds. `amount > 0` required.
    pub async fn credit(
        &self,
        user_id: i64,
        amount: Cents,
        log_type: LogType,
        refs: LedgerRefs,
        operator: OperatorType,
    ) -> Result<BalanceLog, LedgerError> {
        let mut tx = self.pool.begin().await?;
        let log = self
            .credit_tx(&mut tx, user_id, amount, log_type, refs, operator)
            .await?;
        tx.commit().await?;
        self.monitor.observe_log(&log).await;
        Ok(log)
    }

    /// Remove spendable funds. Fails with `InsufficientBalance` before
    /// any row is written - no overdraft, no partial state.
    pub async fn debit(
        &self,
        user_id: i64,
        amount: Cents,
        log_type: LogType,
        refs: LedgerRefs,
        operator: OperatorType,
    ) -> Result<BalanceLog, LedgerError> {
        let mut tx = self.pool.begin().await?;
        let log = self
            .debit_tx(&mut tx, user_id, amount, log_type, refs, operator)
            .await?;
        tx.commit().await?;
        self.monitor.observe_log(&log).await;
        Ok(log)
    }

    /// Move spendable funds into the frozen bucket.
    pub async fn freeze(&self, user_id: i64, amount: Cents) -> Result<BalanceLog, LedgerError> {
        let mut tx = self.pool.begin().await?;
        let log = self
            .mutate_tx(
                &mut tx,
                user_id,
                LogType::Freeze,
                -amount,
                LedgerRefs::default(),
                OperatorType::User,
                |w| w.freeze(amount),
            )
            .await?;
        tx.commit().await?;
        self.monitor.observe_log(&log).await;
        Ok(log)
    }

    /// Move frozen funds back to spendable.
    pub async fn unfreeze(&self, user_id: i64, amount: Cents) -> Result<BalanceLog, LedgerError> {
        let mut tx = self.pool.begin().await?;
        let log = self
            .mutate_tx(
                &mut tx,
                user_id,
                LogType::Unfreeze,
                amount,
                LedgerRefs::default(),
                OperatorType::User,
                |w| w.unfreeze(amount),
            )
            .await?;
        tx.commit().await?;
        self.monitor.observe_log(&log).await;
        Ok(log)
    }

    /// Admin adjustment: unrestricted sign, always logged as admin.
    /// Large adjustments raise a warning alert for review.
    pub async fn adjust_by_admin(
        &self,
        user_id: i64,
        signed_amount: Cents,
        remark: &str,
        admin_id: i64,
    ) -> Result<BalanceLog, LedgerError> {
        let refs = LedgerRefs::remark(&format!("admin:{} {}", admin_id, remark));
        let mut tx = self.pool.begin().await?;
        let log = self
            .mutate_tx(
                &mut tx,
                user_id,
                LogType::Adjust,
                signed_amount,
                refs,
                OperatorType::Admin,
                |w| w.adjust(signed_amount),
            )
            .await?;
        tx.commit().await?;

        info!(
            user_id,
            admin_id,
            amount = %format_cents(signed_amount),
            "Admin balance adjustment"
        );
        self.monitor.observe_log(&log).await;
        self.monitor.observe_admin_adjust(&log).await;
        Ok(log)
    }

    // ============================================================
    // COMPOSABLE VARIANTS (caller owns the transaction)
    // ============================================================

    /// Take the user's balance row lock without mutating anything.
    ///
    /// Callers whose per-user work starts before the ledger write (the
    /// reconciler counts promo usage before crediting) lock here first
    /// so two settlements for the same user serialize for the whole
    /// transaction, not just the credit.
    pub async fn lock_user_tx(
        &self,
        tx: &mut Transaction<'_, Postgres>,
        user_id: i64,
    ) -> Result<(), LedgerError> {
        lock_wallet(tx, user_id).await.map(|_| ())
    }

    pub async fn credit_tx(
        &self,
        tx: &mut Transaction<'_, Postgres>,
        user_id: i64,
        amount: Cents,
        log_type: LogType,
        refs: LedgerRefs,
        operator: OperatorType,
    ) -> Result<BalanceLog, LedgerError> {
        let count_in = log_type.counts_total_in();
        self.mutate_tx(tx, user_id, log_type, amount, refs, operator, |w| {
            w.credit(amount, count_in)
        })
        .await
    }

    pub async fn debit_tx(
        &self,
        tx: &mut Transaction<'_, Postgres>,
        user_id: i64,
        amount: Cents,
        log_type: LogType,
        refs: LedgerRefs,
        operator: OperatorType,
    ) -> Result<BalanceLog, LedgerError> {
        self.mutate_tx(tx, user_id, log_type, -amount, refs, operator, |w| {
            w.debit(amount)
        })
        .await
    }

    /// Shared mutation path: lock the balance row, apply the wallet
    /// operation, persist the new state and append the log row.
    async fn mutate_tx<F>(
        &self,
        tx: &mut Transaction<'_, Postgres>,
        user_id: i64,
        log_type: LogType,
        signed_amount: Cents,
        refs: LedgerRefs,
        operator: OperatorType,
        op: F,
    ) -> Result<BalanceLog, LedgerError>
    where
        F: FnOnce(&mut Wallet) -> Result<(), &'static str>,
    {
        let mut wallet = lock_wallet(tx, user_id).await?;
        let before = wallet.balance();

        op(&mut wallet).map_err(LedgerError::from_wallet)?;

        store_wallet(tx, user_id, &wallet).await?;
        let log = insert_log(
            tx,
            user_id,
            log_type,
            signed_amount,
            before,
            wallet.balance(),
            refs,
            operator,
        )
        .await?;

        debug!(
            user_id,
            log_type = %log_type,
            amount = %format_cents(signed_amount),
            before = %format_cents(before),
            after = %format_cents(wallet.balance()),
            "Ledger mutation"
        );
        Ok(log)
    }

    // ============================================================
    // READS & VERIFICATION
    // ============================================================

    /// Current wallet state (no lock).
    pub async fn wallet(&self, user_id: i64) -> Result<Wallet, LedgerError> {
        let row = sqlx::query(
            "SELECT balance, frozen, total_in, total_out FROM user_balances_tb WHERE user_id = $1",
        )
        .bind(user_id)
        .fetch_optional(&self.pool)
        .await?;

        match row {
            Some(row) => row_to_wallet(&row),
            None => Ok(Wallet::default()),
        }
    }

    /// Reconciliation hook: sum the user's log rows and compare with the
    /// stored balance. Divergence raises a `balance_mismatch` alert.
    pub async fn verify_user(&self, user_id: i64) -> Result<bool, LedgerError> {
        let row = sqlx::query(
            r#"
            SELECT
                COALESCE((SELECT SUM(amount) FROM balance_logs_tb WHERE user_id = $1), 0) AS log_sum,
                COALESCE((SELECT balance FROM user_balances_tb WHERE user_id = $1), 0) AS balance
            "#,
        )
        .bind(user_id)
        .fetch_one(&self.pool)
        .await?;

        let log_sum = decimal_to_cents(row.get("log_sum"))?;
        let balance = decimal_to_cents(row.get("balance"))?;

        if log_sum != balance {
            warn!(
                user_id,
                log_sum = %format_cents(log_sum),
                balance = %format_cents(balance),
                "Ledger/balance divergence detected"
            );
            self.monitor
                .balance_mismatch(user_id, balance, log_sum)
                .await;
            return Ok(false);
        }
        Ok(true)
    }
}

// ============================================================
// ROW-LEVEL HELPERS
// ============================================================

/// Lock the user's balance row, creating it on first touch.
async fn lock_wallet(
    tx: &mut Transaction<'_, Postgres>,
    user_id: i64,
) -> Result<Wallet, LedgerError> {
    sqlx::query("INSERT INTO user_balances_tb (user_id) VALUES ($1) ON CONFLICT DO NOTHING")
        .bind(user_id)
        .execute(&mut **tx)
        .await?;

    let row = sqlx::query(
        r#"
        SELECT balance, frozen, total_in, total_out
        FROM user_balances_tb
        WHERE user_id = $1
        FOR UPDATE
        "#,
    )
    .bind(user_id)
    .fetch_one(&mut **tx)
    .await?;

    row_to_wallet(&row)
}

async fn store_wallet(
    tx: &mut Transaction<'_, Postgres>,
    user_id: i64,
    wallet: &Wallet,
) -> Result<(), LedgerError> {
    sqlx::query(
        r#"
        UPDATE user_balances_tb
        SET balance = $1, frozen = $2, total_in = $3, total_out = $4, updated_at = NOW()
        WHERE user_id = $5
        "#,
    )
    .bind(cents_to_decimal(wallet.balance()))
    .bind(cents_to_decimal(wallet.frozen()))
    .bind(cents_to_decimal(wallet.total_in()))
    .bind(cents_to_decimal(wallet.total_out()))
    .bind(user_id)
    .execute(&mut **tx)
    .await?;
    Ok(())
}

#[allow(clippy::too_many_arguments)]
async fn insert_log(
    tx: &mut Transaction<'_, Postgres>,
    user_id: i64,
    log_type: LogType,
    signed_amount: Cents,
    before: Cents,
    after: Cents,
    refs: LedgerRefs,
    operator: OperatorType,
) -> Result<BalanceLog, LedgerError> {
    let row = sqlx::query(
        r#"
        INSERT INTO balance_logs_tb
            (user_id, log_type, amount, before_balance, after_balance,
             order_no, recharge_no, operator_type, remark)
        VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9)
        RETURNING id, created_at
        "#,
    )
    .bind(user_id)
    .bind(log_type.id())
    .bind(cents_to_decimal(signed_amount))
    .bind(cents_to_decimal(before))
    .bind(cents_to_decimal(after))
    .bind(&refs.order_no)
    .bind(&refs.recharge_no)
    .bind(operator.id())
    .bind(&refs.remark)
    .fetch_one(&mut **tx)
    .await?;

    Ok(BalanceLog {
        id: row.get("id"),
        user_id,
        log_type,
        amount: signed_amount,
        before_balance: before,
        after_balance: after,
        order_no: refs.order_no,
        recharge_no: refs.recharge_no,
        operator,
        remark: refs.remark,
        created_at: row.get("created_at"),
    })
}

fn row_to_wallet(row: &sqlx::postgres::PgRow) -> Result<Wallet, LedgerError> {
    Ok(Wallet::from_row(
        decimal_to_cents(row.get("balance"))?,
        decimal_to_cents(row.get("frozen"))?,
        decimal_to_cents(row.get("total_in"))?,
        decimal_to_cents(row.get("total_out"))?,
    ))
}

//! Reconciler persistence layer.
//!
//! Settlement paths lock exactly one order/recharge row (`FOR UPDATE`)
//! and use conditional updates so a lost race degrades to "zero rows
//! affected", never to a double transition. Promo consumption is an
//! atomic conditional increment, not read-then-write.

use chrono::{DateTime, Utc};
use sqlx::{PgPool, Postgres, Row, Transaction};

use super::error::ReconcileError;
use super::types::{Order, OrderStatus, RechargeOrder, RechargeStatus};
use crate::money::{Cents, cents_to_decimal, decimal_to_cents};
use crate::promo::{PromoApplication, PromoType, RechargePromo, StackMode};

// ============================================================
// CREATION
// ============================================================

pub struct NewOrder {
    pub order_no: String,
    pub user_id: i64,
    pub product_id: i64,
    pub quantity: i32,
    pub original_price: Cents,
    pub discount_amount: Cents,
    pub price: Cents,
}

pub async fn insert_order(pool: &PgPool, order: &NewOrder) -> Result<i64, ReconcileError> {
    let id = sqlx::query_scalar::<_, i64>(
        r#"
        INSERT INTO orders_tb
            (order_no, user_id, product_id, quantity, original_price, discount_amount, price)
        VALUES ($1, $2, $3, $4, $5, $6, $7)
        RETURNING id
        "#,
    )
    .bind(&order.order_no)
    .bind(order.user_id)
    .bind(order.product_id)
    .bind(order.quantity)
    .bind(cents_to_decimal(order.original_price))
    .bind(cents_to_decimal(order.discount_amount))
    .bind(cents_to_decimal(order.price))
    .fetch_one(pool)
    .await?;
    Ok(id)
}

pub struct NewRecharge {
    pub recharge_no: String,
    pub user_id: i64,
    pub amount: Cents,
    pub pay_amount: Cents,
    pub promo_id: Option<i64>,
    pub promo_quote: Vec<PromoApplication>,
    pub expire_at: Option<DateTime<Utc>>,
}

pub async fn insert_recharge(pool: &PgPool, recharge: &NewRecharge) -> Result<i64, ReconcileError> {
    // Plain structs of integers; serialization cannot fail
    let quote = serde_json::to_string(&recharge.promo_quote).unwrap_or_else(|_| "[]".to_string());
    let id = sqlx::query_scalar::<_, i64>(
        r#"
        INSERT INTO recharge_orders_tb
            (recharge_no, user_id, amount, pay_amount, promo_id, promo_quote, expire_at)
        VALUES ($1, $2, $3, $4, $5, $6, $7)
        RETURNING id
        "#,
    )
    .bind(&recharge.recharge_no)
    .bind(recharge.user_id)
    .bind(cents_to_decimal(recharge.amount))
    .bind(cents_to_decimal(recharge.pay_amount))
    .bind(recharge.promo_id)
    .bind(quote)
    .bind(recharge.expire_at)
    .fetch_one(pool)
    .await?;
    Ok(id)
}

// ============================================================
// SETTLEMENT (row-locked)
// ============================================================

const ORDER_COLUMNS: &str = "id, order_no, user_id, product_id, quantity, original_price, \
     discount_amount, price, paid_amount, status, payment_method, payment_no, payment_time, \
     kami_code, created_at";

pub async fn lock_order(
    tx: &mut Transaction<'_, Postgres>,
    order_no: &str,
) -> Result<Option<Order>, ReconcileError> {
    let row = sqlx::query(&format!(
        "SELECT {} FROM orders_tb WHERE order_no = $1 FOR UPDATE",
        ORDER_COLUMNS
    ))
    .bind(order_no)
    .fetch_optional(&mut **tx)
    .await?;

    row.map(|r| row_to_order(&r)).transpose()
}

pub async fn get_order(pool: &PgPool, order_no: &str) -> Result<Option<Order>, ReconcileError> {
    let row = sqlx::query(&format!(
        "SELECT {} FROM orders_tb WHERE order_no = $1",
        ORDER_COLUMNS
    ))
    .bind(order_no)
    .fetch_optional(pool)
    .await?;

    row.map(|r| row_to_order(&r)).transpose()
}

/// Conditional pending->paid transition. `paid_amount` is written here
/// and never again.
pub async fn mark_order_paid(
    tx: &mut Transaction<'_, Postgres>,
    order_no: &str,
    paid_amount: Cents,
    payment_method: &str,
    payment_no: &str,
) -> Result<bool, ReconcileError> {
    let result = sqlx::query(
        r#"
        UPDATE orders_tb
        SET status = $1, paid_amount = $2, payment_method = $3, payment_no = $4,
            payment_time = NOW(), updated_at = NOW()
        WHERE order_no = $5 AND status = $6
        "#,
    )
    .bind(OrderStatus::Paid.id())
    .bind(cents_to_decimal(paid_amount))
    .bind(payment_method)
    .bind(payment_no)
    .bind(order_no)
    .bind(OrderStatus::Pending.id())
    .execute(&mut **tx)
    .await?;

    Ok(result.rows_affected() > 0)
}

/// paid -> completed once the kami code is issued.
pub async fn mark_order_completed(
    pool: &PgPool,
    order_no: &str,
    kami_code: &str,
) -> Result<bool, ReconcileError> {
    let result = sqlx::query(
        r#"
        UPDATE orders_tb
        SET status = $1, kami_code = $2, updated_at = NOW()
        WHERE order_no = $3 AND status = $4
        "#,
    )
    .bind(OrderStatus::Completed.id())
    .bind(kami_code)
    .bind(order_no)
    .bind(OrderStatus::Paid.id())
    .execute(pool)
    .await?;

    Ok(result.rows_affected() > 0)
}

/// Only a pending order can be cancelled.
pub async fn cancel_order(pool: &PgPool, order_no: &str) -> Result<bool, ReconcileError> {
    let result = sqlx::query(
        "UPDATE orders_tb SET status = $1, updated_at = NOW() WHERE order_no = $2 AND status = $3",
    )
    .bind(OrderStatus::Cancelled.id())
    .bind(order_no)
    .bind(OrderStatus::Pending.id())
    .execute(pool)
    .await?;

    Ok(result.rows_affected() > 0)
}

const RECHARGE_COLUMNS: &str = "id, recharge_no, user_id, amount, pay_amount, bonus_amount, \
     total_credit, promo_id, promo_quote, status, payment_method, payment_no, expire_at, created_at";

pub async fn lock_recharge(
    tx: &mut Transaction<'_, Postgres>,
    recharge_no: &str,
) -> Result<Option<RechargeOrder>, ReconcileError> {
    let row = sqlx::query(&format!(
        "SELECT {} FROM recharge_orders_tb WHERE recharge_no = $1 FOR UPDATE",
        RECHARGE_COLUMNS
    ))
    .bind(recharge_no)
    .fetch_optional(&mut **tx)
    .await?;

    row.map(|r| row_to_recharge(&r)).transpose()
}

pub async fn get_recharge(
    pool: &PgPool,
    recharge_no: &str,
) -> Result<Option<RechargeOrder>, ReconcileError> {
    let row = sqlx::query(&format!(
        "SELECT {} FROM recharge_orders_tb WHERE recharge_no = $1",
        RECHARGE_COLUMNS
    ))
    .bind(recharge_no)
    .fetch_optional(pool)
    .await?;

    row.map(|r| row_to_recharge(&r)).transpose()
}

pub async fn mark_recharge_paid(
    tx: &mut Transaction<'_, Postgres>,
    recharge_no: &str,
    payment_method: &str,
    payment_no: &str,
    bonus_amount: Cents,
    total_credit: Cents,
) -> Result<bool, ReconcileError> {
    let result = sqlx::query(
        r#"
        UPDATE recharge_orders_tb
        SET status = $1, payment_method = $2, payment_no = $3, bonus_amount = $4,
            total_credit = $5, payment_time = NOW(), updated_at = NOW()
        WHERE recharge_no = $6 AND status = $7
        "#,
    )
    .bind(RechargeStatus::Paid.id())
    .bind(payment_method)
    .bind(payment_no)
    .bind(cents_to_decimal(bonus_amount))
    .bind(cents_to_decimal(total_credit))
    .bind(recharge_no)
    .bind(RechargeStatus::Pending.id())
    .execute(&mut **tx)
    .await?;

    Ok(result.rows_affected() > 0)
}

pub async fn cancel_recharge(pool: &PgPool, recharge_no: &str) -> Result<bool, ReconcileError> {
    let result = sqlx::query(
        "UPDATE recharge_orders_tb SET status = $1, updated_at = NOW() WHERE recharge_no = $2 AND status = $3",
    )
    .bind(RechargeStatus::Cancelled.id())
    .bind(recharge_no)
    .bind(RechargeStatus::Pending.id())
    .execute(pool)
    .await?;

    Ok(result.rows_affected() > 0)
}

/// System timeout sweep: cancel pending recharges past their expiry.
pub async fn cancel_expired_recharges(pool: &PgPool) -> Result<u64, ReconcileError> {
    let result = sqlx::query(
        r#"
        UPDATE recharge_orders_tb
        SET status = $1, updated_at = NOW()
        WHERE status = $2 AND expire_at IS NOT NULL AND expire_at < NOW()
        "#,
    )
    .bind(RechargeStatus::Cancelled.id())
    .bind(RechargeStatus::Pending.id())
    .execute(pool)
    .await?;

    Ok(result.rows_affected())
}

// ============================================================
// PROMOS
// ============================================================

pub async fn active_promos(
    tx: &mut Transaction<'_, Postgres>,
    now: DateTime<Utc>,
) -> Result<Vec<RechargePromo>, ReconcileError> {
    let rows = sqlx::query(
        r#"
        SELECT id, name, promo_type, min_amount, max_amount, value, max_bonus, priority,
               stack_mode, per_user_limit, total_limit, used_count, start_at, end_at, enabled
        FROM recharge_promos_tb
        WHERE enabled = TRUE AND start_at <= $1 AND end_at >= $1
          AND (total_limit = 0 OR used_count < total_limit)
        ORDER BY id
        "#,
    )
    .bind(now)
    .fetch_all(&mut **tx)
    .await?;

    let mut promos = Vec::with_capacity(rows.len());
    for row in rows {
        promos.push(row_to_promo(&row)?);
    }
    Ok(promos)
}

pub async fn user_promo_uses(
    tx: &mut Transaction<'_, Postgres>,
    promo_id: i64,
    user_id: i64,
) -> Result<i64, ReconcileError> {
    let count = sqlx::query_scalar::<_, i64>(
        "SELECT COUNT(*) FROM promo_usages_tb WHERE promo_id = $1 AND user_id = $2",
    )
    .bind(promo_id)
    .bind(user_id)
    .fetch_one(&mut **tx)
    .await?;
    Ok(count)
}

/// Atomic conditional increment - "increment only if below the cap".
/// Returns false when the cap was hit by a concurrent settlement; the
/// caller drops the promo from the application.
pub async fn try_consume_promo(
    tx: &mut Transaction<'_, Postgres>,
    promo_id: i64,
) -> Result<bool, ReconcileError> {
    let result = sqlx::query(
        r#"
        UPDATE recharge_promos_tb
        SET used_count = used_count + 1
        WHERE id = $1 AND enabled = TRUE AND (total_limit = 0 OR used_count < total_limit)
        "#,
    )
    .bind(promo_id)
    .execute(&mut **tx)
    .await?;

    Ok(result.rows_affected() > 0)
}

/// Unconditional increment for a grant that already happened: a
/// creation-time discount is baked into `pay_amount`, so its usage is
/// charged at settlement even past the total cap.
pub async fn consume_promo(
    tx: &mut Transaction<'_, Postgres>,
    promo_id: i64,
) -> Result<(), ReconcileError> {
    sqlx::query("UPDATE recharge_promos_tb SET used_count = used_count + 1 WHERE id = $1")
        .bind(promo_id)
        .execute(&mut **tx)
        .await?;
    Ok(())
}

#[allow(clippy::too_many_arguments)]
pub async fn insert_promo_usage(
    tx: &mut Transaction<'_, Postgres>,
    promo_id: i64,
    user_id: i64,
    recharge_no: &str,
    amount: Cents,
    bonus_amount: Cents,
    discount_amount: Cents,
) -> Result<(), ReconcileError> {
    sqlx::query(
        r#"
        INSERT INTO promo_usages_tb
            (promo_id, user_id, recharge_no, amount, bonus_amount, discount_amount)
        VALUES ($1, $2, $3, $4, $5, $6)
        "#,
    )
    .bind(promo_id)
    .bind(user_id)
    .bind(recharge_no)
    .bind(cents_to_decimal(amount))
    .bind(cents_to_decimal(bonus_amount))
    .bind(cents_to_decimal(discount_amount))
    .execute(&mut **tx)
    .await?;
    Ok(())
}

// ============================================================
// ROW MAPPERS
// ============================================================

fn bad_row(what: &str) -> ReconcileError {
    ReconcileError::DatabaseError(sqlx::Error::Decode(
        format!("unexpected value in column {}", what).into(),
    ))
}

fn row_to_order(row: &sqlx::postgres::PgRow) -> Result<Order, ReconcileError> {
    let status = OrderStatus::from_id(row.get("status")).ok_or_else(|| bad_row("status"))?;
    let paid_amount: Option<rust_decimal::Decimal> = row.get("paid_amount");
    Ok(Order {
        id: row.get("id"),
        order_no: row.get("order_no"),
        user_id: row.get("user_id"),
        product_id: row.get("product_id"),
        quantity: row.get("quantity"),
        original_price: decimal_to_cents(row.get("original_price"))?,
        discount_amount: decimal_to_cents(row.get("discount_amount"))?,
        price: decimal_to_cents(row.get("price"))?,
        paid_amount: paid_amount.map(decimal_to_cents).transpose()?,
        status,
        payment_method: row.get("payment_method"),
        payment_no: row.get("payment_no"),
        payment_time: row.get("payment_time"),
        kami_code: row.get("kami_code"),
        created_at: row.get("created_at"),
    })
}

fn row_to_recharge(row: &sqlx::postgres::PgRow) -> Result<RechargeOrder, ReconcileError> {
    let status = RechargeStatus::from_id(row.get("status")).ok_or_else(|| bad_row("status"))?;
    let promo_quote: Option<String> = row.get("promo_quote");
    let promo_quote = promo_quote
        .as_deref()
        .map(serde_json::from_str)
        .transpose()
        .map_err(|_| bad_row("promo_quote"))?
        .unwrap_or_default();
    Ok(RechargeOrder {
        id: row.get("id"),
        recharge_no: row.get("recharge_no"),
        user_id: row.get("user_id"),
        amount: decimal_to_cents(row.get("amount"))?,
        pay_amount: decimal_to_cents(row.get("pay_amount"))?,
        bonus_amount: decimal_to_cents(row.get("bonus_amount"))?,
        total_credit: decimal_to_cents(row.get("total_credit"))?,
        promo_id: row.get("promo_id"),
        promo_quote,
        status,
        payment_method: row.get("payment_method"),
        payment_no: row.get("payment_no"),
        expire_at: row.get("expire_at"),
        created_at: row.get("created_at"),
    })
}

fn row_to_promo(row: &sqlx::postgres::PgRow) -> Result<RechargePromo, ReconcileError> {
    let promo_type =
        PromoType::from_id(row.get("promo_type")).ok_or_else(|| bad_row("promo_type"))?;
    let stack_mode =
        StackMode::from_id(row.get("stack_mode")).ok_or_else(|| bad_row("stack_mode"))?;
    Ok(RechargePromo {
        id: row.get("id"),
        name: row.get("name"),
        promo_type,
        min_amount: decimal_to_cents(row.get("min_amount"))?,
        max_amount: decimal_to_cents(row.get("max_amount"))?,
        value: decimal_to_cents(row.get("value"))?,
        max_bonus: decimal_to_cents(row.get("max_bonus"))?,
        priority: row.get("priority"),
        stack_mode,
        per_user_limit: row.get("per_user_limit"),
        total_limit: row.get("total_limit"),
        used_count: row.get("used_count"),
        start_at: row.get("start_at"),
        end_at: row.get("end_at"),
        enabled: row.get("enabled"),
    })
}

//! PostgreSQL pool setup and schema bootstrap.
//!
//! All monetary columns are NUMERIC(20,2) - never binary floating point.
//! `balance_logs_tb` and `promo_usages_tb` are append-only; corrections are
//! new rows.

use sqlx::PgPool;
use sqlx::postgres::PgPoolOptions;

pub const SCHEMA_SQL: &str = r#"
CREATE TABLE IF NOT EXISTS orders_tb (
    id              BIGSERIAL PRIMARY KEY,
    order_no        TEXT NOT NULL UNIQUE,
    user_id         BIGINT NOT NULL,
    product_id      BIGINT NOT NULL,
    quantity        INT NOT NULL DEFAULT 1,
    original_price  NUMERIC(20,2) NOT NULL,
    discount_amount NUMERIC(20,2) NOT NULL DEFAULT 0,
    price           NUMERIC(20,2) NOT NULL,
    paid_amount     NUMERIC(20,2),
    status          SMALLINT NOT NULL DEFAULT 0,
    payment_method  TEXT,
    payment_no      TEXT,
    payment_time    TIMESTAMPTZ,
    kami_code       TEXT,
    created_at      TIMESTAMPTZ NOT NULL DEFAULT NOW(),
    updated_at      TIMESTAMPTZ NOT NULL DEFAULT NOW()
);
CREATE INDEX IF NOT EXISTS idx_orders_user ON orders_tb (user_id);

CREATE TABLE IF NOT EXISTS recharge_orders_tb (
    id              BIGSERIAL PRIMARY KEY,
    recharge_no     TEXT NOT NULL UNIQUE,
    user_id         BIGINT NOT NULL,
    amount          NUMERIC(20,2) NOT NULL,
    pay_amount      NUMERIC(20,2) NOT NULL,
    bonus_amount    NUMERIC(20,2) NOT NULL DEFAULT 0,
    total_credit    NUMERIC(20,2) NOT NULL DEFAULT 0,
    promo_id        BIGINT,
    promo_quote     TEXT,
    status          SMALLINT NOT NULL DEFAULT 0,
    payment_method  TEXT,
    payment_no      TEXT,
    payment_time    TIMESTAMPTZ,
    expire_at       TIMESTAMPTZ,
    created_at      TIMESTAMPTZ NOT NULL DEFAULT NOW(),
    updated_at      TIMESTAMPTZ NOT NULL DEFAULT NOW()
);
CREATE INDEX IF NOT EXISTS idx_recharge_user ON recharge_orders_tb (user_id);
CREATE INDEX IF NOT EXISTS idx_recharge_expire ON recharge_orders_tb (status, expire_at);

CREATE TABLE IF NOT EXISTS user_balances_tb (
    user_id     BIGINT PRIMARY KEY,
    balance     NUMERIC(20,2) NOT NULL DEFAULT 0,
    frozen      NUMERIC(20,2) NOT NULL DEFAULT 0,
    total_in    NUMERIC(20,2) NOT NULL DEFAULT 0,
    total_out   NUMERIC(20,2) NOT NULL DEFAULT 0,
    updated_at  TIMESTAMPTZ NOT NULL DEFAULT NOW()
);

CREATE TABLE IF NOT EXISTS balance_logs_tb (
    id              BIGSERIAL PRIMARY KEY,
    user_id         BIGINT NOT NULL,
    log_type        SMALLINT NOT NULL,
    amount          NUMERIC(20,2) NOT NULL,
    before_balance  NUMERIC(20,2) NOT NULL,
    after_balance   NUMERIC(20,2) NOT NULL,
    order_no        TEXT,
    recharge_no     TEXT,
    operator_type   SMALLINT NOT NULL,
    remark          TEXT,
    created_at      TIMESTAMPTZ NOT NULL DEFAULT NOW()
);
CREATE INDEX IF NOT EXISTS idx_balance_logs_user ON balance_logs_tb (user_id, id);

CREATE TABLE IF NOT EXISTS recharge_promos_tb (
    id              BIGSERIAL PRIMARY KEY,
    name            TEXT NOT NULL,
    promo_type      SMALLINT NOT NULL,
    min_amount      NUMERIC(20,2) NOT NULL DEFAULT 0,
    max_amount      NUMERIC(20,2) NOT NULL DEFAULT 0,
    value           NUMERIC(20,2) NOT NULL,
    max_bonus       NUMERIC(20,2) NOT NULL DEFAULT 0,
    priority        INT NOT NULL DEFAULT 0,
    stack_mode      SMALLINT NOT NULL,
    per_user_limit  INT NOT NULL DEFAULT 0,
    total_limit     BIGINT NOT NULL DEFAULT 0,
    used_count      BIGINT NOT NULL DEFAULT 0,
    start_at        TIMESTAMPTZ NOT NULL,
    end_at          TIMESTAMPTZ NOT NULL,
    enabled         BOOLEAN NOT NULL DEFAULT TRUE,
    created_at      TIMESTAMPTZ NOT NULL DEFAULT NOW()
);

CREATE TABLE IF NOT EXISTS promo_usages_tb (
    id              BIGSERIAL PRIMARY KEY,
    promo_id        BIGINT NOT NULL,
    user_id         BIGINT NOT NULL,
    recharge_no     TEXT NOT NULL,
    amount          NUMERIC(20,2) NOT NULL,
    bonus_amount    NUMERIC(20,2) NOT NULL DEFAULT 0,
    discount_amount NUMERIC(20,2) NOT NULL DEFAULT 0,
    created_at      TIMESTAMPTZ NOT NULL DEFAULT NOW()
);
CREATE INDEX IF NOT EXISTS idx_promo_usages_promo_user ON promo_usages_tb (promo_id, user_id);

CREATE TABLE IF NOT EXISTS balance_alerts_tb (
    id          BIGSERIAL PRIMARY KEY,
    alert_type  TEXT NOT NULL,
    level       SMALLINT NOT NULL,
    user_id     BIGINT,
    amount      NUMERIC(20,2),
    related_id  TEXT,
    detail      TEXT,
    status      SMALLINT NOT NULL DEFAULT 0,
    created_at  TIMESTAMPTZ NOT NULL DEFAULT NOW(),
    updated_at  TIMESTAMPTZ NOT NULL DEFAULT NOW()
);
CREATE INDEX IF NOT EXISTS idx_alerts_status ON balance_alerts_tb (status, level);
"#;

pub async fn connect(url: &str) -> Result<PgPool, sqlx::Error> {
    PgPoolOptions::new().max_connections(16).connect(url).await
}

/// Create missing tables. Idempotent; run once at startup.
pub async fn ensure_schema(pool: &PgPool) -> Result<(), sqlx::Error> {
    sqlx::raw_sql(SCHEMA_SQL).execute(pool).await?;
    Ok(())
}

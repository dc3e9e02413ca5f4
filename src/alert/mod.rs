//! AlertMonitor - passive anomaly observer.
//!
//! Watches ledger mutations and reconciliation outcomes and records
//! `BalanceAlert` rows. Alerting never blocks the money path: insert
//! failures are logged and swallowed. Alerts are mutated only by an
//! administrator action (handle/ignore).

use chrono::{DateTime, Utc};
use sqlx::{PgPool, Row};
use std::fmt;
use tracing::{error, warn};

use crate::config::AlertConfig;
use crate::ledger::BalanceLog;
use crate::money::{Cents, cents_to_decimal, decimal_to_cents, format_cents};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(i16)]
pub enum AlertLevel {
    Info = 1,
    Warning = 2,
    Critical = 3,
}

impl AlertLevel {
    #[inline]
    pub fn id(&self) -> i16 {
        *self as i16
    }

    pub fn from_id(id: i16) -> Option<Self> {
        match id {
            1 => Some(AlertLevel::Info),
            2 => Some(AlertLevel::Warning),
            3 => Some(AlertLevel::Critical),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            AlertLevel::Info => "info",
            AlertLevel::Warning => "warning",
            AlertLevel::Critical => "critical",
        }
    }
}

impl fmt::Display for AlertLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(i16)]
pub enum AlertStatus {
    Pending = 0,
    Handled = 1,
    Ignored = 2,
}

impl AlertStatus {
    #[inline]
    pub fn id(&self) -> i16 {
        *self as i16
    }

    pub fn from_id(id: i16) -> Option<Self> {
        match id {
            0 => Some(AlertStatus::Pending),
            1 => Some(AlertStatus::Handled),
            2 => Some(AlertStatus::Ignored),
            _ => None,
        }
    }
}

/// Stable alert type tags (stored as text, queried by dashboards).
pub mod alert_type {
    pub const LARGE_AMOUNT: &str = "large_amount";
    pub const NEGATIVE_BALANCE: &str = "negative_balance";
    pub const AMOUNT_MISMATCH: &str = "amount_mismatch";
    pub const ADMIN_ADJUST: &str = "admin_adjust";
    pub const BALANCE_MISMATCH: &str = "balance_mismatch";
    pub const FULFILLMENT_FAILED: &str = "fulfillment_failed";
}

#[derive(Debug, Clone)]
pub struct BalanceAlert {
    pub id: i64,
    pub alert_type: String,
    pub level: AlertLevel,
    pub user_id: Option<i64>,
    pub amount: Option<Cents>,
    pub related_id: Option<String>,
    pub detail: Option<String>,
    pub status: AlertStatus,
    pub created_at: DateTime<Utc>,
}

pub struct AlertMonitor {
    pool: PgPool,
    large_amount: Cents,
    admin_adjust: Cents,
}

impl AlertMonitor {
    pub fn new(pool: PgPool, config: &AlertConfig) -> Self {
        Self {
            pool,
            large_amount: decimal_to_cents(config.large_amount).unwrap_or(i64::MAX),
            admin_adjust: decimal_to_cents(config.admin_adjust).unwrap_or(i64::MAX),
        }
    }

    // ============================================================
    // OBSERVERS (fire-and-forget, never propagate errors)
    // ============================================================

    /// Threshold checks on every committed ledger mutation.
    pub async fn observe_log(&self, log: &BalanceLog) {
        if log.amount.abs() >= self.large_amount {
            self.raise(
                alert_type::LARGE_AMOUNT,
                AlertLevel::Warning,
                Some(log.user_id),
                Some(log.amount),
                None,
                format!("{} of {}", log.log_type, format_cents(log.amount)),
            )
            .await;
        }
        if log.after_balance < 0 {
            self.raise(
                alert_type::NEGATIVE_BALANCE,
                AlertLevel::Critical,
                Some(log.user_id),
                Some(log.after_balance),
                None,
                format!("balance {} after {}", format_cents(log.after_balance), log.log_type),
            )
            .await;
        }
    }

    /// Large admin adjustments get their own alert type for review.
    pub async fn observe_admin_adjust(&self, log: &BalanceLog) {
        if log.amount.abs() >= self.admin_adjust {
            self.raise(
                alert_type::ADMIN_ADJUST,
                AlertLevel::Warning,
                Some(log.user_id),
                Some(log.amount),
                None,
                log.remark.clone().unwrap_or_default(),
            )
            .await;
        }
    }

    /// Payment amount differs from the order's frozen price beyond
    /// tolerance. The order stays pending; an administrator investigates.
    pub async fn amount_mismatch(&self, order_no: &str, expected: Cents, got: Cents) {
        self.raise(
            alert_type::AMOUNT_MISMATCH,
            AlertLevel::Critical,
            None,
            Some(got),
            Some(order_no.to_string()),
            format!(
                "expected {}, gateway reported {}",
                format_cents(expected),
                format_cents(got)
            ),
        )
        .await;
    }

    /// Stored balance disagrees with the log sum.
    pub async fn balance_mismatch(&self, user_id: i64, balance: Cents, log_sum: Cents) {
        self.raise(
            alert_type::BALANCE_MISMATCH,
            AlertLevel::Critical,
            Some(user_id),
            Some(balance),
            None,
            format!(
                "stored {} vs log sum {}",
                format_cents(balance),
                format_cents(log_sum)
            ),
        )
        .await;
    }

    /// Kami issuance failed after settlement; payment state is kept.
    pub async fn fulfillment_failed(&self, order_no: &str, reason: &str) {
        self.raise(
            alert_type::FULFILLMENT_FAILED,
            AlertLevel::Warning,
            None,
            None,
            Some(order_no.to_string()),
            reason.to_string(),
        )
        .await;
    }

    async fn raise(
        &self,
        alert_type: &str,
        level: AlertLevel,
        user_id: Option<i64>,
        amount: Option<Cents>,
        related_id: Option<String>,
        detail: String,
    ) {
        warn!(
            alert_type,
            level = %level,
            user_id,
            related_id = related_id.as_deref().unwrap_or("-"),
            detail = %detail,
            "Balance alert raised"
        );

        let result = sqlx::query(
            r#"
            INSERT INTO balance_alerts_tb (alert_type, level, user_id, amount, related_id, detail)
            VALUES ($1, $2, $3, $4, $5, $6)
            "#,
        )
        .bind(alert_type)
        .bind(level.id())
        .bind(user_id)
        .bind(amount.map(cents_to_decimal))
        .bind(&related_id)
        .bind(&detail)
        .execute(&self.pool)
        .await;

        if let Err(e) = result {
            // Alerting must never block the money path
            error!(alert_type, error = %e, "Failed to persist balance alert");
        }
    }

    // ============================================================
    // ADMIN RESOLUTION
    // ============================================================

    pub async fn handle_alert(&self, alert_id: i64, admin_id: i64) -> Result<bool, sqlx::Error> {
        self.resolve(alert_id, admin_id, AlertStatus::Handled).await
    }

    pub async fn ignore_alert(&self, alert_id: i64, admin_id: i64) -> Result<bool, sqlx::Error> {
        self.resolve(alert_id, admin_id, AlertStatus::Ignored).await
    }

    async fn resolve(
        &self,
        alert_id: i64,
        admin_id: i64,
        status: AlertStatus,
    ) -> Result<bool, sqlx::Error> {
        let result = sqlx::query(
            "UPDATE balance_alerts_tb SET status = $1, updated_at = NOW() WHERE id = $2 AND status = 0",
        )
        .bind(status.id())
        .bind(alert_id)
        .execute(&self.pool)
        .await?;

        if result.rows_affected() > 0 {
            crate::audit::log_admin_action(admin_id, "resolve_alert", &format!("alert={} status={}", alert_id, status.id()));
        }
        Ok(result.rows_affected() > 0)
    }

    pub async fn pending_alerts(&self, limit: i64) -> Result<Vec<BalanceAlert>, sqlx::Error> {
        let rows = sqlx::query(
            r#"
            SELECT id, alert_type, level, user_id, amount, related_id, detail, status, created_at
            FROM balance_alerts_tb
            WHERE status = 0
            ORDER BY level DESC, id ASC
            LIMIT $1
            "#,
        )
        .bind(limit)
        .fetch_all(&self.pool)
        .await?;

        let mut alerts = Vec::with_capacity(rows.len());
        for row in rows {
            let amount: Option<rust_decimal::Decimal> = row.get("amount");
            alerts.push(BalanceAlert {
                id: row.get("id"),
                alert_type: row.get("alert_type"),
                level: AlertLevel::from_id(row.get("level")).unwrap_or(AlertLevel::Info),
                user_id: row.get("user_id"),
                amount: amount.and_then(|d| decimal_to_cents(d).ok()),
                related_id: row.get("related_id"),
                detail: row.get("detail"),
                status: AlertStatus::from_id(row.get("status")).unwrap_or(AlertStatus::Pending),
                created_at: row.get("created_at"),
            });
        }
        Ok(alerts)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_level_roundtrip() {
        assert_eq!(AlertLevel::from_id(3), Some(AlertLevel::Critical));
        assert_eq!(AlertLevel::from_id(0), None);
        assert_eq!(AlertLevel::Warning.as_str(), "warning");
    }

    #[test]
    fn test_status_roundtrip() {
        assert_eq!(AlertStatus::from_id(0), Some(AlertStatus::Pending));
        assert_eq!(AlertStatus::from_id(2), Some(AlertStatus::Ignored));
        assert_eq!(AlertStatus::from_id(5), None);
    }
}

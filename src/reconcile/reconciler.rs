//! OrderReconciler - exactly-once settlement of verified payment events.
//!
//! Every settlement path locks the order row first, so concurrent
//! duplicate deliveries serialize: the first transitions pending->paid,
//! the rest observe a non-pending row and report `AlreadyProcessed`.
//! "Paid" and its money effects (wallet credit, promo consumption)
//! commit in one transaction; kami issuance runs after commit and never
//! rolls a payment back.

use chrono::{DateTime, Duration, Utc};
use sqlx::{PgPool, Postgres, Transaction};
use std::sync::Arc;
use tracing::{info, warn};

use super::db;
use super::error::ReconcileError;
use super::types::{
    Applied, Order, OrderStatus, RechargeOrder, is_recharge_no, new_order_no, new_recharge_no,
};
use crate::alert::AlertMonitor;
use crate::fulfillment::KamiIssuer;
use crate::ledger::{BalanceLedger, LedgerRefs, LogType, OperatorType};
use crate::money::{self, Cents, format_cents};
use crate::normalize::{EventStatus, PaymentEvent};
use crate::promo::{self, PromoApplication, PromoOutcome, RechargePromo};

pub struct OrderReconciler {
    pool: PgPool,
    ledger: Arc<BalanceLedger>,
    monitor: Arc<AlertMonitor>,
    issuer: Arc<dyn KamiIssuer>,
    recharge_expiry: Duration,
}

impl OrderReconciler {
    pub fn new(
        pool: PgPool,
        ledger: Arc<BalanceLedger>,
        monitor: Arc<AlertMonitor>,
        issuer: Arc<dyn KamiIssuer>,
        recharge_expire_minutes: i64,
    ) -> Self {
        Self {
            pool,
            ledger,
            monitor,
            issuer,
            recharge_expiry: Duration::minutes(recharge_expire_minutes),
        }
    }

    // ============================================================
    // CREATION
    // ============================================================

    /// Create a pending product order. `price` is frozen here; the
    /// gateway amount is later checked against it, nothing else.
    pub async fn create_order(
        &self,
        user_id: i64,
        product_id: i64,
        quantity: i32,
        unit_price: Cents,
        discount_amount: Cents,
    ) -> Result<Order, ReconcileError> {
        if quantity <= 0 {
            return Err(ReconcileError::InvalidAmount("quantity must be positive".into()));
        }
        if unit_price <= 0 {
            return Err(ReconcileError::InvalidAmount("unit price must be positive".into()));
        }
        if discount_amount < 0 {
            return Err(ReconcileError::InvalidAmount("discount cannot be negative".into()));
        }

        let original_price = unit_price
            .checked_mul(quantity as i64)
            .ok_or_else(|| ReconcileError::InvalidAmount("price overflow".into()))?;
        let price = original_price - discount_amount;
        if price <= 0 {
            return Err(ReconcileError::InvalidAmount(
                "discount exceeds order total".into(),
            ));
        }

        let order_no = new_order_no();
        db::insert_order(
            &self.pool,
            &db::NewOrder {
                order_no: order_no.clone(),
                user_id,
                product_id,
                quantity,
                original_price,
                discount_amount,
                price,
            },
        )
        .await?;

        info!(
            order_no = %order_no,
            user_id,
            product_id,
            price = %format_cents(price),
            "Order created"
        );
        db::get_order(&self.pool, &order_no)
            .await?
            .ok_or(ReconcileError::OrderNotFound(order_no))
    }

    /// Create a pending recharge order. The promo quote runs here to
    /// freeze `pay_amount` (amount minus discounts); bonuses are
    /// recomputed authoritatively at settlement.
    pub async fn create_recharge(
        &self,
        user_id: i64,
        amount: Cents,
    ) -> Result<RechargeOrder, ReconcileError> {
        if amount <= 0 {
            return Err(ReconcileError::InvalidAmount(
                "recharge amount must be positive".into(),
            ));
        }

        let now = Utc::now();
        let mut tx = self.pool.begin().await?;
        let promos = self.eligible_promos(&mut tx, user_id, now).await?;
        tx.commit().await?;

        let outcome = promo::select_and_apply(amount, now, &promos);
        let pay_amount = amount - outcome.discount;
        // Record the biggest single contributor for display; usage rows
        // written at settlement are the authoritative record.
        let promo_id = outcome
            .applied
            .iter()
            .max_by_key(|a| (a.bonus + a.discount, -a.promo_id))
            .map(|a| a.promo_id);

        let recharge_no = new_recharge_no();
        db::insert_recharge(
            &self.pool,
            &db::NewRecharge {
                recharge_no: recharge_no.clone(),
                user_id,
                amount,
                pay_amount,
                promo_id,
                promo_quote: outcome.applied.clone(),
                expire_at: Some(now + self.recharge_expiry),
            },
        )
        .await?;

        info!(
            recharge_no = %recharge_no,
            user_id,
            amount = %format_cents(amount),
            pay_amount = %format_cents(pay_amount),
            "Recharge order created"
        );
        db::get_recharge(&self.pool, &recharge_no)
            .await?
            .ok_or(ReconcileError::OrderNotFound(recharge_no))
    }

    // ============================================================
    // SETTLEMENT
    // ============================================================

    /// Apply a verified gateway event to whichever order it references.
    pub async fn apply(&self, event: &PaymentEvent) -> Result<Applied, ReconcileError> {
        if event.status == EventStatus::Failed {
            info!(
                order_no = %event.order_no,
                provider = %event.provider,
                tx_id = %event.provider_tx_id,
                "Gateway reported failure, order left pending"
            );
            return Ok(Applied::Ignored);
        }

        if is_recharge_no(&event.order_no) {
            self.apply_recharge_payment(event).await
        } else {
            self.apply_payment(event).await
        }
    }

    /// Settle a product order: pending -> paid, then issue the kami.
    async fn apply_payment(&self, event: &PaymentEvent) -> Result<Applied, ReconcileError> {
        let mut tx = self.pool.begin().await?;

        let order = db::lock_order(&mut tx, &event.order_no)
            .await?
            .ok_or_else(|| ReconcileError::OrderNotFound(event.order_no.clone()))?;

        if order.status != OrderStatus::Pending {
            tx.rollback().await?;
            info!(
                order_no = %event.order_no,
                status = %order.status,
                "Duplicate payment event, already settled"
            );
            return Ok(Applied::AlreadyProcessed);
        }

        if !money::amounts_match(order.price, event.paid_amount) {
            tx.rollback().await?;
            self.monitor
                .amount_mismatch(&event.order_no, order.price, event.paid_amount)
                .await;
            return Err(ReconcileError::AmountMismatch {
                order_no: event.order_no.clone(),
                expected: order.price,
                got: event.paid_amount,
            });
        }

        let updated = db::mark_order_paid(
            &mut tx,
            &event.order_no,
            event.paid_amount,
            event.provider.as_str(),
            &event.provider_tx_id,
        )
        .await?;
        if !updated {
            tx.rollback().await?;
            return Ok(Applied::AlreadyProcessed);
        }
        tx.commit().await?;

        info!(
            order_no = %event.order_no,
            provider = %event.provider,
            paid = %format_cents(event.paid_amount),
            "Order settled"
        );

        self.fulfill(&order).await;

        Ok(Applied::Settled {
            order_no: event.order_no.clone(),
            paid_amount: event.paid_amount,
        })
    }

    /// Settle a recharge: pending -> paid, promo consumption and wallet
    /// credit in the same transaction.
    async fn apply_recharge_payment(
        &self,
        event: &PaymentEvent,
    ) -> Result<Applied, ReconcileError> {
        let now = Utc::now();
        let mut tx = self.pool.begin().await?;

        let recharge = db::lock_recharge(&mut tx, &event.order_no)
            .await?
            .ok_or_else(|| ReconcileError::OrderNotFound(event.order_no.clone()))?;

        if recharge.status != super::types::RechargeStatus::Pending {
            tx.rollback().await?;
            info!(
                recharge_no = %event.order_no,
                status = %recharge.status,
                "Duplicate recharge event, already settled"
            );
            return Ok(Applied::AlreadyProcessed);
        }

        // The gateway must have collected the pay_amount frozen at
        // creation, not the nominal recharge amount.
        if !money::amounts_match(recharge.pay_amount, event.paid_amount) {
            tx.rollback().await?;
            self.monitor
                .amount_mismatch(&event.order_no, recharge.pay_amount, event.paid_amount)
                .await;
            return Err(ReconcileError::AmountMismatch {
                order_no: event.order_no.clone(),
                expected: recharge.pay_amount,
                got: event.paid_amount,
            });
        }

        // Serialize with any concurrent settlement for the same user
        // before counting promo usage, or two recharges could each pass
        // the per-user limit check and both redeem.
        self.ledger.lock_user_tx(&mut tx, recharge.user_id).await?;

        let outcome = {
            let promos = self.eligible_promos(&mut tx, recharge.user_id, now).await?;
            promo::select_and_apply(recharge.amount, now, &promos)
        };
        let applications = delivered_applications(&outcome, &recharge.promo_quote);
        let bonus = self
            .consume_promos(&mut tx, &recharge, &applications)
            .await?;

        let total_credit = recharge.amount + bonus;
        let updated = db::mark_recharge_paid(
            &mut tx,
            &event.order_no,
            event.provider.as_str(),
            &event.provider_tx_id,
            bonus,
            total_credit,
        )
        .await?;
        if !updated {
            tx.rollback().await?;
            return Ok(Applied::AlreadyProcessed);
        }

        let log = self
            .ledger
            .credit_tx(
                &mut tx,
                recharge.user_id,
                total_credit,
                LogType::Recharge,
                LedgerRefs::recharge(&event.order_no),
                OperatorType::System,
            )
            .await?;
        tx.commit().await?;
        self.monitor.observe_log(&log).await;

        info!(
            recharge_no = %event.order_no,
            user_id = recharge.user_id,
            provider = %event.provider,
            paid = %format_cents(event.paid_amount),
            bonus = %format_cents(bonus),
            credited = %format_cents(total_credit),
            "Recharge settled and credited"
        );

        Ok(Applied::Settled {
            order_no: event.order_no.clone(),
            paid_amount: event.paid_amount,
        })
    }

    /// Pay a product order from wallet balance: debit and pending->paid
    /// in one transaction, then issue.
    pub async fn pay_order_with_balance(
        &self,
        order_no: &str,
        user_id: i64,
    ) -> Result<Applied, ReconcileError> {
        let mut tx = self.pool.begin().await?;

        let order = db::lock_order(&mut tx, order_no)
            .await?
            .filter(|o| o.user_id == user_id)
            .ok_or_else(|| ReconcileError::OrderNotFound(order_no.to_string()))?;

        if order.status != OrderStatus::Pending {
            tx.rollback().await?;
            return Ok(Applied::AlreadyProcessed);
        }

        let log = self
            .ledger
            .debit_tx(
                &mut tx,
                user_id,
                order.price,
                LogType::Consume,
                LedgerRefs::order(order_no),
                OperatorType::User,
            )
            .await?;

        let updated = db::mark_order_paid(
            &mut tx,
            order_no,
            order.price,
            "balance",
            &format!("BAL{}", log.id),
        )
        .await?;
        if !updated {
            tx.rollback().await?;
            return Ok(Applied::AlreadyProcessed);
        }
        tx.commit().await?;
        self.monitor.observe_log(&log).await;

        info!(
            order_no = %order_no,
            user_id,
            paid = %format_cents(order.price),
            "Order paid from balance"
        );

        self.fulfill(&order).await;

        Ok(Applied::Settled {
            order_no: order_no.to_string(),
            paid_amount: order.price,
        })
    }

    // ============================================================
    // CANCELLATION & EXPIRY
    // ============================================================

    /// User-initiated cancel; only a pending order can be cancelled.
    pub async fn cancel_order(&self, order_no: &str, user_id: i64) -> Result<(), ReconcileError> {
        let order = db::get_order(&self.pool, order_no)
            .await?
            .filter(|o| o.user_id == user_id)
            .ok_or_else(|| ReconcileError::OrderNotFound(order_no.to_string()))?;

        if !db::cancel_order(&self.pool, order_no).await? {
            return Err(ReconcileError::NotCancellable(order_no.to_string()));
        }
        info!(order_no = %order_no, user_id = order.user_id, "Order cancelled");
        Ok(())
    }

    pub async fn cancel_recharge(
        &self,
        recharge_no: &str,
        user_id: i64,
    ) -> Result<(), ReconcileError> {
        db::get_recharge(&self.pool, recharge_no)
            .await?
            .filter(|r| r.user_id == user_id)
            .ok_or_else(|| ReconcileError::OrderNotFound(recharge_no.to_string()))?;

        if !db::cancel_recharge(&self.pool, recharge_no).await? {
            return Err(ReconcileError::NotCancellable(recharge_no.to_string()));
        }
        info!(recharge_no = %recharge_no, user_id, "Recharge cancelled");
        Ok(())
    }

    /// Background sweep: cancel pending recharges past their expiry.
    pub async fn sweep_expired_recharges(&self) -> Result<u64, ReconcileError> {
        let swept = db::cancel_expired_recharges(&self.pool).await?;
        if swept > 0 {
            info!(swept, "Expired recharge orders cancelled");
        }
        Ok(swept)
    }

    // ============================================================
    // READS
    // ============================================================

    pub async fn order(&self, order_no: &str) -> Result<Option<Order>, ReconcileError> {
        db::get_order(&self.pool, order_no).await
    }

    pub async fn recharge(
        &self,
        recharge_no: &str,
    ) -> Result<Option<RechargeOrder>, ReconcileError> {
        db::get_recharge(&self.pool, recharge_no).await
    }

    /// Quote the promo outcome for a hypothetical recharge amount.
    pub async fn quote_promos(
        &self,
        user_id: i64,
        amount: Cents,
    ) -> Result<PromoOutcome, ReconcileError> {
        let now = Utc::now();
        let mut tx = self.pool.begin().await?;
        let promos = self.eligible_promos(&mut tx, user_id, now).await?;
        tx.commit().await?;
        Ok(promo::select_and_apply(amount, now, &promos))
    }

    // ============================================================
    // INTERNALS
    // ============================================================

    /// Active promos minus the ones this user has already used up.
    async fn eligible_promos(
        &self,
        tx: &mut Transaction<'_, Postgres>,
        user_id: i64,
        now: DateTime<Utc>,
    ) -> Result<Vec<RechargePromo>, ReconcileError> {
        let mut promos = db::active_promos(tx, now).await?;
        let mut kept = Vec::with_capacity(promos.len());
        for promo in promos.drain(..) {
            if promo.per_user_limit > 0 {
                let uses = db::user_promo_uses(tx, promo.id, user_id).await?;
                if uses >= promo.per_user_limit as i64 {
                    continue;
                }
            }
            kept.push(promo);
        }
        Ok(kept)
    }

    /// Consume the delivered promos' quota and record usage rows.
    ///
    /// Bonus-only applications are dropped when the total cap was
    /// exhausted by a concurrent settlement. Discount-bearing ones are
    /// charged unconditionally: their money already left with
    /// `pay_amount` at creation, so the usage row must exist.
    async fn consume_promos(
        &self,
        tx: &mut Transaction<'_, Postgres>,
        recharge: &RechargeOrder,
        applications: &[PromoApplication],
    ) -> Result<Cents, ReconcileError> {
        let mut bonus: Cents = 0;
        for application in applications {
            if application.discount > 0 {
                db::consume_promo(tx, application.promo_id).await?;
            } else if !db::try_consume_promo(tx, application.promo_id).await? {
                warn!(
                    recharge_no = %recharge.recharge_no,
                    promo_id = application.promo_id,
                    "Promo cap reached during settlement, dropped"
                );
                continue;
            }
            db::insert_promo_usage(
                tx,
                application.promo_id,
                recharge.user_id,
                &recharge.recharge_no,
                recharge.amount,
                application.bonus,
                application.discount,
            )
            .await?;
            bonus += application.bonus;
        }
        Ok(bonus)
    }

    /// Post-commit kami issuance. Never fails the settlement: an error
    /// leaves the order `paid` and raises an alert for retry.
    async fn fulfill(&self, order: &Order) {
        match self.issuer.issue(order).await {
            Ok(kami_code) => match db::mark_order_completed(&self.pool, &order.order_no, &kami_code)
                .await
            {
                Ok(true) => {
                    info!(order_no = %order.order_no, "Order completed, kami issued");
                }
                Ok(false) => {
                    warn!(order_no = %order.order_no, "Order left paid state before completion");
                }
                Err(e) => {
                    warn!(order_no = %order.order_no, error = %e, "Failed to record kami issuance");
                    self.monitor
                        .fulfillment_failed(&order.order_no, &e.to_string())
                        .await;
                }
            },
            Err(e) => {
                warn!(order_no = %order.order_no, error = %e, "Kami issuance failed");
                self.monitor
                    .fulfillment_failed(&order.order_no, &e.to_string())
                    .await;
            }
        }
    }
}

/// Merge the settlement-time recomputation with the quote frozen at
/// creation. Bonuses come from the recomputation (what is granted now);
/// discounts come from the quote (what was already baked into
/// `pay_amount`). A quoted discount promo that dropped out of the
/// eligible set since creation is still charged; a quoted bonus-only
/// promo is not resurrected - it never moved any money.
fn delivered_applications(
    settled: &PromoOutcome,
    quoted: &[PromoApplication],
) -> Vec<PromoApplication> {
    let mut merged: Vec<PromoApplication> = settled
        .applied
        .iter()
        .map(|app| PromoApplication {
            promo_id: app.promo_id,
            bonus: app.bonus,
            discount: quoted
                .iter()
                .find(|q| q.promo_id == app.promo_id)
                .map_or(0, |q| q.discount),
        })
        .collect();

    for quote in quoted {
        if quote.discount > 0 && !merged.iter().any(|m| m.promo_id == quote.promo_id) {
            merged.push(PromoApplication {
                promo_id: quote.promo_id,
                bonus: 0,
                discount: quote.discount,
            });
        }
    }
    merged
}

#[cfg(test)]
mod tests {
    use super::*;

    fn app(promo_id: i64, bonus: Cents, discount: Cents) -> PromoApplication {
        PromoApplication {
            promo_id,
            bonus,
            discount,
        }
    }

    #[test]
    fn test_delivered_bonus_from_settlement_discount_from_quote() {
        // The promo's value changed between quote and settlement: the
        // bonus follows the settlement, the discount stays frozen
        let settled = PromoOutcome {
            bonus: 700,
            discount: 250,
            applied: vec![app(1, 700, 250)],
        };
        let quoted = vec![app(1, 500, 300)];

        let delivered = delivered_applications(&settled, &quoted);
        assert_eq!(delivered, vec![app(1, 700, 300)]);
    }

    #[test]
    fn test_quoted_discount_charged_after_promo_expired() {
        // Discount promo 2 was active at creation and shaped pay_amount,
        // but dropped out of the eligible set before settlement
        let settled = PromoOutcome {
            bonus: 500,
            discount: 0,
            applied: vec![app(1, 500, 0)],
        };
        let quoted = vec![app(1, 500, 0), app(2, 0, 1000)];

        let delivered = delivered_applications(&settled, &quoted);
        assert_eq!(delivered, vec![app(1, 500, 0), app(2, 0, 1000)]);
    }

    #[test]
    fn test_quoted_bonus_only_promo_not_resurrected() {
        // A bonus promo that expired between quote and settlement moved
        // no money, so it yields no usage
        let settled = PromoOutcome::default();
        let quoted = vec![app(3, 800, 0)];

        assert!(delivered_applications(&settled, &quoted).is_empty());
    }

    #[test]
    fn test_settlement_only_promo_has_no_frozen_discount() {
        // Promo appeared after creation: its bonus applies, and it
        // cannot claim a discount that was never granted
        let settled = PromoOutcome {
            bonus: 300,
            discount: 400,
            applied: vec![app(4, 300, 400)],
        };

        let delivered = delivered_applications(&settled, &[]);
        assert_eq!(delivered, vec![app(4, 300, 0)]);
    }
}

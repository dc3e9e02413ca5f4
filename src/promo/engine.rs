//! PromoEngine - deterministic promotion stacking.
//!
//! Pure computation, no persistence. The same function serves the
//! pre-payment quote and the authoritative computation at settlement:
//! identical inputs always produce identical output. The caller is
//! responsible for removing promos whose per-user limit the user has
//! already exhausted, and for consuming `used_count` transactionally.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::types::{PromoType, RechargePromo, StackMode};
use crate::money::Cents;

/// One promo's contribution to a recharge. Serializable so the quote
/// frozen at recharge creation can be stored alongside the order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PromoApplication {
    pub promo_id: i64,
    pub bonus: Cents,
    pub discount: Cents,
}

/// Result of promotion selection for one recharge amount.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PromoOutcome {
    pub bonus: Cents,
    pub discount: Cents,
    pub applied: Vec<PromoApplication>,
}

impl PromoOutcome {
    pub fn applied_ids(&self) -> Vec<i64> {
        self.applied.iter().map(|a| a.promo_id).collect()
    }
}

/// Raw bonus/discount a single promo yields for `amount`, before any
/// payable clamping.
fn promo_value(promo: &RechargePromo, amount: Cents) -> (Cents, Cents) {
    match promo.promo_type {
        PromoType::Discount => (0, promo.value.max(0)),
        PromoType::Bonus => (promo.value.max(0), 0),
        PromoType::Percent => {
            // value carries two implied decimals: 500 = 5%
            let mut bonus = amount.saturating_mul(promo.value.max(0)) / 10_000;
            if promo.max_bonus > 0 {
                bonus = bonus.min(promo.max_bonus);
            }
            (bonus, 0)
        }
    }
}

/// Value a promo actually delivers for `amount`: nominal bonus plus the
/// discount counted at no more than the amount payable. Ranking by this
/// instead of the raw `value` keeps an oversized discount from beating
/// a bonus that pays out more.
fn delivered_value(promo: &RechargePromo, amount: Cents) -> Cents {
    let (bonus, discount) = promo_value(promo, amount);
    bonus + discount.min(amount)
}

/// Filter-only quote helper: every promo currently applicable to `amount`.
pub fn applicable_promos<'a>(
    amount: Cents,
    now: DateTime<Utc>,
    promos: &'a [RechargePromo],
) -> Vec<&'a RechargePromo> {
    promos.iter().filter(|p| p.is_eligible(amount, now)).collect()
}

/// Select and apply promotions for a recharge of `amount` cents.
///
/// Stacking rules:
/// - every eligible `all`-mode promo applies (in id order);
/// - plus at most one non-`all` promo: the `best` pool resolves by
///   maximum delivered bonus+discount (ties: priority desc, then lowest
///   id), the `first` pool by highest priority (ties: lowest id); when
///   both pools produce a candidate the greater delivered value wins,
///   same ties;
/// - accumulated discount never exceeds the amount payable.
pub fn select_and_apply(
    amount: Cents,
    now: DateTime<Utc>,
    promos: &[RechargePromo],
) -> PromoOutcome {
    let eligible = applicable_promos(amount, now, promos);

    let best_winner = eligible
        .iter()
        .filter(|p| p.stack_mode == StackMode::Best)
        .max_by_key(|p| (delivered_value(p, amount), p.priority, -p.id))
        .copied();

    let first_winner = eligible
        .iter()
        .filter(|p| p.stack_mode == StackMode::First)
        .max_by_key(|p| (p.priority, -p.id))
        .copied();

    let single = match (best_winner, first_winner) {
        (Some(b), Some(f)) => {
            let bv = delivered_value(b, amount);
            let fv = delivered_value(f, amount);
            if (bv, b.priority, -b.id) >= (fv, f.priority, -f.id) {
                Some(b)
            } else {
                Some(f)
            }
        }
        (Some(b), None) => Some(b),
        (None, Some(f)) => Some(f),
        (None, None) => None,
    };

    let mut stacked: Vec<&RechargePromo> = eligible
        .iter()
        .filter(|p| p.stack_mode == StackMode::All)
        .copied()
        .collect();
    stacked.sort_by_key(|p| p.id);
    if let Some(p) = single {
        stacked.push(p);
    }

    let mut outcome = PromoOutcome::default();
    for promo in stacked {
        let (bonus, mut discount) = promo_value(promo, amount);
        // Discounts cannot push the payable below zero
        let payable_left = amount - outcome.discount;
        discount = discount.min(payable_left.max(0));
        if bonus == 0 && discount == 0 {
            continue;
        }
        outcome.bonus += bonus;
        outcome.discount += discount;
        outcome.applied.push(PromoApplication {
            promo_id: promo.id,
            bonus,
            discount,
        });
    }
    outcome
}

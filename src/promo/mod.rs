//! Recharge promotion stacking engine.

pub mod engine;
pub mod types;

pub use engine::{PromoApplication, PromoOutcome, applicable_promos, select_and_apply};
pub use types::{PromoType, RechargePromo, StackMode};

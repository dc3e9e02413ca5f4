//! Order reconciliation: payment state machines and exactly-once
//! settlement of verified gateway events.

pub mod db;
mod error;
#[cfg(test)]
mod integration_tests;
mod reconciler;
mod types;

pub use error::ReconcileError;
pub use reconciler::OrderReconciler;
pub use types::{
    Applied, Order, OrderStatus, RechargeOrder, RechargeStatus, is_recharge_no, new_order_no,
    new_recharge_no,
};

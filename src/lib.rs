//! kamipay - payment core for a digital access code (kami) shop.
//!
//! The money path is built from five pieces:
//! - [`normalize`]: per-gateway webhook verification producing one
//!   normalized event type;
//! - [`reconcile`]: order/recharge state machines with exactly-once
//!   settlement;
//! - [`ledger`]: transactional wallet mutations with an append-only log;
//! - [`promo`]: deterministic recharge promotion stacking;
//! - [`alert`]: passive anomaly monitoring that never blocks payments.

pub mod alert;
pub mod audit;
pub mod config;
pub mod db;
pub mod fulfillment;
pub mod ledger;
pub mod logging;
pub mod money;
pub mod normalize;
pub mod promo;
pub mod reconcile;
pub mod webhook;

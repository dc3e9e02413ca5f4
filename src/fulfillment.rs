//! Kami issuance seam.
//!
//! Settlement and fulfillment are deliberately decoupled: the order is
//! marked paid and committed first, then the issuer runs. An issuance
//! failure never rolls a payment back - it leaves the order in `paid`
//! and raises a `fulfillment_failed` alert for retry.

use async_trait::async_trait;
use std::collections::VecDeque;
use tokio::sync::Mutex;

use crate::reconcile::Order;

#[async_trait]
pub trait KamiIssuer: Send + Sync {
    /// Produce the digital access codes for a paid order, one per unit,
    /// newline-joined. Must be safe to retry: a second call for the same
    /// order may issue fresh codes because completion is CAS-guarded.
    async fn issue(&self, order: &Order) -> anyhow::Result<String>;
}

/// Issues codes from a preloaded in-memory pool. Good enough for demos
/// and tests; a real deployment implements `KamiIssuer` against its
/// inventory store.
pub struct PoolIssuer {
    codes: Mutex<VecDeque<String>>,
}

impl PoolIssuer {
    pub fn new(codes: Vec<String>) -> Self {
        Self {
            codes: Mutex::new(codes.into()),
        }
    }

    pub async fn remaining(&self) -> usize {
        self.codes.lock().await.len()
    }
}

#[async_trait]
impl KamiIssuer for PoolIssuer {
    async fn issue(&self, order: &Order) -> anyhow::Result<String> {
        let mut codes = self.codes.lock().await;
        if codes.len() < order.quantity as usize {
            anyhow::bail!(
                "out of stock for product {}: need {}, have {}",
                order.product_id,
                order.quantity,
                codes.len()
            );
        }
        let issued: Vec<String> = codes.drain(..order.quantity as usize).collect();
        Ok(issued.join("\n"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::reconcile::{new_order_no, OrderStatus};
    use chrono::Utc;

    fn order(quantity: i32) -> Order {
        Order {
            id: 1,
            order_no: new_order_no(),
            user_id: 42,
            product_id: 7,
            quantity,
            original_price: 1000,
            discount_amount: 0,
            price: 1000,
            paid_amount: Some(1000),
            status: OrderStatus::Paid,
            payment_method: Some("stripe".into()),
            payment_no: Some("pi_1".into()),
            payment_time: Some(Utc::now()),
            kami_code: None,
            created_at: Utc::now(),
        }
    }

    #[tokio::test]
    async fn test_pool_issues_in_order() {
        let issuer = PoolIssuer::new(vec!["K1".into(), "K2".into(), "K3".into()]);
        let codes = issuer.issue(&order(2)).await.unwrap();
        assert_eq!(codes, "K1\nK2");
        assert_eq!(issuer.remaining().await, 1);
    }

    #[tokio::test]
    async fn test_pool_out_of_stock() {
        let issuer = PoolIssuer::new(vec!["K1".into()]);
        let err = issuer.issue(&order(2)).await.unwrap_err();
        assert!(err.to_string().contains("out of stock"));
        // Nothing consumed on failure
        assert_eq!(issuer.remaining().await, 1);
    }
}

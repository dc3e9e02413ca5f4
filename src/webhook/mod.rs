//! Webhook HTTP surface.
//!
//! One route per delivery: `POST /webhook/{provider}`. The handler
//! verifies through the provider's normalizer, settles through the
//! reconciler, and maps outcomes onto the status codes gateways key
//! their retry behavior on: 2xx stops retries (including duplicates and
//! ignored events), 4xx means the delivery itself is bad, 5xx asks the
//! gateway to retry later.

use axum::Router;
use axum::body::Bytes;
use axum::extract::{ConnectInfo, Path, State};
use axum::http::{HeaderMap, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::Arc;
use tracing::{info, warn};

use crate::audit;
use crate::normalize::{NormalizeError, NormalizerRegistry, PaymentProvider, RawWebhook};
use crate::reconcile::{Applied, OrderReconciler, ReconcileError};

#[derive(Clone)]
pub struct AppState {
    pub registry: Arc<NormalizerRegistry>,
    pub reconciler: Arc<OrderReconciler>,
}

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(health))
        .route("/webhook/{provider}", post(handle_webhook))
        .with_state(state)
}

async fn health() -> &'static str {
    "ok"
}

/// Body the provider expects as a success acknowledgement.
fn ack_body(provider: PaymentProvider) -> &'static str {
    match provider {
        PaymentProvider::Wechat | PaymentProvider::Alipay | PaymentProvider::Yipay => "success",
        _ => r#"{"received":true}"#,
    }
}

async fn handle_webhook(
    State(state): State<AppState>,
    Path(provider): Path<String>,
    ConnectInfo(addr): ConnectInfo<SocketAddr>,
    headers: HeaderMap,
    body: Bytes,
) -> Response {
    let Ok(provider) = provider.parse::<PaymentProvider>() else {
        return (StatusCode::NOT_FOUND, "unknown provider").into_response();
    };
    let Some(normalizer) = state.registry.get(provider) else {
        // Balance is not a webhook provider
        return (StatusCode::NOT_FOUND, "unknown provider").into_response();
    };

    let client_ip = addr.ip().to_string();
    let header_map: HashMap<String, String> = headers
        .iter()
        .filter_map(|(name, value)| {
            value
                .to_str()
                .ok()
                .map(|v| (name.as_str().to_ascii_lowercase(), v.to_string()))
        })
        .collect();

    let webhook = RawWebhook {
        body: &body,
        headers: &header_map,
    };

    let event = match normalizer.verify(&webhook) {
        Ok(event) => event,
        Err(e) if e.is_auth_failure() => {
            audit::log_security_event("webhook_auth_failure", provider.as_str(), &client_ip, &e.to_string());
            return (StatusCode::UNAUTHORIZED, "signature verification failed").into_response();
        }
        Err(NormalizeError::IgnoredEvent(kind)) => {
            info!(provider = %provider, kind = %kind, "Webhook event type ignored");
            return (StatusCode::OK, ack_body(provider)).into_response();
        }
        Err(e) => {
            warn!(provider = %provider, error = %e, "Malformed webhook payload");
            return (StatusCode::BAD_REQUEST, "malformed payload").into_response();
        }
    };

    match state.reconciler.apply(&event).await {
        Ok(Applied::Settled { .. }) | Ok(Applied::AlreadyProcessed) | Ok(Applied::Ignored) => {
            (StatusCode::OK, ack_body(provider)).into_response()
        }
        Err(ReconcileError::OrderNotFound(order_no)) => {
            warn!(provider = %provider, order_no = %order_no, "Webhook references unknown order");
            (StatusCode::NOT_FOUND, "unknown order").into_response()
        }
        Err(e @ ReconcileError::AmountMismatch { .. }) => {
            // Alert already raised; the order stays pending for review.
            // 4xx, not 5xx: a retry would fail identically.
            warn!(provider = %provider, error = %e, "Webhook amount mismatch");
            (StatusCode::BAD_REQUEST, "amount mismatch").into_response()
        }
        Err(e) if e.is_internal() => {
            warn!(provider = %provider, error = %e, "Webhook settlement failed, gateway will retry");
            (StatusCode::INTERNAL_SERVER_ERROR, "settlement failed").into_response()
        }
        Err(e) => {
            warn!(provider = %provider, error = %e, "Webhook rejected");
            (StatusCode::BAD_REQUEST, "rejected").into_response()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_legacy_providers_ack_with_success() {
        assert_eq!(ack_body(PaymentProvider::Wechat), "success");
        assert_eq!(ack_body(PaymentProvider::Alipay), "success");
        assert_eq!(ack_body(PaymentProvider::Yipay), "success");
        assert_eq!(ack_body(PaymentProvider::Stripe), r#"{"received":true}"#);
    }
}

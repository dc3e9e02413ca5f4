//! End-to-end verification pipeline tests: configured registry in,
//! normalized payment event out, dispatched to the right settlement
//! path. Everything here runs without a database.

use std::collections::HashMap;

use chrono::Utc;

use kamipay::config::{PaypalConfig, ProvidersConfig, SignKeyConfig, StripeConfig};
use kamipay::money;
use kamipay::normalize::signature::{hmac_sha256_hex, md5_param_sign};
use kamipay::normalize::{
    EventStatus, NormalizeError, NormalizerRegistry, PaymentProvider, RawWebhook,
};
use kamipay::promo;
use kamipay::reconcile::{is_recharge_no, new_order_no, new_recharge_no};

const STRIPE_SECRET: &str = "whsec_pipeline";
const YIPAY_KEY: &str = "yipay_pipeline";
const USDT_KEY: &str = "usdt_pipeline";

fn registry() -> NormalizerRegistry {
    NormalizerRegistry::from_config(&ProvidersConfig {
        stripe: Some(StripeConfig {
            webhook_secret: STRIPE_SECRET.to_string(),
            tolerance_secs: 300,
        }),
        paypal: Some(PaypalConfig {
            webhook_id: "WH-123".to_string(),
            webhook_secret: "paypal_pipeline".to_string(),
        }),
        wechat: None,
        alipay: None,
        yipay: Some(SignKeyConfig {
            key: YIPAY_KEY.to_string(),
        }),
        usdt: Some(SignKeyConfig {
            key: USDT_KEY.to_string(),
        }),
    })
}

#[test]
fn test_stripe_checkout_to_order_settlement_path() {
    let order_no = new_order_no();
    let body = format!(
        r#"{{"id":"evt_1","type":"checkout.session.completed","data":{{"object":{{"id":"cs_1","amount_total":2599,"payment_intent":"pi_777","metadata":{{"order_no":"{}"}}}}}}}}"#,
        order_no
    );
    let ts = Utc::now().timestamp();
    let message = format!("{}.{}", ts, body);
    let mut headers = HashMap::new();
    headers.insert(
        "stripe-signature".to_string(),
        format!(
            "t={},v1={}",
            ts,
            hmac_sha256_hex(STRIPE_SECRET.as_bytes(), message.as_bytes())
        ),
    );

    let registry = registry();
    let normalizer = registry.get(PaymentProvider::Stripe).unwrap();
    let event = normalizer
        .verify(&RawWebhook {
            body: body.as_bytes(),
            headers: &headers,
        })
        .unwrap();

    assert_eq!(event.provider, PaymentProvider::Stripe);
    assert_eq!(event.order_no, order_no);
    assert_eq!(event.paid_amount, 2599);
    assert_eq!(event.provider_tx_id, "pi_777");
    assert_eq!(event.status, EventStatus::Completed);
    // ORD prefix routes to the product-order settlement path
    assert!(!is_recharge_no(&event.order_no));
}

#[test]
fn test_yipay_notify_to_recharge_settlement_path() {
    let recharge_no = new_recharge_no();
    let mut params = std::collections::BTreeMap::new();
    params.insert("out_trade_no".to_string(), recharge_no.clone());
    params.insert("trade_no".to_string(), "Y555".to_string());
    params.insert("money".to_string(), "50.00".to_string());
    params.insert("trade_status".to_string(), "TRADE_SUCCESS".to_string());
    let sign = md5_param_sign(&params, YIPAY_KEY);
    let body = format!(
        r#"{{"out_trade_no":"{}","trade_no":"Y555","money":"50.00","trade_status":"TRADE_SUCCESS","sign":"{}"}}"#,
        recharge_no, sign
    );

    let registry = registry();
    let headers = HashMap::new();
    let event = registry
        .get(PaymentProvider::Yipay)
        .unwrap()
        .verify(&RawWebhook {
            body: body.as_bytes(),
            headers: &headers,
        })
        .unwrap();

    assert_eq!(event.order_no, recharge_no);
    assert_eq!(event.paid_amount, 5000);
    // RC prefix routes to the recharge settlement path
    assert!(is_recharge_no(&event.order_no));
}

#[test]
fn test_unconfigured_provider_rejects_everything() {
    let registry = registry();
    let normalizer = registry.get(PaymentProvider::Wechat).unwrap();
    let headers = HashMap::new();
    let err = normalizer
        .verify(&RawWebhook {
            body: br#"{"out_trade_no":"ORD1","total_fee":"100","result_code":"SUCCESS"}"#,
            headers: &headers,
        })
        .unwrap_err();
    assert!(matches!(err, NormalizeError::MissingSecret(_)));
    assert!(err.is_auth_failure());
}

#[test]
fn test_cross_provider_signature_does_not_transfer() {
    // A body validly signed for USDT must not pass YiPay verification
    let body = r#"{"order_no":"RC1","txid":"0x1","amount":"10.00","status":"confirmed"}"#;
    let mut headers = HashMap::new();
    headers.insert(
        "x-signature".to_string(),
        hmac_sha256_hex(USDT_KEY.as_bytes(), body.as_bytes()),
    );

    let registry = registry();
    let ok = registry
        .get(PaymentProvider::Usdt)
        .unwrap()
        .verify(&RawWebhook {
            body: body.as_bytes(),
            headers: &headers,
        });
    assert!(ok.is_ok());

    let err = registry
        .get(PaymentProvider::Yipay)
        .unwrap()
        .verify(&RawWebhook {
            body: body.as_bytes(),
            headers: &headers,
        })
        .unwrap_err();
    assert!(err.is_auth_failure());
}

#[test]
fn test_gateway_amount_tolerance_is_one_cent() {
    let expected = money::parse_amount("99.99").unwrap();
    assert!(money::amounts_match(expected, 9999));
    assert!(money::amounts_match(expected, 9998));
    assert!(money::amounts_match(expected, 10000));
    assert!(!money::amounts_match(expected, 9997));
    assert!(!money::amounts_match(expected, 10002));
}

#[test]
fn test_promo_quote_and_settlement_agree() {
    use chrono::Duration;
    use kamipay::promo::{PromoType, RechargePromo, StackMode};

    let now = Utc::now();
    let promos = vec![
        RechargePromo {
            id: 1,
            name: "5% extra".to_string(),
            promo_type: PromoType::Percent,
            min_amount: 0,
            max_amount: 0,
            value: 500,
            max_bonus: 0,
            priority: 0,
            stack_mode: StackMode::All,
            per_user_limit: 0,
            total_limit: 0,
            used_count: 0,
            start_at: now - Duration::hours(1),
            end_at: now + Duration::hours(1),
            enabled: true,
        },
        RechargePromo {
            id: 2,
            name: "flat bonus".to_string(),
            promo_type: PromoType::Bonus,
            min_amount: 5000,
            max_amount: 0,
            value: 800,
            max_bonus: 0,
            priority: 1,
            stack_mode: StackMode::Best,
            per_user_limit: 1,
            total_limit: 0,
            used_count: 0,
            start_at: now - Duration::hours(1),
            end_at: now + Duration::hours(1),
            enabled: true,
        },
    ];

    // The quote shown pre-payment and the settlement-time recomputation
    // run the same pure function over the same inputs
    let quote = promo::select_and_apply(10000, now, &promos);
    let settle = promo::select_and_apply(10000, now, &promos);
    assert_eq!(quote, settle);
    assert_eq!(quote.bonus, 500 + 800);
    assert_eq!(quote.applied_ids(), vec![1, 2]);
}

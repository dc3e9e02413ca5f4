use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::fs;

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct AppConfig {
    pub log_level: String,
    pub log_dir: String,
    pub log_file: String,
    pub use_json: bool,
    pub rotation: String,
    pub http: HttpConfig,
    pub postgres_url: String,
    #[serde(default)]
    pub providers: ProvidersConfig,
    #[serde(default)]
    pub alerts: AlertConfig,
    /// Pending recharge orders expire after this many minutes and are
    /// swept to cancelled by a background task.
    #[serde(default = "default_recharge_expire_minutes")]
    pub recharge_expire_minutes: i64,
    /// Optional newline-separated kami stock file for the built-in pool
    /// issuer. Deployments with a real inventory store leave this unset.
    #[serde(default)]
    pub kami_codes_file: Option<String>,
}

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct HttpConfig {
    pub host: String,
    pub port: u16,
}

/// Per-provider webhook credentials.
///
/// A provider left unconfigured is fail-closed: its adapter rejects every
/// delivery with a signature error instead of accepting unsigned payloads.
#[derive(Debug, Serialize, Deserialize, Clone, Default)]
pub struct ProvidersConfig {
    #[serde(default)]
    pub stripe: Option<StripeConfig>,
    #[serde(default)]
    pub paypal: Option<PaypalConfig>,
    #[serde(default)]
    pub wechat: Option<SignKeyConfig>,
    #[serde(default)]
    pub alipay: Option<SignKeyConfig>,
    #[serde(default)]
    pub yipay: Option<SignKeyConfig>,
    #[serde(default)]
    pub usdt: Option<SignKeyConfig>,
}

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct StripeConfig {
    pub webhook_secret: String,
    /// Maximum accepted drift of the signed timestamp, seconds.
    #[serde(default = "default_stripe_tolerance")]
    pub tolerance_secs: i64,
}

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct PaypalConfig {
    pub webhook_id: String,
    pub webhook_secret: String,
}

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct SignKeyConfig {
    pub key: String,
}

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct AlertConfig {
    /// Single ledger mutation at or above this raises a warning alert.
    pub large_amount: Decimal,
    /// Admin adjustment at or above this (absolute) raises a warning alert.
    pub admin_adjust: Decimal,
}

impl Default for AlertConfig {
    fn default() -> Self {
        Self {
            large_amount: Decimal::new(1_000_00, 2),
            admin_adjust: Decimal::new(500_00, 2),
        }
    }
}

fn default_stripe_tolerance() -> i64 {
    300
}

fn default_recharge_expire_minutes() -> i64 {
    30
}

impl AppConfig {
    pub fn load(env: &str) -> Self {
        let config_path = format!("config/{}.yaml", env);
        let content = fs::read_to_string(&config_path)
            .unwrap_or_else(|e| panic!("Failed to read config {}: {}", config_path, e));
        serde_yaml::from_str(&content)
            .unwrap_or_else(|e| panic!("Failed to parse config {}: {}", config_path, e))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_minimal_config() {
        let yaml = r#"
log_level: info
log_dir: ./logs
log_file: kamipay.log
use_json: false
rotation: daily
http:
  host: 0.0.0.0
  port: 8080
postgres_url: postgres://localhost/kamipay
providers:
  stripe:
    webhook_secret: whsec_test
"#;
        let cfg: AppConfig = serde_yaml::from_str(yaml).unwrap();
        assert_eq!(cfg.http.port, 8080);
        assert_eq!(cfg.providers.stripe.unwrap().tolerance_secs, 300);
        assert!(cfg.providers.usdt.is_none());
        assert_eq!(cfg.recharge_expire_minutes, 30);
    }
}

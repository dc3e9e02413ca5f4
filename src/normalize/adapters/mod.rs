//! Provider adapters.

pub mod alipay;
pub mod paypal;
pub mod stripe;
pub mod usdt;
pub mod wechat;
pub mod yipay;

use std::collections::BTreeMap;

use super::error::NormalizeError;

/// Parse a flat JSON object into a sorted string parameter map, as the
/// legacy MD5-signed gateways (WeChat v2, Alipay legacy, YiPay) expect.
/// Numbers are stringified; nested values are rejected.
pub(crate) fn parse_param_map(body: &[u8]) -> Result<BTreeMap<String, String>, NormalizeError> {
    let value: serde_json::Value = serde_json::from_slice(body)
        .map_err(|e| NormalizeError::MalformedPayload(format!("invalid JSON: {}", e)))?;

    let obj = value
        .as_object()
        .ok_or_else(|| NormalizeError::MalformedPayload("expected a JSON object".into()))?;

    let mut params = BTreeMap::new();
    for (k, v) in obj {
        let s = match v {
            serde_json::Value::String(s) => s.clone(),
            serde_json::Value::Number(n) => n.to_string(),
            serde_json::Value::Bool(b) => b.to_string(),
            serde_json::Value::Null => String::new(),
            _ => {
                return Err(NormalizeError::MalformedPayload(format!(
                    "nested value for key {}",
                    k
                )));
            }
        };
        params.insert(k.clone(), s);
    }
    Ok(params)
}

/// Fetch a required parameter from a legacy param map.
pub(crate) fn require_param<'a>(
    params: &'a BTreeMap<String, String>,
    key: &str,
) -> Result<&'a str, NormalizeError> {
    params
        .get(key)
        .map(|s| s.as_str())
        .filter(|s| !s.is_empty())
        .ok_or_else(|| NormalizeError::MalformedPayload(format!("missing field {}", key)))
}

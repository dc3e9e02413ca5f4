//! Signature primitives shared by the provider adapters.

use hmac::{Hmac, Mac};
use sha2::Sha256;
use std::collections::BTreeMap;

type HmacSha256 = Hmac<Sha256>;

/// Hex-encoded HMAC-SHA256 of `message`.
pub fn hmac_sha256_hex(secret: &[u8], message: &[u8]) -> String {
    let mut mac = HmacSha256::new_from_slice(secret).expect("HMAC accepts any key length");
    mac.update(message);
    hex::encode(mac.finalize().into_bytes())
}

/// Constant-time HMAC-SHA256 check against a hex signature.
pub fn verify_hmac_sha256(secret: &[u8], message: &[u8], signature_hex: &str) -> bool {
    let Ok(expected) = hex::decode(signature_hex.trim()) else {
        return false;
    };
    let mut mac = HmacSha256::new_from_slice(secret).expect("HMAC accepts any key length");
    mac.update(message);
    mac.verify_slice(&expected).is_ok()
}

/// Legacy sorted-parameter MD5 signature (WeChat v2 / Alipay legacy /
/// YiPay): concatenate `k=v` pairs sorted by key, skipping empty values
/// and the `sign` field itself, append `&key={secret}`, uppercase-hex MD5.
pub fn md5_param_sign(params: &BTreeMap<String, String>, secret: &str) -> String {
    let mut buf = String::new();
    for (k, v) in params {
        if k == "sign" || v.is_empty() {
            continue;
        }
        if !buf.is_empty() {
            buf.push('&');
        }
        buf.push_str(k);
        buf.push('=');
        buf.push_str(v);
    }
    buf.push_str("&key=");
    buf.push_str(secret);
    format!("{:X}", md5::compute(buf.as_bytes()))
}

/// Verify a legacy MD5 parameter signature in constant time.
pub fn verify_md5_param_sign(
    params: &BTreeMap<String, String>,
    secret: &str,
    signature: &str,
) -> bool {
    let expected = md5_param_sign(params, secret);
    constant_time_eq(
        expected.as_bytes(),
        signature.trim().to_uppercase().as_bytes(),
    )
}

/// Length-then-content comparison without early exit on mismatch.
pub fn constant_time_eq(a: &[u8], b: &[u8]) -> bool {
    if a.len() != b.len() {
        return false;
    }
    let mut diff = 0u8;
    for (x, y) in a.iter().zip(b.iter()) {
        diff |= x ^ y;
    }
    diff == 0
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_hmac_roundtrip() {
        let sig = hmac_sha256_hex(b"secret", b"payload");
        assert!(verify_hmac_sha256(b"secret", b"payload", &sig));
        assert!(!verify_hmac_sha256(b"secret", b"tampered", &sig));
        assert!(!verify_hmac_sha256(b"wrong", b"payload", &sig));
        assert!(!verify_hmac_sha256(b"secret", b"payload", "zz-not-hex"));
    }

    #[test]
    fn test_md5_param_sign_skips_empty_and_sign() {
        let mut params = BTreeMap::new();
        params.insert("out_trade_no".to_string(), "ORD1".to_string());
        params.insert("total_fee".to_string(), "9999".to_string());
        params.insert("empty".to_string(), String::new());
        params.insert("sign".to_string(), "SHOULD_BE_SKIPPED".to_string());

        let sig = md5_param_sign(&params, "key123");

        let mut without = BTreeMap::new();
        without.insert("out_trade_no".to_string(), "ORD1".to_string());
        without.insert("total_fee".to_string(), "9999".to_string());
        assert_eq!(sig, md5_param_sign(&without, "key123"));

        assert!(verify_md5_param_sign(&params, "key123", &sig));
        assert!(verify_md5_param_sign(&params, "key123", &sig.to_lowercase()));
        assert!(!verify_md5_param_sign(&params, "other", &sig));
    }

    #[test]
    fn test_constant_time_eq() {
        assert!(constant_time_eq(b"abc", b"abc"));
        assert!(!constant_time_eq(b"abc", b"abd"));
        assert!(!constant_time_eq(b"abc", b"abcd"));
    }
}

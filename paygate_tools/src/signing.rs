//! Canonical parameter signing for the PayGate protocol.
//!
//! Every signed payload is a flat list of key/value pairs. The canonical form sorts the pairs by key, drops the
//! `sign` field itself and any empty values, and joins the rest as `k=v&k=v...`. The signature is the lowercase hex
//! HMAC-SHA256 of that string under the shared gateway secret. Verification recomputes the signature from the raw
//! captured fields; nothing may be re-encoded between capture and verification.
use hmac::{Hmac, Mac};
use sha2::Sha256;

type HmacSha256 = Hmac<Sha256>;

pub const SIGN_FIELD: &str = "sign";

/// Builds the canonical string that gets signed.
pub fn canonical_string(params: &[(String, String)]) -> String {
    let mut fields: Vec<&(String, String)> =
        params.iter().filter(|(k, v)| k != SIGN_FIELD && !v.is_empty()).collect();
    fields.sort_by(|a, b| a.0.cmp(&b.0));
    fields.iter().map(|(k, v)| format!("{k}={v}")).collect::<Vec<String>>().join("&")
}

/// Signs the given parameters with the shared secret, returning the lowercase hex signature.
pub fn sign_params(secret: &str, params: &[(String, String)]) -> String {
    let canonical = canonical_string(params);
    let mut mac = HmacSha256::new_from_slice(secret.as_bytes()).expect("HMAC accepts keys of any length");
    mac.update(canonical.as_bytes());
    mac.finalize().into_bytes().iter().map(|b| format!("{b:02x}")).collect()
}

/// Verifies the `sign` field carried in the parameter list. Returns `false` when the field is absent.
pub fn verify_params(secret: &str, params: &[(String, String)]) -> bool {
    let provided = match params.iter().find(|(k, _)| k == SIGN_FIELD) {
        Some((_, v)) if !v.is_empty() => v,
        _ => return false,
    };
    let expected = sign_params(secret, params);
    provided == &expected
}

#[cfg(test)]
mod test {
    use super::*;

    fn params(pairs: &[(&str, &str)]) -> Vec<(String, String)> {
        pairs.iter().map(|(k, v)| (k.to_string(), v.to_string())).collect()
    }

    #[test]
    fn canonical_form_sorts_and_skips() {
        let p = params(&[("b", "2"), ("a", "1"), ("sign", "zzz"), ("empty", "")]);
        assert_eq!(canonical_string(&p), "a=1&b=2");
    }

    #[test]
    fn round_trip() {
        let mut p = params(&[("out_trade_no", "GSP-1"), ("trade_status", "TRADE_SUCCESS")]);
        let sig = sign_params("s3cret", &p);
        p.push((SIGN_FIELD.to_string(), sig));
        assert!(verify_params("s3cret", &p));
    }

    #[test]
    fn tampering_is_detected() {
        let mut p = params(&[("out_trade_no", "GSP-1"), ("total_amount", "25.00")]);
        let sig = sign_params("s3cret", &p);
        p.push((SIGN_FIELD.to_string(), sig));
        p[1].1 = "2500.00".to_string();
        assert!(!verify_params("s3cret", &p));
    }

    #[test]
    fn missing_signature_is_rejected() {
        let p = params(&[("out_trade_no", "GSP-1")]);
        assert!(!verify_params("s3cret", &p));
        let mut p = p;
        p.push((SIGN_FIELD.to_string(), String::new()));
        assert!(!verify_params("s3cret", &p));
    }
}

//! Shared request-signing helpers for the Korean and foreign-perpetual adapters.
//!
//! Grounded on the teacher's signing stack used elsewhere in this workspace for exchange
//! APIs (`hmac`, `sha2`, `hex`, `base64`) rather than pulling in a JWT crate; the wire
//! format itself is an external concern per spec §1/§6.

use base64::Engine;
use hmac::{Hmac, Mac};
use sha2::{Digest, Sha256, Sha512};

type HmacSha256 = Hmac<Sha256>;
type HmacSha512 = Hmac<Sha512>;

fn base64url(bytes: &[u8]) -> String {
    base64::engine::general_purpose::URL_SAFE_NO_PAD.encode(bytes)
}

/// Builds a minimal HS256 JWT of the shape Upbit/Bithumb expect: `{access_key, nonce}`
/// plus an optional `query_hash`/`query_hash_alg` claim when signing a query string.
pub fn jwt_hs256(access_key: &str, secret_key: &str, query: Option<&str>) -> String {
    let nonce = nonce_hex();
    let header = r#"{"alg":"HS256","typ":"JWT"}"#;
    let payload = match query {
        Some(q) => {
            let mut hasher = Sha512::new();
            hasher.update(q.as_bytes());
            let query_hash = hex::encode(hasher.finalize());
            format!(
                r#"{{"access_key":"{access_key}","nonce":"{nonce}","query_hash":"{query_hash}","query_hash_alg":"SHA512"}}"#
            )
        }
        None => format!(r#"{{"access_key":"{access_key}","nonce":"{nonce}"}}"#),
    };
    let signing_input = format!("{}.{}", base64url(header.as_bytes()), base64url(payload.as_bytes()));
    let mut mac = HmacSha256::new_from_slice(secret_key.as_bytes()).expect("hmac accepts any key length");
    mac.update(signing_input.as_bytes());
    let signature = base64url(&mac.finalize().into_bytes());
    format!("{signing_input}.{signature}")
}

/// HMAC-SHA256 hex signature, as used by Bybit V5's `timestamp + api_key + recv_window + query`.
pub fn hmac_sha256_hex(secret_key: &str, payload: &str) -> String {
    let mut mac = HmacSha256::new_from_slice(secret_key.as_bytes()).expect("hmac accepts any key length");
    mac.update(payload.as_bytes());
    hex::encode(mac.finalize().into_bytes())
}

/// HMAC-SHA512 hex signature, as used by GateIO's `method\nurl\nquery\nbody_hash\ntimestamp`.
pub fn hmac_sha512_hex(secret_key: &str, payload: &str) -> String {
    let mut mac = HmacSha512::new_from_slice(secret_key.as_bytes()).expect("hmac accepts any key length");
    mac.update(payload.as_bytes());
    hex::encode(mac.finalize().into_bytes())
}

pub fn sha512_hex(payload: &str) -> String {
    let mut hasher = Sha512::new();
    hasher.update(payload.as_bytes());
    hex::encode(hasher.finalize())
}

fn nonce_hex() -> String {
    use rand::RngCore;
    let mut bytes = [0u8; 16];
    rand::thread_rng().fill_bytes(&mut bytes);
    hex::encode(bytes)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn jwt_has_three_segments() {
        let token = jwt_hs256("access", "secret", None);
        assert_eq!(token.split('.').count(), 3);
    }

    #[test]
    fn jwt_with_query_hash_differs_from_without() {
        let a = jwt_hs256("access", "secret", None);
        let b = jwt_hs256("access", "secret", Some("market=KRW-BTC"));
        assert_ne!(a, b);
    }

    #[test]
    fn hmac_sha256_is_deterministic() {
        let a = hmac_sha256_hex("secret", "payload");
        let b = hmac_sha256_hex("secret", "payload");
        assert_eq!(a, b);
        assert_eq!(a.len(), 64);
    }

    #[test]
    fn hmac_sha512_is_deterministic() {
        let a = hmac_sha512_hex("secret", "payload");
        assert_eq!(a.len(), 128);
    }
}

//! Event notification signatures
//!
//! Every request sent to the broker or to a webhook receiver carries an
//! HMAC-SHA256 of its body in the `x-bz-event-notification-signature`
//! header, rendered as `v1=<lowercase hex>`.

use hmac::{Hmac, Mac};
use sha2::Sha256;

use crate::constants::SIGNATURE_VERSION;

type HmacSha256 = Hmac<Sha256>;

/// Sign `body` with `secret`
pub fn sign(secret: &[u8], body: &[u8]) -> String {
    // HMAC accepts keys of any length, so this never fails
    let mut mac = HmacSha256::new_from_slice(secret).expect("hmac accepts any key length");
    mac.update(body);
    let digest = mac.finalize().into_bytes();
    format!("{}{}", SIGNATURE_VERSION, hex::encode(digest))
}

/// Holds a signing secret so callers don't pass it around
#[derive(Clone)]
pub struct Signer {
    secret: Vec<u8>,
}

impl Signer {
    pub fn new(secret: impl Into<Vec<u8>>) -> Self {
        Self {
            secret: secret.into(),
        }
    }

    pub fn sign(&self, body: &[u8]) -> String {
        sign(&self.secret, body)
    }
}

impl std::fmt::Debug for Signer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Signer").finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const SECRET: &[u8] = b"0123456789abcdefABCDEF0123456789";

    #[test]
    fn test_sign_format() {
        let sig = sign(SECRET, br#"{"url":"https://abc123.example.com"}"#);
        assert!(sig.starts_with("v1="));
        // 32-byte digest as hex
        assert_eq!(sig.len(), 3 + 64);
        assert!(
            sig[3..]
                .chars()
                .all(|c| c.is_ascii_digit() || ('a'..='f').contains(&c))
        );
    }

    #[test]
    fn test_sign_is_deterministic() {
        let body = br#"{"event":[]}"#;
        assert_eq!(sign(SECRET, body), sign(SECRET, body));
        assert_ne!(sign(SECRET, body), sign(b"another-secret", body));
    }

    #[test]
    fn test_sign_empty_body() {
        let sig = sign(SECRET, b"");
        assert_eq!(sig.len(), 67);
        assert_eq!(sig, Signer::new(SECRET).sign(&[]));
    }

    #[test]
    fn test_sign_known_vector() {
        // RFC 4231 test case 2
        let sig = sign(b"Jefe", b"what do ya want for nothing?");
        assert_eq!(
            sig,
            "v1=5bdcc146bf60754e6a042426089575c75a003f089d2739839dec58b964ec3843"
        );
    }

    #[test]
    fn test_signer_debug_hides_secret() {
        let signer = Signer::new("super-secret");
        assert!(!format!("{:?}", signer).contains("super-secret"));
    }
}

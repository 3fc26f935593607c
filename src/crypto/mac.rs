//! HMAC-SHA256 message authentication.
//!
//! One keyed instance per direction; the instance is cheap to clone, so each
//! computation works on a fresh clone and the stored state never advances.

use hmac::{Hmac, Mac};
use sha2::Sha256;

type HmacSha256 = Hmac<Sha256>;

/// Length of the authentication tags produced, in bytes.
pub const TAG_BYTES: usize = 32;

/// Reusable HMAC-SHA256 authenticator bound to one key.
#[derive(Clone)]
pub struct Authenticator {
    mac: HmacSha256,
}

impl Authenticator {
    /// Build an authenticator from a key of any length (32 bytes in this
    /// protocol: the derived sub-keys match the cipher key size).
    pub fn new(key: &[u8]) -> Self {
        debug_assert!(!key.is_empty(), "empty key");
        let mac =
            <HmacSha256 as Mac>::new_from_slice(key).expect("HMAC accepts keys of any length");
        Self { mac }
    }

    /// Compute the tag over `message`.
    pub fn compute(&self, message: &[u8]) -> [u8; TAG_BYTES] {
        let mut mac = self.mac.clone();
        mac.update(message);
        mac.finalize().into_bytes().into()
    }

    /// Verify `tag` against `message` in constant time.
    pub fn verify(&self, message: &[u8], tag: &[u8]) -> bool {
        let mut mac = self.mac.clone();
        mac.update(message);
        mac.verify_slice(tag).is_ok()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn compute_and_verify_agree() {
        let auth = Authenticator::new(b"0123456789abcdef0123456789abcdef");
        let tag = auth.compute(b"some framed message");
        assert!(auth.verify(b"some framed message", &tag));
        assert!(!auth.verify(b"some framed messagf", &tag));
    }

    #[test]
    fn different_keys_differ() {
        let a = Authenticator::new(&[1u8; 32]);
        let b = Authenticator::new(&[2u8; 32]);
        assert_ne!(a.compute(b"x"), b.compute(b"x"));
    }

    #[test]
    fn instance_state_does_not_advance() {
        let auth = Authenticator::new(&[7u8; 32]);
        let first = auth.compute(b"payload");
        let second = auth.compute(b"payload");
        assert_eq!(first, second);
    }
}

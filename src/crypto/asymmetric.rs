//! RSA-2048 key exchange encryption.
//!
//! Used exactly once per connection, to carry the initial secret from client
//! to service. Keys travel as PKCS#1 DER; padding is OAEP with SHA-512.

use crate::error::{constants, ChannelError, Result};
use rsa::pkcs1::{
    DecodeRsaPrivateKey, DecodeRsaPublicKey, EncodeRsaPrivateKey, EncodeRsaPublicKey,
};
use rsa::{Oaep, RsaPrivateKey, RsaPublicKey};
use sha2::Sha512;

/// Key size, in bits.
pub const KEY_BITS: usize = 2048;

/// Size of an encrypted payload, in bytes.
pub const ENCRYPTED_BYTES: usize = 256;

/// Largest message the OAEP-SHA512 padding leaves room for.
pub const MAX_PLAINTEXT_BYTES: usize = 126;

/// Generate a fresh key pair, returned as `(public, private)` PKCS#1 DER.
pub fn generate_key_pair() -> Result<(Vec<u8>, Vec<u8>)> {
    let mut rng = rand::thread_rng();
    let private = RsaPrivateKey::new(&mut rng, KEY_BITS)
        .map_err(|e| ChannelError::Crypto(format!("key generation failed: {e}")))?;
    let public = RsaPublicKey::from(&private);

    let public_der = public
        .to_pkcs1_der()
        .map_err(|e| ChannelError::Crypto(format!("public key encoding failed: {e}")))?
        .as_bytes()
        .to_vec();
    let private_der = private
        .to_pkcs1_der()
        .map_err(|e| ChannelError::Crypto(format!("private key encoding failed: {e}")))?
        .as_bytes()
        .to_vec();

    Ok((public_der, private_der))
}

/// Encrypting half, held by the client.
pub struct PublicCipher {
    key: RsaPublicKey,
}

impl PublicCipher {
    /// Import a PKCS#1 DER public key.
    pub fn from_der(der: &[u8]) -> Result<Self> {
        let key = RsaPublicKey::from_pkcs1_der(der)
            .map_err(|e| ChannelError::Crypto(format!("public key import failed: {e}")))?;
        Ok(Self { key })
    }

    /// Encrypt `plaintext` (at most `MAX_PLAINTEXT_BYTES`), yielding
    /// `ENCRYPTED_BYTES` of ciphertext.
    pub fn encrypt(&self, plaintext: &[u8]) -> Result<Vec<u8>> {
        debug_assert!(!plaintext.is_empty(), "empty plaintext");
        debug_assert!(plaintext.len() <= MAX_PLAINTEXT_BYTES, "plaintext too long");

        let mut rng = rand::thread_rng();
        let ciphertext = self
            .key
            .encrypt(&mut rng, Oaep::new::<Sha512>(), plaintext)
            .map_err(|e| ChannelError::Crypto(format!("encryption failed: {e}")))?;
        debug_assert!(ciphertext.len() == ENCRYPTED_BYTES);
        Ok(ciphertext)
    }
}

/// Decrypting half, held by the server and its service endpoints.
pub struct PrivateCipher {
    key: RsaPrivateKey,
}

impl PrivateCipher {
    /// Import a PKCS#1 DER private key.
    pub fn from_der(der: &[u8]) -> Result<Self> {
        let key = RsaPrivateKey::from_pkcs1_der(der)
            .map_err(|e| ChannelError::Crypto(format!("private key import failed: {e}")))?;
        Ok(Self { key })
    }

    /// Decrypt an `ENCRYPTED_BYTES` ciphertext.
    ///
    /// Failure here means the peer's key exchange payload was not produced
    /// with the matching public key, so it surfaces as a protocol violation.
    pub fn decrypt(&self, ciphertext: &[u8]) -> Result<Vec<u8>> {
        debug_assert!(ciphertext.len() == ENCRYPTED_BYTES, "invalid ciphertext length");

        self.key
            .decrypt(Oaep::new::<Sha512>(), ciphertext)
            .map_err(|_| ChannelError::ProtocolViolation(constants::ERR_KEY_EXCHANGE_REJECTED))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn roundtrip_with_generated_keys() {
        let (public_der, private_der) = generate_key_pair().unwrap();
        let public = PublicCipher::from_der(&public_der).unwrap();
        let private = PrivateCipher::from_der(&private_der).unwrap();

        let message = vec![0x5A; MAX_PLAINTEXT_BYTES];
        let ciphertext = public.encrypt(&message).unwrap();
        assert_eq!(ciphertext.len(), ENCRYPTED_BYTES);

        let recovered = private.decrypt(&ciphertext).unwrap();
        assert_eq!(recovered, message);
    }

    #[test]
    fn tampered_ciphertext_is_rejected() {
        let (public_der, private_der) = generate_key_pair().unwrap();
        let public = PublicCipher::from_der(&public_der).unwrap();
        let private = PrivateCipher::from_der(&private_der).unwrap();

        let mut ciphertext = public.encrypt(b"secret material").unwrap();
        ciphertext[17] ^= 0x01;
        assert!(matches!(
            private.decrypt(&ciphertext),
            Err(ChannelError::ProtocolViolation(_))
        ));
    }

    #[test]
    fn garbage_key_import_fails() {
        assert!(PublicCipher::from_der(&[0u8; 16]).is_err());
        assert!(PrivateCipher::from_der(&[0u8; 16]).is_err());
    }
}

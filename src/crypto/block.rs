//! AES-256 block encryption.
//!
//! The channel uses CTR mode, so only single-block encryption is needed: each
//! 16-byte counter is encrypted and XOR-ed into the protected region. No
//! block decryption, no padding, no IV handling.

use aes::cipher::generic_array::GenericArray;
use aes::cipher::{BlockEncrypt, KeyInit};
use aes::Aes256;

/// Encryption key size, in bytes.
pub const KEY_BYTES: usize = 32;

/// Block size of the cipher, in bytes.
pub const BLOCK_BYTES: usize = 16;

/// AES-256 single-block encryptor.
pub struct BlockCipher {
    inner: Aes256,
}

impl BlockCipher {
    /// Build an encryptor from a `KEY_BYTES` key.
    pub fn new(key: &[u8]) -> Self {
        debug_assert!(key.len() == KEY_BYTES, "invalid key length");
        Self {
            inner: Aes256::new(GenericArray::from_slice(key)),
        }
    }

    /// Encrypt one block in place.
    pub fn encrypt_block(&self, block: &mut [u8; BLOCK_BYTES]) {
        self.inner
            .encrypt_block(GenericArray::from_mut_slice(block));
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    // NIST Special Publication 800-38A, F.1.5 ECB-AES256.Encrypt
    const KEY: [u8; 32] = [
        0x60, 0x3d, 0xeb, 0x10, 0x15, 0xca, 0x71, 0xbe, 0x2b, 0x73, 0xae, 0xf0, 0x85, 0x7d, 0x77,
        0x81, 0x1f, 0x35, 0x2c, 0x07, 0x3b, 0x61, 0x08, 0xd7, 0x2d, 0x98, 0x10, 0xa3, 0x09, 0x14,
        0xdf, 0xf4,
    ];
    const PLAINTEXT: [u8; 64] = [
        0x6b, 0xc1, 0xbe, 0xe2, 0x2e, 0x40, 0x9f, 0x96, 0xe9, 0x3d, 0x7e, 0x11, 0x73, 0x93, 0x17,
        0x2a, 0xae, 0x2d, 0x8a, 0x57, 0x1e, 0x03, 0xac, 0x9c, 0x9e, 0xb7, 0x6f, 0xac, 0x45, 0xaf,
        0x8e, 0x51, 0x30, 0xc8, 0x1c, 0x46, 0xa3, 0x5c, 0xe4, 0x11, 0xe5, 0xfb, 0xc1, 0x19, 0x1a,
        0x0a, 0x52, 0xef, 0xf6, 0x9f, 0x24, 0x45, 0xdf, 0x4f, 0x9b, 0x17, 0xad, 0x2b, 0x41, 0x7b,
        0xe6, 0x6c, 0x37, 0x10,
    ];
    const CIPHERTEXT: [u8; 64] = [
        0xf3, 0xee, 0xd1, 0xbd, 0xb5, 0xd2, 0xa0, 0x3c, 0x06, 0x4b, 0x5a, 0x7e, 0x3d, 0xb1, 0x81,
        0xf8, 0x59, 0x1c, 0xcb, 0x10, 0xd4, 0x10, 0xed, 0x26, 0xdc, 0x5b, 0xa7, 0x4a, 0x31, 0x36,
        0x28, 0x70, 0xb6, 0xed, 0x21, 0xb9, 0x9c, 0xa6, 0xf4, 0xf9, 0xf1, 0x53, 0xe7, 0xb1, 0xbe,
        0xaf, 0xed, 0x1d, 0x23, 0x30, 0x4b, 0x7a, 0x39, 0xf9, 0xf3, 0xff, 0x06, 0x7d, 0x8d, 0x8f,
        0x9e, 0x24, 0xec, 0xc7,
    ];

    #[test]
    fn matches_nist_ecb_aes256_vector() {
        let cipher = BlockCipher::new(&KEY);
        let mut data = PLAINTEXT;
        for chunk in data.chunks_exact_mut(BLOCK_BYTES) {
            let block: &mut [u8; BLOCK_BYTES] = chunk.try_into().unwrap();
            cipher.encrypt_block(block);
        }
        assert_eq!(data, CIPHERTEXT);
    }

    #[test]
    fn encryptor_is_reusable() {
        let cipher = BlockCipher::new(&KEY);
        for _ in 0..2 {
            let mut block: [u8; BLOCK_BYTES] = PLAINTEXT[..BLOCK_BYTES].try_into().unwrap();
            cipher.encrypt_block(&mut block);
            assert_eq!(block, CIPHERTEXT[..BLOCK_BYTES]);
        }
    }
}

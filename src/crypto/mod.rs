//! # Cryptographic Primitives
//!
//! Thin wrappers over the cryptography the channel consumes.
//!
//! The channel composes four primitives and relies on nothing else:
//! - **AES-256** as a raw block encryptor ([`block`]), turned into a stream
//!   cipher by the CTR counter discipline in [`counter`]
//! - **HMAC-SHA256** for message authentication and key derivation ([`mac`])
//! - **RSA-2048 OAEP-SHA512** for the initial key exchange ([`asymmetric`])
//! - the operating system RNG for secrets and series values ([`random`])
//!
//! Everything here is synchronous and allocation-light; the framing layer
//! drives these primitives over portions of a shared message buffer.

pub mod asymmetric;
pub mod block;
pub mod counter;
pub mod mac;
pub mod random;

pub use block::BlockCipher;
pub use counter::CtrCounter;
pub use mac::Authenticator;

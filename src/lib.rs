//! # secure-channel
//!
//! Secure, authenticated, length-framed transport channel over TCP.
//!
//! A connection starts as an ordinary length-framed byte pipe and can be
//! activated into a **secure channel**: confidentiality and authenticity via
//! hybrid cryptography, with RSA-2048 OAEP carrying the initial secret,
//! AES-256 in CTR mode enciphering every frame, and HMAC-SHA256
//! authenticating header and payload together. Symmetric keys rotate in-band
//! on configurable byte and time thresholds.
//!
//! ## Topology
//! - A **server** connection listens and mints one **service** connection
//!   per accepted client.
//! - A **client** connection talks to exactly one service. Each
//!   client/service pair is driven by a single task; connections share
//!   nothing, so a server may serve many clients concurrently.
//!
//! ## Example
//! ```no_run
//! use secure_channel::{ChannelConfig, Connection};
//!
//! #[tokio::main]
//! async fn main() -> secure_channel::Result<()> {
//!     let (public_key, private_key) = secure_channel::generate_key_pair()?;
//!
//!     let server = Connection::listen_secure(
//!         "127.0.0.1:9000",
//!         private_key,
//!         ChannelConfig::default(),
//!     )
//!     .await?;
//!     tokio::spawn(async move {
//!         let mut service = server.accept().await?;
//!         let request = service.receive().await?.to_vec();
//!         service.send(&request).await?;
//!         service.close().await
//!     });
//!
//!     let mut client =
//!         Connection::connect_secure("127.0.0.1:9000", public_key, ChannelConfig::default())
//!             .await?;
//!     client.send(b"hello").await?;
//!     assert_eq!(client.receive().await?, b"hello");
//!     client.close().await
//! }
//! ```
//!
//! ## Security
//! - The counter triple (series, message, block) is the nonce; both peers
//!   advance it in lock-step and it never travels on the wire.
//! - Frames are authenticated before anything in them is trusted; any
//!   mismatch fails closed as a [`ChannelError::ProtocolViolation`].
//! - Key material is zeroized when replaced or dropped.

pub mod config;
pub mod core;
pub mod crypto;
pub mod error;
pub mod protocol;
pub mod transport;

pub use crate::config::ChannelConfig;
pub use crate::core::{Mailbox, Portion};
pub use crate::crypto::asymmetric::generate_key_pair;
pub use crate::error::{ChannelError, Result};
pub use crate::protocol::{Role, SecureChannel, PROTOCOL_LITERAL};
pub use crate::transport::Connection;

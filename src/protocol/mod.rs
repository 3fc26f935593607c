//! # Protocol
//!
//! The secure channel: framing, handshake messages, and the state machine
//! that drives them.
//!
//! ## Message flow
//! ```text
//! client                                   service
//!   |-- Opening: RSA( secret ∥ literal ) --->|      key exchange
//!   |<-- Ticket: AES( series ∥ literal ) ----|      first series
//!   |-- General: AES( payload ) ------------>|      traffic
//!   |<-- General: AES( payload ) ------------|
//!   |-- Secret: AES( new secret ) ---------->|      re-key (either side
//!   |<-- Ticket: AES( new series ) ----------|      may initiate)
//! ```
//!
//! Every frame shares the `ticket | index | length | payload | tag` wire
//! shape described in [`framing`]; [`handshake`] builds the three control
//! payloads, and [`channel`] owns the counters, keys and transitions.

pub mod channel;
pub mod framing;
pub mod handshake;

pub use channel::{Role, SecureChannel};

use crate::core::mailbox::utf16be_bytes;
use std::sync::OnceLock;

/// Fixed literal naming the protocol version. The client sends it inside the
/// key exchange, the service checks it byte-exact and echoes it inside the
/// first ticket message.
pub const PROTOCOL_LITERAL: &str = "secure-channel 0.2";

/// Length of the shared secret carried by the key exchange, from which the
/// four symmetric sub-keys are derived.
pub const SECRET_BYTES: usize = 32;

/// The protocol literal in its wire form (UTF-16BE), encoded once.
pub(crate) fn literal_wire() -> &'static [u8] {
    static WIRE: OnceLock<Vec<u8>> = OnceLock::new();
    WIRE.get_or_init(|| utf16be_bytes(PROTOCOL_LITERAL))
}

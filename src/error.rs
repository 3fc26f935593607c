//! # Error Types
//!
//! Error handling for the secure channel.
//!
//! This module defines the error variants that can occur while driving a
//! connection, from low-level socket failures to protocol violations detected
//! inside the secure channel.
//!
//! ## Error Categories
//! - **Transport errors**: the underlying socket failed; the connection is
//!   marked errored and no further traffic is attempted.
//! - **Peer shutdown**: the remote end performed an orderly shutdown. For a
//!   client this is a fault (the server hung up mid-protocol); for a service
//!   it is an expected signal that the client has departed.
//! - **Protocol violations**: received header fields disagree with the
//!   expected counter state, the protocol literal does not match, or tag
//!   verification failed. Always fail closed.
//! - **Cryptographic errors**: key import or primitive setup failed.
//!
//! Contract violations (buffer bounds, counter-state misuse) are not errors:
//! they are programmer mistakes and fail fast through assertions.

use std::io;
use thiserror::Error;

/// Error message constants to reduce allocations in error paths.
/// Static strings are borrowed, avoiding heap allocations for common cases.
pub mod constants {
    /// Protocol validation errors
    pub const ERR_HEADER_MISMATCH: &str = "message header does not match expected counter state";
    pub const ERR_BAD_LENGTH: &str = "message length field inconsistent with frame";
    pub const ERR_TAG_MISMATCH: &str = "authentication tag verification failed";
    pub const ERR_LITERAL_MISMATCH: &str = "protocol literal does not match";
    pub const ERR_KEY_EXCHANGE_REJECTED: &str = "key exchange payload could not be decrypted";
    pub const ERR_BAD_SERIES: &str = "series value in ticket message is invalid";

    /// Connection errors
    pub const ERR_SERVER_CLOSED: &str = "connection closed prematurely by the server";
}

/// Primary error type for all channel operations.
#[derive(Error, Debug)]
pub enum ChannelError {
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    /// The remote client performed an orderly shutdown. Observed by service
    /// endpoints only; an expected way for a conversation to end.
    #[error("connection interrupted by the remote peer")]
    Interrupted,

    /// The server hung up while the client still expected traffic.
    #[error("connection closed prematurely by the server")]
    Disconnected,

    #[error("protocol violation: {0}")]
    ProtocolViolation(&'static str),

    #[error("payload too large: {0} bytes")]
    Oversized(usize),

    #[error("cryptographic failure: {0}")]
    Crypto(String),

    #[error("configuration error: {0}")]
    Config(String),
}

/// Type alias for Results using ChannelError
pub type Result<T> = std::result::Result<T, ChannelError>;

impl ChannelError {
    /// Whether the connection may still be used after this error.
    ///
    /// Only configuration errors leave the connection untouched; everything
    /// else poisons the endpoint.
    pub fn is_fatal(&self) -> bool {
        !matches!(self, ChannelError::Config(_))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn io_errors_convert() {
        let err: ChannelError = io::Error::new(io::ErrorKind::ConnectionReset, "reset").into();
        assert!(matches!(err, ChannelError::Io(_)));
        assert!(err.is_fatal());
    }

    #[test]
    fn config_errors_are_not_fatal() {
        let err = ChannelError::Config("bad threshold".into());
        assert!(!err.is_fatal());
    }

    #[test]
    fn violation_messages_are_static() {
        let err = ChannelError::ProtocolViolation(constants::ERR_TAG_MISMATCH);
        assert_eq!(
            err.to_string(),
            "protocol violation: authentication tag verification failed"
        );
    }
}

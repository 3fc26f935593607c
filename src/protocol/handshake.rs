//! Handshake and re-key messages.
//!
//! Three control messages exist beside general traffic:
//!
//! - **Opening** (key exchange): the one RSA-encrypted message, sent exactly
//!   once per connection as the very first exchange. Carries the 32-byte
//!   secret plus the protocol literal.
//! - **Secret**: an AES-framed message carrying a fresh re-key secret,
//!   sent whenever the local message number has returned to 0.
//! - **Ticket**: an AES-framed message carrying the new 64-bit series value
//!   (and, in the opening round only, the protocol literal again), sent in
//!   answer to an Opening or a Secret to seed both peers' counters.
//!
//! The symmetric shapes differ only in which body fields exist, so one
//! [`ControlFrame`] parametrized by [`ControlKind`] covers all of them. Each
//! instance owns its buffer; the general data frame is the only one laid
//! over the connection's message buffer.
//!
//! Received control headers are validated against the expected remote
//! counter state before the frame is trusted; any disagreement is a
//! protocol violation and fails closed.

use crate::core::{Mailbox, Portion};
use crate::crypto::asymmetric::{self, PrivateCipher, PublicCipher};
use crate::crypto::counter::CtrCounter;
use crate::crypto::mac::Authenticator;
use crate::crypto::{random, BlockCipher};
use crate::error::{constants, ChannelError, Result};
use crate::protocol::channel::Role;
use crate::protocol::framing::{FrameHeader, SymmetricFrame, HEADER_BYTES, TICKET_BYTES};
use crate::protocol::{literal_wire, SECRET_BYTES};
use crate::transport::{receive_all, send_all};
use tokio::io::{AsyncRead, AsyncWrite};
use tracing::debug;
use zeroize::Zeroizing;

/// Header fields of a received frame: `(ticket, index, length)`.
pub(crate) type HeaderFields = (i64, i32, i32);

/// The RSA-encrypted key exchange message.
///
/// ```text
/// message:  | ticket=0 | index=0 | length |     RSA ciphertext (256)     |
/// text:     |        secret (32)          |   literal (UTF-16BE)   |
/// ```
pub(crate) struct KeyExchange {
    message: Mailbox,
    header: FrameHeader,
    ciphered: Portion,
    text: Mailbox,
    secret: Portion,
    literal: Portion,
}

impl KeyExchange {
    pub(crate) fn prepare() -> Self {
        let literal_len = literal_wire().len();
        let text_len = SECRET_BYTES + literal_len;
        debug_assert!(text_len <= asymmetric::MAX_PLAINTEXT_BYTES, "literal too long");

        let mut text = Mailbox::new();
        text.allocate(text_len);
        let secret = text.make_portion(0, SECRET_BYTES);
        let literal = text.make_portion(SECRET_BYTES, literal_len);

        let mut message = Mailbox::new();
        message.allocate(HEADER_BYTES + asymmetric::ENCRYPTED_BYTES);
        let header = FrameHeader::prepare(&mut message);
        let ciphered = message.make_portion(HEADER_BYTES, asymmetric::ENCRYPTED_BYTES);

        Self {
            message,
            header,
            ciphered,
            text,
            secret,
            literal,
        }
    }

    /// Client side: generate a fresh secret, encrypt it together with the
    /// protocol literal under the peer's public key, and send.
    pub(crate) async fn send<S>(
        &mut self,
        stream: &mut S,
        public_key: &PublicCipher,
    ) -> Result<Zeroizing<[u8; SECRET_BYTES]>>
    where
        S: AsyncWrite + Unpin,
    {
        let length = self.message.len() as i32;
        self.header.write(&mut self.message, 0, 0, length);

        let mut secret = Zeroizing::new([0u8; SECRET_BYTES]);
        random::fill(secret.as_mut());
        self.text
            .portion_view_mut(&self.secret)
            .copy_from_slice(secret.as_ref());
        self.text
            .portion_view_mut(&self.literal)
            .copy_from_slice(literal_wire());

        let ciphertext = public_key.encrypt(self.text.view())?;
        self.message
            .portion_view_mut(&self.ciphered)
            .copy_from_slice(&ciphertext);
        self.text.zero();

        send_all(stream, self.message.view()).await?;
        debug!(length, "key exchange sent");
        Ok(secret)
    }

    /// Service side: receive, validate the plain header, decrypt with the
    /// private key and cross-check the protocol literal.
    pub(crate) async fn receive<S>(
        &mut self,
        stream: &mut S,
        private_key: &PrivateCipher,
        role: Role,
    ) -> Result<Zeroizing<[u8; SECRET_BYTES]>>
    where
        S: AsyncRead + Unpin,
    {
        let expected_length = self.message.len() as i32;
        receive_all(stream, self.message.view_mut(), role).await?;

        let ticket = self.header.ticket(&self.message);
        let index = self.header.index(&self.message);
        let length = self.header.length(&self.message);
        debug!(ticket, index, length, "key exchange received");

        if ticket != 0 || index != 0 {
            return Err(ChannelError::ProtocolViolation(
                constants::ERR_HEADER_MISMATCH,
            ));
        }
        if length != expected_length {
            return Err(ChannelError::ProtocolViolation(constants::ERR_BAD_LENGTH));
        }

        let plain = Zeroizing::new(private_key.decrypt(self.message.portion_view(&self.ciphered))?);
        if plain.len() != self.text.len() {
            return Err(ChannelError::ProtocolViolation(
                constants::ERR_KEY_EXCHANGE_REJECTED,
            ));
        }
        self.text.put_bytes(0, &plain);

        if self.text.portion_view(&self.literal) != literal_wire() {
            return Err(ChannelError::ProtocolViolation(
                constants::ERR_LITERAL_MISMATCH,
            ));
        }

        let mut secret = Zeroizing::new([0u8; SECRET_BYTES]);
        secret
            .as_mut()
            .copy_from_slice(self.text.portion_view(&self.secret));
        self.text.zero();
        Ok(secret)
    }
}

/// Which body fields a symmetric control message carries.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum ControlKind {
    /// Ticket answer to the key exchange: series value plus protocol literal.
    Opening,
    /// Re-key secret.
    Secret,
    /// Ticket answer to a re-key secret: series value only.
    Ticket,
}

/// A symmetric control message, owning its buffer.
///
/// ```text
/// | ticket | index | length | secret? | series? | literal? |  tag  |
/// ```
pub(crate) struct ControlFrame {
    message: Mailbox,
    frame: SymmetricFrame,
    secret: Option<Portion>,
    series: Option<Portion>,
    literal: Option<Portion>,
}

impl ControlFrame {
    pub(crate) fn prepare(kind: ControlKind) -> Self {
        let secret_len = if kind == ControlKind::Secret {
            SECRET_BYTES
        } else {
            0
        };
        let series_len = if kind == ControlKind::Secret {
            0
        } else {
            TICKET_BYTES
        };
        let literal_len = if kind == ControlKind::Opening {
            literal_wire().len()
        } else {
            0
        };
        let body_len = secret_len + series_len + literal_len;

        let mut message = Mailbox::new();
        message.allocate(SymmetricFrame::frame_len(body_len));
        let frame = SymmetricFrame::prepare(&mut message, body_len);

        let secret_at = HEADER_BYTES;
        let series_at = secret_at + secret_len;
        let literal_at = series_at + series_len;
        let secret = (secret_len > 0).then(|| message.make_portion(secret_at, secret_len));
        let series = (series_len > 0).then(|| message.make_portion(series_at, series_len));
        let literal = (literal_len > 0).then(|| message.make_portion(literal_at, literal_len));

        Self {
            message,
            frame,
            secret,
            series,
            literal,
        }
    }

    /// Send a re-key secret under the current (outgoing) keys.
    #[allow(clippy::too_many_arguments)]
    pub(crate) async fn send_secret<S>(
        &mut self,
        stream: &mut S,
        series: i64,
        index: i32,
        secret: &[u8],
        authenticator: &Authenticator,
        cipher: &BlockCipher,
        counter: &mut CtrCounter,
    ) -> Result<()>
    where
        S: AsyncWrite + Unpin,
    {
        let length = self.message.len() as i32;
        self.frame
            .header()
            .write(&mut self.message, series, index, length);

        let slot = self.secret.as_ref().expect("frame carries no secret");
        self.message.portion_view_mut(slot).copy_from_slice(secret);

        self.frame
            .authenticate_encrypt(&mut self.message, authenticator, cipher, counter);
        send_all(stream, self.message.view()).await?;
        debug!(ticket = series, index, length, "re-key secret sent");
        Ok(())
    }

    /// Receive a re-key secret. The plain header was already consumed by the
    /// data-frame read and is passed in; it must match the expected remote
    /// state exactly.
    #[allow(clippy::too_many_arguments)]
    pub(crate) async fn receive_secret<S>(
        &mut self,
        stream: &mut S,
        header: HeaderFields,
        expected_series: i64,
        authenticator: &Authenticator,
        cipher: &BlockCipher,
        counter: &mut CtrCounter,
        role: Role,
    ) -> Result<Zeroizing<[u8; SECRET_BYTES]>>
    where
        S: AsyncRead + Unpin,
    {
        let (ticket, index, length) = header;
        debug!(ticket, index, length, "re-key secret received");

        if ticket != expected_series || index != 0 {
            return Err(ChannelError::ProtocolViolation(
                constants::ERR_HEADER_MISMATCH,
            ));
        }
        if length != self.message.len() as i32 {
            return Err(ChannelError::ProtocolViolation(constants::ERR_BAD_LENGTH));
        }
        self.frame
            .header()
            .write(&mut self.message, ticket, index, length);

        let total = self.message.len();
        receive_all(
            stream,
            &mut self.message.view_mut()[HEADER_BYTES..total],
            role,
        )
        .await?;

        self.frame
            .decrypt_verify(&mut self.message, authenticator, cipher, counter)?;

        let slot = self.secret.as_ref().expect("frame carries no secret");
        let mut secret = Zeroizing::new([0u8; SECRET_BYTES]);
        secret
            .as_mut()
            .copy_from_slice(self.message.portion_view(slot));
        self.message.portion_view_mut(slot).fill(0);
        Ok(secret)
    }

    /// Send a ticket carrying `new_series` (plus the literal in the opening
    /// round) under the just-installed keys.
    #[allow(clippy::too_many_arguments)]
    pub(crate) async fn send_ticket<S>(
        &mut self,
        stream: &mut S,
        new_series: i64,
        series: i64,
        index: i32,
        authenticator: &Authenticator,
        cipher: &BlockCipher,
        counter: &mut CtrCounter,
    ) -> Result<()>
    where
        S: AsyncWrite + Unpin,
    {
        let length = self.message.len() as i32;
        self.frame
            .header()
            .write(&mut self.message, series, index, length);

        let slot = self.series.as_ref().expect("frame carries no series");
        slot.set_i64(&mut self.message, 0, new_series);
        if let Some(literal) = &self.literal {
            self.message
                .portion_view_mut(literal)
                .copy_from_slice(literal_wire());
        }

        self.frame
            .authenticate_encrypt(&mut self.message, authenticator, cipher, counter);
        send_all(stream, self.message.view()).await?;
        debug!(ticket = series, index, length, new_series, "ticket sent");
        Ok(())
    }

    /// Receive a ticket, validate it against the expected remote state, and
    /// return the new series value it carries.
    pub(crate) async fn receive_ticket<S>(
        &mut self,
        stream: &mut S,
        expected_series: i64,
        authenticator: &Authenticator,
        cipher: &BlockCipher,
        counter: &mut CtrCounter,
        role: Role,
    ) -> Result<i64>
    where
        S: AsyncRead + Unpin,
    {
        receive_all(stream, self.message.view_mut(), role).await?;

        let ticket = self.frame.header().ticket(&self.message);
        let index = self.frame.header().index(&self.message);
        let length = self.frame.header().length(&self.message);
        debug!(ticket, index, length, "ticket received");

        if ticket != expected_series || index != 0 {
            return Err(ChannelError::ProtocolViolation(
                constants::ERR_HEADER_MISMATCH,
            ));
        }
        if length != self.message.len() as i32 {
            return Err(ChannelError::ProtocolViolation(constants::ERR_BAD_LENGTH));
        }

        self.frame
            .decrypt_verify(&mut self.message, authenticator, cipher, counter)?;

        if let Some(literal) = &self.literal {
            if self.message.portion_view(literal) != literal_wire() {
                return Err(ChannelError::ProtocolViolation(
                    constants::ERR_LITERAL_MISMATCH,
                ));
            }
        }

        let slot = self.series.as_ref().expect("frame carries no series");
        Ok(slot.get_i64(&self.message, 0))
    }
}

//! # Message Framing
//!
//! Layout and sealing of secure frames.
//!
//! Every secure message shares one wire shape, big-endian throughout:
//!
//! ```text
//! +--------+-------+--------+------·····------+---------+
//! | ticket | index | length |      body       |   tag   |
//! |  i64   |  i32  |  i32   |                 | 32 bytes|
//! +--------+-------+--------+------·····------+---------+
//! |<------------- sensible ------------------>|
//!                           |<------ ciphered --------->|
//! ```
//!
//! `length` counts the whole frame, header and tag included. The *sensible*
//! span (header ∥ body) is authenticated; the *ciphered* span (body ∥ tag)
//! is encrypted. The two overlap on the body on purpose: sealing computes the
//! tag over the plaintext header and body first, then enciphers body and tag
//! together, so a single buffer carries both passes without copies.
//!
//! Encryption is CTR mode built from the raw block cipher: emit the next
//! counter, block-encrypt it, XOR up to 16 bytes into the target region,
//! advance the block number, repeat. The counter triple is the nonce and
//! never travels on the wire.

use crate::core::{Mailbox, Portion};
use crate::crypto::block::{BlockCipher, BLOCK_BYTES};
use crate::crypto::counter::CtrCounter;
use crate::crypto::mac::{Authenticator, TAG_BYTES};
use crate::error::{constants, ChannelError, Result};

/// Size of the ticket (series) header field.
pub const TICKET_BYTES: usize = 8;

/// Size of the message-index header field.
pub const INDEX_BYTES: usize = 4;

/// Size of the frame-length header field.
pub const LENGTH_BYTES: usize = 4;

/// Size of the complete header.
pub const HEADER_BYTES: usize = TICKET_BYTES + INDEX_BYTES + LENGTH_BYTES;

/// The three header fields, as portions over a message buffer.
#[derive(Debug)]
pub struct FrameHeader {
    ticket: Portion,
    index: Portion,
    length: Portion,
}

impl FrameHeader {
    /// Lay the header portions over the front of `message`.
    pub fn prepare(message: &mut Mailbox) -> Self {
        let ticket = message.make_portion(0, TICKET_BYTES);
        let index = message.make_portion(TICKET_BYTES, INDEX_BYTES);
        let length = message.make_portion(TICKET_BYTES + INDEX_BYTES, LENGTH_BYTES);
        Self {
            ticket,
            index,
            length,
        }
    }

    /// Tear the header portions down.
    pub fn release(self, message: &mut Mailbox) {
        message.release_portion(self.ticket);
        message.release_portion(self.index);
        message.release_portion(self.length);
    }

    /// Write all three fields.
    pub fn write(&self, message: &mut Mailbox, ticket: i64, index: i32, length: i32) {
        self.ticket.set_i64(message, 0, ticket);
        self.index.set_i32(message, 0, index);
        self.length.set_i32(message, 0, length);
    }

    /// Ticket (series) field.
    pub fn ticket(&self, message: &Mailbox) -> i64 {
        self.ticket.get_i64(message, 0)
    }

    /// Message-index field.
    pub fn index(&self, message: &Mailbox) -> i32 {
        self.index.get_i32(message, 0)
    }

    /// Frame-length field.
    pub fn length(&self, message: &Mailbox) -> i32 {
        self.length.get_i32(message, 0)
    }
}

/// A symmetric frame: header, body, tag, and the two overlapping spans the
/// crypto passes operate on.
#[derive(Debug)]
pub struct SymmetricFrame {
    header: FrameHeader,
    body: Portion,
    tag: Portion,
    sensible: Portion,
    ciphered: Portion,
}

impl SymmetricFrame {
    /// Total frame size for a body of `body_len` bytes.
    pub const fn frame_len(body_len: usize) -> usize {
        HEADER_BYTES + body_len + TAG_BYTES
    }

    /// Lay the frame portions over `message`, which must hold at least
    /// [`frame_len`](Self::frame_len)`(body_len)` bytes. Any surplus tail of
    /// the buffer stays outside the frame.
    pub fn prepare(message: &mut Mailbox, body_len: usize) -> Self {
        debug_assert!(message.len() >= Self::frame_len(body_len), "buffer too small");

        let header = FrameHeader::prepare(message);
        let body = message.make_portion(HEADER_BYTES, body_len);
        let tag = message.make_portion(HEADER_BYTES + body_len, TAG_BYTES);
        let sensible = message.make_portion(0, HEADER_BYTES + body_len);
        let ciphered = message.make_portion(HEADER_BYTES, body_len + TAG_BYTES);
        Self {
            header,
            body,
            tag,
            sensible,
            ciphered,
        }
    }

    /// Tear all portions down.
    pub fn release(self, message: &mut Mailbox) {
        self.header.release(message);
        message.release_portion(self.body);
        message.release_portion(self.tag);
        message.release_portion(self.sensible);
        message.release_portion(self.ciphered);
    }

    /// Move the frame to a new body length within the current buffer,
    /// repositioning and resizing the portions instead of rebuilding them.
    pub fn retarget(&mut self, message: &Mailbox, body_len: usize) {
        debug_assert!(message.len() >= Self::frame_len(body_len), "buffer too small");

        let delta = body_len as isize - self.body.len() as isize;
        if delta == 0 {
            return;
        }
        message.resize(&mut self.body, delta);
        message.reposition(&mut self.tag, delta);
        message.resize(&mut self.sensible, delta);
        message.resize(&mut self.ciphered, delta);
    }

    /// The header fields.
    pub fn header(&self) -> &FrameHeader {
        &self.header
    }

    /// Body length in bytes.
    pub fn body_len(&self) -> usize {
        self.body.len()
    }

    /// Total frame length in bytes.
    pub fn len(&self) -> usize {
        Self::frame_len(self.body.len())
    }

    /// The body as a slice.
    pub fn body<'a>(&self, message: &'a Mailbox) -> &'a [u8] {
        message.portion_view(&self.body)
    }

    /// The body as a mutable slice.
    pub fn body_mut<'a>(&self, message: &'a mut Mailbox) -> &'a mut [u8] {
        message.portion_view_mut(&self.body)
    }

    /// Authenticate, then encrypt.
    ///
    /// Computes the tag over the sensible span into the tag slot, then XORs
    /// the keystream over the ciphered span. The counter must be positioned
    /// at the message this frame carries; its block number is consumed here.
    pub fn authenticate_encrypt(
        &self,
        message: &mut Mailbox,
        authenticator: &Authenticator,
        cipher: &BlockCipher,
        counter: &mut CtrCounter,
    ) {
        let tag = authenticator.compute(message.portion_view(&self.sensible));
        message.portion_view_mut(&self.tag).copy_from_slice(&tag);
        apply_keystream(message.portion_view_mut(&self.ciphered), cipher, counter);
    }

    /// Decrypt, then verify.
    ///
    /// XORs the keystream over the ciphered span, restoring plaintext body
    /// and tag, then recomputes the tag over the sensible span and compares.
    /// A mismatch is a protocol violation: the frame is not to be trusted
    /// and the connection should not carry further traffic.
    pub fn decrypt_verify(
        &self,
        message: &mut Mailbox,
        authenticator: &Authenticator,
        cipher: &BlockCipher,
        counter: &mut CtrCounter,
    ) -> Result<()> {
        apply_keystream(message.portion_view_mut(&self.ciphered), cipher, counter);

        let authentic = authenticator.verify(
            message.portion_view(&self.sensible),
            message.portion_view(&self.tag),
        );
        if !authentic {
            return Err(ChannelError::ProtocolViolation(constants::ERR_TAG_MISMATCH));
        }
        Ok(())
    }
}

/// XOR the CTR keystream over `data`.
///
/// The current counter covers the first block; the counter is left positioned
/// on the last block used, consumed.
pub(crate) fn apply_keystream(data: &mut [u8], cipher: &BlockCipher, counter: &mut CtrCounter) {
    let mut pad = [0u8; BLOCK_BYTES];
    let mut chunks = data.chunks_mut(BLOCK_BYTES).peekable();
    while let Some(chunk) = chunks.next() {
        counter.emit(&mut pad);
        cipher.encrypt_block(&mut pad);
        for (byte, key) in chunk.iter_mut().zip(pad.iter()) {
            *byte ^= key;
        }
        if chunks.peek().is_some() {
            counter.increment_block();
        }
    }
}

//! # Secure Channel
//!
//! The protocol state machine.
//!
//! A channel moves through three states:
//!
//! - **Unkeyed**: series 0, message 0. The first send (client) or receive
//!   (service) runs the key exchange and the opening ticket round.
//! - **Keyed**: series nonzero. Ordinary traffic flows, counters advancing
//!   in lock-step with the peer.
//! - **Re-keying**: the local message number returned to 0 (wrapped, or
//!   forced by the byte/time thresholds). The sending side pushes a fresh
//!   secret, both sides re-derive their four sub-keys, and a new ticket
//!   re-synchronizes the series.
//!
//! Each endpoint holds two counter/cipher/authenticator triples: the *local*
//! one seals outgoing frames, the *remote* one opens incoming frames. The
//! local triple of one peer pairs with the remote triple of the other.
//!
//! Key derivation: the 32-byte secret keys an HMAC, and each sub-key is the
//! tag over a fixed role literal. Client endpoints install the client-* keys
//! as local and the service-* keys as remote; service endpoints the reverse.

use crate::config::ChannelConfig;
use crate::core::mailbox::utf16be_bytes;
use crate::core::Mailbox;
use crate::crypto::asymmetric::{PrivateCipher, PublicCipher};
use crate::crypto::counter::CtrCounter;
use crate::crypto::mac::{Authenticator, TAG_BYTES};
use crate::crypto::{block, random, BlockCipher};
use crate::error::{constants, ChannelError, Result};
use crate::protocol::framing::{SymmetricFrame, HEADER_BYTES};
use crate::protocol::handshake::{ControlFrame, ControlKind, KeyExchange};
use crate::protocol::SECRET_BYTES;
use crate::transport::{receive_all, send_all};
use std::time::Instant;
use tokio::io::{AsyncRead, AsyncWrite};
use tracing::debug;
use zeroize::Zeroizing;

/// Which part an endpoint plays.
///
/// A server only listens and mints service endpoints; traffic flows between
/// a client and a service. Exactly one role per live endpoint.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Role {
    Server,
    Service,
    Client,
}

const CLIENT_CIPHER_KEY: &str = "client-cipher-key";
const SERVICE_CIPHER_KEY: &str = "service-cipher-key";
const CLIENT_AUTH_KEY: &str = "client-auth-key";
const SERVICE_AUTH_KEY: &str = "service-auth-key";

/// Secure channel state for one connection endpoint.
pub struct SecureChannel {
    role: Role,
    config: ChannelConfig,

    /// PKCS#1 DER private key; server role, copied into each service.
    private_key: Option<Zeroizing<Vec<u8>>>,
    /// PKCS#1 DER public key; client role.
    public_key: Option<Vec<u8>>,

    local_counter: CtrCounter,
    remote_counter: CtrCounter,
    local_cipher: Option<BlockCipher>,
    remote_cipher: Option<BlockCipher>,
    local_auth: Option<Authenticator>,
    remote_auth: Option<Authenticator>,

    /// General data frame, laid over the connection's message buffer.
    frame: Option<SymmetricFrame>,

    bytes_since_rekey: u64,
    rekeyed_at: Instant,
}

impl SecureChannel {
    /// Activate in the server role, holding the private key for the service
    /// endpoints this listener will mint.
    pub(crate) fn server(private_key_der: Vec<u8>, config: ChannelConfig) -> Self {
        Self::inert(Role::Server, config, Some(private_key_der), None)
    }

    /// Activate in the client role with the server's public key.
    pub(crate) fn client(public_key_der: Vec<u8>, config: ChannelConfig) -> Self {
        let mut channel = Self::inert(Role::Client, config, None, Some(public_key_der));
        channel.local_counter.start();
        channel.remote_counter.start();
        channel
    }

    /// Activate in the service role, inheriting key material and
    /// configuration from the listening server channel.
    pub(crate) fn service(server: &SecureChannel) -> Self {
        debug_assert!(server.role == Role::Server, "not a server channel");

        let private_key = server.private_key.as_ref().map(|key| key.clone());
        let mut channel = Self::inert(Role::Service, server.config.clone(), None, None);
        channel.private_key = private_key;
        channel.local_counter.start();
        channel.remote_counter.start();
        channel
    }

    fn inert(
        role: Role,
        config: ChannelConfig,
        private_key: Option<Vec<u8>>,
        public_key: Option<Vec<u8>>,
    ) -> Self {
        Self {
            role,
            config,
            private_key: private_key.map(Zeroizing::new),
            public_key,
            local_counter: CtrCounter::new(),
            remote_counter: CtrCounter::new(),
            local_cipher: None,
            remote_cipher: None,
            local_auth: None,
            remote_auth: None,
            frame: None,
            bytes_since_rekey: 0,
            rekeyed_at: Instant::now(),
        }
    }

    /// Drop all cryptographic state and tear the data frame off `message`.
    pub(crate) fn deactivate(&mut self, message: &mut Mailbox) {
        if let Some(frame) = self.frame.take() {
            frame.release(message);
        }
        self.local_cipher = None;
        self.remote_cipher = None;
        self.local_auth = None;
        self.remote_auth = None;
        self.private_key = None;
        self.public_key = None;
    }

    /// The endpoint's role.
    pub fn role(&self) -> Role {
        self.role
    }

    /// The configured payload ceiling.
    pub(crate) fn max_payload(&self) -> usize {
        self.config.max_payload_size
    }

    /// Size the data frame for a payload of `payload_len` bytes.
    ///
    /// Buffers only grow: a larger frame reallocates, copies the previous
    /// content across and rebuilds every portion; a smaller or equal frame
    /// merely repositions the existing portions. The surplus tail of a
    /// previously grown buffer stays allocated.
    pub(crate) fn prepare_buffers(&mut self, message: &mut Mailbox, payload_len: usize) {
        let needed = SymmetricFrame::frame_len(payload_len);

        if message.is_empty() {
            message.allocate(needed);
            self.frame = Some(SymmetricFrame::prepare(message, payload_len));
            return;
        }
        if message.len() < needed {
            if let Some(frame) = self.frame.take() {
                frame.release(message);
            }
            let mut grown = Mailbox::new();
            grown.allocate(needed);
            Mailbox::copy_bytes(message, &mut grown, message.len());
            message.transfer_from(&mut grown);
            self.frame = Some(SymmetricFrame::prepare(message, payload_len));
            return;
        }
        match &mut self.frame {
            Some(frame) => frame.retarget(message, payload_len),
            None => self.frame = Some(SymmetricFrame::prepare(message, payload_len)),
        }
    }

    /// The current payload window.
    pub(crate) fn payload<'a>(&self, message: &'a Mailbox) -> &'a [u8] {
        let frame = self.frame.as_ref().expect("buffers not prepared");
        frame.body(message)
    }

    /// The current payload window, writable.
    pub(crate) fn payload_mut<'a>(&self, message: &'a mut Mailbox) -> &'a mut [u8] {
        let frame = self.frame.as_ref().expect("buffers not prepared");
        frame.body_mut(message)
    }

    /// Send the payload currently staged in the data frame.
    ///
    /// Runs the opening handshake on the first send of a client, and a
    /// re-key round whenever the local counter or the byte/time accounting
    /// says the series is spent. The pending payload is untouched by either:
    /// control messages own their buffers.
    pub(crate) async fn send<S>(
        &mut self,
        stream: &mut S,
        message: &mut Mailbox,
        payload_len: usize,
    ) -> Result<()>
    where
        S: AsyncRead + AsyncWrite + Unpin,
    {
        debug_assert!(self.role != Role::Server, "server channels carry no traffic");

        if payload_len > self.config.max_payload_size {
            return Err(ChannelError::Oversized(payload_len));
        }

        if self.local_counter.series() == 0 && self.local_counter.message() == 0 {
            debug_assert!(self.role == Role::Client, "the client speaks first");
            self.open_as_client(stream).await?;
        }

        if self.needs_rekey() {
            self.reset_counters();
            self.rotate_keys_as_sender(stream).await?;
        }

        let frame = self.frame.as_ref().expect("buffers not prepared");
        debug_assert!(frame.body_len() == payload_len, "buffers sized differently");

        let ticket = self.local_counter.series();
        let index = self.local_counter.message();
        let total = frame.len();
        frame.header().write(message, ticket, index, total as i32);
        frame.authenticate_encrypt(
            message,
            self.local_auth.as_ref().expect("channel not keyed"),
            self.local_cipher.as_ref().expect("channel not keyed"),
            &mut self.local_counter,
        );

        send_all(stream, &message.view()[..total]).await?;
        debug!(ticket, index, length = total, "message sent");

        self.bytes_since_rekey += payload_len as u64;
        self.local_counter.increment_message();
        Ok(())
    }

    /// Receive one message into the data frame, returning the payload
    /// length.
    ///
    /// Runs the answering side of the opening handshake on the first receive
    /// of a service, and answers any re-key rounds the peer initiates before
    /// the data frame arrives.
    pub(crate) async fn receive<S>(&mut self, stream: &mut S, message: &mut Mailbox) -> Result<usize>
    where
        S: AsyncRead + AsyncWrite + Unpin,
    {
        debug_assert!(self.role != Role::Server, "server channels carry no traffic");

        if self.local_counter.series() == 0 && self.local_counter.message() == 0 {
            debug_assert!(self.role == Role::Service, "the client speaks first");
            self.answer_as_service(stream).await?;
        }

        if self.frame.is_none() {
            self.prepare_buffers(message, 0);
        }

        loop {
            receive_all(stream, &mut message.view_mut()[..HEADER_BYTES], self.role).await?;
            let (ticket, index, length) = {
                let frame = self.frame.as_ref().expect("buffers not prepared");
                (
                    frame.header().ticket(message),
                    frame.header().index(message),
                    frame.header().length(message),
                )
            };

            if index != 0 {
                return self.receive_body(stream, message, ticket, index, length).await;
            }

            // index 0: the peer is rotating keys
            self.reset_counters();
            self.rotate_keys_as_receiver(stream, (ticket, index, length)).await?;
        }
    }

    async fn receive_body<S>(
        &mut self,
        stream: &mut S,
        message: &mut Mailbox,
        ticket: i64,
        index: i32,
        length: i32,
    ) -> Result<usize>
    where
        S: AsyncRead + AsyncWrite + Unpin,
    {
        if ticket != self.remote_counter.series() || index != self.remote_counter.message() {
            return Err(ChannelError::ProtocolViolation(
                constants::ERR_HEADER_MISMATCH,
            ));
        }
        let minimum = SymmetricFrame::frame_len(0) as i32;
        if length < minimum {
            return Err(ChannelError::ProtocolViolation(constants::ERR_BAD_LENGTH));
        }
        let payload_len = length as usize - HEADER_BYTES - TAG_BYTES;
        if payload_len > self.config.max_payload_size {
            return Err(ChannelError::Oversized(payload_len));
        }

        self.prepare_buffers(message, payload_len);
        let total = SymmetricFrame::frame_len(payload_len);
        receive_all(
            stream,
            &mut message.view_mut()[HEADER_BYTES..total],
            self.role,
        )
        .await?;

        let frame = self.frame.as_ref().expect("buffers not prepared");
        frame.decrypt_verify(
            message,
            self.remote_auth.as_ref().expect("channel not keyed"),
            self.remote_cipher.as_ref().expect("channel not keyed"),
            &mut self.remote_counter,
        )?;
        debug!(ticket, index, length, "message received");

        self.bytes_since_rekey += payload_len as u64;
        self.remote_counter.increment_message();
        Ok(payload_len)
    }

    /// Client half of the opening: key exchange out, ticket in.
    async fn open_as_client<S>(&mut self, stream: &mut S) -> Result<()>
    where
        S: AsyncRead + AsyncWrite + Unpin,
    {
        let public_key =
            PublicCipher::from_der(self.public_key.as_ref().expect("client key missing"))?;
        let mut exchange = KeyExchange::prepare();
        let secret = exchange.send(stream, &public_key).await?;
        self.install_secret(secret.as_ref());

        let mut ticket = ControlFrame::prepare(ControlKind::Opening);
        let series = ticket
            .receive_ticket(
                stream,
                0,
                self.remote_auth.as_ref().expect("channel not keyed"),
                self.remote_cipher.as_ref().expect("channel not keyed"),
                &mut self.remote_counter,
                self.role,
            )
            .await?;
        if series == 0 {
            return Err(ChannelError::ProtocolViolation(constants::ERR_BAD_SERIES));
        }

        self.local_counter.change_series(series);
        self.remote_counter.change_series(series);
        self.mark_rekeyed();
        debug!(series, "channel opened");
        Ok(())
    }

    /// Service half of the opening: key exchange in, ticket out.
    async fn answer_as_service<S>(&mut self, stream: &mut S) -> Result<()>
    where
        S: AsyncRead + AsyncWrite + Unpin,
    {
        let private_key =
            PrivateCipher::from_der(self.private_key.as_ref().expect("service key missing"))?;
        let mut exchange = KeyExchange::prepare();
        let secret = exchange.receive(stream, &private_key, self.role).await?;
        self.install_secret(secret.as_ref());

        let series = random::fresh_series(0);
        let mut ticket = ControlFrame::prepare(ControlKind::Opening);
        ticket
            .send_ticket(
                stream,
                series,
                0,
                0,
                self.local_auth.as_ref().expect("channel not keyed"),
                self.local_cipher.as_ref().expect("channel not keyed"),
                &mut self.local_counter,
            )
            .await?;

        self.local_counter.change_series(series);
        self.remote_counter.change_series(series);
        self.mark_rekeyed();
        debug!(series, "channel opened");
        Ok(())
    }

    /// Initiating side of a re-key: secret out under the old keys, ticket in
    /// under the new ones.
    async fn rotate_keys_as_sender<S>(&mut self, stream: &mut S) -> Result<()>
    where
        S: AsyncRead + AsyncWrite + Unpin,
    {
        let mut secret = Zeroizing::new([0u8; SECRET_BYTES]);
        random::fill(secret.as_mut());

        let series = self.local_counter.series();
        let index = self.local_counter.message();
        let mut control = ControlFrame::prepare(ControlKind::Secret);
        control
            .send_secret(
                stream,
                series,
                index,
                secret.as_ref(),
                self.local_auth.as_ref().expect("channel not keyed"),
                self.local_cipher.as_ref().expect("channel not keyed"),
                &mut self.local_counter,
            )
            .await?;
        self.install_secret(secret.as_ref());

        let expected = self.remote_counter.series();
        let mut ticket = ControlFrame::prepare(ControlKind::Ticket);
        let new_series = ticket
            .receive_ticket(
                stream,
                expected,
                self.remote_auth.as_ref().expect("channel not keyed"),
                self.remote_cipher.as_ref().expect("channel not keyed"),
                &mut self.remote_counter,
                self.role,
            )
            .await?;
        if new_series == 0 || new_series == self.local_counter.series() {
            return Err(ChannelError::ProtocolViolation(constants::ERR_BAD_SERIES));
        }

        self.local_counter.change_series(new_series);
        self.remote_counter.change_series(new_series);
        self.mark_rekeyed();
        debug!(series = new_series, "keys rotated");
        Ok(())
    }

    /// Answering side of a re-key: secret in under the old keys, ticket out
    /// under the new ones.
    async fn rotate_keys_as_receiver<S>(
        &mut self,
        stream: &mut S,
        header: (i64, i32, i32),
    ) -> Result<()>
    where
        S: AsyncRead + AsyncWrite + Unpin,
    {
        let expected = self.remote_counter.series();
        let mut control = ControlFrame::prepare(ControlKind::Secret);
        let secret = control
            .receive_secret(
                stream,
                header,
                expected,
                self.remote_auth.as_ref().expect("channel not keyed"),
                self.remote_cipher.as_ref().expect("channel not keyed"),
                &mut self.remote_counter,
                self.role,
            )
            .await?;
        self.install_secret(secret.as_ref());

        let new_series = random::fresh_series(self.local_counter.series());
        let series = self.local_counter.series();
        let index = self.local_counter.message();
        let mut ticket = ControlFrame::prepare(ControlKind::Ticket);
        ticket
            .send_ticket(
                stream,
                new_series,
                series,
                index,
                self.local_auth.as_ref().expect("channel not keyed"),
                self.local_cipher.as_ref().expect("channel not keyed"),
                &mut self.local_counter,
            )
            .await?;

        self.local_counter.change_series(new_series);
        self.remote_counter.change_series(new_series);
        self.mark_rekeyed();
        debug!(series = new_series, "keys rotated");
        Ok(())
    }

    /// Whether the local series is spent: the message number wrapped to 0,
    /// or the byte/time accounting crossed a threshold.
    fn needs_rekey(&self) -> bool {
        self.local_counter.message() == 0
            || self.bytes_since_rekey > self.config.rekey_after_bytes
            || self.rekeyed_at.elapsed() > self.config.rekey_interval
    }

    /// Return both counters to message 0 ahead of a series change. A counter
    /// that already wrapped there stays put.
    fn reset_counters(&mut self) {
        if self.local_counter.message() > 0 {
            self.local_counter.reset_message();
        }
        if self.remote_counter.message() > 0 {
            self.remote_counter.reset_message();
        }
    }

    /// Derive the four sub-keys from `secret` and install the pair that
    /// matches this endpoint's role in each direction. Previous cipher and
    /// authenticator instances are dropped on replacement.
    fn install_secret(&mut self, secret: &[u8]) {
        debug_assert!(secret.len() == SECRET_BYTES, "invalid secret length");
        debug_assert!(SECRET_BYTES == block::KEY_BYTES, "secret is the key size");

        let keyed = Authenticator::new(secret);
        let derive = |name: &str| Zeroizing::new(keyed.compute(&utf16be_bytes(name)));

        let client_cipher = derive(CLIENT_CIPHER_KEY);
        let service_cipher = derive(SERVICE_CIPHER_KEY);
        let client_auth = derive(CLIENT_AUTH_KEY);
        let service_auth = derive(SERVICE_AUTH_KEY);

        let (local_cipher, remote_cipher, local_auth, remote_auth) = match self.role {
            Role::Client => (&client_cipher, &service_cipher, &client_auth, &service_auth),
            Role::Service => (&service_cipher, &client_cipher, &service_auth, &client_auth),
            Role::Server => unreachable!("server channels derive no keys"),
        };
        self.local_cipher = Some(BlockCipher::new(local_cipher.as_ref()));
        self.remote_cipher = Some(BlockCipher::new(remote_cipher.as_ref()));
        self.local_auth = Some(Authenticator::new(local_auth.as_ref()));
        self.remote_auth = Some(Authenticator::new(remote_auth.as_ref()));
    }

    fn mark_rekeyed(&mut self) {
        self.bytes_since_rekey = 0;
        self.rekeyed_at = Instant::now();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::crypto::asymmetric::generate_key_pair;
    use tokio::io::DuplexStream;

    fn pair(config: ChannelConfig) -> (SecureChannel, SecureChannel) {
        let (public_der, private_der) = generate_key_pair().unwrap();
        let client = SecureChannel::client(public_der, config.clone());
        let server = SecureChannel::server(private_der, config);
        let service = SecureChannel::service(&server);
        (client, service)
    }

    async fn exchange(
        client: &mut SecureChannel,
        client_stream: &mut DuplexStream,
        client_message: &mut Mailbox,
        service: &mut SecureChannel,
        service_stream: &mut DuplexStream,
        service_message: &mut Mailbox,
        payload: &[u8],
    ) -> usize {
        client.prepare_buffers(client_message, payload.len());
        client.payload_mut(client_message).copy_from_slice(payload);

        let (sent, received) = tokio::join!(
            client.send(client_stream, client_message, payload.len()),
            service.receive(service_stream, service_message),
        );
        sent.unwrap();
        received.unwrap()
    }

    #[tokio::test]
    async fn opening_aligns_both_endpoints() {
        let (mut client, mut service) = pair(ChannelConfig::default());
        let (mut cs, mut ss) = tokio::io::duplex(64 * 1024);
        let mut cm = Mailbox::new();
        let mut sm = Mailbox::new();

        let n = exchange(
            &mut client, &mut cs, &mut cm, &mut service, &mut ss, &mut sm, b"hello",
        )
        .await;
        assert_eq!(n, 5);
        assert_eq!(service.payload(&sm), b"hello");

        // one shared nonzero series, message 1 consumed on both ends
        let series = client.local_counter.series();
        assert_ne!(series, 0);
        assert_eq!(service.local_counter.series(), series);
        assert_eq!(service.remote_counter.series(), series);
        assert_eq!(client.remote_counter.series(), series);
        assert_eq!(client.local_counter.message(), 2);
        assert_eq!(service.remote_counter.message(), 2);
        assert_eq!(service.local_counter.message(), 1);
    }

    #[tokio::test]
    async fn traffic_flows_both_ways() {
        let (mut client, mut service) = pair(ChannelConfig::default());
        let (mut cs, mut ss) = tokio::io::duplex(64 * 1024);
        let mut cm = Mailbox::new();
        let mut sm = Mailbox::new();

        exchange(
            &mut client, &mut cs, &mut cm, &mut service, &mut ss, &mut sm, b"ping",
        )
        .await;

        // service replies
        service.prepare_buffers(&mut sm, 4);
        service.payload_mut(&mut sm).copy_from_slice(b"pong");
        let (sent, received) = tokio::join!(
            service.send(&mut ss, &mut sm, 4),
            client.receive(&mut cs, &mut cm),
        );
        sent.unwrap();
        assert_eq!(received.unwrap(), 4);
        assert_eq!(client.payload(&cm), b"pong");
    }

    #[tokio::test]
    async fn byte_threshold_forces_series_change() {
        let config = ChannelConfig::default_with_overrides(|c| c.rekey_after_bytes = 8);
        let (mut client, mut service) = pair(config);
        let (mut cs, mut ss) = tokio::io::duplex(64 * 1024);
        let mut cm = Mailbox::new();
        let mut sm = Mailbox::new();

        exchange(
            &mut client, &mut cs, &mut cm, &mut service, &mut ss, &mut sm, b"0123456789",
        )
        .await;
        let first_series = client.local_counter.series();

        // 10 bytes crossed the 8-byte threshold: the next send re-keys first
        exchange(
            &mut client, &mut cs, &mut cm, &mut service, &mut ss, &mut sm, b"after",
        )
        .await;
        let second_series = client.local_counter.series();
        assert_ne!(second_series, first_series);
        assert_ne!(second_series, 0);
        assert_eq!(service.local_counter.series(), second_series);
        assert_eq!(service.payload(&sm), b"after");

        // and traffic keeps flowing under the new series
        exchange(
            &mut client, &mut cs, &mut cm, &mut service, &mut ss, &mut sm, b"still works",
        )
        .await;
        assert_eq!(service.payload(&sm), b"still works");
    }

    #[tokio::test]
    async fn buffers_grow_but_never_shrink() {
        let (mut client, _service) = pair(ChannelConfig::default());
        let mut message = Mailbox::new();

        client.prepare_buffers(&mut message, 100);
        let capacity = message.len();
        assert_eq!(capacity, SymmetricFrame::frame_len(100));
        client.payload_mut(&mut message)[..4].copy_from_slice(b"keep");

        client.prepare_buffers(&mut message, 50);
        assert_eq!(message.len(), capacity);
        assert_eq!(&client.payload(&message)[..4], b"keep");

        client.prepare_buffers(&mut message, 200);
        assert_eq!(message.len(), SymmetricFrame::frame_len(200));
        assert_eq!(&client.payload(&message)[..4], b"keep");
    }

    #[tokio::test]
    async fn oversized_send_is_rejected() {
        let config = ChannelConfig::default_with_overrides(|c| c.max_payload_size = 16);
        let (mut client, _service) = pair(config);
        let (mut cs, _ss) = tokio::io::duplex(1024);
        let mut cm = Mailbox::new();

        client.prepare_buffers(&mut cm, 32);
        let result = client.send(&mut cs, &mut cm, 32).await;
        assert!(matches!(result, Err(ChannelError::Oversized(32))));
    }
}

//! # Connection
//!
//! A TCP connection endpoint in the client/server/service topology.
//!
//! A server connection only listens: [`accept`](Connection::accept) mints an
//! independent service connection per client, each of which may be driven on
//! its own task. Client and service connections exchange whole payloads,
//! length-framed; there is no internal locking because nothing is shared
//! between connections.
//!
//! A connection is either plain or secure for its whole life. Secure
//! connections are created with [`listen_secure`](Connection::listen_secure)
//! and [`connect_secure`](Connection::connect_secure); the channel runs its
//! handshake lazily on the first message and rotates keys in-band from then
//! on, invisibly to the caller.
//!
//! One message buffer serves each connection, sized to the largest frame
//! seen so far; it grows but never shrinks.

use crate::config::{ChannelConfig, MAX_PAYLOAD_SIZE};
use crate::core::{Mailbox, Portion};
use crate::error::{constants, ChannelError, Result};
use crate::protocol::channel::{Role, SecureChannel};
use crate::transport::{receive_all, send_all};
use std::net::SocketAddr;
use tokio::io::AsyncWriteExt;
use tokio::net::{TcpListener, TcpStream};
use tracing::{debug, info};

/// Length prefix on plain-mode messages.
const PLAIN_HEADER_BYTES: usize = 4;

enum Endpoint {
    Listener(TcpListener),
    Stream(TcpStream),
}

/// One endpoint of a connection.
pub struct Connection {
    endpoint: Endpoint,
    role: Role,
    errored: bool,
    closed: bool,
    message: Mailbox,
    /// Payload window in plain mode; the secure channel keeps its own.
    payload: Option<Portion>,
    security: Option<SecureChannel>,
}

impl Connection {
    /// Bind a plain listening server on `addr`.
    pub async fn listen(addr: &str) -> Result<Connection> {
        let listener = TcpListener::bind(addr).await?;
        info!(addr, "listening");
        Ok(Self::fresh(Endpoint::Listener(listener), Role::Server, None))
    }

    /// Bind a secure listening server on `addr`, holding the RSA private key
    /// (PKCS#1 DER) its service connections will use.
    pub async fn listen_secure(
        addr: &str,
        private_key_der: Vec<u8>,
        config: ChannelConfig,
    ) -> Result<Connection> {
        config.validate_strict()?;
        let listener = TcpListener::bind(addr).await?;
        info!(addr, "listening (secure)");
        let channel = SecureChannel::server(private_key_der, config);
        Ok(Self::fresh(
            Endpoint::Listener(listener),
            Role::Server,
            Some(channel),
        ))
    }

    /// Connect a plain client to `addr`.
    pub async fn connect(addr: &str) -> Result<Connection> {
        let stream = TcpStream::connect(addr).await?;
        info!(addr, "connected");
        Ok(Self::fresh(Endpoint::Stream(stream), Role::Client, None))
    }

    /// Connect a secure client to `addr`, holding the server's RSA public
    /// key (PKCS#1 DER).
    pub async fn connect_secure(
        addr: &str,
        public_key_der: Vec<u8>,
        config: ChannelConfig,
    ) -> Result<Connection> {
        config.validate_strict()?;
        let stream = TcpStream::connect(addr).await?;
        info!(addr, "connected (secure)");
        let channel = SecureChannel::client(public_key_der, config);
        Ok(Self::fresh(
            Endpoint::Stream(stream),
            Role::Client,
            Some(channel),
        ))
    }

    fn fresh(endpoint: Endpoint, role: Role, security: Option<SecureChannel>) -> Connection {
        Connection {
            endpoint,
            role,
            errored: false,
            closed: false,
            message: Mailbox::new(),
            payload: None,
            security,
        }
    }

    /// Accept one client, minting an independent service connection. Only
    /// legal on a server connection.
    pub async fn accept(&self) -> Result<Connection> {
        let Endpoint::Listener(listener) = &self.endpoint else {
            panic!("accept on a non-server connection");
        };
        let (stream, peer) = listener.accept().await?;
        info!(peer = %peer, "client connected");

        let security = self.security.as_ref().map(SecureChannel::service);
        Ok(Self::fresh(Endpoint::Stream(stream), Role::Service, security))
    }

    /// The address this endpoint is bound or connected to.
    pub fn local_addr(&self) -> Result<SocketAddr> {
        let addr = match &self.endpoint {
            Endpoint::Listener(listener) => listener.local_addr()?,
            Endpoint::Stream(stream) => stream.local_addr()?,
        };
        Ok(addr)
    }

    /// The endpoint's role.
    pub fn role(&self) -> Role {
        self.role
    }

    /// Whether this connection carries a secure channel.
    pub fn is_secure(&self) -> bool {
        self.security.is_some()
    }

    /// Send one payload to the peer.
    pub async fn send(&mut self, payload: &[u8]) -> Result<()> {
        let limit = self
            .security
            .as_ref()
            .map_or(MAX_PAYLOAD_SIZE, SecureChannel::max_payload);
        if payload.len() > limit {
            // rejected before any buffer or socket state changes
            return Err(ChannelError::Oversized(payload.len()));
        }
        match self.send_message(payload).await {
            Ok(()) => Ok(()),
            Err(e) => {
                self.note_failure(&e);
                Err(e)
            }
        }
    }

    /// Receive one payload from the peer. The returned view lives in the
    /// connection's message buffer and is valid until the next operation.
    pub async fn receive(&mut self) -> Result<&[u8]> {
        match self.receive_message().await {
            Ok(()) => Ok(self.payload_view()),
            Err(e) => {
                self.note_failure(&e);
                Err(e)
            }
        }
    }

    /// Terminate the connection, releasing buffers and crypto state.
    ///
    /// A client that is still healthy performs the orderly shutdown so the
    /// service sees [`ChannelError::Interrupted`] instead of a fault; a
    /// service never insists, since the peer may already be gone.
    pub async fn close(mut self) -> Result<()> {
        if let Endpoint::Stream(stream) = &mut self.endpoint {
            if self.role == Role::Client && !self.errored && !self.closed {
                stream.shutdown().await?;
            }
        }
        if let Some(mut channel) = self.security.take() {
            channel.deactivate(&mut self.message);
        }
        if let Some(portion) = self.payload.take() {
            self.message.release_portion(portion);
        }
        self.message.release();
        debug!("connection closed");
        Ok(())
    }

    async fn send_message(&mut self, payload: &[u8]) -> Result<()> {
        self.check_live();

        if let Some(channel) = &mut self.security {
            channel.prepare_buffers(&mut self.message, payload.len());
            channel.payload_mut(&mut self.message).copy_from_slice(payload);
            let Endpoint::Stream(stream) = &mut self.endpoint else {
                unreachable!("checked by check_live");
            };
            return channel.send(stream, &mut self.message, payload.len()).await;
        }

        self.prepare_plain_buffers(payload.len());
        self.message.set_i32(0, payload.len() as i32);
        let portion = self.payload.as_ref().expect("buffers not prepared");
        self.message.portion_view_mut(portion).copy_from_slice(payload);

        let total = PLAIN_HEADER_BYTES + payload.len();
        let Endpoint::Stream(stream) = &mut self.endpoint else {
            unreachable!("checked by check_live");
        };
        send_all(stream, &self.message.view()[..total]).await
    }

    async fn receive_message(&mut self) -> Result<()> {
        self.check_live();

        if let Some(channel) = self.security.as_mut() {
            let Endpoint::Stream(stream) = &mut self.endpoint else {
                unreachable!("checked by check_live");
            };
            channel.receive(stream, &mut self.message).await?;
            return Ok(());
        }

        if self.message.is_empty() {
            self.prepare_plain_buffers(0);
        }
        {
            let Endpoint::Stream(stream) = &mut self.endpoint else {
                unreachable!("checked by check_live");
            };
            receive_all(
                stream,
                &mut self.message.view_mut()[..PLAIN_HEADER_BYTES],
                self.role,
            )
            .await?;
        }

        let length = self.message.get_i32(0);
        if length < 0 {
            return Err(ChannelError::ProtocolViolation(constants::ERR_BAD_LENGTH));
        }
        let payload_len = length as usize;
        if payload_len > MAX_PAYLOAD_SIZE {
            return Err(ChannelError::Oversized(payload_len));
        }

        self.prepare_plain_buffers(payload_len);
        let Endpoint::Stream(stream) = &mut self.endpoint else {
            unreachable!("checked by check_live");
        };
        receive_all(
            stream,
            &mut self.message.view_mut()[PLAIN_HEADER_BYTES..PLAIN_HEADER_BYTES + payload_len],
            self.role,
        )
        .await
    }

    fn payload_view(&self) -> &[u8] {
        if let Some(channel) = &self.security {
            return channel.payload(&self.message);
        }
        let portion = self.payload.as_ref().expect("buffers not prepared");
        self.message.portion_view(portion)
    }

    /// Grow-only sizing of the plain-mode buffers, mirroring the secure
    /// channel's policy: grow by reallocating and copying, shrink by
    /// resizing the payload window in place.
    fn prepare_plain_buffers(&mut self, payload_len: usize) {
        let needed = PLAIN_HEADER_BYTES + payload_len;

        if self.message.is_empty() {
            self.message.allocate(needed);
            self.payload = Some(self.message.make_portion(PLAIN_HEADER_BYTES, payload_len));
            return;
        }
        if self.message.len() < needed {
            if let Some(portion) = self.payload.take() {
                self.message.release_portion(portion);
            }
            let mut grown = Mailbox::new();
            grown.allocate(needed);
            Mailbox::copy_bytes(&self.message, &mut grown, self.message.len());
            self.message.transfer_from(&mut grown);
            self.payload = Some(self.message.make_portion(PLAIN_HEADER_BYTES, payload_len));
            return;
        }
        match &mut self.payload {
            Some(portion) => {
                let delta = payload_len as isize - portion.len() as isize;
                if delta != 0 {
                    self.message.resize(portion, delta);
                }
            }
            None => {
                self.payload = Some(self.message.make_portion(PLAIN_HEADER_BYTES, payload_len));
            }
        }
    }

    fn check_live(&self) {
        assert!(
            matches!(self.endpoint, Endpoint::Stream(_)),
            "server connections carry no traffic"
        );
        assert!(!self.errored, "connection already failed");
    }

    fn note_failure(&mut self, error: &ChannelError) {
        match error {
            ChannelError::Interrupted => self.closed = true,
            ChannelError::Config(_) => {}
            // an oversized length field mid-receive leaves the stream
            // desynchronized, so it poisons the connection like any fault
            _ => self.errored = true,
        }
    }
}

//! # Transport
//!
//! TCP connections and the raw exact-count I/O the channel is built on.
//!
//! `send_all` and `receive_all` carry the contract the protocol depends on:
//! a send completes only when every byte has been written, a receive only
//! when every requested byte has arrived. An orderly shutdown by the peer is
//! reported differently depending on the local role: a client treats it as
//! the server hanging up mid-protocol, a service treats it as the expected
//! way for a client to depart.

pub mod connection;

pub use connection::Connection;

use crate::error::{ChannelError, Result};
use crate::protocol::channel::Role;
use std::io::ErrorKind;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};

/// Write all of `data`, or fail.
pub(crate) async fn send_all<S>(stream: &mut S, data: &[u8]) -> Result<()>
where
    S: AsyncWrite + Unpin,
{
    stream.write_all(data).await?;
    Ok(())
}

/// Fill all of `target`, or fail. Peer shutdown maps by role.
pub(crate) async fn receive_all<S>(stream: &mut S, target: &mut [u8], role: Role) -> Result<()>
where
    S: AsyncRead + Unpin,
{
    match stream.read_exact(target).await {
        Ok(_) => Ok(()),
        Err(e) if e.kind() == ErrorKind::UnexpectedEof => {
            if role == Role::Client {
                Err(ChannelError::Disconnected)
            } else {
                Err(ChannelError::Interrupted)
            }
        }
        Err(e) => Err(e.into()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn receive_all_requires_exact_count() {
        let (mut a, mut b) = tokio::io::duplex(64);
        send_all(&mut a, b"12345678").await.unwrap();

        let mut first = [0u8; 3];
        let mut rest = [0u8; 5];
        receive_all(&mut b, &mut first, Role::Service).await.unwrap();
        receive_all(&mut b, &mut rest, Role::Service).await.unwrap();
        assert_eq!(&first, b"123");
        assert_eq!(&rest, b"45678");
    }

    #[tokio::test]
    async fn shutdown_maps_by_role() {
        let (a, mut b) = tokio::io::duplex(64);
        drop(a);
        let mut buf = [0u8; 1];
        assert!(matches!(
            receive_all(&mut b, &mut buf, Role::Service).await,
            Err(ChannelError::Interrupted)
        ));

        let (a, mut b) = tokio::io::duplex(64);
        drop(a);
        assert!(matches!(
            receive_all(&mut b, &mut buf, Role::Client).await,
            Err(ChannelError::Disconnected)
        ));
    }
}

//! Network infrastructure: the byte stream to the peer.
//!
//! The peer protocol has no envelope of its own: each message is exactly one
//! wire frame.  [`StreamPeer`] therefore just moves bytes; accumulating them
//! into frames is the relay's job.
//!
//! [`StreamPeer`] is generic over the stream so tests can drive it with
//! `tokio_test::io::Builder` instead of a real socket.

use std::net::SocketAddr;
use std::time::Duration;

use async_trait::async_trait;
use tokio::{
    io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt},
    net::TcpStream,
    time,
};
use tracing::{info, warn};

use crate::application::network_relay::{PeerTransport, TransportError};

pub mod mock;

/// A [`PeerTransport`] over any async byte stream.
pub struct StreamPeer<S> {
    stream: S,
}

/// The production transport.
pub type TcpPeer = StreamPeer<TcpStream>;

impl<S> StreamPeer<S> {
    pub fn new(stream: S) -> Self {
        Self { stream }
    }

    pub fn into_inner(self) -> S {
        self.stream
    }
}

#[async_trait]
impl<S> PeerTransport for StreamPeer<S>
where
    S: AsyncRead + AsyncWrite + Unpin + Send,
{
    async fn send(&mut self, bytes: &[u8]) -> Result<(), TransportError> {
        self.stream
            .write_all(bytes)
            .await
            .map_err(TransportError::Send)?;
        self.stream.flush().await.map_err(TransportError::Send)
    }

    async fn recv(&mut self, buf: &mut [u8], timeout: Duration) -> Result<usize, TransportError> {
        match time::timeout(timeout, self.stream.read(buf)).await {
            Ok(Ok(n)) => Ok(n),
            Ok(Err(e)) => Err(TransportError::Recv(e)),
            Err(_) => Err(TransportError::TimedOut(timeout)),
        }
    }
}

/// Connects to the peer at `addr`.
///
/// Nagle's algorithm is disabled: every message is a single small frame and
/// the relay waits for a reply after each one.
///
/// # Errors
///
/// Returns [`TransportError::ConnectFailed`] if the connection cannot be made.
pub async fn connect(addr: SocketAddr) -> Result<TcpPeer, TransportError> {
    let stream = TcpStream::connect(addr)
        .await
        .map_err(|source| TransportError::ConnectFailed { addr, source })?;
    if let Err(e) = stream.set_nodelay(true) {
        warn!("could not set TCP_NODELAY on peer socket: {e}");
    }
    info!("connected to peer {addr}");
    Ok(StreamPeer::new(stream))
}

// ── Tests ─────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use hidrelay_core::{encode_confirm, Frame};
    use tokio::net::TcpListener;
    use tokio_test::io::Builder;

    #[tokio::test]
    async fn test_send_writes_whole_wire_frame() {
        // Arrange
        let frame = Frame::data(b"hello").unwrap();
        let mock = Builder::new().write(&frame.to_wire()).build();
        let mut peer = StreamPeer::new(mock);

        // Act / Assert – the mock panics on any unexpected write
        peer.send(&frame.to_wire()).await.unwrap();
    }

    #[tokio::test]
    async fn test_recv_returns_partial_reads_as_they_arrive() {
        // Arrange
        let wire = encode_confirm().to_wire();
        let mock = Builder::new().read(&wire[..20]).read(&wire[20..]).build();
        let mut peer = StreamPeer::new(mock);
        let mut buf = [0u8; 64];

        // Act
        let first = peer.recv(&mut buf, Duration::from_secs(1)).await.unwrap();
        let second = peer
            .recv(&mut buf[first..], Duration::from_secs(1))
            .await
            .unwrap();

        // Assert
        assert_eq!(first, 20);
        assert_eq!(second, 44);
        assert_eq!(buf, wire);
    }

    #[tokio::test]
    async fn test_recv_times_out_when_peer_is_silent() {
        let mock = Builder::new().wait(Duration::from_secs(5)).build();
        let mut peer = StreamPeer::new(mock);
        let mut buf = [0u8; 64];

        let result = peer.recv(&mut buf, Duration::from_millis(10)).await;

        assert!(matches!(result, Err(TransportError::TimedOut(_))), "got {result:?}");
    }

    #[tokio::test]
    async fn test_recv_reports_close_as_zero_bytes() {
        let mock = Builder::new().build();
        let mut peer = StreamPeer::new(mock);
        let mut buf = [0u8; 64];

        let n = peer.recv(&mut buf, Duration::from_secs(1)).await.unwrap();

        assert_eq!(n, 0);
    }

    #[tokio::test]
    async fn test_recv_maps_io_error() {
        let mock = Builder::new()
            .read_error(std::io::Error::new(std::io::ErrorKind::ConnectionReset, "reset"))
            .build();
        let mut peer = StreamPeer::new(mock);
        let mut buf = [0u8; 64];

        let result = peer.recv(&mut buf, Duration::from_secs(1)).await;

        assert!(matches!(result, Err(TransportError::Recv(_))), "got {result:?}");
    }

    #[tokio::test]
    async fn test_connect_to_listening_socket_succeeds() {
        // Arrange
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();

        // Act
        let (peer, accepted) = tokio::join!(connect(addr), listener.accept());

        // Assert
        let peer = peer.expect("connect");
        assert!(accepted.is_ok());
        assert!(peer.into_inner().nodelay().unwrap());
    }

    #[tokio::test]
    async fn test_connect_to_closed_port_fails() {
        // Bind then drop to find a port nobody is listening on.
        let addr = {
            let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
            listener.local_addr().unwrap()
        };

        let result = connect(addr).await;

        assert!(
            matches!(result, Err(TransportError::ConnectFailed { addr: a, .. }) if a == addr),
            "connect to a closed port must fail"
        );
    }
}

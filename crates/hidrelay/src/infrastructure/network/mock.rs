//! Scripted peer for tests.
//!
//! A [`MockPeer`] is driven by a responder closure: every request sent to it
//! produces a list of [`MockReply`] items that later `recv` calls hand back in
//! order.  Byte replies larger than the caller's buffer are split across
//! reads, like a real stream.

use std::collections::VecDeque;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use hidrelay_core::{encode_confirm, Frame};

use crate::application::network_relay::{PeerTransport, TransportError};

/// One scripted reply.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MockReply {
    /// Bytes delivered by the next read(s).
    Bytes(Vec<u8>),
    /// One read that times out.
    Silence,
    /// The peer closes the connection.
    Close,
}

type Responder = Box<dyn FnMut(&[u8]) -> Vec<MockReply> + Send>;

#[derive(Debug, Default)]
struct MockPeerLog {
    sent: Vec<Vec<u8>>,
    recv_calls: u32,
}

/// A mock implementation of [`PeerTransport`].
pub struct MockPeer {
    responder: Responder,
    replies: VecDeque<MockReply>,
    log: Arc<Mutex<MockPeerLog>>,
}

/// Inspection handle that stays valid after the peer is moved into the relay.
#[derive(Clone)]
pub struct MockPeerHandle {
    log: Arc<Mutex<MockPeerLog>>,
}

impl MockPeer {
    pub fn new(responder: impl FnMut(&[u8]) -> Vec<MockReply> + Send + 'static) -> Self {
        Self {
            responder: Box::new(responder),
            replies: VecDeque::new(),
            log: Arc::new(Mutex::new(MockPeerLog::default())),
        }
    }

    /// A peer that confirms every request and answers with the request itself.
    pub fn echo() -> Self {
        Self::new(|request| {
            vec![
                MockReply::Bytes(encode_confirm().to_wire().to_vec()),
                MockReply::Bytes(request.to_vec()),
            ]
        })
    }

    /// A peer that never answers.
    pub fn silent() -> Self {
        Self::new(|_| Vec::new())
    }

    /// A peer that confirms every request and answers with `response`.
    pub fn responding_with(response: Frame) -> Self {
        Self::new(move |_| {
            vec![
                MockReply::Bytes(encode_confirm().to_wire().to_vec()),
                MockReply::Bytes(response.to_wire().to_vec()),
            ]
        })
    }

    pub fn handle(&self) -> MockPeerHandle {
        MockPeerHandle {
            log: Arc::clone(&self.log),
        }
    }

    fn log(&self) -> std::sync::MutexGuard<'_, MockPeerLog> {
        self.log.lock().expect("lock poisoned")
    }
}

impl MockPeerHandle {
    /// Every message sent to the peer, oldest first.
    pub fn sent(&self) -> Vec<Vec<u8>> {
        self.log.lock().expect("lock poisoned").sent.clone()
    }

    /// Number of `recv` calls made so far.
    pub fn recv_calls(&self) -> u32 {
        self.log.lock().expect("lock poisoned").recv_calls
    }
}

#[async_trait]
impl PeerTransport for MockPeer {
    async fn send(&mut self, bytes: &[u8]) -> Result<(), TransportError> {
        self.log().sent.push(bytes.to_vec());
        let replies = (self.responder)(bytes);
        self.replies.extend(replies);
        Ok(())
    }

    async fn recv(&mut self, buf: &mut [u8], timeout: Duration) -> Result<usize, TransportError> {
        self.log().recv_calls += 1;
        match self.replies.pop_front() {
            Some(MockReply::Bytes(mut bytes)) => {
                let n = bytes.len().min(buf.len());
                buf[..n].copy_from_slice(&bytes[..n]);
                if n < bytes.len() {
                    self.replies.push_front(MockReply::Bytes(bytes.split_off(n)));
                }
                Ok(n)
            }
            Some(MockReply::Close) => Ok(0),
            Some(MockReply::Silence) | None => {
                tokio::time::sleep(timeout).await;
                Err(TransportError::TimedOut(timeout))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_echo_peer_confirms_then_echoes() {
        // Arrange
        let mut peer = MockPeer::echo();
        let request = Frame::data(b"ping?").unwrap().to_wire();
        let mut buf = [0u8; 64];

        // Act
        peer.send(&request).await.unwrap();
        peer.recv(&mut buf, Duration::ZERO).await.unwrap();
        let confirm = buf;
        peer.recv(&mut buf, Duration::ZERO).await.unwrap();

        // Assert
        assert_eq!(confirm, encode_confirm().to_wire());
        assert_eq!(buf, request);
        assert_eq!(peer.handle().recv_calls(), 2);
    }

    #[tokio::test]
    async fn test_large_reply_is_split_across_reads() {
        let mut peer = MockPeer::new(|_| vec![MockReply::Bytes(vec![7u8; 10])]);
        peer.send(b"x").await.unwrap();
        let mut small = [0u8; 4];

        assert_eq!(peer.recv(&mut small, Duration::ZERO).await.unwrap(), 4);
        assert_eq!(peer.recv(&mut small, Duration::ZERO).await.unwrap(), 4);
        assert_eq!(peer.recv(&mut small, Duration::ZERO).await.unwrap(), 2);
    }

    #[tokio::test]
    async fn test_silent_peer_times_out() {
        let mut peer = MockPeer::silent();
        let handle = peer.handle();
        let mut buf = [0u8; 64];

        let result = peer.recv(&mut buf, Duration::from_millis(1)).await;

        assert!(matches!(result, Err(TransportError::TimedOut(_))));
        assert_eq!(handle.recv_calls(), 1);
        assert!(handle.sent().is_empty());
    }
}

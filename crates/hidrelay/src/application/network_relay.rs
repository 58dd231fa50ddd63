//! NetworkRelay: forwards device frames to the peer and brings responses back.
//!
//! The relay handles one exchange at a time:
//!
//! ```text
//!   Idle ──take──▶ Sending ──ok──▶ AwaitConfirm ──CONFIRM──▶ AwaitResponse
//!    ▲                │                  │                        │
//!    │             error: fatal     retries exhausted:       full frame: publish
//!    │                                abandon                 retries exhausted:
//!    └────────────────────────────────────┴──────────────────── abandon
//! ```
//!
//! Abandoned exchanges are logged and dropped; the request is never re-sent.
//! Only a failed send, an orderly peer close, or a poisoned mailbox end the
//! task.
//!
//! # Byte accumulation
//!
//! The peer stream has no framing beyond the fixed frame size, so `recv` may
//! hand back a frame in pieces.  Bytes are collected into a receive buffer
//! that persists across reads and across exchanges; a frame is only decoded
//! once the buffer is full.  A frame that was still incomplete when its
//! exchange was abandoned is completed by its late remainder and then uses
//! up one CONFIRM attempt of the next exchange, which keeps the stream
//! aligned on frame boundaries.
//!
//! # Responses
//!
//! A response is only published into an empty peer→device slot: the relay
//! does not take the next request until the device link has drained the
//! previous response.

use std::io;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use hidrelay_core::{
    classify, Direction, Frame, FrameError, HexSlice, Mailbox, MailboxError, MessageType,
    WIRE_FRAME_SIZE,
};
use thiserror::Error;
use tokio::time::Instant;
use tracing::{debug, error, info, warn};

/// Error type for peer transport operations.
#[derive(Debug, Error)]
pub enum TransportError {
    #[error("failed to connect to peer {addr}: {source}")]
    ConnectFailed {
        addr: SocketAddr,
        #[source]
        source: io::Error,
    },
    #[error("send to peer failed: {0}")]
    Send(#[source] io::Error),
    #[error("receive from peer failed: {0}")]
    Recv(#[source] io::Error),
    #[error("no data from peer within {0:?}")]
    TimedOut(Duration),
}

/// Byte stream to the peer.
///
/// Infrastructure implementations wrap a TCP socket; tests script replies.
#[async_trait]
pub trait PeerTransport: Send {
    /// Sends `bytes` as one message.
    async fn send(&mut self, bytes: &[u8]) -> Result<(), TransportError>;

    /// Receives up to `buf.len()` bytes, waiting at most `timeout`.
    ///
    /// Returns `Ok(0)` when the peer has closed the connection.
    async fn recv(&mut self, buf: &mut [u8], timeout: Duration) -> Result<usize, TransportError>;
}

/// How often an idle relay re-checks whether the last response was drained.
const RESPONSE_DRAIN_POLL: Duration = Duration::from_millis(1);

/// Fatal outcomes of the relay loop.
#[derive(Debug, Error)]
pub enum RelayError {
    #[error("failed to send request to peer: {0}")]
    Send(#[source] TransportError),
    #[error("peer closed the connection")]
    PeerClosed,
    #[error(transparent)]
    Frame(#[from] FrameError),
    #[error(transparent)]
    Mailbox(#[from] MailboxError),
}

/// Settings for the relay loop.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NetworkRelayConfig {
    /// Upper bound on one read attempt.
    pub read_timeout: Duration,
    /// Read attempts allowed for the CONFIRM, and again for the response.
    pub max_retries: u32,
    /// How long one idle wait lasts before the running flag is re-checked.
    pub idle_poll: Duration,
}

impl Default for NetworkRelayConfig {
    fn default() -> Self {
        Self {
            read_timeout: Duration::from_secs(1),
            max_retries: 10,
            idle_poll: Duration::from_millis(200),
        }
    }
}

/// How a single exchange ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExchangeOutcome {
    /// CONFIRM and a full response arrived; the response was published.
    Completed(Frame),
    /// No CONFIRM within the retry bound.
    NoConfirm,
    /// CONFIRM arrived but the response did not complete within the retry bound.
    Truncated,
}

/// Counters reported when the loop stops cleanly.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RelayStats {
    pub completed: u64,
    pub no_confirm: u64,
    pub truncated: u64,
}

/// The network relay task.
///
/// Owns the peer connection exclusively; it is closed when the task returns.
pub struct NetworkRelay<P: PeerTransport> {
    peer: P,
    mailbox: Arc<Mailbox>,
    config: NetworkRelayConfig,
    rx: [u8; WIRE_FRAME_SIZE],
    filled: usize,
    stats: RelayStats,
}

impl<P: PeerTransport> NetworkRelay<P> {
    pub fn new(peer: P, mailbox: Arc<Mailbox>, config: NetworkRelayConfig) -> Self {
        Self {
            peer,
            mailbox,
            config,
            rx: [0u8; WIRE_FRAME_SIZE],
            filled: 0,
            stats: RelayStats::default(),
        }
    }

    /// Runs exchanges until `running` is cleared or a fatal error occurs.
    ///
    /// # Errors
    ///
    /// Returns [`RelayError`] when a send fails, the peer closes the
    /// connection, or the mailbox lock is poisoned.
    pub async fn run(mut self, running: Arc<AtomicBool>) -> Result<RelayStats, RelayError> {
        info!(
            "network relay started (read timeout {:?}, max retries {})",
            self.config.read_timeout, self.config.max_retries
        );

        while running.load(Ordering::Relaxed) {
            match self.mailbox.is_ready(Direction::PeerToDevice) {
                Ok(false) => {}
                Ok(true) => {
                    tokio::time::sleep(RESPONSE_DRAIN_POLL).await;
                    continue;
                }
                Err(e) => {
                    error!("network relay stopping: {e}");
                    return Err(e.into());
                }
            }
            let taken = self
                .mailbox
                .wait_and_take(Direction::DeviceToPeer, self.config.idle_poll)
                .await;
            let request = match taken {
                Ok(Some(frame)) => frame,
                Ok(None) => continue,
                Err(e) => {
                    error!("network relay stopping: {e}");
                    return Err(e.into());
                }
            };
            if let Err(e) = self.exchange(&request).await {
                error!("network relay stopping: {e}");
                return Err(e);
            }
        }

        info!("network relay stopped: {:?}", self.stats);
        Ok(self.stats)
    }

    /// Performs one full exchange for `request`.
    ///
    /// Protocol failures are reported as an [`ExchangeOutcome`], not an error.
    pub async fn exchange(&mut self, request: &Frame) -> Result<ExchangeOutcome, RelayError> {
        debug!("sending request: {}", HexSlice::new(request.as_bytes()));
        self.peer
            .send(&request.to_wire())
            .await
            .map_err(RelayError::Send)?;

        if !self.await_confirm().await? {
            warn!(
                "no CONFIRM from peer after {} attempts; request dropped",
                self.config.max_retries
            );
            self.stats.no_confirm += 1;
            return Ok(ExchangeOutcome::NoConfirm);
        }

        let Some(response) = self.await_response().await? else {
            warn!(
                "response incomplete after {} attempts ({} of {} bytes); discarded",
                self.config.max_retries, self.filled, WIRE_FRAME_SIZE
            );
            self.stats.truncated += 1;
            return Ok(ExchangeOutcome::Truncated);
        };

        self.mailbox.publish(Direction::PeerToDevice, &response)?;
        self.stats.completed += 1;
        debug!("response published: {}", HexSlice::new(response.as_bytes()));
        Ok(ExchangeOutcome::Completed(response))
    }

    /// Counters so far.
    pub fn stats(&self) -> RelayStats {
        self.stats
    }

    /// Returns `true` once a CONFIRM frame has been read.
    ///
    /// Each attempt reads until a whole frame is buffered or the read timeout
    /// passes.  A non-CONFIRM frame uses up its attempt.
    async fn await_confirm(&mut self) -> Result<bool, RelayError> {
        for attempt in 1..=self.config.max_retries {
            let deadline = Instant::now() + self.config.read_timeout;
            match self.read_frame_until(deadline).await? {
                Some(frame) if classify(&frame) == MessageType::Confirm => {
                    debug!("CONFIRM received on attempt {attempt}");
                    return Ok(true);
                }
                Some(frame) => {
                    debug!(
                        "attempt {attempt}: expected CONFIRM, got {:?}",
                        classify(&frame)
                    );
                }
                None => debug!("attempt {attempt}: no CONFIRM yet"),
            }
        }
        Ok(false)
    }

    /// Accumulates the response frame.  Every read that yields no bytes
    /// counts against the retry bound.
    async fn await_response(&mut self) -> Result<Option<Frame>, RelayError> {
        let mut misses = 0u32;
        while self.filled < WIRE_FRAME_SIZE {
            if misses >= self.config.max_retries {
                return Ok(None);
            }
            if self.recv_some(self.config.read_timeout).await? == 0 {
                misses += 1;
            }
        }
        self.take_frame().map(Some)
    }

    async fn read_frame_until(&mut self, deadline: Instant) -> Result<Option<Frame>, RelayError> {
        while self.filled < WIRE_FRAME_SIZE {
            let remaining = deadline.saturating_duration_since(Instant::now());
            if remaining.is_zero() || self.recv_some(remaining).await? == 0 {
                return Ok(None);
            }
        }
        self.take_frame().map(Some)
    }

    /// One `recv` into the free part of the receive buffer.
    ///
    /// Returns the number of bytes added; `0` means the read timed out or
    /// failed transiently.
    async fn recv_some(&mut self, timeout: Duration) -> Result<usize, RelayError> {
        match self.peer.recv(&mut self.rx[self.filled..], timeout).await {
            Ok(0) => Err(RelayError::PeerClosed),
            Ok(n) => {
                self.filled += n;
                Ok(n)
            }
            Err(TransportError::TimedOut(_)) => Ok(0),
            Err(e) => {
                warn!("peer read failed: {e}");
                Ok(0)
            }
        }
    }

    fn take_frame(&mut self) -> Result<Frame, RelayError> {
        let frame = Frame::from_wire(&self.rx)?;
        self.filled = 0;
        Ok(frame)
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────

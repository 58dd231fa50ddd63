//! Single-slot, per-direction hand-off between the device link and the relay.
//!
//! # Shape
//!
//! ```text
//!                 ┌──────────── Mutex<Slots> ────────────┐
//! device link ──► │ to_peer:   [u8; 64] + ready flag     │ ──► network relay
//! device link ◄── │ to_device: [u8; 64] + ready flag     │ ◄── network relay
//!                 └──────────────────────────────────────┘
//!                   Notify (to_peer)    Notify (to_device)
//! ```
//!
//! One lock guards both buffers.  Each direction has its own ready flag and its
//! own wake-up signal, so a producer in one direction never waits on the other
//! direction beyond the short critical section.
//!
//! # Invariants
//!
//! - A slot holds at most one pending frame.  [`Mailbox::publish`] over an
//!   undrained frame replaces it (last write wins); [`Mailbox::try_publish`]
//!   refuses instead, for producers that must not lose frames.
//! - The ready flag is only set after the full frame has been copied in, and
//!   only cleared after the frame has been copied out, both under the lock.
//!   A reader can therefore never observe a half-written frame.
//! - Raw buffers are never exposed; callers only ever receive `Frame` copies.
//!
//! # Blocking vs async callers
//!
//! The lock is a `std::sync::Mutex` so the device link, which runs on a
//! blocking thread, can publish and drain without an async runtime.  Waiting
//! is async (`tokio::sync::Notify`) and is used by the network relay.

use std::fmt;
use std::sync::{Mutex, MutexGuard};
use std::time::Duration;

use thiserror::Error;
use tokio::sync::Notify;
use tokio::time::Instant;
use tracing::{debug, trace};

use crate::protocol::frame::{Frame, FRAME_SIZE};

/// Errors raised by mailbox operations.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum MailboxError {
    /// A thread panicked while holding the mailbox lock.  Fatal to the caller.
    #[error("mailbox lock poisoned while {0}")]
    Poisoned(&'static str),
}

/// The two hand-off directions.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Direction {
    /// Frames read from the device, waiting to be sent to the peer.
    DeviceToPeer,
    /// Responses from the peer, waiting to be written to the device.
    PeerToDevice,
}

impl fmt::Display for Direction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Direction::DeviceToPeer => f.write_str("device->peer"),
            Direction::PeerToDevice => f.write_str("peer->device"),
        }
    }
}

struct Slot {
    buf: [u8; FRAME_SIZE],
    ready: bool,
}

impl Slot {
    const fn empty() -> Self {
        Self {
            buf: [0u8; FRAME_SIZE],
            ready: false,
        }
    }
}

struct Slots {
    to_peer: Slot,
    to_device: Slot,
}

impl Slots {
    fn get(&self, direction: Direction) -> &Slot {
        match direction {
            Direction::DeviceToPeer => &self.to_peer,
            Direction::PeerToDevice => &self.to_device,
        }
    }

    fn get_mut(&mut self, direction: Direction) -> &mut Slot {
        match direction {
            Direction::DeviceToPeer => &mut self.to_peer,
            Direction::PeerToDevice => &mut self.to_device,
        }
    }
}

/// The shared exchange point between the device link and the network relay.
///
/// Create one per process, wrap it in an `Arc`, and hand a clone to each task.
/// Dropping the last `Arc` releases the lock and both signals.
pub struct Mailbox {
    slots: Mutex<Slots>,
    to_peer_ready: Notify,
    to_device_ready: Notify,
}

impl Mailbox {
    /// Creates an empty mailbox with both directions not ready.
    pub fn new() -> Self {
        Self {
            slots: Mutex::new(Slots {
                to_peer: Slot::empty(),
                to_device: Slot::empty(),
            }),
            to_peer_ready: Notify::new(),
            to_device_ready: Notify::new(),
        }
    }

    fn signal(&self, direction: Direction) -> &Notify {
        match direction {
            Direction::DeviceToPeer => &self.to_peer_ready,
            Direction::PeerToDevice => &self.to_device_ready,
        }
    }

    fn lock(&self, operation: &'static str) -> Result<MutexGuard<'_, Slots>, MailboxError> {
        self.slots
            .lock()
            .map_err(|_| MailboxError::Poisoned(operation))
    }

    /// Copies `frame` into the slot for `direction` and marks it ready.
    ///
    /// Wakes every task currently waiting on that direction.  An undrained
    /// frame already in the slot is overwritten.
    ///
    /// # Errors
    ///
    /// Returns [`MailboxError::Poisoned`] if the lock is poisoned.
    pub fn publish(&self, direction: Direction, frame: &Frame) -> Result<(), MailboxError> {
        let mut slots = self.lock("publishing")?;
        let slot = slots.get_mut(direction);
        if slot.ready {
            debug!("{direction}: overwriting a frame that was never taken");
        }
        slot.buf.copy_from_slice(frame.as_bytes());
        slot.ready = true;
        self.signal(direction).notify_waiters();
        trace!("{direction}: frame published");
        Ok(())
    }

    /// Publishes `frame` only if the slot for `direction` is empty.
    ///
    /// Returns `false`, leaving the pending frame untouched, when the previous
    /// frame has not been taken yet.
    ///
    /// # Errors
    ///
    /// Returns [`MailboxError::Poisoned`] if the lock is poisoned.
    pub fn try_publish(&self, direction: Direction, frame: &Frame) -> Result<bool, MailboxError> {
        let mut slots = self.lock("publishing")?;
        let slot = slots.get_mut(direction);
        if slot.ready {
            return Ok(false);
        }
        slot.buf.copy_from_slice(frame.as_bytes());
        slot.ready = true;
        self.signal(direction).notify_waiters();
        trace!("{direction}: frame published");
        Ok(true)
    }

    /// Takes the pending frame for `direction` if one is ready.
    ///
    /// Never blocks beyond the critical section.  On success the ready flag is
    /// cleared, so the same frame is never returned twice.
    ///
    /// # Errors
    ///
    /// Returns [`MailboxError::Poisoned`] if the lock is poisoned.
    pub fn try_take(&self, direction: Direction) -> Result<Option<Frame>, MailboxError> {
        let mut slots = self.lock("taking")?;
        let slot = slots.get_mut(direction);
        if !slot.ready {
            return Ok(None);
        }
        let frame = Frame::new(slot.buf);
        slot.ready = false;
        Ok(Some(frame))
    }

    /// Returns whether a frame is pending for `direction`, without taking it.
    ///
    /// # Errors
    ///
    /// Returns [`MailboxError::Poisoned`] if the lock is poisoned.
    pub fn is_ready(&self, direction: Direction) -> Result<bool, MailboxError> {
        Ok(self.lock("checking readiness")?.get(direction).ready)
    }

    /// Waits until `direction` is ready or `timeout` elapses.
    ///
    /// Does not consume the frame.  Another consumer may still drain the slot
    /// between this returning `true` and a later [`try_take`](Self::try_take);
    /// callers that want the frame should use
    /// [`wait_and_take`](Self::wait_and_take) instead.
    ///
    /// # Errors
    ///
    /// Returns [`MailboxError::Poisoned`] if the lock is poisoned.
    pub async fn wait_ready(
        &self,
        direction: Direction,
        timeout: Duration,
    ) -> Result<bool, MailboxError> {
        let deadline = Instant::now() + timeout;
        loop {
            let notified = self.signal(direction).notified();
            tokio::pin!(notified);
            // Register interest before checking the flag so a publish that
            // lands between the check and the await is not missed.
            notified.as_mut().enable();

            if self.is_ready(direction)? {
                return Ok(true);
            }
            if tokio::time::timeout_at(deadline, notified).await.is_err() {
                return self.is_ready(direction);
            }
        }
    }

    /// Waits for a frame on `direction` and takes it atomically.
    ///
    /// Returns `None` if no frame arrived before `timeout`.
    ///
    /// # Errors
    ///
    /// Returns [`MailboxError::Poisoned`] if the lock is poisoned.
    pub async fn wait_and_take(
        &self,
        direction: Direction,
        timeout: Duration,
    ) -> Result<Option<Frame>, MailboxError> {
        let deadline = Instant::now() + timeout;
        loop {
            let notified = self.signal(direction).notified();
            tokio::pin!(notified);
            notified.as_mut().enable();

            if let Some(frame) = self.try_take(direction)? {
                return Ok(Some(frame));
            }
            if tokio::time::timeout_at(deadline, notified).await.is_err() {
                return self.try_take(direction);
            }
        }
    }
}

impl Default for Mailbox {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for Mailbox {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut out = f.debug_struct("Mailbox");
        match self.slots.lock() {
            Ok(slots) => out
                .field("to_peer_ready", &slots.to_peer.ready)
                .field("to_device_ready", &slots.to_device.ready),
            Err(_) => out.field("poisoned", &true),
        };
        out.finish()
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────

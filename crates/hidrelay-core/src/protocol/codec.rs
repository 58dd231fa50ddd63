//! Classification and canonical encodings for [`Frame`]s.
//!
//! Wire format:
//! ```text
//! [tag:1][payload:63]
//! ```
//! `classify` only ever inspects the tag byte.  It is total: every frame maps
//! to exactly one [`MessageType`], and unrecognised tags map to
//! [`MessageType::Unknown`], never to [`MessageType::Confirm`].

use thiserror::Error;

use crate::protocol::frame::{
    Frame, MessageType, FRAME_SIZE, PAYLOAD_SIZE, TAG_OFFSET, WIRE_FRAME_SIZE,
};

/// Errors that can occur while building a frame from raw bytes.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum FrameError {
    /// More bytes were supplied than fit in one frame.
    #[error("frame too long: at most {max} bytes allowed, got {len}")]
    TooLong { max: usize, len: usize },

    /// A wire buffer did not contain exactly one frame.
    #[error("wire frame must be exactly {expected} bytes, got {len}")]
    WrongWireLength { expected: usize, len: usize },

    /// A data payload does not fit after the tag byte.
    #[error("payload too long: at most {max} bytes allowed, got {len}")]
    PayloadTooLong { max: usize, len: usize },
}

// ── Public API ────────────────────────────────────────────────────────────────

/// Classifies a frame by its tag byte.
///
/// # Examples
///
/// ```rust
/// use hidrelay_core::{classify, encode_ping, Frame, MessageType};
///
/// assert_eq!(classify(&encode_ping()), MessageType::Ping);
/// assert_eq!(classify(&Frame::ZERO), MessageType::Unknown);
/// ```
pub fn classify(frame: &Frame) -> MessageType {
    MessageType::from_tag(frame.tag())
}

/// The canonical keepalive PING sent to the device.
pub const fn encode_ping() -> Frame {
    Frame::with_tag(MessageType::PING_TAG)
}

/// The canonical keepalive reply.
pub const fn encode_pong() -> Frame {
    Frame::with_tag(MessageType::PONG_TAG)
}

/// The canonical acknowledgement a peer sends before its response.
pub const fn encode_confirm() -> Frame {
    Frame::with_tag(MessageType::CONFIRM_TAG)
}

impl Frame {
    /// Builds a frame from up to [`FRAME_SIZE`] bytes, zero-padding the rest.
    ///
    /// HID reads may return fewer bytes than a full report.
    ///
    /// # Errors
    ///
    /// Returns [`FrameError::TooLong`] if `bytes` is longer than one frame.
    pub fn from_partial(bytes: &[u8]) -> Result<Self, FrameError> {
        if bytes.len() > FRAME_SIZE {
            return Err(FrameError::TooLong {
                max: FRAME_SIZE,
                len: bytes.len(),
            });
        }
        let mut buf = [0u8; FRAME_SIZE];
        buf[..bytes.len()].copy_from_slice(bytes);
        Ok(Frame::new(buf))
    }

    /// Builds a DATA frame carrying `payload` after the tag byte.
    ///
    /// # Errors
    ///
    /// Returns [`FrameError::PayloadTooLong`] if `payload` exceeds 63 bytes.
    pub fn data(payload: &[u8]) -> Result<Self, FrameError> {
        if payload.len() > PAYLOAD_SIZE {
            return Err(FrameError::PayloadTooLong {
                max: PAYLOAD_SIZE,
                len: payload.len(),
            });
        }
        let mut buf = [0u8; FRAME_SIZE];
        buf[TAG_OFFSET] = MessageType::DATA_TAG;
        buf[TAG_OFFSET + 1..TAG_OFFSET + 1 + payload.len()].copy_from_slice(payload);
        Ok(Frame::new(buf))
    }

    /// Converts a device frame into its wire representation.
    pub fn to_wire(&self) -> [u8; WIRE_FRAME_SIZE] {
        let mut wire = [0u8; WIRE_FRAME_SIZE];
        let n = FRAME_SIZE.min(WIRE_FRAME_SIZE);
        wire[..n].copy_from_slice(&self.as_bytes()[..n]);
        wire
    }

    /// Converts exactly one wire frame back into a device frame.
    ///
    /// # Errors
    ///
    /// Returns [`FrameError::WrongWireLength`] unless `wire` is exactly
    /// [`WIRE_FRAME_SIZE`] bytes.
    pub fn from_wire(wire: &[u8]) -> Result<Self, FrameError> {
        if wire.len() != WIRE_FRAME_SIZE {
            return Err(FrameError::WrongWireLength {
                expected: WIRE_FRAME_SIZE,
                len: wire.len(),
            });
        }
        Frame::from_partial(&wire[..WIRE_FRAME_SIZE.min(FRAME_SIZE)])
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────

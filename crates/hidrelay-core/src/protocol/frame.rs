//! The fixed-size frame exchanged with the HID device and the network peer.
//!
//! Layout (both directions, both sides):
//! ```text
//! [tag:1][payload:63]
//! ```
//! There is no length field, checksum or envelope: framing relies entirely on
//! the fixed size.

// ── Protocol constants ────────────────────────────────────────────────────────

/// Size of a device-facing frame in bytes (one raw HID report, without the
/// report-id prefix).
pub const FRAME_SIZE: usize = 64;

/// Size of a frame on the TCP wire towards the peer.
///
/// Equal to [`FRAME_SIZE`] today, but kept as its own constant so the
/// conversion at the relay boundary stays explicit.
pub const WIRE_FRAME_SIZE: usize = 64;

/// Index of the tag byte inside a frame.
pub const TAG_OFFSET: usize = 0;

/// Number of payload bytes following the tag.
pub const PAYLOAD_SIZE: usize = FRAME_SIZE - 1;

// ── Message type tags ─────────────────────────────────────────────────────────

/// Message type carried in the leading byte of every frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MessageType {
    /// Application data travelling device → peer or peer → device.
    Data,
    /// Keepalive request sent by the relay to the device.
    Ping,
    /// Keepalive reply sent by the device.
    Pong,
    /// Peer acknowledgement that a request was received.
    Confirm,
    /// Any tag value not listed above, including `0x00`.
    Unknown,
}

impl MessageType {
    pub const PING_TAG: u8 = 0x01;
    pub const PONG_TAG: u8 = 0x02;
    pub const CONFIRM_TAG: u8 = 0x03;
    pub const DATA_TAG: u8 = 0x04;

    /// Maps a tag byte to its message type.  Never fails.
    pub const fn from_tag(tag: u8) -> Self {
        match tag {
            Self::PING_TAG => MessageType::Ping,
            Self::PONG_TAG => MessageType::Pong,
            Self::CONFIRM_TAG => MessageType::Confirm,
            Self::DATA_TAG => MessageType::Data,
            _ => MessageType::Unknown,
        }
    }

    /// `true` for PING and PONG, which never leave the device link.
    pub const fn is_keepalive(self) -> bool {
        matches!(self, MessageType::Ping | MessageType::Pong)
    }
}

// ── Frame ─────────────────────────────────────────────────────────────────────

/// An immutable 64-byte frame.
///
/// `Frame` is `Copy`: handing one to the mailbox or the device always moves a
/// private copy, never a view into shared memory.
#[derive(Clone, Copy, PartialEq, Eq, Hash)]
pub struct Frame([u8; FRAME_SIZE]);

impl Frame {
    /// An all-zero frame.
    pub const ZERO: Frame = Frame([0u8; FRAME_SIZE]);

    /// Wraps an exact-size byte array.
    pub const fn new(bytes: [u8; FRAME_SIZE]) -> Self {
        Self(bytes)
    }

    /// Builds a frame with the given tag and zeroed payload.
    pub const fn with_tag(tag: u8) -> Self {
        let mut bytes = [0u8; FRAME_SIZE];
        bytes[TAG_OFFSET] = tag;
        Self(bytes)
    }

    /// The tag byte.
    pub const fn tag(&self) -> u8 {
        self.0[TAG_OFFSET]
    }

    /// Every byte after the tag.
    pub fn payload(&self) -> &[u8] {
        &self.0[TAG_OFFSET + 1..]
    }

    pub const fn as_bytes(&self) -> &[u8; FRAME_SIZE] {
        &self.0
    }
}

impl Default for Frame {
    fn default() -> Self {
        Self::ZERO
    }
}

impl From<[u8; FRAME_SIZE]> for Frame {
    fn from(bytes: [u8; FRAME_SIZE]) -> Self {
        Self(bytes)
    }
}

impl AsRef<[u8]> for Frame {
    fn as_ref(&self) -> &[u8] {
        &self.0
    }
}

impl std::fmt::Debug for Frame {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        // Trailing zero padding is noise in logs; show only the used prefix.
        let used = self
            .0
            .iter()
            .rposition(|b| *b != 0)
            .map_or(0, |last| last + 1);
        f.debug_struct("Frame")
            .field("type", &MessageType::from_tag(self.tag()))
            .field("bytes", &format_args!("{:x}", super::hex::HexSlice::new(&self.0[..used])))
            .finish()
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────

//! # hidrelay-core
//!
//! Shared library for the HID relay containing the fixed-size frame codec and
//! the single-slot mailbox used to hand frames between the device task and the
//! network task.
//!
//! It has no dependencies on HID APIs or network sockets.
//!
//! # Architecture overview
//!
//! The relay sits between a raw HID device and a TCP peer.  Two long-lived
//! tasks run side by side:
//!
//! - the **device link** polls the HID device, forwards data frames towards the
//!   peer and writes the peer's responses back to the device;
//! - the **network relay** sends each forwarded frame to the peer, waits for a
//!   CONFIRM followed by a response, and hands the response back.
//!
//! This crate holds what both tasks agree on:
//!
//! - **`protocol`** – the 64-byte [`Frame`], its leading tag byte
//!   ([`MessageType`]) and the classification/encoding functions.
//!
//! - **`mailbox`** – the [`Mailbox`]: one pending frame per [`Direction`], a
//!   single lock over both slots, and an independent ready signal per
//!   direction.  It is the only state the two tasks share.

pub mod mailbox;
pub mod protocol;

pub use mailbox::{Direction, Mailbox, MailboxError};
pub use protocol::codec::{classify, encode_confirm, encode_ping, encode_pong, FrameError};
pub use protocol::frame::{Frame, MessageType, FRAME_SIZE, WIRE_FRAME_SIZE};
pub use protocol::hex::HexSlice;

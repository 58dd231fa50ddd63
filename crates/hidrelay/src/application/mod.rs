//! Application layer of the relay.
//!
//! Both tasks depend only on traits (`HidDevice`, `PeerTransport`) and on the
//! shared [`hidrelay_core::Mailbox`].  Concrete HID and TCP adapters live in
//! the infrastructure layer and are wired together in `main.rs`.
//!
//! # Sub-modules
//!
//! - **`device_link`** – the polling loop that owns the HID device: inbound
//!   frames, outbound responses and the keepalive PING.
//!
//! - **`network_relay`** – the strictly sequential request/confirm/response
//!   state machine that owns the peer connection.

pub mod device_link;
pub mod network_relay;

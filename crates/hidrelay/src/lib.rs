//! hidrelay library entry point.
//!
//! Re-exports all public modules so that integration tests in `tests/`
//! and the binary entry point in `main.rs` share the same module tree.
//!
//! # What does hidrelay do?
//!
//! A USB device exposes a raw HID interface that speaks in 64-byte reports.
//! A server somewhere on the network wants to see those reports and answer
//! them.  hidrelay sits in between:
//!
//! 1. The device link polls the device, forwards every data frame into the
//!    mailbox, writes any pending response back to the device, and pings the
//!    device on a fixed interval to check it is still alive.
//! 2. The network relay takes each forwarded frame, sends it to the peer,
//!    waits for a CONFIRM and then for the response, and hands the response
//!    back through the mailbox.
//!
//! Exactly one request is in flight to the peer at any time.
//!
//! # Features
//!
//! - `hidapi`: real USB HID access.  Off by default; without it the binary
//!   starts but fails to open any device with [`DeviceError::Unsupported`].
//!   Build with `cargo build --features hidapi` to relay a real device.
//!
//! [`DeviceError::Unsupported`]: application::device_link::DeviceError::Unsupported

/// Application layer: the two long-lived relay tasks.
pub mod application;

/// Infrastructure layer: HID and TCP adapters, configuration, logging.
pub mod infrastructure;

//! Infrastructure layer for the relay.
//!
//! Contains OS-facing adapters: the HID device, the TCP peer connection,
//! configuration file storage and log output.
//!
//! **Dependency rule**: this layer may depend on `application` and
//! `hidrelay_core`, but MUST NOT be imported by the `application` layer.

pub mod device;
pub mod logging;
pub mod network;
pub mod storage;

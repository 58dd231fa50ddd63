//! Protocol module containing the frame type, its tag encoding and the codec.

pub mod codec;
pub mod frame;
pub mod hex;

pub use codec::{classify, encode_confirm, encode_ping, encode_pong, FrameError};
pub use frame::*;
pub use hex::HexSlice;

//! Wire protocol for Pairlink.
//!
//! This crate defines what two paired devices say to each other:
//!
//! - **Types** ([`Message`]): the closed set of session events.
//! - **Codec** ([`Codec`] trait, [`JsonCodec`]): how a message becomes
//!   bytes and back.
//! - **Framing** ([`MessageCodec`], [`FrameBuffer`]): how those bytes are
//!   delimited on a byte stream.
//! - **Errors** ([`ProtocolError`]): the non-fatal "could not parse" result.
//!
//! # Architecture
//!
//! The protocol layer is pure: no sockets, no tasks.
//!
//! ```text
//! Connection (raw bytes) → Protocol (Message) → Session (typed events)
//! ```

mod codec;
mod error;
mod frame;
mod types;

pub use codec::Codec;
#[cfg(feature = "json")]
pub use codec::JsonCodec;
pub use error::ProtocolError;
pub use frame::{DEFAULT_MAX_FRAME_LEN, FrameBuffer, LEN_SIZE, MessageCodec};
pub use types::Message;

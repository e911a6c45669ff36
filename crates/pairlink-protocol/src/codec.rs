//! Codec trait and implementations for serializing/deserializing payloads.
//!
//! A codec only turns values into bytes and back. It does not delimit
//! messages on a stream; that is [`MessageCodec`](crate::MessageCodec)'s
//! job, which wraps a codec's output in a length-prefixed frame.

use serde::{de::DeserializeOwned, Serialize};

use crate::ProtocolError;

/// A codec that can encode Rust types to bytes and decode bytes back.
///
/// `Send + Sync + 'static` so a codec can live inside long-running
/// session tasks.
pub trait Codec: Send + Sync + 'static {
    /// Serializes a value into bytes.
    ///
    /// # Errors
    /// Returns `ProtocolError::Encode` if serialization fails.
    fn encode<T: Serialize>(&self, value: &T) -> Result<Vec<u8>, ProtocolError>;

    /// Deserializes bytes back into a value.
    ///
    /// # Errors
    /// Returns `ProtocolError::Decode` if the bytes are malformed,
    /// incomplete, or don't match the expected type.
    fn decode<T: DeserializeOwned>(&self, data: &[u8]) -> Result<T, ProtocolError>;
}

// ---------------------------------------------------------------------------
// JsonCodec
// ---------------------------------------------------------------------------

/// A [`Codec`] that uses JSON (via `serde_json`).
///
/// Human-readable on the wire, which keeps packet captures of a pairing
/// session easy to read. Behind the `json` feature (enabled by default).
///
/// ## Example
///
/// ```rust
/// use pairlink_protocol::{Codec, JsonCodec, Message};
///
/// let codec = JsonCodec;
/// let msg = Message::Chat { text: "hi".into() };
///
/// let bytes = codec.encode(&msg).unwrap();
/// let decoded: Message = codec.decode(&bytes).unwrap();
/// assert_eq!(msg, decoded);
/// ```
#[cfg(feature = "json")]
#[derive(Debug, Clone, Copy, Default)]
pub struct JsonCodec;

#[cfg(feature = "json")]
impl Codec for JsonCodec {
    fn encode<T: Serialize>(&self, value: &T) -> Result<Vec<u8>, ProtocolError> {
        serde_json::to_vec(value).map_err(ProtocolError::Encode)
    }

    fn decode<T: DeserializeOwned>(&self, data: &[u8]) -> Result<T, ProtocolError> {
        serde_json::from_slice(data).map_err(ProtocolError::Decode)
    }
}

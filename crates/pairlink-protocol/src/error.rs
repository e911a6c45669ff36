//! Error types for the protocol layer.
//!
//! A `ProtocolError` is never fatal to a connection: the session layer
//! logs it, discards the offending frame, and keeps the channel open.

/// Errors that can occur while encoding or decoding session messages.
#[derive(Debug, thiserror::Error)]
pub enum ProtocolError {
    /// Serialization failed (turning a message into bytes).
    #[cfg(feature = "json")]
    #[error("encode failed: {0}")]
    Encode(serde_json::Error),

    /// Deserialization failed: malformed JSON, a missing required field,
    /// or a field of the wrong type.
    #[cfg(feature = "json")]
    #[error("decode failed: {0}")]
    Decode(serde_json::Error),

    /// The input ended before a complete frame was read.
    #[error("truncated frame: need {needed} bytes, have {available}")]
    Truncated { needed: usize, available: usize },

    /// The length prefix announces a payload larger than allowed.
    #[error("frame of {size} bytes exceeds limit of {max}")]
    FrameTooLarge { size: usize, max: usize },

    /// The bytes decoded but violate protocol rules (e.g. trailing
    /// garbage after a frame).
    #[error("invalid message: {0}")]
    InvalidMessage(String),
}

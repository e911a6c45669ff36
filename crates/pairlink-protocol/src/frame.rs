//! Length-prefixed framing for messages on a byte stream.
//!
//! Wire format:
//! ```text
//! +------------------+------------------------+
//! | Length (4B BE)   | Payload (codec output) |
//! +------------------+------------------------+
//! ```
//!
//! A byte stream may split one frame across several reads or deliver
//! several frames in one read. [`FrameBuffer`] reassembles them; the
//! payload bytes are never scanned for terminators, so message content
//! cannot break framing.

use crate::{Codec, Message, ProtocolError};

/// Size of the length prefix.
pub const LEN_SIZE: usize = 4;

/// Largest payload accepted by default. Session messages are small.
pub const DEFAULT_MAX_FRAME_LEN: usize = 64 * 1024;

/// Encodes [`Message`]s into frames and decodes frames back.
#[derive(Debug, Clone)]
pub struct MessageCodec<C: Codec> {
    codec: C,
    max_frame_len: usize,
}

#[cfg(feature = "json")]
impl MessageCodec<crate::JsonCodec> {
    /// A JSON message codec with the default frame limit.
    pub fn json() -> Self {
        Self::new(crate::JsonCodec)
    }
}

#[cfg(feature = "json")]
impl Default for MessageCodec<crate::JsonCodec> {
    fn default() -> Self {
        Self::json()
    }
}

impl<C: Codec> MessageCodec<C> {
    /// Wraps `codec` with the default frame limit.
    pub fn new(codec: C) -> Self {
        Self {
            codec,
            max_frame_len: DEFAULT_MAX_FRAME_LEN,
        }
    }

    /// Overrides the largest accepted payload.
    #[must_use]
    pub fn with_max_frame_len(mut self, max_frame_len: usize) -> Self {
        self.max_frame_len = max_frame_len;
        self
    }

    /// The largest accepted payload.
    pub fn max_frame_len(&self) -> usize {
        self.max_frame_len
    }

    /// A [`FrameBuffer`] that enforces this codec's frame limit.
    pub fn frame_buffer(&self) -> FrameBuffer {
        FrameBuffer::new(self.max_frame_len)
    }

    /// Serializes one message into one self-delimited frame.
    ///
    /// # Errors
    /// `Encode` if the codec fails, `FrameTooLarge` if the payload
    /// exceeds the limit.
    pub fn encode(&self, msg: &Message) -> Result<Vec<u8>, ProtocolError> {
        let payload = self.codec.encode(msg)?;
        let header = self.length_prefix(payload.len())?;
        let mut frame = Vec::with_capacity(LEN_SIZE + payload.len());
        frame.extend_from_slice(&header);
        frame.extend_from_slice(&payload);
        Ok(frame)
    }

    /// Decodes exactly one complete frame.
    ///
    /// # Errors
    /// `Truncated` if `frame` is shorter than its prefix announces,
    /// `InvalidMessage` if bytes follow the frame, `FrameTooLarge` or
    /// `Decode` otherwise. Never panics, whatever the input.
    pub fn decode(&self, frame: &[u8]) -> Result<Message, ProtocolError> {
        let len = read_len(frame)?;
        if len > self.max_frame_len {
            return Err(ProtocolError::FrameTooLarge {
                size: len,
                max: self.max_frame_len,
            });
        }
        let end = LEN_SIZE + len;
        if frame.len() < end {
            return Err(ProtocolError::Truncated {
                needed: end,
                available: frame.len(),
            });
        }
        if frame.len() > end {
            return Err(ProtocolError::InvalidMessage(format!(
                "{} trailing bytes after frame",
                frame.len() - end
            )));
        }
        self.decode_payload(&frame[LEN_SIZE..end])
    }

    /// Decodes a payload already stripped of its length prefix.
    pub fn decode_payload(&self, payload: &[u8]) -> Result<Message, ProtocolError> {
        self.codec.decode(payload)
    }

    fn length_prefix(&self, len: usize) -> Result<[u8; LEN_SIZE], ProtocolError> {
        let too_large = ProtocolError::FrameTooLarge {
            size: len,
            max: self.max_frame_len,
        };
        if len > self.max_frame_len {
            return Err(too_large);
        }
        let n = u32::try_from(len).map_err(|_| too_large)?;
        Ok(n.to_be_bytes())
    }
}

fn read_len(bytes: &[u8]) -> Result<usize, ProtocolError> {
    match bytes.first_chunk::<LEN_SIZE>() {
        Some(prefix) => Ok(u32::from_be_bytes(*prefix) as usize),
        None => Err(ProtocolError::Truncated {
            needed: LEN_SIZE,
            available: bytes.len(),
        }),
    }
}

// ---------------------------------------------------------------------------
// FrameBuffer
// ---------------------------------------------------------------------------

/// Accumulates stream reads and yields complete frame payloads.
#[derive(Debug, Clone)]
pub struct FrameBuffer {
    buf: Vec<u8>,
    max_frame_len: usize,
}

impl FrameBuffer {
    /// Creates an empty buffer that rejects payloads over `max_frame_len`.
    pub fn new(max_frame_len: usize) -> Self {
        Self {
            buf: Vec::new(),
            max_frame_len,
        }
    }

    /// Appends bytes read from the stream.
    pub fn push(&mut self, bytes: &[u8]) {
        self.buf.extend_from_slice(bytes);
    }

    /// Pops the next complete payload, if one is buffered.
    ///
    /// Returns `None` when more bytes are needed. An oversized length
    /// prefix means the stream is out of sync: the buffer is cleared and
    /// `FrameTooLarge` is returned once.
    pub fn next_frame(&mut self) -> Option<Result<Vec<u8>, ProtocolError>> {
        let len = read_len(&self.buf).ok()?;
        if len > self.max_frame_len {
            self.buf.clear();
            return Some(Err(ProtocolError::FrameTooLarge {
                size: len,
                max: self.max_frame_len,
            }));
        }
        let end = LEN_SIZE + len;
        if self.buf.len() < end {
            return None;
        }
        let payload = self.buf[LEN_SIZE..end].to_vec();
        self.buf.drain(..end);
        Some(Ok(payload))
    }

    /// Bytes buffered but not yet returned.
    pub fn pending(&self) -> usize {
        self.buf.len()
    }

    /// Discards buffered bytes (e.g. when a new connection starts).
    pub fn clear(&mut self) {
        self.buf.clear();
    }
}

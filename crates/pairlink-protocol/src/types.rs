//! The closed set of messages two paired devices exchange.
//!
//! Every value on the wire is exactly one [`Message`]. The enum is
//! internally tagged, so a frame's JSON looks like
//! `{"type":"MOVE","row":1,"col":2,"succeeded":true}`.
//!
//! Forward compatibility:
//! - an unrecognised `type` decodes to [`Message::Unknown`];
//! - extra fields on a known kind are ignored;
//! - a missing required field is a decode error.

use std::fmt;

use serde::{Deserialize, Serialize};

/// One application event carried over the paired stream.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Message {
    // -- Handshake --
    /// "This is who I am." Sent by each side once connected.
    Hello { display_name: String },

    /// Acknowledges a `Hello` (or anything else worth confirming).
    Ack { note: String },

    // -- Remote content --
    /// Asks the peer for a resource by id.
    Request { resource_id: String },

    /// Answers a `Request`.
    Response { payload: String },

    // -- Session --
    /// Free-form text between players.
    Chat { text: String },

    /// The sender's ready flag changed.
    Ready { is_ready: bool },

    /// The sender started the session with this initial state.
    /// Opaque to the protocol; only the game knows its layout.
    Start { initial_state: Vec<u8> },

    /// A single move on the shared board.
    Move { row: u32, col: u32, succeeded: bool },

    /// Full state snapshot, replacing whatever the receiver had.
    StateSync { state: Vec<u8> },

    /// The sender's game ended.
    GameOver { won: bool, score: i64 },

    /// Any kind this build doesn't recognise.
    #[serde(other)]
    Unknown,
}

impl Message {
    /// The wire name of this message's kind.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Hello { .. } => "HELLO",
            Self::Ack { .. } => "ACK",
            Self::Request { .. } => "REQUEST",
            Self::Response { .. } => "RESPONSE",
            Self::Chat { .. } => "CHAT",
            Self::Ready { .. } => "READY",
            Self::Start { .. } => "START",
            Self::Move { .. } => "MOVE",
            Self::StateSync { .. } => "STATE_SYNC",
            Self::GameOver { .. } => "GAME_OVER",
            Self::Unknown => "UNKNOWN",
        }
    }
}

impl fmt::Display for Message {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.kind())
    }
}

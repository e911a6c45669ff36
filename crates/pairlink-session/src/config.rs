//! Session configuration, mode, identity, and snapshots.

use std::fmt;

use pairlink_connection::ConnectionState;
use rand::Rng;
use serde::{Deserialize, Serialize};

// ---------------------------------------------------------------------------
// SessionMode
// ---------------------------------------------------------------------------

/// How the two players relate. Carried for the game layer; the
/// coordinator itself treats both modes the same.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SessionMode {
    /// Both players work on one shared goal.
    #[default]
    Cooperative,
    /// Players race or score against each other.
    Competitive,
}

impl fmt::Display for SessionMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Cooperative => write!(f, "cooperative"),
            Self::Competitive => write!(f, "competitive"),
        }
    }
}

// ---------------------------------------------------------------------------
// SessionConfig
// ---------------------------------------------------------------------------

/// Configuration for a session coordinator.
#[derive(Debug, Clone)]
pub struct SessionConfig {
    /// Initial mode. Survives reconnects; change it with
    /// [`SessionHandle::set_mode`](crate::SessionHandle::set_mode).
    pub mode: SessionMode,

    /// Name announced in a `HELLO` on every new connection.
    /// `None` disables the greeting.
    pub display_name: Option<String>,

    /// Answer an inbound `HELLO` with an `ACK`.
    pub acknowledge_hello: bool,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            mode: SessionMode::default(),
            display_name: None,
            acknowledge_hello: true,
        }
    }
}

impl SessionConfig {
    /// Drops a blank display name so no empty `HELLO` goes out.
    pub fn validated(mut self) -> Self {
        if self
            .display_name
            .as_deref()
            .is_some_and(|name| name.trim().is_empty())
        {
            tracing::warn!("blank display_name, greeting disabled");
            self.display_name = None;
        }
        self
    }
}

// ---------------------------------------------------------------------------
// SessionId
// ---------------------------------------------------------------------------

/// Random identifier of one connected session, for log correlation.
///
/// A fresh id is drawn every time the connection reaches `Connected`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct SessionId(String);

impl SessionId {
    /// Draws a new random id: 16 lowercase hex characters.
    pub fn generate() -> Self {
        let bytes: [u8; 8] = rand::rng().random();
        Self(bytes.iter().map(|b| format!("{b:02x}")).collect())
    }

    /// Returns the id as a string slice.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for SessionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

// ---------------------------------------------------------------------------
// SessionSnapshot
// ---------------------------------------------------------------------------

/// Point-in-time view of a coordinator's state.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionSnapshot {
    /// Connection state as last seen by the coordinator.
    pub connection: ConnectionState,
    /// Set by [`set_local_ready`](crate::SessionHandle::set_local_ready).
    pub local_ready: bool,
    /// Set by an inbound `READY`.
    pub remote_ready: bool,
    /// Set by a local `start_game` or an inbound `START`.
    pub started: bool,
    pub mode: SessionMode,
    /// Present while connected.
    pub session_id: Option<SessionId>,
    /// Name from the peer's `HELLO`, if one arrived this session.
    pub peer_name: Option<String>,
}

impl SessionSnapshot {
    /// Both players are ready.
    pub fn both_ready(&self) -> bool {
        self.local_ready && self.remote_ready
    }
}

//! Connection state, role policy, and manager configuration.

use std::fmt;

// ---------------------------------------------------------------------------
// ConnectionState
// ---------------------------------------------------------------------------

/// The lifecycle state of a connection manager.
///
/// Exactly one value at a time. Each state has exactly one live role:
///
/// ```text
/// None       → no role
/// Listening  → Listener (accept loop)
/// Connecting → Connector (one outbound attempt)
/// Connected  → Duplex Channel (read loop + writer)
/// ```
///
/// Edges:
///
/// ```text
/// None ──listen──→ Listening ──accept──→ Connected
/// None ──connect─→ Connecting ──ok────→ Connected
/// Connecting ──fail──→ Listening (server) | None (client)
/// Connected  ──lost──→ Listening (server) | None (client)
/// any ──stop──→ None
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum ConnectionState {
    /// Idle: nothing listening, connecting, or connected.
    #[default]
    None,
    /// Offering a bound endpoint, waiting for a peer.
    Listening,
    /// One outbound attempt in flight.
    Connecting,
    /// A live stream to a peer.
    Connected,
}

impl ConnectionState {
    /// Returns `true` if messages can be sent.
    pub fn is_connected(&self) -> bool {
        matches!(self, Self::Connected)
    }

    /// Returns `true` if a role is live in this state.
    pub fn has_role(&self) -> bool {
        !matches!(self, Self::None)
    }
}

impl fmt::Display for ConnectionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::None => write!(f, "None"),
            Self::Listening => write!(f, "Listening"),
            Self::Connecting => write!(f, "Connecting"),
            Self::Connected => write!(f, "Connected"),
        }
    }
}

// ---------------------------------------------------------------------------
// RolePolicy
// ---------------------------------------------------------------------------

/// What an endpoint does after a connect failure or a lost connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum RolePolicy {
    /// Keep offering to accept: re-arm the listener automatically.
    Server,
    /// Go idle; the caller must `connect()` again.
    #[default]
    Client,
}

impl RolePolicy {
    /// The state to fall back to after a failure.
    pub fn fallback_state(&self) -> ConnectionState {
        match self {
            Self::Server => ConnectionState::Listening,
            Self::Client => ConnectionState::None,
        }
    }
}

// ---------------------------------------------------------------------------
// ManagerConfig
// ---------------------------------------------------------------------------

/// Configuration for a connection manager.
#[derive(Debug, Clone)]
pub struct ManagerConfig {
    /// Re-arm behaviour after failure or loss.
    pub policy: RolePolicy,

    /// Size of the duplex channel's fixed read buffer, in bytes.
    pub read_buffer_size: usize,
}

impl ManagerConfig {
    /// Smallest accepted read buffer.
    pub const MIN_READ_BUFFER: usize = 64;
    /// Largest accepted read buffer.
    pub const MAX_READ_BUFFER: usize = 64 * 1024;

    /// A server-policy config with defaults otherwise.
    pub fn server() -> Self {
        Self {
            policy: RolePolicy::Server,
            ..Self::default()
        }
    }

    /// A client-policy config with defaults otherwise.
    pub fn client() -> Self {
        Self::default()
    }

    /// Clamps out-of-range values so the config is safe to use.
    ///
    /// Called by [`ConnectionManager::spawn`](crate::ConnectionManager::spawn).
    pub fn validated(mut self) -> Self {
        let clamped = self
            .read_buffer_size
            .clamp(Self::MIN_READ_BUFFER, Self::MAX_READ_BUFFER);
        if clamped != self.read_buffer_size {
            tracing::warn!(
                requested = self.read_buffer_size,
                clamped,
                "read_buffer_size out of range, clamping"
            );
            self.read_buffer_size = clamped;
        }
        self
    }
}

impl Default for ManagerConfig {
    fn default() -> Self {
        Self {
            policy: RolePolicy::default(),
            read_buffer_size: 1024,
        }
    }
}

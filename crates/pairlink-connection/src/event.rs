//! Events published by a connection manager to its owner.

use pairlink_transport::{Operation, PeerAddress, PeerIdentity};

use crate::ConnectionState;

/// Something the owner of a connection manager should react to.
///
/// Delivered in order on the receiver returned by
/// [`ConnectionManager::spawn`](crate::ConnectionManager::spawn).
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConnectionEvent {
    /// The manager moved to a new state.
    StateChanged(ConnectionState),

    /// A stream to `peer` is established. `label` is the best-effort
    /// display identity (a placeholder if resolving it was refused).
    PeerConnected { peer: PeerIdentity, label: String },

    /// The outbound attempt to `peer` failed.
    ConnectFailed { peer: PeerAddress, reason: String },

    /// The established stream ended (peer closed, reset, or write error).
    ConnectionLost { reason: String },

    /// The listener could not keep accepting.
    ListenFailed { reason: String },

    /// The environment refused an operation; the caller may want to ask
    /// the user for a permission.
    CapabilityDenied { operation: Operation, reason: String },

    /// Raw bytes read from the peer. May hold part of a frame, or several.
    BytesReceived(Vec<u8>),

    /// Raw bytes written to the peer.
    BytesSent(Vec<u8>),
}

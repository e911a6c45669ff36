//! Unified error type for the Pairlink framework.

use pairlink_connection::ConnectionError;
use pairlink_protocol::ProtocolError;
use pairlink_session::SessionError;
use pairlink_transport::TransportError;

/// Top-level error that wraps all crate-specific errors.
///
/// The `#[from]` attribute on each variant lets `?` convert sub-crate
/// errors automatically.
#[derive(Debug, thiserror::Error)]
pub enum PairlinkError {
    /// A transport-level error (bind, connect, read, write).
    #[error(transparent)]
    Transport(#[from] TransportError),

    /// A protocol-level error (encode, decode, framing).
    #[error(transparent)]
    Protocol(#[from] ProtocolError),

    /// The connection manager is gone.
    #[error(transparent)]
    Connection(#[from] ConnectionError),

    /// A session-level error.
    #[error(transparent)]
    Session(#[from] SessionError),

    /// The configured bind address could not be parsed.
    #[error("invalid bind address {0:?}")]
    InvalidAddress(String),
}

//! Error types for the session layer.

use pairlink_protocol::ProtocolError;

/// Errors returned by [`SessionHandle`](crate::SessionHandle) calls.
///
/// A peer that is simply not connected is not an error: send operations
/// return `Ok(false)` in that case.
#[derive(Debug, thiserror::Error)]
pub enum SessionError {
    /// The coordinator or its connection manager has stopped.
    #[error("session coordinator is unavailable")]
    Unavailable,

    /// A local message could not be encoded.
    #[error(transparent)]
    Protocol(#[from] ProtocolError),
}

//! Error types for the connection layer.
//!
//! Transport failures never surface here: they become
//! [`ConnectionEvent`](crate::ConnectionEvent)s. A handle call only fails
//! when the manager itself is gone.

/// Errors returned by [`ConnectionHandle`](crate::ConnectionHandle) calls.
#[derive(Debug, thiserror::Error)]
pub enum ConnectionError {
    /// The manager task has stopped (shut down or all handles dropped).
    #[error("connection manager is unavailable")]
    Unavailable,
}

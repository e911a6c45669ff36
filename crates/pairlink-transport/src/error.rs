/// The transport operation that produced an error.
///
/// Carried by [`TransportError::CapabilityDenied`] so the caller can tell
/// the user *what* the environment refused.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Operation {
    /// Binding or advertising the local endpoint.
    Bind,
    /// Accepting an inbound connection.
    Accept,
    /// Opening an outbound connection.
    Connect,
    /// Resolving a peer's display identity.
    ResolvePeer,
    /// Writing to an established stream.
    Send,
    /// Reading from an established stream.
    Receive,
}

impl std::fmt::Display for Operation {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Bind => write!(f, "bind"),
            Self::Accept => write!(f, "accept"),
            Self::Connect => write!(f, "connect"),
            Self::ResolvePeer => write!(f, "resolve peer"),
            Self::Send => write!(f, "send"),
            Self::Receive => write!(f, "receive"),
        }
    }
}

/// Errors that can occur in the transport layer.
#[derive(Debug, thiserror::Error)]
pub enum TransportError {
    /// The environment refused the operation (missing permission or
    /// capability). Surfaced separately so the caller can prompt the user.
    #[error("{operation} not permitted: {reason}")]
    CapabilityDenied {
        operation: Operation,
        reason: String,
    },

    /// Binding the local endpoint failed.
    #[error("bind failed: {0}")]
    BindFailed(#[source] std::io::Error),

    /// Accepting an inbound connection failed.
    #[error("accept failed: {0}")]
    AcceptFailed(#[source] std::io::Error),

    /// The outbound connection attempt failed.
    #[error("connect failed: {0}")]
    ConnectFailed(#[source] std::io::Error),

    /// Sending data failed.
    #[error("send failed: {0}")]
    SendFailed(#[source] std::io::Error),

    /// Receiving data failed.
    #[error("receive failed: {0}")]
    ReceiveFailed(#[source] std::io::Error),

    /// The connection was closed.
    #[error("connection closed: {0}")]
    ConnectionClosed(String),
}

impl TransportError {
    /// Classifies an I/O error raised by `operation`.
    ///
    /// `PermissionDenied` becomes [`TransportError::CapabilityDenied`];
    /// everything else maps to the operation's failure variant.
    pub fn from_io(operation: Operation, err: std::io::Error) -> Self {
        if err.kind() == std::io::ErrorKind::PermissionDenied {
            return Self::CapabilityDenied {
                operation,
                reason: err.to_string(),
            };
        }
        match operation {
            Operation::Bind => Self::BindFailed(err),
            Operation::Accept => Self::AcceptFailed(err),
            Operation::Connect => Self::ConnectFailed(err),
            Operation::Send => Self::SendFailed(err),
            Operation::Receive => Self::ReceiveFailed(err),
            Operation::ResolvePeer => Self::ConnectionClosed(err.to_string()),
        }
    }

    /// Returns `true` if the environment refused the operation.
    pub fn is_capability_denied(&self) -> bool {
        matches!(self, Self::CapabilityDenied { .. })
    }
}

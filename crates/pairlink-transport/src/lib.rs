//! Transport abstraction layer for Pairlink.
//!
//! Provides the [`Transport`] and [`Acceptor`] traits that abstract over
//! reliable, connection-oriented byte streams between two paired devices
//! (an RFCOMM-style socket, a loopback TCP stream, an in-memory pipe).
//!
//! The transport knows nothing about roles or messages: it binds an
//! endpoint, accepts or opens one stream at a time, and names the peer on
//! the other end. Role sequencing lives in `pairlink-connection`.
//!
//! # Feature Flags
//!
//! - `tcp` (default): TCP transport via `tokio::net`

mod error;
#[cfg(feature = "tcp")]
mod tcp;

pub use error::{Operation, TransportError};
#[cfg(feature = "tcp")]
pub use tcp::{TcpAcceptor, TcpTransport};

use std::fmt;
use std::future::Future;

use tokio::io::{AsyncRead, AsyncWrite};

/// Opaque address of a remote endpoint, as supplied by the platform's
/// discovery mechanism. Passed to [`Transport::connect`] unmodified.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct PeerAddress(String);

impl PeerAddress {
    /// Wraps a raw address string.
    pub fn new(addr: impl Into<String>) -> Self {
        Self(addr.into())
    }

    /// Returns the address as a string slice.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for PeerAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for PeerAddress {
    fn from(addr: &str) -> Self {
        Self::new(addr)
    }
}

impl From<String> for PeerAddress {
    fn from(addr: String) -> Self {
        Self(addr)
    }
}

/// Identity of the remote endpoint of an established stream.
///
/// Known only once a connection is attempted or accepted. The core never
/// persists it.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct PeerIdentity {
    /// Where the peer can be reached.
    pub address: PeerAddress,
    /// Human-readable name advertised by the peer, if the transport knows it.
    pub name: Option<String>,
}

impl PeerIdentity {
    /// Creates an identity with no advertised name.
    pub fn new(address: impl Into<PeerAddress>) -> Self {
        Self {
            address: address.into(),
            name: None,
        }
    }

    /// Attaches an advertised name.
    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    /// The name if advertised, otherwise the address.
    pub fn label(&self) -> &str {
        self.name.as_deref().unwrap_or(self.address.as_str())
    }
}

impl fmt::Display for PeerIdentity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.name {
            Some(name) => write!(f, "{name} ({})", self.address),
            None => write!(f, "{}", self.address),
        }
    }
}

/// Binds a discoverable endpoint and opens outbound streams.
///
/// Methods return `Send` futures so the connection manager can drive
/// them from spawned role tasks.
pub trait Transport: Send + Sync + 'static {
    /// The byte stream produced by accepting or connecting.
    type Stream: AsyncRead + AsyncWrite + Send + Unpin + 'static;
    /// The bound endpoint produced by [`bind`](Self::bind).
    type Acceptor: Acceptor<Stream = Self::Stream>;

    /// Binds and advertises the local endpoint.
    ///
    /// Fails fast with [`TransportError::CapabilityDenied`] if the
    /// environment refuses.
    fn bind(
        &self,
    ) -> impl Future<Output = Result<Self::Acceptor, TransportError>> + Send;

    /// Performs exactly one outbound connection attempt to `peer`.
    fn connect(
        &self,
        peer: &PeerAddress,
    ) -> impl Future<Output = Result<(Self::Stream, PeerIdentity), TransportError>>
    + Send;

    /// Stops any ongoing device discovery before connecting.
    ///
    /// Best-effort: failures are ignored. Default: no-op.
    fn cancel_discovery(&self) -> impl Future<Output = ()> + Send {
        async {}
    }

    /// Resolves the display label of a connected peer.
    ///
    /// May fail with [`TransportError::CapabilityDenied`] on platforms
    /// where reading device names needs a permission.
    fn resolve_label(
        &self,
        peer: &PeerIdentity,
    ) -> Result<String, TransportError> {
        Ok(peer.label().to_owned())
    }
}

/// A bound endpoint that accepts one inbound stream at a time.
///
/// Dropping the acceptor closes the bound socket; a pending
/// [`accept`](Self::accept) is cancelled by dropping its future.
pub trait Acceptor: Send + 'static {
    /// The byte stream produced by accepting.
    type Stream: AsyncRead + AsyncWrite + Send + Unpin + 'static;

    /// Waits for the next inbound connection.
    fn accept(
        &mut self,
    ) -> impl Future<Output = Result<(Self::Stream, PeerIdentity), TransportError>>
    + Send;

    /// The address peers should connect to, if known.
    fn local_endpoint(&self) -> Option<String> {
        None
    }
}

//! TCP transport implementation using `tokio::net`.
//!
//! Stands in for a paired-device RFCOMM socket: one bound endpoint that
//! accepts streams, and one-shot outbound connects to a named address.

use std::net::SocketAddr;
use std::sync::{Arc, Mutex};

use tokio::net::{TcpListener, TcpStream};

use crate::{Acceptor, Operation, PeerAddress, PeerIdentity, Transport, TransportError};

/// A TCP-based [`Transport`].
///
/// Cheap to clone; clones share the remembered bound address. The first
/// successful [`bind`](Transport::bind) records the port the OS handed
/// out, so a server that re-arms after a lost connection listens on the
/// same endpoint again.
#[derive(Debug, Clone)]
pub struct TcpTransport {
    bind_addr: SocketAddr,
    bound: Arc<Mutex<Option<SocketAddr>>>,
}

impl TcpTransport {
    /// Creates a transport that will bind to `bind_addr` when listening.
    ///
    /// Port `0` lets the OS pick; see [`local_addr`](Self::local_addr).
    pub fn new(bind_addr: SocketAddr) -> Self {
        Self {
            bind_addr,
            bound: Arc::new(Mutex::new(None)),
        }
    }

    /// Returns the address of the most recent successful bind.
    pub fn local_addr(&self) -> Option<SocketAddr> {
        match self.bound.lock() {
            Ok(guard) => *guard,
            Err(poisoned) => *poisoned.into_inner(),
        }
    }

    fn remember(&self, addr: SocketAddr) {
        match self.bound.lock() {
            Ok(mut guard) => *guard = Some(addr),
            Err(poisoned) => *poisoned.into_inner() = Some(addr),
        }
    }
}

impl Transport for TcpTransport {
    type Stream = TcpStream;
    type Acceptor = TcpAcceptor;

    async fn bind(&self) -> Result<Self::Acceptor, TransportError> {
        let addr = self.local_addr().unwrap_or(self.bind_addr);
        let listener = TcpListener::bind(addr)
            .await
            .map_err(|e| TransportError::from_io(Operation::Bind, e))?;
        let local = listener
            .local_addr()
            .map_err(|e| TransportError::from_io(Operation::Bind, e))?;
        self.remember(local);
        tracing::info!(%local, "TCP transport listening");
        Ok(TcpAcceptor { listener, local })
    }

    async fn connect(
        &self,
        peer: &PeerAddress,
    ) -> Result<(Self::Stream, PeerIdentity), TransportError> {
        let stream = TcpStream::connect(peer.as_str())
            .await
            .map_err(|e| TransportError::from_io(Operation::Connect, e))?;
        if let Err(e) = stream.set_nodelay(true) {
            tracing::debug!(%peer, error = %e, "set_nodelay failed");
        }
        tracing::debug!(%peer, "TCP stream connected");
        Ok((stream, PeerIdentity::new(peer.clone())))
    }
}

/// A bound TCP listener.
#[derive(Debug)]
pub struct TcpAcceptor {
    listener: TcpListener,
    local: SocketAddr,
}

impl TcpAcceptor {
    /// The address the listener is bound to.
    pub fn local_addr(&self) -> SocketAddr {
        self.local
    }
}

impl Acceptor for TcpAcceptor {
    type Stream = TcpStream;

    async fn accept(
        &mut self,
    ) -> Result<(Self::Stream, PeerIdentity), TransportError> {
        let (stream, addr) = self
            .listener
            .accept()
            .await
            .map_err(|e| TransportError::from_io(Operation::Accept, e))?;
        if let Err(e) = stream.set_nodelay(true) {
            tracing::debug!(%addr, error = %e, "set_nodelay failed");
        }
        tracing::debug!(%addr, "accepted TCP stream");
        Ok((stream, PeerIdentity::new(addr.to_string())))
    }

    fn local_endpoint(&self) -> Option<String> {
        Some(self.local.to_string())
    }
}

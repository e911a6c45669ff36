//! `PairlinkBuilder` and the assembled endpoint.
//!
//! This is the entry point for running one side of a paired session. It
//! ties together all the layers: transport → connection → session.

use std::net::SocketAddr;

use pairlink_connection::{ConnectionManager, ManagerConfig, RolePolicy};
use pairlink_session::{
    ContentProvider, NoContent, SessionConfig, SessionCoordinator, SessionEvent, SessionHandle,
    SessionMode,
};
use pairlink_transport::TcpTransport;
use tokio::sync::mpsc;

use crate::PairlinkError;

/// Builder for one endpoint of a paired session over TCP.
///
/// # Example
///
/// ```rust,no_run
/// use pairlink::prelude::*;
///
/// # async fn demo() -> Result<(), PairlinkError> {
/// let mut link = Pairlink::builder()
///     .bind("0.0.0.0:7000")
///     .policy(RolePolicy::Server)
///     .display_name("Ada")
///     .build()?;
/// link.session().listen().await?;
/// while let Some(event) = link.next_event().await {
///     println!("{event:?}");
/// }
/// # Ok(())
/// # }
/// ```
pub struct PairlinkBuilder<P: ContentProvider = NoContent> {
    bind_addr: String,
    manager: ManagerConfig,
    session: SessionConfig,
    provider: P,
}

impl PairlinkBuilder {
    /// Creates a builder with default settings: client policy, bound to
    /// an OS-assigned loopback port when listening.
    pub fn new() -> Self {
        Self {
            bind_addr: "127.0.0.1:0".to_string(),
            manager: ManagerConfig::default(),
            session: SessionConfig::default(),
            provider: NoContent,
        }
    }
}

impl Default for PairlinkBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl<P: ContentProvider> PairlinkBuilder<P> {
    /// Sets the address to listen on.
    pub fn bind(mut self, addr: &str) -> Self {
        self.bind_addr = addr.to_string();
        self
    }

    /// Sets what happens after a failed connect or a lost connection.
    pub fn policy(mut self, policy: RolePolicy) -> Self {
        self.manager.policy = policy;
        self
    }

    /// Announces `name` in a `HELLO` on every new connection.
    pub fn display_name(mut self, name: impl Into<String>) -> Self {
        self.session.display_name = Some(name.into());
        self
    }

    pub fn mode(mut self, mode: SessionMode) -> Self {
        self.session.mode = mode;
        self
    }

    /// Sets the duplex channel's read buffer size (clamped on build).
    pub fn read_buffer_size(mut self, size: usize) -> Self {
        self.manager.read_buffer_size = size;
        self
    }

    /// Answers peer requests from `provider`.
    pub fn content_provider<Q: ContentProvider>(self, provider: Q) -> PairlinkBuilder<Q> {
        PairlinkBuilder {
            bind_addr: self.bind_addr,
            manager: self.manager,
            session: self.session,
            provider,
        }
    }

    /// Validates the configuration and spawns the connection manager and
    /// session coordinator. Must be called inside a Tokio runtime.
    ///
    /// # Errors
    /// [`PairlinkError::InvalidAddress`] if the bind address doesn't parse.
    pub fn build(self) -> Result<Pairlink, PairlinkError> {
        let bind_addr: SocketAddr = self
            .bind_addr
            .parse()
            .map_err(|_| PairlinkError::InvalidAddress(self.bind_addr.clone()))?;

        let transport = TcpTransport::new(bind_addr);
        let (connection, connection_events) =
            ConnectionManager::spawn(transport.clone(), self.manager);
        let (session, events) = SessionCoordinator::spawn_with_provider(
            connection,
            connection_events,
            self.session,
            self.provider,
        );
        tracing::debug!(%bind_addr, "pairlink endpoint built");

        Ok(Pairlink {
            transport,
            session,
            events,
        })
    }
}

/// One assembled endpoint: a session handle plus its event stream.
pub struct Pairlink {
    transport: TcpTransport,
    session: SessionHandle,
    events: mpsc::UnboundedReceiver<SessionEvent>,
}

impl Pairlink {
    /// Creates a new builder.
    pub fn builder() -> PairlinkBuilder {
        PairlinkBuilder::new()
    }

    /// The session handle. Clone it to drive the session from other tasks.
    pub fn session(&self) -> &SessionHandle {
        &self.session
    }

    /// The address the listener last bound to, once it has.
    pub fn local_addr(&self) -> Option<SocketAddr> {
        self.transport.local_addr()
    }

    /// Waits for the next session event. `None` once the coordinator
    /// has stopped.
    pub async fn next_event(&mut self) -> Option<SessionEvent> {
        self.events.recv().await
    }

    /// Splits into the handle and the raw event receiver.
    pub fn split(self) -> (SessionHandle, mpsc::UnboundedReceiver<SessionEvent>) {
        (self.session, self.events)
    }
}

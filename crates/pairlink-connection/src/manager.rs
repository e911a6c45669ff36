//! Connection manager: the role state machine.
//!
//! The manager runs as one Tokio task that exclusively owns the current
//! state and the live role. Callers talk to it through a
//! [`ConnectionHandle`]; role tasks report back over an internal channel.
//! Every transition therefore happens on a single task, in the order its
//! inputs arrive, and an inbound accept racing a local `stop()` is just
//! two messages processed one after the other.

use std::sync::Arc;

use pairlink_transport::{PeerAddress, PeerIdentity, Transport, TransportError};
use tokio::sync::{mpsc, oneshot, watch};

use crate::roles::duplex::DuplexChannel;
use crate::roles::{
    LiveRoles, RoleEvent, RoleEventKind, RoleId, RoleSender, RoleTask, connector, listener,
};
use crate::{ConnectionError, ConnectionEvent, ConnectionState, ManagerConfig, RolePolicy};

/// Command channel capacity.
const COMMAND_CHANNEL_SIZE: usize = 64;

/// Label used when the transport refuses to resolve a peer's name.
pub const PLACEHOLDER_LABEL: &str = "Unknown device";

/// Requests a handle can make of the manager task.
enum Command {
    Listen { reply: oneshot::Sender<()> },
    Connect { peer: PeerAddress, reply: oneshot::Sender<()> },
    Stop { reply: oneshot::Sender<()> },
    Send { bytes: Vec<u8>, reply: oneshot::Sender<bool> },
    Shutdown { reply: oneshot::Sender<()> },
}

/// The single live role. Its variant *is* the connection state.
enum ActiveRole {
    Idle,
    Listening(RoleTask),
    Connecting { task: RoleTask, peer: PeerAddress },
    Connected(DuplexChannel),
}

impl ActiveRole {
    fn state(&self) -> ConnectionState {
        match self {
            Self::Idle => ConnectionState::None,
            Self::Listening(_) => ConnectionState::Listening,
            Self::Connecting { .. } => ConnectionState::Connecting,
            Self::Connected(_) => ConnectionState::Connected,
        }
    }

    fn id(&self) -> Option<RoleId> {
        match self {
            Self::Idle => None,
            Self::Listening(task) => Some(task.id()),
            Self::Connecting { task, .. } => Some(task.id()),
            Self::Connected(channel) => Some(channel.id()),
        }
    }

    /// Releases the role's resource and waits until it is gone.
    async fn close(self) {
        match self {
            Self::Idle => {}
            Self::Listening(task) => task.close().await,
            Self::Connecting { task, .. } => task.close().await,
            Self::Connected(channel) => channel.close().await,
        }
    }
}

// ---------------------------------------------------------------------------
// ConnectionHandle
// ---------------------------------------------------------------------------

/// Handle to a running connection manager.
///
/// Cheap to clone. Every call is processed by the manager task in order;
/// the async methods return once the manager has applied them.
#[derive(Clone)]
pub struct ConnectionHandle {
    commands: mpsc::Sender<Command>,
    state: watch::Receiver<ConnectionState>,
    peer: watch::Receiver<Option<PeerIdentity>>,
    live: LiveRoles,
}

impl ConnectionHandle {
    /// Starts offering the local endpoint. Stops any connector or duplex
    /// channel first; a no-op if already listening.
    pub async fn listen(&self) -> Result<(), ConnectionError> {
        self.request(|reply| Command::Listen { reply }).await
    }

    /// Starts one outbound attempt to `peer`, cancelling whatever role is
    /// live (including a previous attempt).
    pub async fn connect(&self, peer: impl Into<PeerAddress>) -> Result<(), ConnectionError> {
        let peer = peer.into();
        self.request(|reply| Command::Connect { peer, reply }).await
    }

    /// Closes the live role and goes idle.
    pub async fn stop(&self) -> Result<(), ConnectionError> {
        self.request(|reply| Command::Stop { reply }).await
    }

    /// Writes `bytes` to the connected peer.
    ///
    /// Returns `false` without side effects when not connected (expected
    /// during reconnection races), or when the write fails, in which case
    /// a `ConnectionLost` event follows.
    pub async fn send(&self, bytes: Vec<u8>) -> bool {
        self.request(|reply| Command::Send { bytes, reply })
            .await
            .unwrap_or(false)
    }

    /// Stops the manager task. Later calls return `Unavailable`.
    pub async fn shutdown(&self) -> Result<(), ConnectionError> {
        self.request(|reply| Command::Shutdown { reply }).await
    }

    /// The current state.
    pub fn state(&self) -> ConnectionState {
        *self.state.borrow()
    }

    /// The connected peer, if any.
    pub fn peer(&self) -> Option<PeerIdentity> {
        self.peer.borrow().clone()
    }

    /// Number of role tasks still alive. Never exceeds one.
    pub fn live_roles(&self) -> usize {
        self.live.count()
    }

    /// Waits until the manager reaches `target`.
    pub async fn wait_for_state(&self, target: ConnectionState) -> Result<(), ConnectionError> {
        let mut state = self.state.clone();
        state
            .wait_for(|s| *s == target)
            .await
            .map(|_| ())
            .map_err(|_| ConnectionError::Unavailable)
    }

    async fn request<R>(
        &self,
        make: impl FnOnce(oneshot::Sender<R>) -> Command,
    ) -> Result<R, ConnectionError> {
        let (reply_tx, reply_rx) = oneshot::channel();
        self.commands
            .send(make(reply_tx))
            .await
            .map_err(|_| ConnectionError::Unavailable)?;
        reply_rx.await.map_err(|_| ConnectionError::Unavailable)
    }
}

// ---------------------------------------------------------------------------
// ConnectionManager
// ---------------------------------------------------------------------------

/// The manager task's state. Create one with [`ConnectionManager::spawn`].
pub struct ConnectionManager<T: Transport> {
    transport: Arc<T>,
    config: ManagerConfig,
    role: ActiveRole,
    published: ConnectionState,
    next_role: u64,
    live: LiveRoles,
    events: mpsc::UnboundedSender<ConnectionEvent>,
    state_tx: watch::Sender<ConnectionState>,
    peer_tx: watch::Sender<Option<PeerIdentity>>,
    commands: mpsc::Receiver<Command>,
    role_tx: RoleSender<T::Stream>,
    role_rx: mpsc::UnboundedReceiver<RoleEvent<T::Stream>>,
}

impl<T: Transport> ConnectionManager<T> {
    /// Spawns a manager over `transport`, starting in `None`.
    ///
    /// Returns the handle and the ordered event stream. The manager stops
    /// when every handle is dropped or [`ConnectionHandle::shutdown`] is
    /// called.
    pub fn spawn(
        transport: T,
        config: ManagerConfig,
    ) -> (ConnectionHandle, mpsc::UnboundedReceiver<ConnectionEvent>) {
        let (cmd_tx, cmd_rx) = mpsc::channel(COMMAND_CHANNEL_SIZE);
        let (event_tx, event_rx) = mpsc::unbounded_channel();
        let (state_tx, state_rx) = watch::channel(ConnectionState::None);
        let (peer_tx, peer_rx) = watch::channel(None);
        let (role_tx, role_rx) = mpsc::unbounded_channel();
        let live = LiveRoles::default();

        let manager = Self {
            transport: Arc::new(transport),
            config: config.validated(),
            role: ActiveRole::Idle,
            published: ConnectionState::None,
            next_role: 1,
            live: live.clone(),
            events: event_tx,
            state_tx,
            peer_tx,
            commands: cmd_rx,
            role_tx,
            role_rx,
        };
        tokio::spawn(manager.run());

        let handle = ConnectionHandle {
            commands: cmd_tx,
            state: state_rx,
            peer: peer_rx,
            live,
        };
        (handle, event_rx)
    }

    async fn run(mut self) {
        tracing::debug!(policy = ?self.config.policy, "connection manager started");

        loop {
            tokio::select! {
                cmd = self.commands.recv() => {
                    let Some(cmd) = cmd else { break };
                    if !self.handle_command(cmd).await {
                        return;
                    }
                }
                Some(event) = self.role_rx.recv() => self.handle_role_event(event).await,
            }
        }

        self.shut_down().await;
    }

    async fn shut_down(&mut self) {
        self.close_role().await;
        self.transition(ActiveRole::Idle);
        tracing::debug!("connection manager stopped");
    }

    /// Applies one command. Returns `false` once the manager should stop.
    async fn handle_command(&mut self, cmd: Command) -> bool {
        match cmd {
            Command::Listen { reply } => {
                self.listen().await;
                let _ = reply.send(());
            }
            Command::Connect { peer, reply } => {
                self.connect(peer).await;
                let _ = reply.send(());
            }
            Command::Stop { reply } => {
                self.stop().await;
                let _ = reply.send(());
            }
            Command::Send { bytes, reply } => {
                let sent = self.send(bytes).await;
                let _ = reply.send(sent);
            }
            Command::Shutdown { reply } => {
                self.shut_down().await;
                let _ = reply.send(());
                return false;
            }
        }
        true
    }

    // -- Public operations ------------------------------------------------

    async fn listen(&mut self) {
        if matches!(self.role, ActiveRole::Listening(_)) {
            tracing::debug!("already listening");
            return;
        }
        self.close_role().await;
        self.start_listener();
    }

    async fn connect(&mut self, peer: PeerAddress) {
        self.close_role().await;
        let id = self.next_role_id();
        let task = RoleTask::spawn(
            id,
            &self.live,
            connector::run(id, Arc::clone(&self.transport), peer.clone(), self.role_tx.clone()),
        );
        tracing::info!(role = %id, %peer, "connector started");
        self.transition(ActiveRole::Connecting { task, peer });
    }

    async fn stop(&mut self) {
        self.close_role().await;
        self.transition(ActiveRole::Idle);
    }

    async fn send(&mut self, bytes: Vec<u8>) -> bool {
        let ActiveRole::Connected(channel) = &mut self.role else {
            tracing::debug!(state = %self.published, len = bytes.len(), "send while not connected, dropped");
            return false;
        };
        let written = channel.write(&bytes).await;
        match written {
            Ok(()) => {
                self.emit(ConnectionEvent::BytesSent(bytes));
                true
            }
            Err(e) => {
                tracing::info!(error = %e, "write failed");
                self.on_connection_lost(e.to_string()).await;
                false
            }
        }
    }

    // -- Role events ------------------------------------------------------

    async fn handle_role_event(&mut self, event: RoleEvent<T::Stream>) {
        if self.role.id() != Some(event.role) {
            // A stale accepted/connected stream is dropped here, closing it.
            tracing::debug!(role = %event.role, "discarding event from stale role");
            return;
        }

        match event.kind {
            RoleEventKind::Accepted { stream, peer } | RoleEventKind::Connected { stream, peer } => {
                self.promote_to_connected(stream, peer).await;
            }
            RoleEventKind::ConnectFailed(err) => self.on_connect_failed(err).await,
            RoleEventKind::ListenFailed(err) => self.on_listen_failed(err).await,
            RoleEventKind::Received(bytes) => self.emit(ConnectionEvent::BytesReceived(bytes)),
            RoleEventKind::Lost(err) => {
                let reason = match err {
                    Some(e) => e.to_string(),
                    None => "peer closed the connection".to_owned(),
                };
                self.on_connection_lost(reason).await;
            }
        }
    }

    /// Shared path for accepted and connected streams.
    async fn promote_to_connected(&mut self, stream: T::Stream, peer: PeerIdentity) {
        self.close_role().await;

        let label = match self.transport.resolve_label(&peer) {
            Ok(label) => label,
            Err(e) => {
                tracing::warn!(%peer, error = %e, "could not resolve peer label");
                self.report_capability(&e);
                PLACEHOLDER_LABEL.to_owned()
            }
        };

        let id = self.next_role_id();
        let channel = DuplexChannel::open(
            id,
            stream,
            peer.clone(),
            self.config.read_buffer_size,
            &self.live,
            self.role_tx.clone(),
        );
        tracing::info!(role = %id, %peer, %label, "peer connected");

        self.peer_tx.send_replace(Some(peer.clone()));
        self.transition(ActiveRole::Connected(channel));
        self.emit(ConnectionEvent::PeerConnected { peer, label });
    }

    async fn on_connection_lost(&mut self, reason: String) {
        if let ActiveRole::Connected(channel) = &self.role {
            tracing::info!(peer = %channel.peer(), %reason, "connection lost");
        }
        self.close_role().await;
        self.peer_tx.send_replace(None);
        self.emit(ConnectionEvent::ConnectionLost { reason });
        self.fall_back();
    }

    async fn on_connect_failed(&mut self, err: TransportError) {
        let peer = match &self.role {
            ActiveRole::Connecting { peer, .. } => peer.clone(),
            _ => PeerAddress::new(""),
        };
        self.close_role().await;
        self.report_capability(&err);
        self.emit(ConnectionEvent::ConnectFailed {
            peer,
            reason: err.to_string(),
        });
        self.fall_back();
    }

    async fn on_listen_failed(&mut self, err: TransportError) {
        self.close_role().await;
        self.report_capability(&err);
        self.emit(ConnectionEvent::ListenFailed {
            reason: err.to_string(),
        });
        // Re-arming a listener that cannot bind would spin.
        self.transition(ActiveRole::Idle);
    }

    // -- Helpers ----------------------------------------------------------

    fn fall_back(&mut self) {
        match self.config.policy {
            RolePolicy::Server => self.start_listener(),
            RolePolicy::Client => self.transition(ActiveRole::Idle),
        }
    }

    /// Starts a listener. The previous role must already be closed.
    fn start_listener(&mut self) {
        let id = self.next_role_id();
        let task = RoleTask::spawn(
            id,
            &self.live,
            listener::run(id, Arc::clone(&self.transport), self.role_tx.clone()),
        );
        tracing::info!(role = %id, "listener started");
        self.transition(ActiveRole::Listening(task));
    }

    /// Closes the live role, leaving `Idle` without publishing a state.
    async fn close_role(&mut self) {
        let old = std::mem::replace(&mut self.role, ActiveRole::Idle);
        if let Some(id) = old.id() {
            tracing::debug!(role = %id, "closing role");
        }
        old.close().await;
    }

    /// Installs `role` and publishes the state if it changed.
    fn transition(&mut self, role: ActiveRole) {
        self.role = role;
        let state = self.role.state();
        if state == self.published {
            return;
        }
        tracing::info!(from = %self.published, to = %state, "connection state changed");
        self.published = state;
        // Event first: a state seen through `watch` has its event queued.
        self.emit(ConnectionEvent::StateChanged(state));
        self.state_tx.send_replace(state);
    }

    fn report_capability(&self, err: &TransportError) {
        if let TransportError::CapabilityDenied { operation, reason } = err {
            self.emit(ConnectionEvent::CapabilityDenied {
                operation: *operation,
                reason: reason.clone(),
            });
        }
    }

    fn emit(&self, event: ConnectionEvent) {
        // The owner may have dropped its receiver; the manager keeps going.
        let _ = self.events.send(event);
    }

    fn next_role_id(&mut self) -> RoleId {
        let id = RoleId(self.next_role);
        self.next_role += 1;
        id
    }
}

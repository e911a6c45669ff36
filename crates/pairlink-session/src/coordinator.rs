//! Session coordinator: turns raw connection bytes into session events.
//!
//! Like the connection manager, the coordinator is an actor. It owns the
//! ready/started flags, the frame buffer, and the message codec, and it
//! consumes the manager's event stream. Nothing else touches that state,
//! so an inbound `READY` and a local `set_local_ready` can never race.

use pairlink_connection::{
    ConnectionError, ConnectionEvent, ConnectionHandle, ConnectionState, PeerAddress,
};
use pairlink_protocol::{FrameBuffer, JsonCodec, Message, MessageCodec};
use tokio::sync::{mpsc, oneshot};

use crate::{
    ContentProvider, NoContent, SessionConfig, SessionError, SessionEvent, SessionId,
    SessionMode, SessionSnapshot,
};

/// Command channel capacity.
const COMMAND_CHANNEL_SIZE: usize = 64;

type SendReply = oneshot::Sender<Result<bool, SessionError>>;

enum Command {
    SetLocalReady { ready: bool, reply: SendReply },
    StartGame { initial_state: Vec<u8>, reply: SendReply },
    /// Any message without local side effects.
    Send { msg: Message, reply: SendReply },
    SetMode { mode: SessionMode, reply: oneshot::Sender<()> },
    ResetRound { reply: oneshot::Sender<()> },
    Snapshot { reply: oneshot::Sender<SessionSnapshot> },
    Shutdown { reply: oneshot::Sender<()> },
}

/// The per-session flags. Reset whenever a connection opens or closes,
/// and on `reset_round`.
#[derive(Debug, Default)]
struct Round {
    local_ready: bool,
    remote_ready: bool,
    started: bool,
    /// `BothReady` goes out at most once per round.
    both_ready_fired: bool,
}

impl Round {
    fn both_ready(&self) -> bool {
        self.local_ready && self.remote_ready
    }
}

// ---------------------------------------------------------------------------
// SessionHandle
// ---------------------------------------------------------------------------

/// Handle to a running session coordinator.
///
/// Cheap to clone. Send operations return `Ok(true)` once the frame was
/// written, `Ok(false)` if there is no connected peer.
#[derive(Clone)]
pub struct SessionHandle {
    commands: mpsc::Sender<Command>,
    connection: ConnectionHandle,
}

impl SessionHandle {
    /// Starts listening for a peer.
    pub async fn listen(&self) -> Result<(), SessionError> {
        self.connection.listen().await.map_err(unavailable)
    }

    /// Starts one outbound attempt to `peer`.
    pub async fn connect(&self, peer: impl Into<PeerAddress>) -> Result<(), SessionError> {
        self.connection.connect(peer).await.map_err(unavailable)
    }

    /// Drops the connection (or stops listening) and goes idle.
    pub async fn stop(&self) -> Result<(), SessionError> {
        self.connection.stop().await.map_err(unavailable)
    }

    /// Sets the local ready flag and tells the peer.
    ///
    /// The flag changes even if the `READY` could not be sent.
    pub async fn set_local_ready(&self, ready: bool) -> Result<bool, SessionError> {
        self.request_reply(|reply| Command::SetLocalReady { ready, reply })
            .await?
    }

    /// Tells the peer the round starts, then marks it started and emits
    /// [`SessionEvent::GameStarted`] locally.
    ///
    /// Returns `Ok(false)` and leaves the round untouched without a peer.
    pub async fn start_game(&self, initial_state: Vec<u8>) -> Result<bool, SessionError> {
        self.request_reply(|reply| Command::StartGame {
            initial_state,
            reply,
        })
        .await?
    }

    pub async fn send_move(&self, row: u32, col: u32, succeeded: bool) -> Result<bool, SessionError> {
        self.send(Message::Move {
            row,
            col,
            succeeded,
        })
        .await
    }

    /// Pushes a full state snapshot to the peer.
    pub async fn send_state(&self, state: Vec<u8>) -> Result<bool, SessionError> {
        self.send(Message::StateSync { state }).await
    }

    pub async fn send_chat(&self, text: impl Into<String>) -> Result<bool, SessionError> {
        self.send(Message::Chat { text: text.into() }).await
    }

    pub async fn send_game_over(&self, won: bool, score: i64) -> Result<bool, SessionError> {
        self.send(Message::GameOver { won, score }).await
    }

    /// Announces `display_name` to the peer.
    pub async fn send_hello(&self, display_name: impl Into<String>) -> Result<bool, SessionError> {
        self.send(Message::Hello {
            display_name: display_name.into(),
        })
        .await
    }

    /// Asks the peer for a resource. The answer arrives as
    /// [`SessionEvent::Response`].
    pub async fn request(&self, resource_id: impl Into<String>) -> Result<bool, SessionError> {
        self.send(Message::Request {
            resource_id: resource_id.into(),
        })
        .await
    }

    /// Answers a [`SessionEvent::Request`].
    pub async fn respond(&self, payload: impl Into<String>) -> Result<bool, SessionError> {
        self.send(Message::Response {
            payload: payload.into(),
        })
        .await
    }

    /// Changes the mode for this and later sessions.
    pub async fn set_mode(&self, mode: SessionMode) -> Result<(), SessionError> {
        self.request_reply(|reply| Command::SetMode { mode, reply })
            .await
    }

    /// Clears the ready and started flags without dropping the connection,
    /// so a new ready/start cycle can begin.
    pub async fn reset_round(&self) -> Result<(), SessionError> {
        self.request_reply(|reply| Command::ResetRound { reply })
            .await
    }

    pub async fn snapshot(&self) -> Result<SessionSnapshot, SessionError> {
        self.request_reply(|reply| Command::Snapshot { reply })
            .await
    }

    /// Stops the coordinator and its connection manager.
    pub async fn shutdown(&self) -> Result<(), SessionError> {
        self.request_reply(|reply| Command::Shutdown { reply })
            .await
    }

    /// The underlying connection manager.
    pub fn connection(&self) -> &ConnectionHandle {
        &self.connection
    }

    async fn send(&self, msg: Message) -> Result<bool, SessionError> {
        self.request_reply(|reply| Command::Send { msg, reply })
            .await?
    }

    async fn request_reply<R>(
        &self,
        make: impl FnOnce(oneshot::Sender<R>) -> Command,
    ) -> Result<R, SessionError> {
        let (reply_tx, reply_rx) = oneshot::channel();
        self.commands
            .send(make(reply_tx))
            .await
            .map_err(|_| SessionError::Unavailable)?;
        reply_rx.await.map_err(|_| SessionError::Unavailable)
    }
}

fn unavailable(_: ConnectionError) -> SessionError {
    SessionError::Unavailable
}

// ---------------------------------------------------------------------------
// SessionCoordinator
// ---------------------------------------------------------------------------

/// The coordinator task's state. Create one with
/// [`SessionCoordinator::spawn`].
pub struct SessionCoordinator<P: ContentProvider> {
    connection: ConnectionHandle,
    connection_events: mpsc::UnboundedReceiver<ConnectionEvent>,
    commands: mpsc::Receiver<Command>,
    events: mpsc::UnboundedSender<SessionEvent>,
    codec: MessageCodec<JsonCodec>,
    frames: FrameBuffer,
    config: SessionConfig,
    provider: P,
    round: Round,
    mode: SessionMode,
    link: ConnectionState,
    session_id: Option<SessionId>,
    peer_name: Option<String>,
}

impl SessionCoordinator<NoContent> {
    /// Spawns a coordinator over a connection manager's handle and event
    /// stream. Every peer `REQUEST` surfaces as an event.
    pub fn spawn(
        connection: ConnectionHandle,
        connection_events: mpsc::UnboundedReceiver<ConnectionEvent>,
        config: SessionConfig,
    ) -> (SessionHandle, mpsc::UnboundedReceiver<SessionEvent>) {
        SessionCoordinator::spawn_with_provider(connection, connection_events, config, NoContent)
    }
}

impl<P: ContentProvider> SessionCoordinator<P> {
    /// Like [`spawn`](SessionCoordinator::spawn), answering peer requests
    /// from `provider` first.
    pub fn spawn_with_provider(
        connection: ConnectionHandle,
        connection_events: mpsc::UnboundedReceiver<ConnectionEvent>,
        config: SessionConfig,
        provider: P,
    ) -> (SessionHandle, mpsc::UnboundedReceiver<SessionEvent>) {
        let (cmd_tx, cmd_rx) = mpsc::channel(COMMAND_CHANNEL_SIZE);
        let (event_tx, event_rx) = mpsc::unbounded_channel();
        let config = config.validated();
        let codec = MessageCodec::json();

        let coordinator = Self {
            connection: connection.clone(),
            connection_events,
            commands: cmd_rx,
            events: event_tx,
            frames: codec.frame_buffer(),
            codec,
            mode: config.mode,
            config,
            provider,
            round: Round::default(),
            link: connection.state(),
            session_id: None,
            peer_name: None,
        };
        tokio::spawn(coordinator.run());

        let handle = SessionHandle {
            commands: cmd_tx,
            connection,
        };
        (handle, event_rx)
    }

    async fn run(mut self) {
        tracing::debug!(mode = %self.mode, "session coordinator started");

        loop {
            tokio::select! {
                cmd = self.commands.recv() => {
                    let Some(cmd) = cmd else { break };
                    self.catch_up().await;
                    if !self.handle_command(cmd).await {
                        return;
                    }
                }
                Some(event) = self.connection_events.recv() => {
                    self.handle_connection_event(event).await;
                }
            }
        }
        tracing::debug!("session coordinator stopped");
    }

    /// Applies one command. Returns `false` once the coordinator should stop.
    async fn handle_command(&mut self, cmd: Command) -> bool {
        match cmd {
            Command::SetLocalReady { ready, reply } => {
                self.round.local_ready = ready;
                let sent = self.send(&Message::Ready { is_ready: ready }).await;
                self.check_both_ready();
                let _ = reply.send(sent);
            }
            Command::StartGame {
                initial_state,
                reply,
            } => {
                let sent = self
                    .send(&Message::Start {
                        initial_state: initial_state.clone(),
                    })
                    .await;
                if matches!(sent, Ok(true)) {
                    self.round.started = true;
                    tracing::info!(session = ?self.session_id, "round started locally");
                    self.emit(SessionEvent::GameStarted(initial_state));
                }
                let _ = reply.send(sent);
            }
            Command::Send { msg, reply } => {
                let sent = self.send(&msg).await;
                let _ = reply.send(sent);
            }
            Command::SetMode { mode, reply } => {
                tracing::info!(from = %self.mode, to = %mode, "session mode changed");
                self.mode = mode;
                let _ = reply.send(());
            }
            Command::ResetRound { reply } => {
                tracing::debug!("round reset");
                self.round = Round::default();
                let _ = reply.send(());
            }
            Command::Snapshot { reply } => {
                let _ = reply.send(self.snapshot());
            }
            Command::Shutdown { reply } => {
                if let Err(e) = self.connection.shutdown().await {
                    tracing::debug!(error = %e, "connection manager already gone");
                }
                self.close_session();
                let _ = reply.send(());
                tracing::debug!("session coordinator stopped");
                return false;
            }
        }
        true
    }

    // -- Connection events ------------------------------------------------

    /// Applies connection events already queued, so a command never acts on
    /// a link state older than the one its caller observed.
    async fn catch_up(&mut self) {
        while let Ok(event) = self.connection_events.try_recv() {
            self.handle_connection_event(event).await;
        }
    }

    async fn handle_connection_event(&mut self, event: ConnectionEvent) {
        let changed = match &event {
            ConnectionEvent::StateChanged(state) => Some(*state),
            _ => None,
        };
        if let ConnectionEvent::BytesReceived(bytes) = &event {
            self.frames.push(bytes);
        }
        self.emit(SessionEvent::Connection(event));

        if let Some(state) = changed {
            self.on_state_changed(state).await;
        }
        self.drain_frames().await;
    }

    async fn on_state_changed(&mut self, state: ConnectionState) {
        let was_connected = self.link.is_connected();
        self.link = state;
        if was_connected && !state.is_connected() {
            self.close_session();
        } else if !was_connected && state.is_connected() {
            self.open_session().await;
        }
    }

    async fn open_session(&mut self) {
        self.round = Round::default();
        self.frames.clear();
        self.peer_name = None;
        let id = SessionId::generate();
        tracing::info!(session = %id, mode = %self.mode, "session opened");
        self.session_id = Some(id.clone());
        self.emit(SessionEvent::SessionOpened { session_id: id });

        if let Some(display_name) = self.config.display_name.clone() {
            self.reply(Message::Hello { display_name }).await;
        }
    }

    fn close_session(&mut self) {
        self.round = Round::default();
        self.frames.clear();
        self.peer_name = None;
        if let Some(id) = self.session_id.take() {
            tracing::info!(session = %id, "session closed");
            self.emit(SessionEvent::SessionClosed { session_id: id });
        }
    }

    /// Decodes every complete frame buffered so far.
    async fn drain_frames(&mut self) {
        while let Some(frame) = self.frames.next_frame() {
            let payload = match frame {
                Ok(payload) => payload,
                Err(e) => {
                    tracing::warn!(error = %e, "dropping unframeable bytes");
                    continue;
                }
            };
            match self.codec.decode_payload(&payload) {
                Ok(msg) => self.handle_message(msg).await,
                Err(e) => {
                    tracing::warn!(error = %e, len = payload.len(), "discarding undecodable frame");
                }
            }
        }
    }

    // -- Messages ---------------------------------------------------------

    async fn handle_message(&mut self, msg: Message) {
        tracing::debug!(kind = msg.kind(), "message received");
        match msg {
            Message::Hello { display_name } => {
                self.peer_name = Some(display_name.clone());
                self.emit(SessionEvent::PeerHello {
                    display_name: display_name.clone(),
                });
                if self.config.acknowledge_hello {
                    let note = format!("hello, {display_name}");
                    self.reply(Message::Ack { note }).await;
                }
            }
            Message::Ack { note } => self.emit(SessionEvent::Ack { note }),
            Message::Request { resource_id } => {
                let resolved = self.provider.resolve(&resource_id).await;
                match resolved {
                    Some(payload) => {
                        tracing::debug!(%resource_id, "request answered by provider");
                        self.reply(Message::Response { payload }).await;
                    }
                    None => self.emit(SessionEvent::Request { resource_id }),
                }
            }
            Message::Response { payload } => self.emit(SessionEvent::Response { payload }),
            Message::Chat { text } => self.emit(SessionEvent::Chat(text)),
            Message::Ready { is_ready } => {
                self.round.remote_ready = is_ready;
                self.emit(SessionEvent::RemoteReady(is_ready));
                self.check_both_ready();
            }
            Message::Start { initial_state } => {
                self.round.started = true;
                tracing::info!(session = ?self.session_id, "round started by peer");
                self.emit(SessionEvent::GameStarted(initial_state));
            }
            Message::Move {
                row,
                col,
                succeeded,
            } => self.emit(SessionEvent::RemoteMove {
                row,
                col,
                succeeded,
            }),
            Message::StateSync { state } => self.emit(SessionEvent::StateSync(state)),
            Message::GameOver { won, score } => self.emit(SessionEvent::GameOver { won, score }),
            Message::Unknown => tracing::debug!("ignoring message of unknown kind"),
        }
    }

    // -- Helpers ----------------------------------------------------------

    /// Emits `BothReady` the first time both flags are set in a round that
    /// has not started.
    fn check_both_ready(&mut self) {
        if self.round.both_ready() && !self.round.started && !self.round.both_ready_fired {
            self.round.both_ready_fired = true;
            tracing::info!(session = ?self.session_id, "both players ready");
            self.emit(SessionEvent::BothReady);
        }
    }

    /// Writes `msg` to the peer. Nothing goes out until the coordinator has
    /// opened the session, so a session reset never follows a local send.
    async fn send(&mut self, msg: &Message) -> Result<bool, SessionError> {
        let frame = self.codec.encode(msg)?;
        if !self.link.is_connected() {
            tracing::debug!(kind = msg.kind(), "message not sent, session not open");
            return Ok(false);
        }
        let sent = self.connection.send(frame).await;
        if !sent {
            tracing::debug!(kind = msg.kind(), "message not sent, no connected peer");
        }
        Ok(sent)
    }

    /// Sends a message the coordinator originates itself. Failures are
    /// logged only; nobody is waiting on the result.
    async fn reply(&mut self, msg: Message) {
        if let Err(e) = self.send(&msg).await {
            tracing::warn!(kind = msg.kind(), error = %e, "could not encode reply");
        }
    }

    fn snapshot(&self) -> SessionSnapshot {
        SessionSnapshot {
            connection: self.link,
            local_ready: self.round.local_ready,
            remote_ready: self.round.remote_ready,
            started: self.round.started,
            mode: self.mode,
            session_id: self.session_id.clone(),
            peer_name: self.peer_name.clone(),
        }
    }

    fn emit(&self, event: SessionEvent) {
        let _ = self.events.send(event);
    }
}

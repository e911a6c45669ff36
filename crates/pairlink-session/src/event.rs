//! Events published by a session coordinator.

use futures_util::Stream;
use pairlink_connection::ConnectionEvent;
use tokio::sync::mpsc;

use crate::SessionId;

/// Something the game layer should react to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionEvent {
    // -- Game --
    /// The peer made a move.
    RemoteMove { row: u32, col: u32, succeeded: bool },
    /// The peer pushed a full state snapshot.
    StateSync(Vec<u8>),
    Chat(String),
    /// The peer's ready flag changed.
    RemoteReady(bool),
    /// Both players became ready. Fires once per round, before start.
    BothReady,
    /// The round started, locally or by the peer, with this initial state.
    GameStarted(Vec<u8>),
    /// The peer's game ended.
    GameOver { won: bool, score: i64 },

    // -- Handshake and content --
    PeerHello { display_name: String },
    Ack { note: String },
    /// A request no [`ContentProvider`](crate::ContentProvider) answered.
    Request { resource_id: String },
    Response { payload: String },

    // -- Lifecycle --
    /// A connection reached `Connected`; a fresh, unstarted session began.
    SessionOpened { session_id: SessionId },
    /// The connection left `Connected`; the session ended.
    SessionClosed { session_id: SessionId },

    /// Every connection manager event, forwarded unchanged.
    Connection(ConnectionEvent),
}

/// Adapts a session event receiver into a [`Stream`].
pub fn into_event_stream(
    mut events: mpsc::UnboundedReceiver<SessionEvent>,
) -> impl Stream<Item = SessionEvent> + Send + Unpin {
    futures_util::stream::poll_fn(move |cx| events.poll_recv(cx))
}

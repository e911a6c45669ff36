//! Integration tests for the connection manager.
//!
//! Lifecycle scenarios run over real loopback TCP. Cancellation and
//! capability scenarios use an in-memory transport so they can hold a
//! connect attempt open or refuse an operation on demand.

use std::sync::{Arc, Mutex};
use std::time::Duration;

use pairlink_connection::{
    ConnectionError, ConnectionEvent, ConnectionHandle, ConnectionManager, ConnectionState,
    ManagerConfig, PLACEHOLDER_LABEL,
};
use pairlink_transport::{
    Acceptor, Operation, PeerAddress, PeerIdentity, TcpTransport, Transport, TransportError,
};
use tokio::io::{AsyncReadExt, DuplexStream};
use tokio::sync::{Notify, mpsc, oneshot};
use tokio::time::timeout;

const WAIT: Duration = Duration::from_secs(5);

type Events = mpsc::UnboundedReceiver<ConnectionEvent>;

async fn next_event(rx: &mut Events) -> ConnectionEvent {
    timeout(WAIT, rx.recv())
        .await
        .expect("timed out waiting for event")
        .expect("event channel closed")
}

async fn wait_for_event<F>(rx: &mut Events, mut pred: F) -> ConnectionEvent
where
    F: FnMut(&ConnectionEvent) -> bool,
{
    loop {
        let event = next_event(rx).await;
        if pred(&event) {
            return event;
        }
    }
}

async fn reach(handle: &ConnectionHandle, state: ConnectionState) {
    timeout(WAIT, handle.wait_for_state(state))
        .await
        .expect("timed out waiting for state")
        .expect("manager alive");
}

async fn assert_quiet(rx: &mut Events) {
    let extra = timeout(Duration::from_millis(200), rx.recv()).await;
    assert!(extra.is_err(), "unexpected event: {extra:?}");
}

// =========================================================================
// TCP helpers
// =========================================================================

fn loopback() -> TcpTransport {
    TcpTransport::new("127.0.0.1:0".parse().expect("valid addr"))
}

async fn bound_addr(transport: &TcpTransport) -> String {
    timeout(WAIT, async {
        loop {
            if let Some(addr) = transport.local_addr() {
                return addr.to_string();
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
    })
    .await
    .expect("listener never bound")
}

fn closed_port() -> String {
    let listener = std::net::TcpListener::bind("127.0.0.1:0").expect("bind");
    listener.local_addr().expect("addr").to_string()
}

struct Side {
    handle: ConnectionHandle,
    events: Events,
}

/// A server-policy manager listening on loopback, with its address.
async fn listening_server() -> (Side, String) {
    let transport = loopback();
    let (handle, events) = ConnectionManager::spawn(transport.clone(), ManagerConfig::server());
    handle.listen().await.expect("listen");
    let addr = bound_addr(&transport).await;
    (Side { handle, events }, addr)
}

async fn connected_pair() -> (Side, Side, String) {
    let (server, addr) = listening_server().await;
    let (handle, events) = ConnectionManager::spawn(loopback(), ManagerConfig::client());
    handle.connect(addr.as_str()).await.expect("connect");
    reach(&handle, ConnectionState::Connected).await;
    reach(&server.handle, ConnectionState::Connected).await;
    (server, Side { handle, events }, addr)
}

// =========================================================================
// Lifecycle over TCP
// =========================================================================

#[tokio::test]
async fn test_listen_and_connect_both_sides_connected() {
    let (mut server, mut client, addr) = connected_pair().await;

    let event = wait_for_event(&mut server.events, |e| {
        matches!(e, ConnectionEvent::PeerConnected { .. })
    })
    .await;
    let ConnectionEvent::PeerConnected { label, .. } = event else {
        unreachable!()
    };
    assert!(label.starts_with("127.0.0.1:"));

    let event = wait_for_event(&mut client.events, |e| {
        matches!(e, ConnectionEvent::PeerConnected { .. })
    })
    .await;
    let ConnectionEvent::PeerConnected { peer, label } = event else {
        unreachable!()
    };
    assert_eq!(peer.address, PeerAddress::new(addr.clone()));
    assert_eq!(label, addr);

    assert_eq!(client.handle.peer().map(|p| p.address), Some(PeerAddress::new(addr)));
    assert_eq!(server.handle.live_roles(), 1);
    assert_eq!(client.handle.live_roles(), 1);
}

#[tokio::test]
async fn test_client_state_events_in_order() {
    let (server, addr) = listening_server().await;
    let (handle, mut events) = ConnectionManager::spawn(loopback(), ManagerConfig::client());
    handle.connect(addr.as_str()).await.expect("connect");

    assert_eq!(
        next_event(&mut events).await,
        ConnectionEvent::StateChanged(ConnectionState::Connecting)
    );
    assert_eq!(
        next_event(&mut events).await,
        ConnectionEvent::StateChanged(ConnectionState::Connected)
    );
    assert!(matches!(
        next_event(&mut events).await,
        ConnectionEvent::PeerConnected { .. }
    ));
    drop(server);
}

#[tokio::test]
async fn test_send_delivers_bytes_to_peer() {
    let (mut server, mut client, _) = connected_pair().await;

    assert!(client.handle.send(b"hello".to_vec()).await);
    wait_for_event(&mut client.events, |e| {
        *e == ConnectionEvent::BytesSent(b"hello".to_vec())
    })
    .await;

    let mut received = Vec::new();
    while received.len() < 5 {
        if let ConnectionEvent::BytesReceived(bytes) = next_event(&mut server.events).await {
            received.extend(bytes);
        }
    }
    assert_eq!(received, b"hello");
}

#[tokio::test]
async fn test_send_while_not_connected_returns_false() {
    let (handle, mut events) = ConnectionManager::spawn(loopback(), ManagerConfig::client());

    assert!(!handle.send(b"nobody".to_vec()).await);
    assert_eq!(handle.state(), ConnectionState::None);
    assert_quiet(&mut events).await;
}

#[tokio::test]
async fn test_peer_close_emits_single_connection_lost() {
    let (mut server, client, _) = connected_pair().await;
    wait_for_event(&mut server.events, |e| {
        matches!(e, ConnectionEvent::PeerConnected { .. })
    })
    .await;

    client.handle.stop().await.expect("stop");
    assert_eq!(client.handle.state(), ConnectionState::None);

    assert!(matches!(
        next_event(&mut server.events).await,
        ConnectionEvent::ConnectionLost { .. }
    ));
    assert_eq!(
        next_event(&mut server.events).await,
        ConnectionEvent::StateChanged(ConnectionState::Listening)
    );
    assert_quiet(&mut server.events).await;

    assert!(!server.handle.send(b"late".to_vec()).await);
    assert!(server.handle.peer().is_none());
}

#[tokio::test]
async fn test_server_rearms_and_accepts_new_peer() {
    let (server, first, addr) = connected_pair().await;
    first.handle.stop().await.expect("stop");
    reach(&server.handle, ConnectionState::Listening).await;

    // The listener is re-armed before its socket is bound, so retry
    // until the rebind lands.
    let (second, mut events) = ConnectionManager::spawn(loopback(), ManagerConfig::client());
    let mut connected = false;
    for _ in 0..50 {
        second.connect(addr.as_str()).await.expect("connect");
        let outcome = wait_for_event(&mut events, |e| {
            matches!(
                e,
                ConnectionEvent::PeerConnected { .. } | ConnectionEvent::ConnectFailed { .. }
            )
        })
        .await;
        if matches!(outcome, ConnectionEvent::PeerConnected { .. }) {
            connected = true;
            break;
        }
        tokio::time::sleep(Duration::from_millis(20)).await;
    }
    assert!(connected, "second peer never connected");
    reach(&server.handle, ConnectionState::Connected).await;
}

#[tokio::test]
async fn test_second_inbound_refused_while_connected() {
    let (_server, _client, addr) = connected_pair().await;

    let attempt = timeout(WAIT, tokio::net::TcpStream::connect(addr.as_str()))
        .await
        .expect("connect attempt should settle");
    assert!(attempt.is_err(), "listener should be closed while connected");
}

#[tokio::test]
async fn test_connect_failure_client_goes_idle() {
    let addr = closed_port();
    let (handle, mut events) = ConnectionManager::spawn(loopback(), ManagerConfig::client());
    handle.connect(addr.as_str()).await.expect("connect");

    assert_eq!(
        next_event(&mut events).await,
        ConnectionEvent::StateChanged(ConnectionState::Connecting)
    );
    let event = next_event(&mut events).await;
    let ConnectionEvent::ConnectFailed { peer, .. } = event else {
        panic!("expected ConnectFailed, got {event:?}");
    };
    assert_eq!(peer, PeerAddress::new(addr));
    assert_eq!(
        next_event(&mut events).await,
        ConnectionEvent::StateChanged(ConnectionState::None)
    );
    assert_eq!(handle.live_roles(), 0);
}

#[tokio::test]
async fn test_connect_failure_server_rearms_listener() {
    let addr = closed_port();
    let (handle, mut events) = ConnectionManager::spawn(loopback(), ManagerConfig::server());
    handle.connect(addr.as_str()).await.expect("connect");

    wait_for_event(&mut events, |e| {
        matches!(e, ConnectionEvent::ConnectFailed { .. })
    })
    .await;
    assert_eq!(
        next_event(&mut events).await,
        ConnectionEvent::StateChanged(ConnectionState::Listening)
    );
    assert_eq!(handle.state(), ConnectionState::Listening);
}

#[tokio::test]
async fn test_listen_twice_is_idempotent() {
    let (handle, mut events) = ConnectionManager::spawn(loopback(), ManagerConfig::server());
    handle.listen().await.expect("listen");
    handle.listen().await.expect("listen again");

    assert_eq!(
        next_event(&mut events).await,
        ConnectionEvent::StateChanged(ConnectionState::Listening)
    );
    assert_quiet(&mut events).await;
    assert_eq!(handle.live_roles(), 1);
}

#[tokio::test]
async fn test_stop_from_listening_releases_role() {
    let (handle, _events) = ConnectionManager::spawn(loopback(), ManagerConfig::server());
    handle.listen().await.expect("listen");
    assert_eq!(handle.state(), ConnectionState::Listening);

    handle.stop().await.expect("stop");
    assert_eq!(handle.state(), ConnectionState::None);
    assert_eq!(handle.live_roles(), 0);
}

#[tokio::test]
async fn test_shutdown_makes_handle_unavailable() {
    let (handle, _events) = ConnectionManager::spawn(loopback(), ManagerConfig::client());
    handle.shutdown().await.expect("shutdown");

    assert!(matches!(
        handle.listen().await,
        Err(ConnectionError::Unavailable)
    ));
    assert!(!handle.send(b"x".to_vec()).await);
}

// =========================================================================
// In-memory transport
// =========================================================================

/// Peer address whose connect attempt never completes.
const HANG: &str = "hang";

/// Fires when dropped, proving a cancelled role released what it held.
struct DropProbe(Option<oneshot::Sender<()>>);

impl Drop for DropProbe {
    fn drop(&mut self) {
        if let Some(tx) = self.0.take() {
            let _ = tx.send(());
        }
    }
}

struct MockTransport {
    deny_bind: bool,
    deny_label: bool,
    hang_probe: Mutex<Option<oneshot::Sender<()>>>,
    hang_entered: Arc<Notify>,
    remotes: mpsc::UnboundedSender<DuplexStream>,
}

/// The test's view of the far ends of mock streams.
struct MockRemote {
    streams: mpsc::UnboundedReceiver<DuplexStream>,
    hang_entered: Arc<Notify>,
    hang_dropped: oneshot::Receiver<()>,
}

impl MockRemote {
    /// Waits until the hanging connect attempt is actually in flight.
    async fn attempt_in_flight(&self) {
        timeout(WAIT, self.hang_entered.notified())
            .await
            .expect("hanging attempt never started");
    }
}

impl MockTransport {
    fn new() -> (Self, MockRemote) {
        let (remotes, streams) = mpsc::unbounded_channel();
        let (probe_tx, hang_dropped) = oneshot::channel();
        let hang_entered = Arc::new(Notify::new());
        let transport = Self {
            deny_bind: false,
            deny_label: false,
            hang_probe: Mutex::new(Some(probe_tx)),
            hang_entered: Arc::clone(&hang_entered),
            remotes,
        };
        (
            transport,
            MockRemote {
                streams,
                hang_entered,
                hang_dropped,
            },
        )
    }
}

/// Accepts nothing; only its bind outcome matters here.
struct PendingAcceptor;

impl Acceptor for PendingAcceptor {
    type Stream = DuplexStream;

    async fn accept(&mut self) -> Result<(DuplexStream, PeerIdentity), TransportError> {
        std::future::pending().await
    }
}

impl Transport for MockTransport {
    type Stream = DuplexStream;
    type Acceptor = PendingAcceptor;

    async fn bind(&self) -> Result<PendingAcceptor, TransportError> {
        if self.deny_bind {
            return Err(TransportError::CapabilityDenied {
                operation: Operation::Bind,
                reason: "discoverability refused".into(),
            });
        }
        Ok(PendingAcceptor)
    }

    async fn connect(
        &self,
        peer: &PeerAddress,
    ) -> Result<(DuplexStream, PeerIdentity), TransportError> {
        if peer.as_str() == HANG {
            let probe = DropProbe(self.hang_probe.lock().unwrap().take());
            let _probe = probe;
            self.hang_entered.notify_one();
            std::future::pending::<()>().await;
        }
        let (local, remote) = tokio::io::duplex(1024);
        let _ = self.remotes.send(remote);
        Ok((local, PeerIdentity::new(peer.clone()).with_name("Mock Peer")))
    }

    fn resolve_label(&self, peer: &PeerIdentity) -> Result<String, TransportError> {
        if self.deny_label {
            return Err(TransportError::CapabilityDenied {
                operation: Operation::ResolvePeer,
                reason: "name lookup refused".into(),
            });
        }
        Ok(peer.label().to_owned())
    }
}

#[tokio::test]
async fn test_connect_replaces_pending_attempt() {
    let (transport, mut remote) = MockTransport::new();
    let (handle, _events) = ConnectionManager::spawn(transport, ManagerConfig::client());

    handle.connect(HANG).await.expect("connect");
    remote.attempt_in_flight().await;
    assert_eq!(handle.state(), ConnectionState::Connecting);
    assert_eq!(handle.live_roles(), 1);

    handle.connect("peer-b").await.expect("connect");
    timeout(WAIT, &mut remote.hang_dropped)
        .await
        .expect("first attempt should be cancelled")
        .expect("probe fired");

    reach(&handle, ConnectionState::Connected).await;
    assert_eq!(handle.live_roles(), 1);
    assert_eq!(
        handle.peer().map(|p| p.address),
        Some(PeerAddress::new("peer-b"))
    );

    let mut far_end = timeout(WAIT, remote.streams.recv())
        .await
        .expect("stream handed out")
        .expect("open");
    assert!(handle.send(b"ping".to_vec()).await);
    let mut buf = [0u8; 4];
    far_end.read_exact(&mut buf).await.expect("read");
    assert_eq!(&buf, b"ping");
}

#[tokio::test]
async fn test_stop_cancels_pending_attempt() {
    let (transport, mut remote) = MockTransport::new();
    let (handle, _events) = ConnectionManager::spawn(transport, ManagerConfig::client());

    handle.connect(HANG).await.expect("connect");
    remote.attempt_in_flight().await;
    handle.stop().await.expect("stop");

    assert!(remote.hang_dropped.try_recv().is_ok());
    assert_eq!(handle.state(), ConnectionState::None);
    assert_eq!(handle.live_roles(), 0);
}

#[tokio::test]
async fn test_bind_denied_reports_capability_and_goes_idle() {
    let (mut transport, _remote) = MockTransport::new();
    transport.deny_bind = true;
    let (handle, mut events) = ConnectionManager::spawn(transport, ManagerConfig::server());
    handle.listen().await.expect("listen");

    assert_eq!(
        next_event(&mut events).await,
        ConnectionEvent::StateChanged(ConnectionState::Listening)
    );
    let event = next_event(&mut events).await;
    assert!(
        matches!(
            event,
            ConnectionEvent::CapabilityDenied {
                operation: Operation::Bind,
                ..
            }
        ),
        "got {event:?}"
    );
    assert!(matches!(
        next_event(&mut events).await,
        ConnectionEvent::ListenFailed { .. }
    ));
    assert_eq!(
        next_event(&mut events).await,
        ConnectionEvent::StateChanged(ConnectionState::None)
    );
    assert_quiet(&mut events).await;
}

#[tokio::test]
async fn test_label_denied_uses_placeholder() {
    let (mut transport, _remote) = MockTransport::new();
    transport.deny_label = true;
    let (handle, mut events) = ConnectionManager::spawn(transport, ManagerConfig::client());
    handle.connect("peer-c").await.expect("connect");

    let denied = wait_for_event(&mut events, |e| {
        matches!(e, ConnectionEvent::CapabilityDenied { .. })
    })
    .await;
    assert!(matches!(
        denied,
        ConnectionEvent::CapabilityDenied {
            operation: Operation::ResolvePeer,
            ..
        }
    ));

    let connected = wait_for_event(&mut events, |e| {
        matches!(e, ConnectionEvent::PeerConnected { .. })
    })
    .await;
    let ConnectionEvent::PeerConnected { label, .. } = connected else {
        unreachable!()
    };
    assert_eq!(label, PLACEHOLDER_LABEL);
    assert_eq!(handle.state(), ConnectionState::Connected);
}

#[tokio::test]
async fn test_resolved_label_prefers_advertised_name() {
    let (transport, _remote) = MockTransport::new();
    let (handle, mut events) = ConnectionManager::spawn(transport, ManagerConfig::client());
    handle.connect("peer-d").await.expect("connect");

    let connected = wait_for_event(&mut events, |e| {
        matches!(e, ConnectionEvent::PeerConnected { .. })
    })
    .await;
    assert!(matches!(
        connected,
        ConnectionEvent::PeerConnected { label, .. } if label == "Mock Peer"
    ));
    drop(handle);
}

#[tokio::test]
async fn test_far_end_close_reports_connection_lost() {
    let (transport, mut remote) = MockTransport::new();
    let (handle, mut events) = ConnectionManager::spawn(transport, ManagerConfig::client());
    handle.connect("peer-e").await.expect("connect");
    reach(&handle, ConnectionState::Connected).await;

    let far_end = timeout(WAIT, remote.streams.recv())
        .await
        .expect("stream handed out")
        .expect("open");
    drop(far_end);

    wait_for_event(&mut events, |e| {
        matches!(e, ConnectionEvent::ConnectionLost { .. })
    })
    .await;
    assert_eq!(
        next_event(&mut events).await,
        ConnectionEvent::StateChanged(ConnectionState::None)
    );
    assert_quiet(&mut events).await;
    assert!(!handle.send(b"gone".to_vec()).await);
}

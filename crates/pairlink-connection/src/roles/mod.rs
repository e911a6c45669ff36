//! The three concurrent roles a manager can run: listen loop, connect
//! attempt, and duplex read loop.
//!
//! Each role is a Tokio task owning its socket. Roles never touch manager
//! state; they report back through a [`RoleSender`], tagging every event
//! with the [`RoleId`] they were started under so the manager can discard
//! reports from roles it has already replaced.
//!
//! A role is cancelled by aborting its task. Aborting drops the task's
//! future, and with it the socket the task was blocked on, so a pending
//! accept, connect, or read ends immediately without polling a flag.

pub(crate) mod connector;
pub(crate) mod duplex;
pub(crate) mod listener;

use std::fmt;
use std::future::Future;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

use pairlink_transport::{PeerIdentity, TransportError};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

/// Identifies one started role. Strictly increasing per manager.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub(crate) struct RoleId(pub(crate) u64);

impl fmt::Display for RoleId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "role-{}", self.0)
    }
}

/// A report from a role task to its manager.
pub(crate) struct RoleEvent<S> {
    pub(crate) role: RoleId,
    pub(crate) kind: RoleEventKind<S>,
}

pub(crate) enum RoleEventKind<S> {
    /// The listener accepted an inbound stream.
    Accepted { stream: S, peer: PeerIdentity },
    /// The connector's attempt succeeded.
    Connected { stream: S, peer: PeerIdentity },
    /// The connector's attempt failed.
    ConnectFailed(TransportError),
    /// The listener could not bind or keep accepting.
    ListenFailed(TransportError),
    /// The read loop read some bytes.
    Received(Vec<u8>),
    /// The read loop hit EOF (`None`) or an error.
    Lost(Option<TransportError>),
}

pub(crate) type RoleSender<S> = mpsc::UnboundedSender<RoleEvent<S>>;

/// Sends `kind` tagged with `role`. A closed channel means the manager is
/// gone, so the report is dropped.
pub(crate) fn report<S>(events: &RoleSender<S>, role: RoleId, kind: RoleEventKind<S>) -> bool {
    events.send(RoleEvent { role, kind }).is_ok()
}

// ---------------------------------------------------------------------------
// Live role accounting
// ---------------------------------------------------------------------------

/// Counts role tasks whose futures have not yet been dropped.
#[derive(Debug, Clone, Default)]
pub(crate) struct LiveRoles(Arc<AtomicUsize>);

impl LiveRoles {
    pub(crate) fn count(&self) -> usize {
        self.0.load(Ordering::SeqCst)
    }

    fn enter(&self) -> LiveRoleGuard {
        self.0.fetch_add(1, Ordering::SeqCst);
        LiveRoleGuard(Arc::clone(&self.0))
    }
}

struct LiveRoleGuard(Arc<AtomicUsize>);

impl Drop for LiveRoleGuard {
    fn drop(&mut self) {
        self.0.fetch_sub(1, Ordering::SeqCst);
    }
}

// ---------------------------------------------------------------------------
// RoleTask
// ---------------------------------------------------------------------------

/// Owned handle to a running role task.
///
/// [`close`](Self::close) aborts the task and waits until its future (and
/// every socket it owned) has been dropped. Dropping the handle without
/// closing still aborts the task.
pub(crate) struct RoleTask {
    id: RoleId,
    task: Option<JoinHandle<()>>,
}

impl RoleTask {
    pub(crate) fn spawn<F>(id: RoleId, live: &LiveRoles, role: F) -> Self
    where
        F: Future<Output = ()> + Send + 'static,
    {
        let guard = live.enter();
        let task = tokio::spawn(async move {
            let _guard = guard;
            role.await;
        });
        Self {
            id,
            task: Some(task),
        }
    }

    pub(crate) fn id(&self) -> RoleId {
        self.id
    }

    pub(crate) async fn close(mut self) {
        if let Some(task) = self.task.take() {
            task.abort();
            if let Err(e) = task.await {
                if e.is_panic() {
                    tracing::error!(role = %self.id, "role task panicked");
                }
            }
        }
    }
}

impl Drop for RoleTask {
    fn drop(&mut self) {
        if let Some(task) = &self.task {
            task.abort();
        }
    }
}

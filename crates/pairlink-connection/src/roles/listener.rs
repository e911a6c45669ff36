//! Listener role: bind once, then accept until one stream arrives.

use std::sync::Arc;
use std::time::Duration;

use pairlink_transport::{Acceptor, Transport};

use super::{RoleEventKind, RoleId, RoleSender, report};

/// Pause after a transient accept error before accepting again.
const ACCEPT_ERROR_PAUSE: Duration = Duration::from_millis(100);

/// Runs the accept loop for `role`.
///
/// Ends after delivering the first accepted stream, or after a bind
/// failure or capability denial. The bound socket is released when this
/// future returns or is dropped.
pub(crate) async fn run<T: Transport>(
    role: RoleId,
    transport: Arc<T>,
    events: RoleSender<T::Stream>,
) {
    let mut acceptor = match transport.bind().await {
        Ok(acceptor) => acceptor,
        Err(e) => {
            tracing::warn!(%role, error = %e, "listener bind failed");
            report(&events, role, RoleEventKind::ListenFailed(e));
            return;
        }
    };
    let endpoint = acceptor.local_endpoint().unwrap_or_default();
    tracing::info!(%role, %endpoint, "listener accepting");

    loop {
        match acceptor.accept().await {
            Ok((stream, peer)) => {
                tracing::info!(%role, %peer, "listener accepted peer");
                report(&events, role, RoleEventKind::Accepted { stream, peer });
                return;
            }
            Err(e) if e.is_capability_denied() => {
                tracing::warn!(%role, error = %e, "accept not permitted");
                report(&events, role, RoleEventKind::ListenFailed(e));
                return;
            }
            Err(e) => {
                tracing::warn!(%role, error = %e, "accept failed, still listening");
                tokio::time::sleep(ACCEPT_ERROR_PAUSE).await;
            }
        }
    }
}

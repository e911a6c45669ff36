//! Connector role: exactly one outbound attempt.

use std::sync::Arc;

use pairlink_transport::{PeerAddress, Transport};

use super::{RoleEventKind, RoleId, RoleSender, report};

/// Attempts one connection to `peer` and reports the outcome.
///
/// Dropping this future mid-attempt drops the half-open socket, aborting
/// the attempt.
pub(crate) async fn run<T: Transport>(
    role: RoleId,
    transport: Arc<T>,
    peer: PeerAddress,
    events: RoleSender<T::Stream>,
) {
    transport.cancel_discovery().await;
    tracing::debug!(%role, %peer, "connecting");

    let kind = match transport.connect(&peer).await {
        Ok((stream, identity)) => RoleEventKind::Connected {
            stream,
            peer: identity,
        },
        Err(e) => {
            tracing::info!(%role, %peer, error = %e, "connect attempt failed");
            RoleEventKind::ConnectFailed(e)
        }
    };
    report(&events, role, kind);
}

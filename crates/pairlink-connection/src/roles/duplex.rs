//! Duplex channel: the read loop task plus the write half of one stream.

use pairlink_transport::{Operation, PeerIdentity, TransportError};
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};

use super::{LiveRoles, RoleEventKind, RoleId, RoleSender, RoleTask, report};

type BoxedWriter = Box<dyn AsyncWrite + Send + Unpin>;

/// Owns one established stream.
///
/// The read half lives in a role task that forwards every non-empty read
/// and reports EOF or error exactly once. The write half stays here and is
/// driven by the manager, so writes are never concurrent.
pub(crate) struct DuplexChannel {
    reader: RoleTask,
    writer: BoxedWriter,
    peer: PeerIdentity,
}

impl DuplexChannel {
    /// Splits `stream` and starts its read loop under `role`.
    pub(crate) fn open<S>(
        role: RoleId,
        stream: S,
        peer: PeerIdentity,
        buffer_size: usize,
        live: &LiveRoles,
        events: RoleSender<S>,
    ) -> Self
    where
        S: AsyncRead + AsyncWrite + Send + Unpin + 'static,
    {
        let (read_half, write_half) = tokio::io::split(stream);
        let reader = RoleTask::spawn(
            role,
            live,
            read_loop(role, read_half, buffer_size, events),
        );
        Self {
            reader,
            writer: Box::new(write_half),
            peer,
        }
    }

    pub(crate) fn id(&self) -> RoleId {
        self.reader.id()
    }

    pub(crate) fn peer(&self) -> &PeerIdentity {
        &self.peer
    }

    /// Writes all of `bytes` and flushes. No retry on failure.
    pub(crate) async fn write(&mut self, bytes: &[u8]) -> Result<(), TransportError> {
        self.writer
            .write_all(bytes)
            .await
            .map_err(|e| TransportError::from_io(Operation::Send, e))?;
        self.writer
            .flush()
            .await
            .map_err(|e| TransportError::from_io(Operation::Send, e))
    }

    /// Stops the read loop and closes the stream.
    pub(crate) async fn close(mut self) {
        self.reader.close().await;
        if let Err(e) = self.writer.shutdown().await {
            tracing::debug!(peer = %self.peer, error = %e, "stream shutdown failed");
        }
    }
}

async fn read_loop<R, S>(role: RoleId, mut reader: R, buffer_size: usize, events: RoleSender<S>)
where
    R: AsyncRead + Unpin,
{
    let mut buf = vec![0u8; buffer_size];
    loop {
        match reader.read(&mut buf).await {
            Ok(0) => {
                tracing::debug!(%role, "peer closed stream");
                report(&events, role, RoleEventKind::Lost(None));
                return;
            }
            Ok(n) => {
                if !report(&events, role, RoleEventKind::Received(buf[..n].to_vec())) {
                    return;
                }
            }
            Err(e) => {
                tracing::debug!(%role, error = %e, "read failed");
                let err = TransportError::from_io(Operation::Receive, e);
                report(&events, role, RoleEventKind::Lost(Some(err)));
                return;
            }
        }
    }
}

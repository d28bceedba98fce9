//! The shared realtime connection and the handles components observe it
//! through.
//!
//! Ownership is split:
//!
//! - [`RealtimeConnection`] is held by exactly one owner, the
//!   [`ConnectionManager`](crate::ConnectionManager)'s holder slot, as an
//!   `Arc` that never leaves it. Dropping it terminates the connection.
//! - [`ConnectionHandle`] wraps a `Weak` to the same value. Components can
//!   look at the connection and queue events on it, but holding a handle
//!   never keeps a torn-down connection alive.
//!
//! The status lives in a `watch` channel shared with the driver task, so
//! both sides see transitions immediately and `Terminated` can be
//! published synchronously on teardown.

use std::fmt;
use std::sync::{Arc, Weak};

use marketlink_protocol::{ClientFrame, Credentials, ProtocolError};
use marketlink_transport::ConnectionId;
use serde::Serialize;
use tokio::sync::{mpsc, watch};

use crate::SessionError;

/// Where a connection is in its lifecycle.
///
/// ```text
/// Connecting ──→ Connected ──→ Disconnected ──(retry)──→ Connecting
///      │              │              │
///      └──────────────┴──────────────┴──→ Terminated
/// ```
///
/// `Terminated` is the only terminal state. It is reached solely through
/// an explicit teardown, never by a network failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionStatus {
    /// A transport connection or handshake is in flight.
    Connecting,
    /// Handshake accepted; frames flow.
    Connected,
    /// Lost or never established. May be waiting to retry, or settled
    /// after the reconnection budget ran out.
    Disconnected,
    /// Torn down by the owner.
    Terminated,
}

impl fmt::Display for ConnectionStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Connecting => "connecting",
            Self::Connected => "connected",
            Self::Disconnected => "disconnected",
            Self::Terminated => "terminated",
        };
        f.write_str(s)
    }
}

/// Publishes `next` unless the connection is already terminated.
///
/// Returns `true` if the status changed.
pub(crate) fn publish_status(
    tx: &watch::Sender<ConnectionStatus>,
    next: ConnectionStatus,
) -> bool {
    tx.send_if_modified(|current| {
        if *current == ConnectionStatus::Terminated || *current == next {
            return false;
        }
        *current = next;
        true
    })
}

/// Capacity of the outbound event queue. Events queued while disconnected
/// are flushed once the connection is back.
pub(crate) const OUTBOX_CAPACITY: usize = 256;

/// One realtime connection, owned by the manager's holder slot.
pub struct RealtimeConnection {
    id: ConnectionId,
    credentials: Credentials,
    status: Arc<watch::Sender<ConnectionStatus>>,
    outbox: mpsc::Sender<ClientFrame>,
}

impl RealtimeConnection {
    pub(crate) fn new(
        id: ConnectionId,
        credentials: Credentials,
        status: Arc<watch::Sender<ConnectionStatus>>,
        outbox: mpsc::Sender<ClientFrame>,
    ) -> Self {
        Self {
            id,
            credentials,
            status,
            outbox,
        }
    }

    /// This connection's id.
    pub fn id(&self) -> ConnectionId {
        self.id
    }

    /// The credentials this connection authenticates with.
    pub fn credentials(&self) -> &Credentials {
        &self.credentials
    }

    /// The current status.
    pub fn status(&self) -> ConnectionStatus {
        *self.status.borrow()
    }

    /// Whether the handshake has completed and the link is up.
    pub fn is_connected(&self) -> bool {
        self.status() == ConnectionStatus::Connected
    }

    /// Moves the connection to `Terminated`. The driver task notices,
    /// closes the link and exits. Idempotent.
    pub(crate) fn terminate(&self) {
        if publish_status(&self.status, ConnectionStatus::Terminated) {
            tracing::debug!(id = %self.id, "connection terminated");
        }
    }

    pub(crate) fn subscribe(&self) -> watch::Receiver<ConnectionStatus> {
        self.status.subscribe()
    }

    fn emit_frame(&self, frame: ClientFrame) -> Result<(), SessionError> {
        if self.status() == ConnectionStatus::Terminated {
            return Err(SessionError::Terminated(self.id));
        }
        self.outbox.try_send(frame).map_err(|e| match e {
            mpsc::error::TrySendError::Full(_) => {
                SessionError::OutboxFull(self.id)
            }
            mpsc::error::TrySendError::Closed(_) => {
                SessionError::Closed(self.id)
            }
        })
    }
}

impl Drop for RealtimeConnection {
    fn drop(&mut self) {
        // The holder is the only owner, so losing it means teardown.
        self.terminate();
    }
}

impl fmt::Debug for RealtimeConnection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RealtimeConnection")
            .field("id", &self.id)
            .field("credentials", &self.credentials)
            .field("status", &self.status())
            .finish()
    }
}

/// A non-owning view of a [`RealtimeConnection`].
///
/// Cheap to clone. Every method degrades gracefully once the manager has
/// dropped the connection: status reads report `Terminated`, sends fail
/// with [`SessionError::ConnectionGone`].
#[derive(Clone)]
pub struct ConnectionHandle {
    id: ConnectionId,
    inner: Weak<RealtimeConnection>,
}

impl ConnectionHandle {
    pub(crate) fn new(connection: &Arc<RealtimeConnection>) -> Self {
        Self {
            id: connection.id,
            inner: Arc::downgrade(connection),
        }
    }

    fn upgrade(&self) -> Result<Arc<RealtimeConnection>, SessionError> {
        self.inner
            .upgrade()
            .ok_or(SessionError::ConnectionGone(self.id))
    }

    /// The id of the connection this handle points at.
    pub fn id(&self) -> ConnectionId {
        self.id
    }

    /// Current status; `Terminated` once the connection is gone.
    pub fn status(&self) -> ConnectionStatus {
        self.inner
            .upgrade()
            .map_or(ConnectionStatus::Terminated, |c| c.status())
    }

    /// Whether the connection is up right now.
    pub fn is_connected(&self) -> bool {
        self.status() == ConnectionStatus::Connected
    }

    /// Whether the connection still exists and has not been torn down.
    pub fn is_alive(&self) -> bool {
        self.status() != ConnectionStatus::Terminated
    }

    /// The credentials the connection authenticates with, if it still
    /// exists.
    pub fn credentials(&self) -> Option<Credentials> {
        self.inner.upgrade().map(|c| c.credentials.clone())
    }

    /// Queues an application event for the server.
    ///
    /// Events queued while the connection is reconnecting are sent once it
    /// is back up.
    ///
    /// # Errors
    /// - [`SessionError::ConnectionGone`] / [`SessionError::Terminated`] —
    ///   the connection was torn down
    /// - [`SessionError::Closed`] — the connection gave up reconnecting
    /// - [`SessionError::OutboxFull`] — too many events queued
    /// - [`SessionError::Protocol`] — `data` failed to serialize
    pub fn emit<T: Serialize>(
        &self,
        name: impl Into<String>,
        data: &T,
    ) -> Result<(), SessionError> {
        let data = serde_json::to_value(data).map_err(ProtocolError::Encode)?;
        let connection = self.upgrade()?;
        connection.emit_frame(ClientFrame::Event {
            name: name.into(),
            data,
        })
    }

    /// Waits until the connection reaches `status`.
    ///
    /// The handle does not keep the connection alive while waiting.
    ///
    /// # Errors
    /// Returns [`SessionError::Terminated`] if the connection is torn
    /// down first (unless `Terminated` is what was asked for), and
    /// [`SessionError::ConnectionGone`] if it no longer exists.
    pub async fn wait_for(
        &self,
        status: ConnectionStatus,
    ) -> Result<(), SessionError> {
        let mut rx = match self.inner.upgrade() {
            Some(connection) => connection.subscribe(),
            None if status == ConnectionStatus::Terminated => return Ok(()),
            None => return Err(SessionError::ConnectionGone(self.id)),
        };

        let reached = rx
            .wait_for(|s| *s == status || *s == ConnectionStatus::Terminated)
            .await
            .map(|s| *s);

        match reached {
            Ok(s) if s == status => Ok(()),
            Ok(_) => Err(SessionError::Terminated(self.id)),
            // Every sender dropped: the connection is gone for good.
            Err(_) if status == ConnectionStatus::Terminated => Ok(()),
            Err(_) => Err(SessionError::ConnectionGone(self.id)),
        }
    }
}

impl fmt::Debug for ConnectionHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ConnectionHandle")
            .field("id", &self.id)
            .field("status", &self.status())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use marketlink_protocol::Role;

    fn connection() -> (Arc<RealtimeConnection>, mpsc::Receiver<ClientFrame>) {
        let (status, _) = watch::channel(ConnectionStatus::Connecting);
        let (outbox, rx) = mpsc::channel(2);
        let conn = RealtimeConnection::new(
            ConnectionId::new(1),
            Credentials::new("t", "u-1", Role::Customer),
            Arc::new(status),
            outbox,
        );
        (Arc::new(conn), rx)
    }

    #[test]
    fn test_publish_status_never_leaves_terminated() {
        let (tx, _rx) = watch::channel(ConnectionStatus::Connected);
        assert!(publish_status(&tx, ConnectionStatus::Terminated));
        assert!(!publish_status(&tx, ConnectionStatus::Connecting));
        assert_eq!(*tx.borrow(), ConnectionStatus::Terminated);
    }

    #[test]
    fn test_publish_status_same_value_is_not_a_change() {
        let (tx, _rx) = watch::channel(ConnectionStatus::Connecting);
        assert!(!publish_status(&tx, ConnectionStatus::Connecting));
    }

    #[test]
    fn test_handle_reports_terminated_after_drop() {
        let (conn, _rx) = connection();
        let handle = ConnectionHandle::new(&conn);
        assert!(handle.is_alive());

        drop(conn);

        assert_eq!(handle.status(), ConnectionStatus::Terminated);
        assert!(!handle.is_alive());
        assert!(handle.credentials().is_none());
    }

    #[test]
    fn test_handle_does_not_keep_connection_alive() {
        let (conn, _rx) = connection();
        let handle = ConnectionHandle::new(&conn);
        assert_eq!(Arc::strong_count(&conn), 1);
        drop(handle);
        assert_eq!(Arc::strong_count(&conn), 1);
    }

    #[test]
    fn test_emit_queues_event_frame() {
        let (conn, mut rx) = connection();
        let handle = ConnectionHandle::new(&conn);

        handle
            .emit("location:update", &serde_json::json!({"lat": 1.5}))
            .expect("should queue");

        let frame = rx.try_recv().expect("frame should be queued");
        assert!(matches!(
            frame,
            ClientFrame::Event { ref name, .. } if name == "location:update"
        ));
    }

    #[test]
    fn test_emit_on_full_outbox_returns_error() {
        let (conn, _rx) = connection();
        let handle = ConnectionHandle::new(&conn);
        handle.emit("a", &1).unwrap();
        handle.emit("b", &2).unwrap();

        let result = handle.emit("c", &3);

        assert!(matches!(result, Err(SessionError::OutboxFull(_))));
    }

    #[test]
    fn test_emit_after_terminate_returns_terminated() {
        let (conn, _rx) = connection();
        let handle = ConnectionHandle::new(&conn);
        conn.terminate();

        assert!(matches!(
            handle.emit("a", &1),
            Err(SessionError::Terminated(_))
        ));
    }

    #[test]
    fn test_emit_after_drop_returns_gone() {
        let (conn, _rx) = connection();
        let handle = ConnectionHandle::new(&conn);
        drop(conn);

        assert!(matches!(
            handle.emit("a", &1),
            Err(SessionError::ConnectionGone(_))
        ));
    }

    #[tokio::test]
    async fn test_wait_for_returns_terminated_error_on_teardown() {
        let (conn, _rx) = connection();
        let handle = ConnectionHandle::new(&conn);

        let waiter = {
            let handle = handle.clone();
            tokio::spawn(async move {
                handle.wait_for(ConnectionStatus::Connected).await
            })
        };
        tokio::task::yield_now().await;
        conn.terminate();

        let result = waiter.await.unwrap();
        assert!(matches!(result, Err(SessionError::Terminated(_))));
    }
}

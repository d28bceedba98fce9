//! Error types for the session layer.

use marketlink_protocol::ProtocolError;
use marketlink_transport::ConnectionId;

/// Errors returned by [`ConnectionHandle`](crate::ConnectionHandle)
/// operations.
///
/// Connection failures themselves are not here: those are reported to
/// observers as [`ConnectionError`](crate::ConnectionError) and retried by
/// the reconnection policy.
#[derive(Debug, thiserror::Error)]
pub enum SessionError {
    /// The manager no longer holds this connection; it was torn down and
    /// dropped. Fetch a fresh handle.
    #[error("{0} is gone")]
    ConnectionGone(ConnectionId),

    /// The connection was terminated while the caller was waiting on it.
    #[error("{0} was terminated")]
    Terminated(ConnectionId),

    /// The connection's driver has stopped (reconnection gave up or the
    /// server ended the session), so nothing will ever be sent.
    #[error("{0} is no longer running")]
    Closed(ConnectionId),

    /// Too many outbound events are queued while disconnected.
    #[error("outbound queue for {0} is full")]
    OutboxFull(ConnectionId),

    /// The event payload could not be serialized.
    #[error(transparent)]
    Protocol(#[from] ProtocolError),
}

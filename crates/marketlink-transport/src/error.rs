use std::time::Duration;

use crate::TransportKind;

/// Errors that can occur in the transport layer.
#[derive(Debug, thiserror::Error)]
pub enum TransportError {
    /// The connection was closed.
    #[error("connection closed: {0}")]
    ConnectionClosed(String),

    /// Sending data failed.
    #[error("send failed: {0}")]
    SendFailed(#[source] std::io::Error),

    /// Receiving data failed.
    #[error("receive failed: {0}")]
    ReceiveFailed(#[source] std::io::Error),

    /// Establishing the connection failed for a reason other than a
    /// refusal or a timeout (DNS, TLS, malformed URL, ...).
    #[error("connect failed: {0}")]
    ConnectFailed(#[source] std::io::Error),

    /// The remote end refused the connection or rejected the upgrade.
    #[error("connection refused: {0}")]
    Refused(String),

    /// The connection attempt did not complete in time.
    #[error("connection attempt timed out after {0:?}")]
    Timeout(Duration),

    /// The connector has no implementation for this transport kind.
    #[error("transport {0} is not supported by this connector")]
    Unsupported(TransportKind),
}

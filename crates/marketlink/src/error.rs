//! Unified error type for marketlink.

use marketlink_protocol::ProtocolError;
use marketlink_session::SessionError;
use marketlink_transport::TransportError;

/// Top-level error that wraps all crate-specific errors.
///
/// When using the `marketlink` meta-crate, you deal with this single
/// error type instead of importing errors from each sub-crate.
#[derive(Debug, thiserror::Error)]
pub enum MarketlinkError {
    /// A transport-level error (connect, send, recv).
    #[error(transparent)]
    Transport(#[from] TransportError),

    /// A protocol-level error (encode, decode, invalid message).
    #[error(transparent)]
    Protocol(#[from] ProtocolError),

    /// A session-level error (emitting on a dead connection, full outbox).
    #[error(transparent)]
    Session(#[from] SessionError),

    /// A configuration document could not be parsed.
    #[error("invalid configuration: {0}")]
    Config(#[from] serde_json::Error),

    /// A configuration file could not be read.
    #[error("failed to read configuration: {0}")]
    Io(#[from] std::io::Error),
}

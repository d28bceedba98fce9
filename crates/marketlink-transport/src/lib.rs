//! Client transport abstraction layer for marketlink.
//!
//! Provides the [`Connector`] and [`Link`] traits that abstract over the
//! network protocols a client may reach the realtime endpoint with
//! (WebSocket first, long-polling as a fallback).
//!
//! # Feature Flags
//!
//! - `websocket` (default) — WebSocket transport via `tokio-tungstenite`

mod error;
#[cfg(feature = "websocket")]
mod websocket;

pub use error::TransportError;
#[cfg(feature = "websocket")]
pub use websocket::{WebSocketConnector, WebSocketLink, websocket_url};

use serde::{Deserialize, Serialize};
use std::fmt;
use std::future::Future;
use std::time::Duration;

/// Opaque identifier for a connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ConnectionId(u64);

impl ConnectionId {
    /// Creates a new `ConnectionId` from a raw `u64`.
    pub fn new(id: u64) -> Self {
        Self(id)
    }

    /// Returns the underlying `u64` value.
    pub fn into_inner(self) -> u64 {
        self.0
    }
}

impl fmt::Display for ConnectionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "conn-{}", self.0)
    }
}

/// The wire transports a client may try, in preference order.
///
/// Serialized lowercase (`"websocket"`, `"polling"`) to match the option
/// names clients are configured with.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TransportKind {
    /// Full-duplex WebSocket. The low-latency default.
    WebSocket,
    /// HTTP long-polling. Used when WebSocket upgrades are blocked.
    Polling,
}

impl fmt::Display for TransportKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::WebSocket => f.write_str("websocket"),
            Self::Polling => f.write_str("polling"),
        }
    }
}

/// Opens outgoing connections to a realtime endpoint.
///
/// Implementations return [`TransportError::Unsupported`] for transport
/// kinds they cannot speak, which lets callers walk a fallback list.
pub trait Connector: Send + Sync + 'static {
    /// The connection type produced by this connector.
    type Link: Link;

    /// Connects to `url` using the given transport, giving up after
    /// `timeout`.
    fn connect(
        &self,
        kind: TransportKind,
        url: &str,
        timeout: Duration,
    ) -> impl Future<Output = Result<Self::Link, TransportError>> + Send;
}

/// A single established connection that can send and receive frames.
///
/// A link is owned by exactly one task, hence `&mut self` everywhere.
pub trait Link: Send + 'static {
    /// Sends one frame to the remote peer.
    fn send(
        &mut self,
        data: Vec<u8>,
    ) -> impl Future<Output = Result<(), TransportError>> + Send;

    /// Receives the next frame from the remote peer.
    ///
    /// Returns `Ok(None)` when the connection is cleanly closed. Must be
    /// cancel-safe: it is polled inside `tokio::select!`.
    fn recv(
        &mut self,
    ) -> impl Future<Output = Result<Option<Vec<u8>>, TransportError>> + Send;

    /// Closes the connection.
    fn close(&mut self) -> impl Future<Output = Result<(), TransportError>> + Send;

    /// Returns the unique identifier for this connection.
    fn id(&self) -> ConnectionId;
}

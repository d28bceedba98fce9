//! Connection lifecycle events and the callbacks that observe them.

use std::fmt;
use std::sync::Arc;

use marketlink_transport::TransportError;

/// A connection-level failure reported through
/// [`EventHandlers::on_error`].
///
/// None of these are returned as `Err` from the manager. The connection's
/// own reconnection policy handles them; observers only get told.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ConnectionError {
    /// A connection attempt (transport or handshake) did not finish in
    /// time.
    #[error("connection attempt timed out")]
    Timeout,

    /// The endpoint refused the connection or rejected the credentials.
    #[error("connection refused: {0}")]
    Refused(String),

    /// Any other transport failure.
    #[error("transport error: {0}")]
    Transport(String),

    /// The server spoke something we could not understand.
    #[error("protocol error: {0}")]
    Protocol(String),

    /// Automatic reconnection gave up. The connection stays disconnected
    /// until a new activation replaces it.
    #[error("gave up after {attempts} reconnection attempts")]
    ReconnectExhausted { attempts: u32 },
}

impl From<&TransportError> for ConnectionError {
    fn from(e: &TransportError) -> Self {
        match e {
            TransportError::Timeout(_) => Self::Timeout,
            TransportError::Refused(reason) => Self::Refused(reason.clone()),
            other => Self::Transport(other.to_string()),
        }
    }
}

/// Why a live connection went away.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DisconnectReason {
    /// The server asked us to leave. No automatic reconnection follows.
    ServerRequested(String),
    /// The transport closed cleanly underneath us.
    TransportClosed,
    /// The transport failed mid-session.
    TransportError(String),
    /// This client tore the connection down (deactivate or logout).
    ClientTerminated,
}

impl DisconnectReason {
    /// Whether automatic reconnection should follow this disconnect.
    pub fn should_reconnect(&self) -> bool {
        matches!(self, Self::TransportClosed | Self::TransportError(_))
    }
}

impl fmt::Display for DisconnectReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::ServerRequested(reason) => {
                write!(f, "server disconnect: {reason}")
            }
            Self::TransportClosed => f.write_str("transport close"),
            Self::TransportError(e) => write!(f, "transport error: {e}"),
            Self::ClientTerminated => f.write_str("client disconnect"),
        }
    }
}

type ConnectFn = dyn Fn() + Send + Sync;
type DisconnectFn = dyn Fn(&DisconnectReason) + Send + Sync;
type ErrorFn = dyn Fn(&ConnectionError) + Send + Sync;
type EventFn = dyn Fn(&str, &serde_json::Value) + Send + Sync;

/// Callbacks registered by the component that created a connection.
///
/// Every callback is optional. They run on the connection's driver task,
/// so they should be quick and must not block.
///
/// ```rust
/// use marketlink_session::EventHandlers;
///
/// let handlers = EventHandlers::new()
///     .on_connect(|| println!("live"))
///     .on_disconnect(|reason| println!("lost: {reason}"))
///     .on_error(|err| eprintln!("realtime error: {err}"));
/// ```
#[derive(Clone, Default)]
pub struct EventHandlers {
    on_connect: Option<Arc<ConnectFn>>,
    on_disconnect: Option<Arc<DisconnectFn>>,
    on_error: Option<Arc<ErrorFn>>,
    on_event: Option<Arc<EventFn>>,
}

impl EventHandlers {
    /// Creates an empty set of handlers.
    pub fn new() -> Self {
        Self::default()
    }

    /// Called when the connection is (or already was) established.
    pub fn on_connect(mut self, f: impl Fn() + Send + Sync + 'static) -> Self {
        self.on_connect = Some(Arc::new(f));
        self
    }

    /// Called when an established connection goes away.
    pub fn on_disconnect(
        mut self,
        f: impl Fn(&DisconnectReason) + Send + Sync + 'static,
    ) -> Self {
        self.on_disconnect = Some(Arc::new(f));
        self
    }

    /// Called when a connection attempt fails or reconnection gives up.
    pub fn on_error(
        mut self,
        f: impl Fn(&ConnectionError) + Send + Sync + 'static,
    ) -> Self {
        self.on_error = Some(Arc::new(f));
        self
    }

    /// Called for every application event the server pushes.
    pub fn on_event(
        mut self,
        f: impl Fn(&str, &serde_json::Value) + Send + Sync + 'static,
    ) -> Self {
        self.on_event = Some(Arc::new(f));
        self
    }

    pub(crate) fn emit_connect(&self) {
        if let Some(f) = &self.on_connect {
            f();
        }
    }

    pub(crate) fn emit_disconnect(&self, reason: &DisconnectReason) {
        if let Some(f) = &self.on_disconnect {
            f(reason);
        }
    }

    pub(crate) fn emit_error(&self, error: &ConnectionError) {
        if let Some(f) = &self.on_error {
            f(error);
        }
    }

    pub(crate) fn emit_event(&self, name: &str, data: &serde_json::Value) {
        if let Some(f) = &self.on_event {
            f(name, data);
        }
    }
}

impl fmt::Debug for EventHandlers {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EventHandlers")
            .field("on_connect", &self.on_connect.is_some())
            .field("on_disconnect", &self.on_disconnect.is_some())
            .field("on_error", &self.on_error.is_some())
            .field("on_event", &self.on_event.is_some())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    #[test]
    fn test_connection_error_from_transport_timeout() {
        let err = TransportError::Timeout(Duration::from_secs(20));
        assert_eq!(ConnectionError::from(&err), ConnectionError::Timeout);
    }

    #[test]
    fn test_connection_error_from_transport_refused_keeps_reason() {
        let err = TransportError::Refused("401".into());
        assert_eq!(
            ConnectionError::from(&err),
            ConnectionError::Refused("401".into())
        );
    }

    #[test]
    fn test_connection_error_from_other_transport_error() {
        let err = TransportError::ConnectionClosed("eof".into());
        assert!(matches!(
            ConnectionError::from(&err),
            ConnectionError::Transport(msg) if msg.contains("eof")
        ));
    }

    #[test]
    fn test_should_reconnect_only_for_transport_losses() {
        assert!(DisconnectReason::TransportClosed.should_reconnect());
        assert!(DisconnectReason::TransportError("reset".into()).should_reconnect());
        assert!(!DisconnectReason::ServerRequested("banned".into()).should_reconnect());
        assert!(!DisconnectReason::ClientTerminated.should_reconnect());
    }

    #[test]
    fn test_empty_handlers_are_no_ops() {
        let handlers = EventHandlers::new();
        handlers.emit_connect();
        handlers.emit_disconnect(&DisconnectReason::TransportClosed);
        handlers.emit_error(&ConnectionError::Timeout);
        handlers.emit_event("order:new", &serde_json::Value::Null);
    }

    #[test]
    fn test_handlers_invoke_registered_callbacks() {
        let hits = Arc::new(AtomicUsize::new(0));
        let (a, b) = (Arc::clone(&hits), Arc::clone(&hits));
        let handlers = EventHandlers::new()
            .on_connect(move || {
                a.fetch_add(1, Ordering::SeqCst);
            })
            .on_error(move |_| {
                b.fetch_add(10, Ordering::SeqCst);
            });

        handlers.emit_connect();
        handlers.emit_error(&ConnectionError::Timeout);

        assert_eq!(hits.load(Ordering::SeqCst), 11);
    }

    #[test]
    fn test_handlers_debug_shows_registration_only() {
        let printed = format!("{:?}", EventHandlers::new().on_connect(|| {}));
        assert!(printed.contains("on_connect: true"));
        assert!(printed.contains("on_error: false"));
    }
}

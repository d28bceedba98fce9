//! WebSocket client transport using `tokio-tungstenite`.

use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use futures_util::{SinkExt, StreamExt};
use tokio_tungstenite::tungstenite::{self, Message};

use crate::{Connector, ConnectionId, Link, TransportError, TransportKind};

/// Counter for generating unique connection IDs.
static NEXT_CONNECTION_ID: AtomicU64 = AtomicU64::new(1);

type WsStream = tokio_tungstenite::WebSocketStream<
    tokio_tungstenite::MaybeTlsStream<tokio::net::TcpStream>,
>;

/// Rewrites an `http(s)://` endpoint to its `ws(s)://` form.
///
/// Endpoints are usually configured as the HTTP origin of the API, so
/// this lets the same setting serve both. Anything else passes through.
pub fn websocket_url(endpoint: &str) -> String {
    if let Some(rest) = endpoint.strip_prefix("https://") {
        format!("wss://{rest}")
    } else if let Some(rest) = endpoint.strip_prefix("http://") {
        format!("ws://{rest}")
    } else {
        endpoint.to_string()
    }
}

/// A [`Connector`] that dials WebSocket endpoints.
#[derive(Debug, Clone, Copy, Default)]
pub struct WebSocketConnector;

impl Connector for WebSocketConnector {
    type Link = WebSocketLink;

    async fn connect(
        &self,
        kind: TransportKind,
        url: &str,
        timeout: Duration,
    ) -> Result<Self::Link, TransportError> {
        if kind != TransportKind::WebSocket {
            return Err(TransportError::Unsupported(kind));
        }

        let url = websocket_url(url);
        let (ws, _response) =
            tokio::time::timeout(timeout, tokio_tungstenite::connect_async(&url))
                .await
                .map_err(|_| TransportError::Timeout(timeout))?
                .map_err(classify_connect_error)?;

        let id = ConnectionId::new(
            NEXT_CONNECTION_ID.fetch_add(1, Ordering::Relaxed),
        );
        tracing::debug!(%id, %url, "WebSocket connection established");

        Ok(WebSocketLink { id, ws })
    }
}

fn classify_connect_error(e: tungstenite::Error) -> TransportError {
    match e {
        tungstenite::Error::Io(io)
            if io.kind() == std::io::ErrorKind::ConnectionRefused =>
        {
            TransportError::Refused(io.to_string())
        }
        tungstenite::Error::Http(response) => TransportError::Refused(
            format!("upgrade rejected with HTTP {}", response.status()),
        ),
        other => TransportError::ConnectFailed(std::io::Error::other(other)),
    }
}

/// A single client-side WebSocket connection.
pub struct WebSocketLink {
    id: ConnectionId,
    ws: WsStream,
}

impl Link for WebSocketLink {
    async fn send(&mut self, data: Vec<u8>) -> Result<(), TransportError> {
        // JSON frames go out as text; anything else as binary.
        let msg = match String::from_utf8(data) {
            Ok(text) => Message::Text(text.into()),
            Err(e) => Message::Binary(e.into_bytes().into()),
        };
        self.ws.send(msg).await.map_err(|e| {
            TransportError::SendFailed(std::io::Error::new(
                std::io::ErrorKind::BrokenPipe,
                e,
            ))
        })
    }

    async fn recv(&mut self) -> Result<Option<Vec<u8>>, TransportError> {
        loop {
            match self.ws.next().await {
                Some(Ok(Message::Binary(data))) => {
                    return Ok(Some(data.into()));
                }
                Some(Ok(Message::Text(text))) => {
                    return Ok(Some(text.as_bytes().to_vec()));
                }
                Some(Ok(Message::Close(_))) | None => return Ok(None),
                Some(Ok(_)) => continue, // ping/pong/frame
                Some(Err(e)) => {
                    return Err(TransportError::ReceiveFailed(
                        std::io::Error::new(
                            std::io::ErrorKind::ConnectionReset,
                            e,
                        ),
                    ));
                }
            }
        }
    }

    async fn close(&mut self) -> Result<(), TransportError> {
        match self.ws.close(None).await {
            Ok(()) | Err(tungstenite::Error::ConnectionClosed) => Ok(()),
            Err(e) => Err(TransportError::SendFailed(std::io::Error::new(
                std::io::ErrorKind::BrokenPipe,
                e,
            ))),
        }
    }

    fn id(&self) -> ConnectionId {
        self.id
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_websocket_url_rewrites_http() {
        assert_eq!(websocket_url("http://api.local:5000"), "ws://api.local:5000");
    }

    #[test]
    fn test_websocket_url_rewrites_https() {
        assert_eq!(websocket_url("https://api.shop.app/rt"), "wss://api.shop.app/rt");
    }

    #[test]
    fn test_websocket_url_keeps_ws_scheme() {
        assert_eq!(websocket_url("ws://127.0.0.1:9"), "ws://127.0.0.1:9");
    }

    #[tokio::test]
    async fn test_connect_polling_is_unsupported() {
        let result = WebSocketConnector
            .connect(TransportKind::Polling, "ws://127.0.0.1:1", Duration::from_secs(1))
            .await;
        assert!(matches!(
            result,
            Err(TransportError::Unsupported(TransportKind::Polling))
        ));
    }
}

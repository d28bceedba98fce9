//! The per-connection driver task.
//!
//! One task per [`RealtimeConnection`](crate::RealtimeConnection). It owns
//! the transport link and runs the reconnection state machine:
//!
//! ```text
//!  ┌──→ Connecting ──(transport + handshake ok)──→ Connected
//!  │        │                                          │
//!  │   (fail: on_error)                       (lost: on_disconnect)
//!  │        ▼                                          ▼
//!  └── backoff sleep ←──(attempts left)──── Disconnected
//!                                                  │
//!                                      (budget spent / server kick)
//!                                                  ▼
//!                                         settle in Disconnected
//! ```
//!
//! At every await point the task also watches the status channel; once
//! the owner publishes `Terminated` it closes the link and exits.

use std::sync::Arc;
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use marketlink_protocol::{ClientFrame, Codec, Credentials, JsonCodec, ServerFrame};
use marketlink_transport::{ConnectionId, Connector, Link, TransportError};
use tokio::sync::{mpsc, watch};
use tokio::time::{Instant, MissedTickBehavior};
use tracing::{debug, info, trace, warn};

use crate::connection::publish_status;
use crate::{
    ConnectOptions, ConnectionError, ConnectionStatus, DisconnectReason,
    EventHandlers,
};

/// Current time in millis since Unix epoch.
fn now_ms() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_millis() as u64
}

/// Time left before `deadline`, or `Timeout` if it has passed.
fn remaining_until(deadline: Instant) -> Result<Duration, ConnectionError> {
    let remaining = deadline.saturating_duration_since(Instant::now());
    if remaining.is_zero() {
        return Err(ConnectionError::Timeout);
    }
    Ok(remaining)
}

/// Resolves once the status channel reports `Terminated` (or its sender
/// is gone, which amounts to the same thing).
async fn terminated(rx: &mut watch::Receiver<ConnectionStatus>) {
    let _ = rx.wait_for(|s| *s == ConnectionStatus::Terminated).await;
}

/// Everything the driver task needs. Deliberately holds no reference to
/// the `RealtimeConnection` itself, so the holder stays the only owner.
pub(crate) struct Driver<C: Connector> {
    pub(crate) id: ConnectionId,
    pub(crate) connector: Arc<C>,
    pub(crate) endpoint: String,
    pub(crate) options: ConnectOptions,
    pub(crate) credentials: Credentials,
    pub(crate) handlers: EventHandlers,
    pub(crate) status: Arc<watch::Sender<ConnectionStatus>>,
    pub(crate) outbox: mpsc::Receiver<ClientFrame>,
    pub(crate) codec: JsonCodec,
}

impl<C: Connector> Driver<C> {
    /// Runs until the connection is terminated or settles for good.
    pub(crate) async fn run(mut self) {
        let mut stop = self.status.subscribe();
        let mut attempt: u32 = 0;

        loop {
            if !publish_status(&self.status, ConnectionStatus::Connecting)
                && *self.status.borrow() == ConnectionStatus::Terminated
            {
                return;
            }

            let established = tokio::select! {
                biased;
                _ = terminated(&mut stop) => return,
                result = self.establish() => result,
            };

            match established {
                Ok(link) => {
                    attempt = 0;
                    publish_status(&self.status, ConnectionStatus::Connected);
                    info!(id = %self.id, user_id = %self.credentials.user_id,
                        role = %self.credentials.role, "realtime connection established");
                    self.handlers.emit_connect();

                    let Some(reason) = self.pump(link, &mut stop).await else {
                        return;
                    };
                    publish_status(&self.status, ConnectionStatus::Disconnected);
                    info!(id = %self.id, %reason, "realtime connection lost");
                    self.handlers.emit_disconnect(&reason);

                    if !reason.should_reconnect() {
                        debug!(id = %self.id, "not reconnecting after server disconnect");
                        return;
                    }
                }
                Err(error) => {
                    publish_status(&self.status, ConnectionStatus::Disconnected);
                    warn!(id = %self.id, attempt, %error, "connection attempt failed");
                    self.handlers.emit_error(&error);
                }
            }

            if !self.options.reconnection {
                debug!(id = %self.id, "reconnection disabled, settling");
                return;
            }
            if attempt >= self.options.reconnection_attempts {
                warn!(
                    id = %self.id,
                    attempts = attempt,
                    "reconnection attempts exhausted, settling"
                );
                self.handlers
                    .emit_error(&ConnectionError::ReconnectExhausted { attempts: attempt });
                return;
            }

            let delay = self.options.reconnect_delay(attempt);
            attempt += 1;
            debug!(id = %self.id, attempt, delay_ms = delay.as_millis() as u64,
                "scheduling reconnection");

            tokio::select! {
                biased;
                _ = terminated(&mut stop) => return,
                _ = tokio::time::sleep(delay) => {}
            }
        }
    }

    /// Walks the transport list until one connects and the handshake is
    /// accepted. The whole attempt shares one timeout.
    async fn establish(&self) -> Result<C::Link, ConnectionError> {
        let deadline = Instant::now() + self.options.timeout();
        let mut last_error = None;

        for &kind in &self.options.transports {
            let remaining = remaining_until(deadline)?;
            match self.connector.connect(kind, &self.endpoint, remaining).await {
                Ok(mut link) => {
                    trace!(id = %self.id, link = %link.id(), %kind, "transport up");
                    let handshake = match remaining_until(deadline) {
                        Ok(remaining) => {
                            tokio::time::timeout(remaining, self.handshake(&mut link))
                                .await
                                .unwrap_or(Err(ConnectionError::Timeout))
                        }
                        Err(e) => Err(e),
                    };
                    return match handshake {
                        Ok(()) => Ok(link),
                        Err(e) => {
                            let _ = link.close().await;
                            Err(e)
                        }
                    };
                }
                Err(TransportError::Unsupported(kind)) => {
                    trace!(id = %self.id, %kind, "transport unsupported, skipping");
                }
                Err(e) => {
                    debug!(id = %self.id, %kind, error = %e, "transport failed");
                    last_error = Some(ConnectionError::from(&e));
                }
            }
        }

        Err(last_error.unwrap_or_else(|| {
            ConnectionError::Transport("no configured transport is supported".into())
        }))
    }

    /// Sends our credentials and waits for the server's verdict.
    async fn handshake(&self, link: &mut C::Link) -> Result<(), ConnectionError> {
        let hello = self
            .codec
            .encode(&ClientFrame::handshake(&self.credentials))
            .map_err(|e| ConnectionError::Protocol(e.to_string()))?;
        link.send(hello)
            .await
            .map_err(|e| ConnectionError::from(&e))?;

        let reply = link
            .recv()
            .await
            .map_err(|e| ConnectionError::from(&e))?
            .ok_or_else(|| {
                ConnectionError::Refused("closed during handshake".into())
            })?;

        match self.codec.decode::<ServerFrame>(&reply) {
            Ok(ServerFrame::HandshakeAck { session_id, .. }) => {
                debug!(id = %self.id, %session_id, "handshake accepted");
                Ok(())
            }
            Ok(ServerFrame::Rejected { reason }) => {
                Err(ConnectionError::Refused(reason))
            }
            Ok(other) => Err(ConnectionError::Protocol(format!(
                "expected handshake reply, got {other:?}"
            ))),
            Err(e) => Err(ConnectionError::Protocol(e.to_string())),
        }
    }

    /// Moves frames while connected. Returns why the link went away, or
    /// `None` if the owner terminated the connection.
    async fn pump(
        &mut self,
        mut link: C::Link,
        stop: &mut watch::Receiver<ConnectionStatus>,
    ) -> Option<DisconnectReason> {
        let every = self.options.heartbeat_interval();
        let mut heartbeat =
            tokio::time::interval_at(Instant::now() + every, every);
        heartbeat.set_missed_tick_behavior(MissedTickBehavior::Skip);

        loop {
            tokio::select! {
                biased;
                _ = terminated(stop) => {
                    self.say_goodbye(&mut link).await;
                    self.handlers.emit_disconnect(&DisconnectReason::ClientTerminated);
                    return None;
                }
                incoming = link.recv() => match incoming {
                    Ok(Some(bytes)) => {
                        if let Some(reason) = self.dispatch(&bytes) {
                            let _ = link.close().await;
                            return Some(reason);
                        }
                    }
                    Ok(None) => return Some(DisconnectReason::TransportClosed),
                    Err(e) => {
                        return Some(DisconnectReason::TransportError(e.to_string()));
                    }
                },
                Some(frame) = self.outbox.recv() => {
                    if let Err(reason) = self.send_frame(&mut link, &frame).await {
                        return Some(reason);
                    }
                }
                _ = heartbeat.tick() => {
                    let beat = ClientFrame::Heartbeat { client_time: now_ms() };
                    if let Err(reason) = self.send_frame(&mut link, &beat).await {
                        return Some(reason);
                    }
                }
            }
        }
    }

    /// Handles one inbound frame. Returns a reason if the server ended
    /// the session.
    fn dispatch(&self, bytes: &[u8]) -> Option<DisconnectReason> {
        match self.codec.decode::<ServerFrame>(bytes) {
            Ok(ServerFrame::Event { name, data }) => {
                trace!(id = %self.id, %name, "event received");
                self.handlers.emit_event(&name, &data);
                None
            }
            Ok(ServerFrame::Disconnect { reason }) => {
                Some(DisconnectReason::ServerRequested(reason))
            }
            Ok(ServerFrame::HeartbeatAck { client_time, .. }) => {
                trace!(id = %self.id, rtt_ms = now_ms().saturating_sub(client_time),
                    "heartbeat acknowledged");
                None
            }
            Ok(other) => {
                warn!(id = %self.id, frame = ?other, "unexpected frame while connected");
                None
            }
            Err(e) => {
                warn!(id = %self.id, error = %e, "dropping undecodable frame");
                None
            }
        }
    }

    async fn send_frame(
        &self,
        link: &mut C::Link,
        frame: &ClientFrame,
    ) -> Result<(), DisconnectReason> {
        let bytes = match self.codec.encode(frame) {
            Ok(bytes) => bytes,
            Err(e) => {
                warn!(id = %self.id, error = %e, "dropping unencodable frame");
                return Ok(());
            }
        };
        link.send(bytes)
            .await
            .map_err(|e| DisconnectReason::TransportError(e.to_string()))
    }

    /// Best-effort polite close on teardown, bounded by the connect
    /// timeout so a stalled peer cannot keep the task alive.
    async fn say_goodbye(&self, link: &mut C::Link) {
        let bye = ClientFrame::Disconnect {
            reason: DisconnectReason::ClientTerminated.to_string(),
        };
        let goodbye = async {
            let _ = self.send_frame(link, &bye).await;
            link.close().await
        };
        match tokio::time::timeout(self.options.timeout(), goodbye).await {
            Ok(Ok(())) => {}
            Ok(Err(e)) => {
                trace!(id = %self.id, error = %e, "close after terminate failed");
            }
            Err(_) => {
                debug!(id = %self.id, "peer stalled during goodbye, dropping link");
            }
        }
    }
}

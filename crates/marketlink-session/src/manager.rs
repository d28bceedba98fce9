//! The connection manager: one shared realtime connection per process.
//!
//! UI components mount and unmount independently, but they all want the
//! same authenticated realtime channel. The manager is the single owner of
//! that channel and mediates every component's access to it:
//!
//! - [`activate`](ConnectionManager::activate) on mount: reuse the live
//!   connection, or replace a dead/mismatched one, or create the first.
//! - [`deactivate`](ConnectionManager::deactivate) on unmount: after a
//!   short grace period, tear down if no newer component depends on it.
//! - [`force_disconnect`](ConnectionManager::force_disconnect) on logout.
//! - [`handle`](ConnectionManager::handle) to look at what's held.
//!
//! # Concurrency
//!
//! The holder slot and the activation counter sit behind one
//! `tokio::sync::Mutex`, so activations and teardown checks serialize and
//! there is never more than one non-terminated connection. User callbacks
//! fired from `activate` run while that lock is held; they are plain
//! `Fn` closures and cannot call back into the manager.

use std::collections::BTreeSet;
use std::sync::Arc;

use marketlink_protocol::{Credentials, JsonCodec};
use marketlink_transport::{ConnectionId, Connector, WebSocketConnector};
use tokio::sync::{Mutex, mpsc, watch};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::connection::OUTBOX_CAPACITY;
use crate::driver::Driver;
use crate::{
    ConnectionHandle, ConnectionStatus, EventHandlers, ManagerConfig,
    RealtimeConnection, TeardownPolicy,
};

/// Proof of one activation, handed back to the caller of
/// [`ConnectionManager::activate`] and passed to
/// [`ConnectionManager::deactivate`] on unmount.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ActivationTicket {
    seq: u64,
    epoch: u64,
}

impl ActivationTicket {
    /// The activation's sequence number. Strictly increasing in mount
    /// order; restarts at 1 after a forced disconnect.
    pub fn seq(&self) -> u64 {
        self.seq
    }
}

/// The mutable state behind the lock.
#[derive(Debug, Default)]
struct Holder {
    /// The one connection, if any. This `Arc` is never cloned out.
    connection: Option<Arc<RealtimeConnection>>,
    /// Last sequence number handed out.
    sequence: u64,
    /// Bumped by every forced disconnect so tickets issued before it can
    /// never match a sequence number issued after the counter reset.
    epoch: u64,
    /// Sequence numbers of activations not yet deactivated.
    live: BTreeSet<u64>,
    /// Source of connection ids.
    next_connection_id: u64,
}

impl Holder {
    fn take_and_terminate(&mut self) -> Option<ConnectionId> {
        self.connection.take().map(|connection| {
            connection.terminate();
            connection.id()
        })
    }
}

struct Shared<C: Connector> {
    connector: Arc<C>,
    config: ManagerConfig,
    holder: Mutex<Holder>,
}

/// Owns the process-wide realtime connection.
///
/// Construct one at startup and hand clones to whatever needs it; clones
/// share the same holder.
pub struct ConnectionManager<C: Connector = WebSocketConnector> {
    shared: Arc<Shared<C>>,
}

impl<C: Connector> Clone for ConnectionManager<C> {
    fn clone(&self) -> Self {
        Self {
            shared: Arc::clone(&self.shared),
        }
    }
}

impl<C: Connector> ConnectionManager<C> {
    /// Creates a manager that dials through `connector`.
    ///
    /// The config is validated (clamped) here.
    pub fn new(connector: C, config: ManagerConfig) -> Self {
        Self {
            shared: Arc::new(Shared {
                connector: Arc::new(connector),
                config: config.validated(),
                holder: Mutex::new(Holder::default()),
            }),
        }
    }

    /// The validated configuration this manager runs with.
    pub fn config(&self) -> &ManagerConfig {
        &self.shared.config
    }

    /// Called when a component mounts.
    ///
    /// 1. Takes the next sequence number.
    /// 2. If the held connection authenticates as the same account and is
    ///    connected, reuses it and fires `handlers.on_connect` before
    ///    returning. If it is still connecting, reuses it and fires
    ///    `handlers.on_connect` once it connects. Either way `handlers` is
    ///    not registered on the reused connection; the creator's handlers
    ///    stay in charge.
    /// 3. Otherwise terminates whatever is held (disconnected, or
    ///    authenticated as someone else).
    /// 4. Spawns a fresh connection with `handlers` registered on it.
    ///
    /// Connection failures never surface here; they arrive through
    /// `handlers.on_error`.
    pub async fn activate(
        &self,
        credentials: Credentials,
        handlers: EventHandlers,
    ) -> (ActivationTicket, ConnectionHandle) {
        let mut holder = self.shared.holder.lock().await;

        holder.sequence += 1;
        let ticket = ActivationTicket {
            seq: holder.sequence,
            epoch: holder.epoch,
        };
        holder.live.insert(ticket.seq);

        if let Some(existing) = &holder.connection {
            let same_identity =
                existing.credentials().same_identity(&credentials);
            match (existing.status(), same_identity) {
                (ConnectionStatus::Connected, true) => {
                    debug!(seq = ticket.seq, id = %existing.id(), "reusing live connection");
                    handlers.emit_connect();
                    return (ticket, ConnectionHandle::new(existing));
                }
                (ConnectionStatus::Connecting, true) => {
                    debug!(seq = ticket.seq, id = %existing.id(), "reusing connection still in flight");
                    notify_when_connected(existing, handlers);
                    return (ticket, ConnectionHandle::new(existing));
                }
                (ConnectionStatus::Connected | ConnectionStatus::Connecting, false) => {
                    warn!(
                        seq = ticket.seq,
                        id = %existing.id(),
                        user_id = %credentials.user_id,
                        role = %credentials.role,
                        "credentials changed, replacing connection"
                    )
                }
                (status, _) => debug!(
                    seq = ticket.seq,
                    id = %existing.id(),
                    %status,
                    "discarding connection that is not connected"
                ),
            }
        }
        holder.take_and_terminate();

        let connection = self.spawn_connection(&mut holder, credentials, handlers);
        info!(seq = ticket.seq, id = %connection.id(), "realtime connection created");
        let handle = ConnectionHandle::new(&connection);
        holder.connection = Some(connection);

        (ticket, handle)
    }

    /// Called when a component unmounts, with the ticket its activation
    /// returned.
    ///
    /// Schedules a check after the configured teardown delay. Under
    /// [`TeardownPolicy::LatestActivation`] the connection is torn down if
    /// `ticket` is still the latest activation; under
    /// [`TeardownPolicy::RefCounted`], if no activation remains live.
    /// Tickets from before a [`force_disconnect`](Self::force_disconnect)
    /// never tear anything down.
    ///
    /// The returned task resolves to whether a connection was torn down.
    /// Dropping it does not cancel the check.
    ///
    /// Must be called from within a Tokio runtime.
    pub fn deactivate(&self, ticket: ActivationTicket) -> JoinHandle<bool> {
        let shared = Arc::clone(&self.shared);
        let delay = shared.config.teardown_delay();

        tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            let mut holder = shared.holder.lock().await;

            if ticket.epoch != holder.epoch {
                debug!(seq = ticket.seq, "ignoring ticket from before a forced disconnect");
                return false;
            }
            holder.live.remove(&ticket.seq);

            let tear_down = match shared.config.teardown_policy {
                TeardownPolicy::LatestActivation => ticket.seq == holder.sequence,
                TeardownPolicy::RefCounted => holder.live.is_empty(),
            };
            if !tear_down {
                debug!(
                    seq = ticket.seq,
                    latest = holder.sequence,
                    live = holder.live.len(),
                    "connection still in use, keeping it"
                );
                return false;
            }

            match holder.take_and_terminate() {
                Some(id) => {
                    info!(seq = ticket.seq, %id, "last activation gone, connection torn down");
                    true
                }
                None => false,
            }
        })
    }

    /// Unconditional teardown, e.g. on logout.
    ///
    /// Terminates the held connection if any, clears the holder and
    /// resets the activation counter. Pending deactivations from before
    /// this call become no-ops.
    pub async fn force_disconnect(&self) {
        let mut holder = self.shared.holder.lock().await;
        let dropped = holder.take_and_terminate();
        holder.sequence = 0;
        holder.epoch += 1;
        holder.live.clear();
        info!(id = ?dropped, "forced disconnect");
    }

    /// The held connection, if any. Pure read.
    pub async fn handle(&self) -> Option<ConnectionHandle> {
        let holder = self.shared.holder.lock().await;
        holder.connection.as_ref().map(ConnectionHandle::new)
    }

    /// Number of activations that have not been deactivated yet.
    pub async fn live_activations(&self) -> usize {
        self.shared.holder.lock().await.live.len()
    }

    fn spawn_connection(
        &self,
        holder: &mut Holder,
        credentials: Credentials,
        handlers: EventHandlers,
    ) -> Arc<RealtimeConnection> {
        holder.next_connection_id += 1;
        let id = ConnectionId::new(holder.next_connection_id);

        let (status_tx, _) = watch::channel(ConnectionStatus::Connecting);
        let status = Arc::new(status_tx);
        let (outbox_tx, outbox_rx) = mpsc::channel(OUTBOX_CAPACITY);

        let driver = Driver {
            id,
            connector: Arc::clone(&self.shared.connector),
            endpoint: self.shared.config.endpoint.clone(),
            options: self.shared.config.options.clone(),
            credentials: credentials.clone(),
            handlers,
            status: Arc::clone(&status),
            outbox: outbox_rx,
            codec: JsonCodec,
        };
        tokio::spawn(driver.run());

        Arc::new(RealtimeConnection::new(id, credentials, status, outbox_tx))
    }
}

/// Fires `handlers.on_connect` the first time `connection` reaches
/// `Connected`. Gives up quietly if it is torn down first.
fn notify_when_connected(connection: &RealtimeConnection, handlers: EventHandlers) {
    let mut status = connection.subscribe();
    tokio::spawn(async move {
        let reached = status
            .wait_for(|s| {
                matches!(s, ConnectionStatus::Connected | ConnectionStatus::Terminated)
            })
            .await
            .map(|s| *s == ConnectionStatus::Connected);
        if let Ok(true) = reached {
            handlers.emit_connect();
        }
    });
}

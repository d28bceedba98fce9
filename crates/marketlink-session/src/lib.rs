//! Realtime connection management for marketlink.
//!
//! A marketplace client (customer, seller, delivery partner or admin app)
//! keeps at most one live realtime connection, shared by every UI
//! component that needs it. This crate provides:
//!
//! 1. **Lifecycle control** — [`ConnectionManager`] decides on each
//!    activation whether to reuse, replace, or create the connection, and
//!    on each deactivation whether to tear it down.
//! 2. **Observation** — [`ConnectionHandle`] gives components a
//!    non-owning view of the connection; [`EventHandlers`] deliver
//!    connect/disconnect/error callbacks.
//! 3. **Reconnection** — each connection runs a driver task that retries
//!    with capped, jittered exponential backoff per [`ConnectOptions`].
//!
//! # How it fits in the stack
//!
//! ```text
//! UI components (above)  ← activate / deactivate / force_disconnect
//!     ↕
//! Session Layer (this crate)  ← one shared connection, reconnection policy
//!     ↕
//! Protocol + Transport (below)  ← frames, codecs, WebSocket links
//! ```

mod config;
mod connection;
mod driver;
mod error;
mod events;
mod manager;

pub use config::{ConnectOptions, ManagerConfig, TeardownPolicy};
pub use connection::{ConnectionHandle, ConnectionStatus, RealtimeConnection};
pub use error::SessionError;
pub use events::{ConnectionError, DisconnectReason, EventHandlers};
pub use manager::{ActivationTicket, ConnectionManager};

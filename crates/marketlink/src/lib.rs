//! # Marketlink
//!
//! One shared, authenticated realtime connection for marketplace apps
//! (customer, seller, delivery partner and admin clients).
//!
//! Every UI component that needs live updates activates the client when it
//! mounts and deactivates it when it unmounts. The client keeps exactly one
//! connection alive across all of them, reconnects with backoff when the
//! network drops, and tears the connection down shortly after the last
//! component is gone.
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use marketlink::prelude::*;
//!
//! # async fn run() {
//! let client = MarketlinkClient::builder()
//!     .endpoint("https://realtime.example.com")
//!     .build();
//!
//! let credentials = Credentials::new("jwt", "seller-1", Role::Seller);
//! let handlers = EventHandlers::new()
//!     .on_event(|name, data| println!("{name}: {data}"));
//!
//! let (ticket, handle) = client.activate(credentials, handlers).await;
//! handle.emit("seller:online", &true).ok();
//!
//! // On unmount:
//! client.deactivate(ticket);
//! # }
//! ```

mod client;
mod error;

pub use client::{MarketlinkClient, MarketlinkClientBuilder};
pub use error::MarketlinkError;

/// Installs a `tracing` subscriber that logs to stderr.
///
/// The filter comes from `RUST_LOG` and falls back to `info`. Calling this
/// more than once is harmless; only the first call installs anything.
pub fn init_tracing() {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info"));
    let _ = tracing_subscriber::fmt().with_env_filter(filter).try_init();
}

pub mod prelude {
    pub use crate::{MarketlinkClient, MarketlinkClientBuilder, MarketlinkError};
    pub use marketlink_protocol::{Credentials, Role, UserId};
    pub use marketlink_session::{
        ActivationTicket, ConnectOptions, ConnectionError, ConnectionHandle,
        ConnectionManager, ConnectionStatus, DisconnectReason, EventHandlers,
        ManagerConfig, SessionError, TeardownPolicy,
    };
    pub use marketlink_transport::{TransportError, TransportKind};
}

//! `MarketlinkClient` builder.
//!
//! This is the entry point for apps: configure the endpoint and options
//! once at startup, build the client, and share it with every component
//! that needs the realtime channel.

use std::ops::Deref;
use std::path::Path;
use std::time::Duration;

use marketlink_session::{
    ConnectOptions, ConnectionManager, ManagerConfig, TeardownPolicy,
};
use marketlink_transport::{Connector, WebSocketConnector};

use crate::MarketlinkError;

/// Builder for a [`MarketlinkClient`].
///
/// # Example
///
/// ```rust
/// use std::time::Duration;
/// use marketlink::prelude::*;
///
/// let client = MarketlinkClient::builder()
///     .endpoint("https://realtime.example.com")
///     .reconnection_attempts(10)
///     .teardown_delay(Duration::from_millis(250))
///     .build();
/// assert_eq!(client.config().options.reconnection_attempts, 10);
/// ```
#[derive(Debug, Clone, Default)]
pub struct MarketlinkClientBuilder {
    config: ManagerConfig,
}

impl MarketlinkClientBuilder {
    /// Creates a new builder with default settings.
    pub fn new() -> Self {
        Self::default()
    }

    /// Starts from a JSON configuration document.
    ///
    /// Missing keys keep their defaults.
    pub fn from_json(json: &str) -> Result<Self, MarketlinkError> {
        let config: ManagerConfig = serde_json::from_str(json)?;
        Ok(Self { config })
    }

    /// Starts from a JSON configuration file.
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, MarketlinkError> {
        let json = std::fs::read_to_string(path)?;
        Self::from_json(&json)
    }

    /// Sets the realtime endpoint.
    pub fn endpoint(mut self, endpoint: &str) -> Self {
        self.config.endpoint = endpoint.to_string();
        self
    }

    /// Replaces all connection options.
    pub fn options(mut self, options: ConnectOptions) -> Self {
        self.config.options = options;
        self
    }

    /// Enables or disables automatic reconnection.
    pub fn reconnection(mut self, enabled: bool) -> Self {
        self.config.options.reconnection = enabled;
        self
    }

    /// Sets how many reconnection attempts are made before giving up.
    pub fn reconnection_attempts(mut self, attempts: u32) -> Self {
        self.config.options.reconnection_attempts = attempts;
        self
    }

    /// Sets the per-attempt connection timeout.
    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.config.options.timeout_ms = timeout.as_millis() as u64;
        self
    }

    /// Sets the grace period between a deactivation and its teardown check.
    pub fn teardown_delay(mut self, delay: Duration) -> Self {
        self.config.teardown_delay_ms = delay.as_millis() as u64;
        self
    }

    /// Sets the rule the teardown check applies.
    pub fn teardown_policy(mut self, policy: TeardownPolicy) -> Self {
        self.config.teardown_policy = policy;
        self
    }

    /// The configuration built so far.
    pub fn config(&self) -> &ManagerConfig {
        &self.config
    }

    /// Builds a client that connects over WebSocket.
    pub fn build(self) -> MarketlinkClient {
        self.build_with(WebSocketConnector)
    }

    /// Builds a client that dials through a custom connector.
    pub fn build_with<C: Connector>(self, connector: C) -> MarketlinkClient<C> {
        tracing::debug!(endpoint = %self.config.endpoint, "building marketlink client");
        MarketlinkClient {
            manager: ConnectionManager::new(connector, self.config),
        }
    }
}

/// The app-wide realtime client.
///
/// Dereferences to its [`ConnectionManager`], so `activate`,
/// `deactivate`, `force_disconnect` and `handle` are called on it
/// directly. Clones share the same connection.
pub struct MarketlinkClient<C: Connector = WebSocketConnector> {
    manager: ConnectionManager<C>,
}

impl MarketlinkClient {
    /// Creates a new builder.
    pub fn builder() -> MarketlinkClientBuilder {
        MarketlinkClientBuilder::new()
    }
}

impl<C: Connector> MarketlinkClient<C> {
    /// The underlying connection manager.
    pub fn manager(&self) -> &ConnectionManager<C> {
        &self.manager
    }
}

impl<C: Connector> Clone for MarketlinkClient<C> {
    fn clone(&self) -> Self {
        Self {
            manager: self.manager.clone(),
        }
    }
}

impl<C: Connector> Deref for MarketlinkClient<C> {
    type Target = ConnectionManager<C>;

    fn deref(&self) -> &Self::Target {
        &self.manager
    }
}

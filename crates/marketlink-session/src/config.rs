//! Connection and manager configuration.
//!
//! Both structs deserialize from the camelCase option names clients are
//! usually configured with (`reconnectionAttempts`, `timeout`, ...), and
//! both go through `validated()` before use so out-of-range values are
//! clamped instead of rejected.

use std::time::Duration;

use marketlink_transport::TransportKind;
use rand::Rng;
use serde::{Deserialize, Serialize};
use tracing::warn;

// ---------------------------------------------------------------------------
// ConnectOptions
// ---------------------------------------------------------------------------

/// Per-connection transport and reconnection options.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ConnectOptions {
    /// Transports to try, in order. The first one that connects wins.
    pub transports: Vec<TransportKind>,
    /// Whether to reconnect automatically after a failure or a drop.
    pub reconnection: bool,
    /// How many reconnection attempts follow a failure before giving up.
    pub reconnection_attempts: u32,
    /// Initial reconnection delay, doubled per attempt.
    #[serde(rename = "reconnectionDelay")]
    pub reconnection_delay_ms: u64,
    /// Ceiling for the reconnection delay.
    #[serde(rename = "reconnectionDelayMax")]
    pub reconnection_delay_max_ms: u64,
    /// Jitter applied to each delay, as a fraction of it (0.0–1.0).
    pub randomization_factor: f64,
    /// Timeout for one connection attempt, handshake included.
    #[serde(rename = "timeout")]
    pub timeout_ms: u64,
    /// How often a connected client sends a heartbeat.
    #[serde(rename = "heartbeatInterval")]
    pub heartbeat_interval_ms: u64,
}

impl Default for ConnectOptions {
    fn default() -> Self {
        Self {
            transports: vec![TransportKind::WebSocket, TransportKind::Polling],
            reconnection: true,
            reconnection_attempts: 5,
            reconnection_delay_ms: 1_000,
            reconnection_delay_max_ms: 5_000,
            randomization_factor: 0.5,
            timeout_ms: 20_000,
            heartbeat_interval_ms: 25_000,
        }
    }
}

impl ConnectOptions {
    /// Clamp and fix any out-of-range values so the options are safe to use.
    ///
    /// - An empty `transports` list falls back to the default order.
    /// - `reconnection_delay_max_ms` is raised to at least the initial delay.
    /// - `randomization_factor` is clamped to `0.0..=1.0`.
    /// - Zero timeouts and heartbeat intervals become 1 ms.
    pub fn validated(mut self) -> Self {
        if self.transports.is_empty() {
            warn!("no transports configured, using default order");
            self.transports = Self::default().transports;
        }
        if self.reconnection_delay_max_ms < self.reconnection_delay_ms {
            warn!(
                delay_ms = self.reconnection_delay_ms,
                max_ms = self.reconnection_delay_max_ms,
                "reconnection delay ceiling below initial delay, raising it"
            );
            self.reconnection_delay_max_ms = self.reconnection_delay_ms;
        }
        self.randomization_factor = if self.randomization_factor.is_nan() {
            0.0
        } else {
            self.randomization_factor.clamp(0.0, 1.0)
        };
        self.timeout_ms = self.timeout_ms.max(1);
        self.heartbeat_interval_ms = self.heartbeat_interval_ms.max(1);
        self
    }

    /// Timeout for a single connection attempt.
    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }

    /// Interval between heartbeats while connected.
    pub fn heartbeat_interval(&self) -> Duration {
        Duration::from_millis(self.heartbeat_interval_ms)
    }

    /// Delay before reconnection attempt `attempt` (0-based), without
    /// jitter: `min(delay * 2^attempt, delay_max)`.
    pub fn base_reconnect_delay(&self, attempt: u32) -> Duration {
        let factor = 2u64.saturating_pow(attempt);
        let ms = self
            .reconnection_delay_ms
            .saturating_mul(factor)
            .min(self.reconnection_delay_max_ms);
        Duration::from_millis(ms)
    }

    /// Delay before reconnection attempt `attempt` with jitter applied.
    ///
    /// The base delay is moved up or down by a random amount of at most
    /// `randomization_factor` of itself, then capped at the ceiling again.
    pub fn reconnect_delay(&self, attempt: u32) -> Duration {
        let base = self.base_reconnect_delay(attempt).as_millis() as f64;
        let spread = base * self.randomization_factor;
        let jittered = if spread > 0.0 {
            base + rand::rng().random_range(-spread..=spread)
        } else {
            base
        };
        let ms = (jittered.max(0.0) as u64).min(self.reconnection_delay_max_ms);
        Duration::from_millis(ms)
    }
}

// ---------------------------------------------------------------------------
// TeardownPolicy
// ---------------------------------------------------------------------------

/// How a deferred deactivation decides whether to tear down.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum TeardownPolicy {
    /// Tear down only if the deactivating ticket is still the most recent
    /// activation when the delayed check runs. Another component still
    /// mounted with an older ticket does not keep the connection alive.
    #[default]
    LatestActivation,
    /// Tear down only when no activation is still live, i.e. every ticket
    /// handed out has been deactivated.
    RefCounted,
}

// ---------------------------------------------------------------------------
// ManagerConfig
// ---------------------------------------------------------------------------

/// Configuration for a [`ConnectionManager`](crate::ConnectionManager).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ManagerConfig {
    /// The realtime endpoint (`ws://`, `wss://`, `http://` or `https://`).
    pub endpoint: String,
    /// Options every new connection is created with.
    pub options: ConnectOptions,
    /// Grace period between a deactivation and its teardown check, so a
    /// component that unmounts and immediately remounts (route change)
    /// keeps the connection.
    #[serde(rename = "teardownDelay")]
    pub teardown_delay_ms: u64,
    /// Which rule the teardown check applies.
    pub teardown_policy: TeardownPolicy,
}

impl Default for ManagerConfig {
    fn default() -> Self {
        Self {
            endpoint: "http://127.0.0.1:5000".to_string(),
            options: ConnectOptions::default(),
            teardown_delay_ms: 100,
            teardown_policy: TeardownPolicy::default(),
        }
    }
}

impl ManagerConfig {
    /// Creates a config for `endpoint` with default options.
    pub fn new(endpoint: impl Into<String>) -> Self {
        Self {
            endpoint: endpoint.into(),
            ..Default::default()
        }
    }

    /// Validates the nested connection options.
    pub fn validated(mut self) -> Self {
        self.options = self.options.validated();
        self
    }

    /// Grace period before a deactivation is acted on.
    pub fn teardown_delay(&self) -> Duration {
        Duration::from_millis(self.teardown_delay_ms)
    }
}

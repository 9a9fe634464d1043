#![expect(
    clippy::module_name_repetitions,
    reason = "Configuration types intentionally mirror the module name for clarity"
)]

use std::time::Duration;

use backoff::{ExponentialBackoff, ExponentialBackoffBuilder};

const DEFAULT_PING_INTERVAL_DURATION: Duration = Duration::from_secs(30);
const DEFAULT_PONG_TIMEOUT_DURATION: Duration = Duration::from_secs(90);
const DEFAULT_READ_TIMEOUT_DURATION: Duration = Duration::from_secs(60);
const DEFAULT_CONNECT_TIMEOUT_DURATION: Duration = Duration::from_secs(10);
const DEFAULT_WRITE_TIMEOUT_DURATION: Duration = Duration::from_secs(10);
const DEFAULT_MAX_PAYLOAD_SIZE: usize = 16 * 1024 * 1024;
const DEFAULT_INITIAL_BACKOFF_DURATION: Duration = Duration::from_secs(1);
const DEFAULT_MAX_BACKOFF_DURATION: Duration = Duration::from_secs(60);
const DEFAULT_BACKOFF_MULTIPLIER: f64 = 1.5;

/// Timing and sizing limits for a WebSocket link.
#[non_exhaustive]
#[derive(Debug, Clone)]
pub struct Config {
    /// Interval between keepalive checks, each of which sends a PING when the link is healthy
    pub ping_interval: Duration,
    /// Maximum time since the last PONG before the link is declared dead
    pub pong_timeout: Duration,
    /// Read deadline, refreshed before every frame
    pub read_timeout: Duration,
    /// Bound on dialing plus the Upgrade exchange
    pub connect_timeout: Duration,
    /// Bound on writing a single frame
    pub write_timeout: Duration,
    /// Largest inbound payload accepted, in bytes
    pub max_payload_size: usize,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            ping_interval: DEFAULT_PING_INTERVAL_DURATION,
            pong_timeout: DEFAULT_PONG_TIMEOUT_DURATION,
            read_timeout: DEFAULT_READ_TIMEOUT_DURATION,
            connect_timeout: DEFAULT_CONNECT_TIMEOUT_DURATION,
            write_timeout: DEFAULT_WRITE_TIMEOUT_DURATION,
            max_payload_size: DEFAULT_MAX_PAYLOAD_SIZE,
        }
    }
}

/// Configuration for automatic reconnection behavior.
///
/// There is no attempt limit: reconnection continues until the client is closed.
#[non_exhaustive]
#[derive(Debug, Clone)]
pub struct ReconnectConfig {
    /// Delay before the first reconnection attempt
    pub initial_backoff: Duration,
    /// Maximum backoff duration
    pub max_backoff: Duration,
    /// Multiplier applied after every failed attempt
    pub backoff_multiplier: f64,
}

impl ReconnectConfig {
    #[must_use]
    pub fn new(initial_backoff: Duration, max_backoff: Duration) -> Self {
        Self {
            initial_backoff,
            max_backoff,
            backoff_multiplier: DEFAULT_BACKOFF_MULTIPLIER,
        }
    }
}

impl Default for ReconnectConfig {
    fn default() -> Self {
        Self::new(DEFAULT_INITIAL_BACKOFF_DURATION, DEFAULT_MAX_BACKOFF_DURATION)
    }
}

/// Deterministic backoff: no jitter and no elapsed-time cutoff.
///
/// `current_interval` is the delay to wait before the next attempt; calling
/// `next_backoff` after a failure advances it by the multiplier, clamped to the maximum.
impl From<ReconnectConfig> for ExponentialBackoff {
    fn from(config: ReconnectConfig) -> Self {
        ExponentialBackoffBuilder::default()
            .with_initial_interval(config.initial_backoff)
            .with_max_interval(config.max_backoff)
            .with_multiplier(config.backoff_multiplier)
            .with_randomization_factor(0.0)
            .with_max_elapsed_time(None)
            .build()
    }
}

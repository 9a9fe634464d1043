#![expect(
    clippy::module_name_repetitions,
    reason = "ClientConfig mirrors the Client it configures"
)]

use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use bon::Builder;
use secrecy::{ExposeSecret as _, SecretString};
use url::Url;

use crate::Result;
use crate::error::Error;
use crate::ws::config::{Config, ReconnectConfig};

/// Port the hub serves its local event stream on.
pub const DEFAULT_HUB_PORT: u16 = 39500;
/// Path of the event stream endpoint.
pub const EVENTS_PATH: &str = "/events";

const DEFAULT_EVENT_BUFFER_SIZE: usize = 100;
const DEFAULT_ERROR_BUFFER_SIZE: usize = 10;
const DEFAULT_RECONNECT_DELAY: Duration = Duration::from_secs(1);
const DEFAULT_RECONNECT_MAX_DELAY: Duration = Duration::from_secs(60);

/// Invoked after a reconnect has restored the link and replayed subscriptions.
pub type ReconnectCallback = Arc<dyn Fn() + Send + Sync>;
/// Invoked with the cause whenever the link drops without `close` being called.
pub type DisconnectCallback = Arc<dyn Fn(&Error) + Send + Sync>;

/// Configuration for [`Client`](super::Client).
///
/// # Example
///
/// ```
/// use std::time::Duration;
///
/// use local_hub_client::hub::ClientConfig;
///
/// let config = ClientConfig::builder()
///     .hub_ip("192.168.1.20")
///     .token("local-api-token".to_owned())
///     .reconnect_max_delay(Duration::from_secs(30))
///     .build();
///
/// assert_eq!(config.hub_port, 39500);
/// ```
#[non_exhaustive]
#[derive(Clone, Builder)]
pub struct ClientConfig {
    /// Hub address on the local network
    #[builder(into)]
    pub hub_ip: String,
    /// Hub port
    #[builder(default = DEFAULT_HUB_PORT)]
    pub hub_port: u16,
    /// Local API bearer token, sent only during the Upgrade request
    #[builder(into)]
    pub token: SecretString,
    /// Capacity of the event channel; events beyond it are dropped
    #[builder(default = DEFAULT_EVENT_BUFFER_SIZE)]
    pub event_buffer_size: usize,
    /// Capacity of the error channel; errors beyond it are dropped
    #[builder(default = DEFAULT_ERROR_BUFFER_SIZE)]
    pub error_buffer_size: usize,
    /// Whether an unplanned disconnect starts the reconnect supervisor
    #[builder(default = true)]
    pub reconnect_enabled: bool,
    /// Delay before the first reconnect attempt
    #[builder(default = DEFAULT_RECONNECT_DELAY)]
    pub reconnect_delay: Duration,
    /// Upper bound for the reconnect delay
    #[builder(default = DEFAULT_RECONNECT_MAX_DELAY)]
    pub reconnect_max_delay: Duration,
    pub on_reconnect: Option<ReconnectCallback>,
    pub on_disconnect: Option<DisconnectCallback>,
    /// Keepalive, deadline and size limits of the link
    #[builder(default)]
    pub ws: Config,
}

impl ClientConfig {
    /// Reject configurations that can never connect.
    pub fn validate(&self) -> Result<()> {
        if self.hub_ip.trim().is_empty() {
            return Err(Error::validation("hub_ip is required"));
        }
        if self.token.expose_secret().is_empty() {
            return Err(Error::validation("token is required"));
        }
        if self.event_buffer_size == 0 || self.error_buffer_size == 0 {
            return Err(Error::validation("channel buffer sizes must be non-zero"));
        }
        if self.reconnect_max_delay < self.reconnect_delay {
            return Err(Error::validation(
                "reconnect_max_delay must not be shorter than reconnect_delay",
            ));
        }
        Ok(())
    }

    /// `ws://{hub_ip}:{hub_port}/events`
    pub fn endpoint(&self) -> Result<Url> {
        let host = self.hub_ip.trim();
        let host = if host.contains(':') && !host.starts_with('[') {
            format!("[{host}]")
        } else {
            host.to_owned()
        };
        Ok(Url::parse(&format!(
            "ws://{host}:{}{EVENTS_PATH}",
            self.hub_port
        ))?)
    }

    #[must_use]
    pub fn reconnect_config(&self) -> ReconnectConfig {
        ReconnectConfig::new(self.reconnect_delay, self.reconnect_max_delay)
    }
}

impl fmt::Debug for ClientConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ClientConfig")
            .field("hub_ip", &self.hub_ip)
            .field("hub_port", &self.hub_port)
            .field("token", &self.token)
            .field("event_buffer_size", &self.event_buffer_size)
            .field("error_buffer_size", &self.error_buffer_size)
            .field("reconnect_enabled", &self.reconnect_enabled)
            .field("reconnect_delay", &self.reconnect_delay)
            .field("reconnect_max_delay", &self.reconnect_max_delay)
            .field("on_reconnect", &self.on_reconnect.is_some())
            .field("on_disconnect", &self.on_disconnect.is_some())
            .field("ws", &self.ws)
            .finish()
    }
}

#![expect(
    clippy::module_name_repetitions,
    reason = "Re-exported names intentionally match their modules for API clarity"
)]

//! Client for a home-automation hub's local event stream.
//!
//! The hub pushes device attribute changes over a plain WebSocket at
//! `ws://{hub_ip}:{hub_port}/events`. The [`Client`] keeps one link open,
//! answers keepalive pings, detects dead links, reconnects with exponential
//! backoff and replays subscriptions afterwards.
//!
//! # Streams
//!
//! - [`Client::events`]: decoded [`DeviceEvent`]s
//! - [`Client::errors`]: hub error messages and asynchronous failures
//!
//! Both are bounded. When a buffer is full new items are dropped, so a slow
//! consumer never stalls the read loop.
//!
//! # Example
//!
//! ```rust, no_run
//! use futures::StreamExt as _;
//! use local_hub_client::hub::{Client, ClientConfig};
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let client = Client::new(
//!         ClientConfig::builder()
//!             .hub_ip("192.168.1.20")
//!             .token("local-api-token".to_owned())
//!             .build(),
//!     )?;
//!
//!     client.connect().await?;
//!     client.subscribe(["6f4c2a4e-7c83-4f0b-9b8e-2e7f2b2d6b1a"]).await?;
//!
//!     let mut events = Box::pin(client.events());
//!     while let Some(event) = events.next().await {
//!         println!("{:?}", event);
//!     }
//!
//!     client.close().await;
//!     Ok(())
//! }
//! ```

pub mod client;
pub mod config;
mod keepalive;
mod reader;
mod reconnect;
pub mod subscription;
pub mod types;

// Re-export commonly used types
pub use client::Client;
pub use config::{ClientConfig, DisconnectCallback, ReconnectCallback};
pub use subscription::SubscriptionSnapshot;
pub use types::request::ControlMessage;
pub use types::response::{DeviceEvent, InboundMessage};

//! Stream device events from a hub on the local network.
//!
//! Reads `HUB_IP` and `HUB_TOKEN` from the environment, optionally
//! `HUB_DEVICE_IDS` (comma separated; all devices when unset).
//!
//! Run with tracing enabled:
//! ```sh
//! HUB_IP=192.168.1.20 HUB_TOKEN=... RUST_LOG=info cargo run --example events --features tracing
//! ```

use std::sync::Arc;
use std::time::Duration;

use futures::StreamExt as _;
use local_hub_client::error::Error;
use local_hub_client::hub::{Client, ClientConfig};
use tokio::time::timeout;
use tracing::{info, warn};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt::init();

    let hub_ip = std::env::var("HUB_IP")?;
    let token = std::env::var("HUB_TOKEN")?;

    let config = ClientConfig::builder()
        .hub_ip(hub_ip)
        .token(token)
        .on_reconnect(Arc::new(|| info!("reconnected, subscriptions replayed")))
        .on_disconnect(Arc::new(|cause: &Error| warn!(%cause, "disconnected")))
        .build();
    let client = Client::new(config)?;

    client.connect().await?;
    info!(endpoint = %client.endpoint(), state = ?client.connection_state());

    match std::env::var("HUB_DEVICE_IDS") {
        Ok(ids) => client.subscribe(ids.split(',').map(str::trim)).await?,
        Err(_) => client.subscribe_all().await?,
    }
    info!(subscriptions = ?client.subscriptions());

    let errors = client.errors();
    tokio::spawn(async move {
        let mut errors = Box::pin(errors);
        while let Some(error) = errors.next().await {
            warn!(kind = ?error.kind(), %error);
        }
    });

    let mut events = Box::pin(client.events());
    let mut count = 0;
    while let Ok(Some(event)) = timeout(Duration::from_secs(60), events.next()).await {
        info!(
            device = %event.device_id,
            component = %event.component_id,
            capability = %event.capability,
            attribute = %event.attribute,
            value = %event.value,
            unit = ?event.unit,
            timestamp = %event.timestamp
        );
        count += 1;
        if count >= 20 {
            break;
        }
    }
    info!(received = count);

    client.close().await;
    Ok(())
}

use std::sync::Arc;

use tokio::time::{Instant, MissedTickBehavior, interval_at};
use tokio_util::sync::CancellationToken;

use super::client::ClientInner;
use super::reconnect;
use crate::ws::error::WsError;
use crate::ws::frame::Frame;

/// Ping link `generation` every ping interval and force a disconnect once no
/// pong has been seen for longer than the pong timeout.
///
/// A failed ping write is reported and ends the monitor; the read loop notices
/// the broken link on its own.
pub(crate) async fn run(inner: Arc<ClientInner>, generation: u64, cancel: CancellationToken) {
    let period = inner.ws.ping_interval;
    let pong_timeout = inner.ws.pong_timeout;

    let mut ticker = interval_at(Instant::now() + period, period);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

    loop {
        tokio::select! {
            () = cancel.cancelled() => return,
            _ = ticker.tick() => {}
        }

        let elapsed = inner.last_pong.borrow().elapsed();
        if elapsed > pong_timeout {
            #[cfg(feature = "tracing")]
            tracing::warn!(?elapsed, generation, "keepalive timeout, forcing disconnect");

            reconnect::handle_disconnect(
                &inner,
                generation,
                WsError::KeepaliveTimeout { elapsed }.into(),
            )
            .await;
            return;
        }

        if let Err(e) = inner.link.send_on(generation, &Frame::ping(Vec::new())).await {
            if !cancel.is_cancelled() {
                #[cfg(feature = "tracing")]
                tracing::warn!(error = %e, generation, "failed to send ping");
                inner.emit_error(e.into());
            }
            return;
        }
    }
}

//! Disconnect handling and the reconnect supervisor.

use std::sync::Arc;

use futures::FutureExt as _;
use futures::future::BoxFuture;
use tokio::time::sleep;

use super::client::ClientInner;
use crate::error::Error;
use crate::ws::connection::ConnectionState;

/// React to link `generation` failing with `cause`.
///
/// Only the first caller for a given link does anything; later callers and
/// callers for superseded links return immediately. Nothing happens once the
/// client is closed. Otherwise the disconnect callback runs, the cause is
/// reported, and the client either moves to `Reconnecting` with a fresh
/// supervisor or to `Disconnected`.
pub(crate) async fn handle_disconnect(inner: &Arc<ClientInner>, generation: u64, cause: Error) {
    if !inner.link.retire(generation).await {
        return;
    }
    if inner.is_closed() {
        return;
    }

    let reconnect = inner.reconnect_enabled();

    #[cfg(feature = "tracing")]
    tracing::warn!(error = %cause, generation, reconnect, "link to hub lost");

    inner.notify_disconnect(&cause);
    inner.emit_error(cause);

    let mut start_supervisor = false;
    inner.transition(|state| {
        if state.is_closed() || state.is_reconnecting() {
            return false;
        }
        if reconnect {
            *state = ConnectionState::Reconnecting { attempt: 0 };
            start_supervisor = true;
        } else {
            *state = ConnectionState::Disconnected;
        }
        true
    });

    if start_supervisor {
        tokio::spawn(run(Arc::clone(inner)));
    }
}

/// Retry the handshake with growing delays until it succeeds, the client is
/// closed, or reconnection is disabled.
///
/// On success the link is installed, both loops restart, the recorded
/// subscriptions are replayed and the reconnect callback runs.
pub(crate) fn run(inner: Arc<ClientInner>) -> BoxFuture<'static, ()> {
    async move {
        let mut attempt = 0_u32;

        loop {
            let delay = inner.reconnect_delay();

            #[cfg(feature = "tracing")]
            tracing::debug!(?delay, attempt, "waiting before reconnect attempt");

            tokio::select! {
                () = inner.closed.cancelled() => return,
                () = sleep(delay) => {}
            }

            if inner.is_closed() {
                return;
            }
            if !inner.reconnect_enabled() {
                inner.transition(|state| {
                    if state.is_reconnecting() {
                        *state = ConnectionState::Disconnected;
                        true
                    } else {
                        false
                    }
                });
                return;
            }

            match inner.handshake().await {
                Ok(upgraded) => {
                    match inner.start(upgraded).await {
                        Ok(generation) => {
                            inner.replay(generation).await;

                            #[cfg(feature = "tracing")]
                            tracing::info!(endpoint = %inner.endpoint, generation, attempt, "reconnected to hub");

                            inner.notify_reconnect();
                        }
                        Err(e) => {
                            #[cfg(feature = "tracing")]
                            tracing::debug!(error = %e, "client closed during reconnect");
                            #[cfg(not(feature = "tracing"))]
                            let _ = &e;
                        }
                    }
                    return;
                }
                Err(e) => {
                    attempt = attempt.saturating_add(1);
                    inner.advance_backoff();
                    inner.transition(|state| {
                        if state.is_reconnecting() {
                            *state = ConnectionState::Reconnecting { attempt };
                            true
                        } else {
                            false
                        }
                    });

                    #[cfg(feature = "tracing")]
                    tracing::warn!(error = %e, attempt, "reconnect attempt failed");

                    inner.emit_error(e.into());
                }
            }
        }
    }
    .boxed()
}

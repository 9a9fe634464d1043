#![expect(
    clippy::module_name_repetitions,
    reason = "Connection types expose their domain in the name for clarity"
)]

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Mutex as StdMutex, PoisonError};
use std::time::{Duration, Instant};

use tokio::io::AsyncWriteExt as _;
use tokio::net::tcp::OwnedWriteHalf;
use tokio::sync::Mutex;
use tokio::time::timeout;
use tokio_util::sync::CancellationToken;

use super::error::WsError;
use super::frame::{self, Frame};

/// Connection state tracking.
#[non_exhaustive]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    /// Not connected; `connect` may be called
    Disconnected,
    /// Handshake complete and read/keepalive loops running
    Connected {
        /// When the connection was established
        since: Instant,
    },
    /// Link dropped unexpectedly; the reconnect supervisor is retrying
    Reconnecting {
        /// Number of failed attempts so far in this episode
        attempt: u32,
    },
    /// Closed by the caller. Terminal.
    Closed,
}

impl ConnectionState {
    /// Check if the connection is currently active.
    #[must_use]
    pub const fn is_connected(self) -> bool {
        matches!(self, Self::Connected { .. })
    }

    #[must_use]
    pub const fn is_reconnecting(self) -> bool {
        matches!(self, Self::Reconnecting { .. })
    }

    #[must_use]
    pub const fn is_closed(self) -> bool {
        matches!(self, Self::Closed)
    }
}

/// The write side of one live link, tagged with the generation that created it.
#[derive(Debug)]
struct Link {
    generation: u64,
    writer: OwnedWriteHalf,
    cancel: CancellationToken,
    /// A write failed or was cut short; the stream may end mid-frame
    torn: bool,
}

/// Holds at most one live link at a time.
///
/// Every install bumps the generation. Tasks spawned for a link carry its
/// generation and cancellation token; once the link is retired or replaced,
/// their writes are refused and their token is cancelled, so loops left over
/// from a superseded connection cannot touch the current one.
///
/// Writes are bounded by the write timeout and abandoned as soon as the link's
/// token is cancelled. Retiring or closing cancels the token before waiting for
/// the writer, so a peer that stops reading cannot wedge the slot.
#[derive(Debug)]
pub struct LinkSlot {
    current: Mutex<Option<Link>>,
    /// Generation and token of the newest link, reachable while a write holds `current`
    live: StdMutex<Option<(u64, CancellationToken)>>,
    generations: AtomicU64,
    write_timeout: Duration,
}

impl LinkSlot {
    #[must_use]
    pub fn new(write_timeout: Duration) -> Self {
        Self {
            current: Mutex::new(None),
            live: StdMutex::new(None),
            generations: AtomicU64::new(0),
            write_timeout,
        }
    }

    /// Install `writer` as the live link, retiring whatever was there.
    ///
    /// Returns the new generation and the token that cancels its tasks.
    pub async fn install(&self, writer: OwnedWriteHalf) -> (u64, CancellationToken) {
        let generation = self.generations.fetch_add(1, Ordering::AcqRel) + 1;
        let cancel = CancellationToken::new();

        let superseded = self
            .live
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .replace((generation, cancel.clone()));
        if let Some((_, token)) = superseded {
            token.cancel();
        }

        let previous = self.current.lock().await.replace(Link {
            generation,
            writer,
            cancel: cancel.clone(),
            torn: false,
        });
        if let Some(previous) = previous {
            shut_down(previous).await;
        }

        (generation, cancel)
    }

    /// Write `frame` to the live link, whatever its generation.
    pub async fn send(&self, frame: &Frame) -> Result<(), WsError> {
        let mut current = self.current.lock().await;
        match current.as_mut() {
            Some(link) => write(link, frame, self.write_timeout).await,
            None => Err(WsError::ConnectionClosed),
        }
    }

    /// Write `frame` only if `generation` is still the live link.
    pub async fn send_on(&self, generation: u64, frame: &Frame) -> Result<(), WsError> {
        let mut current = self.current.lock().await;
        match current.as_mut() {
            Some(link) if link.generation == generation => {
                write(link, frame, self.write_timeout).await
            }
            _ => Err(WsError::ConnectionClosed),
        }
    }

    /// Tear down the link if `generation` is still live.
    ///
    /// Returns `false` when the link was already retired or replaced, which
    /// means another task owns the disconnect.
    pub async fn retire(&self, generation: u64) -> bool {
        self.cancel_live(Some(generation));

        let link = {
            let mut current = self.current.lock().await;
            match current.as_ref() {
                Some(link) if link.generation == generation => current.take(),
                _ => None,
            }
        };

        match link {
            Some(link) => {
                shut_down(link).await;
                true
            }
            None => false,
        }
    }

    /// Best-effort `farewell` frame, then tear down whatever link is live.
    ///
    /// The farewell is skipped when an earlier write was cut short.
    pub async fn close(&self, farewell: Option<&Frame>) {
        self.cancel_live(None);

        let mut current = self.current.lock().await;
        let Some(mut link) = current.take() else {
            return;
        };
        drop(current);

        if let Some(frame) = farewell
            && !link.torn
        {
            _ = timeout(self.write_timeout, frame::write_frame(&mut link.writer, frame)).await;
        }
        shut_down(link).await;
    }

    /// Cancel the newest link's token, or only if it belongs to `generation`.
    fn cancel_live(&self, generation: Option<u64>) {
        let live = self.live.lock().unwrap_or_else(PoisonError::into_inner);
        if let Some((live_generation, cancel)) = live.as_ref()
            && generation.is_none_or(|generation| generation == *live_generation)
        {
            cancel.cancel();
        }
    }
}

/// Write one frame unless the link is torn, its token fires, or the write
/// outlasts `write_timeout`. Any failure tears the link.
async fn write(link: &mut Link, frame: &Frame, write_timeout: Duration) -> Result<(), WsError> {
    if link.torn {
        return Err(WsError::ConnectionClosed);
    }

    let cancel = link.cancel.clone();
    let result = tokio::select! {
        biased;
        written = timeout(write_timeout, frame::write_frame(&mut link.writer, frame)) => {
            written.unwrap_or(Err(WsError::WriteTimeout))
        }
        () = cancel.cancelled() => Err(WsError::ConnectionClosed),
    };

    if result.is_err() {
        link.torn = true;
    }
    result
}

async fn shut_down(mut link: Link) {
    link.cancel.cancel();
    _ = link.writer.shutdown().await;
}

use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Instant;

use async_stream::stream;
use backoff::ExponentialBackoff;
use backoff::backoff::Backoff as _;
use futures::Stream;
use secrecy::SecretString;
use tokio::sync::mpsc::error::TrySendError;
use tokio::sync::{Mutex as AsyncMutex, mpsc, watch};
use tokio_util::sync::CancellationToken;
use url::Url;

use super::config::{ClientConfig, DisconnectCallback, ReconnectCallback};
use super::subscription::{SubscriptionRegistry, SubscriptionSnapshot};
use super::types::request::ControlMessage;
use super::types::response::DeviceEvent;
use super::{keepalive, reader};
use crate::Result;
use crate::error::Error;
use crate::ws::config::Config;
use crate::ws::connection::{ConnectionState, LinkSlot};
use crate::ws::error::WsError;
use crate::ws::frame::{CLOSE_NORMAL, Frame};
use crate::ws::handshake::{self, Upgraded};

/// Client for the hub's local event stream.
///
/// Cloning is cheap; clones share one link, one subscription set and one pair
/// of channels.
///
/// # Examples
///
/// ```rust, no_run
/// use futures::StreamExt as _;
/// use local_hub_client::hub::{Client, ClientConfig};
///
/// #[tokio::main]
/// async fn main() -> anyhow::Result<()> {
///     let config = ClientConfig::builder()
///         .hub_ip("192.168.1.20")
///         .token("local-api-token".to_owned())
///         .build();
///     let client = Client::new(config)?;
///
///     client.connect().await?;
///     client.subscribe_all().await?;
///
///     let mut events = Box::pin(client.events());
///     while let Some(event) = events.next().await {
///         println!("{} {}.{} = {}", event.device_id, event.capability, event.attribute, event.value);
///     }
///
///     Ok(())
/// }
/// ```
#[derive(Clone)]
pub struct Client {
    inner: Arc<ClientInner>,
}

struct Sinks {
    events: mpsc::Sender<DeviceEvent>,
    errors: mpsc::Sender<Error>,
}

/// State shared between the public handle and the background tasks.
pub(crate) struct ClientInner {
    /// `ws://{ip}:{port}/events`
    pub(crate) endpoint: Url,
    token: SecretString,
    /// Keepalive, deadline and size limits
    pub(crate) ws: Config,
    reconnect_enabled: AtomicBool,
    /// Reconnect delay; advanced after each failed attempt and never reset
    backoff: Mutex<ExponentialBackoff>,
    /// Write half of the live link
    pub(crate) link: LinkSlot,
    state_tx: watch::Sender<ConnectionState>,
    /// When the last pong (or the link itself) was observed
    pub(crate) last_pong: watch::Sender<tokio::time::Instant>,
    subscriptions: SubscriptionRegistry,
    /// Dropped on close, which ends both streams
    sinks: Mutex<Option<Sinks>>,
    /// Cancelled on close; wakes the reconnect supervisor early
    pub(crate) closed: CancellationToken,
    /// Serializes `connect` calls
    connect_lock: AsyncMutex<()>,
    on_reconnect: Option<ReconnectCallback>,
    on_disconnect: Option<DisconnectCallback>,
    events_rx: Arc<AsyncMutex<mpsc::Receiver<DeviceEvent>>>,
    errors_rx: Arc<AsyncMutex<mpsc::Receiver<Error>>>,
}

impl Client {
    /// Validate `config` and create a disconnected client.
    pub fn new(config: ClientConfig) -> Result<Self> {
        config.validate()?;
        let endpoint = config.endpoint()?;

        let (events_tx, events_rx) = mpsc::channel(config.event_buffer_size);
        let (errors_tx, errors_rx) = mpsc::channel(config.error_buffer_size);
        let (state_tx, _) = watch::channel(ConnectionState::Disconnected);
        let (last_pong, _) = watch::channel(tokio::time::Instant::now());

        let backoff: ExponentialBackoff = config.reconnect_config().into();
        let link = LinkSlot::new(config.ws.write_timeout);

        Ok(Self {
            inner: Arc::new(ClientInner {
                endpoint,
                token: config.token,
                ws: config.ws,
                reconnect_enabled: AtomicBool::new(config.reconnect_enabled),
                backoff: Mutex::new(backoff),
                link,
                state_tx,
                last_pong,
                subscriptions: SubscriptionRegistry::new(),
                sinks: Mutex::new(Some(Sinks {
                    events: events_tx,
                    errors: errors_tx,
                })),
                closed: CancellationToken::new(),
                connect_lock: AsyncMutex::new(()),
                on_reconnect: config.on_reconnect,
                on_disconnect: config.on_disconnect,
                events_rx: Arc::new(AsyncMutex::new(events_rx)),
                errors_rx: Arc::new(AsyncMutex::new(errors_rx)),
            }),
        })
    }

    /// Perform the Upgrade handshake and start the read and keepalive loops.
    ///
    /// Subscriptions recorded before the call are sent once the link is up.
    /// A failed handshake leaves the client disconnected; `connect` may be
    /// retried. Fails with [`WsError::AlreadyConnected`] while a link is live or
    /// the reconnect supervisor is running.
    pub async fn connect(&self) -> Result<()> {
        let _guard = self.inner.connect_lock.lock().await;

        match self.connection_state() {
            ConnectionState::Disconnected => {}
            ConnectionState::Closed => return Err(WsError::ConnectionClosed.into()),
            _ => return Err(WsError::AlreadyConnected.into()),
        }

        let upgraded = self.inner.handshake().await?;
        let generation = self.inner.start(upgraded).await?;
        self.inner.replay(generation).await;

        #[cfg(feature = "tracing")]
        tracing::info!(endpoint = %self.inner.endpoint, generation, "connected to hub");

        Ok(())
    }

    /// Close the client for good.
    ///
    /// Sends a normal-closure frame on a best-effort basis, stops every
    /// background task and ends both streams. Calling it again is a no-op. No
    /// reconnect is attempted after close, even if a disconnect is racing it.
    pub async fn close(&self) {
        let previous = self.inner.state_tx.send_replace(ConnectionState::Closed);
        if previous.is_closed() {
            return;
        }

        self.inner.closed.cancel();
        self.inner
            .link
            .close(Some(&Frame::close(CLOSE_NORMAL, "")))
            .await;
        self.inner
            .sinks
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();

        #[cfg(feature = "tracing")]
        tracing::info!(endpoint = %self.inner.endpoint, "client closed");
    }

    /// Record `device_ids` and, when connected, send a `subscribe` request.
    ///
    /// The identifiers are replayed after every reconnect. A failed write is
    /// reported on the error stream rather than returned.
    pub async fn subscribe<I, S>(&self, device_ids: I) -> Result<()>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let device_ids = collect_ids(device_ids)?;
        self.ensure_open()?;

        self.inner.subscriptions.add(device_ids.iter().cloned());
        self.inner
            .send_control(&ControlMessage::subscribe(device_ids))
            .await
    }

    /// Send an `unsubscribe` request when connected.
    ///
    /// The identifiers stay in the replay set, so a reconnect subscribes to
    /// them again.
    pub async fn unsubscribe<I, S>(&self, device_ids: I) -> Result<()>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let device_ids = collect_ids(device_ids)?;
        self.ensure_open()?;

        self.inner
            .send_control(&ControlMessage::unsubscribe(device_ids))
            .await
    }

    /// Ask for events from every device; replayed after every reconnect.
    pub async fn subscribe_all(&self) -> Result<()> {
        self.ensure_open()?;

        self.inner.subscriptions.set_all();
        self.inner.send_control(&ControlMessage::SubscribeAll).await
    }

    /// Device events in arrival order.
    ///
    /// Events that arrive while the buffer is full are dropped. The stream
    /// ends once the client is closed and the buffer is drained. Several
    /// streams may be open at once; each event goes to exactly one of them.
    pub fn events(&self) -> impl Stream<Item = DeviceEvent> + use<> {
        let receiver = Arc::clone(&self.inner.events_rx);

        stream! {
            loop {
                let next = receiver.lock().await.recv().await;
                match next {
                    Some(event) => yield event,
                    None => break,
                }
            }
        }
    }

    /// Asynchronous failures: hub error messages, undecodable payloads, write
    /// failures, disconnect causes and failed reconnect attempts.
    ///
    /// Same buffering and termination rules as [`Client::events`].
    pub fn errors(&self) -> impl Stream<Item = Error> + use<> {
        let receiver = Arc::clone(&self.inner.errors_rx);

        stream! {
            loop {
                let next = receiver.lock().await.recv().await;
                match next {
                    Some(error) => yield error,
                    None => break,
                }
            }
        }
    }

    #[must_use]
    pub fn is_connected(&self) -> bool {
        self.connection_state().is_connected()
    }

    #[must_use]
    pub fn is_reconnecting(&self) -> bool {
        self.connection_state().is_reconnecting()
    }

    /// Enable or disable reconnection for future disconnects.
    ///
    /// Disabling it also stops a supervisor that is currently retrying before
    /// its next attempt.
    pub fn set_reconnect_enabled(&self, enabled: bool) {
        self.inner.reconnect_enabled.store(enabled, Ordering::Release);
    }

    #[must_use]
    pub fn connection_state(&self) -> ConnectionState {
        self.inner.state()
    }

    /// Watch connection state transitions.
    #[must_use]
    pub fn state_receiver(&self) -> watch::Receiver<ConnectionState> {
        self.inner.state_tx.subscribe()
    }

    #[must_use]
    pub fn endpoint(&self) -> &Url {
        &self.inner.endpoint
    }

    /// What would be replayed on the next reconnect.
    #[must_use]
    pub fn subscriptions(&self) -> SubscriptionSnapshot {
        self.inner.subscriptions.snapshot()
    }

    fn ensure_open(&self) -> Result<()> {
        if self.connection_state().is_closed() {
            return Err(WsError::ConnectionClosed.into());
        }
        Ok(())
    }
}

impl fmt::Debug for Client {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Client")
            .field("endpoint", &self.inner.endpoint.as_str())
            .field("state", &self.connection_state())
            .finish_non_exhaustive()
    }
}

fn collect_ids<I, S>(device_ids: I) -> Result<Vec<String>>
where
    I: IntoIterator<Item = S>,
    S: Into<String>,
{
    let device_ids: Vec<String> = device_ids.into_iter().map(Into::into).collect();
    if device_ids.is_empty() {
        return Err(Error::validation("at least one device id is required"));
    }
    Ok(device_ids)
}

impl ClientInner {
    pub(crate) fn state(&self) -> ConnectionState {
        *self.state_tx.borrow()
    }

    pub(crate) fn is_closed(&self) -> bool {
        self.state().is_closed()
    }

    pub(crate) fn reconnect_enabled(&self) -> bool {
        self.reconnect_enabled.load(Ordering::Acquire)
    }

    /// Compare-and-set on the connection state. `update` returns `false` to
    /// leave the state untouched.
    pub(crate) fn transition<F>(&self, update: F) -> bool
    where
        F: FnOnce(&mut ConnectionState) -> bool,
    {
        self.state_tx.send_if_modified(update)
    }

    /// Delay before the next reconnect attempt.
    pub(crate) fn reconnect_delay(&self) -> std::time::Duration {
        self.backoff
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .current_interval
    }

    /// Grow the reconnect delay after a failed attempt.
    pub(crate) fn advance_backoff(&self) {
        _ = self
            .backoff
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .next_backoff();
    }

    /// Dial the hub again with the stored endpoint and token.
    pub(crate) async fn handshake(&self) -> std::result::Result<Upgraded, WsError> {
        handshake::connect(&self.endpoint, &self.token, self.ws.connect_timeout).await
    }

    /// Install a freshly upgraded link, mark the client connected and spawn
    /// the read and keepalive loops for it.
    ///
    /// Fails with [`WsError::ConnectionClosed`] when `close` won the race; the
    /// new link is torn down in that case.
    pub(crate) async fn start(
        self: &Arc<Self>,
        upgraded: Upgraded,
    ) -> std::result::Result<u64, WsError> {
        let Upgraded { reader, writer } = upgraded;
        let (generation, cancel) = self.link.install(writer).await;
        self.last_pong.send_replace(tokio::time::Instant::now());

        let promoted = self.transition(|state| {
            if state.is_closed() {
                return false;
            }
            *state = ConnectionState::Connected {
                since: Instant::now(),
            };
            true
        });
        if !promoted {
            self.link.retire(generation).await;
            return Err(WsError::ConnectionClosed);
        }

        tokio::spawn(reader::run(
            Arc::clone(self),
            reader,
            generation,
            cancel.clone(),
        ));
        tokio::spawn(keepalive::run(Arc::clone(self), generation, cancel));

        Ok(generation)
    }

    /// Restore the recorded subscription intent on link `generation`.
    pub(crate) async fn replay(&self, generation: u64) {
        let Some(message) = self.subscriptions.replay_message() else {
            return;
        };

        #[cfg(feature = "tracing")]
        tracing::debug!(?message, generation, "replaying subscriptions");

        let result = match message.to_frame() {
            Ok(frame) => self
                .link
                .send_on(generation, &frame)
                .await
                .map_err(Error::from),
            Err(e) => Err(e.into()),
        };
        if let Err(e) = result {
            self.emit_error(e);
        }
    }

    async fn send_control(&self, message: &ControlMessage) -> Result<()> {
        let frame = message.to_frame()?;

        match self.link.send(&frame).await {
            // Not connected: the intent is recorded and goes out on the next link
            Ok(()) | Err(WsError::ConnectionClosed) => {}
            Err(e) => {
                #[cfg(feature = "tracing")]
                tracing::warn!(?message, error = %e, "failed to send control message");
                self.emit_error(e.into());
            }
        }
        Ok(())
    }

    /// Queue `event` for the event stream, dropping it if the buffer is full.
    pub(crate) fn emit_event(&self, event: DeviceEvent) {
        let sinks = self.sinks.lock().unwrap_or_else(PoisonError::into_inner);
        let Some(sinks) = sinks.as_ref() else {
            return;
        };

        if let Err(TrySendError::Full(event)) = sinks.events.try_send(event) {
            #[cfg(feature = "tracing")]
            tracing::warn!(device_id = %event.device_id, "event buffer full, dropping event");
            #[cfg(not(feature = "tracing"))]
            let _ = &event;
        }
    }

    /// Queue `error` for the error stream, dropping it if the buffer is full.
    pub(crate) fn emit_error(&self, error: Error) {
        let sinks = self.sinks.lock().unwrap_or_else(PoisonError::into_inner);
        let Some(sinks) = sinks.as_ref() else {
            return;
        };

        if let Err(TrySendError::Full(error)) = sinks.errors.try_send(error) {
            #[cfg(feature = "tracing")]
            tracing::warn!(%error, "error buffer full, dropping error");
            #[cfg(not(feature = "tracing"))]
            let _ = &error;
        }
    }

    pub(crate) fn notify_reconnect(&self) {
        if let Some(callback) = &self.on_reconnect {
            callback();
        }
    }

    pub(crate) fn notify_disconnect(&self, cause: &Error) {
        if let Some(callback) = &self.on_disconnect {
            callback(cause);
        }
    }
}

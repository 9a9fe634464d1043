#![allow(
    clippy::unwrap_used,
    clippy::missing_panics_doc,
    reason = "Do not need additional syntax for setting up tests, and https://github.com/rust-lang/rust-clippy/issues/13981"
)]
#![allow(
    unused,
    reason = "Not every test binary uses every helper"
)]

use std::net::SocketAddr;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use futures_util::{SinkExt as _, StreamExt as _};
use local_hub_client::hub::{Client, ClientConfig};
use local_hub_client::ws::ConnectionState;
use local_hub_client::ws::config::Config;
use serde_json::{Value, json};
use tokio::io::{AsyncBufReadExt as _, AsyncWriteExt as _, BufReader};
use tokio::net::tcp::{OwnedReadHalf, OwnedWriteHalf};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::{broadcast, mpsc, oneshot};
use tokio::time::timeout;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::tungstenite::handshake::derive_accept_key;
use tokio_tungstenite::tungstenite::handshake::server::{ErrorResponse, Request, Response};
use tokio_tungstenite::tungstenite::http;

pub const TOKEN: &str = "local-api-token";
pub const DEVICE_ID: &str = "6f4c2a4e-7c83-4f0b-9b8e-2e7f2b2d6b1a";

/// How long helpers wait for something that should happen.
pub const WAIT: Duration = Duration::from_secs(5);

/// What the hub saw in an Upgrade request.
#[derive(Debug)]
pub struct Handshake {
    pub path: String,
    pub authorization: Option<String>,
}

/// Mock hub speaking the event-stream protocol.
pub struct MockHub {
    pub addr: SocketAddr,
    /// Sent to every connected client
    outgoing_tx: broadcast::Sender<Message>,
    /// Drops every connected client without a close frame
    kick_tx: broadcast::Sender<()>,
    /// Status every Upgrade request is answered with, if not `101`
    reject: Arc<Mutex<Option<u16>>>,
    control_rx: mpsc::UnboundedReceiver<Value>,
    pong_rx: mpsc::UnboundedReceiver<Vec<u8>>,
    close_rx: mpsc::UnboundedReceiver<()>,
    handshake_rx: mpsc::UnboundedReceiver<Handshake>,
}

impl MockHub {
    pub async fn start() -> Self {
        Self::start_with(None).await
    }

    /// A hub that answers every Upgrade request with `status`.
    pub async fn rejecting(status: u16) -> Self {
        Self::start_with(Some(status)).await
    }

    async fn start_with(reject: Option<u16>) -> Self {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();

        let (outgoing_tx, _) = broadcast::channel::<Message>(100);
        let (kick_tx, _) = broadcast::channel::<()>(4);
        let (control_tx, control_rx) = mpsc::unbounded_channel();
        let (pong_tx, pong_rx) = mpsc::unbounded_channel();
        let (close_tx, close_rx) = mpsc::unbounded_channel();
        let (handshake_tx, handshake_rx) = mpsc::unbounded_channel();

        let broadcast_tx = outgoing_tx.clone();
        let kick = kick_tx.clone();
        let reject = Arc::new(Mutex::new(reject));
        let rejection_status = Arc::clone(&reject);

        tokio::spawn(async move {
            loop {
                let Ok((stream, _)) = listener.accept().await else {
                    break;
                };

                // Subscribe before the handshake so nothing sent right after
                // the client's connect returns is missed
                let mut outgoing_rx = broadcast_tx.subscribe();
                let mut kick_rx = kick.subscribe();
                let handshake_tx = handshake_tx.clone();
                let control_tx = control_tx.clone();
                let pong_tx = pong_tx.clone();
                let close_tx = close_tx.clone();
                let status = *rejection_status.lock().unwrap();

                let callback = move |request: &Request, response: Response| {
                    let authorization = request
                        .headers()
                        .get(http::header::AUTHORIZATION)
                        .and_then(|value| value.to_str().ok())
                        .map(str::to_owned);
                    _ = handshake_tx.send(Handshake {
                        path: request.uri().path().to_owned(),
                        authorization,
                    });

                    match status {
                        Some(status) => {
                            let rejection: ErrorResponse = http::Response::builder()
                                .status(status)
                                .body(None)
                                .unwrap();
                            Err(rejection)
                        }
                        None => Ok(response),
                    }
                };

                let Ok(ws_stream) = tokio_tungstenite::accept_hdr_async(stream, callback).await
                else {
                    continue;
                };

                tokio::spawn(async move {
                    let (mut write, mut read) = ws_stream.split();
                    loop {
                        tokio::select! {
                            msg = read.next() => {
                                match msg {
                                    Some(Ok(Message::Text(text))) => {
                                        let value = serde_json::from_str(text.as_str())
                                            .unwrap_or_else(|_| Value::String(text.to_string()));
                                        _ = control_tx.send(value);
                                    }
                                    Some(Ok(Message::Pong(payload))) => {
                                        _ = pong_tx.send(payload.to_vec());
                                    }
                                    Some(Ok(Message::Close(_))) => {
                                        _ = close_tx.send(());
                                    }
                                    Some(Ok(_)) => {}
                                    _ => break,
                                }
                            }
                            msg = outgoing_rx.recv() => {
                                match msg {
                                    Ok(message) => {
                                        if write.send(message).await.is_err() {
                                            break;
                                        }
                                    }
                                    Err(broadcast::error::RecvError::Lagged(_)) => {}
                                    Err(broadcast::error::RecvError::Closed) => break,
                                }
                            }
                            _ = kick_rx.recv() => break,
                        }
                    }
                });
            }
        });

        Self {
            addr,
            outgoing_tx,
            kick_tx,
            reject,
            control_rx,
            pong_rx,
            close_rx,
            handshake_rx,
        }
    }

    /// Send a JSON text frame to every connected client.
    pub fn send(&self, message: &Value) {
        self.send_raw(Message::Text(message.to_string().into()));
    }

    pub fn send_raw(&self, message: Message) {
        _ = self.outgoing_tx.send(message);
    }

    /// Drop every live connection without a close frame.
    pub fn kick(&self) {
        _ = self.kick_tx.send(());
    }

    /// Answer later Upgrade requests with `status`, or accept them again with `None`.
    pub fn reject_with(&self, status: Option<u16>) {
        *self.reject.lock().unwrap() = status;
    }

    /// Drain Upgrade requests already received.
    pub async fn drain_handshakes(&mut self) {
        while self
            .handshake_within(Duration::from_millis(100))
            .await
            .is_some()
        {}
    }

    /// Next control message a client sent.
    pub async fn next_control(&mut self) -> Option<Value> {
        timeout(WAIT, self.control_rx.recv()).await.ok().flatten()
    }

    /// Control message sent within `window`, if any.
    pub async fn control_within(&mut self, window: Duration) -> Option<Value> {
        timeout(window, self.control_rx.recv()).await.ok().flatten()
    }

    pub async fn next_pong(&mut self) -> Option<Vec<u8>> {
        timeout(WAIT, self.pong_rx.recv()).await.ok().flatten()
    }

    pub async fn next_close(&mut self) -> Option<()> {
        timeout(WAIT, self.close_rx.recv()).await.ok().flatten()
    }

    pub async fn next_handshake(&mut self) -> Option<Handshake> {
        timeout(WAIT, self.handshake_rx.recv()).await.ok().flatten()
    }

    /// Upgrade request received within `window`, if any.
    pub async fn handshake_within(&mut self, window: Duration) -> Option<Handshake> {
        timeout(window, self.handshake_rx.recv()).await.ok().flatten()
    }
}

/// Answer one Upgrade request on `stream` with a valid 101 response.
async fn accept_upgrade(stream: TcpStream) -> Option<(BufReader<OwnedReadHalf>, OwnedWriteHalf)> {
    let (read, mut write) = stream.into_split();
    let mut reader = BufReader::new(read);

    let mut key = None;
    loop {
        let mut line = String::new();
        if reader.read_line(&mut line).await.unwrap_or(0) == 0 {
            return None;
        }
        let line = line.trim_end();
        if line.is_empty() {
            break;
        }
        if let Some((name, value)) = line.split_once(':')
            && name.eq_ignore_ascii_case("sec-websocket-key")
        {
            key = Some(value.trim().to_owned());
        }
    }

    let response = format!(
        "HTTP/1.1 101 Switching Protocols\r\n\
         Upgrade: websocket\r\n\
         Connection: Upgrade\r\n\
         Sec-WebSocket-Accept: {}\r\n\r\n",
        derive_accept_key(key?.as_bytes())
    );
    write.write_all(response.as_bytes()).await.ok()?;

    Some((reader, write))
}

/// A hub that completes the Upgrade and then never sends anything, pongs included.
pub async fn silent_hub() -> SocketAddr {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();

    tokio::spawn(async move {
        loop {
            let Ok((stream, _)) = listener.accept().await else {
                break;
            };

            tokio::spawn(async move {
                let Some((mut reader, write)) = accept_upgrade(stream).await else {
                    return;
                };
                // Swallow pings and never answer
                _ = tokio::io::copy(&mut reader, &mut tokio::io::sink()).await;
                drop(write);
            });
        }
    });

    addr
}

/// A hub that completes the Upgrade and then stops reading, so the client's
/// writes pile up in the socket buffers.
pub async fn deaf_hub() -> SocketAddr {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();

    tokio::spawn(async move {
        let mut links = Vec::new();
        loop {
            let Ok((stream, _)) = listener.accept().await else {
                break;
            };
            if let Some(link) = accept_upgrade(stream).await {
                links.push(link);
            }
        }
    });

    addr
}

/// A hub that accepts exactly one link, stops listening, and drops the link
/// once `hang_up` fires. Every later dial is refused.
pub async fn one_shot_hub() -> (SocketAddr, oneshot::Sender<()>) {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let (hang_up, hung_up) = oneshot::channel();

    tokio::spawn(async move {
        let Ok((stream, _)) = listener.accept().await else {
            return;
        };
        drop(listener);

        let Some(link) = accept_upgrade(stream).await else {
            return;
        };
        _ = hung_up.await;
        drop(link);
    });

    (addr, hang_up)
}

/// Timings short enough for tests; keepalive stays out of the way.
#[must_use]
pub fn config(addr: SocketAddr) -> ClientConfig {
    let mut ws = Config::default();
    ws.ping_interval = Duration::from_millis(200);
    ws.pong_timeout = Duration::from_secs(30);
    ws.read_timeout = Duration::from_secs(30);
    ws.connect_timeout = Duration::from_secs(2);

    ClientConfig::builder()
        .hub_ip(addr.ip().to_string())
        .hub_port(addr.port())
        .token(TOKEN.to_owned())
        .reconnect_delay(Duration::from_millis(50))
        .reconnect_max_delay(Duration::from_millis(200))
        .ws(ws)
        .build()
}

/// Wait until the client's state satisfies `predicate`.
pub async fn wait_for_state<F>(client: &Client, predicate: F) -> ConnectionState
where
    F: FnMut(&ConnectionState) -> bool,
{
    let mut states = client.state_receiver();
    let state = timeout(WAIT, states.wait_for(predicate))
        .await
        .unwrap()
        .unwrap();
    *state
}

#[must_use]
pub fn device_event(device_id: &str, value: &Value) -> Value {
    json!({
        "messageType": "deviceEvent",
        "deviceEvent": {
            "deviceId": device_id,
            "componentId": "main",
            "capability": "switch",
            "attribute": "switch",
            "value": value,
            "timestamp": "2024-05-01T12:30:00Z",
            "stateChange": true
        }
    })
}

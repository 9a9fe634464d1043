//! HTTP/1.1 Upgrade exchange that promotes a TCP stream to a WebSocket link.

use std::time::Duration;

use base64::Engine as _;
use base64::engine::general_purpose::STANDARD;
use secrecy::{ExposeSecret as _, SecretString};
use sha1::{Digest as _, Sha1};
use tokio::io::{AsyncBufRead, AsyncBufReadExt as _, AsyncWriteExt as _, BufReader};
use tokio::net::TcpStream;
use tokio::net::tcp::{OwnedReadHalf, OwnedWriteHalf};
use tokio::time::timeout;
use url::Url;

use super::error::WsError;

/// GUID appended to the client key before hashing (RFC 6455 §1.3).
const WEBSOCKET_GUID: &str = "258EAFA5-E914-47DA-95CA-C5AB0DC85B11";

/// Upper bound on the size of the Upgrade response header block.
const MAX_RESPONSE_HEADER_BYTES: usize = 8 * 1024;

const SWITCHING_PROTOCOLS: u16 = 101;

/// A freshly upgraded link: the buffered read half (positioned right after the
/// HTTP response) and the raw write half.
#[derive(Debug)]
pub struct Upgraded {
    pub reader: BufReader<OwnedReadHalf>,
    pub writer: OwnedWriteHalf,
}

/// Parsed status line and headers of the Upgrade response.
#[derive(Debug)]
struct Response {
    status: u16,
    headers: Vec<(String, String)>,
}

impl Response {
    fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(key, _)| key.eq_ignore_ascii_case(name))
            .map(|(_, value)| value.as_str())
    }
}

/// Generate a random base64-encoded 16-byte `Sec-WebSocket-Key`.
#[must_use]
pub fn generate_key() -> String {
    STANDARD.encode(rand::random::<[u8; 16]>())
}

/// Compute the `Sec-WebSocket-Accept` value the server must return for `key`.
#[must_use]
pub fn derive_accept_key(key: &str) -> String {
    let mut sha1 = Sha1::new();
    sha1.update(key.as_bytes());
    sha1.update(WEBSOCKET_GUID.as_bytes());
    STANDARD.encode(sha1.finalize())
}

/// Render the Upgrade request for `url`.
///
/// # Security
///
/// The bearer token is written in plaintext; the local link is unencrypted.
pub fn build_request(url: &Url, key: &str, token: &SecretString) -> Result<String, WsError> {
    let host = url
        .host_str()
        .ok_or_else(|| WsError::InvalidHandshake(format!("endpoint {url} has no host")))?;
    let host = match url.port() {
        Some(port) => format!("{host}:{port}"),
        None => host.to_owned(),
    };
    let target = match url.query() {
        Some(query) => format!("{}?{query}", url.path()),
        None => url.path().to_owned(),
    };

    Ok(format!(
        "GET {target} HTTP/1.1\r\n\
         Host: {host}\r\n\
         Upgrade: websocket\r\n\
         Connection: Upgrade\r\n\
         Sec-WebSocket-Key: {key}\r\n\
         Sec-WebSocket-Version: 13\r\n\
         Authorization: Bearer {}\r\n\
         \r\n",
        token.expose_secret()
    ))
}

/// Dial `url` and perform the Upgrade exchange, bounded by `connect_timeout`.
///
/// Any non-101 status or accept-key mismatch is fatal; no retry happens here.
pub async fn connect(
    url: &Url,
    token: &SecretString,
    connect_timeout: Duration,
) -> Result<Upgraded, WsError> {
    timeout(connect_timeout, negotiate(url, token))
        .await
        .map_err(|_elapsed| WsError::HandshakeTimeout)?
}

async fn negotiate(url: &Url, token: &SecretString) -> Result<Upgraded, WsError> {
    let host = url
        .host_str()
        .ok_or_else(|| WsError::InvalidHandshake(format!("endpoint {url} has no host")))?;
    let port = url
        .port_or_known_default()
        .ok_or_else(|| WsError::InvalidHandshake(format!("endpoint {url} has no port")))?;

    // IPv6 literals come back bracketed
    let host = host.trim_start_matches('[').trim_end_matches(']');

    let stream = TcpStream::connect((host, port))
        .await
        .map_err(WsError::Dial)?;
    stream.set_nodelay(true)?;
    let (read_half, mut writer) = stream.into_split();

    let key = generate_key();
    let request = build_request(url, &key, token)?;
    writer.write_all(request.as_bytes()).await?;
    writer.flush().await?;

    let mut reader = BufReader::new(read_half);
    let response = read_response(&mut reader).await?;
    verify_response(&response, &key)?;

    #[cfg(feature = "tracing")]
    tracing::debug!(%url, "WebSocket handshake complete");

    Ok(Upgraded { reader, writer })
}

/// Read the status line and headers, leaving any following bytes buffered.
async fn read_response<R>(reader: &mut R) -> Result<Response, WsError>
where
    R: AsyncBufRead + Unpin,
{
    let mut consumed = 0_usize;
    let mut line = String::new();

    let status_line = next_line(reader, &mut line, &mut consumed).await?;
    let mut parts = status_line.split_whitespace();
    let status = match (parts.next(), parts.next()) {
        (Some(version), Some(code)) if version.starts_with("HTTP/") => code
            .parse::<u16>()
            .map_err(|_e| WsError::InvalidHandshake(format!("bad status line: {status_line}")))?,
        _ => {
            return Err(WsError::InvalidHandshake(format!(
                "bad status line: {status_line}"
            )));
        }
    };

    let mut headers = Vec::new();
    loop {
        let header_line = next_line(reader, &mut line, &mut consumed).await?;
        if header_line.is_empty() {
            break;
        }
        let (name, value) = header_line
            .split_once(':')
            .ok_or_else(|| WsError::InvalidHandshake(format!("bad header: {header_line}")))?;
        headers.push((name.trim().to_owned(), value.trim().to_owned()));
    }

    Ok(Response { status, headers })
}

async fn next_line<R>(
    reader: &mut R,
    line: &mut String,
    consumed: &mut usize,
) -> Result<String, WsError>
where
    R: AsyncBufRead + Unpin,
{
    line.clear();
    let read = reader.read_line(line).await?;
    if read == 0 {
        return Err(WsError::InvalidHandshake(
            "connection closed during handshake".to_owned(),
        ));
    }
    *consumed += read;
    if *consumed > MAX_RESPONSE_HEADER_BYTES {
        return Err(WsError::InvalidHandshake(
            "response header too large".to_owned(),
        ));
    }
    Ok(line.trim_end_matches(['\r', '\n']).to_owned())
}

fn verify_response(response: &Response, key: &str) -> Result<(), WsError> {
    if response.status != SWITCHING_PROTOCOLS {
        return Err(WsError::HandshakeStatus {
            status: response.status,
        });
    }

    let expected = derive_accept_key(key);
    let actual = response.header("Sec-WebSocket-Accept");
    if actual != Some(expected.as_str()) {
        return Err(WsError::AcceptMismatch {
            expected,
            actual: actual.map(str::to_owned),
        });
    }

    Ok(())
}

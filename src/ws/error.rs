#![expect(
    clippy::module_name_repetitions,
    reason = "Error types include the module name to indicate their scope"
)]

use std::error::Error as StdError;
use std::fmt;
use std::io;
use std::time::Duration;

use crate::error::{Error, Kind};

/// WebSocket error variants.
#[non_exhaustive]
#[derive(Debug)]
pub enum WsError {
    /// Error reading from or writing to the underlying TCP stream
    Io(io::Error),
    /// TCP connection to the hub could not be established
    Dial(io::Error),
    /// Dialing plus the Upgrade exchange exceeded the connect timeout
    HandshakeTimeout,
    /// Hub answered the Upgrade request with something other than `101`
    HandshakeStatus {
        /// HTTP status code received
        status: u16,
    },
    /// `Sec-WebSocket-Accept` did not match the key that was sent
    AcceptMismatch {
        /// Value derived from our `Sec-WebSocket-Key`
        expected: String,
        /// Value the hub returned, if any
        actual: Option<String>,
    },
    /// Upgrade response could not be parsed
    InvalidHandshake(String),
    /// Received a frame that violates the framing rules
    InvalidFrame(String),
    /// Inbound frame declared a payload larger than the configured maximum
    PayloadTooLarge {
        /// Declared payload length
        len: u64,
        /// Configured maximum
        max: usize,
    },
    /// Error parsing a message payload
    MessageParse(serde_json::Error),
    /// No pong was observed within the keepalive window
    KeepaliveTimeout {
        /// Time since the last observed pong
        elapsed: Duration,
    },
    /// No frame arrived within the read deadline
    Timeout,
    /// A frame write did not finish within the write timeout
    WriteTimeout,
    /// WebSocket connection was closed
    ConnectionClosed,
    /// `connect` was called while a link is already live
    AlreadyConnected,
}

impl fmt::Display for WsError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Io(e) => write!(f, "WebSocket transport error: {e}"),
            Self::Dial(e) => write!(f, "Failed to reach hub: {e}"),
            Self::HandshakeTimeout => write!(f, "WebSocket handshake timed out"),
            Self::HandshakeStatus { status } => {
                write!(f, "WebSocket handshake failed with status {status}")
            }
            Self::AcceptMismatch { expected, actual } => write!(
                f,
                "WebSocket accept key mismatch: expected {expected}, got {}",
                actual.as_deref().unwrap_or("<missing>")
            ),
            Self::InvalidHandshake(reason) => write!(f, "Invalid handshake response: {reason}"),
            Self::InvalidFrame(reason) => write!(f, "Invalid WebSocket frame: {reason}"),
            Self::PayloadTooLarge { len, max } => {
                write!(f, "Frame payload of {len} bytes exceeds maximum of {max}")
            }
            Self::MessageParse(e) => write!(f, "Failed to parse WebSocket message: {e}"),
            Self::KeepaliveTimeout { elapsed } => {
                write!(f, "Keepalive timeout: no pong received for {elapsed:?}")
            }
            Self::Timeout => write!(f, "WebSocket read timed out"),
            Self::WriteTimeout => write!(f, "WebSocket write timed out"),
            Self::ConnectionClosed => write!(f, "WebSocket connection closed"),
            Self::AlreadyConnected => write!(f, "WebSocket is already connected"),
        }
    }
}

impl StdError for WsError {
    fn source(&self) -> Option<&(dyn StdError + 'static)> {
        match self {
            Self::Io(e) | Self::Dial(e) => Some(e),
            Self::MessageParse(e) => Some(e),
            _ => None,
        }
    }
}

impl WsError {
    const fn kind(&self) -> Kind {
        match self {
            Self::Dial(_)
            | Self::HandshakeTimeout
            | Self::HandshakeStatus { .. }
            | Self::AcceptMismatch { .. }
            | Self::InvalidHandshake(_) => Kind::Handshake,
            Self::InvalidFrame(_) | Self::PayloadTooLarge { .. } | Self::MessageParse(_) => {
                Kind::Protocol
            }
            Self::AlreadyConnected => Kind::Validation,
            Self::Io(_)
            | Self::KeepaliveTimeout { .. }
            | Self::Timeout
            | Self::WriteTimeout
            | Self::ConnectionClosed => Kind::WebSocket,
        }
    }
}

impl From<io::Error> for WsError {
    fn from(e: io::Error) -> Self {
        Self::Io(e)
    }
}

// Integration with main Error type
impl From<WsError> for Error {
    fn from(e: WsError) -> Self {
        Error::with_source(e.kind(), e)
    }
}

impl From<io::Error> for Error {
    fn from(e: io::Error) -> Self {
        WsError::Io(e).into()
    }
}

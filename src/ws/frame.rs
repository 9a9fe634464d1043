//! WebSocket frame codec (RFC 6455 §5).
//!
//! Outbound frames are always final and always masked with a fresh random key.
//! Inbound frames are unmasked when the mask bit is set, even though a conforming
//! server never masks. Fragmented messages are not reassembled: continuation
//! frames are handed to the caller as-is.

use tokio::io::{AsyncRead, AsyncReadExt as _, AsyncWrite, AsyncWriteExt as _};

use super::error::WsError;

const FIN_BIT: u8 = 0x80;
const MASK_BIT: u8 = 0x80;
const OPCODE_MASK: u8 = 0x0F;
const LENGTH_MASK: u8 = 0x7F;

/// Raw length value announcing a 16-bit extended length.
const LENGTH_16: u8 = 126;
/// Raw length value announcing a 64-bit extended length.
const LENGTH_64: u8 = 127;

/// Close status code for a normal closure.
pub const CLOSE_NORMAL: u16 = 1000;

/// Frame opcode.
#[non_exhaustive]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Opcode {
    Continuation = 0x0,
    Text = 0x1,
    Binary = 0x2,
    Close = 0x8,
    Ping = 0x9,
    Pong = 0xA,
}

impl Opcode {
    /// Parse the low nibble of the first header byte.
    #[must_use]
    pub const fn from_u8(byte: u8) -> Option<Self> {
        match byte & OPCODE_MASK {
            0x0 => Some(Self::Continuation),
            0x1 => Some(Self::Text),
            0x2 => Some(Self::Binary),
            0x8 => Some(Self::Close),
            0x9 => Some(Self::Ping),
            0xA => Some(Self::Pong),
            _ => None,
        }
    }
}

/// A single WebSocket frame.
#[non_exhaustive]
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Frame {
    /// FIN bit of an inbound frame; always `true` for frames we build
    pub fin: bool,
    pub opcode: Opcode,
    pub payload: Vec<u8>,
}

impl Frame {
    #[must_use]
    pub fn new(opcode: Opcode, payload: Vec<u8>) -> Self {
        Self {
            fin: true,
            opcode,
            payload,
        }
    }

    #[must_use]
    pub fn text<S: Into<String>>(text: S) -> Self {
        Self::new(Opcode::Text, text.into().into_bytes())
    }

    #[must_use]
    pub fn ping(payload: Vec<u8>) -> Self {
        Self::new(Opcode::Ping, payload)
    }

    #[must_use]
    pub fn pong(payload: Vec<u8>) -> Self {
        Self::new(Opcode::Pong, payload)
    }

    /// Close frame carrying a status code and UTF-8 reason.
    #[must_use]
    pub fn close(code: u16, reason: &str) -> Self {
        let mut payload = Vec::with_capacity(2 + reason.len());
        payload.extend_from_slice(&code.to_be_bytes());
        payload.extend_from_slice(reason.as_bytes());
        Self::new(Opcode::Close, payload)
    }

    /// Encode as a client frame with a fresh random masking key.
    #[must_use]
    pub fn encode(&self) -> Vec<u8> {
        self.encode_with_mask(rand::random())
    }

    /// Encode as a client frame using `mask_key`.
    #[must_use]
    pub fn encode_with_mask(&self, mask_key: [u8; 4]) -> Vec<u8> {
        let mut bytes = encode_header(self.opcode, self.payload.len());
        bytes.extend_from_slice(&mask_key);

        let start = bytes.len();
        bytes.extend_from_slice(&self.payload);
        apply_mask(&mut bytes[start..], mask_key);

        bytes
    }

    /// Status code and reason of a close frame, if the payload carries them.
    #[must_use]
    pub fn close_reason(&self) -> Option<(u16, String)> {
        if self.opcode != Opcode::Close || self.payload.len() < 2 {
            return None;
        }
        let code = u16::from_be_bytes([self.payload[0], self.payload[1]]);
        let reason = String::from_utf8_lossy(&self.payload[2..]).into_owned();
        Some((code, reason))
    }
}

/// XOR `payload` in place with `mask_key[i % 4]`. Masking and unmasking are the same operation.
pub fn apply_mask(payload: &mut [u8], mask_key: [u8; 4]) {
    for (i, byte) in payload.iter_mut().enumerate() {
        *byte ^= mask_key[i % 4];
    }
}

/// Build the FIN/opcode byte, the masked length byte and any extended length.
#[must_use]
#[expect(
    clippy::cast_possible_truncation,
    reason = "Each branch only truncates lengths that fit the target width"
)]
pub fn encode_header(opcode: Opcode, len: usize) -> Vec<u8> {
    let mut header = Vec::with_capacity(14 + len);
    header.push(FIN_BIT | opcode as u8);

    if len < usize::from(LENGTH_16) {
        header.push(MASK_BIT | len as u8);
    } else if len < 65536 {
        header.push(MASK_BIT | LENGTH_16);
        header.extend_from_slice(&(len as u16).to_be_bytes());
    } else {
        header.push(MASK_BIT | LENGTH_64);
        header.extend_from_slice(&(len as u64).to_be_bytes());
    }

    header
}

/// Read one frame from `reader`.
///
/// Any short read surfaces as [`WsError::Io`] so callers treat it as a dropped
/// link rather than a protocol violation.
pub async fn read_frame<R>(reader: &mut R, max_payload: usize) -> Result<Frame, WsError>
where
    R: AsyncRead + Unpin,
{
    let mut head = [0_u8; 2];
    reader.read_exact(&mut head).await?;

    let fin = head[0] & FIN_BIT != 0;
    let opcode = Opcode::from_u8(head[0]).ok_or_else(|| {
        WsError::InvalidFrame(format!("unknown opcode 0x{:x}", head[0] & OPCODE_MASK))
    })?;
    let masked = head[1] & MASK_BIT != 0;

    let len = match head[1] & LENGTH_MASK {
        LENGTH_16 => u64::from(reader.read_u16().await?),
        LENGTH_64 => reader.read_u64().await?,
        short => u64::from(short),
    };
    let len = usize::try_from(len)
        .ok()
        .filter(|len| *len <= max_payload)
        .ok_or(WsError::PayloadTooLarge {
            len,
            max: max_payload,
        })?;

    let mask_key = if masked {
        let mut key = [0_u8; 4];
        reader.read_exact(&mut key).await?;
        Some(key)
    } else {
        None
    };

    let mut payload = vec![0_u8; len];
    reader.read_exact(&mut payload).await?;
    if let Some(key) = mask_key {
        apply_mask(&mut payload, key);
    }

    Ok(Frame {
        fin,
        opcode,
        payload,
    })
}

/// Encode `frame` and write it to `writer` in one call.
pub async fn write_frame<W>(writer: &mut W, frame: &Frame) -> Result<(), WsError>
where
    W: AsyncWrite + Unpin,
{
    writer.write_all(&frame.encode()).await?;
    writer.flush().await?;
    Ok(())
}

//! Read loop: one per live link.

use std::sync::Arc;

use tokio::io::BufReader;
use tokio::net::tcp::OwnedReadHalf;
use tokio::time::timeout;
use tokio_util::sync::CancellationToken;

use super::client::ClientInner;
use super::reconnect;
use super::types::response::{InboundMessage, parse_message};
use crate::ws::error::WsError;
use crate::ws::frame::{self, Frame, Opcode};

/// Read frames from link `generation` until it fails or is cancelled.
///
/// Every read is bounded by the read deadline. Transport failures hand the
/// link to [`reconnect::handle_disconnect`]; payloads that do not decode are
/// reported and skipped. Cancellation means the link was retired elsewhere, so
/// the loop exits without reporting anything.
pub(crate) async fn run(
    inner: Arc<ClientInner>,
    mut reader: BufReader<OwnedReadHalf>,
    generation: u64,
    cancel: CancellationToken,
) {
    let read_timeout = inner.ws.read_timeout;
    let max_payload = inner.ws.max_payload_size;

    let cause = loop {
        let read = tokio::select! {
            () = cancel.cancelled() => return,
            read = timeout(read_timeout, frame::read_frame(&mut reader, max_payload)) => read,
        };

        let frame = match read {
            Ok(Ok(frame)) => frame,
            Ok(Err(e)) => break e,
            Err(_elapsed) => break WsError::Timeout,
        };

        match frame.opcode {
            // Fragments are not reassembled; each payload is decoded on its own
            Opcode::Text | Opcode::Binary | Opcode::Continuation => {
                dispatch(&inner, &frame.payload);
            }
            Opcode::Ping => {
                if let Err(e) = inner
                    .link
                    .send_on(generation, &Frame::pong(frame.payload))
                    .await
                {
                    break e;
                }
            }
            Opcode::Pong => {
                inner.last_pong.send_replace(tokio::time::Instant::now());
            }
            Opcode::Close => {
                #[cfg(feature = "tracing")]
                if let Some((code, reason)) = frame.close_reason() {
                    tracing::debug!(code, %reason, generation, "hub closed the link");
                }
                break WsError::ConnectionClosed;
            }
        }
    };

    #[cfg(feature = "tracing")]
    tracing::debug!(error = %cause, generation, "read loop ended");

    reconnect::handle_disconnect(&inner, generation, cause.into()).await;
}

/// Route one decoded payload to the event or error stream.
fn dispatch(inner: &ClientInner, payload: &[u8]) {
    match parse_message(payload) {
        Ok(InboundMessage::DeviceEvent(event)) => {
            #[cfg(feature = "tracing")]
            tracing::trace!(?event, "received device event");
            inner.emit_event(event);
        }
        Ok(InboundMessage::Error(error)) => {
            #[cfg(feature = "tracing")]
            tracing::warn!(%error, "hub reported an error");
            inner.emit_error(error.into());
        }
        Ok(InboundMessage::Other(message_type)) => {
            #[cfg(feature = "tracing")]
            tracing::trace!(%message_type, "ignoring message");
            #[cfg(not(feature = "tracing"))]
            let _ = &message_type;
        }
        Err(e) => {
            #[cfg(feature = "tracing")]
            tracing::warn!(error = %e, "failed to decode inbound message");
            inner.emit_error(WsError::MessageParse(e).into());
        }
    }
}

//! Hand-rolled WebSocket client transport.
//!
//! This module implements the pieces of RFC 6455 the hub link needs, directly
//! over a Tokio TCP stream:
//!
//! - [`frame`]: encoding/decoding of single frames, masking, extended lengths
//! - [`handshake`]: the HTTP Upgrade exchange and accept-key verification
//! - [`connection`]: connection state and the generation-tagged [`LinkSlot`]
//! - [`config`]: keepalive, deadline and reconnect timings
//!
//! Encrypted transport, compression extensions and fragment reassembly are not
//! supported.

pub mod config;
pub mod connection;
pub mod error;
pub mod frame;
pub mod handshake;

pub use connection::{ConnectionState, LinkSlot};
#[expect(
    clippy::module_name_repetitions,
    reason = "WsError includes module name for clarity when used outside this module"
)]
pub use error::WsError;
pub use frame::{Frame, Opcode};

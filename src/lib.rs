#![cfg_attr(doc, doc = include_str!("../README.md"))]

pub mod error;
pub mod hub;
pub(crate) mod serde_helpers;
pub mod types;
pub mod ws;

use crate::error::Error;

pub type Result<T> = std::result::Result<T, Error>;

/// Default port of the hub's local event stream.
pub use hub::config::DEFAULT_HUB_PORT;

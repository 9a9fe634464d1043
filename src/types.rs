//! Re-exported types from external crates for convenience.
//!
//! These types appear in this crate's public API and are re-exported here
//! so users don't need to add these dependencies to their `Cargo.toml`.

/// Date and time types for event timestamps.
pub use chrono::{DateTime, Utc};
/// Wrapper that keeps the hub token out of `Debug` output.
pub use secrecy::{ExposeSecret, SecretString};
/// Dynamically typed attribute values carried by device events.
pub use serde_json::Value;
/// Parsed endpoint URL.
pub use url::Url;

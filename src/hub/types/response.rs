use std::fmt;

use bon::Builder;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::Hub;
use crate::serde_helpers;

/// A device attribute change pushed by the hub.
#[non_exhaustive]
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize, Builder)]
#[serde(rename_all = "camelCase")]
pub struct DeviceEvent {
    /// Identifier of the device that changed
    #[builder(into)]
    pub device_id: String,
    /// Component of the device (`main` for single-component devices)
    #[serde(alias = "component")]
    #[builder(into)]
    pub component_id: String,
    /// Capability the attribute belongs to (e.g. `switch`, `temperatureMeasurement`)
    #[builder(into)]
    pub capability: String,
    /// Attribute name (e.g. `switch`, `temperature`)
    #[builder(into)]
    pub attribute: String,
    /// New attribute value; its JSON type depends on the capability
    pub value: Value,
    /// Unit of `value`, when the attribute has one
    #[serde(default, skip_serializing_if = "Option::is_none")]
    #[builder(into)]
    pub unit: Option<String>,
    /// When the hub observed the change
    #[serde(with = "serde_helpers::timestamp")]
    pub timestamp: DateTime<Utc>,
    /// Whether the value differs from the previous one
    #[serde(default)]
    #[builder(default)]
    pub state_change: bool,
}

/// Message received on the event stream, dispatched on its `messageType`.
#[non_exhaustive]
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(try_from = "Envelope")]
pub enum InboundMessage {
    /// `deviceEvent`
    DeviceEvent(DeviceEvent),
    /// `error`
    Error(Hub),
    /// Any other `messageType`; ignored by the client
    Other(String),
}

/// Wire shape shared by every inbound message.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct Envelope {
    message_type: String,
    #[serde(default)]
    device_event: Option<DeviceEvent>,
    #[serde(default)]
    error: Option<ErrorPayload>,
}

#[derive(Debug, Deserialize)]
struct ErrorPayload {
    #[serde(with = "serde_helpers::string_or_number")]
    code: String,
    #[serde(default)]
    message: String,
}

/// An envelope whose payload does not match its discriminator.
#[derive(Debug)]
pub struct MissingPayload(&'static str);

impl fmt::Display for MissingPayload {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} message without `{}` payload", self.0, self.0)
    }
}

impl TryFrom<Envelope> for InboundMessage {
    type Error = MissingPayload;

    fn try_from(envelope: Envelope) -> Result<Self, MissingPayload> {
        match envelope.message_type.as_str() {
            "deviceEvent" => envelope
                .device_event
                .map(Self::DeviceEvent)
                .ok_or(MissingPayload("deviceEvent")),
            "error" => envelope
                .error
                .map(|e| {
                    Self::Error(Hub {
                        code: e.code,
                        message: e.message,
                    })
                })
                .ok_or(MissingPayload("error")),
            _ => Ok(Self::Other(envelope.message_type)),
        }
    }
}

/// Decode a text or binary payload into an [`InboundMessage`].
pub fn parse_message(bytes: &[u8]) -> Result<InboundMessage, serde_json::Error> {
    let value: Value = serde_json::from_slice(bytes)?;
    serde_helpers::deserialize_with_warnings(value)
}

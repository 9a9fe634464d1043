use serde::Serialize;

use crate::ws::Frame;

/// Control message sent to the hub as a text frame.
#[non_exhaustive]
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
#[serde(tag = "messageType", rename_all = "camelCase")]
pub enum ControlMessage {
    /// Start streaming events for the listed devices
    Subscribe {
        #[serde(rename = "deviceIds")]
        device_ids: Vec<String>,
    },
    /// Stop streaming events for the listed devices
    Unsubscribe {
        #[serde(rename = "deviceIds")]
        device_ids: Vec<String>,
    },
    /// Stream events for every device on the hub
    SubscribeAll,
}

impl ControlMessage {
    /// Create a subscribe request.
    #[must_use]
    pub fn subscribe(device_ids: Vec<String>) -> Self {
        Self::Subscribe { device_ids }
    }

    /// Create an unsubscribe request.
    #[must_use]
    pub fn unsubscribe(device_ids: Vec<String>) -> Self {
        Self::Unsubscribe { device_ids }
    }

    /// Serialize into a text frame.
    pub fn to_frame(&self) -> Result<Frame, serde_json::Error> {
        Ok(Frame::text(serde_json::to_string(self)?))
    }
}

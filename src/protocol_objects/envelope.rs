use serde::{Deserialize, Serialize};

use super::{payload::Payload, user::PeerId};
use crate::types::Result;

/// One discrete unit exchanged over a transport.
///
/// Serializes to the flat shape `{"type": ..., <payload fields>, "userId": ..., "timestamp": ...}`.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Envelope {
    #[serde(flatten)]
    pub payload: Payload,
    #[serde(rename = "userId")]
    #[serde(default)]
    #[serde(skip_serializing_if = "Option::is_none")]
    pub origin: Option<PeerId>,
    #[serde(default)]
    pub timestamp: i64,
}

impl Envelope {
    pub fn new(origin: &str, payload: Payload, timestamp: i64) -> Self {
        Self {
            payload,
            origin: Some(String::from(origin)),
            timestamp,
        }
    }

    /// Stated origin, falling back to the id carried inside the payload.
    pub fn sender(&self) -> Option<&str> {
        self.origin
            .as_deref()
            .or_else(|| self.payload.implied_origin())
            .filter(|id| !id.is_empty())
    }

    pub fn to_frame(&self) -> Result<String> {
        Ok(serde_json::to_string(self)?)
    }

    pub fn from_frame(frame: &str) -> Result<Self> {
        Ok(serde_json::from_str(frame)?)
    }
}

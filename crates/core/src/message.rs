//! Wire types for messages exchanged with the hosting application.
//!
//! Control messages are a tagged union on the `type` field; replies are
//! plain records. Push payloads tolerate missing fields.

use serde::{Deserialize, Serialize};

/// A command from the hosting application.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ControlMessage {
    /// Activate now instead of waiting for controlled instances to close.
    SkipWaiting,
    /// Report the current generation id.
    GetVersion,
    /// Delete the current generation.
    ClearCache,
}

impl ControlMessage {
    /// Decode a raw message; anything that is not a known command is `None`.
    pub fn decode(value: &serde_json::Value) -> Option<Self> {
        serde_json::from_value(value.clone()).ok()
    }
}

/// Reply sent back on a message's reply channel.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ControlReply {
    Version { version: String },
    Cleared { success: bool },
}

/// Inbound push body. Every field is optional.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PushPayload {
    #[serde(default)]
    pub title: Option<String>,
    #[serde(default)]
    pub body: Option<String>,
    #[serde(default)]
    pub tag: Option<String>,
}

impl PushPayload {
    /// Parse a push body; an absent or malformed body yields all defaults.
    pub fn parse(data: Option<&[u8]>) -> Self {
        data.and_then(|bytes| serde_json::from_slice(bytes).ok())
            .unwrap_or_default()
    }
}

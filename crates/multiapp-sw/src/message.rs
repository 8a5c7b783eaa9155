//! Messages exchanged with controlled pages.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::debug;

/// Page → worker control messages.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ControlMessage {
    /// Leave the waiting state now.
    SkipWaiting,
    /// Store a URL in the current generation.
    Prefetch { url: String },
}

impl ControlMessage {
    /// Parse a posted value. Unknown or malformed messages yield `None`.
    pub fn parse(value: &Value) -> Option<Self> {
        match serde_json::from_value(value.clone()) {
            Ok(message) => Some(message),
            Err(e) => {
                debug!(error = %e, "Ignoring unrecognized message");
                None
            }
        }
    }
}

/// Worker → page messages.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ClientMessage {
    /// A newer version of `url` is on the network.
    UpdateAvailable { url: String },
    /// The page is now controlled by `generation`.
    ControllerChange { generation: String },
}

//! Wire messages exchanged between participants of a session.
//!
//! Messages are JSON objects tagged by `type`:
//! ```json
//! { "type": "join", "drawing": { "strokes": [...] } }
//! { "type": "draw", "drawing": { "strokes": [ <one stroke> ] } }
//! { "type": "undo" }
//! { "type": "clear" }
//! ```

use crate::drawing::Drawing;
use crate::stroke::Stroke;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Errors produced while encoding or decoding a message.
#[derive(Debug, Error)]
pub enum ProtocolError {
    #[error("Failed to encode message: {0}")]
    Encode(#[source] serde_json::Error),
    #[error("Malformed message: {0}")]
    Decode(#[source] serde_json::Error),
}

/// One synchronization message.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum GroupDrawMessage {
    /// Full drawing of the sender, re-sent on every roster change.
    Join { drawing: Drawing },
    /// Fragment carrying the single stroke the sender just appended.
    Draw { drawing: Drawing },
    /// Pop the last stroke.
    Undo,
    /// Discard all strokes.
    Clear,
}

impl GroupDrawMessage {
    /// Build a `Draw` message for one stroke.
    pub fn draw(stroke: Stroke) -> Self {
        Self::Draw {
            drawing: Drawing::fragment(stroke),
        }
    }

    /// Short name of the message kind, for logs.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Join { .. } => "join",
            Self::Draw { .. } => "draw",
            Self::Undo => "undo",
            Self::Clear => "clear",
        }
    }

    /// Serialize to the payload handed to the transport.
    pub fn encode(&self) -> Result<Vec<u8>, ProtocolError> {
        serde_json::to_vec(self).map_err(ProtocolError::Encode)
    }

    /// Parse a payload received from the transport.
    pub fn decode(bytes: &[u8]) -> Result<Self, ProtocolError> {
        serde_json::from_slice(bytes).map_err(ProtocolError::Decode)
    }
}

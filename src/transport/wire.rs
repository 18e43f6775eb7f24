//! JSON wire messages.
//!
//! Every frame is a JSON object with a `"type"` discriminator:
//!
//! ```text
//! client → server   {"type":"input","data":"ls\n"}
//!                   {"type":"resize","cols":120,"rows":40}
//! server → client   {"type":"output","data":"..."}
//!                   {"type":"closed","reason":"exit 0"}
//!                   {"type":"error","message":"..."}
//! ```
//!
//! Inbound frames that are not JSON objects are treated as raw terminal
//! output.

use serde::{Deserialize, Serialize};

/// Message sent to the server.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum ClientMessage {
    /// Keystrokes or pasted text.
    Input {
        /// Text to write to the terminal.
        data: String,
    },
    /// Terminal dimensions changed.
    Resize {
        /// Columns.
        cols: u16,
        /// Rows.
        rows: u16,
    },
}

impl ClientMessage {
    /// Encode as a JSON text frame.
    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(self)
    }
}

/// Message received from the server.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum ServerMessage {
    /// Terminal output.
    Output {
        /// Output text.
        data: String,
    },
    /// The session ended.
    Closed {
        /// Why the session ended.
        #[serde(default)]
        reason: Option<String>,
    },
    /// The server reported an error.
    Error {
        /// Error description.
        #[serde(default)]
        message: String,
    },
}

/// Result of decoding an inbound text frame.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum InboundFrame {
    /// A known message.
    Message(ServerMessage),
    /// A JSON object with a type this client does not know.
    Unrecognized(String),
}

/// Decode an inbound text frame.
///
/// Raw (non-object) frames become [`ServerMessage::Output`]. Objects whose
/// type is unknown or whose fields do not match are returned as
/// [`InboundFrame::Unrecognized`].
pub fn parse_inbound(text: &str) -> InboundFrame {
    let value: serde_json::Value = match serde_json::from_str(text) {
        Ok(value @ serde_json::Value::Object(_)) => value,
        _ => {
            return InboundFrame::Message(ServerMessage::Output {
                data: text.to_string(),
            });
        }
    };
    match serde_json::from_value::<ServerMessage>(value) {
        Ok(message) => InboundFrame::Message(message),
        Err(_) => InboundFrame::Unrecognized(text.to_string()),
    }
}

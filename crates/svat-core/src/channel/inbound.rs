//! Inbound channel payloads.

use serde_json::Value;

/// A non-terminal item delivered on a [`MessageStream`](super::MessageStream).
#[derive(Debug, Clone, PartialEq)]
pub enum Inbound {
    /// A JSON payload from the remote side.
    Message(Value),
    /// An error reported in-band by the server, or a frame that did not
    /// decode. The channel stays open.
    Error(String),
}

impl Inbound {
    /// Decode a text frame.
    ///
    /// Frames of the form `{"error": "..."}` become [`Inbound::Error`];
    /// anything else that is valid JSON becomes [`Inbound::Message`].
    pub fn from_text(text: &str) -> Self {
        match serde_json::from_str::<Value>(text) {
            Ok(value) => match value.get("error") {
                Some(error) => Inbound::Error(match error {
                    Value::String(s) => s.clone(),
                    other => other.to_string(),
                }),
                None => Inbound::Message(value),
            },
            Err(e) => Inbound::Error(format!("undecodable frame: {}", e)),
        }
    }
}

//! Typed protocol events.
//!
//! Each frame on the wire is a JSON object with a `type` discriminator:
//!
//! ```text
//! {"type":"status","content":"Retrieving sources..."}
//! {"type":"token","content":"OAuth is"}
//! {"type":"citation","number":1,"document_id":"doc-1","document_name":"Guide",...}
//! {"type":"error","message":"LLM timeout","kind":"timeout"}
//! {"type":"done","confidence":0.92}
//! ```

use serde::{Deserialize, Serialize};

use crate::citation::Citation;

/// Frame types understood by this protocol version.
pub const KNOWN_FRAME_TYPES: &[&str] = &["status", "token", "citation", "error", "done"];

/// One event from the generation backend.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum ProtocolEvent {
    /// Human-readable progress update
    Status {
        #[serde(rename = "content")]
        text: String,
    },
    /// Generated text fragment
    Token {
        #[serde(rename = "content")]
        text: String,
    },
    /// Citation metadata for a numbered marker
    Citation(Citation),
    /// Terminal failure reported by the backend
    Error {
        message: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        kind: Option<String>,
    },
    /// Terminal success
    Done {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        confidence: Option<f32>,
    },
}

impl ProtocolEvent {
    /// Create a status event.
    pub fn status(text: impl Into<String>) -> Self {
        Self::Status { text: text.into() }
    }

    /// Create a token event.
    pub fn token(text: impl Into<String>) -> Self {
        Self::Token { text: text.into() }
    }

    /// Create an error event.
    pub fn error(message: impl Into<String>, kind: Option<&str>) -> Self {
        Self::Error {
            message: message.into(),
            kind: kind.map(String::from),
        }
    }

    /// Create a done event.
    pub fn done(confidence: Option<f32>) -> Self {
        Self::Done { confidence }
    }

    /// Whether this event closes a session.
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Error { .. } | Self::Done { .. })
    }

    /// Wire name of the event type.
    pub fn kind_name(&self) -> &'static str {
        match self {
            Self::Status { .. } => "status",
            Self::Token { .. } => "token",
            Self::Citation(_) => "citation",
            Self::Error { .. } => "error",
            Self::Done { .. } => "done",
        }
    }

    /// Encode as a single newline-terminated frame.
    pub fn to_frame(&self) -> Result<String, serde_json::Error> {
        let mut line = serde_json::to_string(self)?;
        line.push('\n');
        Ok(line)
    }
}

//! Push Channel Envelopes
//!
//! Envelopes are the unit of data delivered over the push channel. Each one
//! carries a `kind` tag and an opaque text payload, and nothing else: there is
//! no request identifier on the wire, so correlating an envelope with the
//! request that caused it is left to the [`correlator`](crate::correlator).
//!
//! # Wire Format
//!
//! ```text
//! {"type": "chat" | "thinking" | "deep_thinking" | "status" | "error" | "notification",
//!  "content": "<text>",
//!  "timestamp": "<optional text>"}
//! ```
//!
//! Envelopes whose `type` is not recognized are ignored rather than treated as
//! malformed, so the server can introduce new kinds without breaking clients.

use std::fmt;

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Classification of an envelope
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum EnvelopeKind {
    /// The terminal answer for the outstanding request (`chat` on the wire)
    Answer,
    /// One discrete reasoning update (`thinking` on the wire)
    ThinkingStep,
    /// A fragment of an extended reasoning block (`deep_thinking` on the wire)
    DeepThinkingChunk,
    /// Backend status text
    Status,
    /// Backend error text
    Error,
    /// Out-of-band notification text
    Notification,
}

impl EnvelopeKind {
    /// Map a wire `type` tag to a kind
    ///
    /// Returns `None` for tags this client does not understand.
    #[must_use]
    pub fn from_wire(tag: &str) -> Option<Self> {
        match tag {
            "chat" => Some(Self::Answer),
            "thinking" => Some(Self::ThinkingStep),
            "deep_thinking" => Some(Self::DeepThinkingChunk),
            "status" => Some(Self::Status),
            "error" => Some(Self::Error),
            "notification" => Some(Self::Notification),
            _ => None,
        }
    }

    /// The wire `type` tag for this kind
    #[must_use]
    pub fn wire_tag(self) -> &'static str {
        match self {
            Self::Answer => "chat",
            Self::ThinkingStep => "thinking",
            Self::DeepThinkingChunk => "deep_thinking",
            Self::Status => "status",
            Self::Error => "error",
            Self::Notification => "notification",
        }
    }

    /// Whether this kind contributes to a session's thinking timeline
    #[must_use]
    pub fn is_thinking(self) -> bool {
        matches!(self, Self::ThinkingStep | Self::DeepThinkingChunk)
    }

    /// Whether this kind bypasses accumulation and goes to the status stream
    #[must_use]
    pub fn is_status(self) -> bool {
        matches!(self, Self::Status | Self::Error | Self::Notification)
    }
}

impl fmt::Display for EnvelopeKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.wire_tag())
    }
}

/// Errors produced while decoding or encoding envelopes
#[derive(Debug, Error)]
pub enum EnvelopeError {
    /// The payload was not a valid JSON envelope
    #[error("Malformed envelope: {0}")]
    Malformed(#[from] serde_json::Error),

    /// A known envelope kind arrived without its `content` field
    #[error("Malformed envelope: {0} without content")]
    MissingContent(EnvelopeKind),
}

/// One decoded unit from the push channel
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Envelope {
    /// What this envelope represents
    pub kind: EnvelopeKind,
    /// Opaque text content
    pub payload: String,
    /// Server-provided timestamp, passed through untouched
    pub timestamp: Option<String>,
}

/// JSON shape of an envelope on the wire
#[derive(Debug, Serialize, Deserialize)]
struct WireEnvelope {
    #[serde(rename = "type")]
    kind: String,
    #[serde(default)]
    content: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    timestamp: Option<String>,
}

impl Envelope {
    /// Create an envelope without a timestamp
    pub fn new(kind: EnvelopeKind, payload: impl Into<String>) -> Self {
        Self {
            kind,
            payload: payload.into(),
            timestamp: None,
        }
    }

    /// Shorthand for an [`EnvelopeKind::Answer`] envelope
    pub fn answer(payload: impl Into<String>) -> Self {
        Self::new(EnvelopeKind::Answer, payload)
    }

    /// Shorthand for an [`EnvelopeKind::ThinkingStep`] envelope
    pub fn thinking(payload: impl Into<String>) -> Self {
        Self::new(EnvelopeKind::ThinkingStep, payload)
    }

    /// Shorthand for an [`EnvelopeKind::DeepThinkingChunk`] envelope
    pub fn deep_thinking(payload: impl Into<String>) -> Self {
        Self::new(EnvelopeKind::DeepThinkingChunk, payload)
    }

    /// Shorthand for an [`EnvelopeKind::Status`] envelope
    pub fn status(payload: impl Into<String>) -> Self {
        Self::new(EnvelopeKind::Status, payload)
    }

    /// Attach a server timestamp
    #[must_use]
    pub fn with_timestamp(mut self, timestamp: impl Into<String>) -> Self {
        self.timestamp = Some(timestamp.into());
        self
    }

    /// Decode a text frame into an envelope
    ///
    /// Returns `Ok(None)` when the frame is well-formed but carries a `type`
    /// this client does not know.
    ///
    /// # Errors
    ///
    /// Returns [`EnvelopeError::Malformed`] when the frame is not a JSON object
    /// with a string `type`, and [`EnvelopeError::MissingContent`] when a known
    /// kind has no `content`. The tag is checked first, so unknown kinds never
    /// fail on their payload.
    pub fn decode(text: &str) -> Result<Option<Self>, EnvelopeError> {
        let wire: WireEnvelope = serde_json::from_str(text)?;
        let Some(kind) = EnvelopeKind::from_wire(&wire.kind) else {
            return Ok(None);
        };
        let payload = wire.content.ok_or(EnvelopeError::MissingContent(kind))?;
        Ok(Some(Self {
            kind,
            payload,
            timestamp: wire.timestamp,
        }))
    }

    /// Encode this envelope as a JSON text frame
    ///
    /// # Errors
    ///
    /// Returns [`EnvelopeError::Malformed`] if serialization fails.
    pub fn encode(&self) -> Result<String, EnvelopeError> {
        let wire = WireEnvelope {
            kind: self.kind.wire_tag().to_string(),
            content: Some(self.payload.clone()),
            timestamp: self.timestamp.clone(),
        };
        Ok(serde_json::to_string(&wire)?)
    }
}

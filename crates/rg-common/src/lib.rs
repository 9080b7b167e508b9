use serde::{Deserialize, Deserializer, Serialize};
use serde_json::{Map, Value};
use thiserror::Error;
use utoipa::ToSchema;

pub mod logging;

/// Topic used when a message arrives without one.
pub const DEFAULT_TOPIC: &str = "general";

// ============================================================================
// Broadcast Envelope
// ============================================================================

/// The application payload relayed from the queue to every connected client.
///
/// Serialized in camelCase so the browser sees `senderId`. Keys the gateway
/// does not know about are carried through untouched in `extra`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BroadcastEnvelope {
    pub text: String,
    #[serde(default = "default_topic", deserialize_with = "topic_or_default")]
    pub topic: String,
    /// Stamped by the producer at send time; never filled in on receive.
    /// Kept as raw JSON so other producers' formats relay unchanged.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timestamp: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sender_id: Option<String>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl BroadcastEnvelope {
    pub fn new(text: impl Into<String>, topic: Option<&str>) -> Self {
        Self {
            text: text.into(),
            topic: normalize_topic(topic),
            timestamp: None,
            sender_id: None,
            extra: Map::new(),
        }
    }

    /// Parse a raw queue message body.
    ///
    /// The body must be a JSON object with a string `text` field.
    pub fn from_body(body: &str) -> Result<Self, EnvelopeError> {
        Ok(serde_json::from_str(body)?)
    }
}

#[derive(Error, Debug)]
pub enum EnvelopeError {
    #[error("Malformed message body: {0}")]
    Malformed(#[from] serde_json::Error),
}

fn default_topic() -> String {
    DEFAULT_TOPIC.to_string()
}

fn topic_or_default<'de, D>(deserializer: D) -> Result<String, D::Error>
where
    D: Deserializer<'de>,
{
    let topic = Option::<String>::deserialize(deserializer)?;
    Ok(normalize_topic(topic.as_deref()))
}

/// Trim a topic, falling back to [`DEFAULT_TOPIC`] when it is missing or blank.
pub fn normalize_topic(topic: Option<&str>) -> String {
    match topic.map(str::trim) {
        Some(t) if !t.is_empty() => t.to_string(),
        _ => default_topic(),
    }
}

// ============================================================================
// Real-time Channel Events
// ============================================================================

/// Payload of a client-originated `send-message` event.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize, ToSchema)]
pub struct SendMessagePayload {
    #[serde(default)]
    pub text: Option<String>,
    #[serde(default)]
    pub topic: Option<String>,
}

/// Frames sent by browser clients over the socket.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(tag = "event", content = "data", rename_all = "kebab-case")]
pub enum ClientEvent {
    SendMessage(SendMessagePayload),
}

/// Frames pushed by the gateway to browser clients.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "event", content = "data", rename_all = "kebab-case")]
pub enum ServerEvent {
    Message(BroadcastEnvelope),
    Connected {
        #[serde(rename = "sessionId")]
        session_id: String,
    },
    Error {
        message: String,
    },
}

impl ServerEvent {
    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(self)
    }
}

// ============================================================================
// Health Types
// ============================================================================

/// Overall gateway health
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum HealthStatus {
    /// Poller running and accepting connections
    Healthy,
    /// Poller stopped; HTTP still answering
    Degraded,
}

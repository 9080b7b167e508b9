use std::collections::HashMap;

use async_trait::async_trait;
use chrono::{DateTime, SecondsFormat, Utc};
use serde_json::{Map, Value};

pub mod error;

#[cfg(feature = "sqs")]
pub mod sqs;

pub use error::QueueError;

pub type Result<T> = std::result::Result<T, QueueError>;

/// Message attribute carrying the topic, so it can be filtered without
/// parsing the body.
pub const TOPIC_ATTRIBUTE: &str = "topic";

/// Largest batch a single receive may ask for (SQS limit).
pub const MAX_RECEIVE_BATCH: u32 = 10;

/// A message received from the queue.
///
/// `receipt_handle` belongs to this delivery only: it goes stale after a
/// delete or once the visibility timeout expires and the message is handed
/// out again.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QueueMessage {
    pub message_id: Option<String>,
    pub body: String,
    pub receipt_handle: String,
    pub attributes: HashMap<String, String>,
}

impl QueueMessage {
    pub fn new(body: impl Into<String>, receipt_handle: impl Into<String>) -> Self {
        Self {
            message_id: None,
            body: body.into(),
            receipt_handle: receipt_handle.into(),
            attributes: HashMap::new(),
        }
    }

    pub fn topic_attribute(&self) -> Option<&str> {
        self.attributes.get(TOPIC_ATTRIBUTE).map(String::as_str)
    }
}

/// Send/receive/delete operations against the managed queue.
#[async_trait]
pub trait QueueClient: Send + Sync {
    /// Queue identifier used in logs
    fn identifier(&self) -> &str;

    /// Enqueue `{...payload, topic, timestamp}` and return the broker message id.
    async fn send(&self, payload: Map<String, Value>, topic: &str) -> Result<String>;

    /// Long-poll for up to `max_messages` (clamped to 1..=10).
    ///
    /// An empty vector means the wait window elapsed with nothing to deliver.
    async fn receive(&self, max_messages: u32) -> Result<Vec<QueueMessage>>;

    /// Remove a delivered message. Failures are safe to ignore; the message
    /// simply becomes visible again.
    async fn delete(&self, receipt_handle: &str) -> Result<()>;
}

/// Clamp a requested batch size into the range the queue accepts.
pub fn clamp_batch_size(max_messages: u32) -> u32 {
    max_messages.clamp(1, MAX_RECEIVE_BATCH)
}

/// Build the JSON body for an outgoing message.
///
/// `topic` and `timestamp` always overwrite same-named payload keys; the
/// timestamp is the send time in RFC 3339 (UTC, millisecond precision).
pub fn build_message_body(
    mut payload: Map<String, Value>,
    topic: &str,
    now: DateTime<Utc>,
) -> Result<String> {
    payload.insert(TOPIC_ATTRIBUTE.to_string(), Value::String(topic.to_string()));
    payload.insert(
        "timestamp".to_string(),
        Value::String(now.to_rfc3339_opts(SecondsFormat::Millis, true)),
    );
    Ok(serde_json::to_string(&Value::Object(payload))?)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use serde_json::json;

    fn payload(value: Value) -> Map<String, Value> {
        match value {
            Value::Object(map) => map,
            _ => panic!("payload must be an object"),
        }
    }

    #[test]
    fn test_body_adds_topic_and_timestamp() {
        let now = Utc.with_ymd_and_hms(2024, 5, 1, 12, 30, 0).unwrap();
        let body = build_message_body(payload(json!({"text": "hi"})), "t1", now).unwrap();
        let value: Value = serde_json::from_str(&body).unwrap();

        assert_eq!(value["text"], "hi");
        assert_eq!(value["topic"], "t1");
        assert_eq!(value["timestamp"], "2024-05-01T12:30:00.000Z");
    }

    #[test]
    fn test_body_overrides_payload_topic_and_timestamp() {
        let now = Utc.with_ymd_and_hms(2024, 5, 1, 12, 30, 0).unwrap();
        let body = build_message_body(
            payload(json!({"text": "hi", "topic": "spoofed", "timestamp": "1999", "senderId": "s1"})),
            "real",
            now,
        )
        .unwrap();
        let value: Value = serde_json::from_str(&body).unwrap();

        assert_eq!(value["topic"], "real");
        assert_eq!(value["timestamp"], "2024-05-01T12:30:00.000Z");
        assert_eq!(value["senderId"], "s1");
    }

    #[test]
    fn test_clamp_batch_size() {
        assert_eq!(clamp_batch_size(0), 1);
        assert_eq!(clamp_batch_size(5), 5);
        assert_eq!(clamp_batch_size(50), 10);
    }

    #[test]
    fn test_topic_attribute() {
        let mut message = QueueMessage::new("{}", "r1");
        assert!(message.topic_attribute().is_none());
        message.attributes.insert(TOPIC_ATTRIBUTE.to_string(), "t1".to_string());
        assert_eq!(message.topic_attribute(), Some("t1"));
    }
}

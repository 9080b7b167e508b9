//! Inbound path: HTTP and socket clients into the queue

use std::sync::Arc;

use serde_json::{Map, Value};
use tracing::info;

use rg_common::normalize_topic;
use rg_queue::QueueClient;

use crate::RelayError;

/// Upper bound on `text`, well inside the SQS 256 KiB body limit.
pub const MAX_TEXT_BYTES: usize = 64 * 1024;

/// A message to enqueue
#[derive(Debug, Clone, Default)]
pub struct SendMessageRequest {
    pub text: Option<String>,
    pub topic: Option<String>,
    /// Set for socket clients; absent for HTTP publishes
    pub sender_id: Option<String>,
}

/// Result of a successful enqueue
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SentMessage {
    pub message_id: String,
    pub topic: String,
}

/// Validates messages and hands them to the queue. Nothing sent here is
/// delivered locally; clients see it only once the poller relays it back.
#[derive(Clone)]
pub struct MessageProducer {
    queue: Arc<dyn QueueClient>,
}

impl MessageProducer {
    pub fn new(queue: Arc<dyn QueueClient>) -> Self {
        Self { queue }
    }

    pub async fn send(&self, request: SendMessageRequest) -> Result<SentMessage, RelayError> {
        let text = request
            .text
            .filter(|text| !text.trim().is_empty())
            .ok_or_else(|| RelayError::Validation("text is required".to_string()))?;

        if text.len() > MAX_TEXT_BYTES {
            return Err(RelayError::Validation(format!(
                "text exceeds {} bytes",
                MAX_TEXT_BYTES
            )));
        }

        let topic = normalize_topic(request.topic.as_deref());

        let mut payload = Map::new();
        payload.insert("text".to_string(), Value::String(text));
        if let Some(sender_id) = &request.sender_id {
            payload.insert("senderId".to_string(), Value::String(sender_id.clone()));
        }

        let message_id = match self.queue.send(payload, &topic).await {
            Ok(id) => id,
            Err(e) => {
                metrics::counter!("relay.messages.send_failed_total").increment(1);
                return Err(e.into());
            }
        };

        metrics::counter!("relay.messages.sent_total").increment(1);
        info!(
            queue = %self.queue.identifier(),
            message_id = %message_id,
            topic = %topic,
            sender_id = ?request.sender_id,
            "Message queued"
        );

        Ok(SentMessage { message_id, topic })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use rg_queue::QueueMessage;
    use std::sync::Mutex;
    use tokio_test::{assert_err, assert_ok, block_on};

    #[derive(Default)]
    struct CapturingQueue {
        sent: Mutex<Vec<(Map<String, Value>, String)>>,
    }

    #[async_trait]
    impl QueueClient for CapturingQueue {
        fn identifier(&self) -> &str {
            "capture"
        }

        async fn send(&self, payload: Map<String, Value>, topic: &str) -> rg_queue::Result<String> {
            self.sent.lock().unwrap().push((payload, topic.to_string()));
            Ok("m-1".to_string())
        }

        async fn receive(&self, _max_messages: u32) -> rg_queue::Result<Vec<QueueMessage>> {
            Ok(Vec::new())
        }

        async fn delete(&self, _receipt_handle: &str) -> rg_queue::Result<()> {
            Ok(())
        }
    }

    fn request(text: Option<&str>, topic: Option<&str>, sender_id: Option<&str>) -> SendMessageRequest {
        SendMessageRequest {
            text: text.map(str::to_string),
            topic: topic.map(str::to_string),
            sender_id: sender_id.map(str::to_string),
        }
    }

    #[test]
    fn test_send_builds_payload() {
        let queue = Arc::new(CapturingQueue::default());
        let producer = MessageProducer::new(queue.clone());

        let sent = assert_ok!(block_on(producer.send(request(Some("hi"), None, Some("session_1")))));
        assert_eq!(sent, SentMessage { message_id: "m-1".to_string(), topic: "general".to_string() });

        let recorded = queue.sent.lock().unwrap();
        assert_eq!(recorded[0].0["text"], "hi");
        assert_eq!(recorded[0].0["senderId"], "session_1");
        assert_eq!(recorded[0].1, "general");
    }

    #[test]
    fn test_send_validates_text() {
        let queue = Arc::new(CapturingQueue::default());
        let producer = MessageProducer::new(queue.clone());

        assert_err!(block_on(producer.send(request(None, Some("t"), None))));
        assert_err!(block_on(producer.send(request(Some(" \n"), None, None))));

        let too_long = "x".repeat(MAX_TEXT_BYTES + 1);
        let err = block_on(producer.send(request(Some(&too_long), None, None))).unwrap_err();
        assert!(matches!(err, RelayError::Validation(_)));

        assert!(queue.sent.lock().unwrap().is_empty());
    }
}

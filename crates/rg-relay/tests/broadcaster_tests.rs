//! Broadcaster and client send path tests

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use parking_lot::Mutex;
use serde_json::{Map, Value};
use tokio::sync::mpsc;

use rg_common::{BroadcastEnvelope, SendMessagePayload};
use rg_queue::{QueueClient, QueueError, QueueMessage};
use rg_relay::{handle_client_frame, Broadcaster, MessageProducer, RelayError, SessionRegistry};

/// Queue that records sends and can be switched into a failing state
struct RecordingQueue {
    sent: Mutex<Vec<(Map<String, Value>, String)>>,
    fail_sends: AtomicBool,
}

impl RecordingQueue {
    fn new() -> Self {
        Self {
            sent: Mutex::new(Vec::new()),
            fail_sends: AtomicBool::new(false),
        }
    }

    fn sent(&self) -> Vec<(Map<String, Value>, String)> {
        self.sent.lock().clone()
    }
}

#[async_trait]
impl QueueClient for RecordingQueue {
    fn identifier(&self) -> &str {
        "recording-queue"
    }

    async fn send(&self, payload: Map<String, Value>, topic: &str) -> rg_queue::Result<String> {
        if self.fail_sends.load(Ordering::SeqCst) {
            return Err(QueueError::Sqs("connection refused".to_string()));
        }
        let mut sent = self.sent.lock();
        sent.push((payload, topic.to_string()));
        Ok(format!("msg-{}", sent.len()))
    }

    async fn receive(&self, _max_messages: u32) -> rg_queue::Result<Vec<QueueMessage>> {
        Ok(Vec::new())
    }

    async fn delete(&self, _receipt_handle: &str) -> rg_queue::Result<()> {
        Ok(())
    }
}

fn setup() -> (Arc<RecordingQueue>, Arc<SessionRegistry>, Broadcaster) {
    rg_common::logging::init_test_logging();
    let queue = Arc::new(RecordingQueue::new());
    let registry = Arc::new(SessionRegistry::new(16));
    let broadcaster = Broadcaster::new(Arc::clone(&registry), MessageProducer::new(queue.clone()));
    (queue, registry, broadcaster)
}

fn next_frame(rx: &mut mpsc::Receiver<String>) -> Option<Value> {
    rx.try_recv().ok().map(|frame| serde_json::from_str(&frame).unwrap())
}

fn payload(text: Option<&str>, topic: Option<&str>) -> SendMessagePayload {
    SendMessagePayload {
        text: text.map(str::to_string),
        topic: topic.map(str::to_string),
    }
}

#[tokio::test]
async fn test_client_send_is_tagged_and_not_echoed() {
    let (queue, registry, broadcaster) = setup();
    let (sender, mut rx_sender) = registry.register();
    let (_other, mut rx_other) = registry.register();

    let sent = broadcaster
        .on_client_send(&sender, payload(Some("hello"), Some("t1")))
        .await
        .unwrap();

    assert_eq!(sent.topic, "t1");
    let recorded = queue.sent();
    assert_eq!(recorded.len(), 1);
    let (body, topic) = &recorded[0];
    assert_eq!(topic, "t1");
    assert_eq!(body["text"], "hello");
    assert_eq!(body["senderId"], sender.as_str());

    // Delivery only happens once the poller relays it back
    assert!(next_frame(&mut rx_sender).is_none());
    assert!(next_frame(&mut rx_other).is_none());
}

#[tokio::test]
async fn test_client_send_defaults_topic() {
    let (queue, registry, broadcaster) = setup();
    let (sender, _rx) = registry.register();

    broadcaster
        .on_client_send(&sender, payload(Some("hi"), Some("   ")))
        .await
        .unwrap();
    broadcaster.on_client_send(&sender, payload(Some("hi"), None)).await.unwrap();

    let topics: Vec<String> = queue.sent().into_iter().map(|(_, topic)| topic).collect();
    assert_eq!(topics, vec!["general", "general"]);
}

#[tokio::test]
async fn test_blank_text_is_rejected_with_error_event() {
    let (queue, registry, broadcaster) = setup();
    let (sender, mut rx_sender) = registry.register();
    let (_other, mut rx_other) = registry.register();

    let err = broadcaster
        .on_client_send(&sender, payload(Some("  "), None))
        .await
        .unwrap_err();

    assert!(matches!(err, RelayError::Validation(_)));
    assert!(queue.sent().is_empty());

    let frame = next_frame(&mut rx_sender).unwrap();
    assert_eq!(frame["event"], "error");
    assert!(frame["data"]["message"].as_str().unwrap().contains("text is required"));
    assert!(next_frame(&mut rx_other).is_none());
}

#[tokio::test]
async fn test_queue_failure_notifies_sender_only() {
    let (queue, registry, broadcaster) = setup();
    queue.fail_sends.store(true, Ordering::SeqCst);
    let (sender, mut rx_sender) = registry.register();
    let (_other, mut rx_other) = registry.register();

    let err = broadcaster
        .on_client_send(&sender, payload(Some("hello"), None))
        .await
        .unwrap_err();

    assert!(matches!(err, RelayError::Queue(_)));
    assert_eq!(next_frame(&mut rx_sender).unwrap()["event"], "error");
    assert!(next_frame(&mut rx_other).is_none());
    assert_eq!(registry.count(), 2);
}

#[tokio::test]
async fn test_publish_with_no_sessions() {
    let (_queue, _registry, broadcaster) = setup();
    let delivered = broadcaster.publish(&BroadcastEnvelope::new("hi", None)).unwrap();
    assert_eq!(delivered, 0);
}

#[tokio::test]
async fn test_publish_frame_shape() {
    let (_queue, registry, broadcaster) = setup();
    let (_id, mut rx) = registry.register();

    let mut envelope = BroadcastEnvelope::new("hi", Some("news"));
    envelope.sender_id = Some("session_x".to_string());
    assert_eq!(broadcaster.publish(&envelope).unwrap(), 1);

    let frame = next_frame(&mut rx).unwrap();
    assert_eq!(frame["event"], "message");
    assert_eq!(frame["data"]["text"], "hi");
    assert_eq!(frame["data"]["topic"], "news");
    assert_eq!(frame["data"]["senderId"], "session_x");
}

#[tokio::test]
async fn test_send_message_frame_is_queued() {
    let (queue, registry, broadcaster) = setup();
    let (sender, mut rx) = registry.register();

    handle_client_frame(
        &broadcaster,
        &sender,
        r#"{"event":"send-message","data":{"text":"from socket","topic":"chat"}}"#,
    )
    .await;

    let recorded = queue.sent();
    assert_eq!(recorded.len(), 1);
    assert_eq!(recorded[0].0["text"], "from socket");
    assert_eq!(recorded[0].1, "chat");
    assert!(next_frame(&mut rx).is_none());
}

#[tokio::test]
async fn test_unknown_frame_gets_error_event() {
    let (queue, registry, broadcaster) = setup();
    let (sender, mut rx) = registry.register();

    handle_client_frame(&broadcaster, &sender, r#"{"event":"dance","data":{}}"#).await;
    handle_client_frame(&broadcaster, &sender, "not even json").await;

    assert!(queue.sent().is_empty());
    assert_eq!(next_frame(&mut rx).unwrap()["event"], "error");
    assert_eq!(next_frame(&mut rx).unwrap()["event"], "error");
    assert!(registry.session_ids().contains(&sender));
}

//! Queue-to-socket relay
//!
//! Long-polls the queue, broadcasts each message body to every connected
//! session and deletes the message only after it was published. Anything
//! that fails before the delete is left for the queue to redeliver once its
//! visibility timeout expires.

use std::sync::atomic::{AtomicBool, AtomicI64, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::Serialize;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, trace, warn};
use utoipa::ToSchema;

use rg_common::BroadcastEnvelope;
use rg_config::RelayConfig;
use rg_queue::{QueueClient, QueueMessage};

use crate::broadcaster::Broadcaster;

/// Poller tuning
#[derive(Debug, Clone)]
pub struct PollerConfig {
    /// Messages requested per receive
    pub batch_size: u32,
    /// Sleep after a failed receive
    pub error_backoff: Duration,
}

impl Default for PollerConfig {
    fn default() -> Self {
        Self {
            batch_size: 5,
            error_backoff: Duration::from_secs(5),
        }
    }
}

impl From<&RelayConfig> for PollerConfig {
    fn from(config: &RelayConfig) -> Self {
        Self {
            batch_size: config.poll_batch_size,
            error_backoff: Duration::from_secs(config.error_backoff_seconds),
        }
    }
}

/// What a single receive cycle did
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PollOutcome {
    /// Wait window elapsed with nothing to deliver
    Empty,
    /// Receive failed; the caller backs off
    ReceiveFailed,
    Processed {
        received: usize,
        published: usize,
        deleted: usize,
    },
}

/// Outcome for one received message
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MessageOutcome {
    /// Published and removed from the queue
    Deleted,
    /// Published, delete failed; the message will be redelivered
    DeleteFailed,
    /// Not published; left on the queue
    Skipped,
}

/// Running counters for the relay loop
#[derive(Debug, Default)]
pub struct RelayStats {
    running: AtomicBool,
    polls: AtomicU64,
    received: AtomicU64,
    published: AtomicU64,
    deleted: AtomicU64,
    parse_failures: AtomicU64,
    publish_failures: AtomicU64,
    delete_failures: AtomicU64,
    receive_errors: AtomicU64,
    /// Unix millis of the last receive attempt, 0 before the first
    last_poll_at_ms: AtomicI64,
}

impl RelayStats {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::SeqCst)
    }

    pub fn set_running(&self, running: bool) {
        self.running.store(running, Ordering::SeqCst);
    }

    pub fn snapshot(&self) -> RelayStatsSnapshot {
        let last_poll_ms = self.last_poll_at_ms.load(Ordering::Relaxed);
        RelayStatsSnapshot {
            running: self.is_running(),
            polls: self.polls.load(Ordering::Relaxed),
            received: self.received.load(Ordering::Relaxed),
            published: self.published.load(Ordering::Relaxed),
            deleted: self.deleted.load(Ordering::Relaxed),
            parse_failures: self.parse_failures.load(Ordering::Relaxed),
            publish_failures: self.publish_failures.load(Ordering::Relaxed),
            delete_failures: self.delete_failures.load(Ordering::Relaxed),
            receive_errors: self.receive_errors.load(Ordering::Relaxed),
            last_poll_at: (last_poll_ms > 0)
                .then(|| DateTime::from_timestamp_millis(last_poll_ms))
                .flatten(),
        }
    }

    fn record_poll(&self) {
        self.polls.fetch_add(1, Ordering::Relaxed);
        self.last_poll_at_ms
            .store(Utc::now().timestamp_millis(), Ordering::Relaxed);
    }
}

/// Point-in-time copy of [`RelayStats`]
#[derive(Debug, Clone, PartialEq, Eq, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct RelayStatsSnapshot {
    pub running: bool,
    pub polls: u64,
    pub received: u64,
    pub published: u64,
    pub deleted: u64,
    pub parse_failures: u64,
    pub publish_failures: u64,
    pub delete_failures: u64,
    pub receive_errors: u64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_poll_at: Option<DateTime<Utc>>,
}

/// Background relay from the queue to the broadcaster
pub struct QueuePoller {
    queue: Arc<dyn QueueClient>,
    broadcaster: Arc<Broadcaster>,
    config: PollerConfig,
    stats: Arc<RelayStats>,
}

impl QueuePoller {
    pub fn new(queue: Arc<dyn QueueClient>, broadcaster: Arc<Broadcaster>, config: PollerConfig) -> Self {
        Self {
            queue,
            broadcaster,
            config,
            stats: Arc::new(RelayStats::new()),
        }
    }

    /// Share an existing stats handle (the HTTP layer reads the same one).
    pub fn with_stats(mut self, stats: Arc<RelayStats>) -> Self {
        self.stats = stats;
        self
    }

    pub fn stats(&self) -> Arc<RelayStats> {
        Arc::clone(&self.stats)
    }

    /// Poll until `shutdown` is cancelled.
    ///
    /// Cancellation is checked between cycles and during the error backoff;
    /// an in-flight receive is allowed to finish.
    pub async fn run(&self, shutdown: CancellationToken) {
        info!(
            queue = %self.queue.identifier(),
            batch_size = self.config.batch_size,
            "Queue poller started"
        );
        self.stats.set_running(true);

        while !shutdown.is_cancelled() {
            match self.poll_once().await {
                PollOutcome::ReceiveFailed => {
                    tokio::select! {
                        _ = tokio::time::sleep(self.config.error_backoff) => {}
                        _ = shutdown.cancelled() => break,
                    }
                }
                PollOutcome::Empty => {
                    trace!(queue = %self.queue.identifier(), "No messages");
                }
                PollOutcome::Processed { received, published, deleted } => {
                    debug!(
                        queue = %self.queue.identifier(),
                        received,
                        published,
                        deleted,
                        "Batch relayed"
                    );
                }
            }
        }

        self.stats.set_running(false);
        info!(queue = %self.queue.identifier(), "Queue poller stopped");
    }

    /// One receive and the processing of whatever it returned.
    pub async fn poll_once(&self) -> PollOutcome {
        self.stats.record_poll();

        let messages = match self.queue.receive(self.config.batch_size).await {
            Ok(messages) => messages,
            Err(e) => {
                self.stats.receive_errors.fetch_add(1, Ordering::Relaxed);
                metrics::counter!("relay.receive_errors_total").increment(1);
                error!(
                    queue = %self.queue.identifier(),
                    error = %e,
                    backoff_ms = self.config.error_backoff.as_millis() as u64,
                    "Failed to receive messages"
                );
                return PollOutcome::ReceiveFailed;
            }
        };

        if messages.is_empty() {
            return PollOutcome::Empty;
        }

        let received = messages.len();
        self.stats.received.fetch_add(received as u64, Ordering::Relaxed);
        metrics::counter!("relay.messages.received_total").increment(received as u64);

        let mut published = 0;
        let mut deleted = 0;
        for message in messages {
            match self.handle_message(message).await {
                MessageOutcome::Deleted => {
                    published += 1;
                    deleted += 1;
                }
                MessageOutcome::DeleteFailed => published += 1,
                MessageOutcome::Skipped => {}
            }
        }

        PollOutcome::Processed { received, published, deleted }
    }

    /// Parse, publish, then delete a single message.
    pub async fn handle_message(&self, message: QueueMessage) -> MessageOutcome {
        let envelope = match BroadcastEnvelope::from_body(&message.body) {
            Ok(envelope) => envelope,
            Err(e) => {
                self.stats.parse_failures.fetch_add(1, Ordering::Relaxed);
                metrics::counter!("relay.messages.parse_failed_total").increment(1);
                warn!(
                    queue = %self.queue.identifier(),
                    message_id = ?message.message_id,
                    topic = ?message.topic_attribute(),
                    error = %e,
                    "Skipping unparseable message"
                );
                return MessageOutcome::Skipped;
            }
        };

        match self.broadcaster.publish(&envelope) {
            Ok(sessions) => {
                self.stats.published.fetch_add(1, Ordering::Relaxed);
                metrics::counter!("relay.messages.published_total").increment(1);
                debug!(
                    message_id = ?message.message_id,
                    topic = %envelope.topic,
                    sessions,
                    "Message published"
                );
            }
            Err(e) => {
                self.stats.publish_failures.fetch_add(1, Ordering::Relaxed);
                warn!(
                    message_id = ?message.message_id,
                    error = %e,
                    "Failed to publish message"
                );
                return MessageOutcome::Skipped;
            }
        }

        match self.queue.delete(&message.receipt_handle).await {
            Ok(()) => {
                self.stats.deleted.fetch_add(1, Ordering::Relaxed);
                metrics::counter!("relay.messages.deleted_total").increment(1);
                MessageOutcome::Deleted
            }
            Err(e) => {
                self.stats.delete_failures.fetch_add(1, Ordering::Relaxed);
                metrics::counter!("relay.messages.delete_failed_total").increment(1);
                warn!(
                    queue = %self.queue.identifier(),
                    message_id = ?message.message_id,
                    error = %e,
                    "Failed to delete message, it will be redelivered"
                );
                MessageOutcome::DeleteFailed
            }
        }
    }
}

/// Start the poller on its own task.
pub fn spawn_poller(poller: Arc<QueuePoller>, shutdown: CancellationToken) -> JoinHandle<()> {
    poller.stats.set_running(true);
    tokio::spawn(async move { poller.run(shutdown).await })
}

//! Real-time channel: fan-out to sessions and the client send path

use std::sync::Arc;

use tracing::{debug, warn};

use rg_common::{BroadcastEnvelope, SendMessagePayload, ServerEvent};

use crate::producer::{MessageProducer, SendMessageRequest, SentMessage};
use crate::session::{SessionId, SessionRegistry};
use crate::RelayError;

pub struct Broadcaster {
    registry: Arc<SessionRegistry>,
    producer: MessageProducer,
}

impl Broadcaster {
    pub fn new(registry: Arc<SessionRegistry>, producer: MessageProducer) -> Self {
        Self { registry, producer }
    }

    pub fn registry(&self) -> &Arc<SessionRegistry> {
        &self.registry
    }

    /// Push an envelope to every connected session as a `message` event.
    ///
    /// Returns how many sessions accepted the frame; zero connected sessions
    /// is still a successful publish.
    pub fn publish(&self, envelope: &BroadcastEnvelope) -> Result<usize, RelayError> {
        let frame = ServerEvent::Message(envelope.clone()).to_json()?;
        let delivered = self.registry.broadcast(&frame);

        debug!(
            topic = %envelope.topic,
            sessions = delivered,
            "Envelope broadcast"
        );
        Ok(delivered)
    }

    /// Handle a `send-message` event from a session.
    ///
    /// The payload is tagged with the sender's id and enqueued; it is not
    /// echoed to anyone directly. On failure the sender gets an `error`
    /// event and the connection stays open.
    pub async fn on_client_send(
        &self,
        session_id: &SessionId,
        payload: SendMessagePayload,
    ) -> Result<SentMessage, RelayError> {
        let request = SendMessageRequest {
            text: payload.text,
            topic: payload.topic,
            sender_id: Some(session_id.to_string()),
        };

        match self.producer.send(request).await {
            Ok(sent) => Ok(sent),
            Err(e) => {
                warn!(session_id = %session_id, error = %e, "Client send failed");
                self.notify_error(session_id, e.to_string());
                Err(e)
            }
        }
    }

    /// Send an `error` event to a single session.
    pub fn notify_error(&self, session_id: &SessionId, message: String) {
        match (ServerEvent::Error { message }).to_json() {
            Ok(frame) => {
                self.registry.send_to(session_id, frame);
            }
            Err(e) => warn!(session_id = %session_id, error = %e, "Failed to encode error event"),
        }
    }
}

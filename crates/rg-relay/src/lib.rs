//! RelayGate Relay
//!
//! The real-time half of the gateway:
//! - `poller` long-polls the queue and fans each message out to sessions
//! - `producer` validates client and HTTP messages and enqueues them
//! - `session` and `transport` own the WebSocket connections
//! - `api` exposes all of it over HTTP

pub mod api;
pub mod broadcaster;
pub mod error;
pub mod poller;
pub mod producer;
pub mod session;
pub mod transport;

pub use api::{create_router, ApiDoc, AppState};
pub use broadcaster::Broadcaster;
pub use error::RelayError;
pub use poller::{
    spawn_poller, MessageOutcome, PollOutcome, PollerConfig, QueuePoller, RelayStats,
    RelayStatsSnapshot,
};
pub use producer::{MessageProducer, SendMessageRequest, SentMessage, MAX_TEXT_BYTES};
pub use session::{SessionId, SessionRegistry};
pub use transport::{handle_client_frame, handle_socket};

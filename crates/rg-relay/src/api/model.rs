use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use utoipa::{IntoParams, ToSchema};

use rg_common::HealthStatus;

use crate::poller::RelayStatsSnapshot;

/// Request to publish a message to all connected clients (via the queue)
#[derive(Debug, Default, Deserialize, ToSchema)]
pub struct PublishMessageRequest {
    /// Message text (required, non-blank)
    #[serde(default)]
    pub text: Option<String>,
    /// Topic label (default: general)
    #[serde(default)]
    pub topic: Option<String>,
}

/// Response after a message was queued
#[derive(Debug, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct PublishMessageResponse {
    /// Broker message id
    pub message_id: String,
    pub topic: String,
    /// Status: QUEUED
    pub status: String,
}

/// Multipart form accepted by the upload endpoint
#[derive(ToSchema)]
pub struct UploadForm {
    #[schema(value_type = String, format = Binary)]
    pub file: Vec<u8>,
}

/// Stored upload plus a download URL for it
#[derive(Debug, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct UploadResponse {
    pub key: String,
    pub size: u64,
    pub content_type: String,
    pub url: String,
    pub expires_at: DateTime<Utc>,
}

/// Query for a signed download URL
#[derive(Debug, Deserialize, IntoParams)]
#[serde(rename_all = "camelCase")]
#[into_params(parameter_in = Query)]
pub struct SignedUrlQuery {
    /// Object key returned by an upload
    pub key: String,
    /// Lifetime in seconds; defaults to the configured expiry and is capped at the maximum
    pub expires_in: Option<u64>,
}

/// Error body for every failed request
#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct ErrorResponse {
    pub error: String,
    pub message: String,
}

/// Simple health response for basic health check
#[derive(Debug, Serialize, ToSchema)]
pub struct SimpleHealthResponse {
    pub status: HealthStatus,
    pub version: String,
    pub connected_sessions: usize,
}

/// Kubernetes probe response
#[derive(Debug, Serialize, ToSchema)]
pub struct ProbeResponse {
    pub status: String,
}

/// Relay loop status for the monitoring endpoint
#[derive(Debug, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct RelayStatusResponse {
    pub queue: String,
    pub connected_sessions: usize,
    pub sessions: Vec<String>,
    pub stats: RelayStatsSnapshot,
}

//! RelayGate HTTP API
//!
//! - Message publishing (into the queue)
//! - Uploads and signed download URLs
//! - WebSocket endpoint and the browser dashboard
//! - Health, Kubernetes probes, relay monitoring and Prometheus metrics

use std::sync::Arc;

use axum::{
    extract::{ws::WebSocketUpgrade, DefaultBodyLimit, Multipart, Query, State},
    http::{header, StatusCode},
    response::{Html, IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use chrono::Utc;
use metrics_exporter_prometheus::PrometheusHandle;
use tracing::info;
use utoipa::OpenApi;

use rg_common::HealthStatus;
use rg_config::StorageConfig;
use rg_queue::QueueClient;
use rg_storage::{clamp_expiry, generate_object_key, validate_key, ObjectStore, SignedUrl};

use crate::broadcaster::Broadcaster;
use crate::poller::{RelayStats, RelayStatsSnapshot};
use crate::producer::{MessageProducer, SendMessageRequest};
use crate::transport::handle_socket;
use crate::RelayError;

pub mod model;

use model::{
    ErrorResponse, ProbeResponse, PublishMessageRequest, PublishMessageResponse,
    RelayStatusResponse, SignedUrlQuery, SimpleHealthResponse, UploadForm, UploadResponse,
};

const UPLOAD_FIELD: &str = "file";
const DEFAULT_CONTENT_TYPE: &str = "application/octet-stream";

/// Application state shared across handlers
#[derive(Clone)]
pub struct AppState {
    pub queue: Arc<dyn QueueClient>,
    pub producer: MessageProducer,
    pub broadcaster: Arc<Broadcaster>,
    pub object_store: Arc<dyn ObjectStore>,
    pub storage: StorageConfig,
    pub stats: Arc<RelayStats>,
    /// Prometheus recorder handle; `/metrics` is empty without one
    pub metrics: Option<PrometheusHandle>,
}

#[derive(OpenApi)]
#[openapi(
    info(
        title = "RelayGate API",
        version = "0.1.0",
        description = "Queue-backed real-time relay with object storage uploads"
    ),
    paths(
        publish_message,
        upload_file,
        signed_url,
        health_handler,
        liveness_probe,
        readiness_probe,
        relay_status_handler,
        metrics_handler,
    ),
    components(schemas(
        PublishMessageRequest,
        PublishMessageResponse,
        UploadForm,
        UploadResponse,
        SignedUrl,
        ErrorResponse,
        SimpleHealthResponse,
        ProbeResponse,
        RelayStatusResponse,
        RelayStatsSnapshot,
        HealthStatus,
    )),
    tags(
        (name = "messages", description = "Message publishing endpoints"),
        (name = "uploads", description = "File upload and signed URL endpoints"),
        (name = "health", description = "Health check endpoints"),
        (name = "monitoring", description = "Monitoring and metrics endpoints"),
    )
)]
pub struct ApiDoc;

/// Create the full router with all endpoints
pub fn create_router(state: AppState) -> Router {
    let upload_limit = state.storage.max_upload_bytes;

    Router::new()
        .route("/", get(dashboard_html_handler))
        .route("/dashboard", get(dashboard_html_handler))
        .route("/ws", get(ws_handler))
        .route("/api/messages", post(publish_message))
        .route(
            "/api/uploads",
            post(upload_file).layer(DefaultBodyLimit::max(upload_limit)),
        )
        .route("/api/uploads/url", get(signed_url))
        .route("/health", get(health_handler))
        .route("/health/live", get(liveness_probe))
        .route("/health/ready", get(readiness_probe))
        .route("/monitoring/relay", get(relay_status_handler))
        .route("/metrics", get(metrics_handler))
        .route("/api-doc/openapi.json", get(openapi_handler))
        .with_state(state)
}

// ============================================================================
// Dashboard and WebSocket
// ============================================================================

/// Serve dashboard HTML
async fn dashboard_html_handler() -> impl IntoResponse {
    const DASHBOARD_HTML: &str = include_str!("../../resources/dashboard.html");
    Html(DASHBOARD_HTML)
}

async fn ws_handler(ws: WebSocketUpgrade, State(state): State<AppState>) -> Response {
    let broadcaster = Arc::clone(&state.broadcaster);
    ws.on_upgrade(move |socket| handle_socket(socket, broadcaster))
}

async fn openapi_handler() -> Json<utoipa::openapi::OpenApi> {
    Json(ApiDoc::openapi())
}

// ============================================================================
// Message Publishing
// ============================================================================

/// Queue a message for broadcast to every connected client
#[utoipa::path(
    post,
    path = "/api/messages",
    tag = "messages",
    request_body = PublishMessageRequest,
    responses(
        (status = 202, description = "Message queued", body = PublishMessageResponse),
        (status = 400, description = "Missing or blank text", body = ErrorResponse),
        (status = 502, description = "Queue unavailable", body = ErrorResponse)
    )
)]
async fn publish_message(
    State(state): State<AppState>,
    Json(req): Json<PublishMessageRequest>,
) -> Result<(StatusCode, Json<PublishMessageResponse>), RelayError> {
    let sent = state
        .producer
        .send(SendMessageRequest {
            text: req.text,
            topic: req.topic,
            sender_id: None,
        })
        .await?;

    Ok((
        StatusCode::ACCEPTED,
        Json(PublishMessageResponse {
            message_id: sent.message_id,
            topic: sent.topic,
            status: "QUEUED".to_string(),
        }),
    ))
}

// ============================================================================
// Uploads
// ============================================================================

/// Upload a file (multipart field `file`) and get a signed download URL
#[utoipa::path(
    post,
    path = "/api/uploads",
    tag = "uploads",
    request_body(content = UploadForm, content_type = "multipart/form-data"),
    responses(
        (status = 201, description = "File stored", body = UploadResponse),
        (status = 400, description = "Missing or empty file", body = ErrorResponse),
        (status = 413, description = "File too large", body = ErrorResponse),
        (status = 502, description = "Object store unavailable", body = ErrorResponse)
    )
)]
async fn upload_file(
    State(state): State<AppState>,
    mut multipart: Multipart,
) -> Result<(StatusCode, Json<UploadResponse>), RelayError> {
    while let Some(field) = multipart.next_field().await.map_err(multipart_error)? {
        if field.name() != Some(UPLOAD_FIELD) {
            continue;
        }

        let file_name = field.file_name().map(str::to_string);
        let content_type = field
            .content_type()
            .unwrap_or(DEFAULT_CONTENT_TYPE)
            .to_string();
        let data = field.bytes().await.map_err(multipart_error)?;
        if data.is_empty() {
            return Err(RelayError::Validation("uploaded file is empty".to_string()));
        }

        let key = generate_object_key(&state.storage.key_prefix, file_name.as_deref(), Utc::now());
        let stored = state.object_store.put_object(&key, data, &content_type).await?;

        let expires_in = clamp_expiry(
            None,
            state.storage.url_expiry_seconds,
            state.storage.max_url_expiry_seconds,
        );
        let signed = state.object_store.presign_get(&stored.key, expires_in).await?;

        metrics::counter!("relay.uploads_total").increment(1);
        info!(
            bucket = %state.object_store.bucket(),
            key = %stored.key,
            size = stored.size,
            content_type = %stored.content_type,
            "File uploaded"
        );

        return Ok((
            StatusCode::CREATED,
            Json(UploadResponse {
                key: stored.key,
                size: stored.size,
                content_type: stored.content_type,
                url: signed.url,
                expires_at: signed.expires_at,
            }),
        ));
    }

    Err(RelayError::Validation(format!(
        "multipart field '{}' is required",
        UPLOAD_FIELD
    )))
}

fn multipart_error(e: axum::extract::multipart::MultipartError) -> RelayError {
    if e.status() == StatusCode::PAYLOAD_TOO_LARGE {
        RelayError::PayloadTooLarge(e.body_text())
    } else {
        RelayError::Validation(e.body_text())
    }
}

/// Mint a time-limited download URL for a stored object
#[utoipa::path(
    get,
    path = "/api/uploads/url",
    tag = "uploads",
    params(SignedUrlQuery),
    responses(
        (status = 200, description = "Signed URL", body = SignedUrl),
        (status = 400, description = "Invalid key", body = ErrorResponse),
        (status = 502, description = "Object store unavailable", body = ErrorResponse)
    )
)]
async fn signed_url(
    State(state): State<AppState>,
    Query(query): Query<SignedUrlQuery>,
) -> Result<Json<SignedUrl>, RelayError> {
    validate_key(&query.key)?;

    let expires_in = clamp_expiry(
        query.expires_in,
        state.storage.url_expiry_seconds,
        state.storage.max_url_expiry_seconds,
    );
    let signed = state.object_store.presign_get(&query.key, expires_in).await?;
    Ok(Json(signed))
}

// ============================================================================
// Health and Monitoring
// ============================================================================

/// Basic health check
#[utoipa::path(
    get,
    path = "/health",
    tag = "health",
    responses(
        (status = 200, description = "Gateway health", body = SimpleHealthResponse)
    )
)]
async fn health_handler(State(state): State<AppState>) -> Json<SimpleHealthResponse> {
    let status = if state.stats.is_running() {
        HealthStatus::Healthy
    } else {
        HealthStatus::Degraded
    };

    Json(SimpleHealthResponse {
        status,
        version: env!("CARGO_PKG_VERSION").to_string(),
        connected_sessions: state.broadcaster.registry().count(),
    })
}

/// Kubernetes liveness probe
#[utoipa::path(
    get,
    path = "/health/live",
    tag = "health",
    responses(
        (status = 200, description = "Application is alive", body = ProbeResponse)
    )
)]
async fn liveness_probe() -> Json<ProbeResponse> {
    Json(ProbeResponse {
        status: "LIVE".to_string(),
    })
}

/// Kubernetes readiness probe
#[utoipa::path(
    get,
    path = "/health/ready",
    tag = "health",
    responses(
        (status = 200, description = "Poller is running", body = ProbeResponse),
        (status = 503, description = "Poller has stopped", body = ProbeResponse)
    )
)]
async fn readiness_probe(State(state): State<AppState>) -> Response {
    if state.stats.is_running() {
        (StatusCode::OK, Json(ProbeResponse { status: "READY".to_string() })).into_response()
    } else {
        (
            StatusCode::SERVICE_UNAVAILABLE,
            Json(ProbeResponse { status: "NOT_READY".to_string() }),
        )
            .into_response()
    }
}

/// Relay loop counters
#[utoipa::path(
    get,
    path = "/monitoring/relay",
    tag = "monitoring",
    responses(
        (status = 200, description = "Relay status", body = RelayStatusResponse)
    )
)]
async fn relay_status_handler(State(state): State<AppState>) -> Json<RelayStatusResponse> {
    let registry = state.broadcaster.registry();
    let mut sessions: Vec<String> = registry
        .session_ids()
        .into_iter()
        .map(|id| id.as_str().to_string())
        .collect();
    sessions.sort();

    Json(RelayStatusResponse {
        queue: state.queue.identifier().to_string(),
        connected_sessions: sessions.len(),
        sessions,
        stats: state.stats.snapshot(),
    })
}

/// Prometheus metrics endpoint
#[utoipa::path(
    get,
    path = "/metrics",
    tag = "monitoring",
    responses(
        (status = 200, description = "Prometheus metrics", content_type = "text/plain")
    )
)]
async fn metrics_handler(State(state): State<AppState>) -> Response {
    let output = state
        .metrics
        .as_ref()
        .map(PrometheusHandle::render)
        .unwrap_or_default();

    (
        StatusCode::OK,
        [(header::CONTENT_TYPE, "text/plain; version=0.0.4; charset=utf-8")],
        output,
    )
        .into_response()
}

//! RelayGate Gateway
//!
//! Serves the browser dashboard and WebSocket endpoint, accepts uploads and
//! message publishes over HTTP, and relays everything that arrives on the
//! queue to every connected client.
//!
//! Configuration comes from `config.toml` (or `RELAYGATE_CONFIG`) with
//! `RELAYGATE_*` and standard `AWS_*` environment overrides. Missing queue
//! or storage connection parameters stop startup.

use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use axum::http::HeaderValue;
use metrics_exporter_prometheus::{PrometheusBuilder, PrometheusHandle};
use tokio::{net::TcpListener, signal};
use tokio_util::sync::CancellationToken;
use tower_http::cors::{AllowOrigin, Any, CorsLayer};
use tower_http::trace::TraceLayer;
use tracing::{info, warn};

use rg_config::{AppConfig, ConfigLoader};
use rg_queue::{sqs::SqsQueueClient, QueueClient};
use rg_relay::{
    create_router, spawn_poller, AppState, Broadcaster, MessageProducer, PollerConfig,
    QueuePoller, RelayStats, SessionRegistry,
};
use rg_storage::{s3::S3ObjectStore, ObjectStore};

const METRICS_UPKEEP_INTERVAL: Duration = Duration::from_secs(10);

#[tokio::main]
async fn main() -> Result<()> {
    // Load .env file if present (for local development)
    let _ = dotenvy::dotenv();

    rg_common::logging::init_logging("relaygate");

    info!("Starting RelayGate");

    let config = ConfigLoader::new()
        .load()
        .context("Failed to load configuration")?;
    config.relay.validate().context("Invalid relay configuration")?;

    let shutdown = CancellationToken::new();
    let metrics = install_metrics(shutdown.clone());

    // 1. Clients (fatal on missing connection parameters)
    let queue: Arc<dyn QueueClient> = Arc::new(
        SqsQueueClient::connect(&config.aws, &config.queue)
            .await
            .context("Failed to configure queue client")?,
    );
    let object_store: Arc<dyn ObjectStore> = Arc::new(
        S3ObjectStore::connect(&config.aws, &config.storage)
            .await
            .context("Failed to configure object store")?,
    );

    // 2. Real-time channel
    let registry = Arc::new(SessionRegistry::new(config.relay.session_send_queue));
    let producer = MessageProducer::new(Arc::clone(&queue));
    let broadcaster = Arc::new(Broadcaster::new(Arc::clone(&registry), producer.clone()));

    // 3. Queue poller
    let stats = Arc::new(RelayStats::new());
    let poller = Arc::new(
        QueuePoller::new(
            Arc::clone(&queue),
            Arc::clone(&broadcaster),
            PollerConfig::from(&config.relay),
        )
        .with_stats(Arc::clone(&stats)),
    );
    let poller_handle = spawn_poller(poller, shutdown.clone());

    // 4. HTTP server
    let state = AppState {
        queue,
        producer,
        broadcaster,
        object_store,
        storage: config.storage.clone(),
        stats,
        metrics,
    };

    let app = create_router(state)
        .layer(TraceLayer::new_for_http())
        .layer(build_cors(&config.http.cors_origins));

    let addr = format!("{}:{}", config.http.host, config.http.port);
    let listener = TcpListener::bind(&addr)
        .await
        .with_context(|| format!("Failed to bind {}", addr))?;

    log_startup_summary(&config, &addr);

    {
        let shutdown = shutdown.clone();
        tokio::spawn(async move {
            shutdown_signal().await;
            info!("Shutdown signal received");
            shutdown.cancel();
        });
    }

    let server_shutdown = shutdown.clone();
    axum::serve(listener, app)
        .with_graceful_shutdown(async move { server_shutdown.cancelled().await })
        .await
        .context("HTTP server error")?;

    // Server may also stop on its own; make sure the poller follows
    shutdown.cancel();

    let timeout = Duration::from_secs(config.relay.shutdown_timeout_seconds);
    match tokio::time::timeout(timeout, poller_handle).await {
        Ok(Ok(())) => info!("Queue poller stopped"),
        Ok(Err(e)) => warn!(error = %e, "Queue poller task failed"),
        Err(_) => warn!(
            timeout_secs = timeout.as_secs(),
            "Queue poller did not stop before the shutdown timeout"
        ),
    }

    info!("RelayGate shutdown complete");
    Ok(())
}

/// Install the Prometheus recorder and keep its buckets drained.
fn install_metrics(shutdown: CancellationToken) -> Option<PrometheusHandle> {
    let handle = match PrometheusBuilder::new().install_recorder() {
        Ok(handle) => handle,
        Err(e) => {
            warn!(error = %e, "Prometheus recorder not installed, /metrics will be empty");
            return None;
        }
    };

    let upkeep = handle.clone();
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(METRICS_UPKEEP_INTERVAL);
        loop {
            tokio::select! {
                _ = ticker.tick() => upkeep.run_upkeep(),
                _ = shutdown.cancelled() => break,
            }
        }
    });

    Some(handle)
}

fn build_cors(origins: &[String]) -> CorsLayer {
    let cors = CorsLayer::new().allow_methods(Any).allow_headers(Any);

    if origins.is_empty() || origins.iter().any(|o| o == "*") {
        return cors.allow_origin(Any);
    }

    let allowed: Vec<HeaderValue> = origins
        .iter()
        .filter_map(|origin| match HeaderValue::from_str(origin) {
            Ok(value) => Some(value),
            Err(_) => {
                warn!(origin = %origin, "Ignoring invalid CORS origin");
                None
            }
        })
        .collect();

    cors.allow_origin(AllowOrigin::list(allowed))
}

fn log_startup_summary(config: &AppConfig, addr: &str) {
    info!("=== RelayGate Startup Summary ===");
    info!("  HTTP: {}", addr);
    info!("  Queue: {}", config.queue.queue_name());
    info!("  Bucket: {}", config.storage.bucket);
    info!(
        "  Poller: batch={} backoff={}s wait={}s",
        config.relay.poll_batch_size,
        config.relay.error_backoff_seconds,
        config.queue.wait_time_seconds
    );
    info!("=================================");
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            warn!(error = %e, "Failed to listen for Ctrl+C");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(e) => {
                warn!(error = %e, "Failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
}

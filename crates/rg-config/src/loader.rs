//! Configuration loader with file and environment variable support

use crate::{AppConfig, ConfigError};
use std::env;
use std::path::PathBuf;
use tracing::info;

/// Standard config file search paths
const CONFIG_PATHS: &[&str] = &[
    "config.toml",
    "relaygate.toml",
    "./config/config.toml",
    "/etc/relaygate/config.toml",
];

/// Configuration loader
pub struct ConfigLoader {
    config_path: Option<PathBuf>,
}

impl ConfigLoader {
    /// Create a new configuration loader
    pub fn new() -> Self {
        Self { config_path: None }
    }

    /// Create a loader with a specific config file path
    pub fn with_path<P: Into<PathBuf>>(path: P) -> Self {
        Self {
            config_path: Some(path.into()),
        }
    }

    /// Load configuration from file (if found) with environment variable overrides.
    ///
    /// Does not validate; clients validate the sections they need when built.
    pub fn load(&self) -> Result<AppConfig, ConfigError> {
        let mut config = AppConfig::default();

        if let Some(path) = self.find_config_file() {
            info!(?path, "Loading configuration from file");
            config = AppConfig::from_file(&path)?;
        }

        self.apply_overrides(&mut config, |key| env::var(key).ok());

        Ok(config)
    }

    fn find_config_file(&self) -> Option<PathBuf> {
        if let Some(path) = &self.config_path {
            if path.exists() {
                return Some(path.clone());
            }
        }

        if let Ok(path) = env::var("RELAYGATE_CONFIG") {
            let path = PathBuf::from(path);
            if path.exists() {
                return Some(path);
            }
        }

        CONFIG_PATHS
            .iter()
            .map(PathBuf::from)
            .find(|path| path.exists())
    }

    /// Apply overrides from a variable lookup (the process environment in `load`).
    ///
    /// Standard AWS variable names are honoured; the `RELAYGATE_` form wins
    /// when both are set.
    pub fn apply_overrides<F>(&self, config: &mut AppConfig, lookup: F)
    where
        F: Fn(&str) -> Option<String>,
    {
        let first = |keys: &[&str]| keys.iter().find_map(|key| lookup(key));

        // HTTP
        if let Some(val) = lookup("RELAYGATE_HTTP_PORT") {
            if let Ok(port) = val.parse() {
                config.http.port = port;
            }
        }
        if let Some(val) = lookup("RELAYGATE_HTTP_HOST") {
            config.http.host = val;
        }
        if let Some(val) = lookup("RELAYGATE_CORS_ORIGINS") {
            config.http.cors_origins = val.split(',').map(|s| s.trim().to_string()).collect();
        }

        // AWS
        if let Some(val) = first(&["RELAYGATE_AWS_REGION", "AWS_REGION", "AWS_DEFAULT_REGION"]) {
            config.aws.region = val;
        }
        if let Some(val) = first(&["RELAYGATE_AWS_ACCESS_KEY_ID", "AWS_ACCESS_KEY_ID"]) {
            config.aws.access_key_id = val;
        }
        if let Some(val) = first(&["RELAYGATE_AWS_SECRET_ACCESS_KEY", "AWS_SECRET_ACCESS_KEY"]) {
            config.aws.secret_access_key = val;
        }
        if let Some(val) = first(&["RELAYGATE_AWS_SESSION_TOKEN", "AWS_SESSION_TOKEN"]) {
            config.aws.session_token = Some(val);
        }
        if let Some(val) = lookup("RELAYGATE_AWS_ENDPOINT_URL") {
            config.aws.endpoint_url = Some(val);
        }

        // Queue
        if let Some(val) = first(&["RELAYGATE_SQS_QUEUE_URL", "SQS_QUEUE_URL"]) {
            config.queue.queue_url = val;
        }
        if let Some(val) = lookup("RELAYGATE_SQS_WAIT_TIME_SECONDS") {
            if let Ok(wait) = val.parse() {
                config.queue.wait_time_seconds = wait;
            }
        }
        if let Some(val) = lookup("RELAYGATE_SQS_VISIBILITY_TIMEOUT") {
            if let Ok(timeout) = val.parse() {
                config.queue.visibility_timeout_seconds = Some(timeout);
            }
        }

        // Storage
        if let Some(val) = first(&["RELAYGATE_S3_BUCKET", "S3_BUCKET"]) {
            config.storage.bucket = val;
        }
        if let Some(val) = lookup("RELAYGATE_S3_KEY_PREFIX") {
            config.storage.key_prefix = val;
        }
        if let Some(val) = lookup("RELAYGATE_S3_URL_EXPIRY_SECONDS") {
            if let Ok(expiry) = val.parse() {
                config.storage.url_expiry_seconds = expiry;
            }
        }
        if let Some(val) = lookup("RELAYGATE_S3_FORCE_PATH_STYLE") {
            config.storage.force_path_style = val.parse().unwrap_or(false);
        }
        if let Some(val) = lookup("RELAYGATE_MAX_UPLOAD_BYTES") {
            if let Ok(bytes) = val.parse() {
                config.storage.max_upload_bytes = bytes;
            }
        }

        // Relay
        if let Some(val) = lookup("RELAYGATE_POLL_BATCH_SIZE") {
            if let Ok(size) = val.parse() {
                config.relay.poll_batch_size = size;
            }
        }
        if let Some(val) = lookup("RELAYGATE_POLL_ERROR_BACKOFF_SECONDS") {
            if let Ok(backoff) = val.parse() {
                config.relay.error_backoff_seconds = backoff;
            }
        }
        if let Some(val) = lookup("RELAYGATE_SESSION_SEND_QUEUE") {
            if let Ok(capacity) = val.parse() {
                config.relay.session_send_queue = capacity;
            }
        }
        if let Some(val) = lookup("RELAYGATE_SHUTDOWN_TIMEOUT_SECONDS") {
            if let Ok(timeout) = val.parse() {
                config.relay.shutdown_timeout_seconds = timeout;
            }
        }
    }
}

impl Default for ConfigLoader {
    fn default() -> Self {
        Self::new()
    }
}

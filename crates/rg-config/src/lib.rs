//! RelayGate Configuration System
//!
//! TOML-based configuration with environment variable overrides. Connection
//! parameters for the queue and object store are validated once, when the
//! clients are built at startup; a missing value is fatal.

use serde::{Deserialize, Serialize};
use std::path::Path;
use thiserror::Error;

mod loader;

#[cfg(feature = "aws")]
pub mod aws;

pub use loader::ConfigLoader;

/// Longest lifetime S3 accepts for a presigned URL (7 days).
pub const MAX_PRESIGN_EXPIRY_SECONDS: u64 = 604_800;

/// Configuration error types
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Failed to read config file: {0}")]
    ReadError(#[from] std::io::Error),

    #[error("Failed to parse TOML: {0}")]
    ParseError(#[from] toml::de::Error),

    #[error("Invalid configuration: {0}")]
    ValidationError(String),
}

/// Root application configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    pub http: HttpConfig,
    pub aws: AwsConfig,
    pub queue: QueueConfig,
    pub storage: StorageConfig,
    pub relay: RelayConfig,
}

/// HTTP server configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct HttpConfig {
    pub port: u16,
    pub host: String,
    pub cors_origins: Vec<String>,
}

impl Default for HttpConfig {
    fn default() -> Self {
        Self {
            port: 8080,
            host: "0.0.0.0".to_string(),
            cors_origins: vec!["*".to_string()],
        }
    }
}

/// AWS connection parameters shared by the queue and storage clients
#[derive(Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct AwsConfig {
    pub region: String,
    pub access_key_id: String,
    pub secret_access_key: String,
    pub session_token: Option<String>,
    /// Custom endpoint (LocalStack, MinIO). Uses the AWS default when unset.
    pub endpoint_url: Option<String>,
}

impl std::fmt::Debug for AwsConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AwsConfig")
            .field("region", &self.region)
            .field("access_key_id", &self.access_key_id)
            .field("secret_access_key", &"<redacted>")
            .field("session_token", &self.session_token.as_ref().map(|_| "<redacted>"))
            .field("endpoint_url", &self.endpoint_url)
            .finish()
    }
}

impl AwsConfig {
    /// Region and static credentials are all required.
    pub fn validate(&self) -> Result<(), ConfigError> {
        require("aws.region", &self.region)?;
        require("aws.access_key_id", &self.access_key_id)?;
        require("aws.secret_access_key", &self.secret_access_key)?;
        Ok(())
    }
}

/// SQS queue configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct QueueConfig {
    pub queue_url: String,
    /// Long-poll wait window (SQS max is 20)
    pub wait_time_seconds: u32,
    /// Per-receive visibility timeout; the queue default applies when unset
    pub visibility_timeout_seconds: Option<u32>,
}

impl Default for QueueConfig {
    fn default() -> Self {
        Self {
            queue_url: String::new(),
            wait_time_seconds: 20,
            visibility_timeout_seconds: None,
        }
    }
}

impl QueueConfig {
    pub fn validate(&self) -> Result<(), ConfigError> {
        require("queue.queue_url", &self.queue_url)?;
        if self.wait_time_seconds > 20 {
            return Err(ConfigError::ValidationError(format!(
                "queue.wait_time_seconds must be between 0 and 20, got {}",
                self.wait_time_seconds
            )));
        }
        Ok(())
    }

    /// Queue name taken from the last URL segment
    pub fn queue_name(&self) -> &str {
        self.queue_url
            .rsplit('/')
            .find(|segment| !segment.is_empty())
            .unwrap_or("unknown")
    }
}

/// Object storage (S3) configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct StorageConfig {
    pub bucket: String,
    pub key_prefix: String,
    pub url_expiry_seconds: u64,
    pub max_url_expiry_seconds: u64,
    pub max_upload_bytes: usize,
    /// Path-style addressing, needed by most S3-compatible local stacks
    pub force_path_style: bool,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            bucket: String::new(),
            key_prefix: "uploads/".to_string(),
            url_expiry_seconds: 3600,
            max_url_expiry_seconds: MAX_PRESIGN_EXPIRY_SECONDS,
            max_upload_bytes: 25 * 1024 * 1024,
            force_path_style: false,
        }
    }
}

impl StorageConfig {
    pub fn validate(&self) -> Result<(), ConfigError> {
        require("storage.bucket", &self.bucket)?;
        if self.max_url_expiry_seconds == 0 || self.max_url_expiry_seconds > MAX_PRESIGN_EXPIRY_SECONDS {
            return Err(ConfigError::ValidationError(format!(
                "storage.max_url_expiry_seconds must be between 1 and {}",
                MAX_PRESIGN_EXPIRY_SECONDS
            )));
        }
        if self.url_expiry_seconds == 0 || self.url_expiry_seconds > self.max_url_expiry_seconds {
            return Err(ConfigError::ValidationError(format!(
                "storage.url_expiry_seconds must be between 1 and {}",
                self.max_url_expiry_seconds
            )));
        }
        Ok(())
    }
}

/// Queue-to-socket relay configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RelayConfig {
    /// Messages requested per receive (1-10)
    pub poll_batch_size: u32,
    /// Fixed sleep after a failed receive
    pub error_backoff_seconds: u64,
    /// Outbound buffer per connected session
    pub session_send_queue: usize,
    /// How long shutdown waits for the poller to finish its current cycle
    pub shutdown_timeout_seconds: u64,
}

impl Default for RelayConfig {
    fn default() -> Self {
        Self {
            poll_batch_size: 5,
            error_backoff_seconds: 5,
            session_send_queue: 256,
            shutdown_timeout_seconds: 30,
        }
    }
}

impl RelayConfig {
    pub fn validate(&self) -> Result<(), ConfigError> {
        if !(1..=10).contains(&self.poll_batch_size) {
            return Err(ConfigError::ValidationError(format!(
                "relay.poll_batch_size must be between 1 and 10, got {}",
                self.poll_batch_size
            )));
        }
        if self.error_backoff_seconds == 0 {
            return Err(ConfigError::ValidationError(
                "relay.error_backoff_seconds must be greater than 0".to_string(),
            ));
        }
        if self.session_send_queue == 0 {
            return Err(ConfigError::ValidationError(
                "relay.session_send_queue must be greater than 0".to_string(),
            ));
        }
        Ok(())
    }
}

fn require(name: &str, value: &str) -> Result<(), ConfigError> {
    if value.trim().is_empty() {
        return Err(ConfigError::ValidationError(format!("{} is required", name)));
    }
    Ok(())
}

impl AppConfig {
    /// Load configuration from a TOML file
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path)?;
        let config: AppConfig = toml::from_str(&content)?;
        Ok(config)
    }

    /// Load configuration with environment variable override
    pub fn load() -> Result<Self, ConfigError> {
        ConfigLoader::new().load()
    }

    /// Validate every section
    pub fn validate(&self) -> Result<(), ConfigError> {
        self.aws.validate()?;
        self.queue.validate()?;
        self.storage.validate()?;
        self.relay.validate()?;
        Ok(())
    }

    /// Generate an example TOML configuration
    pub fn example_toml() -> String {
        r#"# RelayGate Configuration
# Environment variables override these settings

[http]
port = 8080
host = "0.0.0.0"
cors_origins = ["*"]

[aws]
region = "us-east-1"          # AWS_REGION
access_key_id = ""            # AWS_ACCESS_KEY_ID
secret_access_key = ""        # AWS_SECRET_ACCESS_KEY
# session_token = ""          # AWS_SESSION_TOKEN
# endpoint_url = "http://localhost:4566"

[queue]
queue_url = ""                # SQS_QUEUE_URL
wait_time_seconds = 20
# visibility_timeout_seconds = 30

[storage]
bucket = ""
key_prefix = "uploads/"
url_expiry_seconds = 3600
max_url_expiry_seconds = 604800
max_upload_bytes = 26214400
force_path_style = false

[relay]
poll_batch_size = 5
error_backoff_seconds = 5
session_send_queue = 256
shutdown_timeout_seconds = 30
"#
        .to_string()
    }
}

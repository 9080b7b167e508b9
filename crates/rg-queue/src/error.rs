use thiserror::Error;

#[derive(Error, Debug)]
pub enum QueueError {
    /// Service unreachable or returned an error. Recoverable.
    #[error("AWS SQS error: {0}")]
    Sqs(String),

    /// Missing or invalid connection parameters. Fatal at startup.
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl From<rg_config::ConfigError> for QueueError {
    fn from(e: rg_config::ConfigError) -> Self {
        QueueError::Config(e.to_string())
    }
}

impl QueueError {
    pub fn is_config(&self) -> bool {
        matches!(self, QueueError::Config(_))
    }
}

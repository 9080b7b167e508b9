use thiserror::Error;

#[derive(Error, Debug)]
pub enum StorageError {
    /// Object store unreachable or returned an error
    #[error("AWS S3 error: {0}")]
    S3(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Invalid object key: {0}")]
    InvalidKey(String),
}

impl From<rg_config::ConfigError> for StorageError {
    fn from(e: rg_config::ConfigError) -> Self {
        StorageError::Config(e.to_string())
    }
}

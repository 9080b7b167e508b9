use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use thiserror::Error;

use rg_queue::QueueError;
use rg_storage::StorageError;

use crate::api::model::ErrorResponse;

#[derive(Error, Debug)]
pub enum RelayError {
    /// Caller sent something the gateway will not forward
    #[error("Validation error: {0}")]
    Validation(String),

    #[error("Payload too large: {0}")]
    PayloadTooLarge(String),

    #[error("Queue error: {0}")]
    Queue(#[from] QueueError),

    #[error("Storage error: {0}")]
    Storage(#[from] StorageError),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl RelayError {
    pub fn status_code(&self) -> StatusCode {
        match self {
            RelayError::Validation(_) => StatusCode::BAD_REQUEST,
            RelayError::PayloadTooLarge(_) => StatusCode::PAYLOAD_TOO_LARGE,
            RelayError::Queue(QueueError::Config(_)) => StatusCode::INTERNAL_SERVER_ERROR,
            RelayError::Queue(_) => StatusCode::BAD_GATEWAY,
            RelayError::Storage(StorageError::InvalidKey(_)) => StatusCode::BAD_REQUEST,
            RelayError::Storage(StorageError::Config(_)) => StatusCode::INTERNAL_SERVER_ERROR,
            RelayError::Storage(_) => StatusCode::BAD_GATEWAY,
            RelayError::Serialization(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    /// Stable machine-readable code for the `error` field
    pub fn code(&self) -> &'static str {
        match self {
            RelayError::Validation(_) => "VALIDATION_ERROR",
            RelayError::PayloadTooLarge(_) => "PAYLOAD_TOO_LARGE",
            RelayError::Queue(_) => "QUEUE_ERROR",
            RelayError::Storage(StorageError::InvalidKey(_)) => "INVALID_KEY",
            RelayError::Storage(_) => "STORAGE_ERROR",
            RelayError::Serialization(_) => "INTERNAL_ERROR",
        }
    }
}

impl IntoResponse for RelayError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        if status.is_server_error() {
            tracing::error!(error = %self, "Request failed");
        }

        let body = ErrorResponse {
            error: self.code().to_string(),
            message: self.to_string(),
        };
        (status, Json(body)).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_mapping() {
        assert_eq!(
            RelayError::Validation("text is required".into()).status_code(),
            StatusCode::BAD_REQUEST
        );
        assert_eq!(
            RelayError::Queue(QueueError::Sqs("timeout".into())).status_code(),
            StatusCode::BAD_GATEWAY
        );
        assert_eq!(
            RelayError::Queue(QueueError::Config("queue.queue_url is required".into())).status_code(),
            StatusCode::INTERNAL_SERVER_ERROR
        );
        assert_eq!(
            RelayError::Storage(StorageError::InvalidKey("..".into())).status_code(),
            StatusCode::BAD_REQUEST
        );
        assert_eq!(
            RelayError::Storage(StorageError::S3("denied".into())).status_code(),
            StatusCode::BAD_GATEWAY
        );
    }

    #[test]
    fn test_codes() {
        assert_eq!(RelayError::Validation(String::new()).code(), "VALIDATION_ERROR");
        assert_eq!(
            RelayError::Storage(StorageError::InvalidKey(String::new())).code(),
            "INVALID_KEY"
        );
    }
}

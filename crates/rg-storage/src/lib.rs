//! RelayGate Object Storage
//!
//! Stores uploaded files under generated keys and mints time-limited GET
//! URLs for them. The S3 implementation lives behind the `s3` feature.

use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

pub mod error;
pub mod keys;

#[cfg(feature = "s3")]
pub mod s3;

pub use error::StorageError;
pub use keys::{generate_object_key, sanitize_filename, validate_key};

pub type Result<T> = std::result::Result<T, StorageError>;

/// An object written to the store
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct StoredObject {
    pub key: String,
    pub size: u64,
    pub content_type: String,
}

/// A presigned, time-limited download URL
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct SignedUrl {
    pub key: String,
    pub url: String,
    pub expires_at: DateTime<Utc>,
}

/// Upload producer and URL signer used by the HTTP layer
#[async_trait]
pub trait ObjectStore: Send + Sync {
    /// Bucket (or equivalent namespace) name, for logs
    fn bucket(&self) -> &str;

    async fn put_object(&self, key: &str, data: Bytes, content_type: &str) -> Result<StoredObject>;

    async fn presign_get(&self, key: &str, expires_in: Duration) -> Result<SignedUrl>;
}

/// Resolve the lifetime for a signed URL.
///
/// Zero or missing means `default_secs`; anything above `max_secs` is capped.
pub fn clamp_expiry(requested_secs: Option<u64>, default_secs: u64, max_secs: u64) -> Duration {
    let secs = match requested_secs {
        Some(0) | None => default_secs,
        Some(secs) => secs,
    };
    Duration::from_secs(secs.clamp(1, max_secs.max(1)))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_clamp_expiry() {
        assert_eq!(clamp_expiry(None, 3600, 604_800), Duration::from_secs(3600));
        assert_eq!(clamp_expiry(Some(0), 3600, 604_800), Duration::from_secs(3600));
        assert_eq!(clamp_expiry(Some(60), 3600, 604_800), Duration::from_secs(60));
        assert_eq!(clamp_expiry(Some(10_000_000), 3600, 604_800), Duration::from_secs(604_800));
    }

    #[test]
    fn test_signed_url_serializes_camel_case() {
        let url = SignedUrl {
            key: "uploads/a.txt".to_string(),
            url: "https://example.test/a".to_string(),
            expires_at: DateTime::from_timestamp(1_700_000_000, 0).unwrap(),
        };
        let value = serde_json::to_value(&url).unwrap();
        assert!(value.get("expiresAt").is_some());
    }
}

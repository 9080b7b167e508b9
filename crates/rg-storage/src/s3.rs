//! AWS S3 object store

use std::time::Duration;

use async_trait::async_trait;
use aws_sdk_s3::error::DisplayErrorContext;
use aws_sdk_s3::presigning::PresigningConfig;
use aws_sdk_s3::primitives::ByteStream;
use aws_sdk_s3::Client;
use bytes::Bytes;
use chrono::Utc;
use tracing::{debug, info};

use rg_config::aws::load_sdk_config;
use rg_config::{AwsConfig, StorageConfig};

use crate::{validate_key, ObjectStore, Result, SignedUrl, StorageError, StoredObject};

pub struct S3ObjectStore {
    client: Client,
    bucket: String,
}

impl S3ObjectStore {
    pub fn new(client: Client, bucket: String) -> Self {
        Self { client, bucket }
    }

    /// Validate configuration and build a client. Fails before any network
    /// call when the bucket, region or credentials are missing.
    pub async fn connect(aws: &AwsConfig, storage: &StorageConfig) -> Result<Self> {
        aws.validate()?;
        storage.validate()?;

        let sdk_config = load_sdk_config(aws).await;

        let s3_config = aws_sdk_s3::config::Builder::from(&sdk_config)
            .force_path_style(storage.force_path_style)
            .build();

        info!(
            bucket = %storage.bucket,
            region = %aws.region,
            force_path_style = storage.force_path_style,
            "S3 object store configured"
        );

        Ok(Self::new(Client::from_conf(s3_config), storage.bucket.clone()))
    }
}

fn s3_error(e: impl std::error::Error) -> StorageError {
    StorageError::S3(DisplayErrorContext(e).to_string())
}

#[async_trait]
impl ObjectStore for S3ObjectStore {
    fn bucket(&self) -> &str {
        &self.bucket
    }

    async fn put_object(&self, key: &str, data: Bytes, content_type: &str) -> Result<StoredObject> {
        validate_key(key)?;
        let size = data.len() as u64;

        self.client
            .put_object()
            .bucket(&self.bucket)
            .key(key)
            .content_type(content_type)
            .body(ByteStream::from(data))
            .send()
            .await
            .map_err(s3_error)?;

        debug!(bucket = %self.bucket, key = %key, size, "Object stored in S3");

        Ok(StoredObject {
            key: key.to_string(),
            size,
            content_type: content_type.to_string(),
        })
    }

    async fn presign_get(&self, key: &str, expires_in: Duration) -> Result<SignedUrl> {
        validate_key(key)?;

        let presigning = PresigningConfig::expires_in(expires_in).map_err(s3_error)?;
        let request = self
            .client
            .get_object()
            .bucket(&self.bucket)
            .key(key)
            .presigned(presigning)
            .await
            .map_err(s3_error)?;

        let lifetime = chrono::Duration::from_std(expires_in).unwrap_or_else(|_| chrono::Duration::zero());

        Ok(SignedUrl {
            key: key.to_string(),
            url: request.uri().to_string(),
            expires_at: Utc::now() + lifetime,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn aws_config() -> AwsConfig {
        AwsConfig {
            region: "us-east-1".to_string(),
            access_key_id: "AKIDEXAMPLE".to_string(),
            secret_access_key: "wJalrXUtnFEMI/K7MDENG+bPxRfiCYEXAMPLEKEY".to_string(),
            session_token: None,
            endpoint_url: None,
        }
    }

    fn storage_config() -> StorageConfig {
        StorageConfig {
            bucket: "relay-uploads".to_string(),
            ..Default::default()
        }
    }

    #[tokio::test]
    async fn test_connect_requires_bucket() {
        let err = S3ObjectStore::connect(&aws_config(), &StorageConfig::default())
            .await
            .err()
            .unwrap();
        assert!(matches!(err, StorageError::Config(_)));
    }

    #[tokio::test]
    async fn test_presign_is_offline_and_scoped_to_key() {
        let store = S3ObjectStore::connect(&aws_config(), &storage_config()).await.unwrap();

        let signed = store
            .presign_get("uploads/2024/01/01/abc-report.pdf", Duration::from_secs(600))
            .await
            .unwrap();

        assert!(signed.url.contains("relay-uploads"));
        assert!(signed.url.contains("abc-report.pdf"));
        assert!(signed.url.contains("X-Amz-Expires=600"));
        assert!(signed.expires_at > Utc::now());
    }

    #[tokio::test]
    async fn test_presign_rejects_bad_key() {
        let store = S3ObjectStore::connect(&aws_config(), &storage_config()).await.unwrap();
        let err = store.presign_get("../etc", Duration::from_secs(60)).await.err().unwrap();
        assert!(matches!(err, StorageError::InvalidKey(_)));
    }
}

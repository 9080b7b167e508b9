//! AWS SDK configuration shared by the queue and storage clients

use aws_config::{BehaviorVersion, Region, SdkConfig};
use aws_credential_types::Credentials;
use tracing::info;

use crate::AwsConfig;

/// Build an SDK config from the static credentials and region in `aws`.
pub async fn load_sdk_config(aws: &AwsConfig) -> SdkConfig {
    let credentials = Credentials::new(
        aws.access_key_id.clone(),
        aws.secret_access_key.clone(),
        aws.session_token.clone(),
        None,
        "relaygate-config",
    );

    let mut loader = aws_config::defaults(BehaviorVersion::latest())
        .region(Region::new(aws.region.clone()))
        .credentials_provider(credentials);

    if let Some(endpoint_url) = &aws.endpoint_url {
        info!(endpoint = %endpoint_url, "Using custom AWS endpoint");
        loader = loader.endpoint_url(endpoint_url);
    }

    loader.load().await
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_sdk_config_uses_configured_region_and_endpoint() {
        let aws = AwsConfig {
            region: "eu-west-1".to_string(),
            access_key_id: "AKIA".to_string(),
            secret_access_key: "shh".to_string(),
            endpoint_url: Some("http://localhost:4566".to_string()),
            ..AwsConfig::default()
        };

        let sdk_config = load_sdk_config(&aws).await;

        assert_eq!(sdk_config.region().map(|r| r.as_ref()), Some("eu-west-1"));
        assert_eq!(sdk_config.endpoint_url(), Some("http://localhost:4566"));
        assert!(sdk_config.credentials_provider().is_some());
    }
}

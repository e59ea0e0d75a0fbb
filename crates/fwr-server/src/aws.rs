//! Shared AWS SDK configuration for the S3 and DynamoDB clients

use aws_config::{BehaviorVersion, Region, SdkConfig};
use aws_credential_types::Credentials;
use tracing::{debug, info};

use crate::config::AwsConfig;

/// Build the SDK configuration both clients derive from.
///
/// Static keys win when both halves are configured; otherwise the default
/// provider chain (environment, profile, container or instance role) applies.
pub async fn load_sdk_config(config: &AwsConfig) -> SdkConfig {
    debug!("Loading AWS configuration: {:?}", config);

    let mut loader =
        aws_config::defaults(BehaviorVersion::latest()).region(Region::new(config.region.clone()));

    if let (Some(access_key), Some(secret_key)) = (&config.access_key, &config.secret_key) {
        let credentials = Credentials::new(access_key, secret_key, None, None, "fwr-static");
        loader = loader.credentials_provider(credentials);
        info!(region = %config.region, "Using static AWS credentials");
    } else {
        info!(region = %config.region, "Using default AWS credential chain");
    }

    loader.load().await
}

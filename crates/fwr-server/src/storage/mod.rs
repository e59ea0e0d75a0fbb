use anyhow::{Context, Result};
use async_trait::async_trait;
use aws_config::SdkConfig;
use aws_sdk_s3::Client;
use std::path::Path;
use tokio::io::AsyncWriteExt;
use tracing::{debug, info, instrument};

pub mod config;
pub mod memory;

/// The object-store operations the pipeline needs.
///
/// Every call names its bucket because notifications may come from more
/// than one bucket.
#[async_trait]
pub trait ObjectStore: Send + Sync {
    async fn copy(&self, bucket: &str, source_key: &str, dest_key: &str) -> Result<()>;

    async fn delete(&self, bucket: &str, key: &str) -> Result<()>;

    async fn head(&self, bucket: &str, key: &str) -> Result<ObjectMetadata>;

    /// Stream the object into `dest`, returning the number of bytes written
    async fn download_to_file(&self, bucket: &str, key: &str, dest: &Path) -> Result<u64>;
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ObjectMetadata {
    pub size: i64,
}

/// S3-backed object store
#[derive(Clone)]
pub struct Storage {
    client: Client,
}

impl Storage {
    pub fn new(sdk_config: &SdkConfig, config: &config::StorageConfig) -> Self {
        debug!("Initializing storage with config: {:?}", config);

        let mut builder =
            aws_sdk_s3::config::Builder::from(sdk_config).force_path_style(config.path_style);

        if let Some(endpoint) = &config.endpoint {
            builder = builder.endpoint_url(endpoint);
        }

        info!(endpoint = ?config.endpoint, "Storage client initialized");

        Self {
            client: Client::from_conf(builder.build()),
        }
    }
}

/// `CopySource` must be URL-encoded; slashes between segments stay literal.
fn copy_source(bucket: &str, key: &str) -> String {
    let encoded: Vec<_> = key.split('/').map(|segment| urlencoding::encode(segment)).collect();
    format!("{}/{}", bucket, encoded.join("/"))
}

#[async_trait]
impl ObjectStore for Storage {
    #[instrument(skip(self))]
    async fn copy(&self, bucket: &str, source_key: &str, dest_key: &str) -> Result<()> {
        self.client
            .copy_object()
            .bucket(bucket)
            .copy_source(copy_source(bucket, source_key))
            .key(dest_key)
            .send()
            .await
            .with_context(|| format!("Failed to copy s3://{bucket}/{source_key} to {dest_key}"))?;

        debug!("Copied s3://{}/{} to s3://{}/{}", bucket, source_key, bucket, dest_key);

        Ok(())
    }

    #[instrument(skip(self))]
    async fn delete(&self, bucket: &str, key: &str) -> Result<()> {
        self.client
            .delete_object()
            .bucket(bucket)
            .key(key)
            .send()
            .await
            .with_context(|| format!("Failed to delete s3://{bucket}/{key}"))?;

        debug!("Deleted s3://{}/{}", bucket, key);

        Ok(())
    }

    #[instrument(skip(self))]
    async fn head(&self, bucket: &str, key: &str) -> Result<ObjectMetadata> {
        let response = self
            .client
            .head_object()
            .bucket(bucket)
            .key(key)
            .send()
            .await
            .with_context(|| format!("Failed to get metadata for s3://{bucket}/{key}"))?;

        Ok(ObjectMetadata {
            size: response.content_length().unwrap_or(0),
        })
    }

    #[instrument(skip(self, dest), fields(dest = %dest.display()))]
    async fn download_to_file(&self, bucket: &str, key: &str, dest: &Path) -> Result<u64> {
        let response = self
            .client
            .get_object()
            .bucket(bucket)
            .key(key)
            .send()
            .await
            .with_context(|| format!("Failed to download s3://{bucket}/{key}"))?;

        let mut body = response.body.into_async_read();
        let mut file = tokio::fs::File::create(dest)
            .await
            .with_context(|| format!("Failed to create {}", dest.display()))?;

        let written = tokio::io::copy(&mut body, &mut file)
            .await
            .context("Failed to stream S3 object to disk")?;
        file.flush().await?;

        debug!("Downloaded {} bytes from s3://{}/{}", written, bucket, key);

        Ok(written)
    }
}

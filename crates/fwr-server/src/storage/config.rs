use serde::{Deserialize, Serialize};
use std::env;

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct StorageConfig {
    /// S3-compatible endpoint override (MinIO, LocalStack)
    pub endpoint: Option<String>,
    pub path_style: bool,
    /// Bucket used by operator commands that do not name one
    pub default_bucket: Option<String>,
}

impl StorageConfig {
    pub fn from_env() -> Self {
        Self {
            endpoint: env::var("S3_ENDPOINT").ok().filter(|v| !v.is_empty()),
            path_style: env::var("S3_PATH_STYLE")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(false),
            default_bucket: env::var("S3_BUCKET").ok().filter(|v| !v.is_empty()),
        }
    }
}

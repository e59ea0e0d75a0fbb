//! Configuration management

use fwr_common::FwrError;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;

use crate::records::config::RecordsConfig;
use crate::storage::config::StorageConfig;

// ============================================================================
// Configuration Constants
// ============================================================================

/// Default HTTP bind host.
pub const DEFAULT_SERVER_HOST: &str = "127.0.0.1";

/// Default HTTP port.
pub const DEFAULT_SERVER_PORT: u16 = 8080;

/// Default shutdown timeout in seconds.
pub const DEFAULT_SHUTDOWN_TIMEOUT_SECS: u64 = 30;

/// Default region for both S3 and DynamoDB.
pub const DEFAULT_AWS_REGION: &str = "us-east-1";

/// Default wall-clock budget for processing one artifact, in seconds.
pub const DEFAULT_INVOCATION_TIMEOUT_SECS: u64 = 240;

/// Days a record stays readable after its artifact is deleted.
pub const DEFAULT_DELETED_TTL_DAYS: i64 = 10;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppConfig {
    pub server: ServerConfig,
    pub aws: AwsConfig,
    pub storage: StorageConfig,
    pub records: RecordsConfig,
    pub pipeline: PipelineConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
    pub shutdown_timeout_secs: u64,
}

/// Region and credentials shared by every AWS client
#[derive(Clone, Serialize, Deserialize)]
pub struct AwsConfig {
    pub region: String,
    /// Static credentials; when absent the default provider chain is used
    pub access_key: Option<String>,
    pub secret_key: Option<String>,
}

impl std::fmt::Debug for AwsConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AwsConfig")
            .field("region", &self.region)
            .field("access_key", &self.access_key.as_ref().map(|_| "<redacted>"))
            .field("secret_key", &self.secret_key.as_ref().map(|_| "<redacted>"))
            .finish()
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PipelineConfig {
    /// Root under which each invocation creates its own scratch directory
    pub scratch_dir: PathBuf,
    pub invocation_timeout_secs: u64,
    pub deleted_ttl_days: i64,
}

impl PipelineConfig {
    pub fn invocation_budget(&self) -> Duration {
        Duration::from_secs(self.invocation_timeout_secs)
    }

    pub fn deleted_ttl(&self) -> chrono::Duration {
        chrono::Duration::days(self.deleted_ttl_days)
    }
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            scratch_dir: std::env::temp_dir(),
            invocation_timeout_secs: DEFAULT_INVOCATION_TIMEOUT_SECS,
            deleted_ttl_days: DEFAULT_DELETED_TTL_DAYS,
        }
    }
}

fn env_parse<T: std::str::FromStr>(name: &str) -> Option<T> {
    std::env::var(name).ok().and_then(|s| s.parse().ok())
}

impl AwsConfig {
    pub fn from_env() -> Self {
        Self {
            region: std::env::var("AWS_REGION")
                .or_else(|_| std::env::var("AWS_DEFAULT_REGION"))
                .unwrap_or_else(|_| DEFAULT_AWS_REGION.to_string()),
            access_key: std::env::var("AWS_ACCESS_KEY_ID").ok(),
            secret_key: std::env::var("AWS_SECRET_ACCESS_KEY").ok(),
        }
    }
}

impl AppConfig {
    /// Load configuration from `.env`, the environment and defaults
    pub fn load() -> Result<Self, FwrError> {
        dotenvy::dotenv().ok();

        let defaults = PipelineConfig::default();
        let config = AppConfig {
            server: ServerConfig {
                host: std::env::var("FWR_HOST").unwrap_or_else(|_| DEFAULT_SERVER_HOST.to_string()),
                port: env_parse("FWR_PORT").unwrap_or(DEFAULT_SERVER_PORT),
                shutdown_timeout_secs: env_parse("FWR_SHUTDOWN_TIMEOUT")
                    .unwrap_or(DEFAULT_SHUTDOWN_TIMEOUT_SECS),
            },
            aws: AwsConfig::from_env(),
            storage: StorageConfig::from_env(),
            records: RecordsConfig::from_env(),
            pipeline: PipelineConfig {
                scratch_dir: std::env::var("FWR_SCRATCH_DIR")
                    .map(PathBuf::from)
                    .unwrap_or(defaults.scratch_dir),
                invocation_timeout_secs: env_parse("FWR_INVOCATION_TIMEOUT")
                    .unwrap_or(defaults.invocation_timeout_secs),
                deleted_ttl_days: env_parse("FWR_DELETED_TTL_DAYS")
                    .unwrap_or(defaults.deleted_ttl_days),
            },
        };

        config.validate()?;

        Ok(config)
    }

    pub fn validate(&self) -> Result<(), FwrError> {
        if self.server.port == 0 {
            return Err(FwrError::Config("Server port must be greater than 0".into()));
        }

        // Table names are opaque, only emptiness is checked
        if self.records.table_name.trim().is_empty() {
            return Err(FwrError::Config(
                "FIRMWARE_TABLE must name the release record table".into(),
            ));
        }

        if self.pipeline.invocation_timeout_secs == 0 {
            return Err(FwrError::Config(
                "FWR_INVOCATION_TIMEOUT must be greater than 0".into(),
            ));
        }

        if self.pipeline.deleted_ttl_days <= 0 {
            return Err(FwrError::Config(format!(
                "FWR_DELETED_TTL_DAYS must be positive, got {}",
                self.pipeline.deleted_ttl_days
            )));
        }

        if self.aws.access_key.is_some() != self.aws.secret_key.is_some() {
            tracing::warn!("Only one of AWS_ACCESS_KEY_ID / AWS_SECRET_ACCESS_KEY is set, using the default credential chain");
        }

        Ok(())
    }
}

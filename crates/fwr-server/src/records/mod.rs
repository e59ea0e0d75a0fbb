//! Release records: the durable trace of every processed upload
//!
//! One table holds both outcomes. Records are keyed by
//! `(product_id, version)` and carry the generated artifact name in
//! `zip_name`. Success records use the manifest's key as is. Error records
//! append `#<zip_name>` to the version, or use the artifact name as the
//! version when the manifest gave none, and fall back to
//! [`UNKNOWN_PRODUCT`]. Every failed attempt therefore gets a record of
//! its own and never replaces another attempt's record.

use anyhow::Result;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::PipelineError;
use crate::manifest::{scalar_string, Manifest};

pub mod config;
pub mod dynamo;
pub mod memory;

pub const UNKNOWN_PRODUCT: &str = "unknown";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ReleaseStatus {
    Processed,
    Error,
}

impl ReleaseStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            ReleaseStatus::Processed => "PROCESSED",
            ReleaseStatus::Error => "ERROR",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct RecordKey {
    pub product_id: String,
    pub version: String,
}

impl std::fmt::Display for RecordKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}@{}", self.product_id, self.version)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReleaseRecord {
    pub product_id: String,
    pub version: String,
    pub zip_name: String,
    /// File name as uploaded, kept for reference only
    pub original_name: String,
    pub release_status: ReleaseStatus,
    /// Manifest document as found in the archive, if it could be parsed
    pub manifest: Option<Value>,
    pub zip_sha256: Option<String>,
    pub zip_size: Option<i64>,
    /// Epoch seconds at which the outcome was recorded
    pub uploaded_at: i64,
    pub error: Option<String>,
    pub deleted: bool,
    /// Epoch seconds after which the table may purge the record
    pub ttl: Option<i64>,
}

impl ReleaseRecord {
    pub fn processed(
        zip_name: &str,
        original_name: &str,
        manifest: &Manifest,
        document: Value,
        zip_sha256: String,
        zip_size: i64,
        now: i64,
    ) -> Self {
        Self {
            product_id: manifest.product_id.clone(),
            version: manifest.version.clone(),
            zip_name: zip_name.to_string(),
            original_name: original_name.to_string(),
            release_status: ReleaseStatus::Processed,
            manifest: Some(document),
            zip_sha256: Some(zip_sha256),
            zip_size: Some(zip_size),
            uploaded_at: now,
            error: None,
            deleted: false,
            ttl: None,
        }
    }

    pub fn failed(
        zip_name: &str,
        original_name: &str,
        error: &PipelineError,
        document: Option<Value>,
        now: i64,
    ) -> Self {
        let key_field = |name: &str| {
            document
                .as_ref()
                .and_then(|doc| doc.get(name))
                .and_then(scalar_string)
                .filter(|s| !s.is_empty())
        };

        let product_id = key_field("product_id").unwrap_or_else(|| UNKNOWN_PRODUCT.to_string());
        let version = match key_field("version") {
            Some(version) => format!("{version}#{zip_name}"),
            None => zip_name.to_string(),
        };

        Self {
            product_id,
            version,
            zip_name: zip_name.to_string(),
            original_name: original_name.to_string(),
            release_status: ReleaseStatus::Error,
            manifest: document,
            zip_sha256: None,
            zip_size: None,
            uploaded_at: now,
            error: Some(error.to_string()),
            deleted: false,
            ttl: None,
        }
    }

    /// File the record under `key` instead of the key derived from it
    pub fn filed_under(mut self, key: RecordKey) -> Self {
        self.product_id = key.product_id;
        self.version = key.version;
        self
    }

    pub fn key(&self) -> RecordKey {
        RecordKey {
            product_id: self.product_id.clone(),
            version: self.version.clone(),
        }
    }
}

/// Durable home of release records
#[async_trait]
pub trait ReleaseStore: Send + Sync {
    /// Write the record, replacing any record with the same key
    async fn put(&self, record: &ReleaseRecord) -> Result<()>;

    /// Flag the record deleted and set its expiry.
    ///
    /// Applies only when the record exists, still refers to `zip_name` and
    /// is not already deleted. Returns whether it was applied; a record
    /// that fails those checks is not an error.
    async fn mark_deleted(&self, key: &RecordKey, zip_name: &str, expires_at: i64) -> Result<bool>;
}

/// Reverse lookup from an artifact name to the records that mention it
#[async_trait]
pub trait RecordLookup: Send + Sync {
    async fn find_by_zip_name(&self, zip_name: &str) -> Result<Vec<RecordKey>>;
}

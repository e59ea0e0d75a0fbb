use serde::{Deserialize, Serialize};
use std::env;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RecordsConfig {
    /// Combined release record table, passed through as-is
    pub table_name: String,
    /// DynamoDB endpoint override (DynamoDB Local)
    pub endpoint: Option<String>,
}

impl RecordsConfig {
    pub fn from_env() -> Self {
        Self {
            table_name: env::var("FIRMWARE_TABLE")
                .or_else(|_| env::var("DDB_FIRMWARE_TABLE"))
                .unwrap_or_default(),
            endpoint: env::var("DYNAMODB_ENDPOINT").ok().filter(|v| !v.is_empty()),
        }
    }
}

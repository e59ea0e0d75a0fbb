//! DynamoDB-backed release record table
//!
//! Table layout: partition key `product_id` (S), sort key `version` (S).
//! The table's TTL setting should point at the `ttl` attribute.

use anyhow::{Context, Result};
use async_trait::async_trait;
use aws_config::SdkConfig;
use aws_sdk_dynamodb::{types::AttributeValue, Client};
use serde_json::Value;
use std::collections::HashMap;
use tracing::{debug, info, instrument};

use super::{config::RecordsConfig, RecordKey, RecordLookup, ReleaseRecord, ReleaseStore};

const PRODUCT_ID: &str = "product_id";
const VERSION: &str = "version";
const ZIP_NAME: &str = "zip_name";
const DELETED: &str = "deleted";
const TTL: &str = "ttl";

type Item = HashMap<String, AttributeValue>;

#[derive(Clone)]
pub struct DynamoRecordStore {
    client: Client,
    table: String,
}

impl DynamoRecordStore {
    pub fn new(sdk_config: &SdkConfig, config: &RecordsConfig) -> Self {
        let mut builder = aws_sdk_dynamodb::config::Builder::from(sdk_config);
        if let Some(endpoint) = &config.endpoint {
            builder = builder.endpoint_url(endpoint);
        }

        info!(table = %config.table_name, endpoint = ?config.endpoint, "Record store initialized");

        Self {
            client: Client::from_conf(builder.build()),
            table: config.table_name.clone(),
        }
    }
}

/// Convert a JSON document into a DynamoDB attribute, recursively
pub fn json_to_attribute(value: &Value) -> AttributeValue {
    match value {
        Value::Null => AttributeValue::Null(true),
        Value::Bool(b) => AttributeValue::Bool(*b),
        Value::Number(n) => AttributeValue::N(n.to_string()),
        Value::String(s) => AttributeValue::S(s.clone()),
        Value::Array(items) => AttributeValue::L(items.iter().map(json_to_attribute).collect()),
        Value::Object(map) => AttributeValue::M(
            map.iter()
                .map(|(k, v)| (k.clone(), json_to_attribute(v)))
                .collect(),
        ),
    }
}

fn to_item(record: &ReleaseRecord) -> Item {
    let mut item = Item::new();
    item.insert(PRODUCT_ID.into(), AttributeValue::S(record.product_id.clone()));
    item.insert(VERSION.into(), AttributeValue::S(record.version.clone()));
    item.insert(ZIP_NAME.into(), AttributeValue::S(record.zip_name.clone()));
    item.insert("original_name".into(), AttributeValue::S(record.original_name.clone()));
    item.insert(
        "release_status".into(),
        AttributeValue::S(record.release_status.as_str().to_string()),
    );
    item.insert("uploaded_at".into(), AttributeValue::N(record.uploaded_at.to_string()));
    item.insert(DELETED.into(), AttributeValue::Bool(record.deleted));

    if let Some(manifest) = &record.manifest {
        item.insert("manifest".into(), json_to_attribute(manifest));
    }
    if let Some(sha) = &record.zip_sha256 {
        item.insert("zip_sha256".into(), AttributeValue::S(sha.clone()));
    }
    if let Some(size) = record.zip_size {
        item.insert("zip_size".into(), AttributeValue::N(size.to_string()));
    }
    if let Some(error) = &record.error {
        item.insert("error".into(), AttributeValue::S(error.clone()));
    }
    if let Some(ttl) = record.ttl {
        item.insert(TTL.into(), AttributeValue::N(ttl.to_string()));
    }

    item
}

fn key_of(item: &Item) -> Option<RecordKey> {
    match (item.get(PRODUCT_ID), item.get(VERSION)) {
        (Some(AttributeValue::S(product_id)), Some(AttributeValue::S(version))) => Some(RecordKey {
            product_id: product_id.clone(),
            version: version.clone(),
        }),
        _ => None,
    }
}

#[async_trait]
impl ReleaseStore for DynamoRecordStore {
    #[instrument(skip(self, record), fields(key = %record.key(), zip_name = %record.zip_name))]
    async fn put(&self, record: &ReleaseRecord) -> Result<()> {
        self.client
            .put_item()
            .table_name(&self.table)
            .set_item(Some(to_item(record)))
            .send()
            .await
            .with_context(|| format!("Failed to write release record {}", record.key()))?;

        debug!("Wrote release record to {}", self.table);

        Ok(())
    }

    #[instrument(skip(self))]
    async fn mark_deleted(&self, key: &RecordKey, zip_name: &str, expires_at: i64) -> Result<bool> {
        let result = self
            .client
            .update_item()
            .table_name(&self.table)
            .key(PRODUCT_ID, AttributeValue::S(key.product_id.clone()))
            .key(VERSION, AttributeValue::S(key.version.clone()))
            .update_expression("SET #deleted = :true, #ttl = :ttl")
            .condition_expression(
                "attribute_exists(#pk) AND #zip = :zip AND (attribute_not_exists(#deleted) OR #deleted = :false)",
            )
            .expression_attribute_names("#pk", PRODUCT_ID)
            .expression_attribute_names("#zip", ZIP_NAME)
            .expression_attribute_names("#deleted", DELETED)
            .expression_attribute_names("#ttl", TTL)
            .expression_attribute_values(":true", AttributeValue::Bool(true))
            .expression_attribute_values(":false", AttributeValue::Bool(false))
            .expression_attribute_values(":zip", AttributeValue::S(zip_name.to_string()))
            .expression_attribute_values(":ttl", AttributeValue::N(expires_at.to_string()))
            .send()
            .await;

        match result {
            Ok(_) => Ok(true),
            Err(err)
                if err
                    .as_service_error()
                    .is_some_and(|e| e.is_conditional_check_failed_exception()) =>
            {
                debug!("Record {} absent, replaced or already deleted", key);
                Ok(false)
            }
            Err(err) => {
                Err(anyhow::Error::new(err).context(format!("Failed to mark {key} deleted")))
            }
        }
    }
}

#[async_trait]
impl RecordLookup for DynamoRecordStore {
    /// Full table scan filtered on `zip_name`; fine while the table stays small.
    #[instrument(skip(self))]
    async fn find_by_zip_name(&self, zip_name: &str) -> Result<Vec<RecordKey>> {
        let mut keys = Vec::new();
        let mut start_key: Option<Item> = None;

        loop {
            let page = self
                .client
                .scan()
                .table_name(&self.table)
                .filter_expression("#zip = :zip")
                .projection_expression("#pk, #sk")
                .expression_attribute_names("#zip", ZIP_NAME)
                .expression_attribute_names("#pk", PRODUCT_ID)
                .expression_attribute_names("#sk", VERSION)
                .expression_attribute_values(":zip", AttributeValue::S(zip_name.to_string()))
                .set_exclusive_start_key(start_key.take())
                .send()
                .await
                .with_context(|| format!("Failed to scan {} for {zip_name}", self.table))?;

            keys.extend(page.items().iter().filter_map(key_of));

            match page.last_evaluated_key() {
                Some(last) if !last.is_empty() => start_key = Some(last.clone()),
                _ => break,
            }
        }

        debug!("Found {} record(s) for {}", keys.len(), zip_name);

        Ok(keys)
    }
}

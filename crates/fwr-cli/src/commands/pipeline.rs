//! `fwr process-upload` and `fwr reconcile-delete` against the configured
//! S3 bucket and DynamoDB table

use anyhow::{Context, Result};
use fwr_server::{
    aws::load_sdk_config,
    config::AppConfig,
    events::ObjectRef,
    pipeline::{DeletionOutcome, DeletionReconciler, UploadOutcome, UploadProcessor},
    records::dynamo::DynamoRecordStore,
    storage::Storage,
};
use std::sync::Arc;
use tracing::info;

fn resolve_bucket(bucket: Option<String>, config: &AppConfig) -> Result<String> {
    bucket
        .or_else(|| config.storage.default_bucket.clone())
        .context("No --bucket given and S3_BUCKET is not set")
}

pub async fn process_upload(bucket: Option<String>, key: String) -> Result<UploadOutcome> {
    let config = AppConfig::load()?;
    let sdk_config = load_sdk_config(&config.aws).await;

    let processor = UploadProcessor::new(
        Arc::new(Storage::new(&sdk_config, &config.storage)),
        Arc::new(DynamoRecordStore::new(&sdk_config, &config.records)),
        &config.pipeline,
    );

    let object = ObjectRef {
        bucket: resolve_bucket(bucket, &config)?,
        key,
    };
    info!("Processing {}", object);
    Ok(processor.process(&object).await?)
}

pub async fn reconcile_delete(bucket: Option<String>, key: String) -> Result<DeletionOutcome> {
    let config = AppConfig::load()?;
    let sdk_config = load_sdk_config(&config.aws).await;
    let records = Arc::new(DynamoRecordStore::new(&sdk_config, &config.records));

    let reconciler = DeletionReconciler::new(records.clone(), records, &config.pipeline);

    let object = ObjectRef {
        bucket: resolve_bucket(bucket, &config)?,
        key,
    };
    info!("Reconciling deletion of {}", object);
    Ok(reconciler.reconcile(&object).await?)
}

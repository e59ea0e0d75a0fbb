//! Deletion reconciliation
//!
//! Removing an artifact from `processed/` or `errors/` does not remove its
//! record. The record is flagged deleted and given an expiry, and the table's
//! own TTL handling purges it later.

use serde::Serialize;
use std::sync::Arc;
use tracing::{debug, info, instrument};

use crate::config::PipelineConfig;
use crate::error::{PipelineError, PipelineResult};
use crate::events::ObjectRef;
use crate::lifecycle::{basename, is_artifact, Stage};
use crate::records::{RecordKey, RecordLookup, ReleaseStore};

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum DeletionOutcome {
    Ignored {
        key: String,
    },
    Reconciled {
        zip_name: String,
        expires_at: i64,
        /// Records flagged by this call
        marked: Vec<RecordKey>,
        /// Matching records left alone: replaced, vanished or already deleted
        skipped: Vec<RecordKey>,
    },
}

pub struct DeletionReconciler {
    records: Arc<dyn ReleaseStore>,
    lookup: Arc<dyn RecordLookup>,
    ttl: chrono::Duration,
}

fn is_reconcilable(key: &str) -> bool {
    Stage::of_key(key).is_some_and(Stage::is_terminal) && is_artifact(key)
}

impl DeletionReconciler {
    pub fn new(
        records: Arc<dyn ReleaseStore>,
        lookup: Arc<dyn RecordLookup>,
        config: &PipelineConfig,
    ) -> Self {
        Self {
            records,
            lookup,
            ttl: config.deleted_ttl(),
        }
    }

    /// Reconcile every object in order, returning the first failure after
    /// all have run.
    pub async fn reconcile_all(&self, objects: &[ObjectRef]) -> PipelineResult<Vec<DeletionOutcome>> {
        let mut outcomes = Vec::with_capacity(objects.len());
        let mut first_error = None;

        for object in objects {
            match self.reconcile(object).await {
                Ok(outcome) => outcomes.push(outcome),
                Err(e) => {
                    first_error.get_or_insert(e);
                }
            }
        }

        match first_error {
            Some(e) => Err(e),
            None => Ok(outcomes),
        }
    }

    #[instrument(skip(self, object), fields(bucket = %object.bucket, key = %object.key))]
    pub async fn reconcile(&self, object: &ObjectRef) -> PipelineResult<DeletionOutcome> {
        if !is_reconcilable(&object.key) {
            debug!("Ignoring deletion outside processed/ and errors/");
            return Ok(DeletionOutcome::Ignored {
                key: object.key.clone(),
            });
        }

        let zip_name = basename(&object.key).to_string();
        let expires_at = (chrono::Utc::now() + self.ttl).timestamp();

        let keys = self
            .lookup
            .find_by_zip_name(&zip_name)
            .await
            .map_err(|e| PipelineError::persistence(format!("Failed to look up {zip_name}"), e))?;

        let mut marked = Vec::new();
        let mut skipped = Vec::new();

        for key in keys {
            let applied = self
                .records
                .mark_deleted(&key, &zip_name, expires_at)
                .await
                .map_err(|e| PipelineError::persistence(format!("Failed to mark {key} deleted"), e))?;

            if applied {
                marked.push(key);
            } else {
                skipped.push(key);
            }
        }

        info!(
            zip_name = %zip_name,
            expires_at,
            marked = marked.len(),
            skipped = skipped.len(),
            "Deletion reconciled"
        );

        Ok(DeletionOutcome::Reconciled {
            zip_name,
            expires_at,
            marked,
            skipped,
        })
    }
}

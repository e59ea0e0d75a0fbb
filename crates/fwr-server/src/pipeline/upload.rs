//! Upload processing: the state machine that takes an artifact from
//! `incoming/` to `processed/` or `errors/`
//!
//! Every invocation that gets as far as the first move leaves a durable
//! trace: either a `PROCESSED` record with the artifact under
//! `processed/`, or an `ERROR` record with the artifact (best effort)
//! under `errors/`. Failures are reported to the caller after the trace
//! has been written.

use serde::Serialize;
use serde_json::Value;
use std::future::Future;
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tracing::{error, info, instrument, warn};

use super::stager::move_object;
use super::verify::{verify_archive, VerificationFailure, VerifiedRelease};
use crate::config::PipelineConfig;
use crate::error::{PipelineError, PipelineResult};
use crate::events::ObjectRef;
use crate::lifecycle::{basename, generate_artifact_name, is_artifact, Stage};
use crate::records::{RecordKey, ReleaseRecord, ReleaseStore};
use crate::storage::ObjectStore;

const ARCHIVE_FILE: &str = "artifact.zip";
const EXTRACT_DIR: &str = "unpacked";

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum UploadOutcome {
    /// Not an artifact upload under `incoming/`; nothing was touched
    Ignored { key: String },
    Processed {
        zip_name: String,
        original_name: String,
        record: RecordKey,
        processed_key: String,
        zip_sha256: String,
    },
}

pub struct UploadProcessor {
    objects: Arc<dyn ObjectStore>,
    records: Arc<dyn ReleaseStore>,
    scratch_root: PathBuf,
    budget: Duration,
}

/// A failure after acceptance, with what its error record needs
#[derive(Debug)]
struct StagedFailure {
    error: PipelineError,
    manifest: Option<Value>,
    /// Key of this attempt's success record once its write was issued
    claimed: Option<RecordKey>,
}

impl From<VerificationFailure> for StagedFailure {
    fn from(failure: VerificationFailure) -> Self {
        Self {
            error: failure.error,
            manifest: failure.manifest,
            claimed: None,
        }
    }
}

impl From<PipelineError> for StagedFailure {
    fn from(error: PipelineError) -> Self {
        VerificationFailure::from(error).into()
    }
}

/// Keys under `incoming/` ending in the artifact extension. Everything
/// else, including the copies this processor writes, is ignored.
fn is_upload(key: &str) -> bool {
    Stage::of_key(key) == Some(Stage::Incoming) && is_artifact(key)
}

fn now() -> i64 {
    chrono::Utc::now().timestamp()
}

/// Wait for blocking verification until `deadline`.
///
/// Past the deadline `cancel` is raised and the task is awaited until it
/// stops, so no verification work or scratch data outlives the call.
async fn join_within<T>(
    deadline: Instant,
    budget: Duration,
    mut task: JoinHandle<Result<T, VerificationFailure>>,
    cancel: &AtomicBool,
) -> Result<T, VerificationFailure> {
    let joined = match tokio::time::timeout_at(deadline, &mut task).await {
        Ok(joined) => joined,
        Err(_) => {
            warn!("Invocation budget exhausted during verification, cancelling");
            cancel.store(true, Ordering::Relaxed);
            if let Err(e) = task.await {
                warn!(error = %e, "Cancelled verification task did not finish cleanly");
            }
            return Err(PipelineError::Timeout(budget).into());
        }
    };

    joined.map_err(|e| PipelineError::Scratch(std::io::Error::other(e.to_string())))?
}

impl UploadProcessor {
    pub fn new(
        objects: Arc<dyn ObjectStore>,
        records: Arc<dyn ReleaseStore>,
        config: &PipelineConfig,
    ) -> Self {
        Self {
            objects,
            records,
            scratch_root: config.scratch_dir.clone(),
            budget: config.invocation_budget(),
        }
    }

    /// Process every object in order.
    ///
    /// A failure does not stop later objects; the first failure is
    /// returned once all of them have run.
    pub async fn process_all(&self, objects: &[ObjectRef]) -> PipelineResult<Vec<UploadOutcome>> {
        let mut outcomes = Vec::with_capacity(objects.len());
        let mut first_error = None;

        for object in objects {
            match self.process(object).await {
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

    /// Take one upload through the lifecycle.
    ///
    /// Every step from the first move to the terminal move shares one
    /// deadline. The failure trace is written after it, whatever time is
    /// left.
    #[instrument(skip(self, object), fields(bucket = %object.bucket, key = %object.key))]
    pub async fn process(&self, object: &ObjectRef) -> PipelineResult<UploadOutcome> {
        if !is_upload(&object.key) {
            info!("Ignoring object outside incoming/ or without .zip extension");
            return Ok(UploadOutcome::Ignored {
                key: object.key.clone(),
            });
        }

        let deadline = Instant::now() + self.budget;
        let original_name = basename(&object.key).to_string();
        let zip_name = generate_artifact_name();
        let processing_key = Stage::Processing.key(&zip_name);
        info!(zip_name = %zip_name, original_name = %original_name, "Accepted upload");

        let staged = self
            .within(
                deadline,
                move_object(self.objects.as_ref(), &object.bucket, &object.key, &processing_key),
            )
            .await;
        if let Err(e) = staged {
            return Err(self
                .record_failure(&object.bucket, &zip_name, &original_name, None, e.into())
                .await);
        }

        match self
            .complete(&object.bucket, &zip_name, &original_name, &processing_key, deadline)
            .await
        {
            Ok((record, processed_key)) => {
                info!(
                    zip_name = %zip_name,
                    record = %record.key(),
                    processed_key = %processed_key,
                    "Release processed"
                );
                Ok(UploadOutcome::Processed {
                    record: record.key(),
                    zip_sha256: record.zip_sha256.clone().unwrap_or_default(),
                    zip_name,
                    original_name,
                    processed_key,
                })
            }
            Err(failure) => Err(self
                .record_failure(
                    &object.bucket,
                    &zip_name,
                    &original_name,
                    Some(&processing_key),
                    failure,
                )
                .await),
        }
    }

    async fn within<T>(
        &self,
        deadline: Instant,
        step: impl Future<Output = PipelineResult<T>>,
    ) -> PipelineResult<T> {
        tokio::time::timeout_at(deadline, step)
            .await
            .unwrap_or_else(|_| Err(PipelineError::Timeout(self.budget)))
    }

    /// Steps after staging: verify, persist the success record, then move
    /// the artifact to `processed/`.
    async fn complete(
        &self,
        bucket: &str,
        zip_name: &str,
        original_name: &str,
        processing_key: &str,
        deadline: Instant,
    ) -> Result<(ReleaseRecord, String), StagedFailure> {
        let (release, zip_size) = self.verify_staged(bucket, processing_key, deadline).await?;

        let record = ReleaseRecord::processed(
            zip_name,
            original_name,
            &release.manifest,
            release.manifest_document,
            release.zip_sha256,
            zip_size,
            now(),
        );
        let failed = |error: PipelineError| StagedFailure {
            error,
            manifest: record.manifest.clone(),
            claimed: Some(record.key()),
        };

        let written = self
            .within(deadline, async {
                self.records.put(&record).await.map_err(|e| {
                    PipelineError::persistence(
                        format!("Failed to write release record {}", record.key()),
                        e,
                    )
                })
            })
            .await;
        // A put that timed out may still land, so the key stays claimed
        written.map_err(|error| match error {
            PipelineError::Timeout(_) => failed(error),
            _ => StagedFailure {
                claimed: None,
                ..failed(error)
            },
        })?;

        let processed_key = Stage::Processed.key(zip_name);
        self.within(
            deadline,
            move_object(self.objects.as_ref(), bucket, processing_key, &processed_key),
        )
        .await
        .map_err(failed)?;

        Ok((record, processed_key))
    }

    /// Read metadata, download into a fresh scratch directory and verify.
    ///
    /// The scratch directory moves into the blocking verification task and
    /// is removed when that task ends.
    async fn verify_staged(
        &self,
        bucket: &str,
        processing_key: &str,
        deadline: Instant,
    ) -> Result<(VerifiedRelease, i64), VerificationFailure> {
        let scratch = tempfile::Builder::new()
            .prefix("fwr-")
            .tempdir_in(&self.scratch_root)
            .map_err(PipelineError::Scratch)?;

        let metadata = self
            .within(deadline, async {
                self.objects.head(bucket, processing_key).await.map_err(|e| {
                    let context = format!("Failed to read metadata of {processing_key}");
                    PipelineError::storage(context, e)
                })
            })
            .await?;

        let zip_path = scratch.path().join(ARCHIVE_FILE);
        self.within(deadline, async {
            self.objects
                .download_to_file(bucket, processing_key, &zip_path)
                .await
                .map_err(|e| {
                    PipelineError::storage(format!("Failed to download {processing_key}"), e)
                })
        })
        .await?;

        let cancel = Arc::new(AtomicBool::new(false));
        let task = tokio::task::spawn_blocking({
            let cancel = Arc::clone(&cancel);
            move || {
                let result = verify_archive(&zip_path, &scratch.path().join(EXTRACT_DIR), &cancel);
                drop(scratch);
                result
            }
        });
        let release = join_within(deadline, self.budget, task, &cancel).await?;

        Ok((release, metadata.size))
    }

    /// Write the error record and move the artifact to `errors/`, then hand
    /// back the error to report.
    ///
    /// The record replaces this attempt's own success record when one was
    /// already written; otherwise it gets a key of its own. The `errors/`
    /// move is attempted even when the record write fails and its own
    /// failure is only logged.
    async fn record_failure(
        &self,
        bucket: &str,
        zip_name: &str,
        original_name: &str,
        processing_key: Option<&str>,
        failure: StagedFailure,
    ) -> PipelineError {
        let StagedFailure {
            error,
            manifest,
            claimed,
        } = failure;
        error!(
            zip_name = %zip_name,
            kind = error.kind(),
            error = %error,
            "Release processing failed"
        );

        let mut record = ReleaseRecord::failed(zip_name, original_name, &error, manifest, now());
        if let Some(key) = claimed {
            record = record.filed_under(key);
        }
        let written = self.records.put(&record).await;

        if let Some(processing_key) = processing_key {
            let error_key = Stage::Errors.key(zip_name);
            match move_object(self.objects.as_ref(), bucket, processing_key, &error_key).await {
                Ok(_) => info!(error_key = %error_key, "Moved failed artifact"),
                Err(e) => warn!(error = %e, "Could not move failed artifact to errors/"),
            }
        }

        match written {
            Ok(()) => error,
            Err(e) => PipelineError::persistence(
                format!("Failed to write error record {} after: {error}", record.key()),
                e,
            ),
        }
    }
}

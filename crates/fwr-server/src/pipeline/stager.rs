//! Rename-like moves between lifecycle prefixes

use tracing::{debug, warn};

use crate::error::{PipelineError, PipelineResult};
use crate::storage::ObjectStore;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MoveOutcome {
    Moved,
    /// The copy landed but the source could not be deleted, so the object
    /// now exists under both keys.
    SourceRetained,
}

/// Copy `source_key` to `dest_key`, then delete the source.
///
/// Not atomic. A failed copy is a [`PipelineError::Storage`]; a failed
/// delete after a successful copy is logged and reported as
/// [`MoveOutcome::SourceRetained`].
pub async fn move_object(
    store: &dyn ObjectStore,
    bucket: &str,
    source_key: &str,
    dest_key: &str,
) -> PipelineResult<MoveOutcome> {
    store
        .copy(bucket, source_key, dest_key)
        .await
        .map_err(|e| PipelineError::storage(format!("Failed to move {source_key} to {dest_key}"), e))?;

    match store.delete(bucket, source_key).await {
        Ok(()) => {
            debug!(bucket, source_key, dest_key, "Moved object");
            Ok(MoveOutcome::Moved)
        }
        Err(e) => {
            warn!(
                bucket,
                source_key,
                dest_key,
                error = %format!("{e:#}"),
                "Copied object but could not delete the source"
            );
            Ok(MoveOutcome::SourceRetained)
        }
    }
}

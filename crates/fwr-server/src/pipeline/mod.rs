//! The release pipeline: staging, verification, upload processing and
//! deletion reconciliation

pub mod deletion;
pub mod stager;
pub mod upload;
pub mod verify;

pub use deletion::{DeletionOutcome, DeletionReconciler};
pub use stager::{move_object, MoveOutcome};
pub use upload::{UploadOutcome, UploadProcessor};
pub use verify::{verify_archive, VerificationFailure, VerifiedRelease};

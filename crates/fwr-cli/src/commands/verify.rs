//! `fwr verify`: the archive checks of the upload processor, run locally

use anyhow::{Context, Result};
use fwr_server::pipeline::verify_archive;
use serde::Serialize;
use serde_json::Value;
use std::path::{Path, PathBuf};
use std::sync::atomic::AtomicBool;
use tracing::debug;

#[derive(Debug, Serialize)]
pub struct VerifyReport {
    pub archive: PathBuf,
    pub valid: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub zip_sha256: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub files_checked: Option<usize>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub manifest: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<ReportError>,
}

#[derive(Debug, Serialize)]
pub struct ReportError {
    pub kind: &'static str,
    pub message: String,
}

pub fn run(archive: &Path) -> Result<VerifyReport> {
    let scratch = tempfile::tempdir().context("Failed to create scratch directory")?;
    debug!(scratch = %scratch.path().display(), "Verifying {}", archive.display());

    let never_cancelled = AtomicBool::new(false);
    let report = match verify_archive(archive, &scratch.path().join("unpacked"), &never_cancelled) {
        Ok(release) => VerifyReport {
            archive: archive.to_path_buf(),
            valid: true,
            zip_sha256: Some(release.zip_sha256),
            files_checked: Some(release.manifest.files.len()),
            manifest: Some(release.manifest_document),
            error: None,
        },
        Err(failure) => VerifyReport {
            archive: archive.to_path_buf(),
            valid: false,
            zip_sha256: None,
            files_checked: None,
            manifest: failure.manifest,
            error: Some(ReportError {
                kind: failure.error.kind(),
                message: failure.error.to_string(),
            }),
        },
    };

    Ok(report)
}

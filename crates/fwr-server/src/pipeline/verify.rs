//! Local verification of a downloaded archive
//!
//! Everything here is blocking file-system work; async callers run it on
//! the blocking pool.

use fwr_common::checksum::{compute_sha256, verify_sha256};
use fwr_common::FwrError;
use serde::Serialize;
use serde_json::Value;
use std::fs::File;
use std::path::Path;
use std::sync::atomic::AtomicBool;
use tracing::{debug, instrument};

use crate::archive::{ensure_active, extract_zip, Cancellable};
use crate::error::{PipelineError, PipelineResult};
use crate::lifecycle::MANIFEST_FILE;
use crate::manifest::{parse_document, validate_document, Manifest};

/// A release whose every declared file matched its digest
#[derive(Debug, Clone, Serialize)]
pub struct VerifiedRelease {
    pub manifest: Manifest,
    /// The manifest exactly as it appeared in the archive
    pub manifest_document: Value,
    pub zip_sha256: String,
}

/// Why verification stopped, plus the manifest document if one was read
#[derive(Debug)]
pub struct VerificationFailure {
    pub error: PipelineError,
    pub manifest: Option<Value>,
}

impl From<PipelineError> for VerificationFailure {
    fn from(error: PipelineError) -> Self {
        Self {
            error,
            manifest: None,
        }
    }
}

fn hashing_error(err: FwrError, cancel: &AtomicBool) -> PipelineError {
    if let Err(cancelled) = ensure_active(cancel) {
        return cancelled;
    }
    match err {
        FwrError::Io(e) => PipelineError::Scratch(e),
        other => PipelineError::Scratch(std::io::Error::other(other.to_string())),
    }
}

/// Hash the archive, unpack it into `extract_dir` and check its contents
/// against the manifest at the archive root.
///
/// Files are checked in manifest order and the first problem ends the run.
/// Raising `cancel` stops the run at the next read with
/// [`PipelineError::Cancelled`].
#[instrument(skip_all, fields(archive = %zip_path.display()))]
pub fn verify_archive(
    zip_path: &Path,
    extract_dir: &Path,
    cancel: &AtomicBool,
) -> Result<VerifiedRelease, VerificationFailure> {
    let file = File::open(zip_path).map_err(PipelineError::Scratch)?;
    let mut archive = Cancellable::new(file, cancel);
    let zip_sha256 = compute_sha256(&mut archive).map_err(|e| hashing_error(e, cancel))?;
    debug!(zip_sha256 = %zip_sha256, "Hashed archive");

    extract_zip(zip_path, extract_dir, cancel)?;

    let manifest_path = extract_dir.join(MANIFEST_FILE);
    if !manifest_path.is_file() {
        return Err(PipelineError::MissingManifest.into());
    }

    let bytes = std::fs::read(&manifest_path).map_err(PipelineError::Scratch)?;
    let document = parse_document(&bytes)?;

    match check_contents(&document, extract_dir, cancel) {
        Ok(manifest) => Ok(VerifiedRelease {
            manifest,
            manifest_document: document,
            zip_sha256,
        }),
        Err(error) => Err(VerificationFailure {
            error,
            manifest: Some(document),
        }),
    }
}

fn check_contents(
    document: &Value,
    extract_dir: &Path,
    cancel: &AtomicBool,
) -> PipelineResult<Manifest> {
    let manifest = validate_document(document)?;

    for entry in &manifest.files {
        ensure_active(cancel)?;

        let path = extract_dir.join(&entry.name);
        if !path.is_file() {
            return Err(PipelineError::MissingFile(entry.name.clone()));
        }

        let mut file = Cancellable::new(File::open(&path)?, cancel);
        match verify_sha256(&mut file, &entry.sha256) {
            Ok(_) => debug!(file = %entry.name, "Digest verified"),
            Err(FwrError::ChecksumMismatch { expected, actual }) => {
                return Err(PipelineError::HashMismatch {
                    name: entry.name.clone(),
                    expected,
                    actual,
                });
            }
            Err(other) => return Err(hashing_error(other, cancel)),
        }
    }

    Ok(manifest)
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use serde_json::json;
    use sha2::{Digest, Sha256};
    use std::io::{Cursor, Write};
    use zip::write::SimpleFileOptions;

    fn active() -> AtomicBool {
        AtomicBool::new(false)
    }

    fn sha256_hex(data: &[u8]) -> String {
        hex::encode(Sha256::digest(data))
    }

    fn write_zip(path: &Path, entries: &[(&str, Vec<u8>)]) {
        let mut writer = zip::ZipWriter::new(Cursor::new(Vec::new()));
        for (name, data) in entries {
            writer.start_file(*name, SimpleFileOptions::default()).unwrap();
            writer.write_all(data).unwrap();
        }
        std::fs::write(path, writer.finish().unwrap().into_inner()).unwrap();
    }

    fn manifest_for(files: &[(&str, String)]) -> Vec<u8> {
        let files: Vec<_> = files
            .iter()
            .map(|(name, sha)| json!({ "name": name, "sha256": sha }))
            .collect();
        serde_json::to_vec(&json!({
            "class": "firmware",
            "product_id": "ctrl-4ch",
            "application": "controller",
            "branch": "main",
            "version": "1.4.2",
            "commit": "9f1c2ab",
            "created": "2024-05-01T12:00:00Z",
            "files": files
        }))
        .unwrap()
    }

    #[test]
    fn test_valid_archive() {
        let scratch = tempfile::tempdir().unwrap();
        let zip_path = scratch.path().join("a.zip");
        let firmware = b"firmware image".to_vec();
        write_zip(
            &zip_path,
            &[
                ("manifest.json", manifest_for(&[("firmware.bin", sha256_hex(&firmware).to_uppercase())])),
                ("firmware.bin", firmware),
            ],
        );

        let release = verify_archive(&zip_path, &scratch.path().join("x"), &active()).unwrap();
        assert_eq!(release.manifest.version, "1.4.2");
        assert_eq!(release.zip_sha256, sha256_hex(&std::fs::read(&zip_path).unwrap()));
        assert_eq!(release.manifest_document["product_id"], "ctrl-4ch");
    }

    #[test]
    fn test_first_mismatch_reported() {
        let scratch = tempfile::tempdir().unwrap();
        let zip_path = scratch.path().join("a.zip");
        write_zip(
            &zip_path,
            &[
                (
                    "manifest.json",
                    manifest_for(&[
                        ("firmware.bin", sha256_hex(b"original")),
                        ("extra.bin", sha256_hex(b"also wrong")),
                    ]),
                ),
                ("firmware.bin", b"tampered".to_vec()),
                ("extra.bin", b"tampered too".to_vec()),
            ],
        );

        let failure = verify_archive(&zip_path, &scratch.path().join("x"), &active()).unwrap_err();
        assert!(matches!(
            &failure.error,
            PipelineError::HashMismatch { name, .. } if name == "firmware.bin"
        ));
        assert!(failure.manifest.is_some());
    }

    #[test]
    fn test_missing_declared_file() {
        let scratch = tempfile::tempdir().unwrap();
        let zip_path = scratch.path().join("a.zip");
        write_zip(
            &zip_path,
            &[("manifest.json", manifest_for(&[("firmware.bin", "0".repeat(64))]))],
        );

        let failure = verify_archive(&zip_path, &scratch.path().join("x"), &active()).unwrap_err();
        assert_eq!(failure.error.to_string(), "Missing file: firmware.bin");
    }

    #[test]
    fn test_manifest_must_be_at_root() {
        let scratch = tempfile::tempdir().unwrap();
        let zip_path = scratch.path().join("a.zip");
        write_zip(&zip_path, &[("nested/manifest.json", manifest_for(&[]))]);

        let failure = verify_archive(&zip_path, &scratch.path().join("x"), &active()).unwrap_err();
        assert!(matches!(failure.error, PipelineError::MissingManifest));
        assert!(failure.manifest.is_none());
    }

    #[test]
    fn test_schema_failure_keeps_document() {
        let scratch = tempfile::tempdir().unwrap();
        let zip_path = scratch.path().join("a.zip");
        write_zip(&zip_path, &[("manifest.json", br#"{"product_id":"ctrl-4ch"}"#.to_vec())]);

        let failure = verify_archive(&zip_path, &scratch.path().join("x"), &active()).unwrap_err();
        assert_eq!(failure.error.to_string(), "Manifest missing required field: class");
        assert_eq!(failure.manifest.unwrap()["product_id"], "ctrl-4ch");
    }

    #[test]
    fn test_cancelled_before_unpacking() {
        let scratch = tempfile::tempdir().unwrap();
        let zip_path = scratch.path().join("a.zip");
        let firmware = b"firmware image".to_vec();
        write_zip(
            &zip_path,
            &[
                ("manifest.json", manifest_for(&[("firmware.bin", sha256_hex(&firmware))])),
                ("firmware.bin", firmware),
            ],
        );

        let extract_dir = scratch.path().join("x");
        let failure = verify_archive(&zip_path, &extract_dir, &AtomicBool::new(true)).unwrap_err();
        assert!(matches!(failure.error, PipelineError::Cancelled));
        assert!(!extract_dir.exists());
    }
}

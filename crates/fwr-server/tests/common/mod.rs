//! Shared fixtures for the pipeline integration tests
//!
//! Everything runs against the in-memory object store and record table;
//! archives are built on the fly with the `zip` crate.

#![allow(dead_code, clippy::unwrap_used, clippy::expect_used)]

use serde_json::{json, Value};
use sha2::{Digest, Sha256};
use std::io::{Cursor, Write};
use std::sync::Arc;
use tempfile::TempDir;
use zip::write::SimpleFileOptions;

use fwr_server::{
    api::AppState,
    config::PipelineConfig,
    events::ObjectRef,
    pipeline::{DeletionReconciler, UploadProcessor},
    records::memory::MemoryRecordStore,
    storage::memory::MemoryObjectStore,
};

pub const BUCKET: &str = "firmware-releases";
pub const FIRMWARE: &[u8] = b"\x7fFW firmware image v1.4.2";

pub fn sha256_hex(data: &[u8]) -> String {
    hex::encode(Sha256::digest(data))
}

pub fn manifest(files: &[(&str, &[u8])]) -> Value {
    let files: Vec<_> = files
        .iter()
        .map(|(name, data)| json!({ "name": name, "sha256": sha256_hex(data) }))
        .collect();

    json!({
        "class": "firmware",
        "product_id": "ctrl-4ch",
        "application": "controller",
        "branch": "main",
        "version": "1.4.2",
        "commit": "9f1c2ab",
        "created": "2024-05-01T12:00:00Z",
        "files": files
    })
}

pub fn build_zip(entries: &[(&str, Vec<u8>)]) -> Vec<u8> {
    let mut writer = zip::ZipWriter::new(Cursor::new(Vec::new()));
    for (name, data) in entries {
        writer.start_file(*name, SimpleFileOptions::default()).unwrap();
        writer.write_all(data).unwrap();
    }
    writer.finish().unwrap().into_inner()
}

/// `manifest.json` declaring `firmware.bin`, plus `firmware.bin` itself
pub fn valid_release() -> Vec<u8> {
    let manifest = manifest(&[("firmware.bin", FIRMWARE)]);
    build_zip(&[
        ("manifest.json", serde_json::to_vec(&manifest).unwrap()),
        ("firmware.bin", FIRMWARE.to_vec()),
    ])
}

/// Same manifest, but `firmware.bin` was altered after the manifest was made
pub fn tampered_release() -> Vec<u8> {
    let manifest = manifest(&[("firmware.bin", FIRMWARE)]);
    build_zip(&[
        ("manifest.json", serde_json::to_vec(&manifest).unwrap()),
        ("firmware.bin", b"\x7fFW patched image".to_vec()),
    ])
}

pub fn object(key: &str) -> ObjectRef {
    ObjectRef {
        bucket: BUCKET.to_string(),
        key: key.to_string(),
    }
}

pub struct Harness {
    pub objects: Arc<MemoryObjectStore>,
    pub records: Arc<MemoryRecordStore>,
    pub uploads: Arc<UploadProcessor>,
    pub deletions: Arc<DeletionReconciler>,
    pub scratch: TempDir,
}

impl Harness {
    pub fn new() -> Self {
        Self::with_budget_secs(30)
    }

    pub fn with_budget_secs(invocation_timeout_secs: u64) -> Self {
        let scratch = tempfile::tempdir().unwrap();
        let config = PipelineConfig {
            scratch_dir: scratch.path().to_path_buf(),
            invocation_timeout_secs,
            ..PipelineConfig::default()
        };

        let objects = Arc::new(MemoryObjectStore::new());
        let records = Arc::new(MemoryRecordStore::new());

        Self {
            uploads: Arc::new(UploadProcessor::new(objects.clone(), records.clone(), &config)),
            deletions: Arc::new(DeletionReconciler::new(
                records.clone(),
                records.clone(),
                &config,
            )),
            objects,
            records,
            scratch,
        }
    }

    pub fn state(&self) -> AppState {
        AppState {
            uploads: self.uploads.clone(),
            deletions: self.deletions.clone(),
        }
    }

    pub fn upload(&self, key: &str, data: Vec<u8>) -> ObjectRef {
        self.objects.put(BUCKET, key, data);
        object(key)
    }

    pub fn keys(&self) -> Vec<String> {
        self.objects.keys(BUCKET)
    }

    /// Scratch directories left behind by the processor
    pub fn scratch_entries(&self) -> usize {
        std::fs::read_dir(self.scratch.path()).unwrap().count()
    }
}

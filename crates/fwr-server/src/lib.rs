//! Firmware Release Server Library
#![deny(clippy::unwrap_used, clippy::expect_used)]
//!
//! Ingestion pipeline for firmware release archives uploaded to S3.
//!
//! # Overview
//!
//! An upload under `incoming/` is renamed to a generated name, downloaded,
//! unpacked and checked against the `manifest.json` it carries. The outcome
//! is written to a DynamoDB table and the archive is moved to `processed/`
//! or `errors/`. Deleting an archive from either of those prefixes flags
//! its record deleted with an expiry.
//!
//! - **Pipeline**: [`pipeline::UploadProcessor`] and
//!   [`pipeline::DeletionReconciler`]
//! - **Validation**: [`manifest`] schema checks and [`archive`] extraction
//! - **Adapters**: [`storage::ObjectStore`] (S3) and
//!   [`records::ReleaseStore`] / [`records::RecordLookup`] (DynamoDB), with
//!   in-memory implementations for tests
//! - **Ingress**: [`api`] routes for S3 event notifications
//!
//! # Example
//!
//! ```no_run
//! use std::sync::Arc;
//! use fwr_server::{
//!     config::PipelineConfig,
//!     events::ObjectRef,
//!     pipeline::UploadProcessor,
//!     records::memory::MemoryRecordStore,
//!     storage::memory::MemoryObjectStore,
//! };
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let processor = UploadProcessor::new(
//!         Arc::new(MemoryObjectStore::new()),
//!         Arc::new(MemoryRecordStore::new()),
//!         &PipelineConfig::default(),
//!     );
//!     let object = ObjectRef { bucket: "firmware".into(), key: "incoming/release.zip".into() };
//!     println!("{:?}", processor.process(&object).await);
//!     Ok(())
//! }
//! ```

pub mod api;
pub mod archive;
pub mod aws;
pub mod config;
pub mod error;
pub mod events;
pub mod lifecycle;
pub mod manifest;
pub mod pipeline;
pub mod records;
pub mod storage;

pub use error::{AppError, PipelineError, PipelineResult};

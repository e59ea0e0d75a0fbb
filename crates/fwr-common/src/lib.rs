//! Firmware Release Common Library
#![deny(clippy::unwrap_used, clippy::expect_used)]
//!
//! Shared building blocks for the firmware release ingestion workspace:
//!
//! - **Error Handling**: [`FwrError`] and the [`Result`] alias
//! - **Checksums**: chunked SHA-256 digests for archives and their contents
//! - **Logging**: tracing subscriber setup shared by the server and the CLI
//!
//! # Example
//!
//! ```no_run
//! use fwr_common::checksum::compute_file_sha256;
//!
//! fn digest(path: &str) -> fwr_common::Result<()> {
//!     let sha = compute_file_sha256(path)?;
//!     println!("{sha}");
//!     Ok(())
//! }
//! ```

pub mod checksum;
pub mod error;
pub mod logging;

pub use error::{FwrError, Result};

//! Zip extraction into a scratch directory

use std::fs::{self, File};
use std::io::{self, BufReader, Read};
use std::path::Path;
use std::sync::atomic::{AtomicBool, Ordering};
use tracing::debug;

use crate::error::{PipelineError, PipelineResult};

/// Reader that fails every read once `cancel` has been raised
pub struct Cancellable<'a, R> {
    inner: R,
    cancel: &'a AtomicBool,
}

impl<'a, R> Cancellable<'a, R> {
    pub fn new(inner: R, cancel: &'a AtomicBool) -> Self {
        Self { inner, cancel }
    }
}

impl<R: Read> Read for Cancellable<'_, R> {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        if self.cancel.load(Ordering::Relaxed) {
            return Err(io::Error::other("verification cancelled"));
        }
        self.inner.read(buf)
    }
}

/// Error out early once `cancel` has been raised
pub fn ensure_active(cancel: &AtomicBool) -> PipelineResult<()> {
    if cancel.load(Ordering::Relaxed) {
        Err(PipelineError::Cancelled)
    } else {
        Ok(())
    }
}

/// Unpack every entry of `archive_path` below `dest`.
///
/// Entries whose path would land outside `dest`, or that clash with an
/// entry already written, make the whole archive invalid. `cancel` is
/// checked before each entry and on every read. Returns the number of
/// files written.
pub fn extract_zip(archive_path: &Path, dest: &Path, cancel: &AtomicBool) -> PipelineResult<usize> {
    let file = File::open(archive_path)?;
    let mut archive = zip::ZipArchive::new(BufReader::new(file))
        .map_err(|e| PipelineError::Extraction(format!("Failed to read zip archive: {e}")))?;

    fs::create_dir_all(dest)?;
    let mut written = 0;

    for i in 0..archive.len() {
        ensure_active(cancel)?;

        let mut entry = archive.by_index(i).map_err(|e| {
            PipelineError::Extraction(format!("Failed to read zip entry at index {i}: {e}"))
        })?;

        let Some(relative) = entry.enclosed_name() else {
            return Err(PipelineError::Extraction(format!(
                "Zip entry '{}' escapes the archive root",
                entry.name()
            )));
        };
        let out_path = dest.join(relative);
        let entry_error = |e: io::Error| {
            PipelineError::Extraction(format!("Failed to extract '{}': {e}", entry.name()))
        };

        if entry.is_dir() {
            fs::create_dir_all(&out_path).map_err(entry_error)?;
            continue;
        }

        if let Some(parent) = out_path.parent() {
            fs::create_dir_all(parent).map_err(entry_error)?;
        }

        let mut out = File::create_new(&out_path).map_err(entry_error)?;
        let copied = io::copy(&mut Cancellable::new(&mut entry, cancel), &mut out);
        let bytes = copied.map_err(|e| {
            PipelineError::Extraction(format!("Failed to extract '{}': {e}", entry.name()))
        })?;

        debug!("Extracted {} ({} bytes)", entry.name(), bytes);
        written += 1;
    }

    ensure_active(cancel)?;
    Ok(written)
}

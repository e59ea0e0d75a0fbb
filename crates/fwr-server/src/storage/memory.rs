//! In-process object store for tests and local dry runs
//!
//! Failures can be injected per key prefix to exercise the pipeline's
//! error paths.

use anyhow::{anyhow, Result};
use async_trait::async_trait;
use std::collections::{BTreeMap, HashSet};
use std::path::Path;
use std::sync::{Mutex, MutexGuard};
use std::time::Duration;

use super::{ObjectMetadata, ObjectStore};

type ObjectKey = (String, String);

#[derive(Default)]
struct Faults {
    copy_into: HashSet<String>,
    delete_of: HashSet<String>,
    copy_delay: Option<Duration>,
    download_delay: Option<Duration>,
}

#[derive(Default)]
pub struct MemoryObjectStore {
    objects: Mutex<BTreeMap<ObjectKey, Vec<u8>>>,
    faults: Mutex<Faults>,
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

fn matches_prefix(prefixes: &HashSet<String>, key: &str) -> bool {
    prefixes.iter().any(|prefix| key.starts_with(prefix.as_str()))
}

impl MemoryObjectStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn put(&self, bucket: &str, key: &str, data: impl Into<Vec<u8>>) {
        lock(&self.objects).insert((bucket.to_string(), key.to_string()), data.into());
    }

    pub fn get(&self, bucket: &str, key: &str) -> Option<Vec<u8>> {
        lock(&self.objects)
            .get(&(bucket.to_string(), key.to_string()))
            .cloned()
    }

    /// All keys currently stored in `bucket`, sorted
    pub fn keys(&self, bucket: &str) -> Vec<String> {
        lock(&self.objects)
            .keys()
            .filter(|(b, _)| b == bucket)
            .map(|(_, k)| k.clone())
            .collect()
    }

    /// Make every copy whose destination starts with `prefix` fail
    pub fn fail_copies_into(&self, prefix: &str) {
        lock(&self.faults).copy_into.insert(prefix.to_string());
    }

    /// Make every delete of a key starting with `prefix` fail
    pub fn fail_deletes_of(&self, prefix: &str) {
        lock(&self.faults).delete_of.insert(prefix.to_string());
    }

    pub fn delay_copies(&self, delay: Duration) {
        lock(&self.faults).copy_delay = Some(delay);
    }

    pub fn delay_downloads(&self, delay: Duration) {
        lock(&self.faults).download_delay = Some(delay);
    }
}

#[async_trait]
impl ObjectStore for MemoryObjectStore {
    async fn copy(&self, bucket: &str, source_key: &str, dest_key: &str) -> Result<()> {
        let delay = lock(&self.faults).copy_delay;
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }

        if matches_prefix(&lock(&self.faults).copy_into, dest_key) {
            return Err(anyhow!("injected copy failure into {dest_key}"));
        }

        let mut objects = lock(&self.objects);
        let data = objects
            .get(&(bucket.to_string(), source_key.to_string()))
            .cloned()
            .ok_or_else(|| anyhow!("NoSuchKey: s3://{bucket}/{source_key}"))?;
        objects.insert((bucket.to_string(), dest_key.to_string()), data);
        Ok(())
    }

    async fn delete(&self, bucket: &str, key: &str) -> Result<()> {
        if matches_prefix(&lock(&self.faults).delete_of, key) {
            return Err(anyhow!("injected delete failure for {key}"));
        }

        // Deleting a missing key succeeds, as it does on S3
        lock(&self.objects).remove(&(bucket.to_string(), key.to_string()));
        Ok(())
    }

    async fn head(&self, bucket: &str, key: &str) -> Result<ObjectMetadata> {
        let size = lock(&self.objects)
            .get(&(bucket.to_string(), key.to_string()))
            .map(|data| data.len() as i64)
            .ok_or_else(|| anyhow!("NotFound: s3://{bucket}/{key}"))?;

        Ok(ObjectMetadata { size })
    }

    async fn download_to_file(&self, bucket: &str, key: &str, dest: &Path) -> Result<u64> {
        let delay = lock(&self.faults).download_delay;
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }

        let data = self
            .get(bucket, key)
            .ok_or_else(|| anyhow!("NoSuchKey: s3://{bucket}/{key}"))?;
        tokio::fs::write(dest, &data).await?;
        Ok(data.len() as u64)
    }
}

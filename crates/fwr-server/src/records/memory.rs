//! In-process record table for tests and local dry runs

use anyhow::{anyhow, Result};
use async_trait::async_trait;
use std::collections::BTreeMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Mutex, MutexGuard};

use super::{RecordKey, RecordLookup, ReleaseRecord, ReleaseStore};

#[derive(Default)]
pub struct MemoryRecordStore {
    records: Mutex<BTreeMap<RecordKey, ReleaseRecord>>,
    fail_puts: AtomicBool,
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

impl MemoryRecordStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, key: &RecordKey) -> Option<ReleaseRecord> {
        lock(&self.records).get(key).cloned()
    }

    /// Every stored record, ordered by key
    pub fn all(&self) -> Vec<ReleaseRecord> {
        lock(&self.records).values().cloned().collect()
    }

    /// Insert a record directly, bypassing fault injection
    pub fn seed(&self, record: ReleaseRecord) {
        lock(&self.records).insert(record.key(), record);
    }

    pub fn fail_puts(&self, fail: bool) {
        self.fail_puts.store(fail, Ordering::SeqCst);
    }
}

#[async_trait]
impl ReleaseStore for MemoryRecordStore {
    async fn put(&self, record: &ReleaseRecord) -> Result<()> {
        if self.fail_puts.load(Ordering::SeqCst) {
            return Err(anyhow!("injected write failure for {}", record.key()));
        }

        lock(&self.records).insert(record.key(), record.clone());
        Ok(())
    }

    async fn mark_deleted(&self, key: &RecordKey, zip_name: &str, expires_at: i64) -> Result<bool> {
        let mut records = lock(&self.records);
        match records.get_mut(key) {
            Some(record) if record.zip_name == zip_name && !record.deleted => {
                record.deleted = true;
                record.ttl = Some(expires_at);
                Ok(true)
            }
            _ => Ok(false),
        }
    }
}

#[async_trait]
impl RecordLookup for MemoryRecordStore {
    async fn find_by_zip_name(&self, zip_name: &str) -> Result<Vec<RecordKey>> {
        Ok(lock(&self.records)
            .values()
            .filter(|record| record.zip_name == zip_name)
            .map(ReleaseRecord::key)
            .collect())
    }
}

//! In-memory coordination store for tests.
//!
//! Enabled for downstream crates with the `test-support` feature:
//!
//! ```toml
//! [dev-dependencies]
//! common = { path = "../common", features = ["test-support"] }
//! ```
//!
//! TTLs are recorded but never elapse on their own; call [`MemoryStore::expire`]
//! to simulate a key timing out.

use super::{CommitBatch, CoordinationStore};
use crate::errors::StorageError;
use async_trait::async_trait;
use std::collections::{BTreeMap, HashMap};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

#[derive(Debug, Clone)]
struct Entry {
    value: String,
    ttl: Option<Duration>,
}

#[derive(Default)]
struct Inner {
    strings: BTreeMap<String, Entry>,
    lists: HashMap<String, Vec<String>>,
    unavailable: bool,
    fail_commit_after: Option<usize>,
    commits: usize,
}

/// Shared in-memory state; clones observe the same data, so several
/// dispatchers can contend over one store the way processes share Redis.
#[derive(Clone, Default)]
pub struct MemoryStore {
    inner: Arc<Mutex<Inner>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn state(&self) -> MutexGuard<'_, Inner> {
        self.inner.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    pub fn set(&self, key: &str, value: &str) {
        self.state().strings.insert(
            key.to_string(),
            Entry {
                value: value.to_string(),
                ttl: None,
            },
        );
    }

    pub fn value(&self, key: &str) -> Option<String> {
        self.state().strings.get(key).map(|e| e.value.clone())
    }

    /// TTL last applied to `key`
    pub fn ttl(&self, key: &str) -> Option<Duration> {
        self.state().strings.get(key).and_then(|e| e.ttl)
    }

    /// Drop `key` as if its TTL had run out
    pub fn expire(&self, key: &str) {
        self.state().strings.remove(key);
    }

    /// Contents of a list, head first (most recent push first)
    pub fn list(&self, key: &str) -> Vec<String> {
        self.state().lists.get(key).cloned().unwrap_or_default()
    }

    /// Every list key that holds at least one element
    pub fn list_keys(&self) -> Vec<String> {
        let mut keys: Vec<String> = self
            .state()
            .lists
            .iter()
            .filter(|(_, items)| !items.is_empty())
            .map(|(key, _)| key.clone())
            .collect();
        keys.sort();
        keys
    }

    /// Make every operation fail until switched back
    pub fn set_unavailable(&self, unavailable: bool) {
        self.state().unavailable = unavailable;
    }

    /// The next commit applies at most `pushes` list pushes, then fails
    /// without writing the cursor or refreshing the lock
    pub fn fail_next_commit_after(&self, pushes: usize) {
        self.state().fail_commit_after = Some(pushes);
    }

    /// Number of commits that completed
    pub fn commit_count(&self) -> usize {
        self.state().commits
    }

    fn check_available(inner: &Inner) -> Result<(), StorageError> {
        if inner.unavailable {
            return Err(StorageError::Unavailable("memory store offline".to_string()));
        }
        Ok(())
    }
}

#[async_trait]
impl CoordinationStore for MemoryStore {
    async fn set_if_absent_then_get(
        &self,
        key: &str,
        value: &str,
        ttl: Duration,
    ) -> Result<Option<String>, StorageError> {
        let mut inner = self.state();
        Self::check_available(&inner)?;
        let entry = inner.strings.entry(key.to_string()).or_insert_with(|| Entry {
            value: value.to_string(),
            ttl: Some(ttl),
        });
        Ok(Some(entry.value.clone()))
    }

    async fn get(&self, key: &str) -> Result<Option<String>, StorageError> {
        let inner = self.state();
        Self::check_available(&inner)?;
        Ok(inner.strings.get(key).map(|e| e.value.clone()))
    }

    async fn scan_prefix(&self, prefix: &str) -> Result<Vec<String>, StorageError> {
        let inner = self.state();
        Self::check_available(&inner)?;
        Ok(inner
            .strings
            .keys()
            .filter(|key| key.starts_with(prefix))
            .cloned()
            .collect())
    }

    async fn commit(&self, batch: &CommitBatch) -> Result<(), StorageError> {
        let mut inner = self.state();
        Self::check_available(&inner)?;
        let fail_after = inner.fail_commit_after.take();

        for (index, push) in batch.pushes.iter().enumerate() {
            if fail_after == Some(index) {
                return Err(StorageError::ConnectionFailed(
                    "connection reset during pipeline".to_string(),
                ));
            }
            inner
                .lists
                .entry(push.list.clone())
                .or_default()
                .insert(0, push.payload.clone());
        }
        if fail_after.is_some() {
            return Err(StorageError::ConnectionFailed(
                "connection reset during pipeline".to_string(),
            ));
        }

        inner.strings.insert(
            batch.cursor_key.clone(),
            Entry {
                value: batch.cursor_value.to_string(),
                ttl: Some(batch.cursor_ttl),
            },
        );
        if let Some(lock) = inner.strings.get_mut(&batch.lock_key) {
            lock.ttl = Some(batch.lock_ttl);
        }
        inner.commits += 1;
        Ok(())
    }
}

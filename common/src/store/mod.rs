// Coordination store: the shared keyed state (lock, cursor, registry,
// pending lists) accessed by every scheduler process

#[cfg(any(test, feature = "test-support"))]
pub mod memory;
pub mod redis;

pub use self::redis::{RedisCoordinationStore, RedisPool};
#[cfg(any(test, feature = "test-support"))]
pub use memory::MemoryStore;

use crate::errors::StorageError;
use async_trait::async_trait;
use std::time::Duration;

/// A task payload to append to a pending list
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ListPush {
    pub list: String,
    pub payload: String,
}

/// Writes that close a scheduling pass
///
/// Sent as one round trip but not as a transaction. Pushes go first, so a
/// batch cut short leaves enqueued jobs with the cursor still behind them.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommitBatch {
    pub pushes: Vec<ListPush>,
    pub cursor_key: String,
    /// Unix seconds, minute-aligned
    pub cursor_value: i64,
    pub cursor_ttl: Duration,
    pub lock_key: String,
    pub lock_ttl: Duration,
}

/// Narrow operations the scheduler needs from the shared store
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait CoordinationStore: Send + Sync {
    /// Set `key` to `value` with `ttl` only if absent, then read the key back
    async fn set_if_absent_then_get(
        &self,
        key: &str,
        value: &str,
        ttl: Duration,
    ) -> Result<Option<String>, StorageError>;

    async fn get(&self, key: &str) -> Result<Option<String>, StorageError>;

    /// All keys starting with `prefix`
    async fn scan_prefix(&self, prefix: &str) -> Result<Vec<String>, StorageError>;

    async fn commit(&self, batch: &CommitBatch) -> Result<(), StorageError>;
}

/// Whole seconds for an expiry, never below one
pub(crate) fn ttl_seconds(ttl: Duration) -> u64 {
    ttl.as_secs().max(1)
}

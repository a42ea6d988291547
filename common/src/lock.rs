// Leader lock: TTL-bounded advisory mutual exclusion for scheduling passes

use crate::errors::StorageError;
use crate::store::CoordinationStore;
use std::time::Duration;
use tracing::{debug, instrument};

/// Identity-valued lock key shared by every scheduler process
///
/// Acquisition and renewal are the same operation: set the key to our identity
/// if nobody holds it, then read it back. Holding the lock means the read-back
/// value is our identity. The read can race with another process's set, so two
/// processes may both see themselves as holder for one tick; the TTL bounds
/// that window. The TTL itself is extended by the pass commit, not here.
#[derive(Debug, Clone)]
pub struct LeaderLock {
    key: String,
    identity: String,
    ttl: Duration,
}

impl LeaderLock {
    pub fn new(key: impl Into<String>, identity: impl Into<String>, ttl: Duration) -> Self {
        Self {
            key: key.into(),
            identity: identity.into(),
            ttl,
        }
    }

    pub fn key(&self) -> &str {
        &self.key
    }

    pub fn identity(&self) -> &str {
        &self.identity
    }

    pub fn ttl(&self) -> Duration {
        self.ttl
    }

    /// Returns true iff this process holds the lock after the call
    #[instrument(skip(self, store), fields(key = %self.key, identity = %self.identity))]
    pub async fn try_acquire_or_confirm(
        &self,
        store: &dyn CoordinationStore,
    ) -> Result<bool, StorageError> {
        let holder = store
            .set_if_absent_then_get(&self.key, &self.identity, self.ttl)
            .await?;

        let held = holder.as_deref() == Some(self.identity.as_str());
        if !held {
            debug!(holder = ?holder, "Leader lock held by another process");
        }
        Ok(held)
    }
}

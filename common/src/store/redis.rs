// Redis-backed coordination store

use super::{ttl_seconds, CommitBatch, CoordinationStore};
use crate::config::RedisConfig;
use crate::errors::StorageError;
use async_trait::async_trait;
use redis::aio::ConnectionManager;
use redis::{AsyncCommands, Client};
use std::time::Duration;
use tracing::{debug, info, instrument};

/// Redis connection pool wrapper
#[derive(Clone)]
pub struct RedisPool {
    manager: ConnectionManager,
}

impl RedisPool {
    /// Create a new Redis connection pool
    ///
    /// The connection manager reconnects on its own, so a dropped connection
    /// surfaces as one failed pass rather than a dead scheduler.
    #[instrument(skip(config), fields(redis_url = %config.url))]
    pub async fn new(config: &RedisConfig) -> Result<Self, StorageError> {
        info!("Initializing Redis connection pool");

        let client = Client::open(config.url.as_str()).map_err(|e| {
            StorageError::ConnectionFailed(format!("Failed to create Redis client: {}", e))
        })?;

        let manager = ConnectionManager::new(client).await.map_err(|e| {
            StorageError::ConnectionFailed(format!("Failed to create connection manager: {}", e))
        })?;

        info!("Redis connection pool initialized successfully");

        Ok(Self { manager })
    }

    /// Get a connection from the pool
    pub fn get_connection(&self) -> ConnectionManager {
        self.manager.clone()
    }

    /// Health check - verify Redis connection is working
    #[instrument(skip(self))]
    pub async fn health_check(&self) -> Result<(), StorageError> {
        let mut conn = self.get_connection();

        let response: String = redis::cmd("PING")
            .query_async(&mut conn)
            .await
            .map_err(|e| StorageError::RedisError(format!("Health check failed: {}", e)))?;

        if response != "PONG" {
            return Err(StorageError::RedisError(format!(
                "Unexpected PING response: {}",
                response
            )));
        }

        Ok(())
    }
}

/// Coordination store speaking plain Redis commands
#[derive(Clone)]
pub struct RedisCoordinationStore {
    pool: RedisPool,
}

impl RedisCoordinationStore {
    pub fn new(pool: RedisPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl CoordinationStore for RedisCoordinationStore {
    /// SET NX EX followed by GET in a single pipeline
    ///
    /// The GET is unconditional: it observes whichever identity won, which may
    /// be a value written by another process between the two commands.
    #[instrument(skip(self, value), fields(key = %key, ttl_seconds = ttl.as_secs()))]
    async fn set_if_absent_then_get(
        &self,
        key: &str,
        value: &str,
        ttl: Duration,
    ) -> Result<Option<String>, StorageError> {
        let mut conn = self.pool.get_connection();

        let (current,): (Option<String>,) = redis::pipe()
            .cmd("SET")
            .arg(key)
            .arg(value)
            .arg("NX")
            .arg("EX")
            .arg(ttl_seconds(ttl))
            .ignore()
            .cmd("GET")
            .arg(key)
            .query_async(&mut conn)
            .await?;

        Ok(current)
    }

    #[instrument(skip(self))]
    async fn get(&self, key: &str) -> Result<Option<String>, StorageError> {
        let mut conn = self.pool.get_connection();
        let value: Option<String> = conn.get(key).await?;
        Ok(value)
    }

    #[instrument(skip(self))]
    async fn scan_prefix(&self, prefix: &str) -> Result<Vec<String>, StorageError> {
        let mut conn = self.pool.get_connection();
        let pattern = format!("{}*", prefix);

        let mut keys = Vec::new();
        {
            let mut iter: redis::AsyncIter<String> = conn.scan_match(&pattern).await?;
            while let Some(key) = iter.next_item().await {
                keys.push(key);
            }
        }

        // SCAN may return a key more than once
        keys.sort();
        keys.dedup();

        debug!(pattern = %pattern, key_count = keys.len(), "Scanned keys");
        Ok(keys)
    }

    /// Pushes, cursor write and lock refresh in one pipeline without MULTI/EXEC
    #[instrument(skip(self, batch), fields(pushes = batch.pushes.len(), cursor = batch.cursor_value))]
    async fn commit(&self, batch: &CommitBatch) -> Result<(), StorageError> {
        let mut conn = self.pool.get_connection();
        let mut pipe = redis::pipe();

        for push in &batch.pushes {
            pipe.cmd("LPUSH").arg(&push.list).arg(&push.payload).ignore();
        }
        pipe.cmd("SET")
            .arg(&batch.cursor_key)
            .arg(batch.cursor_value)
            .arg("EX")
            .arg(ttl_seconds(batch.cursor_ttl))
            .ignore();
        pipe.cmd("EXPIRE")
            .arg(&batch.lock_key)
            .arg(ttl_seconds(batch.lock_ttl))
            .ignore();

        pipe.query_async::<_, ()>(&mut conn).await?;
        Ok(())
    }
}

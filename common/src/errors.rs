// Error handling framework for the cron scheduling subsystem

use thiserror::Error;

/// Cron definition parsing errors
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ScheduleError {
    #[error("Invalid cron expression '{expression}': {reason}")]
    InvalidCronExpression { expression: String, reason: String },

    #[error("Invalid cron line '{line}': {reason}")]
    InvalidCronLine { line: String, reason: String },
}

/// Coordination store errors
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum StorageError {
    #[error("Redis error: {0}")]
    RedisError(String),

    #[error("Connection failed: {0}")]
    ConnectionFailed(String),

    #[error("Store unavailable: {0}")]
    Unavailable(String),
}

/// Scheduling pass errors
///
/// Every variant is reported by the minute driver and retried on the next
/// minute boundary; none of them is fatal to the host process.
#[derive(Error, Debug)]
pub enum SchedulerError {
    #[error("Leader lock check failed: {0}")]
    LockFailed(#[source] StorageError),

    #[error("Failed to read schedule cursor: {0}")]
    CursorReadFailed(#[source] StorageError),

    #[error("Failed to commit scheduling batch: {0}")]
    CommitFailed(#[source] StorageError),

    #[error("Task payload serialization failed: {0}")]
    Serialization(String),
}

impl From<redis::RedisError> for StorageError {
    fn from(err: redis::RedisError) -> Self {
        if err.is_connection_dropped() || err.is_connection_refusal() || err.is_timeout() {
            StorageError::ConnectionFailed(err.to_string())
        } else {
            StorageError::RedisError(err.to_string())
        }
    }
}

impl From<serde_json::Error> for SchedulerError {
    fn from(err: serde_json::Error) -> Self {
        SchedulerError::Serialization(err.to_string())
    }
}

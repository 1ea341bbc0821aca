//! Error types for the queue engine seam.

use thiserror::Error;

/// Errors that may occur while handing work to the queue engine.
#[derive(Debug, Error)]
pub enum QueueError {
    #[error("queue backend is unavailable: {0}")]
    Unavailable(String),

    #[error("failed to enqueue job: {0}")]
    Backend(String),

    #[error("job {job_name} is already enqueued on {queue} at {timestamp} with the same arguments")]
    Duplicate {
        queue: String,
        job_name: String,
        timestamp: i64,
    },

    #[error("invalid schedule: {0}")]
    InvalidSchedule(String),

    #[error("failed to encode job payload: {0}")]
    Serialization(#[from] serde_json::Error),
}

#[cfg(feature = "redis")]
impl From<redis::RedisError> for QueueError {
    fn from(err: redis::RedisError) -> Self {
        if err.is_connection_refusal() || err.is_connection_dropped() || err.is_timeout() {
            Self::Unavailable(err.to_string())
        } else {
            Self::Backend(err.to_string())
        }
    }
}

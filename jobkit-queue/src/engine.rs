//! The queue engine trait consumed by job dispatch.

use async_trait::async_trait;
use serde_json::Value;

use crate::error::QueueError;
use crate::types::EnqueueResult;

/// Trait for the external engine that stores queued work.
///
/// Implementations own durability, scheduling and retries. Callers hand
/// over a queue name, a job name and the ordered argument list, and get
/// back an opaque acknowledgement.
#[async_trait]
pub trait QueueEngine: Send + Sync {
    /// Enqueue a job to be worked as soon as possible.
    async fn enqueue(
        &self,
        queue: &str,
        job_name: &str,
        args: &[Value],
    ) -> Result<EnqueueResult, QueueError>;

    /// Enqueue a job that may not start before `delay_ms` has elapsed.
    async fn enqueue_in(
        &self,
        delay_ms: u64,
        queue: &str,
        job_name: &str,
        args: &[Value],
    ) -> Result<EnqueueResult, QueueError>;

    /// Enqueue a job that may not start before the Unix timestamp `timestamp_ms`.
    async fn enqueue_at(
        &self,
        timestamp_ms: i64,
        queue: &str,
        job_name: &str,
        args: &[Value],
    ) -> Result<EnqueueResult, QueueError>;
}

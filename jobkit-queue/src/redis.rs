//! Resque-compatible Redis producer.
//!
//! Only the enqueue side lives here. Workers, the delayed-item scheduler
//! and retry handling belong to whichever Resque-compatible engine reads
//! these keys. Layout, relative to the configured namespace:
//!
//! - `<ns>:queues` - set of known queue names
//! - `<ns>:queue:<queue>` - list of ready items
//! - `<ns>:delayed:<unix_secs>` - list of items due at that second
//! - `<ns>:delayed_queue_schedule` - sorted set of due seconds
//! - `<ns>:timestamps:<item>` - set of `delayed:<unix_secs>` keys holding `item`

use std::fmt;

use async_trait::async_trait;
use chrono::Utc;
use redis::aio::MultiplexedConnection;
use redis::AsyncCommands;
use serde::Serialize;
use serde_json::Value;
use tracing::{debug, warn};

use crate::engine::QueueEngine;
use crate::error::QueueError;
use crate::types::{EnqueueKind, EnqueueResult, QueuedJob};

/// Namespace used by Resque and most compatible engines.
pub const DEFAULT_NAMESPACE: &str = "resque";

/// Wire form of a queued item.
#[derive(Debug, Serialize)]
struct ResqueItem<'a> {
    class: &'a str,
    queue: &'a str,
    args: &'a [Value],
}

/// Encode an item exactly as Resque workers expect to read it.
pub(crate) fn encode_item(queue: &str, job_name: &str, args: &[Value]) -> Result<String, QueueError> {
    Ok(serde_json::to_string(&ResqueItem {
        class: job_name,
        queue,
        args,
    })?)
}

/// Round a millisecond timestamp to the whole second used as delayed key.
#[inline]
pub(crate) fn delayed_second(timestamp_ms: i64) -> i64 {
    (timestamp_ms + 500).div_euclid(1000)
}

/// Queue engine producer writing Resque-compatible entries into Redis.
#[derive(Clone)]
pub struct RedisQueue {
    client: redis::Client,
    namespace: String,
}

impl fmt::Debug for RedisQueue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RedisQueue")
            .field("namespace", &self.namespace)
            .finish_non_exhaustive()
    }
}

impl RedisQueue {
    /// Create a producer for the Redis server at `url`.
    ///
    /// No connection is opened until the first enqueue.
    pub fn new(url: &str, namespace: impl Into<String>) -> Result<Self, QueueError> {
        let client = redis::Client::open(url)
            .map_err(|e| QueueError::Backend(format!("invalid redis url: {e}")))?;
        Ok(Self {
            client,
            namespace: namespace.into(),
        })
    }

    pub fn namespace(&self) -> &str {
        &self.namespace
    }

    #[inline]
    fn key(&self, suffix: &str) -> String {
        format!("{}:{}", self.namespace, suffix)
    }

    async fn connection(&self) -> Result<MultiplexedConnection, QueueError> {
        self.client
            .get_multiplexed_async_connection()
            .await
            .map_err(|e| {
                warn!(error = %e, "failed to connect to redis");
                QueueError::Unavailable(e.to_string())
            })
    }

    async fn push_delayed(
        &self,
        timestamp_ms: i64,
        queue: &str,
        job_name: &str,
        args: &[Value],
        kind: EnqueueKind,
    ) -> Result<EnqueueResult, QueueError> {
        let record = QueuedJob::new(queue, job_name, args.to_vec(), kind)?;
        let item = encode_item(queue, job_name, args)?;
        let second = delayed_second(timestamp_ms);
        let delayed_key = format!("delayed:{second}");
        let timestamps_key = self.key(&format!("timestamps:{item}"));

        let mut conn = self.connection().await?;
        let already: bool = conn.sismember(&timestamps_key, &delayed_key).await?;
        if already {
            return Err(QueueError::Duplicate {
                queue: queue.to_owned(),
                job_name: job_name.to_owned(),
                timestamp: second,
            });
        }

        let _: () = redis::pipe()
            .atomic()
            .rpush(self.key(&delayed_key), &item)
            .ignore()
            .sadd(&timestamps_key, &delayed_key)
            .ignore()
            .zadd(self.key("delayed_queue_schedule"), second, second)
            .ignore()
            .query_async(&mut conn)
            .await?;

        debug!(job_id = %record.id, queue, job_name, second, "scheduled job in redis");
        Ok(record.receipt())
    }
}

#[async_trait]
impl QueueEngine for RedisQueue {
    async fn enqueue(
        &self,
        queue: &str,
        job_name: &str,
        args: &[Value],
    ) -> Result<EnqueueResult, QueueError> {
        let record = QueuedJob::new(queue, job_name, args.to_vec(), EnqueueKind::Immediate)?;
        let item = encode_item(queue, job_name, args)?;

        let mut conn = self.connection().await?;
        let _: () = redis::pipe()
            .atomic()
            .sadd(self.key("queues"), queue)
            .ignore()
            .rpush(self.key(&format!("queue:{queue}")), &item)
            .ignore()
            .query_async(&mut conn)
            .await?;

        debug!(job_id = %record.id, queue, job_name, "enqueued job in redis");
        Ok(record.receipt())
    }

    async fn enqueue_in(
        &self,
        delay_ms: u64,
        queue: &str,
        job_name: &str,
        args: &[Value],
    ) -> Result<EnqueueResult, QueueError> {
        let timestamp_ms = i64::try_from(delay_ms)
            .ok()
            .and_then(|delay| Utc::now().timestamp_millis().checked_add(delay))
            .ok_or_else(|| {
                QueueError::InvalidSchedule(format!("delay of {delay_ms}ms is out of range"))
            })?;
        self.push_delayed(
            timestamp_ms,
            queue,
            job_name,
            args,
            EnqueueKind::Delayed { delay_ms },
        )
        .await
    }

    async fn enqueue_at(
        &self,
        timestamp_ms: i64,
        queue: &str,
        job_name: &str,
        args: &[Value],
    ) -> Result<EnqueueResult, QueueError> {
        self.push_delayed(
            timestamp_ms,
            queue,
            job_name,
            args,
            EnqueueKind::Scheduled { timestamp_ms },
        )
        .await
    }
}

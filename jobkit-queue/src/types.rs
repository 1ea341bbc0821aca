//! Core types exchanged with the queue engine.

use chrono::{DateTime, TimeDelta, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use uuid::Uuid;

use crate::error::QueueError;

/// How a unit of work was handed to the engine.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum EnqueueKind {
    /// Ready for the next free worker.
    Immediate,
    /// Not runnable before `delay_ms` from the moment of enqueueing.
    Delayed { delay_ms: u64 },
    /// Not runnable before the absolute Unix timestamp (milliseconds).
    Scheduled { timestamp_ms: i64 },
}

impl EnqueueKind {
    /// Absolute time the item becomes runnable, relative to `now` for delays.
    pub fn run_at(self, now: DateTime<Utc>) -> Result<Option<DateTime<Utc>>, QueueError> {
        match self {
            Self::Immediate => Ok(None),
            Self::Delayed { delay_ms } => {
                let delta = i64::try_from(delay_ms)
                    .ok()
                    .and_then(TimeDelta::try_milliseconds)
                    .ok_or_else(|| {
                        QueueError::InvalidSchedule(format!("delay of {delay_ms}ms is out of range"))
                    })?;
                now.checked_add_signed(delta).map(Some).ok_or_else(|| {
                    QueueError::InvalidSchedule(format!("delay of {delay_ms}ms is out of range"))
                })
            }
            Self::Scheduled { timestamp_ms } => DateTime::from_timestamp_millis(timestamp_ms)
                .map(Some)
                .ok_or_else(|| {
                    QueueError::InvalidSchedule(format!("timestamp {timestamp_ms} is out of range"))
                }),
        }
    }
}

impl std::fmt::Display for EnqueueKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Immediate => f.write_str("immediate"),
            Self::Delayed { delay_ms } => write!(f, "delay {delay_ms}ms"),
            Self::Scheduled { timestamp_ms } => write!(f, "run at {timestamp_ms}"),
        }
    }
}

/// Acknowledgement returned after the engine accepted a unit of work.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct EnqueueResult {
    pub job_id: Uuid,
    pub queue: String,
    pub job_name: String,
    pub kind: EnqueueKind,
    pub run_at: Option<DateTime<Utc>>,
}

/// A unit of work as recorded by an engine.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct QueuedJob {
    pub id: Uuid,
    pub queue: String,
    pub job_name: String,
    pub args: Vec<Value>,
    pub kind: EnqueueKind,
    pub enqueued_at: DateTime<Utc>,
    pub run_at: Option<DateTime<Utc>>,
}

impl QueuedJob {
    /// Build a record for `job_name` on `queue`, resolving its run time.
    pub fn new(
        queue: impl Into<String>,
        job_name: impl Into<String>,
        args: Vec<Value>,
        kind: EnqueueKind,
    ) -> Result<Self, QueueError> {
        let enqueued_at = Utc::now();
        Ok(Self {
            id: Uuid::new_v4(),
            queue: queue.into(),
            job_name: job_name.into(),
            args,
            kind,
            enqueued_at,
            run_at: kind.run_at(enqueued_at)?,
        })
    }

    /// The acknowledgement handed back to the enqueuing caller.
    pub fn receipt(&self) -> EnqueueResult {
        EnqueueResult {
            job_id: self.id,
            queue: self.queue.clone(),
            job_name: self.job_name.clone(),
            kind: self.kind,
            run_at: self.run_at,
        }
    }
}

/// Description of a job that failed terminally inside a worker.
///
/// Engines pass this to the job's `on_failure` hook after their own retry
/// machinery gave up.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct JobFailure {
    pub queue: String,
    pub job_name: String,
    pub args: Vec<Value>,
    pub error: String,
    pub worker: Option<String>,
    pub failed_at: DateTime<Utc>,
}

impl JobFailure {
    #[inline]
    pub fn new(
        queue: impl Into<String>,
        job_name: impl Into<String>,
        args: Vec<Value>,
        error: impl Into<String>,
    ) -> Self {
        Self {
            queue: queue.into(),
            job_name: job_name.into(),
            args,
            error: error.into(),
            worker: None,
            failed_at: Utc::now(),
        }
    }

    #[inline]
    #[must_use]
    pub fn with_worker(mut self, worker: impl Into<String>) -> Self {
        self.worker = Some(worker.into());
        self
    }
}

//! In-memory queue engine used for development and tests.

use std::collections::{HashMap, VecDeque};
use std::fmt;
use std::sync::Arc;

use async_trait::async_trait;
use serde_json::Value;
use tokio::sync::RwLock;
use tracing::debug;
use uuid::Uuid;

use crate::engine::QueueEngine;
use crate::error::QueueError;
use crate::types::{EnqueueKind, EnqueueResult, QueuedJob};

/// Maximum number of queued jobs to keep in memory.
const MAX_QUEUED_JOBS: usize = 1000;

/// Internal storage optimized for both iteration and lookup by ID.
#[derive(Debug, Default)]
struct QueueState {
    /// Ordered list of job IDs (oldest first).
    order: VecDeque<Uuid>,
    jobs: HashMap<Uuid, QueuedJob>,
}

impl QueueState {
    /// Insert a new job, maintaining the size limit.
    fn insert(&mut self, job: QueuedJob) {
        let id = job.id;
        self.jobs.insert(id, job);
        self.order.push_back(id);

        while self.order.len() > MAX_QUEUED_JOBS {
            if let Some(old_id) = self.order.pop_front() {
                self.jobs.remove(&old_id);
            }
        }
    }

    #[inline]
    fn get(&self, id: &Uuid) -> Option<&QueuedJob> {
        self.jobs.get(id)
    }

    /// Iterate in enqueue order (oldest first).
    fn iter(&self) -> impl Iterator<Item = &QueuedJob> {
        self.order.iter().filter_map(|id| self.jobs.get(id))
    }

    fn count(&self, queue: Option<&str>) -> usize {
        match queue {
            Some(name) => self.jobs.values().filter(|j| j.queue == name).count(),
            None => self.jobs.len(),
        }
    }

    fn clear(&mut self) {
        self.order.clear();
        self.jobs.clear();
    }
}

/// Queue engine that keeps every enqueued job in process memory.
///
/// Nothing is ever worked; the engine only records what was handed to it,
/// which makes it the natural backend for tests of dispatch code.
#[derive(Clone, Default)]
pub struct InMemoryQueue {
    state: Arc<RwLock<QueueState>>,
}

impl fmt::Debug for InMemoryQueue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("InMemoryQueue")
            .field("state", &"<RwLock<QueueState>>")
            .finish()
    }
}

impl InMemoryQueue {
    pub fn new() -> Self {
        Self::default()
    }

    async fn record(
        &self,
        queue: &str,
        job_name: &str,
        args: &[Value],
        kind: EnqueueKind,
    ) -> Result<EnqueueResult, QueueError> {
        let job = QueuedJob::new(queue, job_name, args.to_vec(), kind)?;
        let receipt = job.receipt();
        debug!(job_id = %job.id, queue, job_name, %kind, "recorded job in memory");

        let mut state = self.state.write().await;
        state.insert(job);
        Ok(receipt)
    }

    /// List recorded jobs in enqueue order, optionally filtered by queue.
    pub async fn list(&self, queue: Option<&str>) -> Vec<QueuedJob> {
        let state = self.state.read().await;
        match queue {
            Some(name) => state.iter().filter(|j| j.queue == name).cloned().collect(),
            None => state.iter().cloned().collect(),
        }
    }

    /// Count recorded jobs, optionally filtered by queue.
    pub async fn count(&self, queue: Option<&str>) -> usize {
        let state = self.state.read().await;
        state.count(queue)
    }

    pub async fn get(&self, id: Uuid) -> Option<QueuedJob> {
        let state = self.state.read().await;
        state.get(&id).cloned()
    }

    /// Forget every recorded job.
    pub async fn clear(&self) {
        let mut state = self.state.write().await;
        state.clear();
    }
}

#[async_trait]
impl QueueEngine for InMemoryQueue {
    async fn enqueue(
        &self,
        queue: &str,
        job_name: &str,
        args: &[Value],
    ) -> Result<EnqueueResult, QueueError> {
        self.record(queue, job_name, args, EnqueueKind::Immediate)
            .await
    }

    async fn enqueue_in(
        &self,
        delay_ms: u64,
        queue: &str,
        job_name: &str,
        args: &[Value],
    ) -> Result<EnqueueResult, QueueError> {
        self.record(queue, job_name, args, EnqueueKind::Delayed { delay_ms })
            .await
    }

    async fn enqueue_at(
        &self,
        timestamp_ms: i64,
        queue: &str,
        job_name: &str,
        args: &[Value],
    ) -> Result<EnqueueResult, QueueError> {
        self.record(queue, job_name, args, EnqueueKind::Scheduled { timestamp_ms })
            .await
    }
}

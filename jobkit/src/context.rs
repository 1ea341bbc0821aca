//! Explicit runtime context shared by dispatch and the registry builder.

use std::fmt;
use std::sync::Arc;

use jobkit_config::JobsConfig;
use jobkit_queue::QueueEngine;

use crate::container::Container;
use crate::dispatch::{Dispatch, NamedDispatch};
use crate::error::DispatchError;
use crate::job::Job;

/// Configuration, container and queue engine, passed explicitly wherever
/// jobs are enqueued or registered. Cloning is cheap.
#[derive(Clone)]
pub struct JobContext {
    config: Arc<JobsConfig>,
    container: Arc<Container>,
    queue: Arc<dyn QueueEngine>,
}

impl fmt::Debug for JobContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("JobContext")
            .field("config", &self.config)
            .field("container", &self.container)
            .field("queue", &"<dyn QueueEngine>")
            .finish()
    }
}

impl JobContext {
    pub fn new(config: JobsConfig, container: Arc<Container>, queue: Arc<dyn QueueEngine>) -> Self {
        Self {
            config: Arc::new(config),
            container,
            queue,
        }
    }

    /// Build a context whose engine is the Redis server named in `config`.
    #[cfg(feature = "redis")]
    pub fn connect(
        config: JobsConfig,
        container: Arc<Container>,
    ) -> Result<Self, jobkit_queue::QueueError> {
        let queue = jobkit_queue::RedisQueue::new(&config.redis.url, config.redis.namespace.clone())?;
        Ok(Self::new(config, container, Arc::new(queue)))
    }

    #[inline]
    pub fn config(&self) -> &JobsConfig {
        &self.config
    }

    #[inline]
    pub fn container(&self) -> &Container {
        &self.container
    }

    #[inline]
    pub fn queue(&self) -> &dyn QueueEngine {
        self.queue.as_ref()
    }

    /// Resolve a fresh `J` through the container, ready to be enqueued.
    pub fn dispatch<J: Job>(&self) -> Result<Dispatch<J>, DispatchError> {
        let job = self.container.make::<J>()?;
        Ok(Dispatch::new(job, self))
    }

    /// Dispatch by job name, for jobs without a Rust type in this process.
    pub fn dispatch_named(&self, job_name: impl Into<String>) -> NamedDispatch {
        NamedDispatch::new(job_name, self)
    }
}

//! Job definitions.

use std::time::Duration;

use async_trait::async_trait;
use jobkit_queue::JobFailure;
use serde::de::DeserializeOwned;
use serde::Serialize;

use crate::error::JobError;
use crate::plugin::PluginSpec;

/// A kind of background work the application can enqueue.
///
/// Implementors describe what a worker does with the arguments (`perform`)
/// and how failures are treated. Enqueueing goes through
/// [`JobExt`](crate::JobExt) or a [`Dispatch`](crate::Dispatch) instance.
///
/// The job name defaults to the type's own name (`SendEmail` for
/// `my_app::jobs::SendEmail`) and **must be unique** across the application.
#[async_trait]
pub trait Job: Send + Sync + Sized + 'static {
    /// Arguments handed to `perform`. See [`encode_args`](crate::encode_args)
    /// for how they map onto the engine's argument list.
    type Args: Serialize + DeserializeOwned + Send + 'static;

    type Output: Serialize + Send + 'static;

    /// Override of the job name. `None` uses the type name.
    fn job_name(&self) -> Option<&str> {
        None
    }

    /// Queue for this job. `None` uses the configured default.
    fn queue_name(&self) -> Option<&str> {
        None
    }

    /// Engine plugins run around this job, with their options.
    fn plugins(&self) -> Vec<PluginSpec> {
        Vec::new()
    }

    /// Recurring schedule, for engines that run a scheduler.
    fn schedule(&self) -> Option<Schedule> {
        None
    }

    async fn perform(&self, args: Self::Args) -> Result<Self::Output, JobError>;

    /// Called with the error when `perform` fails inside a worker. Its result
    /// replaces the failed one. The default re-raises.
    async fn handle_error(&self, error: JobError) -> Result<Self::Output, JobError> {
        Err(error)
    }

    /// Called by the engine once a job has failed for good.
    async fn on_failure(&self, _failure: &JobFailure) {}
}

/// When a recurring job should be enqueued by the engine's scheduler.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Schedule {
    Cron(String),
    Every(Duration),
}

/// The unqualified name of `T`, without module path or generic arguments.
pub fn short_type_name<T: ?Sized>() -> &'static str {
    let full = std::any::type_name::<T>();
    let base = full.split('<').next().unwrap_or(full);
    base.rsplit("::").next().unwrap_or(base)
}

/// Name a job is enqueued under.
pub(crate) fn resolved_job_name<J: Job>(job: &J) -> &str {
    job.job_name().unwrap_or_else(|| short_type_name::<J>())
}

//! Error types for job definitions, dispatch and the registry.

use jobkit_queue::QueueError;
use thiserror::Error;

/// Errors produced while a job runs inside a worker.
///
/// `perform` returns these, and `handle_error` receives them.
#[derive(Debug, Error)]
pub enum JobError {
    #[error("invalid job arguments: {0}")]
    InvalidArgs(String),

    #[error("job failed: {0}")]
    Failed(String),

    #[error("failed to encode job output: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl JobError {
    pub fn failed(message: impl Into<String>) -> Self {
        Self::Failed(message.into())
    }
}

/// Errors resolving a value from the [`Container`](crate::Container).
#[derive(Debug, Error)]
pub enum ContainerError {
    #[error("no binding registered for {0}")]
    Unbound(&'static str),

    #[error("binding for {0} produced a value of another type")]
    TypeMismatch(&'static str),

    #[error("factory for {type_name} failed: {message}")]
    Factory {
        type_name: &'static str,
        message: String,
    },
}

/// Errors raised at enqueue time.
#[derive(Debug, Error)]
pub enum DispatchError {
    #[error("failed to resolve job: {0}")]
    Container(#[from] ContainerError),

    #[error("failed to encode job arguments: {0}")]
    Encode(#[source] serde_json::Error),

    #[error(transparent)]
    Queue(#[from] QueueError),
}

/// Failure reported by a [`JobDiscovery`](crate::JobDiscovery) source.
#[derive(Debug, Error)]
#[error("job discovery failed: {0}")]
pub struct DiscoveryError(pub String);

/// Errors building or using the job registry.
#[derive(Debug, Error)]
pub enum RegistryError {
    #[error(transparent)]
    Discovery(#[from] DiscoveryError),

    #[error("failed to instantiate job {class_name}: {source}")]
    Container {
        class_name: String,
        #[source]
        source: ContainerError,
    },

    #[error("no job registered under {0}")]
    UnknownJob(String),

    #[error(transparent)]
    Job(#[from] JobError),
}

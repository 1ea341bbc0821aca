//! Background job definitions on top of a Resque-style queue engine.
//!
//! Application code defines jobs as types implementing [`Job`] and enqueues
//! them immediately, after a delay, at a point in time, or in batches. At
//! worker startup, [`build_registry`] discovers the job types and produces
//! the [`Registry`] the engine's workers execute jobs from.
//!
//! # Architecture
//!
//! - [`Job`] - What a kind of background work does and how it fails
//! - [`JobExt`] / [`Dispatch`] - Enqueueing a job, one call per dispatch
//! - [`JobContext`] - Configuration, container and queue engine, passed explicitly
//! - [`Container`] - Factories that build job instances with their dependencies
//! - [`JobDiscovery`] / [`Export`] - Where the registry finds job definitions
//! - [`Registry`] - Wrapped, ready-to-run jobs for queue workers
//!
//! # Example
//!
//! ```rust,no_run
//! use std::sync::Arc;
//!
//! use jobkit::{async_trait, Container, Job, JobContext, JobError, JobExt, JobsConfig};
//! use jobkit_queue::InMemoryQueue;
//! use serde::{Deserialize, Serialize};
//!
//! #[derive(Serialize, Deserialize)]
//! struct Email {
//!     to: String,
//! }
//!
//! #[derive(Default)]
//! struct SendEmail;
//!
//! #[async_trait]
//! impl Job for SendEmail {
//!     type Args = Email;
//!     type Output = ();
//!
//!     async fn perform(&self, email: Email) -> Result<(), JobError> {
//!         println!("sending to {}", email.to);
//!         Ok(())
//!     }
//! }
//!
//! #[tokio::main]
//! async fn main() {
//!     let container = Container::builder().bind_default::<SendEmail>().build();
//!     let ctx = JobContext::new(
//!         JobsConfig::with_queue("mail"),
//!         container,
//!         Arc::new(InMemoryQueue::new()),
//!     );
//!     SendEmail::enqueue_in(&ctx, 5000, Email { to: "a@b.com".into() })
//!         .await
//!         .unwrap();
//! }
//! ```

mod args;
mod container;
mod context;
mod discovery;
mod dispatch;
mod error;
mod job;
mod plugin;
mod registry;
pub mod tracing_setup;

pub use args::{decode_args, encode_args};
pub use container::{Container, ContainerBuilder};
pub use context::JobContext;
pub use discovery::{
    flatten_exports, Definition, Export, FnDefinition, JobDiscovery, JobHandler, JobType,
    StaticDiscovery,
};
pub use dispatch::{Dispatch, Dispatched, JobExt, NamedDispatch};
pub use error::{ContainerError, DiscoveryError, DispatchError, JobError, RegistryError};
pub use job::{short_type_name, Job, Schedule};
pub use plugin::{names as plugin_names, plugins_from_value, PluginSpec};
pub use registry::{build_registry, PerformFn, Registry, RegistryEntry};

pub use jobkit_config::{load_config, validate_config, ConfigError, JobsConfig};
pub use jobkit_queue::{EnqueueKind, EnqueueResult, JobFailure, QueueEngine, QueueError};

// Re-export async_trait for convenience when implementing Job
pub use async_trait::async_trait;

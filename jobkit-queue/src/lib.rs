//! Queue engine seam used by jobkit.
//!
//! This crate defines the small surface jobkit needs from a job-queue
//! engine: three enqueue operations that take a queue name, a job name and
//! an ordered argument list. Storage, scheduling and retries stay inside
//! the engine.
//!
//! # Architecture
//!
//! - [`QueueEngine`] - The trait dispatch code talks to
//! - [`InMemoryQueue`] - Records enqueued work in memory (development, tests)
//! - [`RedisQueue`] - Writes Resque-compatible entries into Redis (feature `redis`)
//! - [`EnqueueResult`] - Acknowledgement of an accepted unit of work
//! - [`JobFailure`] - What an engine reports when a job fails terminally
//!
//! # Example
//!
//! ```rust,no_run
//! use jobkit_queue::{InMemoryQueue, QueueEngine};
//! use serde_json::json;
//!
//! #[tokio::main]
//! async fn main() {
//!     let queue = InMemoryQueue::new();
//!     let receipt = queue
//!         .enqueue("mail", "SendEmail", &[json!({"to": "a@b.com"})])
//!         .await
//!         .unwrap();
//!     println!("Enqueued job: {}", receipt.job_id);
//! }
//! ```

mod engine;
mod error;
mod memory;
#[cfg(feature = "redis")]
mod redis;
mod types;

pub use engine::QueueEngine;
pub use error::QueueError;
pub use memory::InMemoryQueue;
#[cfg(feature = "redis")]
pub use redis::{RedisQueue, DEFAULT_NAMESPACE};
pub use types::{EnqueueKind, EnqueueResult, JobFailure, QueuedJob};

// Re-export async_trait for convenience when implementing QueueEngine
pub use async_trait::async_trait;

//! Queue engine plugins attached to job definitions.

use serde_json::{json, Value};
use tracing::warn;

/// Names of the plugins Resque-style engines ship with.
pub mod names {
    pub const JOB_LOCK: &str = "JobLock";
    pub const QUEUE_LOCK: &str = "QueueLock";
    pub const DELAY_QUEUE_LOCK: &str = "DelayQueueLock";
    pub const RETRY: &str = "Retry";
    pub const NOOP: &str = "Noop";
}

/// A plugin the engine should run around a job, with its options.
#[derive(Debug, Clone, PartialEq)]
pub struct PluginSpec {
    pub name: String,
    pub options: Value,
}

impl PluginSpec {
    /// A plugin with empty options.
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            options: json!({}),
        }
    }

    #[inline]
    #[must_use]
    pub fn with_options(mut self, options: Value) -> Self {
        self.options = options;
        self
    }

    /// Retry a failed job up to `retry_limit` times, `retry_delay_ms` apart.
    pub fn retry(retry_limit: u32, retry_delay_ms: u64) -> Self {
        Self::new(names::RETRY).with_options(json!({
            "retryLimit": retry_limit,
            "retryDelay": retry_delay_ms,
        }))
    }

    /// Refuse to run two jobs with identical arguments at once.
    pub fn job_lock() -> Self {
        Self::new(names::JOB_LOCK)
    }

    /// Refuse to enqueue a job whose identical twin is already queued.
    pub fn queue_lock() -> Self {
        Self::new(names::QUEUE_LOCK)
    }

    /// Refuse to enqueue a job whose identical twin is already delayed.
    pub fn delay_queue_lock() -> Self {
        Self::new(names::DELAY_QUEUE_LOCK)
    }
}

/// Read a plugin list from its JSON form: `[[name, options], ...]`.
///
/// Returns `None` when the value is not a list at all. Entries that are
/// not a `[name]` or `[name, options]` pair are skipped.
pub fn plugins_from_value(value: &Value) -> Option<Vec<PluginSpec>> {
    let entries = value.as_array()?;
    let plugins = entries
        .iter()
        .filter_map(|entry| {
            let pair = entry.as_array();
            let name = pair.and_then(|p| p.first()).and_then(Value::as_str);
            match (name, pair) {
                (Some(name), Some(pair)) => Some(PluginSpec {
                    name: name.to_owned(),
                    options: pair.get(1).cloned().unwrap_or_else(|| json!({})),
                }),
                _ => {
                    warn!(entry = %entry, "skipping malformed plugin entry");
                    None
                }
            }
        })
        .collect();
    Some(plugins)
}

//! Startup registry of runnable jobs for queue workers.
//!
//! [`build_registry`] walks the exports of a [`JobDiscovery`] source, keeps
//! the ones shaped like jobs, instantiates each through the container and
//! wraps its `perform` so failures go through the job's `handle_error`.

use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;

use futures::future::BoxFuture;
use jobkit_queue::JobFailure;
use serde_json::Value;
use tracing::{debug, info, warn};

use crate::context::JobContext;
use crate::discovery::{flatten_exports, Export, JobDiscovery, JobHandler};
use crate::error::{JobError, RegistryError};
use crate::job::Schedule;

/// Wrapped `perform` of a registered job: raw engine arguments in, JSON
/// output out.
pub type PerformFn =
    Arc<dyn Fn(Vec<Value>) -> BoxFuture<'static, Result<Value, JobError>> + Send + Sync>;

/// Everything a worker needs to run one kind of job.
#[derive(Clone)]
pub struct RegistryEntry {
    pub perform: PerformFn,
    /// The instance built at startup; `perform` runs against it.
    pub job: Arc<dyn JobHandler>,
    pub plugins: Vec<String>,
    pub plugin_options: BTreeMap<String, Value>,
    pub schedule: Option<Schedule>,
}

impl fmt::Debug for RegistryEntry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RegistryEntry")
            .field("job_name", &self.job.job_name())
            .field("plugins", &self.plugins)
            .field("plugin_options", &self.plugin_options)
            .field("schedule", &self.schedule)
            .finish_non_exhaustive()
    }
}

/// Immutable map of registered jobs, keyed by definition name.
#[derive(Debug, Clone, Default)]
pub struct Registry {
    entries: BTreeMap<String, RegistryEntry>,
}

impl Registry {
    /// Look up an entry by definition name, then by the job name it is
    /// enqueued under.
    pub fn get(&self, name: &str) -> Option<&RegistryEntry> {
        self.entries.get(name).or_else(|| {
            self.entries
                .values()
                .find(|entry| entry.job.job_name() == name)
        })
    }

    pub fn contains(&self, name: &str) -> bool {
        self.get(name).is_some()
    }

    /// Definition names, sorted.
    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.entries.keys().map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &RegistryEntry)> {
        self.entries.iter().map(|(name, entry)| (name.as_str(), entry))
    }

    /// Run a registered job the way a worker would.
    pub async fn perform(&self, name: &str, args: Vec<Value>) -> Result<Value, RegistryError> {
        let entry = self
            .get(name)
            .ok_or_else(|| RegistryError::UnknownJob(name.to_owned()))?;
        Ok((entry.perform)(args).await?)
    }

    /// Hand a permanent failure to the job's `on_failure` hook.
    pub async fn on_failure(&self, failure: &JobFailure) -> Result<(), RegistryError> {
        let entry = self
            .get(&failure.job_name)
            .ok_or_else(|| RegistryError::UnknownJob(failure.job_name.clone()))?;
        entry.job.on_failure(failure).await;
        Ok(())
    }

    /// Entries carrying a recurring schedule.
    pub fn scheduled(&self) -> impl Iterator<Item = (&str, &Schedule)> {
        self.iter()
            .filter_map(|(name, entry)| entry.schedule.as_ref().map(|s| (name, s)))
    }
}

/// Route `perform` failures through `handle_error`.
fn wrap_perform(job: Arc<dyn JobHandler>) -> PerformFn {
    Arc::new(move |args| {
        let job = job.clone();
        Box::pin(async move {
            match job.perform(args).await {
                Ok(output) => Ok(output),
                Err(error) => job.handle_error(error).await,
            }
        })
    })
}

fn registry_entry(class_name: &str, job: Arc<dyn JobHandler>) -> RegistryEntry {
    let plugins = job.plugins().unwrap_or_else(|| {
        warn!(class_name, "plugins field is not a list, treating as empty");
        Vec::new()
    });
    let names = plugins.iter().map(|p| p.name.clone()).collect();
    let plugin_options = plugins.into_iter().map(|p| (p.name, p.options)).collect();

    RegistryEntry {
        perform: wrap_perform(job.clone()),
        schedule: job.schedule(),
        job,
        plugins: names,
        plugin_options,
    }
}

/// Build the worker registry from everything `discovery` exports.
///
/// Exports that are not jobs are skipped. Finding nothing yields an empty
/// registry. A job the container cannot build aborts the whole build.
pub async fn build_registry<D>(ctx: &JobContext, discovery: &D) -> Result<Registry, RegistryError>
where
    D: JobDiscovery + ?Sized,
{
    let exports = flatten_exports(discovery.discover().await?);
    let mut entries = BTreeMap::new();

    for (export_name, export) in &exports {
        let Some(definition) = export.as_job() else {
            if !matches!(export, Export::Namespace(_)) {
                debug!(export = %export_name, "skipping export that is not a job");
            }
            continue;
        };

        let class_name = definition.class_name().to_owned();
        let job = definition
            .instantiate(ctx.container())
            .map_err(|source| RegistryError::Container {
                class_name: class_name.clone(),
                source,
            })?;

        let entry = registry_entry(&class_name, job);
        debug!(
            class_name = %class_name,
            job_name = entry.job.job_name(),
            plugins = ?entry.plugins,
            "registered job"
        );
        entries.insert(class_name, entry);
    }

    info!(count = entries.len(), "job registry built");
    Ok(Registry { entries })
}

//! Finding job definitions at startup.
//!
//! A [`JobDiscovery`] source surfaces named [`Export`]s, the way a module
//! tree exposes its items. Some exports are job definitions, others are
//! namespaces grouping more exports, plain values, or nothing at all. The
//! registry builder keeps only definitions that can both perform and be
//! enqueued.

use std::collections::BTreeMap;
use std::fmt;
use std::future::Future;
use std::marker::PhantomData;
use std::sync::Arc;

use async_trait::async_trait;
use futures::future::BoxFuture;
use jobkit_queue::JobFailure;
use serde_json::{json, Value};

use crate::args::decode_args;
use crate::container::Container;
use crate::error::{ContainerError, DiscoveryError, JobError};
use crate::job::{resolved_job_name, short_type_name, Job, Schedule};
use crate::plugin::{plugins_from_value, PluginSpec};

/// A job instance with its types erased, as workers see it.
#[async_trait]
pub trait JobHandler: Send + Sync {
    /// Name the job is enqueued under.
    fn job_name(&self) -> &str;

    /// Plugin list, or `None` when the instance's plugin field is not a list.
    fn plugins(&self) -> Option<Vec<PluginSpec>>;

    fn schedule(&self) -> Option<Schedule>;

    /// Run the job with raw engine arguments. Failures are returned as-is.
    async fn perform(&self, args: Vec<Value>) -> Result<Value, JobError>;

    async fn handle_error(&self, error: JobError) -> Result<Value, JobError>;

    async fn on_failure(&self, failure: &JobFailure);
}

/// A job type surfaced by discovery, probed for its capabilities at runtime.
pub trait Definition: Send + Sync {
    /// Identifier of the definition; the registry is keyed by it.
    fn class_name(&self) -> &str;

    fn has_perform(&self) -> bool;

    fn has_enqueue(&self) -> bool;

    /// Build one instance through the container.
    fn instantiate(&self, container: &Container) -> Result<Arc<dyn JobHandler>, ContainerError>;
}

/// Definition of a Rust [`Job`] type.
pub struct JobType<J: Job>(PhantomData<fn() -> J>);

impl<J: Job> JobType<J> {
    pub fn new() -> Self {
        Self(PhantomData)
    }
}

impl<J: Job> Default for JobType<J> {
    fn default() -> Self {
        Self::new()
    }
}

impl<J: Job> fmt::Debug for JobType<J> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("JobType").field(&short_type_name::<J>()).finish()
    }
}

impl<J: Job> Definition for JobType<J> {
    fn class_name(&self) -> &str {
        short_type_name::<J>()
    }

    fn has_perform(&self) -> bool {
        true
    }

    fn has_enqueue(&self) -> bool {
        true
    }

    fn instantiate(&self, container: &Container) -> Result<Arc<dyn JobHandler>, ContainerError> {
        let job = container.make::<J>()?;
        Ok(Arc::new(TypedHandler(job)))
    }
}

struct TypedHandler<J: Job>(J);

#[async_trait]
impl<J: Job> JobHandler for TypedHandler<J> {
    fn job_name(&self) -> &str {
        resolved_job_name(&self.0)
    }

    fn plugins(&self) -> Option<Vec<PluginSpec>> {
        Some(self.0.plugins())
    }

    fn schedule(&self) -> Option<Schedule> {
        self.0.schedule()
    }

    async fn perform(&self, args: Vec<Value>) -> Result<Value, JobError> {
        let args: J::Args = decode_args(args)?;
        let output = self.0.perform(args).await?;
        Ok(serde_json::to_value(output)?)
    }

    async fn handle_error(&self, error: JobError) -> Result<Value, JobError> {
        let output = self.0.handle_error(error).await?;
        Ok(serde_json::to_value(output)?)
    }

    async fn on_failure(&self, failure: &JobFailure) {
        self.0.on_failure(failure).await
    }
}

type RawPerform = Arc<dyn Fn(Vec<Value>) -> BoxFuture<'static, Result<Value, JobError>> + Send + Sync>;
type RawHandleError =
    Arc<dyn Fn(JobError) -> BoxFuture<'static, Result<Value, JobError>> + Send + Sync>;

/// Definition assembled from closures at runtime.
///
/// Lets applications register jobs that are described by data (manifests,
/// scripting bridges) rather than by a Rust type. Capabilities are whatever
/// the builder was given, so such definitions are exactly what the
/// registry's capability check exists for.
#[derive(Clone)]
pub struct FnDefinition {
    class_name: String,
    job_name: Option<String>,
    perform: Option<RawPerform>,
    handle_error: Option<RawHandleError>,
    enqueue: bool,
    plugins: Value,
    schedule: Option<Schedule>,
}

impl fmt::Debug for FnDefinition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FnDefinition")
            .field("class_name", &self.class_name)
            .field("job_name", &self.job_name)
            .field("perform", &self.perform.is_some())
            .field("enqueue", &self.enqueue)
            .field("plugins", &self.plugins)
            .finish_non_exhaustive()
    }
}

impl FnDefinition {
    pub fn new(class_name: impl Into<String>) -> Self {
        Self {
            class_name: class_name.into(),
            job_name: None,
            perform: None,
            handle_error: None,
            enqueue: false,
            plugins: json!([]),
            schedule: None,
        }
    }

    #[must_use]
    pub fn job_name(mut self, job_name: impl Into<String>) -> Self {
        self.job_name = Some(job_name.into());
        self
    }

    #[must_use]
    pub fn perform<F, Fut>(mut self, perform: F) -> Self
    where
        F: Fn(Vec<Value>) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<Value, JobError>> + Send + 'static,
    {
        self.perform = Some(Arc::new(move |args| Box::pin(perform(args))));
        self
    }

    #[must_use]
    pub fn handle_error<F, Fut>(mut self, handle_error: F) -> Self
    where
        F: Fn(JobError) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<Value, JobError>> + Send + 'static,
    {
        self.handle_error = Some(Arc::new(move |error| Box::pin(handle_error(error))));
        self
    }

    /// Mark the definition as enqueueable by name through
    /// [`JobContext::dispatch_named`](crate::JobContext::dispatch_named).
    #[must_use]
    pub fn enqueueable(mut self) -> Self {
        self.enqueue = true;
        self
    }

    /// Raw plugin field in its JSON form, see [`plugins_from_value`].
    #[must_use]
    pub fn plugins(mut self, plugins: Value) -> Self {
        self.plugins = plugins;
        self
    }

    #[must_use]
    pub fn schedule(mut self, schedule: Schedule) -> Self {
        self.schedule = Some(schedule);
        self
    }
}

impl Definition for FnDefinition {
    fn class_name(&self) -> &str {
        &self.class_name
    }

    fn has_perform(&self) -> bool {
        self.perform.is_some()
    }

    fn has_enqueue(&self) -> bool {
        self.enqueue
    }

    fn instantiate(&self, _container: &Container) -> Result<Arc<dyn JobHandler>, ContainerError> {
        Ok(Arc::new(self.clone()))
    }
}

#[async_trait]
impl JobHandler for FnDefinition {
    fn job_name(&self) -> &str {
        self.job_name.as_deref().unwrap_or(&self.class_name)
    }

    fn plugins(&self) -> Option<Vec<PluginSpec>> {
        plugins_from_value(&self.plugins)
    }

    fn schedule(&self) -> Option<Schedule> {
        self.schedule.clone()
    }

    async fn perform(&self, args: Vec<Value>) -> Result<Value, JobError> {
        match &self.perform {
            Some(perform) => perform(args).await,
            None => Err(JobError::failed(format!(
                "{} has no perform implementation",
                self.class_name
            ))),
        }
    }

    async fn handle_error(&self, error: JobError) -> Result<Value, JobError> {
        match &self.handle_error {
            Some(handle_error) => handle_error(error).await,
            None => Err(error),
        }
    }

    async fn on_failure(&self, _failure: &JobFailure) {}
}

/// One named item surfaced by a discovery source.
#[derive(Clone)]
pub enum Export {
    Job(Arc<dyn Definition>),
    /// A group of exports, such as one module of job definitions.
    Namespace(BTreeMap<String, Export>),
    /// Anything that is not a job: constants, helpers, configuration.
    Value(Value),
    /// An export that resolved to nothing.
    Missing,
}

impl fmt::Debug for Export {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Job(definition) => f.debug_tuple("Job").field(&definition.class_name()).finish(),
            Self::Namespace(members) => f.debug_tuple("Namespace").field(members).finish(),
            Self::Value(value) => f.debug_tuple("Value").field(value).finish(),
            Self::Missing => f.write_str("Missing"),
        }
    }
}

impl Export {
    /// Export the Rust job type `J`.
    pub fn job<J: Job>() -> Self {
        Self::Job(Arc::new(JobType::<J>::new()))
    }

    pub fn definition<D: Definition + 'static>(definition: D) -> Self {
        Self::Job(Arc::new(definition))
    }

    /// The definition behind this export, if it is shaped like a job:
    /// present, able to perform, and able to be enqueued.
    pub fn as_job(&self) -> Option<&Arc<dyn Definition>> {
        match self {
            Self::Job(definition) if definition.has_perform() && definition.has_enqueue() => {
                Some(definition)
            }
            _ => None,
        }
    }
}

/// Lift the members of each top-level namespace next to it.
///
/// Only one level is flattened. Lifted members overwrite top-level exports
/// of the same name.
pub fn flatten_exports(mut exports: BTreeMap<String, Export>) -> BTreeMap<String, Export> {
    let namespaces: Vec<BTreeMap<String, Export>> = exports
        .values()
        .filter_map(|export| match export {
            Export::Namespace(members) => Some(members.clone()),
            _ => None,
        })
        .collect();
    for members in namespaces {
        exports.extend(members);
    }
    exports
}

/// Source of the exports the registry is built from.
#[async_trait]
pub trait JobDiscovery: Send + Sync {
    async fn discover(&self) -> Result<BTreeMap<String, Export>, DiscoveryError>;
}

/// Discovery from an explicit, compile-time list of exports.
#[derive(Debug, Clone, Default)]
pub struct StaticDiscovery {
    exports: BTreeMap<String, Export>,
}

impl StaticDiscovery {
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn export(mut self, name: impl Into<String>, export: Export) -> Self {
        self.exports.insert(name.into(), export);
        self
    }

    /// Export `J` under its type name.
    #[must_use]
    pub fn job<J: Job>(self) -> Self {
        self.export(short_type_name::<J>(), Export::job::<J>())
    }

    /// Export a group of definitions under `name`.
    #[must_use]
    pub fn namespace(self, name: impl Into<String>, members: StaticDiscovery) -> Self {
        self.export(name, Export::Namespace(members.exports))
    }

    pub fn len(&self) -> usize {
        self.exports.len()
    }

    pub fn is_empty(&self) -> bool {
        self.exports.is_empty()
    }
}

#[async_trait]
impl JobDiscovery for StaticDiscovery {
    async fn discover(&self) -> Result<BTreeMap<String, Export>, DiscoveryError> {
        Ok(self.exports.clone())
    }
}

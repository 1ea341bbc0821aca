//! Enqueueing jobs.
//!
//! A [`Dispatch`] is a single-use job instance: it records how the job
//! should be enqueued (now, after a delay, at a time, or as a batch) and
//! hands exactly that to the queue engine. The static forms on [`JobExt`]
//! resolve a fresh instance through the container for every call.

use std::future::Future;

use futures::future::try_join_all;
use jobkit_queue::EnqueueResult;
use serde_json::Value;
use tracing::{info, info_span};

use crate::args::encode_args;
use crate::context::JobContext;
use crate::error::DispatchError;
use crate::job::{resolved_job_name, Job};

/// Outcome of a dispatch.
#[derive(Debug, Clone, PartialEq)]
pub enum Dispatched {
    /// One item was handed to the engine.
    Single(EnqueueResult),
    /// One item per payload of a batch, in payload order.
    Batch(Vec<EnqueueResult>),
    /// Nothing was enqueued: no enqueue call preceded execution.
    Noop,
}

impl Dispatched {
    pub fn is_noop(&self) -> bool {
        matches!(self, Self::Noop)
    }

    /// All acknowledgements, whatever the dispatch mode.
    pub fn receipts(&self) -> &[EnqueueResult] {
        match self {
            Self::Single(receipt) => std::slice::from_ref(receipt),
            Self::Batch(receipts) => receipts,
            Self::Noop => &[],
        }
    }
}

/// Enqueue intent recorded on an instance before execution.
#[derive(Debug, Default, Clone)]
struct DispatchState {
    queue_name: Option<String>,
    args: Vec<Value>,
    all_args: Vec<Vec<Value>>,
    delay_ms: u64,
    run_at_ms: Option<i64>,
    has_enqueued: bool,
    has_enqueued_all: bool,
}

impl DispatchState {
    fn push(&mut self, args: Vec<Value>, delay_ms: Option<u64>, run_at_ms: Option<i64>) {
        self.args = args;
        self.has_enqueued = true;
        self.delay_ms = delay_ms.unwrap_or(0);
        self.run_at_ms = run_at_ms;
    }

    fn push_all(&mut self, all_args: Vec<Vec<Value>>) {
        self.all_args = all_args;
        self.has_enqueued_all = true;
    }

    /// Run-at time, if set. Zero counts as unset, like a zero delay.
    fn run_at_ms(&self) -> Option<i64> {
        self.run_at_ms.filter(|&run_at_ms| run_at_ms != 0)
    }

    fn queue_name<'a>(&'a self, ctx: &'a JobContext, job_queue: Option<&'a str>) -> &'a str {
        self.queue_name
            .as_deref()
            .or(job_queue)
            .unwrap_or(&ctx.config().queue_name_for_jobs)
    }

    fn enqueue_tip(&self, queue_name: &str, job_name: &str) -> String {
        let tip = format!("enqueued to queue {queue_name}, job {job_name}");
        if self.delay_ms > 0 {
            format!("{tip}, delay {}ms", self.delay_ms)
        } else if let Some(run_at_ms) = self.run_at_ms() {
            format!("{tip}, run at {run_at_ms}")
        } else {
            tip
        }
    }

    async fn execute(
        &self,
        ctx: &JobContext,
        job_name: &str,
        job_queue: Option<&str>,
    ) -> Result<Dispatched, DispatchError> {
        let queue_name = self.queue_name(ctx, job_queue);
        let engine = ctx.queue();

        if self.has_enqueued {
            let config = ctx.config();
            if config.verbose {
                let tip = self.enqueue_tip(queue_name, job_name);
                match config.logger.as_deref() {
                    Some(logger) => info_span!("logger", name = logger)
                        .in_scope(|| info!(queue = queue_name, job = job_name, "{tip}")),
                    None => info!(queue = queue_name, job = job_name, "{tip}"),
                }
            }

            let receipt = if self.delay_ms > 0 {
                engine
                    .enqueue_in(self.delay_ms, queue_name, job_name, &self.args)
                    .await?
            } else if let Some(run_at_ms) = self.run_at_ms() {
                engine
                    .enqueue_at(run_at_ms, queue_name, job_name, &self.args)
                    .await?
            } else {
                engine.enqueue(queue_name, job_name, &self.args).await?
            };
            Ok(Dispatched::Single(receipt))
        } else if self.has_enqueued_all {
            let receipts = try_join_all(
                self.all_args
                    .iter()
                    .map(|args| engine.enqueue(queue_name, job_name, args)),
            )
            .await?;
            Ok(Dispatched::Batch(receipts))
        } else {
            Ok(Dispatched::Noop)
        }
    }
}

/// A job instance on its way to the queue engine.
///
/// Every enqueue method consumes the instance: one instance, one dispatch.
pub struct Dispatch<J: Job> {
    job: J,
    ctx: JobContext,
    state: DispatchState,
}

impl<J: Job> std::fmt::Debug for Dispatch<J> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Dispatch")
            .field("job_name", &self.job_name())
            .field("state", &self.state)
            .finish_non_exhaustive()
    }
}

impl<J: Job> Dispatch<J> {
    /// Wrap an already-built job. Most callers use [`JobExt`] or
    /// [`JobContext::dispatch`] instead.
    pub fn new(job: J, ctx: &JobContext) -> Self {
        Self {
            job,
            ctx: ctx.clone(),
            state: DispatchState::default(),
        }
    }

    pub fn job(&self) -> &J {
        &self.job
    }

    pub fn job_name(&self) -> &str {
        resolved_job_name(&self.job)
    }

    /// Queue this instance will enqueue to.
    pub fn queue_name(&self) -> &str {
        self.state.queue_name(&self.ctx, self.job.queue_name())
    }

    /// Send this instance to `queue_name` instead of the job's default.
    #[must_use]
    pub fn queue(mut self, queue_name: impl Into<String>) -> Self {
        self.state.queue_name = Some(queue_name.into());
        self
    }

    /// Enqueue for execution as soon as a worker is free.
    pub async fn enqueue(mut self, args: J::Args) -> Result<Dispatched, DispatchError> {
        let args = encode_args(&args).map_err(DispatchError::Encode)?;
        self.state.push(args, None, None);
        self.execute().await
    }

    /// Enqueue for execution no earlier than `delay_ms` from now.
    pub async fn enqueue_in(
        mut self,
        delay_ms: u64,
        args: J::Args,
    ) -> Result<Dispatched, DispatchError> {
        let args = encode_args(&args).map_err(DispatchError::Encode)?;
        self.state.push(args, Some(delay_ms), None);
        self.execute().await
    }

    /// Enqueue for execution at the Unix timestamp `run_at_ms`.
    pub async fn enqueue_at(
        mut self,
        run_at_ms: i64,
        args: J::Args,
    ) -> Result<Dispatched, DispatchError> {
        let args = encode_args(&args).map_err(DispatchError::Encode)?;
        self.state.push(args, None, Some(run_at_ms));
        self.execute().await
    }

    /// Enqueue one item per payload, all at once.
    ///
    /// Fails as soon as one enqueue fails. Items already accepted by the
    /// engine stay enqueued.
    pub async fn enqueue_all(mut self, args: Vec<J::Args>) -> Result<Dispatched, DispatchError> {
        let all_args = args
            .iter()
            .map(encode_args)
            .collect::<Result<Vec<_>, _>>()
            .map_err(DispatchError::Encode)?;
        self.state.push_all(all_args);
        self.execute().await
    }

    async fn execute(&self) -> Result<Dispatched, DispatchError> {
        self.state
            .execute(&self.ctx, self.job_name(), self.job.queue_name())
            .await
    }
}

/// Dispatch by job name with raw arguments.
///
/// Used for jobs that are defined outside this process or registered at
/// runtime through a [`FnDefinition`](crate::FnDefinition).
#[derive(Debug)]
pub struct NamedDispatch {
    job_name: String,
    ctx: JobContext,
    state: DispatchState,
}

impl NamedDispatch {
    pub fn new(job_name: impl Into<String>, ctx: &JobContext) -> Self {
        Self {
            job_name: job_name.into(),
            ctx: ctx.clone(),
            state: DispatchState::default(),
        }
    }

    pub fn job_name(&self) -> &str {
        &self.job_name
    }

    #[must_use]
    pub fn queue(mut self, queue_name: impl Into<String>) -> Self {
        self.state.queue_name = Some(queue_name.into());
        self
    }

    pub async fn enqueue(mut self, args: Vec<Value>) -> Result<Dispatched, DispatchError> {
        self.state.push(args, None, None);
        self.execute().await
    }

    pub async fn enqueue_in(
        mut self,
        delay_ms: u64,
        args: Vec<Value>,
    ) -> Result<Dispatched, DispatchError> {
        self.state.push(args, Some(delay_ms), None);
        self.execute().await
    }

    pub async fn enqueue_at(
        mut self,
        run_at_ms: i64,
        args: Vec<Value>,
    ) -> Result<Dispatched, DispatchError> {
        self.state.push(args, None, Some(run_at_ms));
        self.execute().await
    }

    pub async fn enqueue_all(mut self, args: Vec<Vec<Value>>) -> Result<Dispatched, DispatchError> {
        self.state.push_all(args);
        self.execute().await
    }

    async fn execute(&self) -> Result<Dispatched, DispatchError> {
        self.state.execute(&self.ctx, &self.job_name, None).await
    }
}

/// Static enqueue helpers available on every [`Job`].
///
/// Each call resolves a fresh instance of the job through the context's
/// container and dispatches it:
///
/// ```rust,ignore
/// SendEmail::enqueue_in(&ctx, 5000, Email { to: "a@b.com".into() }).await?;
/// ```
pub trait JobExt: Job {
    /// Resolve a fresh instance for the fluent instance form.
    fn make(ctx: &JobContext) -> Result<Dispatch<Self>, DispatchError> {
        ctx.dispatch::<Self>()
    }

    fn enqueue(
        ctx: &JobContext,
        args: Self::Args,
    ) -> impl Future<Output = Result<Dispatched, DispatchError>> + Send {
        async move { Self::make(ctx)?.enqueue(args).await }
    }

    fn enqueue_in(
        ctx: &JobContext,
        delay_ms: u64,
        args: Self::Args,
    ) -> impl Future<Output = Result<Dispatched, DispatchError>> + Send {
        async move { Self::make(ctx)?.enqueue_in(delay_ms, args).await }
    }

    fn enqueue_at(
        ctx: &JobContext,
        run_at_ms: i64,
        args: Self::Args,
    ) -> impl Future<Output = Result<Dispatched, DispatchError>> + Send {
        async move { Self::make(ctx)?.enqueue_at(run_at_ms, args).await }
    }

    fn enqueue_all(
        ctx: &JobContext,
        args: Vec<Self::Args>,
    ) -> impl Future<Output = Result<Dispatched, DispatchError>> + Send {
        async move { Self::make(ctx)?.enqueue_all(args).await }
    }
}

impl<J: Job> JobExt for J {}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::container::Container;
    use crate::error::JobError;
    use async_trait::async_trait;
    use jobkit_config::JobsConfig;
    use jobkit_queue::{EnqueueKind, InMemoryQueue, QueueEngine, QueueError};
    use serde_json::json;
    use std::collections::BTreeMap;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::{Arc, Mutex};
    use tracing::field::{Field, Visit};
    use tracing::instrument::WithSubscriber;
    use tracing::span::{Attributes, Id};
    use tracing::{Event, Level, Subscriber};
    use tracing_subscriber::layer::{Context as LayerContext, Layer, SubscriberExt};
    use tracing_subscriber::registry::LookupSpan;

    #[derive(Default)]
    struct Cleanup;

    #[async_trait]
    impl Job for Cleanup {
        type Args = (String,);
        type Output = ();

        async fn perform(&self, _args: (String,)) -> Result<(), JobError> {
            Ok(())
        }
    }

    #[derive(Default)]
    struct Digest;

    #[async_trait]
    impl Job for Digest {
        type Args = ();
        type Output = ();

        fn job_name(&self) -> Option<&str> {
            Some("digest.weekly")
        }

        fn queue_name(&self) -> Option<&str> {
            Some("low")
        }

        async fn perform(&self, _args: ()) -> Result<(), JobError> {
            Ok(())
        }
    }

    /// Engine counting calls and failing every `fail_on`-th enqueue.
    #[derive(Default)]
    struct CountingQueue {
        inner: InMemoryQueue,
        calls: AtomicUsize,
        fail_on: Option<usize>,
    }

    impl CountingQueue {
        fn check(&self) -> Result<(), QueueError> {
            let call = self.calls.fetch_add(1, Ordering::SeqCst) + 1;
            match self.fail_on {
                Some(n) if n == call => Err(QueueError::Unavailable("connection reset".into())),
                _ => Ok(()),
            }
        }
    }

    #[async_trait]
    impl QueueEngine for CountingQueue {
        async fn enqueue(
            &self,
            queue: &str,
            job_name: &str,
            args: &[Value],
        ) -> Result<EnqueueResult, QueueError> {
            self.check()?;
            self.inner.enqueue(queue, job_name, args).await
        }

        async fn enqueue_in(
            &self,
            delay_ms: u64,
            queue: &str,
            job_name: &str,
            args: &[Value],
        ) -> Result<EnqueueResult, QueueError> {
            self.check()?;
            self.inner.enqueue_in(delay_ms, queue, job_name, args).await
        }

        async fn enqueue_at(
            &self,
            timestamp_ms: i64,
            queue: &str,
            job_name: &str,
            args: &[Value],
        ) -> Result<EnqueueResult, QueueError> {
            self.check()?;
            self.inner
                .enqueue_at(timestamp_ms, queue, job_name, args)
                .await
        }
    }

    fn context(queue: Arc<CountingQueue>) -> JobContext {
        let container = Container::builder()
            .bind_default::<Cleanup>()
            .bind_default::<Digest>()
            .build();
        JobContext::new(JobsConfig::with_queue("maintenance"), container, queue)
    }

    #[tokio::test]
    async fn execute_without_enqueue_is_noop() {
        let queue = Arc::new(CountingQueue::default());
        let ctx = context(queue.clone());
        let dispatch = ctx.dispatch::<Cleanup>().unwrap();

        let outcome = dispatch.execute().await.unwrap();
        assert!(outcome.is_noop());
        assert!(outcome.receipts().is_empty());
        assert_eq!(queue.calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn delay_wins_over_run_at() {
        let queue = Arc::new(CountingQueue::default());
        let ctx = context(queue.clone());
        let mut dispatch = ctx.dispatch::<Cleanup>().unwrap();
        dispatch
            .state
            .push(vec![json!("tmp")], Some(1500), Some(1_700_000_000_000));

        let outcome = dispatch.execute().await.unwrap();
        let Dispatched::Single(receipt) = outcome else {
            panic!("expected a single dispatch");
        };
        assert_eq!(receipt.kind, EnqueueKind::Delayed { delay_ms: 1500 });
        assert_eq!(queue.calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn zero_delay_falls_through_to_run_at() {
        let queue = Arc::new(CountingQueue::default());
        let ctx = context(queue.clone());
        let outcome = Cleanup::enqueue_in(&ctx, 0, ("tmp".into(),)).await.unwrap();
        assert_eq!(outcome.receipts()[0].kind, EnqueueKind::Immediate);

        let outcome = Cleanup::enqueue_at(&ctx, 1_700_000_000_000, ("tmp".into(),))
            .await
            .unwrap();
        assert_eq!(
            outcome.receipts()[0].kind,
            EnqueueKind::Scheduled {
                timestamp_ms: 1_700_000_000_000
            }
        );
    }

    #[tokio::test]
    async fn queue_resolution_order() {
        let queue = Arc::new(CountingQueue::default());
        let ctx = context(queue.clone());

        assert_eq!(ctx.dispatch::<Cleanup>().unwrap().queue_name(), "maintenance");
        assert_eq!(ctx.dispatch::<Digest>().unwrap().queue_name(), "low");
        let overridden = ctx.dispatch::<Digest>().unwrap().queue("urgent");
        assert_eq!(overridden.queue_name(), "urgent");
        assert_eq!(overridden.job_name(), "digest.weekly");

        let outcome = overridden.enqueue(()).await.unwrap();
        let receipt = &outcome.receipts()[0];
        assert_eq!(receipt.queue, "urgent");
        assert_eq!(receipt.job_name, "digest.weekly");
    }

    #[tokio::test]
    async fn batch_stops_on_first_failure() {
        let queue = Arc::new(CountingQueue {
            fail_on: Some(2),
            ..CountingQueue::default()
        });
        let ctx = context(queue.clone());

        let err = Cleanup::enqueue_all(
            &ctx,
            vec![("a".into(),), ("b".into(),), ("c".into(),)],
        )
        .await
        .unwrap_err();
        assert!(matches!(err, DispatchError::Queue(QueueError::Unavailable(_))));
        assert!(queue.calls.load(Ordering::SeqCst) >= 2);
    }

    #[tokio::test]
    async fn enqueue_errors_propagate_unchanged() {
        let queue = Arc::new(CountingQueue {
            fail_on: Some(1),
            ..CountingQueue::default()
        });
        let ctx = context(queue.clone());
        let err = Cleanup::enqueue(&ctx, ("tmp".into(),)).await.unwrap_err();
        assert!(matches!(err, DispatchError::Queue(QueueError::Unavailable(msg)) if msg == "connection reset"));
    }

    #[tokio::test]
    async fn named_dispatch_uses_default_queue() {
        let queue = Arc::new(CountingQueue::default());
        let ctx = context(queue.clone());

        let outcome = ctx
            .dispatch_named("Reindex")
            .enqueue_all(vec![vec![json!(1)], vec![json!(2)]])
            .await
            .unwrap();
        assert_eq!(outcome.receipts().len(), 2);
        let jobs = queue.inner.list(Some("maintenance")).await;
        assert_eq!(jobs.len(), 2);
        assert!(jobs.iter().all(|j| j.job_name == "Reindex"));
    }

    #[test]
    fn tip_mentions_delay_or_run_at() {
        let mut state = DispatchState::default();
        state.push(vec![], Some(5000), None);
        assert_eq!(
            state.enqueue_tip("mail", "SendEmail"),
            "enqueued to queue mail, job SendEmail, delay 5000ms"
        );
        state.push(vec![], None, Some(42));
        assert_eq!(
            state.enqueue_tip("mail", "SendEmail"),
            "enqueued to queue mail, job SendEmail, run at 42"
        );
        state.push(vec![], None, None);
        assert_eq!(
            state.enqueue_tip("mail", "SendEmail"),
            "enqueued to queue mail, job SendEmail"
        );
    }

    #[tokio::test]
    async fn zero_run_at_counts_as_unset() {
        let queue = Arc::new(CountingQueue::default());
        let ctx = context(queue.clone());
        let outcome = Cleanup::enqueue_at(&ctx, 0, ("tmp".into(),)).await.unwrap();
        assert_eq!(outcome.receipts()[0].kind, EnqueueKind::Immediate);
        assert_eq!(queue.calls.load(Ordering::SeqCst), 1);

        let mut state = DispatchState::default();
        state.push(vec![], None, Some(0));
        assert_eq!(
            state.enqueue_tip("maintenance", "Cleanup"),
            "enqueued to queue maintenance, job Cleanup"
        );
    }

    /// One event seen by [`Captured`], with the spans it was logged in.
    #[derive(Debug)]
    struct CapturedEvent {
        level: Level,
        fields: BTreeMap<String, String>,
        spans: Vec<(String, BTreeMap<String, String>)>,
    }

    #[derive(Default)]
    struct FieldMap(BTreeMap<String, String>);

    impl Visit for FieldMap {
        fn record_str(&mut self, field: &Field, value: &str) {
            self.0.insert(field.name().to_owned(), value.to_owned());
        }

        fn record_debug(&mut self, field: &Field, value: &dyn std::fmt::Debug) {
            self.0.insert(field.name().to_owned(), format!("{value:?}"));
        }
    }

    /// Layer keeping the events logged from this module.
    #[derive(Clone, Default)]
    struct Captured(Arc<Mutex<Vec<CapturedEvent>>>);

    impl Captured {
        fn take(&self) -> Vec<CapturedEvent> {
            std::mem::take(&mut *self.0.lock().unwrap())
        }
    }

    impl<S> Layer<S> for Captured
    where
        S: Subscriber + for<'a> LookupSpan<'a>,
    {
        fn on_new_span(&self, attrs: &Attributes<'_>, id: &Id, ctx: LayerContext<'_, S>) {
            let mut fields = FieldMap::default();
            attrs.record(&mut fields);
            if let Some(span) = ctx.span(id) {
                span.extensions_mut().insert(fields);
            }
        }

        fn on_event(&self, event: &Event<'_>, ctx: LayerContext<'_, S>) {
            if event.metadata().target() != "jobkit::dispatch" {
                return;
            }
            let mut fields = FieldMap::default();
            event.record(&mut fields);
            let spans = ctx
                .event_scope(event)
                .map(|scope| {
                    scope
                        .map(|span| {
                            let fields = span
                                .extensions()
                                .get::<FieldMap>()
                                .map(|f| f.0.clone())
                                .unwrap_or_default();
                            (span.name().to_owned(), fields)
                        })
                        .collect()
                })
                .unwrap_or_default();
            self.0.lock().unwrap().push(CapturedEvent {
                level: *event.metadata().level(),
                fields: fields.0,
                spans,
            });
        }
    }

    async fn dispatch_logged(config: JobsConfig) -> Vec<CapturedEvent> {
        let captured = Captured::default();
        let subscriber = tracing_subscriber::registry().with(captured.clone());
        let queue = Arc::new(CountingQueue::default());
        let container = Container::builder().bind_default::<Cleanup>().build();
        let ctx = JobContext::new(config, container, queue);

        Cleanup::enqueue_in(&ctx, 5000, ("tmp".into(),))
            .with_subscriber(subscriber)
            .await
            .unwrap();
        captured.take()
    }

    #[tokio::test]
    async fn quiet_dispatch_logs_nothing() {
        let events = dispatch_logged(JobsConfig::with_queue("maintenance")).await;
        assert!(events.is_empty(), "unexpected events: {events:?}");
    }

    #[tokio::test]
    async fn verbose_dispatch_logs_one_line() {
        let events = dispatch_logged(JobsConfig::with_queue("maintenance").verbose(true)).await;
        assert_eq!(events.len(), 1);
        let event = &events[0];
        assert_eq!(event.level, Level::INFO);
        assert_eq!(event.fields["queue"], "maintenance");
        assert_eq!(event.fields["job"], "Cleanup");
        assert_eq!(
            event.fields["message"],
            "enqueued to queue maintenance, job Cleanup, delay 5000ms"
        );
        assert!(event.spans.is_empty());
    }

    #[tokio::test]
    async fn verbose_dispatch_runs_in_logger_span() {
        let config = JobsConfig::with_queue("maintenance")
            .verbose(true)
            .with_logger("audit");
        let events = dispatch_logged(config).await;
        assert_eq!(events.len(), 1);
        let (span_name, span_fields) = &events[0].spans[0];
        assert_eq!(span_name, "logger");
        assert_eq!(span_fields["name"], "audit");
    }
}

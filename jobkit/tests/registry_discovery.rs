use std::sync::Arc;

use jobkit::{
    async_trait, build_registry, Container, Export, FnDefinition, Job, JobContext, JobError,
    JobsConfig, PluginSpec, RegistryError, Schedule, StaticDiscovery,
};
use jobkit_queue::InMemoryQueue;
use serde_json::{json, Value};

#[derive(Default)]
struct SendEmail;

#[async_trait]
impl Job for SendEmail {
    type Args = (String,);
    type Output = String;

    fn queue_name(&self) -> Option<&str> {
        Some("mail")
    }

    fn plugins(&self) -> Vec<PluginSpec> {
        vec![PluginSpec::queue_lock()]
    }

    async fn perform(&self, (to,): (String,)) -> Result<String, JobError> {
        if to.contains('@') {
            Ok(format!("sent to {to}"))
        } else {
            Err(JobError::failed(format!("bad address {to}")))
        }
    }
}

#[derive(Default)]
struct PruneSessions;

#[async_trait]
impl Job for PruneSessions {
    type Args = ();
    type Output = u64;

    fn schedule(&self) -> Option<Schedule> {
        Some(Schedule::Cron("0 3 * * *".into()))
    }

    async fn perform(&self, _args: ()) -> Result<u64, JobError> {
        Ok(0)
    }

    async fn handle_error(&self, _error: JobError) -> Result<u64, JobError> {
        Ok(0)
    }
}

fn context() -> JobContext {
    let container = Container::builder()
        .bind_default::<SendEmail>()
        .bind_default::<PruneSessions>()
        .build();
    JobContext::new(JobsConfig::default(), container, Arc::new(InMemoryQueue::new()))
}

fn noop() -> FnDefinition {
    FnDefinition::new("Noop").perform(|_| async { Ok(Value::Null) })
}

#[tokio::test]
async fn only_job_shaped_exports_are_registered() {
    let discovery = StaticDiscovery::new()
        .job::<SendEmail>()
        .export("Complete", Export::definition(noop().enqueueable()))
        .export("PerformOnly", Export::definition(noop()))
        .export(
            "EnqueueOnly",
            Export::definition(FnDefinition::new("EnqueueOnly").enqueueable()),
        )
        .export("nothing", Export::Missing)
        .export("VERSION", Export::Value(json!("2.1.0")));

    let registry = build_registry(&context(), &discovery).await.unwrap();
    let mut names: Vec<_> = registry.names().collect();
    names.sort_unstable();
    assert_eq!(names, vec!["Noop", "SendEmail"]);
}

#[tokio::test]
async fn namespaces_are_flattened_one_level() {
    let discovery = StaticDiscovery::new()
        .namespace(
            "maintenance",
            StaticDiscovery::new()
                .job::<PruneSessions>()
                .namespace("archive", StaticDiscovery::new().job::<SendEmail>()),
        );

    let registry = build_registry(&context(), &discovery).await.unwrap();
    assert_eq!(registry.len(), 1);
    assert!(registry.contains("PruneSessions"));
    assert!(!registry.contains("SendEmail"));

    let scheduled: Vec<_> = registry.scheduled().collect();
    assert_eq!(scheduled.len(), 1);
    assert_eq!(scheduled[0].1, &Schedule::Cron("0 3 * * *".into()));
}

#[tokio::test]
async fn empty_discovery_gives_empty_registry() {
    let registry = build_registry(&context(), &StaticDiscovery::new())
        .await
        .unwrap();
    assert!(registry.is_empty());
}

#[tokio::test]
async fn non_list_plugins_are_normalized() {
    let discovery = StaticDiscovery::new()
        .job::<SendEmail>()
        .export(
            "Legacy",
            Export::definition(FnDefinition::new("Legacy").enqueueable().plugins(json!(7)).perform(|_| async { Ok(Value::Null) })),
        );

    let registry = build_registry(&context(), &discovery).await.unwrap();
    let legacy = registry.get("Legacy").unwrap();
    assert!(legacy.plugins.is_empty());
    assert!(legacy.plugin_options.is_empty());

    let email = registry.get("SendEmail").unwrap();
    assert_eq!(email.plugins, vec!["QueueLock"]);
    assert_eq!(email.plugin_options["QueueLock"], json!({}));
}

#[tokio::test]
async fn wrapper_reraises_by_default() {
    let registry = build_registry(&context(), &StaticDiscovery::new().job::<SendEmail>())
        .await
        .unwrap();

    let output = registry
        .perform("SendEmail", vec![json!("a@b.com")])
        .await
        .unwrap();
    assert_eq!(output, json!("sent to a@b.com"));

    let err = registry
        .perform("SendEmail", vec![json!("nobody")])
        .await
        .unwrap_err();
    assert!(matches!(
        err,
        RegistryError::Job(JobError::Failed(msg)) if msg == "bad address nobody"
    ));
}

#[tokio::test]
async fn handle_error_can_recover_argument_errors() {
    let registry = build_registry(&context(), &StaticDiscovery::new().job::<PruneSessions>())
        .await
        .unwrap();
    let output = registry
        .perform("PruneSessions", vec![json!(1), json!(2)])
        .await
        .unwrap();
    assert_eq!(output, json!(0));
}

#[tokio::test]
async fn fn_definition_handle_error_sees_the_failure() {
    let definition = FnDefinition::new("Webhook")
        .enqueueable()
        .perform(|args| async move {
            Err(JobError::failed(format!("{} args rejected", args.len())))
        })
        .handle_error(|error| async move { Ok(json!({ "recovered": error.to_string() })) });
    let discovery = StaticDiscovery::new().export("Webhook", Export::definition(definition));

    let registry = build_registry(&context(), &discovery).await.unwrap();
    let output = registry
        .perform("Webhook", vec![json!(1)])
        .await
        .unwrap();
    assert_eq!(output, json!({"recovered": "job failed: 1 args rejected"}));
}

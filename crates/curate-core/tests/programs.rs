use std::sync::Arc;

use async_trait::async_trait;
use curate_core::{
    CurationContext, CurationTask, Curator, ManagedResource, MemoryRecorder, MemoryReporter,
    PluginRegistry, Recorder, ScriptEngine, ScriptEngines, ScriptedTask, Status, TaskContext,
    TaskDescriptor, TaskResolver,
};
use curate_state::fakes::{MemoryContentStore, MemoryTaskDefinitionStore};
use curate_state::{ContentObject, TaskDefinition};

/// Returns the status named by its `status` property and records it as
/// the result.
#[derive(Default)]
struct FixedStatus;

impl FixedStatus {
    fn outcome(cx: &mut TaskContext<'_>) -> Status {
        let status = cx
            .property("status")
            .and_then(|s| s.parse().ok())
            .unwrap_or(Status::Success);
        let message = format!("{} -> {status}", cx.name());
        cx.set_result(message);
        status
    }
}

#[async_trait]
impl CurationTask for FixedStatus {
    async fn perform(
        &mut self,
        cx: &mut TaskContext<'_>,
        _dso: &ContentObject,
    ) -> curate_core::Result<Status> {
        Ok(Self::outcome(cx))
    }

    async fn perform_id(&mut self, cx: &mut TaskContext<'_>, _id: &str) -> curate_core::Result<Status> {
        Ok(Self::outcome(cx))
    }
}

/// Toy engine: the source is the status name the task returns.
struct ToyEngine;

struct ToyScript {
    status: Status,
}

#[async_trait]
impl ScriptedTask for ToyScript {
    async fn perform_dso(
        &mut self,
        cx: &mut TaskContext<'_>,
        dso: &ContentObject,
    ) -> curate_core::Result<Status> {
        cx.set_result(format!("scripted {}", dso.name));
        Ok(self.status)
    }

    async fn perform_id(&mut self, _cx: &mut TaskContext<'_>, _id: &str) -> curate_core::Result<Status> {
        Ok(self.status)
    }
}

impl ScriptEngine for ToyEngine {
    fn instantiate(
        &self,
        source: &str,
        constructor: &str,
    ) -> curate_core::Result<Box<dyn ScriptedTask>> {
        assert_eq!(constructor, "new Checker()");
        let status = source
            .trim()
            .parse()
            .map_err(curate_core::CurationError::Config)?;
        Ok(Box::new(ToyScript { status }))
    }
}

fn fixed(name: &str, status: &str) -> TaskDefinition {
    TaskDefinition::native(name, "fixed").with_config(format!("status = {status}"))
}

fn resolver() -> TaskResolver {
    let mut plugins = PluginRegistry::with_builtins();
    plugins.register_task("fixed", TaskDescriptor::new(), FixedStatus::default);

    let mut engines = ScriptEngines::new();
    engines.register("toy", Arc::new(ToyEngine));

    let definitions = MemoryTaskDefinitionStore::with_definitions([
        fixed("task-a-fail", "FAIL"),
        fixed("task-a-ok", "SUCCESS"),
        fixed("task-b", "SKIP"),
        TaskDefinition::program("prog-fail", "task-a-fail\nif %FAIL\n  task-b\nend\n"),
        TaskDefinition::program("prog-ok", "task-a-ok\nif %FAIL\n  task-b\nend\n"),
        TaskDefinition::program("outer", "prog-fail\n"),
        TaskDefinition::program("reporting", "task-a-fail\nreport: checked\n"),
        TaskDefinition::program("literal", "%ERROR\n"),
        TaskDefinition::program(
            "audited",
            "@record audit fixity %FAIL\ntask-a-fail\n",
        ),
        TaskDefinition::program("broken-program", "task-a-ok\nif %FAIL\n"),
        TaskDefinition::scripted("script", "toy", "new Checker()", "SKIP"),
        TaskDefinition::scripted("bad-script", "toy", "new Checker()", "MAYBE"),
    ]);
    TaskResolver::new(Arc::new(definitions))
        .with_plugins(Arc::new(plugins))
        .with_engines(Arc::new(engines))
}

fn item(store: &MemoryContentStore) -> ContentObject {
    let community = store.add_community(None, "Archive");
    let collection = store.add_collection(community.id, "Maps");
    store.add_item(collection.id, "map-1")
}

async fn run(task: &str) -> (Curator, CurationContext) {
    let store = Arc::new(MemoryContentStore::new());
    let dso = item(&store);
    let mut ctx = CurationContext::from_backend(store);
    let mut curator = Curator::new(resolver());
    assert!(curator.add_task(task).await, "{task} should resolve");
    curator.curate(&mut ctx, &dso).await.unwrap();
    (curator, ctx)
}

// ── Branching ──

#[tokio::test]
async fn failing_first_task_runs_the_branch() {
    let (curator, _) = run("prog-fail").await;
    assert_eq!(curator.status("prog-fail"), Status::Skip);
    assert_eq!(curator.result("prog-fail"), Some("task-b -> SKIP"));
}

#[tokio::test]
async fn succeeding_first_task_skips_the_branch() {
    let (curator, _) = run("prog-ok").await;
    assert_eq!(curator.status("prog-ok"), Status::Success);
    assert_eq!(curator.result("prog-ok"), Some("task-a-ok -> SUCCESS"));
}

#[tokio::test]
async fn programs_can_call_programs() {
    let (curator, _) = run("outer").await;
    assert_eq!(curator.status("outer"), Status::Skip);
}

#[tokio::test]
async fn report_keeps_the_previous_status() {
    let store = Arc::new(MemoryContentStore::new());
    let dso = item(&store);
    let mut ctx = CurationContext::from_backend(store);
    let reporter = Arc::new(MemoryReporter::new());
    let mut curator = Curator::new(resolver());
    curator.set_reporter(reporter.clone());
    curator.add_task("reporting").await;

    curator.curate(&mut ctx, &dso).await.unwrap();

    assert_eq!(curator.status("reporting"), Status::Fail);
    assert_eq!(reporter.lines(), vec!["checked"]);
}

#[tokio::test]
async fn status_literal_sets_the_status() {
    let (curator, _) = run("literal").await;
    assert_eq!(curator.status("literal"), Status::Error);
}

#[tokio::test]
async fn programs_run_on_raw_identifiers() {
    let store = Arc::new(MemoryContentStore::new());
    let mut ctx = CurationContext::from_backend(store);
    let mut curator = Curator::new(resolver());
    curator.add_task("prog-fail").await;

    curator.curate_id(&mut ctx, "workflow-7").await.unwrap();

    assert_eq!(curator.status("prog-fail"), Status::Skip);
}

#[tokio::test]
async fn malformed_program_does_not_resolve() {
    let resolver = resolver();
    assert!(!resolver.can_resolve_task("broken-program").await);
    let mut curator = Curator::new(resolver);
    assert!(!curator.add_task("broken-program").await);
    assert!(curator.tasks().is_empty());
}

// ── Audit records ──

#[tokio::test]
async fn record_rules_write_audit_records() {
    let store = Arc::new(MemoryContentStore::new());
    let dso = item(&store);
    let mut ctx = CurationContext::from_backend(store).with_user(Some("curator@example.org".into()));
    let recorder = Arc::new(MemoryRecorder::new());
    let shared = recorder.clone();

    let mut curator = Curator::new(resolver());
    curator.set_recorder_factory(Arc::new(move || {
        Ok(shared.clone() as Arc<dyn ManagedResource>)
    }));
    curator.add_task("audited").await;
    curator.curate(&mut ctx, &dso).await.unwrap();

    let records = recorder.records();
    assert_eq!(records.len(), 1);
    assert_eq!(records[0].task, "audited");
    assert_eq!(records[0].record_type, "audit");
    assert_eq!(records[0].record_value, "fixity");
    assert_eq!(records[0].status, Status::Fail);
    assert_eq!(records[0].user.as_deref(), Some("curator@example.org"));
    assert_eq!(records[0].object_id, dso.label());

    assert_eq!(curator.complete(), 1);
}

#[tokio::test]
async fn tasks_without_record_rules_never_touch_the_recorder() {
    let (mut curator, _) = run("prog-ok").await;
    assert!(curator.obtain_resource(curate_core::RECORDER_KEY).is_none());
    assert_eq!(curator.complete(), 0);
}

// ── Scripted tasks ──

#[tokio::test]
async fn scripted_task_runs_through_its_engine() {
    let (curator, _) = run("script").await;
    assert_eq!(curator.status("script"), Status::Skip);
    assert_eq!(curator.result("script"), Some("scripted map-1"));
}

#[tokio::test]
async fn scripted_task_that_fails_to_instantiate_is_excluded() {
    let mut curator = Curator::new(resolver());
    assert!(!curator.add_task("bad-script").await);
}

#[test]
fn memory_recorder_is_a_recorder() {
    let recorder: Arc<dyn ManagedResource> = Arc::new(MemoryRecorder::new());
    let as_recorder: Option<Arc<dyn Recorder>> = recorder.as_recorder();
    assert!(as_recorder.is_some());
}

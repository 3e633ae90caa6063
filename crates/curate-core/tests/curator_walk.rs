use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use curate_core::{
    CurationContext, CurationError, CurationTask, Curator, Invoked, ObjectListSelector,
    PluginRegistry, Status, StatusSet, TaskContext, TaskDescriptor, TaskResolver, TxScope,
};
use curate_state::fakes::{MemoryContentStore, MemoryTaskDefinitionStore};
use curate_state::{ContentObject, TaskDefinition};

/// Records the name of every object it is handed; fails on one name.
struct VisitLog {
    log: Arc<Mutex<Vec<String>>>,
    fail_on: Option<&'static str>,
}

#[async_trait]
impl CurationTask for VisitLog {
    async fn perform(
        &mut self,
        _cx: &mut TaskContext<'_>,
        dso: &ContentObject,
    ) -> curate_core::Result<Status> {
        self.log.lock().unwrap().push(dso.name.clone());
        if self.fail_on == Some(dso.name.as_str()) {
            return Ok(Status::Fail);
        }
        Ok(Status::Success)
    }
}

/// Errors on every object.
struct Broken;

#[async_trait]
impl CurationTask for Broken {
    async fn perform(
        &mut self,
        cx: &mut TaskContext<'_>,
        dso: &ContentObject,
    ) -> curate_core::Result<Status> {
        Err(CurationError::Task {
            task: cx.name().to_string(),
            object: dso.label(),
            message: "disk on fire".to_string(),
        })
    }
}

struct Harness {
    store: Arc<MemoryContentStore>,
    resolver: TaskResolver,
    visits: Arc<Mutex<Vec<String>>>,
    stopped: Arc<Mutex<Vec<String>>>,
}

impl Harness {
    fn new() -> Self {
        let visits = Arc::new(Mutex::new(Vec::new()));
        let stopped = Arc::new(Mutex::new(Vec::new()));

        let mut plugins = PluginRegistry::with_builtins();
        let log = visits.clone();
        plugins.register_task("visit-log", TaskDescriptor::new(), move || VisitLog {
            log: log.clone(),
            fail_on: None,
        });
        let log = stopped.clone();
        plugins.register_task(
            "stop-on-i1",
            TaskDescriptor::new().suspend_on(Invoked::Any, StatusSet::of(&[Status::Fail])),
            move || VisitLog {
                log: log.clone(),
                fail_on: Some("i1"),
            },
        );
        let log = stopped.clone();
        plugins.register_task(
            "stop-on-i1-interactive",
            TaskDescriptor::new()
                .suspend_on(Invoked::Interactive, StatusSet::of(&[Status::Fail])),
            move || VisitLog {
                log: log.clone(),
                fail_on: Some("i1"),
            },
        );
        plugins.register_task("broken", TaskDescriptor::new(), || Broken);

        let definitions = MemoryTaskDefinitionStore::with_definitions([
            TaskDefinition::native("visits", "visit-log"),
            TaskDefinition::native("stopper", "stop-on-i1"),
            TaskDefinition::native("interactive-stopper", "stop-on-i1-interactive"),
            TaskDefinition::native("broken", "broken"),
            TaskDefinition::native("noop", "noop"),
            TaskDefinition::native("profile", "profile-formats"),
        ]);
        let resolver =
            TaskResolver::new(Arc::new(definitions)).with_plugins(Arc::new(plugins));

        Self {
            store: Arc::new(MemoryContentStore::new()),
            resolver,
            visits,
            stopped,
        }
    }

    fn context(&self) -> CurationContext {
        CurationContext::from_backend(self.store.clone())
    }

    fn curator(&self) -> Curator {
        Curator::new(self.resolver.clone())
    }

    /// site
    /// └── A
    ///     ├── A1
    ///     │   └── C1: i1, i2
    ///     └── CA: i3
    /// └── B
    fn build_tree(&self) -> ContentObject {
        let a = self.store.add_community(None, "A");
        let a1 = self.store.add_community(Some(a.id), "A1");
        let c1 = self.store.add_collection(a1.id, "C1");
        self.store.add_item(c1.id, "i1");
        self.store.add_item(c1.id, "i2");
        let ca = self.store.add_collection(a.id, "CA");
        self.store.add_item(ca.id, "i3");
        self.store.add_community(None, "B");
        a
    }

    async fn site(&self) -> ContentObject {
        use curate_state::ContentStore;
        self.store.site().await.unwrap()
    }

    fn visits(&self) -> Vec<String> {
        self.visits.lock().unwrap().clone()
    }

    fn stopped(&self) -> Vec<String> {
        self.stopped.lock().unwrap().clone()
    }
}

fn collection_with_items(store: &MemoryContentStore, items: usize) -> ContentObject {
    let community = store.add_community(None, "Theses");
    let collection = store.add_collection(community.id, "2024");
    for n in 0..items {
        store.add_item(collection.id, &format!("item-{n}"));
    }
    collection
}

// ── Task set ──

#[tokio::test]
async fn tasks_keep_insertion_order_and_skip_unresolved_names() {
    let h = Harness::new();
    let mut curator = h.curator();

    assert!(curator.add_task("visits").await);
    assert!(!curator.add_task("does-not-exist").await);
    assert!(curator.add_task("noop").await);
    assert_eq!(curator.tasks(), vec!["visits", "noop"]);
    assert_eq!(curator.status("noop"), Status::Unset);

    assert!(curator.add_task("visits").await);
    assert_eq!(curator.tasks(), vec!["noop", "visits"]);

    assert!(curator.remove_task("noop"));
    assert!(!curator.remove_task("noop"));
    assert!(!curator.has_task("noop"));
}

// ── Walks ──

#[tokio::test]
async fn collection_walk_invokes_container_and_each_item() {
    let h = Harness::new();
    let collection = collection_with_items(&h.store, 3);
    let mut ctx = h.context();
    let mut curator = h.curator();
    curator.add_task("visits").await;

    curator.curate(&mut ctx, &collection).await.unwrap();

    assert_eq!(h.visits(), vec!["2024", "item-0", "item-1", "item-2"]);
    assert_eq!(curator.status("visits"), Status::Success);
}

#[tokio::test]
async fn site_walk_is_pre_order() {
    let h = Harness::new();
    h.build_tree();
    let site = h.site().await;
    let mut ctx = h.context();
    let mut curator = h.curator();
    curator.add_task("visits").await;

    curator.curate(&mut ctx, &site).await.unwrap();

    assert_eq!(
        h.visits(),
        vec!["Repository", "A", "A1", "C1", "i1", "i2", "CA", "i3", "B"]
    );
    assert_eq!(h.store.cursors_opened(), h.store.cursors_closed());
}

#[tokio::test]
async fn items_are_invoked_once_without_walking() {
    let h = Harness::new();
    let collection = collection_with_items(&h.store, 2);
    let item = {
        use curate_state::ContentStore;
        h.store.items(&collection.id).await.unwrap().next().unwrap()
    };
    let mut ctx = h.context();
    let mut curator = h.curator();
    curator.add_task("visits").await;

    curator.curate(&mut ctx, &item).await.unwrap();

    assert_eq!(h.visits(), vec!["item-0"]);
}

#[tokio::test]
async fn suspension_stops_only_the_suspended_task() {
    let h = Harness::new();
    h.build_tree();
    let site = h.site().await;
    let mut ctx = h.context();
    let mut curator = h.curator();
    curator.add_task("stopper").await;
    curator.add_task("visits").await;

    curator.curate(&mut ctx, &site).await.unwrap();

    assert_eq!(h.stopped(), vec!["Repository", "A", "A1", "C1", "i1"]);
    assert_eq!(curator.status("stopper"), Status::Fail);
    assert_eq!(h.visits().len(), 9);
    assert_eq!(h.store.cursors_opened(), h.store.cursors_closed());
}

#[tokio::test]
async fn mode_specific_suspension_needs_matching_run_mode() {
    let h = Harness::new();
    h.build_tree();
    let site = h.site().await;

    let mut ctx = h.context();
    let mut batch = h.curator();
    batch.set_invoked(Invoked::Batch);
    batch.add_task("interactive-stopper").await;
    batch.curate(&mut ctx, &site).await.unwrap();
    assert_eq!(h.stopped().len(), 9);

    h.stopped.lock().unwrap().clear();
    let mut interactive = h.curator();
    interactive.set_invoked(Invoked::Interactive);
    interactive.add_task("interactive-stopper").await;
    interactive.curate(&mut ctx, &site).await.unwrap();
    assert_eq!(h.stopped().len(), 5);
}

#[tokio::test]
async fn distributive_task_runs_once_per_target() {
    let h = Harness::new();
    let collection = collection_with_items(&h.store, 3);
    let mut ctx = h.context();
    let mut curator = h.curator();
    curator.add_task("profile").await;

    curator.curate(&mut ctx, &collection).await.unwrap();

    // no bitstreams anywhere, so the single invocation skips
    assert_eq!(curator.status("profile"), Status::Skip);
    assert_eq!(ctx.cache_size(), 1);
}

// ── Identifiers ──

#[tokio::test]
async fn curate_id_resolves_handles() {
    let h = Harness::new();
    let collection = collection_with_items(&h.store, 1);
    let mut ctx = h.context();
    let mut curator = h.curator();
    curator.add_task("visits").await;

    let handle = collection.handle.clone().unwrap();
    curator.curate_id(&mut ctx, &handle).await.unwrap();

    assert_eq!(h.visits(), vec!["2024", "item-0"]);
}

#[tokio::test]
async fn unknown_identifier_goes_to_perform_id() {
    let h = Harness::new();
    let mut ctx = h.context();
    let mut curator = h.curator();
    curator.add_task("noop").await;

    curator.curate_id(&mut ctx, "workflow-42").await.unwrap();

    // the default perform_id fails identifiers that name no object
    assert_eq!(curator.status("noop"), Status::Fail);
}

#[tokio::test]
async fn empty_identifier_is_a_precondition_error() {
    let h = Harness::new();
    let mut ctx = h.context();
    let mut curator = h.curator();
    curator.add_task("noop").await;

    let err = curator.curate_id(&mut ctx, "  ").await.unwrap_err();
    assert!(matches!(err, CurationError::Precondition(_)));
}

#[tokio::test]
async fn selector_curates_each_selected_object() {
    let h = Harness::new();
    let collection = collection_with_items(&h.store, 2);
    let mut ctx = h.context();
    let mut curator = h.curator();
    curator.add_task("visits").await;

    let mut selector = ObjectListSelector::new([
        collection.handle.clone().unwrap(),
        "123456789/999".to_string(),
    ]);
    curator.curate_selector(&mut ctx, &mut selector).await.unwrap();

    assert_eq!(h.visits(), vec!["2024", "item-0", "item-1"]);
}

// ── Transactions and cache ──

async fn commits_for(scope: TxScope) -> usize {
    let h = Harness::new();
    let collection = collection_with_items(&h.store, 3);
    let mut ctx = h.context();
    let mut curator = h.curator();
    curator.set_transaction_scope(scope);
    curator.add_task("noop").await;
    curator.curate(&mut ctx, &collection).await.unwrap();
    h.store.commit_count()
}

#[tokio::test]
async fn transaction_scope_controls_commits() {
    assert_eq!(commits_for(TxScope::Object).await, 4);
    assert_eq!(commits_for(TxScope::Curation).await, 1);
    assert_eq!(commits_for(TxScope::Open).await, 0);
}

#[tokio::test]
async fn cache_is_cleared_at_each_multiple_of_the_limit() {
    let h = Harness::new();
    let collection = collection_with_items(&h.store, 14);
    let mut ctx = h.context();
    let mut curator = h.curator();
    curator.set_cache_limit(5);
    curator.add_task("noop").await;

    curator.curate(&mut ctx, &collection).await.unwrap();

    assert_eq!(ctx.cache_clears(), 3);
    assert_eq!(ctx.cache_size(), 0);
}

#[tokio::test]
async fn zero_cache_limit_never_clears() {
    let h = Harness::new();
    let collection = collection_with_items(&h.store, 6);
    let mut ctx = h.context();
    let mut curator = h.curator();
    curator.set_cache_limit(0);
    assert_eq!(curator.cache_limit(), None);
    curator.add_task("noop").await;

    curator.curate(&mut ctx, &collection).await.unwrap();

    assert_eq!(ctx.cache_clears(), 0);
    assert_eq!(ctx.cache_size(), 7);
}

// ── Failures ──

#[tokio::test]
async fn storage_failure_surfaces_as_io_error_and_closes_cursors() {
    let h = Harness::new();
    let a = h.build_tree();
    h.store.fail_children_of(a.id);
    let site = h.site().await;
    let mut ctx = h.context();
    let mut curator = h.curator();
    curator.add_task("visits").await;

    let err = curator.curate(&mut ctx, &site).await.unwrap_err();

    assert!(matches!(err, CurationError::Io(_)));
    assert_eq!(h.visits(), vec!["Repository", "A"]);
    assert_eq!(h.store.cursors_opened(), h.store.cursors_closed());
}

#[tokio::test]
async fn task_error_aborts_the_run() {
    let h = Harness::new();
    let collection = collection_with_items(&h.store, 2);
    let mut ctx = h.context();
    let mut curator = h.curator();
    curator.add_task("broken").await;

    let err = curator.curate(&mut ctx, &collection).await.unwrap_err();

    assert!(matches!(err, CurationError::Task { .. }));
    assert_eq!(curator.status("broken"), Status::Unset);
}

// ── Completion ──

#[tokio::test]
async fn complete_is_idempotent() {
    let h = Harness::new();
    let collection = collection_with_items(&h.store, 1);
    let mut ctx = h.context();
    let mut curator = h.curator();
    curator.add_task("noop").await;
    curator.curate(&mut ctx, &collection).await.unwrap();

    curator.complete();
    assert!(curator.tasks().is_empty());
    assert_eq!(curator.complete(), 0);
}

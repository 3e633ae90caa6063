//! The Curator: runs an ordered set of tasks over content objects.
//!
//! Non-distributive tasks are walked through the container hierarchy in
//! pre-order (site, communities, sub-communities, collections, items);
//! items and distributive tasks are invoked directly. After every invocation
//! the visited object is cached, the cache is evicted according to the
//! cache limit, and a commit is issued when the transaction scope is
//! [`TxScope::Object`].

use std::collections::HashMap;
use std::fmt;
use std::str::FromStr;
use std::sync::Arc;

use curate_state::{ContentObject, ObjectCursor, ObjectType, QueueEntry, TaskQueue};
use futures::future::{BoxFuture, FutureExt};
use serde::{Deserialize, Serialize};
use tracing::{debug, error, warn, Instrument};

use crate::context::CurationContext;
use crate::descriptor::Invoked;
use crate::error::{CurationError, Result};
use crate::metrics::METRICS;
use crate::obs::{self, CurationSpan};
use crate::properties::{MapProperties, PropertySource};
use crate::recorder::{RecorderFactory, TracingRecorder};
use crate::reporter::{Reporter, TracingReporter};
use crate::resolved::ResolvedTask;
use crate::resolver::TaskResolver;
use crate::resource::{ManagedResource, ReleasePolicy, ResourceRegistry};
use crate::selector::ObjectSelector;
use crate::status::Status;

/// When the Curator commits the context.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TxScope {
    /// After every object visit
    Object,
    /// Once, when a top-level curate call finishes
    Curation,
    /// Never; the caller commits
    #[default]
    Open,
}

impl fmt::Display for TxScope {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            TxScope::Object => "OBJECT",
            TxScope::Curation => "CURATION",
            TxScope::Open => "OPEN",
        })
    }
}

impl FromStr for TxScope {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "object" => Ok(TxScope::Object),
            "curation" => Ok(TxScope::Curation),
            "open" => Ok(TxScope::Open),
            other => Err(format!("unknown transaction scope: {other}")),
        }
    }
}

pub type QueueFactory = Box<dyn Fn() -> Result<Arc<dyn TaskQueue>> + Send + Sync>;

/// Per-run state shared with the tasks a Curator runs.
pub(crate) struct RunState {
    pub(crate) statuses: HashMap<String, Status>,
    pub(crate) results: HashMap<String, String>,
    pub(crate) reporter: Arc<dyn Reporter>,
    pub(crate) properties: Arc<dyn PropertySource>,
    pub(crate) resources: ResourceRegistry,
    pub(crate) recorder_factory: RecorderFactory,
    pub(crate) invoked: Option<Invoked>,
    pub(crate) cache_limit: Option<usize>,
    pub(crate) tx_scope: TxScope,
}

impl RunState {
    fn new() -> Self {
        let recorder_factory: RecorderFactory =
            Arc::new(|| Ok(Arc::new(TracingRecorder::new()) as Arc<dyn ManagedResource>));
        Self {
            statuses: HashMap::new(),
            results: HashMap::new(),
            reporter: Arc::new(TracingReporter),
            properties: Arc::new(MapProperties::new()),
            resources: ResourceRegistry::new(),
            recorder_factory,
            invoked: None,
            cache_limit: None,
            tx_scope: TxScope::default(),
        }
    }
}

pub struct Curator {
    resolver: TaskResolver,
    tasks: Vec<ResolvedTask>,
    run: RunState,
    queue: Option<Arc<dyn TaskQueue>>,
    queue_factory: Option<QueueFactory>,
}

impl Curator {
    pub fn new(resolver: TaskResolver) -> Self {
        Self {
            resolver,
            tasks: Vec::new(),
            run: RunState::new(),
            queue: None,
            queue_factory: None,
        }
    }

    pub fn resolver(&self) -> &TaskResolver {
        &self.resolver
    }

    // ------------------------------------------------------------------
    // Task set
    // ------------------------------------------------------------------

    /// Resolve `name` and append it to the task set. Names that do not
    /// resolve, or whose task fails to initialise, are logged and left out.
    /// Adding a name already present moves it to the end.
    pub async fn add_task(&mut self, name: &str) -> bool {
        match self.resolver.resolve_task(name).await {
            Some(task) => self.add_resolved(task).await,
            None => {
                error!(task = name, "task not resolved, excluded from run");
                false
            }
        }
    }

    /// Append an already resolved task. Its status and result start over.
    pub async fn add_resolved(&mut self, mut task: ResolvedTask) -> bool {
        if let Err(e) = task.init(&mut self.run).await {
            error!(task = %task.name(), error = %e, "task init failed, excluded from run");
            return false;
        }
        let name = task.name().to_string();
        self.tasks.retain(|t| t.name() != name);
        self.tasks.push(task);
        self.run.results.remove(&name);
        self.run.statuses.insert(name, Status::Unset);
        true
    }

    pub fn remove_task(&mut self, name: &str) -> bool {
        let before = self.tasks.len();
        self.tasks.retain(|t| t.name() != name);
        self.tasks.len() != before
    }

    pub fn has_task(&self, name: &str) -> bool {
        self.tasks.iter().any(|t| t.name() == name)
    }

    /// Task names in insertion order.
    pub fn tasks(&self) -> Vec<String> {
        self.tasks.iter().map(|t| t.name().to_string()).collect()
    }

    // ------------------------------------------------------------------
    // Configuration
    // ------------------------------------------------------------------

    pub fn set_reporter(&mut self, reporter: Arc<dyn Reporter>) {
        self.run.reporter = reporter;
    }

    pub fn reporter(&self) -> Arc<dyn Reporter> {
        self.run.reporter.clone()
    }

    pub fn set_properties(&mut self, properties: Arc<dyn PropertySource>) {
        self.run.properties = properties;
    }

    pub fn properties(&self) -> Arc<dyn PropertySource> {
        self.run.properties.clone()
    }

    pub fn set_queue(&mut self, queue: Arc<dyn TaskQueue>) {
        self.queue = Some(queue);
    }

    /// Build the task queue on first use.
    pub fn set_queue_factory<F>(&mut self, factory: F)
    where
        F: Fn() -> Result<Arc<dyn TaskQueue>> + Send + Sync + 'static,
    {
        self.queue_factory = Some(Box::new(factory));
    }

    pub fn set_recorder_factory(&mut self, factory: RecorderFactory) {
        self.run.recorder_factory = factory;
    }

    pub fn set_invoked(&mut self, mode: Invoked) {
        self.run.invoked = Some(mode);
    }

    pub fn invoked(&self) -> Option<Invoked> {
        self.run.invoked
    }

    /// Clear the context cache whenever its size reaches a multiple of
    /// `limit`. Zero means unlimited.
    pub fn set_cache_limit(&mut self, limit: usize) {
        self.run.cache_limit = (limit > 0).then_some(limit);
    }

    pub fn cache_limit(&self) -> Option<usize> {
        self.run.cache_limit
    }

    pub fn set_transaction_scope(&mut self, scope: TxScope) {
        self.run.tx_scope = scope;
    }

    pub fn transaction_scope(&self) -> TxScope {
        self.run.tx_scope
    }

    // ------------------------------------------------------------------
    // Curation
    // ------------------------------------------------------------------

    /// Curate the object named by `id` (handle or UUID). Identifiers that
    /// do not name a content object are handed to each task's `perform_id`.
    pub async fn curate_id(&mut self, ctx: &mut CurationContext, id: &str) -> Result<()> {
        if id.trim().is_empty() {
            return Err(CurationError::Precondition(
                "curation identifier is empty".to_string(),
            ));
        }
        if let Some(dso) = ctx.resolve(id).await? {
            return self.curate(ctx, &dso).await;
        }

        let span = CurationSpan::start(id, &self.tasks());
        let outcome = async {
            for index in 0..self.tasks.len() {
                self.perform_task_id(ctx, index, id).await?;
            }
            self.end_curation(ctx).await
        }
        .instrument(span.span())
        .await;
        span.finish(outcome.is_ok());
        outcome
    }

    pub async fn curate(&mut self, ctx: &mut CurationContext, dso: &ContentObject) -> Result<()> {
        let span = CurationSpan::start(&dso.label(), &self.tasks());
        let outcome = async {
            self.curate_object(ctx, dso).await?;
            self.end_curation(ctx).await
        }
        .instrument(span.span())
        .await;
        span.finish(outcome.is_ok());
        outcome
    }

    /// Curate every object the selector yields.
    pub async fn curate_selector(
        &mut self,
        ctx: &mut CurationContext,
        selector: &mut dyn ObjectSelector,
    ) -> Result<()> {
        let span = CurationSpan::start(selector.name(), &self.tasks());
        let outcome = async {
            let selected: ObjectCursor = selector.select(ctx).await?;
            for dso in selected {
                self.curate_object(ctx, &dso).await?;
            }
            self.end_curation(ctx).await
        }
        .instrument(span.span())
        .await;
        span.finish(outcome.is_ok());
        outcome
    }

    /// Submit the current task set for `id` to `queue_name`. Without a
    /// configured queue the request is logged and dropped.
    pub async fn queue(&mut self, ctx: &CurationContext, id: &str, queue_name: &str) -> Result<()> {
        if self.queue.is_none() {
            if let Some(factory) = &self.queue_factory {
                self.queue = Some(factory()?);
            }
        }
        let Some(queue) = self.queue.clone() else {
            error!(object = id, queue = queue_name, "no task queue configured, request dropped");
            return Ok(());
        };
        let entry = QueueEntry::new(ctx.user().map(str::to_string), self.tasks(), id);
        queue.enqueue(queue_name, entry).await?;
        obs::emit_queue_enqueued(queue_name, id, self.tasks.len());
        Ok(())
    }

    async fn curate_object(&mut self, ctx: &mut CurationContext, dso: &ContentObject) -> Result<()> {
        let mut current = dso.clone();
        for index in 0..self.tasks.len() {
            if current.object_type == ObjectType::Item || self.tasks[index].is_distributive() {
                self.invoke(ctx, index, &current).await?;
            } else {
                self.walk(ctx, index, &current).await?;
            }
            // later tasks see what a mutative task stored
            if self.tasks[index].is_mutative() {
                let id = current.id;
                current = ctx.find(&id).await?.unwrap_or(current);
            }
        }
        Ok(())
    }

    async fn end_curation(&mut self, ctx: &mut CurationContext) -> Result<()> {
        if self.run.tx_scope == TxScope::Curation {
            ctx.commit().await?;
        }
        Ok(())
    }

    /// Pre-order walk for one task. Returns `false` once the task has been
    /// suspended.
    fn walk<'a>(
        &'a mut self,
        ctx: &'a mut CurationContext,
        index: usize,
        dso: &'a ContentObject,
    ) -> BoxFuture<'a, Result<bool>> {
        async move {
            if !self.invoke(ctx, index, dso).await? {
                return Ok(false);
            }
            match dso.object_type {
                ObjectType::Site => {
                    let communities = ctx.store().top_communities().await?;
                    self.walk_children(ctx, index, communities).await
                }
                ObjectType::Community => {
                    let subs = ctx.store().sub_communities(&dso.id).await?;
                    if !self.walk_children(ctx, index, subs).await? {
                        return Ok(false);
                    }
                    let collections = ctx.store().collections(&dso.id).await?;
                    self.walk_children(ctx, index, collections).await
                }
                ObjectType::Collection => {
                    let items = ctx.store().items(&dso.id).await?;
                    self.walk_children(ctx, index, items).await
                }
                _ => Ok(true),
            }
        }
        .boxed()
    }

    async fn walk_children(
        &mut self,
        ctx: &mut CurationContext,
        index: usize,
        children: ObjectCursor,
    ) -> Result<bool> {
        for child in children {
            if !self.walk(ctx, index, &child).await? {
                return Ok(false);
            }
        }
        Ok(true)
    }

    /// Perform, visit, and apply the suspend policy. Returns `false` when
    /// the task is suspended.
    async fn invoke(
        &mut self,
        ctx: &mut CurationContext,
        index: usize,
        dso: &ContentObject,
    ) -> Result<bool> {
        let status = self.perform_task(ctx, index, dso).await?;
        if self.tasks[index].is_mutative() {
            let stored = ctx.store().find(&dso.id).await?;
            self.visit(ctx, stored.as_ref().unwrap_or(dso)).await?;
        } else {
            self.visit(ctx, dso).await?;
        }

        let task = &self.tasks[index];
        if task.descriptor().should_suspend(status, self.run.invoked) {
            METRICS.inc_walks_suspended();
            obs::emit_task_suspended(task.name(), &dso.label(), status);
            return Ok(false);
        }
        Ok(true)
    }

    async fn perform_task(
        &mut self,
        ctx: &mut CurationContext,
        index: usize,
        dso: &ContentObject,
    ) -> Result<Status> {
        let task = &mut self.tasks[index];
        let status = match task.perform(ctx, &mut self.run, dso).await {
            Ok(status) => status,
            Err(e) => {
                error!(task = %task.name(), object = %dso.label(), error = %e, "task failed");
                return Err(e);
            }
        };
        self.run.statuses.insert(task.name().to_string(), status);
        METRICS.inc_tasks_performed();
        obs::emit_task_performed(task.name(), &dso.label(), status);
        Ok(status)
    }

    async fn perform_task_id(
        &mut self,
        ctx: &mut CurationContext,
        index: usize,
        id: &str,
    ) -> Result<Status> {
        let task = &mut self.tasks[index];
        let status = match task.perform_id(ctx, &mut self.run, id).await {
            Ok(status) => status,
            Err(e) => {
                error!(task = %task.name(), object = id, error = %e, "task failed");
                return Err(e);
            }
        };
        self.run.statuses.insert(task.name().to_string(), status);
        METRICS.inc_tasks_performed();
        obs::emit_task_performed(task.name(), id, status);
        Ok(status)
    }

    async fn visit(&mut self, ctx: &mut CurationContext, dso: &ContentObject) -> Result<()> {
        ctx.cache_object(dso.clone());
        METRICS.inc_objects_visited();
        if let Some(limit) = self.run.cache_limit {
            let size = ctx.cache_size();
            if size > 0 && size % limit == 0 {
                ctx.clear_cache();
            }
        }
        if self.run.tx_scope == TxScope::Object {
            ctx.commit().await?;
        }
        Ok(())
    }

    /// Run every task once on `dso` without walking, visiting or
    /// committing.
    pub(crate) async fn perform_once(
        &mut self,
        ctx: &mut CurationContext,
        dso: &ContentObject,
    ) -> Result<()> {
        for index in 0..self.tasks.len() {
            self.perform_task(ctx, index, dso).await?;
        }
        Ok(())
    }

    pub(crate) async fn perform_id_once(&mut self, ctx: &mut CurationContext, id: &str) -> Result<()> {
        for index in 0..self.tasks.len() {
            self.perform_task_id(ctx, index, id).await?;
        }
        Ok(())
    }

    // ------------------------------------------------------------------
    // Status and results
    // ------------------------------------------------------------------

    /// Status of the task's most recent invocation; `Unset` before the
    /// first one.
    pub fn status(&self, task: &str) -> Status {
        self.run
            .statuses
            .get(task)
            .copied()
            .unwrap_or(Status::Unset)
    }

    pub fn result(&self, task: &str) -> Option<&str> {
        self.run.results.get(task).map(String::as_str)
    }

    pub fn set_result(&mut self, task: &str, result: impl Into<String>) {
        self.run.results.insert(task.to_string(), result.into());
    }

    pub fn report(&self, message: &str) -> Result<()> {
        self.run.reporter.report(message)
    }

    // ------------------------------------------------------------------
    // Resources
    // ------------------------------------------------------------------

    pub fn obtain_resource(&self, key: &str) -> Option<Arc<dyn ManagedResource>> {
        self.run.resources.obtain(key)
    }

    pub fn enroll_resource(
        &mut self,
        resource: Arc<dyn ManagedResource>,
        policy: ReleasePolicy,
    ) -> Result<String> {
        self.run.resources.enroll(resource, policy)
    }

    pub fn manage_resource(
        &mut self,
        key: &str,
        resource: Arc<dyn ManagedResource>,
        policy: ReleasePolicy,
    ) -> Result<()> {
        self.run.resources.manage(key, resource, policy)
    }

    /// End the run: release managed resources, flush the reporter and
    /// forget the task set. Returns the number of resources released;
    /// calling it again releases nothing.
    pub fn complete(&mut self) -> usize {
        let released = self.run.resources.release();
        if let Err(e) = self.run.reporter.flush() {
            warn!(error = %e, "reporter flush failed");
        }
        self.tasks.clear();
        debug!(released, "curation run completed");
        released
    }
}

impl Drop for Curator {
    fn drop(&mut self) {
        if !self.run.resources.is_empty() {
            let released = self.run.resources.release();
            debug!(released, "released resources left by an incomplete run");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use curate_state::fakes::{MemoryContentStore, MemoryTaskDefinitionStore};
    use curate_state::TaskDefinition;

    use crate::resource::tests::CallLog;

    fn curator() -> Curator {
        Curator::new(TaskResolver::new(Arc::new(
            MemoryTaskDefinitionStore::with_definitions([
                TaskDefinition::native("noop", "noop"),
                TaskDefinition::native("profile", "profile-formats"),
            ]),
        )))
    }

    #[test]
    fn transaction_scope_parses_and_defaults_to_open() {
        assert_eq!(TxScope::default(), TxScope::Open);
        assert_eq!("object".parse::<TxScope>().unwrap(), TxScope::Object);
        assert_eq!("CURATION".parse::<TxScope>().unwrap(), TxScope::Curation);
        assert!("nightly".parse::<TxScope>().is_err());
        assert_eq!(TxScope::Object.to_string(), "OBJECT");
    }

    #[tokio::test]
    async fn unresolvable_tasks_are_excluded() {
        let mut curator = curator();
        assert!(curator.add_task("noop").await);
        assert!(!curator.add_task("missing").await);
        assert!(curator.add_task("profile").await);
        assert_eq!(curator.tasks(), vec!["noop", "profile"]);
        assert!(curator.has_task("noop"));
        assert!(!curator.has_task("missing"));
    }

    #[tokio::test]
    async fn re_adding_moves_task_to_end() {
        let mut curator = curator();
        curator.add_task("noop").await;
        curator.add_task("profile").await;
        curator.add_task("noop").await;
        assert_eq!(curator.tasks(), vec!["profile", "noop"]);
        assert!(curator.remove_task("profile"));
        assert!(!curator.remove_task("profile"));
        assert_eq!(curator.tasks(), vec!["noop"]);
    }

    #[tokio::test]
    async fn status_defaults_to_unset() {
        let mut curator = curator();
        assert_eq!(curator.status("noop"), Status::Unset);
        curator.add_task("noop").await;
        assert_eq!(curator.status("noop"), Status::Unset);
        assert!(curator.result("noop").is_none());
        curator.set_result("noop", "done");
        assert_eq!(curator.result("noop"), Some("done"));
    }

    #[test]
    fn zero_cache_limit_means_unlimited() {
        let mut curator = curator();
        assert_eq!(curator.cache_limit(), None);
        curator.set_cache_limit(5);
        assert_eq!(curator.cache_limit(), Some(5));
        curator.set_cache_limit(0);
        assert_eq!(curator.cache_limit(), None);
    }

    #[tokio::test]
    async fn empty_identifier_is_a_precondition_failure() {
        let store = Arc::new(MemoryContentStore::new());
        let mut ctx = CurationContext::from_backend(store);
        let mut curator = curator();
        curator.add_task("noop").await;
        let err = curator.curate_id(&mut ctx, "  ").await.unwrap_err();
        assert!(matches!(err, CurationError::Precondition(_)));
    }

    #[test]
    fn complete_releases_once() {
        let mut curator = curator();
        let log = Arc::new(CallLog {
            closable: true,
            flushable: true,
            ..CallLog::default()
        });
        curator
            .manage_resource("journal", log.clone(), ReleasePolicy::Both)
            .unwrap();
        assert!(curator
            .manage_resource("journal", log.clone(), ReleasePolicy::Close)
            .is_err());
        assert!(curator.obtain_resource("journal").is_some());

        assert_eq!(curator.complete(), 1);
        assert_eq!(curator.complete(), 0);
        assert_eq!(*log.calls.lock().unwrap(), vec!["flush", "close"]);
        assert!(curator.tasks().is_empty());
    }

    #[test]
    fn drop_releases_leftover_resources() {
        let log = Arc::new(CallLog {
            closable: true,
            ..CallLog::default()
        });
        {
            let mut curator = curator();
            curator
                .enroll_resource(log.clone(), ReleasePolicy::Close)
                .unwrap();
        }
        assert_eq!(*log.calls.lock().unwrap(), vec!["close"]);
    }
}

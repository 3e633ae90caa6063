//! Uniform wrapper around a task implementation bound to its definition.

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use chrono::Utc;
use curate_state::ContentObject;

use crate::context::CurationContext;
use crate::curator::RunState;
use crate::descriptor::TaskDescriptor;
use crate::error::{CurationError, Result};
use crate::recorder::{AuditRecord, Recorder, RECORDER_KEY};
use crate::resource::ReleasePolicy;
use crate::status::Status;
use crate::task::{CurationTask, TaskContext, TaskSetup};

/// Builds a fresh task instance.
pub type TaskFactory = Arc<dyn Fn() -> Result<Box<dyn CurationTask>> + Send + Sync>;

pub struct ResolvedTask {
    name: String,
    descriptor: TaskDescriptor,
    factory: TaskFactory,
    task: Box<dyn CurationTask>,
    /// `key = value` defaults from the definition's config blob
    defaults: Arc<HashMap<String, String>>,
    recorder: Option<Arc<dyn Recorder>>,
}

impl ResolvedTask {
    pub fn new(
        name: impl Into<String>,
        descriptor: TaskDescriptor,
        factory: TaskFactory,
    ) -> Result<Self> {
        let task = factory()?;
        Ok(Self {
            name: name.into(),
            descriptor,
            factory,
            task,
            defaults: Arc::new(HashMap::new()),
            recorder: None,
        })
    }

    /// Wrap a closure that builds task instances.
    pub fn from_fn<T, F>(name: impl Into<String>, descriptor: TaskDescriptor, build: F) -> Result<Self>
    where
        T: CurationTask + 'static,
        F: Fn() -> T + Send + Sync + 'static,
    {
        let factory: TaskFactory = Arc::new(move || Ok(Box::new(build()) as Box<dyn CurationTask>));
        Self::new(name, descriptor, factory)
    }

    pub fn with_defaults(mut self, defaults: HashMap<String, String>) -> Self {
        self.defaults = Arc::new(defaults);
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn descriptor(&self) -> &TaskDescriptor {
        &self.descriptor
    }

    pub fn is_distributive(&self) -> bool {
        self.descriptor.distributive
    }

    pub fn is_mutative(&self) -> bool {
        self.descriptor.mutative
    }

    /// A new instance from the same factory. Nothing accumulated by this
    /// instance carries over.
    pub fn fresh_copy(&self) -> Result<Self> {
        Ok(Self {
            name: self.name.clone(),
            descriptor: self.descriptor.clone(),
            factory: self.factory.clone(),
            task: (self.factory)()?,
            defaults: self.defaults.clone(),
            recorder: None,
        })
    }

    pub(crate) async fn init(&mut self, run: &mut RunState) -> Result<()> {
        if !self.descriptor.records.is_empty() {
            let resource = match run.resources.obtain(RECORDER_KEY) {
                Some(existing) => existing,
                None => {
                    let created = (run.recorder_factory)()?;
                    run.resources
                        .manage(RECORDER_KEY, created.clone(), ReleasePolicy::Close)?;
                    created
                }
            };
            let recorder = resource.as_recorder().ok_or_else(|| {
                CurationError::Resource(format!(
                    "managed resource '{RECORDER_KEY}' is not a recorder"
                ))
            })?;
            self.recorder = Some(recorder);
        }

        let mut setup = TaskSetup {
            name: &self.name,
            run,
            defaults: &self.defaults,
        };
        self.task.init(&mut setup).await
    }

    pub(crate) async fn perform(
        &mut self,
        ctx: &mut CurationContext,
        run: &mut RunState,
        dso: &ContentObject,
    ) -> Result<Status> {
        let status = {
            let mut cx = TaskContext {
                name: &self.name,
                ctx: &mut *ctx,
                run: &mut *run,
                defaults: &self.defaults,
            };
            self.task.perform(&mut cx, dso).await?
        };
        let result = run.results.get(&self.name).map(String::as_str);
        self.record(&dso.label(), ctx, status, result)?;
        Ok(status)
    }

    pub(crate) async fn perform_id(
        &mut self,
        ctx: &mut CurationContext,
        run: &mut RunState,
        id: &str,
    ) -> Result<Status> {
        let status = {
            let mut cx = TaskContext {
                name: &self.name,
                ctx: &mut *ctx,
                run: &mut *run,
                defaults: &self.defaults,
            };
            self.task.perform_id(&mut cx, id).await?
        };
        let result = run.results.get(&self.name).map(String::as_str);
        self.record(id, ctx, status, result)?;
        Ok(status)
    }

    /// Write one audit record per rule matching `status`. No-op for tasks
    /// without record rules.
    pub fn record(
        &self,
        object_id: &str,
        ctx: &CurationContext,
        status: Status,
        result: Option<&str>,
    ) -> Result<()> {
        let Some(recorder) = &self.recorder else {
            return Ok(());
        };
        for rule in self.descriptor.records_for(status) {
            recorder.record(&AuditRecord {
                timestamp: Utc::now(),
                object_id: object_id.to_string(),
                user: ctx.user().map(str::to_string),
                task: self.name.clone(),
                record_type: rule.record_type.clone(),
                record_value: rule.value.clone(),
                status,
                result: result.map(str::to_string),
            })?;
        }
        Ok(())
    }
}

impl fmt::Debug for ResolvedTask {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ResolvedTask")
            .field("name", &self.name)
            .field("descriptor", &self.descriptor)
            .finish()
    }
}

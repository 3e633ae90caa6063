//! The task contract.
//!
//! A curation task is initialised once per run with a [`TaskSetup`] and
//! then invoked per object (or per raw identifier) with a [`TaskContext`]
//! that gives it the run's context, reporter, properties and its own
//! result slot.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use curate_state::ContentObject;

use crate::context::CurationContext;
use crate::curator::RunState;
use crate::descriptor::Invoked;
use crate::error::Result;
use crate::properties::PropertySource;
use crate::recorder::RecorderFactory;
use crate::reporter::Reporter;
use crate::resource::ResourceRegistry;
use crate::status::Status;

fn lookup(
    properties: &dyn PropertySource,
    defaults: &HashMap<String, String>,
    task: &str,
    key: &str,
) -> Option<String> {
    properties
        .property(&format!("{task}.{key}"))
        .or_else(|| defaults.get(key).cloned())
}

/// What a task sees while it is being initialised.
pub struct TaskSetup<'a> {
    pub(crate) name: &'a str,
    pub(crate) run: &'a mut RunState,
    pub(crate) defaults: &'a HashMap<String, String>,
}

impl<'a> TaskSetup<'a> {
    /// The logical name the task was resolved under.
    pub fn name(&self) -> &str {
        self.name
    }

    pub fn property(&self, key: &str) -> Option<String> {
        lookup(self.run.properties.as_ref(), self.defaults, self.name, key)
    }

    pub fn resources(&mut self) -> &mut ResourceRegistry {
        &mut self.run.resources
    }

    pub fn reporter(&self) -> Arc<dyn Reporter> {
        self.run.reporter.clone()
    }
}

/// What a task sees while it is performing.
pub struct TaskContext<'a> {
    pub(crate) name: &'a str,
    pub(crate) ctx: &'a mut CurationContext,
    pub(crate) run: &'a mut RunState,
    pub(crate) defaults: &'a HashMap<String, String>,
}

impl<'a> TaskContext<'a> {
    pub fn name(&self) -> &str {
        self.name
    }

    pub fn context(&self) -> &CurationContext {
        &*self.ctx
    }

    pub fn context_mut(&mut self) -> &mut CurationContext {
        &mut *self.ctx
    }

    pub fn current_user(&self) -> Option<&str> {
        self.ctx.user()
    }

    pub fn property(&self, key: &str) -> Option<String> {
        lookup(self.run.properties.as_ref(), self.defaults, self.name, key)
    }

    /// Integer property, falling back to `default` when absent or
    /// malformed.
    pub fn int_property(&self, key: &str, default: i64) -> i64 {
        self.property(key)
            .and_then(|v| v.trim().parse().ok())
            .unwrap_or(default)
    }

    pub fn report(&self, message: &str) -> Result<()> {
        self.run.reporter.report(message)
    }

    pub fn set_result(&mut self, result: impl Into<String>) {
        self.run
            .results
            .insert(self.name.to_string(), result.into());
    }

    pub fn result(&self) -> Option<&str> {
        self.run.results.get(self.name).map(String::as_str)
    }

    pub fn invoked(&self) -> Option<Invoked> {
        self.run.invoked
    }

    pub fn reporter(&self) -> Arc<dyn Reporter> {
        self.run.reporter.clone()
    }

    pub fn properties(&self) -> Arc<dyn PropertySource> {
        self.run.properties.clone()
    }

    pub(crate) fn recorder_factory(&self) -> RecorderFactory {
        self.run.recorder_factory.clone()
    }
}

#[async_trait]
pub trait CurationTask: Send {
    async fn init(&mut self, _setup: &mut TaskSetup<'_>) -> Result<()> {
        Ok(())
    }

    async fn perform(&mut self, cx: &mut TaskContext<'_>, dso: &ContentObject) -> Result<Status>;

    /// Perform on a raw identifier. Identifiers naming a content object are
    /// dereferenced and handed to [`CurationTask::perform`]; anything else
    /// fails.
    async fn perform_id(&mut self, cx: &mut TaskContext<'_>, id: &str) -> Result<Status> {
        match cx.context_mut().resolve(id).await? {
            Some(dso) => self.perform(cx, &dso).await,
            None => Ok(Status::Fail),
        }
    }
}

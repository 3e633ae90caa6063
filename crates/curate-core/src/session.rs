//! Single-task curation sessions.
//!
//! A session binds one task to a Curator. Each call runs a fresh copy of the
//! task with per-call property overrides layered over the session's base
//! properties, so nothing leaks from one invocation into the next.

use std::collections::HashMap;
use std::sync::Arc;

use curate_state::ContentObject;

use crate::context::CurationContext;
use crate::curator::Curator;
use crate::error::{CurationError, Result};
use crate::properties::{OverlayProperties, PropertySource};
use crate::resolved::ResolvedTask;
use crate::resolver::TaskResolver;
use crate::selector::ObjectSelector;
use crate::status::Status;

pub struct CurationSession {
    curator: Curator,
    prototype: ResolvedTask,
    base_properties: Arc<dyn PropertySource>,
}

impl CurationSession {
    /// Session for the task resolved under `name`.
    pub async fn open(resolver: TaskResolver, name: &str) -> Result<Self> {
        let prototype = resolver
            .resolve_task(name)
            .await
            .ok_or_else(|| CurationError::Resolution(format!("task {name} cannot be resolved")))?;
        Ok(Self::anonymous(resolver, prototype))
    }

    /// Session for a task supplied directly rather than by name.
    pub fn anonymous(resolver: TaskResolver, task: ResolvedTask) -> Self {
        let curator = Curator::new(resolver);
        let base_properties = curator.properties();
        Self {
            curator,
            prototype: task,
            base_properties,
        }
    }

    pub fn task_name(&self) -> &str {
        self.prototype.name()
    }

    /// The underlying Curator, for reporter, scope and limit settings.
    pub fn curator_mut(&mut self) -> &mut Curator {
        &mut self.curator
    }

    /// Replace the properties overrides are layered over.
    pub fn set_properties(&mut self, properties: Arc<dyn PropertySource>) {
        self.base_properties = properties;
    }

    async fn prepare(&mut self, overrides: &HashMap<String, String>) -> Result<String> {
        let task = self.prototype.fresh_copy()?;
        let name = task.name().to_string();
        self.curator.set_properties(Arc::new(OverlayProperties::for_task(
            &name,
            overrides,
            self.base_properties.clone(),
        )));
        if !self.curator.add_resolved(task).await {
            return Err(CurationError::Resolution(format!(
                "task {name} failed to initialise"
            )));
        }
        Ok(name)
    }

    pub async fn curate(
        &mut self,
        ctx: &mut CurationContext,
        dso: &ContentObject,
        overrides: &HashMap<String, String>,
    ) -> Result<Status> {
        let name = self.prepare(overrides).await?;
        self.curator.curate(ctx, dso).await?;
        Ok(self.curator.status(&name))
    }

    pub async fn curate_id(
        &mut self,
        ctx: &mut CurationContext,
        id: &str,
        overrides: &HashMap<String, String>,
    ) -> Result<Status> {
        let name = self.prepare(overrides).await?;
        self.curator.curate_id(ctx, id).await?;
        Ok(self.curator.status(&name))
    }

    pub async fn curate_selector(
        &mut self,
        ctx: &mut CurationContext,
        selector: &mut dyn ObjectSelector,
        overrides: &HashMap<String, String>,
    ) -> Result<Status> {
        let name = self.prepare(overrides).await?;
        self.curator.curate_selector(ctx, selector).await?;
        Ok(self.curator.status(&name))
    }

    /// Result string of the most recent invocation.
    pub fn result(&self) -> Option<&str> {
        self.curator.result(self.prototype.name())
    }

    /// Release the Curator's resources. Returns how many were released.
    pub fn close(mut self) -> usize {
        self.curator.complete()
    }
}

//! Scripted tasks.
//!
//! A scripted definition names a language and a constructor expression
//! (`load_ref = "<language>|<constructor>"`). The engine registered for the
//! language evaluates the definition's source, then the constructor, and
//! hands back a [`ScriptedTask`]. No engine is registered by default.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use curate_state::ContentObject;

use crate::error::Result;
use crate::status::Status;
use crate::task::{CurationTask, TaskContext, TaskSetup};

#[async_trait]
pub trait ScriptedTask: Send {
    async fn init(&mut self, _setup: &mut TaskSetup<'_>) -> Result<()> {
        Ok(())
    }

    async fn perform_dso(&mut self, cx: &mut TaskContext<'_>, dso: &ContentObject)
        -> Result<Status>;

    async fn perform_id(&mut self, cx: &mut TaskContext<'_>, id: &str) -> Result<Status>;
}

pub trait ScriptEngine: Send + Sync {
    /// Evaluate `source`, then `constructor`, producing a task instance.
    fn instantiate(&self, source: &str, constructor: &str) -> Result<Box<dyn ScriptedTask>>;
}

/// Script engines keyed by language tag.
#[derive(Default, Clone)]
pub struct ScriptEngines {
    engines: HashMap<String, Arc<dyn ScriptEngine>>,
}

impl ScriptEngines {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&mut self, language: impl Into<String>, engine: Arc<dyn ScriptEngine>) {
        self.engines.insert(language.into(), engine);
    }

    pub fn get(&self, language: &str) -> Option<Arc<dyn ScriptEngine>> {
        self.engines.get(language).cloned()
    }

    pub fn has(&self, language: &str) -> bool {
        self.engines.contains_key(language)
    }
}

/// Presents a scripted task through the native task contract.
pub(crate) struct ScriptedAdapter(pub(crate) Box<dyn ScriptedTask>);

#[async_trait]
impl CurationTask for ScriptedAdapter {
    async fn init(&mut self, setup: &mut TaskSetup<'_>) -> Result<()> {
        self.0.init(setup).await
    }

    async fn perform(&mut self, cx: &mut TaskContext<'_>, dso: &ContentObject) -> Result<Status> {
        self.0.perform_dso(cx, dso).await
    }

    async fn perform_id(&mut self, cx: &mut TaskContext<'_>, id: &str) -> Result<Status> {
        self.0.perform_id(cx, id).await
    }
}

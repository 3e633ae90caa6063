//! Task and selector resolution by logical name.
//!
//! Definitions come from the task definition store and are dispatched on
//! their kind: native plugins, scripted tasks, curation programs, and
//! selectors. Resolution failures are logged and reported as `None`; no
//! error escapes this boundary.

use std::collections::HashMap;
use std::sync::Arc;

use curate_state::{TaskDefinition, TaskDefinitionStore, TaskKind};
use futures::future::{BoxFuture, FutureExt};
use tracing::{debug, error, warn};

use crate::descriptor::TaskDescriptor;
use crate::error::{CurationError, Result};
use crate::plugins::PluginRegistry;
use crate::program::Program;
use crate::resolved::{ResolvedTask, TaskFactory};
use crate::script::{ScriptEngines, ScriptedAdapter};
use crate::selector::ObjectSelector;
use crate::task::CurationTask;

#[derive(Clone)]
pub struct TaskResolver {
    definitions: Arc<dyn TaskDefinitionStore>,
    plugins: Arc<PluginRegistry>,
    engines: Arc<ScriptEngines>,
    /// Programs being resolved above this resolver, outermost first
    ancestry: Vec<String>,
}

impl TaskResolver {
    /// Resolver over `definitions` with the built-in plugins and no script
    /// engines.
    pub fn new(definitions: Arc<dyn TaskDefinitionStore>) -> Self {
        Self {
            definitions,
            plugins: Arc::new(PluginRegistry::with_builtins()),
            engines: Arc::new(ScriptEngines::new()),
            ancestry: Vec::new(),
        }
    }

    pub fn with_plugins(mut self, plugins: Arc<PluginRegistry>) -> Self {
        self.plugins = plugins;
        self
    }

    pub fn with_engines(mut self, engines: Arc<ScriptEngines>) -> Self {
        self.engines = engines;
        self
    }

    pub fn plugins(&self) -> &Arc<PluginRegistry> {
        &self.plugins
    }

    pub fn definitions(&self) -> &Arc<dyn TaskDefinitionStore> {
        &self.definitions
    }

    fn with_ancestor(&self, program: &str) -> Self {
        let mut child = self.clone();
        child.ancestry.push(program.to_string());
        child
    }

    async fn definition(&self, name: &str) -> Option<TaskDefinition> {
        match self.definitions.find(name).await {
            Ok(found) => found,
            Err(e) => {
                error!(task = name, error = %e, "task definition lookup failed");
                None
            }
        }
    }

    pub async fn resolve_task(&self, name: &str) -> Option<ResolvedTask> {
        match self.build_task(name).await {
            Ok(task) => {
                debug!(task = name, "task resolved");
                Some(task)
            }
            Err(e) => {
                error!(task = name, error = %e, "task resolution failed");
                None
            }
        }
    }

    pub async fn resolve_selector(&self, name: &str) -> Option<Box<dyn ObjectSelector>> {
        match self.build_selector(name).await {
            Ok(selector) => Some(selector),
            Err(e) => {
                error!(selector = name, error = %e, "selector resolution failed");
                None
            }
        }
    }

    /// Whether `name` would resolve: the definition exists and its plugin or
    /// engine is available. Programs are also compiled, so a program that
    /// reaches itself through other programs is unresolvable.
    pub fn can_resolve_task<'a>(&'a self, name: &'a str) -> BoxFuture<'a, bool> {
        async move {
            let Some(definition) = self.definition(name).await else {
                return false;
            };
            match definition.kind {
                TaskKind::Native => self.plugins.has_task(&definition.load_ref),
                TaskKind::Scripted => definition
                    .load_ref
                    .split_once('|')
                    .is_some_and(|(language, _)| self.engines.has(language)),
                TaskKind::Program => match self.compile_program(&definition).await {
                    Ok(_) => true,
                    Err(e) => {
                        warn!(task = name, error = %e, "program does not compile");
                        false
                    }
                },
                TaskKind::Selector => false,
            }
        }
        .boxed()
    }

    async fn build_task(&self, name: &str) -> Result<ResolvedTask> {
        let definition = self
            .definitions
            .find(name)
            .await?
            .ok_or_else(|| CurationError::Resolution(format!("no task definition named {name}")))?;
        let defaults: HashMap<String, String> = definition.config_pairs().into_iter().collect();

        let (descriptor, factory): (TaskDescriptor, TaskFactory) = match definition.kind {
            TaskKind::Native => {
                let (descriptor, build) =
                    self.plugins.task(&definition.load_ref).ok_or_else(|| {
                        CurationError::Resolution(format!(
                            "unknown task plugin: {}",
                            definition.load_ref
                        ))
                    })?;
                let factory: TaskFactory = Arc::new(move || Ok(build()));
                (descriptor, factory)
            }
            TaskKind::Scripted => {
                let (language, constructor) =
                    definition.load_ref.split_once('|').ok_or_else(|| {
                        CurationError::Resolution(format!(
                            "scripted load_ref must be <language>|<constructor>: {}",
                            definition.load_ref
                        ))
                    })?;
                let engine = self.engines.get(language).ok_or_else(|| {
                    CurationError::Resolution(format!("no script engine for {language}"))
                })?;
                let source = definition.source.clone().unwrap_or_default();
                let constructor = constructor.to_string();
                let factory: TaskFactory = Arc::new(move || {
                    let scripted = engine.instantiate(&source, &constructor)?;
                    Ok(Box::new(ScriptedAdapter(scripted)) as Box<dyn CurationTask>)
                });
                (TaskDescriptor::default(), factory)
            }
            TaskKind::Program => {
                let program = self.compile_program(&definition).await?;
                let descriptor = program.descriptor().clone();
                let factory: TaskFactory =
                    Arc::new(move || Ok(Box::new(program.clone()) as Box<dyn CurationTask>));
                (descriptor, factory)
            }
            TaskKind::Selector => {
                return Err(CurationError::Resolution(format!(
                    "{name} is a selector, not a task"
                )))
            }
        };

        Ok(ResolvedTask::new(name, descriptor, factory)?.with_defaults(defaults))
    }

    async fn build_selector(&self, name: &str) -> Result<Box<dyn ObjectSelector>> {
        let definition = self
            .definitions
            .find(name)
            .await?
            .ok_or_else(|| CurationError::Resolution(format!("no selector named {name}")))?;
        if definition.kind != TaskKind::Selector {
            return Err(CurationError::Resolution(format!(
                "{name} is a {} definition, not a selector",
                definition.kind
            )));
        }
        let factory = self.plugins.selector(&definition.load_ref).ok_or_else(|| {
            CurationError::Resolution(format!("unknown selector plugin: {}", definition.load_ref))
        })?;

        let mut selector = factory();
        selector.set_name(name);
        if let Some(init) = definition.config.as_deref().or(definition.source.as_deref()) {
            selector.configure(init)?;
        }
        Ok(selector)
    }

    fn compile_program<'a>(&'a self, definition: &'a TaskDefinition) -> BoxFuture<'a, Result<Program>> {
        async move {
            if self.ancestry.iter().any(|a| a == &definition.name) {
                return Err(CurationError::Resolution(format!(
                    "program {} invokes itself (via {})",
                    definition.name,
                    self.ancestry.join(" -> ")
                )));
            }
            let source = match &definition.source {
                Some(source) => source.clone(),
                None => tokio::fs::read_to_string(&definition.load_ref).await?,
            };
            Program::compile(&definition.name, &source, self.with_ancestor(&definition.name)).await
        }
        .boxed()
    }
}

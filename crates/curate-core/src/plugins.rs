//! Compile-time plugin registry: task and selector factories by name.

use std::collections::BTreeMap;
use std::sync::Arc;

use crate::descriptor::TaskDescriptor;
use crate::selector::ObjectSelector;
use crate::task::CurationTask;

pub type NativeFactory = Arc<dyn Fn() -> Box<dyn CurationTask> + Send + Sync>;
pub type SelectorFactory = Arc<dyn Fn() -> Box<dyn ObjectSelector> + Send + Sync>;

#[derive(Clone)]
struct TaskPlugin {
    descriptor: TaskDescriptor,
    factory: NativeFactory,
}

#[derive(Clone, Default)]
pub struct PluginRegistry {
    tasks: BTreeMap<String, TaskPlugin>,
    selectors: BTreeMap<String, SelectorFactory>,
}

impl PluginRegistry {
    /// An empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// A registry holding the built-in tasks and selectors.
    pub fn with_builtins() -> Self {
        let mut registry = Self::new();
        crate::tasks::register_builtins(&mut registry);
        crate::selector::register_builtins(&mut registry);
        registry
    }

    pub fn register_task<T, F>(&mut self, name: impl Into<String>, descriptor: TaskDescriptor, build: F)
    where
        T: CurationTask + 'static,
        F: Fn() -> T + Send + Sync + 'static,
    {
        let factory: NativeFactory =
            Arc::new(move || Box::new(build()) as Box<dyn CurationTask>);
        self.tasks
            .insert(name.into(), TaskPlugin { descriptor, factory });
    }

    pub fn register_selector<S, F>(&mut self, name: impl Into<String>, build: F)
    where
        S: ObjectSelector + 'static,
        F: Fn() -> S + Send + Sync + 'static,
    {
        let factory: SelectorFactory =
            Arc::new(move || Box::new(build()) as Box<dyn ObjectSelector>);
        self.selectors.insert(name.into(), factory);
    }

    pub fn task(&self, name: &str) -> Option<(TaskDescriptor, NativeFactory)> {
        self.tasks
            .get(name)
            .map(|p| (p.descriptor.clone(), p.factory.clone()))
    }

    pub fn has_task(&self, name: &str) -> bool {
        self.tasks.contains_key(name)
    }

    pub fn selector(&self, name: &str) -> Option<SelectorFactory> {
        self.selectors.get(name).cloned()
    }

    pub fn task_names(&self) -> impl Iterator<Item = &str> {
        self.tasks.keys().map(String::as_str)
    }

    pub fn selector_names(&self) -> impl Iterator<Item = &str> {
        self.selectors.keys().map(String::as_str)
    }
}

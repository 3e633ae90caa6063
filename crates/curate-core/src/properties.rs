//! Property sources for task configuration.
//!
//! Task properties are addressed as `<task>.<property>`.

use std::collections::HashMap;
use std::sync::Arc;

pub trait PropertySource: Send + Sync {
    fn property(&self, key: &str) -> Option<String>;
}

/// Plain key/value properties.
#[derive(Debug, Clone, Default)]
pub struct MapProperties {
    values: HashMap<String, String>,
}

impl MapProperties {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.values.insert(key.into(), value.into());
        self
    }

    pub fn insert(&mut self, key: impl Into<String>, value: impl Into<String>) {
        self.values.insert(key.into(), value.into());
    }
}

impl PropertySource for MapProperties {
    fn property(&self, key: &str) -> Option<String> {
        self.values.get(key).cloned()
    }
}

/// Per-invocation overrides layered over a base source.
pub struct OverlayProperties {
    overrides: HashMap<String, String>,
    base: Arc<dyn PropertySource>,
}

impl OverlayProperties {
    pub fn new(overrides: HashMap<String, String>, base: Arc<dyn PropertySource>) -> Self {
        Self { overrides, base }
    }

    /// Overrides for one task. Bare keys (`fields`) are scoped to the task
    /// (`required-metadata.fields`); dotted keys are kept as given.
    pub fn for_task(
        task: &str,
        overrides: &HashMap<String, String>,
        base: Arc<dyn PropertySource>,
    ) -> Self {
        let overrides = overrides
            .iter()
            .map(|(key, value)| {
                let key = if key.contains('.') {
                    key.clone()
                } else {
                    format!("{task}.{key}")
                };
                (key, value.clone())
            })
            .collect();
        Self::new(overrides, base)
    }
}

impl PropertySource for OverlayProperties {
    fn property(&self, key: &str) -> Option<String> {
        self.overrides
            .get(key)
            .cloned()
            .or_else(|| self.base.property(key))
    }
}

//! Object selectors: pluggable sources of curation targets.
//!
//! A selector is a named, configurable producer of content objects bound to
//! a curation context. [`SelectorResolver`] builds selectors from
//! `name = "kind[:initializer]"` profiles.

use std::collections::BTreeMap;
use std::sync::Arc;

use async_trait::async_trait;
use curate_state::{ContentObject, ObjectCursor, ObjectType};
use tracing::{error, warn};

use crate::context::CurationContext;
use crate::error::{CurationError, Result};
use crate::plugins::PluginRegistry;

#[async_trait]
pub trait ObjectSelector: Send {
    fn name(&self) -> &str;

    fn set_name(&mut self, name: &str);

    /// Apply an implementation-specific definition string.
    fn configure(&mut self, definition: &str) -> Result<()>;

    /// The selected objects, in selection order.
    async fn select(&mut self, ctx: &mut CurationContext) -> Result<ObjectCursor>;
}

pub(crate) fn register_builtins(registry: &mut PluginRegistry) {
    registry.register_selector("object-list", ObjectListSelector::default);
    registry.register_selector("collection-items", CollectionItemsSelector::default);
}

/// Selects an explicit list of identifiers (handles or UUIDs), separated by
/// whitespace or commas. Identifiers that do not resolve are skipped.
#[derive(Debug, Default)]
pub struct ObjectListSelector {
    name: String,
    identifiers: Vec<String>,
}

impl ObjectListSelector {
    pub fn new(identifiers: impl IntoIterator<Item = impl Into<String>>) -> Self {
        Self {
            name: "object-list".to_string(),
            identifiers: identifiers.into_iter().map(Into::into).collect(),
        }
    }
}

#[async_trait]
impl ObjectSelector for ObjectListSelector {
    fn name(&self) -> &str {
        &self.name
    }

    fn set_name(&mut self, name: &str) {
        self.name = name.to_string();
    }

    fn configure(&mut self, definition: &str) -> Result<()> {
        self.identifiers = definition
            .split(|c: char| c.is_whitespace() || c == ',')
            .filter(|s| !s.is_empty())
            .map(str::to_string)
            .collect();
        Ok(())
    }

    async fn select(&mut self, ctx: &mut CurationContext) -> Result<ObjectCursor> {
        let mut objects = Vec::with_capacity(self.identifiers.len());
        for id in &self.identifiers {
            match ctx.resolve(id).await? {
                Some(object) => objects.push(object),
                None => warn!(selector = %self.name, identifier = %id, "identifier not found, skipped"),
            }
        }
        Ok(ObjectCursor::new(objects))
    }
}

/// Selects the items of one collection.
#[derive(Debug, Default)]
pub struct CollectionItemsSelector {
    name: String,
    collection: Option<String>,
}

#[async_trait]
impl ObjectSelector for CollectionItemsSelector {
    fn name(&self) -> &str {
        &self.name
    }

    fn set_name(&mut self, name: &str) {
        self.name = name.to_string();
    }

    fn configure(&mut self, definition: &str) -> Result<()> {
        let id = definition.trim();
        if id.is_empty() {
            return Err(CurationError::Config(
                "collection-items needs a collection identifier".to_string(),
            ));
        }
        self.collection = Some(id.to_string());
        Ok(())
    }

    async fn select(&mut self, ctx: &mut CurationContext) -> Result<ObjectCursor> {
        let id = self.collection.as_deref().ok_or_else(|| {
            CurationError::Precondition(format!("selector {} is not configured", self.name))
        })?;
        let collection: ContentObject = ctx.resolve(id).await?.ok_or_else(|| {
            CurationError::Precondition(format!("collection not found: {id}"))
        })?;
        if collection.object_type != ObjectType::Collection {
            return Err(CurationError::Precondition(format!(
                "{id} is a {}, not a collection",
                collection.object_type
            )));
        }
        Ok(ctx.store().items(&collection.id).await?)
    }
}

/// Builds selectors from configured profiles.
pub struct SelectorResolver {
    profiles: BTreeMap<String, String>,
    plugins: Arc<PluginRegistry>,
}

impl SelectorResolver {
    pub fn new(profiles: BTreeMap<String, String>, plugins: Arc<PluginRegistry>) -> Self {
        Self { profiles, plugins }
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.profiles.keys().map(String::as_str)
    }

    /// A new selector for the profile `name`. Unknown names, unknown kinds
    /// and rejected initializers are logged and yield `None`.
    pub fn resolve(&self, name: &str) -> Option<Box<dyn ObjectSelector>> {
        let profile = self.profiles.get(name)?;
        let (kind, init) = match profile.split_once(':') {
            Some((kind, init)) => (kind.trim(), Some(init)),
            None => (profile.trim(), None),
        };
        if kind.is_empty() {
            error!(selector = name, profile = %profile, "malformed selector profile");
            return None;
        }
        let Some(factory) = self.plugins.selector(kind) else {
            error!(selector = name, kind, "unknown selector kind");
            return None;
        };

        let mut selector = factory();
        selector.set_name(name);
        if let Some(init) = init {
            if let Err(e) = selector.configure(init) {
                error!(selector = name, error = %e, "selector initializer rejected");
                return None;
            }
        }
        Some(selector)
    }
}

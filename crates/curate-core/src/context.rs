//! Per-run curation context.
//!
//! Carries the collaborators a run talks to (content store, identifier
//! resolver), the acting user, and the object cache the Curator evicts
//! according to its cache limit. A context is passed explicitly to every
//! curation call and is never shared between concurrent runs.

use std::collections::HashMap;
use std::sync::Arc;

use curate_state::{ContentObject, ContentStore, IdentifierResolver, ObjectId, StorageResult};
use tracing::debug;

use crate::metrics::METRICS;

pub struct CurationContext {
    store: Arc<dyn ContentStore>,
    identifiers: Arc<dyn IdentifierResolver>,
    user: Option<String>,
    cache: HashMap<ObjectId, ContentObject>,
    cache_clears: usize,
}

impl CurationContext {
    pub fn new(store: Arc<dyn ContentStore>, identifiers: Arc<dyn IdentifierResolver>) -> Self {
        Self {
            store,
            identifiers,
            user: None,
            cache: HashMap::new(),
            cache_clears: 0,
        }
    }

    /// Context over a backend that implements both collaborator traits.
    pub fn from_backend<B>(backend: Arc<B>) -> Self
    where
        B: ContentStore + IdentifierResolver + 'static,
    {
        Self::new(backend.clone(), backend)
    }

    pub fn with_user(mut self, user: Option<String>) -> Self {
        self.user = user;
        self
    }

    pub fn user(&self) -> Option<&str> {
        self.user.as_deref()
    }

    pub fn set_user(&mut self, user: Option<String>) {
        self.user = user;
    }

    pub fn store(&self) -> &Arc<dyn ContentStore> {
        &self.store
    }

    /// Resolve a handle or UUID. Cached objects are served without a store
    /// round trip.
    pub async fn resolve(&mut self, identifier: &str) -> StorageResult<Option<ContentObject>> {
        if let Some(hit) = self
            .cache
            .values()
            .find(|o| o.handle.as_deref() == Some(identifier))
        {
            return Ok(Some(hit.clone()));
        }
        let found = self.identifiers.resolve(identifier).await?;
        if let Some(object) = &found {
            self.cache_object(object.clone());
        }
        Ok(found)
    }

    pub async fn find(&mut self, id: &ObjectId) -> StorageResult<Option<ContentObject>> {
        if let Some(hit) = self.cache.get(id) {
            return Ok(Some(hit.clone()));
        }
        self.store.find(id).await
    }

    pub async fn commit(&self) -> StorageResult<()> {
        self.store.commit().await?;
        METRICS.inc_commits();
        Ok(())
    }

    pub fn cache_object(&mut self, object: ContentObject) {
        self.cache.insert(object.id, object);
    }

    /// Drop a stale cache entry after the object has been modified.
    pub fn uncache(&mut self, id: &ObjectId) {
        self.cache.remove(id);
    }

    pub fn cache_size(&self) -> usize {
        self.cache.len()
    }

    pub fn clear_cache(&mut self) {
        debug!(size = self.cache.len(), "clearing object cache");
        self.cache.clear();
        self.cache_clears += 1;
    }

    /// How many times the cache has been cleared.
    pub fn cache_clears(&self) -> usize {
        self.cache_clears
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use curate_state::fakes::MemoryContentStore;

    #[tokio::test]
    async fn resolve_populates_cache() {
        let store = Arc::new(MemoryContentStore::new());
        let community = store.add_community(None, "Library");
        let mut ctx = CurationContext::from_backend(store);

        let found = ctx
            .resolve(community.handle.as_deref().unwrap())
            .await
            .unwrap()
            .unwrap();
        assert_eq!(found.id, community.id);
        assert_eq!(ctx.cache_size(), 1);

        ctx.clear_cache();
        assert_eq!(ctx.cache_size(), 0);
        assert_eq!(ctx.cache_clears(), 1);
    }

    #[tokio::test]
    async fn commit_reaches_store() {
        let store = Arc::new(MemoryContentStore::new());
        let ctx = CurationContext::from_backend(store.clone());
        ctx.commit().await.unwrap();
        assert_eq!(store.commit_count(), 1);
    }
}

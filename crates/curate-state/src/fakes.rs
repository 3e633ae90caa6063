//! In-memory fakes for storage traits (testing only)
//!
//! Provides `MemoryContentStore` and `MemoryTaskDefinitionStore` that
//! satisfy the trait contracts without any external
//! dependencies. The content store also counts commits and cursor
//! open/close pairs so callers can assert on transaction and cleanup
//! behaviour.

use std::collections::{BTreeMap, HashMap};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;

use crate::cursor::ObjectCursor;
use crate::error::StorageError;
use crate::storage_traits::*;

pub use crate::memory_queue::MemoryTaskQueue;

/// Handle prefix used by the fake when minting handles.
pub const HANDLE_PREFIX: &str = "123456789";

// ---------------------------------------------------------------------------
// MemoryContentStore
// ---------------------------------------------------------------------------

#[derive(Debug, Default)]
struct ContentState {
    /// Insertion order doubles as enumeration order.
    objects: Vec<ContentObject>,
    bitstreams: Vec<BitstreamRecord>,
    content: HashMap<ObjectId, Vec<u8>>,
    next_handle: u64,
    failing_parents: Vec<ObjectId>,
}

/// In-memory content hierarchy rooted at a single site.
#[derive(Debug)]
pub struct MemoryContentStore {
    site_id: ObjectId,
    state: Mutex<ContentState>,
    commits: AtomicUsize,
    cursors_opened: AtomicUsize,
    cursors_closed: Arc<AtomicUsize>,
}

impl Default for MemoryContentStore {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryContentStore {
    pub fn new() -> Self {
        let site = ContentObject::new(ObjectType::Site, "Repository")
            .with_handle(format!("{HANDLE_PREFIX}/0"));
        let site_id = site.id;
        Self {
            site_id,
            state: Mutex::new(ContentState {
                objects: vec![site],
                next_handle: 1,
                ..ContentState::default()
            }),
            commits: AtomicUsize::new(0),
            cursors_opened: AtomicUsize::new(0),
            cursors_closed: Arc::new(AtomicUsize::new(0)),
        }
    }

    pub fn site_id(&self) -> ObjectId {
        self.site_id
    }

    fn insert(&self, object_type: ObjectType, parent: ObjectId, name: &str) -> ContentObject {
        let mut state = self.state.lock().unwrap();
        let handle = format!("{HANDLE_PREFIX}/{}", state.next_handle);
        state.next_handle += 1;
        let object = ContentObject::new(object_type, name)
            .with_handle(handle)
            .with_parent(parent);
        state.objects.push(object.clone());
        object
    }

    /// Add a community below `parent`, or below the site when `None`.
    pub fn add_community(&self, parent: Option<ObjectId>, name: &str) -> ContentObject {
        self.insert(
            ObjectType::Community,
            parent.unwrap_or(self.site_id),
            name,
        )
    }

    pub fn add_collection(&self, community: ObjectId, name: &str) -> ContentObject {
        self.insert(ObjectType::Collection, community, name)
    }

    pub fn add_item(&self, collection: ObjectId, name: &str) -> ContentObject {
        self.insert(ObjectType::Item, collection, name)
    }

    /// Add an item carrying the given metadata.
    pub fn add_item_with_metadata(
        &self,
        collection: ObjectId,
        name: &str,
        metadata: Vec<MetadataValue>,
    ) -> ContentObject {
        let mut item = self.insert(ObjectType::Item, collection, name);
        let mut state = self.state.lock().unwrap();
        if let Some(stored) = state.objects.iter_mut().find(|o| o.id == item.id) {
            stored.metadata = metadata.clone();
        }
        item.metadata = metadata;
        item
    }

    /// Add a bundle (no handle) to an item.
    pub fn add_bundle(&self, item: ObjectId, name: &str) -> ContentObject {
        let bundle = ContentObject::new(ObjectType::Bundle, name).with_parent(item);
        self.state.lock().unwrap().objects.push(bundle.clone());
        bundle
    }

    /// Store bytes as a bitstream of `bundle` with a correct checksum.
    pub fn add_bitstream_bytes(
        &self,
        bundle: ObjectId,
        name: &str,
        format: &str,
        data: &[u8],
    ) -> BitstreamRecord {
        let record = BitstreamRecord::from_content(bundle, name, format, data);
        let mut state = self.state.lock().unwrap();
        state.bitstreams.push(record.clone());
        state.content.insert(record.id, data.to_vec());
        record
    }

    /// Overwrite stored bytes without touching the recorded checksum.
    pub fn corrupt_bitstream(&self, bitstream: ObjectId, data: &[u8]) {
        self.state
            .lock()
            .unwrap()
            .content
            .insert(bitstream, data.to_vec());
    }

    /// Make child enumeration below `parent` fail with a backend error.
    pub fn fail_children_of(&self, parent: ObjectId) {
        self.state.lock().unwrap().failing_parents.push(parent);
    }

    pub fn commit_count(&self) -> usize {
        self.commits.load(Ordering::SeqCst)
    }

    pub fn cursors_opened(&self) -> usize {
        self.cursors_opened.load(Ordering::SeqCst)
    }

    pub fn cursors_closed(&self) -> usize {
        self.cursors_closed.load(Ordering::SeqCst)
    }

    fn children(&self, parent: &ObjectId, object_type: ObjectType) -> StorageResult<ObjectCursor> {
        let state = self.state.lock().unwrap();
        if state.failing_parents.contains(parent) {
            return Err(StorageError::Backend(format!(
                "simulated failure listing children of {parent}"
            )));
        }
        let children: Vec<ContentObject> = state
            .objects
            .iter()
            .filter(|o| o.object_type == object_type && o.parent.as_ref() == Some(parent))
            .cloned()
            .collect();
        drop(state);

        self.cursors_opened.fetch_add(1, Ordering::SeqCst);
        let closed = self.cursors_closed.clone();
        Ok(ObjectCursor::with_close_hook(children, move || {
            closed.fetch_add(1, Ordering::SeqCst);
        }))
    }
}

#[async_trait]
impl ContentStore for MemoryContentStore {
    async fn site(&self) -> StorageResult<ContentObject> {
        self.find(&self.site_id)
            .await?
            .ok_or_else(|| StorageError::ObjectNotFound {
                id: self.site_id.to_string(),
            })
    }

    async fn find(&self, id: &ObjectId) -> StorageResult<Option<ContentObject>> {
        let state = self.state.lock().unwrap();
        Ok(state.objects.iter().find(|o| &o.id == id).cloned())
    }

    async fn top_communities(&self) -> StorageResult<ObjectCursor> {
        self.children(&self.site_id, ObjectType::Community)
    }

    async fn sub_communities(&self, community: &ObjectId) -> StorageResult<ObjectCursor> {
        self.children(community, ObjectType::Community)
    }

    async fn collections(&self, community: &ObjectId) -> StorageResult<ObjectCursor> {
        self.children(community, ObjectType::Collection)
    }

    async fn items(&self, collection: &ObjectId) -> StorageResult<ObjectCursor> {
        self.children(collection, ObjectType::Item)
    }

    async fn bundles(&self, item: &ObjectId) -> StorageResult<ObjectCursor> {
        self.children(item, ObjectType::Bundle)
    }

    async fn bitstreams(&self, bundle: &ObjectId) -> StorageResult<Vec<BitstreamRecord>> {
        let state = self.state.lock().unwrap();
        Ok(state
            .bitstreams
            .iter()
            .filter(|b| &b.bundle == bundle)
            .cloned()
            .collect())
    }

    async fn retrieve(&self, bitstream: &ObjectId) -> StorageResult<Vec<u8>> {
        let state = self.state.lock().unwrap();
        state
            .content
            .get(bitstream)
            .cloned()
            .ok_or_else(|| StorageError::ContentNotFound {
                id: bitstream.to_string(),
            })
    }

    async fn create(&self, object: ContentObject) -> StorageResult<ContentObject> {
        let mut state = self.state.lock().unwrap();
        let duplicate = state.objects.iter().any(|o| {
            o.id == object.id || (object.handle.is_some() && o.handle == object.handle)
        });
        if duplicate {
            return Err(StorageError::DuplicateObject {
                id: object.label(),
            });
        }
        state.objects.push(object.clone());
        Ok(object)
    }

    async fn add_bitstream(&self, record: BitstreamRecord, data: Vec<u8>) -> StorageResult<()> {
        let mut state = self.state.lock().unwrap();
        let bundle_exists = state
            .objects
            .iter()
            .any(|o| o.id == record.bundle && o.object_type == ObjectType::Bundle);
        if !bundle_exists {
            return Err(StorageError::ObjectNotFound {
                id: record.bundle.to_string(),
            });
        }
        state.content.insert(record.id, data);
        state.bitstreams.push(record);
        Ok(())
    }

    async fn update_metadata(
        &self,
        id: &ObjectId,
        metadata: Vec<MetadataValue>,
    ) -> StorageResult<()> {
        let mut state = self.state.lock().unwrap();
        let object = state
            .objects
            .iter_mut()
            .find(|o| &o.id == id)
            .ok_or_else(|| StorageError::ObjectNotFound { id: id.to_string() })?;
        object.metadata = metadata;
        Ok(())
    }

    async fn commit(&self) -> StorageResult<()> {
        self.commits.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}

#[async_trait]
impl IdentifierResolver for MemoryContentStore {
    async fn resolve(&self, identifier: &str) -> StorageResult<Option<ContentObject>> {
        let by_uuid = identifier.parse::<ObjectId>().ok();
        let state = self.state.lock().unwrap();
        Ok(state
            .objects
            .iter()
            .find(|o| o.handle.as_deref() == Some(identifier) || Some(o.id) == by_uuid)
            .cloned())
    }
}

// ---------------------------------------------------------------------------
// MemoryTaskDefinitionStore
// ---------------------------------------------------------------------------

/// In-memory definition store backed by a `BTreeMap<name, definition>`.
#[derive(Debug, Default)]
pub struct MemoryTaskDefinitionStore {
    definitions: Mutex<BTreeMap<String, TaskDefinition>>,
}

impl MemoryTaskDefinitionStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build a store pre-populated with `definitions`. Later duplicates win.
    pub fn with_definitions(definitions: impl IntoIterator<Item = TaskDefinition>) -> Self {
        let map = definitions
            .into_iter()
            .map(|d| (d.name.clone(), d))
            .collect();
        Self {
            definitions: Mutex::new(map),
        }
    }
}

#[async_trait]
impl TaskDefinitionStore for MemoryTaskDefinitionStore {
    async fn find(&self, name: &str) -> StorageResult<Option<TaskDefinition>> {
        Ok(self.definitions.lock().unwrap().get(name).cloned())
    }

    async fn list(&self) -> StorageResult<Vec<TaskDefinition>> {
        Ok(self.definitions.lock().unwrap().values().cloned().collect())
    }

    async fn install(&self, definition: TaskDefinition) -> StorageResult<()> {
        let mut definitions = self.definitions.lock().unwrap();
        if definitions.contains_key(&definition.name) {
            return Err(StorageError::DuplicateDefinition {
                name: definition.name,
            });
        }
        definitions.insert(definition.name.clone(), definition);
        Ok(())
    }

    async fn update(&self, definition: TaskDefinition) -> StorageResult<()> {
        let mut definitions = self.definitions.lock().unwrap();
        match definitions.get_mut(&definition.name) {
            Some(existing) => {
                *existing = definition;
                Ok(())
            }
            None => Err(StorageError::DefinitionNotFound {
                name: definition.name,
            }),
        }
    }

    async fn remove(&self, name: &str) -> StorageResult<bool> {
        Ok(self.definitions.lock().unwrap().remove(name).is_some())
    }
}

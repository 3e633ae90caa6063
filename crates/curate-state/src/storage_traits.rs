//! Storage trait definitions for the curation engine
//!
//! These traits define the collaborator contracts the curation layer calls
//! into:
//! - `ContentStore`: the Site / Community / Collection / Item / Bundle /
//!   Bitstream hierarchy
//! - `IdentifierResolver`: persistent identifier (handle or UUID) lookup
//! - `TaskDefinitionStore`: persisted task and selector definitions
//! - `TaskQueue`: deferred curation requests
//!
//! All traits are async and backend-agnostic. In-memory fakes are provided
//! for testing via the `fakes` module.

use std::fmt;
use std::str::FromStr;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use uuid::Uuid;

use crate::cursor::ObjectCursor;
use crate::error::StorageError;

/// Result type for storage operations
pub type StorageResult<T> = std::result::Result<T, StorageError>;

// ---------------------------------------------------------------------------
// Content model
// ---------------------------------------------------------------------------

/// Stable identifier of a content object.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct ObjectId(pub Uuid);

impl ObjectId {
    /// Generate a new random ObjectId
    pub fn new() -> Self {
        ObjectId(Uuid::new_v4())
    }
}

impl Default for ObjectId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for ObjectId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl FromStr for ObjectId {
    type Err = uuid::Error;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        Uuid::parse_str(s).map(ObjectId)
    }
}

/// Type discriminator for content objects.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ObjectType {
    Site,
    Community,
    Collection,
    Item,
    Bundle,
    Bitstream,
}

impl ObjectType {
    pub fn as_str(&self) -> &'static str {
        match self {
            ObjectType::Site => "site",
            ObjectType::Community => "community",
            ObjectType::Collection => "collection",
            ObjectType::Item => "item",
            ObjectType::Bundle => "bundle",
            ObjectType::Bitstream => "bitstream",
        }
    }

    /// Site, Community and Collection hold further curatable objects.
    pub fn is_container(&self) -> bool {
        matches!(
            self,
            ObjectType::Site | ObjectType::Community | ObjectType::Collection
        )
    }
}

impl fmt::Display for ObjectType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A single metadata value, addressed by `schema.element[.qualifier]`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MetadataValue {
    pub field: String,
    pub value: String,
    pub language: Option<String>,
}

impl MetadataValue {
    pub fn new(field: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            field: field.into(),
            value: value.into(),
            language: None,
        }
    }
}

/// A node of the content hierarchy.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ContentObject {
    pub id: ObjectId,
    pub object_type: ObjectType,
    /// Persistent identifier (handle), if one has been assigned
    pub handle: Option<String>,
    pub name: String,
    /// Owning container (or item for bundles)
    pub parent: Option<ObjectId>,
    pub metadata: Vec<MetadataValue>,
}

impl ContentObject {
    pub fn new(object_type: ObjectType, name: impl Into<String>) -> Self {
        Self {
            id: ObjectId::new(),
            object_type,
            handle: None,
            name: name.into(),
            parent: None,
            metadata: Vec::new(),
        }
    }

    pub fn with_handle(mut self, handle: impl Into<String>) -> Self {
        self.handle = Some(handle.into());
        self
    }

    pub fn with_parent(mut self, parent: ObjectId) -> Self {
        self.parent = Some(parent);
        self
    }

    pub fn with_metadata(mut self, field: impl Into<String>, value: impl Into<String>) -> Self {
        self.metadata.push(MetadataValue::new(field, value));
        self
    }

    /// Identifier used in logs and audit records: the handle when present,
    /// otherwise the type and UUID.
    pub fn label(&self) -> String {
        match &self.handle {
            Some(handle) => handle.clone(),
            None => format!("{} {}", self.object_type, self.id),
        }
    }

    /// All values of one metadata field, in stored order.
    pub fn metadata_values<'a>(&'a self, field: &'a str) -> impl Iterator<Item = &'a str> + 'a {
        self.metadata
            .iter()
            .filter(move |m| m.field == field)
            .map(|m| m.value.as_str())
    }

    pub fn has_metadata(&self, field: &str) -> bool {
        self.metadata
            .iter()
            .any(|m| m.field == field && !m.value.trim().is_empty())
    }
}

/// Stored description of a bitstream. The bytes live behind
/// [`ContentStore::retrieve`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BitstreamRecord {
    pub id: ObjectId,
    pub bundle: ObjectId,
    pub name: String,
    /// MIME type
    pub format: String,
    pub size_bytes: u64,
    /// Hex checksum recorded at ingest
    pub checksum: String,
    pub checksum_algorithm: String,
}

impl BitstreamRecord {
    /// Describe `data` with a SHA-256 checksum computed now.
    pub fn from_content(
        bundle: ObjectId,
        name: impl Into<String>,
        format: impl Into<String>,
        data: &[u8],
    ) -> Self {
        Self {
            id: ObjectId::new(),
            bundle,
            name: name.into(),
            format: format.into(),
            size_bytes: data.len() as u64,
            checksum: hex::encode(Sha256::digest(data)),
            checksum_algorithm: "SHA-256".to_string(),
        }
    }
}

// ---------------------------------------------------------------------------
// ContentStore: hierarchy access
// ---------------------------------------------------------------------------

/// Content hierarchy collaborator.
///
/// Guarantees:
/// - Child enumeration returns objects in the backend's natural (creation)
///   order.
/// - Every returned cursor releases its resources when closed or dropped.
#[async_trait]
pub trait ContentStore: Send + Sync {
    /// The repository root.
    async fn site(&self) -> StorageResult<ContentObject>;

    /// Look up any object by id.
    async fn find(&self, id: &ObjectId) -> StorageResult<Option<ContentObject>>;

    /// Communities directly below the site.
    async fn top_communities(&self) -> StorageResult<ObjectCursor>;

    /// Communities directly below a community.
    async fn sub_communities(&self, community: &ObjectId) -> StorageResult<ObjectCursor>;

    /// Collections directly below a community.
    async fn collections(&self, community: &ObjectId) -> StorageResult<ObjectCursor>;

    /// Items owned by a collection.
    async fn items(&self, collection: &ObjectId) -> StorageResult<ObjectCursor>;

    /// Bundles of an item.
    async fn bundles(&self, item: &ObjectId) -> StorageResult<ObjectCursor>;

    /// Bitstreams of a bundle.
    async fn bitstreams(&self, bundle: &ObjectId) -> StorageResult<Vec<BitstreamRecord>>;

    /// Bytes of a bitstream.
    async fn retrieve(&self, bitstream: &ObjectId) -> StorageResult<Vec<u8>>;

    /// Add an object to the hierarchy. Fails on a duplicate id or handle.
    async fn create(&self, object: ContentObject) -> StorageResult<ContentObject>;

    /// Store a bitstream and its content under an existing bundle.
    async fn add_bitstream(&self, record: BitstreamRecord, data: Vec<u8>) -> StorageResult<()>;

    /// Replace the metadata of an object.
    async fn update_metadata(
        &self,
        id: &ObjectId,
        metadata: Vec<MetadataValue>,
    ) -> StorageResult<()>;

    /// Make pending changes durable.
    async fn commit(&self) -> StorageResult<()>;
}

/// Persistent-identifier resolution collaborator.
#[async_trait]
pub trait IdentifierResolver: Send + Sync {
    /// Resolve a handle or UUID string to an object. `None` when the
    /// identifier does not name a content object.
    async fn resolve(&self, identifier: &str) -> StorageResult<Option<ContentObject>>;
}

// ---------------------------------------------------------------------------
// TaskDefinitionStore: persisted task definitions
// ---------------------------------------------------------------------------

/// How a task definition is turned into a runnable implementation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskKind {
    /// Compiled-in plugin, named by `load_ref`
    Native,
    /// Script evaluated by an engine registered for a language tag
    Scripted,
    /// Curation program source
    Program,
    /// Object selector plugin
    Selector,
}

impl TaskKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            TaskKind::Native => "native",
            TaskKind::Scripted => "scripted",
            TaskKind::Program => "program",
            TaskKind::Selector => "selector",
        }
    }
}

impl fmt::Display for TaskKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for TaskKind {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "native" => Ok(TaskKind::Native),
            "scripted" => Ok(TaskKind::Scripted),
            "program" => Ok(TaskKind::Program),
            "selector" => Ok(TaskKind::Selector),
            other => Err(format!("unknown task kind: {other}")),
        }
    }
}

/// Persisted task (or selector) definition.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TaskDefinition {
    /// Logical name, unique within the store
    pub name: String,
    #[serde(default)]
    pub description: Option<String>,
    pub kind: TaskKind,
    /// Plugin name, `language|constructor`, or program file path
    pub load_ref: String,
    /// Script or program body
    #[serde(default)]
    pub source: Option<String>,
    /// `key = value` lines
    #[serde(default)]
    pub config: Option<String>,
}

impl TaskDefinition {
    pub fn native(name: impl Into<String>, plugin: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            description: None,
            kind: TaskKind::Native,
            load_ref: plugin.into(),
            source: None,
            config: None,
        }
    }

    pub fn program(name: impl Into<String>, source: impl Into<String>) -> Self {
        let name = name.into();
        Self {
            load_ref: name.clone(),
            name,
            description: None,
            kind: TaskKind::Program,
            source: Some(source.into()),
            config: None,
        }
    }

    pub fn scripted(
        name: impl Into<String>,
        language: &str,
        constructor: &str,
        source: impl Into<String>,
    ) -> Self {
        Self {
            name: name.into(),
            description: None,
            kind: TaskKind::Scripted,
            load_ref: format!("{language}|{constructor}"),
            source: Some(source.into()),
            config: None,
        }
    }

    pub fn selector(name: impl Into<String>, plugin: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            description: None,
            kind: TaskKind::Selector,
            load_ref: plugin.into(),
            source: None,
            config: None,
        }
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }

    pub fn with_config(mut self, config: impl Into<String>) -> Self {
        self.config = Some(config.into());
        self
    }

    /// Parse the `config` blob as `key = value` lines. Blank lines and `#`
    /// comments are ignored, as are lines without `=`.
    pub fn config_pairs(&self) -> Vec<(String, String)> {
        let Some(config) = &self.config else {
            return Vec::new();
        };
        config
            .lines()
            .map(str::trim)
            .filter(|line| !line.is_empty() && !line.starts_with('#'))
            .filter_map(|line| {
                let (key, value) = line.split_once('=')?;
                Some((key.trim().to_string(), value.trim().to_string()))
            })
            .collect()
    }
}

/// Task definition store.
///
/// Semantics:
/// - Names are unique; `install` rejects an existing name.
/// - `update` replaces an existing definition and fails if absent.
/// - `list` returns definitions ordered by name.
#[async_trait]
pub trait TaskDefinitionStore: Send + Sync {
    async fn find(&self, name: &str) -> StorageResult<Option<TaskDefinition>>;

    async fn list(&self) -> StorageResult<Vec<TaskDefinition>>;

    async fn install(&self, definition: TaskDefinition) -> StorageResult<()>;

    async fn update(&self, definition: TaskDefinition) -> StorageResult<()>;

    /// Remove a definition. Returns whether one existed.
    async fn remove(&self, name: &str) -> StorageResult<bool>;
}

// ---------------------------------------------------------------------------
// TaskQueue: deferred curation requests
// ---------------------------------------------------------------------------

/// A deferred curation request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct QueueEntry {
    /// Acting user (e-mail or id), if any
    pub user: Option<String>,
    pub submitted_at: DateTime<Utc>,
    /// Task names, in the order they should run
    pub tasks: Vec<String>,
    /// Target identifier (handle, UUID, or workflow id)
    pub object_id: String,
}

impl QueueEntry {
    pub fn new(user: Option<String>, tasks: Vec<String>, object_id: impl Into<String>) -> Self {
        Self {
            user,
            submitted_at: Utc::now(),
            tasks,
            object_id: object_id.into(),
        }
    }
}

/// At-least-once queue of curation requests.
///
/// Semantics:
/// - `dequeue(queue, ticket)` claims every pending entry under `ticket`;
///   claimed entries are invisible to other dequeues.
/// - `release(queue, ticket, true)` deletes the claimed batch;
///   `release(queue, ticket, false)` returns it to pending.
#[async_trait]
pub trait TaskQueue: Send + Sync {
    async fn enqueue(&self, queue: &str, entry: QueueEntry) -> StorageResult<()>;

    async fn dequeue(&self, queue: &str, ticket: u64) -> StorageResult<Vec<QueueEntry>>;

    async fn release(&self, queue: &str, ticket: u64, remove: bool) -> StorageResult<()>;

    /// Names of queues that currently hold pending entries.
    async fn queue_names(&self) -> StorageResult<Vec<String>>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn label_prefers_handle() {
        let item = ContentObject::new(ObjectType::Item, "Thesis").with_handle("123456789/7");
        assert_eq!(item.label(), "123456789/7");

        let bare = ContentObject::new(ObjectType::Collection, "Theses");
        assert!(bare.label().starts_with("collection "));
    }

    #[test]
    fn has_metadata_ignores_blank_values() {
        let item = ContentObject::new(ObjectType::Item, "x")
            .with_metadata("dc.title", "   ")
            .with_metadata("dc.date.issued", "2001");
        assert!(!item.has_metadata("dc.title"));
        assert!(item.has_metadata("dc.date.issued"));
    }

    #[test]
    fn config_pairs_skip_comments_and_garbage() {
        let def = TaskDefinition::native("t", "noop")
            .with_config("# comment\nfields = dc.title, dc.type\n\nnot a pair\nlimit=3");
        assert_eq!(
            def.config_pairs(),
            vec![
                ("fields".to_string(), "dc.title, dc.type".to_string()),
                ("limit".to_string(), "3".to_string()),
            ]
        );
    }

    #[test]
    fn scripted_load_ref_carries_language_and_constructor() {
        let def = TaskDefinition::scripted("s", "rhai", "new_task()", "fn new_task() {}");
        assert_eq!(def.load_ref, "rhai|new_task()");
        assert_eq!(def.kind, TaskKind::Scripted);
    }

    #[test]
    fn bitstream_checksum_is_sha256() {
        let record =
            BitstreamRecord::from_content(ObjectId::new(), "a.txt", "text/plain", b"hello world");
        assert_eq!(
            record.checksum,
            "b94d27b9934d3e08a52e52d7da7dabfac484efe37a5380ee9088f7ace2efcde9"
        );
        assert_eq!(record.size_bytes, 11);
    }

    #[test]
    fn task_kind_parses_case_insensitively() {
        assert_eq!("Program".parse::<TaskKind>().unwrap(), TaskKind::Program);
        assert!("groovy".parse::<TaskKind>().is_err());
    }
}

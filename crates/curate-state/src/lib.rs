//! Curate-State: persistence layer for the curation engine
//!
//! This crate owns every collaborator the curation layer reads from or
//! writes to: the content hierarchy, persistent identifiers, task
//! definitions and deferred-request queues.
//!
//! ## Key Components
//!
//! - `storage_traits`: backend-agnostic async contracts
//! - `ObjectCursor`: closeable child enumeration
//! - `SurrealHandle`: connection management and task definition CRUD
//! - `SurrealContentStore` / `SurrealTaskDefinitionStore`: SurrealDB backends
//! - `FsTaskQueue`: file-backed deferred queue
//! - `MemoryTaskQueue`: process-local deferred queue
//! - `fakes`: in-memory implementations for tests

mod cursor;
mod error;
pub mod fakes;
mod fs_queue;
mod handle;
mod memory_queue;
mod migrations;
mod schema;
pub mod storage_traits;
mod surreal_content;
mod surreal_tasks;

pub use cursor::ObjectCursor;
pub use error::{StateError, StorageError};
pub use fs_queue::FsTaskQueue;
pub use handle::{CloudConfig, SurrealHandle};
pub use memory_queue::MemoryTaskQueue;
pub use storage_traits::{
    BitstreamRecord, ContentObject, ContentStore, IdentifierResolver, MetadataValue, ObjectId,
    ObjectType, QueueEntry, StorageResult, TaskDefinition, TaskDefinitionStore, TaskKind,
    TaskQueue,
};
pub use surreal_content::SurrealContentStore;
pub use surreal_tasks::SurrealTaskDefinitionStore;

/// Result type for connection and schema operations
pub type Result<T> = std::result::Result<T, StateError>;

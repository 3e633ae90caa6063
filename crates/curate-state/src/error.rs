//! Error types for curate-state

use thiserror::Error;

/// Errors raised by the SurrealDB connection and schema layer
#[derive(Error, Debug)]
pub enum StateError {
    /// Database connection error
    #[error("Database connection failed: {0}")]
    Connection(String),

    /// Database query error
    #[error("Database query failed: {0}")]
    Query(String),

    /// Serialization error
    #[error("Serialization failed: {0}")]
    Serialization(String),

    /// Deserialization error
    #[error("Deserialization failed: {0}")]
    Deserialization(String),

    /// Transaction failed
    #[error("Transaction failed: {0}")]
    Transaction(String),

    /// Schema setup error
    #[error("Schema setup failed: {0}")]
    SchemaSetup(String),
}

impl From<surrealdb::Error> for StateError {
    fn from(err: surrealdb::Error) -> Self {
        StateError::Query(err.to_string())
    }
}

impl From<serde_json::Error> for StateError {
    fn from(err: serde_json::Error) -> Self {
        StateError::Serialization(err.to_string())
    }
}

/// Errors returned through the storage traits
#[derive(Error, Debug)]
pub enum StorageError {
    /// A content object was not found
    #[error("object not found: {id}")]
    ObjectNotFound { id: String },

    /// A bitstream's content was not found
    #[error("bitstream content not found: {id}")]
    ContentNotFound { id: String },

    /// A task definition was not found
    #[error("task definition not found: {name}")]
    DefinitionNotFound { name: String },

    /// A task definition with this name already exists
    #[error("task definition already installed: {name}")]
    DuplicateDefinition { name: String },

    /// An object with this id or handle already exists
    #[error("object already exists: {id}")]
    DuplicateObject { id: String },

    /// The requested operation does not fit the object's type
    #[error("object {id} is a {actual}, expected {expected}")]
    WrongObjectType {
        id: String,
        actual: String,
        expected: String,
    },

    /// A queue ticket was not found or already released
    #[error("no claimed batch for ticket {ticket} on queue {queue}")]
    UnknownTicket { queue: String, ticket: u64 },

    /// Queue name contains characters that cannot be used on disk
    #[error("invalid queue name: {name}")]
    InvalidQueueName { name: String },

    /// Filesystem error
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    /// Serialization error
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Backend (database) error
    #[error("backend error: {0}")]
    Backend(String),
}

impl From<StateError> for StorageError {
    fn from(err: StateError) -> Self {
        StorageError::Backend(err.to_string())
    }
}

impl From<surrealdb::Error> for StorageError {
    fn from(err: surrealdb::Error) -> Self {
        StorageError::Backend(err.to_string())
    }
}

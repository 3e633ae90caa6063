//! Error taxonomy for the curation engine.

use curate_state::StorageError;

/// Curation errors.
#[derive(Debug, thiserror::Error)]
pub enum CurationError {
    /// Caller supplied an argument the operation cannot work with
    #[error("precondition failed: {0}")]
    Precondition(String),

    /// Storage failure while reading or writing the content hierarchy
    #[error("storage error: {0}")]
    Io(String),

    #[error("task {task} failed on {object}: {message}")]
    Task {
        task: String,
        object: String,
        message: String,
    },

    #[error("program compile error at line {line}: {message}")]
    Compile { line: usize, message: String },

    #[error("resolution failed: {0}")]
    Resolution(String),

    #[error("configuration error: {0}")]
    Config(String),

    #[error("resource error: {0}")]
    Resource(String),

    #[error("io error: {0}")]
    StdIo(#[from] std::io::Error),

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl From<StorageError> for CurationError {
    fn from(err: StorageError) -> Self {
        CurationError::Io(err.to_string())
    }
}

impl From<toml::de::Error> for CurationError {
    fn from(err: toml::de::Error) -> Self {
        CurationError::Config(err.to_string())
    }
}

/// Result type for curation operations.
pub type Result<T> = std::result::Result<T, CurationError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn storage_error_message_is_preserved() {
        let err: CurationError = StorageError::ObjectNotFound {
            id: "123456789/4".to_string(),
        }
        .into();
        assert!(matches!(err, CurationError::Io(_)));
        assert!(err.to_string().contains("object not found: 123456789/4"));
    }

    #[test]
    fn task_error_names_task_and_object() {
        let err = CurationError::Task {
            task: "checksum".to_string(),
            object: "123456789/9".to_string(),
            message: "boom".to_string(),
        };
        let msg = err.to_string();
        assert!(msg.contains("checksum"));
        assert!(msg.contains("123456789/9"));
    }
}

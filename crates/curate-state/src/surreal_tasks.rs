use std::sync::Arc;

use async_trait::async_trait;

use crate::error::StorageError;
use crate::storage_traits::{StorageResult, TaskDefinition, TaskDefinitionStore};
use crate::SurrealHandle;

/// SurrealDB-backed implementation of [`TaskDefinitionStore`].
#[derive(Clone)]
pub struct SurrealTaskDefinitionStore {
    handle: Arc<SurrealHandle>,
}

impl SurrealTaskDefinitionStore {
    pub fn new(handle: Arc<SurrealHandle>) -> Self {
        Self { handle }
    }
}

#[async_trait]
impl TaskDefinitionStore for SurrealTaskDefinitionStore {
    async fn find(&self, name: &str) -> StorageResult<Option<TaskDefinition>> {
        Ok(self.handle.get_definition(name).await?)
    }

    async fn list(&self) -> StorageResult<Vec<TaskDefinition>> {
        Ok(self.handle.list_definitions().await?)
    }

    async fn install(&self, definition: TaskDefinition) -> StorageResult<()> {
        if self.handle.get_definition(&definition.name).await?.is_some() {
            return Err(StorageError::DuplicateDefinition {
                name: definition.name,
            });
        }
        Ok(self.handle.save_definition(&definition).await?)
    }

    async fn update(&self, definition: TaskDefinition) -> StorageResult<()> {
        if self.handle.update_definition(&definition).await? {
            Ok(())
        } else {
            Err(StorageError::DefinitionNotFound {
                name: definition.name,
            })
        }
    }

    async fn remove(&self, name: &str) -> StorageResult<bool> {
        Ok(self.handle.delete_definition(name).await?)
    }
}

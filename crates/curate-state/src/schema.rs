//! Schema definitions for curation SurrealDB tables
//!
//! Tables:
//! - content_objects: Site / Community / Collection / Item / Bundle rows
//! - bitstreams: Bitstream descriptions and their (hex-encoded) content
//! - task_definitions: Persisted task and selector definitions

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::StorageError;
use crate::storage_traits::{
    BitstreamRecord, ContentObject, MetadataValue, ObjectId, ObjectType, TaskDefinition, TaskKind,
};

/// Module for serializing chrono DateTime to SurrealDB datetime format
mod surreal_datetime {
    use chrono::{DateTime, Utc};
    use serde::{self, Deserialize, Deserializer, Serializer};
    use surrealdb::sql::Datetime as SurrealDatetime;

    pub fn serialize<S>(date: &DateTime<Utc>, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        let sd = SurrealDatetime::from(*date);
        serde::Serialize::serialize(&sd, serializer)
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<DateTime<Utc>, D::Error>
    where
        D: Deserializer<'de>,
    {
        let sd = SurrealDatetime::deserialize(deserializer)?;
        Ok(DateTime::from(sd))
    }
}

fn parse_id(raw: &str) -> Result<ObjectId, StorageError> {
    Uuid::parse_str(raw)
        .map(ObjectId)
        .map_err(|e| StorageError::Backend(format!("corrupt object id {raw}: {e}")))
}

/// Row in `content_objects`
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ContentObjectRow {
    pub object_id: String,
    pub object_type: ObjectType,
    pub handle: Option<String>,
    pub name: String,
    pub parent_id: Option<String>,
    pub metadata: Vec<MetadataValue>,
    /// Insertion sequence; child enumeration orders by it
    pub seq: i64,
    #[serde(with = "surreal_datetime")]
    pub created_at: DateTime<Utc>,
}

impl ContentObjectRow {
    pub fn from_object(object: &ContentObject, seq: i64) -> Self {
        Self {
            object_id: object.id.to_string(),
            object_type: object.object_type,
            handle: object.handle.clone(),
            name: object.name.clone(),
            parent_id: object.parent.map(|p| p.to_string()),
            metadata: object.metadata.clone(),
            seq,
            created_at: Utc::now(),
        }
    }

    pub fn into_object(self) -> Result<ContentObject, StorageError> {
        Ok(ContentObject {
            id: parse_id(&self.object_id)?,
            object_type: self.object_type,
            handle: self.handle,
            name: self.name,
            parent: self.parent_id.as_deref().map(parse_id).transpose()?,
            metadata: self.metadata,
        })
    }
}

/// Row in `bitstreams`
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BitstreamRow {
    pub bitstream_id: String,
    pub bundle_id: String,
    pub name: String,
    pub format: String,
    pub size_bytes: u64,
    pub checksum: String,
    pub checksum_algorithm: String,
    pub content_hex: String,
    pub seq: i64,
    #[serde(with = "surreal_datetime")]
    pub created_at: DateTime<Utc>,
}

impl BitstreamRow {
    pub fn new(record: &BitstreamRecord, data: &[u8], seq: i64) -> Self {
        Self {
            bitstream_id: record.id.to_string(),
            bundle_id: record.bundle.to_string(),
            name: record.name.clone(),
            format: record.format.clone(),
            size_bytes: record.size_bytes,
            checksum: record.checksum.clone(),
            checksum_algorithm: record.checksum_algorithm.clone(),
            content_hex: hex::encode(data),
            seq,
            created_at: Utc::now(),
        }
    }

    pub fn to_record(&self) -> Result<BitstreamRecord, StorageError> {
        Ok(BitstreamRecord {
            id: parse_id(&self.bitstream_id)?,
            bundle: parse_id(&self.bundle_id)?,
            name: self.name.clone(),
            format: self.format.clone(),
            size_bytes: self.size_bytes,
            checksum: self.checksum.clone(),
            checksum_algorithm: self.checksum_algorithm.clone(),
        })
    }

    pub fn content(&self) -> Result<Vec<u8>, StorageError> {
        hex::decode(&self.content_hex).map_err(|e| {
            StorageError::Backend(format!(
                "corrupt content for bitstream {}: {e}",
                self.bitstream_id
            ))
        })
    }
}

/// Row in `task_definitions`
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TaskDefinitionRow {
    pub name: String,
    pub description: Option<String>,
    pub kind: TaskKind,
    pub load_ref: String,
    pub source: Option<String>,
    pub config: Option<String>,
    #[serde(with = "surreal_datetime")]
    pub updated_at: DateTime<Utc>,
}

impl From<TaskDefinition> for TaskDefinitionRow {
    fn from(definition: TaskDefinition) -> Self {
        Self {
            name: definition.name,
            description: definition.description,
            kind: definition.kind,
            load_ref: definition.load_ref,
            source: definition.source,
            config: definition.config,
            updated_at: Utc::now(),
        }
    }
}

impl From<TaskDefinitionRow> for TaskDefinition {
    fn from(row: TaskDefinitionRow) -> Self {
        Self {
            name: row.name,
            description: row.description,
            kind: row.kind,
            load_ref: row.load_ref,
            source: row.source,
            config: row.config,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn content_row_preserves_object() {
        let parent = ObjectId::new();
        let object = ContentObject::new(ObjectType::Item, "Thesis")
            .with_handle("123456789/5")
            .with_parent(parent)
            .with_metadata("dc.title", "On Curation");

        let back = ContentObjectRow::from_object(&object, 1)
            .into_object()
            .unwrap();
        assert_eq!(back, object);
    }

    #[test]
    fn corrupt_object_id_is_backend_error() {
        let mut row = ContentObjectRow::from_object(
            &ContentObject::new(ObjectType::Collection, "c"),
            1,
        );
        row.object_id = "not-a-uuid".to_string();
        assert!(matches!(
            row.into_object(),
            Err(StorageError::Backend(_))
        ));
    }

    #[test]
    fn bitstream_row_hex_encodes_content() {
        let record = BitstreamRecord::from_content(ObjectId::new(), "a.bin", "application/octet-stream", &[0, 255, 16]);
        let row = BitstreamRow::new(&record, &[0, 255, 16], 3);
        assert_eq!(row.content_hex, "00ff10");
        assert_eq!(row.content().unwrap(), vec![0, 255, 16]);
        assert_eq!(row.to_record().unwrap(), record);
    }
}

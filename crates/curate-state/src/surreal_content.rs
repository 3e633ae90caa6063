//! SurrealDB-backed content hierarchy
//!
//! Objects live in `content_objects` keyed by `object_id`; children are
//! enumerated by `parent_id` in insertion (`seq`) order. Bitstream bytes are
//! kept hex-encoded in `bitstreams`.

use std::sync::atomic::{AtomicI64, Ordering};

use async_trait::async_trait;
use serde::Deserialize;
use surrealdb::engine::any::Any;
use surrealdb::Surreal;
use tracing::{debug, info};

use crate::cursor::ObjectCursor;
use crate::error::StorageError;
use crate::schema::{BitstreamRow, ContentObjectRow};
use crate::storage_traits::{
    BitstreamRecord, ContentObject, ContentStore, IdentifierResolver, MetadataValue, ObjectId,
    ObjectType, StorageResult,
};
use crate::SurrealHandle;

fn backend(e: surrealdb::Error) -> StorageError {
    StorageError::Backend(e.to_string())
}

#[derive(Debug, Deserialize)]
struct SeqRow {
    seq: i64,
}

/// SurrealDB-backed implementation of [`ContentStore`] and
/// [`IdentifierResolver`].
pub struct SurrealContentStore {
    db: Surreal<Any>,
    site_id: ObjectId,
    next_seq: AtomicI64,
}

impl SurrealContentStore {
    /// Open the hierarchy on an existing connection, creating the site row
    /// (with `site_handle`) if the database has none yet.
    pub async fn open(handle: &SurrealHandle, site_handle: &str) -> StorageResult<Self> {
        let db = handle.db().clone();

        let mut res = db
            .query("SELECT seq FROM content_objects ORDER BY seq DESC LIMIT 1")
            .await
            .map_err(backend)?;
        let last: Vec<SeqRow> = res.take(0).map_err(backend)?;
        let next_seq = last.first().map(|r| r.seq + 1).unwrap_or(0);

        let mut store = Self {
            db,
            site_id: ObjectId::new(),
            next_seq: AtomicI64::new(next_seq),
        };

        let mut res = store
            .db
            .query("SELECT * FROM content_objects WHERE object_type = 'site' LIMIT 1")
            .await
            .map_err(backend)?;
        let sites: Vec<ContentObjectRow> = res.take(0).map_err(backend)?;

        match sites.into_iter().next() {
            Some(row) => {
                store.site_id = row.into_object()?.id;
                debug!(site = %store.site_id, "existing site found");
            }
            None => {
                let site =
                    ContentObject::new(ObjectType::Site, "Repository").with_handle(site_handle);
                store.site_id = site.id;
                store.insert_row(&site).await?;
                info!(site = %store.site_id, handle = site_handle, "site created");
            }
        }

        Ok(store)
    }

    pub fn site_id(&self) -> ObjectId {
        self.site_id
    }

    fn seq(&self) -> i64 {
        self.next_seq.fetch_add(1, Ordering::SeqCst)
    }

    async fn insert_row(&self, object: &ContentObject) -> StorageResult<()> {
        let row = ContentObjectRow::from_object(object, self.seq());
        let _created: Option<ContentObjectRow> = self
            .db
            .create("content_objects")
            .content(row)
            .await
            .map_err(backend)?;
        Ok(())
    }

    async fn select_objects(
        &self,
        sql: &'static str,
        key: &'static str,
        value: String,
    ) -> StorageResult<Vec<ContentObject>> {
        let mut res = self
            .db
            .query(sql)
            .bind((key, value))
            .await
            .map_err(backend)?;
        let rows: Vec<ContentObjectRow> = res.take(0).map_err(backend)?;
        rows.into_iter().map(ContentObjectRow::into_object).collect()
    }

    async fn children(&self, parent: &ObjectId, kind: ObjectType) -> StorageResult<ObjectCursor> {
        let mut res = self
            .db
            .query(
                "SELECT * FROM content_objects \
                 WHERE parent_id = $parent AND object_type = $kind ORDER BY seq ASC",
            )
            .bind(("parent", parent.to_string()))
            .bind(("kind", kind.as_str().to_string()))
            .await
            .map_err(backend)?;
        let rows: Vec<ContentObjectRow> = res.take(0).map_err(backend)?;
        let objects = rows
            .into_iter()
            .map(ContentObjectRow::into_object)
            .collect::<StorageResult<Vec<_>>>()?;
        Ok(ObjectCursor::new(objects))
    }

    async fn fetch_bitstream(&self, id: &ObjectId) -> StorageResult<BitstreamRow> {
        let mut res = self
            .db
            .query("SELECT * FROM bitstreams WHERE bitstream_id = $id")
            .bind(("id", id.to_string()))
            .await
            .map_err(backend)?;
        let rows: Vec<BitstreamRow> = res.take(0).map_err(backend)?;
        rows.into_iter()
            .next()
            .ok_or_else(|| StorageError::ContentNotFound { id: id.to_string() })
    }
}

#[async_trait]
impl ContentStore for SurrealContentStore {
    async fn site(&self) -> StorageResult<ContentObject> {
        self.find(&self.site_id)
            .await?
            .ok_or_else(|| StorageError::ObjectNotFound {
                id: self.site_id.to_string(),
            })
    }

    async fn find(&self, id: &ObjectId) -> StorageResult<Option<ContentObject>> {
        let found = self
            .select_objects(
                "SELECT * FROM content_objects WHERE object_id = $id",
                "id",
                id.to_string(),
            )
            .await?;
        Ok(found.into_iter().next())
    }

    async fn top_communities(&self) -> StorageResult<ObjectCursor> {
        self.children(&self.site_id, ObjectType::Community).await
    }

    async fn sub_communities(&self, community: &ObjectId) -> StorageResult<ObjectCursor> {
        self.children(community, ObjectType::Community).await
    }

    async fn collections(&self, community: &ObjectId) -> StorageResult<ObjectCursor> {
        self.children(community, ObjectType::Collection).await
    }

    async fn items(&self, collection: &ObjectId) -> StorageResult<ObjectCursor> {
        self.children(collection, ObjectType::Item).await
    }

    async fn bundles(&self, item: &ObjectId) -> StorageResult<ObjectCursor> {
        self.children(item, ObjectType::Bundle).await
    }

    async fn bitstreams(&self, bundle: &ObjectId) -> StorageResult<Vec<BitstreamRecord>> {
        let mut res = self
            .db
            .query("SELECT * FROM bitstreams WHERE bundle_id = $bundle ORDER BY seq ASC")
            .bind(("bundle", bundle.to_string()))
            .await
            .map_err(backend)?;
        let rows: Vec<BitstreamRow> = res.take(0).map_err(backend)?;
        rows.iter().map(BitstreamRow::to_record).collect()
    }

    async fn retrieve(&self, bitstream: &ObjectId) -> StorageResult<Vec<u8>> {
        self.fetch_bitstream(bitstream).await?.content()
    }

    async fn create(&self, object: ContentObject) -> StorageResult<ContentObject> {
        if self.find(&object.id).await?.is_some() {
            return Err(StorageError::DuplicateObject {
                id: object.label(),
            });
        }
        if let Some(handle) = &object.handle {
            if self.resolve(handle).await?.is_some() {
                return Err(StorageError::DuplicateObject {
                    id: handle.clone(),
                });
            }
        }

        self.insert_row(&object).await?;
        debug!(object = %object.label(), kind = %object.object_type, "object created");
        Ok(object)
    }

    async fn add_bitstream(&self, record: BitstreamRecord, data: Vec<u8>) -> StorageResult<()> {
        match self.find(&record.bundle).await? {
            Some(bundle) if bundle.object_type == ObjectType::Bundle => {}
            Some(other) => {
                return Err(StorageError::WrongObjectType {
                    id: record.bundle.to_string(),
                    actual: other.object_type.to_string(),
                    expected: ObjectType::Bundle.to_string(),
                })
            }
            None => {
                return Err(StorageError::ObjectNotFound {
                    id: record.bundle.to_string(),
                })
            }
        }

        let row = BitstreamRow::new(&record, &data, self.seq());
        let _created: Option<BitstreamRow> = self
            .db
            .create("bitstreams")
            .content(row)
            .await
            .map_err(backend)?;
        Ok(())
    }

    async fn update_metadata(
        &self,
        id: &ObjectId,
        metadata: Vec<MetadataValue>,
    ) -> StorageResult<()> {
        let mut res = self
            .db
            .query("UPDATE content_objects SET metadata = $metadata WHERE object_id = $id RETURN AFTER")
            .bind(("metadata", metadata))
            .bind(("id", id.to_string()))
            .await
            .map_err(backend)?;
        let updated: Vec<ContentObjectRow> = res.take(0).map_err(backend)?;
        if updated.is_empty() {
            return Err(StorageError::ObjectNotFound { id: id.to_string() });
        }
        Ok(())
    }

    async fn commit(&self) -> StorageResult<()> {
        // Each statement is its own transaction in SurrealDB; nothing is pending.
        debug!("commit");
        Ok(())
    }
}

#[async_trait]
impl IdentifierResolver for SurrealContentStore {
    async fn resolve(&self, identifier: &str) -> StorageResult<Option<ContentObject>> {
        let by_handle = self
            .select_objects(
                "SELECT * FROM content_objects WHERE handle = $handle",
                "handle",
                identifier.to_string(),
            )
            .await?;
        if let Some(found) = by_handle.into_iter().next() {
            return Ok(Some(found));
        }

        match identifier.parse::<ObjectId>() {
            Ok(id) => self.find(&id).await,
            Err(_) => Ok(None),
        }
    }
}

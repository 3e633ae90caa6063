//! SurrealDB schema migrations and initialization
//!
//! Sets up the content hierarchy, bitstream and task definition tables.
//! Every statement is a `DEFINE`, so running it again is harmless.

use crate::error::StateError;
use crate::Result;
use surrealdb::engine::any::Any;
use surrealdb::Surreal;
use tracing::{debug, info};

/// Initialize all curation tables in SurrealDB
pub async fn init_schema(db: &Surreal<Any>) -> Result<()> {
    info!("Initializing curation SurrealDB schema");

    init_content_objects_table(db).await?;
    init_bitstreams_table(db).await?;
    init_task_definitions_table(db).await?;

    info!("Curation schema initialization complete");
    Ok(())
}

/// Initialize `content_objects`
///
/// Schema:
/// ```text
/// TABLE content_objects {
///   object_id:    STRING (unique)
///   object_type:  STRING (site | community | collection | item | bundle)
///   handle:       STRING? (indexed; uniqueness enforced by the store)
///   name:         STRING
///   parent_id:    STRING? (indexed)
///   metadata:     ARRAY<OBJECT>
///   seq:          INT (insertion order)
///   created_at:   DATETIME
/// }
/// ```
async fn init_content_objects_table(db: &Surreal<Any>) -> Result<()> {
    debug!("Initializing content_objects table");

    let sql = r#"
        DEFINE TABLE content_objects SCHEMALESS;

        DEFINE INDEX idx_object_id ON TABLE content_objects COLUMNS object_id UNIQUE;
        DEFINE INDEX idx_handle ON TABLE content_objects COLUMNS handle;
        DEFINE INDEX idx_parent_type ON TABLE content_objects COLUMNS parent_id, object_type;
        DEFINE INDEX idx_object_type ON TABLE content_objects COLUMNS object_type;
    "#;

    db.query(sql)
        .await
        .map_err(|e| StateError::SchemaSetup(e.to_string()))?;
    Ok(())
}

/// Initialize `bitstreams`
///
/// Content is stored hex-encoded next to the descriptive fields; bundles
/// are small in the deployments this backend targets.
async fn init_bitstreams_table(db: &Surreal<Any>) -> Result<()> {
    debug!("Initializing bitstreams table");

    let sql = r#"
        DEFINE TABLE bitstreams SCHEMALESS;

        DEFINE INDEX idx_bitstream_id ON TABLE bitstreams COLUMNS bitstream_id UNIQUE;
        DEFINE INDEX idx_bundle_id ON TABLE bitstreams COLUMNS bundle_id;
    "#;

    db.query(sql)
        .await
        .map_err(|e| StateError::SchemaSetup(e.to_string()))?;
    Ok(())
}

/// Initialize `task_definitions`
async fn init_task_definitions_table(db: &Surreal<Any>) -> Result<()> {
    debug!("Initializing task_definitions table");

    let sql = r#"
        DEFINE TABLE task_definitions SCHEMAFULL;
        DEFINE FIELD name ON task_definitions TYPE string;
        DEFINE FIELD description ON task_definitions TYPE option<string>;
        DEFINE FIELD kind ON task_definitions TYPE string;
        DEFINE FIELD load_ref ON task_definitions TYPE string;
        DEFINE FIELD source ON task_definitions TYPE option<string>;
        DEFINE FIELD config ON task_definitions TYPE option<string>;
        DEFINE FIELD updated_at ON task_definitions TYPE datetime;
        DEFINE INDEX idx_definition_name ON task_definitions FIELDS name UNIQUE;
    "#;

    db.query(sql)
        .await
        .map_err(|e| StateError::SchemaSetup(e.to_string()))?;
    Ok(())
}

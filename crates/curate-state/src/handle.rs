//! SurrealDB Handle - Connection and Operations
//!
//! Manages the connection and provides task definition CRUD. The content
//! hierarchy lives in [`crate::SurrealContentStore`], which shares the
//! same connection.
//!
//! Supports in-memory, local (SurrealKV) and cloud (WebSocket) connections.

use std::path::Path;

use crate::error::StateError;
use crate::migrations;
use crate::schema::TaskDefinitionRow;
use crate::storage_traits::TaskDefinition;
use crate::Result;
use surrealdb::engine::any::Any;
use surrealdb::opt::auth::{Database, Root};
use surrealdb::Surreal;
use tracing::{debug, info, instrument};

const DEFAULT_NAMESPACE: &str = "curate";
const DEFAULT_DATABASE: &str = "main";

/// Configuration for SurrealDB Cloud connection
#[derive(Debug, Clone)]
pub struct CloudConfig {
    /// WebSocket endpoint URL (e.g., "wss://xxx.aws-use1.surrealdb.cloud")
    pub endpoint: String,
    pub username: String,
    pub password: String,
    /// Namespace (default: "curate")
    pub namespace: String,
    /// Database name (default: "main")
    pub database: String,
    /// Root user (true) or database user (false)
    pub is_root: bool,
}

impl CloudConfig {
    /// Configuration for a database user
    pub fn new(
        endpoint: impl Into<String>,
        username: impl Into<String>,
        password: impl Into<String>,
    ) -> Self {
        Self {
            endpoint: endpoint.into(),
            username: username.into(),
            password: password.into(),
            namespace: DEFAULT_NAMESPACE.to_string(),
            database: DEFAULT_DATABASE.to_string(),
            is_root: false,
        }
    }

    pub fn with_namespace(mut self, ns: impl Into<String>) -> Self {
        self.namespace = ns.into();
        self
    }

    pub fn with_database(mut self, db: impl Into<String>) -> Self {
        self.database = db.into();
        self
    }

    pub fn with_root(mut self, is_root: bool) -> Self {
        self.is_root = is_root;
        self
    }

    /// Create from environment variables
    ///
    /// Reads:
    /// - SURREALDB_ENDPOINT (required)
    /// - SURREALDB_USERNAME (required)
    /// - SURREALDB_PASSWORD (required)
    /// - SURREALDB_NAMESPACE (optional, default: "curate")
    /// - SURREALDB_DATABASE (optional, default: "main")
    /// - SURREALDB_ROOT (optional, default: "false")
    pub fn from_env() -> std::result::Result<Self, String> {
        let endpoint =
            std::env::var("SURREALDB_ENDPOINT").map_err(|_| "SURREALDB_ENDPOINT not set")?;
        let username =
            std::env::var("SURREALDB_USERNAME").map_err(|_| "SURREALDB_USERNAME not set")?;
        let password =
            std::env::var("SURREALDB_PASSWORD").map_err(|_| "SURREALDB_PASSWORD not set")?;
        let namespace =
            std::env::var("SURREALDB_NAMESPACE").unwrap_or_else(|_| DEFAULT_NAMESPACE.to_string());
        let database =
            std::env::var("SURREALDB_DATABASE").unwrap_or_else(|_| DEFAULT_DATABASE.to_string());
        let is_root = std::env::var("SURREALDB_ROOT")
            .map(|v| v.eq_ignore_ascii_case("true"))
            .unwrap_or(false);

        Ok(Self {
            endpoint,
            username,
            password,
            namespace,
            database,
            is_root,
        })
    }
}

/// SurrealDB connection handle for the curation engine
#[derive(Clone)]
pub struct SurrealHandle {
    db: Surreal<Any>,
}

impl SurrealHandle {
    /// Connect to SurrealDB in-memory and set up schema
    #[instrument(skip_all)]
    pub async fn setup_db() -> Result<Self> {
        info!("Connecting to SurrealDB (in-memory)");
        Self::connect_url("mem://").await
    }

    /// Connect to a SurrealKV database stored under `path`
    #[instrument(skip_all, fields(path = %path.as_ref().display()))]
    pub async fn setup_local(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        std::fs::create_dir_all(path).map_err(|e| {
            StateError::Connection(format!(
                "Failed to create database directory {}: {}",
                path.display(),
                e
            ))
        })?;
        Self::connect_url(&format!("surrealkv://{}", path.display())).await
    }

    async fn connect_url(url: &str) -> Result<Self> {
        let db = surrealdb::engine::any::connect(url)
            .await
            .map_err(|e| StateError::Connection(format!("Failed to connect to {}: {}", url, e)))?;

        db.use_ns(DEFAULT_NAMESPACE)
            .use_db(DEFAULT_DATABASE)
            .await
            .map_err(|e| StateError::Connection(e.to_string()))?;

        migrations::init_schema(&db).await?;
        debug!(url, "SurrealDB connected and schema initialized");
        Ok(SurrealHandle { db })
    }

    /// Connect to SurrealDB Cloud
    #[instrument(skip(config), fields(endpoint = %config.endpoint, namespace = %config.namespace, database = %config.database))]
    pub async fn setup_cloud(config: CloudConfig) -> Result<Self> {
        info!("Connecting to SurrealDB Cloud (root={})", config.is_root);

        let db = surrealdb::engine::any::connect(&config.endpoint)
            .await
            .map_err(|e| {
                StateError::Connection(format!("Failed to connect to {}: {}", config.endpoint, e))
            })?;

        if config.is_root {
            db.signin(Root {
                username: &config.username,
                password: &config.password,
            })
            .await
            .map_err(|e| StateError::Connection(format!("Root authentication failed: {}", e)))?;
        } else {
            db.signin(Database {
                namespace: &config.namespace,
                database: &config.database,
                username: &config.username,
                password: &config.password,
            })
            .await
            .map_err(|e| {
                StateError::Connection(format!("Database authentication failed: {}", e))
            })?;
        }

        db.use_ns(&config.namespace)
            .use_db(&config.database)
            .await
            .map_err(|e| {
                StateError::Connection(format!("Failed to select namespace/database: {}", e))
            })?;

        migrations::init_schema(&db).await?;

        info!("SurrealDB Cloud connected and schema initialized");
        Ok(SurrealHandle { db })
    }

    /// Connect using environment variables
    ///
    /// If SURREALDB_ENDPOINT is set, connects to cloud.
    /// If SURREALDB_URL is set, connects to that URL.
    /// Otherwise, falls back to in-memory.
    #[instrument(skip_all)]
    pub async fn setup_from_env() -> Result<Self> {
        if let Ok(config) = CloudConfig::from_env() {
            info!("Cloud config found, connecting to SurrealDB Cloud");
            return Self::setup_cloud(config).await;
        }

        if let Ok(url) = std::env::var("SURREALDB_URL") {
            info!("SURREALDB_URL found, connecting to {}", url);
            return Self::connect_url(&url).await;
        }

        info!("No cloud config found, using in-memory database");
        Self::setup_db().await
    }

    /// Connect to the SurrealKV database under `db_path` when one is given,
    /// otherwise as [`SurrealHandle::setup_from_env`] decides.
    pub async fn open(db_path: Option<&Path>) -> Result<Self> {
        match db_path {
            Some(path) => Self::setup_local(path).await,
            None => Self::setup_from_env().await,
        }
    }

    /// Underlying connection, shared by the stores built on this handle
    pub fn db(&self) -> &Surreal<Any> {
        &self.db
    }

    // ========== Task Definition Operations ==========

    /// Insert a new definition
    #[instrument(skip(self, definition), fields(name = %definition.name))]
    pub async fn save_definition(&self, definition: &TaskDefinition) -> Result<()> {
        debug!("Saving task definition");

        let row = TaskDefinitionRow::from(definition.clone());
        let created: Option<TaskDefinitionRow> =
            self.db.create("task_definitions").content(row).await?;

        created
            .map(|_| ())
            .ok_or_else(|| StateError::Transaction("Failed to create task definition".to_string()))
    }

    /// Get a definition by name
    #[instrument(skip(self))]
    pub async fn get_definition(&self, name: &str) -> Result<Option<TaskDefinition>> {
        let name_owned = name.to_string();

        let mut result = self
            .db
            .query("SELECT * FROM task_definitions WHERE name = $name")
            .bind(("name", name_owned))
            .await?;

        let rows: Vec<TaskDefinitionRow> = result.take(0)?;
        Ok(rows.into_iter().next().map(TaskDefinition::from))
    }

    /// List all definitions ordered by name
    #[instrument(skip(self))]
    pub async fn list_definitions(&self) -> Result<Vec<TaskDefinition>> {
        let mut result = self
            .db
            .query("SELECT * FROM task_definitions ORDER BY name ASC")
            .await?;

        let rows: Vec<TaskDefinitionRow> = result.take(0)?;
        Ok(rows.into_iter().map(TaskDefinition::from).collect())
    }

    /// Replace an existing definition. Returns whether a row was updated.
    #[instrument(skip(self, definition), fields(name = %definition.name))]
    pub async fn update_definition(&self, definition: &TaskDefinition) -> Result<bool> {
        let row = TaskDefinitionRow::from(definition.clone());
        let name_owned = definition.name.clone();

        let mut result = self
            .db
            .query("UPDATE task_definitions CONTENT $row WHERE name = $name")
            .bind(("row", row))
            .bind(("name", name_owned))
            .await?;

        let updated: Vec<TaskDefinitionRow> = result.take(0)?;
        Ok(!updated.is_empty())
    }

    /// Delete a definition. Returns whether one existed.
    #[instrument(skip(self))]
    pub async fn delete_definition(&self, name: &str) -> Result<bool> {
        let name_owned = name.to_string();

        let mut result = self
            .db
            .query("DELETE task_definitions WHERE name = $name RETURN BEFORE")
            .bind(("name", name_owned))
            .await?;

        let deleted: Vec<TaskDefinitionRow> = result.take(0)?;
        Ok(!deleted.is_empty())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn local_database_is_created_under_the_path() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("curate.db");
        let handle = SurrealHandle::open(Some(&path)).await.unwrap();
        assert!(path.is_dir());

        handle
            .save_definition(&TaskDefinition::native("verify", "checksum"))
            .await
            .unwrap();
        let found = handle.get_definition("verify").await.unwrap().unwrap();
        assert_eq!(found.load_ref, "checksum");
    }

    #[test]
    fn cloud_config_defaults() {
        let config = CloudConfig::new("wss://db.example.org", "curator", "secret");
        assert_eq!(config.namespace, "curate");
        assert_eq!(config.database, "main");
        assert!(!config.is_root);

        let config = config.with_namespace("ns").with_database("db").with_root(true);
        assert_eq!(config.namespace, "ns");
        assert_eq!(config.database, "db");
        assert!(config.is_root);
    }
}

//! Curation configuration.
//!
//! Loaded from TOML:
//!
//! ```toml
//! reporter = "-"
//! cache_limit = 500
//! transaction_scope = "object"
//! invoked = "batch"
//!
//! [queue]
//! kind = "fs"
//! path = "/var/lib/curate/queues"
//!
//! [recorder]
//! kind = "journal"
//! path = "/var/log/curate/audit.jsonl"
//! codes = "%FAIL %ERROR"
//!
//! [selectors]
//! theses = "collection-items:123456789/7"
//!
//! [tasks.required-metadata]
//! fields = "dc.title,dc.contributor.author"
//!
//! [[definitions]]
//! name = "verify"
//! kind = "native"
//! load_ref = "checksum"
//! ```

use std::collections::BTreeMap;
use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::{Arc, OnceLock};

use curate_state::{FsTaskQueue, MemoryTaskQueue, TaskDefinition, TaskDefinitionStore, TaskQueue};
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::curator::{Curator, TxScope};
use crate::descriptor::Invoked;
use crate::error::{CurationError, Result};
use crate::plugins::PluginRegistry;
use crate::properties::PropertySource;
use crate::recorder::{JournalRecorder, RecorderFactory, TracingRecorder};
use crate::reporter::reporter_for;
use crate::resource::ManagedResource;
use crate::selector::SelectorResolver;
use crate::status::StatusSet;

/// Environment variable naming the configuration file.
pub const CONFIG_ENV: &str = "CURATE_CONFIG";

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum QueueKind {
    #[default]
    None,
    Memory,
    Fs,
}

/// The queue built from a [`QueueConfig`]; every clone of the config
/// hands out the same instance.
#[derive(Clone, Default)]
struct SharedQueue(Arc<OnceLock<Arc<dyn TaskQueue>>>);

impl fmt::Debug for SharedQueue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SharedQueue")
            .field("built", &self.0.get().is_some())
            .finish()
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct QueueConfig {
    pub kind: QueueKind,
    /// Root directory of the filesystem queue
    pub path: Option<PathBuf>,
    #[serde(skip)]
    built: SharedQueue,
}

impl QueueConfig {
    /// The configured queue, built on first use and shared afterwards.
    pub fn build(&self) -> Result<Option<Arc<dyn TaskQueue>>> {
        if let Some(queue) = self.built.0.get() {
            return Ok(Some(queue.clone()));
        }
        let queue: Arc<dyn TaskQueue> = match self.kind {
            QueueKind::None => return Ok(None),
            QueueKind::Memory => Arc::new(MemoryTaskQueue::new()),
            QueueKind::Fs => {
                let path = self.path.as_ref().ok_or_else(|| {
                    CurationError::Config("queue.kind = \"fs\" needs queue.path".to_string())
                })?;
                Arc::new(FsTaskQueue::new(path)?)
            }
        };
        Ok(Some(self.built.0.get_or_init(|| queue).clone()))
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RecorderKind {
    #[default]
    Tracing,
    Journal,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RecorderConfig {
    pub kind: RecorderKind,
    /// Journal file
    pub path: Option<PathBuf>,
    /// Only record these status codes
    pub codes: Option<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct CurationConfig {
    /// Reporter spec: `-`, `tracing`, or a file path
    pub reporter: Option<String>,
    pub cache_limit: Option<usize>,
    pub transaction_scope: TxScope,
    pub invoked: Option<Invoked>,
    pub queue: QueueConfig,
    pub recorder: RecorderConfig,
    /// Selector profiles, `name = "kind[:initializer]"`
    pub selectors: BTreeMap<String, String>,
    /// Task properties, `[tasks.<task>] <property> = value`
    pub tasks: BTreeMap<String, BTreeMap<String, toml::Value>>,
    /// Definitions installed (or updated) at startup
    pub definitions: Vec<TaskDefinition>,
}

impl CurationConfig {
    /// Load from `path`, or from `$CURATE_CONFIG` when no path is given.
    /// A missing file yields the defaults.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let path = match path {
            Some(path) => Some(path.to_path_buf()),
            None => std::env::var(CONFIG_ENV).ok().map(PathBuf::from),
        };
        let Some(path) = path else {
            debug!("no configuration file given, using defaults");
            return Ok(Self::default());
        };
        if !path.exists() {
            debug!(path = %path.display(), "configuration file not found, using defaults");
            return Ok(Self::default());
        }
        let text = std::fs::read_to_string(&path)?;
        let config = Self::from_toml_str(&text)?;
        info!(path = %path.display(), "configuration loaded");
        Ok(config)
    }

    pub fn from_toml_str(text: &str) -> Result<Self> {
        Ok(toml::from_str(text)?)
    }

    /// Apply reporter, cache limit, scope, invocation mode, properties,
    /// recorder and queue settings to `curator`.
    pub fn configure_curator(&self, curator: &mut Curator) -> Result<()> {
        if let Some(spec) = &self.reporter {
            curator.set_reporter(reporter_for(spec)?);
        }
        if let Some(limit) = self.cache_limit {
            curator.set_cache_limit(limit);
        }
        curator.set_transaction_scope(self.transaction_scope);
        if let Some(mode) = self.invoked {
            curator.set_invoked(mode);
        }
        curator.set_properties(Arc::new(self.clone()));
        curator.set_recorder_factory(self.recorder_factory()?);

        if self.queue.kind != QueueKind::None {
            let queue = self.queue.clone();
            curator.set_queue_factory(move || {
                queue.build()?.ok_or_else(|| {
                    CurationError::Config("no task queue configured".to_string())
                })
            });
        }
        Ok(())
    }

    pub fn build_queue(&self) -> Result<Option<Arc<dyn TaskQueue>>> {
        self.queue.build()
    }

    /// The configured queue when requests must outlive this process, as
    /// for deferred runs and separate drainers.
    pub fn durable_queue(&self) -> Result<Arc<dyn TaskQueue>> {
        match self.queue.kind {
            QueueKind::None => Err(CurationError::Config(
                "no task queue configured; set [queue] in the configuration".to_string(),
            )),
            QueueKind::Memory => Err(CurationError::Config(
                "queue.kind = \"memory\" does not outlive the process; use kind = \"fs\""
                    .to_string(),
            )),
            QueueKind::Fs => self.build_queue()?.ok_or_else(|| {
                CurationError::Config("no task queue configured".to_string())
            }),
        }
    }

    pub fn recorder_factory(&self) -> Result<RecorderFactory> {
        let filter = self
            .recorder
            .codes
            .as_deref()
            .map(StatusSet::parse)
            .transpose()
            .map_err(CurationError::Config)?;

        let factory: RecorderFactory = match self.recorder.kind {
            RecorderKind::Tracing => Arc::new(move || {
                Ok(Arc::new(TracingRecorder::with_filter(filter)) as Arc<dyn ManagedResource>)
            }),
            RecorderKind::Journal => {
                let path = self.recorder.path.clone().ok_or_else(|| {
                    CurationError::Config(
                        "recorder.kind = \"journal\" needs recorder.path".to_string(),
                    )
                })?;
                Arc::new(move || {
                    Ok(Arc::new(JournalRecorder::open(&path, filter)?) as Arc<dyn ManagedResource>)
                })
            }
        };
        Ok(factory)
    }

    pub fn selector_resolver(&self, plugins: Arc<PluginRegistry>) -> SelectorResolver {
        SelectorResolver::new(self.selectors.clone(), plugins)
    }

    /// Install every configured definition, replacing existing ones of the
    /// same name. Returns how many were written.
    pub async fn install_definitions(&self, store: &dyn TaskDefinitionStore) -> Result<usize> {
        for definition in &self.definitions {
            if store.find(&definition.name).await?.is_some() {
                store.update(definition.clone()).await?;
            } else {
                store.install(definition.clone()).await?;
            }
            debug!(task = %definition.name, "definition installed");
        }
        Ok(self.definitions.len())
    }
}

impl PropertySource for CurationConfig {
    fn property(&self, key: &str) -> Option<String> {
        let (task, property) = key.split_once('.')?;
        let value = self.tasks.get(task)?.get(property)?;
        Some(match value {
            toml::Value::String(s) => s.clone(),
            other => other.to_string(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::status::Status;
    use curate_state::fakes::MemoryTaskDefinitionStore;
    use curate_state::TaskKind;

    const SAMPLE: &str = r#"
reporter = "tracing"
cache_limit = 50
transaction_scope = "object"
invoked = "batch"

[queue]
kind = "memory"

[recorder]
codes = "%FAIL"

[selectors]
theses = "collection-items:123456789/7"

[tasks.required-metadata]
fields = "dc.title"

[tasks.checksum]
retries = 3

[[definitions]]
name = "verify"
kind = "native"
load_ref = "checksum"

[[definitions]]
name = "fixity"
kind = "program"
load_ref = "fixity"
source = "verify\n"
"#;

    #[test]
    fn parses_full_config() {
        let config = CurationConfig::from_toml_str(SAMPLE).unwrap();
        assert_eq!(config.cache_limit, Some(50));
        assert_eq!(config.transaction_scope, TxScope::Object);
        assert_eq!(config.invoked, Some(Invoked::Batch));
        assert_eq!(config.queue.kind, QueueKind::Memory);
        assert_eq!(config.definitions.len(), 2);
        assert_eq!(config.definitions[1].kind, TaskKind::Program);
        assert_eq!(
            config.property("required-metadata.fields").as_deref(),
            Some("dc.title")
        );
        assert_eq!(config.property("checksum.retries").as_deref(), Some("3"));
        assert!(config.property("checksum.missing").is_none());
        assert!(config.property("no-dot").is_none());
    }

    #[test]
    fn empty_config_uses_defaults() {
        let config = CurationConfig::from_toml_str("").unwrap();
        assert_eq!(config.transaction_scope, TxScope::Open);
        assert_eq!(config.queue.kind, QueueKind::None);
        assert!(config.build_queue().unwrap().is_none());
        assert!(config.recorder_factory().is_ok());
    }

    #[test]
    fn malformed_toml_is_a_config_error() {
        let err = CurationConfig::from_toml_str("cache_limit = \"many\"").unwrap_err();
        assert!(matches!(err, CurationError::Config(_)));
    }

    #[test]
    fn missing_file_yields_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let config = CurationConfig::load(Some(&dir.path().join("absent.toml"))).unwrap();
        assert!(config.definitions.is_empty());
    }

    #[test]
    fn journal_recorder_needs_a_path() {
        let mut config = CurationConfig::default();
        config.recorder.kind = RecorderKind::Journal;
        assert!(config.recorder_factory().is_err());

        let dir = tempfile::tempdir().unwrap();
        config.recorder.path = Some(dir.path().join("audit.jsonl"));
        config.recorder.codes = Some("%FAIL %ERROR".to_string());
        let factory = config.recorder_factory().unwrap();
        let recorder = factory().unwrap().as_recorder().unwrap();
        recorder
            .record(&crate::recorder::AuditRecord {
                timestamp: chrono::Utc::now(),
                object_id: "123456789/2".to_string(),
                user: None,
                task: "verify".to_string(),
                record_type: "audit".to_string(),
                record_value: "fixity".to_string(),
                status: Status::Fail,
                result: None,
            })
            .unwrap();
    }

    #[tokio::test]
    async fn memory_queue_is_shared_with_configured_curators() {
        use curate_state::fakes::MemoryContentStore;

        use crate::context::CurationContext;
        use crate::resolver::TaskResolver;

        let store = Arc::new(MemoryContentStore::new());
        let ctx = CurationContext::from_backend(store);
        let config = CurationConfig::from_toml_str("[queue]\nkind = \"memory\"\n").unwrap();
        let mut curator = Curator::new(TaskResolver::new(Arc::new(
            MemoryTaskDefinitionStore::with_definitions([TaskDefinition::native("noop", "noop")]),
        )));
        config.configure_curator(&mut curator).unwrap();
        curator.add_task("noop").await;
        curator.queue(&ctx, "123456789/1", "q").await.unwrap();

        let drained = config.clone().build_queue().unwrap().unwrap();
        assert_eq!(drained.queue_names().await.unwrap(), vec!["q"]);
    }

    #[test]
    fn only_fs_queues_are_durable() {
        let memory = CurationConfig::from_toml_str("[queue]\nkind = \"memory\"\n").unwrap();
        assert!(matches!(memory.durable_queue(), Err(CurationError::Config(_))));
        assert!(CurationConfig::default().durable_queue().is_err());

        let dir = tempfile::tempdir().unwrap();
        let mut fs = CurationConfig::default();
        fs.queue.kind = QueueKind::Fs;
        fs.queue.path = Some(dir.path().to_path_buf());
        let first = fs.durable_queue().unwrap();
        let second = fs.build_queue().unwrap().unwrap();
        assert!(Arc::ptr_eq(&first, &second));
    }

    #[test]
    fn fs_queue_needs_a_path() {
        let mut config = CurationConfig::default();
        config.queue.kind = QueueKind::Fs;
        assert!(config.build_queue().is_err());
    }

    #[tokio::test]
    async fn install_definitions_replaces_existing() {
        let store = MemoryTaskDefinitionStore::with_definitions([TaskDefinition::native(
            "verify", "noop",
        )]);
        let config = CurationConfig::from_toml_str(SAMPLE).unwrap();
        assert_eq!(config.install_definitions(&store).await.unwrap(), 2);
        let verify = store.find("verify").await.unwrap().unwrap();
        assert_eq!(verify.load_ref, "checksum");
        assert!(store.find("fixity").await.unwrap().is_some());
    }
}

//! Curate core library
//!
//! Curation engine for a Site / Community / Collection / Item content
//! hierarchy: task resolution, curation programs, hierarchy walks with
//! commit and cache policies, single-task sessions, object selectors and
//! queued (batch) curation.

pub mod config;
pub mod context;
pub mod curator;
pub mod descriptor;
pub mod error;
pub mod metrics;
pub mod obs;
pub mod plugins;
pub mod program;
pub mod properties;
pub mod queue;
pub mod recorder;
pub mod reporter;
pub mod resolved;
pub mod resolver;
pub mod resource;
pub mod script;
pub mod selector;
pub mod session;
pub mod status;
pub mod task;
pub mod tasks;
pub mod telemetry;

pub use config::{CurationConfig, QueueConfig, QueueKind, RecorderConfig, RecorderKind};
pub use context::CurationContext;
pub use curator::{Curator, QueueFactory, TxScope};
pub use descriptor::{Invoked, RecordRule, SuspendPolicy, TaskDescriptor};
pub use error::{CurationError, Result};
pub use plugins::{NativeFactory, PluginRegistry, SelectorFactory};
pub use program::Program;
pub use properties::{MapProperties, OverlayProperties, PropertySource};
pub use queue::{CuratorSetup, DrainSummary, QueueDriver};
pub use recorder::{
    AuditRecord, JournalRecorder, MemoryRecorder, Recorder, RecorderFactory, TracingRecorder,
    RECORDER_KEY,
};
pub use reporter::{reporter_for, FileReporter, MemoryReporter, Reporter, StdoutReporter, TracingReporter};
pub use resolved::{ResolvedTask, TaskFactory};
pub use resolver::TaskResolver;
pub use resource::{ManagedResource, ReleasePolicy, ResourceRegistry};
pub use script::{ScriptEngine, ScriptEngines, ScriptedTask};
pub use selector::{CollectionItemsSelector, ObjectListSelector, ObjectSelector, SelectorResolver};
pub use session::CurationSession;
pub use status::{Status, StatusSet};
pub use task::{CurationTask, TaskContext, TaskSetup};

pub use curate_state::{
    ContentObject, ContentStore, IdentifierResolver, ObjectId, ObjectType, QueueEntry,
    TaskDefinition, TaskDefinitionStore, TaskKind, TaskQueue,
};

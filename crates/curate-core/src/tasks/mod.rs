//! Built-in curation tasks.

mod checksum;
mod metadata;
mod profile;

use async_trait::async_trait;
use curate_state::ContentObject;

pub use checksum::ChecksumTask;
pub use metadata::{MetadataWhitespaceTask, RequiredMetadataTask};
pub use profile::FormatProfileTask;

use crate::descriptor::TaskDescriptor;
use crate::error::Result;
use crate::plugins::PluginRegistry;
use crate::status::Status;
use crate::task::{CurationTask, TaskContext};

pub(crate) fn register_builtins(registry: &mut PluginRegistry) {
    registry.register_task("noop", TaskDescriptor::new(), NoopTask::default);
    registry.register_task("checksum", TaskDescriptor::new(), ChecksumTask::default);
    registry.register_task(
        "required-metadata",
        TaskDescriptor::new(),
        RequiredMetadataTask::default,
    );
    registry.register_task(
        "metadata-whitespace",
        TaskDescriptor::new().mutative(),
        MetadataWhitespaceTask::default,
    );
    registry.register_task(
        "profile-formats",
        TaskDescriptor::new().distributive(),
        FormatProfileTask::default,
    );
}

/// Reports each object it sees and succeeds.
#[derive(Debug, Default)]
pub struct NoopTask;

#[async_trait]
impl CurationTask for NoopTask {
    async fn perform(&mut self, cx: &mut TaskContext<'_>, dso: &ContentObject) -> Result<Status> {
        cx.report(&format!("{}: {}", cx.name(), dso.label()))?;
        cx.set_result(format!("visited {}", dso.label()));
        Ok(Status::Success)
    }
}

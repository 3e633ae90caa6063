//! Draining queued curation requests.

use std::sync::Arc;

use chrono::Utc;
use curate_state::{ContentStore, IdentifierResolver, QueueEntry, TaskQueue};
use serde::Serialize;
use tracing::{info, warn};

use crate::context::CurationContext;
use crate::curator::Curator;
use crate::descriptor::Invoked;
use crate::error::Result;
use crate::obs;
use crate::resolver::TaskResolver;

/// Applied to every Curator the driver creates (reporter, scope, limits).
pub type CuratorSetup = Arc<dyn Fn(&mut Curator) -> Result<()> + Send + Sync>;

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DrainSummary {
    pub queue: String,
    pub ticket: u64,
    pub entries: usize,
    pub failed: usize,
}

pub struct QueueDriver {
    resolver: TaskResolver,
    queue: Arc<dyn TaskQueue>,
    store: Arc<dyn ContentStore>,
    identifiers: Arc<dyn IdentifierResolver>,
    setup: Option<CuratorSetup>,
}

impl QueueDriver {
    pub fn new(
        resolver: TaskResolver,
        queue: Arc<dyn TaskQueue>,
        store: Arc<dyn ContentStore>,
        identifiers: Arc<dyn IdentifierResolver>,
    ) -> Self {
        Self {
            resolver,
            queue,
            store,
            identifiers,
            setup: None,
        }
    }

    pub fn from_backend<B>(resolver: TaskResolver, queue: Arc<dyn TaskQueue>, backend: Arc<B>) -> Self
    where
        B: ContentStore + IdentifierResolver + 'static,
    {
        Self::new(resolver, queue, backend.clone(), backend)
    }

    pub fn with_setup(mut self, setup: CuratorSetup) -> Self {
        self.setup = Some(setup);
        self
    }

    /// Claim every pending entry of `queue_name` and curate them in order,
    /// each with a new Curator acting as the entry's user. The batch is
    /// removed when every entry succeeded and returned to the queue
    /// otherwise.
    pub async fn drain(&self, queue_name: &str) -> Result<DrainSummary> {
        let ticket = Utc::now().timestamp_millis().max(0) as u64;
        let entries = self.queue.dequeue(queue_name, ticket).await?;

        let mut failed = 0;
        for entry in &entries {
            if let Err(e) = self.run_entry(entry).await {
                warn!(
                    queue = queue_name,
                    object = %entry.object_id,
                    error = %e,
                    "queued curation failed"
                );
                failed += 1;
            }
        }

        if !entries.is_empty() {
            self.queue.release(queue_name, ticket, failed == 0).await?;
        }
        obs::emit_queue_drained(queue_name, ticket, entries.len(), failed);
        Ok(DrainSummary {
            queue: queue_name.to_string(),
            ticket,
            entries: entries.len(),
            failed,
        })
    }

    /// Drain every queue that currently holds pending entries.
    pub async fn drain_all(&self) -> Result<Vec<DrainSummary>> {
        let mut summaries = Vec::new();
        for name in self.queue.queue_names().await? {
            summaries.push(self.drain(&name).await?);
        }
        info!(queues = summaries.len(), "queues drained");
        Ok(summaries)
    }

    async fn run_entry(&self, entry: &QueueEntry) -> Result<()> {
        let mut ctx = CurationContext::new(self.store.clone(), self.identifiers.clone())
            .with_user(entry.user.clone());
        let mut curator = Curator::new(self.resolver.clone());
        curator.set_invoked(Invoked::Batch);
        if let Some(setup) = &self.setup {
            setup(&mut curator)?;
        }
        for task in &entry.tasks {
            curator.add_task(task).await;
        }
        let outcome = curator.curate_id(&mut ctx, &entry.object_id).await;
        curator.complete();
        outcome
    }
}

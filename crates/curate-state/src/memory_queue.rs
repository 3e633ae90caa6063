use std::collections::{BTreeMap, HashMap};
use std::sync::{Mutex, MutexGuard, PoisonError};

use async_trait::async_trait;

use crate::error::StorageError;
use crate::storage_traits::{QueueEntry, StorageResult, TaskQueue};

#[derive(Debug, Default)]
struct QueueState {
    pending: Vec<QueueEntry>,
    claimed: HashMap<u64, Vec<QueueEntry>>,
}

/// Process-local task queue keyed by queue name.
///
/// Entries live only as long as the queue value; producers and drainers
/// must share the same instance.
#[derive(Debug, Default)]
pub struct MemoryTaskQueue {
    queues: Mutex<BTreeMap<String, QueueState>>,
}

impl MemoryTaskQueue {
    pub fn new() -> Self {
        Self::default()
    }

    fn state(&self) -> MutexGuard<'_, BTreeMap<String, QueueState>> {
        self.queues.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Pending (unclaimed) entry count for a queue.
    pub fn pending(&self, queue: &str) -> usize {
        self.state().get(queue).map(|q| q.pending.len()).unwrap_or(0)
    }
}

#[async_trait]
impl TaskQueue for MemoryTaskQueue {
    async fn enqueue(&self, queue: &str, entry: QueueEntry) -> StorageResult<()> {
        self.state()
            .entry(queue.to_string())
            .or_default()
            .pending
            .push(entry);
        Ok(())
    }

    async fn dequeue(&self, queue: &str, ticket: u64) -> StorageResult<Vec<QueueEntry>> {
        let mut queues = self.state();
        let Some(state) = queues.get_mut(queue) else {
            return Ok(Vec::new());
        };
        let batch = std::mem::take(&mut state.pending);
        if !batch.is_empty() {
            state.claimed.entry(ticket).or_default().extend(batch.clone());
        }
        Ok(batch)
    }

    async fn release(&self, queue: &str, ticket: u64, remove: bool) -> StorageResult<()> {
        let mut queues = self.state();
        let batch = queues
            .get_mut(queue)
            .and_then(|state| state.claimed.remove(&ticket))
            .ok_or_else(|| StorageError::UnknownTicket {
                queue: queue.to_string(),
                ticket,
            })?;
        if !remove {
            if let Some(state) = queues.get_mut(queue) {
                state.pending.extend(batch);
            }
        }
        Ok(())
    }

    async fn queue_names(&self) -> StorageResult<Vec<String>> {
        Ok(self
            .state()
            .iter()
            .filter(|(_, state)| !state.pending.is_empty())
            .map(|(name, _)| name.clone())
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn returned_batch_is_pending_again() {
        let queue = MemoryTaskQueue::new();
        queue
            .enqueue("q", QueueEntry::new(None, vec!["noop".into()], "123456789/1"))
            .await
            .unwrap();
        assert_eq!(queue.dequeue("q", 7).await.unwrap().len(), 1);
        assert_eq!(queue.pending("q"), 0);
        queue.release("q", 7, false).await.unwrap();
        assert_eq!(queue.pending("q"), 1);
        assert_eq!(queue.queue_names().await.unwrap(), vec!["q"]);
    }
}

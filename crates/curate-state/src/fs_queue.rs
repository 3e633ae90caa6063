use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};

use async_trait::async_trait;
use tempfile::NamedTempFile;
use tracing::debug;

use crate::error::StorageError;
use crate::storage_traits::{QueueEntry, StorageResult, TaskQueue};

/// Filesystem-backed task queue.
///
/// Layout:
/// - `<root>/<queue>/pending/<sequence>-<uuid>.json` for unclaimed entries
/// - `<root>/<queue>/claimed/<ticket>/...` for entries claimed by a ticket
///
/// File names sort in submission order, so a claimed batch preserves the
/// order entries were enqueued in.
pub struct FsTaskQueue {
    root: PathBuf,
}

impl FsTaskQueue {
    /// Create a queue rooted at `root`. Creates the directory if needed.
    pub fn new(root: impl AsRef<Path>) -> StorageResult<Self> {
        fs::create_dir_all(root.as_ref())?;
        Ok(Self {
            root: root.as_ref().to_path_buf(),
        })
    }

    fn queue_dir(&self, queue: &str) -> StorageResult<PathBuf> {
        let valid = !queue.is_empty()
            && !queue.starts_with('.')
            && queue
                .chars()
                .all(|c| c.is_ascii_alphanumeric() || matches!(c, '-' | '_' | '.'));
        if !valid {
            return Err(StorageError::InvalidQueueName {
                name: queue.to_string(),
            });
        }
        Ok(self.root.join(queue))
    }

    fn pending_dir(&self, queue: &str) -> StorageResult<PathBuf> {
        Ok(self.queue_dir(queue)?.join("pending"))
    }

    fn claimed_dir(&self, queue: &str, ticket: u64) -> StorageResult<PathBuf> {
        Ok(self.queue_dir(queue)?.join("claimed").join(ticket.to_string()))
    }

    fn sorted_files(dir: &Path) -> StorageResult<Vec<PathBuf>> {
        if !dir.exists() {
            return Ok(Vec::new());
        }
        let mut files = Vec::new();
        for entry in fs::read_dir(dir)? {
            let path = entry?.path();
            if path.extension().and_then(|e| e.to_str()) == Some("json") {
                files.push(path);
            }
        }
        files.sort();
        Ok(files)
    }
}

#[async_trait]
impl TaskQueue for FsTaskQueue {
    async fn enqueue(&self, queue: &str, entry: QueueEntry) -> StorageResult<()> {
        let pending = self.pending_dir(queue)?;
        fs::create_dir_all(&pending)?;

        let sequence = entry
            .submitted_at
            .timestamp_nanos_opt()
            .unwrap_or_else(|| entry.submitted_at.timestamp_micros() * 1000);
        let file_name = format!("{:020}-{}.json", sequence, uuid::Uuid::new_v4());

        // Atomic write: write to temp file in the same directory, then rename.
        let mut tmp = NamedTempFile::new_in(&pending)?;
        tmp.write_all(&serde_json::to_vec(&entry)?)?;
        tmp.persist(pending.join(&file_name)).map_err(|e| e.error)?;

        debug!(queue, file = %file_name, "entry enqueued");
        Ok(())
    }

    async fn dequeue(&self, queue: &str, ticket: u64) -> StorageResult<Vec<QueueEntry>> {
        let pending = self.pending_dir(queue)?;
        let files = Self::sorted_files(&pending)?;
        if files.is_empty() {
            return Ok(Vec::new());
        }

        let claimed = self.claimed_dir(queue, ticket)?;
        fs::create_dir_all(&claimed)?;

        let mut entries = Vec::with_capacity(files.len());
        for file in files {
            let Some(name) = file.file_name() else {
                continue;
            };
            let target = claimed.join(name);
            fs::rename(&file, &target)?;
            let bytes = fs::read(&target)?;
            entries.push(serde_json::from_slice(&bytes)?);
        }

        debug!(queue, ticket, count = entries.len(), "batch claimed");
        Ok(entries)
    }

    async fn release(&self, queue: &str, ticket: u64, remove: bool) -> StorageResult<()> {
        let claimed = self.claimed_dir(queue, ticket)?;
        if !claimed.exists() {
            return Err(StorageError::UnknownTicket {
                queue: queue.to_string(),
                ticket,
            });
        }

        if !remove {
            let pending = self.pending_dir(queue)?;
            fs::create_dir_all(&pending)?;
            for file in Self::sorted_files(&claimed)? {
                if let Some(name) = file.file_name() {
                    fs::rename(&file, pending.join(name))?;
                }
            }
        }
        fs::remove_dir_all(&claimed)?;

        debug!(queue, ticket, remove, "batch released");
        Ok(())
    }

    async fn queue_names(&self) -> StorageResult<Vec<String>> {
        let mut names = Vec::new();
        for entry in fs::read_dir(&self.root)? {
            let entry = entry?;
            if !entry.file_type()?.is_dir() {
                continue;
            }
            let pending = entry.path().join("pending");
            if !Self::sorted_files(&pending)?.is_empty() {
                if let Some(name) = entry.file_name().to_str() {
                    names.push(name.to_string());
                }
            }
        }
        names.sort();
        Ok(names)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn make_queue() -> (tempfile::TempDir, FsTaskQueue) {
        let dir = tempfile::tempdir().unwrap();
        let queue = FsTaskQueue::new(dir.path()).unwrap();
        (dir, queue)
    }

    fn entry(object: &str) -> QueueEntry {
        QueueEntry::new(
            Some("admin@example.org".to_string()),
            vec!["checksum".to_string()],
            object,
        )
    }

    #[tokio::test]
    async fn dequeue_preserves_submission_order() {
        let (_dir, queue) = make_queue();
        for i in 0..3 {
            queue
                .enqueue("continually", entry(&format!("123456789/{i}")))
                .await
                .unwrap();
        }

        let batch = queue.dequeue("continually", 7).await.unwrap();
        let ids: Vec<_> = batch.iter().map(|e| e.object_id.as_str()).collect();
        assert_eq!(ids, vec!["123456789/0", "123456789/1", "123456789/2"]);
    }

    #[tokio::test]
    async fn claimed_entries_are_invisible_until_released() {
        let (_dir, queue) = make_queue();
        queue.enqueue("q", entry("123456789/1")).await.unwrap();

        assert_eq!(queue.dequeue("q", 1).await.unwrap().len(), 1);
        assert!(queue.dequeue("q", 2).await.unwrap().is_empty());

        queue.release("q", 1, false).await.unwrap();
        assert_eq!(queue.dequeue("q", 3).await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn release_with_remove_deletes_batch() {
        let (_dir, queue) = make_queue();
        queue.enqueue("q", entry("123456789/1")).await.unwrap();
        queue.dequeue("q", 9).await.unwrap();
        queue.release("q", 9, true).await.unwrap();

        assert!(queue.queue_names().await.unwrap().is_empty());
        assert!(queue.dequeue("q", 10).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn release_unknown_ticket_fails() {
        let (_dir, queue) = make_queue();
        let err = queue.release("q", 42, true).await.unwrap_err();
        assert!(matches!(err, StorageError::UnknownTicket { ticket: 42, .. }));
    }

    #[tokio::test]
    async fn rejects_path_like_queue_names() {
        let (_dir, queue) = make_queue();
        let err = queue.enqueue("../escape", entry("x")).await.unwrap_err();
        assert!(matches!(err, StorageError::InvalidQueueName { .. }));
    }
}

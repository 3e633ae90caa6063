//! Audit recorders.
//!
//! A task with record rules writes one [`AuditRecord`] per matching rule
//! after each invocation. The recorder is a managed resource of the run,
//! looked up under [`RECORDER_KEY`].

use std::fs::{File, OpenOptions};
use std::io::{BufWriter, Write};
use std::path::Path;
use std::sync::{Arc, Mutex};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::info;

use crate::error::{CurationError, Result};
use crate::resource::ManagedResource;
use crate::status::{Status, StatusSet};

/// Resource key under which a run's recorder is managed.
pub const RECORDER_KEY: &str = "recorder";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AuditRecord {
    pub timestamp: DateTime<Utc>,
    pub object_id: String,
    pub user: Option<String>,
    pub task: String,
    pub record_type: String,
    pub record_value: String,
    pub status: Status,
    pub result: Option<String>,
}

pub trait Recorder: Send + Sync {
    fn record(&self, record: &AuditRecord) -> Result<()>;
}

/// Builds the recorder a run uses when a task needs one and none is
/// managed yet.
pub type RecorderFactory = Arc<dyn Fn() -> Result<Arc<dyn ManagedResource>> + Send + Sync>;

fn accepts(filter: &Option<StatusSet>, status: Status) -> bool {
    filter.map_or(true, |codes| codes.contains(status))
}

/// Writes audit records as structured log events.
#[derive(Debug, Default)]
pub struct TracingRecorder {
    filter: Option<StatusSet>,
}

impl TracingRecorder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_filter(filter: Option<StatusSet>) -> Self {
        Self { filter }
    }
}

impl Recorder for TracingRecorder {
    fn record(&self, record: &AuditRecord) -> Result<()> {
        if accepts(&self.filter, record.status) {
            info!(
                event = "curation.audit",
                object = %record.object_id,
                user = record.user.as_deref().unwrap_or("-"),
                task = %record.task,
                record_type = %record.record_type,
                record_value = %record.record_value,
                status = %record.status,
                result = record.result.as_deref().unwrap_or(""),
            );
        }
        Ok(())
    }
}

impl ManagedResource for TracingRecorder {
    fn can_close(&self) -> bool {
        true
    }

    fn as_recorder(self: Arc<Self>) -> Option<Arc<dyn Recorder>> {
        Some(self)
    }
}

/// Appends audit records as JSON lines to a journal file.
pub struct JournalRecorder {
    writer: Mutex<Option<BufWriter<File>>>,
    filter: Option<StatusSet>,
}

impl JournalRecorder {
    pub fn open(path: impl AsRef<Path>, filter: Option<StatusSet>) -> Result<Self> {
        let file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(path.as_ref())?;
        Ok(Self {
            writer: Mutex::new(Some(BufWriter::new(file))),
            filter,
        })
    }

    fn lock(&self) -> Result<std::sync::MutexGuard<'_, Option<BufWriter<File>>>> {
        self.writer
            .lock()
            .map_err(|_| CurationError::Resource("journal lock poisoned".to_string()))
    }
}

impl Recorder for JournalRecorder {
    fn record(&self, record: &AuditRecord) -> Result<()> {
        if !accepts(&self.filter, record.status) {
            return Ok(());
        }
        let mut guard = self.lock()?;
        let writer = guard
            .as_mut()
            .ok_or_else(|| CurationError::Resource("journal is closed".to_string()))?;
        serde_json::to_writer(&mut *writer, record)?;
        writer.write_all(b"\n")?;
        Ok(())
    }
}

impl ManagedResource for JournalRecorder {
    fn can_close(&self) -> bool {
        true
    }

    fn can_flush(&self) -> bool {
        true
    }

    fn flush(&self) -> Result<()> {
        if let Some(writer) = self.lock()?.as_mut() {
            writer.flush()?;
        }
        Ok(())
    }

    fn close(&self) -> Result<()> {
        if let Some(mut writer) = self.lock()?.take() {
            writer.flush()?;
        }
        Ok(())
    }

    fn as_recorder(self: Arc<Self>) -> Option<Arc<dyn Recorder>> {
        Some(self)
    }
}

/// Keeps audit records in memory.
#[derive(Default)]
pub struct MemoryRecorder {
    records: Mutex<Vec<AuditRecord>>,
}

impl MemoryRecorder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn records(&self) -> Vec<AuditRecord> {
        self.records.lock().map(|r| r.clone()).unwrap_or_default()
    }
}

impl Recorder for MemoryRecorder {
    fn record(&self, record: &AuditRecord) -> Result<()> {
        self.records
            .lock()
            .map_err(|_| CurationError::Resource("recorder lock poisoned".to_string()))?
            .push(record.clone());
        Ok(())
    }
}

impl ManagedResource for MemoryRecorder {
    fn can_close(&self) -> bool {
        true
    }

    fn as_recorder(self: Arc<Self>) -> Option<Arc<dyn Recorder>> {
        Some(self)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn record(status: Status) -> AuditRecord {
        AuditRecord {
            timestamp: Utc::now(),
            object_id: "123456789/3".to_string(),
            user: Some("curator@example.org".to_string()),
            task: "checksum".to_string(),
            record_type: "audit".to_string(),
            record_value: "fixity".to_string(),
            status,
            result: Some("1 bitstream(s) changed".to_string()),
        }
    }

    #[test]
    fn journal_writes_filtered_json_lines() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("audit.jsonl");
        let journal = JournalRecorder::open(&path, Some(StatusSet::of(&[Status::Fail]))).unwrap();

        journal.record(&record(Status::Success)).unwrap();
        journal.record(&record(Status::Fail)).unwrap();
        journal.close().unwrap();

        let text = std::fs::read_to_string(&path).unwrap();
        let lines: Vec<&str> = text.lines().collect();
        assert_eq!(lines.len(), 1);
        let parsed: AuditRecord = serde_json::from_str(lines[0]).unwrap();
        assert_eq!(parsed.status, Status::Fail);
        assert_eq!(parsed.task, "checksum");
    }

    #[test]
    fn closed_journal_rejects_records() {
        let dir = tempfile::tempdir().unwrap();
        let journal = JournalRecorder::open(dir.path().join("j.jsonl"), None).unwrap();
        journal.close().unwrap();
        assert!(journal.record(&record(Status::Success)).is_err());
    }

    #[test]
    fn managed_recorder_downcasts() {
        let resource: Arc<dyn ManagedResource> = Arc::new(MemoryRecorder::new());
        assert!(resource.as_recorder().is_some());
    }
}

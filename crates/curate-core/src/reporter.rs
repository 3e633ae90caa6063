//! Reporting streams.
//!
//! Tasks write human-readable progress lines through the Curator's
//! reporter. A reporter spec of `-` means standard output, `tracing` routes
//! lines into the log, anything else is a file path.

use std::fs::{File, OpenOptions};
use std::io::{BufWriter, Write};
use std::path::Path;
use std::sync::{Arc, Mutex};

use tracing::info;

use crate::error::{CurationError, Result};

pub trait Reporter: Send + Sync {
    fn report(&self, message: &str) -> Result<()>;

    fn flush(&self) -> Result<()> {
        Ok(())
    }
}

/// Build a reporter from its spec string.
pub fn reporter_for(spec: &str) -> Result<Arc<dyn Reporter>> {
    match spec.trim() {
        "-" => Ok(Arc::new(StdoutReporter)),
        "tracing" | "" => Ok(Arc::new(TracingReporter)),
        path => Ok(Arc::new(FileReporter::create(path)?)),
    }
}

pub struct StdoutReporter;

impl Reporter for StdoutReporter {
    fn report(&self, message: &str) -> Result<()> {
        let mut out = std::io::stdout().lock();
        writeln!(out, "{message}")?;
        Ok(())
    }

    fn flush(&self) -> Result<()> {
        std::io::stdout().flush()?;
        Ok(())
    }
}

pub struct TracingReporter;

impl Reporter for TracingReporter {
    fn report(&self, message: &str) -> Result<()> {
        info!(event = "curation.report", "{message}");
        Ok(())
    }
}

/// Appends report lines to a file.
pub struct FileReporter {
    writer: Mutex<BufWriter<File>>,
}

impl FileReporter {
    pub fn create(path: impl AsRef<Path>) -> Result<Self> {
        let file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(path.as_ref())?;
        Ok(Self {
            writer: Mutex::new(BufWriter::new(file)),
        })
    }

    fn writer(&self) -> Result<std::sync::MutexGuard<'_, BufWriter<File>>> {
        self.writer
            .lock()
            .map_err(|_| CurationError::Resource("report file lock poisoned".to_string()))
    }
}

impl Reporter for FileReporter {
    fn report(&self, message: &str) -> Result<()> {
        writeln!(self.writer()?, "{message}")?;
        Ok(())
    }

    fn flush(&self) -> Result<()> {
        self.writer()?.flush()?;
        Ok(())
    }
}

impl Drop for FileReporter {
    fn drop(&mut self) {
        if let Ok(mut writer) = self.writer.lock() {
            let _ = writer.flush();
        }
    }
}

/// Keeps report lines in memory.
#[derive(Default)]
pub struct MemoryReporter {
    lines: Mutex<Vec<String>>,
}

impl MemoryReporter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn lines(&self) -> Vec<String> {
        self.lines.lock().map(|l| l.clone()).unwrap_or_default()
    }
}

impl Reporter for MemoryReporter {
    fn report(&self, message: &str) -> Result<()> {
        self.lines
            .lock()
            .map_err(|_| CurationError::Resource("report buffer lock poisoned".to_string()))?
            .push(message.to_string());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn file_reporter_appends_lines() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("report.txt");
        {
            let reporter = reporter_for(path.to_str().unwrap()).unwrap();
            reporter.report("first").unwrap();
            reporter.report("second").unwrap();
            reporter.flush().unwrap();
        }
        let text = std::fs::read_to_string(&path).unwrap();
        assert_eq!(text, "first\nsecond\n");
    }

    #[test]
    fn memory_reporter_keeps_order() {
        let reporter = MemoryReporter::new();
        reporter.report("a").unwrap();
        reporter.report("b").unwrap();
        assert_eq!(reporter.lines(), vec!["a", "b"]);
    }
}

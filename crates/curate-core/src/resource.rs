//! Resources managed by a Curator for the duration of one run.
//!
//! Each resource is registered under a key with a release policy and is
//! released exactly once: flushed first, then closed.

use std::fmt;
use std::sync::Arc;

use tracing::{debug, warn};
use uuid::Uuid;

use crate::error::{CurationError, Result};
use crate::recorder::Recorder;

/// What happens to a managed resource when the run completes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReleasePolicy {
    Close,
    Flush,
    Both,
}

impl ReleasePolicy {
    fn flushes(&self) -> bool {
        matches!(self, ReleasePolicy::Flush | ReleasePolicy::Both)
    }

    fn closes(&self) -> bool {
        matches!(self, ReleasePolicy::Close | ReleasePolicy::Both)
    }
}

impl fmt::Display for ReleasePolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            ReleasePolicy::Close => "close",
            ReleasePolicy::Flush => "flush",
            ReleasePolicy::Both => "both",
        })
    }
}

pub trait ManagedResource: Send + Sync {
    fn can_close(&self) -> bool {
        false
    }

    fn can_flush(&self) -> bool {
        false
    }

    fn close(&self) -> Result<()> {
        Ok(())
    }

    fn flush(&self) -> Result<()> {
        Ok(())
    }

    /// The audit recorder view of this resource, if it is one.
    fn as_recorder(self: Arc<Self>) -> Option<Arc<dyn Recorder>> {
        None
    }
}

struct Entry {
    key: String,
    resource: Arc<dyn ManagedResource>,
    policy: ReleasePolicy,
}

/// Keyed registry of managed resources, in registration order.
#[derive(Default)]
pub struct ResourceRegistry {
    entries: Vec<Entry>,
}

impl ResourceRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn obtain(&self, key: &str) -> Option<Arc<dyn ManagedResource>> {
        self.entries
            .iter()
            .find(|e| e.key == key)
            .map(|e| e.resource.clone())
    }

    /// Register under a generated key, which is returned.
    pub fn enroll(
        &mut self,
        resource: Arc<dyn ManagedResource>,
        policy: ReleasePolicy,
    ) -> Result<String> {
        let key = Uuid::new_v4().to_string();
        self.manage(&key, resource, policy)?;
        Ok(key)
    }

    /// Register under `key`. Rejects a policy the resource cannot honour and
    /// a key already in use.
    pub fn manage(
        &mut self,
        key: &str,
        resource: Arc<dyn ManagedResource>,
        policy: ReleasePolicy,
    ) -> Result<()> {
        if policy.closes() && !resource.can_close() {
            return Err(CurationError::Resource(format!(
                "resource {key} cannot be closed (policy {policy})"
            )));
        }
        if policy.flushes() && !resource.can_flush() {
            return Err(CurationError::Resource(format!(
                "resource {key} cannot be flushed (policy {policy})"
            )));
        }
        if self.entries.iter().any(|e| e.key == key) {
            return Err(CurationError::Resource(format!(
                "resource key already managed: {key}"
            )));
        }
        self.entries.push(Entry {
            key: key.to_string(),
            resource,
            policy,
        });
        debug!(key, %policy, "resource managed");
        Ok(())
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Flush every flushable resource, then close every closeable one, and
    /// forget them all. Returns how many resources were released. Release
    /// failures are logged and do not stop the others.
    pub fn release(&mut self) -> usize {
        let entries = std::mem::take(&mut self.entries);
        for entry in entries.iter().filter(|e| e.policy.flushes()) {
            if let Err(e) = entry.resource.flush() {
                warn!(key = %entry.key, error = %e, "resource flush failed");
            }
        }
        for entry in entries.iter().filter(|e| e.policy.closes()) {
            if let Err(e) = entry.resource.close() {
                warn!(key = %entry.key, error = %e, "resource close failed");
            }
        }
        entries.len()
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use std::sync::Mutex;

    /// Records the order of flush/close calls.
    #[derive(Default)]
    pub(crate) struct CallLog {
        pub closable: bool,
        pub flushable: bool,
        pub calls: Mutex<Vec<&'static str>>,
    }

    impl ManagedResource for CallLog {
        fn can_close(&self) -> bool {
            self.closable
        }
        fn can_flush(&self) -> bool {
            self.flushable
        }
        fn close(&self) -> Result<()> {
            self.calls.lock().unwrap().push("close");
            Ok(())
        }
        fn flush(&self) -> Result<()> {
            self.calls.lock().unwrap().push("flush");
            Ok(())
        }
    }

    #[test]
    fn rejects_unsatisfiable_policy() {
        let mut registry = ResourceRegistry::new();
        let flush_only = Arc::new(CallLog {
            flushable: true,
            ..CallLog::default()
        });
        assert!(registry
            .manage("a", flush_only.clone(), ReleasePolicy::Close)
            .is_err());
        assert!(registry
            .manage("a", flush_only.clone(), ReleasePolicy::Both)
            .is_err());
        assert!(registry.manage("a", flush_only, ReleasePolicy::Flush).is_ok());
    }

    #[test]
    fn rejects_duplicate_keys() {
        let mut registry = ResourceRegistry::new();
        let log = || {
            Arc::new(CallLog {
                closable: true,
                ..CallLog::default()
            })
        };
        registry.manage("k", log(), ReleasePolicy::Close).unwrap();
        let err = registry
            .manage("k", log(), ReleasePolicy::Close)
            .unwrap_err();
        assert!(matches!(err, CurationError::Resource(_)));
    }

    #[test]
    fn release_flushes_before_closing_and_only_once() {
        let mut registry = ResourceRegistry::new();
        let log = Arc::new(CallLog {
            closable: true,
            flushable: true,
            ..CallLog::default()
        });
        let key = registry.enroll(log.clone(), ReleasePolicy::Both).unwrap();
        assert!(registry.obtain(&key).is_some());

        assert_eq!(registry.release(), 1);
        assert_eq!(registry.release(), 0);
        assert_eq!(*log.calls.lock().unwrap(), vec!["flush", "close"]);
    }
}

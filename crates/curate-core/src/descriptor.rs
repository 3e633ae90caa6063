//! Task descriptors: the static facts about a task implementation that the
//! Curator consults while running it.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::status::{Status, StatusSet};

/// How a curation run was started.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Invoked {
    Interactive,
    Batch,
    Any,
}

impl fmt::Display for Invoked {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Invoked::Interactive => "INTERACTIVE",
            Invoked::Batch => "BATCH",
            Invoked::Any => "ANY",
        })
    }
}

impl FromStr for Invoked {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "interactive" => Ok(Invoked::Interactive),
            "batch" => Ok(Invoked::Batch),
            "any" => Ok(Invoked::Any),
            other => Err(format!("unknown invocation mode: {other}")),
        }
    }
}

/// Stop walking the hierarchy for a task when it returns one of `codes`
/// in a run started in `mode`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SuspendPolicy {
    pub mode: Invoked,
    pub codes: StatusSet,
}

/// Emit an audit record when a task returns one of `codes`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RecordRule {
    pub record_type: String,
    pub value: String,
    pub codes: StatusSet,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TaskDescriptor {
    /// The task walks containers itself; the Curator invokes it once.
    pub distributive: bool,
    /// The task modifies the objects it visits.
    pub mutative: bool,
    pub suspend: Option<SuspendPolicy>,
    pub records: Vec<RecordRule>,
}

impl TaskDescriptor {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn distributive(mut self) -> Self {
        self.distributive = true;
        self
    }

    pub fn mutative(mut self) -> Self {
        self.mutative = true;
        self
    }

    pub fn suspend_on(mut self, mode: Invoked, codes: StatusSet) -> Self {
        self.suspend = Some(SuspendPolicy { mode, codes });
        self
    }

    pub fn record(
        mut self,
        record_type: impl Into<String>,
        value: impl Into<String>,
        codes: StatusSet,
    ) -> Self {
        self.records.push(RecordRule {
            record_type: record_type.into(),
            value: value.into(),
            codes,
        });
        self
    }

    /// `ANY` policies fire in every run; other modes only in a run started
    /// in that mode.
    pub fn should_suspend(&self, status: Status, run_mode: Option<Invoked>) -> bool {
        match &self.suspend {
            Some(policy) => {
                let mode_matches = policy.mode == Invoked::Any || Some(policy.mode) == run_mode;
                mode_matches && policy.codes.contains(status)
            }
            None => false,
        }
    }

    /// Record rules matching `status`.
    pub fn records_for(&self, status: Status) -> impl Iterator<Item = &RecordRule> {
        self.records
            .iter()
            .filter(move |rule| rule.codes.contains(status))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn any_mode_suspends_in_every_run() {
        let d = TaskDescriptor::new().suspend_on(Invoked::Any, StatusSet::of(&[Status::Fail]));
        assert!(d.should_suspend(Status::Fail, None));
        assert!(d.should_suspend(Status::Fail, Some(Invoked::Batch)));
        assert!(!d.should_suspend(Status::Success, None));
    }

    #[test]
    fn specific_mode_needs_matching_run() {
        let d = TaskDescriptor::new()
            .suspend_on(Invoked::Interactive, StatusSet::of(&[Status::Error]));
        assert!(!d.should_suspend(Status::Error, None));
        assert!(!d.should_suspend(Status::Error, Some(Invoked::Batch)));
        assert!(d.should_suspend(Status::Error, Some(Invoked::Interactive)));
    }

    #[test]
    fn records_filter_by_status() {
        let d = TaskDescriptor::new()
            .record("audit", "fixity", StatusSet::of(&[Status::Fail]))
            .record("audit", "seen", StatusSet::all());
        assert_eq!(d.records_for(Status::Fail).count(), 2);
        assert_eq!(d.records_for(Status::Success).count(), 1);
    }
}

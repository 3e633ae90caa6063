//! Structured lifecycle events for curation runs.
//!
//! Every event carries an `event` field so log pipelines can filter on it:
//! `curation.started`, `task.performed`, `task.suspended`,
//! `curation.finished`, `queue.enqueued`, `queue.drained`.

use std::time::Instant;

use tracing::{info, Span};

use crate::status::Status;

/// Lifecycle guard for one top-level curate call.
///
/// Emits `curation.started` on creation and `curation.finished` when
/// finished or dropped, whichever comes first. A guard dropped without
/// [`CurationSpan::finish`] reports failure. The span is entered by
/// instrumenting the curate future with [`CurationSpan::span`].
pub struct CurationSpan {
    span: Span,
    target: String,
    started: Instant,
    finished: bool,
}

impl CurationSpan {
    pub fn start(target: &str, tasks: &[String]) -> Self {
        let span = tracing::info_span!("curate.run", target = %target);
        span.in_scope(|| emit_curation_started(target, tasks));
        Self {
            span,
            target: target.to_string(),
            started: Instant::now(),
            finished: false,
        }
    }

    pub fn span(&self) -> Span {
        self.span.clone()
    }

    pub fn finish(mut self, success: bool) {
        self.emit_finished(success);
    }

    fn emit_finished(&mut self, success: bool) {
        if self.finished {
            return;
        }
        self.finished = true;
        let duration_ms = self.started.elapsed().as_millis() as u64;
        self.span
            .in_scope(|| emit_curation_finished(&self.target, duration_ms, success));
    }
}

impl Drop for CurationSpan {
    fn drop(&mut self) {
        self.emit_finished(false);
    }
}

pub fn emit_curation_started(target: &str, tasks: &[String]) {
    info!(event = "curation.started", target = %target, tasks = %tasks.join(","));
}

pub fn emit_curation_finished(target: &str, duration_ms: u64, success: bool) {
    info!(
        event = "curation.finished",
        target = %target,
        duration_ms = duration_ms,
        success = success,
    );
}

pub fn emit_task_performed(task: &str, object: &str, status: Status) {
    info!(event = "task.performed", task = %task, object = %object, status = %status);
}

/// Emitted when a suspend policy stops the walk for a task.
pub fn emit_task_suspended(task: &str, object: &str, status: Status) {
    info!(event = "task.suspended", task = %task, object = %object, status = %status);
}

pub fn emit_queue_enqueued(queue: &str, object: &str, tasks: usize) {
    info!(event = "queue.enqueued", queue = %queue, object = %object, tasks = tasks);
}

pub fn emit_queue_drained(queue: &str, ticket: u64, entries: usize, failed: usize) {
    info!(
        event = "queue.drained",
        queue = %queue,
        ticket = ticket,
        entries = entries,
        failed = failed,
    );
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn span_and_events_do_not_panic_without_subscriber() {
        let span = CurationSpan::start("123456789/1", &["noop".to_string()]);
        emit_task_performed("noop", "123456789/1", Status::Success);
        span.finish(true);

        let dropped = CurationSpan::start("123456789/2", &[]);
        drop(dropped);
    }
}

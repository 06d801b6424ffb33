//! Structured run lifecycle events.
//!
//! - [`RunSpan`] tags everything logged during a run with its `run_id`,
//!   including events from inside awaited agent calls.
//! - `emit_*` functions log one event each, with a stable `event` field:
//!   `run.started`, `task.started`, `tool.dispatched`, `tool.rejected`,
//!   `task.finished`, `run.finished`.
//!
//! Set `RUST_LOG=docpack_core=debug` for per-call detail.

use std::future::Future;

use tracing::instrument::Instrumented;
use tracing::{info, warn, Instrument};

use crate::orchestrator::TaskStatus;

/// Run-scoped span.
///
/// ```ignore
/// RunSpan::new("3f0c...").wrap(async { /* run_id=3f0c... */ }).await;
/// ```
pub struct RunSpan {
    span: tracing::Span,
}

impl RunSpan {
    pub fn new(run_id: &str) -> Self {
        Self {
            span: tracing::info_span!("docpack.run", run_id = %run_id),
        }
    }

    pub fn wrap<F: Future>(&self, fut: F) -> Instrumented<F> {
        fut.instrument(self.span.clone())
    }
}

pub fn emit_run_started(run_id: &str, bundle: &str, agent: &str, tasks: usize) {
    info!(event = "run.started", run_id = %run_id, bundle = %bundle, agent = %agent, tasks = tasks);
}

pub fn emit_task_started(task_id: &str, tools: usize) {
    info!(event = "task.started", task_id = %task_id, tools = tools);
}

pub fn emit_tool_dispatched(task_id: &str, tool: &str, call_id: &str) {
    info!(event = "tool.dispatched", task_id = %task_id, tool = %tool, call_id = %call_id);
}

/// A tool call came back as an error payload.
pub fn emit_tool_rejected(task_id: &str, tool: &str, kind: &str, message: &dyn std::fmt::Display) {
    warn!(
        event = "tool.rejected",
        task_id = %task_id,
        tool = %tool,
        kind = %kind,
        error = %message,
    );
}

pub fn emit_task_finished(task_id: &str, status: TaskStatus, iterations: u32, tool_calls: u32) {
    info!(
        event = "task.finished",
        task_id = %task_id,
        status = %status,
        iterations = iterations,
        tool_calls = tool_calls,
    );
}

pub fn emit_run_finished(run_id: &str, duration_ms: u64, completed: usize, total: usize) {
    info!(
        event = "run.finished",
        run_id = %run_id,
        duration_ms = duration_ms,
        completed = completed,
        total = total,
    );
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_run_span_wraps_future() {
        let value = RunSpan::new("test-run-id")
            .wrap(async {
                emit_run_started("test-run-id", "sample", "scripted", 1);
                emit_task_finished("t1", TaskStatus::Completed, 2, 3);
                7
            })
            .await;
        assert_eq!(value, 7);
    }
}

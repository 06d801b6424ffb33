//! Run results.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::sandbox::SandboxUsage;

/// Terminal status of one task.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskStatus {
    Completed,
    IncompleteByIterationLimit,
    ResourceExhausted,
    SkippedDueToDependency,
    SkippedDueToDeadline,
}

impl TaskStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            TaskStatus::Completed => "completed",
            TaskStatus::IncompleteByIterationLimit => "incomplete_by_iteration_limit",
            TaskStatus::ResourceExhausted => "resource_exhausted",
            TaskStatus::SkippedDueToDependency => "skipped_due_to_dependency",
            TaskStatus::SkippedDueToDeadline => "skipped_due_to_deadline",
        }
    }

    pub fn is_skipped(&self) -> bool {
        matches!(
            self,
            TaskStatus::SkippedDueToDependency | TaskStatus::SkippedDueToDeadline
        )
    }
}

impl std::fmt::Display for TaskStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TaskReport {
    pub task_id: String,
    pub name: String,
    pub status: TaskStatus,
    /// Agent turns taken.
    pub iterations: u32,
    pub tool_calls: u32,
    /// Declared output, relative to `output/`.
    pub output_path: String,
    /// Whether the declared output exists when the task ends.
    pub output_present: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub final_response: Option<String>,
    /// Why the task ended the way it did, when not `Completed`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub detail: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub started_at: Option<DateTime<Utc>>,
    pub finished_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RunSummary {
    pub run_id: Uuid,
    pub bundle: String,
    pub agent: String,
    pub mission: String,
    pub exploration: bool,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
    pub tasks: Vec<TaskReport>,
    /// Files materialized under `output/` during this run.
    pub output_files: Vec<String>,
    pub usage: SandboxUsage,
}

impl RunSummary {
    pub fn count(&self, status: TaskStatus) -> usize {
        self.tasks.iter().filter(|t| t.status == status).count()
    }

    pub fn all_completed(&self) -> bool {
        self.tasks.iter().all(|t| t.status == TaskStatus::Completed)
    }

    pub fn task(&self, id: &str) -> Option<&TaskReport> {
        self.tasks.iter().find(|t| t.task_id == id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_wire_names() {
        let encoded = serde_json::to_value(TaskStatus::IncompleteByIterationLimit).unwrap();
        assert_eq!(encoded, serde_json::json!("incomplete_by_iteration_limit"));
        assert_eq!(
            TaskStatus::SkippedDueToDeadline.to_string(),
            "skipped_due_to_deadline"
        );
        assert!(TaskStatus::SkippedDueToDependency.is_skipped());
        assert!(!TaskStatus::ResourceExhausted.is_skipped());
    }
}

//! Orchestrator phase machine.
//!
//! ```text
//! Idle ─▶ Running ⇄ ToolPending
//!   │        │          │
//!   │        ▼          ▼
//!   │     TaskComplete ◀┘ ─▶ Running (next task)
//!   ▼        ▼
//! Finished ◀─┘ ─▶ Terminated
//! ```

use serde::{Deserialize, Serialize};
use tracing::debug;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RunPhase {
    Idle,
    Running,
    ToolPending,
    TaskComplete,
    Finished,
    Terminated,
}

impl RunPhase {
    pub fn can_transition_to(self, next: RunPhase) -> bool {
        use RunPhase::*;
        matches!(
            (self, next),
            (Idle, Running)
                | (Idle, Finished)
                | (Running, ToolPending)
                | (Running, TaskComplete)
                | (ToolPending, Running)
                | (ToolPending, TaskComplete)
                | (TaskComplete, Running)
                | (TaskComplete, Finished)
                | (Finished, Terminated)
        )
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
#[error("invalid orchestrator transition {from:?} -> {to:?}")]
pub struct InvalidTransition {
    pub from: RunPhase,
    pub to: RunPhase,
}

#[derive(Debug)]
pub(crate) struct PhaseTracker {
    phase: RunPhase,
}

impl PhaseTracker {
    pub(crate) fn new() -> Self {
        Self {
            phase: RunPhase::Idle,
        }
    }

    pub(crate) fn phase(&self) -> RunPhase {
        self.phase
    }

    pub(crate) fn advance(&mut self, next: RunPhase) -> Result<(), InvalidTransition> {
        if !self.phase.can_transition_to(next) {
            return Err(InvalidTransition {
                from: self.phase,
                to: next,
            });
        }
        debug!(from = ?self.phase, to = ?next, "phase transition");
        self.phase = next;
        Ok(())
    }
}

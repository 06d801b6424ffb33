//! Error types for the sandbox module.

use std::path::PathBuf;

use serde::{Deserialize, Serialize};

/// The budget a quota failure refers to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum QuotaKind {
    /// Charged file reads (`max_file_reads`).
    FileReads,
    /// Bytes loaded into the agent's conversation (`memory_limit_mb`).
    Memory,
    /// Bytes materialized under `output/`.
    Output,
}

impl std::fmt::Display for QuotaKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            QuotaKind::FileReads => write!(f, "file_reads"),
            QuotaKind::Memory => write!(f, "memory"),
            QuotaKind::Output => write!(f, "output"),
        }
    }
}

/// Errors produced by the sandbox layer.
#[derive(Debug, thiserror::Error)]
pub enum SandboxError {
    #[error("path escapes the sandbox root: {requested}")]
    PathEscape { requested: String },

    #[error("{kind} quota exceeded (limit {limit})")]
    QuotaExceeded { kind: QuotaKind, limit: u64 },

    #[error("execution time limit of {limit_secs}s exceeded")]
    TimeExceeded { limit_secs: u64 },

    #[error("invalid sandbox configuration: {0}")]
    InvalidConfig(String),

    #[error("io error on {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

impl SandboxError {
    /// Quota and deadline failures are escalated by the orchestrator when
    /// they repeat; everything else stays local to the tool call.
    pub fn is_resource_exhaustion(&self) -> bool {
        matches!(
            self,
            SandboxError::QuotaExceeded { .. } | SandboxError::TimeExceeded { .. }
        )
    }

    pub(crate) fn escape(requested: &str) -> Self {
        SandboxError::PathEscape {
            requested: requested.to_string(),
        }
    }
}

/// Result type for sandbox operations.
pub type SandboxResult<T> = std::result::Result<T, SandboxError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_resource_exhaustion_classification() {
        assert!(SandboxError::QuotaExceeded {
            kind: QuotaKind::FileReads,
            limit: 2
        }
        .is_resource_exhaustion());
        assert!(SandboxError::TimeExceeded { limit_secs: 5 }.is_resource_exhaustion());
        assert!(!SandboxError::escape("../etc").is_resource_exhaustion());
    }

    #[test]
    fn test_quota_error_display_names_budget() {
        let err = SandboxError::QuotaExceeded {
            kind: QuotaKind::FileReads,
            limit: 2,
        };
        assert_eq!(err.to_string(), "file_reads quota exceeded (limit 2)");
    }
}

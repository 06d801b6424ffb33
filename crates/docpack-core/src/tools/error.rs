//! Tool failure taxonomy.
//!
//! Every variant is tool-local: it is serialized back to the agent as a
//! structured payload and the conversation continues. Only the orchestrator
//! decides when repeated resource failures end a task.

use serde_json::{json, Value};
use thiserror::Error;

use super::ToolKind;
use crate::output::OutputError;
use crate::sandbox::SandboxError;

#[derive(Debug, Error)]
pub enum ToolError {
    #[error("unknown tool: {name}")]
    UnknownTool { name: String },

    #[error("tool '{tool}' is not permitted for this task")]
    NotPermitted { tool: ToolKind },

    #[error("invalid arguments for '{tool}': {message}")]
    InvalidArguments { tool: String, message: String },

    #[error(transparent)]
    Sandbox(#[from] SandboxError),

    #[error("output file already exists with different content: {path} (pass overwrite: true to replace it)")]
    OutputExists { path: String },

    #[error("not found: {path}")]
    NotFound { path: String },

    #[error("not a directory: {path}")]
    NotADirectory { path: String },

    #[error("not a file: {path}")]
    NotAFile { path: String },

    #[error("unsupported media type for {tool}: {path}")]
    UnsupportedMedia { tool: ToolKind, path: String },

    #[error("index file not available: {file}")]
    IndexUnavailable { file: String },

    #[error("index file {file} is malformed: {message}")]
    IndexMalformed { file: String, message: String },

    #[error("page render failed: {message}")]
    Render { message: String },

    #[error("io error on {path}: {message}")]
    Io { path: String, message: String },
}

impl ToolError {
    /// Stable machine-readable error kind included in the payload.
    pub fn kind(&self) -> &'static str {
        match self {
            ToolError::UnknownTool { .. } => "unknown_tool",
            ToolError::NotPermitted { .. } => "tool_not_permitted",
            ToolError::InvalidArguments { .. } => "invalid_arguments",
            ToolError::Sandbox(SandboxError::PathEscape { .. }) => "path_escape",
            ToolError::Sandbox(SandboxError::QuotaExceeded { .. }) => "quota_exceeded",
            ToolError::Sandbox(SandboxError::TimeExceeded { .. }) => "time_exceeded",
            ToolError::Sandbox(SandboxError::InvalidConfig(_)) => "internal",
            ToolError::Sandbox(SandboxError::Io { .. }) => "io",
            ToolError::OutputExists { .. } => "output_exists",
            ToolError::NotFound { .. } => "not_found",
            ToolError::NotADirectory { .. } => "not_a_directory",
            ToolError::NotAFile { .. } => "not_a_file",
            ToolError::UnsupportedMedia { .. } => "unsupported_media",
            ToolError::IndexUnavailable { .. } => "index_unavailable",
            ToolError::IndexMalformed { .. } => "index_malformed",
            ToolError::Render { .. } => "render_failed",
            ToolError::Io { .. } => "io",
        }
    }

    pub fn is_resource_exhaustion(&self) -> bool {
        matches!(self, ToolError::Sandbox(e) if e.is_resource_exhaustion())
    }

    /// Agent-facing message. Host paths never appear here.
    fn agent_message(&self) -> String {
        match self {
            ToolError::Sandbox(SandboxError::Io { source, .. }) => format!("io error: {source}"),
            other => other.to_string(),
        }
    }

    /// `{"ok": false, "error": {"kind": ..., "message": ...}}`
    pub fn to_payload(&self) -> Value {
        let mut error = json!({
            "kind": self.kind(),
            "message": self.agent_message(),
        });
        match self {
            ToolError::Sandbox(SandboxError::QuotaExceeded { kind, limit }) => {
                error["quota"] = json!(kind);
                error["limit"] = json!(limit);
            }
            ToolError::Sandbox(SandboxError::TimeExceeded { limit_secs }) => {
                error["limit_secs"] = json!(limit_secs);
            }
            ToolError::NotPermitted { tool } => {
                error["tool"] = json!(tool);
            }
            _ => {}
        }
        json!({ "ok": false, "error": error })
    }

    pub(crate) fn io(path: &str, err: std::io::Error) -> Self {
        if err.kind() == std::io::ErrorKind::NotFound {
            return ToolError::NotFound {
                path: path.to_string(),
            };
        }
        ToolError::Io {
            path: path.to_string(),
            message: err.to_string(),
        }
    }
}

impl From<OutputError> for ToolError {
    fn from(err: OutputError) -> Self {
        match err {
            OutputError::Sandbox(e) => ToolError::Sandbox(e),
            OutputError::Exists { path } => ToolError::OutputExists { path },
            OutputError::InvalidPath { path } => ToolError::InvalidArguments {
                tool: ToolKind::WriteOutput.to_string(),
                message: format!("not a writable file path: {path}"),
            },
            OutputError::Io { path, source } => ToolError::Io {
                path,
                message: source.to_string(),
            },
        }
    }
}

//! Bundle loading errors.

use std::path::PathBuf;

use thiserror::Error;

use crate::task_graph::TaskGraphError;

/// A manifest or task file that parsed but violates the schema.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ValidationError {
    #[error("{file}: missing required field '{field}'")]
    MissingField { file: &'static str, field: String },

    #[error("{file}: {message}")]
    Malformed { file: &'static str, message: String },

    #[error("{file}: unknown tool '{name}'")]
    UnknownTool { file: &'static str, name: String },

    #[error("docpack.json: constraint '{field}' {reason}")]
    InvalidConstraint { field: &'static str, reason: String },

    #[error("tasks.json: task '{task}' allows tool '{tool}' which the manifest does not enable")]
    ToolNotInManifest { task: String, tool: String },

    #[error("tasks.json: task {index} has an empty id")]
    EmptyTaskId { index: usize },

    #[error("tasks.json: task '{task}' declares output path '{path}' outside output/")]
    OutputOutsideBundle { task: String, path: String },
}

/// Errors produced while loading a bundle.
#[derive(Debug, Error)]
pub enum BundleError {
    #[error("bundle directory not found: {0}")]
    NotFound(PathBuf),

    #[error("bundle is missing {what}: {path}")]
    Missing { what: &'static str, path: PathBuf },

    #[error("failed to read {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("invalid JSON in {path}: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },

    #[error("validation failed: {0}")]
    Validation(#[from] ValidationError),

    #[error(transparent)]
    TaskGraph(#[from] TaskGraphError),
}

/// Result type for bundle operations.
pub type BundleResult<T> = std::result::Result<T, BundleError>;

//! Sandbox: root confinement and per-run quotas.
//!
//! A [`Sandbox`] is created once per run and is the only owner of the run's
//! [`SandboxState`]. Every tool consults it before touching storage:
//!
//! - [`Sandbox::resolve`] / [`Sandbox::resolve_index`] /
//!   [`Sandbox::resolve_output`] confine a requested path to one of the
//!   bundle's three roots.
//! - [`Sandbox::check_deadline`], [`Sandbox::charge_read`],
//!   [`Sandbox::charge_memory`] and [`Sandbox::charge_write`] enforce the
//!   manifest constraints.
//!
//! All checks are synchronous and happen before the side effect they guard.
//! A rejected resolution never consumes quota.
//!
//! # Modules
//!
//! - [`error`]: `SandboxError`, `SandboxResult` and `QuotaKind`
//! - `path`: lexical and canonical confinement

pub mod error;
pub(crate) mod path;

use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};

use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::bundle::{BundleLayout, Constraints};

pub use error::{QuotaKind, SandboxError, SandboxResult};

const MIB: u64 = 1024 * 1024;

/// Resource limits enforced for one run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SandboxLimits {
    pub max_file_reads: u32,
    pub max_duration: Duration,
    pub max_memory_bytes: u64,
    pub max_output_bytes: u64,
}

impl SandboxLimits {
    /// Derive limits from manifest constraints. The output budget defaults to
    /// the memory limit.
    pub fn from_constraints(constraints: &Constraints) -> Self {
        let memory = constraints.memory_limit_mb.saturating_mul(MIB);
        Self {
            max_file_reads: constraints.max_file_reads,
            max_duration: Duration::from_secs(constraints.max_execution_time_seconds),
            max_memory_bytes: memory,
            max_output_bytes: memory,
        }
    }

    /// Override the output budget when the run configuration sets one.
    pub fn with_output_budget(mut self, max_output_bytes: Option<u64>) -> Self {
        if let Some(bytes) = max_output_bytes {
            self.max_output_bytes = bytes;
        }
        self
    }
}

/// Mutable run-scoped counters. Only [`Sandbox`] mutates these.
#[derive(Debug, Clone)]
pub struct SandboxState {
    reads_consumed: u32,
    bytes_read: u64,
    bytes_written: u64,
    started: Instant,
}

impl SandboxState {
    fn new() -> Self {
        Self {
            reads_consumed: 0,
            bytes_read: 0,
            bytes_written: 0,
            started: Instant::now(),
        }
    }
}

/// Serializable snapshot of [`SandboxState`] for run summaries.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct SandboxUsage {
    pub reads_consumed: u32,
    pub bytes_read: u64,
    pub bytes_written: u64,
    pub elapsed_ms: u64,
}

/// Path-confinement and quota authority for a single run.
#[derive(Debug)]
pub struct Sandbox {
    content_root: PathBuf,
    index_root: Option<PathBuf>,
    output_root: PathBuf,
    limits: SandboxLimits,
    state: SandboxState,
}

impl Sandbox {
    /// Build a sandbox over a bundle layout.
    ///
    /// `content/` must exist. `output/` is created when missing; `index/` is
    /// optional. All roots are canonicalized once here.
    pub fn new(layout: &BundleLayout, limits: SandboxLimits) -> SandboxResult<Self> {
        let content_root = canonical_dir(&layout.content)?;

        if !layout.output.exists() {
            std::fs::create_dir_all(&layout.output).map_err(|source| SandboxError::Io {
                path: layout.output.clone(),
                source,
            })?;
        }
        let output_root = canonical_dir(&layout.output)?;

        let index_root = if layout.index.is_dir() {
            Some(canonical_dir(&layout.index)?)
        } else {
            None
        };

        let bundle_root = canonical_dir(&layout.root)?;
        for root in [&content_root, &output_root] {
            if !root.starts_with(&bundle_root) {
                return Err(SandboxError::InvalidConfig(format!(
                    "bundle directory resolves outside the bundle: {}",
                    root.display()
                )));
            }
        }

        Ok(Self {
            content_root,
            index_root,
            output_root,
            limits,
            state: SandboxState::new(),
        })
    }

    /// Resolve an agent-requested path inside `content/`.
    pub fn resolve(&self, requested: &str) -> SandboxResult<PathBuf> {
        confine_logged(&self.content_root, requested, "content")
    }

    /// Resolve a file inside `index/`. Fails with `PathEscape` when the
    /// bundle carries no index directory.
    pub fn resolve_index(&self, file: &str) -> SandboxResult<PathBuf> {
        match &self.index_root {
            Some(root) => confine_logged(root, file, "index"),
            None => Err(SandboxError::escape(file)),
        }
    }

    /// Resolve a path inside `output/`, using the same confinement rules as
    /// [`Sandbox::resolve`].
    pub fn resolve_output(&self, requested: &str) -> SandboxResult<PathBuf> {
        confine_logged(&self.output_root, requested, "output")
    }

    pub fn content_root(&self) -> &Path {
        &self.content_root
    }

    pub fn output_root(&self) -> &Path {
        &self.output_root
    }

    pub fn has_index(&self) -> bool {
        self.index_root.is_some()
    }

    pub fn limits(&self) -> &SandboxLimits {
        &self.limits
    }

    /// Fails with `TimeExceeded` once the run has used its time budget.
    pub fn check_deadline(&self) -> SandboxResult<()> {
        if self.deadline_passed() {
            return Err(SandboxError::TimeExceeded {
                limit_secs: self.limits.max_duration.as_secs(),
            });
        }
        Ok(())
    }

    pub fn deadline_passed(&self) -> bool {
        self.state.started.elapsed() >= self.limits.max_duration
    }

    pub fn elapsed(&self) -> Duration {
        self.state.started.elapsed()
    }

    /// Time left before the run deadline; zero once it has passed.
    pub fn remaining(&self) -> Duration {
        self.limits.max_duration.saturating_sub(self.elapsed())
    }

    /// Check, without charging, that one more file read is allowed.
    pub fn check_read(&self) -> SandboxResult<()> {
        if self.state.reads_consumed >= self.limits.max_file_reads {
            return Err(SandboxError::QuotaExceeded {
                kind: QuotaKind::FileReads,
                limit: u64::from(self.limits.max_file_reads),
            });
        }
        Ok(())
    }

    /// Consume one file read. Fails once `reads consumed >= max_file_reads`.
    pub fn charge_read(&mut self) -> SandboxResult<()> {
        self.check_read()?;
        self.state.reads_consumed += 1;
        Ok(())
    }

    /// Check, without charging, that `bytes` more would fit the memory budget.
    pub fn check_memory(&self, bytes: u64) -> SandboxResult<()> {
        if self.state.bytes_read.saturating_add(bytes) > self.limits.max_memory_bytes {
            return Err(SandboxError::QuotaExceeded {
                kind: QuotaKind::Memory,
                limit: self.limits.max_memory_bytes,
            });
        }
        Ok(())
    }

    /// Charge `bytes` loaded for the agent against the memory budget.
    pub fn charge_memory(&mut self, bytes: u64) -> SandboxResult<()> {
        self.check_memory(bytes)?;
        self.state.bytes_read += bytes;
        Ok(())
    }

    /// Charge `bytes` materialized under `output/` against the output budget.
    pub fn charge_write(&mut self, bytes: u64) -> SandboxResult<()> {
        if self.state.bytes_written.saturating_add(bytes) > self.limits.max_output_bytes {
            return Err(SandboxError::QuotaExceeded {
                kind: QuotaKind::Output,
                limit: self.limits.max_output_bytes,
            });
        }
        self.state.bytes_written += bytes;
        Ok(())
    }

    pub fn usage(&self) -> SandboxUsage {
        SandboxUsage {
            reads_consumed: self.state.reads_consumed,
            bytes_read: self.state.bytes_read,
            bytes_written: self.state.bytes_written,
            elapsed_ms: u64::try_from(self.elapsed().as_millis()).unwrap_or(u64::MAX),
        }
    }
}

fn canonical_dir(path: &Path) -> SandboxResult<PathBuf> {
    let canonical = path.canonicalize().map_err(|source| SandboxError::Io {
        path: path.to_path_buf(),
        source,
    })?;
    if !canonical.is_dir() {
        return Err(SandboxError::InvalidConfig(format!(
            "not a directory: {}",
            path.display()
        )));
    }
    Ok(canonical)
}

fn confine_logged(root: &Path, requested: &str, area: &str) -> SandboxResult<PathBuf> {
    let result = path::confine(root, requested);
    if let Err(SandboxError::PathEscape { .. }) = &result {
        warn!(event = "sandbox.path_escape", area = %area, requested = %requested);
    }
    result
}

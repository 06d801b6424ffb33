//! Output writer: the only component that creates files, always under the
//! bundle's `output/` root.
//!
//! Writes are atomic (temp file in the destination directory, then rename)
//! and idempotent: rewriting identical bytes is acknowledged as
//! [`WriteDisposition::Unchanged`] without touching the file or the output
//! budget. Replacing different bytes requires [`WriteMode::Overwrite`].

use std::collections::BTreeSet;
use std::fs;
use std::io::Write;
use std::path::Path;

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use tempfile::NamedTempFile;
use thiserror::Error;
use tracing::debug;

use crate::sandbox::path::display_relative;
use crate::sandbox::{Sandbox, SandboxError};

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WriteMode {
    /// Create, or accept an identical existing file.
    #[default]
    Create,
    /// Replace an existing file with different content.
    Overwrite,
}

impl WriteMode {
    pub fn from_overwrite(overwrite: bool) -> Self {
        if overwrite {
            WriteMode::Overwrite
        } else {
            WriteMode::Create
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WriteDisposition {
    Created,
    Replaced,
    Unchanged,
}

/// Acknowledgement of a successful write.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WriteAck {
    /// Path relative to `output/`.
    pub path: String,
    pub bytes: u64,
    pub sha256: String,
    pub disposition: WriteDisposition,
}

#[derive(Debug, Error)]
pub enum OutputError {
    #[error(transparent)]
    Sandbox(#[from] SandboxError),

    #[error("output file already exists with different content: {path}")]
    Exists { path: String },

    #[error("not a writable file path: {path}")]
    InvalidPath { path: String },

    #[error("io error writing {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },
}

pub type OutputResult<T> = std::result::Result<T, OutputError>;

/// Accept `output/x.md` and `./output/x.md` as well as `x.md`.
fn strip_output_prefix(requested: &str) -> &str {
    let trimmed = requested.strip_prefix("./").unwrap_or(requested);
    match trimmed.strip_prefix("output/") {
        Some(rest) => rest,
        None if trimmed == "output" => "",
        None => trimmed,
    }
}

pub fn sha256_hex(bytes: &[u8]) -> String {
    hex::encode(Sha256::digest(bytes))
}

/// Tracks every path materialized during a run.
#[derive(Debug, Default)]
pub struct OutputWriter {
    written: BTreeSet<String>,
}

impl OutputWriter {
    pub fn new() -> Self {
        Self::default()
    }

    /// Write `content` to `requested` (relative to `output/`).
    pub fn write(
        &mut self,
        sandbox: &mut Sandbox,
        requested: &str,
        content: &[u8],
        mode: WriteMode,
    ) -> OutputResult<WriteAck> {
        let relative = strip_output_prefix(requested);
        let target = sandbox.resolve_output(relative)?;
        let shown = display_relative(sandbox.output_root(), &target);
        if shown == "." {
            return Err(OutputError::InvalidPath {
                path: requested.to_string(),
            });
        }

        let io_err = |source| OutputError::Io {
            path: shown.clone(),
            source,
        };

        let disposition = match fs::symlink_metadata(&target) {
            Ok(meta) if meta.is_file() => {
                let existing = fs::read(&target).map_err(io_err)?;
                if existing == content {
                    WriteDisposition::Unchanged
                } else if mode == WriteMode::Overwrite {
                    WriteDisposition::Replaced
                } else {
                    return Err(OutputError::Exists {
                        path: shown.clone(),
                    });
                }
            }
            Ok(_) => {
                return Err(OutputError::InvalidPath {
                    path: requested.to_string(),
                })
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => WriteDisposition::Created,
            Err(e) => return Err(io_err(e)),
        };

        let sha256 = sha256_hex(content);
        let bytes = content.len() as u64;

        if disposition != WriteDisposition::Unchanged {
            sandbox.charge_write(bytes)?;
            let parent = target.parent().ok_or_else(|| OutputError::InvalidPath {
                path: requested.to_string(),
            })?;
            fs::create_dir_all(parent).map_err(io_err)?;
            atomic_write(parent, &target, content).map_err(io_err)?;
        }

        debug!(path = %shown, bytes, ?disposition, "output written");
        self.written.insert(shown.clone());
        Ok(WriteAck {
            path: shown,
            bytes,
            sha256,
            disposition,
        })
    }

    /// Paths acknowledged during this run, sorted.
    pub fn written(&self) -> Vec<String> {
        self.written.iter().cloned().collect()
    }

    pub fn was_written(&self, path: &str) -> bool {
        self.written.contains(strip_output_prefix(path))
    }
}

fn atomic_write(dir: &Path, target: &Path, content: &[u8]) -> std::io::Result<()> {
    let mut tmp = NamedTempFile::new_in(dir)?;
    tmp.write_all(content)?;
    tmp.as_file().sync_all()?;
    tmp.persist(target).map_err(|e| e.error)?;
    Ok(())
}

/// All regular files currently under `output_root`, relative and sorted.
pub fn list_output_files(output_root: &Path) -> std::io::Result<Vec<String>> {
    fn walk(dir: &Path, root: &Path, out: &mut Vec<String>) -> std::io::Result<()> {
        for entry in fs::read_dir(dir)? {
            let entry = entry?;
            let file_type = entry.file_type()?;
            if file_type.is_dir() {
                walk(&entry.path(), root, out)?;
            } else if file_type.is_file() {
                out.push(display_relative(root, &entry.path()));
            }
        }
        Ok(())
    }

    let mut files = Vec::new();
    if output_root.is_dir() {
        walk(output_root, output_root, &mut files)?;
    }
    files.sort();
    Ok(files)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bundle::BundleLayout;
    use crate::sandbox::{QuotaKind, SandboxLimits};
    use std::time::Duration;

    fn setup(output_budget: u64) -> (tempfile::TempDir, Sandbox, OutputWriter) {
        let dir = tempfile::tempdir().unwrap();
        let layout = BundleLayout::new(dir.path());
        fs::create_dir_all(&layout.content).unwrap();
        let limits = SandboxLimits {
            max_file_reads: 1,
            max_duration: Duration::from_secs(60),
            max_memory_bytes: 1024,
            max_output_bytes: output_budget,
        };
        let sandbox = Sandbox::new(&layout, limits).unwrap();
        (dir, sandbox, OutputWriter::new())
    }

    #[test]
    fn test_strip_output_prefix() {
        assert_eq!(strip_output_prefix("output/overview.md"), "overview.md");
        assert_eq!(strip_output_prefix("./output/a/b.md"), "a/b.md");
        assert_eq!(strip_output_prefix("overview.md"), "overview.md");
        assert_eq!(strip_output_prefix("outputs.md"), "outputs.md");
    }

    #[test]
    fn test_create_then_identical_is_unchanged() {
        let (dir, mut sandbox, mut writer) = setup(1024);
        let first = writer
            .write(&mut sandbox, "output/docs/a.md", b"# A", WriteMode::Create)
            .unwrap();
        assert_eq!(first.disposition, WriteDisposition::Created);
        assert_eq!(first.path, "docs/a.md");
        assert_eq!(first.sha256, sha256_hex(b"# A"));

        let second = writer
            .write(&mut sandbox, "docs/a.md", b"# A", WriteMode::Create)
            .unwrap();
        assert_eq!(second.disposition, WriteDisposition::Unchanged);
        assert_eq!(second.sha256, first.sha256);
        assert_eq!(sandbox.usage().bytes_written, 3);
        assert_eq!(fs::read(dir.path().join("output/docs/a.md")).unwrap(), b"# A");
        assert_eq!(writer.written(), vec!["docs/a.md".to_string()]);
    }

    #[test]
    fn test_different_content_requires_overwrite() {
        let (dir, mut sandbox, mut writer) = setup(1024);
        writer
            .write(&mut sandbox, "a.md", b"one", WriteMode::Create)
            .unwrap();
        let err = writer
            .write(&mut sandbox, "a.md", b"two", WriteMode::Create)
            .unwrap_err();
        assert!(matches!(err, OutputError::Exists { .. }));

        let ack = writer
            .write(&mut sandbox, "a.md", b"two", WriteMode::Overwrite)
            .unwrap();
        assert_eq!(ack.disposition, WriteDisposition::Replaced);
        assert_eq!(fs::read(dir.path().join("output/a.md")).unwrap(), b"two");
    }

    #[test]
    fn test_escape_is_rejected() {
        let (dir, mut sandbox, mut writer) = setup(1024);
        let err = writer
            .write(&mut sandbox, "../content/evil.md", b"x", WriteMode::Create)
            .unwrap_err();
        assert!(matches!(err, OutputError::Sandbox(SandboxError::PathEscape { .. })));
        assert!(!dir.path().join("content/evil.md").exists());
    }

    #[test]
    fn test_output_root_itself_is_not_writable() {
        let (_dir, mut sandbox, mut writer) = setup(1024);
        let err = writer
            .write(&mut sandbox, "output/", b"x", WriteMode::Create)
            .unwrap_err();
        assert!(matches!(err, OutputError::InvalidPath { .. }));
    }

    #[test]
    fn test_output_budget_enforced_before_write() {
        let (dir, mut sandbox, mut writer) = setup(4);
        let err = writer
            .write(&mut sandbox, "big.md", b"too large", WriteMode::Create)
            .unwrap_err();
        assert!(matches!(
            err,
            OutputError::Sandbox(SandboxError::QuotaExceeded {
                kind: QuotaKind::Output,
                ..
            })
        ));
        assert!(!dir.path().join("output/big.md").exists());
    }

    #[test]
    fn test_list_output_files() {
        let (dir, mut sandbox, mut writer) = setup(1024);
        writer
            .write(&mut sandbox, "b.md", b"b", WriteMode::Create)
            .unwrap();
        writer
            .write(&mut sandbox, "a/c.md", b"c", WriteMode::Create)
            .unwrap();
        let files = list_output_files(&dir.path().join("output")).unwrap();
        assert_eq!(files, vec!["a/c.md".to_string(), "b.md".to_string()]);
    }
}

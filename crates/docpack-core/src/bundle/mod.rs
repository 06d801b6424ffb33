//! `.docpack` bundle: directory layout, manifest and task loading.
//!
//! ```text
//! <bundle>/
//!   docpack.json   manifest (required)
//!   tasks.json     task file (optional; exploration mode without it)
//!   content/       read-only input tree (required)
//!   index/         precomputed search.json / graph.json (optional)
//!   output/        the only writable area (created on demand)
//! ```

pub mod error;
pub mod manifest;
pub mod tasks;

use std::path::{Path, PathBuf};

use serde::Serialize;
use serde_json::Value;
use tracing::{info, warn};

pub use error::{BundleError, BundleResult, ValidationError};
pub use manifest::{Constraints, Environment, Manifest, MANIFEST_FILE};
pub use tasks::{OutputSpec, TaskFile, TaskSpec, TASKS_FILE};

use crate::task_graph::TaskGraph;

pub const CONTENT_DIR: &str = "content";
pub const INDEX_DIR: &str = "index";
pub const OUTPUT_DIR: &str = "output";

/// Well-known paths inside a bundle root.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BundleLayout {
    pub root: PathBuf,
    pub content: PathBuf,
    pub index: PathBuf,
    pub output: PathBuf,
    pub manifest: PathBuf,
    pub tasks: PathBuf,
}

impl BundleLayout {
    pub fn new(root: impl AsRef<Path>) -> Self {
        let root = root.as_ref().to_path_buf();
        Self {
            content: root.join(CONTENT_DIR),
            index: root.join(INDEX_DIR),
            output: root.join(OUTPUT_DIR),
            manifest: root.join(MANIFEST_FILE),
            tasks: root.join(TASKS_FILE),
            root,
        }
    }
}

/// A loaded, validated bundle. Read-only for the duration of a run.
#[derive(Debug, Clone)]
pub struct Bundle {
    pub layout: BundleLayout,
    pub manifest: Manifest,
    pub tasks: TaskFile,
    pub graph: TaskGraph,
}

impl Bundle {
    /// Load and validate a bundle. Any error here aborts before a run starts.
    pub fn load(root: impl AsRef<Path>) -> BundleResult<Self> {
        let layout = BundleLayout::new(root);
        if !layout.root.is_dir() {
            return Err(BundleError::NotFound(layout.root));
        }
        if !layout.manifest.is_file() {
            return Err(BundleError::Missing {
                what: MANIFEST_FILE,
                path: layout.manifest,
            });
        }
        if !layout.content.is_dir() {
            return Err(BundleError::Missing {
                what: "content/",
                path: layout.content,
            });
        }

        let manifest = Manifest::load(&layout.manifest)?;
        let tasks = if layout.tasks.is_file() {
            TaskFile::load(&layout.tasks, manifest.tools())?
        } else {
            warn!(bundle = %layout.root.display(), "no tasks.json found, running in exploration mode");
            TaskFile::exploration(manifest.tools())
        };
        let graph = TaskGraph::build(&tasks.tasks)?;

        info!(
            bundle = %layout.root.display(),
            name = %manifest.name,
            tasks = tasks.tasks.len(),
            "bundle loaded"
        );
        Ok(Self {
            layout,
            manifest,
            tasks,
            graph,
        })
    }

    /// Tasks in execution order.
    pub fn ordered_tasks(&self) -> Vec<&TaskSpec> {
        self.graph
            .order_indices()
            .iter()
            .filter_map(|&i| self.tasks.tasks.get(i))
            .collect()
    }
}

/// Static check results for `docpack validate`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ValidationReport {
    pub errors: Vec<String>,
    pub warnings: Vec<String>,
}

impl ValidationReport {
    pub fn is_valid(&self) -> bool {
        self.errors.is_empty()
    }
}

/// Run every static check without stopping at the first failure where the
/// checks are independent.
pub fn validate(root: impl AsRef<Path>) -> ValidationReport {
    let layout = BundleLayout::new(root);
    let mut report = ValidationReport::default();

    if !layout.root.is_dir() {
        report
            .errors
            .push(format!("not a bundle directory: {}", layout.root.display()));
        return report;
    }
    if !layout.index.is_dir() {
        report
            .warnings
            .push("missing optional directory: index/".to_string());
    }
    if !layout.output.is_dir() {
        report
            .warnings
            .push("missing output directory (created at run time): output/".to_string());
    }
    if !layout.tasks.is_file() {
        report
            .warnings
            .push("missing optional file: tasks.json (agent will run in exploration mode)".to_string());
    }

    match Bundle::load(&layout.root) {
        Ok(bundle) => {
            if bundle.manifest.name == "unnamed" {
                report
                    .warnings
                    .push("docpack.json: missing recommended field 'name'".to_string());
            }
            if !bundle.tasks.exploration && bundle.tasks.mission.is_empty() {
                report
                    .warnings
                    .push("tasks.json: missing recommended field 'mission'".to_string());
            }
            if bundle.tasks.tasks.is_empty() {
                report
                    .warnings
                    .push("tasks.json: no tasks declared".to_string());
            }
        }
        Err(e) => report.errors.push(e.to_string()),
    }

    for file in ["search.json", "graph.json"] {
        let path = layout.index.join(file);
        if !path.is_file() {
            continue;
        }
        match std::fs::read(&path) {
            Ok(raw) => {
                if let Err(e) = serde_json::from_slice::<Value>(&raw) {
                    report
                        .errors
                        .push(format!("invalid JSON in index/{file}: {e}"));
                }
            }
            Err(e) => report
                .warnings
                .push(format!("cannot read index/{file}: {e}")),
        }
    }

    report
}

/// File count and total size of a directory tree (symlinks not followed).
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct TreeStats {
    pub files: u64,
    pub bytes: u64,
}

pub fn tree_stats(dir: &Path) -> std::io::Result<TreeStats> {
    let mut stats = TreeStats::default();
    if !dir.is_dir() {
        return Ok(stats);
    }
    for entry in std::fs::read_dir(dir)? {
        let entry = entry?;
        let file_type = entry.file_type()?;
        if file_type.is_dir() {
            let sub = tree_stats(&entry.path())?;
            stats.files += sub.files;
            stats.bytes += sub.bytes;
        } else if file_type.is_file() {
            stats.files += 1;
            stats.bytes += entry.metadata()?.len();
        }
    }
    Ok(stats)
}

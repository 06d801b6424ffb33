//! `tasks.json`: the mission and its declared goals.

use std::collections::BTreeSet;
use std::path::Path;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use super::error::{BundleError, BundleResult, ValidationError};
use super::manifest::parse_tools;
use crate::sandbox::path::normalize_relative;
use crate::tools::ToolKind;

pub const TASKS_FILE: &str = "tasks.json";

pub const EXPLORATION_MISSION: &str = "Explore and understand the project structure";
pub const EXPLORATION_TASK_ID: &str = "explore";
pub const EXPLORATION_OUTPUT: &str = "summary.md";

/// Declared output target of a task.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OutputSpec {
    #[serde(rename = "type")]
    pub kind: String,
    pub path: String,
}

impl OutputSpec {
    /// Path relative to `output/` (a leading `output/` is dropped).
    pub fn relative_path(&self) -> String {
        let trimmed = self.path.strip_prefix("./").unwrap_or(&self.path);
        trimmed
            .strip_prefix("output/")
            .unwrap_or(trimmed)
            .to_string()
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TaskSpec {
    pub id: String,
    pub name: String,
    pub description: String,
    /// Resolved allowed tools; inherits the manifest set when not declared.
    pub tools_allowed: BTreeSet<ToolKind>,
    pub depends_on: Vec<String>,
    pub output: OutputSpec,
}

/// Parsed task file, or the synthetic exploration plan when the bundle has
/// no `tasks.json`.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TaskFile {
    pub mission: String,
    pub tasks: Vec<TaskSpec>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub constraints: Option<Value>,
    pub exploration: bool,
}

#[derive(Deserialize)]
struct RawTaskFile {
    mission: Option<String>,
    tasks: Option<Vec<RawTask>>,
    constraints: Option<Value>,
}

#[derive(Deserialize)]
struct RawTask {
    id: Option<String>,
    name: Option<String>,
    description: Option<String>,
    tools_allowed: Option<Vec<String>>,
    depends_on: Option<Vec<String>>,
    output: Option<OutputSpec>,
}

impl TaskFile {
    pub fn load(path: &Path, manifest_tools: &BTreeSet<ToolKind>) -> BundleResult<Self> {
        let text = std::fs::read_to_string(path).map_err(|source| BundleError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        let value: Value = serde_json::from_str(&text).map_err(|source| BundleError::Parse {
            path: path.to_path_buf(),
            source,
        })?;
        Ok(Self::from_value(value, manifest_tools)?)
    }

    pub fn from_value(
        value: Value,
        manifest_tools: &BTreeSet<ToolKind>,
    ) -> Result<Self, ValidationError> {
        let raw: RawTaskFile =
            serde_json::from_value(value).map_err(|e| ValidationError::Malformed {
                file: TASKS_FILE,
                message: e.to_string(),
            })?;

        let raw_tasks = raw.tasks.ok_or_else(|| ValidationError::MissingField {
            file: TASKS_FILE,
            field: "tasks".to_string(),
        })?;

        let tasks = raw_tasks
            .into_iter()
            .enumerate()
            .map(|(index, task)| resolve_task(index, task, manifest_tools))
            .collect::<Result<Vec<_>, _>>()?;

        Ok(Self {
            mission: raw.mission.unwrap_or_default(),
            tasks,
            constraints: raw.constraints,
            exploration: false,
        })
    }

    /// One synthetic task that explores `content/` and writes `summary.md`.
    pub fn exploration(manifest_tools: &BTreeSet<ToolKind>) -> Self {
        Self {
            mission: EXPLORATION_MISSION.to_string(),
            tasks: vec![TaskSpec {
                id: EXPLORATION_TASK_ID.to_string(),
                name: "Explore project".to_string(),
                description: format!(
                    "Explore the project at '.' and write a comprehensive summary of its \
                     structure and purpose to {EXPLORATION_OUTPUT}."
                ),
                tools_allowed: manifest_tools.clone(),
                depends_on: Vec::new(),
                output: OutputSpec {
                    kind: "markdown".to_string(),
                    path: EXPLORATION_OUTPUT.to_string(),
                },
            }],
            constraints: None,
            exploration: true,
        }
    }
}

fn resolve_task(
    index: usize,
    raw: RawTask,
    manifest_tools: &BTreeSet<ToolKind>,
) -> Result<TaskSpec, ValidationError> {
    let id = raw.id.unwrap_or_default().trim().to_string();
    if id.is_empty() {
        return Err(ValidationError::EmptyTaskId { index });
    }

    let tools_allowed = match raw.tools_allowed {
        Some(names) => {
            let tools = parse_tools(TASKS_FILE, &names)?;
            if let Some(extra) = tools.iter().find(|t| !manifest_tools.contains(t)) {
                return Err(ValidationError::ToolNotInManifest {
                    task: id,
                    tool: extra.to_string(),
                });
            }
            tools
        }
        None => manifest_tools.clone(),
    };

    let output = raw.output.ok_or_else(|| ValidationError::MissingField {
        file: TASKS_FILE,
        field: format!("tasks[{index}].output"),
    })?;
    let confined = normalize_relative(&output.relative_path())
        .is_some_and(|p| !p.as_os_str().is_empty());
    if !confined {
        return Err(ValidationError::OutputOutsideBundle {
            task: id,
            path: output.path,
        });
    }

    let mut depends_on: Vec<String> = Vec::new();
    for dep in raw.depends_on.unwrap_or_default() {
        if !depends_on.contains(&dep) {
            depends_on.push(dep);
        }
    }

    Ok(TaskSpec {
        name: raw.name.unwrap_or_else(|| id.clone()),
        description: raw.description.unwrap_or_default(),
        id,
        tools_allowed,
        depends_on,
        output,
    })
}

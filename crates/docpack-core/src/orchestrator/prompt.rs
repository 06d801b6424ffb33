//! Prompt text seeded into each task's conversation.

use std::collections::{BTreeSet, HashMap};
use std::fmt::Write;

use crate::bundle::{Manifest, TaskFile, TaskSpec};
use crate::tools::ToolKind;

pub(crate) fn system_prompt(manifest: &Manifest, tasks: &TaskFile) -> String {
    let mut out = String::new();
    let _ = writeln!(
        out,
        "You are a documentation agent working within a .docpack environment."
    );
    let _ = writeln!(out, "Project: {}", manifest.name);
    if let Some(description) = &manifest.description {
        let _ = writeln!(out, "Description: {description}");
    }
    let _ = writeln!(out, "Your mission: {}", tasks.mission);
    let _ = writeln!(out);
    let _ = writeln!(
        out,
        "You can only see the project through the tools you are given. All paths are \
         relative to the project root. Files can only be written with write_output, \
         and only under the output directory."
    );
    let c = manifest.constraints();
    let _ = writeln!(
        out,
        "Limits for the whole run: {} file reads, {} seconds.",
        c.max_file_reads, c.max_execution_time_seconds
    );
    let _ = write!(
        out,
        "When the task is finished, reply with a short summary and no tool calls."
    );
    out
}

pub(crate) fn task_prompt(
    task: &TaskSpec,
    allowed: &BTreeSet<ToolKind>,
    prior: &HashMap<String, String>,
) -> String {
    let mut out = String::new();
    let _ = writeln!(out, "Task {}: {}", task.id, task.name);
    if !task.description.is_empty() {
        let _ = writeln!(out, "{}", task.description);
    }
    let _ = writeln!(out);

    let tools: Vec<&str> = allowed.iter().map(ToolKind::as_str).collect();
    if tools.is_empty() {
        let _ = writeln!(out, "No tools are available for this task.");
    } else {
        let _ = writeln!(out, "Available tools: {}", tools.join(", "));
    }
    let _ = writeln!(
        out,
        "Write the result ({}) to `{}` with write_output.",
        task.output.kind,
        task.output.relative_path()
    );

    let finished: Vec<(&String, &String)> = task
        .depends_on
        .iter()
        .filter_map(|dep| prior.get(dep).map(|response| (dep, response)))
        .collect();
    if !finished.is_empty() {
        let _ = writeln!(out);
        let _ = writeln!(out, "Results of prerequisite tasks:");
        for (dep, response) in finished {
            let _ = writeln!(out, "- {dep}: {}", response.trim());
        }
    }
    out.trim_end().to_string()
}

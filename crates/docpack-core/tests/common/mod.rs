//! Shared fixtures: throwaway bundles and a scripted reasoning agent.

#![allow(dead_code)]

use std::collections::VecDeque;
use std::path::Path;
use std::sync::Mutex;
use std::time::Duration;

use async_trait::async_trait;
use docpack_core::{AgentError, AgentReply, Message, ReasoningAgent, ToolCall, ToolDefinition};
use serde_json::{json, Value};
use tempfile::TempDir;

pub const ALL_TOOLS: &[&str] = &[
    "list_files",
    "read_file",
    "read_image",
    "read_page_as_image",
    "search_index",
    "query_graph",
    "write_output",
];

/// Builds a bundle directory under a fresh temp dir.
pub struct BundleBuilder {
    tools: Vec<String>,
    max_file_reads: u32,
    max_seconds: u64,
    memory_mb: u64,
    files: Vec<(String, Vec<u8>)>,
    tasks: Option<Value>,
}

impl BundleBuilder {
    pub fn new() -> Self {
        Self {
            tools: ALL_TOOLS.iter().map(|t| t.to_string()).collect(),
            max_file_reads: 100,
            max_seconds: 300,
            memory_mb: 16,
            files: vec![(
                "README.md".to_string(),
                b"# Sample\n\nA sample project.\n".to_vec(),
            )],
            tasks: None,
        }
    }

    pub fn tools(mut self, tools: &[&str]) -> Self {
        self.tools = tools.iter().map(|t| t.to_string()).collect();
        self
    }

    pub fn max_file_reads(mut self, reads: u32) -> Self {
        self.max_file_reads = reads;
        self
    }

    pub fn max_seconds(mut self, secs: u64) -> Self {
        self.max_seconds = secs;
        self
    }

    pub fn file(mut self, path: &str, content: &str) -> Self {
        self.files.push((path.to_string(), content.as_bytes().to_vec()));
        self
    }

    pub fn tasks(mut self, tasks: Value) -> Self {
        self.tasks = Some(tasks);
        self
    }

    pub fn build(self) -> TempDir {
        let dir = tempfile::tempdir().unwrap();
        let root = dir.path();
        std::fs::create_dir_all(root.join("content")).unwrap();
        for (path, bytes) in &self.files {
            let target = root.join("content").join(path);
            if let Some(parent) = target.parent() {
                std::fs::create_dir_all(parent).unwrap();
            }
            std::fs::write(target, bytes).unwrap();
        }
        let manifest = json!({
            "version": "1.0",
            "name": "sample",
            "environment": {
                "tools": self.tools,
                "interpreter": "python3.12",
                "constraints": {
                    "max_file_reads": self.max_file_reads,
                    "max_execution_time_seconds": self.max_seconds,
                    "memory_limit_mb": self.memory_mb
                }
            }
        });
        std::fs::write(root.join("docpack.json"), manifest.to_string()).unwrap();
        if let Some(tasks) = &self.tasks {
            std::fs::write(root.join("tasks.json"), tasks.to_string()).unwrap();
        }
        dir
    }
}

/// `tasks.json` with one task per `(id, depends_on, output)` entry.
pub fn task_file(tasks: &[(&str, &[&str], &str)]) -> Value {
    let tasks: Vec<Value> = tasks
        .iter()
        .map(|(id, deps, output)| {
            json!({
                "id": id,
                "name": format!("Task {id}"),
                "description": format!("Do {id}."),
                "depends_on": deps,
                "output": {"type": "markdown", "path": output}
            })
        })
        .collect();
    json!({"mission": "Document the sample project", "tasks": tasks})
}

pub fn call(id: &str, name: &str, arguments: Value) -> ToolCall {
    ToolCall::new(id, name, arguments)
}

pub fn tools(calls: Vec<ToolCall>) -> Step {
    Step::Reply(AgentReply::ToolCalls {
        content: None,
        calls,
    })
}

pub fn done(content: &str) -> Step {
    Step::Reply(AgentReply::Final {
        content: content.to_string(),
    })
}

pub enum Step {
    Reply(AgentReply),
    /// Sleep in real time, then reply.
    Delayed(Duration, AgentReply),
    Fail(AgentError),
}

/// Replays a fixed script of turns and records every conversation it sees.
pub struct ScriptedAgent {
    steps: Mutex<VecDeque<Step>>,
    /// Served once the script runs out.
    fallback: Option<AgentReply>,
    seen: Mutex<Vec<Vec<Message>>>,
}

impl ScriptedAgent {
    pub fn new(steps: Vec<Step>) -> Self {
        Self {
            steps: Mutex::new(steps.into()),
            fallback: None,
            seen: Mutex::new(Vec::new()),
        }
    }

    pub fn repeating(reply: AgentReply) -> Self {
        Self {
            steps: Mutex::new(VecDeque::new()),
            fallback: Some(reply),
            seen: Mutex::new(Vec::new()),
        }
    }

    pub fn turns(&self) -> usize {
        self.seen.lock().unwrap().len()
    }

    pub fn conversations(&self) -> Vec<Vec<Message>> {
        self.seen.lock().unwrap().clone()
    }

    /// Content of every tool message sent to the agent so far.
    pub fn tool_messages(&self) -> Vec<Value> {
        let seen = self.seen.lock().unwrap();
        let Some(last) = seen.last() else {
            return Vec::new();
        };
        last.iter()
            .filter_map(|m| match m {
                Message::Tool { content, .. } => serde_json::from_str(content).ok(),
                _ => None,
            })
            .collect()
    }
}

#[async_trait]
impl ReasoningAgent for ScriptedAgent {
    fn name(&self) -> &str {
        "scripted"
    }

    async fn respond(
        &self,
        messages: &[Message],
        _tools: &[ToolDefinition],
    ) -> Result<AgentReply, AgentError> {
        self.seen.lock().unwrap().push(messages.to_vec());
        let step = self.steps.lock().unwrap().pop_front();
        match step {
            Some(Step::Reply(reply)) => Ok(reply),
            Some(Step::Delayed(delay, reply)) => {
                tokio::time::sleep(delay).await;
                Ok(reply)
            }
            Some(Step::Fail(err)) => Err(err),
            None => Ok(self.fallback.clone().unwrap_or(AgentReply::Final {
                content: "script exhausted".to_string(),
            })),
        }
    }
}

pub fn output_file(root: &Path, relative: &str) -> String {
    std::fs::read_to_string(root.join("output").join(relative)).unwrap()
}

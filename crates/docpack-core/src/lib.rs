//! Docpack Core Library
//!
//! Runs a reasoning agent over a `.docpack` bundle. The agent sees the
//! bundle's `content/` tree only through a closed set of tools, every call is
//! confined to the bundle root and charged against the manifest's quotas, and
//! the only writable area is `output/`.

pub mod agent;
pub mod bundle;
pub mod conversation;
pub mod obs;
pub mod orchestrator;
pub mod output;
pub mod sandbox;
pub mod task_graph;
pub mod telemetry;
pub mod tools;

pub use agent::{
    respond_with_controls, AgentError, AgentReply, ControlledReply, ReasoningAgent, RetryPolicy,
};
pub use bundle::{
    tree_stats, validate, Bundle, BundleError, BundleLayout, BundleResult, Constraints, Manifest,
    OutputSpec, TaskFile, TaskSpec, TreeStats, ValidationError, ValidationReport, MANIFEST_FILE,
    TASKS_FILE,
};
pub use conversation::{Conversation, Message};
pub use orchestrator::{
    Orchestrator, RunConfig, RunError, RunPhase, RunResult, RunSummary, TaskReport, TaskStatus,
};
pub use output::{list_output_files, OutputWriter, WriteAck, WriteDisposition, WriteMode};
pub use sandbox::{QuotaKind, Sandbox, SandboxError, SandboxLimits, SandboxUsage};
pub use task_graph::{TaskGraph, TaskGraphError};
pub use telemetry::init_tracing;
pub use tools::{
    ImageAttachment, PageRenderer, PdftoppmRenderer, RenderError, ToolCall, ToolDefinition,
    ToolError, ToolKind, ToolResult,
};

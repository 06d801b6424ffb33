//! Tool dispatch.

use std::collections::BTreeSet;
use std::sync::Arc;

use serde_json::{json, Value};
use tracing::{debug, warn};

use super::definitions::{definitions_for, ToolDefinition};
use super::index::{self, IndexCache};
use super::page::{PageRenderer, PdftoppmRenderer};
use super::result::{ToolOutcome, ToolResult};
use super::{fs, ToolCall, ToolError, ToolKind, ToolRequest};
use crate::output::{OutputWriter, WriteMode};
use crate::sandbox::Sandbox;

/// Mutable run state the tools operate on.
#[derive(Debug)]
pub struct ToolContext {
    pub sandbox: Sandbox,
    pub output: OutputWriter,
}

impl ToolContext {
    pub fn new(sandbox: Sandbox) -> Self {
        Self {
            sandbox,
            output: OutputWriter::new(),
        }
    }
}

/// Maps tool calls to implementations, gated by the manifest's tool set.
pub struct ToolRegistry {
    enabled: BTreeSet<ToolKind>,
    renderer: Arc<dyn PageRenderer>,
    index: IndexCache,
}

impl std::fmt::Debug for ToolRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ToolRegistry")
            .field("enabled", &self.enabled)
            .finish_non_exhaustive()
    }
}

impl ToolRegistry {
    pub fn new(enabled: BTreeSet<ToolKind>) -> Self {
        Self {
            enabled,
            renderer: Arc::new(PdftoppmRenderer::default()),
            index: IndexCache::default(),
        }
    }

    pub fn with_renderer(mut self, renderer: Arc<dyn PageRenderer>) -> Self {
        self.renderer = renderer;
        self
    }

    pub fn enabled(&self) -> &BTreeSet<ToolKind> {
        &self.enabled
    }

    /// Tools usable by a task: the task's subset intersected with the
    /// manifest's set.
    pub fn effective(&self, task_allowed: &BTreeSet<ToolKind>) -> BTreeSet<ToolKind> {
        self.enabled.intersection(task_allowed).copied().collect()
    }

    pub fn definitions(&self, task_allowed: &BTreeSet<ToolKind>) -> Vec<ToolDefinition> {
        definitions_for(&self.effective(task_allowed))
    }

    /// Execute one call. Never panics; every failure comes back as a
    /// [`ToolResult`] carrying a structured error.
    pub fn dispatch(
        &mut self,
        call: &ToolCall,
        task_allowed: &BTreeSet<ToolKind>,
        ctx: &mut ToolContext,
    ) -> ToolResult {
        let outcome = match self.execute(call, task_allowed, ctx) {
            Ok((payload, attachment)) => ToolOutcome::Success {
                payload,
                attachment,
            },
            Err(err) => {
                if let ToolError::Sandbox(e) = &err {
                    if !e.is_resource_exhaustion() {
                        warn!(tool = %call.name, call_id = %call.id, error = %e, "sandbox rejected tool call");
                    }
                }
                ToolOutcome::Failure(err)
            }
        };
        ToolResult {
            call_id: call.id.clone(),
            tool_name: call.name.clone(),
            outcome,
        }
    }

    fn execute(
        &mut self,
        call: &ToolCall,
        task_allowed: &BTreeSet<ToolKind>,
        ctx: &mut ToolContext,
    ) -> Result<(Value, Option<super::ImageAttachment>), ToolError> {
        let kind = ToolKind::parse(&call.name).ok_or_else(|| ToolError::UnknownTool {
            name: call.name.clone(),
        })?;
        if !self.enabled.contains(&kind) || !task_allowed.contains(&kind) {
            return Err(ToolError::NotPermitted { tool: kind });
        }
        let request = ToolRequest::parse(kind, &call.arguments)?;
        debug!(tool = %kind, call_id = %call.id, "executing tool");

        let ToolContext { sandbox, output } = ctx;
        match request {
            ToolRequest::ListFiles(args) => Ok((fs::list_files(sandbox, &args)?, None)),
            ToolRequest::ReadFile(args) => Ok((fs::read_file(sandbox, &args)?, None)),
            ToolRequest::ReadImage(args) => {
                let (payload, image) = fs::read_image(sandbox, &args)?;
                Ok((payload, Some(image)))
            }
            ToolRequest::ReadPage(args) => {
                let (payload, image) = fs::read_page(sandbox, self.renderer.as_ref(), &args)?;
                Ok((payload, Some(image)))
            }
            ToolRequest::SearchIndex(args) => {
                Ok((index::search_index(&mut self.index, sandbox, &args)?, None))
            }
            ToolRequest::QueryGraph(args) => {
                Ok((index::query_graph(&mut self.index, sandbox, &args)?, None))
            }
            ToolRequest::WriteOutput(args) => {
                let ack = output.write(
                    sandbox,
                    &args.path,
                    args.content.as_bytes(),
                    WriteMode::from_overwrite(args.overwrite),
                )?;
                Ok((json!(ack), None))
            }
        }
    }
}

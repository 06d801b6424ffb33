//! Drives the reasoning agent through a bundle's tasks.
//!
//! One run owns one [`Sandbox`], one output writer and one tool registry.
//! Tasks run one at a time in task-graph order; tool calls within an agent
//! turn run sequentially in the order received. Awaiting the agent is the
//! only suspension point, and it never outlives the run's time limit.

mod prompt;
pub mod report;
pub mod state;

use std::collections::{BTreeSet, HashMap};
use std::sync::Arc;
use std::time::{Duration, Instant};

use chrono::Utc;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{debug, warn};
use uuid::Uuid;

pub use report::{RunSummary, TaskReport, TaskStatus};
pub use state::{InvalidTransition, RunPhase};

use crate::agent::{respond_with_controls, AgentReply, ReasoningAgent, RetryPolicy};
use crate::bundle::{Bundle, BundleError, TaskSpec};
use crate::conversation::Conversation;
use crate::obs;
use crate::sandbox::{Sandbox, SandboxError, SandboxLimits};
use crate::tools::{
    ImageAttachment, PageRenderer, PdftoppmRenderer, ToolContext, ToolKind, ToolRegistry,
};
use state::PhaseTracker;

/// Consecutive quota or deadline tool failures that end a task.
const RESOURCE_STRIKE_LIMIT: u32 = 2;

const RUN_TIME_EXCEEDED: &str = "run time limit exceeded";

#[derive(Debug, Error)]
pub enum RunError {
    #[error(transparent)]
    Bundle(#[from] BundleError),

    #[error("failed to set up sandbox: {0}")]
    Sandbox(#[from] SandboxError),

    #[error(transparent)]
    InvalidTransition(#[from] InvalidTransition),
}

pub type RunResult<T> = std::result::Result<T, RunError>;

/// Per-run knobs that are not part of the bundle.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RunConfig {
    pub max_iterations_per_task: u32,
    pub agent_timeout: Duration,
    pub agent_max_retries: u32,
    pub agent_backoff_base: Duration,
    /// Total bytes `write_output` may persist; `None` uses the memory limit.
    pub max_output_bytes: Option<u64>,
}

impl Default for RunConfig {
    fn default() -> Self {
        let retry = RetryPolicy::default();
        Self {
            max_iterations_per_task: 15,
            agent_timeout: retry.timeout,
            agent_max_retries: retry.max_retries,
            agent_backoff_base: retry.backoff_base,
            max_output_bytes: None,
        }
    }
}

impl RunConfig {
    pub fn retry_policy(&self) -> RetryPolicy {
        RetryPolicy {
            timeout: self.agent_timeout,
            max_retries: self.agent_max_retries,
            backoff_base: self.agent_backoff_base,
        }
    }
}

pub struct Orchestrator<A> {
    bundle: Bundle,
    agent: A,
    config: RunConfig,
    renderer: Arc<dyn PageRenderer>,
}

impl<A: ReasoningAgent> Orchestrator<A> {
    pub fn new(bundle: Bundle, agent: A) -> Self {
        Self {
            bundle,
            agent,
            config: RunConfig::default(),
            renderer: Arc::new(PdftoppmRenderer::default()),
        }
    }

    pub fn with_config(mut self, config: RunConfig) -> Self {
        self.config = config;
        self
    }

    pub fn with_renderer(mut self, renderer: Arc<dyn PageRenderer>) -> Self {
        self.renderer = renderer;
        self
    }

    pub fn bundle(&self) -> &Bundle {
        &self.bundle
    }

    pub fn config(&self) -> &RunConfig {
        &self.config
    }

    /// Execute every task once and return the run summary.
    ///
    /// Only setup failures are errors. Everything that goes wrong inside a
    /// task is recorded in that task's [`TaskReport`].
    pub async fn run(&self) -> RunResult<RunSummary> {
        let run_id = Uuid::new_v4();
        obs::RunSpan::new(&run_id.to_string())
            .wrap(self.execute(run_id))
            .await
    }

    async fn execute(&self, run_id: Uuid) -> RunResult<RunSummary> {
        let run_id_str = run_id.to_string();
        let started_at = Utc::now();
        let clock = Instant::now();

        let limits = SandboxLimits::from_constraints(self.bundle.manifest.constraints())
            .with_output_budget(self.config.max_output_bytes);
        let sandbox = Sandbox::new(&self.bundle.layout, limits)?;
        let mut ctx = ToolContext::new(sandbox);
        let mut registry =
            ToolRegistry::new(self.bundle.manifest.tools().clone()).with_renderer(self.renderer.clone());
        let mut phase = PhaseTracker::new();

        let ordered = self.bundle.ordered_tasks();
        obs::emit_run_started(
            &run_id_str,
            &self.bundle.manifest.name,
            self.agent.name(),
            ordered.len(),
        );

        let system = prompt::system_prompt(&self.bundle.manifest, &self.bundle.tasks);
        let mut statuses: HashMap<String, TaskStatus> = HashMap::new();
        let mut responses: HashMap<String, String> = HashMap::new();
        let mut reports = Vec::with_capacity(ordered.len());

        for task in ordered {
            let blocked = task
                .depends_on
                .iter()
                .find(|dep| statuses.get(dep.as_str()) != Some(&TaskStatus::Completed));
            let report = if let Some(dep) = blocked {
                self.skipped(
                    &ctx,
                    task,
                    TaskStatus::SkippedDueToDependency,
                    format!("dependency '{dep}' did not complete"),
                )
            } else if ctx.sandbox.deadline_passed() {
                self.skipped(
                    &ctx,
                    task,
                    TaskStatus::SkippedDueToDeadline,
                    "run deadline passed before the task started".to_string(),
                )
            } else {
                phase.advance(RunPhase::Running)?;
                let report = self
                    .run_task(task, &system, &responses, &mut registry, &mut ctx, &mut phase)
                    .await?;
                phase.advance(RunPhase::TaskComplete)?;
                report
            };

            obs::emit_task_finished(&task.id, report.status, report.iterations, report.tool_calls);
            if let Some(response) = &report.final_response {
                responses.insert(task.id.clone(), response.clone());
            }
            statuses.insert(task.id.clone(), report.status);
            reports.push(report);
        }

        phase.advance(RunPhase::Finished)?;
        let summary = RunSummary {
            run_id,
            bundle: self.bundle.manifest.name.clone(),
            agent: self.agent.name().to_string(),
            mission: self.bundle.tasks.mission.clone(),
            exploration: self.bundle.tasks.exploration,
            started_at,
            finished_at: Utc::now(),
            output_files: ctx.output.written(),
            usage: ctx.sandbox.usage(),
            tasks: reports,
        };
        phase.advance(RunPhase::Terminated)?;

        obs::emit_run_finished(
            &run_id_str,
            clock.elapsed().as_millis() as u64,
            summary.count(TaskStatus::Completed),
            summary.tasks.len(),
        );
        Ok(summary)
    }

    async fn run_task(
        &self,
        task: &TaskSpec,
        system: &str,
        responses: &HashMap<String, String>,
        registry: &mut ToolRegistry,
        ctx: &mut ToolContext,
        phase: &mut PhaseTracker,
    ) -> RunResult<TaskReport> {
        let started_at = Utc::now();
        let allowed: BTreeSet<ToolKind> = registry.effective(&task.tools_allowed);
        let definitions = registry.definitions(&task.tools_allowed);
        let policy = self.config.retry_policy();
        obs::emit_task_started(&task.id, allowed.len());

        let mut convo = Conversation::new(system, prompt::task_prompt(task, &allowed, responses));
        let mut iterations = 0u32;
        let mut tool_calls = 0u32;
        let mut strikes = 0u32;

        let (status, final_response, detail) = 'turns: loop {
            if iterations >= self.config.max_iterations_per_task {
                break (
                    TaskStatus::IncompleteByIterationLimit,
                    None,
                    Some(format!(
                        "no final response after {} iterations",
                        self.config.max_iterations_per_task
                    )),
                );
            }

            if ctx.sandbox.deadline_passed() {
                warn!(task_id = %task.id, "run deadline reached, ending task");
                break (
                    TaskStatus::ResourceExhausted,
                    None,
                    Some(RUN_TIME_EXCEEDED.to_string()),
                );
            }

            iterations += 1;
            let budget = Some(ctx.sandbox.remaining());
            let reply = match respond_with_controls(
                &self.agent,
                &policy,
                budget,
                convo.messages(),
                &definitions,
            )
            .await
            {
                Ok(controlled) => controlled.reply,
                Err(err) if ctx.sandbox.deadline_passed() => {
                    warn!(task_id = %task.id, error = %err, "agent call cut off by run deadline");
                    break (
                        TaskStatus::ResourceExhausted,
                        None,
                        Some(RUN_TIME_EXCEEDED.to_string()),
                    );
                }
                Err(err) => {
                    warn!(task_id = %task.id, error = %err, "agent call failed");
                    break (
                        TaskStatus::ResourceExhausted,
                        None,
                        Some(format!("agent communication failure: {err}")),
                    );
                }
            };

            let (content, calls) = match reply {
                AgentReply::ToolCalls { content, calls } if !calls.is_empty() => (content, calls),
                AgentReply::ToolCalls { content, .. } => {
                    break (TaskStatus::Completed, Some(content.unwrap_or_default()), None)
                }
                AgentReply::Final { content } => break (TaskStatus::Completed, Some(content), None),
            };

            phase.advance(RunPhase::ToolPending)?;
            convo.push_assistant(content, calls.clone());
            let mut images: Vec<ImageAttachment> = Vec::new();
            for call in &calls {
                tool_calls += 1;
                obs::emit_tool_dispatched(&task.id, &call.name, &call.id);
                let result = registry.dispatch(call, &task.tools_allowed, ctx);
                if let Some(err) = result.error() {
                    obs::emit_tool_rejected(&task.id, &call.name, err.kind(), err);
                }
                convo.push_tool_result(&result);
                images.extend(result.attachment().cloned());

                if result.is_resource_exhaustion() {
                    strikes += 1;
                    if strikes >= RESOURCE_STRIKE_LIMIT {
                        let message = result
                            .error()
                            .map(ToString::to_string)
                            .unwrap_or_default();
                        break 'turns (
                            TaskStatus::ResourceExhausted,
                            None,
                            Some(format!("repeated resource failure: {message}")),
                        );
                    }
                } else {
                    strikes = 0;
                }
            }
            convo.push_images(images);
            phase.advance(RunPhase::Running)?;
        };

        debug!(task_id = %task.id, messages = convo.len(), "task conversation closed");
        Ok(TaskReport {
            task_id: task.id.clone(),
            name: task.name.clone(),
            status,
            iterations,
            tool_calls,
            output_path: task.output.relative_path(),
            output_present: output_present(&ctx.sandbox, task),
            final_response,
            detail,
            started_at: Some(started_at),
            finished_at: Utc::now(),
        })
    }

    fn skipped(
        &self,
        ctx: &ToolContext,
        task: &TaskSpec,
        status: TaskStatus,
        detail: String,
    ) -> TaskReport {
        warn!(task_id = %task.id, status = %status, reason = %detail, "task skipped");
        TaskReport {
            task_id: task.id.clone(),
            name: task.name.clone(),
            status,
            iterations: 0,
            tool_calls: 0,
            output_path: task.output.relative_path(),
            output_present: output_present(&ctx.sandbox, task),
            final_response: None,
            detail: Some(detail),
            started_at: None,
            finished_at: Utc::now(),
        }
    }
}

fn output_present(sandbox: &Sandbox, task: &TaskSpec) -> bool {
    sandbox
        .resolve_output(&task.output.relative_path())
        .map(|path| path.is_file())
        .unwrap_or(false)
}

//! Reasoning-agent contract and the call controls the orchestrator wraps it in.
//!
//! The orchestrator never trusts an agent to bound itself: every call goes
//! through [`respond_with_controls`], which applies a `tokio::time::timeout`
//! per attempt and retries retryable failures with exponential backoff,
//! all inside whatever time the run has left.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tokio::time::Instant;
use tracing::warn;

use crate::conversation::Message;
use crate::tools::{ToolCall, ToolDefinition};

/// One agent turn.
#[derive(Debug, Clone, PartialEq)]
pub enum AgentReply {
    /// The agent wants tools run; `content` is any accompanying text.
    ToolCalls {
        content: Option<String>,
        calls: Vec<ToolCall>,
    },
    /// The agent considers the task done.
    Final { content: String },
}

#[derive(Debug, Error)]
pub enum AgentError {
    #[error("agent transport error: {0}")]
    Transport(String),

    #[error("agent returned HTTP {status}: {message}")]
    Http { status: u16, message: String },

    #[error("agent authentication failed: {0}")]
    Auth(String),

    #[error("agent call timed out after {0:?}")]
    Timeout(Duration),

    #[error("malformed agent response: {0}")]
    InvalidResponse(String),

    #[error("agent configuration error: {0}")]
    Config(String),
}

impl AgentError {
    /// Transient failures worth another attempt.
    pub fn is_retryable(&self) -> bool {
        match self {
            AgentError::Transport(_) | AgentError::Timeout(_) | AgentError::InvalidResponse(_) => {
                true
            }
            AgentError::Http { status, .. } => *status == 429 || *status >= 500,
            AgentError::Auth(_) | AgentError::Config(_) => false,
        }
    }
}

/// An external reasoning agent (typically an LLM behind an HTTP API).
#[async_trait]
pub trait ReasoningAgent: Send + Sync {
    /// Model or agent identifier, for logs and summaries.
    fn name(&self) -> &str;

    async fn respond(
        &self,
        messages: &[Message],
        tools: &[ToolDefinition],
    ) -> Result<AgentReply, AgentError>;
}

#[async_trait]
impl<T: ReasoningAgent + ?Sized> ReasoningAgent for Arc<T> {
    fn name(&self) -> &str {
        (**self).name()
    }

    async fn respond(
        &self,
        messages: &[Message],
        tools: &[ToolDefinition],
    ) -> Result<AgentReply, AgentError> {
        (**self).respond(messages, tools).await
    }
}

/// Timeout and retry controls for agent calls.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RetryPolicy {
    pub timeout: Duration,
    /// Retries after the first attempt (0 = run once).
    pub max_retries: u32,
    pub backoff_base: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            timeout: Duration::from_secs(120),
            max_retries: 2,
            backoff_base: Duration::from_millis(500),
        }
    }
}

impl RetryPolicy {
    /// Delay before retry number `attempt` (1-based): `base * 2^(attempt-1)`.
    pub fn backoff(&self, attempt: u32) -> Duration {
        let factor = 2u32.saturating_pow(attempt.saturating_sub(1));
        self.backoff_base.saturating_mul(factor)
    }
}

/// Successful agent turn and the number of attempts it took.
#[derive(Debug, Clone, PartialEq)]
pub struct ControlledReply {
    pub reply: AgentReply,
    pub attempts: u32,
}

/// Call the agent under `policy`, never past `budget` when one is given.
///
/// Each attempt's timeout is clamped to the time left in the budget, and no
/// retry is scheduled whose backoff would end past it.
pub async fn respond_with_controls(
    agent: &dyn ReasoningAgent,
    policy: &RetryPolicy,
    budget: Option<Duration>,
    messages: &[Message],
    tools: &[ToolDefinition],
) -> Result<ControlledReply, AgentError> {
    let deadline = budget.map(|b| Instant::now() + b);
    let max_attempts = policy.max_retries.saturating_add(1);
    let mut attempt = 1;
    loop {
        let limit = match deadline {
            Some(at) => policy
                .timeout
                .min(at.saturating_duration_since(Instant::now())),
            None => policy.timeout,
        };
        if limit.is_zero() {
            return Err(AgentError::Timeout(limit));
        }

        let result = match tokio::time::timeout(limit, agent.respond(messages, tools)).await {
            Ok(inner) => inner,
            Err(_elapsed) => Err(AgentError::Timeout(limit)),
        };

        match result {
            Ok(reply) => {
                return Ok(ControlledReply {
                    reply,
                    attempts: attempt,
                })
            }
            Err(err) if err.is_retryable() && attempt < max_attempts => {
                let delay = policy.backoff(attempt);
                if deadline.is_some_and(|at| Instant::now() + delay >= at) {
                    warn!(agent = %agent.name(), attempt, error = %err, "no time left to retry agent call");
                    return Err(err);
                }
                warn!(
                    agent = %agent.name(),
                    attempt,
                    max_attempts,
                    delay_ms = delay.as_millis() as u64,
                    error = %err,
                    "agent call failed, retrying"
                );
                tokio::time::sleep(delay).await;
                attempt += 1;
            }
            Err(err) => return Err(err),
        }
    }
}

//! HTTP client for OpenAI-compatible chat-completions endpoints.

use async_trait::async_trait;
use docpack_core::{AgentError, AgentReply, Message, ReasoningAgent, ToolDefinition};
use tracing::debug;

use crate::config::AgentConfig;
use crate::error::{map_http_status, map_reqwest_error};
use crate::mapping;

/// A [`ReasoningAgent`] backed by OpenAI or a local Ollama server.
///
/// ```no_run
/// use docpack_agent::{AgentConfig, OpenAiCompatibleAgent};
///
/// let agent = OpenAiCompatibleAgent::new(AgentConfig::from_env()?)?;
/// # Ok::<(), docpack_core::AgentError>(())
/// ```
#[derive(Debug, Clone)]
pub struct OpenAiCompatibleAgent {
    config: AgentConfig,
    http: reqwest::Client,
    endpoint: String,
}

impl OpenAiCompatibleAgent {
    pub fn new(config: AgentConfig) -> Result<Self, AgentError> {
        let http = reqwest::Client::builder()
            .timeout(config.http_timeout)
            .build()
            .map_err(|e| AgentError::Config(format!("failed to build HTTP client: {e}")))?;
        Ok(Self {
            endpoint: config.completions_url(),
            config,
            http,
        })
    }

    pub fn config(&self) -> &AgentConfig {
        &self.config
    }
}

#[async_trait]
impl ReasoningAgent for OpenAiCompatibleAgent {
    fn name(&self) -> &str {
        &self.config.model
    }

    async fn respond(
        &self,
        messages: &[Message],
        tools: &[ToolDefinition],
    ) -> Result<AgentReply, AgentError> {
        let request = mapping::to_request(&self.config.model, messages, tools);
        debug!(
            backend = %self.config.backend,
            model = %self.config.model,
            messages = messages.len(),
            tools = tools.len(),
            "sending chat completion"
        );

        let response = self
            .http
            .post(&self.endpoint)
            .bearer_auth(&self.config.api_key)
            .json(&request)
            .send()
            .await
            .map_err(|e| map_reqwest_error(e, self.config.http_timeout))?;

        let status = response.status();
        let body = response
            .text()
            .await
            .map_err(|e| map_reqwest_error(e, self.config.http_timeout))?;
        if !status.is_success() {
            return Err(map_http_status(status.as_u16(), &body));
        }
        mapping::from_response(&body)
    }
}

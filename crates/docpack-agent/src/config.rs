//! Agent backend selection from the environment.

use std::time::Duration;

use docpack_core::AgentError;
use serde::Serialize;

pub const DEFAULT_OPENAI_BASE_URL: &str = "https://api.openai.com/v1";
pub const DEFAULT_OPENAI_MODEL: &str = "gpt-4o-mini";
pub const DEFAULT_OLLAMA_BASE_URL: &str = "http://host.docker.internal:11434/v1";
pub const DEFAULT_OLLAMA_MODEL: &str = "llama3.1:8b";
pub const DEFAULT_HTTP_TIMEOUT_SECS: u64 = 120;

/// Ollama ignores the key but its OpenAI-compatible endpoint wants one.
const OLLAMA_API_KEY: &str = "ollama";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Backend {
    OpenAi,
    Ollama,
}

impl std::fmt::Display for Backend {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Backend::OpenAi => write!(f, "openai"),
            Backend::Ollama => write!(f, "ollama"),
        }
    }
}

#[derive(Clone, PartialEq, Eq)]
pub struct AgentConfig {
    pub backend: Backend,
    pub base_url: String,
    pub api_key: String,
    pub model: String,
    /// Per-request HTTP timeout. The orchestrator applies its own on top.
    pub http_timeout: Duration,
}

impl std::fmt::Debug for AgentConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AgentConfig")
            .field("backend", &self.backend)
            .field("base_url", &self.base_url)
            .field("api_key", &"<redacted>")
            .field("model", &self.model)
            .field("http_timeout", &self.http_timeout)
            .finish()
    }
}

impl AgentConfig {
    /// Read `USE_OLLAMA`, `OLLAMA_BASE_URL`, `OLLAMA_MODEL`, `OPENAI_API_KEY`,
    /// `OPENAI_BASE_URL`, `OPENAI_MODEL` and `AGENT_HTTP_TIMEOUT_SECS`.
    pub fn from_env() -> Result<Self, AgentError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    pub fn from_lookup<F>(lookup: F) -> Result<Self, AgentError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let var = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

        let use_ollama = var("USE_OLLAMA")
            .map(|v| matches!(v.trim().to_ascii_lowercase().as_str(), "true" | "1" | "yes"))
            .unwrap_or(false);

        let http_timeout = match var("AGENT_HTTP_TIMEOUT_SECS") {
            Some(raw) => {
                let secs: u64 = raw.trim().parse().map_err(|_| {
                    AgentError::Config(format!("AGENT_HTTP_TIMEOUT_SECS is not a number: {raw}"))
                })?;
                if secs == 0 {
                    return Err(AgentError::Config(
                        "AGENT_HTTP_TIMEOUT_SECS must be greater than zero".to_string(),
                    ));
                }
                Duration::from_secs(secs)
            }
            None => Duration::from_secs(DEFAULT_HTTP_TIMEOUT_SECS),
        };

        if use_ollama {
            return Ok(Self {
                backend: Backend::Ollama,
                base_url: var("OLLAMA_BASE_URL")
                    .unwrap_or_else(|| DEFAULT_OLLAMA_BASE_URL.to_string()),
                api_key: OLLAMA_API_KEY.to_string(),
                model: var("OLLAMA_MODEL").unwrap_or_else(|| DEFAULT_OLLAMA_MODEL.to_string()),
                http_timeout,
            });
        }

        let api_key = var("OPENAI_API_KEY").ok_or_else(|| {
            AgentError::Config(
                "OPENAI_API_KEY is not set (set USE_OLLAMA=true to use Ollama instead)"
                    .to_string(),
            )
        })?;
        Ok(Self {
            backend: Backend::OpenAi,
            base_url: var("OPENAI_BASE_URL").unwrap_or_else(|| DEFAULT_OPENAI_BASE_URL.to_string()),
            api_key,
            model: var("OPENAI_MODEL").unwrap_or_else(|| DEFAULT_OPENAI_MODEL.to_string()),
            http_timeout,
        })
    }

    pub fn with_model(mut self, model: impl Into<String>) -> Self {
        self.model = model.into();
        self
    }

    pub(crate) fn completions_url(&self) -> String {
        format!("{}/chat/completions", self.base_url.trim_end_matches('/'))
    }
}

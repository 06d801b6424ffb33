//! Reasoning agent over the Chat Completions API.
//!
//! Talks to OpenAI, or to Ollama's OpenAI-compatible endpoint when
//! `USE_OLLAMA=true`. Timeouts and retries around each call belong to the
//! orchestrator; this crate only performs one request per
//! [`ReasoningAgent::respond`](docpack_core::ReasoningAgent::respond).

pub mod client;
pub mod config;
pub(crate) mod error;
pub(crate) mod mapping;
pub mod types;

pub use client::OpenAiCompatibleAgent;
pub use config::{AgentConfig, Backend};

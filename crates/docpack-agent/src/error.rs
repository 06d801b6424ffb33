//! Mapping HTTP and reqwest failures onto [`AgentError`].

use std::time::Duration;

use docpack_core::AgentError;

use crate::types::ErrorBody;

/// Map a non-success HTTP status to an [`AgentError`].
///
/// 401 and 403 are authentication failures and are never retried; every other
/// status keeps its code so the caller can decide (429 and 5xx are retryable).
pub(crate) fn map_http_status(status: u16, body: &str) -> AgentError {
    let message = error_message(body);
    match status {
        401 | 403 => AgentError::Auth(message),
        _ => AgentError::Http { status, message },
    }
}

/// Prefer the provider's `error.message`; fall back to the raw body.
fn error_message(body: &str) -> String {
    match serde_json::from_str::<ErrorBody>(body) {
        Ok(parsed) => parsed.error.message,
        Err(_) => body.trim().to_string(),
    }
}

pub(crate) fn map_reqwest_error(err: reqwest::Error, timeout: Duration) -> AgentError {
    if err.is_timeout() {
        AgentError::Timeout(timeout)
    } else if err.is_decode() {
        AgentError::InvalidResponse(err.to_string())
    } else {
        AgentError::Transport(err.to_string())
    }
}

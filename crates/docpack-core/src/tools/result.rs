//! Tool results as returned to the orchestrator.

use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

use super::ToolError;

/// An image produced by a tool, forwarded to vision-capable agents as a
/// follow-up user message.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ImageAttachment {
    /// Bundle-relative source path, for the caption.
    pub source: String,
    pub mime_type: String,
    /// Base64 (standard alphabet) image bytes.
    pub data: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub page: Option<u32>,
}

impl ImageAttachment {
    pub fn data_url(&self) -> String {
        format!("data:{};base64,{}", self.mime_type, self.data)
    }

    pub fn caption(&self) -> String {
        match self.page {
            Some(page) => format!("Analyze this image from {} (page {page}):", self.source),
            None => format!("Analyze this image from {}:", self.source),
        }
    }
}

#[derive(Debug)]
pub enum ToolOutcome {
    Success {
        payload: Value,
        attachment: Option<ImageAttachment>,
    },
    Failure(ToolError),
}

/// Result of dispatching one [`super::ToolCall`].
#[derive(Debug)]
pub struct ToolResult {
    pub call_id: String,
    pub tool_name: String,
    pub outcome: ToolOutcome,
}

impl ToolResult {
    pub fn is_ok(&self) -> bool {
        matches!(self.outcome, ToolOutcome::Success { .. })
    }

    pub fn error(&self) -> Option<&ToolError> {
        match &self.outcome {
            ToolOutcome::Failure(e) => Some(e),
            ToolOutcome::Success { .. } => None,
        }
    }

    pub fn attachment(&self) -> Option<&ImageAttachment> {
        match &self.outcome {
            ToolOutcome::Success { attachment, .. } => attachment.as_ref(),
            ToolOutcome::Failure(_) => None,
        }
    }

    pub fn is_resource_exhaustion(&self) -> bool {
        self.error().is_some_and(ToolError::is_resource_exhaustion)
    }

    /// The JSON document placed in the `tool` message. Success payloads are
    /// objects with `"ok": true` merged in.
    pub fn payload(&self) -> Value {
        match &self.outcome {
            ToolOutcome::Success { payload, .. } => match payload {
                Value::Object(map) => {
                    let mut map = map.clone();
                    map.insert("ok".to_string(), Value::Bool(true));
                    Value::Object(map)
                }
                other => json!({ "ok": true, "result": other }),
            },
            ToolOutcome::Failure(err) => err.to_payload(),
        }
    }

    pub fn content(&self) -> String {
        self.payload().to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn result(outcome: ToolOutcome) -> ToolResult {
        ToolResult {
            call_id: "c1".to_string(),
            tool_name: "list_files".to_string(),
            outcome,
        }
    }

    #[test]
    fn test_success_payload_merges_ok_flag() {
        let result = result(ToolOutcome::Success {
            payload: json!({"files": ["a.md"]}),
            attachment: None,
        });
        let parsed: Value = serde_json::from_str(&result.content()).unwrap();
        assert_eq!(parsed["ok"], json!(true));
        assert_eq!(parsed["files"], json!(["a.md"]));
    }

    #[test]
    fn test_failure_payload_is_parseable() {
        let result = result(ToolOutcome::Failure(ToolError::UnknownTool {
            name: "shell".to_string(),
        }));
        assert!(!result.is_ok());
        let parsed: Value = serde_json::from_str(&result.content()).unwrap();
        assert_eq!(parsed["error"]["kind"], json!("unknown_tool"));
    }

    #[test]
    fn test_attachment_data_url() {
        let image = ImageAttachment {
            source: "docs/arch.pdf".to_string(),
            mime_type: "image/png".to_string(),
            data: "AAAA".to_string(),
            page: Some(3),
        };
        assert_eq!(image.data_url(), "data:image/png;base64,AAAA");
        assert!(image.caption().contains("(page 3)"));
    }
}

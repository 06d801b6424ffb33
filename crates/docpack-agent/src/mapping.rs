//! Conversions between docpack conversations and Chat Completions payloads.

use docpack_core::{AgentError, AgentReply, Message, ToolCall, ToolDefinition};
use serde_json::{Map, Value};
use tracing::debug;

use crate::types::{
    ChatContent, ChatFunction, ChatMessage, ChatRequest, ChatResponse, ChatTool, ContentPart,
    ImageUrl, WireFunctionCall, WireToolCall,
};

pub(crate) fn to_request(model: &str, messages: &[Message], tools: &[ToolDefinition]) -> ChatRequest {
    ChatRequest {
        model: model.to_string(),
        messages: messages.iter().map(map_message).collect(),
        tool_choice: (!tools.is_empty()).then(|| "auto".to_string()),
        tools: tools.iter().map(map_tool).collect(),
    }
}

fn map_message(message: &Message) -> ChatMessage {
    let base = |role| ChatMessage {
        role,
        content: None,
        tool_calls: None,
        tool_call_id: None,
        name: None,
    };
    match message {
        Message::System { content } => ChatMessage {
            content: Some(ChatContent::Text(content.clone())),
            ..base("system")
        },
        Message::User { content, images } if images.is_empty() => ChatMessage {
            content: Some(ChatContent::Text(content.clone())),
            ..base("user")
        },
        Message::User { content, images } => {
            let mut parts = vec![ContentPart::Text {
                text: content.clone(),
            }];
            parts.extend(images.iter().map(|image| ContentPart::ImageUrl {
                image_url: ImageUrl {
                    url: image.data_url(),
                },
            }));
            ChatMessage {
                content: Some(ChatContent::Parts(parts)),
                ..base("user")
            }
        }
        Message::Assistant {
            content,
            tool_calls,
        } => ChatMessage {
            content: content.clone().map(ChatContent::Text),
            tool_calls: (!tool_calls.is_empty())
                .then(|| tool_calls.iter().map(map_tool_call).collect()),
            ..base("assistant")
        },
        Message::Tool {
            tool_call_id,
            name,
            content,
        } => ChatMessage {
            content: Some(ChatContent::Text(content.clone())),
            tool_call_id: Some(tool_call_id.clone()),
            name: Some(name.clone()),
            ..base("tool")
        },
    }
}

fn map_tool_call(call: &ToolCall) -> WireToolCall {
    WireToolCall {
        id: call.id.clone(),
        call_type: "function".to_string(),
        function: WireFunctionCall {
            name: call.name.clone(),
            arguments: Value::String(call.arguments.to_string()),
        },
    }
}

fn map_tool(tool: &ToolDefinition) -> ChatTool {
    ChatTool {
        tool_type: "function",
        function: ChatFunction {
            name: tool.name.clone(),
            description: tool.description.clone(),
            parameters: tool.parameters.clone(),
        },
    }
}

/// Decode the first choice into an [`AgentReply`].
pub(crate) fn from_response(body: &str) -> Result<AgentReply, AgentError> {
    let response: ChatResponse = serde_json::from_str(body)
        .map_err(|e| AgentError::InvalidResponse(format!("invalid completion body: {e}")))?;
    let choice = response
        .choices
        .into_iter()
        .next()
        .ok_or_else(|| AgentError::InvalidResponse("response has no choices".to_string()))?;
    if let Some(usage) = &response.usage {
        debug!(
            prompt_tokens = usage.prompt_tokens,
            completion_tokens = usage.completion_tokens,
            finish_reason = choice.finish_reason.as_deref().unwrap_or("unknown"),
            "completion received"
        );
    }

    let content = choice.message.content.filter(|c| !c.trim().is_empty());
    let calls: Vec<ToolCall> = choice
        .message
        .tool_calls
        .unwrap_or_default()
        .into_iter()
        .enumerate()
        .map(|(i, wire)| {
            let id = if wire.id.is_empty() {
                format!("call_{i}")
            } else {
                wire.id
            };
            ToolCall::new(id, wire.function.name, decode_arguments(wire.function.arguments))
        })
        .collect();

    if calls.is_empty() {
        return Ok(AgentReply::Final {
            content: content.unwrap_or_default(),
        });
    }
    Ok(AgentReply::ToolCalls { content, calls })
}

/// Arguments arrive as a JSON string, an object, or nothing. A string that
/// does not parse is passed through unchanged so the tool layer reports it
/// to the agent as invalid arguments.
fn decode_arguments(raw: Value) -> Value {
    match raw {
        Value::String(text) if text.trim().is_empty() => Value::Object(Map::new()),
        Value::String(text) => serde_json::from_str(&text).unwrap_or(Value::String(text)),
        Value::Null => Value::Object(Map::new()),
        other => other,
    }
}

//! Per-task conversation with the reasoning agent.
//!
//! A [`Conversation`] is append-only and lives for exactly one task.

use serde::{Deserialize, Serialize};

use crate::tools::{ImageAttachment, ToolCall, ToolResult};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "role", rename_all = "snake_case")]
pub enum Message {
    System {
        content: String,
    },
    User {
        content: String,
        #[serde(default, skip_serializing_if = "Vec::is_empty")]
        images: Vec<ImageAttachment>,
    },
    Assistant {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        content: Option<String>,
        #[serde(default, skip_serializing_if = "Vec::is_empty")]
        tool_calls: Vec<ToolCall>,
    },
    Tool {
        tool_call_id: String,
        name: String,
        content: String,
    },
}

impl Message {
    pub fn system(content: impl Into<String>) -> Self {
        Message::System {
            content: content.into(),
        }
    }

    pub fn user(content: impl Into<String>) -> Self {
        Message::User {
            content: content.into(),
            images: Vec::new(),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct Conversation {
    messages: Vec<Message>,
}

impl Conversation {
    pub fn new(system: impl Into<String>, user: impl Into<String>) -> Self {
        Self {
            messages: vec![Message::system(system), Message::user(user)],
        }
    }

    pub fn messages(&self) -> &[Message] {
        &self.messages
    }

    pub fn len(&self) -> usize {
        self.messages.len()
    }

    pub fn is_empty(&self) -> bool {
        self.messages.is_empty()
    }

    pub fn push_user(&mut self, content: impl Into<String>) {
        self.messages.push(Message::user(content));
    }

    pub fn push_assistant(&mut self, content: Option<String>, tool_calls: Vec<ToolCall>) {
        self.messages.push(Message::Assistant {
            content,
            tool_calls,
        });
    }

    /// Append the reply to one tool call. Any image it carries is left to
    /// [`Conversation::push_images`].
    pub fn push_tool_result(&mut self, result: &ToolResult) {
        self.messages.push(Message::Tool {
            tool_call_id: result.call_id.clone(),
            name: result.tool_name.clone(),
            content: result.content(),
        });
    }

    /// Append one user message per image. Call this only after every tool
    /// reply of the turn: providers expect the tool messages to directly
    /// follow the assistant message that requested them.
    pub fn push_images(&mut self, images: Vec<ImageAttachment>) {
        for image in images {
            self.messages.push(Message::User {
                content: image.caption(),
                images: vec![image],
            });
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tools::ToolOutcome;
    use serde_json::json;

    fn image_result(call_id: &str, source: &str) -> ToolResult {
        ToolResult {
            call_id: call_id.to_string(),
            tool_name: "read_image".to_string(),
            outcome: ToolOutcome::Success {
                payload: json!({"path": source}),
                attachment: Some(ImageAttachment {
                    source: source.to_string(),
                    mime_type: "image/png".to_string(),
                    data: "AAAA".to_string(),
                    page: None,
                }),
            },
        }
    }

    #[test]
    fn test_tool_result_keeps_image_out_of_tool_message() {
        let mut convo = Conversation::new("sys", "task");
        convo.push_tool_result(&image_result("c1", "logo.png"));
        assert_eq!(convo.len(), 3);
        assert!(matches!(&convo.messages()[2], Message::Tool { tool_call_id, .. } if tool_call_id == "c1"));
    }

    #[test]
    fn test_push_images_adds_one_user_message_each() {
        let mut convo = Conversation::new("sys", "task");
        let images: Vec<ImageAttachment> = [image_result("c1", "a.png"), image_result("c2", "b.png")]
            .iter()
            .filter_map(|r| r.attachment().cloned())
            .collect();
        convo.push_images(images);
        assert_eq!(convo.len(), 4);
        assert!(matches!(&convo.messages()[3], Message::User { images, .. } if images[0].source == "b.png"));
    }

    #[test]
    fn test_message_serializes_with_role_tag() {
        let value = serde_json::to_value(Message::user("hello")).unwrap();
        assert_eq!(value, json!({"role": "user", "content": "hello"}));
    }
}

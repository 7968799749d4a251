use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Session object returned by `POST /session`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionInfo {
    pub id: String,
    #[serde(default)]
    pub title: Option<String>,
    #[serde(default)]
    pub version: Option<String>,
    #[serde(default, rename = "projectID")]
    pub project_id: Option<String>,
    #[serde(default)]
    pub directory: Option<String>,
}

/// Outgoing message body for `POST /session/{id}/message`.
#[derive(Debug, Clone, Serialize)]
pub struct MessageRequest {
    pub parts: Vec<RequestPart>,
    pub model: ModelSelection,
}

#[derive(Debug, Clone, Serialize)]
pub struct RequestPart {
    #[serde(rename = "type")]
    pub part_type: String,
    pub text: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct ModelSelection {
    #[serde(rename = "providerID")]
    pub provider_id: String,
    #[serde(rename = "modelID")]
    pub model_id: String,
}

impl MessageRequest {
    pub fn text(
        text: impl Into<String>,
        provider_id: impl Into<String>,
        model_id: impl Into<String>,
    ) -> Self {
        Self {
            parts: vec![RequestPart {
                part_type: "text".to_string(),
                text: text.into(),
            }],
            model: ModelSelection {
                provider_id: provider_id.into(),
                model_id: model_id.into(),
            },
        }
    }
}

/// Message envelope returned by the message endpoint.
#[derive(Debug, Clone, Deserialize)]
pub struct MessageEnvelope {
    pub info: MessageInfo,
    #[serde(default)]
    pub parts: Vec<ResponsePart>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct MessageInfo {
    #[serde(default)]
    pub id: Option<String>,
    #[serde(default, rename = "sessionID")]
    pub session_id: Option<String>,
    #[serde(default)]
    pub role: Option<String>,
    #[serde(default)]
    pub time: Option<MessageTime>,
    #[serde(default, rename = "providerID")]
    pub provider_id: Option<String>,
    #[serde(default, rename = "modelID")]
    pub model_id: Option<String>,
    #[serde(default)]
    pub cost: Option<f64>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct MessageTime {
    #[serde(default)]
    pub created: Option<i64>,
    #[serde(default)]
    pub completed: Option<i64>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ResponsePart {
    #[serde(rename = "type")]
    pub part_type: String,
    #[serde(default)]
    pub text: Option<String>,
    #[serde(default)]
    pub id: Option<String>,
    #[serde(default, rename = "messageID")]
    pub message_id: Option<String>,
    #[serde(default, rename = "sessionID")]
    pub session_id: Option<String>,
}

impl MessageEnvelope {
    /// All text parts concatenated in order.
    pub fn text_content(&self) -> String {
        let mut content = String::new();
        for part in &self.parts {
            if part.part_type == "text" {
                if let Some(text) = &part.text {
                    content.push_str(text);
                }
            }
        }
        content
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub enum ChatRole {
    User,
    Assistant,
}

/// A local transcript entry. Immutable once constructed; the history
/// owns it.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatMessage {
    pub id: String,
    pub role: ChatRole,
    pub content: String,
    pub created_at: DateTime<Utc>,
}

impl ChatMessage {
    pub fn user(content: impl Into<String>) -> Self {
        Self::new(ChatRole::User, content)
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self::new(ChatRole::Assistant, content)
    }

    fn new(role: ChatRole, content: impl Into<String>) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            role,
            content: content.into(),
            created_at: Utc::now(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_request_serializes_with_wire_field_names() {
        let request = MessageRequest::text("hello", "anthropic", "claude-3-5-sonnet-20241022");
        let value = serde_json::to_value(&request).unwrap();

        assert_eq!(value["parts"][0]["type"], "text");
        assert_eq!(value["parts"][0]["text"], "hello");
        assert_eq!(value["model"]["providerID"], "anthropic");
        assert_eq!(value["model"]["modelID"], "claude-3-5-sonnet-20241022");
    }

    #[test]
    fn test_text_content_concatenates_text_parts_in_order() {
        let envelope: MessageEnvelope = serde_json::from_value(json!({
            "info": {"id": "msg_1", "role": "assistant", "time": {"created": 1}},
            "parts": [
                {"type": "text", "text": "Hello"},
                {"type": "step-start"},
                {"type": "text", "text": " world"}
            ]
        }))
        .unwrap();

        assert_eq!(envelope.text_content(), "Hello world");
        assert_eq!(envelope.info.role.as_deref(), Some("assistant"));
    }

    #[test]
    fn test_session_decodes_with_unknown_fields() {
        let session: SessionInfo = serde_json::from_value(json!({
            "id": "ses_123",
            "title": "New session",
            "projectID": "proj_9",
            "time": {"created": 1, "updated": 2}
        }))
        .unwrap();

        assert_eq!(session.id, "ses_123");
        assert_eq!(session.title.as_deref(), Some("New session"));
        assert_eq!(session.project_id.as_deref(), Some("proj_9"));
    }

    #[test]
    fn test_chat_messages_get_unique_ids() {
        let a = ChatMessage::user("hi");
        let b = ChatMessage::assistant("hello");
        assert_ne!(a.id, b.id);
        assert_eq!(a.role, ChatRole::User);
        assert_eq!(b.role, ChatRole::Assistant);
    }
}

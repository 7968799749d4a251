use crate::chat::types::{ChatMessage, ChatRole};

/// Append-only transcript of a conversation. Rendering belongs to the
/// embedder; this just owns the messages.
#[derive(Debug, Default)]
pub struct ChatHistory {
    messages: Vec<ChatMessage>,
}

impl ChatHistory {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push_user(&mut self, content: impl Into<String>) {
        self.messages.push(ChatMessage::user(content));
    }

    pub fn push_assistant(&mut self, content: impl Into<String>) {
        self.messages.push(ChatMessage::assistant(content));
    }

    pub fn messages(&self) -> &[ChatMessage] {
        &self.messages
    }

    pub fn last(&self) -> Option<&ChatMessage> {
        self.messages.last()
    }

    pub fn len(&self) -> usize {
        self.messages.len()
    }

    pub fn is_empty(&self) -> bool {
        self.messages.is_empty()
    }

    pub fn clear(&mut self) {
        self.messages.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_history_preserves_order() {
        let mut history = ChatHistory::new();
        history.push_user("explain this");
        history.push_assistant("sure");
        history.push_user("thanks");

        assert_eq!(history.len(), 3);
        let roles: Vec<ChatRole> = history.messages().iter().map(|m| m.role).collect();
        assert_eq!(
            roles,
            vec![ChatRole::User, ChatRole::Assistant, ChatRole::User]
        );
        assert_eq!(history.last().unwrap().content, "thanks");
    }

    #[test]
    fn test_clear_empties_history() {
        let mut history = ChatHistory::new();
        history.push_user("hi");
        assert!(!history.is_empty());

        history.clear();
        assert!(history.is_empty());
        assert!(history.last().is_none());
    }
}

use super::ids::{ConversationId, MessageId};

/// Title used when a conversation is created without one.
pub const DEFAULT_CONVERSATION_TITLE: &str = "New Conversation";

/// Storage-local author kind, decoupled from the chat-layer role enum.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MessageRole {
    User,
    Assistant,
}

impl MessageRole {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::User => "user",
            Self::Assistant => "assistant",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConversationRecord {
    pub id: ConversationId,
    pub title: String,
    pub created_at_unix_seconds: u64,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewConversation {
    pub title: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MessageRecord {
    pub id: MessageId,
    pub conversation_id: ConversationId,
    /// `None` for messages in the root sibling group.
    pub parent_id: Option<MessageId>,
    /// Per-conversation creation order, starting at 1.
    pub seq: u64,
    pub role: MessageRole,
    pub content: String,
    pub created_at_unix_seconds: u64,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewMessage {
    pub parent_id: Option<MessageId>,
    pub role: MessageRole,
    pub content: String,
}

impl NewMessage {
    pub fn user(parent_id: Option<MessageId>, content: impl Into<String>) -> Self {
        Self {
            parent_id,
            role: MessageRole::User,
            content: content.into(),
        }
    }

    pub fn assistant(parent_id: MessageId, content: impl Into<String>) -> Self {
        Self {
            parent_id: Some(parent_id),
            role: MessageRole::Assistant,
            content: content.into(),
        }
    }
}

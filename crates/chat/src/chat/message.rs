use arbor_storage::{MessageRecord, MessageRole};

pub use arbor_storage::{ConversationId, MessageId};

/// Chat speaker role.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Role {
    User,
    Assistant,
}

impl From<MessageRole> for Role {
    fn from(role: MessageRole) -> Self {
        match role {
            MessageRole::User => Self::User,
            MessageRole::Assistant => Self::Assistant,
        }
    }
}

/// One node of the conversation tree as the view sees it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Message {
    pub id: MessageId,
    /// `None` places the message in the root sibling group.
    pub parent_id: Option<MessageId>,
    /// Creation order; the only tie-break inside a sibling group.
    pub seq: u64,
    pub role: Role,
    pub content: String,
}

impl Message {
    pub fn new(
        id: MessageId,
        parent_id: Option<MessageId>,
        seq: u64,
        role: Role,
        content: impl Into<String>,
    ) -> Self {
        Self {
            id,
            parent_id,
            seq,
            role,
            content: content.into(),
        }
    }
}

impl From<MessageRecord> for Message {
    fn from(record: MessageRecord) -> Self {
        Self {
            id: record.id,
            parent_id: record.parent_id,
            seq: record.seq,
            role: record.role.into(),
            content: record.content,
        }
    }
}

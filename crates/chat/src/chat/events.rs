use crate::chat::collapse::CollapseState;
use crate::chat::message::{ConversationId, MessageId};
use crate::chat::navigator::NavigationAffordance;
use crate::chat::tree::GroupAnchor;

/// Emitted when a conversation was opened and its message list loaded.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ConversationOpened {
    pub conversation_id: ConversationId,
    pub message_count: usize,
}

/// Emitted when sibling navigation changed the displayed member of a branch point.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SiblingSelected {
    pub anchor: GroupAnchor,
    pub message_id: MessageId,
    pub affordance: NavigationAffordance,
}

/// Emitted after a subtree was removed from the local cache.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SubtreeDeleted {
    pub conversation_id: ConversationId,
    pub message_id: MessageId,
    pub removed: usize,
    /// False when the remote deletion was rejected; revalidation restores the list.
    pub remote_accepted: bool,
}

/// Emitted when the authoritative list replaced the cached one.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct MessagesRevalidated {
    pub conversation_id: ConversationId,
    pub message_count: usize,
}

/// Emitted when a cached message's content was replaced in place.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct MessageEdited {
    /// Conversation the edit landed in; the draft id when it fell back.
    pub conversation_id: ConversationId,
    pub message_id: MessageId,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct CollapseToggled {
    pub message_id: MessageId,
    pub state: CollapseState,
}

/// Notifications for the rendering layer, drained after each interaction.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ViewEvent {
    ConversationOpened(ConversationOpened),
    SiblingSelected(SiblingSelected),
    SubtreeDeleted(SubtreeDeleted),
    MessagesRevalidated(MessagesRevalidated),
    MessageEdited(MessageEdited),
    CollapseToggled(CollapseToggled),
}

impl From<ConversationOpened> for ViewEvent {
    fn from(event: ConversationOpened) -> Self {
        Self::ConversationOpened(event)
    }
}

impl From<SiblingSelected> for ViewEvent {
    fn from(event: SiblingSelected) -> Self {
        Self::SiblingSelected(event)
    }
}

impl From<SubtreeDeleted> for ViewEvent {
    fn from(event: SubtreeDeleted) -> Self {
        Self::SubtreeDeleted(event)
    }
}

impl From<MessagesRevalidated> for ViewEvent {
    fn from(event: MessagesRevalidated) -> Self {
        Self::MessagesRevalidated(event)
    }
}

impl From<MessageEdited> for ViewEvent {
    fn from(event: MessageEdited) -> Self {
        Self::MessageEdited(event)
    }
}

impl From<CollapseToggled> for ViewEvent {
    fn from(event: CollapseToggled) -> Self {
        Self::CollapseToggled(event)
    }
}

use std::collections::HashMap;

use crate::chat::deletion::remove_subtree;
use crate::chat::message::{ConversationId, Message, MessageId};

#[derive(Debug, Default)]
struct CachedConversation {
    messages: Vec<Message>,
    revision: u64,
}

/// Local mirror of each conversation's authoritative message list.
///
/// Every effective mutation stamps the conversation with a fresh, cache-wide unique
/// revision, which is the identity the derived tree is memoized on.
#[derive(Debug, Default)]
pub struct MessageCache {
    conversations: HashMap<ConversationId, CachedConversation>,
    last_revision: u64,
}

impl MessageCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn messages(&self, conversation_id: ConversationId) -> Option<&[Message]> {
        self.conversations
            .get(&conversation_id)
            .map(|cached| cached.messages.as_slice())
    }

    pub fn revision(&self, conversation_id: ConversationId) -> u64 {
        self.conversations
            .get(&conversation_id)
            .map_or(0, |cached| cached.revision)
    }

    pub fn replace(&mut self, conversation_id: ConversationId, messages: Vec<Message>) {
        let revision = self.next_revision();
        let cached = self.conversations.entry(conversation_id).or_default();
        cached.messages = messages;
        cached.revision = revision;
    }

    pub fn append(&mut self, conversation_id: ConversationId, message: Message) {
        let revision = self.next_revision();
        let cached = self.conversations.entry(conversation_id).or_default();
        cached.messages.push(message);
        cached.revision = revision;
    }

    /// Replaces the content of one cached message, searching newest first.
    ///
    /// When the message is not cached under `conversation_id` the draft conversation is
    /// tried next. Returns the conversation holding the edited message.
    pub fn edit_content(
        &mut self,
        conversation_id: ConversationId,
        message_id: MessageId,
        content: &str,
    ) -> Option<ConversationId> {
        let draft = ConversationId::draft();
        let fallback = (conversation_id != draft).then_some(draft);

        for key in std::iter::once(conversation_id).chain(fallback) {
            let Some(cached) = self.conversations.get_mut(&key) else {
                continue;
            };
            let Some(message) = cached
                .messages
                .iter_mut()
                .rev()
                .find(|message| message.id == message_id)
            else {
                continue;
            };

            if key != conversation_id {
                tracing::warn!(
                    %message_id,
                    "edited message not cached for its conversation, used draft"
                );
            }
            if message.content != content {
                message.content = content.to_string();
                self.last_revision += 1;
                cached.revision = self.last_revision;
            }
            return Some(key);
        }
        None
    }

    /// Removes the descendant closure of `message_id`; absent conversations remove nothing.
    pub fn remove_subtree(
        &mut self,
        conversation_id: ConversationId,
        message_id: MessageId,
    ) -> usize {
        let Some(cached) = self.conversations.get_mut(&conversation_id) else {
            return 0;
        };

        let removed = remove_subtree(&mut cached.messages, message_id);
        if removed > 0 {
            self.last_revision += 1;
            cached.revision = self.last_revision;
        }
        removed
    }

    pub fn evict(&mut self, conversation_id: ConversationId) {
        self.conversations.remove(&conversation_id);
    }

    fn next_revision(&mut self) -> u64 {
        self.last_revision += 1;
        self.last_revision
    }
}

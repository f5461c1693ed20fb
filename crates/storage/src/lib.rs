pub mod error;
pub mod ids;
pub mod sqlite;
pub mod types;

pub use error::{StorageError, StorageResult};
pub use ids::{ConversationId, MessageId};
pub use sqlite::SqliteStorage;
pub use types::{
    ConversationRecord, DEFAULT_CONVERSATION_TITLE, MessageRecord, MessageRole, NewConversation,
    NewMessage,
};

pub trait ConversationStore: Send + Sync {
    fn create_conversation(&self, input: NewConversation) -> StorageResult<ConversationRecord>;
    fn get_conversation(
        &self,
        conversation_id: ConversationId,
    ) -> StorageResult<Option<ConversationRecord>>;
}

pub trait MessageStore: Send + Sync {
    fn append_message(
        &self,
        conversation_id: ConversationId,
        input: NewMessage,
    ) -> StorageResult<MessageRecord>;
    /// Full authoritative message list, ordered by `seq`.
    fn list_messages(&self, conversation_id: ConversationId) -> StorageResult<Vec<MessageRecord>>;
    /// Removes `message_id` and every message transitively parented under it.
    ///
    /// Returns the number of removed messages; an id that is no longer present yields 0.
    fn delete_subtree(
        &self,
        conversation_id: ConversationId,
        message_id: MessageId,
    ) -> StorageResult<u64>;
}

/// Durable client-local key/value store.
pub trait PreferenceStore: Send + Sync {
    fn get_preference(&self, key: &str) -> StorageResult<Option<String>>;
    fn set_preference(&self, key: &str, value: &str) -> StorageResult<()>;
}

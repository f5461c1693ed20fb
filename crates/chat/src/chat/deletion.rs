use std::collections::{HashMap, HashSet};

use arbor_storage::{MessageStore, StorageError};

use crate::chat::cache::MessageCache;
use crate::chat::message::{ConversationId, Message, MessageId};

/// `root` plus every message transitively parented under it.
///
/// Empty when `root` is not in `messages`; messages naming a missing parent are
/// roots of their own and never swept up.
pub fn descendant_closure(messages: &[Message], root: MessageId) -> HashSet<MessageId> {
    if !messages.iter().any(|message| message.id == root) {
        return HashSet::new();
    }

    let mut children: HashMap<MessageId, Vec<MessageId>> = HashMap::new();
    for message in messages {
        if let Some(parent_id) = message.parent_id {
            children.entry(parent_id).or_default().push(message.id);
        }
    }

    let mut closure = HashSet::from([root]);
    let mut work = vec![root];
    while let Some(current) = work.pop() {
        for &child in children.get(&current).into_iter().flatten() {
            if closure.insert(child) {
                work.push(child);
            }
        }
    }

    closure
}

/// Removes the descendant closure of `root` from `messages` in one pass.
pub fn remove_subtree(messages: &mut Vec<Message>, root: MessageId) -> usize {
    let closure = descendant_closure(messages, root);
    let before = messages.len();
    messages.retain(|message| !closure.contains(&message.id));
    before - messages.len()
}

#[derive(Debug)]
pub struct DeletionOutcome {
    /// Messages removed from the local cache.
    pub removed: usize,
    /// Remote result; a rejection is reconciled by the revalidation fetch, never raised.
    pub remote: Result<u64, StorageError>,
}

/// Optimistically removes the subtree locally, then mirrors the deletion remotely.
///
/// The caller must follow up with [`revalidate`] for the same conversation.
pub fn delete_subtree(
    cache: &mut MessageCache,
    store: &dyn MessageStore,
    conversation_id: ConversationId,
    message_id: MessageId,
) -> DeletionOutcome {
    let removed = cache.remove_subtree(conversation_id, message_id);
    let remote = store.delete_subtree(conversation_id, message_id);

    match &remote {
        Ok(remote_removed) => tracing::debug!(
            %conversation_id,
            %message_id,
            removed,
            remote_removed,
            "deleted message subtree"
        ),
        Err(error) => tracing::warn!(
            %conversation_id,
            %message_id,
            removed,
            "remote subtree deletion rejected, awaiting revalidation: {error}"
        ),
    }

    DeletionOutcome { removed, remote }
}

/// Replaces the cached list with the authoritative one.
///
/// Returns false when the fetch failed; the cached list is left as it was.
pub fn revalidate(
    cache: &mut MessageCache,
    store: &dyn MessageStore,
    conversation_id: ConversationId,
) -> bool {
    match store.list_messages(conversation_id) {
        Ok(records) => {
            let messages = records.into_iter().map(Message::from).collect::<Vec<_>>();
            tracing::debug!(%conversation_id, count = messages.len(), "revalidated message list");
            cache.replace(conversation_id, messages);
            true
        }
        Err(error) => {
            tracing::warn!(%conversation_id, "message list revalidation failed: {error}");
            false
        }
    }
}

use std::collections::HashMap;
use std::fmt;

use crate::chat::message::{Message, MessageId};
use crate::chat::navigator::{NavigationAffordance, SiblingNavigator};

/// Key of one sibling group: the shared parent, or the root marker.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum GroupAnchor {
    Root,
    Parent(MessageId),
}

impl GroupAnchor {
    /// Marker shared by every row rendered at this branch point.
    pub fn row_key(&self) -> RowKey {
        match self {
            Self::Root => RowKey(RowKey::ROOT.to_string()),
            Self::Parent(parent_id) => RowKey(parent_id.to_string()),
        }
    }
}

/// Stable marker used to relocate a row after its element was remounted.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct RowKey(String);

impl RowKey {
    pub const ROOT: &'static str = "root";

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for RowKey {
    fn fmt(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
        formatter.write_str(&self.0)
    }
}

/// One row of the currently displayed path through the tree.
#[derive(Debug, Clone, PartialEq)]
pub struct ThreadRow<'a> {
    pub anchor: GroupAnchor,
    pub message: &'a Message,
    pub affordance: Option<NavigationAffordance>,
}

/// Read-only sibling-group view over one snapshot of a conversation's message list.
///
/// A message whose parent is not in the list (deleted, or never fetched) is placed
/// in the root group instead of being dropped.
#[derive(Debug, Clone, Default)]
pub struct MessageTree {
    messages: Vec<Message>,
    positions: HashMap<MessageId, usize>,
    groups: HashMap<GroupAnchor, Vec<usize>>,
}

impl MessageTree {
    pub fn new(messages: &[Message]) -> Self {
        let messages = messages.to_vec();

        let mut positions = HashMap::with_capacity(messages.len());
        for (index, message) in messages.iter().enumerate() {
            positions.entry(message.id).or_insert(index);
        }

        let mut groups: HashMap<GroupAnchor, Vec<usize>> = HashMap::new();
        for (index, message) in messages.iter().enumerate() {
            groups
                .entry(anchor_for(&positions, message))
                .or_default()
                .push(index);
        }
        for members in groups.values_mut() {
            members.sort_by_key(|&index| (messages[index].seq, index));
        }

        Self {
            messages,
            positions,
            groups,
        }
    }

    pub fn len(&self) -> usize {
        self.messages.len()
    }

    pub fn is_empty(&self) -> bool {
        self.messages.is_empty()
    }

    pub fn get(&self, message_id: MessageId) -> Option<&Message> {
        self.positions
            .get(&message_id)
            .map(|&index| &self.messages[index])
    }

    /// Group the message is displayed in, if it is part of this snapshot.
    pub fn anchor_of(&self, message_id: MessageId) -> Option<GroupAnchor> {
        self.get(message_id)
            .map(|message| anchor_for(&self.positions, message))
    }

    /// Members of one sibling group, oldest first.
    pub fn siblings_of(&self, anchor: GroupAnchor) -> Vec<&Message> {
        self.groups
            .get(&anchor)
            .map(|members| members.iter().map(|&index| &self.messages[index]).collect())
            .unwrap_or_default()
    }

    pub fn group_size(&self, anchor: GroupAnchor) -> usize {
        self.groups.get(&anchor).map_or(0, Vec::len)
    }

    pub fn is_branch_point(&self, anchor: GroupAnchor) -> bool {
        self.group_size(anchor) > 1
    }

    /// Walks from the root group, taking the selected member at each level.
    pub fn visible_thread(&self, navigator: &SiblingNavigator) -> Vec<ThreadRow<'_>> {
        let mut rows = Vec::new();
        let mut anchor = GroupAnchor::Root;

        while let Some(members) = self.groups.get(&anchor) {
            let size = members.len();
            let Some(display_index) = navigator.display_index(anchor, size) else {
                break;
            };
            let message = &self.messages[members[display_index]];
            rows.push(ThreadRow {
                anchor,
                message,
                affordance: navigator.affordance(anchor, size),
            });
            anchor = GroupAnchor::Parent(message.id);
        }

        rows
    }
}

fn anchor_for(positions: &HashMap<MessageId, usize>, message: &Message) -> GroupAnchor {
    match message.parent_id {
        Some(parent_id) if parent_id != message.id && positions.contains_key(&parent_id) => {
            GroupAnchor::Parent(parent_id)
        }
        _ => GroupAnchor::Root,
    }
}

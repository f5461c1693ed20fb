use std::collections::HashMap;

use crate::chat::message::ConversationId;
use crate::chat::tree::GroupAnchor;

/// What the rendering layer needs to draw a sibling switcher.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NavigationAffordance {
    /// 1-based position of the displayed sibling.
    pub position: usize,
    pub count: usize,
    pub can_previous: bool,
    pub can_next: bool,
}

impl NavigationAffordance {
    /// Text for the live status readout, e.g. `2 / 3`.
    pub fn status_label(&self) -> String {
        format!("{} / {}", self.position, self.count)
    }
}

/// Per-branch-point selection, stored as an offset from the newest sibling.
///
/// Offset 0 always means "newest", so a group that grows keeps pointing at a
/// well-defined member without touching the stored value.
#[derive(Debug, Default)]
pub struct SiblingNavigator {
    conversation_id: Option<ConversationId>,
    offsets: HashMap<GroupAnchor, usize>,
    observed_sizes: HashMap<GroupAnchor, usize>,
}

impl SiblingNavigator {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn conversation_id(&self) -> Option<ConversationId> {
        self.conversation_id
    }

    /// Binds the navigator to a conversation, discarding all state when the identity changes.
    ///
    /// Returns true when state was discarded.
    pub fn set_conversation(&mut self, conversation_id: ConversationId) -> bool {
        if self.conversation_id == Some(conversation_id) {
            return false;
        }

        tracing::debug!(%conversation_id, "resetting sibling navigation for new conversation");
        self.conversation_id = Some(conversation_id);
        self.offsets.clear();
        self.observed_sizes.clear();
        true
    }

    /// Runs once per render of a group and returns the display index to show.
    ///
    /// Strict growth since the last render selects the newest member. An unchanged or
    /// shrunken group keeps its selection, falling back to the newest member only when
    /// the held offset no longer fits.
    pub fn reconcile(&mut self, anchor: GroupAnchor, group_size: usize) -> Option<usize> {
        let previous_size = self.observed_sizes.insert(anchor, group_size);
        let offset = self.offsets.entry(anchor).or_insert(0);

        if previous_size.is_some_and(|previous| group_size > previous) {
            if *offset != 0 {
                tracing::debug!(?anchor, group_size, "sibling group grew, selecting newest");
            }
            *offset = 0;
        } else if group_size > 0 && *offset >= group_size {
            tracing::debug!(
                ?anchor,
                group_size,
                offset = *offset,
                "clamping stale sibling offset"
            );
            *offset = 0;
        }

        forward_index(*offset, group_size)
    }

    /// Converts the stored offset to a forward index, clamping an out-of-range offset
    /// to the oldest member as a side effect.
    pub fn resolve(&mut self, anchor: GroupAnchor, group_size: usize) -> Option<usize> {
        if group_size == 0 {
            return None;
        }

        let offset = self.offsets.entry(anchor).or_insert(0);
        if *offset >= group_size {
            *offset = group_size - 1;
        }
        forward_index(*offset, group_size)
    }

    /// Read-only view of the displayed member.
    ///
    /// Applies the same stale-offset fallback as [`Self::reconcile`], so a held offset
    /// that no longer fits reads as the newest member.
    pub fn display_index(&self, anchor: GroupAnchor, group_size: usize) -> Option<usize> {
        let offset = self
            .offsets
            .get(&anchor)
            .copied()
            .filter(|offset| *offset < group_size)
            .unwrap_or(0);
        forward_index(offset, group_size)
    }

    /// Stores a new display index; out-of-range requests and single-member groups are ignored.
    ///
    /// Returns true when the selection changed.
    pub fn select(&mut self, anchor: GroupAnchor, group_size: usize, display_index: usize) -> bool {
        if group_size <= 1 || display_index >= group_size {
            return false;
        }

        let offset = group_size - display_index - 1;
        let previous = self.offsets.insert(anchor, offset);
        previous != Some(offset)
    }

    pub fn previous(&mut self, anchor: GroupAnchor, group_size: usize) -> bool {
        match self.display_index(anchor, group_size) {
            Some(index) if index > 0 => self.select(anchor, group_size, index - 1),
            _ => false,
        }
    }

    pub fn next(&mut self, anchor: GroupAnchor, group_size: usize) -> bool {
        match self.display_index(anchor, group_size) {
            Some(index) => self.select(anchor, group_size, index + 1),
            None => false,
        }
    }

    /// Switcher state for a group; `None` when there is nothing to switch between.
    pub fn affordance(
        &self,
        anchor: GroupAnchor,
        group_size: usize,
    ) -> Option<NavigationAffordance> {
        if group_size <= 1 {
            return None;
        }

        let index = self.display_index(anchor, group_size)?;
        Some(NavigationAffordance {
            position: index + 1,
            count: group_size,
            can_previous: index > 0,
            can_next: index + 1 < group_size,
        })
    }
}

fn forward_index(offset: usize, group_size: usize) -> Option<usize> {
    group_size.checked_sub(offset + 1)
}

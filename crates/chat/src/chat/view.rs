use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use arbor_storage::{MessageStore, PreferenceStore, StorageResult};

use crate::chat::cache::MessageCache;
use crate::chat::collapse::{
    CollapseConfig, CollapseController, CollapseRender, CollapseState, CollapseTask, ContentKind,
};
use crate::chat::deletion;
use crate::chat::events::{
    CollapseToggled, ConversationOpened, MessageEdited, MessagesRevalidated, SiblingSelected,
    SubtreeDeleted, ViewEvent,
};
use crate::chat::message::{ConversationId, Message, MessageId};
use crate::chat::navigator::{NavigationAffordance, SiblingNavigator};
use crate::chat::tree::{GroupAnchor, MessageTree, RowKey};
use crate::chat::viewport::{
    BringIntoView, JumpOutcome, JumpRequest, ViewportCoordinator, ViewportTask,
};
use crate::layout::{Alignment, ElementId, LayoutHost, Motion};
use crate::schedule::Scheduler;
use crate::selection::{SelectionBroker, SelectionSnapshot};
use crate::settings::ViewSettings;

/// Deferred work of every component owned by the view.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ViewTask {
    Viewport(ViewportTask),
    Collapse(CollapseTask),
    Revalidate(ConversationId),
}

impl From<ViewportTask> for ViewTask {
    fn from(task: ViewportTask) -> Self {
        Self::Viewport(task)
    }
}

impl From<CollapseTask> for ViewTask {
    fn from(task: CollapseTask) -> Self {
        Self::Collapse(task)
    }
}

/// One row of the displayed thread after reconciliation.
#[derive(Debug, Clone, PartialEq)]
pub struct RenderedRow {
    pub anchor: GroupAnchor,
    /// Marker the rendering layer registers the row element under.
    pub row_key: RowKey,
    pub message: Message,
    pub affordance: Option<NavigationAffordance>,
}

/// Elements and text of a collapsible content block being attached.
#[derive(Debug, Clone, Copy)]
pub struct ContentMount<'a> {
    /// Element the height cap is applied to.
    pub container: ElementId,
    /// Element whose natural height is measured.
    pub content: ElementId,
    pub text: &'a str,
    pub kind: ContentKind,
}

/// Parent coordinator for one visible conversation.
///
/// Owns the cache, navigation, viewport and collapse state; the embedding runtime
/// forwards layout notifications and due [`ViewTask`]s here.
pub struct ConversationView {
    messages: Arc<dyn MessageStore>,
    preferences: Arc<dyn PreferenceStore>,
    broker: SelectionBroker<MessageId>,
    collapse_config: CollapseConfig,
    conversation_id: Option<ConversationId>,
    cache: MessageCache,
    tree: MessageTree,
    tree_revision: Option<u64>,
    navigator: SiblingNavigator,
    viewport: ViewportCoordinator,
    collapsibles: HashMap<MessageId, CollapseController>,
    events: Vec<ViewEvent>,
}

impl ConversationView {
    pub fn new(
        messages: Arc<dyn MessageStore>,
        preferences: Arc<dyn PreferenceStore>,
        broker: SelectionBroker<MessageId>,
        settings: &ViewSettings,
    ) -> Self {
        Self {
            messages,
            preferences,
            broker,
            collapse_config: settings.collapse.to_config(),
            conversation_id: None,
            cache: MessageCache::new(),
            tree: MessageTree::default(),
            tree_revision: None,
            navigator: SiblingNavigator::new(),
            viewport: ViewportCoordinator::new(settings.viewport.to_config()),
            collapsibles: HashMap::new(),
            events: Vec::new(),
        }
    }

    /// New values apply to later requests and to blocks mounted afterwards.
    pub fn apply_settings(&mut self, settings: &ViewSettings) {
        self.viewport.set_config(settings.viewport.to_config());
        self.collapse_config = settings.collapse.to_config();
    }

    pub fn conversation_id(&self) -> Option<ConversationId> {
        self.conversation_id
    }

    /// Loads `conversation_id` from the store and makes it the displayed conversation.
    ///
    /// Switching conversations discards navigation, pending viewport work and every
    /// mounted collapsible block. On a failed load nothing changes.
    pub fn open_conversation<S>(
        &mut self,
        conversation_id: ConversationId,
        host: &mut dyn LayoutHost,
        scheduler: &mut S,
    ) -> StorageResult<usize>
    where
        S: Scheduler<ViewTask> + ?Sized,
    {
        let records = self.messages.list_messages(conversation_id)?;

        if self.conversation_id != Some(conversation_id) {
            self.viewport.reset(host, scheduler);
            for (_, mut controller) in self.collapsibles.drain() {
                controller.unmount(host, scheduler);
            }
            if let Some(previous) = self.conversation_id.replace(conversation_id) {
                self.cache.evict(previous);
            }
        }
        self.navigator.set_conversation(conversation_id);

        let messages = records.into_iter().map(Message::from).collect::<Vec<_>>();
        let message_count = messages.len();
        self.cache.replace(conversation_id, messages);
        self.refresh_tree();

        tracing::debug!(%conversation_id, message_count, "opened conversation");
        self.events.push(
            ConversationOpened {
                conversation_id,
                message_count,
            }
            .into(),
        );
        Ok(message_count)
    }

    /// Adds a message that arrived after the conversation was opened.
    ///
    /// Before any conversation is opened messages collect under the draft id.
    pub fn append_message(&mut self, message: Message) {
        let key = self.cache_key();
        self.cache.append(key, message);
    }

    /// Patches one cached message's content in place, trying the draft conversation
    /// when the message is not cached for the open one.
    ///
    /// A mounted content block of the message re-arms its measurement.
    pub fn edit_message_content<S>(
        &mut self,
        message_id: MessageId,
        content: &str,
        host: &mut dyn LayoutHost,
        scheduler: &mut S,
    ) -> bool
    where
        S: Scheduler<ViewTask> + ?Sized,
    {
        let key = self.cache_key();
        let Some(conversation_id) = self.cache.edit_content(key, message_id, content) else {
            tracing::debug!(%message_id, "edited message is not cached");
            return false;
        };

        if let Some(kind) = self
            .collapsibles
            .get(&message_id)
            .and_then(CollapseController::content_kind)
        {
            self.update_content(message_id, content, kind, host, scheduler);
        }
        self.events.push(
            MessageEdited {
                conversation_id,
                message_id,
            }
            .into(),
        );
        true
    }

    pub fn tree(&mut self) -> &MessageTree {
        self.refresh_tree();
        &self.tree
    }

    /// Reconciles every group on the displayed path and returns the rows to draw.
    pub fn render_groups(&mut self) -> Vec<RenderedRow> {
        self.refresh_tree();

        let mut rows = Vec::new();
        let mut anchor = GroupAnchor::Root;
        loop {
            let siblings = self.tree.siblings_of(anchor);
            if siblings.is_empty() {
                break;
            }
            let size = siblings.len();
            let Some(message) = self
                .navigator
                .reconcile(anchor, size)
                .and_then(|index| siblings.get(index).copied())
            else {
                break;
            };

            rows.push(RenderedRow {
                anchor,
                row_key: anchor.row_key(),
                message: message.clone(),
                affordance: self.navigator.affordance(anchor, size),
            });
            anchor = GroupAnchor::Parent(message.id);
        }
        rows
    }

    pub fn navigation(&mut self, anchor: GroupAnchor) -> Option<NavigationAffordance> {
        let size = self.reconciled_size(anchor);
        self.navigator.affordance(anchor, size)
    }

    pub fn select_previous<S>(
        &mut self,
        anchor: GroupAnchor,
        origin: Option<ElementId>,
        scheduler: &mut S,
    ) -> bool
    where
        S: Scheduler<ViewTask> + ?Sized,
    {
        let size = self.reconciled_size(anchor);
        let changed = self.navigator.previous(anchor, size);
        self.after_selection(anchor, origin, changed, scheduler)
    }

    pub fn select_next<S>(
        &mut self,
        anchor: GroupAnchor,
        origin: Option<ElementId>,
        scheduler: &mut S,
    ) -> bool
    where
        S: Scheduler<ViewTask> + ?Sized,
    {
        let size = self.reconciled_size(anchor);
        let changed = self.navigator.next(anchor, size);
        self.after_selection(anchor, origin, changed, scheduler)
    }

    /// Selects the member at forward `display_index`; out-of-range indices are ignored.
    pub fn select<S>(
        &mut self,
        anchor: GroupAnchor,
        display_index: usize,
        origin: Option<ElementId>,
        scheduler: &mut S,
    ) -> bool
    where
        S: Scheduler<ViewTask> + ?Sized,
    {
        let size = self.reconciled_size(anchor);
        let changed = self.navigator.select(anchor, size, display_index);
        self.after_selection(anchor, origin, changed, scheduler)
    }

    /// Removes the message and its descendants locally, mirrors the deletion remotely
    /// and schedules the revalidation fetch.
    pub fn delete_subtree<S>(&mut self, message_id: MessageId, scheduler: &mut S) -> usize
    where
        S: Scheduler<ViewTask> + ?Sized,
    {
        let Some(conversation_id) = self.conversation_id else {
            return 0;
        };

        let outcome = deletion::delete_subtree(
            &mut self.cache,
            self.messages.as_ref(),
            conversation_id,
            message_id,
        );
        scheduler.schedule(Duration::ZERO, ViewTask::Revalidate(conversation_id));

        self.events.push(
            SubtreeDeleted {
                conversation_id,
                message_id,
                removed: outcome.removed,
                remote_accepted: outcome.remote.is_ok(),
            }
            .into(),
        );
        outcome.removed
    }

    /// Runs a throttled scroll-down control.
    pub fn jump<S>(
        &mut self,
        request: JumpRequest,
        host: &mut dyn LayoutHost,
        scheduler: &mut S,
    ) -> JumpOutcome
    where
        S: Scheduler<ViewTask> + ?Sized,
    {
        self.viewport.jump(request, host, scheduler)
    }

    pub fn mount_row(&mut self, key: RowKey, element: ElementId) {
        self.viewport.register_row(key, element);
    }

    pub fn unmount_row(&mut self, key: &RowKey, element: ElementId) {
        self.viewport.unregister_row(key, element);
    }

    /// Attaches the collapsible content block of `message_id` and measures it.
    pub fn mount_content<S>(
        &mut self,
        message_id: MessageId,
        mount: ContentMount<'_>,
        host: &mut dyn LayoutHost,
        scheduler: &mut S,
    ) -> CollapseRender
    where
        S: Scheduler<ViewTask> + ?Sized,
    {
        let controller = self.collapsibles.entry(message_id).or_insert_with(|| {
            CollapseController::new(
                message_id,
                self.collapse_config,
                self.preferences.as_ref(),
                self.broker.clone(),
            )
        });
        controller.set_content(mount.text, mount.kind, host, scheduler);
        controller.mount(mount.container, mount.content, host, scheduler);
        controller.render()
    }

    pub fn update_content<S>(
        &mut self,
        message_id: MessageId,
        text: &str,
        kind: ContentKind,
        host: &mut dyn LayoutHost,
        scheduler: &mut S,
    ) -> Option<CollapseRender>
    where
        S: Scheduler<ViewTask> + ?Sized,
    {
        let controller = self.collapsibles.get_mut(&message_id)?;
        controller.set_content(text, kind, host, scheduler);
        Some(controller.render())
    }

    pub fn unmount_content<S>(
        &mut self,
        message_id: MessageId,
        host: &mut dyn LayoutHost,
        scheduler: &mut S,
    ) where
        S: Scheduler<ViewTask> + ?Sized,
    {
        if let Some(mut controller) = self.collapsibles.remove(&message_id) {
            controller.unmount(host, scheduler);
        }
    }

    pub fn collapse_render(&self, message_id: MessageId) -> Option<CollapseRender> {
        self.collapsibles
            .get(&message_id)
            .map(CollapseController::render)
    }

    pub fn pointer_moved(
        &mut self,
        message_id: MessageId,
        pointer_y: f32,
        host: &dyn LayoutHost,
    ) {
        if let Some(controller) = self.collapsibles.get_mut(&message_id) {
            controller.pointer_moved(pointer_y, host);
        }
    }

    pub fn pointer_left(&mut self, message_id: MessageId) {
        if let Some(controller) = self.collapsibles.get_mut(&message_id) {
            controller.pointer_left();
        }
    }

    pub fn toggle_collapse<S>(
        &mut self,
        message_id: MessageId,
        scheduler: &mut S,
    ) -> Option<CollapseState>
    where
        S: Scheduler<ViewTask> + ?Sized,
    {
        let controller = self.collapsibles.get_mut(&message_id)?;
        let state = controller.toggle(self.preferences.as_ref(), scheduler)?;
        self.events.push(CollapseToggled { message_id, state }.into());
        Some(state)
    }

    /// Routes a resize notification to the viewport watch and the content measurement.
    pub fn on_resize(&mut self, element: ElementId, host: &mut dyn LayoutHost) -> bool {
        let corrected = self.viewport.on_resize(element, host);
        let mut measured = false;
        for controller in self.collapsibles.values_mut() {
            measured |= controller.on_resize(element, host);
        }
        corrected || measured
    }

    /// Fans one selection change out to the subscribed blocks of this view.
    pub fn on_selection_change(&mut self, snapshot: &SelectionSnapshot, host: &dyn LayoutHost) {
        for message_id in self.broker.subscribers() {
            if let Some(controller) = self.collapsibles.get_mut(&message_id) {
                controller.on_selection_change(snapshot, host);
            }
        }
    }

    pub fn dispatch<S>(&mut self, task: ViewTask, host: &mut dyn LayoutHost, scheduler: &mut S)
    where
        S: Scheduler<ViewTask> + ?Sized,
    {
        match task {
            ViewTask::Viewport(task) => {
                self.viewport.on_task(task, host, scheduler);
            }
            ViewTask::Collapse(CollapseTask::ScrollRowToTop { message_id }) => {
                self.scroll_row_to_top(message_id, scheduler);
            }
            ViewTask::Collapse(task @ CollapseTask::Recheck { message_id, .. }) => {
                if let Some(controller) = self.collapsibles.get_mut(&message_id) {
                    controller.on_task(task, host);
                }
            }
            ViewTask::Revalidate(conversation_id) => self.revalidate(conversation_id),
        }
    }

    pub fn take_events(&mut self) -> Vec<ViewEvent> {
        std::mem::take(&mut self.events)
    }

    fn after_selection<S>(
        &mut self,
        anchor: GroupAnchor,
        origin: Option<ElementId>,
        changed: bool,
        scheduler: &mut S,
    ) -> bool
    where
        S: Scheduler<ViewTask> + ?Sized,
    {
        if !changed {
            return false;
        }

        let size = self.tree.group_size(anchor);
        let selected = self
            .navigator
            .display_index(anchor, size)
            .and_then(|index| self.tree.siblings_of(anchor).get(index).copied())
            .map(|message| message.id);
        if let Some(message_id) = selected
            && let Some(affordance) = self.navigator.affordance(anchor, size)
        {
            tracing::debug!(
                ?anchor,
                %message_id,
                position = affordance.position,
                "selected sibling"
            );
            self.events.push(
                SiblingSelected {
                    anchor,
                    message_id,
                    affordance,
                }
                .into(),
            );
        }

        // The navigator is already updated, so the sync step sees the new member.
        self.viewport.request(
            anchor.row_key(),
            BringIntoView {
                origin,
                ..BringIntoView::default()
            },
            scheduler,
        );
        true
    }

    fn scroll_row_to_top<S>(&mut self, message_id: MessageId, scheduler: &mut S)
    where
        S: Scheduler<ViewTask> + ?Sized,
    {
        self.refresh_tree();
        let Some(anchor) = self.tree.anchor_of(message_id) else {
            return;
        };

        let origin = self
            .collapsibles
            .get(&message_id)
            .and_then(CollapseController::container);
        self.viewport.request(
            anchor.row_key(),
            BringIntoView {
                alignment: Alignment::Start,
                motion: Motion::Smooth,
                origin,
            },
            scheduler,
        );
    }

    fn revalidate(&mut self, conversation_id: ConversationId) {
        if self.conversation_id != Some(conversation_id) {
            tracing::trace!(%conversation_id, "skipping revalidation for closed conversation");
            return;
        }

        if deletion::revalidate(&mut self.cache, self.messages.as_ref(), conversation_id) {
            let message_count = self
                .cache
                .messages(conversation_id)
                .map_or(0, <[Message]>::len);
            self.events.push(
                MessagesRevalidated {
                    conversation_id,
                    message_count,
                }
                .into(),
            );
        }
    }

    /// Brings the group's selection up to date with the current list before a read or move.
    fn reconciled_size(&mut self, anchor: GroupAnchor) -> usize {
        self.refresh_tree();
        let size = self.tree.group_size(anchor);
        if size > 0 {
            self.navigator.reconcile(anchor, size);
        }
        size
    }

    fn cache_key(&self) -> ConversationId {
        self.conversation_id.unwrap_or_else(ConversationId::draft)
    }

    fn refresh_tree(&mut self) {
        let key = self.cache_key();
        let revision = self.cache.revision(key);
        if self.tree_revision == Some(revision) {
            return;
        }
        self.tree = MessageTree::new(self.cache.messages(key).unwrap_or_default());
        self.tree_revision = Some(revision);
    }
}

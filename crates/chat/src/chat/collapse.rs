use std::collections::hash_map::DefaultHasher;
use std::hash::{Hash, Hasher};
use std::time::Duration;

use arbor_storage::PreferenceStore;

use crate::chat::message::MessageId;
use crate::layout::{ElementId, LayoutHost};
use crate::schedule::{Scheduler, TaskHandle};
use crate::selection::{SelectionBroker, SelectionSnapshot, SelectionSubscription};

const COLLAPSED_KEY_PREFIX: &str = "message-collapsed-";

/// Preference key holding the persisted collapse flag of one message.
pub fn collapsed_preference_key(message_id: MessageId) -> String {
    format!("{COLLAPSED_KEY_PREFIX}{message_id}")
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CollapseConfig {
    /// Content taller than this is long enough to collapse.
    pub max_height: f32,
    pub collapsed_height: f32,
    /// Distance from the container's bottom edge that reveals the toggle.
    pub reveal_band: f32,
    pub recheck_delay: Duration,
    pub scroll_delay: Duration,
}

impl Default for CollapseConfig {
    fn default() -> Self {
        Self {
            max_height: 400.0,
            collapsed_height: 200.0,
            reveal_band: 150.0,
            recheck_delay: Duration::from_millis(100),
            scroll_delay: Duration::from_millis(100),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CollapseState {
    NotMeasured,
    ShortContent,
    Collapsed,
    Expanded,
}

impl CollapseState {
    pub fn is_long(self) -> bool {
        matches!(self, Self::Collapsed | Self::Expanded)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ContentKind {
    PlainText,
    Markdown,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CollapseTask {
    Recheck { message_id: MessageId, generation: u64 },
    /// Brings the message row to the top once the collapse has started.
    ScrollRowToTop { message_id: MessageId },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ToggleLabel {
    Expand,
    Collapse,
}

/// Presentation of one collapsible block.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CollapseRender {
    pub state: CollapseState,
    pub height_cap: Option<f32>,
    pub show_fade: bool,
    pub show_toggle: bool,
    pub toggle_label: ToggleLabel,
}

#[derive(Debug, Clone, Copy)]
struct MountedContent {
    container: ElementId,
    content: ElementId,
    observed: bool,
}

/// Expand/collapse state of one message's content block.
#[derive(Debug)]
pub struct CollapseController {
    message_id: MessageId,
    config: CollapseConfig,
    state: CollapseState,
    expanded: bool,
    mounted: Option<MountedContent>,
    kind: Option<ContentKind>,
    fingerprint: Option<u64>,
    recheck: Option<TaskHandle>,
    recheck_generation: u64,
    pointer_near_bottom: bool,
    selecting: bool,
    broker: SelectionBroker<MessageId>,
    selection: Option<SelectionSubscription<MessageId>>,
}

impl CollapseController {
    /// Reads the persisted flag; an unreadable flag means expanded.
    pub fn new(
        message_id: MessageId,
        config: CollapseConfig,
        preferences: &dyn PreferenceStore,
        broker: SelectionBroker<MessageId>,
    ) -> Self {
        let key = collapsed_preference_key(message_id);
        let collapsed = match preferences.get_preference(&key) {
            Ok(value) => value.as_deref() == Some("true"),
            Err(error) => {
                tracing::warn!(%message_id, "failed to read collapse flag: {error}");
                false
            }
        };

        Self {
            message_id,
            config,
            state: CollapseState::NotMeasured,
            expanded: !collapsed,
            mounted: None,
            kind: None,
            fingerprint: None,
            recheck: None,
            recheck_generation: 0,
            pointer_near_bottom: false,
            selecting: false,
            broker,
            selection: None,
        }
    }

    pub fn message_id(&self) -> MessageId {
        self.message_id
    }

    pub fn state(&self) -> CollapseState {
        self.state
    }

    pub fn container(&self) -> Option<ElementId> {
        self.mounted.map(|mounted| mounted.container)
    }

    pub fn content(&self) -> Option<ElementId> {
        self.mounted.map(|mounted| mounted.content)
    }

    /// Kind passed to the latest [`Self::set_content`].
    pub fn content_kind(&self) -> Option<ContentKind> {
        self.kind
    }

    pub fn is_subscribed(&self) -> bool {
        self.selection.is_some()
    }

    /// Attaches the rendered container and content nodes and arms measurement.
    pub fn mount<T, S>(
        &mut self,
        container: ElementId,
        content: ElementId,
        host: &mut dyn LayoutHost,
        scheduler: &mut S,
    ) where
        T: From<CollapseTask>,
        S: Scheduler<T> + ?Sized,
    {
        if let Some(previous) = self.mounted.take()
            && previous.observed
        {
            host.unobserve_resize(previous.content);
        }

        let observed = host.observe_resize(content);
        if !observed {
            tracing::trace!(
                message_id = %self.message_id,
                "resize observation unsupported for content"
            );
        }
        self.mounted = Some(MountedContent {
            container,
            content,
            observed,
        });
        self.arm_measurement(host, scheduler);
    }

    /// Re-arms measurement when the text or its kind changed since the last call.
    pub fn set_content<T, S>(
        &mut self,
        text: &str,
        kind: ContentKind,
        host: &mut dyn LayoutHost,
        scheduler: &mut S,
    ) where
        T: From<CollapseTask>,
        S: Scheduler<T> + ?Sized,
    {
        let mut hasher = DefaultHasher::new();
        text.hash(&mut hasher);
        kind.hash(&mut hasher);
        let fingerprint = hasher.finish();
        self.kind = Some(kind);

        if self.fingerprint.replace(fingerprint) == Some(fingerprint) {
            return;
        }
        if self.mounted.is_some() {
            self.arm_measurement(host, scheduler);
        }
    }

    /// Handles a resize notification; returns false when it was for another element.
    pub fn on_resize(&mut self, element: ElementId, host: &dyn LayoutHost) -> bool {
        if self.content() != Some(element) {
            return false;
        }
        self.measure(host);
        true
    }

    /// Runs a delayed re-check; a superseded one is ignored.
    ///
    /// [`CollapseTask::ScrollRowToTop`] belongs to the viewport and is not handled here.
    pub fn on_task(&mut self, task: CollapseTask, host: &dyn LayoutHost) {
        if let CollapseTask::Recheck {
            message_id,
            generation,
        } = task
            && message_id == self.message_id
            && generation == self.recheck_generation
        {
            self.recheck = None;
            self.measure(host);
        }
    }

    pub fn pointer_moved(&mut self, pointer_y: f32, host: &dyn LayoutHost) {
        self.pointer_near_bottom = self
            .container()
            .and_then(|container| host.bounds(container))
            .is_some_and(|bounds| {
                let distance = bounds.bottom - pointer_y;
                (0.0..=self.config.reveal_band).contains(&distance)
            });
    }

    pub fn pointer_left(&mut self) {
        self.pointer_near_bottom = false;
    }

    pub fn on_selection_change(&mut self, snapshot: &SelectionSnapshot, host: &dyn LayoutHost) {
        if !self.state.is_long() {
            return;
        }
        self.selecting = self
            .container()
            .is_some_and(|container| snapshot.intersects(container, host));
    }

    /// Flips a long block between expanded and collapsed and persists the flag.
    ///
    /// Collapsing schedules the row scroll; short or unmeasured blocks ignore the toggle.
    pub fn toggle<T, S>(
        &mut self,
        preferences: &dyn PreferenceStore,
        scheduler: &mut S,
    ) -> Option<CollapseState>
    where
        T: From<CollapseTask>,
        S: Scheduler<T> + ?Sized,
    {
        if !self.state.is_long() {
            return None;
        }

        let was_expanded = self.expanded;
        self.expanded = !was_expanded;
        self.state = self.long_state();

        let collapsed = !self.expanded;
        let key = collapsed_preference_key(self.message_id);
        let value = if collapsed { "true" } else { "false" };
        if let Err(error) = preferences.set_preference(&key, value) {
            tracing::warn!(
                message_id = %self.message_id,
                "failed to persist collapse flag: {error}"
            );
        }

        if was_expanded {
            scheduler.schedule(
                self.config.scroll_delay,
                CollapseTask::ScrollRowToTop {
                    message_id: self.message_id,
                }
                .into(),
            );
        }

        tracing::debug!(
            message_id = %self.message_id,
            state = ?self.state,
            "toggled message collapse"
        );
        Some(self.state)
    }

    pub fn render(&self) -> CollapseRender {
        let toggle_label = if self.expanded {
            ToggleLabel::Collapse
        } else {
            ToggleLabel::Expand
        };

        let (height_cap, reveal) = match self.state {
            CollapseState::NotMeasured | CollapseState::ShortContent => (None, false),
            CollapseState::Collapsed => (Some(self.config.collapsed_height), true),
            CollapseState::Expanded => (None, self.pointer_near_bottom && !self.selecting),
        };

        CollapseRender {
            state: self.state,
            height_cap,
            show_fade: reveal,
            show_toggle: reveal,
            toggle_label,
        }
    }

    /// Releases observers, timers and the selection subscription.
    pub fn unmount<T, S>(&mut self, host: &mut dyn LayoutHost, scheduler: &mut S)
    where
        S: Scheduler<T> + ?Sized,
    {
        if let Some(mounted) = self.mounted.take()
            && mounted.observed
        {
            host.unobserve_resize(mounted.content);
        }
        if let Some(recheck) = self.recheck.take() {
            scheduler.cancel(recheck);
        }
        self.selection = None;
        self.selecting = false;
        self.pointer_near_bottom = false;
    }

    fn arm_measurement<T, S>(&mut self, host: &dyn LayoutHost, scheduler: &mut S)
    where
        T: From<CollapseTask>,
        S: Scheduler<T> + ?Sized,
    {
        self.measure(host);

        if let Some(previous) = self.recheck.take() {
            scheduler.cancel(previous);
        }
        self.recheck_generation += 1;
        self.recheck = Some(scheduler.schedule(
            self.config.recheck_delay,
            CollapseTask::Recheck {
                message_id: self.message_id,
                generation: self.recheck_generation,
            }
            .into(),
        ));
    }

    fn measure(&mut self, host: &dyn LayoutHost) {
        let Some(content) = self.content() else {
            return;
        };
        let height = host
            .scroll_metrics(content)
            .map(|metrics| metrics.scroll_height)
            .or_else(|| host.bounds(content).map(|bounds| bounds.height()));
        let Some(height) = height else {
            return;
        };

        let long = height > self.config.max_height;
        if long == self.state.is_long() && self.state != CollapseState::NotMeasured {
            return;
        }

        if long {
            self.state = self.long_state();
            if self.selection.is_none() {
                self.selection = Some(self.broker.subscribe(self.message_id));
            }
        } else {
            self.state = CollapseState::ShortContent;
            self.selection = None;
            self.selecting = false;
            self.pointer_near_bottom = false;
        }
        tracing::debug!(
            message_id = %self.message_id,
            height,
            state = ?self.state,
            "measured message content"
        );
    }

    fn long_state(&self) -> CollapseState {
        if self.expanded {
            CollapseState::Expanded
        } else {
            CollapseState::Collapsed
        }
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use std::collections::HashMap;
    use std::sync::Mutex;

    use arbor_storage::{StorageError, StorageResult};

    use super::*;
    use crate::layout::testing::FakeLayout;
    use crate::schedule::ManualScheduler;
    use crate::selection::SelectionSource;

    #[derive(Debug, Default)]
    pub(crate) struct MemoryPreferences {
        values: Mutex<HashMap<String, String>>,
    }

    impl MemoryPreferences {
        pub(crate) fn value(&self, key: &str) -> Option<String> {
            self.values.lock().expect("preferences lock").get(key).cloned()
        }
    }

    impl PreferenceStore for MemoryPreferences {
        fn get_preference(&self, key: &str) -> StorageResult<Option<String>> {
            Ok(self.value(key))
        }

        fn set_preference(&self, key: &str, value: &str) -> StorageResult<()> {
            self.values
                .lock()
                .expect("preferences lock")
                .insert(key.to_string(), value.to_string());
            Ok(())
        }
    }

    struct BrokenPreferences;

    impl PreferenceStore for BrokenPreferences {
        fn get_preference(&self, key: &str) -> StorageResult<Option<String>> {
            Err(StorageError::InvariantViolation {
                stage: "test-get-preference",
                details: format!("cannot read {key}"),
            })
        }

        fn set_preference(&self, key: &str, _value: &str) -> StorageResult<()> {
            Err(StorageError::InvariantViolation {
                stage: "test-set-preference",
                details: format!("cannot write {key}"),
            })
        }
    }

    pub(crate) struct NullSource;

    impl SelectionSource for NullSource {
        fn attach(&mut self) {}

        fn detach(&mut self) {}
    }

    const ROOT: ElementId = ElementId::new(1);
    const CONTAINER: ElementId = ElementId::new(2);
    const CONTENT: ElementId = ElementId::new(3);
    const OUTSIDE: ElementId = ElementId::new(4);

    /// Container at y=0 whose content reports `height` as its full scroll height.
    fn layout(height: f32) -> FakeLayout {
        let mut layout = FakeLayout::new();
        layout.add_root(ROOT, 2_000.0);
        layout.add_child(CONTAINER, ROOT, 0.0, height);
        layout.add_child(CONTENT, CONTAINER, 0.0, height);
        layout.add_child(OUTSIDE, ROOT, 1_000.0, 100.0);
        layout
    }

    fn mounted(
        message_id: MessageId,
        preferences: &dyn PreferenceStore,
        broker: &SelectionBroker<MessageId>,
        layout: &mut FakeLayout,
        scheduler: &mut ManualScheduler<CollapseTask>,
    ) -> CollapseController {
        let mut controller = CollapseController::new(
            message_id,
            CollapseConfig::default(),
            preferences,
            broker.clone(),
        );
        controller.mount(CONTAINER, CONTENT, layout, scheduler);
        controller
    }

    #[test]
    fn long_collapsed_message_caps_height_until_toggled() {
        let message_id = MessageId::new_v7();
        let preferences = MemoryPreferences::default();
        preferences
            .set_preference(&collapsed_preference_key(message_id), "true")
            .expect("seed flag");
        let broker = SelectionBroker::new(NullSource);
        let mut layout = layout(500.0);
        let mut scheduler = ManualScheduler::new();

        let mut controller = mounted(

            message_id,

            &preferences,

            &broker,

            &mut layout,

            &mut scheduler,

        );
        assert_eq!(
            controller.render(),
            CollapseRender {
                state: CollapseState::Collapsed,
                height_cap: Some(200.0),
                show_fade: true,
                show_toggle: true,
                toggle_label: ToggleLabel::Expand,
            }
        );

        assert_eq!(
            controller.toggle(&preferences, &mut scheduler),
            Some(CollapseState::Expanded)
        );
        let render = controller.render();
        assert_eq!(render.height_cap, None);
        assert_eq!(render.toggle_label, ToggleLabel::Collapse);
    }

    #[test]
    fn persisted_flag_round_trips_across_controllers() {
        let message_id = MessageId::new_v7();
        let key = collapsed_preference_key(message_id);
        let preferences = MemoryPreferences::default();
        let broker = SelectionBroker::new(NullSource);
        let mut layout = layout(900.0);
        let mut scheduler = ManualScheduler::new();

        let mut controller = mounted(

            message_id,

            &preferences,

            &broker,

            &mut layout,

            &mut scheduler,

        );
        assert_eq!(controller.state(), CollapseState::Expanded);
        controller.toggle(&preferences, &mut scheduler);
        assert_eq!(preferences.value(&key).as_deref(), Some("true"));
        controller.unmount(&mut layout, &mut scheduler);

        let mut controller = mounted(

            message_id,

            &preferences,

            &broker,

            &mut layout,

            &mut scheduler,

        );
        assert_eq!(controller.state(), CollapseState::Collapsed);
        controller.toggle(&preferences, &mut scheduler);
        assert_eq!(preferences.value(&key).as_deref(), Some("false"));

        let controller = mounted(message_id, &preferences, &broker, &mut layout, &mut scheduler);
        assert_eq!(controller.state(), CollapseState::Expanded);
    }

    #[test]
    fn short_content_never_offers_the_toggle() {
        let preferences = MemoryPreferences::default();
        let broker = SelectionBroker::new(NullSource);
        let mut layout = layout(400.0);
        let mut scheduler = ManualScheduler::new();

        let mut controller = mounted(

            MessageId::new_v7(),

            &preferences,

            &broker,

            &mut layout,

            &mut scheduler,

        );
        controller.pointer_moved(390.0, &layout);

        let render = controller.render();
        assert_eq!(render.state, CollapseState::ShortContent);
        assert!(!render.show_toggle);
        assert!(!controller.is_subscribed());
        assert_eq!(controller.toggle(&preferences, &mut scheduler), None);
    }

    #[test]
    fn delayed_recheck_catches_multi_pass_content() {
        let preferences = MemoryPreferences::default();
        let broker = SelectionBroker::new(NullSource);
        let mut layout = layout(120.0);
        let mut scheduler = ManualScheduler::new();

        let mut controller = mounted(

            MessageId::new_v7(),

            &preferences,

            &broker,

            &mut layout,

            &mut scheduler,

        );
        assert_eq!(controller.state(), CollapseState::ShortContent);

        // Markdown finished rendering without a resize notification.
        layout.set_height(CONTENT, 640.0);
        for task in scheduler.advance(Duration::from_millis(100)) {
            controller.on_task(task, &layout);
        }

        assert_eq!(controller.state(), CollapseState::Expanded);
        assert!(controller.is_subscribed());
        assert_eq!(broker.subscriber_count(), 1);
    }

    #[test]
    fn content_change_rearms_and_supersedes_the_recheck() {
        let preferences = MemoryPreferences::default();
        let broker = SelectionBroker::new(NullSource);
        let mut layout = layout(120.0);
        let mut scheduler = ManualScheduler::new();
        let mut controller = mounted(
            MessageId::new_v7(),
            &preferences,
            &broker,
            &mut layout,
            &mut scheduler,
        );

        controller.set_content("hello", ContentKind::Markdown, &mut layout, &mut scheduler);
        assert_eq!(scheduler.pending_len(), 1);
        controller.set_content("hello", ContentKind::Markdown, &mut layout, &mut scheduler);
        assert_eq!(scheduler.pending_len(), 1);

        let stale = CollapseTask::Recheck {
            message_id: controller.message_id(),
            generation: 0,
        };
        layout.set_height(CONTENT, 800.0);
        controller.on_task(stale, &layout);
        assert_eq!(controller.state(), CollapseState::ShortContent);

        assert!(controller.on_resize(CONTENT, &layout));
        assert_eq!(controller.state(), CollapseState::Expanded);
        assert!(!controller.on_resize(OUTSIDE, &layout));
    }

    #[test]
    fn expanded_reveal_follows_pointer_and_yields_to_selection() {
        let preferences = MemoryPreferences::default();
        let broker = SelectionBroker::new(NullSource);
        let mut layout = layout(800.0);
        let mut scheduler = ManualScheduler::new();
        let mut controller = mounted(
            MessageId::new_v7(),
            &preferences,
            &broker,
            &mut layout,
            &mut scheduler,
        );
        assert!(!controller.render().show_toggle);

        controller.pointer_moved(700.0, &layout);
        assert!(controller.render().show_toggle);
        controller.pointer_moved(600.0, &layout);
        assert!(!controller.render().show_toggle);
        controller.pointer_moved(820.0, &layout);
        assert!(!controller.render().show_toggle);

        controller.pointer_moved(750.0, &layout);
        let inside = SelectionSnapshot {
            anchor: Some(CONTENT),
            focus: Some(CONTENT),
            text_len: 5,
        };
        controller.on_selection_change(&inside, &layout);
        assert!(!controller.render().show_fade);

        let elsewhere = SelectionSnapshot {
            anchor: Some(OUTSIDE),
            focus: Some(OUTSIDE),
            text_len: 5,
        };
        controller.on_selection_change(&elsewhere, &layout);
        assert!(controller.render().show_fade);

        controller.pointer_left();
        assert!(!controller.render().show_toggle);
    }

    #[test]
    fn only_collapsing_schedules_the_row_scroll() {
        let message_id = MessageId::new_v7();
        let preferences = MemoryPreferences::default();
        let broker = SelectionBroker::new(NullSource);
        let mut layout = layout(800.0);
        let mut scheduler = ManualScheduler::new();
        let mut controller = mounted(
            message_id,
            &preferences,
            &broker,
            &mut layout,
            &mut scheduler,
        );
        scheduler.advance(Duration::from_millis(100));

        controller.toggle(&preferences, &mut scheduler);
        assert!(scheduler.advance(Duration::from_millis(99)).is_empty());
        assert_eq!(
            scheduler.advance(Duration::from_millis(1)),
            vec![CollapseTask::ScrollRowToTop { message_id }]
        );

        controller.toggle(&preferences, &mut scheduler);
        assert!(scheduler.advance(Duration::from_secs(1)).is_empty());
    }

    #[test]
    fn preference_failures_degrade_to_expanded() {
        let broken = BrokenPreferences;
        let broker = SelectionBroker::new(NullSource);
        let mut layout = layout(800.0);
        let mut scheduler = ManualScheduler::new();
        let mut controller = mounted(
            MessageId::new_v7(),
            &broken,
            &broker,
            &mut layout,
            &mut scheduler,
        );

        assert_eq!(controller.state(), CollapseState::Expanded);
        assert_eq!(
            controller.toggle(&broken, &mut scheduler),
            Some(CollapseState::Collapsed)
        );
    }

    #[test]
    fn shrinking_below_threshold_releases_the_subscription() {
        let preferences = MemoryPreferences::default();
        let broker = SelectionBroker::new(NullSource);
        let mut layout = layout(800.0);
        let mut scheduler = ManualScheduler::new();
        let mut controller = mounted(
            MessageId::new_v7(),
            &preferences,
            &broker,
            &mut layout,
            &mut scheduler,
        );
        assert_eq!(broker.subscriber_count(), 1);

        layout.set_height(CONTENT, 300.0);
        controller.on_resize(CONTENT, &layout);
        assert_eq!(controller.state(), CollapseState::ShortContent);
        assert_eq!(broker.subscriber_count(), 0);
        assert!(!broker.is_attached());
    }
}

use std::collections::HashMap;
use std::time::Duration;

use crate::chat::tree::RowKey;
use crate::layout::{Alignment, ElementId, LayoutHost, Motion, Span};
use crate::schedule::{Scheduler, TaskHandle};

/// Scroll deltas below this are treated as already in place.
const SCROLL_DELTA_EPSILON: f32 = 0.5;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ViewportConfig {
    pub retry_delay: Duration,
    /// Attempts after the first one before the request is dropped.
    pub retry_limit: u32,
    pub stabilization_window: Duration,
    /// Space kept free above the container's bottom edge for overlaid controls.
    pub bottom_gap: f32,
    /// Minimum spacing between two instant jumps to the end of the list.
    pub jump_throttle: Duration,
    /// Minimum spacing between two smooth reveals of the next message.
    pub reveal_throttle: Duration,
    /// How far past the revealed message's bottom edge the list scrolls.
    pub reveal_offset: f32,
}

impl Default for ViewportConfig {
    fn default() -> Self {
        Self {
            retry_delay: Duration::from_millis(50),
            retry_limit: 5,
            stabilization_window: Duration::from_millis(1_200),
            bottom_gap: 80.0,
            jump_throttle: Duration::from_millis(145),
            reveal_throttle: Duration::from_millis(750),
            reveal_offset: 80.0,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct RequestId(u64);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct BringIntoView {
    pub alignment: Alignment,
    /// Motion of the first attempt; retries and corrections are always instant.
    pub motion: Motion,
    /// Element held by the invoking row, preferred over the registry lookup.
    pub origin: Option<ElementId>,
}

/// User-triggered scroll-down controls.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum JumpKind {
    /// Instant jump to the end-of-list anchor.
    ToEnd,
    /// Smooth scroll that brings the first message cut off at the bottom fully into
    /// view, plus a bit of the one after it.
    RevealNext,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct JumpRequest {
    pub kind: JumpKind,
    /// Marker rendered after the last message.
    pub end_anchor: ElementId,
    /// Scrollable message list; without it the end anchor is scrolled into view.
    pub list: Option<ElementId>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JumpOutcome {
    Performed,
    /// Throttled; the jump runs once the window closes.
    Deferred,
    /// Throttled behind an already deferred jump, which now uses these arguments.
    Coalesced,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ViewportTask {
    Attempt { request: RequestId, attempt: u32 },
    Settle { element: ElementId, generation: u64 },
    Jump { kind: JumpKind },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AttemptOutcome {
    Placed(ElementId),
    Retrying { next_attempt: u32 },
    Abandoned,
    /// The request already completed or was superseded.
    Stale,
}

#[derive(Debug)]
struct PendingRequest {
    key: RowKey,
    options: BringIntoView,
    timer: TaskHandle,
}

#[derive(Debug)]
struct StabilizationWatch {
    alignment: Alignment,
    generation: u64,
    expiry: TaskHandle,
}

#[derive(Debug, Default)]
struct JumpThrottle {
    last_run: Option<Duration>,
    trailing: Option<(JumpRequest, TaskHandle)>,
}

/// Keeps a logical message row visible while the surrounding tree re-renders and
/// its layout settles.
#[derive(Debug)]
pub struct ViewportCoordinator {
    config: ViewportConfig,
    rows: HashMap<RowKey, ElementId>,
    pending: HashMap<RequestId, PendingRequest>,
    watches: HashMap<ElementId, StabilizationWatch>,
    jumps: HashMap<JumpKind, JumpThrottle>,
    next_request: u64,
    next_generation: u64,
}

impl ViewportCoordinator {
    pub fn new(config: ViewportConfig) -> Self {
        Self {
            config,
            rows: HashMap::new(),
            pending: HashMap::new(),
            watches: HashMap::new(),
            jumps: HashMap::new(),
            next_request: 0,
            next_generation: 0,
        }
    }

    pub fn config(&self) -> ViewportConfig {
        self.config
    }

    pub fn set_config(&mut self, config: ViewportConfig) {
        self.config = config;
    }

    /// Records the element currently rendered for `key`; the latest mount wins.
    pub fn register_row(&mut self, key: RowKey, element: ElementId) {
        self.rows.insert(key, element);
    }

    /// Drops the mapping only if it still points at `element`, so a replacement
    /// mounted before the old row unmounted stays registered.
    pub fn unregister_row(&mut self, key: &RowKey, element: ElementId) {
        if self.rows.get(key) == Some(&element) {
            self.rows.remove(key);
        }
    }

    pub fn pending_len(&self) -> usize {
        self.pending.len()
    }

    pub fn is_watching(&self, element: ElementId) -> bool {
        self.watches.contains_key(&element)
    }

    /// Schedules a best-effort placement of `key` on the next frame.
    ///
    /// A newer request for the same key supersedes an unfinished one.
    pub fn request<T, S>(
        &mut self,
        key: RowKey,
        options: BringIntoView,
        scheduler: &mut S,
    ) -> RequestId
    where
        T: From<ViewportTask>,
        S: Scheduler<T> + ?Sized,
    {
        let superseded = self
            .pending
            .iter()
            .filter(|(_, pending)| pending.key == key)
            .map(|(id, _)| *id)
            .collect::<Vec<_>>();
        for id in superseded {
            if let Some(pending) = self.pending.remove(&id) {
                scheduler.cancel(pending.timer);
            }
        }

        let request = RequestId(self.next_request);
        self.next_request += 1;
        let timer = scheduler.schedule(
            Duration::ZERO,
            ViewportTask::Attempt {
                request,
                attempt: 0,
            }
            .into(),
        );
        self.pending.insert(
            request,
            PendingRequest {
                key,
                options,
                timer,
            },
        );
        request
    }

    /// Handles a due task; `None` for stabilization bookkeeping.
    pub fn on_task<T, S>(
        &mut self,
        task: ViewportTask,
        host: &mut dyn LayoutHost,
        scheduler: &mut S,
    ) -> Option<AttemptOutcome>
    where
        T: From<ViewportTask>,
        S: Scheduler<T> + ?Sized,
    {
        match task {
            ViewportTask::Attempt { request, attempt } => {
                Some(self.attempt(request, attempt, host, scheduler))
            }
            ViewportTask::Settle {
                element,
                generation,
            } => {
                if self
                    .watches
                    .get(&element)
                    .is_some_and(|watch| watch.generation == generation)
                {
                    self.watches.remove(&element);
                    host.unobserve_resize(element);
                    tracing::trace!(?element, "stabilization window elapsed");
                }
                None
            }
            ViewportTask::Jump { kind } => {
                let throttle = self.jumps.entry(kind).or_default();
                if let Some((request, _)) = throttle.trailing.take() {
                    throttle.last_run = Some(scheduler.now());
                    self.perform_jump(request, host);
                }
                None
            }
        }
    }

    /// Runs a scroll-down control, throttled per kind with a leading and a trailing edge.
    pub fn jump<T, S>(
        &mut self,
        request: JumpRequest,
        host: &mut dyn LayoutHost,
        scheduler: &mut S,
    ) -> JumpOutcome
    where
        T: From<ViewportTask>,
        S: Scheduler<T> + ?Sized,
    {
        let window = match request.kind {
            JumpKind::ToEnd => self.config.jump_throttle,
            JumpKind::RevealNext => self.config.reveal_throttle,
        };
        let now = scheduler.now();
        let throttle = self.jumps.entry(request.kind).or_default();

        if let Some((pending, _)) = throttle.trailing.as_mut() {
            *pending = request;
            return JumpOutcome::Coalesced;
        }

        match throttle.last_run.map(|last| last + window) {
            Some(reopens) if reopens > now => {
                let task = ViewportTask::Jump { kind: request.kind };
                let timer = scheduler.schedule(reopens - now, task.into());
                throttle.trailing = Some((request, timer));
                JumpOutcome::Deferred
            }
            _ => {
                throttle.last_run = Some(now);
                self.perform_jump(request, host);
                JumpOutcome::Performed
            }
        }
    }

    /// Re-applies placement after a late layout shift of a watched row.
    ///
    /// Returns true when a correction was applied.
    pub fn on_resize(&mut self, element: ElementId, host: &mut dyn LayoutHost) -> bool {
        let Some(watch) = self.watches.get(&element) else {
            return false;
        };

        if !host.is_connected(element) {
            // The pending expiry becomes a stale no-op.
            self.watches.remove(&element);
            host.unobserve_resize(element);
            return false;
        }

        let alignment = watch.alignment;
        self.place(element, alignment, Motion::Instant, host);
        true
    }

    /// Cancels every unfinished request and stabilization watch.
    pub fn reset<T, S>(&mut self, host: &mut dyn LayoutHost, scheduler: &mut S)
    where
        S: Scheduler<T> + ?Sized,
    {
        for (_, pending) in self.pending.drain() {
            scheduler.cancel(pending.timer);
        }
        for (element, watch) in self.watches.drain() {
            scheduler.cancel(watch.expiry);
            host.unobserve_resize(element);
        }
        for (_, throttle) in self.jumps.drain() {
            if let Some((_, timer)) = throttle.trailing {
                scheduler.cancel(timer);
            }
        }
    }

    fn perform_jump(&self, request: JumpRequest, host: &mut dyn LayoutHost) {
        let motion = match request.kind {
            JumpKind::ToEnd => Motion::Instant,
            JumpKind::RevealNext => Motion::Smooth,
        };
        let list = request
            .list
            .and_then(|list| Some((list, host.bounds(list)?, host.scroll_metrics(list)?)));
        let (JumpKind::RevealNext, Some((list, visible, metrics))) = (request.kind, list) else {
            host.scroll_into_view(request.end_anchor, Alignment::Start, motion);
            return;
        };

        let mut rows = self
            .rows
            .values()
            .filter(|&&row| host.is_connected(row) && scroll_container_of(row, host) == Some(list))
            .filter_map(|&row| host.bounds(row))
            .collect::<Vec<_>>();
        rows.sort_by(|left, right| left.top.total_cmp(&right.top));

        match rows.into_iter().find(|row| row.bottom > visible.bottom) {
            Some(row) => {
                let delta = row.bottom - visible.bottom + self.config.reveal_offset;
                host.scroll_to(list, metrics.scroll_top + delta, motion);
                tracing::trace!(delta, "revealed next message");
            }
            None => tracing::trace!("no message below the fold"),
        }
    }

    fn attempt<T, S>(
        &mut self,
        request: RequestId,
        attempt: u32,
        host: &mut dyn LayoutHost,
        scheduler: &mut S,
    ) -> AttemptOutcome
    where
        T: From<ViewportTask>,
        S: Scheduler<T> + ?Sized,
    {
        let Some(pending) = self.pending.get(&request) else {
            return AttemptOutcome::Stale;
        };
        let key = pending.key.clone();
        let options = pending.options;
        let motion = if attempt == 0 {
            options.motion
        } else {
            Motion::Instant
        };

        match self.resolve_row(&key, options.origin, host) {
            Some(row) => {
                self.pending.remove(&request);
                self.place(row, options.alignment, motion, host);
                self.watch(row, options.alignment, host, scheduler);
                tracing::debug!(%key, attempt, ?row, "brought row into view");
                AttemptOutcome::Placed(row)
            }
            None if attempt >= self.config.retry_limit => {
                self.pending.remove(&request);
                tracing::trace!(%key, attempt, "row never appeared, giving up");
                AttemptOutcome::Abandoned
            }
            None => {
                let next_attempt = attempt + 1;
                let timer = scheduler.schedule(
                    self.config.retry_delay,
                    ViewportTask::Attempt {
                        request,
                        attempt: next_attempt,
                    }
                    .into(),
                );
                if let Some(pending) = self.pending.get_mut(&request) {
                    pending.timer = timer;
                }
                tracing::trace!(%key, next_attempt, "row not mounted yet, retrying");
                AttemptOutcome::Retrying { next_attempt }
            }
        }
    }

    fn resolve_row(
        &self,
        key: &RowKey,
        origin: Option<ElementId>,
        host: &dyn LayoutHost,
    ) -> Option<ElementId> {
        origin
            .and_then(|element| row_containing(element, host))
            .or_else(|| {
                self.rows
                    .get(key)
                    .and_then(|&element| row_containing(element, host))
            })
    }

    fn place(
        &self,
        row: ElementId,
        alignment: Alignment,
        motion: Motion,
        host: &mut dyn LayoutHost,
    ) {
        let Some(container) = scroll_container_of(row, host) else {
            host.scroll_into_view(row, alignment, motion);
            return;
        };

        let (Some(visible), Some(target), Some(metrics)) = (
            host.bounds(container),
            host.bounds(row),
            host.scroll_metrics(container),
        ) else {
            host.scroll_into_view(row, alignment, motion);
            return;
        };

        let delta = match alignment {
            Alignment::Nearest => nearest_delta(visible, target, self.config.bottom_gap),
            Alignment::Start => target.top - visible.top,
        };
        if delta.abs() > SCROLL_DELTA_EPSILON {
            host.scroll_to(container, metrics.scroll_top + delta, motion);
        }
    }

    fn watch<T, S>(
        &mut self,
        row: ElementId,
        alignment: Alignment,
        host: &mut dyn LayoutHost,
        scheduler: &mut S,
    ) where
        T: From<ViewportTask>,
        S: Scheduler<T> + ?Sized,
    {
        match self.watches.remove(&row) {
            Some(previous) => scheduler.cancel(previous.expiry),
            None => {
                if !host.observe_resize(row) {
                    tracing::trace!(
                        ?row,
                        "resize observation unsupported, skipping stabilization"
                    );
                    return;
                }
            }
        }

        let generation = self.next_generation;
        self.next_generation += 1;
        let expiry = scheduler.schedule(
            self.config.stabilization_window,
            ViewportTask::Settle {
                element: row,
                generation,
            }
            .into(),
        );
        self.watches.insert(
            row,
            StabilizationWatch {
                alignment,
                generation,
                expiry,
            },
        );
    }
}

/// Nearest enclosing row container, starting with the element itself.
fn row_containing(element: ElementId, host: &dyn LayoutHost) -> Option<ElementId> {
    if !host.is_connected(element) {
        return None;
    }

    let mut current = Some(element);
    while let Some(candidate) = current {
        if host.is_row_container(candidate) {
            return Some(candidate);
        }
        current = host.parent(candidate);
    }
    None
}

fn scroll_container_of(element: ElementId, host: &dyn LayoutHost) -> Option<ElementId> {
    let mut current = host.parent(element);
    while let Some(candidate) = current {
        if host
            .scroll_metrics(candidate)
            .is_some_and(|metrics| metrics.scrolls_vertically())
        {
            return Some(candidate);
        }
        current = host.parent(candidate);
    }
    None
}

/// Smallest scroll delta that fits `target` between the visible top and the gap-adjusted bottom.
///
/// Bottom overflow wins when the target is taller than the usable region. The gap is
/// capped at half the visible height so tiny viewports keep a usable band.
fn nearest_delta(visible: Span, target: Span, bottom_gap: f32) -> f32 {
    let gap = bottom_gap.min(visible.height() / 2.0).max(0.0);
    let bottom_limit = visible.bottom - gap;

    if target.bottom > bottom_limit {
        target.bottom - bottom_limit
    } else if target.top < visible.top {
        target.top - visible.top
    } else {
        0.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::layout::testing::FakeLayout;
    use crate::schedule::ManualScheduler;

    const ROOT: ElementId = ElementId::new(1);
    const LIST: ElementId = ElementId::new(2);
    const ROW: ElementId = ElementId::new(10);
    const ROW_NAV: ElementId = ElementId::new(11);

    fn key() -> RowKey {
        crate::chat::tree::GroupAnchor::Root.row_key()
    }

    /// 600px tall message list scrolled to the top, with a 200px row at y=1000.
    fn layout_with_row() -> FakeLayout {
        let mut layout = FakeLayout::new();
        layout.add_root(ROOT, 600.0);
        layout.add_scroll_container(LIST, ROOT, 600.0, 3_000.0);
        layout.add_row(ROW, LIST, 1_000.0, 200.0);
        layout.add_child(ROW_NAV, ROW, 180.0, 20.0);
        layout
    }

    fn run(
        coordinator: &mut ViewportCoordinator,
        layout: &mut FakeLayout,
        scheduler: &mut ManualScheduler<ViewportTask>,
        by: Duration,
    ) -> Vec<AttemptOutcome> {
        let until = scheduler.now() + by;
        let mut outcomes = Vec::new();
        while let Some(task) = scheduler.next_due(until) {
            outcomes.extend(coordinator.on_task(task, layout, scheduler));
        }
        outcomes
    }

    #[test]
    fn places_registered_row_above_the_bottom_gap() {
        let mut layout = layout_with_row();
        let mut scheduler = ManualScheduler::new();
        let mut coordinator = ViewportCoordinator::new(ViewportConfig::default());
        coordinator.register_row(key(), ROW);

        coordinator.request(key(), BringIntoView::default(), &mut scheduler);
        let outcomes = run(&mut coordinator, &mut layout, &mut scheduler, Duration::ZERO);

        assert_eq!(outcomes, vec![AttemptOutcome::Placed(ROW)]);
        assert_eq!(layout.scroll_log, vec![(LIST, 680.0, Motion::Smooth)]);
        let row = layout.bounds(ROW).expect("row bounds");
        assert!(row.top >= 0.0 && row.bottom <= 520.0, "row at {row:?}");
    }

    #[test]
    fn already_visible_row_is_not_scrolled() {
        let mut layout = layout_with_row();
        layout.add_row(ElementId::new(20), LIST, 100.0, 100.0);
        let mut scheduler = ManualScheduler::new();
        let mut coordinator = ViewportCoordinator::new(ViewportConfig::default());
        coordinator.register_row(key(), ElementId::new(20));

        coordinator.request(key(), BringIntoView::default(), &mut scheduler);
        run(&mut coordinator, &mut layout, &mut scheduler, Duration::ZERO);

        assert!(layout.scroll_log.is_empty());
    }

    #[test]
    fn row_above_the_viewport_scrolls_up_to_the_top_edge() {
        let mut layout = layout_with_row();
        layout.scroll_to(LIST, 1_500.0, Motion::Instant);
        layout.scroll_log.clear();
        let mut scheduler = ManualScheduler::new();
        let mut coordinator = ViewportCoordinator::new(ViewportConfig::default());
        coordinator.register_row(key(), ROW);

        coordinator.request(key(), BringIntoView::default(), &mut scheduler);
        run(&mut coordinator, &mut layout, &mut scheduler, Duration::ZERO);

        assert_eq!(layout.scroll_log, vec![(LIST, 1_000.0, Motion::Smooth)]);
    }

    #[test]
    fn late_mount_is_found_by_retry_with_instant_motion() {
        let mut layout = FakeLayout::new();
        layout.add_root(ROOT, 600.0);
        layout.add_scroll_container(LIST, ROOT, 600.0, 3_000.0);
        let mut scheduler = ManualScheduler::new();
        let mut coordinator = ViewportCoordinator::new(ViewportConfig::default());

        coordinator.request(key(), BringIntoView::default(), &mut scheduler);
        let mut outcomes = run(&mut coordinator, &mut layout, &mut scheduler, Duration::ZERO);
        outcomes.extend(run(
            &mut coordinator,
            &mut layout,
            &mut scheduler,
            Duration::from_millis(100),
        ));
        assert_eq!(
            outcomes,
            vec![
                AttemptOutcome::Retrying { next_attempt: 1 },
                AttemptOutcome::Retrying { next_attempt: 2 },
                AttemptOutcome::Retrying { next_attempt: 3 },
            ]
        );

        // Replacement row mounts between attempts.
        layout.add_row(ROW, LIST, 1_000.0, 200.0);
        coordinator.register_row(key(), ROW);
        let outcomes = run(
            &mut coordinator,
            &mut layout,
            &mut scheduler,
            Duration::from_millis(50),
        );

        assert_eq!(outcomes, vec![AttemptOutcome::Placed(ROW)]);
        assert_eq!(layout.scroll_log, vec![(LIST, 680.0, Motion::Instant)]);
        assert_eq!(coordinator.pending_len(), 0);
    }

    #[test]
    fn exhausting_the_retry_budget_is_silent() {
        let mut layout = FakeLayout::new();
        layout.add_root(ROOT, 600.0);
        let mut scheduler = ManualScheduler::new();
        let mut coordinator = ViewportCoordinator::new(ViewportConfig::default());

        coordinator.request(key(), BringIntoView::default(), &mut scheduler);
        let outcomes = run(
            &mut coordinator,
            &mut layout,
            &mut scheduler,
            Duration::from_secs(5),
        );

        assert_eq!(outcomes.len(), 6);
        assert_eq!(outcomes.last(), Some(&AttemptOutcome::Abandoned));
        assert!(layout.scroll_log.is_empty());
        assert!(layout.into_view_log.is_empty());
        assert_eq!(coordinator.pending_len(), 0);
        assert_eq!(scheduler.pending_len(), 0);
    }

    #[test]
    fn held_reference_wins_over_registry() {
        let mut layout = layout_with_row();
        let mut scheduler = ManualScheduler::new();
        let mut coordinator = ViewportCoordinator::new(ViewportConfig::default());

        let options = BringIntoView {
            origin: Some(ROW_NAV),
            ..BringIntoView::default()
        };
        coordinator.request(key(), options, &mut scheduler);
        let outcomes = run(&mut coordinator, &mut layout, &mut scheduler, Duration::ZERO);

        assert_eq!(outcomes, vec![AttemptOutcome::Placed(ROW)]);
    }

    #[test]
    fn start_alignment_puts_row_at_the_top() {
        let mut layout = layout_with_row();
        let mut scheduler = ManualScheduler::new();
        let mut coordinator = ViewportCoordinator::new(ViewportConfig::default());
        coordinator.register_row(key(), ROW);

        let options = BringIntoView {
            alignment: Alignment::Start,
            ..BringIntoView::default()
        };
        coordinator.request(key(), options, &mut scheduler);
        run(&mut coordinator, &mut layout, &mut scheduler, Duration::ZERO);

        assert_eq!(layout.scroll_log, vec![(LIST, 1_000.0, Motion::Smooth)]);
        assert_eq!(layout.bounds(ROW).map(|span| span.top), Some(0.0));
    }

    #[test]
    fn without_scroll_container_falls_back_to_scroll_into_view() {
        let mut layout = FakeLayout::new();
        layout.add_root(ROOT, 600.0);
        layout.add_row(ROW, ROOT, 1_000.0, 200.0);
        let mut scheduler = ManualScheduler::new();
        let mut coordinator = ViewportCoordinator::new(ViewportConfig::default());
        coordinator.register_row(key(), ROW);

        coordinator.request(key(), BringIntoView::default(), &mut scheduler);
        run(&mut coordinator, &mut layout, &mut scheduler, Duration::ZERO);

        assert!(layout.scroll_log.is_empty());
        assert_eq!(
            layout.into_view_log,
            vec![(ROW, Alignment::Nearest, Motion::Smooth)]
        );
    }

    #[test]
    fn late_growth_is_corrected_until_the_window_closes() {
        let mut layout = layout_with_row();
        let mut scheduler = ManualScheduler::new();
        let mut coordinator = ViewportCoordinator::new(ViewportConfig::default());
        coordinator.register_row(key(), ROW);

        coordinator.request(key(), BringIntoView::default(), &mut scheduler);
        run(&mut coordinator, &mut layout, &mut scheduler, Duration::ZERO);
        assert!(layout.is_observed(ROW));

        // An image finished loading inside the row.
        layout.set_height(ROW, 400.0);
        assert!(coordinator.on_resize(ROW, &mut layout));
        assert_eq!(layout.scroll_log.last(), Some(&(LIST, 880.0, Motion::Instant)));

        run(
            &mut coordinator,
            &mut layout,
            &mut scheduler,
            Duration::from_millis(1_200),
        );
        assert!(!coordinator.is_watching(ROW));
        assert!(!layout.is_observed(ROW));
        assert!(!coordinator.on_resize(ROW, &mut layout));
    }

    #[test]
    fn removed_row_detaches_its_watch() {
        let mut layout = layout_with_row();
        let mut scheduler = ManualScheduler::new();
        let mut coordinator = ViewportCoordinator::new(ViewportConfig::default());
        coordinator.register_row(key(), ROW);
        coordinator.request(key(), BringIntoView::default(), &mut scheduler);
        run(&mut coordinator, &mut layout, &mut scheduler, Duration::ZERO);

        layout.remove(ROW);
        assert!(!coordinator.on_resize(ROW, &mut layout));
        assert!(!coordinator.is_watching(ROW));
        assert!(!layout.is_observed(ROW));

        // The orphaned expiry fires later as a no-op.
        let outcomes = run(
            &mut coordinator,
            &mut layout,
            &mut scheduler,
            Duration::from_secs(2),
        );
        assert!(outcomes.is_empty());
    }

    #[test]
    fn unsupported_resize_observation_still_places_row() {
        let mut layout = layout_with_row();
        layout.resize_unsupported = true;
        let mut scheduler = ManualScheduler::new();
        let mut coordinator = ViewportCoordinator::new(ViewportConfig::default());
        coordinator.register_row(key(), ROW);

        coordinator.request(key(), BringIntoView::default(), &mut scheduler);
        let outcomes = run(&mut coordinator, &mut layout, &mut scheduler, Duration::ZERO);

        assert_eq!(outcomes, vec![AttemptOutcome::Placed(ROW)]);
        assert!(!coordinator.is_watching(ROW));
        assert_eq!(scheduler.pending_len(), 0);
    }

    #[test]
    fn newer_request_supersedes_and_stale_attempts_are_ignored() {
        let mut layout = layout_with_row();
        let mut scheduler = ManualScheduler::new();
        let mut coordinator = ViewportCoordinator::new(ViewportConfig::default());
        coordinator.register_row(key(), ROW);

        let first = coordinator.request(key(), BringIntoView::default(), &mut scheduler);
        coordinator.request(key(), BringIntoView::default(), &mut scheduler);
        let outcomes = run(&mut coordinator, &mut layout, &mut scheduler, Duration::ZERO);
        assert_eq!(outcomes, vec![AttemptOutcome::Placed(ROW)]);

        let stale = ViewportTask::Attempt {
            request: first,
            attempt: 1,
        };
        assert_eq!(
            coordinator.on_task(stale, &mut layout, &mut scheduler),
            Some(AttemptOutcome::Stale)
        );
    }

    #[test]
    fn unregister_keeps_newer_replacement() {
        let mut coordinator = ViewportCoordinator::new(ViewportConfig::default());
        coordinator.register_row(key(), ROW);
        coordinator.register_row(key(), ElementId::new(30));
        coordinator.unregister_row(&key(), ROW);

        let mut layout = FakeLayout::new();
        layout.add_root(ROOT, 600.0);
        layout.add_row(ElementId::new(30), ROOT, 0.0, 100.0);
        assert_eq!(
            coordinator.resolve_row(&key(), None, &layout),
            Some(ElementId::new(30))
        );
    }

    const END: ElementId = ElementId::new(90);

    /// Rows at 0..400, 400..900 and 900..1200 in a 600px list, plus the end marker.
    fn layout_with_thread(coordinator: &mut ViewportCoordinator) -> FakeLayout {
        let mut layout = FakeLayout::new();
        layout.add_root(ROOT, 600.0);
        layout.add_scroll_container(LIST, ROOT, 600.0, 3_000.0);
        for (index, (top, height)) in [(0.0, 400.0), (400.0, 500.0), (900.0, 300.0)]
            .into_iter()
            .enumerate()
        {
            let row = ElementId::new(40 + index as u64);
            layout.add_row(row, LIST, top, height);
            let anchor = crate::chat::tree::GroupAnchor::Parent(
                crate::chat::message::MessageId::new_v7(),
            );
            coordinator.register_row(anchor.row_key(), row);
        }
        layout.add_child(END, LIST, 1_200.0, 0.0);
        layout
    }

    fn reveal() -> JumpRequest {
        JumpRequest {
            kind: JumpKind::RevealNext,
            end_anchor: END,
            list: Some(LIST),
        }
    }

    #[test]
    fn reveal_next_scrolls_past_the_first_cut_off_message() {
        let mut coordinator = ViewportCoordinator::new(ViewportConfig::default());
        let mut layout = layout_with_thread(&mut coordinator);
        let mut scheduler = ManualScheduler::new();

        assert_eq!(
            coordinator.jump(reveal(), &mut layout, &mut scheduler),
            JumpOutcome::Performed
        );
        assert_eq!(layout.scroll_log, vec![(LIST, 380.0, Motion::Smooth)]);

        assert_eq!(
            coordinator.jump(reveal(), &mut layout, &mut scheduler),
            JumpOutcome::Deferred
        );
        assert_eq!(
            coordinator.jump(reveal(), &mut layout, &mut scheduler),
            JumpOutcome::Coalesced
        );
        assert_eq!(scheduler.pending_len(), 1);

        assert!(scheduler.advance(Duration::from_millis(749)).is_empty());
        assert_eq!(layout.scroll_log.len(), 1);

        // The trailing call sees the third row cut off at 820.
        for task in scheduler.advance(Duration::from_millis(1)) {
            coordinator.on_task(task, &mut layout, &mut scheduler);
        }
        assert_eq!(layout.scroll_log.last(), Some(&(LIST, 680.0, Motion::Smooth)));
        assert_eq!(
            coordinator.jump(reveal(), &mut layout, &mut scheduler),
            JumpOutcome::Deferred
        );
    }

    #[test]
    fn jump_to_end_is_instant_and_reset_drops_the_trailing_call() {
        let mut coordinator = ViewportCoordinator::new(ViewportConfig::default());
        let mut layout = layout_with_thread(&mut coordinator);
        let mut scheduler = ManualScheduler::new();
        let to_end = JumpRequest {
            kind: JumpKind::ToEnd,
            ..reveal()
        };

        coordinator.jump(to_end, &mut layout, &mut scheduler);
        assert_eq!(
            layout.into_view_log,
            vec![(END, Alignment::Start, Motion::Instant)]
        );
        // Throttles are independent per kind.
        assert_eq!(
            coordinator.jump(reveal(), &mut layout, &mut scheduler),
            JumpOutcome::Performed
        );
        assert_eq!(
            coordinator.jump(to_end, &mut layout, &mut scheduler),
            JumpOutcome::Deferred
        );

        coordinator.reset(&mut layout, &mut scheduler);
        run(
            &mut coordinator,
            &mut layout,
            &mut scheduler,
            Duration::from_secs(1),
        );
        assert_eq!(layout.into_view_log.len(), 1);
        assert_eq!(
            coordinator.jump(to_end, &mut layout, &mut scheduler),
            JumpOutcome::Performed
        );
    }

    #[test]
    fn reveal_without_a_list_scrolls_the_end_marker_into_view() {
        let mut coordinator = ViewportCoordinator::new(ViewportConfig::default());
        let mut layout = layout_with_thread(&mut coordinator);
        let mut scheduler = ManualScheduler::<ViewportTask>::new();

        let request = JumpRequest {
            list: None,
            ..reveal()
        };
        coordinator.jump(request, &mut layout, &mut scheduler);

        assert!(layout.scroll_log.is_empty());
        assert_eq!(
            layout.into_view_log,
            vec![(END, Alignment::Start, Motion::Smooth)]
        );
    }

    #[test]
    fn tiny_viewport_caps_the_bottom_gap() {
        let delta = nearest_delta(Span::new(0.0, 100.0), Span::new(40.0, 60.0), 80.0);
        assert_eq!(delta, 10.0);
    }
}

//! Rendering-layer contract consumed by the viewport and collapse logic.
//!
//! The embedding runtime owns the real element tree. This crate only sees opaque
//! element handles plus the handful of geometry and scrolling primitives below, and
//! receives resize and selection notifications pushed in by the runtime.

/// Opaque handle for one rendered element.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ElementId(pub u64);

impl ElementId {
    pub const fn new(raw: u64) -> Self {
        Self(raw)
    }
}

/// Vertical extent of an element in viewport coordinates.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct Span {
    pub top: f32,
    pub bottom: f32,
}

impl Span {
    pub const fn new(top: f32, bottom: f32) -> Self {
        Self { top, bottom }
    }

    pub fn height(&self) -> f32 {
        self.bottom - self.top
    }
}

/// Effective vertical overflow of an element.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Overflow {
    #[default]
    Visible,
    Hidden,
    Auto,
    Scroll,
    Overlay,
}

impl Overflow {
    pub fn is_scrollable(self) -> bool {
        matches!(self, Self::Auto | Self::Scroll | Self::Overlay)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct ScrollMetrics {
    pub overflow_y: Overflow,
    pub scroll_top: f32,
    pub scroll_height: f32,
    pub client_height: f32,
}

impl ScrollMetrics {
    /// True when the element scrolls vertically and its content exceeds its visible height.
    pub fn scrolls_vertically(&self) -> bool {
        self.overflow_y.is_scrollable() && self.scroll_height > self.client_height
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Motion {
    #[default]
    Smooth,
    Instant,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Alignment {
    /// Move only as far as needed to make the element visible.
    #[default]
    Nearest,
    /// Align the element's top with the top of the visible region.
    Start,
}

pub trait LayoutHost {
    fn parent(&self, element: ElementId) -> Option<ElementId>;

    /// False once the element has left the document.
    fn is_connected(&self, element: ElementId) -> bool;

    /// Whether `element` is a top-level message row container.
    fn is_row_container(&self, element: ElementId) -> bool;

    fn bounds(&self, element: ElementId) -> Option<Span>;

    fn scroll_metrics(&self, element: ElementId) -> Option<ScrollMetrics>;

    fn scroll_to(&mut self, container: ElementId, top: f32, motion: Motion);

    /// Generic "scroll into view" primitive used when no scrollable ancestor exists.
    fn scroll_into_view(&mut self, element: ElementId, alignment: Alignment, motion: Motion);

    /// Starts delivering resize notifications for `element`.
    ///
    /// Returns false when the runtime has no layout observer support.
    fn observe_resize(&mut self, element: ElementId) -> bool;

    fn unobserve_resize(&mut self, element: ElementId);

    /// Inclusive containment: an element contains itself.
    fn contains(&self, container: ElementId, node: ElementId) -> bool {
        let mut current = Some(node);
        while let Some(element) = current {
            if element == container {
                return true;
            }
            current = self.parent(element);
        }
        false
    }
}

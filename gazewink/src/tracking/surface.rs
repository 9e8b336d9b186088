//! Collaborator seams — the on-screen gaze indicator and the hit-testing
//! primitive — plus the in-process implementations the daemon runs with.
//!
//! Elements are referenced by id only.  The tracker never owns them, so an
//! element that disappears simply stops showing up in hit tests.

use tracing::debug;

use super::clock::Deadline;
use super::frame::Point;

// ── Traits ──────────────────────────────────────────────────

/// The visual gaze indicator.
pub trait Indicator {
    /// Id of the indicator's own element, if it has one in the hit-test tree.
    fn element_id(&self) -> Option<u64>;
    /// Current diameter in pixels.
    fn size(&self) -> f64;
    fn move_to(&mut self, x: f64, y: f64);
    /// Scale by `factor` for `duration_ms`, starting at `now_ms`.
    fn scale(&mut self, factor: f64, duration_ms: f64, now_ms: f64);
    fn show(&mut self);
    fn hide(&mut self);
    fn resize(&mut self, size: f64);
    fn visible(&self) -> bool;
}

/// Maps a screen point to the topmost element under it.
pub trait HitTester {
    fn hit_test(&self, x: f64, y: f64) -> Option<u64>;
    /// Whether the element carries the "always wins" marker.
    fn is_pinned(&self, element: u64) -> bool;
}

// ── Virtual indicator ───────────────────────────────────────

/// Headless indicator: tracks what a rendered indicator would show.
#[derive(Debug, Clone)]
pub struct VirtualIndicator {
    pub id: Option<u64>,
    pub position: Point,
    pub size: f64,
    pub shown: bool,
    scale_factor: f64,
    scale_window: Deadline,
}

impl VirtualIndicator {
    pub fn new(size: f64) -> Self {
        Self {
            id: None,
            position: Point::ZERO,
            size,
            shown: true,
            scale_factor: 1.0,
            scale_window: Deadline::default(),
        }
    }

    /// Scale factor in effect at `now_ms`; 1.0 once the gesture window ends.
    pub fn current_scale(&self, now_ms: f64) -> f64 {
        if self.scale_window.is_active(now_ms) {
            self.scale_factor
        } else {
            1.0
        }
    }

    /// Generate IPC status s-expression.
    pub fn status_sexp(&self, now_ms: f64) -> String {
        format!(
            "(:x {:.0} :y {:.0} :size {:.0} :visible {} :scale {:.2})",
            self.position.x,
            self.position.y,
            self.size,
            if self.shown { "t" } else { "nil" },
            self.current_scale(now_ms),
        )
    }
}

impl Indicator for VirtualIndicator {
    fn element_id(&self) -> Option<u64> {
        self.id
    }

    fn size(&self) -> f64 {
        self.size
    }

    fn move_to(&mut self, x: f64, y: f64) {
        self.position = Point::new(x, y);
    }

    fn scale(&mut self, factor: f64, duration_ms: f64, now_ms: f64) {
        self.scale_factor = factor;
        self.scale_window.raise(now_ms, duration_ms);
        debug!("Indicator scaled x{:.2} for {:.0}ms", factor, duration_ms);
    }

    fn show(&mut self) {
        self.shown = true;
    }

    fn hide(&mut self) {
        self.shown = false;
    }

    fn resize(&mut self, size: f64) {
        self.size = size;
    }

    fn visible(&self) -> bool {
        self.shown
    }
}

// ── Scene ───────────────────────────────────────────────────

/// Axis-aligned element registered by a client.
#[derive(Debug, Clone, PartialEq)]
pub struct SceneElement {
    pub id: u64,
    pub x: f64,
    pub y: f64,
    pub width: f64,
    pub height: f64,
    pub pinned: bool,
}

impl SceneElement {
    pub fn contains(&self, x: f64, y: f64) -> bool {
        x >= self.x && x < self.x + self.width && y >= self.y && y < self.y + self.height
    }

    pub fn to_sexp(&self) -> String {
        format!(
            "(:id {} :x {:.0} :y {:.0} :width {:.0} :height {:.0} :pinned {})",
            self.id,
            self.x,
            self.y,
            self.width,
            self.height,
            if self.pinned { "t" } else { "nil" },
        )
    }
}

/// Stack of elements; later entries are drawn on top.
#[derive(Debug, Clone, Default)]
pub struct Scene {
    elements: Vec<SceneElement>,
}

impl Scene {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add an element on top.  An existing element with the same id is
    /// replaced and raised.
    pub fn add(&mut self, element: SceneElement) {
        self.elements.retain(|e| e.id != element.id);
        debug!(element_id = element.id, "scene element added");
        self.elements.push(element);
    }

    /// Remove an element.  Returns false if it was not present.
    pub fn remove(&mut self, id: u64) -> bool {
        let before = self.elements.len();
        self.elements.retain(|e| e.id != id);
        self.elements.len() != before
    }

    pub fn get(&self, id: u64) -> Option<&SceneElement> {
        self.elements.iter().find(|e| e.id == id)
    }

    pub fn len(&self) -> usize {
        self.elements.len()
    }

    pub fn is_empty(&self) -> bool {
        self.elements.is_empty()
    }

    pub fn clear(&mut self) {
        self.elements.clear();
    }

    /// Generate IPC element list s-expression, bottom to top.
    pub fn list_sexp(&self) -> String {
        let items: Vec<String> = self.elements.iter().map(|e| e.to_sexp()).collect();
        format!("({})", items.join(" "))
    }
}

impl HitTester for Scene {
    fn hit_test(&self, x: f64, y: f64) -> Option<u64> {
        self.elements
            .iter()
            .rev()
            .find(|e| e.contains(x, y))
            .map(|e| e.id)
    }

    fn is_pinned(&self, element: u64) -> bool {
        self.get(element).map(|e| e.pinned).unwrap_or(false)
    }
}

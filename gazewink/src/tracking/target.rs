//! Gaze target resolution — probe concentric rings around the gaze point,
//! hit-test each probe, and vote for the element being looked at.
//!
//! A pinned element under any probe wins outright.  Otherwise the element
//! that first reaches the highest vote count wins, so ties go to whichever
//! got there earliest.  Resolution is throttled (leading edge) because each
//! pass costs rings × angles hit tests.

use std::collections::HashMap;
use std::f64::consts::PI;

use tracing::{debug, info};

use super::clock::Throttle;
use super::config::TrackerConfig;
use super::events::GazeEvent;
use super::frame::Point;
use super::surface::{HitTester, Indicator};

// ── Probe pattern ───────────────────────────────────────────

/// Probe points on concentric rings: radius 0..=size/2 in `ring_step_px`
/// steps, angle a·π for a in [0, 2) in `angle_step` steps.
pub fn probe_points(center: Point, size: f64, ring_step_px: f64, angle_step: f64) -> Vec<Point> {
    if ring_step_px <= 0.0 || angle_step <= 0.0 || !size.is_finite() {
        return vec![center];
    }
    let rings = ((size.max(0.0) / 2.0) / ring_step_px).floor() as usize;
    let angles = (2.0 / angle_step).round().max(1.0) as usize;

    let mut points = Vec::with_capacity((rings + 1) * angles);
    for ring in 0..=rings {
        let radius = ring as f64 * ring_step_px;
        for step in 0..angles {
            let a = step as f64 * angle_step;
            points.push(center.offset_polar(radius, a * PI));
        }
    }
    points
}

// ── Vote tally ──────────────────────────────────────────────

/// Per-pass vote counts.  Tracks the leader as votes arrive so that the
/// first element to reach the maximum keeps it.
#[derive(Debug, Default)]
struct VoteTally {
    counts: HashMap<u64, u32>,
    leader: Option<(u64, u32)>,
}

impl VoteTally {
    /// Count one vote.  Returns true if this was the element's first vote.
    fn vote(&mut self, element: u64) -> bool {
        let count = self.counts.entry(element).or_insert(0);
        *count += 1;
        let count = *count;
        if self.leader.map_or(true, |(_, best)| count > best) {
            self.leader = Some((element, count));
        }
        count == 1
    }

    fn winner(&self) -> Option<u64> {
        self.leader.map(|(id, _)| id)
    }
}

// ── Resolver ────────────────────────────────────────────────

/// Resolves the gazed-at element and tracks the current gaze focus.
#[derive(Debug, Clone)]
pub struct TargetResolver {
    /// Currently focused element.  May be stale if the element was removed.
    pub focus: Option<u64>,
    throttle: Throttle<Option<u64>>,
    /// Sampling passes actually run (throttled calls excluded).
    pub passes: u64,
    /// Total hit tests issued.
    pub hit_tests: u64,
}

impl TargetResolver {
    pub fn new(throttle_ms: f64) -> Self {
        Self {
            focus: None,
            throttle: Throttle::new(throttle_ms),
            passes: 0,
            hit_tests: 0,
        }
    }

    pub fn set_throttle(&mut self, throttle_ms: f64) {
        self.throttle.window_ms = throttle_ms;
    }

    /// Resolve the element at `center`.  Inside the throttle window the
    /// previous result is returned without hit testing.
    pub fn resolve(
        &mut self,
        center: Point,
        now_ms: f64,
        indicator: &mut dyn Indicator,
        hits: &dyn HitTester,
        config: &TrackerConfig,
    ) -> Option<u64> {
        if let Some(cached) = self.throttle.cached(now_ms) {
            return cached;
        }
        let winner = self.sample(center, indicator, hits, config);
        self.throttle.store(now_ms, winner);
        winner
    }

    /// One full sampling pass.  The indicator is hidden while probing so it
    /// never hit-tests itself, then restored to its prior visibility.
    fn sample(
        &mut self,
        center: Point,
        indicator: &mut dyn Indicator,
        hits: &dyn HitTester,
        config: &TrackerConfig,
    ) -> Option<u64> {
        let was_visible = indicator.visible();
        if was_visible {
            indicator.hide();
        }

        let probes = probe_points(center, indicator.size(), config.ring_step_px, config.angle_step);
        let mut tally = VoteTally::default();
        let mut pinned = None;
        for probe in &probes {
            self.hit_tests += 1;
            let Some(element) = hits.hit_test(probe.x, probe.y) else {
                continue;
            };
            if tally.vote(element) && hits.is_pinned(element) {
                pinned = Some(element);
                break;
            }
        }

        if was_visible {
            indicator.show();
        }
        self.passes += 1;

        let winner = pinned.or_else(|| tally.winner());
        debug!(
            "Resolved ({:.0}, {:.0}): {:?}{} from {} candidate(s)",
            center.x,
            center.y,
            winner,
            if pinned.is_some() { " (pinned)" } else { "" },
            tally.counts.len()
        );
        winner
    }

    /// Compare a resolved target against the current focus.  A new non-null
    /// target other than the indicator itself moves the focus and produces
    /// `gazeleave(old)` (if any) then `gaze(new)`.
    pub fn update_focus(&mut self, target: Option<u64>, indicator_id: Option<u64>) -> Vec<GazeEvent> {
        let Some(element) = target else {
            return Vec::new();
        };
        if self.focus == Some(element) || indicator_id == Some(element) {
            return Vec::new();
        }

        let mut events = Vec::with_capacity(2);
        if let Some(old) = self.focus.replace(element) {
            events.push(GazeEvent::GazeLeave { element: old });
        }
        events.push(GazeEvent::Gaze { element });
        info!("Gaze focus -> element {}", element);
        events
    }

    /// Drop the focus if it refers to `element` (removed externally).  No
    /// events are emitted and the throttle cache is invalidated.
    pub fn forget(&mut self, element: u64) {
        if self.focus == Some(element) {
            self.focus = None;
            debug!("Focused element {} removed, focus cleared", element);
        }
        self.throttle.reset();
    }

    pub fn reset(&mut self) {
        self.focus = None;
        self.throttle.reset();
        self.passes = 0;
        self.hit_tests = 0;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tracking::surface::{Scene, SceneElement, VirtualIndicator};
    use std::cell::{Cell, RefCell};
    use std::rc::Rc;

    /// Hit tester driven by a closure, counting calls.  Nothing is pinned.
    struct FnHits<F: Fn(f64, f64) -> Option<u64>> {
        f: F,
        calls: Cell<u64>,
    }

    impl<F: Fn(f64, f64) -> Option<u64>> FnHits<F> {
        fn new(f: F) -> Self {
            Self {
                f,
                calls: Cell::new(0),
            }
        }
    }

    impl<F: Fn(f64, f64) -> Option<u64>> HitTester for FnHits<F> {
        fn hit_test(&self, x: f64, y: f64) -> Option<u64> {
            self.calls.set(self.calls.get() + 1);
            (self.f)(x, y)
        }

        fn is_pinned(&self, _element: u64) -> bool {
            false
        }
    }

    fn element(id: u64, x: f64, y: f64, w: f64, h: f64, pinned: bool) -> SceneElement {
        SceneElement {
            id,
            x,
            y,
            width: w,
            height: h,
            pinned,
        }
    }

    #[test]
    fn test_probe_pattern_shape() {
        // size 100 → radii 0,9,...,45 (6 rings) × 10 angles
        let pts = probe_points(Point::new(200.0, 200.0), 100.0, 9.0, 0.2);
        assert_eq!(pts.len(), 60);
        assert!(pts[..10].iter().all(|p| *p == Point::new(200.0, 200.0)));

        let max_r = pts
            .iter()
            .map(|p| ((p.x - 200.0).powi(2) + (p.y - 200.0).powi(2)).sqrt())
            .fold(0.0, f64::max);
        assert!((max_r - 45.0).abs() < 1e-9, "outermost ring at {}", max_r);
    }

    #[test]
    fn test_probe_pattern_degenerate_steps() {
        let pts = probe_points(Point::new(1.0, 1.0), 100.0, 0.0, 0.2);
        assert_eq!(pts, vec![Point::new(1.0, 1.0)]);
    }

    #[test]
    fn test_majority_wins() {
        // Element 1 covers the left half of the probe disc, 2 a thin strip
        let hits = FnHits::new(|x, _y| if x <= 100.0 { Some(1) } else if x < 110.0 { Some(2) } else { None });
        let mut resolver = TargetResolver::new(100.0);
        let mut ind = VirtualIndicator::new(100.0);
        let winner = resolver.resolve(
            Point::new(100.0, 100.0),
            0.0,
            &mut ind,
            &hits,
            &TrackerConfig::default(),
        );
        assert_eq!(winner, Some(1));
    }

    #[test]
    fn test_nothing_under_probes() {
        let hits = FnHits::new(|_, _| None);
        let mut resolver = TargetResolver::new(100.0);
        let mut ind = VirtualIndicator::new(100.0);
        let winner = resolver.resolve(Point::new(5.0, 5.0), 0.0, &mut ind, &hits, &TrackerConfig::default());
        assert_eq!(winner, None);
        assert_eq!(hits.calls.get(), 60);
    }

    #[test]
    fn test_tie_goes_to_first_to_reach_max() {
        let mut tally = VoteTally::default();
        // 2 is discovered first, but 1 reaches three votes first
        for id in [2, 1, 1, 1, 2, 2] {
            tally.vote(id);
        }
        assert_eq!(tally.winner(), Some(1));

        let mut tally = VoteTally::default();
        for id in [2, 1, 2, 1] {
            tally.vote(id);
        }
        assert_eq!(tally.winner(), Some(2));
    }

    #[test]
    fn test_tally_reports_first_vote() {
        let mut tally = VoteTally::default();
        assert!(tally.vote(7));
        assert!(tally.vote(3));
        assert!(!tally.vote(7));
        assert!(!tally.vote(7));
        assert_eq!(tally.counts.get(&7), Some(&3));
        assert_eq!(tally.counts.len(), 2);
        assert_eq!(tally.winner(), Some(7));
    }

    #[test]
    fn test_pinned_wins_over_majority() {
        let mut scene = Scene::new();
        scene.add(element(1, 0.0, 0.0, 1000.0, 1000.0, false));
        // Small pinned element touched only by the outermost ring
        scene.add(element(9, 144.0, 98.0, 4.0, 4.0, true));

        let mut resolver = TargetResolver::new(100.0);
        let mut ind = VirtualIndicator::new(100.0);
        let winner = resolver.resolve(Point::new(100.0, 100.0), 0.0, &mut ind, &scene, &TrackerConfig::default());
        assert_eq!(winner, Some(9), "pinned element must win regardless of votes");
    }

    #[test]
    fn test_indicator_hidden_while_probing() {
        let visible_during_probe = Rc::new(Cell::new(false));
        let indicator = Rc::new(RefCell::new(VirtualIndicator::new(100.0)));

        struct Probe {
            indicator: Rc<RefCell<VirtualIndicator>>,
            seen_visible: Rc<Cell<bool>>,
        }
        impl HitTester for Probe {
            fn hit_test(&self, _x: f64, _y: f64) -> Option<u64> {
                if self.indicator.borrow().visible() {
                    self.seen_visible.set(true);
                }
                None
            }
            fn is_pinned(&self, _element: u64) -> bool {
                false
            }
        }

        let probe = Probe {
            indicator: Rc::clone(&indicator),
            seen_visible: Rc::clone(&visible_during_probe),
        };
        let mut resolver = TargetResolver::new(100.0);
        let mut local = Mirror(Rc::clone(&indicator));
        resolver.resolve(Point::new(50.0, 50.0), 0.0, &mut local, &probe, &TrackerConfig::default());

        assert!(!visible_during_probe.get(), "indicator visible during probing");
        assert!(indicator.borrow().visible(), "prior visibility restored");
    }

    #[test]
    fn test_hidden_indicator_stays_hidden() {
        let hits = FnHits::new(|_, _| Some(1));
        let mut ind = VirtualIndicator::new(100.0);
        ind.hide();
        let mut resolver = TargetResolver::new(100.0);
        resolver.resolve(Point::new(50.0, 50.0), 0.0, &mut ind, &hits, &TrackerConfig::default());
        assert!(!ind.visible());
    }

    #[test]
    fn test_throttle_serves_cached_result() {
        let current = Cell::new(Some(1));
        let hits = FnHits::new(|_, _| current.get());
        let mut resolver = TargetResolver::new(100.0);
        let mut ind = VirtualIndicator::new(100.0);
        let config = TrackerConfig::default();

        assert_eq!(resolver.resolve(Point::new(1.0, 1.0), 0.0, &mut ind, &hits, &config), Some(1));
        let calls = hits.calls.get();

        current.set(Some(2));
        assert_eq!(
            resolver.resolve(Point::new(1.0, 1.0), 50.0, &mut ind, &hits, &config),
            Some(1),
            "inside the window the prior result is served"
        );
        assert_eq!(hits.calls.get(), calls, "no hit tests inside the window");

        assert_eq!(resolver.resolve(Point::new(1.0, 1.0), 100.0, &mut ind, &hits, &config), Some(2));
        assert_eq!(resolver.passes, 2);
    }

    #[test]
    fn test_focus_change_events() {
        let mut resolver = TargetResolver::new(100.0);

        let e = resolver.update_focus(Some(1), None);
        assert_eq!(e, vec![GazeEvent::Gaze { element: 1 }]);

        assert!(resolver.update_focus(Some(1), None).is_empty(), "same element is silent");
        assert!(resolver.update_focus(None, None).is_empty(), "null target is ignored");
        assert_eq!(resolver.focus, Some(1));

        let e = resolver.update_focus(Some(2), None);
        assert_eq!(
            e,
            vec![GazeEvent::GazeLeave { element: 1 }, GazeEvent::Gaze { element: 2 }]
        );
    }

    #[test]
    fn test_indicator_element_never_focused() {
        let mut resolver = TargetResolver::new(100.0);
        assert!(resolver.update_focus(Some(99), Some(99)).is_empty());
        assert_eq!(resolver.focus, None);
    }

    #[test]
    fn test_forget_removed_focus() {
        let mut resolver = TargetResolver::new(100.0);
        resolver.update_focus(Some(4), None);
        resolver.forget(5);
        assert_eq!(resolver.focus, Some(4));
        resolver.forget(4);
        assert_eq!(resolver.focus, None);

        // Re-acquiring after removal emits no stale gazeleave
        let e = resolver.update_focus(Some(6), None);
        assert_eq!(e, vec![GazeEvent::Gaze { element: 6 }]);
    }

    /// Indicator that forwards to a shared `VirtualIndicator`.
    struct Mirror(Rc<RefCell<VirtualIndicator>>);

    impl Indicator for Mirror {
        fn element_id(&self) -> Option<u64> {
            self.0.borrow().element_id()
        }
        fn size(&self) -> f64 {
            self.0.borrow().size
        }
        fn move_to(&mut self, x: f64, y: f64) {
            self.0.borrow_mut().move_to(x, y)
        }
        fn scale(&mut self, factor: f64, duration_ms: f64, now_ms: f64) {
            self.0.borrow_mut().scale(factor, duration_ms, now_ms)
        }
        fn show(&mut self) {
            self.0.borrow_mut().show()
        }
        fn hide(&mut self) {
            self.0.borrow_mut().hide()
        }
        fn resize(&mut self, size: f64) {
            self.0.borrow_mut().resize(size)
        }
        fn visible(&self) -> bool {
            self.0.borrow().visible()
        }
    }
}

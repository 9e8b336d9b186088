//! Gesture classification — blink, double blink, and left/right wink — plus
//! the global freeze window raised after a blink-type gesture.
//!
//! Blink and double blink are read off the open/close histories; winks are
//! read off the live per-eye positions of the current frame.

use tracing::{debug, info};

use super::clock::Deadline;
use super::config::TrackerConfig;
use super::events::GazeEvent;
use super::frame::Frame;
use super::history::TimestampHistory;

// ── Gesture ─────────────────────────────────────────────────

/// A recognized gesture.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Gesture {
    Blink,
    DoubleBlink,
    LeftWink,
    RightWink,
}

impl Gesture {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Blink => "blink",
            Self::DoubleBlink => "double-blink",
            Self::LeftWink => "left-wink",
            Self::RightWink => "right-wink",
        }
    }

    /// Whether this gesture raises the freeze window.
    pub fn freezes(&self) -> bool {
        matches!(self, Self::Blink | Self::DoubleBlink)
    }

    /// Indicator scale feedback for this gesture, if any.
    pub fn indicator_scale(&self, config: &TrackerConfig) -> Option<f64> {
        match self {
            Self::Blink => Some(config.blink_scale),
            Self::DoubleBlink => Some(config.double_blink_scale),
            Self::LeftWink | Self::RightWink => None,
        }
    }

    /// Events announcing this gesture, eye-specific first.
    pub fn events(&self) -> Vec<GazeEvent> {
        match self {
            Self::Blink => vec![GazeEvent::Blink],
            Self::DoubleBlink => vec![GazeEvent::DoubleBlink],
            Self::LeftWink => vec![GazeEvent::LeftWink, GazeEvent::Wink],
            Self::RightWink => vec![GazeEvent::RightWink, GazeEvent::Wink],
        }
    }
}

// ── Wink counters ───────────────────────────────────────────

/// Consecutive frames with exactly one eye closed.
///
/// A counter only returns to zero when its wink fires; a frame that breaks
/// the pattern leaves it untouched.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct WinkCounters {
    pub left_consecutive: u32,
    pub right_consecutive: u32,
}

// ── Classifier ──────────────────────────────────────────────

/// Per-frame gesture checks and the freeze window they drive.
#[derive(Debug, Clone, Default)]
pub struct GestureClassifier {
    pub winks: WinkCounters,
    /// Active while all frame processing is suppressed.
    pub freeze: Deadline,
    /// Gestures recognized since start or reset.
    pub gestures_recognized: u64,
}

impl GestureClassifier {
    pub fn new() -> Self {
        Self::default()
    }

    /// Run the blink, double-blink and wink checks for one frame.  Raises
    /// the freeze window when a blink-type gesture is recognized.
    pub fn classify(
        &mut self,
        now_ms: f64,
        opens: &TimestampHistory,
        closes: &TimestampHistory,
        frame: &Frame,
        config: &TrackerConfig,
    ) -> Vec<Gesture> {
        let mut gestures = Vec::new();

        if let Some(g) = Self::check_blink(now_ms, opens, closes, config) {
            gestures.push(g);
        }
        if let Some(g) = Self::check_double_blink(now_ms, opens, closes, config) {
            gestures.push(g);
        }
        gestures.extend(self.check_winks(frame, config));

        for gesture in &gestures {
            if gesture.freezes() {
                self.freeze.raise(now_ms, config.freeze_ms);
                debug!("Freeze raised for {:.0}ms", config.freeze_ms);
            }
            info!("Gesture: {} at {:.0}ms", gesture.as_str(), now_ms);
        }
        self.gestures_recognized += gestures.len() as u64;
        gestures
    }

    /// A fresh open ending a closure within the blink window.
    fn check_blink(
        now_ms: f64,
        opens: &TimestampHistory,
        closes: &TimestampHistory,
        config: &TrackerConfig,
    ) -> Option<Gesture> {
        let open = opens.get(0)?;
        let close = closes.get(0)?;
        if now_ms - open > config.blink_fresh_ms {
            return None;
        }
        let duration = open - close;
        let (min, max) = config.blink_window();
        if duration >= min && duration <= max {
            debug!("Blink: closed {:.0}ms", duration);
            Some(Gesture::Blink)
        } else {
            None
        }
    }

    /// A recent close that followed the second-most-recent open closely.
    fn check_double_blink(
        now_ms: f64,
        opens: &TimestampHistory,
        closes: &TimestampHistory,
        config: &TrackerConfig,
    ) -> Option<Gesture> {
        let earlier_open = opens.get(1)?;
        let close = closes.get(0)?;
        if now_ms - close > config.double_blink_fresh_ms {
            return None;
        }
        let gap = close - earlier_open;
        if gap < config.double_blink_gap_ms {
            debug!("Double blink: open-to-close gap {:.0}ms", gap);
            Some(Gesture::DoubleBlink)
        } else {
            None
        }
    }

    /// Count one-eye-closed frames; fire once a counter exceeds the minimum.
    fn check_winks(&mut self, frame: &Frame, config: &TrackerConfig) -> Vec<Gesture> {
        let mut gestures = Vec::new();
        let left_closed = frame.left_eye.is_closed();
        let right_closed = frame.right_eye.is_closed();

        if left_closed && !right_closed {
            self.winks.left_consecutive += 1;
            if self.winks.left_consecutive > config.wink_min_frames {
                self.winks.left_consecutive = 0;
                gestures.push(Gesture::LeftWink);
            }
        }
        if right_closed && !left_closed {
            self.winks.right_consecutive += 1;
            if self.winks.right_consecutive > config.wink_min_frames {
                self.winks.right_consecutive = 0;
                gestures.push(Gesture::RightWink);
            }
        }
        gestures
    }

    pub fn is_frozen(&self, now_ms: f64) -> bool {
        self.freeze.is_active(now_ms)
    }

    pub fn reset(&mut self) {
        self.winks = WinkCounters::default();
        self.freeze.clear();
        self.gestures_recognized = 0;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const T: f64 = 10_000.0;

    fn histories(opens: &[f64], closes: &[f64]) -> (TimestampHistory, TimestampHistory) {
        let mut o = TimestampHistory::default();
        let mut c = TimestampHistory::default();
        for &t in opens {
            o.push(t);
        }
        for &t in closes {
            c.push(t);
        }
        (o, c)
    }

    fn classify_at(
        classifier: &mut GestureClassifier,
        now: f64,
        opens: &TimestampHistory,
        closes: &TimestampHistory,
    ) -> Vec<Gesture> {
        let frame = Frame::open_at(500.0, 400.0);
        classifier.classify(now, opens, closes, &frame, &TrackerConfig::default())
    }

    #[test]
    fn test_blink_fresh_open() {
        // Close at T, open at T+600, checked at T+650
        let (o, c) = histories(&[T + 600.0], &[T]);
        let mut cls = GestureClassifier::new();
        let g = classify_at(&mut cls, T + 650.0, &o, &c);
        assert_eq!(g, vec![Gesture::Blink]);
        assert!(cls.is_frozen(T + 650.0));
        assert!(cls.is_frozen(T + 2149.0));
        assert!(!cls.is_frozen(T + 2150.0));
    }

    #[test]
    fn test_blink_stale_open_ignored() {
        // Same cycle checked at T+900 — the open is 300ms old
        let (o, c) = histories(&[T + 600.0], &[T]);
        let mut cls = GestureClassifier::new();
        let g = classify_at(&mut cls, T + 900.0, &o, &c);
        assert!(g.is_empty(), "stale open should not blink, got {:?}", g);
        assert!(!cls.is_frozen(T + 900.0));
    }

    #[test]
    fn test_blink_window_bounds() {
        let mut cls = GestureClassifier::new();

        let (o, c) = histories(&[T + 400.0], &[T]);
        assert_eq!(classify_at(&mut cls, T + 400.0, &o, &c), vec![Gesture::Blink]);

        let (o, c) = histories(&[T + 800.0], &[T]);
        assert_eq!(classify_at(&mut cls, T + 800.0, &o, &c), vec![Gesture::Blink]);

        let (o, c) = histories(&[T + 399.0], &[T]);
        assert!(classify_at(&mut cls, T + 399.0, &o, &c).is_empty());

        let (o, c) = histories(&[T + 801.0], &[T]);
        assert!(classify_at(&mut cls, T + 801.0, &o, &c).is_empty());
    }

    #[test]
    fn test_blink_requires_both_histories() {
        let mut cls = GestureClassifier::new();
        let (o, c) = histories(&[T], &[]);
        assert!(classify_at(&mut cls, T, &o, &c).is_empty());
        let (o, c) = histories(&[], &[T]);
        assert!(classify_at(&mut cls, T, &o, &c).is_empty());
    }

    #[test]
    fn test_double_blink() {
        // Open at T, close at T+150, reopen at T+180, checked at T+200
        let (o, c) = histories(&[T, T + 180.0], &[T + 150.0]);
        let mut cls = GestureClassifier::new();
        let g = classify_at(&mut cls, T + 200.0, &o, &c);
        assert_eq!(g, vec![Gesture::DoubleBlink]);
        assert!(cls.is_frozen(T + 200.0));
    }

    #[test]
    fn test_double_blink_gap_too_long() {
        let (o, c) = histories(&[T, T + 280.0], &[T + 250.0]);
        let mut cls = GestureClassifier::new();
        assert!(classify_at(&mut cls, T + 300.0, &o, &c).is_empty());
    }

    #[test]
    fn test_double_blink_stale_close() {
        let (o, c) = histories(&[T, T + 180.0], &[T + 150.0]);
        let mut cls = GestureClassifier::new();
        let g = classify_at(&mut cls, T + 651.0, &o, &c);
        assert!(g.is_empty(), "close older than 500ms, got {:?}", g);
    }

    #[test]
    fn test_left_wink_needs_four_frames() {
        let mut cls = GestureClassifier::new();
        let (o, c) = histories(&[], &[]);
        let config = TrackerConfig::default();
        let frame = Frame::left_closed_at(300.0, 300.0);

        for i in 0..3 {
            let g = cls.classify(i as f64 * 33.0, &o, &c, &frame, &config);
            assert!(g.is_empty(), "frame {} should not wink yet", i + 1);
        }
        assert_eq!(cls.winks.left_consecutive, 3);

        let g = cls.classify(99.0, &o, &c, &frame, &config);
        assert_eq!(g, vec![Gesture::LeftWink]);
        assert_eq!(cls.winks.left_consecutive, 0, "counter resets after firing");
        assert!(!cls.is_frozen(100.0), "winks do not freeze");
    }

    #[test]
    fn test_right_wink() {
        let mut cls = GestureClassifier::new();
        let (o, c) = histories(&[], &[]);
        let config = TrackerConfig::default();
        let frame = Frame::right_closed_at(300.0, 300.0);
        let mut fired = Vec::new();
        for i in 0..4 {
            fired.extend(cls.classify(i as f64, &o, &c, &frame, &config));
        }
        assert_eq!(fired, vec![Gesture::RightWink]);
        assert_eq!(
            Gesture::RightWink.events(),
            vec![GazeEvent::RightWink, GazeEvent::Wink]
        );
    }

    #[test]
    fn test_wink_counter_survives_broken_pattern() {
        let mut cls = GestureClassifier::new();
        let (o, c) = histories(&[], &[]);
        let config = TrackerConfig::default();
        let left = Frame::left_closed_at(300.0, 300.0);
        let open = Frame::open_at(300.0, 300.0);

        cls.classify(0.0, &o, &c, &left, &config);
        cls.classify(1.0, &o, &c, &left, &config);
        cls.classify(2.0, &o, &c, &open, &config);
        assert_eq!(cls.winks.left_consecutive, 2, "open frame does not clear");

        cls.classify(3.0, &o, &c, &left, &config);
        let g = cls.classify(4.0, &o, &c, &left, &config);
        assert_eq!(g, vec![Gesture::LeftWink]);
    }

    #[test]
    fn test_both_closed_is_not_wink() {
        let mut cls = GestureClassifier::new();
        let (o, c) = histories(&[], &[]);
        let config = TrackerConfig::default();
        let frame = Frame::closed();
        for i in 0..10 {
            assert!(cls.classify(i as f64, &o, &c, &frame, &config).is_empty());
        }
        assert_eq!(cls.winks, WinkCounters::default());
    }

    #[test]
    fn test_gesture_feedback() {
        let config = TrackerConfig::default();
        assert_eq!(Gesture::Blink.indicator_scale(&config), Some(0.5));
        assert_eq!(Gesture::DoubleBlink.indicator_scale(&config), Some(2.0));
        assert_eq!(Gesture::LeftWink.indicator_scale(&config), None);
        assert!(Gesture::Blink.freezes());
        assert!(!Gesture::RightWink.freezes());
    }

    #[test]
    fn test_reset_clears_freeze() {
        let (o, c) = histories(&[T + 600.0], &[T]);
        let mut cls = GestureClassifier::new();
        classify_at(&mut cls, T + 650.0, &o, &c);
        assert_eq!(cls.gestures_recognized, 1);
        cls.reset();
        assert!(!cls.is_frozen(T + 700.0));
        assert_eq!(cls.gestures_recognized, 0);
    }
}

//! Frame loop — feeds each incoming frame through transition detection,
//! debouncing, target resolution and gesture classification.
//!
//! `FramePipeline` is the single owner of all mutable tracker state.  Frames
//! are processed strictly one at a time; while the freeze window from a
//! blink-type gesture is active, frames are dropped without touching state.

use tracing::{debug, info};

use super::clock::Clock;
use super::config::TrackerConfig;
use super::debounce::DebounceMachine;
use super::events::GazeEvent;
use super::frame::{EyeOpenness, Frame, Transition};
use super::gesture::GestureClassifier;
use super::history::TimestampHistory;
use super::surface::{HitTester, Indicator};
use super::target::TargetResolver;

/// Result of pushing one frame.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct FrameReport {
    /// Events in emission order.
    pub events: Vec<GazeEvent>,
    /// The frame arrived inside the freeze window and was ignored.
    pub frozen: bool,
}

/// Tracker context: histories, debouncer, classifier, resolver and the
/// previous frame's openness.
pub struct FramePipeline {
    pub config: TrackerConfig,
    clock: Box<dyn Clock>,
    pub debounce: DebounceMachine,
    /// Raw closed→open instants.
    pub opens: TimestampHistory,
    /// Raw open→closed instants.
    pub closes: TimestampHistory,
    pub classifier: GestureClassifier,
    pub resolver: TargetResolver,
    /// Openness of the last processed frame; `None` before the first.
    previous: Option<EyeOpenness>,
    pub frames_processed: u64,
    pub frames_dropped: u64,
}

impl FramePipeline {
    pub fn new(config: TrackerConfig, clock: Box<dyn Clock>) -> Self {
        info!("Frame pipeline initialized");
        Self {
            debounce: DebounceMachine::new(config.hysteresis_ms),
            opens: TimestampHistory::new(config.history_capacity),
            closes: TimestampHistory::new(config.history_capacity),
            classifier: GestureClassifier::new(),
            resolver: TargetResolver::new(config.resolve_throttle_ms),
            previous: None,
            frames_processed: 0,
            frames_dropped: 0,
            config,
            clock,
        }
    }

    /// Current time on the injected clock.
    pub fn now_ms(&self) -> f64 {
        self.clock.now_ms()
    }

    /// Process a frame stamped with its arrival time on the injected clock.
    pub fn push_frame(
        &mut self,
        frame: &Frame,
        indicator: &mut dyn Indicator,
        hits: &dyn HitTester,
    ) -> FrameReport {
        let now_ms = self.clock.now_ms();
        self.process_frame(frame, now_ms, indicator, hits)
    }

    /// Process a frame that arrived at `now_ms`.
    pub fn process_frame(
        &mut self,
        frame: &Frame,
        now_ms: f64,
        indicator: &mut dyn Indicator,
        hits: &dyn HitTester,
    ) -> FrameReport {
        // ── Step 1: Freeze gate ──
        if self.classifier.is_frozen(now_ms) {
            self.frames_dropped += 1;
            return FrameReport {
                events: Vec::new(),
                frozen: true,
            };
        }

        let mut events = Vec::new();

        // ── Step 2: Derive openness ──
        let current = frame.openness();
        let previous = self.previous.unwrap_or(EyeOpenness::OPEN);

        // ── Step 3: Raw transitions and debouncing ──
        match Transition::between(previous.closed, current.closed) {
            Some(Transition::Closed) => self.closes.push(now_ms),
            Some(Transition::Opened) => self.opens.push(now_ms),
            None => {}
        }
        // Debouncer is fed every processed frame; histories only on transitions
        let debounced = if current.closed {
            self.debounce.signal_close(now_ms)
        } else {
            self.debounce.signal_open(now_ms)
        };
        events.extend(debounced);
        if let Some(t) = Transition::between(previous.left_closed, current.left_closed) {
            debug!("Left eye {} at {:.0}ms", t.as_str(), now_ms);
        }
        if let Some(t) = Transition::between(previous.right_closed, current.right_closed) {
            debug!("Right eye {} at {:.0}ms", t.as_str(), now_ms);
        }

        // ── Step 4: Gaze and gestures ──
        if !frame.avg.is_zero() {
            indicator.move_to(frame.avg.x, frame.avg.y);

            let target = self
                .resolver
                .resolve(frame.avg, now_ms, indicator, hits, &self.config);
            events.extend(self.resolver.update_focus(target, indicator.element_id()));

            let gestures =
                self.classifier
                    .classify(now_ms, &self.opens, &self.closes, frame, &self.config);
            for gesture in gestures {
                if let Some(factor) = gesture.indicator_scale(&self.config) {
                    indicator.scale(factor, self.config.scale_duration_ms, now_ms);
                }
                events.extend(gesture.events());
            }
        }

        // ── Step 5: Remember this frame ──
        self.previous = Some(current);
        self.frames_processed += 1;

        FrameReport {
            events,
            frozen: false,
        }
    }

    /// Whether frames arriving now would be dropped.
    pub fn is_frozen(&self) -> bool {
        self.classifier.is_frozen(self.clock.now_ms())
    }

    /// Tolerate removal of an element from the external tree.
    pub fn element_removed(&mut self, element: u64) {
        self.resolver.forget(element);
    }

    /// Set the debounce hysteresis in milliseconds.
    pub fn set_hysteresis(&mut self, hysteresis_ms: f64) {
        self.config.hysteresis_ms = hysteresis_ms;
        self.debounce.hysteresis_ms = hysteresis_ms;
        info!("Hysteresis set to {:.0}ms", hysteresis_ms);
    }

    /// Set the post-gesture freeze duration in milliseconds.
    pub fn set_freeze(&mut self, freeze_ms: f64) {
        self.config.freeze_ms = freeze_ms;
        info!("Freeze duration set to {:.0}ms", freeze_ms);
    }

    /// Set the target resolution throttle window in milliseconds.
    pub fn set_throttle(&mut self, throttle_ms: f64) {
        self.config.resolve_throttle_ms = throttle_ms;
        self.resolver.set_throttle(throttle_ms);
        info!("Resolution throttle set to {:.0}ms", throttle_ms);
    }

    /// Return to the initial state: open, empty histories, zero counters,
    /// no focus, not frozen.
    pub fn reset(&mut self) {
        self.debounce.reset();
        self.opens.clear();
        self.closes.clear();
        self.classifier.reset();
        self.resolver.reset();
        self.previous = None;
        self.frames_processed = 0;
        self.frames_dropped = 0;
        info!("Frame pipeline reset");
    }

    /// Generate IPC status s-expression.
    pub fn status_sexp(&self) -> String {
        let now_ms = self.clock.now_ms();
        let previous = self.previous.unwrap_or(EyeOpenness::OPEN);
        let flag = |b: bool| if b { "t" } else { "nil" };
        format!(
            "(:state :{} :left-closed {} :right-closed {} :left-wink-frames {} :right-wink-frames {} :focus {} :frozen {} :freeze-remaining-ms {:.0} :frames {} :dropped {} :gestures {} :resolutions {} :hit-tests {})",
            self.debounce.state.as_str(),
            flag(previous.left_closed),
            flag(previous.right_closed),
            self.classifier.winks.left_consecutive,
            self.classifier.winks.right_consecutive,
            self.resolver
                .focus
                .map(|id| id.to_string())
                .unwrap_or_else(|| "nil".to_string()),
            flag(self.classifier.is_frozen(now_ms)),
            self.classifier.freeze.remaining_ms(now_ms),
            self.frames_processed,
            self.frames_dropped,
            self.classifier.gestures_recognized,
            self.resolver.passes,
            self.resolver.hit_tests,
        )
    }
}

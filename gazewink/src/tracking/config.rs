//! Tracker tunables.  Defaults are the timing constants the gesture and
//! targeting logic was designed around.

// ── Tracker config ──────────────────────────────────────────

/// Timing and geometry thresholds for the whole frame pipeline.
#[derive(Debug, Clone, PartialEq)]
pub struct TrackerConfig {
    /// Minimum dwell before the debouncer accepts an open/closed flip (ms).
    pub hysteresis_ms: f64,
    /// Nominal closed duration of an intentional blink (ms).
    pub blink_target_ms: f64,
    /// Accepted deviation from `blink_target_ms` either way (ms).
    pub blink_tolerance_ms: f64,
    /// The open ending a blink must be at most this old when checked (ms).
    pub blink_fresh_ms: f64,
    /// Maximum open-to-close gap of a double blink (ms, exclusive).
    pub double_blink_gap_ms: f64,
    /// The close of a double blink must be at most this old when checked (ms).
    pub double_blink_fresh_ms: f64,
    /// A wink fires once the one-eye-closed frame count exceeds this.
    pub wink_min_frames: u32,
    /// Global suppression window after a blink or double blink (ms).
    pub freeze_ms: f64,
    /// Indicator scale factor on blink.
    pub blink_scale: f64,
    /// Indicator scale factor on double blink.
    pub double_blink_scale: f64,
    /// How long a gesture scale stays applied (ms).
    pub scale_duration_ms: f64,
    /// Minimum interval between two target resolutions (ms).
    pub resolve_throttle_ms: f64,
    /// Radial distance between probe rings (px).
    pub ring_step_px: f64,
    /// Angular step in units of pi; a full circle spans 2.0.
    pub angle_step: f64,
    /// Entries kept in each open/close history.
    pub history_capacity: usize,
}

impl Default for TrackerConfig {
    fn default() -> Self {
        Self {
            hysteresis_ms: 400.0,
            blink_target_ms: 600.0,
            blink_tolerance_ms: 200.0,
            blink_fresh_ms: 100.0,
            double_blink_gap_ms: 200.0,
            double_blink_fresh_ms: 500.0,
            wink_min_frames: 3,
            freeze_ms: 1500.0,
            blink_scale: 0.5,
            double_blink_scale: 2.0,
            scale_duration_ms: 1000.0,
            resolve_throttle_ms: 100.0,
            ring_step_px: 9.0,
            angle_step: 0.2,
            history_capacity: 2,
        }
    }
}

impl TrackerConfig {
    /// Inclusive closed-duration range recognized as a blink (ms).
    pub fn blink_window(&self) -> (f64, f64) {
        (
            self.blink_target_ms - self.blink_tolerance_ms,
            self.blink_target_ms + self.blink_tolerance_ms,
        )
    }

    /// Generate IPC config s-expression.
    pub fn config_sexp(&self) -> String {
        let (blink_min, blink_max) = self.blink_window();
        format!(
            "(:hysteresis-ms {:.0} :blink-min-ms {:.0} :blink-max-ms {:.0} :blink-fresh-ms {:.0} :double-blink-gap-ms {:.0} :double-blink-fresh-ms {:.0} :wink-min-frames {} :freeze-ms {:.0} :scale-duration-ms {:.0} :throttle-ms {:.0} :ring-step-px {:.0} :angle-step {:.2})",
            self.hysteresis_ms,
            blink_min,
            blink_max,
            self.blink_fresh_ms,
            self.double_blink_gap_ms,
            self.double_blink_fresh_ms,
            self.wink_min_frames,
            self.freeze_ms,
            self.scale_duration_ms,
            self.resolve_throttle_ms,
            self.ring_step_px,
            self.angle_step,
        )
    }
}

//! Open/closed debouncing for the eye pair.
//!
//! Raw per-frame openness is noisy.  A flip is only accepted after the eyes
//! have dwelt in the current state for longer than the hysteresis, but every
//! raw instant is still recorded so later duration math sees it.

use tracing::debug;

use super::events::GazeEvent;

/// Debounced state of the eye pair.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum EyeState {
    #[default]
    Open,
    Closed,
}

impl EyeState {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Open => "open",
            Self::Closed => "closed",
        }
    }
}

/// Two-state machine with hysteresis.  Initial state is `Open`.
#[derive(Debug, Clone)]
pub struct DebounceMachine {
    pub state: EyeState,
    /// Most recent raw open instant (ms).
    pub last_open_at: Option<f64>,
    /// Most recent raw close instant (ms).
    pub last_close_at: Option<f64>,
    /// Minimum dwell before a flip is accepted (ms, exclusive).
    pub hysteresis_ms: f64,
}

impl DebounceMachine {
    pub fn new(hysteresis_ms: f64) -> Self {
        Self {
            state: EyeState::Open,
            last_open_at: None,
            last_close_at: None,
            hysteresis_ms,
        }
    }

    /// Raw "eyes open" observation.  Returns `Open` with the closed duration
    /// when the flip from `Closed` is accepted.
    pub fn signal_open(&mut self, now_ms: f64) -> Option<GazeEvent> {
        self.last_open_at = Some(now_ms);
        if self.state == EyeState::Open {
            return None;
        }
        let elapsed = Self::elapsed(now_ms, self.last_close_at)?;
        if elapsed > self.hysteresis_ms {
            self.state = EyeState::Open;
            debug!("Eyes open after {:.0}ms closed", elapsed);
            Some(GazeEvent::Open {
                duration_ms: elapsed,
            })
        } else {
            debug!("Open debounced: closed only {:.0}ms", elapsed);
            None
        }
    }

    /// Raw "eyes closed" observation.  Returns `Close` with the open duration
    /// when the flip from `Open` is accepted.
    pub fn signal_close(&mut self, now_ms: f64) -> Option<GazeEvent> {
        self.last_close_at = Some(now_ms);
        if self.state == EyeState::Closed {
            return None;
        }
        let elapsed = Self::elapsed(now_ms, self.last_open_at)?;
        if elapsed > self.hysteresis_ms {
            self.state = EyeState::Closed;
            debug!("Eyes closed after {:.0}ms open", elapsed);
            Some(GazeEvent::Close {
                duration_ms: elapsed,
            })
        } else {
            debug!("Close debounced: open only {:.0}ms", elapsed);
            None
        }
    }

    /// Time since the opposite instant.  With no opposite instant on record
    /// the dwell is unknown and the flip is rejected.
    fn elapsed(now_ms: f64, since: Option<f64>) -> Option<f64> {
        match since {
            Some(t) => Some(now_ms - t),
            None => {
                debug!("No opposite instant recorded, flip rejected");
                None
            }
        }
    }

    pub fn reset(&mut self) {
        self.state = EyeState::Open;
        self.last_open_at = None;
        self.last_close_at = None;
    }
}

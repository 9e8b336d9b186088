//! Eye tracking — frame ingestion, open/close debouncing, gesture
//! recognition and gaze target resolution.
//!
//! Provides:
//! - `FramePipeline`: the per-frame loop that owns all tracker state
//! - `DebounceMachine`: hysteresis over the eye pair's open/closed state
//! - `GestureClassifier`: blink, double blink, and left/right wink
//! - `TargetResolver`: ring sampling and voting for the gazed-at element
//! - `Indicator` / `HitTester`: seams to the visual layer

pub mod clock;
pub mod config;
pub mod debounce;
pub mod events;
pub mod frame;
pub mod gesture;
pub mod history;
pub mod pipeline;
pub mod surface;
pub mod target;

pub use clock::{Clock, ManualClock, MonotonicClock};
pub use config::TrackerConfig;
pub use debounce::{DebounceMachine, EyeState};
pub use events::GazeEvent;
pub use frame::{Frame, Point};
pub use gesture::{Gesture, GestureClassifier};
pub use pipeline::{FramePipeline, FrameReport};
pub use surface::{HitTester, Indicator, Scene, SceneElement, VirtualIndicator};
pub use target::TargetResolver;

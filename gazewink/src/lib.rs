//! gazewink — eye-tracker frames in, debounced gaze and gesture events out.
//!
//! The `tracking` module is the pure core: open/close debouncing, blink,
//! double-blink and wink recognition, and gaze target resolution by ring
//! sampling.  `ipc`, `state` and `backend` wrap it in a Unix socket daemon
//! and an offline replay tool.

pub mod backend;
pub mod ipc;
pub mod state;
pub mod tracking;

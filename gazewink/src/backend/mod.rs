//! Backends — the socket daemon and offline replay.

pub mod headless;
pub mod replay;

use std::path::PathBuf;

/// IPC socket configuration.
#[derive(Debug, Clone, Default)]
pub struct IpcConfig {
    /// Socket path; `None` uses the default under `$XDG_RUNTIME_DIR`.
    pub socket_path: Option<PathBuf>,
    /// Log all IPC traffic.
    pub trace: bool,
}

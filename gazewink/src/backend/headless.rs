//! Headless daemon backend — serves the frame protocol over the IPC socket.
//!
//! Runs a calloop event loop with graceful signal handling, an optional exit
//! timer, and periodic status logging.

use std::sync::atomic::{AtomicBool, Ordering};
use std::time::{Duration, Instant};

use calloop::EventLoop;
use tracing::info;

use super::IpcConfig;
use crate::ipc;
use crate::state::{DaemonState, DEFAULT_INDICATOR_SIZE};
use crate::tracking::{MonotonicClock, TrackerConfig};

/// Global flag set by SIGTERM/SIGINT handlers.
static SHUTDOWN_REQUESTED: AtomicBool = AtomicBool::new(false);

/// Headless daemon configuration.
#[derive(Debug, Clone)]
pub struct HeadlessConfig {
    /// Poll interval in milliseconds (higher = less CPU, more frame latency).
    pub poll_interval_ms: u64,
    /// Gaze indicator diameter in pixels.
    pub indicator_size: f64,
    /// Interval between status log lines.
    pub status_interval: Duration,
}

impl Default for HeadlessConfig {
    fn default() -> Self {
        Self {
            poll_interval_ms: 5,
            indicator_size: DEFAULT_INDICATOR_SIZE,
            status_interval: Duration::from_secs(60),
        }
    }
}

/// Install signal handlers for graceful shutdown (SIGTERM, SIGINT).
fn install_signal_handlers() {
    unsafe {
        libc::signal(libc::SIGTERM, signal_handler as libc::sighandler_t);
        libc::signal(libc::SIGINT, signal_handler as libc::sighandler_t);
    }
}

extern "C" fn signal_handler(_sig: libc::c_int) {
    SHUTDOWN_REQUESTED.store(true, Ordering::SeqCst);
}

/// Run the tracker daemon until a signal arrives or `exit_after` seconds
/// elapse.
pub fn run(
    tracker: TrackerConfig,
    exit_after: Option<u64>,
    ipc_config: IpcConfig,
    config: HeadlessConfig,
) -> anyhow::Result<()> {
    let mut event_loop = EventLoop::<DaemonState>::try_new()?;

    let ipc_path = ipc_config
        .socket_path
        .unwrap_or_else(ipc::IpcServer::default_socket_path);

    let mut state = DaemonState::new(
        tracker,
        config.indicator_size,
        Box::new(MonotonicClock::new()),
        ipc_path.clone(),
    );
    state.ipc_server.ipc_trace = ipc_config.trace;
    ipc::IpcServer::bind(&ipc_path, &event_loop.handle())?;

    install_signal_handlers();

    let start_time = Instant::now();
    let exit_duration = exit_after.map(Duration::from_secs);
    let mut last_status_log = Instant::now();

    let poll_interval = Duration::from_millis(config.poll_interval_ms);
    info!(
        "Headless backend initialized (poll interval: {}ms), entering event loop",
        config.poll_interval_ms
    );

    while state.running {
        if SHUTDOWN_REQUESTED.load(Ordering::SeqCst) {
            info!("Shutdown signal received, exiting");
            state.running = false;
            break;
        }

        if let Some(dur) = exit_duration {
            if start_time.elapsed() >= dur {
                info!("Headless exit timer fired after {}s", dur.as_secs());
                state.running = false;
                break;
            }
        }

        if last_status_log.elapsed() >= config.status_interval {
            info!(
                "Headless status: {} frame(s), {} dropped, {} element(s), {} IPC client(s)",
                state.pipeline.frames_processed,
                state.pipeline.frames_dropped,
                state.scene.len(),
                state.ipc_server.clients.len()
            );
            last_status_log = Instant::now();
        }

        ipc::IpcServer::poll_clients(&mut state);
        state.ipc_server.flush_all();

        event_loop.dispatch(Some(poll_interval), &mut state)?;
    }

    state.ipc_server.cleanup();

    info!(
        "Headless backend shutting down ({} frame(s), {} gesture(s), {} IPC client(s))",
        state.pipeline.frames_processed,
        state.pipeline.classifier.gestures_recognized,
        state.ipc_server.clients.len()
    );
    Ok(())
}

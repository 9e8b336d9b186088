//! gazewink - gaze target and blink/wink gesture daemon.

use std::path::PathBuf;

use clap::{Args, Parser, Subcommand};
use tracing::info;

use gazewink::backend::{self, headless::HeadlessConfig, replay::ReplayConfig, IpcConfig};
use gazewink::state::DEFAULT_INDICATOR_SIZE;
use gazewink::tracking::TrackerConfig;

#[derive(Parser, Debug)]
#[command(name = "gazewink", about = "Eye-tracker gaze and gesture events", version)]
struct Cli {
    #[command(flatten)]
    tracker: TrackerArgs,

    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Serve the frame protocol on a Unix socket
    Serve {
        /// IPC socket path (default: $XDG_RUNTIME_DIR/gazewink-ipc.sock)
        #[arg(long)]
        ipc_socket: Option<PathBuf>,

        /// Log all IPC messages to stderr
        #[arg(long)]
        ipc_trace: bool,

        /// Exit after N seconds
        #[arg(long)]
        exit_after: Option<u64>,

        /// Event loop poll interval in milliseconds
        #[arg(long, default_value_t = 5)]
        poll_interval_ms: u64,
    },
    /// Replay a frame log (one plist per line) and print events
    Replay {
        /// Frame log; reads stdin when omitted
        #[arg(value_name = "FILE")]
        file: Option<PathBuf>,

        /// Spacing of frames without :at-ms
        #[arg(long, default_value_t = 33.0)]
        frame_interval_ms: f64,
    },
}

/// Tracker tuning shared by every subcommand.
#[derive(Debug, Args)]
struct TrackerArgs {
    /// Minimum dwell before an open/close flip is accepted
    #[arg(long, global = true, value_parser = clap::value_parser!(u64).range(50..=2000))]
    hysteresis_ms: Option<u64>,

    /// Input freeze after a blink or double blink
    #[arg(long, global = true, value_parser = clap::value_parser!(u64).range(0..=5000))]
    freeze_ms: Option<u64>,

    /// Minimum spacing between gaze target resolutions
    #[arg(long, global = true, value_parser = clap::value_parser!(u64).range(0..=1000))]
    throttle_ms: Option<u64>,

    /// Gaze indicator diameter in pixels
    #[arg(long, global = true, value_parser = clap::value_parser!(u64).range(1..=2000))]
    indicator_size: Option<u64>,
}

impl TrackerArgs {
    fn config(&self) -> TrackerConfig {
        let mut config = TrackerConfig::default();
        if let Some(ms) = self.hysteresis_ms {
            config.hysteresis_ms = ms as f64;
        }
        if let Some(ms) = self.freeze_ms {
            config.freeze_ms = ms as f64;
        }
        if let Some(ms) = self.throttle_ms {
            config.resolve_throttle_ms = ms as f64;
        }
        config
    }

    fn indicator_size(&self) -> f64 {
        self.indicator_size
            .map(|s| s as f64)
            .unwrap_or(DEFAULT_INDICATOR_SIZE)
    }
}

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    // Logs on stderr; replay writes events to stdout
    tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "gazewink=info".into()),
        )
        .init();

    info!("gazewink v{} starting", env!("CARGO_PKG_VERSION"));

    let tracker = cli.tracker.config();
    let indicator_size = cli.tracker.indicator_size();

    match cli.command {
        Command::Serve {
            ipc_socket,
            ipc_trace,
            exit_after,
            poll_interval_ms,
        } => backend::headless::run(
            tracker,
            exit_after,
            IpcConfig {
                socket_path: ipc_socket,
                trace: ipc_trace,
            },
            HeadlessConfig {
                poll_interval_ms,
                indicator_size,
                ..HeadlessConfig::default()
            },
        ),
        Command::Replay {
            file,
            frame_interval_ms,
        } => backend::replay::run(
            file,
            tracker,
            ReplayConfig {
                frame_interval_ms,
                indicator_size,
            },
        ),
    }
}

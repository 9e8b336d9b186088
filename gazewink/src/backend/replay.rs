//! Offline replay — drive the tracker from a recorded frame log.
//!
//! Input is one plist per line:
//!
//! ```text
//! ; comments and blank lines are skipped
//! (:type :element-add :id 1 :x 0 :y 0 :width 800 :height 600)
//! (:type :frame :at-ms 0 :x 400 :y 300 :left-x 390 :left-y 300 :right-x 410 :right-y 300)
//! (:x 0 :y 0)
//! ```
//!
//! Lines without a `:type` are frames.  Frames without `:at-ms` arrive one
//! frame interval after the previous one.  Every emitted event is written to
//! the output as one s-expression per line.

use std::fs::File;
use std::io::{self, BufRead, BufReader, Write};
use std::path::PathBuf;

use tracing::{debug, info, warn};

use crate::ipc::plist::{get_float, get_int, get_keyword, parse_element, parse_frame};
use crate::state::{DaemonState, DEFAULT_INDICATOR_SIZE};
use crate::tracking::{Clock, ManualClock, TrackerConfig};

/// Replay pacing and presentation.
#[derive(Debug, Clone)]
pub struct ReplayConfig {
    /// Spacing of frames that carry no `:at-ms`.
    pub frame_interval_ms: f64,
    pub indicator_size: f64,
}

impl Default for ReplayConfig {
    fn default() -> Self {
        Self {
            frame_interval_ms: 33.0,
            indicator_size: DEFAULT_INDICATOR_SIZE,
        }
    }
}

/// Counts gathered over one replay.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ReplaySummary {
    pub frames: u64,
    pub dropped: u64,
    pub elements: u64,
    pub events: u64,
    /// Lines that failed to parse or were rejected.
    pub skipped: u64,
}

/// Replay frames from `input`, writing events to `output`.
pub fn replay<R: BufRead, W: Write>(
    input: R,
    output: &mut W,
    tracker: TrackerConfig,
    config: &ReplayConfig,
) -> anyhow::Result<ReplaySummary> {
    let clock = ManualClock::new(0.0);
    let mut state = DaemonState::new(
        tracker,
        config.indicator_size,
        Box::new(clock.clone()),
        PathBuf::new(),
    );
    let mut summary = ReplaySummary::default();
    let mut next_ms = 0.0;

    for (index, line) in input.lines().enumerate() {
        let line = line?;
        let lineno = index + 1;
        let trimmed = line.trim();
        if trimmed.is_empty() || trimmed.starts_with(';') {
            continue;
        }

        let value = match lexpr::from_str(trimmed) {
            Ok(v) => v,
            Err(e) => {
                warn!("line {}: malformed s-expression: {}", lineno, e);
                summary.skipped += 1;
                continue;
            }
        };

        match get_keyword(&value, "type").as_deref() {
            None | Some("frame") => {
                let at_ms = get_float(&value, "at-ms").unwrap_or(next_ms);
                if at_ms < clock.now_ms() {
                    warn!("line {}: frame at {:.0}ms is in the past, clamped", lineno, at_ms);
                }
                clock.set(at_ms);
                next_ms = clock.now_ms() + config.frame_interval_ms;

                let report = state.handle_frame(&parse_frame(&value));
                if report.frozen {
                    summary.dropped += 1;
                }
                summary.frames += 1;
                for event in &report.events {
                    writeln!(output, "{}", event.to_sexp())?;
                }
                summary.events += report.events.len() as u64;
            }
            Some("element-add") => match parse_element(&value) {
                Ok(element) => {
                    state.add_element(element);
                    summary.elements += 1;
                }
                Err(reason) => {
                    warn!("line {}: {}", lineno, reason);
                    summary.skipped += 1;
                }
            },
            Some("element-remove") => match get_int(&value, "id") {
                Some(id) if id >= 0 && state.remove_element(id as u64) => {}
                _ => {
                    warn!("line {}: element-remove for unknown :id", lineno);
                    summary.skipped += 1;
                }
            },
            Some(other) => {
                debug!("line {}: ignoring message type {}", lineno, other);
                summary.skipped += 1;
            }
        }
    }

    output.flush()?;
    Ok(summary)
}

/// Replay a file (or stdin) to stdout.
pub fn run(path: Option<PathBuf>, tracker: TrackerConfig, config: ReplayConfig) -> anyhow::Result<()> {
    let stdout = io::stdout();
    let mut out = stdout.lock();

    let summary = match path {
        Some(ref p) => {
            let file = File::open(p)
                .map_err(|e| anyhow::anyhow!("failed to open {}: {}", p.display(), e))?;
            info!("Replaying {}", p.display());
            replay(BufReader::new(file), &mut out, tracker, &config)?
        }
        None => {
            info!("Replaying frames from stdin");
            replay(io::stdin().lock(), &mut out, tracker, &config)?
        }
    };

    info!(
        "Replay finished: {} frame(s) ({} dropped while frozen), {} element(s), {} event(s), {} line(s) skipped",
        summary.frames, summary.dropped, summary.elements, summary.events, summary.skipped
    );
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn run_text(text: &str) -> (Vec<String>, ReplaySummary) {
        let mut out = Vec::new();
        let summary = replay(
            text.as_bytes(),
            &mut out,
            TrackerConfig::default(),
            &ReplayConfig::default(),
        )
        .expect("replay succeeds");
        let lines = String::from_utf8(out)
            .expect("utf-8 output")
            .lines()
            .map(str::to_string)
            .collect();
        (lines, summary)
    }

    #[test]
    fn test_replay_blink_session() {
        let text = "\
; a single blink while looking at element 1
(:type :element-add :id 1 :x 0 :y 0 :width 800 :height 600)
(:type :frame :at-ms 0 :x 400 :y 300 :left-x 390 :left-y 300 :right-x 410 :right-y 300)
(:type :frame :at-ms 1000 :x 0 :y 0)

(:type :frame :at-ms 1600 :x 400 :y 300 :left-x 390 :left-y 300 :right-x 410 :right-y 300)
(:type :frame :at-ms 1700 :x 400 :y 300 :left-x 390 :left-y 300 :right-x 410 :right-y 300)
";
        let (lines, summary) = run_text(text);
        assert_eq!(
            lines,
            vec![
                "(:type :event :event :gaze :element 1)",
                "(:type :event :event :close :duration-ms 1000)",
                "(:type :event :event :open :duration-ms 600)",
                "(:type :event :event :blink)",
            ]
        );
        assert_eq!(summary.frames, 4);
        assert_eq!(summary.dropped, 1, "frame after the blink is frozen");
        assert_eq!(summary.elements, 1);
        assert_eq!(summary.events, 4);
    }

    #[test]
    fn test_replay_default_spacing() {
        // Without :at-ms the frames land 33ms apart, so the closure is far
        // too short for the debouncer to accept.
        let text = "(:x 10 :y 10)\n(:x 0 :y 0)\n(:x 0 :y 0)\n(:x 0 :y 0)\n(:x 10 :y 10)\n";
        let (lines, summary) = run_text(text);
        assert!(lines.is_empty(), "got {:?}", lines);
        assert_eq!(summary.frames, 5);
    }

    #[test]
    fn test_replay_winks() {
        let mut text = String::new();
        for i in 0..5 {
            text.push_str(&format!(
                "(:at-ms {} :x 100 :y 100 :right-x 100 :right-y 100)\n",
                i * 30
            ));
        }
        let (lines, _) = run_text(&text);
        assert_eq!(
            lines,
            vec!["(:type :event :event :leftwink)", "(:type :event :event :wink)"]
        );
    }

    #[test]
    fn test_replay_skips_bad_lines() {
        let text = "\
(:type :frame :x 1 :y
(:type :element-add :id 2 :x 0)
(:type :element-remove :id 9)
(:type :calibrate)
(:type :frame :x 1 :y 1)
";
        let (lines, summary) = run_text(text);
        assert!(lines.is_empty());
        assert_eq!(summary.skipped, 4);
        assert_eq!(summary.frames, 1);
    }

    #[test]
    fn test_replay_element_removal_mid_stream() {
        let text = "\
(:type :element-add :id 1 :x 0 :y 0 :width 300 :height 300)
(:type :element-add :id 2 :x 300 :y 0 :width 300 :height 300)
(:at-ms 0 :x 150 :y 150 :left-x 150 :left-y 150 :right-x 150 :right-y 150)
(:type :element-remove :id 1)
(:at-ms 200 :x 450 :y 150 :left-x 450 :left-y 150 :right-x 450 :right-y 150)
";
        let (lines, _) = run_text(text);
        assert_eq!(
            lines,
            vec![
                "(:type :event :event :gaze :element 1)",
                "(:type :event :event :gaze :element 2)",
            ],
            "no gazeleave for a removed element"
        );
    }
}

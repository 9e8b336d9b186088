//! Daemon state — the central struct the event loop and IPC handlers share.
//!
//! A single `DaemonState` owns the frame pipeline, the element scene used for
//! hit testing, the gaze indicator and the IPC server.  Everything runs on
//! the event loop thread, so frames are processed strictly one at a time.

use std::path::PathBuf;
use std::time::{Instant, SystemTime, UNIX_EPOCH};

use tracing::{debug, info};

use crate::ipc::IpcServer;
use crate::tracking::{
    Clock, Frame, FramePipeline, FrameReport, Scene, SceneElement, TrackerConfig,
    VirtualIndicator,
};

/// Default indicator diameter in pixels.
pub const DEFAULT_INDICATOR_SIZE: f64 = 100.0;

/// Central daemon state.
pub struct DaemonState {
    pub pipeline: FramePipeline,
    pub scene: Scene,
    pub indicator: VirtualIndicator,
    pub ipc_server: IpcServer,
    pub started: Instant,
    /// Cleared to leave the event loop.
    pub running: bool,
}

impl DaemonState {
    pub fn new(
        config: TrackerConfig,
        indicator_size: f64,
        clock: Box<dyn Clock>,
        socket_path: PathBuf,
    ) -> Self {
        info!("DaemonState initialized (indicator size {:.0}px)", indicator_size);
        Self {
            pipeline: FramePipeline::new(config, clock),
            scene: Scene::new(),
            indicator: VirtualIndicator::new(indicator_size),
            ipc_server: IpcServer::new(socket_path),
            started: Instant::now(),
            running: true,
        }
    }

    /// Run one frame through the pipeline and broadcast whatever it emits.
    pub fn handle_frame(&mut self, frame: &Frame) -> FrameReport {
        let report = self
            .pipeline
            .push_frame(frame, &mut self.indicator, &self.scene);
        for event in &report.events {
            self.ipc_server.broadcast_event(&event.to_sexp());
        }
        report
    }

    /// Register (or replace and raise) an element in the scene.
    pub fn add_element(&mut self, element: SceneElement) {
        debug!(
            "Element {} at ({:.0}, {:.0}) {:.0}x{:.0}{}",
            element.id,
            element.x,
            element.y,
            element.width,
            element.height,
            if element.pinned { " pinned" } else { "" }
        );
        self.scene.add(element);
    }

    /// Remove an element from the scene.  Focus on it is dropped silently.
    pub fn remove_element(&mut self, id: u64) -> bool {
        let removed = self.scene.remove(id);
        if removed {
            self.pipeline.element_removed(id);
        }
        removed
    }

    /// Milliseconds since the Unix epoch, for ping replies.
    pub fn unix_millis(&self) -> u128 {
        SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_millis())
            .unwrap_or(0)
    }

    /// Generate IPC status s-expression for the whole daemon.
    pub fn status_sexp(&self) -> String {
        format!(
            "(:tracker {} :indicator {} :elements {} :clients {} :uptime-s {})",
            self.pipeline.status_sexp(),
            self.indicator.status_sexp(self.pipeline.now_ms()),
            self.scene.len(),
            self.ipc_server.clients.len(),
            self.started.elapsed().as_secs(),
        )
    }
}

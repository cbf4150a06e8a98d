//! Async driver that wires a [`FunnelController`] to its data sources and a
//! frame clock on the tokio runtime.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::watch;
use tokio::time::{Instant, MissedTickBehavior};
use tracing::{debug, info};

use funnel_core::collaborators::{ItemsSource, ZipMetadataSource};

use crate::controller::FunnelController;
use crate::types::{FunnelStage, ZipReadiness};

/// How a call to [`FunnelSession::run_scan`] ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScanRunOutcome {
    /// The scan finished and the funnel settled in this stage.
    Completed(FunnelStage),
    /// Torn down before the scan finished.
    Cancelled,
    /// There was no scan to run.
    Idle,
}

pub struct FunnelSession {
    controller: FunnelController,
    items: Arc<dyn ItemsSource>,
    metadata: Arc<dyn ZipMetadataSource>,
    frame_interval: Duration,
    clock: Instant,
}

impl FunnelSession {
    pub fn new(
        controller: FunnelController,
        items: Arc<dyn ItemsSource>,
        metadata: Arc<dyn ZipMetadataSource>,
        frame_interval_ms: u64,
    ) -> Self {
        Self {
            controller,
            items,
            metadata,
            frame_interval: Duration::from_millis(frame_interval_ms.max(1)),
            clock: Instant::now(),
        }
    }

    pub fn controller(&self) -> &FunnelController {
        &self.controller
    }

    pub fn controller_mut(&mut self) -> &mut FunnelController {
        &mut self.controller
    }

    /// Sets the postal code and, for a newly accepted one, fetches items and
    /// locality metadata concurrently. Fetch failures degrade inside the
    /// controller and never surface here.
    pub async fn enter_postal_code(&mut self, raw: &str) -> ZipReadiness {
        let previous_run = self.controller.state().run_id;
        let readiness = self.controller.set_postal_code(raw);

        if let ZipReadiness::Ready(zip) = &readiness {
            if self.controller.state().run_id != previous_run {
                debug!(zip = %zip, "Fetching inventory");
                let (items, metadata) = tokio::join!(
                    self.items.fetch_items(zip),
                    self.metadata.fetch_metadata(zip)
                );
                self.controller.load_inventory(items, metadata);
            }
        }
        readiness
    }

    /// Ticks the active scan once per frame until it completes or `shutdown`
    /// flips to `true`. A dropped shutdown sender just means nobody can stop
    /// the scan early.
    pub async fn run_scan(&mut self, mut shutdown: watch::Receiver<bool>) -> ScanRunOutcome {
        if !self.controller.has_active_scan() {
            return ScanRunOutcome::Idle;
        }

        let mut frames = tokio::time::interval(self.frame_interval);
        frames.set_missed_tick_behavior(MissedTickBehavior::Skip);
        let mut shutdown_open = true;

        loop {
            tokio::select! {
                _ = frames.tick() => {
                    let now_ms = self.clock.elapsed().as_millis() as u64;
                    self.controller.tick(now_ms);
                    if !self.controller.has_active_scan() {
                        return ScanRunOutcome::Completed(self.controller.stage());
                    }
                }
                changed = shutdown.changed(), if shutdown_open => {
                    match changed {
                        Ok(()) if *shutdown.borrow() => {
                            info!(run_id = %self.controller.state().run_id, "Session torn down mid-scan");
                            self.controller.teardown();
                            return ScanRunOutcome::Cancelled;
                        }
                        Ok(()) => {}
                        Err(_) => shutdown_open = false,
                    }
                }
            }
        }
    }
}

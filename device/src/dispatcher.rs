use std::sync::Arc;
use std::time::Duration;

use tracing::{debug, info, warn};

use crate::connectivity::{ConnectivityManager, ConnectivityState};
use crate::frame_source::FrameSource;
use crate::mode::ModePoller;
use crate::scheduler::{CaptureScheduler, Uptime};
use crate::upload::Uploader;
use crate::DeviceError;

/// What one pass of the capture loop did.
#[derive(Debug)]
pub enum CycleOutcome {
    NotDue,
    /// Collector accepted the frame with this status.
    Delivered(u16),
    /// A capture was attempted and the frame (if any) dropped.
    Dropped(DeviceError),
}

/// Session context for the capture-and-deliver loop.
///
/// Owns all loop state: connectivity, interval, last capture time. The
/// frame source is shared with the HTTP server.
pub struct Dispatcher {
    clock: Uptime,
    connectivity: ConnectivityManager,
    poller: ModePoller,
    scheduler: CaptureScheduler,
    frames: Arc<FrameSource>,
    uploader: Uploader,
    min_frame_bytes: usize,
    tick: Duration,
}

impl Dispatcher {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        clock: Uptime,
        connectivity: ConnectivityManager,
        poller: ModePoller,
        scheduler: CaptureScheduler,
        frames: Arc<FrameSource>,
        uploader: Uploader,
        min_frame_bytes: usize,
        tick: Duration,
    ) -> Self {
        Self {
            clock,
            connectivity,
            poller,
            scheduler,
            frames,
            uploader,
            min_frame_bytes,
            tick,
        }
    }

    pub fn scheduler(&self) -> &CaptureScheduler {
        &self.scheduler
    }

    pub fn connectivity_state(&self) -> ConnectivityState {
        self.connectivity.current_state()
    }

    /// Run forever. Every await point lets the HTTP server make progress.
    pub async fn run(mut self) {
        info!(
            tick_ms = self.tick.as_millis() as u64,
            interval_secs = self.scheduler.interval().get().as_secs(),
            "entering capture loop"
        );
        let mut total: u64 = 0;
        loop {
            let now = self.clock.now();
            match self.step_at(now).await {
                CycleOutcome::NotDue => {}
                CycleOutcome::Delivered(_) => {
                    total += 1;
                    debug!(total, "frames delivered");
                }
                CycleOutcome::Dropped(e) => {
                    warn!(error = %e, "scheduled capture dropped");
                }
            }
            tokio::time::sleep(self.tick).await;
        }
    }

    /// One loop iteration: keep the link up, refresh the mode, and capture
    /// and deliver if due. `now` is time since boot at the start of the pass.
    pub async fn step_at(&mut self, now: Duration) -> CycleOutcome {
        let state = self.connectivity.maintain(now).await;

        let poll = self.poller.poll(state).await;
        self.scheduler.apply_poll(poll);

        if !self.scheduler.is_due(now) {
            return CycleOutcome::NotDue;
        }

        info!(
            interval_secs = self.scheduler.interval().get().as_secs(),
            "capture due"
        );
        let outcome = match self.capture_and_deliver(state).await {
            Ok(status) => CycleOutcome::Delivered(status),
            Err(e) => CycleOutcome::Dropped(e),
        };
        self.scheduler.record_attempt(now);
        outcome
    }

    async fn capture_and_deliver(&self, state: ConnectivityState) -> Result<u16, DeviceError> {
        let frame = self.frames.acquire().await?;
        info!(
            bytes = frame.len(),
            width = frame.width(),
            height = frame.height(),
            format = ?frame.format(),
            captured_at_ms = frame.captured_at_ms(),
            "frame captured"
        );

        if frame.len() < self.min_frame_bytes {
            let bytes = frame.len();
            frame.release();
            return Err(DeviceError::AcquisitionFailed(format!(
                "frame too small ({bytes} bytes, minimum {})",
                self.min_frame_bytes
            )));
        }

        self.uploader.deliver(frame, state).await
    }
}

use std::time::Duration;

use tokio::time::Instant;
use tracing::info;

use crate::mode::PollResult;

/// Non-zero time between scheduled captures.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub struct CaptureInterval(Duration);

impl CaptureInterval {
    pub fn new(duration: Duration) -> Option<Self> {
        if duration.is_zero() {
            None
        } else {
            Some(Self(duration))
        }
    }

    pub fn get(self) -> Duration {
        self.0
    }
}

/// Monotonic time since boot.
#[derive(Debug, Clone, Copy)]
pub struct Uptime {
    boot: Instant,
}

impl Uptime {
    pub fn start() -> Self {
        Self {
            boot: Instant::now(),
        }
    }

    pub fn now(&self) -> Duration {
        self.boot.elapsed()
    }
}

/// A capture is due once `interval` has passed since the last attempt.
pub fn is_due(now: Duration, last: Duration, interval: CaptureInterval) -> bool {
    now.saturating_sub(last) >= interval.get()
}

/// Picks the capture cadence from the remote mode and tracks the last attempt.
#[derive(Debug)]
pub struct CaptureScheduler {
    fast: CaptureInterval,
    normal: CaptureInterval,
    interval: CaptureInterval,
    last_capture: Duration,
}

impl CaptureScheduler {
    /// Starts in normal mode with the last capture at boot.
    pub fn new(fast: CaptureInterval, normal: CaptureInterval) -> Self {
        Self {
            fast,
            normal,
            interval: normal,
            last_capture: Duration::ZERO,
        }
    }

    pub fn interval(&self) -> CaptureInterval {
        self.interval
    }

    pub fn last_capture(&self) -> Duration {
        self.last_capture
    }

    /// Adopt the mode from a successful poll. A failed poll changes nothing.
    pub fn apply_poll(&mut self, result: PollResult) {
        if !result.success {
            return;
        }
        let next = if result.fast_mode { self.fast } else { self.normal };
        if next != self.interval {
            info!(
                fast_mode = result.fast_mode,
                interval_secs = next.get().as_secs_f64(),
                "capture interval changed"
            );
            self.interval = next;
        }
    }

    pub fn is_due(&self, now: Duration) -> bool {
        is_due(now, self.last_capture, self.interval)
    }

    /// Record a capture attempt at `now`, whatever its outcome.
    pub fn record_attempt(&mut self, now: Duration) {
        self.last_capture = now;
    }
}

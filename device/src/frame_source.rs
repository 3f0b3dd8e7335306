use std::sync::Arc;
use std::time::Duration;

use bytes::Bytes;
use snapcam_common::frame::{Capture, FrameFormat};
use tokio::sync::{Mutex, OwnedSemaphorePermit, Semaphore};
use tracing::{debug, trace};

use crate::sensor::Sensor;
use crate::DeviceError;

/// A live frame that occupies the single capture buffer.
///
/// Holding a `Frame` is holding the buffer. It is released exactly once,
/// either explicitly with [`Frame::release`] or when it goes out of scope,
/// so error paths cannot leak it. `release` consumes the handle, which makes
/// reading a released frame a compile error:
///
/// ```compile_fail
/// # async fn demo(source: &snapcam_device::frame_source::FrameSource) {
/// let frame = source.acquire().await.unwrap();
/// frame.release();
/// let _ = frame.data();
/// # }
/// ```
///
/// [`Frame::into_payload`] consumes the frame too; the buffer then stays
/// occupied until the last clone of the returned `Bytes` is dropped.
#[derive(Debug)]
pub struct Frame {
    capture: Capture,
    _slot: OwnedSemaphorePermit,
}

impl Frame {
    pub fn data(&self) -> &[u8] {
        &self.capture.data
    }

    /// Turn the frame into a zero-copy body. The capture buffer travels with
    /// the bytes and is released when every clone has been dropped.
    pub fn into_payload(self) -> Bytes {
        Bytes::from_owner(SlotBytes {
            data: self.capture.data,
            _slot: self._slot,
        })
    }

    pub fn len(&self) -> usize {
        self.capture.len()
    }

    pub fn is_empty(&self) -> bool {
        self.capture.is_empty()
    }

    pub fn width(&self) -> u32 {
        self.capture.width
    }

    pub fn height(&self) -> u32 {
        self.capture.height
    }

    pub fn format(&self) -> FrameFormat {
        self.capture.format
    }

    pub fn captured_at_ms(&self) -> i64 {
        self.capture.captured_at_ms
    }

    /// Hand the buffer back to the frame source.
    pub fn release(self) {
        trace!(bytes = self.capture.len(), "frame released");
    }
}

/// Payload bytes that keep the capture buffer occupied.
struct SlotBytes {
    data: Bytes,
    _slot: OwnedSemaphorePermit,
}

impl AsRef<[u8]> for SlotBytes {
    fn as_ref(&self) -> &[u8] {
        &self.data
    }
}

/// Owns the sensor and its single capture buffer.
///
/// Acquisitions are serialized: a second `acquire` waits for the outstanding
/// frame to be released, for at most `acquire_timeout`.
pub struct FrameSource {
    sensor: Option<Mutex<Box<dyn Sensor>>>,
    slot: Arc<Semaphore>,
    acquire_timeout: Duration,
}

impl FrameSource {
    pub fn new(sensor: Box<dyn Sensor>, acquire_timeout: Duration) -> Self {
        Self {
            sensor: Some(Mutex::new(sensor)),
            slot: Arc::new(Semaphore::new(1)),
            acquire_timeout,
        }
    }

    /// A source whose sensor failed to initialize. Every acquisition fails.
    pub fn unavailable(acquire_timeout: Duration) -> Self {
        Self {
            sensor: None,
            slot: Arc::new(Semaphore::new(1)),
            acquire_timeout,
        }
    }

    pub fn is_available(&self) -> bool {
        self.sensor.is_some()
    }

    /// Whether the capture buffer is currently free.
    pub fn is_idle(&self) -> bool {
        self.slot.available_permits() == 1
    }

    pub async fn acquire(&self) -> Result<Frame, DeviceError> {
        let sensor = self.sensor.as_ref().ok_or(DeviceError::HardwareUnavailable)?;

        let slot = tokio::time::timeout(self.acquire_timeout, self.slot.clone().acquire_owned())
            .await
            .map_err(|_| DeviceError::AcquisitionFailed("capture buffer busy".into()))?
            .map_err(|_| DeviceError::HardwareUnavailable)?;

        // The slot permit is held, so nobody else can be waiting on this lock.
        let mut sensor = sensor.lock().await;
        let capture = tokio::time::timeout(self.acquire_timeout, sensor.grab())
            .await
            .map_err(|_| {
                DeviceError::AcquisitionFailed(format!(
                    "sensor did not deliver within {:?}",
                    self.acquire_timeout
                ))
            })??;

        debug!(
            sensor = sensor.name(),
            bytes = capture.len(),
            width = capture.width,
            height = capture.height,
            "frame acquired"
        );

        Ok(Frame {
            capture,
            _slot: slot,
        })
    }
}

use std::time::Duration;

use snapcam_common::config::ConfigError;
use snapcam_common::multipart::MultipartError;

use crate::sensor::SensorError;

/// Every failure the device can hit at runtime.
///
/// None of these are fatal: the capture loop logs them and carries on.
#[derive(Debug, thiserror::Error)]
pub enum DeviceError {
    #[error("camera sensor is not available")]
    HardwareUnavailable,
    #[error("frame acquisition failed: {0}")]
    AcquisitionFailed(String),
    #[error("network is not connected")]
    NetworkUnavailable,
    #[error("request timed out after {0:?}")]
    RequestTimeout(Duration),
    #[error("request rejected with HTTP status {0}")]
    RequestRejected(u16),
    #[error("failed to allocate {0} bytes for upload body")]
    AllocationFailed(usize),
    #[error("HTTP request failed: {0}")]
    Http(reqwest::Error),
    #[error("config error: {0}")]
    Config(#[from] ConfigError),
}

impl DeviceError {
    /// Classify a reqwest failure, folding timeouts into [`DeviceError::RequestTimeout`].
    pub fn from_http(e: reqwest::Error, timeout: Duration) -> Self {
        if e.is_timeout() {
            DeviceError::RequestTimeout(timeout)
        } else {
            DeviceError::Http(e)
        }
    }
}

impl From<SensorError> for DeviceError {
    fn from(e: SensorError) -> Self {
        match e {
            SensorError::NotReady(_) => DeviceError::HardwareUnavailable,
            other => DeviceError::AcquisitionFailed(other.to_string()),
        }
    }
}

impl From<MultipartError> for DeviceError {
    fn from(e: MultipartError) -> Self {
        match e {
            MultipartError::Allocation(bytes) => DeviceError::AllocationFailed(bytes),
            MultipartError::BoundaryInPayload => DeviceError::AcquisitionFailed(e.to_string()),
        }
    }
}

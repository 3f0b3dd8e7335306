use std::time::Duration;

use reqwest::StatusCode;
use tracing::{debug, info, warn};

use crate::connectivity::ConnectivityState;
use crate::DeviceError;

/// Outcome of one mode query. `fast_mode` is meaningful only when `success`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PollResult {
    pub success: bool,
    pub fast_mode: bool,
}

impl PollResult {
    pub fn ok(fast_mode: bool) -> Self {
        Self {
            success: true,
            fast_mode,
        }
    }

    pub fn failed() -> Self {
        Self {
            success: false,
            fast_mode: false,
        }
    }
}

/// Asks the collector whether fast capture mode is on.
pub struct ModePoller {
    client: reqwest::Client,
    url: String,
    marker: String,
    timeout: Duration,
}

impl ModePoller {
    pub fn new(
        client: reqwest::Client,
        url: impl Into<String>,
        marker: impl Into<String>,
        timeout: Duration,
    ) -> Self {
        Self {
            client,
            url: url.into(),
            marker: marker.into(),
            timeout,
        }
    }

    /// Issue one bounded query. Never fails; problems yield `success: false`.
    ///
    /// Takes `&mut self` so a poller cannot run concurrently with itself.
    pub async fn poll(&mut self, state: ConnectivityState) -> PollResult {
        if !state.is_connected() {
            debug!(?state, "not connected, skipping mode poll");
            return PollResult::failed();
        }

        match self.fetch().await {
            Ok(fast_mode) => {
                debug!(fast_mode, "mode poll succeeded");
                PollResult::ok(fast_mode)
            }
            Err(e) => {
                warn!(error = %e, url = self.url, "mode poll failed");
                PollResult::failed()
            }
        }
    }

    async fn fetch(&self) -> Result<bool, DeviceError> {
        let resp = self
            .client
            .get(&self.url)
            .timeout(self.timeout)
            .send()
            .await
            .map_err(|e| DeviceError::from_http(e, self.timeout))?;

        let status = resp.status();
        if status != StatusCode::OK {
            return Err(DeviceError::RequestRejected(status.as_u16()));
        }

        let body = resp
            .bytes()
            .await
            .map_err(|e| DeviceError::from_http(e, self.timeout))?;
        let fast_mode = String::from_utf8_lossy(&body).contains(self.marker.as_str());
        if fast_mode {
            info!("collector requested fast mode");
        }
        Ok(fast_mode)
    }
}

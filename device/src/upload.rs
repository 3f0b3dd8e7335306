use std::time::Duration;

use reqwest::header::CONTENT_TYPE;
use snapcam_common::config::UploadConfig;
use snapcam_common::multipart::MultipartForm;
use tracing::{debug, info};

use crate::connectivity::ConnectivityState;
use crate::frame_source::Frame;
use crate::DeviceError;

const JPEG_CONTENT_TYPE: &str = "image/jpeg";

/// How a frame is put on the wire.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Transport {
    /// `multipart/form-data` with a single image part.
    Multipart,
    /// The bare JPEG as the request body.
    RawJpeg,
}

impl Transport {
    pub fn from_config(name: &str) -> Option<Self> {
        match name {
            "multipart" => Some(Transport::Multipart),
            "raw" => Some(Transport::RawJpeg),
            _ => None,
        }
    }
}

/// Delivers frames to the collector with one POST each.
///
/// No retries: a failed delivery is reported and the frame is dropped.
pub struct Uploader {
    client: reqwest::Client,
    url: String,
    form: MultipartForm,
    transport: Transport,
    timeout: Duration,
}

impl Uploader {
    pub fn new(
        client: reqwest::Client,
        url: impl Into<String>,
        form: MultipartForm,
        transport: Transport,
        timeout: Duration,
    ) -> Self {
        Self {
            client,
            url: url.into(),
            form,
            transport,
            timeout,
        }
    }

    pub fn from_config(
        client: reqwest::Client,
        url: impl Into<String>,
        config: &UploadConfig,
        timeout: Duration,
    ) -> Self {
        let form = MultipartForm::new(config.boundary.as_str())
            .with_field(config.field_name.as_str(), config.filename.as_str());
        let transport = Transport::from_config(&config.transport).unwrap_or(Transport::Multipart);
        Self::new(client, url, form, transport, timeout)
    }

    /// Send `frame` and consume it. The frame is released on every path.
    ///
    /// Any 2xx status is success; everything else is a delivery failure.
    pub async fn deliver(&self, frame: Frame, state: ConnectivityState) -> Result<u16, DeviceError> {
        if !state.is_connected() {
            frame.release();
            return Err(DeviceError::NetworkUnavailable);
        }

        let bytes = frame.len();
        let request = match self.transport {
            Transport::Multipart => {
                // Both bodies are independent copies, so the buffer goes back
                // before the request is sent.
                let encoded = self.form.encode(frame.data());
                frame.release();
                let body = encoded?;
                debug!(bytes, body_len = body.len(), "multipart body encoded");
                self.client
                    .post(&self.url)
                    .header(CONTENT_TYPE, self.form.content_type())
                    .body(body)
                    .timeout(self.timeout)
                    .send()
                    .await
            }
            Transport::RawJpeg => {
                let body = frame.data().to_vec();
                frame.release();
                self.client
                    .post(&self.url)
                    .header(CONTENT_TYPE, JPEG_CONTENT_TYPE)
                    .body(body)
                    .timeout(self.timeout)
                    .send()
                    .await
            }
        };

        let resp = request.map_err(|e| DeviceError::from_http(e, self.timeout))?;
        let status = resp.status();
        if !status.is_success() {
            return Err(DeviceError::RequestRejected(status.as_u16()));
        }

        let reply = resp.text().await.unwrap_or_default();
        info!(status = status.as_u16(), bytes, "frame delivered");
        debug!(reply, "collector reply");
        Ok(status.as_u16())
    }
}

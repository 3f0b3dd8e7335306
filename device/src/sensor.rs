use std::io::Cursor;
use std::path::{Path, PathBuf};
use std::time::Duration;

use async_trait::async_trait;
use snapcam_common::config::SensorConfig;
use snapcam_common::frame::Capture;
use tracing::{debug, info};

/// Driver for the image sensor.
///
/// Implementations produce one compressed capture per call. Buffer ownership
/// and serialization of callers are handled by [`crate::frame_source::FrameSource`].
#[async_trait]
pub trait Sensor: Send {
    /// Human-readable name for logging.
    fn name(&self) -> &str;

    async fn grab(&mut self) -> Result<Capture, SensorError>;
}

#[derive(Debug, thiserror::Error)]
pub enum SensorError {
    #[error("sensor not ready: {0}")]
    NotReady(String),
    #[error("failed to read capture: {0}")]
    Io(String),
    #[error("capture is not a readable image: {0}")]
    Decode(String),
    #[error("upstream camera request failed: {0}")]
    Upstream(String),
}

/// Open the sensor selected by `[sensor] source`.
pub async fn open(config: &SensorConfig) -> Result<Box<dyn Sensor>, SensorError> {
    match config.source.as_str() {
        "directory" => {
            let sensor = DirectorySensor::open(Path::new(&config.path)).await?;
            Ok(Box::new(sensor))
        }
        "snapshot" => {
            let url = config
                .url
                .clone()
                .ok_or_else(|| SensorError::NotReady("no snapshot url configured".into()))?;
            let timeout = Duration::from_millis(config.acquire_timeout_ms);
            Ok(Box::new(SnapshotSensor::new(url, timeout)?))
        }
        other => Err(SensorError::NotReady(format!("unknown sensor source '{other}'"))),
    }
}

/// Read width and height from the image header without decoding pixels.
pub fn probe_dimensions(data: &[u8]) -> Result<(u32, u32), SensorError> {
    image::ImageReader::new(Cursor::new(data))
        .with_guessed_format()
        .map_err(|e| SensorError::Decode(e.to_string()))?
        .into_dimensions()
        .map_err(|e| SensorError::Decode(e.to_string()))
}

/// Replays the JPEG files of a directory in name order, wrapping around.
pub struct DirectorySensor {
    files: Vec<PathBuf>,
    next: usize,
    name: String,
}

impl DirectorySensor {
    pub async fn open(dir: &Path) -> Result<Self, SensorError> {
        let mut entries = tokio::fs::read_dir(dir)
            .await
            .map_err(|e| SensorError::NotReady(format!("{}: {e}", dir.display())))?;

        let mut files = Vec::new();
        while let Some(entry) = entries
            .next_entry()
            .await
            .map_err(|e| SensorError::Io(e.to_string()))?
        {
            let path = entry.path();
            let is_jpeg = path
                .extension()
                .and_then(|e| e.to_str())
                .map(|e| e.eq_ignore_ascii_case("jpg") || e.eq_ignore_ascii_case("jpeg"))
                .unwrap_or(false);
            if is_jpeg {
                files.push(path);
            }
        }
        files.sort();

        if files.is_empty() {
            return Err(SensorError::NotReady(format!(
                "no JPEG files in {}",
                dir.display()
            )));
        }

        info!(dir = %dir.display(), files = files.len(), "directory sensor ready");
        Ok(Self {
            files,
            next: 0,
            name: format!("directory:{}", dir.display()),
        })
    }
}

#[async_trait]
impl Sensor for DirectorySensor {
    fn name(&self) -> &str {
        &self.name
    }

    async fn grab(&mut self) -> Result<Capture, SensorError> {
        let path = &self.files[self.next];
        self.next = (self.next + 1) % self.files.len();

        let data = tokio::fs::read(path)
            .await
            .map_err(|e| SensorError::Io(format!("{}: {e}", path.display())))?;
        let (width, height) = probe_dimensions(&data)?;
        debug!(path = %path.display(), bytes = data.len(), width, height, "read capture");
        Ok(Capture::new(data, width, height))
    }
}

/// Fetches single JPEG snapshots from an upstream camera over HTTP.
pub struct SnapshotSensor {
    client: reqwest::Client,
    url: String,
    name: String,
}

impl SnapshotSensor {
    pub fn new(url: String, timeout: Duration) -> Result<Self, SensorError> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| SensorError::NotReady(e.to_string()))?;
        Ok(Self {
            client,
            name: format!("snapshot:{url}"),
            url,
        })
    }
}

#[async_trait]
impl Sensor for SnapshotSensor {
    fn name(&self) -> &str {
        &self.name
    }

    async fn grab(&mut self) -> Result<Capture, SensorError> {
        let resp = self
            .client
            .get(&self.url)
            .send()
            .await
            .map_err(|e| SensorError::Upstream(e.to_string()))?;

        if !resp.status().is_success() {
            return Err(SensorError::Upstream(format!("HTTP status {}", resp.status())));
        }

        let data = resp
            .bytes()
            .await
            .map_err(|e| SensorError::Upstream(e.to_string()))?;
        let (width, height) = probe_dimensions(&data)?;
        Ok(Capture::new(data, width, height))
    }
}

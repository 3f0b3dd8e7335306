use serde::Deserialize;
use std::path::Path;
use std::time::Duration;

#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    pub collector: CollectorConfig,
    #[serde(default)]
    pub network: NetworkConfig,
    #[serde(default)]
    pub sensor: SensorConfig,
    #[serde(default)]
    pub schedule: ScheduleConfig,
    #[serde(default)]
    pub upload: UploadConfig,
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
}

/// The remote collector that receives uploads and answers mode queries.
#[derive(Debug, Clone, Deserialize)]
pub struct CollectorConfig {
    pub base_url: String,
    #[serde(default = "default_mode_path")]
    pub mode_path: String,
    #[serde(default = "default_upload_path")]
    pub upload_path: String,
    /// Substring of the `/mode` response body that switches fast mode on.
    #[serde(default = "default_fast_mode_marker")]
    pub fast_mode_marker: String,
    #[serde(default = "default_request_timeout")]
    pub request_timeout_secs: u64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct NetworkConfig {
    /// `host:port` probed to decide whether the link is up.
    /// Derived from `collector.base_url` when absent.
    #[serde(default)]
    pub probe_addr: Option<String>,
    #[serde(default = "default_check_interval")]
    pub check_interval_secs: u64,
    #[serde(default = "default_connect_timeout")]
    pub connect_timeout_secs: u64,
    #[serde(default = "default_probe_timeout")]
    pub probe_timeout_ms: u64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct SensorConfig {
    #[serde(default = "default_sensor_source")]
    pub source: String,
    /// Directory of JPEG files for the `directory` source.
    #[serde(default = "default_sensor_path")]
    pub path: String,
    /// Upstream snapshot URL for the `snapshot` source.
    #[serde(default)]
    pub url: Option<String>,
    #[serde(default = "default_acquire_timeout")]
    pub acquire_timeout_ms: u64,
    /// Captures smaller than this are treated as sensor glitches and not uploaded.
    #[serde(default = "default_min_frame_bytes")]
    pub min_frame_bytes: usize,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ScheduleConfig {
    #[serde(default = "default_fast_interval")]
    pub fast_interval_secs: u64,
    #[serde(default = "default_normal_interval")]
    pub normal_interval_secs: u64,
    #[serde(default = "default_tick")]
    pub tick_ms: u64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct UploadConfig {
    #[serde(default = "default_transport")]
    pub transport: String,
    #[serde(default = "default_boundary")]
    pub boundary: String,
    #[serde(default = "default_field_name")]
    pub field_name: String,
    #[serde(default = "default_filename")]
    pub filename: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ServerConfig {
    #[serde(default = "default_bind")]
    pub bind: String,
    #[serde(default = "default_port")]
    pub port: u16,
    #[serde(default = "default_stream_frame_delay")]
    pub stream_frame_delay_ms: u64,
    /// Chunks sent on one `/stream` connection before it is closed. 0 = unbounded.
    #[serde(default = "default_stream_max_chunks")]
    pub stream_max_chunks: u64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct LoggingConfig {
    #[serde(default = "default_log_level")]
    pub level: String,
}

impl Default for NetworkConfig {
    fn default() -> Self {
        Self {
            probe_addr: None,
            check_interval_secs: default_check_interval(),
            connect_timeout_secs: default_connect_timeout(),
            probe_timeout_ms: default_probe_timeout(),
        }
    }
}

impl Default for SensorConfig {
    fn default() -> Self {
        Self {
            source: default_sensor_source(),
            path: default_sensor_path(),
            url: None,
            acquire_timeout_ms: default_acquire_timeout(),
            min_frame_bytes: default_min_frame_bytes(),
        }
    }
}

impl Default for ScheduleConfig {
    fn default() -> Self {
        Self {
            fast_interval_secs: default_fast_interval(),
            normal_interval_secs: default_normal_interval(),
            tick_ms: default_tick(),
        }
    }
}

impl Default for UploadConfig {
    fn default() -> Self {
        Self {
            transport: default_transport(),
            boundary: default_boundary(),
            field_name: default_field_name(),
            filename: default_filename(),
        }
    }
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind: default_bind(),
            port: default_port(),
            stream_frame_delay_ms: default_stream_frame_delay(),
            stream_max_chunks: default_stream_max_chunks(),
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
        }
    }
}

impl Config {
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path)
            .map_err(|e| ConfigError::ReadFile(path.display().to_string(), e))?;
        Self::from_toml(&content)
    }

    pub fn from_toml(content: &str) -> Result<Self, ConfigError> {
        let config: Config =
            toml::from_str(content).map_err(|e| ConfigError::Parse(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        let s = &self.schedule;
        if s.fast_interval_secs == 0 || s.normal_interval_secs == 0 {
            return Err(ConfigError::Invalid("capture intervals must be non-zero".into()));
        }
        if s.fast_interval_secs >= s.normal_interval_secs {
            return Err(ConfigError::Invalid(format!(
                "fast_interval_secs ({}) must be shorter than normal_interval_secs ({})",
                s.fast_interval_secs, s.normal_interval_secs
            )));
        }
        if s.tick_ms == 0 {
            return Err(ConfigError::Invalid("schedule.tick_ms must be non-zero".into()));
        }
        if self.collector.request_timeout_secs == 0 || self.network.connect_timeout_secs == 0 {
            return Err(ConfigError::Invalid("network timeouts must be non-zero".into()));
        }
        if self.network.probe_timeout_ms == 0 || self.sensor.acquire_timeout_ms == 0 {
            return Err(ConfigError::Invalid("probe and acquire timeouts must be non-zero".into()));
        }
        match self.sensor.source.as_str() {
            "directory" => {}
            "snapshot" if self.sensor.url.is_some() => {}
            "snapshot" => {
                return Err(ConfigError::Invalid("sensor.url is required for the snapshot source".into()))
            }
            other => {
                return Err(ConfigError::Invalid(format!(
                    "unknown sensor source '{other}', expected 'directory' or 'snapshot'"
                )))
            }
        }
        if !matches!(self.upload.transport.as_str(), "multipart" | "raw") {
            return Err(ConfigError::Invalid(format!(
                "unknown upload transport '{}', expected 'multipart' or 'raw'",
                self.upload.transport
            )));
        }
        if self.upload.boundary.is_empty() {
            return Err(ConfigError::Invalid("upload.boundary must not be empty".into()));
        }
        Ok(())
    }
}

impl CollectorConfig {
    pub fn mode_url(&self) -> String {
        join_url(&self.base_url, &self.mode_path)
    }

    pub fn upload_url(&self) -> String {
        join_url(&self.base_url, &self.upload_path)
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }
}

impl NetworkConfig {
    pub fn check_interval(&self) -> Duration {
        Duration::from_secs(self.check_interval_secs)
    }

    pub fn connect_timeout(&self) -> Duration {
        Duration::from_secs(self.connect_timeout_secs)
    }

    pub fn probe_timeout(&self) -> Duration {
        Duration::from_millis(self.probe_timeout_ms)
    }
}

fn join_url(base: &str, path: &str) -> String {
    format!("{}/{}", base.trim_end_matches('/'), path.trim_start_matches('/'))
}

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("failed to read config file {0}: {1}")]
    ReadFile(String, std::io::Error),
    #[error("failed to parse config: {0}")]
    Parse(String),
    #[error("invalid config: {0}")]
    Invalid(String),
}

// Default value functions
fn default_mode_path() -> String {
    "/mode".into()
}
fn default_upload_path() -> String {
    "/upload".into()
}
fn default_fast_mode_marker() -> String {
    "true".into()
}
fn default_request_timeout() -> u64 {
    5
}
fn default_check_interval() -> u64 {
    30
}
fn default_connect_timeout() -> u64 {
    15
}
fn default_probe_timeout() -> u64 {
    2000
}
fn default_sensor_source() -> String {
    "directory".into()
}
fn default_sensor_path() -> String {
    "frames".into()
}
fn default_acquire_timeout() -> u64 {
    3000
}
fn default_min_frame_bytes() -> usize {
    100
}
fn default_fast_interval() -> u64 {
    10
}
fn default_normal_interval() -> u64 {
    300
}
fn default_tick() -> u64 {
    1000
}
fn default_transport() -> String {
    "multipart".into()
}
fn default_boundary() -> String {
    crate::multipart::DEFAULT_BOUNDARY.into()
}
fn default_field_name() -> String {
    "image".into()
}
fn default_filename() -> String {
    "cam.jpg".into()
}
fn default_bind() -> String {
    "0.0.0.0".into()
}
fn default_port() -> u16 {
    80
}
fn default_stream_frame_delay() -> u64 {
    100
}
fn default_stream_max_chunks() -> u64 {
    6000
}
fn default_log_level() -> String {
    "info".into()
}

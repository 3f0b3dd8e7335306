use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use snapcam_common::config::{Config, ConfigError};
use snapcam_device::connectivity::{ConnectivityManager, TcpLink};
use snapcam_device::dispatcher::Dispatcher;
use snapcam_device::frame_source::FrameSource;
use snapcam_device::mode::ModePoller;
use snapcam_device::scheduler::{CaptureInterval, CaptureScheduler, Uptime};
use snapcam_device::server::{self, ServerState, StreamSettings};
use snapcam_device::upload::Uploader;
use snapcam_device::{sensor, DeviceError};
use tracing::{error, info, warn};

// The capture loop and the HTTP server share one thread and interleave at
// await points.
#[tokio::main(flavor = "current_thread")]
async fn main() {
    let config_path = std::env::args()
        .nth(1)
        .map(PathBuf::from)
        .unwrap_or_else(|| PathBuf::from("config.toml"));

    let config = match Config::load(&config_path) {
        Ok(c) => c,
        Err(e) => {
            eprintln!("Failed to load config from {}: {e}", config_path.display());
            std::process::exit(1);
        }
    };

    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| config.logging.level.parse().unwrap_or_default()),
        )
        .init();

    info!(
        collector = config.collector.base_url,
        sensor = config.sensor.source,
        transport = config.upload.transport,
        port = config.server.port,
        "starting snapcam"
    );

    if let Err(e) = run(config).await {
        error!(error = %e, "snapcam failed to start");
        std::process::exit(1);
    }
}

async fn run(config: Config) -> Result<(), DeviceError> {
    let clock = Uptime::start();
    let acquire_timeout = Duration::from_millis(config.sensor.acquire_timeout_ms);

    // A missing camera is not fatal: keep serving and report it per request.
    let frames = Arc::new(match sensor::open(&config.sensor).await {
        Ok(s) => {
            info!(sensor = s.name(), "camera initialized");
            FrameSource::new(s, acquire_timeout)
        }
        Err(e) => {
            error!(error = %e, "camera init failed, continuing without camera");
            FrameSource::unavailable(acquire_timeout)
        }
    });

    let probe_addr = config
        .network
        .probe_addr
        .clone()
        .or_else(|| TcpLink::probe_addr_for(&config.collector.base_url))
        .ok_or_else(|| {
            ConfigError::Invalid(format!(
                "cannot derive a probe address from {}",
                config.collector.base_url
            ))
        })?;
    let link = TcpLink::new(probe_addr, config.network.probe_timeout());
    let mut connectivity = ConnectivityManager::new(
        Box::new(link),
        config.network.check_interval(),
        config.network.connect_timeout(),
    );
    let state = connectivity.check_at(clock.now()).await;
    if !state.is_connected() {
        warn!("network not connected at boot, continuing offline");
    }

    let client = reqwest::Client::builder()
        .connect_timeout(config.collector.request_timeout())
        .build()
        .map_err(DeviceError::Http)?;

    let poller = ModePoller::new(
        client.clone(),
        config.collector.mode_url(),
        config.collector.fast_mode_marker.as_str(),
        config.collector.request_timeout(),
    );
    let uploader = Uploader::from_config(
        client,
        config.collector.upload_url(),
        &config.upload,
        config.collector.request_timeout(),
    );

    let (fast, normal) = match (
        CaptureInterval::new(Duration::from_secs(config.schedule.fast_interval_secs)),
        CaptureInterval::new(Duration::from_secs(config.schedule.normal_interval_secs)),
    ) {
        (Some(fast), Some(normal)) => (fast, normal),
        _ => {
            return Err(ConfigError::Invalid("capture intervals must be non-zero".into()).into())
        }
    };

    let app = server::router(Arc::new(ServerState {
        frames: Arc::clone(&frames),
        stream: StreamSettings::from_config(&config.server),
    }));
    let addr = format!("{}:{}", config.server.bind, config.server.port);
    let listener = tokio::net::TcpListener::bind(&addr).await.unwrap_or_else(|e| {
        eprintln!("Failed to bind to {addr}: {e}");
        std::process::exit(1);
    });
    info!(addr, "local HTTP server listening");
    tokio::spawn(async move {
        if let Err(e) = axum::serve(listener, app).await {
            error!(error = %e, "local HTTP server stopped");
        }
    });

    let dispatcher = Dispatcher::new(
        clock,
        connectivity,
        poller,
        CaptureScheduler::new(fast, normal),
        frames,
        uploader,
        config.sensor.min_frame_bytes,
        Duration::from_millis(config.schedule.tick_ms),
    );
    dispatcher.run().await;
    Ok(())
}

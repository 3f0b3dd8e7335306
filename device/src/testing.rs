//! Fakes shared by the unit tests.

use std::io::Cursor;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use axum::Router;
use snapcam_common::frame::Capture;

use crate::connectivity::Link;
use crate::sensor::{Sensor, SensorError};
use crate::DeviceError;

/// Encode a black JPEG of the given size.
pub fn jpeg_bytes(width: u32, height: u32) -> Vec<u8> {
    let img = image::RgbImage::new(width, height);
    let mut buf = Cursor::new(Vec::new());
    img.write_to(&mut buf, image::ImageFormat::Jpeg).unwrap();
    buf.into_inner()
}

/// Sensor producing fixed-size JPEG-looking payloads.
pub struct MockSensor {
    size: usize,
    successes_left: Option<usize>,
    delay: Option<Duration>,
    grabs: Arc<AtomicUsize>,
}

impl MockSensor {
    pub fn new(size: usize) -> Self {
        Self {
            size,
            successes_left: None,
            delay: None,
            grabs: Arc::new(AtomicUsize::new(0)),
        }
    }

    /// Succeeds `n` times, then fails every grab.
    pub fn failing_after(n: usize) -> Self {
        Self {
            successes_left: Some(n),
            ..Self::new(256)
        }
    }

    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    pub fn grab_counter(&self) -> Arc<AtomicUsize> {
        Arc::clone(&self.grabs)
    }
}

pub fn payload(size: usize) -> Vec<u8> {
    let mut data = vec![0x11u8; size];
    if size >= 2 {
        data[0] = 0xFF;
        data[1] = 0xD8;
    }
    data
}

#[async_trait]
impl Sensor for MockSensor {
    fn name(&self) -> &str {
        "mock"
    }

    async fn grab(&mut self) -> Result<Capture, SensorError> {
        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }
        if let Some(left) = self.successes_left.as_mut() {
            if *left == 0 {
                return Err(SensorError::Io("mock sensor failure".into()));
            }
            *left -= 1;
        }
        self.grabs.fetch_add(1, Ordering::SeqCst);
        Ok(Capture::new(payload(self.size), 640, 480))
    }
}

/// Link whose association state is driven by the test.
#[derive(Clone)]
pub struct FakeLink {
    pub up: Arc<AtomicBool>,
    pub accepts: Arc<AtomicBool>,
    pub hangs: Arc<AtomicBool>,
    pub associate_calls: Arc<AtomicUsize>,
}

impl FakeLink {
    pub fn up() -> Self {
        let link = Self::down();
        link.up.store(true, Ordering::SeqCst);
        link
    }

    pub fn down() -> Self {
        Self {
            up: Arc::new(AtomicBool::new(false)),
            accepts: Arc::new(AtomicBool::new(true)),
            hangs: Arc::new(AtomicBool::new(false)),
            associate_calls: Arc::new(AtomicUsize::new(0)),
        }
    }
}

#[async_trait]
impl Link for FakeLink {
    async fn is_associated(&mut self) -> bool {
        self.up.load(Ordering::SeqCst)
    }

    async fn associate(&mut self) -> Result<(), DeviceError> {
        self.associate_calls.fetch_add(1, Ordering::SeqCst);
        if self.hangs.load(Ordering::SeqCst) {
            std::future::pending::<()>().await;
        }
        if self.accepts.load(Ordering::SeqCst) {
            self.up.store(true, Ordering::SeqCst);
            Ok(())
        } else {
            Err(DeviceError::NetworkUnavailable)
        }
    }
}

/// Serve `app` on an ephemeral localhost port and return its base URL.
pub async fn spawn_collector(app: Router) -> String {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });
    format!("http://{addr}")
}

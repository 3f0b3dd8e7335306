use std::convert::Infallible;
use std::sync::Arc;
use std::time::Duration;

use axum::body::Body;
use axum::extract::State;
use axum::http::{header, StatusCode};
use axum::response::{Html, IntoResponse, Response};
use axum::routing::get;
use axum::Router;
use bytes::Bytes;
use futures_util::stream;
use snapcam_common::config::ServerConfig;
use tower_http::trace::TraceLayer;
use tracing::{debug, info, warn};

use crate::frame_source::{Frame, FrameSource};

/// Boundary separating parts of the `/stream` response.
pub const STREAM_BOUNDARY: &str = "frame";

const STATUS_PAGE: &str = r#"<!DOCTYPE html>
<html>
<head>
<meta charset="UTF-8">
<title>snapcam</title>
<style>
body { font-family: Arial, sans-serif; text-align: center; margin: 20px; }
button { padding: 10px 20px; font-size: 16px; margin: 10px; }
img { max-width: 90%; border: 2px solid #333; margin: 10px; }
</style>
</head>
<body>
<h1>snapcam</h1>
<button onclick="show('/capture')">Capture photo</button>
<button onclick="show('/stream')">Live stream</button>
<div id="image"></div>
<script>
function show(src) {
  document.getElementById('image').innerHTML = '<img src="' + src + '?t=' + Date.now() + '" />';
}
</script>
</body>
</html>
"#;

#[derive(Debug, Clone, Copy)]
pub struct StreamSettings {
    /// Pause between two chunks; the buffer is free during the pause.
    pub frame_delay: Duration,
    /// Chunks per connection before the stream is closed. `None` = unbounded.
    pub max_chunks: Option<u64>,
}

impl StreamSettings {
    pub fn from_config(config: &ServerConfig) -> Self {
        Self {
            frame_delay: Duration::from_millis(config.stream_frame_delay_ms),
            max_chunks: (config.stream_max_chunks > 0).then_some(config.stream_max_chunks),
        }
    }
}

pub struct ServerState {
    pub frames: Arc<FrameSource>,
    pub stream: StreamSettings,
}

pub fn router(state: Arc<ServerState>) -> Router {
    Router::new()
        .route("/", get(status_page))
        .route("/capture", get(capture))
        .route("/stream", get(stream_frames))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

/// GET /: static control page.
async fn status_page() -> Html<&'static str> {
    Html(STATUS_PAGE)
}

/// GET /capture: one JPEG, or 500 if the sensor cannot deliver
async fn capture(State(state): State<Arc<ServerState>>) -> Response {
    match state.frames.acquire().await {
        Ok(frame) => {
            info!(bytes = frame.len(), "serving single capture");
            let mime = frame.format().mime();
            // The buffer is freed once the body bytes have been written and dropped.
            Response::builder()
                .status(StatusCode::OK)
                .header(header::CONTENT_TYPE, mime)
                .header(header::CACHE_CONTROL, "no-store")
                .body(Body::from(frame.into_payload()))
                .unwrap_or_else(|e| server_error(e.to_string()))
        }
        Err(e) => {
            warn!(error = %e, "capture request failed");
            server_error(format!("capture failed: {e}"))
        }
    }
}

/// GET /stream: multipart/x-mixed-replace MJPEG until the client leaves
async fn stream_frames(State(state): State<Arc<ServerState>>) -> Response {
    info!(max_chunks = ?state.stream.max_chunks, "stream client connected");
    let session = MjpegSession::new(Arc::clone(&state.frames), state.stream);
    let body = stream::unfold(session, |mut session| async move {
        session
            .next_piece()
            .await
            .map(|piece| (Ok::<_, Infallible>(piece), session))
    });

    Response::builder()
        .status(StatusCode::OK)
        .header(
            header::CONTENT_TYPE,
            format!("multipart/x-mixed-replace; boundary={STREAM_BOUNDARY}"),
        )
        .header(header::CACHE_CONTROL, "no-cache, no-store, must-revalidate")
        .header(header::PRAGMA, "no-cache")
        .body(Body::from_stream(body))
        .unwrap_or_else(|e| server_error(e.to_string()))
}

fn server_error(message: String) -> Response {
    (StatusCode::INTERNAL_SERVER_ERROR, message).into_response()
}

/// Per-connection MJPEG generator.
///
/// Each activation yields one piece of a chunk: the part header (right after
/// acquiring a frame), the JPEG payload, then the trailing CRLF. The payload
/// carries the frame with it, so the buffer frees once the connection has
/// written and dropped it. Between chunks the session sleeps, giving the
/// capture loop and other requests their turn.
struct MjpegSession {
    frames: Arc<FrameSource>,
    settings: StreamSettings,
    held: Option<Held>,
    chunks: u64,
}

enum Held {
    Payload(Frame),
    Trailer,
}

impl MjpegSession {
    fn new(frames: Arc<FrameSource>, settings: StreamSettings) -> Self {
        Self {
            frames,
            settings,
            held: None,
            chunks: 0,
        }
    }

    async fn next_piece(&mut self) -> Option<Bytes> {
        match self.held.take() {
            Some(Held::Payload(frame)) => {
                self.held = Some(Held::Trailer);
                Some(frame.into_payload())
            }
            Some(Held::Trailer) => {
                self.chunks += 1;
                Some(Bytes::from_static(b"\r\n"))
            }
            None => self.start_chunk().await,
        }
    }

    async fn start_chunk(&mut self) -> Option<Bytes> {
        if let Some(max) = self.settings.max_chunks {
            if self.chunks >= max {
                info!(chunks = self.chunks, "stream chunk limit reached, closing");
                return None;
            }
        }
        if self.chunks > 0 {
            tokio::time::sleep(self.settings.frame_delay).await;
        }

        match self.frames.acquire().await {
            Ok(frame) => {
                debug!(chunk = self.chunks, bytes = frame.len(), "streaming frame");
                let header = format!(
                    "--{STREAM_BOUNDARY}\r\nContent-Type: {}\r\n\r\n",
                    frame.format().mime()
                );
                self.held = Some(Held::Payload(frame));
                Some(Bytes::from(header))
            }
            Err(e) => {
                warn!(error = %e, chunks = self.chunks, "stream ended, capture failed");
                None
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{payload, MockSensor};
    use axum::http::Request;
    use futures_util::StreamExt;
    use tower::ServiceExt;

    fn app(frames: FrameSource, max_chunks: Option<u64>) -> (Router, Arc<FrameSource>) {
        let frames = Arc::new(frames);
        let state = Arc::new(ServerState {
            frames: Arc::clone(&frames),
            stream: StreamSettings {
                frame_delay: Duration::from_millis(1),
                max_chunks,
            },
        });
        (router(state), frames)
    }

    fn get(uri: &str) -> Request<Body> {
        Request::builder().uri(uri).body(Body::empty()).unwrap()
    }

    /// Read a body piece by piece, dropping each piece as a socket writer would.
    async fn drain(body: Body) -> Vec<u8> {
        let mut pieces = body.into_data_stream();
        let mut out = Vec::new();
        while let Some(piece) = pieces.next().await {
            out.extend_from_slice(&piece.unwrap());
        }
        out
    }

    fn chunk(size: usize) -> Vec<u8> {
        let mut expected = b"--frame\r\nContent-Type: image/jpeg\r\n\r\n".to_vec();
        expected.extend_from_slice(&payload(size));
        expected.extend_from_slice(b"\r\n");
        expected
    }

    #[tokio::test]
    async fn status_page_is_html() {
        let (app, _) = app(FrameSource::unavailable(Duration::from_millis(100)), None);
        let resp = app.oneshot(get("/")).await.unwrap();
        assert_eq!(resp.status(), StatusCode::OK);
        let content_type = resp.headers()[header::CONTENT_TYPE].to_str().unwrap().to_string();
        assert!(content_type.starts_with("text/html"));
        let body = axum::body::to_bytes(resp.into_body(), usize::MAX).await.unwrap();
        assert!(String::from_utf8_lossy(&body).contains("/stream"));
    }

    #[tokio::test]
    async fn capture_returns_jpeg_and_releases_frame() {
        let frames = FrameSource::new(Box::new(MockSensor::new(300)), Duration::from_millis(200));
        let (app, frames) = app(frames, None);

        let resp = app.oneshot(get("/capture")).await.unwrap();
        assert_eq!(resp.status(), StatusCode::OK);
        assert_eq!(resp.headers()[header::CONTENT_TYPE], "image/jpeg");
        assert!(!frames.is_idle());
        let body = drain(resp.into_body()).await;
        assert_eq!(body, payload(300));
        assert!(frames.is_idle());
    }

    #[tokio::test]
    async fn capture_without_sensor_is_500() {
        let (app, _) = app(FrameSource::unavailable(Duration::from_millis(100)), None);
        let resp = tokio::time::timeout(Duration::from_secs(5), app.oneshot(get("/capture")))
            .await
            .expect("capture must not hang")
            .unwrap();
        assert_eq!(resp.status(), StatusCode::INTERNAL_SERVER_ERROR);
    }

    #[tokio::test]
    async fn capture_with_failing_sensor_is_500() {
        let frames = FrameSource::new(Box::new(MockSensor::failing_after(0)), Duration::from_millis(100));
        let (app, frames) = app(frames, None);
        let resp = app.oneshot(get("/capture")).await.unwrap();
        assert_eq!(resp.status(), StatusCode::INTERNAL_SERVER_ERROR);
        assert!(frames.is_idle());
    }

    #[tokio::test]
    async fn stream_emits_chunks_until_capture_fails() {
        let frames = FrameSource::new(Box::new(MockSensor::failing_after(2)), Duration::from_millis(100));
        let (app, frames) = app(frames, None);

        let resp = app.oneshot(get("/stream")).await.unwrap();
        assert_eq!(resp.status(), StatusCode::OK);
        assert_eq!(
            resp.headers()[header::CONTENT_TYPE],
            "multipart/x-mixed-replace; boundary=frame"
        );

        let body = drain(resp.into_body()).await;
        let mut expected = chunk(256);
        expected.extend_from_slice(&chunk(256));
        assert_eq!(body, expected);
        assert!(frames.is_idle());
    }

    #[tokio::test]
    async fn stream_stops_at_chunk_limit() {
        let sensor = MockSensor::new(64);
        let grabs = sensor.grab_counter();
        let frames = FrameSource::new(Box::new(sensor), Duration::from_millis(100));
        let (app, frames) = app(frames, Some(3));

        let resp = app.oneshot(get("/stream")).await.unwrap();
        let body = drain(resp.into_body()).await;

        assert_eq!(body.len(), 3 * chunk(64).len());
        assert_eq!(grabs.load(std::sync::atomic::Ordering::SeqCst), 3);
        assert!(frames.is_idle());
    }

    #[tokio::test]
    async fn client_disconnect_releases_frame() {
        let frames = FrameSource::new(Box::new(MockSensor::new(64)), Duration::from_millis(100));
        let (app, frames) = app(frames, None);

        let resp = app.oneshot(get("/stream")).await.unwrap();
        let mut pieces = resp.into_body().into_data_stream();
        // Part header only: the frame is still held.
        let header = pieces.next().await.unwrap().unwrap();
        assert!(header.starts_with(b"--frame\r\n"));
        assert!(!frames.is_idle());

        drop(pieces);
        assert!(frames.is_idle());
    }

    #[tokio::test]
    async fn unwritten_stream_payload_keeps_the_buffer() {
        let frames = FrameSource::new(Box::new(MockSensor::new(48)), Duration::from_millis(100));
        let (app, frames) = app(frames, None);

        let resp = app.oneshot(get("/stream")).await.unwrap();
        let mut pieces = resp.into_body().into_data_stream();
        pieces.next().await.unwrap().unwrap();
        let in_flight = pieces.next().await.unwrap().unwrap();
        assert_eq!(in_flight.to_vec(), payload(48));
        assert_eq!(pieces.next().await.unwrap().unwrap(), Bytes::from_static(b"\r\n"));

        // Trailer sent, payload not yet written out.
        assert!(!frames.is_idle());
        drop(in_flight);
        assert!(frames.is_idle());
    }

    #[tokio::test]
    async fn capture_waits_for_stream_to_free_the_buffer() {
        let frames = FrameSource::new(Box::new(MockSensor::new(32)), Duration::from_secs(2));
        let (app, _frames) = app(frames, Some(1));

        let resp = app.clone().oneshot(get("/stream")).await.unwrap();
        let mut pieces = resp.into_body().into_data_stream();
        pieces.next().await.unwrap().unwrap();

        let capture = tokio::spawn(app.oneshot(get("/capture")));
        while let Some(piece) = pieces.next().await {
            piece.unwrap();
        }

        let resp = capture.await.unwrap().unwrap();
        assert_eq!(resp.status(), StatusCode::OK);
    }
}

use bytes::Bytes;

/// Encoding of the bytes carried by a [`Capture`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FrameFormat {
    Jpeg,
    /// Anything the sensor produced that does not start with a JPEG SOI marker.
    Unknown,
}

const JPEG_SOI: [u8; 2] = [0xFF, 0xD8];

impl FrameFormat {
    /// Detect the format from the leading bytes of the payload.
    pub fn sniff(data: &[u8]) -> Self {
        if data.starts_with(&JPEG_SOI) {
            FrameFormat::Jpeg
        } else {
            FrameFormat::Unknown
        }
    }

    pub fn mime(&self) -> &'static str {
        match self {
            FrameFormat::Jpeg => "image/jpeg",
            FrameFormat::Unknown => "application/octet-stream",
        }
    }
}

/// One compressed image as produced by a sensor, with its metadata.
///
/// The payload is immutable once captured.
#[derive(Debug, Clone)]
pub struct Capture {
    pub data: Bytes,
    pub width: u32,
    pub height: u32,
    pub format: FrameFormat,
    /// Wall-clock capture time, Unix millis.
    pub captured_at_ms: i64,
}

impl Capture {
    pub fn new(data: impl Into<Bytes>, width: u32, height: u32) -> Self {
        let data = data.into();
        let format = FrameFormat::sniff(&data);
        Self {
            data,
            width,
            height,
            format,
            captured_at_ms: chrono::Utc::now().timestamp_millis(),
        }
    }

    pub fn len(&self) -> usize {
        self.data.len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }
}

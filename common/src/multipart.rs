//! `multipart/form-data` body for a single image part.
//!
//! Layout, byte for byte:
//!
//! ```text
//! --{boundary}\r\n
//! Content-Disposition: form-data; name="{field}"; filename="{filename}"\r\n
//! Content-Type: image/jpeg\r\n
//! \r\n
//! {payload}\r\n
//! --{boundary}--\r\n
//! ```

pub const DEFAULT_BOUNDARY: &str = "------------------------abcd1234";

#[derive(Debug, Clone)]
pub struct MultipartForm {
    boundary: String,
    field_name: String,
    filename: String,
}

impl MultipartForm {
    pub fn new(boundary: impl Into<String>) -> Self {
        Self {
            boundary: boundary.into(),
            field_name: "image".into(),
            filename: "cam.jpg".into(),
        }
    }

    pub fn with_field(mut self, field_name: impl Into<String>, filename: impl Into<String>) -> Self {
        self.field_name = field_name.into();
        self.filename = filename.into();
        self
    }

    pub fn boundary(&self) -> &str {
        &self.boundary
    }

    /// Value for the request's `Content-Type` header.
    pub fn content_type(&self) -> String {
        format!("multipart/form-data; boundary={}", self.boundary)
    }

    pub fn head(&self) -> String {
        format!(
            "--{}\r\nContent-Disposition: form-data; name=\"{}\"; filename=\"{}\"\r\nContent-Type: image/jpeg\r\n\r\n",
            self.boundary, self.field_name, self.filename
        )
    }

    pub fn tail(&self) -> String {
        format!("\r\n--{}--\r\n", self.boundary)
    }

    /// Total body length for a payload of `payload_len` bytes.
    pub fn encoded_len(&self, payload_len: usize) -> usize {
        self.head().len() + payload_len + self.tail().len()
    }

    /// Build the complete body around `payload`.
    ///
    /// The buffer is reserved up front at exactly `encoded_len` bytes; an
    /// allocation failure is reported instead of aborting.
    pub fn encode(&self, payload: &[u8]) -> Result<Vec<u8>, MultipartError> {
        let delimiter = format!("--{}", self.boundary);
        if find_subsequence(payload, delimiter.as_bytes()).is_some() {
            return Err(MultipartError::BoundaryInPayload);
        }

        let head = self.head();
        let tail = self.tail();
        let total = head.len() + payload.len() + tail.len();

        let mut body = Vec::new();
        body.try_reserve_exact(total)
            .map_err(|_| MultipartError::Allocation(total))?;
        body.extend_from_slice(head.as_bytes());
        body.extend_from_slice(payload);
        body.extend_from_slice(tail.as_bytes());
        Ok(body)
    }
}

impl Default for MultipartForm {
    fn default() -> Self {
        Self::new(DEFAULT_BOUNDARY)
    }
}

#[derive(Debug, thiserror::Error)]
pub enum MultipartError {
    #[error("failed to allocate {0} bytes for multipart body")]
    Allocation(usize),
    #[error("payload contains the multipart boundary delimiter")]
    BoundaryInPayload,
}

/// Find the position of `needle` in `haystack`.
fn find_subsequence(haystack: &[u8], needle: &[u8]) -> Option<usize> {
    if needle.is_empty() || haystack.len() < needle.len() {
        return None;
    }
    haystack
        .windows(needle.len())
        .position(|window| window == needle)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn exact_body_for_small_frame() {
        let form = MultipartForm::new("B");
        let body = form.encode(b"abcd").unwrap();
        assert_eq!(
            body,
            b"--B\r\nContent-Disposition: form-data; name=\"image\"; filename=\"cam.jpg\"\r\nContent-Type: image/jpeg\r\n\r\nabcd\r\n--B--\r\n"
        );
    }

    #[test]
    fn length_is_head_plus_payload_plus_tail() {
        let form = MultipartForm::default();
        for size in [0usize, 1, 100, 4096] {
            let payload = vec![0x5Au8; size];
            let body = form.encode(&payload).unwrap();
            assert_eq!(body.len(), form.head().len() + size + form.tail().len());
            assert_eq!(body.len(), form.encoded_len(size));
        }
    }

    #[test]
    fn empty_payload_is_still_framed() {
        let form = MultipartForm::new("B");
        let body = form.encode(&[]).unwrap();
        let text = String::from_utf8(body).unwrap();
        assert!(text.starts_with("--B\r\n"));
        assert!(text.contains("\r\n\r\n\r\n--B--\r\n"));
        assert!(text.ends_with("--B--\r\n"));
    }

    #[test]
    fn custom_field_and_content_type() {
        let form = MultipartForm::new("xyz").with_field("photo", "snap.jpg");
        assert_eq!(form.content_type(), "multipart/form-data; boundary=xyz");
        assert!(form.head().contains("name=\"photo\"; filename=\"snap.jpg\""));
    }

    #[test]
    fn rejects_payload_containing_delimiter() {
        let form = MultipartForm::new("B");
        let err = form.encode(b"\xFF\xD8--B\xFF\xD9").unwrap_err();
        assert!(matches!(err, MultipartError::BoundaryInPayload));
    }
}

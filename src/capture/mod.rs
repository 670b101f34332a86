mod file_source;

use std::{
    future::Future,
    io::Cursor,
    pin::Pin,
    sync::{
        atomic::{AtomicUsize, Ordering},
        Arc,
    },
};

use base64::{engine::general_purpose::STANDARD, Engine as _};
use image::{DynamicImage, ImageFormat};
use log::debug;

use crate::error::CaptureError;

pub use file_source::FileCaptureSource;

pub type CaptureFuture<'a> =
    Pin<Box<dyn Future<Output = Result<ImagePayload, CaptureError>> + Send + 'a>>;

/// Supplier of camera frames. Dropping the returned future abandons the
/// request and must release whatever device it holds.
pub trait CaptureSource: Send + Sync {
    fn request_image(&self) -> CaptureFuture<'_>;
}

/// A captured frame as a `data:<mime>;base64,<body>` URL.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ImagePayload(String);

impl ImagePayload {
    /// Validates the data URL envelope; the image body is not decoded.
    pub fn from_data_url(data_url: impl Into<String>) -> Result<Self, CaptureError> {
        let data_url = data_url.into();
        let (header, body) = data_url
            .split_once(',')
            .ok_or_else(|| CaptureError::InvalidPayload("missing data URL separator".into()))?;

        let mime = header
            .strip_prefix("data:")
            .and_then(|rest| rest.strip_suffix(";base64"))
            .ok_or_else(|| {
                CaptureError::InvalidPayload(format!("unsupported data URL header '{header}'"))
            })?;
        if !mime.starts_with("image/") {
            return Err(CaptureError::InvalidPayload(format!(
                "expected an image, got '{mime}'"
            )));
        }
        if body.is_empty() {
            return Err(CaptureError::InvalidPayload("empty image body".into()));
        }

        Ok(Self(data_url))
    }

    /// Decodes any format `image` understands and re-encodes it as PNG.
    pub fn from_image_bytes(bytes: &[u8]) -> Result<Self, CaptureError> {
        let frame = image::load_from_memory(bytes)
            .map_err(|err| CaptureError::InvalidPayload(err.to_string()))?;
        Self::from_image(&frame)
    }

    pub fn from_image(frame: &DynamicImage) -> Result<Self, CaptureError> {
        let mut buf = Cursor::new(Vec::new());
        frame
            .write_to(&mut buf, ImageFormat::Png)
            .map_err(|err| CaptureError::InvalidPayload(err.to_string()))?;

        Ok(Self(format!(
            "data:image/png;base64,{}",
            STANDARD.encode(buf.into_inner())
        )))
    }

    pub fn as_data_url(&self) -> &str {
        &self.0
    }

    pub fn mime_type(&self) -> &str {
        self.0
            .strip_prefix("data:")
            .and_then(|rest| rest.split(';').next())
            .unwrap_or_default()
    }

    pub fn decode(&self) -> Result<DynamicImage, CaptureError> {
        let body = self
            .0
            .split_once(',')
            .map(|(_, body)| body)
            .unwrap_or_default();
        let bytes = STANDARD
            .decode(body)
            .map_err(|err| CaptureError::InvalidPayload(err.to_string()))?;
        image::load_from_memory(&bytes).map_err(|err| CaptureError::InvalidPayload(err.to_string()))
    }
}

/// Scoped hold on a capture device; released on drop.
pub struct DeviceLease {
    label: String,
    active: Arc<AtomicUsize>,
}

impl DeviceLease {
    pub fn acquire(label: impl Into<String>, active: Arc<AtomicUsize>) -> Self {
        let label = label.into();
        active.fetch_add(1, Ordering::SeqCst);
        debug!("Capture device acquired: {label}");
        Self { label, active }
    }
}

impl Drop for DeviceLease {
    fn drop(&mut self) {
        self.active.fetch_sub(1, Ordering::SeqCst);
        debug!("Capture device released: {}", self.label);
    }
}

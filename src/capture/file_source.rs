use std::{
    io::ErrorKind,
    path::PathBuf,
    sync::{
        atomic::{AtomicUsize, Ordering},
        Arc,
    },
    time::Duration,
};

use crate::error::CaptureError;

use super::{CaptureFuture, CaptureSource, DeviceLease, ImagePayload};

/// Treats an image file as the camera: each request holds the "device" for
/// the warm-up period, then reads and re-encodes the file's current contents.
pub struct FileCaptureSource {
    path: PathBuf,
    warmup: Duration,
    active: Arc<AtomicUsize>,
}

impl FileCaptureSource {
    pub fn new(path: impl Into<PathBuf>, warmup: Duration) -> Self {
        Self {
            path: path.into(),
            warmup,
            active: Arc::new(AtomicUsize::new(0)),
        }
    }

    /// Number of requests currently holding the device.
    pub fn active_leases(&self) -> usize {
        self.active.load(Ordering::SeqCst)
    }
}

impl CaptureSource for FileCaptureSource {
    fn request_image(&self) -> CaptureFuture<'_> {
        Box::pin(async move {
            let _lease = DeviceLease::acquire(self.path.display().to_string(), self.active.clone());

            if !self.warmup.is_zero() {
                tokio::time::sleep(self.warmup).await;
            }

            let bytes = tokio::fs::read(&self.path).await.map_err(|err| {
                let detail = format!("{}: {err}", self.path.display());
                match err.kind() {
                    ErrorKind::PermissionDenied => CaptureError::PermissionDenied(detail),
                    _ => CaptureError::DeviceUnavailable(detail),
                }
            })?;

            ImagePayload::from_image_bytes(&bytes)
        })
    }
}

#[cfg(test)]
mod tests {
    use image::{DynamicImage, GrayImage, ImageFormat};

    use super::*;

    fn write_frame(dir: &tempfile::TempDir) -> PathBuf {
        let path = dir.path().join("frame.png");
        DynamicImage::ImageLuma8(GrayImage::from_pixel(4, 4, image::Luma([128])))
            .save_with_format(&path, ImageFormat::Png)
            .unwrap();
        path
    }

    #[tokio::test]
    async fn reads_frame_from_disk() {
        let dir = tempfile::tempdir().unwrap();
        let source = FileCaptureSource::new(write_frame(&dir), Duration::ZERO);

        let payload = source.request_image().await.unwrap();
        assert_eq!(payload.mime_type(), "image/png");
        assert_eq!(source.active_leases(), 0);
    }

    #[tokio::test]
    async fn missing_file_reports_device_error() {
        let dir = tempfile::tempdir().unwrap();
        let source = FileCaptureSource::new(dir.path().join("absent.png"), Duration::ZERO);

        let err = source.request_image().await.unwrap_err();
        assert!(matches!(err, CaptureError::DeviceUnavailable(_)));
        assert_eq!(source.active_leases(), 0);
    }

    #[tokio::test]
    async fn dropping_request_releases_device() {
        let dir = tempfile::tempdir().unwrap();
        let source = FileCaptureSource::new(write_frame(&dir), Duration::from_secs(60));

        let pending = tokio::time::timeout(Duration::from_millis(20), source.request_image()).await;
        assert!(pending.is_err());
        assert_eq!(source.active_leases(), 0);
    }
}

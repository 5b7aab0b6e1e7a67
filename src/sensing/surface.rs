use std::{io::Cursor, path::PathBuf, sync::Arc};

use chrono::{DateTime, Utc};
use image::{codecs::jpeg::JpegEncoder, DynamicImage};

use crate::error::MonitorError;
use crate::models::SampledFrame;

/// Source of the currently rendered video frame.
pub trait VideoSurface: Send + Sync {
    fn grab(&self) -> Result<DynamicImage, MonitorError>;
}

/// Re-reads one image file on every grab. Lets a host feed frames by
/// overwriting the file.
pub struct StillImageSurface {
    path: PathBuf,
}

impl StillImageSurface {
    pub fn new(path: PathBuf) -> Self {
        Self { path }
    }
}

impl VideoSurface for StillImageSurface {
    fn grab(&self) -> Result<DynamicImage, MonitorError> {
        image::open(&self.path).map_err(|err| {
            MonitorError::capture(format!("failed to read {}: {err}", self.path.display()))
        })
    }
}

/// No video element attached yet; every grab fails.
#[derive(Debug, Default)]
pub struct UnavailableSurface;

impl VideoSurface for UnavailableSurface {
    fn grab(&self) -> Result<DynamicImage, MonitorError> {
        Err(MonitorError::capture("no video surface attached"))
    }
}

pub struct FrameSampler {
    surface: Arc<dyn VideoSurface>,
    quality: u8,
}

impl FrameSampler {
    pub fn new(surface: Arc<dyn VideoSurface>, quality: u8) -> Self {
        Self {
            surface,
            quality: quality.clamp(1, 100),
        }
    }

    /// Grabs the current frame and encodes it as JPEG at the configured
    /// quality. A zero-sized frame is a capture failure.
    pub fn sample(&self, now: DateTime<Utc>) -> Result<SampledFrame, MonitorError> {
        let frame = self.surface.grab()?;
        if frame.width() == 0 || frame.height() == 0 {
            return Err(MonitorError::capture("video surface has zero dimensions"));
        }

        let rgb = frame.to_rgb8();
        let mut payload = Vec::new();
        JpegEncoder::new_with_quality(&mut Cursor::new(&mut payload), self.quality)
            .encode_image(&rgb)
            .map_err(|err| MonitorError::capture(format!("jpeg encoding failed: {err}")))?;

        Ok(SampledFrame {
            payload,
            captured_at: now,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::{ImageBuffer, Rgb};

    struct Solid {
        width: u32,
        height: u32,
    }

    impl VideoSurface for Solid {
        fn grab(&self) -> Result<DynamicImage, MonitorError> {
            let buffer = ImageBuffer::from_pixel(self.width, self.height, Rgb([40u8, 90, 200]));
            Ok(DynamicImage::ImageRgb8(buffer))
        }
    }

    #[test]
    fn encodes_jpeg_payload() {
        let sampler = FrameSampler::new(Arc::new(Solid { width: 32, height: 24 }), 80);
        let now = Utc::now();
        let frame = sampler.sample(now).expect("frame should encode");

        assert_eq!(frame.captured_at, now);
        // JPEG SOI marker.
        assert_eq!(&frame.payload[..2], &[0xFF, 0xD8]);
    }

    #[test]
    fn zero_sized_frame_is_a_capture_error() {
        let sampler = FrameSampler::new(Arc::new(Solid { width: 0, height: 0 }), 80);
        assert!(matches!(
            sampler.sample(Utc::now()),
            Err(MonitorError::Capture(_))
        ));
    }

    #[test]
    fn unavailable_surface_fails() {
        let sampler = FrameSampler::new(Arc::new(UnavailableSurface), 80);
        assert!(sampler.sample(Utc::now()).is_err());
    }
}

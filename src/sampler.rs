//! Display-frame capture.

use image::codecs::jpeg::JpegEncoder;
use image::imageops::FilterType;
use image::DynamicImage;

use crate::video::VideoSurface;

/// One captured display frame, JPEG-encoded at the display size. Dropped
/// after the transmission attempt; nothing retains sample history.
#[derive(Clone, Debug)]
pub struct FrameSample {
    pub jpeg: Vec<u8>,
    pub width: u32,
    pub height: u32,
}

/// Scales the surface's current frame to the displayed rect and encodes it.
pub struct FrameSampler {
    quality: u8,
}

impl FrameSampler {
    pub fn new(quality: u8) -> Self {
        Self { quality }
    }

    /// A zero-area rect or a surface with no frame yields no sample; that is
    /// a skipped tick, not an error.
    pub fn sample(&self, surface: &VideoSurface) -> Option<FrameSample> {
        let rect = surface.rect();
        if rect.is_empty() {
            return None;
        }
        let frame = surface.current_frame()?;

        let scaled = if frame.width() == rect.w && frame.height() == rect.h {
            frame.clone()
        } else {
            image::imageops::resize(frame, rect.w, rect.h, FilterType::Triangle)
        };
        let rgb = DynamicImage::ImageRgba8(scaled).into_rgb8();

        let mut jpeg = Vec::new();
        let mut encoder = JpegEncoder::new_with_quality(&mut jpeg, self.quality);
        match encoder.encode_image(&rgb) {
            Ok(()) => Some(FrameSample {
                jpeg,
                width: rect.w,
                height: rect.h,
            }),
            Err(err) => {
                log::warn!("frame encode failed: {}", err);
                None
            }
        }
    }
}

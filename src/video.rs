//! Video surface and playback timeline models.

use anyhow::{Context, Result};
use image::RgbaImage;

/// Displayed size of the video element, in display pixels.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct SurfaceRect {
    pub w: u32,
    pub h: u32,
}

impl SurfaceRect {
    pub fn new(w: u32, h: u32) -> Self {
        Self { w, h }
    }

    pub fn is_empty(&self) -> bool {
        self.w == 0 || self.h == 0
    }
}

/// A buffered span of media time, in seconds.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct BufferedRange {
    pub start: f64,
    pub end: f64,
}

/// Playback timeline as the live-edge tracker sees it.
pub trait MediaTimeline {
    fn position(&self) -> f64;
    fn buffered(&self) -> &[BufferedRange];
    fn seek(&mut self, position: f64);
}

/// Owned timeline state. The media engine glue writes into it; tests set it
/// up directly.
#[derive(Debug, Default)]
pub struct PlaybackTimeline {
    position: f64,
    ranges: Vec<BufferedRange>,
}

impl PlaybackTimeline {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_position(&mut self, position: f64) {
        self.position = position;
    }

    pub fn set_ranges(&mut self, ranges: Vec<BufferedRange>) {
        self.ranges = ranges;
    }

    pub fn push_range(&mut self, start: f64, end: f64) {
        self.ranges.push(BufferedRange { start, end });
    }

    pub fn clear(&mut self) {
        self.position = 0.0;
        self.ranges.clear();
    }
}

impl MediaTimeline for PlaybackTimeline {
    fn position(&self) -> f64 {
        self.position
    }

    fn buffered(&self) -> &[BufferedRange] {
        &self.ranges
    }

    fn seek(&mut self, position: f64) {
        self.position = position;
    }
}

/// The operator-facing video surface: current decoded frame, display size,
/// and the playback timeline for adaptive streams.
pub struct VideoSurface {
    rect: SurfaceRect,
    frame: Option<RgbaImage>,
    timeline: PlaybackTimeline,
}

impl VideoSurface {
    pub fn new(rect: SurfaceRect) -> Self {
        Self {
            rect,
            frame: None,
            timeline: PlaybackTimeline::new(),
        }
    }

    pub fn rect(&self) -> SurfaceRect {
        self.rect
    }

    /// Track a display resize. The next sampler tick picks it up.
    pub fn set_rect(&mut self, rect: SurfaceRect) {
        self.rect = rect;
    }

    pub fn present_frame(&mut self, frame: RgbaImage) {
        self.frame = Some(frame);
    }

    /// Decode and present one JPEG frame from a push stream.
    pub fn present_jpeg(&mut self, bytes: &[u8]) -> Result<()> {
        let decoded = image::load_from_memory(bytes).context("decode stream frame")?;
        self.frame = Some(decoded.to_rgba8());
        Ok(())
    }

    pub fn current_frame(&self) -> Option<&RgbaImage> {
        self.frame.as_ref()
    }

    pub fn has_frame(&self) -> bool {
        self.frame.is_some()
    }

    /// Drop the source: no frame, timeline reset.
    pub fn clear(&mut self) {
        self.frame = None;
        self.timeline.clear();
    }

    pub fn timeline(&self) -> &PlaybackTimeline {
        &self.timeline
    }

    pub fn timeline_mut(&mut self) -> &mut PlaybackTimeline {
        &mut self.timeline
    }
}

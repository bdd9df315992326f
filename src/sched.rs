//! Detection loop scheduling.
//!
//! One tick: capture the displayed frame, round-trip the detector, redraw
//! the overlay. The next tick is armed only after the work completes, so a
//! slow detector lowers the achieved rate instead of queueing requests.
//! The status poller keeps its own fixed-interval timer; the two cadences
//! are deliberately different.

use std::time::{Duration, Instant};

use crate::config::DisplaySettings;
use crate::detect::{DetectOutcome, DetectionClient};
use crate::overlay::OverlayRenderer;
use crate::sampler::FrameSampler;
use crate::transport::HttpClient;
use crate::video::VideoSurface;

/// What one tick did.
#[derive(Clone, Debug, PartialEq)]
pub struct TickReport {
    pub sampled: bool,
    pub boxes: usize,
    pub detect_failed: bool,
    /// Instantaneous rate from the previous tick; absent on the first.
    pub fps: Option<f64>,
}

pub struct DetectionLoop {
    interval: Duration,
    sampler: FrameSampler,
    overlay: OverlayRenderer,
    detector: DetectionClient,
    running: bool,
    generation: u64,
    next_tick: Option<(u64, Instant)>,
    last_tick_at: Option<Instant>,
}

impl DetectionLoop {
    pub fn new(display: &DisplaySettings, detector: DetectionClient) -> Self {
        let fps = display.target_fps.max(1);
        Self {
            interval: Duration::from_millis((1000 / fps).max(1) as u64),
            sampler: FrameSampler::new(display.jpeg_quality),
            overlay: OverlayRenderer::new(),
            detector,
            running: false,
            generation: 0,
            next_tick: None,
            last_tick_at: None,
        }
    }

    /// Arm the loop. A running loop is fully stopped first; the generation
    /// bump discards any tick still scheduled for the old run.
    pub fn start(&mut self, now: Instant) {
        self.stop();
        self.running = true;
        self.generation += 1;
        self.next_tick = Some((self.generation, now));
    }

    /// Cancel the pending tick and wipe the overlay.
    pub fn stop(&mut self) {
        self.running = false;
        self.next_tick = None;
        self.last_tick_at = None;
        self.overlay.clear();
    }

    pub fn is_running(&self) -> bool {
        self.running
    }

    pub fn overlay(&self) -> &OverlayRenderer {
        &self.overlay
    }

    /// Run one tick if its deadline has passed. Stale generations and
    /// stopped loops consume nothing.
    pub fn poll_tick(
        &mut self,
        now: Instant,
        surface: &VideoSurface,
        client: &dyn HttpClient,
    ) -> Option<TickReport> {
        let (generation, due) = self.next_tick?;
        if !self.running || generation != self.generation {
            self.next_tick = None;
            return None;
        }
        if now < due {
            return None;
        }

        // The rect read here bounds both the capture and the overlay for
        // the whole tick, even if the surface resizes mid-flight.
        let rect = surface.rect();
        self.overlay.fit_to(rect);

        let mut report = TickReport {
            sampled: false,
            boxes: 0,
            detect_failed: false,
            fps: None,
        };

        if let Some(sample) = self.sampler.sample(surface) {
            report.sampled = true;
            match self.detector.detect(client, &sample) {
                DetectOutcome::Boxes(boxes) => {
                    report.boxes = boxes.len();
                    self.overlay.render(&boxes);
                }
                DetectOutcome::Failed { reason } => {
                    report.detect_failed = true;
                    self.overlay.render(&[]);
                    log::warn!("detect failed: {}", reason);
                }
            }
        }

        if let Some(last) = self.last_tick_at {
            let delta_ms = now.duration_since(last).as_secs_f64() * 1000.0;
            if delta_ms > 0.0 {
                report.fps = Some(1000.0 / delta_ms);
            }
        }
        self.last_tick_at = Some(now);

        if self.running {
            self.next_tick = Some((self.generation, now + self.interval));
        }
        Some(report)
    }
}

//! Firewatch operator console
//!
//! This crate implements the operator-side console for a remote fire-detection
//! camera: live video monitoring, per-frame detection overlays, and status
//! polling against the camera's control endpoints.
//!
//! # Architecture
//!
//! Every component is a synchronous state machine. Nothing blocks on a timer:
//! callers hand each machine the current instant and the machine decides
//! whether work is due. The console drives them all from a single pass
//! (`Console::drive`), so ordering between reconnects, detection ticks, and
//! status polls is deterministic and testable with a manual clock.
//!
//! # Module Structure
//!
//! - `clock`: time sources and the interval timer primitive
//! - `config`: console configuration and endpoint URL construction
//! - `console`: top-level console wiring all components together
//! - `detect`: detection HTTP client and box parsing
//! - `hls`: HLS live-edge tracking and playlist liveness checks
//! - `overlay`: detection-box rendering onto the video canvas
//! - `peer`: peer-connection signaling and session lifecycle
//! - `poller`: periodic camera/fire status polling
//! - `sampler`: frame capture and JPEG encoding for detection
//! - `sched`: the per-frame capture/detect/render loop
//! - `stream`: push-stream lifecycle with reconnect backoff
//! - `transport`: HTTP client seam and MJPEG stream decoding
//! - `video`: video surface, playback timeline, and buffered ranges

use std::collections::VecDeque;
use std::sync::OnceLock;

use anyhow::{anyhow, Result};

pub mod clock;
pub mod config;
pub mod console;
pub mod detect;
pub mod hls;
pub mod overlay;
pub mod peer;
pub mod poller;
pub mod sampler;
pub mod sched;
pub mod stream;
pub mod transport;
pub mod video;

pub use clock::{Clock, IntervalTimer, ManualClock, MonotonicClock};
pub use config::{ConsoleConfig, DisplaySettings, Endpoints, PortSettings};
pub use console::{Console, Mode};
pub use detect::{DetectOutcome, DetectionBox, DetectionClient};
pub use hls::{HlsPlayer, HlsSettings, LagReport, LiveEdgeTracker, Liveness};
pub use overlay::OverlayRenderer;
pub use peer::{IceServer, IceUrls, PeerLink, PeerPhase, PeerSession, StubPeerLink};
pub use poller::{CameraStatus, FireStatus, StatusPoller, Uptime};
pub use sampler::{FrameSample, FrameSampler};
pub use sched::{DetectionLoop, TickReport};
pub use stream::{StreamDirective, StreamSession, StreamState};
pub use transport::{
    fetch_json, FetchBody, HttpClient, MjpegStream, PushEvent, PushStreamPump, UreqClient,
};
pub use video::{BufferedRange, MediaTimeline, PlaybackTimeline, SurfaceRect, VideoSurface};

// -------------------- Operator Log --------------------

/// Number of log lines retained for the on-screen scrollback.
pub const OPERATOR_LOG_CAPACITY: usize = 200;

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct LogLine {
    pub at_unix_ms: u64,
    pub message: String,
}

/// Bounded scrollback of operator-facing messages. Every line is mirrored to
/// the process log so headless runs keep the same trace.
pub struct OperatorLog {
    lines: VecDeque<LogLine>,
}

impl OperatorLog {
    pub fn new() -> Self {
        Self {
            lines: VecDeque::with_capacity(OPERATOR_LOG_CAPACITY),
        }
    }

    pub fn note(&mut self, at_unix_ms: u64, message: impl Into<String>) {
        let message = message.into();
        log::info!("{}", message);
        if self.lines.len() == OPERATOR_LOG_CAPACITY {
            self.lines.pop_front();
        }
        self.lines.push_back(LogLine {
            at_unix_ms,
            message,
        });
    }

    pub fn lines(&self) -> impl Iterator<Item = &LogLine> {
        self.lines.iter()
    }

    pub fn last(&self) -> Option<&LogLine> {
        self.lines.back()
    }

    pub fn len(&self) -> usize {
        self.lines.len()
    }

    pub fn is_empty(&self) -> bool {
        self.lines.is_empty()
    }
}

impl Default for OperatorLog {
    fn default() -> Self {
        Self::new()
    }
}

// -------------------- Stats Panel --------------------

/// Live numbers shown beside the video surface.
#[derive(Clone, Debug, PartialEq)]
pub struct StatsPanel {
    /// Display loop rate measured between detection ticks.
    pub fps: Option<f64>,
    /// Distance behind the HLS live edge at the last fragment.
    pub live_lag_ms: Option<f64>,
    /// Wall-clock time of the last completed detection pass.
    pub last_detection_ms: Option<u64>,
    /// Human label for the active playback mode.
    pub mode_label: String,
}

impl StatsPanel {
    pub fn reset(&mut self) {
        *self = StatsPanel::default();
    }
}

impl Default for StatsPanel {
    fn default() -> Self {
        Self {
            fps: None,
            live_lag_ms: None,
            last_detection_ms: None,
            mode_label: "idle".to_string(),
        }
    }
}

// -------------------- Stream Name Discipline --------------------

/// Stream names are appended to feed URLs, so we enforce a positive allowlist
/// rather than trying to escape anything.
///
/// Allowed: "stream", "cam_2", "north-gate"
/// Disallowed: empty names, leading punctuation, slashes, whitespace.
pub fn validate_stream_name(name: &str) -> Result<()> {
    static STREAM_NAME_RE: OnceLock<regex::Regex> = OnceLock::new();
    let re = STREAM_NAME_RE
        .get_or_init(|| regex::Regex::new(r"^[A-Za-z0-9][A-Za-z0-9_-]{0,63}$").unwrap());

    if !re.is_match(name) {
        return Err(anyhow!(
            "stream name must match ^[A-Za-z0-9][A-Za-z0-9_-]{{0,63}}$"
        ));
    }
    Ok(())
}

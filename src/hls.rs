//! Adaptive-stream playback: live-edge tracking and playlist probing.
//!
//! The media engine itself is opaque; this module owns the policy around
//! it. Whenever a fragment lands, playback lag against the newest buffered
//! end is measured and, past one second, position jumps to just short of
//! the edge. Buffer stalls recover the same way. Engine errors are logged
//! once and left to the operator.

use std::sync::OnceLock;

use crate::transport::HttpClient;
use crate::video::MediaTimeline;

const MAX_LIVE_LAG_S: f64 = 1.0;
const LIVE_EDGE_HOLDOFF_S: f64 = 0.1;

/// Engine tuning handed to the playback engine on load.
#[derive(Clone, Debug)]
pub struct HlsSettings {
    pub low_latency_mode: bool,
    pub back_buffer_s: f64,
    pub max_live_sync_playback_rate: f64,
}

impl Default for HlsSettings {
    fn default() -> Self {
        Self {
            low_latency_mode: true,
            back_buffer_s: 0.0,
            max_live_sync_playback_rate: 1.5,
        }
    }
}

/// Distance from the live edge after a fragment buffered.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct LagReport {
    pub lag_ms: f64,
    /// Whether the position was forced back to the edge.
    pub resynced: bool,
}

/// Live-edge policy. Holds no state; lag is recomputed per event.
pub struct LiveEdgeTracker;

impl LiveEdgeTracker {
    /// Measure lag against the newest buffered range and resync when more
    /// than a second behind. No buffered range means nothing to do.
    pub fn on_fragment_buffered(timeline: &mut dyn MediaTimeline) -> Option<LagReport> {
        let edge = timeline.buffered().last()?.end;
        let lag_s = edge - timeline.position();
        let resynced = lag_s > MAX_LIVE_LAG_S;
        if resynced {
            timeline.seek(edge - LIVE_EDGE_HOLDOFF_S);
        }
        Some(LagReport {
            lag_ms: lag_s * 1000.0,
            resynced,
        })
    }

    /// A stalled buffer jumps to the end of the first buffered range; this
    /// is recoverable, unlike engine errors.
    pub fn on_buffer_stalled(timeline: &mut dyn MediaTimeline) -> Option<f64> {
        let target = timeline.buffered().first()?.end - LIVE_EDGE_HOLDOFF_S;
        timeline.seek(target);
        Some(target)
    }
}

/// Playback facade over the embedded media engine.
pub struct HlsPlayer {
    settings: HlsSettings,
    source: Option<String>,
    last_lag_ms: Option<f64>,
}

impl HlsPlayer {
    pub fn new(settings: HlsSettings) -> Self {
        Self {
            settings,
            source: None,
            last_lag_ms: None,
        }
    }

    pub fn settings(&self) -> &HlsSettings {
        &self.settings
    }

    pub fn load(&mut self, url: &str) {
        self.source = Some(url.to_string());
        self.last_lag_ms = None;
    }

    pub fn source(&self) -> Option<&str> {
        self.source.as_deref()
    }

    pub fn last_lag_ms(&self) -> Option<f64> {
        self.last_lag_ms
    }

    pub fn on_fragment_buffered(&mut self, timeline: &mut dyn MediaTimeline) -> Option<LagReport> {
        let report = LiveEdgeTracker::on_fragment_buffered(timeline)?;
        self.last_lag_ms = Some(report.lag_ms);
        Some(report)
    }

    pub fn on_buffer_stalled(&mut self, timeline: &mut dyn MediaTimeline) -> Option<f64> {
        LiveEdgeTracker::on_buffer_stalled(timeline)
    }

    /// Engine errors are not auto-retried; the operator re-plays.
    pub fn on_engine_error(&self, detail: &str) {
        log::error!("hls engine error: {}", detail);
    }

    pub fn destroy(&mut self) {
        self.source = None;
        self.last_lag_ms = None;
    }
}

/// Result of a playlist self-test.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Liveness {
    SegmentsPresent { segments: usize },
    NoSegments,
    Unreachable { reason: String },
}

/// Fetch the playlist and classify it by segment markers.
pub fn playlist_liveness(client: &dyn HttpClient, url: &str) -> Liveness {
    static EXTINF_RE: OnceLock<regex::Regex> = OnceLock::new();
    let re = EXTINF_RE.get_or_init(|| regex::Regex::new(r"(?m)^#EXTINF:").unwrap());

    match client.get(url) {
        Ok(response) if response.is_success() => {
            let segments = re.find_iter(&response.text()).count();
            if segments > 0 {
                Liveness::SegmentsPresent { segments }
            } else {
                Liveness::NoSegments
            }
        }
        Ok(response) => Liveness::Unreachable {
            reason: format!("status {}", response.status),
        },
        Err(err) => Liveness::Unreachable {
            reason: err.to_string(),
        },
    }
}

//! Top-level operator console.
//!
//! Owns the video surface and every playback machine, and enforces the one
//! structural invariant of the console: at most one source drives the
//! surface. Starting any mode tears the previous one down completely before
//! anything new is wired up, so overlays, timers, and reconnect state can
//! never leak across modes.

use anyhow::Result;

use crate::clock::Clock;
use crate::config::{ConsoleConfig, Endpoints};
use crate::detect::{self, DetectionClient};
use crate::hls::{self, HlsPlayer, HlsSettings, Liveness};
use crate::peer::{PeerLink, PeerSession, StubPeerLink};
use crate::poller::StatusPoller;
use crate::sched::DetectionLoop;
use crate::stream::{StreamDirective, StreamSession, StreamState};
use crate::transport::{HttpClient, PushEvent, PushStreamPump};
use crate::video::{SurfaceRect, VideoSurface};
use crate::{validate_stream_name, OperatorLog, StatsPanel};

const DEFAULT_SURFACE: SurfaceRect = SurfaceRect { w: 640, h: 480 };

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Mode {
    Idle,
    Hls,
    Peer,
    Cctv,
}

impl Mode {
    pub fn label(&self) -> &'static str {
        match self {
            Mode::Idle => "idle",
            Mode::Hls => "hls",
            Mode::Peer => "peer",
            Mode::Cctv => "cctv",
        }
    }
}

pub struct Console {
    config: ConsoleConfig,
    endpoints: Endpoints,
    surface: VideoSurface,
    detection: DetectionLoop,
    detect_enabled: bool,
    hls: HlsPlayer,
    peer: PeerSession,
    stream: StreamSession,
    poller: StatusPoller,
    stats: StatsPanel,
    log: OperatorLog,
    mode: Mode,
    feed: Option<(String, PushStreamPump)>,
}

impl Console {
    pub fn new(config: ConsoleConfig) -> Self {
        Self::with_peer_link(config, Box::new(StubPeerLink::new()))
    }

    /// Build with a real media-engine link instead of the stub.
    pub fn with_peer_link(config: ConsoleConfig, link: Box<dyn PeerLink>) -> Self {
        let endpoints = config.endpoints();
        let detection = DetectionLoop::new(
            &config.display,
            DetectionClient::new(endpoints.detect(), config.camera_id.clone()),
        );
        let peer = PeerSession::new(endpoints.offer(), config.camera_id.clone(), link);
        let stream = StreamSession::new(endpoints.clone());
        let poller = StatusPoller::new(&endpoints, config.display.poll_interval);
        Self {
            config,
            endpoints,
            surface: VideoSurface::new(DEFAULT_SURFACE),
            detection,
            detect_enabled: false,
            hls: HlsPlayer::new(HlsSettings::default()),
            peer,
            stream,
            poller,
            stats: StatsPanel::default(),
            log: OperatorLog::new(),
            mode: Mode::Idle,
            feed: None,
        }
    }

    pub fn config(&self) -> &ConsoleConfig {
        &self.config
    }

    pub fn endpoints(&self) -> &Endpoints {
        &self.endpoints
    }

    pub fn mode(&self) -> Mode {
        self.mode
    }

    pub fn stats(&self) -> &StatsPanel {
        &self.stats
    }

    pub fn log(&self) -> &OperatorLog {
        &self.log
    }

    pub fn surface(&self) -> &VideoSurface {
        &self.surface
    }

    /// Engine glue writes frames and timeline updates through here.
    pub fn surface_mut(&mut self) -> &mut VideoSurface {
        &mut self.surface
    }

    pub fn set_surface_rect(&mut self, rect: SurfaceRect) {
        self.surface.set_rect(rect);
    }

    pub fn poller(&self) -> &StatusPoller {
        &self.poller
    }

    pub fn hls(&self) -> &HlsPlayer {
        &self.hls
    }

    pub fn stream_state(&self) -> StreamState {
        self.stream.state()
    }

    pub fn detection_enabled(&self) -> bool {
        self.detect_enabled
    }

    // ---- lifecycle ----

    /// Tear everything down. Always leaves the console idle; logs only if
    /// something was actually running.
    pub fn stop_all(&mut self, clock: &dyn Clock) {
        let was_active = self.mode != Mode::Idle;
        self.hls.destroy();
        self.peer.stop();
        self.detection.stop();
        let _ = self.stream.stop();
        self.feed = None;
        self.poller.stop();
        self.surface.clear();
        self.stats.reset();
        self.mode = Mode::Idle;
        if was_active {
            self.log.note(clock.unix_millis(), "stopped");
        }
    }

    pub fn play_hls(&mut self, clock: &dyn Clock) {
        self.stop_all(clock);
        let url = self.endpoints.playlist();
        self.hls.load(&url);
        self.mode = Mode::Hls;
        self.stats.mode_label = Mode::Hls.label().to_string();
        self.log
            .note(clock.unix_millis(), format!("playing HLS {}", url));
        self.poller.start(clock.now());
        if self.detect_enabled {
            self.detection.start(clock.now());
        }
    }

    pub fn connect_peer(&mut self, client: &dyn HttpClient, clock: &dyn Clock) -> bool {
        self.stop_all(clock);
        if !self.peer.start(client, clock.unix_millis(), &mut self.log) {
            return false;
        }
        self.mode = Mode::Peer;
        self.stats.mode_label = Mode::Peer.label().to_string();
        self.poller.start(clock.now());
        if self.detect_enabled {
            self.detection.start(clock.now());
        }
        true
    }

    pub fn load_stream(
        &mut self,
        name: &str,
        client: &dyn HttpClient,
        clock: &dyn Clock,
    ) -> Result<()> {
        validate_stream_name(name)?;
        self.stop_all(clock);
        let directive = self.stream.load(name, clock.unix_millis(), &mut self.log);
        self.apply_directive(directive, client, clock);
        self.mode = Mode::Cctv;
        self.stats.mode_label = Mode::Cctv.label().to_string();
        self.poller.start(clock.now());
        if self.detect_enabled {
            self.detection.start(clock.now());
        }
        Ok(())
    }

    /// Toggle the overlay loop. Takes effect immediately when a mode is
    /// already running.
    pub fn set_detection_enabled(&mut self, enabled: bool, clock: &dyn Clock) {
        self.detect_enabled = enabled;
        if enabled {
            if self.mode != Mode::Idle {
                self.detection.start(clock.now());
            }
        } else {
            self.detection.stop();
        }
    }

    // ---- scheduling ----

    /// One cooperative pass: feed events, due reconnects, due status polls,
    /// due detection ticks.
    pub fn drive(&mut self, client: &dyn HttpClient, clock: &dyn Clock) {
        self.pump_feed(clock);
        let now = clock.now();
        let millis = clock.unix_millis();
        if let Some(directive) = self.stream.poll_reconnect(now, millis, &mut self.log) {
            self.apply_directive(directive, client, clock);
        }
        self.poller.poll_if_due(now, millis, client, &mut self.log);
        if let Some(report) = self.detection.poll_tick(now, &self.surface, client) {
            if report.fps.is_some() {
                self.stats.fps = report.fps;
            }
            if report.sampled && !report.detect_failed {
                self.stats.last_detection_ms = Some(millis);
            }
        }
    }

    /// Consume at most one transport event per pass so a fast feed cannot
    /// starve the other machines.
    fn pump_feed(&mut self, clock: &dyn Clock) {
        let Some((stream, pump)) = self.feed.as_ref() else {
            return;
        };
        let Some(event) = pump.try_next() else {
            return;
        };
        let stream = stream.clone();
        let now = clock.now();
        let millis = clock.unix_millis();
        match event {
            PushEvent::Frame(bytes) => {
                if self.stream.state() != StreamState::Connected {
                    self.stream.on_connected(&stream, millis, &mut self.log);
                }
                if let Err(err) = self.surface.present_jpeg(&bytes) {
                    log::warn!("dropping undecodable frame: {}", err);
                }
            }
            PushEvent::Ended => {
                self.feed = None;
                self.stream.on_ended(&stream, now, millis, &mut self.log);
            }
            PushEvent::Errored(reason) => {
                self.feed = None;
                log::warn!("stream {} transport: {}", stream, reason);
                self.stream.on_error(&stream, now, millis, &mut self.log);
            }
        }
    }

    fn apply_directive(
        &mut self,
        directive: StreamDirective,
        client: &dyn HttpClient,
        clock: &dyn Clock,
    ) {
        match directive {
            StreamDirective::Open { stream, url } => {
                self.feed = None;
                match client.open_stream(&url) {
                    Ok(reader) => {
                        self.feed = Some((stream, PushStreamPump::spawn(reader)));
                    }
                    Err(err) => {
                        let millis = clock.unix_millis();
                        self.log
                            .note(millis, format!("stream {} connect failed: {}", stream, err));
                        self.stream
                            .on_error(&stream, clock.now(), millis, &mut self.log);
                    }
                }
            }
            StreamDirective::Detach => {
                self.feed = None;
            }
        }
    }

    // ---- adaptive-stream events ----

    pub fn on_hls_fragment(&mut self, clock: &dyn Clock) {
        if self.mode != Mode::Hls {
            return;
        }
        if let Some(report) = self.hls.on_fragment_buffered(self.surface.timeline_mut()) {
            self.stats.live_lag_ms = Some(report.lag_ms);
            if report.resynced {
                self.log.note(
                    clock.unix_millis(),
                    format!("resynced to live edge (lag {:.0} ms)", report.lag_ms),
                );
            }
        }
    }

    pub fn on_hls_stall(&mut self, clock: &dyn Clock) {
        if self.mode != Mode::Hls {
            return;
        }
        if let Some(position) = self.hls.on_buffer_stalled(self.surface.timeline_mut()) {
            self.log.note(
                clock.unix_millis(),
                format!("buffer stalled; resuming at {:.1}s", position),
            );
        }
    }

    pub fn on_peer_ice_state(&mut self, state: &str, clock: &dyn Clock) {
        self.peer
            .on_ice_state(state, clock.unix_millis(), &mut self.log);
    }

    // ---- diagnostics ----

    pub fn hls_self_test(&mut self, client: &dyn HttpClient, clock: &dyn Clock) -> Liveness {
        let liveness = hls::playlist_liveness(client, &self.endpoints.playlist());
        let millis = clock.unix_millis();
        match &liveness {
            Liveness::SegmentsPresent { .. } => self.log.note(millis, "HLS OK: segments present"),
            Liveness::NoSegments => self
                .log
                .note(millis, "HLS playlist exists but no segments yet"),
            Liveness::Unreachable { reason } => self
                .log
                .note(millis, format!("HLS test failed: {}", reason)),
        }
        liveness
    }

    /// Fire the backend's one-shot test detection, then refresh the fire
    /// document so its counters show up without waiting for the next poll.
    pub fn run_detection_test(&mut self, client: &dyn HttpClient, clock: &dyn Clock) -> bool {
        let millis = clock.unix_millis();
        let ok = detect::run_detection_test(
            client,
            &self.endpoints.test_detection(),
            millis,
            &mut self.log,
        );
        self.poller.refresh_fire(client, millis, &mut self.log);
        ok
    }
}

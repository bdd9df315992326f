//! Camera status polling.
//!
//! Two documents are fetched per tick, independently: the roster/status
//! document and the fire-detection document. A failure on either side logs
//! its own line and leaves the last good value in place; it never cancels
//! the other fetch or future ticks.

use serde::Deserialize;
use std::collections::BTreeMap;
use std::time::{Duration, Instant};

use crate::clock::IntervalTimer;
use crate::config::Endpoints;
use crate::transport::{fetch_json, HttpClient};
use crate::OperatorLog;

/// Roster and health document served by the camera backend.
#[derive(Clone, Debug, Default, Deserialize)]
pub struct CameraStatus {
    #[serde(default)]
    pub camera_id: Option<String>,

    /// Stream names available for selection.
    #[serde(default)]
    pub streams: Vec<String>,

    /// Streams currently serving, keyed by name. Values are opaque.
    #[serde(default)]
    pub active_streams: BTreeMap<String, serde_json::Value>,

    #[serde(default)]
    pub uptime: Option<Uptime>,

    #[serde(default)]
    pub fire_detection_enabled: Option<bool>,
}

/// Uptime arrives as either elapsed seconds or a formatted clock string,
/// depending on the backend build.
#[derive(Clone, Debug, Deserialize, PartialEq)]
#[serde(untagged)]
pub enum Uptime {
    Seconds(f64),
    Text(String),
}

/// Fire-detection document.
#[derive(Clone, Debug, Default, Deserialize)]
pub struct FireStatus {
    #[serde(default)]
    pub fire_detected: bool,

    #[serde(default)]
    pub last_check: Option<String>,

    #[serde(default)]
    pub total_checks: Option<u64>,

    #[serde(default)]
    pub last_detection: Option<String>,

    #[serde(default)]
    pub last_ai_response: Option<String>,
}

pub struct StatusPoller {
    status_url: String,
    fire_url: String,
    timer: IntervalTimer,
    camera_id: Option<String>,
    roster: Vec<String>,
    active: Vec<String>,
    fire: FireStatus,
}

impl StatusPoller {
    pub fn new(endpoints: &Endpoints, interval: Duration) -> Self {
        Self {
            status_url: endpoints.status(),
            fire_url: endpoints.fire_status(),
            timer: IntervalTimer::new(interval),
            camera_id: None,
            roster: Vec::new(),
            active: Vec::new(),
            fire: FireStatus::default(),
        }
    }

    /// Arm the interval; the first poll is due immediately. Starting while
    /// running restarts cleanly.
    pub fn start(&mut self, now: Instant) {
        self.timer.stop();
        self.timer.start(now);
    }

    pub fn stop(&mut self) {
        self.timer.stop();
    }

    pub fn is_running(&self) -> bool {
        self.timer.is_running()
    }

    /// Run one poll if the interval elapsed. Returns whether a poll ran.
    pub fn poll_if_due(
        &mut self,
        now: Instant,
        millis: u64,
        client: &dyn HttpClient,
        log: &mut OperatorLog,
    ) -> bool {
        if !self.timer.fire_if_due(now) {
            return false;
        }
        self.fetch_status(client, millis, log);
        self.refresh_fire(client, millis, log);
        true
    }

    fn fetch_status(&mut self, client: &dyn HttpClient, millis: u64, log: &mut OperatorLog) {
        match fetch_json::<CameraStatus>(client, &self.status_url) {
            Ok(doc) => {
                // An empty roster never wipes a previously seen one.
                if !doc.streams.is_empty() {
                    self.roster = doc.streams;
                }
                self.active = doc.active_streams.keys().cloned().collect();
                if doc.camera_id.is_some() {
                    self.camera_id = doc.camera_id;
                }
            }
            Err(err) => log.note(millis, format!("status error: {}", err)),
        }
    }

    /// Re-fetch the fire document alone; also used right after a test
    /// detection is triggered.
    pub fn refresh_fire(&mut self, client: &dyn HttpClient, millis: u64, log: &mut OperatorLog) {
        match fetch_json::<FireStatus>(client, &self.fire_url) {
            Ok(doc) => self.fire = doc,
            Err(err) => log.note(millis, format!("fire status error: {}", err)),
        }
    }

    pub fn camera_id(&self) -> Option<&str> {
        self.camera_id.as_deref()
    }

    pub fn roster(&self) -> &[String] {
        &self.roster
    }

    pub fn active(&self) -> &[String] {
        &self.active
    }

    pub fn fire(&self) -> &FireStatus {
        &self.fire
    }
}

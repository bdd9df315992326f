//! Push-stream connection management.
//!
//! Tracks the one selected motion-JPEG stream and schedules reconnects with
//! exponential backoff: end-of-stream grows the delay 1.5x, transport
//! errors 2x, capped at ten seconds. Selecting a stream resets the delay to
//! one second. Pending timers carry the stream they were armed for and are
//! discarded if another stream (or none) is current when they fire, so a
//! stopped session can never reconnect from a timer already in flight.

use std::time::{Duration, Instant};

use crate::config::Endpoints;
use crate::OperatorLog;

const INITIAL_BACKOFF_MS: f64 = 1000.0;
const MAX_BACKOFF_MS: f64 = 10_000.0;
const ENDED_BACKOFF_FACTOR: f64 = 1.5;
const ERROR_BACKOFF_FACTOR: f64 = 2.0;

/// What the console should do with the transport.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum StreamDirective {
    /// Open (or reopen) the feed at this URL.
    Open { stream: String, url: String },
    /// Drop the transport and show nothing.
    Detach,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum StreamState {
    Disconnected,
    Connecting,
    Connected,
}

#[derive(Debug)]
struct PendingReconnect {
    stream: String,
    due: Instant,
}

pub struct StreamSession {
    endpoints: Endpoints,
    current: Option<String>,
    state: StreamState,
    backoff_ms: f64,
    pending: Option<PendingReconnect>,
}

impl StreamSession {
    pub fn new(endpoints: Endpoints) -> Self {
        Self {
            endpoints,
            current: None,
            state: StreamState::Disconnected,
            backoff_ms: INITIAL_BACKOFF_MS,
            pending: None,
        }
    }

    pub fn state(&self) -> StreamState {
        self.state
    }

    pub fn current(&self) -> Option<&str> {
        self.current.as_deref()
    }

    /// Delay the next failure event will schedule with, in milliseconds.
    pub fn backoff_ms(&self) -> f64 {
        self.backoff_ms
    }

    /// Select a stream: cancels any pending timer, resets backoff, and asks
    /// for a fresh connection. `millis` doubles as the cache-bust value.
    pub fn load(&mut self, stream: &str, millis: u64, log: &mut OperatorLog) -> StreamDirective {
        self.pending = None;
        self.backoff_ms = INITIAL_BACKOFF_MS;
        self.current = Some(stream.to_string());
        self.state = StreamState::Connecting;
        log.note(millis, format!("loading stream {}", stream));
        StreamDirective::Open {
            stream: stream.to_string(),
            url: self.endpoints.video_feed(stream, millis),
        }
    }

    /// First frame (or equivalent) arrived. Backoff is not reset here; only
    /// selecting a stream resets it.
    pub fn on_connected(&mut self, stream: &str, millis: u64, log: &mut OperatorLog) {
        if self.current.as_deref() != Some(stream) {
            return;
        }
        self.state = StreamState::Connected;
        log.note(millis, format!("stream {} connected", stream));
    }

    /// Feed ended cleanly; retry after the current delay, then grow it.
    pub fn on_ended(&mut self, stream: &str, now: Instant, millis: u64, log: &mut OperatorLog) {
        self.schedule_reconnect(
            stream,
            now,
            millis,
            ENDED_BACKOFF_FACTOR,
            "stream ended",
            log,
        );
    }

    /// Transport error; errors back off faster than clean ends.
    pub fn on_error(&mut self, stream: &str, now: Instant, millis: u64, log: &mut OperatorLog) {
        self.schedule_reconnect(
            stream,
            now,
            millis,
            ERROR_BACKOFF_FACTOR,
            "stream error",
            log,
        );
    }

    fn schedule_reconnect(
        &mut self,
        stream: &str,
        now: Instant,
        millis: u64,
        factor: f64,
        what: &str,
        log: &mut OperatorLog,
    ) {
        if self.current.as_deref() != Some(stream) {
            return;
        }
        self.state = StreamState::Connecting;
        let delay_ms = self.backoff_ms;
        self.pending = Some(PendingReconnect {
            stream: stream.to_string(),
            due: now + Duration::from_millis(delay_ms.round() as u64),
        });
        log.note(
            millis,
            format!(
                "{}; reconnecting in {}s...",
                what,
                (delay_ms / 1000.0).round() as u64
            ),
        );
        self.backoff_ms = (self.backoff_ms * factor).min(MAX_BACKOFF_MS);
    }

    /// Fire a due reconnect timer. Timers for a stream that is no longer
    /// current are dropped without effect.
    pub fn poll_reconnect(
        &mut self,
        now: Instant,
        millis: u64,
        log: &mut OperatorLog,
    ) -> Option<StreamDirective> {
        let due = self.pending.as_ref()?.due;
        if now < due {
            return None;
        }
        let Some(pending) = self.pending.take() else {
            return None;
        };
        if self.current.as_deref() != Some(pending.stream.as_str()) {
            return None;
        }
        self.state = StreamState::Connecting;
        log.note(millis, format!("reconnecting stream {}", pending.stream));
        Some(StreamDirective::Open {
            url: self.endpoints.video_feed(&pending.stream, millis),
            stream: pending.stream,
        })
    }

    /// Deselect. Idempotent; cancels the pending timer.
    pub fn stop(&mut self) -> StreamDirective {
        self.current = None;
        self.pending = None;
        self.state = StreamState::Disconnected;
        StreamDirective::Detach
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ConsoleConfig;
    use crate::OperatorLog;

    fn session() -> (StreamSession, OperatorLog) {
        (
            StreamSession::new(ConsoleConfig::default().endpoints()),
            OperatorLog::new(),
        )
    }

    #[test]
    fn load_opens_with_cache_bust() {
        let (mut session, mut log) = session();
        let directive = session.load("balcony_camera", 42, &mut log);
        assert_eq!(
            directive,
            StreamDirective::Open {
                stream: "balcony_camera".to_string(),
                url: "http://127.0.0.1:8080/video_feed/balcony_camera?t=42".to_string(),
            }
        );
        assert_eq!(session.state(), StreamState::Connecting);
        assert_eq!(session.backoff_ms(), 1000.0);
    }

    #[test]
    fn stale_events_do_not_schedule() {
        let (mut session, mut log) = session();
        let now = Instant::now();
        session.load("a", 0, &mut log);
        session.on_ended("b", now, 0, &mut log);
        session.on_error("b", now, 0, &mut log);
        assert!(session
            .poll_reconnect(now + Duration::from_secs(60), 0, &mut log)
            .is_none());
        assert_eq!(session.backoff_ms(), 1000.0);
    }

    #[test]
    fn stop_then_due_timer_stays_dead() {
        let (mut session, mut log) = session();
        let now = Instant::now();
        session.load("cam", 0, &mut log);
        session.on_error("cam", now, 0, &mut log);

        assert_eq!(session.stop(), StreamDirective::Detach);
        assert_eq!(session.stop(), StreamDirective::Detach);
        assert!(session
            .poll_reconnect(now + Duration::from_secs(60), 0, &mut log)
            .is_none());
        assert_eq!(session.state(), StreamState::Disconnected);
    }
}

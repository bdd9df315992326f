//! Status poller cadence and failure isolation, on a manual clock and a
//! scripted HTTP client.

use std::cell::{Cell, RefCell};
use std::collections::VecDeque;
use std::io::Read;
use std::time::Duration;

use anyhow::{anyhow, Result};
use firewatch_console::{
    Clock, ConsoleConfig, FetchBody, HttpClient, ManualClock, OperatorLog, StatusPoller,
};

fn ok(json: &str) -> Result<FetchBody> {
    Ok(FetchBody {
        status: 200,
        body: json.as_bytes().to_vec(),
    })
}

fn http_error(status: u16) -> Result<FetchBody> {
    Ok(FetchBody {
        status,
        body: Vec::new(),
    })
}

/// Replies are consumed per endpoint; a drained queue serves quiet defaults.
struct ScriptedClient {
    status: RefCell<VecDeque<Result<FetchBody>>>,
    fire: RefCell<VecDeque<Result<FetchBody>>>,
    status_hits: Cell<u32>,
    fire_hits: Cell<u32>,
}

impl ScriptedClient {
    fn new() -> Self {
        Self {
            status: RefCell::new(VecDeque::new()),
            fire: RefCell::new(VecDeque::new()),
            status_hits: Cell::new(0),
            fire_hits: Cell::new(0),
        }
    }

    fn push_status(&self, reply: Result<FetchBody>) {
        self.status.borrow_mut().push_back(reply);
    }

    fn push_fire(&self, reply: Result<FetchBody>) {
        self.fire.borrow_mut().push_back(reply);
    }
}

impl HttpClient for ScriptedClient {
    fn get(&self, url: &str) -> Result<FetchBody> {
        if url.contains("/api/fire_status") {
            self.fire_hits.set(self.fire_hits.get() + 1);
            self.fire
                .borrow_mut()
                .pop_front()
                .unwrap_or_else(|| ok(r#"{"fire_detected":false}"#))
        } else if url.contains("/api/status") {
            self.status_hits.set(self.status_hits.get() + 1);
            self.status
                .borrow_mut()
                .pop_front()
                .unwrap_or_else(|| ok(r#"{"streams":[],"active_streams":{}}"#))
        } else {
            Err(anyhow!("unexpected url {}", url))
        }
    }

    fn post_bytes(
        &self,
        _url: &str,
        _content_type: &str,
        _headers: &[(&str, &str)],
        _body: &[u8],
    ) -> Result<FetchBody> {
        Err(anyhow!("not used"))
    }

    fn post_json(&self, _url: &str, _body: &serde_json::Value) -> Result<FetchBody> {
        Err(anyhow!("not used"))
    }

    fn open_stream(&self, _url: &str) -> Result<Box<dyn Read + Send>> {
        Err(anyhow!("not used"))
    }
}

fn poller() -> StatusPoller {
    StatusPoller::new(&ConsoleConfig::default().endpoints(), Duration::from_millis(2000))
}

#[test]
fn first_poll_runs_immediately_on_start() {
    let client = ScriptedClient::new();
    client.push_status(ok(
        r#"{"camera_id":"ec2_camera","streams":["stream","deck_cam"],"active_streams":{"stream":{"clients":1}},"uptime":12.5,"fire_detection_enabled":true}"#,
    ));
    client.push_fire(ok(r#"{"fire_detected":true,"total_checks":7}"#));

    let clock = ManualClock::new();
    let mut log = OperatorLog::new();
    let mut poller = poller();
    poller.start(clock.now());

    assert!(poller.poll_if_due(clock.now(), clock.unix_millis(), &client, &mut log));
    assert_eq!(poller.camera_id(), Some("ec2_camera"));
    assert_eq!(poller.roster(), ["stream", "deck_cam"]);
    assert_eq!(poller.active(), ["stream"]);
    assert!(poller.fire().fire_detected);
    assert_eq!(poller.fire().total_checks, Some(7));
    assert!(log.is_empty());
}

#[test]
fn text_uptime_documents_still_populate_the_roster() {
    let client = ScriptedClient::new();
    client.push_status(ok(
        r#"{"camera_id":"ec2_camera","streams":["stream","deck_cam"],"active_streams":{"stream":{"clients":1}},"uptime":"0:42:13.123456","fire_detection_enabled":true}"#,
    ));

    let clock = ManualClock::new();
    let mut log = OperatorLog::new();
    let mut poller = poller();
    poller.start(clock.now());
    assert!(poller.poll_if_due(clock.now(), clock.unix_millis(), &client, &mut log));

    assert_eq!(poller.roster(), ["stream", "deck_cam"]);
    assert_eq!(poller.active(), ["stream"]);
    assert_eq!(poller.camera_id(), Some("ec2_camera"));
    assert!(
        log.is_empty(),
        "unexpected log: {:?}",
        log.last().map(|l| l.message.clone())
    );
}

#[test]
fn polls_hold_to_the_two_second_cadence() {
    let client = ScriptedClient::new();
    let clock = ManualClock::new();
    let mut log = OperatorLog::new();
    let mut poller = poller();
    poller.start(clock.now());
    assert!(poller.poll_if_due(clock.now(), clock.unix_millis(), &client, &mut log));

    clock.advance(Duration::from_millis(1999));
    assert!(!poller.poll_if_due(clock.now(), clock.unix_millis(), &client, &mut log));
    assert_eq!(client.status_hits.get(), 1);

    clock.advance(Duration::from_millis(1));
    assert!(poller.poll_if_due(clock.now(), clock.unix_millis(), &client, &mut log));
    assert_eq!(client.status_hits.get(), 2);
    assert_eq!(client.fire_hits.get(), 2);

    // The interval re-arms from the moment the poll ran.
    clock.advance(Duration::from_millis(1999));
    assert!(!poller.poll_if_due(clock.now(), clock.unix_millis(), &client, &mut log));
    clock.advance(Duration::from_millis(1));
    assert!(poller.poll_if_due(clock.now(), clock.unix_millis(), &client, &mut log));
}

#[test]
fn status_and_fire_failures_are_independent() {
    let client = ScriptedClient::new();
    client.push_status(Err(anyhow!("connection refused")));
    client.push_fire(ok(r#"{"fire_detected":true}"#));

    let clock = ManualClock::new();
    let mut log = OperatorLog::new();
    let mut poller = poller();
    poller.start(clock.now());
    assert!(poller.poll_if_due(clock.now(), clock.unix_millis(), &client, &mut log));

    // The fire document still landed despite the roster failure.
    assert!(poller.fire().fire_detected);
    assert_eq!(log.len(), 1);
    let first = log.last().map(|l| l.message.clone()).unwrap_or_default();
    assert!(first.starts_with("status error: "), "got {:?}", first);
    assert!(first.contains("connection refused"));

    client.push_status(ok(r#"{"streams":["stream"],"active_streams":{}}"#));
    client.push_fire(http_error(503));
    clock.advance(Duration::from_millis(2000));
    assert!(poller.poll_if_due(clock.now(), clock.unix_millis(), &client, &mut log));

    assert_eq!(poller.roster(), ["stream"]);
    assert_eq!(log.len(), 2);
    let second = log.last().map(|l| l.message.clone()).unwrap_or_default();
    assert!(second.starts_with("fire status error: "), "got {:?}", second);
    assert!(second.contains("status 503"));
}

#[test]
fn empty_roster_never_wipes_a_previous_one() {
    let client = ScriptedClient::new();
    client.push_status(ok(
        r#"{"camera_id":"ec2_camera","streams":["stream","deck_cam"],"active_streams":{}}"#,
    ));
    client.push_status(ok(r#"{"streams":[],"active_streams":{"stream":{}}}"#));

    let clock = ManualClock::new();
    let mut log = OperatorLog::new();
    let mut poller = poller();
    poller.start(clock.now());
    assert!(poller.poll_if_due(clock.now(), clock.unix_millis(), &client, &mut log));
    assert_eq!(poller.roster(), ["stream", "deck_cam"]);

    clock.advance(Duration::from_millis(2000));
    assert!(poller.poll_if_due(clock.now(), clock.unix_millis(), &client, &mut log));

    // Roster and camera id survive a blank report; the active set does not.
    assert_eq!(poller.roster(), ["stream", "deck_cam"]);
    assert_eq!(poller.camera_id(), Some("ec2_camera"));
    assert_eq!(poller.active(), ["stream"]);
}

#[test]
fn fire_document_survives_a_failed_refresh() {
    let client = ScriptedClient::new();
    client.push_fire(ok(r#"{"fire_detected":true,"total_checks":7}"#));
    client.push_fire(Err(anyhow!("timed out")));

    let clock = ManualClock::new();
    let mut log = OperatorLog::new();
    let mut poller = poller();
    poller.start(clock.now());
    assert!(poller.poll_if_due(clock.now(), clock.unix_millis(), &client, &mut log));
    assert!(poller.fire().fire_detected);

    clock.advance(Duration::from_millis(2000));
    assert!(poller.poll_if_due(clock.now(), clock.unix_millis(), &client, &mut log));
    assert!(poller.fire().fire_detected);
    assert_eq!(poller.fire().total_checks, Some(7));
}

#[test]
fn stop_suppresses_polls_and_restart_is_immediate() {
    let client = ScriptedClient::new();
    let clock = ManualClock::new();
    let mut log = OperatorLog::new();
    let mut poller = poller();
    poller.start(clock.now());
    assert!(poller.poll_if_due(clock.now(), clock.unix_millis(), &client, &mut log));

    poller.stop();
    assert!(!poller.is_running());
    clock.advance(Duration::from_millis(10_000));
    assert!(!poller.poll_if_due(clock.now(), clock.unix_millis(), &client, &mut log));
    assert_eq!(client.status_hits.get(), 1);

    poller.start(clock.now());
    assert!(poller.is_running());
    assert!(poller.poll_if_due(clock.now(), clock.unix_millis(), &client, &mut log));
    assert_eq!(client.status_hits.get(), 2);
}

#[test]
fn refresh_fire_leaves_the_status_endpoint_alone() {
    let client = ScriptedClient::new();
    client.push_fire(ok(r#"{"fire_detected":true}"#));

    let clock = ManualClock::new();
    let mut log = OperatorLog::new();
    let mut poller = poller();
    poller.refresh_fire(&client, clock.unix_millis(), &mut log);

    assert!(poller.fire().fire_detected);
    assert_eq!(client.fire_hits.get(), 1);
    assert_eq!(client.status_hits.get(), 0);
}

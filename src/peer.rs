//! Peer-connection session and signaling.
//!
//! The media engine behind the peer link is opaque; `PeerLink` exposes just
//! the offer/answer surface the signaling exchange needs. Negotiation is a
//! single HTTP round-trip: POST the receive-only offer, apply the answer.
//! Any failure surfaces once to the operator log and the session returns to
//! idle; there is no auto-retry.

use anyhow::{anyhow, Context, Result};
use serde::Deserialize;

use crate::transport::HttpClient;
use crate::OperatorLog;

/// Offer/answer surface of the embedded media engine.
pub trait PeerLink {
    /// Produce a receive-only offer SDP.
    fn create_offer(&mut self) -> Result<String>;
    /// Apply the remote answer SDP.
    fn apply_answer(&mut self, sdp: &str) -> Result<()>;
    /// Feed extra ICE servers handed back by signaling.
    fn add_ice_servers(&mut self, servers: &[IceServer]) -> Result<()>;
    /// Tear the connection down. Must be idempotent.
    fn close(&mut self);
}

/// ICE server entry; `urls` arrives as either a string or a list.
#[derive(Clone, Debug, Deserialize, PartialEq)]
pub struct IceServer {
    pub urls: IceUrls,
    #[serde(default)]
    pub username: Option<String>,
    #[serde(default)]
    pub credential: Option<String>,
}

#[derive(Clone, Debug, Deserialize, PartialEq)]
#[serde(untagged)]
pub enum IceUrls {
    One(String),
    Many(Vec<String>),
}

#[derive(Debug, Deserialize)]
struct AnswerDoc {
    #[serde(rename = "sdpAnswer")]
    sdp_answer: String,
    #[serde(rename = "iceServers", default)]
    ice_servers: Vec<IceServer>,
}

pub struct SignalingAnswer {
    pub sdp: String,
    pub ice_servers: Vec<IceServer>,
}

/// One-shot offer/answer exchange with the signaling endpoint.
pub struct SignalingClient {
    url: String,
}

impl SignalingClient {
    pub fn new(url: String) -> Self {
        Self { url }
    }

    pub fn request_answer(
        &self,
        client: &dyn HttpClient,
        camera_id: &str,
        offer_sdp: &str,
    ) -> Result<SignalingAnswer> {
        let payload = serde_json::json!({ "cameraId": camera_id, "sdp": offer_sdp });
        let response = client
            .post_json(&self.url, &payload)
            .context("post offer")?;
        if !response.is_success() {
            return Err(anyhow!("signaling returned status {}", response.status));
        }
        let doc: AnswerDoc = serde_json::from_slice(&response.body)
            .map_err(|e| anyhow!("signaling parse error: {}", e))?;
        Ok(SignalingAnswer {
            sdp: doc.sdp_answer,
            ice_servers: doc.ice_servers,
        })
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum PeerPhase {
    Idle,
    Active,
}

pub struct PeerSession {
    signaling: SignalingClient,
    camera_id: String,
    link: Box<dyn PeerLink>,
    phase: PeerPhase,
}

impl PeerSession {
    pub fn new(signaling_url: String, camera_id: String, link: Box<dyn PeerLink>) -> Self {
        Self {
            signaling: SignalingClient::new(signaling_url),
            camera_id,
            link,
            phase: PeerPhase::Idle,
        }
    }

    pub fn phase(&self) -> PeerPhase {
        self.phase
    }

    pub fn is_active(&self) -> bool {
        self.phase == PeerPhase::Active
    }

    /// Negotiate and go active. On failure the link is closed, one line is
    /// logged, and the session stays idle.
    pub fn start(&mut self, client: &dyn HttpClient, millis: u64, log: &mut OperatorLog) -> bool {
        self.stop();
        match self.negotiate(client) {
            Ok(()) => {
                self.phase = PeerPhase::Active;
                log.note(millis, "peer connection established");
                true
            }
            Err(err) => {
                self.link.close();
                self.phase = PeerPhase::Idle;
                log.note(millis, format!("peer connect failed: {}", err));
                false
            }
        }
    }

    fn negotiate(&mut self, client: &dyn HttpClient) -> Result<()> {
        let offer = self.link.create_offer().context("create offer")?;
        let answer = self
            .signaling
            .request_answer(client, &self.camera_id, &offer)?;
        if !answer.ice_servers.is_empty() {
            self.link.add_ice_servers(&answer.ice_servers)?;
        }
        self.link.apply_answer(&answer.sdp).context("apply answer")?;
        Ok(())
    }

    /// Close and detach. Idempotent.
    pub fn stop(&mut self) {
        self.link.close();
        self.phase = PeerPhase::Idle;
    }

    pub fn on_ice_state(&self, state: &str, millis: u64, log: &mut OperatorLog) {
        log.note(millis, format!("ICE: {}", state));
    }
}

/// Loopback link for builds without a media engine attached, and for tests.
#[derive(Default)]
pub struct StubPeerLink {
    pub offers_created: u32,
    pub applied_answer: Option<String>,
    pub ice_servers_seen: usize,
    pub closed: bool,
}

impl StubPeerLink {
    pub fn new() -> Self {
        Self::default()
    }
}

impl PeerLink for StubPeerLink {
    fn create_offer(&mut self) -> Result<String> {
        self.offers_created += 1;
        self.closed = false;
        Ok("v=0\r\no=- 0 0 IN IP4 127.0.0.1\r\ns=-\r\nt=0 0\r\n\
            m=video 9 UDP/TLS/RTP/SAVPF 96\r\na=recvonly\r\n"
            .to_string())
    }

    fn apply_answer(&mut self, sdp: &str) -> Result<()> {
        self.applied_answer = Some(sdp.to_string());
        Ok(())
    }

    fn add_ice_servers(&mut self, servers: &[IceServer]) -> Result<()> {
        self.ice_servers_seen += servers.len();
        Ok(())
    }

    fn close(&mut self) {
        self.closed = true;
    }
}

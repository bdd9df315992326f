//! HTTP transport layer.
//!
//! All backend traffic goes through the `HttpClient` trait so tests can
//! substitute scripted responses for the real `ureq` agent. Implementations
//! must not retry internally; retry policy belongs to the callers.

use anyhow::{anyhow, Context, Result};
use serde::de::DeserializeOwned;
use std::io::Read;
use std::time::Duration;

pub mod mjpeg;

pub use mjpeg::{MjpegStream, PushEvent, PushStreamPump};

const MAX_BODY_BYTES: usize = 2 * 1024 * 1024;
const CONNECT_TIMEOUT: Duration = Duration::from_secs(5);
const REQUEST_TIMEOUT: Duration = Duration::from_secs(10);
const READ_TIMEOUT: Duration = Duration::from_secs(5);

/// Buffered response to a finite request.
#[derive(Debug, Clone)]
pub struct FetchBody {
    pub status: u16,
    pub body: Vec<u8>,
}

impl FetchBody {
    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }

    pub fn text(&self) -> String {
        String::from_utf8_lossy(&self.body).into_owned()
    }
}

/// Blocking HTTP boundary.
pub trait HttpClient {
    /// GET with caching disabled; the full body is buffered.
    fn get(&self, url: &str) -> Result<FetchBody>;

    /// POST raw bytes with the given content type and extra headers.
    fn post_bytes(
        &self,
        url: &str,
        content_type: &str,
        headers: &[(&str, &str)],
        body: &[u8],
    ) -> Result<FetchBody>;

    /// POST a JSON document.
    fn post_json(&self, url: &str, body: &serde_json::Value) -> Result<FetchBody>;

    /// Open a long-lived streaming GET and hand back the body reader.
    fn open_stream(&self, url: &str) -> Result<Box<dyn Read + Send>>;
}

/// GET and deserialize a JSON document. Non-2xx statuses are errors.
pub fn fetch_json<T: DeserializeOwned>(client: &dyn HttpClient, url: &str) -> Result<T> {
    let response = client.get(url)?;
    if !response.is_success() {
        return Err(anyhow!("status {}", response.status));
    }
    serde_json::from_slice(&response.body).map_err(|e| anyhow!("parse error: {}", e))
}

/// `ureq`-backed client used by the binaries.
pub struct UreqClient {
    agent: ureq::Agent,
}

impl UreqClient {
    pub fn new() -> Self {
        Self::with_read_timeout(READ_TIMEOUT)
    }

    /// The timeout applies per read call, on buffered bodies and open
    /// streams alike; a feed that goes silent for that long errors out
    /// instead of parking its reader.
    pub fn with_read_timeout(read_timeout: Duration) -> Self {
        let agent = ureq::AgentBuilder::new()
            .timeout_connect(CONNECT_TIMEOUT)
            .timeout_read(read_timeout)
            .build();
        Self { agent }
    }
}

impl Default for UreqClient {
    fn default() -> Self {
        Self::new()
    }
}

impl HttpClient for UreqClient {
    fn get(&self, url: &str) -> Result<FetchBody> {
        let result = self
            .agent
            .get(url)
            .set("Cache-Control", "no-store")
            .timeout(REQUEST_TIMEOUT)
            .call();
        finish(result).with_context(|| format!("get {}", url))
    }

    fn post_bytes(
        &self,
        url: &str,
        content_type: &str,
        headers: &[(&str, &str)],
        body: &[u8],
    ) -> Result<FetchBody> {
        let mut request = self
            .agent
            .post(url)
            .set("Content-Type", content_type)
            .timeout(REQUEST_TIMEOUT);
        for (name, value) in headers {
            request = request.set(name, value);
        }
        finish(request.send_bytes(body)).with_context(|| format!("post {}", url))
    }

    fn post_json(&self, url: &str, body: &serde_json::Value) -> Result<FetchBody> {
        let payload = serde_json::to_string(body).context("serialize request body")?;
        let result = self
            .agent
            .post(url)
            .set("Content-Type", "application/json")
            .timeout(REQUEST_TIMEOUT)
            .send_string(&payload);
        finish(result).with_context(|| format!("post {}", url))
    }

    fn open_stream(&self, url: &str) -> Result<Box<dyn Read + Send>> {
        let response = self
            .agent
            .get(url)
            .set("Cache-Control", "no-store")
            .call()
            .with_context(|| format!("open stream {}", url))?;
        Ok(Box::new(response.into_reader()))
    }
}

/// Fold ureq's status-as-error shape into a plain `FetchBody`.
fn finish(result: std::result::Result<ureq::Response, ureq::Error>) -> Result<FetchBody> {
    match result {
        Ok(response) => read_body(response),
        Err(ureq::Error::Status(_, response)) => read_body(response),
        Err(err) => Err(anyhow!("request failed: {}", err)),
    }
}

fn read_body(response: ureq::Response) -> Result<FetchBody> {
    let status = response.status();
    let mut body = Vec::new();
    response
        .into_reader()
        .take(MAX_BODY_BYTES as u64 + 1)
        .read_to_end(&mut body)
        .context("read response body")?;
    if body.len() > MAX_BODY_BYTES {
        return Err(anyhow!("response body exceeds {} bytes", MAX_BODY_BYTES));
    }
    Ok(FetchBody { status, body })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn success_is_2xx_only() {
        let ok = FetchBody {
            status: 204,
            body: Vec::new(),
        };
        let server_error = FetchBody {
            status: 500,
            body: Vec::new(),
        };
        assert!(ok.is_success());
        assert!(!server_error.is_success());
    }

    #[test]
    fn text_is_lossy_utf8() {
        let body = FetchBody {
            status: 200,
            body: vec![b'o', b'k', 0xFF],
        };
        assert!(body.text().starts_with("ok"));
    }

    #[test]
    fn silent_stream_reads_fail_at_the_read_timeout() {
        use std::io::Write;
        use std::net::TcpListener;

        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        let addr = listener.local_addr().unwrap();
        let (done_tx, done_rx) = std::sync::mpsc::channel::<()>();
        let server = std::thread::spawn(move || {
            let (mut socket, _) = listener.accept().unwrap();
            socket
                .write_all(
                    b"HTTP/1.1 200 OK\r\n\
                      Content-Type: multipart/x-mixed-replace; boundary=frame\r\n\r\n",
                )
                .unwrap();
            // Hold the connection open without sending a single body byte.
            let _ = done_rx.recv();
        });

        let client = UreqClient::with_read_timeout(Duration::from_millis(100));
        let mut reader = client
            .open_stream(&format!("http://{}/video_feed/stream", addr))
            .unwrap();
        let mut buf = [0u8; 16];
        let err = reader.read(&mut buf).unwrap_err();
        assert!(err.to_string().contains("timed out"), "got {}", err);

        done_tx.send(()).unwrap();
        server.join().unwrap();
    }
}

//! Motion-JPEG push-stream scanning.
//!
//! Camera feeds arrive as a multipart body with bare JPEG images between
//! boundary chatter. The scanner ignores the part headers entirely and cuts
//! frames on the JPEG start/end markers, which survives every boundary
//! variant the backends produce.

use std::io::Read;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc::{Receiver, TryRecvError};
use std::sync::Arc;

const MAX_FRAME_BYTES: usize = 5 * 1024 * 1024;
const READ_CHUNK_BYTES: usize = 8192;

/// One transport-level event from a push stream.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PushEvent {
    /// A complete JPEG image, start and end markers included.
    Frame(Vec<u8>),
    /// Clean end of body.
    Ended,
    /// Transport failure; the stream is unusable afterwards.
    Errored(String),
}

/// Frame scanner over a long-lived response body.
pub struct MjpegStream {
    reader: Box<dyn Read + Send>,
    buffer: Vec<u8>,
    done: bool,
}

impl MjpegStream {
    pub fn new(reader: Box<dyn Read + Send>) -> Self {
        Self {
            reader,
            buffer: Vec::with_capacity(64 * 1024),
            done: false,
        }
    }

    /// Block until the next frame or terminal event.
    pub fn next_event(&mut self) -> PushEvent {
        if self.done {
            return PushEvent::Ended;
        }
        let mut chunk = vec![0u8; READ_CHUNK_BYTES];
        loop {
            if let Some((start, end)) = find_jpeg_bounds(&self.buffer) {
                let frame = self.buffer[start..end].to_vec();
                self.buffer.drain(..end);
                return PushEvent::Frame(frame);
            }

            match self.reader.read(&mut chunk) {
                Ok(0) => {
                    self.done = true;
                    return PushEvent::Ended;
                }
                Ok(read) => {
                    self.buffer.extend_from_slice(&chunk[..read]);
                    if self.buffer.len() > MAX_FRAME_BYTES {
                        self.done = true;
                        return PushEvent::Errored(format!(
                            "no frame boundary within {} bytes",
                            MAX_FRAME_BYTES
                        ));
                    }
                }
                Err(err) => {
                    self.done = true;
                    return PushEvent::Errored(err.to_string());
                }
            }
        }
    }
}

fn find_jpeg_bounds(buffer: &[u8]) -> Option<(usize, usize)> {
    let start = buffer.windows(2).position(|pair| pair == [0xFF, 0xD8])?;
    let end = buffer[start + 2..]
        .windows(2)
        .position(|pair| pair == [0xFF, 0xD9])
        .map(|offset| start + 2 + offset + 2)?;
    Some((start, end))
}

/// Reader thread wrapper so the console can drain events without blocking.
///
/// The thread parks in the socket read; after the pump is dropped it exits
/// on the next transport event. The agent's read timeout bounds how long
/// that can take on a silent upstream.
pub struct PushStreamPump {
    rx: Receiver<PushEvent>,
    stop: Arc<AtomicBool>,
}

impl PushStreamPump {
    pub fn spawn(reader: Box<dyn Read + Send>) -> Self {
        let (tx, rx) = std::sync::mpsc::channel();
        let stop = Arc::new(AtomicBool::new(false));
        let stop_flag = Arc::clone(&stop);
        std::thread::spawn(move || {
            let mut stream = MjpegStream::new(reader);
            loop {
                let event = stream.next_event();
                if stop_flag.load(Ordering::Relaxed) {
                    break;
                }
                let terminal = matches!(event, PushEvent::Ended | PushEvent::Errored(_));
                if tx.send(event).is_err() || terminal {
                    break;
                }
            }
        });
        Self { rx, stop }
    }

    /// Next queued event, if any.
    pub fn try_next(&self) -> Option<PushEvent> {
        match self.rx.try_recv() {
            Ok(event) => Some(event),
            Err(TryRecvError::Empty) | Err(TryRecvError::Disconnected) => None,
        }
    }
}

impl Drop for PushStreamPump {
    fn drop(&mut self) {
        self.stop.store(true, Ordering::Relaxed);
    }
}

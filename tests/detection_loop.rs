//! End-to-end detection pipeline: surface frame in, detect request on the
//! wire, boxes back onto the overlay canvas.

use std::cell::RefCell;
use std::collections::VecDeque;
use std::io::Read;
use std::time::{Duration, Instant};

use anyhow::{anyhow, Result};
use firewatch_console::{
    ConsoleConfig, DetectionClient, DetectionLoop, DisplaySettings, FetchBody, HttpClient,
    SurfaceRect, VideoSurface,
};
use image::{Rgba, RgbaImage};

struct DetectRequest {
    url: String,
    content_type: String,
    headers: Vec<(String, String)>,
    body: Vec<u8>,
}

#[derive(Default)]
struct RecordingClient {
    requests: RefCell<Vec<DetectRequest>>,
    replies: RefCell<VecDeque<Result<FetchBody>>>,
}

impl RecordingClient {
    fn with_replies(replies: Vec<Result<FetchBody>>) -> Self {
        Self {
            requests: RefCell::new(Vec::new()),
            replies: RefCell::new(replies.into_iter().collect()),
        }
    }
}

impl HttpClient for RecordingClient {
    fn get(&self, _url: &str) -> Result<FetchBody> {
        Err(anyhow!("unexpected get"))
    }

    fn post_bytes(
        &self,
        url: &str,
        content_type: &str,
        headers: &[(&str, &str)],
        body: &[u8],
    ) -> Result<FetchBody> {
        self.requests.borrow_mut().push(DetectRequest {
            url: url.to_string(),
            content_type: content_type.to_string(),
            headers: headers
                .iter()
                .map(|(k, v)| (k.to_string(), v.to_string()))
                .collect(),
            body: body.to_vec(),
        });
        self.replies.borrow_mut().pop_front().unwrap_or_else(|| {
            Ok(FetchBody {
                status: 200,
                body: br#"{"boxes": []}"#.to_vec(),
            })
        })
    }

    fn post_json(&self, _url: &str, _body: &serde_json::Value) -> Result<FetchBody> {
        Err(anyhow!("unexpected post_json"))
    }

    fn open_stream(&self, _url: &str) -> Result<Box<dyn Read + Send>> {
        Err(anyhow!("unexpected open_stream"))
    }
}

fn boxes_reply(json: &str) -> Result<FetchBody> {
    Ok(FetchBody {
        status: 200,
        body: json.as_bytes().to_vec(),
    })
}

fn detection_loop(target_fps: u32) -> DetectionLoop {
    let config = ConsoleConfig::default();
    let display = DisplaySettings {
        target_fps,
        jpeg_quality: 70,
        poll_interval: Duration::from_secs(2),
    };
    DetectionLoop::new(
        &display,
        DetectionClient::new(config.endpoints().detect(), config.camera_id.clone()),
    )
}

fn surface(w: u32, h: u32, frame_w: u32, frame_h: u32) -> VideoSurface {
    let mut surface = VideoSurface::new(SurfaceRect::new(w, h));
    surface.present_frame(RgbaImage::from_pixel(
        frame_w,
        frame_h,
        Rgba([180, 60, 20, 255]),
    ));
    surface
}

#[test]
fn detect_request_carries_camera_header_and_display_sized_jpeg() {
    let client = RecordingClient::default();
    let surface = surface(320, 240, 640, 480);
    let mut detection = detection_loop(10);
    let t0 = Instant::now();

    detection.start(t0);
    let report = detection.poll_tick(t0, &surface, &client).unwrap();
    assert!(report.sampled);

    let requests = client.requests.borrow();
    assert_eq!(requests.len(), 1);
    let request = &requests[0];
    assert_eq!(request.url, "http://127.0.0.1:9000/detect");
    assert_eq!(request.content_type, "application/octet-stream");
    assert_eq!(
        request.headers,
        [("camera-id".to_string(), "ec2_camera".to_string())]
    );

    // The body is the display-sized capture, not the source frame.
    assert_eq!(&request.body[..2], &[0xFF, 0xD8]);
    let decoded = image::load_from_memory(&request.body).unwrap();
    assert_eq!((decoded.width(), decoded.height()), (320, 240));
}

#[test]
fn boxes_scale_onto_the_display_canvas() {
    let client = RecordingClient::with_replies(vec![boxes_reply(
        r#"{"boxes": [[0.25, 0.25, 0.75, 0.75, "fire", 0.9], [200, 30, 300, 90]]}"#,
    )]);
    let surface = surface(320, 240, 320, 240);
    let mut detection = detection_loop(10);
    let t0 = Instant::now();

    detection.start(t0);
    let report = detection.poll_tick(t0, &surface, &client).unwrap();
    assert_eq!(report.boxes, 2);

    let canvas = detection.overlay().canvas();
    assert_eq!((canvas.width(), canvas.height()), (320, 240));

    let stroke = Rgba([0xFF, 0xE6, 0x00, 0xFF]);
    // Normalized box left edge at x = 80, spanning y 60..180.
    assert_eq!(*canvas.get_pixel(80, 120), stroke);
    // Pixel-unit box is drawn where it says.
    assert_eq!(*canvas.get_pixel(200, 60), stroke);
    // Interior stays transparent.
    assert_eq!(canvas.get_pixel(160, 150)[3], 0);
}

#[test]
fn surface_resize_refits_the_canvas_on_the_next_tick() {
    let client = RecordingClient::default();
    let mut surface = surface(320, 240, 320, 240);
    let mut detection = detection_loop(10);
    let t0 = Instant::now();

    detection.start(t0);
    detection.poll_tick(t0, &surface, &client).unwrap();
    assert_eq!(detection.overlay().canvas().width(), 320);

    surface.set_rect(SurfaceRect::new(160, 120));
    detection
        .poll_tick(t0 + Duration::from_millis(100), &surface, &client)
        .unwrap();
    assert_eq!(detection.overlay().canvas().width(), 160);
    assert_eq!(detection.overlay().canvas().height(), 120);

    let requests = client.requests.borrow();
    let resized = image::load_from_memory(&requests[1].body).unwrap();
    assert_eq!((resized.width(), resized.height()), (160, 120));
}

#[test]
fn tick_interval_follows_the_target_rate() {
    let client = RecordingClient::default();
    let surface = surface(64, 48, 64, 48);
    let mut detection = detection_loop(4);
    let t0 = Instant::now();

    detection.start(t0);
    assert!(detection.poll_tick(t0, &surface, &client).is_some());
    assert!(detection
        .poll_tick(t0 + Duration::from_millis(249), &surface, &client)
        .is_none());
    assert!(detection
        .poll_tick(t0 + Duration::from_millis(250), &surface, &client)
        .is_some());
}

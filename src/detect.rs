//! Remote detection round-trips.
//!
//! The detection endpoint receives one JPEG per tick and answers with row
//! arrays, `{ "boxes": [[x1, y1, x2, y2, label?, score?], ...] }`. Every
//! failure mode folds into `DetectOutcome::Failed`; the overlay loop treats
//! that as zero detections and keeps ticking.

use anyhow::{anyhow, Result};
use serde_json::Value;

use crate::sampler::FrameSample;
use crate::transport::HttpClient;
use crate::OperatorLog;

/// One detection rectangle in source-frame coordinates.
///
/// Coordinates where all four values are at most 1.0 are normalized to the
/// frame; anything else is pixel units.
#[derive(Clone, Debug, PartialEq)]
pub struct DetectionBox {
    pub x1: f32,
    pub y1: f32,
    pub x2: f32,
    pub y2: f32,
    pub label: Option<String>,
    pub score: Option<f32>,
}

/// Outcome of one round-trip. Failures are data, not errors.
#[derive(Debug)]
pub enum DetectOutcome {
    Boxes(Vec<DetectionBox>),
    Failed { reason: String },
}

pub struct DetectionClient {
    url: String,
    camera_id: String,
}

impl DetectionClient {
    pub fn new(url: String, camera_id: String) -> Self {
        Self { url, camera_id }
    }

    /// POST the sample and parse the reply. Never retries within a tick.
    pub fn detect(&self, client: &dyn HttpClient, sample: &FrameSample) -> DetectOutcome {
        let response = match client.post_bytes(
            &self.url,
            "application/octet-stream",
            &[("camera-id", &self.camera_id)],
            &sample.jpeg,
        ) {
            Ok(response) => response,
            Err(err) => {
                return DetectOutcome::Failed {
                    reason: err.to_string(),
                }
            }
        };
        if !response.is_success() {
            return DetectOutcome::Failed {
                reason: format!("detect endpoint returned status {}", response.status),
            };
        }
        match parse_boxes(&response.body) {
            Ok(boxes) => DetectOutcome::Boxes(boxes),
            Err(err) => DetectOutcome::Failed {
                reason: err.to_string(),
            },
        }
    }
}

/// Parse a detection reply. A missing `boxes` field means no detections;
/// rows with fewer than four numbers are skipped.
pub fn parse_boxes(payload: &[u8]) -> Result<Vec<DetectionBox>> {
    let doc: Value = serde_json::from_slice(payload).map_err(|e| anyhow!("parse error: {}", e))?;
    let Some(rows) = doc.get("boxes").and_then(Value::as_array) else {
        return Ok(Vec::new());
    };

    let mut boxes = Vec::with_capacity(rows.len());
    for row in rows {
        let Some(row) = row.as_array() else {
            continue;
        };
        if let Some(parsed) = parse_row(row) {
            boxes.push(parsed);
        }
    }
    Ok(boxes)
}

fn parse_row(row: &[Value]) -> Option<DetectionBox> {
    if row.len() < 4 {
        return None;
    }
    let x1 = row[0].as_f64()? as f32;
    let y1 = row[1].as_f64()? as f32;
    let x2 = row[2].as_f64()? as f32;
    let y2 = row[3].as_f64()? as f32;
    let label = row.get(4).and_then(Value::as_str).map(str::to_string);
    let score = row.get(5).and_then(Value::as_f64).map(|score| score as f32);
    Some(DetectionBox {
        x1,
        y1,
        x2,
        y2,
        label,
        score,
    })
}

/// Fire the backend's one-shot test detection and surface the raw response
/// to the operator. The caller refreshes fire status afterwards.
pub fn run_detection_test(
    client: &dyn HttpClient,
    url: &str,
    millis: u64,
    log: &mut OperatorLog,
) -> bool {
    match client.get(url) {
        Ok(response) if response.is_success() => {
            log.note(
                millis,
                format!("test detection: {}", response.text().trim()),
            );
            true
        }
        Ok(response) => {
            log.note(
                millis,
                format!("test detection failed: status {}", response.status),
            );
            false
        }
        Err(err) => {
            log.note(millis, format!("test detection failed: {}", err));
            false
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const DETECT_REPLY: &str = r#"{
        "boxes": [
            [0.1, 0.2, 0.5, 0.6, "fire", 0.87],
            [10, 20, 110, 220],
            [1, 2],
            [0.3, 0.4, 0.7, 0.8, "smoke"]
        ]
    }"#;

    #[test]
    fn parse_full_and_partial_rows() {
        let boxes = parse_boxes(DETECT_REPLY.as_bytes()).unwrap();
        assert_eq!(boxes.len(), 3);

        assert_eq!(boxes[0].label.as_deref(), Some("fire"));
        assert!((boxes[0].score.unwrap() - 0.87).abs() < 1e-6);

        assert_eq!(boxes[1].label, None);
        assert_eq!(boxes[1].score, None);
        assert_eq!(boxes[1].x2, 110.0);

        assert_eq!(boxes[2].label.as_deref(), Some("smoke"));
        assert_eq!(boxes[2].score, None);
    }

    #[test]
    fn missing_boxes_field_is_empty() {
        let boxes = parse_boxes(br#"{"status": "ok"}"#).unwrap();
        assert!(boxes.is_empty());
    }

    #[test]
    fn malformed_json_is_an_error() {
        assert!(parse_boxes(b"{not json").is_err());
    }

    #[test]
    fn non_numeric_row_is_skipped() {
        let boxes = parse_boxes(br#"{"boxes": [["a", "b", "c", "d"]]}"#).unwrap();
        assert!(boxes.is_empty());
    }
}

//! stream_probe - one-shot health checks against a firewatch camera backend
//!
//! Probes the endpoints the console depends on and prints a verdict per
//! probe, so an operator can tell a dead backend from a dead stream before
//! opening the console.

use anyhow::{anyhow, Result};
use clap::Parser;

use firewatch_console::hls::{playlist_liveness, Liveness};
use firewatch_console::{fetch_json, CameraStatus, ConsoleConfig, FireStatus, HttpClient, UreqClient};

#[derive(Parser, Debug)]
#[command(
    name = "stream_probe",
    about = "Probe firewatch camera endpoints (playlist, status, fire, detect-test)"
)]
struct Args {
    /// Camera host to probe. Overrides the configured host.
    #[arg(long)]
    host: Option<String>,

    /// What to probe: playlist, status, fire, detect-test, or all.
    #[arg(default_value = "all")]
    probe: String,
}

fn main() -> Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("warn")).init();
    let args = Args::parse();

    match args.probe.as_str() {
        "playlist" | "status" | "fire" | "detect-test" | "all" => {}
        other => {
            return Err(anyhow!(
                "unknown probe '{}' (expected playlist, status, fire, detect-test, or all)",
                other
            ))
        }
    }
    let all = args.probe == "all";

    let mut config = ConsoleConfig::load()?;
    if let Some(host) = args.host {
        config.host = host;
        config.validate()?;
    }
    let endpoints = config.endpoints();
    let client = UreqClient::new();

    let mut failures = 0u32;

    if all || args.probe == "playlist" {
        match playlist_liveness(&client, &endpoints.playlist()) {
            Liveness::SegmentsPresent { segments } => {
                println!("playlist: OK ({} segments)", segments)
            }
            Liveness::NoSegments => println!("playlist: reachable, no segments yet"),
            Liveness::Unreachable { reason } => {
                println!("playlist: FAILED ({})", reason);
                failures += 1;
            }
        }
    }

    if all || args.probe == "status" {
        match fetch_json::<CameraStatus>(&client, &endpoints.status()) {
            Ok(doc) => {
                println!(
                    "status: OK (camera {}, streams: {})",
                    doc.camera_id.as_deref().unwrap_or("?"),
                    if doc.streams.is_empty() {
                        "none".to_string()
                    } else {
                        doc.streams.join(", ")
                    }
                );
            }
            Err(err) => {
                println!("status: FAILED ({})", err);
                failures += 1;
            }
        }
    }

    if all || args.probe == "fire" {
        match fetch_json::<FireStatus>(&client, &endpoints.fire_status()) {
            Ok(doc) => {
                println!(
                    "fire: OK (detected={}, checks={})",
                    doc.fire_detected,
                    doc.total_checks.unwrap_or(0)
                );
            }
            Err(err) => {
                println!("fire: FAILED ({})", err);
                failures += 1;
            }
        }
    }

    if all || args.probe == "detect-test" {
        match client.get(&endpoints.test_detection()) {
            Ok(response) if response.is_success() => {
                println!("detect-test: OK ({})", response.text().trim());
            }
            Ok(response) => {
                println!("detect-test: FAILED (status {})", response.status);
                failures += 1;
            }
            Err(err) => {
                println!("detect-test: FAILED ({})", err);
                failures += 1;
            }
        }
    }

    if failures > 0 {
        return Err(anyhow!("{} probe(s) failed", failures));
    }
    Ok(())
}

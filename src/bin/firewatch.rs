//! firewatch - headless operator console for a firewatch camera
//!
//! This binary:
//! 1. Loads console configuration (file, environment, flags)
//! 2. Starts the requested playback mode against the camera backend
//! 3. Drives reconnects, status polls, and detection ticks cooperatively
//! 4. Logs stream health, fire status, and detection activity until Ctrl-C

use anyhow::{anyhow, Context, Result};
use clap::Parser;
use std::sync::mpsc;
use std::time::{Duration, Instant};

use firewatch_console::{
    fetch_json, CameraStatus, Console, ConsoleConfig, Endpoints, HttpClient, MonotonicClock,
    UreqClient,
};

#[derive(Parser, Debug)]
#[command(
    author,
    version,
    about = "Headless operator console for a firewatch camera"
)]
struct Args {
    /// Camera host to monitor. Overrides the configured host.
    #[arg(long)]
    host: Option<String>,

    /// Push stream to load in cctv mode. Defaults to the first stream the
    /// camera advertises.
    #[arg(long)]
    stream: Option<String>,

    /// Run fire detection on sampled frames.
    #[arg(long)]
    detect: bool,

    /// Playback mode: cctv, hls, or peer.
    #[arg(long, default_value = "cctv")]
    mode: String,
}

fn main() -> Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();
    let args = Args::parse();

    let mut config = ConsoleConfig::load()?;
    if let Some(host) = args.host {
        config.host = host;
        config.validate()?;
    }

    log::info!("firewatch console starting");
    log::info!("  camera id: {}", config.camera_id);
    log::info!("  backend: {}://{}", config.protocol, config.host);
    log::info!("  mode: {}", args.mode);
    log::info!("  detection: {}", if args.detect { "on" } else { "off" });

    let client = UreqClient::new();
    let clock = MonotonicClock;
    let mut console = Console::new(config);
    log::info!("  rtmp publish: {}", console.endpoints().rtmp_publish());

    console.set_detection_enabled(args.detect, &clock);

    match args.mode.as_str() {
        "cctv" => {
            let stream = match args.stream {
                Some(stream) => stream,
                None => pick_first_stream(&client, console.endpoints())?,
            };
            console.load_stream(&stream, &client, &clock)?;
        }
        "hls" => {
            console.hls_self_test(&client, &clock);
            console.play_hls(&clock);
        }
        "peer" => {
            if !console.connect_peer(&client, &clock) {
                return Err(anyhow!("peer connection failed; see log"));
            }
        }
        other => {
            return Err(anyhow!(
                "unknown mode '{}' (expected cctv, hls, or peer)",
                other
            ))
        }
    }

    let (tx, rx) = mpsc::channel();
    ctrlc::set_handler(move || {
        let _ = tx.send(());
    })
    .expect("error setting Ctrl-C handler");

    log::info!("console running (Ctrl-C to stop)");
    let mut last_stats_log = Instant::now();
    let mut fire_announced = false;
    loop {
        if rx.try_recv().is_ok() {
            break;
        }
        console.drive(&client, &clock);

        let fire = console.poller().fire();
        if fire.fire_detected && !fire_announced {
            log::warn!("FIRE DETECTED by camera backend");
            fire_announced = true;
        } else if !fire.fire_detected {
            fire_announced = false;
        }

        if last_stats_log.elapsed() >= Duration::from_secs(5) {
            let stats = console.stats();
            log::info!(
                "mode={} fps={} lag={} streams={}",
                stats.mode_label,
                stats
                    .fps
                    .map(|v| format!("{:.1}", v))
                    .unwrap_or_else(|| "-".to_string()),
                stats
                    .live_lag_ms
                    .map(|v| format!("{:.0}ms", v))
                    .unwrap_or_else(|| "-".to_string()),
                console.poller().roster().len(),
            );
            last_stats_log = Instant::now();
        }

        std::thread::sleep(Duration::from_millis(20));
    }

    log::info!("shutdown signal received, stopping console...");
    console.stop_all(&clock);
    log::info!("console stopped");
    Ok(())
}

fn pick_first_stream(client: &dyn HttpClient, endpoints: &Endpoints) -> Result<String> {
    let status: CameraStatus =
        fetch_json(client, &endpoints.status()).context("query camera status")?;
    status
        .streams
        .into_iter()
        .next()
        .ok_or_else(|| anyhow!("no streams advertised by {}", endpoints.status()))
}

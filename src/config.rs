use anyhow::{anyhow, Result};
use serde::Deserialize;
use std::path::Path;
use std::time::Duration;
use url::Url;

const DEFAULT_PROTOCOL: &str = "http";
const DEFAULT_HOST: &str = "127.0.0.1";
const DEFAULT_CAMERA_ID: &str = "ec2_camera";
const DEFAULT_STREAM_PORT: u16 = 8080;
const DEFAULT_CONTROL_PORT: u16 = 8082;
const DEFAULT_DETECT_PORT: u16 = 9000;
const DEFAULT_RTMP_PORT: u16 = 1936;
const DEFAULT_TARGET_FPS: u32 = 10;
const DEFAULT_JPEG_QUALITY: u8 = 70;
const DEFAULT_POLL_INTERVAL_MS: u64 = 2000;

#[derive(Debug, Deserialize, Default)]
struct ConsoleConfigFile {
    protocol: Option<String>,
    host: Option<String>,
    camera_id: Option<String>,
    ports: Option<PortsConfigFile>,
    display: Option<DisplayConfigFile>,
}

#[derive(Debug, Deserialize, Default)]
struct PortsConfigFile {
    stream: Option<u16>,
    control: Option<u16>,
    detect: Option<u16>,
    rtmp: Option<u16>,
}

#[derive(Debug, Deserialize, Default)]
struct DisplayConfigFile {
    target_fps: Option<u32>,
    jpeg_quality: Option<u8>,
    poll_interval_ms: Option<u64>,
}

#[derive(Debug, Clone)]
pub struct ConsoleConfig {
    pub protocol: String,
    pub host: String,
    pub camera_id: String,
    pub ports: PortSettings,
    pub display: DisplaySettings,
}

#[derive(Debug, Clone)]
pub struct PortSettings {
    pub stream: u16,
    pub control: u16,
    pub detect: u16,
    pub rtmp: u16,
}

#[derive(Debug, Clone)]
pub struct DisplaySettings {
    pub target_fps: u32,
    pub jpeg_quality: u8,
    pub poll_interval: Duration,
}

impl Default for ConsoleConfig {
    fn default() -> Self {
        Self {
            protocol: DEFAULT_PROTOCOL.to_string(),
            host: DEFAULT_HOST.to_string(),
            camera_id: DEFAULT_CAMERA_ID.to_string(),
            ports: PortSettings::default(),
            display: DisplaySettings::default(),
        }
    }
}

impl Default for PortSettings {
    fn default() -> Self {
        Self {
            stream: DEFAULT_STREAM_PORT,
            control: DEFAULT_CONTROL_PORT,
            detect: DEFAULT_DETECT_PORT,
            rtmp: DEFAULT_RTMP_PORT,
        }
    }
}

impl Default for DisplaySettings {
    fn default() -> Self {
        Self {
            target_fps: DEFAULT_TARGET_FPS,
            jpeg_quality: DEFAULT_JPEG_QUALITY,
            poll_interval: Duration::from_millis(DEFAULT_POLL_INTERVAL_MS),
        }
    }
}

impl ConsoleConfig {
    pub fn load() -> Result<Self> {
        let config_path = std::env::var("FIREWATCH_CONFIG").ok();
        let file_cfg = match config_path.as_deref() {
            Some(path) => Some(read_config_file(Path::new(path))?),
            None => None,
        };
        let mut cfg = Self::from_file(file_cfg.unwrap_or_default());
        cfg.apply_env()?;
        cfg.validate()?;
        Ok(cfg)
    }

    fn from_file(file: ConsoleConfigFile) -> Self {
        let defaults = Self::default();
        let ports = PortSettings {
            stream: file
                .ports
                .as_ref()
                .and_then(|ports| ports.stream)
                .unwrap_or(DEFAULT_STREAM_PORT),
            control: file
                .ports
                .as_ref()
                .and_then(|ports| ports.control)
                .unwrap_or(DEFAULT_CONTROL_PORT),
            detect: file
                .ports
                .as_ref()
                .and_then(|ports| ports.detect)
                .unwrap_or(DEFAULT_DETECT_PORT),
            rtmp: file
                .ports
                .as_ref()
                .and_then(|ports| ports.rtmp)
                .unwrap_or(DEFAULT_RTMP_PORT),
        };
        let display = DisplaySettings {
            target_fps: file
                .display
                .as_ref()
                .and_then(|display| display.target_fps)
                .unwrap_or(DEFAULT_TARGET_FPS),
            jpeg_quality: file
                .display
                .as_ref()
                .and_then(|display| display.jpeg_quality)
                .unwrap_or(DEFAULT_JPEG_QUALITY),
            poll_interval: Duration::from_millis(
                file.display
                    .as_ref()
                    .and_then(|display| display.poll_interval_ms)
                    .unwrap_or(DEFAULT_POLL_INTERVAL_MS),
            ),
        };
        Self {
            protocol: file.protocol.unwrap_or(defaults.protocol),
            host: file.host.unwrap_or(defaults.host),
            camera_id: file.camera_id.unwrap_or(defaults.camera_id),
            ports,
            display,
        }
    }

    fn apply_env(&mut self) -> Result<()> {
        if let Ok(protocol) = std::env::var("FIREWATCH_PROTOCOL") {
            if !protocol.trim().is_empty() {
                self.protocol = protocol;
            }
        }
        if let Ok(host) = std::env::var("FIREWATCH_HOST") {
            if !host.trim().is_empty() {
                self.host = host;
            }
        }
        if let Ok(camera_id) = std::env::var("FIREWATCH_CAMERA_ID") {
            if !camera_id.trim().is_empty() {
                self.camera_id = camera_id;
            }
        }
        if let Some(port) = env_port("FIREWATCH_STREAM_PORT")? {
            self.ports.stream = port;
        }
        if let Some(port) = env_port("FIREWATCH_CONTROL_PORT")? {
            self.ports.control = port;
        }
        if let Some(port) = env_port("FIREWATCH_DETECT_PORT")? {
            self.ports.detect = port;
        }
        if let Some(port) = env_port("FIREWATCH_RTMP_PORT")? {
            self.ports.rtmp = port;
        }
        if let Ok(fps) = std::env::var("FIREWATCH_TARGET_FPS") {
            self.display.target_fps = fps
                .parse()
                .map_err(|_| anyhow!("FIREWATCH_TARGET_FPS must be an integer frame rate"))?;
        }
        if let Ok(quality) = std::env::var("FIREWATCH_JPEG_QUALITY") {
            self.display.jpeg_quality = quality
                .parse()
                .map_err(|_| anyhow!("FIREWATCH_JPEG_QUALITY must be an integer quality value"))?;
        }
        if let Ok(interval) = std::env::var("FIREWATCH_POLL_INTERVAL_MS") {
            let millis: u64 = interval.parse().map_err(|_| {
                anyhow!("FIREWATCH_POLL_INTERVAL_MS must be an integer number of milliseconds")
            })?;
            self.display.poll_interval = Duration::from_millis(millis);
        }
        Ok(())
    }

    /// Re-run after any field override.
    pub fn validate(&mut self) -> Result<()> {
        if self.protocol != "http" && self.protocol != "https" {
            return Err(anyhow!(
                "unsupported protocol '{}'; expected http or https",
                self.protocol
            ));
        }
        if self.host.trim().is_empty() {
            return Err(anyhow!("host must not be empty"));
        }
        if self.camera_id.trim().is_empty() {
            return Err(anyhow!("camera_id must not be empty"));
        }
        if self.display.target_fps == 0 {
            return Err(anyhow!("target_fps must be greater than zero"));
        }
        if self.display.jpeg_quality == 0 || self.display.jpeg_quality > 100 {
            return Err(anyhow!("jpeg_quality must be in 1..=100"));
        }
        if self.display.poll_interval.is_zero() {
            return Err(anyhow!("poll_interval must be greater than zero"));
        }
        let base = format!("{}://{}:{}/", self.protocol, self.host, self.ports.stream);
        Url::parse(&base).map_err(|e| anyhow!("invalid host '{}': {}", self.host, e))?;
        Ok(())
    }

    pub fn endpoints(&self) -> Endpoints {
        Endpoints::new(&self.protocol, &self.host, self.ports.clone())
    }
}

/// Backend URL construction. Every consumer goes through here so host and
/// port layout live in one place.
#[derive(Debug, Clone)]
pub struct Endpoints {
    protocol: String,
    host: String,
    ports: PortSettings,
}

impl Endpoints {
    pub fn new(protocol: &str, host: &str, ports: PortSettings) -> Self {
        Self {
            protocol: protocol.to_string(),
            host: host.to_string(),
            ports,
        }
    }

    fn base(&self, port: u16) -> String {
        format!("{}://{}:{}", self.protocol, self.host, port)
    }

    pub fn detect(&self) -> String {
        format!("{}/detect", self.base(self.ports.detect))
    }

    pub fn playlist(&self) -> String {
        format!("{}/hls/stream.m3u8", self.base(self.ports.control))
    }

    pub fn offer(&self) -> String {
        format!("{}/webrtc/offer", self.base(self.ports.control))
    }

    /// Feed URL with a cache-defeating query value; callers pass fresh wall
    /// millis per (re)connect.
    pub fn video_feed(&self, stream: &str, cache_bust: u64) -> String {
        format!(
            "{}/video_feed/{}?t={}",
            self.base(self.ports.stream),
            stream,
            cache_bust
        )
    }

    pub fn status(&self) -> String {
        format!("{}/api/status", self.base(self.ports.stream))
    }

    pub fn fire_status(&self) -> String {
        format!("{}/api/fire_status", self.base(self.ports.stream))
    }

    pub fn test_detection(&self) -> String {
        format!("{}/api/test_fire_detection", self.base(self.ports.stream))
    }

    /// Publisher-side ingest URL, shown to the operator for reference.
    pub fn rtmp_publish(&self) -> String {
        format!("rtmp://{}:{}/live/stream", self.host, self.ports.rtmp)
    }
}

fn read_config_file(path: &Path) -> Result<ConsoleConfigFile> {
    let raw = std::fs::read_to_string(path)
        .map_err(|e| anyhow!("failed to read config file {}: {}", path.display(), e))?;
    let cfg = serde_json::from_str(&raw)
        .map_err(|e| anyhow!("invalid config file {}: {}", path.display(), e))?;
    Ok(cfg)
}

fn env_port(key: &str) -> Result<Option<u16>> {
    match std::env::var(key) {
        Ok(value) if !value.trim().is_empty() => {
            let port: u16 = value
                .parse()
                .map_err(|_| anyhow!("{} must be a port number", key))?;
            Ok(Some(port))
        }
        _ => Ok(None),
    }
}

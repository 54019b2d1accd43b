use anyhow::{anyhow, Context, Result};
use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::time::Duration;

use crate::detect::MotionSettings;
use crate::ingest::SourceSettings;
use crate::notify::{
    Notifier, QueuedNotifier, WebhookNotifier, DEFAULT_NOTIFY_TIMEOUT, DEFAULT_QUEUE_CAPACITY,
};
use crate::segment::{
    FfmpegSinkFactory, MjpegSinkFactory, RotationPolicy, SinkFactory, DEFAULT_JPEG_QUALITY,
    DEFAULT_ROTATION_PERIOD,
};
use crate::throttle::DEFAULT_ALERT_COOLDOWN;

const DEFAULT_CAMERA_URL: &str = "stub://front_camera";
const DEFAULT_CAMERA_FPS: u32 = 20;
const DEFAULT_CAMERA_WIDTH: u32 = 640;
const DEFAULT_CAMERA_HEIGHT: u32 = 480;
const DEFAULT_FFMPEG_BIN: &str = "ffmpeg";
const DEFAULT_PREVIEW_EVERY: u64 = 10;
const DEFAULT_HEALTH_SECS: u64 = 5;

#[derive(Debug, Deserialize, Default)]
#[serde(deny_unknown_fields)]
struct WatcherConfigFile {
    camera: Option<CameraConfigFile>,
    storage: Option<StorageConfigFile>,
    alerts: Option<AlertConfigFile>,
    motion: Option<MotionConfigFile>,
    preview: Option<PreviewConfigFile>,
    health_interval_secs: Option<u64>,
}

#[derive(Debug, Deserialize, Default)]
#[serde(deny_unknown_fields)]
struct CameraConfigFile {
    url: Option<String>,
    target_fps: Option<u32>,
    width: Option<u32>,
    height: Option<u32>,
}

#[derive(Debug, Deserialize, Default)]
#[serde(deny_unknown_fields)]
struct StorageConfigFile {
    path: Option<PathBuf>,
    container: Option<String>,
    rotation_secs: Option<u64>,
    rotation_policy: Option<String>,
    jpeg_quality: Option<u8>,
    ffmpeg_bin: Option<PathBuf>,
}

#[derive(Debug, Deserialize, Default)]
#[serde(deny_unknown_fields)]
struct AlertConfigFile {
    webhook_url: Option<String>,
    cooldown_secs: Option<u64>,
    timeout_secs: Option<u64>,
    queue: Option<bool>,
}

#[derive(Debug, Deserialize, Default)]
#[serde(deny_unknown_fields)]
struct MotionConfigFile {
    buffer_depth: Option<usize>,
    blur_kernel: Option<usize>,
    threshold: Option<u16>,
    dilate_iterations: Option<u32>,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct PreviewConfigFile {
    path: PathBuf,
    every_frames: Option<u64>,
}

/// Output container / encoder for segments.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Container {
    Mjpeg,
    Ffmpeg,
}

impl FromStr for Container {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "mjpeg" => Ok(Self::Mjpeg),
            "ffmpeg" | "avi" | "x264" => Ok(Self::Ffmpeg),
            other => Err(anyhow!(
                "unknown container '{}'; expected mjpeg or ffmpeg",
                other
            )),
        }
    }
}

#[derive(Debug, Clone)]
pub struct WatcherConfig {
    pub camera: CameraSettings,
    pub storage: StorageSettings,
    pub alerts: AlertSettings,
    pub motion: MotionSettings,
    pub preview: Option<PreviewSettings>,
    pub health_interval: Duration,
}

#[derive(Debug, Clone)]
pub struct CameraSettings {
    pub url: String,
    pub target_fps: u32,
    pub width: u32,
    pub height: u32,
}

#[derive(Debug, Clone)]
pub struct StorageSettings {
    pub path: PathBuf,
    pub container: Container,
    pub rotation_period: Duration,
    pub rotation_policy: RotationPolicy,
    pub jpeg_quality: u8,
    pub ffmpeg_bin: PathBuf,
}

#[derive(Debug, Clone)]
pub struct AlertSettings {
    pub webhook_url: Option<String>,
    pub cooldown: Duration,
    pub timeout: Duration,
    /// Dispatch on a background worker instead of the capture loop.
    pub queue: bool,
    pub queue_capacity: usize,
}

#[derive(Debug, Clone)]
pub struct PreviewSettings {
    pub path: PathBuf,
    pub every_frames: u64,
}

impl Default for WatcherConfig {
    fn default() -> Self {
        Self {
            camera: CameraSettings {
                url: DEFAULT_CAMERA_URL.to_string(),
                target_fps: DEFAULT_CAMERA_FPS,
                width: DEFAULT_CAMERA_WIDTH,
                height: DEFAULT_CAMERA_HEIGHT,
            },
            storage: StorageSettings {
                path: PathBuf::new(),
                container: Container::Mjpeg,
                rotation_period: DEFAULT_ROTATION_PERIOD,
                rotation_policy: RotationPolicy::default(),
                jpeg_quality: DEFAULT_JPEG_QUALITY,
                ffmpeg_bin: PathBuf::from(DEFAULT_FFMPEG_BIN),
            },
            alerts: AlertSettings {
                webhook_url: None,
                cooldown: DEFAULT_ALERT_COOLDOWN,
                timeout: DEFAULT_NOTIFY_TIMEOUT,
                queue: true,
                queue_capacity: DEFAULT_QUEUE_CAPACITY,
            },
            motion: MotionSettings::default(),
            preview: None,
            health_interval: Duration::from_secs(DEFAULT_HEALTH_SECS),
        }
    }
}

impl WatcherConfig {
    /// Defaults, then the config file (`path` or `BIRBWATCH_CONFIG`), then
    /// environment overrides, then validation.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let env_path = std::env::var("BIRBWATCH_CONFIG")
            .ok()
            .filter(|p| !p.trim().is_empty())
            .map(PathBuf::from);
        let file_cfg = match path.map(Path::to_path_buf).or(env_path) {
            Some(path) => Some(read_config_file(&path)?),
            None => None,
        };
        let mut cfg = Self::from_file(file_cfg.unwrap_or_default())?;
        cfg.apply_env()?;
        cfg.validate()?;
        Ok(cfg)
    }

    fn from_file(file: WatcherConfigFile) -> Result<Self> {
        let mut cfg = Self::default();

        if let Some(camera) = file.camera {
            if let Some(url) = camera.url {
                cfg.camera.url = url;
            }
            if let Some(fps) = camera.target_fps {
                cfg.camera.target_fps = fps;
            }
            if let Some(width) = camera.width {
                cfg.camera.width = width;
            }
            if let Some(height) = camera.height {
                cfg.camera.height = height;
            }
        }

        if let Some(storage) = file.storage {
            if let Some(path) = storage.path {
                cfg.storage.path = path;
            }
            if let Some(container) = storage.container {
                cfg.storage.container = container.parse()?;
            }
            if let Some(secs) = storage.rotation_secs {
                cfg.storage.rotation_period = Duration::from_secs(secs);
            }
            if let Some(policy) = storage.rotation_policy {
                cfg.storage.rotation_policy = policy.parse()?;
            }
            if let Some(quality) = storage.jpeg_quality {
                cfg.storage.jpeg_quality = quality;
            }
            if let Some(bin) = storage.ffmpeg_bin {
                cfg.storage.ffmpeg_bin = bin;
            }
        }

        if let Some(alerts) = file.alerts {
            cfg.alerts.webhook_url = alerts.webhook_url.filter(|u| !u.trim().is_empty());
            if let Some(secs) = alerts.cooldown_secs {
                cfg.alerts.cooldown = Duration::from_secs(secs);
            }
            if let Some(secs) = alerts.timeout_secs {
                cfg.alerts.timeout = Duration::from_secs(secs);
            }
            if let Some(queue) = alerts.queue {
                cfg.alerts.queue = queue;
            }
        }

        if let Some(motion) = file.motion {
            if let Some(depth) = motion.buffer_depth {
                cfg.motion.buffer_depth = depth;
            }
            if let Some(kernel) = motion.blur_kernel {
                cfg.motion.blur_kernel = kernel;
            }
            if let Some(threshold) = motion.threshold {
                cfg.motion.threshold = u8::try_from(threshold).map_err(|_| {
                    anyhow!("motion threshold must be 0..=255, got {}", threshold)
                })?;
            }
            if let Some(iterations) = motion.dilate_iterations {
                cfg.motion.dilate_iterations = iterations;
            }
        }

        cfg.preview = file.preview.map(|p| PreviewSettings {
            path: p.path,
            every_frames: p.every_frames.unwrap_or(DEFAULT_PREVIEW_EVERY),
        });
        if let Some(secs) = file.health_interval_secs {
            cfg.health_interval = Duration::from_secs(secs);
        }
        Ok(cfg)
    }

    fn apply_env(&mut self) -> Result<()> {
        if let Ok(url) = std::env::var("BIRBWATCH_CAMERA_URL") {
            if !url.trim().is_empty() {
                self.camera.url = url;
            }
        }
        if let Ok(path) = std::env::var("BIRBWATCH_STORAGE_PATH") {
            if !path.trim().is_empty() {
                self.storage.path = PathBuf::from(path);
            }
        }
        if let Ok(url) = std::env::var("BIRBWATCH_WEBHOOK_URL") {
            if !url.trim().is_empty() {
                self.alerts.webhook_url = Some(url);
            }
        }
        if let Ok(secs) = std::env::var("BIRBWATCH_ROTATION_SECS") {
            let seconds: u64 = secs.parse().map_err(|_| {
                anyhow!("BIRBWATCH_ROTATION_SECS must be an integer number of seconds")
            })?;
            self.storage.rotation_period = Duration::from_secs(seconds);
        }
        if let Ok(secs) = std::env::var("BIRBWATCH_ALERT_COOLDOWN_SECS") {
            let seconds: u64 = secs.parse().map_err(|_| {
                anyhow!("BIRBWATCH_ALERT_COOLDOWN_SECS must be an integer number of seconds")
            })?;
            self.alerts.cooldown = Duration::from_secs(seconds);
        }
        Ok(())
    }

    pub fn validate(&self) -> Result<()> {
        if self.camera.url.trim().is_empty() {
            return Err(anyhow!("camera url must not be empty"));
        }
        if self.camera.target_fps == 0 {
            return Err(anyhow!("camera target_fps must be greater than zero"));
        }
        if self.camera.width == 0 || self.camera.height == 0 {
            return Err(anyhow!("camera width and height must be greater than zero"));
        }
        if self.storage.rotation_period.as_secs() == 0 {
            return Err(anyhow!("rotation period must be greater than zero"));
        }
        self.motion.validate()?;
        if let Some(url) = &self.alerts.webhook_url {
            let parsed = url::Url::parse(url).context("parse webhook url")?;
            if !matches!(parsed.scheme(), "http" | "https") {
                return Err(anyhow!("webhook url must be http(s), got {}", parsed.scheme()));
            }
        }
        Ok(())
    }

    pub fn source_settings(&self, max_frames: Option<u64>) -> SourceSettings {
        SourceSettings {
            url: self.camera.url.clone(),
            target_fps: self.camera.target_fps,
            width: self.camera.width,
            height: self.camera.height,
            max_frames,
        }
    }

    pub fn sink_factory(&self) -> Box<dyn SinkFactory> {
        match self.storage.container {
            Container::Mjpeg => Box::new(MjpegSinkFactory::new(self.storage.jpeg_quality)),
            Container::Ffmpeg => Box::new(FfmpegSinkFactory::new(&self.storage.ffmpeg_bin)),
        }
    }

    /// The configured alert transport, or `None` when no webhook is set.
    pub fn notifier(&self) -> Result<Option<Box<dyn Notifier>>> {
        let Some(url) = &self.alerts.webhook_url else {
            return Ok(None);
        };
        let webhook = WebhookNotifier::new(url, self.alerts.timeout)?;
        if !self.alerts.queue {
            return Ok(Some(Box::new(webhook)));
        }
        let queued = QueuedNotifier::spawn(Box::new(webhook), self.alerts.queue_capacity)?;
        Ok(Some(Box::new(queued)))
    }
}

fn read_config_file(path: &Path) -> Result<WatcherConfigFile> {
    let raw = std::fs::read_to_string(path)
        .map_err(|e| anyhow!("failed to read config file {}: {}", path.display(), e))?;
    let is_toml = path
        .extension()
        .is_some_and(|ext| ext.eq_ignore_ascii_case("toml"));
    let cfg = if is_toml {
        toml::from_str(&raw).map_err(|e| anyhow!("invalid config file {}: {}", path.display(), e))?
    } else {
        serde_json::from_str(&raw)
            .map_err(|e| anyhow!("invalid config file {}: {}", path.display(), e))?
    };
    Ok(cfg)
}

//! Network camera source.
//!
//! This module provides `RtspSource` for ingesting frames from IP cameras over
//! RTSP (or HTTP MJPEG, whatever GStreamer's `uridecodebin` understands).
//!
//! The source is responsible for:
//! - Connecting to the camera stream
//! - Decoding and scaling frames to the configured RGB geometry
//! - Stamping each frame with its local capture time
//! - Reporting a clean end of stream separately from device failure

use anyhow::Result;
#[cfg(feature = "rtsp-gstreamer")]
use anyhow::Context;
#[cfg(feature = "rtsp-gstreamer")]
use std::time::{Duration, Instant};

use super::synthetic::SyntheticScene;
use super::{FrameSource, SourceStats, StreamInfo};
use crate::frame::Frame;

/// Configuration for an RTSP source.
#[derive(Clone, Debug)]
pub struct RtspConfig {
    /// Stream URL (e.g., "rtsp://10.0.2.51:8080/video/h264")
    pub url: String,
    /// Target frame rate (frames per second).
    pub target_fps: u32,
    /// Output frame width. Decoded frames are scaled to this size.
    pub width: u32,
    /// Output frame height.
    pub height: u32,
    /// End a `stub://` stream after this many frames.
    pub max_frames: Option<u64>,
}

impl Default for RtspConfig {
    fn default() -> Self {
        Self {
            url: "stub://front_camera".to_string(),
            target_fps: 20,
            width: 640,
            height: 480,
            max_frames: None,
        }
    }
}

/// RTSP frame source.
///
/// Uses GStreamer for real decode, with a synthetic fallback for `stub://` URLs.
pub struct RtspSource {
    backend: RtspBackend,
}

enum RtspBackend {
    Synthetic(SyntheticRtspSource),
    #[cfg(feature = "rtsp-gstreamer")]
    Gstreamer(GstreamerRtspSource),
}

impl RtspSource {
    pub fn new(config: RtspConfig) -> Result<Self> {
        if config.url.starts_with("stub://") {
            Ok(Self {
                backend: RtspBackend::Synthetic(SyntheticRtspSource::new(config)),
            })
        } else {
            #[cfg(feature = "rtsp-gstreamer")]
            {
                Ok(Self {
                    backend: RtspBackend::Gstreamer(GstreamerRtspSource::new(config)?),
                })
            }
            #[cfg(not(feature = "rtsp-gstreamer"))]
            {
                anyhow::bail!(
                    "camera url {} requires the rtsp-gstreamer feature",
                    config.url
                )
            }
        }
    }
}

impl FrameSource for RtspSource {
    fn connect(&mut self) -> Result<()> {
        match &mut self.backend {
            RtspBackend::Synthetic(source) => source.connect(),
            #[cfg(feature = "rtsp-gstreamer")]
            RtspBackend::Gstreamer(source) => source.connect(),
        }
    }

    fn next_frame(&mut self) -> Result<Option<Frame>> {
        match &mut self.backend {
            RtspBackend::Synthetic(source) => source.scene.next_frame(),
            #[cfg(feature = "rtsp-gstreamer")]
            RtspBackend::Gstreamer(source) => source.next_frame(),
        }
    }

    fn stream_info(&self) -> StreamInfo {
        let config = match &self.backend {
            RtspBackend::Synthetic(source) => &source.config,
            #[cfg(feature = "rtsp-gstreamer")]
            RtspBackend::Gstreamer(source) => &source.config,
        };
        StreamInfo {
            width: config.width,
            height: config.height,
            fps: config.target_fps as f64,
        }
    }

    fn is_healthy(&self) -> bool {
        match &self.backend {
            RtspBackend::Synthetic(_) => true,
            #[cfg(feature = "rtsp-gstreamer")]
            RtspBackend::Gstreamer(source) => source.is_healthy(),
        }
    }

    fn stats(&self) -> SourceStats {
        match &self.backend {
            RtspBackend::Synthetic(source) => SourceStats {
                frames_captured: source.scene.frames_generated(),
                source: source.config.url.clone(),
            },
            #[cfg(feature = "rtsp-gstreamer")]
            RtspBackend::Gstreamer(source) => SourceStats {
                frames_captured: source.frame_count,
                source: source.config.url.clone(),
            },
        }
    }

    fn release(&mut self) {
        match &mut self.backend {
            RtspBackend::Synthetic(source) => {
                log::debug!("RtspSource: released {} (synthetic)", source.config.url)
            }
            #[cfg(feature = "rtsp-gstreamer")]
            RtspBackend::Gstreamer(source) => source.release(),
        }
    }
}

// ----------------------------------------------------------------------------
// Synthetic source (stub://) for tests
// ----------------------------------------------------------------------------

struct SyntheticRtspSource {
    config: RtspConfig,
    scene: SyntheticScene,
}

impl SyntheticRtspSource {
    fn new(config: RtspConfig) -> Self {
        let scene = SyntheticScene::new(config.width, config.height, config.max_frames);
        Self { config, scene }
    }

    fn connect(&mut self) -> Result<()> {
        log::info!("RtspSource: connected to {} (synthetic)", self.config.url);
        Ok(())
    }
}

// ----------------------------------------------------------------------------
// Production source using GStreamer
// ----------------------------------------------------------------------------

#[cfg(feature = "rtsp-gstreamer")]
struct GstreamerRtspSource {
    config: RtspConfig,
    pipeline: gstreamer::Pipeline,
    appsink: gstreamer_app::AppSink,
    frame_count: u64,
    last_frame_at: Option<Instant>,
    connected_at: Option<Instant>,
    last_error: Option<String>,
    released: bool,
}

#[cfg(feature = "rtsp-gstreamer")]
impl GstreamerRtspSource {
    fn new(config: RtspConfig) -> Result<Self> {
        gstreamer::init().context("initialize gstreamer")?;

        let pipeline_description = format!(
            "uridecodebin uri={} ! videoconvert ! videoscale ! \
             video/x-raw,format=RGB,width={},height={} ! \
             appsink name=appsink sync=false max-buffers=1 drop=true",
            config.url, config.width, config.height
        );
        let pipeline = gstreamer::parse::launch(&pipeline_description)
            .context("build camera pipeline")?
            .downcast::<gstreamer::Pipeline>()
            .map_err(|_| anyhow::anyhow!("camera pipeline is not a Pipeline"))?;

        let appsink = pipeline
            .by_name("appsink")
            .context("appsink element missing from pipeline")?
            .downcast::<gstreamer_app::AppSink>()
            .map_err(|_| anyhow::anyhow!("appsink element has unexpected type"))?;

        let caps = gstreamer::Caps::builder("video/x-raw")
            .field("format", "RGB")
            .field("width", config.width as i32)
            .field("height", config.height as i32)
            .build();
        appsink.set_caps(Some(&caps));

        Ok(Self {
            config,
            pipeline,
            appsink,
            frame_count: 0,
            last_frame_at: None,
            connected_at: None,
            last_error: None,
            released: false,
        })
    }

    fn connect(&mut self) -> Result<()> {
        self.pipeline
            .set_state(gstreamer::State::Playing)
            .context("set camera pipeline to Playing")?;
        self.connected_at = Some(Instant::now());
        log::info!("RtspSource: connected to {}", self.config.url);
        Ok(())
    }

    fn next_frame(&mut self) -> Result<Option<Frame>> {
        self.poll_bus();
        if let Some(err) = &self.last_error {
            anyhow::bail!("camera stream failed: {}", err);
        }

        let sample = match self
            .appsink
            .try_pull_sample(gstreamer::ClockTime::from_mseconds(self.frame_timeout_ms()))
        {
            Some(sample) => sample,
            None if self.appsink.is_eos() => {
                log::info!("RtspSource: end of stream from {}", self.config.url);
                return Ok(None);
            }
            None => anyhow::bail!("camera stream stalled"),
        };

        let (pixels, width, height) = sample_to_pixels(&sample)?;
        self.frame_count += 1;
        self.last_frame_at = Some(Instant::now());

        Frame::new(
            width,
            height,
            crate::frame::PixelFormat::Rgb24,
            pixels,
            chrono::Local::now(),
        )
        .map(Some)
    }

    fn is_healthy(&self) -> bool {
        if self.last_error.is_some() {
            return false;
        }
        let Some(connected_at) = self.connected_at else {
            return false;
        };
        let Some(last_frame_at) = self.last_frame_at else {
            return connected_at.elapsed() <= Duration::from_secs(5);
        };
        last_frame_at.elapsed() <= Duration::from_millis(self.frame_timeout_ms() * 2)
    }

    fn release(&mut self) {
        if self.released {
            return;
        }
        if let Err(err) = self.pipeline.set_state(gstreamer::State::Null) {
            log::warn!("RtspSource: failed to stop pipeline: {}", err);
        }
        self.released = true;
        log::info!("RtspSource: released {}", self.config.url);
    }

    fn frame_timeout_ms(&self) -> u64 {
        let base_ms = if self.config.target_fps == 0 {
            500
        } else {
            (1000 / self.config.target_fps).saturating_mul(4)
        };
        // Network cameras can take a while to deliver the first keyframe.
        if self.last_frame_at.is_none() {
            return 10_000;
        }
        base_ms.max(2_000) as u64
    }

    fn poll_bus(&mut self) {
        let Some(bus) = self.pipeline.bus() else {
            return;
        };
        while let Some(message) = bus.pop() {
            use gstreamer::MessageView;
            if let MessageView::Error(err) = message.view() {
                self.last_error = Some(format!(
                    "gstreamer error from {:?}: {}",
                    err.src().map(|s| s.path_string()),
                    err.error()
                ));
            }
        }
    }
}

#[cfg(feature = "rtsp-gstreamer")]
impl Drop for GstreamerRtspSource {
    fn drop(&mut self) {
        self.release();
    }
}

#[cfg(feature = "rtsp-gstreamer")]
fn sample_to_pixels(sample: &gstreamer::Sample) -> Result<(Vec<u8>, u32, u32)> {
    let buffer = sample.buffer().context("camera sample missing buffer")?;
    let caps = sample.caps().context("camera sample missing caps")?;
    let info =
        gstreamer_video::VideoInfo::from_caps(caps).context("parse camera caps as video info")?;

    let width = info.width();
    let height = info.height();
    let map = buffer.map_readable().context("map camera buffer")?;
    let pixels = super::normalize::strip_stride(
        map.as_slice(),
        width as usize * 3,
        info.stride()[0] as usize,
        height as usize,
    )?;
    Ok((pixels, width, height))
}

// ----------------------------------------------------------------------------
// Tests
// ----------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    fn stub_config() -> RtspConfig {
        RtspConfig {
            url: "stub://test".to_string(),
            target_fps: 10,
            width: 64,
            height: 48,
            max_frames: None,
        }
    }

    #[test]
    fn rtsp_source_produces_frames() -> Result<()> {
        let mut source = RtspSource::new(stub_config())?;
        source.connect()?;

        let frame = source.next_frame()?.expect("frame");
        assert_eq!(frame.width(), 64);
        assert_eq!(frame.height(), 48);
        assert!(source.is_healthy());

        Ok(())
    }

    #[test]
    fn rtsp_source_reports_configured_stream_info() -> Result<()> {
        let source = RtspSource::new(stub_config())?;
        let info = source.stream_info();
        assert_eq!(info.fps, 10.0);
        assert_eq!((info.width, info.height), (64, 48));
        Ok(())
    }

    #[cfg(not(feature = "rtsp-gstreamer"))]
    #[test]
    fn network_urls_need_gstreamer() {
        let config = RtspConfig {
            url: "rtsp://10.0.2.51:8080/video/h264".to_string(),
            ..stub_config()
        };
        assert!(RtspSource::new(config).is_err());
    }
}

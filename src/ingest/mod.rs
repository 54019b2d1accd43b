//! Frame ingestion sources.
//!
//! This module provides the sources the watcher can pull frames from:
//! - RTSP/HTTP camera streams (feature: rtsp-gstreamer)
//! - Local video files (feature: ingest-file-ffmpeg)
//! - Synthetic `stub://` scenes for tests and demos
//!
//! Every source implements `FrameSource`. Reading blocks until the next frame is
//! decoded; that wait is the only suspension point of the watcher loop.

pub mod file;
#[cfg(feature = "ingest-file-ffmpeg")]
pub(crate) mod file_ffmpeg;
pub(crate) mod normalize;
pub mod rtsp;
mod synthetic;

use anyhow::{anyhow, Result};

use crate::frame::Frame;

pub use file::{FileConfig, FileSource};
pub use rtsp::{RtspConfig, RtspSource};

/// Geometry and cadence a source delivers. Segments are opened with these values.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct StreamInfo {
    pub width: u32,
    pub height: u32,
    pub fps: f64,
}

/// Statistics for a frame source.
#[derive(Clone, Debug)]
pub struct SourceStats {
    pub frames_captured: u64,
    pub source: String,
}

/// A live frame-producing device.
pub trait FrameSource {
    /// Open the underlying stream.
    fn connect(&mut self) -> Result<()>;

    /// Block until the next frame is decoded.
    ///
    /// `Ok(None)` means the stream ended cleanly; `Err` means the device failed.
    fn next_frame(&mut self) -> Result<Option<Frame>>;

    fn stream_info(&self) -> StreamInfo;

    /// Check if the source is healthy.
    fn is_healthy(&self) -> bool;

    fn stats(&self) -> SourceStats;

    /// Release the device handle. Safe to call more than once.
    fn release(&mut self);
}

impl<S: FrameSource + ?Sized> FrameSource for Box<S> {
    fn connect(&mut self) -> Result<()> {
        (**self).connect()
    }

    fn next_frame(&mut self) -> Result<Option<Frame>> {
        (**self).next_frame()
    }

    fn stream_info(&self) -> StreamInfo {
        (**self).stream_info()
    }

    fn is_healthy(&self) -> bool {
        (**self).is_healthy()
    }

    fn stats(&self) -> SourceStats {
        (**self).stats()
    }

    fn release(&mut self) {
        (**self).release()
    }
}

/// Source selection settings, filled from the watcher configuration.
#[derive(Clone, Debug)]
pub struct SourceSettings {
    /// `rtsp://`, `http(s)://`, `stub://`, `file://` or a plain local path.
    pub url: String,
    pub target_fps: u32,
    pub width: u32,
    pub height: u32,
    /// End the stream after this many frames (synthetic sources only).
    pub max_frames: Option<u64>,
}

/// Pick a source implementation from the URL scheme.
///
/// `stub://` and network schemes go to `RtspSource`; `file://` and plain paths go
/// to `FileSource`.
pub fn open_source(settings: &SourceSettings) -> Result<Box<dyn FrameSource>> {
    let url = settings.url.trim();
    if url.is_empty() {
        return Err(anyhow!("camera url must not be empty"));
    }
    if let Some(path) = url.strip_prefix("file://") {
        return Ok(Box::new(FileSource::new(FileConfig {
            path: path.to_string(),
            target_fps: settings.target_fps,
            max_frames: settings.max_frames,
        })?));
    }
    if url.contains("://") {
        return Ok(Box::new(RtspSource::new(RtspConfig {
            url: url.to_string(),
            target_fps: settings.target_fps,
            width: settings.width,
            height: settings.height,
            max_frames: settings.max_frames,
        })?));
    }
    Ok(Box::new(FileSource::new(FileConfig {
        path: url.to_string(),
        target_fps: settings.target_fps,
        max_frames: settings.max_frames,
    })?))
}

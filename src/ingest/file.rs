//! Local file frame source.
//!
//! This module provides `FileSource` for replaying recorded video through the
//! watcher. It is the same contract as a camera, except that the end of the file
//! is reported as a clean end of stream.

use anyhow::{anyhow, Result};

#[cfg(feature = "ingest-file-ffmpeg")]
use super::file_ffmpeg::FfmpegFileSource;
use super::synthetic::SyntheticScene;
use super::{FrameSource, SourceStats, StreamInfo};
use crate::frame::Frame;

/// Synthetic clips are this long unless a frame limit is given.
const SYNTHETIC_CLIP_FRAMES: u64 = 300;
const SYNTHETIC_WIDTH: u32 = 640;
const SYNTHETIC_HEIGHT: u32 = 480;

/// Configuration for a local file source.
#[derive(Clone, Debug)]
pub struct FileConfig {
    /// Local file path (e.g., "/var/lib/birbwatch/sample.mp4").
    pub path: String,
    /// Frame rate reported for the recording when the container does not carry one.
    pub target_fps: u32,
    pub max_frames: Option<u64>,
}

impl Default for FileConfig {
    fn default() -> Self {
        Self {
            path: String::new(),
            target_fps: 20,
            max_frames: None,
        }
    }
}

/// Local file frame source.
pub struct FileSource {
    backend: FileBackend,
}

enum FileBackend {
    Synthetic(SyntheticFileSource),
    #[cfg(feature = "ingest-file-ffmpeg")]
    Ffmpeg(FfmpegFileSource),
}

impl FileSource {
    pub fn new(config: FileConfig) -> Result<Self> {
        if !is_local_file_path(&config.path) {
            return Err(anyhow!(
                "file ingestion only supports local paths (no URL schemes)"
            ));
        }
        if config.path.starts_with("stub://") {
            Ok(Self {
                backend: FileBackend::Synthetic(SyntheticFileSource::new(config)),
            })
        } else {
            #[cfg(feature = "ingest-file-ffmpeg")]
            {
                Ok(Self {
                    backend: FileBackend::Ffmpeg(FfmpegFileSource::new(config)?),
                })
            }
            #[cfg(not(feature = "ingest-file-ffmpeg"))]
            {
                Err(anyhow!(
                    "file ingestion requires the ingest-file-ffmpeg feature"
                ))
            }
        }
    }
}

impl FrameSource for FileSource {
    fn connect(&mut self) -> Result<()> {
        match &mut self.backend {
            FileBackend::Synthetic(source) => {
                log::info!("FileSource: opened {} (synthetic)", source.config.path);
                Ok(())
            }
            #[cfg(feature = "ingest-file-ffmpeg")]
            FileBackend::Ffmpeg(source) => source.connect(),
        }
    }

    fn next_frame(&mut self) -> Result<Option<Frame>> {
        match &mut self.backend {
            FileBackend::Synthetic(source) => source.scene.next_frame(),
            #[cfg(feature = "ingest-file-ffmpeg")]
            FileBackend::Ffmpeg(source) => source.next_frame(),
        }
    }

    fn stream_info(&self) -> StreamInfo {
        match &self.backend {
            FileBackend::Synthetic(source) => StreamInfo {
                width: SYNTHETIC_WIDTH,
                height: SYNTHETIC_HEIGHT,
                fps: source.config.target_fps as f64,
            },
            #[cfg(feature = "ingest-file-ffmpeg")]
            FileBackend::Ffmpeg(source) => source.stream_info(),
        }
    }

    fn is_healthy(&self) -> bool {
        match &self.backend {
            FileBackend::Synthetic(_) => true,
            #[cfg(feature = "ingest-file-ffmpeg")]
            FileBackend::Ffmpeg(source) => source.is_healthy(),
        }
    }

    fn stats(&self) -> SourceStats {
        match &self.backend {
            FileBackend::Synthetic(source) => SourceStats {
                frames_captured: source.scene.frames_generated(),
                source: source.config.path.clone(),
            },
            #[cfg(feature = "ingest-file-ffmpeg")]
            FileBackend::Ffmpeg(source) => source.stats(),
        }
    }

    fn release(&mut self) {
        match &self.backend {
            FileBackend::Synthetic(source) => {
                log::debug!("FileSource: released {} (synthetic)", source.config.path)
            }
            #[cfg(feature = "ingest-file-ffmpeg")]
            FileBackend::Ffmpeg(source) => {
                log::debug!("FileSource: released {}", source.stats().source)
            }
        }
    }
}

// ----------------------------------------------------------------------------
// Synthetic source (stub://) for tests
// ----------------------------------------------------------------------------

struct SyntheticFileSource {
    config: FileConfig,
    scene: SyntheticScene,
}

impl SyntheticFileSource {
    fn new(config: FileConfig) -> Self {
        let limit = config.max_frames.unwrap_or(SYNTHETIC_CLIP_FRAMES);
        let scene = SyntheticScene::new(SYNTHETIC_WIDTH, SYNTHETIC_HEIGHT, Some(limit));
        Self { config, scene }
    }
}

fn is_local_file_path(path: &str) -> bool {
    if path.trim().is_empty() {
        return false;
    }
    if path.starts_with("stub://") {
        return true;
    }
    !path.contains("://")
}

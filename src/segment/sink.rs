//! Encoder boundary for segment files.
//!
//! A `SinkFactory` opens one `VideoSink` per segment. Sinks receive frames in
//! arrival order and must have flushed everything to disk when `finish` returns.

use anyhow::{anyhow, Context, Result};
use image::codecs::jpeg::JpegEncoder;
use image::ExtendedColorType;
use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};

use crate::frame::Frame;

/// Geometry, cadence and codec tag a segment is opened with.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct SegmentFormat {
    pub fourcc: [u8; 4],
    pub fps: f64,
    pub width: u32,
    pub height: u32,
}

impl SegmentFormat {
    pub fn fourcc_str(&self) -> String {
        String::from_utf8_lossy(&self.fourcc).into_owned()
    }
}

/// An open output file.
pub trait VideoSink: Send {
    fn write(&mut self, frame: &Frame) -> Result<()>;

    /// Flush and close the file.
    fn finish(self: Box<Self>) -> Result<()>;
}

/// Opens sinks for new segments.
pub trait SinkFactory: Send {
    /// Container extension, without the dot.
    fn extension(&self) -> &str;

    fn fourcc(&self) -> [u8; 4];

    fn open(&mut self, path: &Path, format: &SegmentFormat) -> Result<Box<dyn VideoSink>>;
}

// ----------------------------------------------------------------------------
// Motion JPEG stream
// ----------------------------------------------------------------------------

pub const DEFAULT_JPEG_QUALITY: u8 = 85;

/// Writes each frame as a baseline JPEG, back to back. The result is a raw MJPEG
/// elementary stream that ffplay and VLC open directly.
pub struct MjpegSinkFactory {
    quality: u8,
}

impl MjpegSinkFactory {
    pub fn new(quality: u8) -> Self {
        Self {
            quality: quality.clamp(1, 100),
        }
    }
}

impl Default for MjpegSinkFactory {
    fn default() -> Self {
        Self::new(DEFAULT_JPEG_QUALITY)
    }
}

impl SinkFactory for MjpegSinkFactory {
    fn extension(&self) -> &str {
        "mjpeg"
    }

    fn fourcc(&self) -> [u8; 4] {
        *b"MJPG"
    }

    fn open(&mut self, path: &Path, format: &SegmentFormat) -> Result<Box<dyn VideoSink>> {
        let file = File::create(path)
            .with_context(|| format!("create segment file {}", path.display()))?;
        Ok(Box::new(MjpegSink {
            path: path.to_path_buf(),
            out: BufWriter::new(file),
            quality: self.quality,
            width: format.width,
            height: format.height,
        }))
    }
}

struct MjpegSink {
    path: PathBuf,
    out: BufWriter<File>,
    quality: u8,
    width: u32,
    height: u32,
}

impl VideoSink for MjpegSink {
    fn write(&mut self, frame: &Frame) -> Result<()> {
        if frame.dimensions() != (self.width, self.height) {
            return Err(anyhow!(
                "frame is {:?} but segment {} is {}x{}",
                frame.dimensions(),
                self.path.display(),
                self.width,
                self.height
            ));
        }
        let rgb = frame.rgb_bytes();
        JpegEncoder::new_with_quality(&mut self.out, self.quality)
            .encode(&rgb, self.width, self.height, ExtendedColorType::Rgb8)
            .map_err(|e| anyhow!("JPEG encode failed for {}: {}", self.path.display(), e))
    }

    fn finish(mut self: Box<Self>) -> Result<()> {
        self.out
            .flush()
            .with_context(|| format!("flush segment {}", self.path.display()))?;
        self.out
            .get_ref()
            .sync_all()
            .with_context(|| format!("sync segment {}", self.path.display()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Local;

    fn format(width: u32, height: u32) -> SegmentFormat {
        SegmentFormat {
            fourcc: *b"MJPG",
            fps: 20.0,
            width,
            height,
        }
    }

    fn write_frames(path: &Path, count: usize) -> Result<Vec<u8>> {
        let mut factory = MjpegSinkFactory::default();
        let mut sink = factory.open(path, &format(16, 8))?;
        for _ in 0..count {
            sink.write(&Frame::solid(16, 8, [90, 120, 200], Local::now()).expect("solid frame"))?;
        }
        sink.finish()?;
        Ok(std::fs::read(path)?)
    }

    #[test]
    fn mjpeg_sink_writes_one_jpeg_per_frame() -> Result<()> {
        let dir = tempfile::tempdir()?;
        let single = write_frames(&dir.path().join("one.mjpeg"), 1)?;
        let triple = write_frames(&dir.path().join("three.mjpeg"), 3)?;

        assert_eq!(&single[..2], &[0xFF, 0xD8]);
        assert_eq!(&single[single.len() - 2..], &[0xFF, 0xD9]);
        assert_eq!(triple.len(), single.len() * 3);
        assert_eq!(&triple[single.len()..single.len() + 2], &[0xFF, 0xD8]);
        Ok(())
    }

    #[test]
    fn mjpeg_sink_rejects_wrong_geometry() -> Result<()> {
        let dir = tempfile::tempdir()?;
        let mut factory = MjpegSinkFactory::default();
        let mut sink = factory.open(&dir.path().join("clip.mjpeg"), &format(16, 8))?;
        assert!(sink
            .write(&Frame::solid(8, 8, [0, 0, 0], Local::now()).expect("solid frame"))
            .is_err());
        Ok(())
    }

    #[test]
    fn fourcc_renders_as_text() {
        assert_eq!(format(1, 1).fourcc_str(), "MJPG");
    }
}

//! Headless stand-in for a live preview window.
//!
//! Every `every_frames` frames the latest annotated frame is written as a JPEG
//! to a fixed path, replacing the previous one atomically, so any image viewer
//! or web page polling the file shows a near-live picture. The file is removed
//! when the preview is closed.

use anyhow::{anyhow, Context, Result};
use image::codecs::jpeg::JpegEncoder;
use image::ExtendedColorType;
use std::path::{Path, PathBuf};

use crate::frame::Frame;

pub struct Preview {
    path: PathBuf,
    every_frames: u64,
    seen: u64,
}

impl Preview {
    pub fn new(path: impl Into<PathBuf>, every_frames: u64) -> Self {
        Self {
            path: path.into(),
            every_frames: every_frames.max(1),
            seen: 0,
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Returns true when this frame was written out.
    pub fn show(&mut self, frame: &Frame) -> Result<bool> {
        self.seen += 1;
        if (self.seen - 1) % self.every_frames != 0 {
            return Ok(false);
        }
        let mut jpeg = Vec::new();
        JpegEncoder::new_with_quality(&mut jpeg, 75)
            .encode(
                &frame.rgb_bytes(),
                frame.width(),
                frame.height(),
                ExtendedColorType::Rgb8,
            )
            .map_err(|e| anyhow!("encode preview: {}", e))?;
        let tmp = self.path.with_extension("jpg.tmp");
        std::fs::write(&tmp, &jpeg)
            .with_context(|| format!("write preview {}", tmp.display()))?;
        std::fs::rename(&tmp, &self.path)
            .with_context(|| format!("replace preview {}", self.path.display()))?;
        Ok(true)
    }

    pub fn close(self) -> Result<()> {
        match std::fs::remove_file(&self.path) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e).with_context(|| format!("remove preview {}", self.path.display())),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Local;

    #[test]
    fn preview_writes_every_nth_frame_and_cleans_up() -> Result<()> {
        let dir = tempfile::tempdir()?;
        let path = dir.path().join("live.jpg");
        let mut preview = Preview::new(&path, 3);
        let frame = Frame::solid(8, 8, [1, 2, 3], Local::now()).expect("solid frame");

        let written: Vec<bool> = (0..4)
            .map(|_| preview.show(&frame))
            .collect::<Result<_>>()?;
        assert_eq!(written, vec![true, false, false, true]);
        assert!(path.exists());

        preview.close()?;
        assert!(!path.exists());
        Ok(())
    }

    #[test]
    fn closing_without_frames_is_fine() -> Result<()> {
        let dir = tempfile::tempdir()?;
        Preview::new(dir.path().join("never.jpg"), 1).close()
    }
}

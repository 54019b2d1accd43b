//! H.264 segments through an external `ffmpeg` process.
//!
//! Frames are piped to ffmpeg's stdin as raw RGB24; ffmpeg encodes and muxes.

use anyhow::{anyhow, bail, Context, Result};
use std::io::Write;
use std::path::{Path, PathBuf};
use std::process::{Child, ChildStdin, Command, Stdio};

use super::sink::{SegmentFormat, SinkFactory, VideoSink};
use crate::frame::Frame;

pub struct FfmpegSinkFactory {
    ffmpeg_bin: PathBuf,
}

impl FfmpegSinkFactory {
    pub fn new(ffmpeg_bin: impl Into<PathBuf>) -> Self {
        Self {
            ffmpeg_bin: ffmpeg_bin.into(),
        }
    }

    fn command(&self, path: &Path, format: &SegmentFormat) -> Command {
        let mut command = Command::new(&self.ffmpeg_bin);
        command
            .args(["-hide_banner", "-loglevel", "error", "-y"])
            .args(["-f", "rawvideo", "-pixel_format", "rgb24"])
            .arg("-video_size")
            .arg(format!("{}x{}", format.width, format.height))
            .arg("-framerate")
            .arg(format!("{}", format.fps))
            .args(["-i", "-", "-c:v", "libx264", "-pix_fmt", "yuv420p"])
            .arg(path)
            .stdin(Stdio::piped())
            .stdout(Stdio::null())
            .stderr(Stdio::inherit());
        command
    }
}

impl Default for FfmpegSinkFactory {
    fn default() -> Self {
        Self::new("ffmpeg")
    }
}

impl SinkFactory for FfmpegSinkFactory {
    fn extension(&self) -> &str {
        "avi"
    }

    fn fourcc(&self) -> [u8; 4] {
        *b"X264"
    }

    fn open(&mut self, path: &Path, format: &SegmentFormat) -> Result<Box<dyn VideoSink>> {
        let mut child = self
            .command(path, format)
            .spawn()
            .with_context(|| format!("spawn {}", self.ffmpeg_bin.display()))?;
        let stdin = child
            .stdin
            .take()
            .ok_or_else(|| anyhow!("ffmpeg stdin was not captured"))?;
        Ok(Box::new(FfmpegSink {
            path: path.to_path_buf(),
            child,
            stdin: Some(stdin),
            width: format.width,
            height: format.height,
        }))
    }
}

struct FfmpegSink {
    path: PathBuf,
    child: Child,
    stdin: Option<ChildStdin>,
    width: u32,
    height: u32,
}

impl VideoSink for FfmpegSink {
    fn write(&mut self, frame: &Frame) -> Result<()> {
        if frame.dimensions() != (self.width, self.height) {
            bail!(
                "frame is {:?} but segment {} is {}x{}",
                frame.dimensions(),
                self.path.display(),
                self.width,
                self.height
            );
        }
        let stdin = self
            .stdin
            .as_mut()
            .ok_or_else(|| anyhow!("ffmpeg input already closed"))?;
        stdin
            .write_all(&frame.rgb_bytes())
            .with_context(|| format!("pipe frame to ffmpeg for {}", self.path.display()))
    }

    fn finish(mut self: Box<Self>) -> Result<()> {
        // Closing stdin tells ffmpeg the stream is complete.
        drop(self.stdin.take());
        let status = self
            .child
            .wait()
            .with_context(|| format!("wait for ffmpeg writing {}", self.path.display()))?;
        if !status.success() {
            bail!("ffmpeg failed for {} with {}", self.path.display(), status);
        }
        Ok(())
    }
}

impl Drop for FfmpegSink {
    fn drop(&mut self) {
        if self.stdin.take().is_some() {
            let _ = self.child.wait();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn command_describes_raw_rgb_input() {
        let factory = FfmpegSinkFactory::new("/usr/bin/ffmpeg");
        let format = SegmentFormat {
            fourcc: *b"X264",
            fps: 20.0,
            width: 640,
            height: 480,
        };
        let command = factory.command(Path::new("/tmp/out.avi"), &format);
        let args: Vec<String> = command
            .get_args()
            .map(|a| a.to_string_lossy().into_owned())
            .collect();
        assert!(args.windows(2).any(|w| w == ["-video_size", "640x480"]));
        assert!(args.windows(2).any(|w| w == ["-framerate", "20"]));
        assert_eq!(args.last().map(String::as_str), Some("/tmp/out.avi"));
    }

    #[test]
    fn missing_binary_is_an_open_error() {
        let mut factory = FfmpegSinkFactory::new("/nonexistent/ffmpeg-birbwatch");
        let format = SegmentFormat {
            fourcc: *b"X264",
            fps: 20.0,
            width: 4,
            height: 4,
        };
        assert!(factory.open(Path::new("/tmp/never.avi"), &format).is_err());
    }
}

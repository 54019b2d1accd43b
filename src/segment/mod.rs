//! Rotating archive of the recorded stream.
//!
//! `SegmentWriter` owns exactly one open segment at a time. Frames go to it in
//! arrival order; once per frame the watcher asks it to check the rotation
//! boundary. On rotation the current segment is finished before the next one is
//! opened, so no frame is ever written to two files or lost between them.

mod ffmpeg;
mod sink;

use anyhow::{anyhow, bail, Context, Result};
use chrono::{DateTime, Local};
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::frame::Frame;
use crate::ingest::StreamInfo;

pub use ffmpeg::FfmpegSinkFactory;
pub use sink::{MjpegSinkFactory, SegmentFormat, SinkFactory, VideoSink, DEFAULT_JPEG_QUALITY};

pub const DEFAULT_ROTATION_PERIOD: Duration = Duration::from_secs(1800);
const SEGMENT_NAME_FORMAT: &str = "%Y-%m-%d-%H-%M-%S";

/// When a segment is considered full.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum RotationPolicy {
    /// Rotate once the wall clock crosses a multiple of the period (epoch
    /// aligned, e.g. every :00 and :30 for 1800s). A boundary second skipped by a
    /// slow tick is still caught on the next frame.
    #[default]
    Aligned,
    /// Rotate once the segment has been open for at least one period.
    Elapsed,
}

impl std::str::FromStr for RotationPolicy {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "aligned" => Ok(Self::Aligned),
            "elapsed" => Ok(Self::Elapsed),
            other => Err(anyhow!(
                "unknown rotation policy '{}'; expected aligned or elapsed",
                other
            )),
        }
    }
}

/// Snapshot of a segment for logging and summaries.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SegmentInfo {
    pub path: PathBuf,
    pub started_at: DateTime<Local>,
    pub frames: u64,
}

struct OpenSegment {
    info: SegmentInfo,
    sink: Box<dyn VideoSink>,
}

pub struct SegmentWriter {
    storage_dir: PathBuf,
    name_prefix: String,
    factory: Box<dyn SinkFactory>,
    format: SegmentFormat,
    period: Duration,
    policy: RotationPolicy,
    current: Option<OpenSegment>,
    segments_opened: u64,
}

impl SegmentWriter {
    /// `storage` is prepended to every segment name. A path that ends with a
    /// separator, or names an existing directory, holds the segments; anything
    /// else is a directory plus a file name prefix (`/data/cam1_` writes
    /// `/data/cam1_2024-05-01-06-30-00.mjpeg`).
    pub fn new(
        storage: impl Into<PathBuf>,
        factory: Box<dyn SinkFactory>,
        stream: StreamInfo,
        period: Duration,
        policy: RotationPolicy,
    ) -> Result<Self> {
        if period.as_secs() == 0 {
            bail!("rotation period must be at least one second");
        }
        let format = SegmentFormat {
            fourcc: factory.fourcc(),
            fps: stream.fps,
            width: stream.width,
            height: stream.height,
        };
        let (storage_dir, name_prefix) = split_storage(&storage.into());
        Ok(Self {
            storage_dir,
            name_prefix,
            factory,
            format,
            period,
            policy,
            current: None,
            segments_opened: 0,
        })
    }

    pub fn format(&self) -> &SegmentFormat {
        &self.format
    }

    pub fn segments_opened(&self) -> u64 {
        self.segments_opened
    }

    pub fn current(&self) -> Option<&SegmentInfo> {
        self.current.as_ref().map(|segment| &segment.info)
    }

    /// Path a segment opened at `now` would get.
    pub fn segment_path(&self, now: DateTime<Local>) -> PathBuf {
        let stem = format!("{}{}", self.name_prefix, now.format(SEGMENT_NAME_FORMAT));
        let ext = self.factory.extension();
        let mut path = self.storage_dir.join(format!("{stem}.{ext}"));
        let mut suffix = 1;
        while path.exists() {
            path = self.storage_dir.join(format!("{stem}-{suffix}.{ext}"));
            suffix += 1;
        }
        path
    }

    /// Open a new segment. Any segment still open is finished first.
    pub fn open(&mut self, now: DateTime<Local>) -> Result<&SegmentInfo> {
        self.close()?;
        ensure_dir(&self.storage_dir)?;
        let path = self.segment_path(now);
        let sink = self
            .factory
            .open(&path, &self.format)
            .with_context(|| format!("open segment {}", path.display()))?;
        self.segments_opened += 1;
        log::info!(
            "opened segment {} ({}x{} @ {} fps, {})",
            path.display(),
            self.format.width,
            self.format.height,
            self.format.fps,
            self.format.fourcc_str()
        );
        let segment = self.current.insert(OpenSegment {
            info: SegmentInfo {
                path,
                started_at: now,
                frames: 0,
            },
            sink,
        });
        Ok(&segment.info)
    }

    /// Append a frame to the open segment.
    pub fn write(&mut self, frame: &Frame) -> Result<()> {
        let segment = self
            .current
            .as_mut()
            .ok_or_else(|| anyhow!("no segment is open"))?;
        if frame.dimensions() != (self.format.width, self.format.height) {
            bail!(
                "frame is {}x{} but segments are {}x{}",
                frame.width(),
                frame.height(),
                self.format.width,
                self.format.height
            );
        }
        segment
            .sink
            .write(frame)
            .with_context(|| format!("write to segment {}", segment.info.path.display()))?;
        segment.info.frames += 1;
        Ok(())
    }

    /// Whether the open segment has reached its rotation boundary at `now`.
    pub fn rotation_due(&self, now: DateTime<Local>) -> bool {
        let Some(segment) = &self.current else {
            return false;
        };
        let period = self.period.as_secs() as i64;
        let started = segment.info.started_at;
        match self.policy {
            RotationPolicy::Aligned => {
                now.timestamp().div_euclid(period) > started.timestamp().div_euclid(period)
            }
            RotationPolicy::Elapsed => (now - started).num_seconds() >= period,
        }
    }

    /// Rotate to a fresh segment if the boundary has been reached.
    /// Returns true when a rotation happened.
    pub fn maybe_rotate(&mut self, now: DateTime<Local>) -> Result<bool> {
        if !self.rotation_due(now) {
            return Ok(false);
        }
        self.open(now)?;
        Ok(true)
    }

    /// Finish the open segment, if any.
    pub fn close(&mut self) -> Result<Option<SegmentInfo>> {
        let Some(segment) = self.current.take() else {
            return Ok(None);
        };
        let info = segment.info;
        segment
            .sink
            .finish()
            .with_context(|| format!("close segment {}", info.path.display()))?;
        log::info!(
            "closed segment {} ({} frames)",
            info.path.display(),
            info.frames
        );
        Ok(Some(info))
    }
}

fn split_storage(storage: &Path) -> (PathBuf, String) {
    let raw = storage.as_os_str().to_string_lossy();
    let is_dir = raw.is_empty() || raw.ends_with(std::path::is_separator) || storage.is_dir();
    if is_dir {
        return (storage.to_path_buf(), String::new());
    }
    let prefix = storage
        .file_name()
        .map(|name| name.to_string_lossy().into_owned())
        .unwrap_or_default();
    let dir = storage.parent().map(Path::to_path_buf).unwrap_or_default();
    (dir, prefix)
}

fn ensure_dir(dir: &Path) -> Result<()> {
    if dir.as_os_str().is_empty() {
        return Ok(());
    }
    std::fs::create_dir_all(dir)
        .with_context(|| format!("create storage directory {}", dir.display()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use std::sync::{Arc, Mutex};

    /// Events seen by the recording sinks, in order.
    #[derive(Debug, Clone, PartialEq, Eq)]
    enum Event {
        Open(String),
        Write(String, u8),
        Finish(String),
    }

    #[derive(Clone, Default)]
    struct Recorder {
        events: Arc<Mutex<Vec<Event>>>,
    }

    impl Recorder {
        fn events(&self) -> Vec<Event> {
            self.events.lock().expect("events").clone()
        }
    }

    struct RecordingSink {
        name: String,
        recorder: Recorder,
    }

    impl VideoSink for RecordingSink {
        fn write(&mut self, frame: &Frame) -> Result<()> {
            let marker = frame.as_bytes()[0];
            self.recorder
                .events
                .lock()
                .expect("events")
                .push(Event::Write(self.name.clone(), marker));
            Ok(())
        }

        fn finish(self: Box<Self>) -> Result<()> {
            self.recorder
                .events
                .lock()
                .expect("events")
                .push(Event::Finish(self.name.clone()));
            Ok(())
        }
    }

    struct RecordingFactory {
        recorder: Recorder,
    }

    impl SinkFactory for RecordingFactory {
        fn extension(&self) -> &str {
            "rec"
        }

        fn fourcc(&self) -> [u8; 4] {
            *b"TEST"
        }

        fn open(&mut self, path: &Path, _format: &SegmentFormat) -> Result<Box<dyn VideoSink>> {
            let name = path
                .file_name()
                .map(|n| n.to_string_lossy().into_owned())
                .unwrap_or_default();
            self.recorder
                .events
                .lock()
                .expect("events")
                .push(Event::Open(name.clone()));
            Ok(Box::new(RecordingSink {
                name,
                recorder: self.recorder.clone(),
            }))
        }
    }

    const BASE: i64 = 1_800 * 944_000;

    fn at(secs: i64) -> DateTime<Local> {
        Local
            .timestamp_opt(BASE + secs, 0)
            .single()
            .expect("valid timestamp")
    }

    fn frame(marker: u8) -> Frame {
        Frame::solid(4, 2, [marker, 0, 0], at(0)).expect("solid frame")
    }

    fn writer(dir: &Path, policy: RotationPolicy) -> (SegmentWriter, Recorder) {
        let recorder = Recorder::default();
        let writer = SegmentWriter::new(
            dir,
            Box::new(RecordingFactory {
                recorder: recorder.clone(),
            }),
            StreamInfo {
                width: 4,
                height: 2,
                fps: 20.0,
            },
            DEFAULT_ROTATION_PERIOD,
            policy,
        )
        .expect("writer");
        (writer, recorder)
    }

    #[test]
    fn segment_names_follow_timestamp_convention() {
        let dir = tempfile::tempdir().expect("tempdir");
        let (writer, _) = writer(dir.path(), RotationPolicy::Aligned);
        let expected = format!("{}.rec", at(5).format("%Y-%m-%d-%H-%M-%S"));
        assert_eq!(writer.segment_path(at(5)), dir.path().join(expected));
    }

    #[test]
    fn aligned_rotation_fires_on_boundary_second() -> Result<()> {
        let dir = tempfile::tempdir()?;
        let (mut writer, _) = writer(dir.path(), RotationPolicy::Aligned);
        writer.open(at(10))?;
        assert!(!writer.maybe_rotate(at(11))?);
        assert!(!writer.maybe_rotate(at(1_799))?);
        assert!(writer.maybe_rotate(at(1_800))?);
        // Same boundary second again: already rotated.
        assert!(!writer.maybe_rotate(at(1_800))?);
        assert_eq!(writer.segments_opened(), 2);
        Ok(())
    }

    #[test]
    fn aligned_rotation_catches_a_skipped_boundary() -> Result<()> {
        let dir = tempfile::tempdir()?;
        let (mut writer, _) = writer(dir.path(), RotationPolicy::Aligned);
        writer.open(at(1_790))?;
        assert!(!writer.maybe_rotate(at(1_799))?);
        assert!(writer.maybe_rotate(at(1_802))?);
        assert!(!writer.maybe_rotate(at(3_599))?);
        Ok(())
    }

    #[test]
    fn elapsed_rotation_measures_from_segment_start() -> Result<()> {
        let dir = tempfile::tempdir()?;
        let (mut writer, _) = writer(dir.path(), RotationPolicy::Elapsed);
        writer.open(at(100))?;
        assert!(!writer.maybe_rotate(at(1_800))?);
        assert!(!writer.maybe_rotate(at(1_899))?);
        assert!(writer.maybe_rotate(at(1_900))?);
        assert_eq!(writer.current().map(|s| s.started_at), Some(at(1_900)));
        Ok(())
    }

    #[test]
    fn rotation_closes_before_opening_and_keeps_every_frame() -> Result<()> {
        let dir = tempfile::tempdir()?;
        let (mut writer, recorder) = writer(dir.path(), RotationPolicy::Aligned);
        writer.open(at(1_797))?;
        // Each tick writes first, then checks the boundary.
        for (i, t) in (1_797..1_803).enumerate() {
            writer.write(&frame(i as u8))?;
            writer.maybe_rotate(at(t))?;
        }
        writer.close()?;

        let first = format!("{}.rec", at(1_797).format("%Y-%m-%d-%H-%M-%S"));
        let second = format!("{}.rec", at(1_800).format("%Y-%m-%d-%H-%M-%S"));
        let w = |name: &String, m: u8| Event::Write(name.clone(), m);
        assert_eq!(
            recorder.events(),
            vec![
                Event::Open(first.clone()),
                w(&first, 0),
                w(&first, 1),
                w(&first, 2),
                w(&first, 3),
                Event::Finish(first.clone()),
                Event::Open(second.clone()),
                w(&second, 4),
                w(&second, 5),
                Event::Finish(second),
            ]
        );
        Ok(())
    }

    #[test]
    fn write_without_open_segment_fails() {
        let dir = tempfile::tempdir().expect("tempdir");
        let (mut writer, _) = writer(dir.path(), RotationPolicy::Aligned);
        assert!(writer.write(&frame(0)).is_err());
        assert!(!writer.rotation_due(at(1_800)));
    }

    #[test]
    fn write_rejects_mismatched_geometry() -> Result<()> {
        let dir = tempfile::tempdir()?;
        let (mut writer, _) = writer(dir.path(), RotationPolicy::Aligned);
        writer.open(at(0))?;
        assert!(writer
            .write(&Frame::solid(8, 8, [0, 0, 0], at(0)).expect("solid frame"))
            .is_err());
        Ok(())
    }

    #[test]
    fn close_reports_frame_count_and_is_idempotent() -> Result<()> {
        let dir = tempfile::tempdir()?;
        let (mut writer, _) = writer(dir.path(), RotationPolicy::Aligned);
        writer.open(at(0))?;
        writer.write(&frame(1))?;
        writer.write(&frame(2))?;
        let info = writer.close()?.expect("segment info");
        assert_eq!(info.frames, 2);
        assert!(writer.close()?.is_none());
        Ok(())
    }

    #[test]
    fn storage_path_without_separator_is_a_name_prefix() -> Result<()> {
        let dir = tempfile::tempdir()?;
        let (writer, _) = writer(&dir.path().join("cam1_"), RotationPolicy::Aligned);
        let expected = format!("cam1_{}.rec", at(5).format("%Y-%m-%d-%H-%M-%S"));
        assert_eq!(writer.segment_path(at(5)), dir.path().join(expected));
        Ok(())
    }

    #[test]
    fn storage_directory_is_created() -> Result<()> {
        let dir = tempfile::tempdir()?;
        let nested = dir.path().join("archive").join("cam1/");
        let mut writer = SegmentWriter::new(
            &nested,
            Box::new(MjpegSinkFactory::default()),
            StreamInfo {
                width: 4,
                height: 2,
                fps: 20.0,
            },
            DEFAULT_ROTATION_PERIOD,
            RotationPolicy::Aligned,
        )?;
        let path = writer.open(at(0))?.path.clone();
        writer.write(&frame(9))?;
        writer.close()?;
        assert!(path.starts_with(&nested));
        assert!(std::fs::metadata(&path)?.len() > 0);
        Ok(())
    }

    #[test]
    fn zero_period_is_rejected() {
        let result = SegmentWriter::new(
            "/tmp",
            Box::new(MjpegSinkFactory::default()),
            StreamInfo {
                width: 4,
                height: 2,
                fps: 20.0,
            },
            Duration::from_millis(500),
            RotationPolicy::Aligned,
        );
        assert!(result.is_err());
    }

    #[test]
    fn rotation_policy_parses() {
        assert_eq!(
            "Elapsed".parse::<RotationPolicy>().ok(),
            Some(RotationPolicy::Elapsed)
        );
        assert!("hourly".parse::<RotationPolicy>().is_err());
    }
}

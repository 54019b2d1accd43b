//! The watcher loop.
//!
//! One tick processes one frame end to end:
//! read -> detect -> throttle/alert -> annotate -> write -> rotate check -> stop check.
//! The watcher owns the detector buffer, the throttle state and the open segment;
//! the frame source and notifier are handed in at construction.

use anyhow::anyhow;
use chrono::{DateTime, Local};
use serde::Serialize;
use std::path::PathBuf;
use std::time::{Duration, Instant};

use crate::clock::{Clock, SystemClock};
use crate::config::WatcherConfig;
use crate::detect::{MotionDetector, MotionReport, MotionSettings};
use crate::error::WatchError;
use crate::ingest::FrameSource;
use crate::notify::{alert_message, Notifier};
use crate::overlay::TimestampOverlay;
use crate::preview::Preview;
use crate::segment::{RotationPolicy, SegmentWriter, SinkFactory, DEFAULT_ROTATION_PERIOD};
use crate::signal::StopSignal;
use crate::throttle::AlertThrottle;

const DEFAULT_HEALTH_INTERVAL: Duration = Duration::from_secs(5);

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum WatcherState {
    Idle,
    Running,
    Stopped,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum StopReason {
    EndOfStream,
    StopRequested,
    FrameLimit,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum TickOutcome {
    Continue,
    Stop(StopReason),
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize)]
pub struct RunSummary {
    pub frames: u64,
    pub motion_frames: u64,
    /// Alerts delivered. Queued alerts are settled when the watcher shuts down.
    pub alerts_sent: u64,
    pub alerts_failed: u64,
    pub segments_opened: u64,
    pub stop_reason: Option<StopReason>,
}

/// Where and how segments are written. Turned into a `SegmentWriter` once the
/// source has reported its geometry.
pub struct RecordingPlan {
    pub storage_dir: PathBuf,
    pub sink: Box<dyn SinkFactory>,
    pub rotation_period: Duration,
    pub rotation_policy: RotationPolicy,
}

impl RecordingPlan {
    pub fn new(storage_dir: impl Into<PathBuf>, sink: Box<dyn SinkFactory>) -> Self {
        Self {
            storage_dir: storage_dir.into(),
            sink,
            rotation_period: DEFAULT_ROTATION_PERIOD,
            rotation_policy: RotationPolicy::default(),
        }
    }

    pub fn with_rotation(mut self, period: Duration, policy: RotationPolicy) -> Self {
        self.rotation_period = period;
        self.rotation_policy = policy;
        self
    }
}

pub struct Watcher<S: FrameSource> {
    source: S,
    detector: MotionDetector,
    throttle: AlertThrottle,
    notifier: Option<Box<dyn Notifier>>,
    plan: Option<RecordingPlan>,
    writer: Option<SegmentWriter>,
    overlay: TimestampOverlay,
    preview: Option<Preview>,
    clock: Box<dyn Clock>,
    stop: StopSignal,
    max_frames: Option<u64>,
    health_interval: Duration,
    last_health_log: Instant,
    in_motion: bool,
    state: WatcherState,
    summary: RunSummary,
}

impl<S: FrameSource> Watcher<S> {
    pub fn new(source: S, motion: MotionSettings, plan: RecordingPlan) -> Result<Self, WatchError> {
        let detector = MotionDetector::new(motion).map_err(WatchError::Config)?;
        Ok(Self {
            source,
            detector,
            throttle: AlertThrottle::default(),
            notifier: None,
            plan: Some(plan),
            writer: None,
            overlay: TimestampOverlay::default(),
            preview: None,
            clock: Box::new(SystemClock),
            stop: StopSignal::new(),
            max_frames: None,
            health_interval: DEFAULT_HEALTH_INTERVAL,
            last_health_log: Instant::now(),
            in_motion: false,
            state: WatcherState::Idle,
            summary: RunSummary::default(),
        })
    }

    /// Build a watcher with every collaborator taken from `cfg`.
    pub fn from_config(source: S, cfg: &WatcherConfig) -> Result<Self, WatchError> {
        cfg.validate().map_err(WatchError::Config)?;
        let plan = RecordingPlan::new(cfg.storage.path.clone(), cfg.sink_factory())
            .with_rotation(cfg.storage.rotation_period, cfg.storage.rotation_policy);
        let notifier = cfg.notifier().map_err(WatchError::Config)?;
        let preview = cfg
            .preview
            .as_ref()
            .map(|p| Preview::new(p.path.clone(), p.every_frames));
        Ok(Self::new(source, cfg.motion, plan)?
            .with_notifier(notifier)
            .with_throttle(AlertThrottle::new(cfg.alerts.cooldown))
            .with_preview(preview)
            .with_health_interval(cfg.health_interval))
    }

    /// Alerts are only attempted when a notifier is present.
    pub fn with_notifier(mut self, notifier: Option<Box<dyn Notifier>>) -> Self {
        self.notifier = notifier;
        self
    }

    pub fn with_throttle(mut self, throttle: AlertThrottle) -> Self {
        self.throttle = throttle;
        self
    }

    pub fn with_clock(mut self, clock: Box<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    pub fn with_stop_signal(mut self, stop: StopSignal) -> Self {
        self.stop = stop;
        self
    }

    pub fn with_overlay(mut self, overlay: TimestampOverlay) -> Self {
        self.overlay = overlay;
        self
    }

    pub fn with_preview(mut self, preview: Option<Preview>) -> Self {
        self.preview = preview;
        self
    }

    pub fn with_max_frames(mut self, max_frames: Option<u64>) -> Self {
        self.max_frames = max_frames;
        self
    }

    pub fn with_health_interval(mut self, interval: Duration) -> Self {
        self.health_interval = interval;
        self
    }

    pub fn state(&self) -> WatcherState {
        self.state
    }

    pub fn summary(&self) -> &RunSummary {
        &self.summary
    }

    pub fn throttle(&self) -> &AlertThrottle {
        &self.throttle
    }

    pub fn detector(&self) -> &MotionDetector {
        &self.detector
    }

    pub fn stop_signal(&self) -> StopSignal {
        self.stop.clone()
    }

    /// Idle -> Running: connect the source and open the first segment.
    pub fn start(&mut self) -> Result<(), WatchError> {
        if self.state != WatcherState::Idle {
            return Err(WatchError::Config(anyhow!(
                "watcher cannot start from {:?}",
                self.state
            )));
        }
        self.source
            .connect()
            .map_err(|e| WatchError::Source(e.context("connect frame source")))?;
        let stream = self.source.stream_info();
        log::info!(
            "source {} connected ({}x{} @ {} fps)",
            self.source.stats().source,
            stream.width,
            stream.height,
            stream.fps
        );

        let plan = self
            .plan
            .take()
            .ok_or_else(|| WatchError::Config(anyhow!("recording plan already consumed")))?;
        let mut writer = SegmentWriter::new(
            plan.storage_dir,
            plan.sink,
            stream,
            plan.rotation_period,
            plan.rotation_policy,
        )
        .map_err(WatchError::Config)?;
        writer
            .open(self.clock.now())
            .map_err(WatchError::Encoding)?;
        self.writer = Some(writer);
        self.summary.segments_opened = self.segments_opened();
        self.last_health_log = Instant::now();
        self.state = WatcherState::Running;
        Ok(())
    }

    /// Process exactly one frame.
    pub fn tick(&mut self) -> Result<TickOutcome, WatchError> {
        if self.state != WatcherState::Running {
            return Err(WatchError::Config(anyhow!(
                "watcher is not running ({:?})",
                self.state
            )));
        }

        let frame = match self.source.next_frame() {
            Ok(Some(frame)) => frame,
            Ok(None) => {
                log::info!("frame source reported end of stream");
                return Ok(TickOutcome::Stop(StopReason::EndOfStream));
            }
            Err(e) => return Err(WatchError::Source(e.context("read frame"))),
        };
        let now = self.clock.now();

        let report = self.detector.analyze(&frame);
        self.note_motion(&report);
        if report.motion {
            self.summary.motion_frames += 1;
            self.dispatch_alert(now);
        }

        let annotated = self.overlay.annotate(frame);
        let writer = self
            .writer
            .as_mut()
            .ok_or_else(|| WatchError::Encoding(anyhow!("no segment writer")))?;
        writer.write(&annotated).map_err(WatchError::Encoding)?;
        writer.maybe_rotate(now).map_err(WatchError::Encoding)?;
        self.summary.segments_opened = writer.segments_opened();

        if let Some(preview) = self.preview.as_mut() {
            if let Err(e) = preview.show(&annotated) {
                log::warn!("preview update failed: {:#}", e);
            }
        }

        self.summary.frames += 1;
        self.log_health();

        if self.max_frames.is_some_and(|max| self.summary.frames >= max) {
            return Ok(TickOutcome::Stop(StopReason::FrameLimit));
        }
        if self.stop.is_requested() {
            return Ok(TickOutcome::Stop(StopReason::StopRequested));
        }
        Ok(TickOutcome::Continue)
    }

    /// Start if needed, tick until a stop condition, then shut down.
    ///
    /// Shutdown runs on every path, including errors from `start` or `tick`.
    pub fn run(&mut self) -> Result<RunSummary, WatchError> {
        let outcome = self.run_until_stop();
        let shutdown = self.shutdown();
        let reason = outcome?;
        shutdown?;
        self.summary.stop_reason = Some(reason);
        log::info!(
            "watcher stopped ({:?}): {} frames, {} with motion, {} alerts sent, {} failed, {} segments",
            reason,
            self.summary.frames,
            self.summary.motion_frames,
            self.summary.alerts_sent,
            self.summary.alerts_failed,
            self.summary.segments_opened
        );
        Ok(self.summary.clone())
    }

    fn run_until_stop(&mut self) -> Result<StopReason, WatchError> {
        if self.state == WatcherState::Idle {
            self.start()?;
        }
        loop {
            if let TickOutcome::Stop(reason) = self.tick()? {
                return Ok(reason);
            }
        }
    }

    /// Running -> Stopped: close the open segment, release the source, wait for
    /// queued alerts, remove the preview. Every step runs even if an earlier one
    /// fails; the first failure is returned. Calling it again is a no-op.
    pub fn shutdown(&mut self) -> Result<(), WatchError> {
        if self.state == WatcherState::Stopped {
            return Ok(());
        }
        let mut first_err = None;

        if let Some(writer) = self.writer.as_mut() {
            if let Err(e) = writer.close() {
                log::error!("failed to close segment: {:#}", e);
                first_err.get_or_insert(WatchError::Encoding(e));
            }
        }
        self.summary.segments_opened = self.segments_opened();

        self.source.release();

        if let Some(notifier) = self.notifier.as_mut() {
            let late = notifier.drain();
            if late > 0 {
                log::warn!("{} queued alert(s) failed after dispatch", late);
                let late = late.min(self.summary.alerts_sent);
                self.summary.alerts_sent -= late;
                self.summary.alerts_failed += late;
            }
        }

        if let Some(preview) = self.preview.take() {
            if let Err(e) = preview.close() {
                log::warn!("failed to remove preview: {:#}", e);
            }
        }

        self.state = WatcherState::Stopped;
        match first_err {
            Some(err) => Err(err),
            None => Ok(()),
        }
    }

    fn segments_opened(&self) -> u64 {
        self.writer
            .as_ref()
            .map(SegmentWriter::segments_opened)
            .unwrap_or(0)
    }

    /// Throttled, non-fatal alert. The throttle records every attempt so a
    /// failing transport is retried at most once per cooldown.
    fn dispatch_alert(&mut self, now: DateTime<Local>) {
        let Some(notifier) = self.notifier.as_ref() else {
            return;
        };
        if !self.throttle.should_alert(now) {
            log::debug!(
                "alert suppressed, {}s of cooldown left",
                self.throttle.remaining(now).as_secs()
            );
            return;
        }
        let text = alert_message(now);
        match notifier.send(&text) {
            Ok(()) => {
                self.summary.alerts_sent += 1;
                log::info!("alert dispatched: {}", text);
            }
            Err(e) => {
                self.summary.alerts_failed += 1;
                log::warn!("{}", WatchError::Notification(e));
            }
        }
        self.throttle.record_alert(now);
    }

    fn note_motion(&mut self, report: &MotionReport) {
        match (self.in_motion, report.motion) {
            (false, true) => log::info!(
                "motion started: {} region(s), {} changed pixels",
                report.regions.len(),
                report.changed_pixels
            ),
            (true, false) => log::info!("motion ended"),
            _ => {}
        }
        self.in_motion = report.motion;
    }

    fn log_health(&mut self) {
        if self.last_health_log.elapsed() < self.health_interval {
            return;
        }
        let stats = self.source.stats();
        let segment = self
            .writer
            .as_ref()
            .and_then(SegmentWriter::current)
            .map(|s| s.path.display().to_string())
            .unwrap_or_else(|| "-".to_string());
        log::info!(
            "source health={} captured={} processed={} segment={} source={}",
            self.source.is_healthy(),
            stats.frames_captured,
            self.summary.frames,
            segment,
            stats.source
        );
        self.last_health_log = Instant::now();
    }
}

impl<S: FrameSource> Drop for Watcher<S> {
    fn drop(&mut self) {
        if self.state == WatcherState::Running {
            if let Err(e) = self.shutdown() {
                log::error!("watcher shutdown on drop failed: {}", e);
            }
        }
    }
}

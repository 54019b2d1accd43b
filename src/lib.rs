//! Birb Watcher
//!
//! Records a camera stream to rotating segment files, burns a capture timestamp
//! into every frame, and sends a rate-limited alert when motion is seen.
//!
//! # Architecture
//!
//! Frames flow one at a time, synchronously:
//!
//! 1. **Ingest**: a `FrameSource` yields typed frames (RTSP/HTTP, local file, or synthetic).
//! 2. **Detect**: `MotionDetector` blurs, buffers the last N frames and diffs the
//!    newest against the oldest.
//! 3. **Alert**: `AlertThrottle` gates an optional `Notifier`.
//! 4. **Record**: `TimestampOverlay` annotates, `SegmentWriter` appends and rotates.
//!
//! # Module Structure
//!
//! - `frame`: pixel-format-tagged frames
//! - `ingest`: frame sources
//! - `detect`: filters, contours, rolling buffer, motion detector
//! - `segment`: encoder sinks and segment rotation
//! - `notify` / `throttle`: alert transport and cooldown
//! - `pipeline`: the `Watcher` state machine
//! - `config`: layered configuration

pub mod clock;
pub mod config;
pub mod detect;
pub mod error;
pub mod frame;
pub mod ingest;
pub mod notify;
pub mod overlay;
pub mod pipeline;
pub mod preview;
pub mod segment;
pub mod signal;
pub mod throttle;

pub use clock::{Clock, ManualClock, SystemClock};
pub use config::{Container, WatcherConfig};
pub use detect::{MotionDetector, MotionRegion, MotionReport, MotionSettings, RollingBuffer};
pub use error::WatchError;
pub use frame::{Frame, PixelFormat};
pub use ingest::{open_source, FrameSource, SourceSettings, SourceStats, StreamInfo};
pub use ingest::{FileConfig, FileSource, RtspConfig, RtspSource};
pub use notify::{alert_message, LogNotifier, Notifier, QueuedNotifier, WebhookNotifier};
pub use overlay::{format_timestamp, TimestampOverlay};
pub use pipeline::{RecordingPlan, RunSummary, StopReason, TickOutcome, Watcher, WatcherState};
pub use preview::Preview;
pub use segment::{
    FfmpegSinkFactory, MjpegSinkFactory, RotationPolicy, SegmentFormat, SegmentInfo,
    SegmentWriter, SinkFactory, VideoSink,
};
pub use signal::StopSignal;
pub use throttle::AlertThrottle;

//! Frame-differencing motion detector.
//!
//! Each observed frame is reduced to luminance, smoothed, and appended to a
//! rolling buffer. The current frame is then compared with the *oldest* frame
//! still buffered, not the previous one, so a change has to persist across the
//! buffer's time span instead of flickering between adjacent frames.

use anyhow::{anyhow, Result};
use image::GrayImage;
use std::collections::VecDeque;

use super::contours::{find_regions, MotionRegion};
use super::filters::{abs_diff, dilate, gaussian_blur, gaussian_kernel, threshold};
use crate::frame::Frame;

pub const DEFAULT_BUFFER_DEPTH: usize = 10;
pub const DEFAULT_BLUR_KERNEL: usize = 15;
pub const DEFAULT_THRESHOLD: u8 = 25;
pub const DEFAULT_DILATE_ITERATIONS: u32 = 2;

/// Tuning knobs for `MotionDetector`.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct MotionSettings {
    pub buffer_depth: usize,
    /// Side length of the square Gaussian kernel. Must be odd.
    pub blur_kernel: usize,
    pub threshold: u8,
    pub dilate_iterations: u32,
}

impl Default for MotionSettings {
    fn default() -> Self {
        Self {
            buffer_depth: DEFAULT_BUFFER_DEPTH,
            blur_kernel: DEFAULT_BLUR_KERNEL,
            threshold: DEFAULT_THRESHOLD,
            dilate_iterations: DEFAULT_DILATE_ITERATIONS,
        }
    }
}

impl MotionSettings {
    pub fn validate(&self) -> Result<()> {
        if self.buffer_depth == 0 {
            return Err(anyhow!("motion buffer depth must be at least 1"));
        }
        if self.blur_kernel == 0 || self.blur_kernel % 2 == 0 {
            return Err(anyhow!(
                "blur kernel must be a positive odd size, got {}",
                self.blur_kernel
            ));
        }
        Ok(())
    }
}

/// Fixed-capacity FIFO of preprocessed frames.
pub struct RollingBuffer {
    frames: VecDeque<GrayImage>,
    capacity: usize,
}

impl RollingBuffer {
    pub fn new(capacity: usize) -> Self {
        Self {
            frames: VecDeque::with_capacity(capacity),
            capacity,
        }
    }

    /// Append a frame, evicting the oldest once capacity is exceeded.
    pub fn push(&mut self, frame: GrayImage) {
        self.frames.push_back(frame);
        while self.frames.len() > self.capacity {
            self.frames.pop_front();
        }
    }

    pub fn oldest(&self) -> Option<&GrayImage> {
        self.frames.front()
    }

    pub fn newest(&self) -> Option<&GrayImage> {
        self.frames.back()
    }

    pub fn len(&self) -> usize {
        self.frames.len()
    }

    pub fn is_empty(&self) -> bool {
        self.frames.is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn is_full(&self) -> bool {
        self.frames.len() == self.capacity
    }

    pub fn clear(&mut self) {
        self.frames.clear();
    }
}

/// Outcome of analysing one frame.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct MotionReport {
    pub motion: bool,
    /// Connected regions in the dilated change mask.
    pub regions: Vec<MotionRegion>,
    /// Pixels above threshold before dilation.
    pub changed_pixels: usize,
}

pub struct MotionDetector {
    settings: MotionSettings,
    kernel: Vec<f32>,
    buffer: RollingBuffer,
}

impl MotionDetector {
    pub fn new(settings: MotionSettings) -> Result<Self> {
        settings.validate()?;
        Ok(Self {
            kernel: gaussian_kernel(settings.blur_kernel),
            buffer: RollingBuffer::new(settings.buffer_depth),
            settings,
        })
    }

    pub fn settings(&self) -> &MotionSettings {
        &self.settings
    }

    pub fn buffer(&self) -> &RollingBuffer {
        &self.buffer
    }

    /// Classify a frame as motion / no motion.
    pub fn observe(&mut self, frame: &Frame) -> bool {
        self.analyze(frame).motion
    }

    /// Run the full detection pass and report the changed regions.
    pub fn analyze(&mut self, frame: &Frame) -> MotionReport {
        let smoothed = gaussian_blur(&frame.to_luma(), &self.kernel);

        if let Some(newest) = self.buffer.newest() {
            if newest.dimensions() != smoothed.dimensions() {
                log::warn!(
                    "frame size changed from {:?} to {:?}; resetting motion buffer",
                    newest.dimensions(),
                    smoothed.dimensions()
                );
                self.buffer.clear();
            }
        }
        self.buffer.push(smoothed);

        let (Some(current), Some(oldest)) = (self.buffer.newest(), self.buffer.oldest()) else {
            return MotionReport::default();
        };
        let mask = threshold(&abs_diff(current, oldest), self.settings.threshold);
        let changed_pixels = mask.as_raw().iter().filter(|&&v| v != 0).count();
        if changed_pixels == 0 {
            return MotionReport::default();
        }
        let dilated = dilate(&mask, self.settings.dilate_iterations);
        let regions = find_regions(&dilated);

        MotionReport {
            motion: !regions.is_empty(),
            regions,
            changed_pixels,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Local;

    fn solid(v: u8) -> Frame {
        Frame::solid(48, 36, [v, v, v], Local::now()).expect("solid frame")
    }

    fn with_patch(base: u8, patch: u8) -> Frame {
        let mut frame = solid(base);
        for y in 10..26 {
            for x in 14..34 {
                frame.blend_pixel(x, y, [patch, patch, patch], 255);
            }
        }
        frame
    }

    fn detector() -> MotionDetector {
        MotionDetector::new(MotionSettings::default()).expect("detector")
    }

    #[test]
    fn rolling_buffer_evicts_oldest() {
        let mut buffer = RollingBuffer::new(3);
        for v in 0..5u8 {
            buffer.push(GrayImage::from_pixel(1, 1, image::Luma([v])));
        }
        assert_eq!(buffer.len(), 3);
        assert!(buffer.is_full());
        assert_eq!(buffer.oldest().map(|f| f.get_pixel(0, 0)[0]), Some(2));
        assert_eq!(buffer.newest().map(|f| f.get_pixel(0, 0)[0]), Some(4));
    }

    #[test]
    fn first_observation_never_reports_motion() {
        let mut det = detector();
        assert!(!det.observe(&with_patch(0, 255)));
    }

    #[test]
    fn identical_frames_never_report_motion() {
        let mut det = detector();
        for _ in 0..=DEFAULT_BUFFER_DEPTH {
            assert!(!det.observe(&solid(128)));
        }
        assert_eq!(det.buffer().len(), DEFAULT_BUFFER_DEPTH);
    }

    #[test]
    fn large_change_against_buffered_background_is_motion() {
        let mut det = detector();
        for _ in 0..DEFAULT_BUFFER_DEPTH {
            assert!(!det.observe(&solid(20)));
        }
        let report = det.analyze(&with_patch(20, 230));
        assert!(report.motion);
        assert_eq!(report.regions.len(), 1);
        assert!(report.changed_pixels > 0);
    }

    #[test]
    fn small_intensity_change_stays_below_threshold() {
        let mut det = detector();
        det.observe(&solid(100));
        assert!(!det.observe(&solid(120)));
        assert!(det.observe(&solid(140)));
    }

    #[test]
    fn compares_against_oldest_not_previous() {
        let settings = MotionSettings {
            buffer_depth: 3,
            ..MotionSettings::default()
        };
        let mut det = MotionDetector::new(settings).expect("detector");
        det.observe(&solid(0));
        assert!(det.observe(&solid(200)));
        // Previous frame is identical, but the oldest buffered one is still black.
        assert!(det.observe(&solid(200)));
        // Black frame has now been evicted.
        assert!(!det.observe(&solid(200)));
    }

    #[test]
    fn size_change_resets_buffer() {
        let mut det = detector();
        det.observe(&solid(0));
        let bigger = Frame::solid(64, 48, [255, 255, 255], Local::now()).expect("solid frame");
        assert!(!det.observe(&bigger));
        assert_eq!(det.buffer().len(), 1);
    }

    #[test]
    fn rejects_even_kernel_and_empty_buffer() {
        let even = MotionSettings {
            blur_kernel: 14,
            ..MotionSettings::default()
        };
        assert!(MotionDetector::new(even).is_err());
        let empty = MotionSettings {
            buffer_depth: 0,
            ..MotionSettings::default()
        };
        assert!(MotionDetector::new(empty).is_err());
    }
}

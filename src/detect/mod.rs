mod contours;
pub mod filters;
mod motion;

pub use contours::{find_regions, MotionRegion};
pub use motion::{
    MotionDetector, MotionReport, MotionSettings, RollingBuffer, DEFAULT_BLUR_KERNEL,
    DEFAULT_BUFFER_DEPTH, DEFAULT_DILATE_ITERATIONS, DEFAULT_THRESHOLD,
};

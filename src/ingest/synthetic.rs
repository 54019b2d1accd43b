//! Synthetic scene shared by the `stub://` sources.
//!
//! A flat grey yard with mild sensor noise. On a fixed cycle a bright square
//! "bird" lands and hops across the frame for a burst of frames, so the whole
//! detection path can be exercised without a camera.

use anyhow::Result;
use chrono::Local;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

use crate::frame::{Frame, PixelFormat};

const BACKGROUND: u8 = 96;
const NOISE: i16 = 2;
const CYCLE_FRAMES: u64 = 50;
const BURST_FRAMES: u64 = 10;

pub(crate) struct SyntheticScene {
    width: u32,
    height: u32,
    frame_count: u64,
    max_frames: Option<u64>,
    rng: StdRng,
}

impl SyntheticScene {
    pub(crate) fn new(width: u32, height: u32, max_frames: Option<u64>) -> Self {
        Self {
            width,
            height,
            frame_count: 0,
            max_frames,
            rng: StdRng::seed_from_u64(0x5eed_b12d),
        }
    }

    pub(crate) fn frames_generated(&self) -> u64 {
        self.frame_count
    }

    /// Render the next frame, or `None` once the frame limit is reached.
    pub(crate) fn next_frame(&mut self) -> Result<Option<Frame>> {
        if self.max_frames.is_some_and(|max| self.frame_count >= max) {
            return Ok(None);
        }
        self.frame_count += 1;
        let pixels = self.render();
        Frame::new(
            self.width,
            self.height,
            PixelFormat::Rgb24,
            pixels,
            Local::now(),
        )
        .map(Some)
    }

    fn render(&mut self) -> Vec<u8> {
        let w = self.width as usize;
        let h = self.height as usize;
        let mut pixels = Vec::with_capacity(w * h * 3);
        for _ in 0..w * h {
            let v = (BACKGROUND as i16 + self.rng.gen_range(-NOISE..=NOISE)) as u8;
            pixels.extend_from_slice(&[v, v, v]);
        }

        let phase = self.frame_count % CYCLE_FRAMES;
        if phase >= CYCLE_FRAMES - BURST_FRAMES {
            let hop = (phase - (CYCLE_FRAMES - BURST_FRAMES)) as usize;
            let side = (w.min(h) / 4).max(1);
            let step = w.saturating_sub(side) / BURST_FRAMES as usize;
            let x0 = (hop * step).min(w - side);
            let y0 = (h - side) / 2;
            for y in y0..y0 + side {
                for x in x0..x0 + side {
                    let offset = (y * w + x) * 3;
                    pixels[offset..offset + 3].copy_from_slice(&[240, 200, 40]);
                }
            }
        }
        pixels
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn scene_is_static_outside_bursts() -> Result<()> {
        let mut scene = SyntheticScene::new(16, 16, None);
        let frame = scene.next_frame()?.expect("frame");
        let max_dev = frame
            .as_bytes()
            .iter()
            .map(|&v| (v as i16 - BACKGROUND as i16).abs())
            .max()
            .unwrap_or(0);
        assert!(max_dev <= NOISE);
        Ok(())
    }

    #[test]
    fn burst_paints_the_bird() -> Result<()> {
        let mut scene = SyntheticScene::new(16, 16, None);
        let mut last = None;
        for _ in 0..(CYCLE_FRAMES - BURST_FRAMES) {
            last = scene.next_frame()?;
        }
        let frame = last.expect("frame");
        assert!(frame.as_bytes().contains(&240));
        Ok(())
    }
}

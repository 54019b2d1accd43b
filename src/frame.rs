//! Frame model.
//!
//! A `Frame` is one decoded image from the camera plus its capture time. The pixel
//! layout is declared by `PixelFormat` and checked when the frame is built, so the
//! detector, overlay and encoders never have to guess channel order or depth.

use anyhow::{anyhow, Result};
use chrono::{DateTime, Local};
use image::GrayImage;
use std::borrow::Cow;

use crate::ingest::normalize::nv12_to_rgb;

/// Memory layout of a frame's pixel data. All formats are 8 bits per channel.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum PixelFormat {
    Rgb24,
    Bgr24,
    Gray8,
}

impl PixelFormat {
    pub fn channels(self) -> usize {
        match self {
            PixelFormat::Rgb24 | PixelFormat::Bgr24 => 3,
            PixelFormat::Gray8 => 1,
        }
    }
}

/// One decoded video frame.
///
/// Pixel bytes are private; the only ways in are the checked constructors.
#[derive(Clone, Debug)]
pub struct Frame {
    width: u32,
    height: u32,
    format: PixelFormat,
    data: Vec<u8>,
    captured_at: DateTime<Local>,
}

impl Frame {
    /// Build a frame, rejecting data whose length does not match the declared layout.
    pub fn new(
        width: u32,
        height: u32,
        format: PixelFormat,
        data: Vec<u8>,
        captured_at: DateTime<Local>,
    ) -> Result<Self> {
        if width == 0 || height == 0 {
            return Err(anyhow!("frame dimensions must be non-zero"));
        }
        let expected = (width as usize)
            .checked_mul(height as usize)
            .and_then(|v| v.checked_mul(format.channels()))
            .ok_or_else(|| anyhow!("frame dimensions overflow"))?;
        if data.len() != expected {
            return Err(anyhow!(
                "{:?} frame length mismatch: expected {}, got {}",
                format,
                expected,
                data.len()
            ));
        }
        Ok(Self {
            width,
            height,
            format,
            data,
            captured_at,
        })
    }

    /// Build an RGB frame from NV12 planes (Y plane followed by interleaved UV).
    pub fn from_nv12(
        width: u32,
        height: u32,
        nv12: &[u8],
        captured_at: DateTime<Local>,
    ) -> Result<Self> {
        let rgb = nv12_to_rgb(nv12, width, height)?;
        Self::new(width, height, PixelFormat::Rgb24, rgb, captured_at)
    }

    /// A frame filled with one RGB colour.
    pub fn solid(
        width: u32,
        height: u32,
        rgb: [u8; 3],
        captured_at: DateTime<Local>,
    ) -> Result<Self> {
        let data = rgb
            .iter()
            .copied()
            .cycle()
            .take(width as usize * height as usize * 3)
            .collect();
        Self::new(width, height, PixelFormat::Rgb24, data, captured_at)
    }

    pub fn width(&self) -> u32 {
        self.width
    }

    pub fn height(&self) -> u32 {
        self.height
    }

    pub fn dimensions(&self) -> (u32, u32) {
        (self.width, self.height)
    }

    pub fn format(&self) -> PixelFormat {
        self.format
    }

    pub fn captured_at(&self) -> DateTime<Local> {
        self.captured_at
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.data
    }

    /// Pixel data as packed RGB24, converting only when needed.
    pub fn rgb_bytes(&self) -> Cow<'_, [u8]> {
        match self.format {
            PixelFormat::Rgb24 => Cow::Borrowed(&self.data),
            PixelFormat::Bgr24 => Cow::Owned(
                self.data
                    .chunks_exact(3)
                    .flat_map(|px| [px[2], px[1], px[0]])
                    .collect(),
            ),
            PixelFormat::Gray8 => Cow::Owned(self.data.iter().flat_map(|&v| [v, v, v]).collect()),
        }
    }

    /// Single-channel luminance using the ITU-R BT.601 weights.
    pub fn to_luma(&self) -> GrayImage {
        let luma: Vec<u8> = match self.format {
            PixelFormat::Gray8 => self.data.clone(),
            PixelFormat::Rgb24 => self
                .data
                .chunks_exact(3)
                .map(|px| luminance(px[0], px[1], px[2]))
                .collect(),
            PixelFormat::Bgr24 => self
                .data
                .chunks_exact(3)
                .map(|px| luminance(px[2], px[1], px[0]))
                .collect(),
        };
        // Length was validated at construction.
        GrayImage::from_raw(self.width, self.height, luma)
            .unwrap_or_else(|| GrayImage::new(self.width, self.height))
    }

    /// Blend an RGB colour into one pixel. `coverage` is 0..=255; out-of-range
    /// coordinates are ignored.
    pub(crate) fn blend_pixel(&mut self, x: i32, y: i32, rgb: [u8; 3], coverage: u8) {
        if x < 0 || y < 0 || x >= self.width as i32 || y >= self.height as i32 || coverage == 0 {
            return;
        }
        let channels = self.format.channels();
        let offset = (y as usize * self.width as usize + x as usize) * channels;
        let target: [u8; 3] = match self.format {
            PixelFormat::Rgb24 => rgb,
            PixelFormat::Bgr24 => [rgb[2], rgb[1], rgb[0]],
            PixelFormat::Gray8 => {
                let v = luminance(rgb[0], rgb[1], rgb[2]);
                [v, v, v]
            }
        };
        let alpha = coverage as u32;
        for (c, value) in target.iter().take(channels).enumerate() {
            let dst = &mut self.data[offset + c];
            *dst = ((*value as u32 * alpha + *dst as u32 * (255 - alpha) + 127) / 255) as u8;
        }
    }
}

fn luminance(r: u8, g: u8, b: u8) -> u8 {
    ((299 * r as u32 + 587 * g as u32 + 114 * b as u32 + 500) / 1000) as u8
}

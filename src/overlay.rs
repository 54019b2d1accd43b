//! Capture-time overlay burned into every recorded frame.
//!
//! Text is rendered with a built-in 5x7 bitmap face scaled up to roughly the
//! height of a size-1 Hershey font, thickened to the stroke width, and blended
//! with a one-pixel soft fringe so edges stay smooth after JPEG/H.264 encoding.

use chrono::{DateTime, Local, Timelike};

use crate::frame::Frame;

const GLYPH_W: usize = 5;
const GLYPH_H: usize = 7;

/// `YYYY/MM/DD HH:MM:SS:cc`, with hundredths of a second.
pub fn format_timestamp(at: DateTime<Local>) -> String {
    let centis = (at.nanosecond() % 1_000_000_000) / 10_000_000;
    format!("{}:{:02}", at.format("%Y/%m/%d %H:%M:%S"), centis)
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct TimestampOverlay {
    /// Bottom-left corner of the text (baseline), in pixels.
    pub origin: (i32, i32),
    /// Bitmap pixels per glyph cell.
    pub scale: u32,
    /// Stroke width in pixels.
    pub thickness: u32,
    pub color: [u8; 3],
    pub antialias: bool,
}

impl Default for TimestampOverlay {
    fn default() -> Self {
        Self {
            origin: (10, 35),
            scale: 3,
            thickness: 2,
            color: [0, 255, 0],
            antialias: true,
        }
    }
}

impl TimestampOverlay {
    /// Burn the frame's capture time into it.
    pub fn annotate(&self, mut frame: Frame) -> Frame {
        let text = format_timestamp(frame.captured_at());
        self.draw_text(&mut frame, &text);
        frame
    }

    pub fn draw_text(&self, frame: &mut Frame, text: &str) {
        let mask = self.render_mask(text);
        if mask.width == 0 {
            return;
        }
        let coverage = if self.antialias {
            mask.soften()
        } else {
            mask.pixels.clone()
        };
        let left = self.origin.0 - mask.pad as i32;
        let top = self.origin.1 - (GLYPH_H as u32 * self.scale) as i32 - mask.pad as i32;
        for y in 0..mask.height {
            for x in 0..mask.width {
                let c = coverage[y * mask.width + x];
                frame.blend_pixel(left + x as i32, top + y as i32, self.color, c);
            }
        }
    }

    fn render_mask(&self, text: &str) -> Mask {
        let scale = self.scale.max(1) as usize;
        let grow = self.thickness.saturating_sub(1) as usize;
        let pad = grow + 1;
        let advance = (GLYPH_W + 1) * scale;
        let glyphs: Vec<[u8; GLYPH_H]> = text.chars().filter_map(glyph_bits).collect();
        if glyphs.is_empty() {
            return Mask::default();
        }
        let width = glyphs.len() * advance + 2 * pad;
        let height = GLYPH_H * scale + 2 * pad;
        let mut pixels = vec![0u8; width * height];

        for (i, glyph) in glyphs.iter().enumerate() {
            for (row, pattern) in glyph.iter().enumerate() {
                for col in 0..GLYPH_W {
                    if (pattern >> (GLYPH_W - 1 - col)) & 1 == 0 {
                        continue;
                    }
                    let x0 = pad + i * advance + col * scale;
                    let y0 = pad + row * scale;
                    // Stroke growth extends right and down, keeping the origin fixed.
                    for y in y0..(y0 + scale + grow).min(height) {
                        for x in x0..(x0 + scale + grow).min(width) {
                            pixels[y * width + x] = 255;
                        }
                    }
                }
            }
        }

        Mask {
            width,
            height,
            pad,
            pixels,
        }
    }
}

#[derive(Default)]
struct Mask {
    width: usize,
    height: usize,
    pad: usize,
    pixels: Vec<u8>,
}

impl Mask {
    /// Solid pixels keep full coverage; their outside neighbours get partial
    /// coverage proportional to how many solid pixels touch them.
    fn soften(&self) -> Vec<u8> {
        let (w, h) = (self.width, self.height);
        let mut out = vec![0u8; w * h];
        for y in 0..h {
            for x in 0..w {
                let idx = y * w + x;
                if self.pixels[idx] == 255 {
                    out[idx] = 255;
                    continue;
                }
                let mut touching = 0u32;
                for ny in y.saturating_sub(1)..=(y + 1).min(h - 1) {
                    for nx in x.saturating_sub(1)..=(x + 1).min(w - 1) {
                        if self.pixels[ny * w + nx] == 255 {
                            touching += 1;
                        }
                    }
                }
                out[idx] = (touching * 255 / 9 / 2) as u8;
            }
        }
        out
    }
}

fn glyph_bits(ch: char) -> Option<[u8; GLYPH_H]> {
    match ch {
        '0' => Some([
            0b01110, 0b10001, 0b10011, 0b10101, 0b11001, 0b10001, 0b01110,
        ]),
        '1' => Some([
            0b00100, 0b01100, 0b00100, 0b00100, 0b00100, 0b00100, 0b01110,
        ]),
        '2' => Some([
            0b01110, 0b10001, 0b00001, 0b00010, 0b00100, 0b01000, 0b11111,
        ]),
        '3' => Some([
            0b11110, 0b00001, 0b00001, 0b01110, 0b00001, 0b00001, 0b11110,
        ]),
        '4' => Some([
            0b00010, 0b00110, 0b01010, 0b10010, 0b11111, 0b00010, 0b00010,
        ]),
        '5' => Some([
            0b11111, 0b10000, 0b11110, 0b00001, 0b00001, 0b10001, 0b01110,
        ]),
        '6' => Some([
            0b00110, 0b01000, 0b10000, 0b11110, 0b10001, 0b10001, 0b01110,
        ]),
        '7' => Some([
            0b11111, 0b00001, 0b00010, 0b00100, 0b01000, 0b01000, 0b01000,
        ]),
        '8' => Some([
            0b01110, 0b10001, 0b10001, 0b01110, 0b10001, 0b10001, 0b01110,
        ]),
        '9' => Some([
            0b01110, 0b10001, 0b10001, 0b01111, 0b00001, 0b00010, 0b01100,
        ]),
        '/' => Some([
            0b00001, 0b00010, 0b00010, 0b00100, 0b01000, 0b01000, 0b10000,
        ]),
        ':' => Some([0, 0b00100, 0b00100, 0, 0b00100, 0b00100, 0]),
        '-' => Some([0, 0, 0, 0b11111, 0, 0, 0]),
        '.' => Some([0, 0, 0, 0, 0, 0b00110, 0b00110]),
        ' ' => Some([0; GLYPH_H]),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn at() -> DateTime<Local> {
        Local
            .with_ymd_and_hms(2024, 5, 1, 6, 30, 7)
            .single()
            .expect("valid time")
            + chrono::TimeDelta::milliseconds(456)
    }

    #[test]
    fn timestamp_has_centiseconds() {
        assert_eq!(format_timestamp(at()), "2024/05/01 06:30:07:45");
    }

    #[test]
    fn annotate_draws_green_text_near_origin() {
        let frame = Frame::solid(640, 480, [0, 0, 0], at()).expect("solid frame");
        let annotated = TimestampOverlay::default().annotate(frame);
        let bytes = annotated.as_bytes();
        let pixel = |x: usize, y: usize| &bytes[(y * 640 + x) * 3..(y * 640 + x) * 3 + 3];

        let mut green = 0;
        for y in 0..480 {
            for x in 0..640 {
                let p = pixel(x, y);
                assert_eq!(p[0], 0);
                assert_eq!(p[2], 0);
                if p[1] == 255 {
                    green += 1;
                    assert!((9..=420).contains(&x), "x={x}");
                    assert!((13..=36).contains(&y), "y={y}");
                }
            }
        }
        assert!(green > 100);
    }

    #[test]
    fn antialiasing_adds_partial_coverage() {
        let frame = Frame::solid(400, 60, [0, 0, 0], at()).expect("solid frame");
        let smooth = TimestampOverlay::default().annotate(frame.clone());
        let hard = TimestampOverlay {
            antialias: false,
            ..TimestampOverlay::default()
        }
        .annotate(frame);
        let partial = |f: &Frame| {
            f.as_bytes()
                .chunks_exact(3)
                .filter(|p| p[1] > 0 && p[1] < 255)
                .count()
        };
        assert!(partial(&smooth) > 0);
        assert_eq!(partial(&hard), 0);
    }

    #[test]
    fn text_is_clipped_at_frame_edges() {
        let frame = Frame::solid(20, 20, [10, 10, 10], at()).expect("solid frame");
        let annotated = TimestampOverlay::default().annotate(frame);
        assert_eq!(annotated.dimensions(), (20, 20));
    }

    #[test]
    fn unknown_characters_are_skipped() {
        let overlay = TimestampOverlay::default();
        let mut frame = Frame::solid(100, 60, [0, 0, 0], at()).expect("solid frame");
        overlay.draw_text(&mut frame, "??");
        assert!(frame.as_bytes().iter().all(|&v| v == 0));
    }
}

//! Local file frame source using FFmpeg.
//!
//! Frames are decoded in-memory and scaled to RGB24. The end of the file is
//! reported as `Ok(None)` after the decoder has been drained.

use anyhow::{Context, Result};
use chrono::Local;
use ffmpeg_next as ffmpeg;
use std::time::Instant;

use super::file::FileConfig;
use super::normalize::strip_stride;
use super::{SourceStats, StreamInfo};
use crate::frame::{Frame, PixelFormat};

pub(crate) struct FfmpegFileSource {
    config: FileConfig,
    input: ffmpeg::format::context::Input,
    stream_index: usize,
    decoder: ffmpeg::codec::decoder::Video,
    scaler: ffmpeg::software::scaling::Context,
    fps: f64,
    frame_count: u64,
    eof_sent: bool,
    connected_at: Option<Instant>,
}

impl FfmpegFileSource {
    pub(crate) fn new(config: FileConfig) -> Result<Self> {
        ffmpeg::init().context("initialize ffmpeg")?;
        let input = ffmpeg::format::input(&config.path)
            .with_context(|| format!("failed to open file input '{}' with ffmpeg", config.path))?;
        let input_stream = input
            .streams()
            .best(ffmpeg::media::Type::Video)
            .ok_or_else(|| anyhow::anyhow!("file has no video track"))?;
        let stream_index = input_stream.index();
        let rate = input_stream.avg_frame_rate();
        let fps = if rate.denominator() != 0 && rate.numerator() > 0 {
            f64::from(rate)
        } else {
            config.target_fps as f64
        };
        let context = ffmpeg::codec::context::Context::from_parameters(input_stream.parameters())
            .context("load video decoder parameters")?;
        let decoder = context
            .decoder()
            .video()
            .context("open ffmpeg video decoder")?;

        let scaler = ffmpeg::software::scaling::context::Context::get(
            decoder.format(),
            decoder.width(),
            decoder.height(),
            ffmpeg::util::format::pixel::Pixel::RGB24,
            decoder.width(),
            decoder.height(),
            ffmpeg::software::scaling::flag::Flags::BILINEAR,
        )
        .context("create ffmpeg scaler")?;

        Ok(Self {
            config,
            input,
            stream_index,
            decoder,
            scaler,
            fps,
            frame_count: 0,
            eof_sent: false,
            connected_at: None,
        })
    }

    pub(crate) fn connect(&mut self) -> Result<()> {
        self.connected_at = Some(Instant::now());
        log::info!("FileSource: opened {} (ffmpeg)", self.config.path);
        Ok(())
    }

    pub(crate) fn next_frame(&mut self) -> Result<Option<Frame>> {
        if self
            .config
            .max_frames
            .is_some_and(|max| self.frame_count >= max)
        {
            return Ok(None);
        }
        let mut decoded = ffmpeg::frame::Video::empty();
        loop {
            if self.decoder.receive_frame(&mut decoded).is_ok() {
                return self.convert(&decoded).map(Some);
            }
            if self.eof_sent {
                return Ok(None);
            }
            match self.next_packet() {
                Some(packet) => self
                    .decoder
                    .send_packet(&packet)
                    .context("send packet to ffmpeg decoder")?,
                None => {
                    self.decoder.send_eof().context("flush ffmpeg decoder")?;
                    self.eof_sent = true;
                }
            }
        }
    }

    pub(crate) fn stream_info(&self) -> StreamInfo {
        StreamInfo {
            width: self.decoder.width(),
            height: self.decoder.height(),
            fps: self.fps,
        }
    }

    pub(crate) fn is_healthy(&self) -> bool {
        self.connected_at.is_some()
    }

    pub(crate) fn stats(&self) -> SourceStats {
        SourceStats {
            frames_captured: self.frame_count,
            source: self.config.path.clone(),
        }
    }

    fn next_packet(&mut self) -> Option<ffmpeg::Packet> {
        let stream_index = self.stream_index;
        self.input
            .packets()
            .find(|(stream, _)| stream.index() == stream_index)
            .map(|(_, packet)| packet)
    }

    fn convert(&mut self, decoded: &ffmpeg::frame::Video) -> Result<Frame> {
        let mut rgb_frame = ffmpeg::frame::Video::empty();
        self.scaler
            .run(decoded, &mut rgb_frame)
            .context("scale frame to RGB")?;
        let width = rgb_frame.width();
        let height = rgb_frame.height();
        let pixels = strip_stride(
            rgb_frame.data(0),
            width as usize * 3,
            rgb_frame.stride(0),
            height as usize,
        )
        .context("copy ffmpeg frame rows")?;

        self.frame_count += 1;
        Frame::new(width, height, PixelFormat::Rgb24, pixels, Local::now())
    }
}

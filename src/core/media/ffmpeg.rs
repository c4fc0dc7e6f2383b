//! FFmpeg 视频元素
//!
//! Decodes on seek: each seek positions the demuxer on the preceding keyframe
//! and decodes forward until the first frame at or after the target.

use std::collections::VecDeque;

use anyhow::{anyhow, Context, Result};
use ffmpeg_next as ffmpeg;
use log::{debug, info, warn};
use once_cell::sync::OnceCell;

use super::{MediaEvent, PlaybackHints, ReadyState, VideoElement};
use crate::core::error::DetectError;
use crate::core::video::frame::Frame;

static FFMPEG_INIT: OnceCell<()> = OnceCell::new();

fn init_ffmpeg() -> Result<()> {
    FFMPEG_INIT
        .get_or_try_init(|| ffmpeg::init().context("initialize ffmpeg"))
        .map(|_| ())
}

pub(crate) struct FfmpegVideo {
    src: String,
    input: ffmpeg::format::context::Input,
    stream_index: usize,
    time_base: f64,
    decoder: ffmpeg::codec::decoder::Video,
    scaler: ffmpeg::software::scaling::Context,
    duration: f64,
    position: f64,
    current: Option<Frame>,
    events: VecDeque<MediaEvent>,
}

impl FfmpegVideo {
    pub(crate) fn open(src: &str, hints: PlaybackHints) -> Result<Self> {
        init_ffmpeg()?;
        let input = ffmpeg::format::input(&src)
            .with_context(|| format!("failed to open video input '{}' with ffmpeg", src))?;
        let input_stream = input
            .streams()
            .best(ffmpeg::media::Type::Video)
            .ok_or_else(|| anyhow!("'{}' has no video track", src))?;
        let stream_index = input_stream.index();
        let time_base = f64::from(input_stream.time_base());
        let stream_duration = input_stream.duration();
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
            ffmpeg::util::format::pixel::Pixel::RGBA,
            decoder.width(),
            decoder.height(),
            ffmpeg::software::scaling::flag::Flags::BILINEAR,
        )
        .context("create ffmpeg scaler")?;

        // 容器时长缺失时退回到视频流时长
        let duration = if input.duration() > 0 {
            input.duration() as f64 / f64::from(ffmpeg::ffi::AV_TIME_BASE)
        } else if stream_duration > 0 {
            stream_duration as f64 * time_base
        } else {
            f64::INFINITY
        };

        // Decoding never produces sound, so `muted` needs no action here.
        debug!("Opening {} (muted: {}, autoplay: {})", src, hints.muted, hints.autoplay);

        let mut video = Self {
            src: src.to_string(),
            input,
            stream_index,
            time_base,
            decoder,
            scaler,
            duration,
            position: 0.0,
            current: None,
            events: VecDeque::new(),
        };

        match video.decode_until(0.0) {
            Ok(()) => video.events.push_back(MediaEvent::CanPlay),
            Err(e) => video.events.push_back(MediaEvent::Error(format!("{:#}", e))),
        }

        info!(
            "🎬 Video opened: {} ({}x{}, {:.2}s)",
            video.src,
            video.decoder.width(),
            video.decoder.height(),
            video.duration
        );
        Ok(video)
    }

    fn decode_until(&mut self, target: f64) -> Result<()> {
        let time_base = self.time_base;
        let to_secs = |frame: &ffmpeg::frame::Video| {
            frame
                .timestamp()
                .map(|ts| ts as f64 * time_base)
                .unwrap_or(target)
        };

        let mut decoded = ffmpeg::frame::Video::empty();
        let mut found: Option<(f64, ffmpeg::frame::Video)> = None;
        let mut last: Option<ffmpeg::frame::Video> = None;

        'packets: for (stream, packet) in self.input.packets() {
            if stream.index() != self.stream_index {
                continue;
            }

            self.decoder
                .send_packet(&packet)
                .context("send packet to ffmpeg decoder")?;

            while self.decoder.receive_frame(&mut decoded).is_ok() {
                let pts = to_secs(&decoded);
                if pts + 1e-3 >= target {
                    found = Some((pts, decoded.clone()));
                    break 'packets;
                }
                last = Some(decoded.clone());
            }
        }

        if found.is_none() {
            self.decoder.send_eof().context("flush ffmpeg decoder")?;
            while self.decoder.receive_frame(&mut decoded).is_ok() {
                let pts = to_secs(&decoded);
                if pts + 1e-3 >= target {
                    found = Some((pts, decoded.clone()));
                    break;
                }
                last = Some(decoded.clone());
            }
        }

        if let Some((pts, frame)) = found {
            return self.present(&frame, pts);
        }

        // Past the last frame: hold it and report the end position.
        let end = if self.duration.is_finite() {
            self.duration
        } else {
            target
        };
        match last {
            Some(frame) => self.present(&frame, end),
            None if self.current.is_some() => {
                self.position = end;
                Ok(())
            }
            None => Err(anyhow!("'{}' ended without frames", self.src)),
        }
    }

    fn present(&mut self, decoded: &ffmpeg::frame::Video, pts: f64) -> Result<()> {
        let mut rgba = ffmpeg::frame::Video::empty();
        self.scaler
            .run(decoded, &mut rgba)
            .context("scale frame to RGBA")?;
        self.current = Some(frame_to_rgba(&rgba)?);
        self.position = pts;
        Ok(())
    }
}

impl VideoElement for FfmpegVideo {
    fn poll_event(&mut self) -> Option<MediaEvent> {
        self.events.pop_front()
    }

    fn ready_state(&self) -> ReadyState {
        if self.current.is_some() {
            ReadyState::HaveCurrentData
        } else {
            ReadyState::HaveMetadata
        }
    }

    fn duration(&self) -> f64 {
        self.duration
    }

    fn current_time(&self) -> f64 {
        self.position
    }

    fn seek(&mut self, seconds: f64) {
        let target = seconds.max(0.0);
        if target >= self.duration {
            // 超出片尾：停在末尾，保留当前帧
            debug!("Seek to {:.3}s past end of {}", target, self.src);
            self.position = self.duration;
            return;
        }

        let ts = (target * f64::from(ffmpeg::ffi::AV_TIME_BASE)) as i64;
        if let Err(e) = self.input.seek(ts, ..=ts) {
            warn!("Seek to {:.3}s failed on {}: {}", target, self.src, e);
            self.events.push_back(MediaEvent::Error(format!("seek failed: {}", e)));
            return;
        }
        self.decoder.flush();
        if let Err(e) = self.decode_until(target) {
            self.events.push_back(MediaEvent::Error(format!("{:#}", e)));
        }
    }

    fn dimensions(&self) -> (u32, u32) {
        (self.decoder.width(), self.decoder.height())
    }

    fn capture(&mut self) -> Result<Frame, DetectError> {
        self.current
            .clone()
            .ok_or_else(|| DetectError::MediaLoad(format!("no decoded frame for {}", self.src)))
    }

    fn release(&mut self) {
        self.current = None;
        self.events.clear();
    }
}

fn frame_to_rgba(frame: &ffmpeg::frame::Video) -> Result<Frame> {
    let width = frame.width();
    let height = frame.height();
    let row_bytes = (width as usize) * 4;
    let stride = frame.stride(0);
    let data = frame.data(0);

    if stride == row_bytes {
        let len = row_bytes * height as usize;
        let pixels = data
            .get(..len)
            .context("ffmpeg frame is shorter than expected")?;
        return Ok(Frame::new(width, height, pixels.to_vec()));
    }

    let mut pixels = Vec::with_capacity(row_bytes * height as usize);
    for row in 0..height as usize {
        let start = row * stride;
        let end = start + row_bytes;
        pixels.extend_from_slice(
            data.get(start..end)
                .context("ffmpeg frame row is out of bounds")?,
        );
    }

    Ok(Frame::new(width, height, pixels))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use std::path::Path;

    /// Writes a 16x16, 10 fps, 10-frame YUV4MPEG2 clip (1s). Frame `i` has
    /// luma `i * 20`.
    fn write_clip(path: &Path) {
        let mut data = b"YUV4MPEG2 W16 H16 F10:1 Ip A1:1 C420jpeg\n".to_vec();
        for i in 0..10u8 {
            data.extend_from_slice(b"FRAME\n");
            data.extend(std::iter::repeat(i * 20).take(16 * 16));
            data.extend(std::iter::repeat(128).take(2 * 8 * 8));
        }
        fs::write(path, data).unwrap();
    }

    fn open_clip() -> (tempfile::TempDir, FfmpegVideo) {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("clip.y4m");
        write_clip(&path);
        let video = FfmpegVideo::open(path.to_str().unwrap(), PlaybackHints::default()).unwrap();
        (dir, video)
    }

    #[test]
    fn test_open_reports_can_play() {
        let (_dir, mut video) = open_clip();

        assert_eq!(video.poll_event(), Some(MediaEvent::CanPlay));
        assert_eq!(video.poll_event(), None);
        assert!(video.ready_state().is_decodable());
        assert_eq!(video.dimensions(), (16, 16));
        assert!((video.duration() - 1.0).abs() < 1e-6);

        let frame = video.capture().unwrap();
        assert_eq!((frame.width, frame.height), (16, 16));
        assert!(frame.is_valid());
    }

    #[test]
    fn test_seek_within_clip() {
        let (_dir, mut video) = open_clip();
        video.poll_event();

        video.seek(0.5);

        assert_eq!(video.poll_event(), None);
        assert!((video.current_time() - 0.5).abs() < 1e-6);
        let early = video.capture().unwrap();
        video.seek(0.0);
        let first = video.capture().unwrap();
        assert!(early.data[0] > first.data[0]);
    }

    #[test]
    fn test_seek_past_end_holds_last_position() {
        let (_dir, mut video) = open_clip();
        video.poll_event();
        video.seek(0.8);

        video.seek(5.0);

        assert_eq!(video.poll_event(), None);
        assert_eq!(video.current_time(), video.duration());
        assert!(video.ready_state().is_decodable());
        assert!(video.capture().is_ok());
    }

    #[test]
    fn test_missing_file_fails_to_open() {
        assert!(FfmpegVideo::open("/definitely/not/here.mp4", PlaybackHints::default()).is_err());
    }
}

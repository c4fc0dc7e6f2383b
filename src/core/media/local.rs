use std::fs;

use anyhow::{Context, Result};
use log::{debug, info};

use super::{MediaBackend, PlaybackHints, VideoElement};
use crate::core::error::DetectError;
use crate::core::video::frame::Frame;

/// Media backend for local files and `http(s)` URLs.
///
/// Images are decoded with the `image` crate. Videos need the `media-ffmpeg`
/// feature.
#[derive(Debug, Default, Clone, Copy)]
pub struct LocalMedia;

impl LocalMedia {
    pub fn new() -> Self {
        Self
    }
}

fn is_remote(src: &str) -> bool {
    let lower = src.to_ascii_lowercase();
    lower.starts_with("http://") || lower.starts_with("https://")
}

fn local_path(src: &str) -> &str {
    src.strip_prefix("file://").unwrap_or(src)
}

fn read_source(src: &str) -> Result<Vec<u8>> {
    if is_remote(src) {
        debug!("Fetching {}", src);
        let response = reqwest::blocking::get(src)
            .with_context(|| format!("failed to fetch {}", src))?
            .error_for_status()
            .with_context(|| format!("server rejected {}", src))?;
        let bytes = response
            .bytes()
            .with_context(|| format!("failed to read body of {}", src))?;
        Ok(bytes.to_vec())
    } else {
        let path = local_path(src);
        fs::read(path).with_context(|| format!("failed to read {}", path))
    }
}

impl MediaBackend for LocalMedia {
    fn open_video(
        &self,
        src: &str,
        hints: PlaybackHints,
    ) -> Result<Box<dyn VideoElement>, DetectError> {
        #[cfg(feature = "media-ffmpeg")]
        {
            let path = if is_remote(src) { src } else { local_path(src) };
            let element = super::ffmpeg::FfmpegVideo::open(path, hints).map_err(DetectError::media)?;
            Ok(Box::new(element))
        }

        #[cfg(not(feature = "media-ffmpeg"))]
        {
            let _ = hints;
            Err(DetectError::MediaLoad(format!(
                "cannot open video {}: built without the `media-ffmpeg` feature",
                src
            )))
        }
    }

    fn load_image(&self, src: &str) -> Result<Frame, DetectError> {
        let bytes = read_source(src).map_err(DetectError::media)?;
        let image = image::load_from_memory(&bytes)
            .with_context(|| format!("failed to decode image {}", src))
            .map_err(DetectError::media)?;
        let frame = Frame::from_image(image);
        info!("🖼️ Image loaded: {} ({}x{})", src, frame.width, frame.height);
        Ok(frame)
    }
}

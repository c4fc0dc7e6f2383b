//! 缩略图编码

use std::io::Cursor;

use image::{ImageOutputFormat, RgbImage, RgbaImage};
use serde::{Deserialize, Serialize};

use super::frame::Frame;
use crate::core::error::DetectError;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ThumbnailFormat {
    Jpeg { quality: u8 },
    Png,
}

impl Default for ThumbnailFormat {
    fn default() -> Self {
        ThumbnailFormat::Jpeg { quality: 92 }
    }
}

/// Encodes a captured frame as an image payload.
pub fn encode(frame: &Frame, format: ThumbnailFormat) -> Result<Vec<u8>, DetectError> {
    if !frame.is_valid() {
        return Err(DetectError::MediaLoad(format!(
            "cannot encode {}x{} frame with {} bytes",
            frame.width,
            frame.height,
            frame.data.len()
        )));
    }

    let mut buffer = Cursor::new(Vec::new());
    let written = match format {
        ThumbnailFormat::Jpeg { quality } => {
            // JPEG 不支持透明通道
            let img = RgbImage::from_raw(frame.width, frame.height, frame.to_rgb());
            img.map(|img| img.write_to(&mut buffer, ImageOutputFormat::Jpeg(quality.clamp(1, 100))))
        }
        ThumbnailFormat::Png => {
            let img = RgbaImage::from_raw(frame.width, frame.height, frame.data.clone());
            img.map(|img| img.write_to(&mut buffer, ImageOutputFormat::Png))
        }
    };

    match written {
        Some(Ok(())) => Ok(buffer.into_inner()),
        Some(Err(e)) => Err(DetectError::MediaLoad(format!("thumbnail encoding failed: {}", e))),
        None => Err(DetectError::MediaLoad("thumbnail buffer size mismatch".to_string())),
    }
}

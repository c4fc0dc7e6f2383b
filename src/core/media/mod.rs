//! 媒体原语 - 视频元素、图片加载、定时调度

#[cfg(feature = "media-ffmpeg")]
mod ffmpeg;
mod local;
mod scheduler;

use log::info;

use crate::core::error::DetectError;
use crate::core::video::frame::Frame;

pub use local::LocalMedia;
pub use scheduler::{Scheduler, ThreadScheduler};

/// How much media data is buffered at the current position.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum ReadyState {
    HaveNothing,
    HaveMetadata,
    HaveCurrentData,
    HaveFutureData,
    HaveEnoughData,
}

impl ReadyState {
    /// Enough data to render the frame at the current position.
    pub fn is_decodable(self) -> bool {
        self >= ReadyState::HaveCurrentData
    }
}

/// Lifecycle signals emitted by a video element.
#[derive(Debug, Clone, PartialEq)]
pub enum MediaEvent {
    CanPlay,
    Error(String),
}

/// Attributes applied to a video element when it is opened.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PlaybackHints {
    pub muted: bool,
    pub autoplay: bool,
}

impl Default for PlaybackHints {
    fn default() -> Self {
        Self {
            muted: true,
            autoplay: true,
        }
    }
}

/// A seekable video bound to one source.
pub trait VideoElement: Send {
    /// Next pending lifecycle event, without blocking.
    fn poll_event(&mut self) -> Option<MediaEvent>;

    fn ready_state(&self) -> ReadyState;

    /// Media duration in seconds; may be infinite or NaN until known.
    fn duration(&self) -> f64;

    fn current_time(&self) -> f64;

    fn seek(&mut self, seconds: f64);

    /// Native resolution in pixels.
    fn dimensions(&self) -> (u32, u32);

    /// Draws the frame at the current position into an RGBA surface of the
    /// native resolution.
    fn capture(&mut self) -> Result<Frame, DetectError>;

    /// Detaches the element and frees decoder resources.
    fn release(&mut self) {}
}

/// Opens media sources.
pub trait MediaBackend: Send + Sync {
    fn open_video(
        &self,
        src: &str,
        hints: PlaybackHints,
    ) -> Result<Box<dyn VideoElement>, DetectError>;

    /// Loads and decodes a single image into an RGBA frame.
    fn load_image(&self, src: &str) -> Result<Frame, DetectError>;
}

/// Owns a video element for one run and releases it on drop.
pub struct ElementLease {
    element: Box<dyn VideoElement>,
    src: String,
}

impl ElementLease {
    pub fn new(element: Box<dyn VideoElement>, src: impl Into<String>) -> Self {
        Self {
            element,
            src: src.into(),
        }
    }

    pub fn element(&mut self) -> &mut dyn VideoElement {
        self.element.as_mut()
    }
}

impl Drop for ElementLease {
    fn drop(&mut self) {
        self.element.release();
        info!("🗑️ Video element released: {}", self.src);
    }
}

pub mod classify;
pub mod detector;
pub mod error;
pub mod guard;
pub mod labels;
pub mod media;
pub mod model;
pub mod video;

#[cfg(test)]
pub(crate) mod testing;

pub use detector::{Detector, DetectorConfig};
pub use error::DetectError;

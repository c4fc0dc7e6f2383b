//! 分类模型 - 加载、缓存与推理后端

mod cache;
mod options;

#[cfg(feature = "backend-tract")]
pub mod tract;

use std::sync::Arc;

use anyhow::Result;

use crate::core::video::frame::Frame;

pub use cache::ModelCache;
pub use options::ModelOptions;

#[cfg(feature = "backend-tract")]
pub use tract::{TractLoader, TractMobilenet};

/// Raw model output before normalization.
#[derive(Debug, Clone, PartialEq)]
pub struct RawPrediction {
    pub class_name: String,
    pub probability: f32,
}

impl RawPrediction {
    pub fn new(class_name: impl Into<String>, probability: f32) -> Self {
        Self {
            class_name: class_name.into(),
            probability,
        }
    }
}

/// Loaded classification model.
///
/// Classification is stateless per call; one handle is shared by every run.
pub trait ImageModel: Send + Sync {
    /// Classify a frame, returning at most `topk` predictions (model default
    /// when `None`), most probable first.
    fn classify(&self, frame: &Frame, topk: Option<usize>) -> Result<Vec<RawPrediction>>;
}

/// Builds a model from options. Called at most once per successful load.
pub trait ModelLoader: Send + Sync {
    fn load(&self, options: &ModelOptions) -> Result<Arc<dyn ImageModel>>;
}

/// Loader used when no inference backend is compiled in.
#[derive(Debug, Default)]
pub struct UnavailableLoader;

impl ModelLoader for UnavailableLoader {
    fn load(&self, _options: &ModelOptions) -> Result<Arc<dyn ImageModel>> {
        anyhow::bail!("no inference backend compiled in (enable the `backend-tract` feature)")
    }
}

/// Loader for the backend selected at compile time.
pub fn default_loader() -> Box<dyn ModelLoader> {
    #[cfg(feature = "backend-tract")]
    {
        Box::new(TractLoader)
    }

    #[cfg(not(feature = "backend-tract"))]
    {
        Box::new(UnavailableLoader)
    }
}

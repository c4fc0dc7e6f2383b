use std::sync::Arc;

use log::debug;
use serde::{Deserialize, Serialize};

use crate::core::error::DetectError;
use crate::core::labels::{label_key, LabelLookup};
use crate::core::model::{ImageModel, RawPrediction};
use crate::core::video::frame::Frame;

/// Normalized classification result.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Prediction {
    pub class_id: String,
    pub probability: f32,
    pub localized_label: Option<String>,
}

/// One captured and classified video frame.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FrameSample {
    /// Media position of the capture, in seconds.
    pub timestamp: f64,
    /// Encoded thumbnail of the captured frame.
    pub thumbnail: Vec<u8>,
    pub predictions: Vec<Prediction>,
}

pub struct ClassificationPipeline<'a> {
    model: Arc<dyn ImageModel>,
    labels: &'a dyn LabelLookup,
}

impl<'a> ClassificationPipeline<'a> {
    pub fn new(model: Arc<dyn ImageModel>, labels: &'a dyn LabelLookup) -> Self {
        Self { model, labels }
    }

    pub fn classify(&self, frame: &Frame, topk: Option<usize>) -> Result<Vec<Prediction>, DetectError> {
        let raw = self
            .model
            .classify(frame, topk)
            .map_err(DetectError::classification)?;
        debug!("Model returned {} predictions", raw.len());

        Ok(raw.into_iter().map(|p| self.normalize(p)).collect())
    }

    fn normalize(&self, raw: RawPrediction) -> Prediction {
        let localized_label = self.labels.lookup(&label_key(&raw.class_name));
        Prediction {
            class_id: raw.class_name,
            probability: raw.probability.clamp(0.0, 1.0),
            localized_label,
        }
    }
}

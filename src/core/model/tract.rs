use std::fs;
use std::path::Path;
use std::sync::Arc;

use anyhow::{anyhow, Context, Result};
use log::{debug, info};
use tract_onnx::prelude::*;

use super::{ImageModel, ModelLoader, ModelOptions, RawPrediction};
use crate::core::video::frame::Frame;

const IMAGENET_MEAN: [f32; 3] = [0.485, 0.456, 0.406];
const IMAGENET_STD: [f32; 3] = [0.229, 0.224, 0.225];

/// Loads MobileNet ONNX models with tract.
#[derive(Debug, Default, Clone, Copy)]
pub struct TractLoader;

impl ModelLoader for TractLoader {
    fn load(&self, options: &ModelOptions) -> Result<Arc<dyn ImageModel>> {
        Ok(Arc::new(TractMobilenet::new(options)?))
    }
}

/// MobileNet classifier running on tract.
///
/// Frames are resized to the square model input and normalized with the
/// ImageNet mean/std. Model output is treated as logits unless it already
/// sums to one.
pub struct TractMobilenet {
    model: TypedRunnableModel<TypedModel>,
    size: u32,
    class_names: Vec<String>,
    default_topk: usize,
}

impl TractMobilenet {
    pub fn new(options: &ModelOptions) -> Result<Self> {
        let model_path = Path::new(&options.model_url);
        let size = options.input_size as usize;
        let model = tract_onnx::onnx()
            .model_for_path(model_path)
            .with_context(|| format!("failed to load ONNX model from {}", model_path.display()))?
            .with_input_fact(
                0,
                InferenceFact::dt_shape(f32::datum_type(), tvec!(1, 3, size, size)),
            )
            .context("failed to set input fact")?
            .into_optimized()
            .context("failed to optimize ONNX model")?
            .into_runnable()
            .context("failed to build runnable ONNX model")?;

        let class_names = match &options.class_names {
            Some(path) => read_class_names(path)?,
            None => Vec::new(),
        };
        info!(
            "✅ MobileNet ready: {}x{} input, {} class names",
            size,
            size,
            class_names.len()
        );

        Ok(Self {
            model,
            size: options.input_size,
            class_names,
            default_topk: options.default_topk,
        })
    }

    fn build_input(&self, frame: &Frame) -> Result<Tensor> {
        let resized = frame
            .resize_to(self.size, self.size)
            .ok_or_else(|| anyhow!("invalid {}x{} frame", frame.width, frame.height))?;

        let size = self.size as usize;
        let input = tract_ndarray::Array4::from_shape_fn((1, 3, size, size), |(_, channel, y, x)| {
            let idx = (y * size + x) * 4 + channel;
            let value = resized.data[idx] as f32 / 255.0;
            (value - IMAGENET_MEAN[channel]) / IMAGENET_STD[channel]
        });

        Ok(input.into_tensor())
    }

    fn class_name(&self, index: usize) -> String {
        self.class_names
            .get(index)
            .cloned()
            .unwrap_or_else(|| format!("class_{}", index))
    }
}

impl ImageModel for TractMobilenet {
    fn classify(&self, frame: &Frame, topk: Option<usize>) -> Result<Vec<RawPrediction>> {
        let input = self.build_input(frame)?;
        let outputs = self
            .model
            .run(tvec!(input.into()))
            .context("ONNX inference failed")?;
        let output = outputs
            .first()
            .ok_or_else(|| anyhow!("model produced no outputs"))?;
        let scores: Vec<f32> = output
            .to_array_view::<f32>()
            .context("model output tensor was not f32")?
            .iter()
            .copied()
            .collect();

        let probabilities = to_probabilities(&scores);
        let mut ranked: Vec<(usize, f32)> = probabilities.into_iter().enumerate().collect();
        ranked.sort_by(|a, b| b.1.total_cmp(&a.1));

        let topk = topk.unwrap_or(self.default_topk);
        debug!("Ranking {} classes, keeping {}", ranked.len(), topk);

        Ok(ranked
            .into_iter()
            .take(topk)
            .map(|(index, probability)| RawPrediction::new(self.class_name(index), probability))
            .collect())
    }
}

fn read_class_names(path: &Path) -> Result<Vec<String>> {
    let text = fs::read_to_string(path)
        .with_context(|| format!("failed to read class names from {}", path.display()))?;
    Ok(text
        .lines()
        .map(str::trim)
        .filter(|line| !line.is_empty())
        .map(str::to_string)
        .collect())
}

/// Softmax unless the scores already form a distribution.
fn to_probabilities(scores: &[f32]) -> Vec<f32> {
    let sum: f32 = scores.iter().sum();
    let in_range = scores.iter().all(|s| (0.0..=1.0).contains(s));
    if in_range && (sum - 1.0).abs() < 1e-3 {
        return scores.to_vec();
    }

    let max = scores.iter().copied().fold(f32::NEG_INFINITY, f32::max);
    let exps: Vec<f32> = scores.iter().map(|s| (s - max).exp()).collect();
    let total: f32 = exps.iter().sum();
    if total > 0.0 && total.is_finite() {
        exps.into_iter().map(|e| e / total).collect()
    } else {
        vec![0.0; scores.len()]
    }
}

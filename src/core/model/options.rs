use std::path::PathBuf;

use log::warn;
use serde::{Deserialize, Serialize};

use crate::core::error::DetectError;

const DEFAULT_VERSION: u32 = 2;
const DEFAULT_ALPHA: f32 = 1.0;
const DEFAULT_INPUT_SIZE: u32 = 224;
const DEFAULT_TOPK: usize = 3;

const ENV_VERSION: &str = "MOBILENET_VERSION";
const ENV_ALPHA: &str = "MOBILENET_ALPHA";
const ENV_MODEL_URL: &str = "MOBILENET_MODEL_URL";

// 旧版插件使用的变量名
const LEGACY_ENV_VERSION: &str = "TENSORFLOW_MOBILENT_VERSION";
const LEGACY_ENV_ALPHA: &str = "TENSORFLOW_MOBILENT_ALPHA";
const LEGACY_ENV_MODEL_URL: &str = "TENSORFLOW_MOBILENT_MODEL_URL";

fn env_value<F>(var: &F, key: &str, legacy: &str) -> Option<String>
where
    F: Fn(&str) -> Option<String>,
{
    var(key).or_else(|| var(legacy))
}

/// Bundled model path for a version/alpha/input size, e.g.
/// `mobilenet_v2_100_224/model.onnx`.
fn bundled_model_url(version: u32, alpha: f32, input_size: u32) -> String {
    let alpha = (alpha * 100.0).round() as u32;
    format!("mobilenet_v{}_{:03}_{}/model.onnx", version, alpha, input_size)
}

/// MobileNet loading options.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ModelOptions {
    pub version: u32,
    pub alpha: f32,
    pub model_url: String,
    pub input_size: u32,
    /// Newline-delimited class names, one per output index.
    pub class_names: Option<PathBuf>,
    pub default_topk: usize,
}

impl Default for ModelOptions {
    fn default() -> Self {
        Self {
            version: DEFAULT_VERSION,
            alpha: DEFAULT_ALPHA,
            model_url: bundled_model_url(DEFAULT_VERSION, DEFAULT_ALPHA, DEFAULT_INPUT_SIZE),
            input_size: DEFAULT_INPUT_SIZE,
            class_names: None,
            default_topk: DEFAULT_TOPK,
        }
    }
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ModelOptionsFile {
    version: Option<u32>,
    alpha: Option<f32>,
    model_url: Option<String>,
    input_size: Option<u32>,
    class_names: Option<PathBuf>,
    default_topk: Option<usize>,
}

impl ModelOptions {
    /// Host options (JSON) over environment over built-in defaults.
    ///
    /// Without an explicit `modelUrl`, the bundled model matching `version`,
    /// `alpha` and `inputSize` is used.
    pub fn resolve(host_json: Option<&str>) -> Result<Self, DetectError> {
        Self::resolve_with(host_json, |key| std::env::var(key).ok())
    }

    fn resolve_with<F>(host_json: Option<&str>, var: F) -> Result<Self, DetectError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut explicit_url = env_value(&var, ENV_MODEL_URL, LEGACY_ENV_MODEL_URL)
            .is_some_and(|u| !u.trim().is_empty());
        let mut options = Self::default().with_env_overrides(&var);

        if let Some(json) = host_json.filter(|s| !s.trim().is_empty()) {
            let file: ModelOptionsFile = serde_json::from_str(json).map_err(|e| {
                DetectError::InvalidArgument(format!("invalid model options: {}", e))
            })?;
            explicit_url |= file.model_url.is_some();
            options.apply(file);
        }

        if !explicit_url {
            options.model_url = bundled_model_url(options.version, options.alpha, options.input_size);
        }
        options.validate()?;
        Ok(options)
    }

    fn with_env_overrides<F>(mut self, var: &F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(raw) = env_value(var, ENV_VERSION, LEGACY_ENV_VERSION) {
            match raw.trim().parse() {
                Ok(version) => self.version = version,
                Err(_) => warn!("Ignoring {}={:?}: not an integer", ENV_VERSION, raw),
            }
        }
        if let Some(raw) = env_value(var, ENV_ALPHA, LEGACY_ENV_ALPHA) {
            match raw.trim().parse() {
                Ok(alpha) => self.alpha = alpha,
                Err(_) => warn!("Ignoring {}={:?}: not a number", ENV_ALPHA, raw),
            }
        }
        if let Some(url) =
            env_value(var, ENV_MODEL_URL, LEGACY_ENV_MODEL_URL).filter(|u| !u.trim().is_empty())
        {
            self.model_url = url;
        }
        self
    }

    fn apply(&mut self, file: ModelOptionsFile) {
        if let Some(version) = file.version {
            self.version = version;
        }
        if let Some(alpha) = file.alpha {
            self.alpha = alpha;
        }
        if let Some(model_url) = file.model_url {
            self.model_url = model_url;
        }
        if let Some(input_size) = file.input_size {
            self.input_size = input_size;
        }
        if file.class_names.is_some() {
            self.class_names = file.class_names;
        }
        if let Some(topk) = file.default_topk {
            self.default_topk = topk;
        }
    }

    fn validate(&self) -> Result<(), DetectError> {
        if self.input_size == 0 {
            return Err(DetectError::InvalidArgument(
                "\"inputSize\" must be gt 0".to_string(),
            ));
        }
        if self.default_topk == 0 {
            return Err(DetectError::InvalidArgument(
                "\"defaultTopk\" must be gt 0".to_string(),
            ));
        }
        if self.model_url.trim().is_empty() {
            return Err(DetectError::InvalidArgument(
                "\"modelUrl\" must not be empty".to_string(),
            ));
        }
        Ok(())
    }
}

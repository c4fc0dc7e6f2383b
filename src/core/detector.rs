//! 检测协调器 - 图片 / 视频两个入口共享一个模型缓存和单飞闸门

use std::sync::Arc;
use std::time::Duration;

use log::{error, info};
use rand::Rng;
use serde::Deserialize;

use super::classify::{ClassificationPipeline, FrameSample, Prediction};
use super::error::DetectError;
use super::guard::DetectionGuard;
use super::labels::LabelLookup;
use super::media::{ElementLease, MediaBackend, PlaybackHints, Scheduler, ThreadScheduler};
use super::model::{ImageModel, ModelCache};
use super::video::{
    FrameSampler, SamplerConfig, SamplerMachine, SamplingPlan, ThumbnailFormat, TimeMode,
};

#[derive(Debug, Clone, Default, PartialEq)]
pub struct DetectorConfig {
    pub sampler: SamplerConfig,
    pub playback: PlaybackHints,
}

/// Host-facing shape of [`DetectorConfig`]; every field is optional.
#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
struct DetectorConfigFile {
    tick_interval_ms: Option<u64>,
    stall_timeout_ms: Option<u64>,
    thumbnail: Option<ThumbnailFormat>,
    muted: Option<bool>,
    autoplay: Option<bool>,
}

impl DetectorConfig {
    /// Parses host JSON such as
    /// `{"stallTimeoutMs": 5000, "thumbnail": "png", "muted": false}`.
    /// Missing fields keep their defaults.
    pub fn from_json(json: Option<&str>) -> Result<Self, DetectError> {
        let mut config = Self::default();
        let Some(json) = json.filter(|s| !s.trim().is_empty()) else {
            return Ok(config);
        };

        let file: DetectorConfigFile = serde_json::from_str(json)
            .map_err(|e| DetectError::InvalidArgument(format!("invalid detector config: {}", e)))?;

        if let Some(ms) = file.tick_interval_ms {
            if ms == 0 {
                return Err(DetectError::InvalidArgument(
                    "\"tickIntervalMs\" must be gt 0".to_string(),
                ));
            }
            config.sampler.tick_interval = Duration::from_millis(ms);
        }
        if let Some(ms) = file.stall_timeout_ms {
            config.sampler.stall_timeout = Some(Duration::from_millis(ms));
        }
        if let Some(thumbnail) = file.thumbnail {
            config.sampler.thumbnail = thumbnail;
        }
        if let Some(muted) = file.muted {
            config.playback.muted = muted;
        }
        if let Some(autoplay) = file.autoplay {
            config.playback.autoplay = autoplay;
        }
        Ok(config)
    }
}

pub struct Detector {
    models: ModelCache,
    labels: Box<dyn LabelLookup>,
    media: Box<dyn MediaBackend>,
    scheduler: Box<dyn Scheduler>,
    guard: DetectionGuard,
    config: DetectorConfig,
}

impl Detector {
    pub fn new(
        models: ModelCache,
        labels: Box<dyn LabelLookup>,
        media: Box<dyn MediaBackend>,
    ) -> Self {
        Self {
            models,
            labels,
            media,
            scheduler: Box::new(ThreadScheduler),
            guard: DetectionGuard::new(),
            config: DetectorConfig::default(),
        }
    }

    pub fn with_scheduler(mut self, scheduler: Box<dyn Scheduler>) -> Self {
        self.scheduler = scheduler;
        self
    }

    pub fn with_config(mut self, config: DetectorConfig) -> Self {
        self.config = config;
        self
    }

    pub fn config(&self) -> &DetectorConfig {
        &self.config
    }

    pub fn is_detecting(&self) -> bool {
        self.guard.is_detecting()
    }

    /// Loads (or returns the cached) model without running a detection.
    pub fn load_model(&self) -> Result<Arc<dyn ImageModel>, DetectError> {
        self.models.load()
    }

    /// Classifies a single image.
    pub fn classify_image(
        &self,
        src: &str,
        topk: Option<usize>,
    ) -> Result<Vec<Prediction>, DetectError> {
        if topk == Some(0) {
            return Err(DetectError::InvalidArgument("\"topk\" must be gt 0".to_string()));
        }
        let _permit = self.guard.enter()?;
        info!("🖼️ Image classification: {}", src);

        let model = self.models.load()?;
        let frame = self.media.load_image(src)?;
        let pipeline = ClassificationPipeline::new(model, self.labels.as_ref());

        match pipeline.classify(&frame, topk) {
            Ok(predictions) => {
                info!("✅ {} classified: {} predictions", src, predictions.len());
                Ok(predictions)
            }
            Err(e) => {
                error!("❌ Image classification failed for {}: {}", src, e);
                Err(e)
            }
        }
    }

    /// Samples `image_count` frames from `[begin_time, end_time]` and
    /// classifies each one.
    pub fn classify_video(
        &self,
        src: &str,
        image_count: i64,
        begin_time: f64,
        end_time: f64,
        mode: TimeMode,
    ) -> Result<Vec<FrameSample>, DetectError> {
        self.classify_video_with_rng(
            src,
            image_count,
            begin_time,
            end_time,
            mode,
            rand::thread_rng(),
        )
    }

    pub fn classify_video_with_rng<R: Rng>(
        &self,
        src: &str,
        image_count: i64,
        begin_time: f64,
        end_time: f64,
        mode: TimeMode,
        rng: R,
    ) -> Result<Vec<FrameSample>, DetectError> {
        let plan = SamplingPlan::new(image_count, begin_time, end_time, mode)?;
        let _permit = self.guard.enter()?;
        info!(
            "🎬 Video classification: {} ({} frames, {:.2}s-{:.2}s, {})",
            src, image_count, begin_time, end_time, mode
        );

        let model = self.models.load()?;
        let element = self.media.open_video(src, self.config.playback)?;
        let mut lease = ElementLease::new(element, src);
        let pipeline = ClassificationPipeline::new(model, self.labels.as_ref());
        let sampler = FrameSampler::new(&pipeline, self.scheduler.as_ref(), &self.config.sampler);

        sampler.run(&mut lease, SamplerMachine::new(plan, rng))
    }
}

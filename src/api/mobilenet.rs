//! MobileNet 分类器 - 图片 / 视频物体识别

use crate::core::classify::{FrameSample, Prediction};
use crate::core::labels::LabelTable;
use crate::core::media::LocalMedia;
use crate::core::model::{default_loader, ModelCache, ModelOptions};
use crate::core::video::TimeMode;
use crate::core::{DetectError, Detector, DetectorConfig};
use flutter_rust_bridge::frb;
use log::info;

/// MobileNet 分类器 - 单模型缓存 + 单飞检测
///
/// ```dart
/// final classifier = MobilenetClassifier.create(
///     configJson: '{"stallTimeoutMs": 10000}', labelsPath: "/path/to/IMAGENET_CLASSES.json");
/// await classifier.loadModel();
/// final predictions = await classifier.classifyImage(src: imagePath, topk: 3);
/// final samples = await classifier.classifyVideo(
///     src: videoPath, imageCount: 5, beginTime: 0, endTime: 30, timeMode: "avg");
/// ```
#[frb(opaque)]
pub struct MobilenetClassifier {
    detector: Detector,
}

impl MobilenetClassifier {
    /// 创建分类器（模型在首次检测时加载）
    ///
    /// options_json 覆盖环境变量 MOBILENET_VERSION / MOBILENET_ALPHA /
    /// MOBILENET_MODEL_URL，未设置的字段使用默认值。
    /// config_json 调整抽帧：tickIntervalMs / stallTimeoutMs / thumbnail / muted / autoplay。
    /// labels_path 指向 {"tabby_cat": "虎斑猫"} 形式的本地化标签表。
    #[frb(sync)]
    pub fn create(
        options_json: Option<String>,
        config_json: Option<String>,
        labels_path: Option<String>,
    ) -> Result<Self, DetectError> {
        crate::init_logging();

        let options = ModelOptions::resolve(options_json.as_deref())?;
        let config = DetectorConfig::from_json(config_json.as_deref())?;
        info!(
            "🧠 MobilenetClassifier: v{} alpha {} from {}",
            options.version, options.alpha, options.model_url
        );

        let labels = match labels_path {
            Some(path) => LabelTable::from_path(&path)?,
            None => LabelTable::empty(),
        };

        Ok(Self {
            detector: Detector::new(
                ModelCache::new(default_loader(), options),
                Box::new(labels),
                Box::new(LocalMedia::new()),
            )
            .with_config(config),
        })
    }

    /// 预加载模型
    #[frb(dart_async)]
    pub async fn load_model(&self) -> Result<(), DetectError> {
        self.detector.load_model().map(|_| ())
    }

    /// 识别单张图片
    #[frb(dart_async)]
    pub async fn classify_image(
        &self,
        src: String,
        topk: Option<u32>,
    ) -> Result<Vec<Prediction>, DetectError> {
        self.detector
            .classify_image(&src, topk.map(|k| k as usize))
    }

    /// 视频抽帧识别
    ///
    /// time_mode: "rnd"（默认，随机）或 "avg"（平均）
    #[frb(dart_async)]
    pub async fn classify_video(
        &self,
        src: String,
        image_count: i32,
        begin_time: f64,
        end_time: f64,
        time_mode: Option<String>,
    ) -> Result<Vec<FrameSample>, DetectError> {
        let mode = parse_time_mode(time_mode.as_deref())?;
        self.detector
            .classify_video(&src, image_count as i64, begin_time, end_time, mode)
    }

    /// 是否有检测正在进行
    #[frb(sync, getter)]
    pub fn is_detecting(&self) -> bool {
        self.detector.is_detecting()
    }
}

impl Drop for MobilenetClassifier {
    fn drop(&mut self) {
        info!("🗑️ MobilenetClassifier: released");
    }
}

fn parse_time_mode(raw: Option<&str>) -> Result<TimeMode, DetectError> {
    match raw {
        Some(s) if !s.trim().is_empty() => s.parse(),
        _ => Ok(TimeMode::default()),
    }
}

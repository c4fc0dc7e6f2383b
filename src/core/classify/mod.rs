//! 分类流水线 - 调用模型并规整输出

mod pipeline;

pub use pipeline::{ClassificationPipeline, FrameSample, Prediction};

//! 截图时间规划

use std::fmt;
use std::str::FromStr;

use rand::Rng;
use serde::{Deserialize, Serialize};

use crate::core::error::DetectError;

/// 截图时间分配模式
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TimeMode {
    /// 时间范围内随机分布：每一步向前跳一个随机长度
    #[default]
    #[serde(alias = "rnd")]
    Random,
    /// 时间范围内平均分布
    #[serde(alias = "avg")]
    Average,
}

impl FromStr for TimeMode {
    type Err = DetectError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "rnd" | "random" => Ok(TimeMode::Random),
            "avg" | "average" => Ok(TimeMode::Average),
            other => Err(DetectError::InvalidArgument(format!(
                "unknown time mode '{}' (expected rnd|avg)",
                other
            ))),
        }
    }
}

impl fmt::Display for TimeMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TimeMode::Random => write!(f, "random"),
            TimeMode::Average => write!(f, "average"),
        }
    }
}

/// Sampling window and budget for one video run.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SamplingPlan {
    pub begin_time: f64,
    pub end_time: f64,
    pub image_count: u32,
    pub mode: TimeMode,
}

impl SamplingPlan {
    pub fn new(
        image_count: i64,
        begin_time: f64,
        end_time: f64,
        mode: TimeMode,
    ) -> Result<Self, DetectError> {
        if image_count <= 0 {
            return Err(DetectError::InvalidArgument(
                "\"image_count\" must be gt 0".to_string(),
            ));
        }
        let image_count = u32::try_from(image_count).map_err(|_| {
            DetectError::InvalidArgument(format!("\"image_count\" too large: {}", image_count))
        })?;
        if !begin_time.is_finite() || begin_time < 0.0 {
            return Err(DetectError::InvalidArgument(format!(
                "\"begin_time\" must be a finite value >= 0, got {}",
                begin_time
            )));
        }
        if !end_time.is_finite() || end_time <= begin_time {
            return Err(DetectError::InvalidArgument(format!(
                "\"end_time\" ({}) must be finite and greater than \"begin_time\" ({})",
                end_time, begin_time
            )));
        }

        Ok(Self {
            begin_time,
            end_time,
            image_count,
            mode,
        })
    }

    /// Average gap between two samples.
    pub fn avg_step(&self) -> f64 {
        (self.end_time - self.begin_time) / self.image_count as f64
    }

    /// Clamps the window end to the media duration once it is known.
    pub fn clamped_to(&self, duration: f64) -> Self {
        Self {
            end_time: self.end_time.min(duration),
            ..*self
        }
    }

    /// Plan with one extra padding attempt, as used by the sampler.
    pub fn padded(&self) -> Self {
        Self {
            image_count: self.image_count.saturating_add(1),
            ..*self
        }
    }
}

/// Next target offset for `sample_index` (1-based).
///
/// Average mode returns the absolute position `avg * sample_index`. Random mode
/// returns a forward jump to apply from the current position.
pub fn next_timestamp<R: Rng + ?Sized>(plan: &SamplingPlan, sample_index: u32, rng: &mut R) -> f64 {
    let avg = plan.avg_step();
    match plan.mode {
        TimeMode::Average => avg * sample_index as f64,
        TimeMode::Random => rng.gen::<f64>() * avg,
    }
}

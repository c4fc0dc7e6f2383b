//! 视频抽帧 - 时间规划、状态机、驱动与缩略图

pub mod frame;
pub mod sampler;
pub mod state_machine;
pub mod thumbnail;
pub mod timing;

pub use frame::Frame;
pub use sampler::{FrameSampler, SamplerConfig, FRAME_INTERVAL};
pub use state_machine::{SamplerAction, SamplerEvent, SamplerMachine, SamplerState};
pub use thumbnail::ThumbnailFormat;
pub use timing::{next_timestamp, SamplingPlan, TimeMode};

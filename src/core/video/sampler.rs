//! 视频抽帧驱动 - 把媒体事件、定时 tick 和截图结果喂给状态机

use std::collections::VecDeque;
use std::time::Duration;

use log::{debug, error, info};
use rand::Rng;
use serde::{Deserialize, Serialize};

use super::state_machine::{SamplerAction, SamplerEvent, SamplerMachine};
use super::thumbnail::{self, ThumbnailFormat};
use crate::core::classify::{ClassificationPipeline, FrameSample};
use crate::core::error::DetectError;
use crate::core::media::{ElementLease, MediaEvent, Scheduler, VideoElement};

/// One frame at ~60 fps; lets a seek settle before the next poll.
pub const FRAME_INTERVAL: Duration = Duration::from_micros(16_700);

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SamplerConfig {
    pub tick_interval: Duration,
    /// Give up when the element stays unplayable/undecodable this long.
    pub stall_timeout: Option<Duration>,
    pub thumbnail: ThumbnailFormat,
}

impl Default for SamplerConfig {
    fn default() -> Self {
        Self {
            tick_interval: FRAME_INTERVAL,
            stall_timeout: None,
            thumbnail: ThumbnailFormat::default(),
        }
    }
}

pub struct FrameSampler<'a> {
    pipeline: &'a ClassificationPipeline<'a>,
    scheduler: &'a dyn Scheduler,
    config: &'a SamplerConfig,
}

impl<'a> FrameSampler<'a> {
    pub fn new(
        pipeline: &'a ClassificationPipeline<'a>,
        scheduler: &'a dyn Scheduler,
        config: &'a SamplerConfig,
    ) -> Self {
        Self {
            pipeline,
            scheduler,
            config,
        }
    }

    /// Runs the machine to completion against the leased element.
    pub fn run<R: Rng>(
        &self,
        lease: &mut ElementLease,
        mut machine: SamplerMachine<R>,
    ) -> Result<Vec<FrameSample>, DetectError> {
        let element = lease.element();
        let mut queue = VecDeque::from([SamplerEvent::Start]);
        let mut tick_due = false;
        let mut stalled = Duration::ZERO;

        loop {
            // Media events are read only once pending work is drained, so
            // `Playable` reports the position after the initial seek.
            if queue.is_empty() {
                while let Some(media_event) = element.poll_event() {
                    queue.push_back(match media_event {
                        MediaEvent::CanPlay => SamplerEvent::Playable {
                            duration: element.duration(),
                            position: element.current_time(),
                        },
                        MediaEvent::Error(reason) => SamplerEvent::MediaFailed(reason),
                    });
                }
            }

            let event = match queue.pop_front() {
                Some(event) => event,
                None if tick_due => {
                    tick_due = false;
                    let decodable = element.ready_state().is_decodable();
                    if decodable {
                        stalled = Duration::ZERO;
                    } else {
                        debug!("Video loading...");
                        self.note_stall(&mut stalled)?;
                    }
                    SamplerEvent::Tick {
                        decodable,
                        position: element.current_time(),
                    }
                }
                None => {
                    // 等待 canplay
                    self.note_stall(&mut stalled)?;
                    self.scheduler.sleep(self.config.tick_interval);
                    continue;
                }
            };

            if matches!(event, SamplerEvent::Playable { .. }) {
                stalled = Duration::ZERO;
            }

            match machine.handle(event) {
                SamplerAction::Wait | SamplerAction::Ignore => {}
                SamplerAction::Seek(target) => element.seek(target),
                SamplerAction::Schedule => {
                    self.scheduler.sleep(self.config.tick_interval);
                    tick_due = true;
                }
                SamplerAction::SeekThenSchedule(target) => {
                    debug!("Seeking to {:.3}s", target);
                    element.seek(target);
                    self.scheduler.sleep(self.config.tick_interval);
                    tick_due = true;
                }
                SamplerAction::Capture => queue.push_back(self.capture(element)),
                SamplerAction::Finish(samples) => {
                    info!("🎯 Sampling complete: {} frames", samples.len());
                    return Ok(samples);
                }
                SamplerAction::Fail(err) => {
                    error!("❌ Sampling failed: {}", err);
                    return Err(err);
                }
            }
        }
    }

    fn note_stall(&self, stalled: &mut Duration) -> Result<(), DetectError> {
        *stalled += self.config.tick_interval;
        match self.config.stall_timeout {
            Some(limit) if *stalled >= limit => Err(DetectError::MediaLoad(format!(
                "media stalled for {:?} without becoming ready",
                limit
            ))),
            _ => Ok(()),
        }
    }

    fn capture(&self, element: &mut dyn VideoElement) -> SamplerEvent {
        let timestamp = element.current_time();
        let frame = match element.capture() {
            Ok(frame) => frame,
            Err(e) => return SamplerEvent::MediaFailed(media_reason(e)),
        };
        debug!(
            "📸 Captured frame at {:.3}s ({}x{})",
            timestamp, frame.width, frame.height
        );

        let thumbnail = match thumbnail::encode(&frame, self.config.thumbnail) {
            Ok(bytes) => bytes,
            Err(e) => return SamplerEvent::MediaFailed(media_reason(e)),
        };

        match self.pipeline.classify(&frame, None) {
            Ok(predictions) => SamplerEvent::Classified(FrameSample {
                timestamp,
                thumbnail,
                predictions,
            }),
            Err(e) => SamplerEvent::ClassifyFailed(e),
        }
    }
}

fn media_reason(err: DetectError) -> String {
    match err {
        DetectError::MediaLoad(reason) => reason,
        other => other.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::labels::LabelTable;
    use crate::core::testing::{FakeModel, RecordingScheduler, ScriptedVideo};
    use crate::core::video::timing::{SamplingPlan, TimeMode};
    use rand::rngs::StdRng;
    use rand::SeedableRng;
    use std::sync::Arc;

    fn machine(count: i64, begin: f64, end: f64, mode: TimeMode) -> SamplerMachine<StdRng> {
        let plan = SamplingPlan::new(count, begin, end, mode).unwrap();
        SamplerMachine::new(plan, StdRng::seed_from_u64(9))
    }

    fn run(
        video: ScriptedVideo,
        model: FakeModel,
        config: &SamplerConfig,
        machine: SamplerMachine<StdRng>,
    ) -> (Result<Vec<FrameSample>, DetectError>, RecordingScheduler) {
        let labels = LabelTable::from_json_str(r#"{"tabby_cat": "虎斑猫"}"#).unwrap();
        let pipeline = ClassificationPipeline::new(Arc::new(model), &labels);
        let scheduler = RecordingScheduler::default();
        let sampler = FrameSampler::new(&pipeline, &scheduler, config);
        let mut lease = ElementLease::new(Box::new(video), "clip.mp4");
        let result = sampler.run(&mut lease, machine);
        (result, scheduler)
    }

    #[test]
    fn test_average_run() {
        let video = ScriptedVideo::new(30.0);
        let recorder = video.recorder();

        let (result, scheduler) = run(
            video,
            FakeModel::tabby(),
            &SamplerConfig::default(),
            machine(3, 0.0, 8.0, TimeMode::Average),
        );
        let samples = result.unwrap();

        let timestamps: Vec<f64> = samples.iter().map(|s| s.timestamp).collect();
        assert_eq!(timestamps, vec![2.0, 4.0, 6.0]);
        assert_eq!(recorder.seeks(), vec![0.0, 2.0, 4.0, 6.0, 8.0]);
        assert_eq!(samples[0].predictions[0].localized_label.as_deref(), Some("虎斑猫"));
        assert_eq!(&samples[0].thumbnail[..2], &[0xFF, 0xD8]);
        assert_eq!(scheduler.sleeps(), 4);
    }

    #[test]
    fn test_average_run_with_begin_offset() {
        let video = ScriptedVideo::new(100.0);
        let recorder = video.recorder();

        let (result, _) = run(
            video,
            FakeModel::tabby(),
            &SamplerConfig::default(),
            machine(2, 10.0, 40.0, TimeMode::Average),
        );
        let samples = result.unwrap();

        let timestamps: Vec<f64> = samples.iter().map(|s| s.timestamp).collect();
        assert_eq!(timestamps, vec![10.0, 20.0]);
        assert_eq!(recorder.seeks(), vec![10.0, 10.0, 20.0, 30.0, 40.0]);
    }

    #[test]
    fn test_random_run_respects_budget() {
        let video = ScriptedVideo::new(600.0);

        let (result, _) = run(
            video,
            FakeModel::tabby(),
            &SamplerConfig::default(),
            machine(5, 10.0, 600.0, TimeMode::Random),
        );
        let samples = result.unwrap();

        assert_eq!(samples.len(), 5);
        assert!(samples.windows(2).all(|w| w[0].timestamp <= w[1].timestamp));
        assert!(samples.iter().all(|s| s.timestamp >= 10.0 && s.timestamp < 600.0));
    }

    #[test]
    fn test_end_clamped_to_duration() {
        let video = ScriptedVideo::new(5.0);

        let (result, _) = run(
            video,
            FakeModel::tabby(),
            &SamplerConfig::default(),
            machine(4, 0.0, 100.0, TimeMode::Average),
        );

        // step 1s over [0, 5]: captures at 1..=4, stop at 5.
        assert_eq!(result.unwrap().len(), 4);
    }

    #[test]
    fn test_waits_until_decodable() {
        let video = ScriptedVideo::new(30.0).with_not_ready_polls(3);

        let (result, scheduler) = run(
            video,
            FakeModel::tabby(),
            &SamplerConfig::default(),
            machine(1, 0.0, 10.0, TimeMode::Average),
        );

        assert_eq!(result.unwrap().len(), 1);
        assert!(scheduler.sleeps() >= 3 * 2);
    }

    #[test]
    fn test_media_error_aborts_and_releases() {
        let video = ScriptedVideo::new(30.0).with_error_after_seeks(3);
        let recorder = video.recorder();

        let (result, _) = run(
            video,
            FakeModel::tabby(),
            &SamplerConfig::default(),
            machine(5, 0.0, 20.0, TimeMode::Average),
        );

        assert!(matches!(result, Err(DetectError::MediaLoad(_))));
        assert!(recorder.released());
    }

    #[test]
    fn test_classification_failure_aborts() {
        let video = ScriptedVideo::new(30.0);
        let recorder = video.recorder();
        let model = FakeModel::tabby().failing_after(1, "tensor shape mismatch");

        let (result, _) = run(
            video,
            model,
            &SamplerConfig::default(),
            machine(3, 0.0, 9.0, TimeMode::Average),
        );

        match result {
            Err(DetectError::Classification(msg)) => assert!(msg.contains("tensor shape mismatch")),
            other => panic!("unexpected result: {:?}", other),
        }
        assert!(recorder.released());
    }

    #[test]
    fn test_stall_timeout() {
        let video = ScriptedVideo::new(30.0).without_can_play();
        let config = SamplerConfig {
            stall_timeout: Some(Duration::from_millis(100)),
            ..Default::default()
        };

        let (result, scheduler) = run(
            video,
            FakeModel::tabby(),
            &config,
            machine(1, 0.0, 10.0, TimeMode::Average),
        );

        assert!(matches!(result, Err(DetectError::MediaLoad(_))));
        assert_eq!(scheduler.sleeps(), 5);
    }
}

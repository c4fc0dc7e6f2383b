use rand::Rng;

use super::timing::{next_timestamp, SamplingPlan, TimeMode};
use crate::core::classify::FrameSample;
use crate::core::error::DetectError;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SamplerState {
    Idle,
    AwaitingPlayable,
    AwaitingDecodable,
    Capturing,
    Completed,
    Failed,
}

impl SamplerState {
    pub fn is_terminal(self) -> bool {
        matches!(self, SamplerState::Completed | SamplerState::Failed)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum SamplerEvent {
    Start,
    Playable { duration: f64, position: f64 },
    Tick { decodable: bool, position: f64 },
    Classified(FrameSample),
    ClassifyFailed(DetectError),
    MediaFailed(String),
}

#[derive(Debug, Clone, PartialEq)]
pub enum SamplerAction {
    /// Nothing to do; keep waiting for media events.
    Wait,
    /// Event had no effect in the current state.
    Ignore,
    Seek(f64),
    Schedule,
    SeekThenSchedule(f64),
    /// Capture the current frame and report `Classified` or `ClassifyFailed`.
    Capture,
    Finish(Vec<FrameSample>),
    Fail(DetectError),
}

/// Seek/ready/capture state machine for one video run.
///
/// The machine plans with one padding attempt beyond the requested count and
/// trims the padding from the delivered samples.
pub struct SamplerMachine<R> {
    state: SamplerState,
    requested: u32,
    plan: SamplingPlan,
    sample_counter: u32,
    samples: Vec<FrameSample>,
    rng: R,
}

impl<R: Rng> SamplerMachine<R> {
    pub fn new(plan: SamplingPlan, rng: R) -> Self {
        Self {
            state: SamplerState::Idle,
            requested: plan.image_count,
            plan: plan.padded(),
            sample_counter: 1,
            samples: Vec::new(),
            rng,
        }
    }

    pub fn current_state(&self) -> SamplerState {
        self.state
    }

    /// Plan in effect (padded, clamped once the duration is known).
    pub fn plan(&self) -> &SamplingPlan {
        &self.plan
    }

    pub fn sample_counter(&self) -> u32 {
        self.sample_counter
    }

    pub fn handle(&mut self, event: SamplerEvent) -> SamplerAction {
        if self.state.is_terminal() {
            return SamplerAction::Ignore;
        }

        match (self.state, event) {
            (_, SamplerEvent::MediaFailed(reason)) => self.fail(DetectError::MediaLoad(reason)),

            (SamplerState::Idle, SamplerEvent::Start) => {
                self.state = SamplerState::AwaitingPlayable;
                SamplerAction::Seek(self.plan.begin_time)
            }
            (SamplerState::Idle, _) => SamplerAction::Ignore,

            (SamplerState::AwaitingPlayable, SamplerEvent::Playable { duration, position }) => {
                self.plan = self.plan.clamped_to(duration);
                self.state = SamplerState::AwaitingDecodable;
                SamplerAction::SeekThenSchedule(self.next_target(position))
            }
            (SamplerState::AwaitingPlayable, _) => SamplerAction::Wait,

            (SamplerState::AwaitingDecodable, SamplerEvent::Tick { decodable, position }) => {
                if !decodable {
                    return SamplerAction::Schedule;
                }
                if self.sample_counter > self.plan.image_count || position >= self.plan.end_time {
                    return self.complete();
                }
                self.sample_counter += 1;
                self.state = SamplerState::Capturing;
                SamplerAction::Capture
            }

            (SamplerState::Capturing, SamplerEvent::Classified(sample)) => {
                let position = sample.timestamp;
                self.samples.push(sample);
                self.state = SamplerState::AwaitingDecodable;
                SamplerAction::SeekThenSchedule(self.next_target(position))
            }
            (SamplerState::Capturing, SamplerEvent::ClassifyFailed(err)) => self.fail(err),

            // Ticks while a capture is outstanding, repeated `Playable`, stray results.
            _ => SamplerAction::Ignore,
        }
    }

    /// Average targets sit on the `avg * i` grid measured from zero, not from
    /// `begin_time`. Random targets jump forward from the current position.
    fn next_target(&mut self, position: f64) -> f64 {
        let step = next_timestamp(&self.plan, self.sample_counter, &mut self.rng);
        match self.plan.mode {
            TimeMode::Average => step,
            TimeMode::Random => position + step,
        }
    }

    fn complete(&mut self) -> SamplerAction {
        self.state = SamplerState::Completed;
        let mut samples = std::mem::take(&mut self.samples);
        samples.truncate(self.requested as usize);
        self.sample_counter = 0;
        SamplerAction::Finish(samples)
    }

    fn fail(&mut self, err: DetectError) -> SamplerAction {
        self.state = SamplerState::Failed;
        self.samples.clear();
        SamplerAction::Fail(err)
    }
}

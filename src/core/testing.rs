//! Test doubles shared by the unit tests.

use std::cell::Cell;
use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Condvar, Mutex};
use std::thread;
use std::time::Duration;

use anyhow::{bail, Result};

use super::error::DetectError;
use super::media::{MediaBackend, MediaEvent, PlaybackHints, ReadyState, Scheduler, VideoElement};
use super::model::{ImageModel, ModelLoader, ModelOptions, RawPrediction};
use super::video::frame::Frame;

#[derive(Debug, Clone, Default)]
pub struct CallCounter(Arc<AtomicUsize>);

impl CallCounter {
    /// Increments and returns the previous count.
    pub fn bump(&self) -> usize {
        self.0.fetch_add(1, Ordering::SeqCst)
    }

    pub fn get(&self) -> usize {
        self.0.load(Ordering::SeqCst)
    }
}

pub fn solid_frame(width: u32, height: u32) -> Frame {
    Frame::new(width, height, vec![0x80; (width * height * 4) as usize])
}

/// Blocks callers until opened; reports when the first caller arrives.
#[derive(Clone, Default)]
pub struct Gate {
    inner: Arc<(Mutex<(bool, bool)>, Condvar)>,
}

impl Gate {
    fn pass(&self) {
        let (lock, cvar) = &*self.inner;
        let mut state = lock.lock().unwrap();
        state.0 = true;
        cvar.notify_all();
        while !state.1 {
            state = cvar.wait(state).unwrap();
        }
    }

    pub fn wait_entered(&self) {
        let (lock, cvar) = &*self.inner;
        let mut state = lock.lock().unwrap();
        while !state.0 {
            state = cvar.wait(state).unwrap();
        }
    }

    pub fn open(&self) {
        let (lock, cvar) = &*self.inner;
        lock.lock().unwrap().1 = true;
        cvar.notify_all();
    }
}

pub struct FakeModel {
    predictions: Vec<RawPrediction>,
    fail_after: Option<(usize, String)>,
    gate: Option<Gate>,
    calls: CallCounter,
}

impl FakeModel {
    pub fn tabby() -> Self {
        Self {
            predictions: vec![
                RawPrediction::new("tabby cat, Felis domesticus", 0.8),
                RawPrediction::new("Egyptian cat", 0.15),
                RawPrediction::new("tiger cat", 0.05),
            ],
            fail_after: None,
            gate: None,
            calls: CallCounter::default(),
        }
    }

    pub fn failing(reason: &str) -> Self {
        Self::tabby().failing_after(0, reason)
    }

    /// Succeeds `successes` times, then fails every call.
    pub fn failing_after(mut self, successes: usize, reason: &str) -> Self {
        self.fail_after = Some((successes, reason.to_string()));
        self
    }

    /// Blocks every classification until the gate opens.
    pub fn gated(mut self, gate: Gate) -> Self {
        self.gate = Some(gate);
        self
    }
}

impl ImageModel for FakeModel {
    fn classify(&self, _frame: &Frame, topk: Option<usize>) -> Result<Vec<RawPrediction>> {
        let call = self.calls.bump();
        if let Some(gate) = &self.gate {
            gate.pass();
        }
        if let Some((successes, reason)) = &self.fail_after {
            if call >= *successes {
                bail!("{}", reason);
            }
        }
        let topk = topk.unwrap_or(self.predictions.len());
        Ok(self.predictions.iter().take(topk).cloned().collect())
    }
}

pub struct CountingLoader {
    model: Arc<dyn ImageModel>,
    fail_first: usize,
    delay: Option<Duration>,
    calls: CallCounter,
}

impl CountingLoader {
    pub fn succeeding(model: FakeModel) -> Self {
        Self::failing_first(0, model)
    }

    pub fn failing_first(failures: usize, model: FakeModel) -> Self {
        Self {
            model: Arc::new(model),
            fail_first: failures,
            delay: None,
            calls: CallCounter::default(),
        }
    }

    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    pub fn calls(&self) -> CallCounter {
        self.calls.clone()
    }
}

impl ModelLoader for CountingLoader {
    fn load(&self, _options: &ModelOptions) -> Result<Arc<dyn ImageModel>> {
        let call = self.calls.bump();
        if let Some(delay) = self.delay {
            thread::sleep(delay);
        }
        if call < self.fail_first {
            bail!("weights unavailable");
        }
        Ok(Arc::clone(&self.model))
    }
}

/// Observes a `ScriptedVideo` after it has been moved into a run.
#[derive(Clone, Default)]
pub struct VideoRecorder {
    seeks: Arc<Mutex<Vec<f64>>>,
    released: Arc<AtomicBool>,
    hints: Arc<Mutex<Option<PlaybackHints>>>,
}

impl VideoRecorder {
    pub fn seeks(&self) -> Vec<f64> {
        self.seeks.lock().unwrap().clone()
    }

    pub fn released(&self) -> bool {
        self.released.load(Ordering::SeqCst)
    }

    pub fn hints(&self) -> Option<PlaybackHints> {
        *self.hints.lock().unwrap()
    }
}

/// Video element with a fixed duration and scripted readiness/failures.
pub struct ScriptedVideo {
    duration: f64,
    position: f64,
    events: VecDeque<MediaEvent>,
    not_ready_polls: u32,
    not_ready_left: Cell<u32>,
    error_after_seeks: Option<usize>,
    recorder: VideoRecorder,
}

impl ScriptedVideo {
    pub fn new(duration: f64) -> Self {
        Self {
            duration,
            position: 0.0,
            events: VecDeque::from([MediaEvent::CanPlay]),
            not_ready_polls: 0,
            not_ready_left: Cell::new(0),
            error_after_seeks: None,
            recorder: VideoRecorder::default(),
        }
    }

    pub fn without_can_play(mut self) -> Self {
        self.events.clear();
        self
    }

    /// Reports not-decodable this many times after every seek.
    pub fn with_not_ready_polls(mut self, polls: u32) -> Self {
        self.not_ready_polls = polls;
        self
    }

    /// Emits a media error on the n-th seek.
    pub fn with_error_after_seeks(mut self, seeks: usize) -> Self {
        self.error_after_seeks = Some(seeks);
        self
    }

    pub fn recorder(&self) -> VideoRecorder {
        self.recorder.clone()
    }
}

impl VideoElement for ScriptedVideo {
    fn poll_event(&mut self) -> Option<MediaEvent> {
        self.events.pop_front()
    }

    fn ready_state(&self) -> ReadyState {
        let left = self.not_ready_left.get();
        if left > 0 {
            self.not_ready_left.set(left - 1);
            ReadyState::HaveMetadata
        } else {
            ReadyState::HaveEnoughData
        }
    }

    fn duration(&self) -> f64 {
        self.duration
    }

    fn current_time(&self) -> f64 {
        self.position
    }

    fn seek(&mut self, seconds: f64) {
        self.position = seconds.clamp(0.0, self.duration);
        self.not_ready_left.set(self.not_ready_polls);
        let mut seeks = self.recorder.seeks.lock().unwrap();
        seeks.push(seconds);
        if self.error_after_seeks == Some(seeks.len()) {
            self.events
                .push_back(MediaEvent::Error("net::ERR_CONNECTION_RESET".to_string()));
        }
    }

    fn dimensions(&self) -> (u32, u32) {
        (16, 9)
    }

    fn capture(&mut self) -> Result<Frame, DetectError> {
        let (width, height) = self.dimensions();
        Ok(solid_frame(width, height))
    }

    fn release(&mut self) {
        self.recorder.released.store(true, Ordering::SeqCst);
    }
}

/// Hands out scripted videos in order and serves images from memory.
#[derive(Default)]
pub struct FakeMedia {
    videos: Mutex<VecDeque<ScriptedVideo>>,
    images: HashMap<String, Frame>,
}

impl FakeMedia {
    pub fn with_video(self, video: ScriptedVideo) -> Self {
        self.videos.lock().unwrap().push_back(video);
        self
    }

    pub fn with_image(mut self, src: &str, frame: Frame) -> Self {
        self.images.insert(src.to_string(), frame);
        self
    }
}

impl MediaBackend for FakeMedia {
    fn open_video(
        &self,
        src: &str,
        hints: PlaybackHints,
    ) -> Result<Box<dyn VideoElement>, DetectError> {
        let video = self
            .videos
            .lock()
            .unwrap()
            .pop_front()
            .ok_or_else(|| DetectError::MediaLoad(format!("404 Not Found: {}", src)))?;
        *video.recorder.hints.lock().unwrap() = Some(hints);
        Ok(Box::new(video))
    }

    fn load_image(&self, src: &str) -> Result<Frame, DetectError> {
        self.images
            .get(src)
            .cloned()
            .ok_or_else(|| DetectError::MediaLoad(format!("404 Not Found: {}", src)))
    }
}

/// Counts sleeps without waiting.
#[derive(Default)]
pub struct RecordingScheduler {
    sleeps: CallCounter,
}

impl RecordingScheduler {
    pub fn sleeps(&self) -> usize {
        self.sleeps.get()
    }
}

impl Scheduler for RecordingScheduler {
    fn sleep(&self, _delay: Duration) {
        self.sleeps.bump();
    }
}

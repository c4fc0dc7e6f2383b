//! 单飞闸门 - 同一时刻只允许一个检测任务

use std::sync::atomic::{AtomicBool, Ordering};

use log::{debug, warn};

use super::error::DetectError;

/// Single-flight latch shared by the image and video entry points.
///
/// Requests arriving while a run is in flight are rejected, never queued.
#[derive(Debug, Default)]
pub struct DetectionGuard {
    in_flight: AtomicBool,
}

impl DetectionGuard {
    pub fn new() -> Self {
        Self::default()
    }

    /// Marks a run as in flight. Returns false when one already is.
    pub fn try_enter(&self) -> bool {
        self.in_flight
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_ok()
    }

    /// Must be called exactly once per successful `try_enter`.
    pub fn leave(&self) {
        if !self.in_flight.swap(false, Ordering::AcqRel) {
            warn!("DetectionGuard: leave() without a matching try_enter()");
        }
    }

    /// Acquires the guard for the lifetime of the returned permit.
    pub fn enter(&self) -> Result<DetectionPermit<'_>, DetectError> {
        if self.try_enter() {
            debug!("DetectionGuard: acquired");
            Ok(DetectionPermit { guard: self })
        } else {
            Err(DetectError::AlreadyDetecting)
        }
    }

    pub fn is_detecting(&self) -> bool {
        self.in_flight.load(Ordering::Acquire)
    }
}

/// Releases the guard when dropped, whichever way the run ends.
#[derive(Debug)]
pub struct DetectionPermit<'a> {
    guard: &'a DetectionGuard,
}

impl Drop for DetectionPermit<'_> {
    fn drop(&mut self) {
        self.guard.leave();
        debug!("DetectionGuard: released");
    }
}

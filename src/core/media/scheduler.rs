use std::thread;
use std::time::Duration;

/// Defers the next step of a run.
pub trait Scheduler: Send + Sync {
    fn sleep(&self, delay: Duration);
}

/// Blocks the calling thread for the delay.
#[derive(Debug, Default, Clone, Copy)]
pub struct ThreadScheduler;

impl Scheduler for ThreadScheduler {
    fn sleep(&self, delay: Duration) {
        thread::sleep(delay);
    }
}

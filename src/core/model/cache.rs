use std::sync::{Arc, Condvar, Mutex, MutexGuard};

use log::{error, info};

use super::{ImageModel, ModelLoader, ModelOptions};
use crate::core::error::DetectError;

enum Slot {
    Empty,
    Loading { attempt: u64 },
    Ready(Arc<dyn ImageModel>),
}

struct CacheState {
    slot: Slot,
    attempts: u64,
    last_failure: Option<(u64, String)>,
}

impl CacheState {
    fn is_loading(&self, attempt: u64) -> bool {
        matches!(self.slot, Slot::Loading { attempt: current } if current == attempt)
    }
}

/// Lazily loads and memoizes the model handle.
///
/// Success is cached for the lifetime of the cache. A failed attempt is
/// reported to every caller that was waiting on it and leaves the cache empty,
/// so the next call starts a fresh load.
pub struct ModelCache {
    loader: Box<dyn ModelLoader>,
    options: ModelOptions,
    state: Mutex<CacheState>,
    loaded: Condvar,
}

impl ModelCache {
    pub fn new(loader: Box<dyn ModelLoader>, options: ModelOptions) -> Self {
        Self {
            loader,
            options,
            state: Mutex::new(CacheState {
                slot: Slot::Empty,
                attempts: 0,
                last_failure: None,
            }),
            loaded: Condvar::new(),
        }
    }

    pub fn is_loaded(&self) -> bool {
        self.lock()
            .map(|state| matches!(state.slot, Slot::Ready(_)))
            .unwrap_or(false)
    }

    pub fn load(&self) -> Result<Arc<dyn ImageModel>, DetectError> {
        let mut state = self.lock()?;

        loop {
            let waiting_on = match &state.slot {
                Slot::Ready(model) => return Ok(Arc::clone(model)),
                Slot::Empty => break,
                Slot::Loading { attempt } => *attempt,
            };

            state = self
                .loaded
                .wait_while(state, |s| s.is_loading(waiting_on))
                .map_err(|_| DetectError::ModelLoad("model cache lock poisoned".to_string()))?;

            if let Some((failed, reason)) = &state.last_failure {
                if *failed == waiting_on {
                    return Err(DetectError::ModelLoad(reason.clone()));
                }
            }
        }

        state.attempts += 1;
        let attempt = state.attempts;
        state.slot = Slot::Loading { attempt };
        drop(state);

        info!(
            "🔧 Loading MobileNet v{} (alpha {}) from {}",
            self.options.version, self.options.alpha, self.options.model_url
        );
        let outcome = self.loader.load(&self.options);

        let mut state = self.lock()?;
        let result = match outcome {
            Ok(model) => {
                info!("✅ Model loaded (attempt {})", attempt);
                state.slot = Slot::Ready(Arc::clone(&model));
                Ok(model)
            }
            Err(e) => {
                let err = DetectError::model_load(e);
                error!("❌ Model load attempt {} failed: {}", attempt, err);
                state.slot = Slot::Empty;
                if let DetectError::ModelLoad(reason) = &err {
                    state.last_failure = Some((attempt, reason.clone()));
                }
                Err(err)
            }
        };
        drop(state);
        self.loaded.notify_all();

        result
    }

    fn lock(&self) -> Result<MutexGuard<'_, CacheState>, DetectError> {
        self.state
            .lock()
            .map_err(|_| DetectError::ModelLoad("model cache lock poisoned".to_string()))
    }
}

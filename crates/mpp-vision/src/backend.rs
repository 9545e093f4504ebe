//! Detection backend trait.
//!
//! A backend wraps one loaded model. The engine calls it from blocking
//! worker threads, so implementations are synchronous and must be
//! shareable across threads.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};

use mpp_models::RawDetection;

use crate::error::VisionResult;
use crate::input::DecodedImage;

type CancelHook = Box<dyn Fn() + Send + Sync>;

#[derive(Default)]
struct CancelState {
    cancelled: AtomicBool,
    hooks: Mutex<Vec<CancelHook>>,
}

/// Stop signal for one inference call.
///
/// The engine cancels the handle when the caller stops waiting (timeout or
/// dropped request). Backends either poll [`CancelHandle::is_cancelled`]
/// or register a hook that interrupts their runtime.
#[derive(Clone, Default)]
pub struct CancelHandle {
    state: Arc<CancelState>,
}

impl CancelHandle {
    pub fn new() -> Self {
        Self::default()
    }

    /// Signal cancellation and run registered hooks once.
    pub fn cancel(&self) {
        if self.state.cancelled.swap(true, Ordering::SeqCst) {
            return;
        }
        let hooks = self
            .state
            .hooks
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        for hook in hooks.iter() {
            hook();
        }
    }

    pub fn is_cancelled(&self) -> bool {
        self.state.cancelled.load(Ordering::SeqCst)
    }

    /// Run `hook` on cancellation, or right away if already cancelled.
    pub fn on_cancel(&self, hook: impl Fn() + Send + Sync + 'static) {
        let mut hooks = self
            .state
            .hooks
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        if self.is_cancelled() {
            drop(hooks);
            hook();
            return;
        }
        hooks.push(Box::new(hook));
    }

    /// Guard that cancels this handle when dropped, unless disarmed.
    pub fn drop_guard(&self) -> CancelOnDrop {
        CancelOnDrop {
            handle: Some(self.clone()),
        }
    }
}

/// Cancels its handle on drop.
pub struct CancelOnDrop {
    handle: Option<CancelHandle>,
}

impl CancelOnDrop {
    /// The guarded work finished; dropping no longer cancels.
    pub fn disarm(mut self) {
        self.handle = None;
    }
}

impl Drop for CancelOnDrop {
    fn drop(&mut self) {
        if let Some(handle) = self.handle.take() {
            handle.cancel();
        }
    }
}

/// A resident object detection model.
pub trait DetectionBackend: Send + Sync {
    /// Run the model on one decoded image.
    ///
    /// # Returns
    /// Raw detections with boxes in pixel coordinates of `image` and
    /// confidences in [0, 1]. Ordering and threshold filtering are left to
    /// the engine. A cancelled call should return early with an error; its
    /// result is never read.
    fn infer(&self, image: &DecodedImage, cancel: &CancelHandle) -> VisionResult<Vec<RawDetection>>;

    /// Version string of the loaded model, reported in responses.
    fn version(&self) -> &str;

    /// Backend name for logging.
    fn name(&self) -> &'static str;

    /// Raw labels this model can emit, in class index order.
    fn labels(&self) -> &[String] {
        &[]
    }
}

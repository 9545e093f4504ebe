//! Scripted backend for tests that must not depend on a model file.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;
use std::time::{Duration, Instant};

use mpp_models::RawDetection;

use crate::backend::{CancelHandle, DetectionBackend};
use crate::error::{VisionError, VisionResult};
use crate::input::DecodedImage;

/// Backend that returns a fixed list of detections.
pub struct ScriptedBackend {
    detections: Vec<RawDetection>,
    delays: Mutex<VecDeque<Duration>>,
    failure: Option<String>,
    calls: AtomicUsize,
    version: String,
}

impl ScriptedBackend {
    pub fn new(detections: Vec<RawDetection>) -> Self {
        Self {
            detections,
            delays: Mutex::new(VecDeque::new()),
            failure: None,
            calls: AtomicUsize::new(0),
            version: "scripted-1".to_string(),
        }
    }

    /// Sleep for the given durations on successive calls; later calls return immediately.
    /// A cancelled call stops sleeping and fails.
    pub fn with_delays(self, delays: impl IntoIterator<Item = Duration>) -> Self {
        Self {
            delays: Mutex::new(delays.into_iter().collect()),
            ..self
        }
    }

    /// Fail every call with an inference error.
    pub fn failing(self, message: impl Into<String>) -> Self {
        Self {
            failure: Some(message.into()),
            ..self
        }
    }

    pub fn with_version(self, version: impl Into<String>) -> Self {
        Self {
            version: version.into(),
            ..self
        }
    }

    /// Number of `infer` calls so far.
    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

impl DetectionBackend for ScriptedBackend {
    fn infer(&self, _image: &DecodedImage, cancel: &CancelHandle) -> VisionResult<Vec<RawDetection>> {
        self.calls.fetch_add(1, Ordering::SeqCst);

        let delay = self
            .delays
            .lock()
            .map_err(|_| VisionError::inference("Delay queue poisoned"))?
            .pop_front();
        if let Some(delay) = delay {
            let deadline = Instant::now() + delay;
            while let Some(left) = deadline.checked_duration_since(Instant::now()) {
                if cancel.is_cancelled() {
                    return Err(VisionError::inference("Inference cancelled"));
                }
                std::thread::sleep(left.min(Duration::from_millis(5)));
            }
        }

        match &self.failure {
            Some(message) => Err(VisionError::inference(message.clone())),
            None => Ok(self.detections.clone()),
        }
    }

    fn version(&self) -> &str {
        &self.version
    }

    fn name(&self) -> &'static str {
        "scripted"
    }
}

/// Encode a solid-colour PNG.
pub fn png_bytes(width: u32, height: u32) -> Vec<u8> {
    use ::image::{DynamicImage, ImageOutputFormat, Rgb, RgbImage};

    let img = RgbImage::from_pixel(width, height, Rgb([120, 80, 40]));
    let mut buf = Vec::new();
    // Writing into memory cannot fail for a valid RGB buffer
    let _ = DynamicImage::ImageRgb8(img)
        .write_to(&mut std::io::Cursor::new(&mut buf), ImageOutputFormat::Png);
    buf
}

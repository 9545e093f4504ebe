//! Detection engine: a resident model behind a bounded worker pool.
//!
//! The model is loaded once and shared. Each detection takes a permit from
//! a semaphore sized to the configured worker count, then runs the backend
//! on the blocking thread pool so the async runtime never waits on
//! inference. Requests beyond the worker count queue on the semaphore.
//!
//! When the caller stops waiting (timeout, dropped request) the running job
//! is cancelled so its permit returns to the pool without waiting for a
//! full inference pass.

use std::sync::Arc;
use std::time::Instant;

use mpp_models::RawDetection;
use tokio::sync::Semaphore;
use tracing::debug;

use crate::backend::{CancelHandle, DetectionBackend};
use crate::error::{VisionError, VisionResult};
use crate::input::{DecodedImage, Image, ImageLimits};
use crate::metrics;

/// Engine configuration.
#[derive(Debug, Clone)]
pub struct EngineConfig {
    /// Number of inferences allowed to run at once
    pub workers: usize,
    /// Bounds applied when decoding uploads
    pub limits: ImageLimits,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            workers: 1,
            limits: ImageLimits::default(),
        }
    }
}

/// Shared handle to the loaded detector.
#[derive(Clone)]
pub struct DetectionEngine {
    backend: Arc<dyn DetectionBackend>,
    permits: Arc<Semaphore>,
    config: EngineConfig,
}

impl DetectionEngine {
    pub fn new(backend: Arc<dyn DetectionBackend>, config: EngineConfig) -> VisionResult<Self> {
        if config.workers == 0 {
            return Err(VisionError::config("Inference worker count must be at least 1"));
        }

        Ok(Self {
            permits: Arc::new(Semaphore::new(config.workers)),
            backend,
            config,
        })
    }

    pub fn model_version(&self) -> &str {
        self.backend.version()
    }

    pub fn backend_name(&self) -> &'static str {
        self.backend.name()
    }

    pub fn labels(&self) -> &[String] {
        self.backend.labels()
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    /// Permits not currently held by a running inference.
    pub fn available_workers(&self) -> usize {
        self.permits.available_permits()
    }

    /// Decode and validate an upload off the async runtime.
    pub async fn decode(&self, image: Image) -> VisionResult<DecodedImage> {
        let limits = self.config.limits.clone();
        tokio::task::spawn_blocking(move || image.decode(&limits))
            .await
            .map_err(|e| VisionError::inference(format!("Decode task failed: {}", e)))?
    }

    /// Decode an upload and run detection on it.
    ///
    /// Returns detections with confidence >= `min_confidence`, ordered by
    /// descending confidence (ties by label, then box position).
    pub async fn detect(&self, image: Image, min_confidence: f32) -> VisionResult<Vec<RawDetection>> {
        check_threshold(min_confidence)?;
        let decoded = self.decode(image).await?;
        self.detect_decoded(Arc::new(decoded), min_confidence).await
    }

    /// Run detection on an already decoded image.
    pub async fn detect_decoded(
        &self,
        image: Arc<DecodedImage>,
        min_confidence: f32,
    ) -> VisionResult<Vec<RawDetection>> {
        check_threshold(min_confidence)?;

        let cancel = CancelHandle::new();
        let guard = cancel.drop_guard();

        let permit = self
            .permits
            .clone()
            .acquire_owned()
            .await
            .map_err(|_| VisionError::model_unavailable("Inference pool closed"))?;

        let backend = Arc::clone(&self.backend);
        let backend_name = backend.name();
        let started = Instant::now();

        let raw = tokio::task::spawn_blocking(move || {
            let _permit = permit;
            if cancel.is_cancelled() {
                return Err(VisionError::inference("Inference cancelled before start"));
            }
            backend.infer(&image, &cancel)
        })
        .await
        .map_err(|e| VisionError::inference(format!("Inference task failed: {}", e)))??;
        guard.disarm();

        let elapsed = started.elapsed();
        metrics::record_inference_duration(backend_name, elapsed.as_secs_f64());

        let detections = finalize(raw, min_confidence)?;
        debug!(
            backend = backend_name,
            count = detections.len(),
            min_confidence,
            elapsed_ms = elapsed.as_millis() as u64,
            "Inference completed"
        );

        Ok(detections)
    }
}

fn check_threshold(min_confidence: f32) -> VisionResult<()> {
    if (0.0..=1.0).contains(&min_confidence) {
        Ok(())
    } else {
        Err(VisionError::invalid_input(format!(
            "min_confidence must be within [0, 1], got {}",
            min_confidence
        )))
    }
}

/// Reject malformed backend output, apply the threshold and sort.
fn finalize(raw: Vec<RawDetection>, min_confidence: f32) -> VisionResult<Vec<RawDetection>> {
    if let Some(bad) = raw.iter().find(|d| !(0.0..=1.0).contains(&d.confidence)) {
        return Err(VisionError::inference(format!(
            "Backend returned confidence {} outside [0, 1]",
            bad.confidence
        )));
    }

    let mut detections: Vec<RawDetection> = raw
        .into_iter()
        .filter(|d| d.confidence >= min_confidence)
        .collect();
    detections.sort_by(|a, b| a.rank(b));
    Ok(detections)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{png_bytes, ScriptedBackend};
    use mpp_models::BoundingBox;
    use std::time::Duration;

    fn script() -> Vec<RawDetection> {
        vec![
            RawDetection::new("Drink can", 0.40, BoundingBox::new(5.0, 5.0, 10.0, 10.0)),
            RawDetection::new("plastic_bottle", 0.87, BoundingBox::new(1.0, 2.0, 20.0, 30.0)),
            RawDetection::new("Cigarette", 0.40, BoundingBox::new(8.0, 1.0, 3.0, 3.0)),
            RawDetection::new("Battery", 0.10, BoundingBox::new(0.0, 0.0, 4.0, 4.0)),
        ]
    }

    fn engine(backend: Arc<ScriptedBackend>) -> DetectionEngine {
        DetectionEngine::new(backend, EngineConfig::default()).unwrap()
    }

    fn png() -> Image {
        Image::new(png_bytes(64, 48), Some("image/png".to_string()))
    }

    #[tokio::test]
    async fn test_detect_orders_and_filters() {
        let backend = Arc::new(ScriptedBackend::new(script()));
        let detections = engine(backend).detect(png(), 0.25).await.unwrap();

        let labels: Vec<_> = detections.iter().map(|d| d.label.as_str()).collect();
        assert_eq!(labels, vec!["plastic_bottle", "Cigarette", "Drink can"]);
    }

    #[tokio::test]
    async fn test_threshold_is_monotonic() {
        let backend = Arc::new(ScriptedBackend::new(script()));
        let engine = engine(backend);

        let mut previous = usize::MAX;
        for threshold in [0.0, 0.1, 0.25, 0.4, 0.5, 0.87, 0.9, 1.0] {
            let detections = engine.detect(png(), threshold).await.unwrap();
            assert!(detections.iter().all(|d| d.confidence >= threshold));
            assert!(detections.len() <= previous);
            previous = detections.len();
        }
        assert_eq!(previous, 0);
    }

    #[tokio::test]
    async fn test_invalid_image_never_reaches_backend() {
        let backend = Arc::new(ScriptedBackend::new(script()));
        let engine = engine(Arc::clone(&backend));

        let err = engine
            .detect(Image::new(b"not an image".to_vec(), None), 0.25)
            .await
            .unwrap_err();

        assert!(matches!(err, VisionError::InvalidInput(_)));
        assert_eq!(backend.calls(), 0);
    }

    #[tokio::test]
    async fn test_threshold_out_of_range() {
        let backend = Arc::new(ScriptedBackend::new(script()));
        let engine = engine(Arc::clone(&backend));

        for threshold in [-0.1, 1.5, f32::NAN] {
            let err = engine.detect(png(), threshold).await.unwrap_err();
            assert!(matches!(err, VisionError::InvalidInput(_)));
        }
        assert_eq!(backend.calls(), 0);
    }

    #[tokio::test]
    async fn test_backend_confidence_out_of_range() {
        let backend = Arc::new(ScriptedBackend::new(vec![RawDetection::new(
            "Drink can",
            1.2,
            BoundingBox::new(0.0, 0.0, 1.0, 1.0),
        )]));
        let err = engine(backend).detect(png(), 0.0).await.unwrap_err();
        assert!(matches!(err, VisionError::Inference(_)));
    }

    #[tokio::test]
    async fn test_backend_failure_propagates() {
        let backend = Arc::new(ScriptedBackend::new(script()).failing("boom"));
        let err = engine(backend).detect(png(), 0.25).await.unwrap_err();
        assert!(matches!(err, VisionError::Inference(_)));
    }

    #[tokio::test]
    async fn test_empty_result_is_not_an_error() {
        let backend = Arc::new(ScriptedBackend::new(Vec::new()));
        let detections = engine(backend).detect(png(), 0.25).await.unwrap();
        assert!(detections.is_empty());
    }

    #[tokio::test]
    async fn test_concurrent_requests_share_one_worker() {
        let backend = Arc::new(
            ScriptedBackend::new(script())
                .with_delays([Duration::from_millis(30), Duration::from_millis(30)]),
        );
        let engine = engine(Arc::clone(&backend));

        let (a, b) = tokio::join!(engine.detect(png(), 0.25), engine.detect(png(), 0.25));
        assert_eq!(a.unwrap(), b.unwrap());
        assert_eq!(backend.calls(), 2);
        assert_eq!(engine.available_workers(), 1);
    }

    #[test]
    fn test_zero_workers_rejected() {
        let backend = Arc::new(ScriptedBackend::new(Vec::new()));
        let config = EngineConfig {
            workers: 0,
            ..EngineConfig::default()
        };
        let err = DetectionEngine::new(backend, config).err().unwrap();
        assert!(matches!(err, VisionError::Config(_)));
    }

    #[tokio::test]
    async fn test_abandoned_inference_releases_worker() {
        let backend = Arc::new(
            ScriptedBackend::new(script()).with_delays([Duration::from_secs(5)]),
        );
        let engine = engine(Arc::clone(&backend));
        let decoded = Arc::new(engine.decode(png()).await.unwrap());

        let abandoned = tokio::time::timeout(
            Duration::from_millis(50),
            engine.detect_decoded(Arc::clone(&decoded), 0.25),
        )
        .await;
        assert!(abandoned.is_err());

        let started = Instant::now();
        let detections = engine.detect_decoded(decoded, 0.25).await.unwrap();
        assert_eq!(detections.len(), 3);
        assert!(started.elapsed() < Duration::from_secs(2));
        assert_eq!(engine.available_workers(), 1);
    }
}

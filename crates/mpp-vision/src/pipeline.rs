//! Inference pipeline.
//!
//! One call to [`InferencePipeline::process`] takes an uploaded image
//! through `Received -> Validated -> Detected -> Categorized -> Completed`.
//! Any failure ends in `Failed`; there are no retries. Category resolution
//! is applied to the whole detection list or not at all.

use std::fmt;
use std::sync::Arc;
use std::time::{Duration, Instant};

use mpp_models::{
    CategorizedDetection, DetectionMetadata, DetectionResult, ImageInfo, Language,
};
use tracing::debug;

use crate::category::CategoryMapper;
use crate::engine::DetectionEngine;
use crate::error::{VisionError, VisionResult};
use crate::input::Image;
use crate::metrics;

/// Pipeline configuration.
#[derive(Debug, Clone)]
pub struct PipelineConfig {
    /// Threshold used when a request does not provide one
    pub default_min_confidence: f32,
    /// Upper bound on the detect stage (queueing plus inference); the
    /// running job is cancelled when it expires
    pub inference_timeout: Duration,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            default_min_confidence: 0.25,
            inference_timeout: Duration::from_millis(10_000),
        }
    }
}

/// Per-request options.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct DetectOptions {
    pub min_confidence: Option<f32>,
    pub language: Language,
    pub max_detections: Option<usize>,
}

impl DetectOptions {
    pub fn with_min_confidence(mut self, min_confidence: f32) -> Self {
        self.min_confidence = Some(min_confidence);
        self
    }

    pub fn with_language(mut self, language: Language) -> Self {
        self.language = language;
        self
    }

    pub fn with_max_detections(mut self, max_detections: usize) -> Self {
        self.max_detections = Some(max_detections);
        self
    }

    /// Check option ranges and resolve the effective threshold.
    fn effective_min_confidence(&self, default: f32) -> VisionResult<f32> {
        if self.max_detections == Some(0) {
            return Err(VisionError::invalid_input("max_detections must be at least 1"));
        }

        let threshold = self.min_confidence.unwrap_or(default);
        if !(0.0..=1.0).contains(&threshold) {
            return Err(VisionError::invalid_input(format!(
                "min_confidence must be within [0, 1], got {}",
                threshold
            )));
        }
        Ok(threshold)
    }
}

/// Processing stage of one request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stage {
    Received,
    Validated,
    Detected,
    Categorized,
    Completed,
    Failed,
}

impl Stage {
    pub fn as_str(&self) -> &'static str {
        match self {
            Stage::Received => "received",
            Stage::Validated => "validated",
            Stage::Detected => "detected",
            Stage::Categorized => "categorized",
            Stage::Completed => "completed",
            Stage::Failed => "failed",
        }
    }
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Detection engine + category mapper + response assembly.
#[derive(Clone)]
pub struct InferencePipeline {
    engine: DetectionEngine,
    mapper: Arc<CategoryMapper>,
    config: PipelineConfig,
}

impl InferencePipeline {
    /// Build a pipeline. Fails when the default threshold is outside [0, 1].
    pub fn new(
        engine: DetectionEngine,
        mapper: Arc<CategoryMapper>,
        config: PipelineConfig,
    ) -> VisionResult<Self> {
        if !(0.0..=1.0).contains(&config.default_min_confidence) {
            return Err(VisionError::config(format!(
                "Default min_confidence must be within [0, 1], got {}",
                config.default_min_confidence
            )));
        }
        if config.inference_timeout.is_zero() {
            return Err(VisionError::config("Inference timeout must be positive"));
        }

        Ok(Self {
            engine,
            mapper,
            config,
        })
    }

    pub fn engine(&self) -> &DetectionEngine {
        &self.engine
    }

    pub fn mapper(&self) -> &CategoryMapper {
        &self.mapper
    }

    pub fn config(&self) -> &PipelineConfig {
        &self.config
    }

    pub fn model_version(&self) -> &str {
        self.engine.model_version()
    }

    /// Run the full pipeline on one image.
    pub async fn process(
        &self,
        image: Image,
        options: DetectOptions,
    ) -> VisionResult<DetectionResult> {
        let started = Instant::now();
        debug!(stage = %Stage::Received, bytes = image.len(), "Detection request");

        match self.run(image, &options, started).await {
            Ok(result) => {
                metrics::record_detection_request("ok");
                Ok(result)
            }
            Err(e) => {
                debug!(
                    stage = %Stage::Failed,
                    kind = e.kind().as_str(),
                    error = %e,
                    elapsed_ms = started.elapsed().as_millis() as u64,
                    "Detection request failed"
                );
                metrics::record_detection_request(e.kind().as_str());
                Err(e)
            }
        }
    }

    async fn run(
        &self,
        image: Image,
        options: &DetectOptions,
        started: Instant,
    ) -> VisionResult<DetectionResult> {
        let min_confidence =
            options.effective_min_confidence(self.config.default_min_confidence)?;

        let decoded = Arc::new(self.engine.decode(image).await?);
        let image_info = ImageInfo {
            width: decoded.width(),
            height: decoded.height(),
            format: decoded.format_name().to_string(),
        };
        debug!(
            stage = %Stage::Validated,
            width = image_info.width,
            height = image_info.height,
            format = %image_info.format,
            "Image validated"
        );

        let timeout = self.config.inference_timeout;
        let mut raw = tokio::time::timeout(
            timeout,
            self.engine.detect_decoded(Arc::clone(&decoded), min_confidence),
        )
        .await
        .map_err(|_| VisionError::InferenceTimeout(timeout.as_millis() as u64))??;
        drop(decoded);

        if let Some(max) = options.max_detections {
            raw.truncate(max);
        }
        debug!(stage = %Stage::Detected, detections = raw.len(), min_confidence, "Detection done");

        let detections: Vec<CategorizedDetection> = raw
            .into_iter()
            .map(|detection| {
                let entry = self.mapper.resolve(&detection.label);
                if entry.is_unknown() {
                    metrics::record_unknown_label();
                    debug!(label = %detection.label, "Unmapped raw label");
                }
                CategorizedDetection::new(detection, entry, options.language)
            })
            .collect();
        debug!(stage = %Stage::Categorized, detections = detections.len(), "Categories resolved");

        let metadata = DetectionMetadata {
            model_version: self.engine.model_version().to_string(),
            category_table_version: self.mapper.version().to_string(),
            processing_time_ms: started.elapsed().as_millis() as u64,
            min_confidence,
            language: options.language,
            image: image_info,
        };
        let result = DetectionResult::new(detections, metadata);

        for count in &result.summary {
            metrics::record_detections(&count.category, count.count as u64);
        }

        debug!(
            stage = %Stage::Completed,
            model_version = %result.metadata.model_version,
            detections = result.len(),
            unknown = result.unknown_count(),
            elapsed_ms = result.metadata.processing_time_ms,
            "Detection request completed"
        );

        Ok(result)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::EngineConfig;
    use crate::testing::{png_bytes, ScriptedBackend};
    use mpp_models::{BoundingBox, RawDetection, UNKNOWN_CATEGORY};

    fn png() -> Image {
        Image::new(png_bytes(64, 48), Some("image/png".to_string()))
    }

    fn pipeline_with(backend: Arc<ScriptedBackend>, workers: usize, timeout: Duration) -> InferencePipeline {
        let engine = DetectionEngine::new(
            backend,
            EngineConfig {
                workers,
                ..EngineConfig::default()
            },
        )
        .unwrap();
        let mapper = Arc::new(CategoryMapper::embedded().unwrap());
        InferencePipeline::new(
            engine,
            mapper,
            PipelineConfig {
                default_min_confidence: 0.25,
                inference_timeout: timeout,
            },
        )
        .unwrap()
    }

    fn pipeline(backend: Arc<ScriptedBackend>) -> InferencePipeline {
        pipeline_with(backend, 1, Duration::from_secs(5))
    }

    fn bottle() -> RawDetection {
        RawDetection::new("plastic_bottle", 0.87, BoundingBox::new(4.0, 6.0, 20.0, 30.0))
    }

    #[tokio::test]
    async fn test_known_label_is_categorized() {
        let backend = Arc::new(ScriptedBackend::new(vec![bottle()]).with_version("taco-v8n"));
        let result = pipeline(backend)
            .process(png(), DetectOptions::default())
            .await
            .unwrap();

        assert_eq!(result.len(), 1);
        let det = &result.detections[0];
        assert_eq!(det.category, "PLASTIC");
        assert!(det.known);
        assert!((det.confidence - 0.87).abs() < 1e-6);
        assert_eq!(result.metadata.model_version, "taco-v8n");
        assert_eq!(result.metadata.image.width, 64);
        assert_eq!(result.metadata.image.format, "png");
        assert!((result.metadata.min_confidence - 0.25).abs() < 1e-6);
    }

    #[tokio::test]
    async fn test_unmapped_label_is_unknown_not_dropped() {
        let backend = Arc::new(ScriptedBackend::new(vec![RawDetection::new(
            "mystery_object",
            0.6,
            BoundingBox::new(0.0, 0.0, 10.0, 10.0),
        )]));
        let result = pipeline(backend)
            .process(png(), DetectOptions::default())
            .await
            .unwrap();

        assert_eq!(result.len(), 1);
        assert_eq!(result.detections[0].category, UNKNOWN_CATEGORY);
        assert!(!result.detections[0].known);
        assert_eq!(result.unknown_count(), 1);
    }

    #[tokio::test]
    async fn test_undecodable_image_fails_before_detection() {
        let backend = Arc::new(ScriptedBackend::new(vec![bottle()]));
        let pipeline = pipeline(Arc::clone(&backend));

        let err = pipeline
            .process(
                Image::new(b"\x89PNG garbage".to_vec(), Some("image/png".to_string())),
                DetectOptions::default(),
            )
            .await
            .unwrap_err();

        assert!(matches!(err, VisionError::InvalidInput(_)));
        assert_eq!(backend.calls(), 0);
    }

    #[tokio::test]
    async fn test_threshold_above_every_detection_gives_empty_result() {
        let backend = Arc::new(ScriptedBackend::new(vec![bottle()]));
        let result = pipeline(backend)
            .process(png(), DetectOptions::default().with_min_confidence(0.9))
            .await
            .unwrap();

        assert!(result.is_empty());
        assert!(result.summary.is_empty());
    }

    #[tokio::test]
    async fn test_invalid_options_rejected() {
        let backend = Arc::new(ScriptedBackend::new(vec![bottle()]));
        let pipeline = pipeline(Arc::clone(&backend));

        for options in [
            DetectOptions::default().with_min_confidence(1.01),
            DetectOptions::default().with_min_confidence(f32::NAN),
            DetectOptions::default().with_max_detections(0),
        ] {
            let err = pipeline.process(png(), options).await.unwrap_err();
            assert!(matches!(err, VisionError::InvalidInput(_)));
        }
        assert_eq!(backend.calls(), 0);
    }

    #[tokio::test]
    async fn test_identical_requests_are_idempotent() {
        let backend = Arc::new(ScriptedBackend::new(vec![
            bottle(),
            RawDetection::new("Drink can", 0.5, BoundingBox::new(30.0, 10.0, 8.0, 12.0)),
            RawDetection::new("Cigarette", 0.5, BoundingBox::new(2.0, 2.0, 3.0, 1.0)),
        ]));
        let pipeline = pipeline(backend);
        let options = DetectOptions::default().with_language(Language::Fr);

        let first = pipeline.process(png(), options.clone()).await.unwrap();
        let second = pipeline.process(png(), options).await.unwrap();

        assert_eq!(first.detections, second.detections);
        assert_eq!(first.summary, second.summary);
        let labels: Vec<_> = first.detections.iter().map(|d| d.label.as_str()).collect();
        assert_eq!(labels, vec!["plastic_bottle", "Cigarette", "Drink can"]);
        assert_eq!(first.detections[0].category_name, "Plastique");
    }

    #[tokio::test]
    async fn test_max_detections_truncates_ordered_list() {
        let backend = Arc::new(ScriptedBackend::new(vec![
            RawDetection::new("Drink can", 0.5, BoundingBox::new(30.0, 10.0, 8.0, 12.0)),
            bottle(),
        ]));
        let result = pipeline(backend)
            .process(png(), DetectOptions::default().with_max_detections(1))
            .await
            .unwrap();

        assert_eq!(result.len(), 1);
        assert_eq!(result.detections[0].label, "plastic_bottle");
    }

    #[tokio::test]
    async fn test_timeout_does_not_poison_later_requests() {
        let backend = Arc::new(
            ScriptedBackend::new(vec![bottle()]).with_delays([Duration::from_millis(500)]),
        );
        // Single worker: the timed-out job must give its permit back
        let pipeline = pipeline_with(Arc::clone(&backend), 1, Duration::from_millis(100));

        let err = pipeline
            .process(png(), DetectOptions::default())
            .await
            .unwrap_err();
        assert!(matches!(err, VisionError::InferenceTimeout(100)));

        let result = pipeline.process(png(), DetectOptions::default()).await.unwrap();
        assert_eq!(result.len(), 1);
        assert_eq!(backend.calls(), 2);
        assert_eq!(pipeline.engine().available_workers(), 1);
    }

    #[test]
    fn test_invalid_settings_rejected_as_config() {
        let mapper = Arc::new(CategoryMapper::embedded().unwrap());

        for config in [
            PipelineConfig {
                default_min_confidence: 1.5,
                ..PipelineConfig::default()
            },
            PipelineConfig {
                inference_timeout: Duration::ZERO,
                ..PipelineConfig::default()
            },
        ] {
            let backend = Arc::new(ScriptedBackend::new(Vec::new()));
            let engine = DetectionEngine::new(backend, EngineConfig::default()).unwrap();
            let result = InferencePipeline::new(engine, Arc::clone(&mapper), config);
            assert!(matches!(result, Err(VisionError::Config(_))));
        }
    }
}

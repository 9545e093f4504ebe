//! Application state.

use std::sync::Arc;

use mpp_vision::{
    CategoryMapper, DetectionBackend, DetectionEngine, EngineConfig, ImageLimits,
    InferencePipeline, PipelineConfig, VisionResult,
};
use tracing::info;

use crate::config::ApiConfig;

/// Shared application state.
///
/// The model and the category table are loaded once and shared read-only
/// by every request.
#[derive(Clone)]
pub struct AppState {
    pub config: ApiConfig,
    pub pipeline: Arc<InferencePipeline>,
}

impl AppState {
    /// Load the category table and the ONNX model named by `config`.
    ///
    /// Any failure here is fatal: the service must not start without both.
    #[cfg(feature = "onnx")]
    pub fn new(config: ApiConfig) -> VisionResult<Self> {
        use mpp_vision::{OnnxYoloBackend, OnnxYoloConfig};

        let mapper = CategoryMapper::load(config.category_table_path.as_deref())?;

        let backend = OnnxYoloBackend::load(&OnnxYoloConfig {
            model_path: config.model.path.clone(),
            labels_path: config.model.labels_path.clone(),
            version: config.model.version.clone(),
            input_size: config.model.input_size,
            nms_threshold: config.model.nms_threshold,
        })?;

        let unmapped = unmapped_labels(backend.labels(), &mapper);
        if !unmapped.is_empty() {
            tracing::warn!(
                count = unmapped.len(),
                labels = %unmapped.join(", "),
                "Some model labels have no category mapping"
            );
        }

        Self::with_backend(config, Arc::new(backend), mapper)
    }

    #[cfg(not(feature = "onnx"))]
    pub fn new(_config: ApiConfig) -> VisionResult<Self> {
        Err(mpp_vision::VisionError::model_unavailable(
            "Built without the onnx feature",
        ))
    }

    /// Assemble state around an already loaded backend.
    pub fn with_backend(
        config: ApiConfig,
        backend: Arc<dyn DetectionBackend>,
        mapper: CategoryMapper,
    ) -> VisionResult<Self> {
        let engine = DetectionEngine::new(
            backend,
            EngineConfig {
                workers: config.inference_workers,
                limits: ImageLimits {
                    max_bytes: config.max_image_bytes,
                    max_dimension: config.max_image_dimension,
                },
            },
        )?;

        let pipeline = InferencePipeline::new(
            engine,
            Arc::new(mapper),
            PipelineConfig {
                default_min_confidence: config.default_min_confidence,
                inference_timeout: config.inference_timeout,
            },
        )?;

        info!(
            model_version = pipeline.model_version(),
            backend = pipeline.engine().backend_name(),
            category_table_version = pipeline.mapper().version(),
            workers = config.inference_workers,
            "Inference pipeline ready"
        );

        Ok(Self {
            config,
            pipeline: Arc::new(pipeline),
        })
    }
}

/// Model labels the category table does not map.
pub fn unmapped_labels<'a>(labels: &'a [String], mapper: &CategoryMapper) -> Vec<&'a str> {
    labels
        .iter()
        .map(String::as_str)
        .filter(|label| mapper.lookup(label).is_none())
        .collect()
}

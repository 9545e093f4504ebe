//! Waste detection core.
//!
//! This crate provides:
//! - `CategoryMapper`: raw model label -> canonical waste category
//! - `DetectionEngine`: resident model behind a bounded worker pool
//! - `InferencePipeline`: validation, detection, categorization, response assembly
//! - A YOLOv8 ONNX backend (feature `onnx`)

pub mod backend;
pub mod category;
pub mod engine;
pub mod error;
pub mod input;
pub mod metrics;
#[cfg(feature = "onnx")]
pub mod onnx;
pub mod pipeline;
#[cfg(any(test, feature = "test-util"))]
pub mod testing;
pub mod yolo;

pub use backend::{CancelHandle, DetectionBackend};
pub use category::{normalize_label, CategoryMapper, EMBEDDED_CATEGORY_TABLE};
pub use engine::{DetectionEngine, EngineConfig};
pub use error::{VisionError, VisionResult};
pub use input::{DecodedImage, Image, ImageLimits};
#[cfg(feature = "onnx")]
pub use onnx::{OnnxYoloBackend, OnnxYoloConfig};
pub use pipeline::{DetectOptions, InferencePipeline, PipelineConfig, Stage};
pub use yolo::{decode_output, load_labels, YoloDecodeConfig};

//! YOLOv8 waste detector on ONNX Runtime.
//!
//! Execution provider selection:
//! - CUDA on Linux with NVIDIA GPU (when `cuda` feature enabled)
//! - CoreML on macOS
//! - CPU fallback on all platforms

use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

use ::image::{DynamicImage, ImageBuffer, Rgb};
use mpp_models::RawDetection;
use ort::session::builder::GraphOptimizationLevel;
use ort::session::{RunOptions, Session};
use ort::value::{Tensor, Value};
use tracing::{debug, info, warn};

use crate::backend::{CancelHandle, DetectionBackend};
use crate::error::{VisionError, VisionResult};
use crate::input::DecodedImage;
use crate::yolo::{self, YoloDecodeConfig};

/// Configuration for the ONNX detector.
#[derive(Debug, Clone)]
pub struct OnnxYoloConfig {
    /// Path to ONNX model file
    pub model_path: PathBuf,
    /// Class labels file, one label per line
    pub labels_path: PathBuf,
    /// Reported model version; defaults to the model file stem
    pub version: Option<String>,
    /// Input image size (model expects square input)
    pub input_size: u32,
    /// IoU threshold for NMS
    pub nms_threshold: f32,
}

impl Default for OnnxYoloConfig {
    fn default() -> Self {
        Self {
            model_path: PathBuf::from("models/detection/best.onnx"),
            labels_path: PathBuf::from("models/detection/labels.txt"),
            version: None,
            input_size: 640,
            nms_threshold: 0.45,
        }
    }
}

/// Waste detector backed by a YOLOv8 ONNX model.
pub struct OnnxYoloBackend {
    session: Mutex<Session>,
    labels: Vec<String>,
    version: String,
    decode: YoloDecodeConfig,
}

impl OnnxYoloBackend {
    /// Load the model and its labels, then run a warm-up pass.
    ///
    /// Any failure (missing file, unloadable graph, output shape that does
    /// not match the label count) is reported as `ModelUnavailable`.
    pub fn load(config: &OnnxYoloConfig) -> VisionResult<Self> {
        if !config.model_path.exists() {
            return Err(VisionError::model_unavailable(format!(
                "Model file not found: {}",
                config.model_path.display()
            )));
        }
        if config.input_size == 0 {
            return Err(VisionError::model_unavailable("Model input size must be positive"));
        }

        let labels = yolo::load_labels(&config.labels_path)?;
        let session = create_session(&config.model_path)?;

        let version = config
            .version
            .clone()
            .filter(|v| !v.trim().is_empty())
            .unwrap_or_else(|| model_stem(&config.model_path));

        let backend = Self {
            session: Mutex::new(session),
            labels,
            version,
            decode: YoloDecodeConfig {
                input_size: config.input_size,
                nms_threshold: config.nms_threshold,
                ..YoloDecodeConfig::default()
            },
        };

        backend.warm_up()?;

        info!(
            model_path = %config.model_path.display(),
            version = %backend.version,
            classes = backend.labels.len(),
            input_size = config.input_size,
            "Waste detector initialized"
        );

        Ok(backend)
    }

    /// Run one blank frame through the model to surface shape mismatches at startup.
    fn warm_up(&self) -> VisionResult<()> {
        let size = self.decode.input_size;
        let blank: ImageBuffer<Rgb<u8>, Vec<u8>> = ImageBuffer::new(size, size);
        let input = self.preprocess(&DynamicImage::ImageRgb8(blank))?;

        let output = self
            .run_inference(input, &CancelHandle::new())
            .map_err(|e| VisionError::model_unavailable(format!("Warm-up failed: {}", e)))?;

        let features = 4 + self.labels.len();
        if output.is_empty() || output.len() % features != 0 {
            return Err(VisionError::model_unavailable(format!(
                "Model output of {} values does not match {} labels",
                output.len(),
                self.labels.len()
            )));
        }

        debug!(candidates = output.len() / features, "Warm-up pass completed");
        Ok(())
    }

    /// Resize to the model input, normalize to [0, 1], NCHW layout.
    fn preprocess(&self, img: &DynamicImage) -> VisionResult<Value> {
        let size = self.decode.input_size;
        let resized = img.resize_exact(size, size, ::image::imageops::FilterType::Triangle);
        let rgb = resized.to_rgb8();
        let (w, h) = (size as usize, size as usize);

        let mut chw_data: Vec<f32> = vec![0.0; 3 * h * w];
        for (x, y, pixel) in rgb.enumerate_pixels() {
            let offset = y as usize * w + x as usize;
            for c in 0..3 {
                chw_data[c * h * w + offset] = pixel[c] as f32 / 255.0;
            }
        }

        let shape = vec![1usize, 3, h, w];
        Tensor::from_array((shape, chw_data.into_boxed_slice()))
            .map(Value::from)
            .map_err(|e| VisionError::inference(format!("Failed to create tensor: {}", e)))
    }

    /// Run the session; `cancel` terminates the run through its `RunOptions`.
    fn run_inference(&self, input: Value, cancel: &CancelHandle) -> VisionResult<Vec<f32>> {
        let run_options = Arc::new(
            RunOptions::new()
                .map_err(|e| VisionError::inference(format!("Failed to create run options: {}", e)))?,
        );
        let terminate = Arc::clone(&run_options);
        cancel.on_cancel(move || {
            if let Err(e) = terminate.terminate() {
                warn!("Failed to terminate ONNX run: {}", e);
            }
        });

        let mut session = self
            .session
            .lock()
            .map_err(|_| VisionError::inference("Session lock poisoned"))?;
        if cancel.is_cancelled() {
            return Err(VisionError::inference("Inference cancelled"));
        }

        let outputs = session
            .run_with_options(ort::inputs![input], &*run_options)
            .map_err(|e| VisionError::inference(format!("ONNX inference failed: {}", e)))?;

        // YOLOv8 output is [1, 4 + C, N]
        let output = outputs
            .get("output0")
            .ok_or_else(|| VisionError::inference("Missing output0 tensor"))?;

        let tensor = output
            .try_extract_tensor::<f32>()
            .map_err(|e| VisionError::inference(format!("Failed to extract tensor: {}", e)))?;

        Ok(tensor.1.to_vec())
    }
}

impl DetectionBackend for OnnxYoloBackend {
    fn infer(&self, image: &DecodedImage, cancel: &CancelHandle) -> VisionResult<Vec<RawDetection>> {
        let input = self.preprocess(image.image())?;
        let output = self.run_inference(input, cancel)?;
        let detections = yolo::decode_output(
            &output,
            &self.labels,
            image.width(),
            image.height(),
            &self.decode,
        )?;

        debug!(count = detections.len(), "Waste detection completed");
        Ok(detections)
    }

    fn version(&self) -> &str {
        &self.version
    }

    fn name(&self) -> &'static str {
        "onnx-yolov8"
    }

    fn labels(&self) -> &[String] {
        &self.labels
    }
}

fn model_stem(path: &Path) -> String {
    path.file_stem()
        .and_then(|s| s.to_str())
        .unwrap_or("unknown")
        .to_string()
}

/// Create ONNX Runtime session with automatic execution provider selection.
fn create_session(model_path: &Path) -> VisionResult<Session> {
    let model_bytes = std::fs::read(model_path)
        .map_err(|e| VisionError::model_unavailable(format!("Failed to read model file: {}", e)))?;

    let builder = Session::builder()
        .map_err(|e| VisionError::model_unavailable(format!("Failed to create session builder: {}", e)))?
        .with_optimization_level(GraphOptimizationLevel::Level3)
        .map_err(|e| VisionError::model_unavailable(format!("Failed to set optimization level: {}", e)))?;

    #[cfg(all(target_os = "linux", feature = "cuda"))]
    {
        use ort::execution_providers::CUDAExecutionProvider;
        if let Ok(cuda_builder) = builder
            .clone()
            .with_execution_providers([CUDAExecutionProvider::default().build()])
        {
            if let Ok(session) = cuda_builder.commit_from_memory(&model_bytes) {
                info!("Using CUDA execution provider for waste detection");
                return Ok(session);
            }
        }
        debug!("CUDA execution provider not available, trying alternatives");
    }

    #[cfg(target_os = "macos")]
    {
        use ort::execution_providers::CoreMLExecutionProvider;
        if let Ok(coreml_builder) = builder
            .clone()
            .with_execution_providers([CoreMLExecutionProvider::default().build()])
        {
            if let Ok(session) = coreml_builder.commit_from_memory(&model_bytes) {
                info!("Using CoreML execution provider for waste detection");
                return Ok(session);
            }
        }
        debug!("CoreML execution provider not available, using CPU");
    }

    info!("Using CPU execution provider for waste detection");
    builder
        .commit_from_memory(&model_bytes)
        .map_err(|e| VisionError::model_unavailable(format!("Failed to load ONNX model: {}", e)))
}

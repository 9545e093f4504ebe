//! API configuration.

use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

use tracing::warn;

/// API server configuration.
#[derive(Debug, Clone)]
pub struct ApiConfig {
    /// Server host
    pub host: String,
    /// Server port
    pub port: u16,
    /// CORS origins
    pub cors_origins: Vec<String>,
    /// Rate limit requests per second (per client IP, `/api` routes)
    pub rate_limit_rps: u32,
    /// Max request body size
    pub max_body_size: usize,
    /// Environment (development/production)
    pub environment: String,
    /// Serve Prometheus metrics at `/metrics`
    pub metrics_enabled: bool,
    /// Model settings
    pub model: ModelConfig,
    /// Category table; `None` uses the embedded TACO table
    pub category_table_path: Option<PathBuf>,
    /// Threshold used when a request does not set one
    pub default_min_confidence: f32,
    /// Per-request bound on the detect stage
    pub inference_timeout: Duration,
    /// Concurrent inferences
    pub inference_workers: usize,
    /// Maximum encoded image size
    pub max_image_bytes: usize,
    /// Maximum image width/height
    pub max_image_dimension: u32,
}

/// Detection model settings.
#[derive(Debug, Clone)]
pub struct ModelConfig {
    pub path: PathBuf,
    pub labels_path: PathBuf,
    /// Reported version; the model file stem when unset
    pub version: Option<String>,
    pub input_size: u32,
    pub nms_threshold: f32,
}

impl Default for ModelConfig {
    fn default() -> Self {
        Self {
            path: PathBuf::from("models/detection/best.onnx"),
            labels_path: PathBuf::from("models/detection/labels.txt"),
            version: None,
            input_size: 640,
            nms_threshold: 0.45,
        }
    }
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 8000,
            cors_origins: vec!["*".to_string()],
            rate_limit_rps: 10,
            max_body_size: 10 * 1024 * 1024, // 10MB
            environment: "development".to_string(),
            metrics_enabled: true,
            model: ModelConfig::default(),
            category_table_path: None,
            default_min_confidence: 0.25,
            inference_timeout: Duration::from_millis(10_000),
            inference_workers: 1,
            max_image_bytes: 10 * 1024 * 1024,
            max_image_dimension: 8192,
        }
    }
}

impl ApiConfig {
    /// Create config from environment variables.
    ///
    /// Unparseable values fall back to their default with a warning. The
    /// default threshold is passed through as-is and checked by [`validate`](Self::validate).
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build config from an arbitrary key lookup.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let defaults = Self::default();
        let get = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

        Self {
            host: get("API_HOST").unwrap_or(defaults.host),
            port: parse_or("API_PORT", get("API_PORT"), defaults.port),
            cors_origins: get("CORS_ORIGINS")
                .map(|s| s.split(',').map(|s| s.trim().to_string()).collect())
                .unwrap_or(defaults.cors_origins),
            rate_limit_rps: parse_or("RATE_LIMIT_RPS", get("RATE_LIMIT_RPS"), defaults.rate_limit_rps),
            max_body_size: parse_or("MAX_BODY_SIZE", get("MAX_BODY_SIZE"), defaults.max_body_size),
            environment: get("ENVIRONMENT").unwrap_or(defaults.environment),
            metrics_enabled: get("METRICS_ENABLED")
                .map(|v| v == "true" || v == "1")
                .unwrap_or(defaults.metrics_enabled),
            model: ModelConfig {
                path: get("MODEL_PATH").map(PathBuf::from).unwrap_or(defaults.model.path),
                labels_path: get("MODEL_LABELS_PATH")
                    .map(PathBuf::from)
                    .unwrap_or(defaults.model.labels_path),
                version: get("MODEL_VERSION"),
                input_size: parse_or("MODEL_INPUT_SIZE", get("MODEL_INPUT_SIZE"), defaults.model.input_size),
                nms_threshold: parse_or("NMS_THRESHOLD", get("NMS_THRESHOLD"), defaults.model.nms_threshold),
            },
            category_table_path: get("CATEGORY_TABLE_PATH").map(PathBuf::from),
            default_min_confidence: parse_or(
                "DEFAULT_MIN_CONFIDENCE",
                get("DEFAULT_MIN_CONFIDENCE"),
                defaults.default_min_confidence,
            ),
            inference_timeout: Duration::from_millis(parse_or(
                "INFERENCE_TIMEOUT_MS",
                get("INFERENCE_TIMEOUT_MS"),
                defaults.inference_timeout.as_millis() as u64,
            )),
            inference_workers: parse_or("INFERENCE_WORKERS", get("INFERENCE_WORKERS"), defaults.inference_workers),
            max_image_bytes: parse_or("MAX_IMAGE_BYTES", get("MAX_IMAGE_BYTES"), defaults.max_image_bytes),
            max_image_dimension: parse_or(
                "MAX_IMAGE_DIMENSION",
                get("MAX_IMAGE_DIMENSION"),
                defaults.max_image_dimension,
            ),
        }
    }

    /// Reject settings the service cannot start with.
    pub fn validate(&self) -> Result<(), String> {
        if !(0.0..=1.0).contains(&self.default_min_confidence) {
            return Err(format!(
                "DEFAULT_MIN_CONFIDENCE must be within [0, 1], got {}",
                self.default_min_confidence
            ));
        }
        if !(0.0..=1.0).contains(&self.model.nms_threshold) {
            return Err(format!(
                "NMS_THRESHOLD must be within [0, 1], got {}",
                self.model.nms_threshold
            ));
        }
        if self.inference_workers == 0 {
            return Err("INFERENCE_WORKERS must be at least 1".to_string());
        }
        if self.inference_timeout.is_zero() {
            return Err("INFERENCE_TIMEOUT_MS must be positive".to_string());
        }
        Ok(())
    }

    /// Check if running in production mode.
    pub fn is_production(&self) -> bool {
        self.environment.to_lowercase() == "production"
    }
}

fn parse_or<T: FromStr>(key: &str, raw: Option<String>, default: T) -> T {
    match raw {
        None => default,
        Some(value) => match value.trim().parse() {
            Ok(parsed) => parsed,
            Err(_) => {
                warn!(key, value = %value, "Invalid configuration value, using default");
                default
            }
        },
    }
}

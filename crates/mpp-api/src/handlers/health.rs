//! Health, readiness and model info handlers.

use axum::extract::State;
use axum::Json;
use chrono::Utc;
use serde::{Deserialize, Serialize};

use crate::state::AppState;

/// Health response.
#[derive(Serialize, Deserialize)]
pub struct HealthResponse {
    pub status: String,
    pub version: String,
    pub timestamp: String,
}

/// Health check endpoint (liveness probe).
pub async fn health() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "healthy".to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
        timestamp: Utc::now().to_rfc3339(),
    })
}

/// Readiness check response.
#[derive(Serialize, Deserialize)]
pub struct ReadinessResponse {
    pub status: String,
    pub checks: ReadinessChecks,
}

#[derive(Serialize, Deserialize)]
pub struct ReadinessChecks {
    pub model: CheckStatus,
    pub category_table: CheckStatus,
}

#[derive(Serialize, Deserialize)]
pub struct CheckStatus {
    pub status: String,
    pub version: String,
}

/// Readiness check endpoint (readiness probe).
///
/// State only exists once the model and the category table are loaded, so
/// a response here means both are ready.
pub async fn ready(State(state): State<AppState>) -> Json<ReadinessResponse> {
    let pipeline = &state.pipeline;

    Json(ReadinessResponse {
        status: "ready".to_string(),
        checks: ReadinessChecks {
            model: CheckStatus {
                status: "ok".to_string(),
                version: pipeline.model_version().to_string(),
            },
            category_table: CheckStatus {
                status: "ok".to_string(),
                version: pipeline.mapper().version().to_string(),
            },
        },
    })
}

/// Loaded model description.
#[derive(Serialize, Deserialize)]
pub struct ModelInfo {
    pub backend: String,
    pub version: String,
    pub labels: Vec<String>,
    pub category_table_version: String,
    pub default_min_confidence: f32,
    pub inference_timeout_ms: u64,
    pub workers: usize,
    pub available_workers: usize,
    pub max_image_bytes: usize,
    pub max_image_dimension: u32,
}

/// Describe the loaded model and request defaults.
pub async fn model_info(State(state): State<AppState>) -> Json<ModelInfo> {
    let pipeline = &state.pipeline;
    let engine = pipeline.engine();

    Json(ModelInfo {
        backend: engine.backend_name().to_string(),
        version: pipeline.model_version().to_string(),
        labels: engine.labels().to_vec(),
        category_table_version: pipeline.mapper().version().to_string(),
        default_min_confidence: pipeline.config().default_min_confidence,
        inference_timeout_ms: pipeline.config().inference_timeout.as_millis() as u64,
        workers: engine.config().workers,
        available_workers: engine.available_workers(),
        max_image_bytes: engine.config().limits.max_bytes,
        max_image_dimension: engine.config().limits.max_dimension,
    })
}

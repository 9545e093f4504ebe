//! Axum HTTP API server for the waste detection service.
//!
//! This crate provides:
//! - `POST /api/detect` image upload and detection
//! - Category table and model info endpoints for the dashboard
//! - Rate limiting, request ids and security headers
//! - Prometheus metrics

pub mod config;
pub mod error;
pub mod handlers;
pub mod metrics;
pub mod middleware;
pub mod routes;
pub mod state;

pub use config::{ApiConfig, ModelConfig};
pub use error::{ApiError, ApiResult};
pub use routes::create_router;
pub use state::AppState;

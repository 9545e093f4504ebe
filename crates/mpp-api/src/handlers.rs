//! Request handlers.

pub mod categories;
pub mod detect;
pub mod health;

pub use categories::*;
pub use detect::*;
pub use health::*;

use crate::error::ApiError;

/// Fallback for unknown routes.
pub async fn not_found(uri: axum::http::Uri) -> ApiError {
    ApiError::not_found(uri.path().to_string())
}

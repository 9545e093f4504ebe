//! Wire representation of errors returned by the detection API.

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Stable error classification shared by the service and its clients.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, JsonSchema)]
pub enum ErrorKind {
    /// Bad or undecodable image, out-of-range options
    InvalidInput,
    /// Model artifact missing or corrupt
    ModelUnavailable,
    /// Category table missing or malformed
    CategoryTableUnavailable,
    /// Inference failed for this request
    InferenceError,
    /// Inference exceeded the per-request time bound
    InferenceTimeout,
    /// Too many requests from this client
    RateLimited,
    /// Unknown route or resource
    NotFound,
    /// Anything else
    Internal,
}

impl ErrorKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ErrorKind::InvalidInput => "InvalidInput",
            ErrorKind::ModelUnavailable => "ModelUnavailable",
            ErrorKind::CategoryTableUnavailable => "CategoryTableUnavailable",
            ErrorKind::InferenceError => "InferenceError",
            ErrorKind::InferenceTimeout => "InferenceTimeout",
            ErrorKind::RateLimited => "RateLimited",
            ErrorKind::NotFound => "NotFound",
            ErrorKind::Internal => "Internal",
        }
    }

    /// Whether the process can keep serving after an error of this kind.
    pub fn is_recoverable(&self) -> bool {
        !matches!(
            self,
            ErrorKind::ModelUnavailable | ErrorKind::CategoryTableUnavailable
        )
    }
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// JSON error body: `{"kind": "...", "message": "..."}`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct ErrorBody {
    pub kind: ErrorKind,
    pub message: String,
}

impl ErrorBody {
    pub fn new(kind: ErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_body_shape() {
        let body = ErrorBody::new(ErrorKind::InferenceTimeout, "took too long");
        let json = serde_json::to_value(&body).unwrap();
        assert_eq!(json["kind"], "InferenceTimeout");
        assert_eq!(json["message"], "took too long");
    }

    #[test]
    fn test_kind_display_matches_serde() {
        for kind in [
            ErrorKind::InvalidInput,
            ErrorKind::ModelUnavailable,
            ErrorKind::InferenceError,
        ] {
            let json = serde_json::to_string(&kind).unwrap();
            assert_eq!(json, format!("\"{}\"", kind));
        }
    }

    #[test]
    fn test_recoverable() {
        assert!(ErrorKind::InvalidInput.is_recoverable());
        assert!(ErrorKind::InferenceTimeout.is_recoverable());
        assert!(!ErrorKind::ModelUnavailable.is_recoverable());
        assert!(!ErrorKind::CategoryTableUnavailable.is_recoverable());
    }
}

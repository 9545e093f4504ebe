//! Shared data models for the Mantes Plus Propre detection API.
//!
//! This crate provides Serde-serializable types for:
//! - Bounding boxes (pixel coordinates, COCO convention)
//! - Raw and categorized detections
//! - Waste categories, severities and display languages
//! - Detection results and their request metadata
//! - Structured error bodies returned to the dashboard

pub mod bbox;
pub mod category;
pub mod detection;
pub mod error;
pub mod result;

// Re-export common types
pub use bbox::BoundingBox;
pub use category::{
    CategoryEntry, Language, LanguageParseError, Severity, SeverityParseError, UNKNOWN_CATEGORY,
};
pub use detection::{CategorizedDetection, RawDetection};
pub use error::{ErrorBody, ErrorKind};
pub use result::{CategoryCount, DetectionMetadata, DetectionResult, ImageInfo};

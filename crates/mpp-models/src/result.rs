//! Detection results returned for one uploaded image.

use std::collections::BTreeMap;

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

use crate::category::Language;
use crate::detection::CategorizedDetection;

/// Decoded image properties echoed back to the caller.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
pub struct ImageInfo {
    pub width: u32,
    pub height: u32,
    /// Sniffed image format (e.g. `jpeg`, `png`)
    pub format: String,
}

/// Request-level metadata.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct DetectionMetadata {
    pub model_version: String,
    pub category_table_version: String,
    /// Wall-clock processing time of the whole pipeline
    pub processing_time_ms: u64,
    /// Threshold actually applied to this request
    pub min_confidence: f32,
    pub language: Language,
    pub image: ImageInfo,
}

/// Number of detections per canonical category.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
pub struct CategoryCount {
    pub category: String,
    pub count: usize,
}

/// Ordered detections for one image plus request metadata.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct DetectionResult {
    pub detections: Vec<CategorizedDetection>,
    /// Per-category counts, most frequent first
    pub summary: Vec<CategoryCount>,
    pub metadata: DetectionMetadata,
}

impl DetectionResult {
    /// Build a result; the summary is derived from `detections`.
    pub fn new(detections: Vec<CategorizedDetection>, metadata: DetectionMetadata) -> Self {
        let summary = summarize(&detections);
        Self {
            detections,
            summary,
            metadata,
        }
    }

    pub fn len(&self) -> usize {
        self.detections.len()
    }

    pub fn is_empty(&self) -> bool {
        self.detections.is_empty()
    }

    /// Number of detections whose label had no category mapping.
    pub fn unknown_count(&self) -> usize {
        self.detections.iter().filter(|d| !d.known).count()
    }
}

fn summarize(detections: &[CategorizedDetection]) -> Vec<CategoryCount> {
    let mut counts: BTreeMap<&str, usize> = BTreeMap::new();
    for detection in detections {
        *counts.entry(detection.category.as_str()).or_default() += 1;
    }

    let mut summary: Vec<CategoryCount> = counts
        .into_iter()
        .map(|(category, count)| CategoryCount {
            category: category.to_string(),
            count,
        })
        .collect();
    // BTreeMap already yields categories alphabetically; stable sort keeps that for ties
    summary.sort_by(|a, b| b.count.cmp(&a.count));
    summary
}

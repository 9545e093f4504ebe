//! Detection types, before and after category resolution.

use std::cmp::Ordering;

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

use crate::bbox::BoundingBox;
use crate::category::{CategoryEntry, Language, Severity};

/// One object found by the model, labelled with the model's own vocabulary.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct RawDetection {
    pub bbox: BoundingBox,
    /// Raw label emitted by the model
    pub label: String,
    /// Class index in the model's output, when the backend exposes one
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub class_id: Option<u32>,
    /// Detection confidence [0, 1]
    pub confidence: f32,
}

impl RawDetection {
    pub fn new(label: impl Into<String>, confidence: f32, bbox: BoundingBox) -> Self {
        Self {
            bbox,
            label: label.into(),
            class_id: None,
            confidence,
        }
    }

    pub fn with_class_id(mut self, class_id: u32) -> Self {
        self.class_id = Some(class_id);
        self
    }

    /// Deterministic result ordering: descending confidence, then raw label,
    /// then box position (x, y, width, height).
    pub fn rank(&self, other: &Self) -> Ordering {
        other
            .confidence
            .total_cmp(&self.confidence)
            .then_with(|| self.label.cmp(&other.label))
            .then_with(|| self.bbox.x.total_cmp(&other.bbox.x))
            .then_with(|| self.bbox.y.total_cmp(&other.bbox.y))
            .then_with(|| self.bbox.width.total_cmp(&other.bbox.width))
            .then_with(|| self.bbox.height.total_cmp(&other.bbox.height))
    }
}

/// A raw detection together with the waste category it resolved to.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct CategorizedDetection {
    pub bbox: BoundingBox,
    pub label: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub class_id: Option<u32>,
    pub confidence: f32,
    /// Canonical category identifier, `UNKNOWN` when unmapped
    pub category: String,
    pub category_name: String,
    /// Display name of the item
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub severity: Option<Severity>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub icon: Option<String>,
    /// False when the label had no mapping and `category` is the sentinel
    pub known: bool,
}

impl CategorizedDetection {
    /// Attach a resolved category to a raw detection.
    pub fn new(raw: RawDetection, entry: &CategoryEntry, language: Language) -> Self {
        Self {
            bbox: raw.bbox,
            class_id: raw.class_id,
            confidence: raw.confidence,
            category: entry.category.clone(),
            category_name: entry.category_display_name(language).to_string(),
            name: if entry.is_unknown() {
                raw.label.clone()
            } else {
                entry.display_name(language).to_string()
            },
            severity: entry.severity,
            icon: entry.icon.clone(),
            known: !entry.is_unknown(),
            label: raw.label,
        }
    }
}

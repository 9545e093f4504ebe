//! Raw label to waste category mapping.
//!
//! The table is loaded once at startup, either from a JSON file or from the
//! TACO taxonomy embedded in this crate, and never mutated afterwards.
//! Lookups normalize the raw label first so `"Plastic bottle"`,
//! `"plastic-bottle"` and `plastic_bottle` all hit the same row.

use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::path::Path;

use mpp_models::{CategoryEntry, Severity, UNKNOWN_CATEGORY};
use serde::Deserialize;
use tracing::info;

use crate::error::{VisionError, VisionResult};

/// Default category table: the 60 TACO litter classes grouped into the
/// canonical categories shown on the dashboard.
pub const EMBEDDED_CATEGORY_TABLE: &str = include_str!("../data/taco_categories.json");

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct CategoryTableFile {
    version: String,
    categories: BTreeMap<String, CategoryGroup>,
    labels: Vec<LabelRow>,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct CategoryGroup {
    name: String,
    #[serde(default)]
    name_fr: Option<String>,
    #[serde(default)]
    severity: Option<Severity>,
    #[serde(default)]
    icon: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct LabelRow {
    label: String,
    category: String,
    name: String,
    #[serde(default)]
    name_fr: Option<String>,
    #[serde(default)]
    severity: Option<Severity>,
    #[serde(default)]
    icon: Option<String>,
}

/// Normalize a raw label into a table key.
///
/// Lowercases, collapses every run of non-alphanumeric characters into a
/// single `_` and strips leading/trailing separators.
pub fn normalize_label(raw: &str) -> String {
    let mut key = String::with_capacity(raw.len());
    let mut pending_separator = false;

    for c in raw.chars() {
        if c.is_alphanumeric() {
            if pending_separator && !key.is_empty() {
                key.push('_');
            }
            pending_separator = false;
            key.extend(c.to_lowercase());
        } else {
            pending_separator = true;
        }
    }

    key
}

/// Immutable raw label -> category table.
#[derive(Debug, Clone)]
pub struct CategoryMapper {
    version: String,
    entries: HashMap<String, CategoryEntry>,
    unknown: CategoryEntry,
}

impl CategoryMapper {
    /// Load from a JSON file, or the embedded table when `path` is `None`.
    pub fn load(path: Option<&Path>) -> VisionResult<Self> {
        match path {
            Some(path) => Self::from_path(path),
            None => Self::embedded(),
        }
    }

    /// Load the table shipped with the crate.
    pub fn embedded() -> VisionResult<Self> {
        let mapper = Self::from_json_str(EMBEDDED_CATEGORY_TABLE)?;
        info!(
            version = %mapper.version,
            labels = mapper.len(),
            "Loaded embedded category table"
        );
        Ok(mapper)
    }

    /// Load a table from a JSON file.
    pub fn from_path(path: &Path) -> VisionResult<Self> {
        let contents = std::fs::read_to_string(path).map_err(|e| {
            VisionError::category_table(format!("Failed to read {}: {}", path.display(), e))
        })?;
        let mapper = Self::from_json_str(&contents)?;
        info!(
            path = %path.display(),
            version = %mapper.version,
            labels = mapper.len(),
            "Loaded category table"
        );
        Ok(mapper)
    }

    /// Parse and validate a table.
    pub fn from_json_str(json: &str) -> VisionResult<Self> {
        let file: CategoryTableFile = serde_json::from_str(json)
            .map_err(|e| VisionError::category_table(format!("Malformed category table: {}", e)))?;

        if file.version.trim().is_empty() {
            return Err(VisionError::category_table("Category table has no version"));
        }
        if file.labels.is_empty() {
            return Err(VisionError::category_table("Category table has no labels"));
        }

        for (id, group) in &file.categories {
            if id.trim().is_empty() {
                return Err(VisionError::category_table("Empty category identifier"));
            }
            if id == UNKNOWN_CATEGORY {
                return Err(VisionError::category_table(format!(
                    "Category identifier {} is reserved",
                    UNKNOWN_CATEGORY
                )));
            }
            if group.name.trim().is_empty() {
                return Err(VisionError::category_table(format!(
                    "Category {} has an empty name",
                    id
                )));
            }
        }

        let mut entries = HashMap::with_capacity(file.labels.len());
        for row in file.labels {
            let key = normalize_label(&row.label);
            if key.is_empty() {
                return Err(VisionError::category_table(format!(
                    "Label {:?} is empty after normalization",
                    row.label
                )));
            }
            if row.name.trim().is_empty() {
                return Err(VisionError::category_table(format!(
                    "Label {} has an empty name",
                    key
                )));
            }

            let group = file.categories.get(&row.category).ok_or_else(|| {
                VisionError::category_table(format!(
                    "Label {} refers to undefined category {}",
                    key, row.category
                ))
            })?;

            let entry = CategoryEntry {
                label: key.clone(),
                category: row.category,
                category_name: group.name.clone(),
                category_name_fr: group.name_fr.clone(),
                name: row.name,
                name_fr: row.name_fr,
                severity: row.severity.or(group.severity),
                icon: row.icon.or_else(|| group.icon.clone()),
            };

            if entries.insert(key.clone(), entry).is_some() {
                return Err(VisionError::category_table(format!(
                    "Duplicate label {}",
                    key
                )));
            }
        }

        Ok(Self {
            version: file.version,
            entries,
            unknown: CategoryEntry::unknown(),
        })
    }

    /// Resolve a raw label, falling back to the "unknown" sentinel.
    pub fn resolve(&self, raw_label: &str) -> &CategoryEntry {
        self.lookup(raw_label).unwrap_or(&self.unknown)
    }

    /// Resolve a raw label, `None` when it is not in the table.
    pub fn lookup(&self, raw_label: &str) -> Option<&CategoryEntry> {
        self.entries.get(&normalize_label(raw_label))
    }

    /// All entries sorted by label.
    pub fn entries(&self) -> Vec<&CategoryEntry> {
        let mut entries: Vec<_> = self.entries.values().collect();
        entries.sort_by(|a, b| a.label.cmp(&b.label));
        entries
    }

    /// Distinct canonical category identifiers, sorted.
    pub fn categories(&self) -> Vec<&str> {
        self.entries
            .values()
            .map(|e| e.category.as_str())
            .collect::<BTreeSet<_>>()
            .into_iter()
            .collect()
    }

    pub fn version(&self) -> &str {
        &self.version
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    const SMALL_TABLE: &str = r#"{
        "version": "test-1",
        "categories": {
            "PLASTIC": { "name": "Plastic", "name_fr": "Plastique", "severity": "high", "icon": "plastic" },
            "METAL": { "name": "Metal" }
        },
        "labels": [
            { "label": "plastic_bottle", "category": "PLASTIC", "name": "Plastic bottle" },
            { "label": "Drink can", "category": "METAL", "name": "Drink can", "severity": "low" }
        ]
    }"#;

    #[test]
    fn test_normalize_label() {
        assert_eq!(normalize_label("Plastic bottle"), "plastic_bottle");
        assert_eq!(normalize_label("  Rope & strings "), "rope_strings");
        assert_eq!(normalize_label("Single-use carrier bag"), "single_use_carrier_bag");
        assert_eq!(normalize_label("plastic_bottle"), "plastic_bottle");
        assert_eq!(normalize_label("__"), "");
        assert_eq!(normalize_label("Verre brisé"), "verre_brisé");
    }

    #[test]
    fn test_resolve_known_label() {
        let mapper = CategoryMapper::from_json_str(SMALL_TABLE).unwrap();
        let entry = mapper.resolve("plastic_bottle");
        assert_eq!(entry.label, "plastic_bottle");
        assert_eq!(entry.category, "PLASTIC");
        assert_eq!(entry.category_name_fr.as_deref(), Some("Plastique"));
        // Inherited from the category group
        assert_eq!(entry.severity, Some(Severity::High));
        assert_eq!(entry.icon.as_deref(), Some("plastic"));
    }

    #[test]
    fn test_resolve_normalizes_input() {
        let mapper = CategoryMapper::from_json_str(SMALL_TABLE).unwrap();
        assert_eq!(mapper.resolve("Plastic Bottle").category, "PLASTIC");
        assert_eq!(mapper.resolve("drink-can").category, "METAL");
        // Row-level severity overrides the group
        assert_eq!(mapper.resolve("drink_can").severity, Some(Severity::Low));
    }

    #[test]
    fn test_unknown_label_returns_sentinel() {
        let mapper = CategoryMapper::from_json_str(SMALL_TABLE).unwrap();
        for label in ["mystery_object", "", "   ", "🦆"] {
            let entry = mapper.resolve(label);
            assert!(entry.is_unknown());
            assert_eq!(entry.category, UNKNOWN_CATEGORY);
        }
        assert!(mapper.lookup("mystery_object").is_none());
    }

    #[test]
    fn test_every_table_label_resolves_to_itself() {
        let mapper = CategoryMapper::embedded().unwrap();
        for entry in mapper.entries() {
            let resolved = mapper.resolve(&entry.label);
            assert_eq!(resolved.label, entry.label);
            assert!(!resolved.name.is_empty());
            assert!(!resolved.category_name.is_empty());
            assert!(!resolved.is_unknown());
        }
    }

    #[test]
    fn test_embedded_table() {
        let mapper = CategoryMapper::embedded().unwrap();
        assert_eq!(mapper.len(), 61);
        assert_eq!(mapper.resolve("plastic_bottle").category, "PLASTIC");
        assert_eq!(mapper.resolve("Cigarette").category, "CIGARETTE");
        assert_eq!(mapper.resolve("Rope & strings").category, "OTHER");
        assert!(mapper.categories().contains(&"GLASS"));
        assert!(!mapper.categories().contains(&UNKNOWN_CATEGORY));
    }

    #[test]
    fn test_embedded_table_covers_model_labels() {
        let labels = include_str!("../../../models/detection/labels.txt");
        let mapper = CategoryMapper::embedded().unwrap();
        for label in labels.lines().filter(|l| !l.trim().is_empty()) {
            assert!(mapper.lookup(label).is_some(), "unmapped label {}", label);
        }
    }

    #[test]
    fn test_rejects_duplicate_labels_after_normalization() {
        let json = r#"{
            "version": "dup",
            "categories": { "PLASTIC": { "name": "Plastic" } },
            "labels": [
                { "label": "plastic_bottle", "category": "PLASTIC", "name": "A" },
                { "label": "Plastic Bottle", "category": "PLASTIC", "name": "B" }
            ]
        }"#;
        let err = CategoryMapper::from_json_str(json).unwrap_err();
        assert!(matches!(err, VisionError::CategoryTableUnavailable(_)));
        assert!(err.to_string().contains("Duplicate"));
    }

    #[test]
    fn test_rejects_undefined_category() {
        let json = r#"{
            "version": "x",
            "categories": { "PLASTIC": { "name": "Plastic" } },
            "labels": [ { "label": "can", "category": "METAL", "name": "Can" } ]
        }"#;
        assert!(CategoryMapper::from_json_str(json).is_err());
    }

    #[test]
    fn test_rejects_empty_names_and_tables() {
        let empty_group_name = r#"{
            "version": "x",
            "categories": { "PLASTIC": { "name": " " } },
            "labels": [ { "label": "bottle", "category": "PLASTIC", "name": "Bottle" } ]
        }"#;
        assert!(CategoryMapper::from_json_str(empty_group_name).is_err());

        let empty_label_name = r#"{
            "version": "x",
            "categories": { "PLASTIC": { "name": "Plastic" } },
            "labels": [ { "label": "bottle", "category": "PLASTIC", "name": "" } ]
        }"#;
        assert!(CategoryMapper::from_json_str(empty_label_name).is_err());

        let no_labels = r#"{ "version": "x", "categories": {}, "labels": [] }"#;
        assert!(CategoryMapper::from_json_str(no_labels).is_err());

        let reserved = r#"{
            "version": "x",
            "categories": { "UNKNOWN": { "name": "Unknown" } },
            "labels": [ { "label": "thing", "category": "UNKNOWN", "name": "Thing" } ]
        }"#;
        assert!(CategoryMapper::from_json_str(reserved).is_err());
    }

    #[test]
    fn test_rejects_malformed_json() {
        let err = CategoryMapper::from_json_str("{ not json").unwrap_err();
        assert!(matches!(err, VisionError::CategoryTableUnavailable(_)));

        let unknown_field = r#"{ "version": "x", "categories": {}, "labels": [], "extra": 1 }"#;
        assert!(CategoryMapper::from_json_str(unknown_field).is_err());
    }

    #[test]
    fn test_load_from_path() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(SMALL_TABLE.as_bytes()).unwrap();

        let mapper = CategoryMapper::load(Some(file.path())).unwrap();
        assert_eq!(mapper.version(), "test-1");
        assert_eq!(mapper.len(), 2);

        let missing = CategoryMapper::load(Some(Path::new("/nonexistent/table.json")));
        assert!(matches!(
            missing.unwrap_err(),
            VisionError::CategoryTableUnavailable(_)
        ));
    }
}

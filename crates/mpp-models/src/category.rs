//! Waste category taxonomy types.
//!
//! A `CategoryEntry` describes what one raw model label means for the
//! dashboard: the canonical waste category it belongs to (e.g. `PLASTIC`),
//! display names in English and French, and optional severity/icon hints.

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

/// Canonical identifier reported when a raw label has no mapping.
pub const UNKNOWN_CATEGORY: &str = "UNKNOWN";

/// How urgently a category of litter should be picked up.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "snake_case")]
pub enum Severity {
    Low,
    Medium,
    High,
}

impl Severity {
    pub fn as_str(&self) -> &'static str {
        match self {
            Severity::Low => "low",
            Severity::Medium => "medium",
            Severity::High => "high",
        }
    }
}

impl fmt::Display for Severity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl FromStr for Severity {
    type Err = SeverityParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "low" => Ok(Severity::Low),
            "medium" => Ok(Severity::Medium),
            "high" => Ok(Severity::High),
            _ => Err(SeverityParseError(s.to_string())),
        }
    }
}

#[derive(Debug, Error)]
#[error("Unknown severity: {0}")]
pub struct SeverityParseError(String);

/// Language used for the display names in a response.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, JsonSchema, Default)]
#[serde(rename_all = "snake_case")]
pub enum Language {
    #[default]
    En,
    Fr,
}

impl Language {
    pub fn as_str(&self) -> &'static str {
        match self {
            Language::En => "en",
            Language::Fr => "fr",
        }
    }
}

impl fmt::Display for Language {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl FromStr for Language {
    type Err = LanguageParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "en" | "english" => Ok(Language::En),
            "fr" | "french" | "francais" | "français" => Ok(Language::Fr),
            _ => Err(LanguageParseError(s.to_string())),
        }
    }
}

#[derive(Debug, Error)]
#[error("Unsupported language: {0}")]
pub struct LanguageParseError(String);

/// One row of the category table, keyed by normalized raw label.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct CategoryEntry {
    /// Normalized raw label this entry is keyed by
    pub label: String,
    /// Canonical category identifier (e.g. `PLASTIC`)
    pub category: String,
    /// Display name of the canonical category
    pub category_name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub category_name_fr: Option<String>,
    /// Display name of the item itself (e.g. "Plastic bottle")
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name_fr: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub severity: Option<Severity>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub icon: Option<String>,
}

impl CategoryEntry {
    /// The sentinel entry returned for labels missing from the table.
    pub fn unknown() -> Self {
        Self {
            label: "unknown".to_string(),
            category: UNKNOWN_CATEGORY.to_string(),
            category_name: "Unknown".to_string(),
            category_name_fr: Some("Inconnu".to_string()),
            name: "Unknown object".to_string(),
            name_fr: Some("Objet inconnu".to_string()),
            severity: None,
            icon: None,
        }
    }

    /// Whether this is the "unknown category" sentinel.
    pub fn is_unknown(&self) -> bool {
        self.category == UNKNOWN_CATEGORY
    }

    /// Item name in the requested language, falling back to English.
    pub fn display_name(&self, language: Language) -> &str {
        match language {
            Language::Fr => self.name_fr.as_deref().unwrap_or(&self.name),
            Language::En => &self.name,
        }
    }

    /// Category name in the requested language, falling back to English.
    pub fn category_display_name(&self, language: Language) -> &str {
        match language {
            Language::Fr => self
                .category_name_fr
                .as_deref()
                .unwrap_or(&self.category_name),
            Language::En => &self.category_name,
        }
    }
}

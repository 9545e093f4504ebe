//! Category table handler.

use std::collections::BTreeMap;

use axum::extract::{Query, State};
use axum::Json;
use mpp_models::{CategoryEntry, Language};
use serde::{Deserialize, Serialize};

use crate::error::{ApiError, ApiResult};
use crate::state::AppState;

#[derive(Debug, Default, Deserialize)]
pub struct CategoriesQuery {
    pub lang: Option<String>,
}

/// One canonical category with the number of raw labels mapped to it.
#[derive(Debug, Serialize, Deserialize)]
pub struct CategorySummary {
    pub id: String,
    pub name: String,
    pub labels: usize,
}

/// The loaded category table, for dashboard legends.
#[derive(Debug, Serialize, Deserialize)]
pub struct CategoriesResponse {
    pub version: String,
    pub language: Language,
    pub categories: Vec<CategorySummary>,
    pub entries: Vec<CategoryEntry>,
}

/// List the canonical categories and every label mapping.
pub async fn list_categories(
    State(state): State<AppState>,
    Query(query): Query<CategoriesQuery>,
) -> ApiResult<Json<CategoriesResponse>> {
    let language = match query.lang.as_deref() {
        None | Some("") => Language::default(),
        Some(lang) => lang
            .parse()
            .map_err(|e: mpp_models::LanguageParseError| ApiError::Validation(e.to_string()))?,
    };

    let mapper = state.pipeline.mapper();
    let entries: Vec<CategoryEntry> = mapper.entries().into_iter().cloned().collect();

    let mut categories: BTreeMap<&str, CategorySummary> = BTreeMap::new();
    for entry in &entries {
        categories
            .entry(entry.category.as_str())
            .or_insert_with(|| CategorySummary {
                id: entry.category.clone(),
                name: entry.category_display_name(language).to_string(),
                labels: 0,
            })
            .labels += 1;
    }
    let categories = categories.into_values().collect();

    Ok(Json(CategoriesResponse {
        version: mapper.version().to_string(),
        language,
        categories,
        entries,
    }))
}

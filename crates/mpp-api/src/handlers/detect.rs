//! Image upload and detection handler.

use axum::body::Bytes;
use axum::extract::rejection::QueryRejection;
use axum::extract::{FromRequest, Multipart, Query, Request, State};
use axum::http::{header, StatusCode};
use axum::Json;
use mpp_models::{DetectionResult, Language};
use mpp_vision::{DetectOptions, Image};
use serde::Deserialize;
use tracing::{info, info_span, Instrument};
use validator::Validate;

use crate::error::{ApiError, ApiResult};
use crate::middleware::RequestId;
use crate::state::AppState;

/// Multipart part names accepted for the image.
const IMAGE_FIELDS: &[&str] = &["image", "file"];

/// Detection options passed as query parameters or multipart text fields.
#[derive(Debug, Default, Clone, Deserialize, Validate)]
pub struct DetectParams {
    #[validate(range(min = 0.0, max = 1.0))]
    pub min_confidence: Option<f32>,
    #[serde(alias = "language")]
    pub lang: Option<String>,
    #[validate(range(min = 1))]
    pub max_detections: Option<usize>,
}

impl DetectParams {
    /// Fields set in `other` win.
    fn merge(self, other: DetectParams) -> Self {
        Self {
            min_confidence: other.min_confidence.or(self.min_confidence),
            lang: other.lang.or(self.lang),
            max_detections: other.max_detections.or(self.max_detections),
        }
    }

    fn into_options(self) -> ApiResult<DetectOptions> {
        self.validate()
            .map_err(|e| ApiError::Validation(e.to_string()))?;

        let language = match self.lang.as_deref().map(str::trim) {
            None | Some("") => Language::default(),
            Some(lang) => lang
                .parse()
                .map_err(|e: mpp_models::LanguageParseError| ApiError::Validation(e.to_string()))?,
        };

        Ok(DetectOptions {
            min_confidence: self.min_confidence,
            language,
            max_detections: self.max_detections,
        })
    }
}

/// Detect waste objects in an uploaded image.
///
/// Accepts either `multipart/form-data` (image in an `image` or `file`
/// part, options as text parts) or a raw image body.
pub async fn detect(
    State(state): State<AppState>,
    query: Result<Query<DetectParams>, QueryRejection>,
    request: Request,
) -> ApiResult<Json<DetectionResult>> {
    let Query(query) = query.map_err(|e| ApiError::Validation(e.body_text()))?;

    let request_id = request
        .extensions()
        .get::<RequestId>()
        .map(|id| id.0.clone())
        .unwrap_or_default();
    let span = info_span!("detect", request_id = %request_id);

    async move {
        let (image, params) = read_upload(&state, request).await?;
        let options = query.merge(params).into_options()?;

        let result = state.pipeline.process(image, options).await?;

        info!(
            model_version = %result.metadata.model_version,
            detections = result.len(),
            unknown = result.unknown_count(),
            elapsed_ms = result.metadata.processing_time_ms,
            "Detection served"
        );

        Ok::<_, ApiError>(Json(result))
    }
    .instrument(span)
    .await
}

/// Pull the image and any form options out of the request body.
async fn read_upload(state: &AppState, request: Request) -> ApiResult<(Image, DetectParams)> {
    let content_type = request
        .headers()
        .get(header::CONTENT_TYPE)
        .and_then(|v| v.to_str().ok())
        .map(str::to_string);

    let is_multipart = content_type
        .as_deref()
        .map(|ct| ct.to_lowercase().starts_with("multipart/form-data"))
        .unwrap_or(false);

    if is_multipart {
        let multipart = Multipart::from_request(request, state)
            .await
            .map_err(|e| ApiError::bad_request(e.body_text()))?;
        return read_multipart(multipart, state.config.max_body_size).await;
    }

    let body = Bytes::from_request(request, state).await.map_err(|e| {
        if e.status() == StatusCode::PAYLOAD_TOO_LARGE {
            ApiError::PayloadTooLarge(state.config.max_body_size)
        } else {
            ApiError::bad_request(e.body_text())
        }
    })?;

    if body.is_empty() {
        return Err(ApiError::bad_request("No image provided"));
    }

    Ok((Image::new(body.to_vec(), content_type), DetectParams::default()))
}

async fn read_multipart(
    mut multipart: Multipart,
    body_limit: usize,
) -> ApiResult<(Image, DetectParams)> {
    let mut image = None;
    let mut params = DetectParams::default();

    while let Some(field) = multipart.next_field().await.map_err(|e| multipart_error(e, body_limit))? {
        let name = field.name().unwrap_or_default().to_string();

        if IMAGE_FIELDS.contains(&name.as_str()) {
            if image.is_some() {
                return Err(ApiError::bad_request("Only one image per request is supported"));
            }
            let content_type = field.content_type().map(str::to_string);
            let bytes = field.bytes().await.map_err(|e| multipart_error(e, body_limit))?;
            image = Some(Image::new(bytes.to_vec(), content_type));
            continue;
        }

        let value = field.text().await.map_err(|e| multipart_error(e, body_limit))?;
        let value = value.trim();
        match name.as_str() {
            "min_confidence" => {
                params.min_confidence = Some(value.parse().map_err(|_| {
                    ApiError::Validation(format!("min_confidence is not a number: {}", value))
                })?)
            }
            "max_detections" => {
                params.max_detections = Some(value.parse().map_err(|_| {
                    ApiError::Validation(format!("max_detections is not an integer: {}", value))
                })?)
            }
            "lang" | "language" => params.lang = Some(value.to_string()),
            // Unknown parts are ignored
            _ => {}
        }
    }

    let image = image.ok_or_else(|| {
        ApiError::bad_request("Missing image part (expected `image` or `file`)")
    })?;
    Ok((image, params))
}

fn multipart_error(error: axum::extract::multipart::MultipartError, body_limit: usize) -> ApiError {
    if error.status() == StatusCode::PAYLOAD_TOO_LARGE {
        ApiError::PayloadTooLarge(body_limit)
    } else {
        ApiError::bad_request(error.body_text())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_merge_prefers_form_fields() {
        let query = DetectParams {
            min_confidence: Some(0.3),
            lang: Some("en".to_string()),
            max_detections: None,
        };
        let form = DetectParams {
            min_confidence: Some(0.6),
            lang: None,
            max_detections: Some(5),
        };

        let merged = query.merge(form);
        assert_eq!(merged.min_confidence, Some(0.6));
        assert_eq!(merged.lang.as_deref(), Some("en"));
        assert_eq!(merged.max_detections, Some(5));
    }

    #[test]
    fn test_into_options() {
        let options = DetectParams {
            min_confidence: Some(0.4),
            lang: Some("fr".to_string()),
            max_detections: Some(3),
        }
        .into_options()
        .unwrap();
        assert_eq!(options.language, Language::Fr);
        assert_eq!(options.min_confidence, Some(0.4));
        assert_eq!(options.max_detections, Some(3));

        let defaults = DetectParams::default().into_options().unwrap();
        assert_eq!(defaults, DetectOptions::default());
    }

    #[test]
    fn test_into_options_rejects_bad_values() {
        let bad = [
            DetectParams {
                min_confidence: Some(1.5),
                ..DetectParams::default()
            },
            DetectParams {
                max_detections: Some(0),
                ..DetectParams::default()
            },
            DetectParams {
                lang: Some("de".to_string()),
                ..DetectParams::default()
            },
        ];
        for params in bad {
            assert!(matches!(params.into_options(), Err(ApiError::Validation(_))));
        }
    }
}

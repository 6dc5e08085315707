//! API route handlers
//!
//! Routes are organized by functionality:
//!
//! - `health`: Health checks, readiness, and metrics
//! - `auth`: Registration and login
//! - `images`: Owner-scoped image upload, listing, retrieval, deletion, transform
//! - `compress`: Anonymous batch transform of uploaded files

pub mod auth;
pub mod compress;
pub mod health;
pub mod images;

use crate::error::{ServerError, ServerResult};
use axum::extract::multipart::{Multipart, MultipartError};
use axum::http::{StatusCode, Uri};
use axum::response::IntoResponse;
use axum::Json;
use serde::{Deserialize, Serialize};
use serde_json::json;
use transform::{RawTransformRequest, UploadedImage};

/// Success envelope shared by every JSON endpoint.
#[derive(Debug, Serialize, Deserialize)]
pub struct ApiResponse<T> {
    pub success: bool,
    pub message: String,
    pub data: T,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub meta: Option<PageMeta>,
}

impl<T> ApiResponse<T> {
    pub fn ok(message: impl Into<String>, data: T) -> Self {
        Self {
            success: true,
            message: message.into(),
            data,
            meta: None,
        }
    }

    pub fn with_meta(mut self, meta: PageMeta) -> Self {
        self.meta = Some(meta);
        self
    }
}

/// Pagination block for listings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PageMeta {
    pub total: u64,
    pub current_page: u64,
    pub per_page: u64,
    pub total_pages: u64,
    pub has_next_page: bool,
    pub has_previous_page: bool,
}

impl PageMeta {
    pub fn new(total: u64, page: u64, per_page: u64) -> Self {
        let pages = total.div_ceil(per_page.max(1));
        Self {
            total,
            current_page: page,
            per_page,
            total_pages: pages.max(1),
            has_next_page: page < pages,
            has_previous_page: page > 1,
        }
    }
}

/// API version and base info
///
/// Returns server information including version and available endpoints.
/// This is the root endpoint (GET /) and requires no authentication.
pub async fn api_info() -> ServerResult<impl IntoResponse> {
    Ok(Json(json!({
        "name": "imgshift",
        "version": env!("CARGO_PKG_VERSION"),
        "api_version": "v1",
        "endpoints": [
            "/api/v1/auth/register",
            "/api/v1/auth/login",
            "/api/v1/images",
            "/api/v1/images/{id}",
            "/api/v1/images/{id}/transform",
            "/api/v1/compress",
            "/api/v1/health-check",
            "/ready",
            "/metrics"
        ]
    })))
}

/// 404 Not Found handler
pub async fn not_found(uri: Uri) -> ServerError {
    ServerError::NotFound(format!("Route {uri} not found"))
}

/// Files and transform fields read from one multipart body.
#[derive(Debug, Default)]
pub struct MultipartForm {
    pub images: Vec<UploadedImage>,
    pub fields: RawTransformRequest,
}

fn multipart_error(err: MultipartError, max_body_mb: usize) -> ServerError {
    if err.status() == StatusCode::PAYLOAD_TOO_LARGE {
        ServerError::PayloadTooLarge(max_body_mb)
    } else {
        ServerError::BadRequest(err.body_text())
    }
}

/// Collect `image` file parts and transform parameters.
///
/// `image` parts without a filename are not files and are skipped, as are
/// unrecognized text fields.
pub async fn read_multipart(
    mut multipart: Multipart,
    max_body_mb: usize,
) -> ServerResult<MultipartForm> {
    let mut form = MultipartForm::default();
    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|e| multipart_error(e, max_body_mb))?
    {
        let Some(name) = field.name().map(str::to_owned) else {
            continue;
        };

        if name == "image" {
            let Some(file_name) = field.file_name().map(str::to_owned) else {
                continue;
            };
            let content_type = field.content_type().map(str::to_owned);
            let data = field
                .bytes()
                .await
                .map_err(|e| multipart_error(e, max_body_mb))?;
            form.images.push(UploadedImage {
                file_name: Some(file_name),
                content_type,
                data: data.to_vec(),
            });
        } else {
            let value = field
                .text()
                .await
                .map_err(|e| multipart_error(e, max_body_mb))?;
            if !form.fields.set_form_field(&name, value) {
                tracing::debug!(field = %name, "ignoring unknown form field");
            }
        }
    }
    Ok(form)
}

use crate::error::ServerResult;
use crate::routes::{read_multipart, ApiResponse};
use crate::state::ServerState;
use axum::extract::{Multipart, State};
use axum::http::StatusCode;
use axum::response::IntoResponse;
use axum::Json;
use std::sync::Arc;
use transform::{validate, validate_uploads, ValidationErrors};

/// `POST /api/v1/compress`
///
/// Multipart body: one or more `image` files plus the transform fields
/// (`format`, `quality`, `lossless`, `resize_width`, `resize_height`,
/// `rotate`, `grayscale`). Every file gets the same transform; the first
/// failure fails the request.
pub async fn compress(
    State(state): State<Arc<ServerState>>,
    multipart: Multipart,
) -> ServerResult<impl IntoResponse> {
    let form = read_multipart(multipart, state.config.max_body_size_mb).await?;

    // Report request and attachment problems together.
    let mut errors = ValidationErrors::default();
    if let Err(e) = validate_uploads(&form.images) {
        errors.extend(e);
    }
    let request = match validate(&form.fields) {
        Ok(request) => Some(request),
        Err(e) => {
            errors.extend(e);
            None
        }
    };
    let request = match request {
        Some(request) if errors.is_empty() => request,
        _ => return Err(errors.into()),
    };

    let count = form.images.len();
    let results =
        imgshift::compress_batch_blocking(state.pipeline.clone(), request, form.images).await?;

    tracing::info!(count, "images compressed");
    Ok((
        StatusCode::CREATED,
        Json(ApiResponse::ok("Images compressed", results)),
    ))
}

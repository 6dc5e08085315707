//! Owner-scoped image resource endpoints. All require a bearer token.

use crate::auth::AuthUser;
use crate::error::{ServerError, ServerResult};
use crate::routes::{read_multipart, ApiResponse, PageMeta};
use crate::state::ServerState;
use axum::extract::rejection::JsonRejection;
use axum::extract::{Multipart, Path, Query, State};
use axum::http::StatusCode;
use axum::response::IntoResponse;
use axum::{Extension, Json};
use imgshift::{find_owned_image, transform_stored_image};
use serde::Deserialize;
use std::sync::Arc;
use store::NewImage;
use transform::{validate, validate_uploads, RawTransformRequest, TransformBody, ValidationErrors};

pub const DEFAULT_PAGE_LIMIT: u64 = 10;
pub const MIN_PAGE_LIMIT: u64 = 5;
pub const MAX_PAGE_LIMIT: u64 = 100;

/// Content type recorded when an upload does not declare one.
const FALLBACK_CONTENT_TYPE: &str = "application/octet-stream";

/// Raw listing query; both values arrive as strings.
#[derive(Debug, Default, Deserialize)]
pub struct ListQuery {
    pub limit: Option<String>,
    pub page: Option<String>,
}

impl ListQuery {
    /// Resolve `(page, limit)`.
    ///
    /// An invalid `limit` is rejected; an invalid `page` falls back to 1.
    pub fn resolve(&self) -> Result<(u64, u64), ValidationErrors> {
        let limit = match self.limit.as_deref().map(str::trim) {
            None | Some("") => DEFAULT_PAGE_LIMIT,
            Some(raw) => {
                let limit: u64 = raw
                    .parse()
                    .map_err(|_| ValidationErrors::single("limit", "Limit must be a whole number"))?;
                if limit < MIN_PAGE_LIMIT {
                    return Err(ValidationErrors::single(
                        "limit",
                        "Limit must be greater than or equal to 5",
                    ));
                }
                if limit > MAX_PAGE_LIMIT {
                    return Err(ValidationErrors::single(
                        "limit",
                        "Limit must be less than or equal to 100",
                    ));
                }
                limit
            }
        };

        let page = self
            .page
            .as_deref()
            .and_then(|raw| raw.trim().parse::<u64>().ok())
            .filter(|&page| page >= 1)
            .unwrap_or(1);

        Ok((page, limit))
    }
}

fn parse_image_id(id: &str) -> ServerResult<String> {
    uuid::Uuid::parse_str(id)
        .map(|uuid| uuid.to_string())
        .map_err(|_| ValidationErrors::single("id", "Invalid image ID").into())
}

/// `POST /api/v1/images`
pub async fn upload_images(
    State(state): State<Arc<ServerState>>,
    Extension(caller): Extension<AuthUser>,
    multipart: Multipart,
) -> ServerResult<impl IntoResponse> {
    let form = read_multipart(multipart, state.config.max_body_size_mb).await?;
    validate_uploads(&form.images)?;

    let mut created = Vec::with_capacity(form.images.len());
    for upload in form.images {
        let original_name = upload.display_name().to_string();
        let format = upload
            .content_type
            .unwrap_or_else(|| FALLBACK_CONTENT_TYPE.to_string());
        let record = state
            .images
            .create(NewImage {
                user: caller.id.clone(),
                size: upload.data.len() as u64,
                image: upload.data,
                format,
                original_name,
            })
            .await?;
        created.push(record);
    }

    tracing::info!(user_id = %caller.id, count = created.len(), "images uploaded");
    Ok((
        StatusCode::CREATED,
        Json(ApiResponse::ok("Images created", created)),
    ))
}

/// `GET /api/v1/images?limit&page`
pub async fn list_images(
    State(state): State<Arc<ServerState>>,
    Extension(caller): Extension<AuthUser>,
    Query(query): Query<ListQuery>,
) -> ServerResult<impl IntoResponse> {
    let (page, limit) = query.resolve()?;
    let skip = (page - 1).saturating_mul(limit);

    let images = state.images.list_by_owner(&caller.id, limit, skip).await?;
    let total = state.images.count_by_owner(&caller.id).await?;

    Ok(Json(
        ApiResponse::ok("Images found", images).with_meta(PageMeta::new(total, page, limit)),
    ))
}

/// `GET /api/v1/images/{id}`
pub async fn get_image(
    State(state): State<Arc<ServerState>>,
    Extension(caller): Extension<AuthUser>,
    Path(id): Path<String>,
) -> ServerResult<impl IntoResponse> {
    let id = parse_image_id(&id)?;
    let image = find_owned_image(state.images.as_ref(), &id, &caller.id).await?;
    Ok(Json(ApiResponse::ok("Image found", image)))
}

/// `DELETE /api/v1/images/{id}`
pub async fn delete_image(
    State(state): State<Arc<ServerState>>,
    Extension(caller): Extension<AuthUser>,
    Path(id): Path<String>,
) -> ServerResult<impl IntoResponse> {
    let id = parse_image_id(&id)?;
    find_owned_image(state.images.as_ref(), &id, &caller.id).await?;
    if !state.images.delete_by_id(&id).await? {
        return Err(ServerError::NotFound("Image not found".to_string()));
    }

    tracing::info!(user_id = %caller.id, image_id = %id, "image deleted");
    Ok(Json(ApiResponse::ok("Image deleted", ())))
}

/// `POST /api/v1/images/{id}/transform`
pub async fn transform_image(
    State(state): State<Arc<ServerState>>,
    Extension(caller): Extension<AuthUser>,
    Path(id): Path<String>,
    body: Result<Json<TransformBody>, JsonRejection>,
) -> ServerResult<impl IntoResponse> {
    let id = parse_image_id(&id)?;
    let Json(body) = body.map_err(|e| ServerError::BadRequest(e.body_text()))?;
    let request = validate(&RawTransformRequest::from(body))?;

    let result = transform_stored_image(
        state.images.as_ref(),
        &state.pipeline,
        &caller.id,
        &id,
        &request,
    )
    .await?;

    Ok(Json(ApiResponse::ok("Image transformed", result)))
}

//! Workspace umbrella crate for the imgshift image service.
//!
//! This crate stitches the transform pipeline and the image store together
//! so callers get the two service-level operations behind one API:
//!
//! - [`compress_batch`] runs one validated request over many uploads,
//!   strictly in order, failing fast.
//! - [`transform_stored_image`] runs one request over a stored image after
//!   an owner check.

pub use store::{
    ImageStore, InMemoryImageStore, InMemoryUserStore, NewImage, NewUser, StoreConfig,
    StoreError, StoredImage, Stores, User, UserStore,
};
pub use transform::{
    Codec, CodecError, DEFAULT_QUALITY, EncodeOptions, FieldError, ImageCodec, ImageFormat,
    ImageMetadata, MAX_PIXELS, MAX_RESIZE_DIMENSION, Pipeline, RawTransformRequest, Resize,
    ResizeBody, TransformBody, TransformError, TransformRequest, TransformResult, UploadedImage,
    ValidationErrors, validate, validate_uploads,
};

use std::error::Error;
use std::fmt;
use std::sync::{Arc, OnceLock, RwLock};
use std::time::{Duration, Instant};

/// Errors surfaced by the service-level operations.
#[derive(Debug)]
pub enum ServiceError {
    Validation(ValidationErrors),
    NotFound,
    /// The record exists but belongs to someone else.
    Forbidden,
    Transform(TransformError),
    Storage(StoreError),
}

impl fmt::Display for ServiceError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ServiceError::Validation(err) => write!(f, "validation failed: {err}"),
            ServiceError::NotFound => write!(f, "Image not found"),
            ServiceError::Forbidden => write!(f, "You are not authorized to access this image"),
            ServiceError::Transform(err) => write!(f, "{err}"),
            ServiceError::Storage(err) => write!(f, "storage failure: {err}"),
        }
    }
}

impl Error for ServiceError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            ServiceError::Validation(err) => Some(err),
            ServiceError::Transform(err) => Some(err),
            ServiceError::Storage(err) => Some(err),
            ServiceError::NotFound | ServiceError::Forbidden => None,
        }
    }
}

impl From<ValidationErrors> for ServiceError {
    fn from(value: ValidationErrors) -> Self {
        ServiceError::Validation(value)
    }
}

impl From<TransformError> for ServiceError {
    fn from(value: TransformError) -> Self {
        ServiceError::Transform(value)
    }
}

impl From<StoreError> for ServiceError {
    fn from(value: StoreError) -> Self {
        ServiceError::Storage(value)
    }
}

/// Metrics observer for pipeline runs.
pub trait TransformMetrics: Send + Sync {
    fn record_transform(&self, latency: Duration, result: Result<(), &TransformError>);
}

/// Install or clear the global transform metrics recorder.
pub fn set_transform_metrics(recorder: Option<Arc<dyn TransformMetrics>>) {
    let mut guard = metrics_lock()
        .write()
        .unwrap_or_else(|poisoned| poisoned.into_inner());
    *guard = recorder;
}

fn metrics_lock() -> &'static RwLock<Option<Arc<dyn TransformMetrics>>> {
    static METRICS: OnceLock<RwLock<Option<Arc<dyn TransformMetrics>>>> = OnceLock::new();
    METRICS.get_or_init(|| RwLock::new(None))
}

fn metrics_recorder() -> Option<Arc<dyn TransformMetrics>> {
    let guard = metrics_lock()
        .read()
        .unwrap_or_else(|poisoned| poisoned.into_inner());
    guard.clone()
}

fn run_observed(
    pipeline: &Pipeline,
    request: &TransformRequest,
    source: &[u8],
) -> Result<TransformResult, TransformError> {
    let recorder = metrics_recorder();
    let start = Instant::now();
    let result = pipeline.run(request, source);
    if let Some(recorder) = recorder {
        recorder.record_transform(start.elapsed(), result.as_ref().map(|_| ()));
    }
    result
}

/// Transform every upload with the same request, in input order.
///
/// Uploads are checked first (at least one, none empty). The first pipeline
/// failure aborts the batch and no partial results are returned.
pub fn compress_batch(
    pipeline: &Pipeline,
    request: &TransformRequest,
    images: &[UploadedImage],
) -> Result<Vec<TransformResult>, ServiceError> {
    validate_uploads(images)?;
    let results = images
        .iter()
        .enumerate()
        .map(|(position, upload)| {
            run_observed(pipeline, request, &upload.data).inspect_err(|err| {
                tracing::warn!(
                    position,
                    name = upload.display_name(),
                    cause = %err.cause(),
                    "batch aborted"
                );
            })
        })
        .collect::<Result<Vec<_>, _>>()?;
    tracing::debug!(count = results.len(), format = %request.format, "batch transformed");
    Ok(results)
}

/// Load `id` and check that `caller` owns it.
pub async fn find_owned_image(
    store: &dyn ImageStore,
    id: &str,
    caller: &str,
) -> Result<StoredImage, ServiceError> {
    let image = store.find_by_id(id).await?.ok_or(ServiceError::NotFound)?;
    if !image.is_owned_by(caller) {
        return Err(ServiceError::Forbidden);
    }
    Ok(image)
}

/// Transform a stored image on behalf of its owner.
///
/// The stored record is never modified. The pipeline runs on the blocking
/// thread pool.
pub async fn transform_stored_image(
    store: &dyn ImageStore,
    pipeline: &Pipeline,
    caller: &str,
    id: &str,
    request: &TransformRequest,
) -> Result<TransformResult, ServiceError> {
    let image = find_owned_image(store, id, caller).await?;
    let result = run_blocking(pipeline.clone(), request.clone(), image.image).await?;
    Ok(result)
}

/// Run one transform on the blocking thread pool.
pub async fn run_blocking(
    pipeline: Pipeline,
    request: TransformRequest,
    source: Vec<u8>,
) -> Result<TransformResult, TransformError> {
    tokio::task::spawn_blocking(move || run_observed(&pipeline, &request, &source))
        .await
        .unwrap_or_else(|join| {
            Err(CodecError::InvalidOperation(format!("transform task failed: {join}")).into())
        })
}

/// Run [`compress_batch`] on the blocking thread pool.
pub async fn compress_batch_blocking(
    pipeline: Pipeline,
    request: TransformRequest,
    images: Vec<UploadedImage>,
) -> Result<Vec<TransformResult>, ServiceError> {
    tokio::task::spawn_blocking(move || compress_batch(&pipeline, &request, &images))
        .await
        .unwrap_or_else(|join| {
            Err(ServiceError::Transform(
                CodecError::InvalidOperation(format!("transform task failed: {join}")).into(),
            ))
        })
}

//! Image transform request layer.
//!
//! Sits between an HTTP surface and the pixel codec. Two steps:
//!
//! - **Validate** - [`validate`] turns a [`RawTransformRequest`] (form strings
//!   or JSON values) into a typed [`TransformRequest`], collecting every
//!   field-level problem into [`ValidationErrors`].
//! - **Run** - [`Pipeline::run`] decodes the source, applies resize →
//!   grayscale → rotate in that fixed order, re-encodes, and returns a
//!   [`TransformResult`] with before/after [`ImageMetadata`].
//!
//! Pixel work goes through the [`Codec`] trait; [`ImageCodec`] is the
//! production implementation.
//!
//! ## Example
//!
//! ```no_run
//! use serde_json::json;
//! use transform::{validate, Pipeline, RawTransformRequest};
//!
//! let raw = RawTransformRequest {
//!     format: Some(json!("webp")),
//!     quality: Some(json!(75)),
//!     grayscale: Some(json!(true)),
//!     ..Default::default()
//! };
//! let request = validate(&raw).expect("valid request");
//!
//! let source = std::fs::read("photo.jpg").unwrap();
//! let result = Pipeline::default().run(&request, &source).unwrap();
//! println!("{} -> {}", result.original_metadata.size, result.new_metadata.size);
//! ```

mod codec;
mod error;
mod format;
mod pipeline;
mod request;

pub use crate::codec::{Codec, EncodeOptions, Encoded, ImageCodec, ImageMetadata, MAX_PIXELS};
pub use crate::error::{CodecError, FieldError, TransformError, ValidationErrors};
pub use crate::format::{ImageFormat, UnknownFormat};
pub use crate::pipeline::{data_uri, Pipeline, TransformResult};
pub use crate::request::{
    validate, validate_uploads, RawTransformRequest, Resize, ResizeBody, TransformBody,
    TransformRequest, UploadedImage, DEFAULT_QUALITY, MAX_RESIZE_DIMENSION,
};

// Re-exported so codec implementors name the same pixel type.
pub use image::DynamicImage;

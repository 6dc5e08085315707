//! Transform request validation.
//!
//! Requests arrive in two shapes: multipart forms, where every field is a
//! string, and JSON bodies, where numbers and booleans are typed and resize
//! is a nested `{width, height}` object. Both are first lowered into a
//! [`RawTransformRequest`] of uncoerced [`serde_json::Value`]s, then
//! [`validate`] coerces each field and applies the cross-field rules.
//!
//! Every rule runs regardless of earlier failures so the caller gets the full
//! list of problems in one response.
//!
//! ```rust
//! use serde_json::json;
//! use transform::{validate, ImageFormat, RawTransformRequest};
//!
//! let raw = RawTransformRequest {
//!     format: Some(json!("webp")),
//!     resize_width: Some(json!("500")),
//!     resize_height: Some(json!(250)),
//!     ..Default::default()
//! };
//!
//! let request = validate(&raw).unwrap();
//! assert_eq!(request.format, ImageFormat::Webp);
//! assert_eq!(request.quality, 80);
//! assert_eq!(request.resize.map(|r| (r.width, r.height)), Some((500, 250)));
//! ```
use serde::Deserialize;
use serde_json::Value;
use tracing::debug;

use crate::codec::MAX_PIXELS;
use crate::error::ValidationErrors;
use crate::format::ImageFormat;

/// Quality used when the request does not name one.
pub const DEFAULT_QUALITY: u8 = 80;

/// Upper bound for either resize dimension.
pub const MAX_RESIZE_DIMENSION: u32 = 16_384;

/// Uncoerced request fields. `None` means the field was not supplied.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
pub struct RawTransformRequest {
    #[serde(default)]
    pub format: Option<Value>,
    #[serde(default)]
    pub quality: Option<Value>,
    #[serde(default)]
    pub lossless: Option<Value>,
    #[serde(default)]
    pub resize_width: Option<Value>,
    #[serde(default)]
    pub resize_height: Option<Value>,
    #[serde(default)]
    pub rotate: Option<Value>,
    #[serde(default)]
    pub grayscale: Option<Value>,
}

impl RawTransformRequest {
    /// Record a multipart text field. Returns `false` for names that are not
    /// transform parameters so the caller can route them elsewhere.
    pub fn set_form_field(&mut self, name: &str, value: String) -> bool {
        let slot = match name {
            "format" => &mut self.format,
            "quality" => &mut self.quality,
            "lossless" => &mut self.lossless,
            "resize_width" => &mut self.resize_width,
            "resize_height" => &mut self.resize_height,
            "rotate" => &mut self.rotate,
            "grayscale" => &mut self.grayscale,
            _ => return false,
        };
        *slot = Some(Value::String(value));
        true
    }
}

/// JSON body of the per-resource transform endpoint.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct TransformBody {
    #[serde(default)]
    pub format: Option<Value>,
    #[serde(default)]
    pub quality: Option<Value>,
    #[serde(default)]
    pub lossless: Option<Value>,
    #[serde(default)]
    pub resize: Option<ResizeBody>,
    #[serde(default)]
    pub rotate: Option<Value>,
    #[serde(default)]
    pub grayscale: Option<Value>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct ResizeBody {
    #[serde(default)]
    pub width: Option<Value>,
    #[serde(default)]
    pub height: Option<Value>,
}

impl From<TransformBody> for RawTransformRequest {
    fn from(body: TransformBody) -> Self {
        let (resize_width, resize_height) = match body.resize {
            Some(resize) => (resize.width, resize.height),
            None => (None, None),
        };
        Self {
            format: body.format,
            quality: body.quality,
            lossless: body.lossless,
            resize_width,
            resize_height,
            rotate: body.rotate,
            grayscale: body.grayscale,
        }
    }
}

/// Exact output dimensions. Aspect ratio is not preserved.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Resize {
    pub width: u32,
    pub height: u32,
}

/// A request that passed [`validate`].
#[derive(Debug, Clone, PartialEq)]
pub struct TransformRequest {
    pub format: ImageFormat,
    pub quality: u8,
    pub lossless: bool,
    pub resize: Option<Resize>,
    /// Clockwise degrees, any sign or magnitude.
    pub rotate: Option<f64>,
    pub grayscale: bool,
}

impl TransformRequest {
    /// Re-encode only, at the default quality.
    pub fn new(format: ImageFormat) -> Self {
        Self {
            format,
            quality: DEFAULT_QUALITY,
            lossless: false,
            resize: None,
            rotate: None,
            grayscale: false,
        }
    }

    pub fn with_quality(mut self, quality: u8) -> Self {
        self.quality = quality;
        self
    }

    pub fn with_lossless(mut self, lossless: bool) -> Self {
        self.lossless = lossless;
        self
    }

    pub fn with_resize(mut self, width: u32, height: u32) -> Self {
        self.resize = Some(Resize { width, height });
        self
    }

    pub fn with_rotate(mut self, degrees: f64) -> Self {
        self.rotate = Some(degrees);
        self
    }

    pub fn with_grayscale(mut self, grayscale: bool) -> Self {
        self.grayscale = grayscale;
        self
    }
}

/// One uploaded file attachment.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UploadedImage {
    pub file_name: Option<String>,
    pub content_type: Option<String>,
    pub data: Vec<u8>,
}

impl UploadedImage {
    pub fn new(data: Vec<u8>) -> Self {
        Self {
            file_name: None,
            content_type: None,
            data,
        }
    }

    pub fn display_name(&self) -> &str {
        self.file_name.as_deref().unwrap_or("image")
    }
}

/// Require at least one attachment and reject empty ones.
pub fn validate_uploads(uploads: &[UploadedImage]) -> Result<(), ValidationErrors> {
    let mut errors = ValidationErrors::default();
    if uploads.is_empty() {
        errors.push("image", "At least one image is required");
    }
    for upload in uploads.iter().filter(|u| u.data.is_empty()) {
        errors.push("image", format!("Image {} is empty", upload.display_name()));
    }
    errors.into_result(())
}

/// Coerce and cross-check a raw request.
pub fn validate(raw: &RawTransformRequest) -> Result<TransformRequest, ValidationErrors> {
    let mut errors = ValidationErrors::default();

    let format = validate_format(raw.format.as_ref(), &mut errors);
    let quality = validate_quality(raw.quality.as_ref(), &mut errors);
    let lossless = flag(
        raw.lossless.as_ref(),
        "lossless",
        "Lossless must be a boolean (true or false)",
        &mut errors,
    );
    let grayscale = flag(
        raw.grayscale.as_ref(),
        "grayscale",
        "Grayscale must be a boolean (true or false)",
        &mut errors,
    );
    let rotate = match number(raw.rotate.as_ref()) {
        Coerced::Absent => None,
        Coerced::Value(degrees) => Some(degrees),
        Coerced::Invalid => {
            errors.push("rotate", "Rotate must be a number");
            None
        }
    };

    if lossless {
        if let Some(format) = format {
            if !format.supports_lossless() {
                errors.push(
                    "lossless",
                    format!(
                        "Image format must be one of: {}, to be lossless",
                        ImageFormat::list(&ImageFormat::LOSSLESS)
                    ),
                );
            }
        }
    }

    let resize = validate_resize(
        raw.resize_width.as_ref(),
        raw.resize_height.as_ref(),
        &mut errors,
    );

    if !errors.is_empty() {
        debug!(violations = errors.len(), "transform request rejected");
        return Err(errors);
    }

    let Some(format) = format else {
        // Unreachable: a missing format always records an error above.
        return Err(ValidationErrors::single("format", format_message()));
    };

    Ok(TransformRequest {
        format,
        quality,
        lossless,
        resize,
        rotate,
        grayscale,
    })
}

fn format_message() -> String {
    format!(
        "Image format can only be one of: {}",
        ImageFormat::list(&ImageFormat::ALL)
    )
}

fn validate_format(value: Option<&Value>, errors: &mut ValidationErrors) -> Option<ImageFormat> {
    let parsed = match value {
        Some(Value::String(s)) => s.parse::<ImageFormat>().ok(),
        _ => None,
    };
    if parsed.is_none() {
        errors.push("format", format_message());
    }
    parsed
}

fn validate_quality(value: Option<&Value>, errors: &mut ValidationErrors) -> u8 {
    match number(value) {
        Coerced::Absent => DEFAULT_QUALITY,
        Coerced::Invalid => {
            errors.push("quality", "Quality must be a number");
            DEFAULT_QUALITY
        }
        Coerced::Value(q) if !(1.0..=100.0).contains(&q) => {
            errors.push("quality", "Quality must be between 1 and 100");
            DEFAULT_QUALITY
        }
        Coerced::Value(q) if q.fract() != 0.0 => {
            errors.push("quality", "Quality must be a whole number");
            DEFAULT_QUALITY
        }
        Coerced::Value(q) => q as u8,
    }
}

fn validate_resize(
    width: Option<&Value>,
    height: Option<&Value>,
    errors: &mut ValidationErrors,
) -> Option<Resize> {
    let width = number(width);
    let height = number(height);

    match (width.is_present(), height.is_present()) {
        (false, false) => return None,
        (true, false) => errors.push(
            "resize_height",
            "Resize height is required when resize width is provided",
        ),
        (false, true) => errors.push(
            "resize_width",
            "Resize width is required when resize height is provided",
        ),
        (true, true) => {}
    }

    let width = dimension(width, "resize_width", "Resize width", errors);
    let height = dimension(height, "resize_height", "Resize height", errors);
    match (width, height) {
        (Some(width), Some(height)) if u64::from(width) * u64::from(height) > MAX_PIXELS => {
            errors.push(
                "resize_width",
                format!("Resize width times height must be at most {MAX_PIXELS} pixels"),
            );
            None
        }
        (Some(width), Some(height)) => Some(Resize { width, height }),
        _ => None,
    }
}

fn dimension(
    value: Coerced<f64>,
    field: &str,
    label: &str,
    errors: &mut ValidationErrors,
) -> Option<u32> {
    match value {
        Coerced::Absent => None,
        Coerced::Invalid => {
            errors.push(field, format!("{label} must be a number"));
            None
        }
        Coerced::Value(v) if v <= 0.0 || v.fract() != 0.0 => {
            errors.push(field, format!("{label} must be a positive number"));
            None
        }
        Coerced::Value(v) if v > f64::from(MAX_RESIZE_DIMENSION) => {
            errors.push(
                field,
                format!("{label} must be at most {MAX_RESIZE_DIMENSION}"),
            );
            None
        }
        Coerced::Value(v) => Some(v as u32),
    }
}

/// Outcome of coercing one raw field.
#[derive(Debug, Clone, Copy, PartialEq)]
enum Coerced<T> {
    Absent,
    Value(T),
    Invalid,
}

impl<T> Coerced<T> {
    fn is_present(&self) -> bool {
        !matches!(self, Coerced::Absent)
    }
}

/// Numbers pass through; strings are trimmed and parsed. An empty string is
/// what an untouched form input submits, so it counts as absent.
fn number(value: Option<&Value>) -> Coerced<f64> {
    match value {
        None | Some(Value::Null) => Coerced::Absent,
        Some(Value::Number(n)) => n.as_f64().map_or(Coerced::Invalid, Coerced::Value),
        Some(Value::String(s)) => {
            let s = s.trim();
            if s.is_empty() {
                return Coerced::Absent;
            }
            match s.parse::<f64>() {
                Ok(v) if v.is_finite() => Coerced::Value(v),
                _ => Coerced::Invalid,
            }
        }
        Some(_) => Coerced::Invalid,
    }
}

fn boolean(value: Option<&Value>) -> Coerced<bool> {
    match value {
        None | Some(Value::Null) => Coerced::Absent,
        Some(Value::Bool(b)) => Coerced::Value(*b),
        Some(Value::Number(n)) => match n.as_f64() {
            Some(v) if v == 0.0 => Coerced::Value(false),
            Some(v) if v == 1.0 => Coerced::Value(true),
            _ => Coerced::Invalid,
        },
        Some(Value::String(s)) => match s.trim().to_ascii_lowercase().as_str() {
            "" => Coerced::Absent,
            "true" | "1" | "yes" | "on" => Coerced::Value(true),
            "false" | "0" | "no" | "off" => Coerced::Value(false),
            _ => Coerced::Invalid,
        },
        Some(_) => Coerced::Invalid,
    }
}

fn flag(
    value: Option<&Value>,
    field: &str,
    message: &str,
    errors: &mut ValidationErrors,
) -> bool {
    match boolean(value) {
        Coerced::Absent => false,
        Coerced::Value(b) => b,
        Coerced::Invalid => {
            errors.push(field, message);
            false
        }
    }
}

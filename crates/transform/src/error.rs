//! Error types produced by the transform crate.
//!
//! There are two distinct failure surfaces:
//!
//! | Error | Raised by | Caller sees |
//! |-------|-----------|-------------|
//! | [`ValidationErrors`] | [`validate`](crate::validate) | Every field-level violation, `{field, message}` |
//! | [`TransformError`] | [`Pipeline::run`](crate::Pipeline::run) | One opaque "Error transforming image" |
//!
//! [`CodecError`] is the detailed cause behind a [`TransformError`]. It is kept
//! for logs and tests but never rendered to API clients.
use std::fmt;

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// A single rejected request field.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FieldError {
    pub field: String,
    pub message: String,
}

impl FieldError {
    pub fn new(field: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            field: field.into(),
            message: message.into(),
        }
    }
}

/// All violations found while validating one request.
///
/// Validation never stops at the first problem, so this always carries at
/// least one entry when returned as an error.
///
/// ```rust
/// use transform::{FieldError, ValidationErrors};
///
/// let mut errors = ValidationErrors::default();
/// errors.push("quality", "Quality must be between 1 and 100");
/// assert_eq!(errors.len(), 1);
/// assert!(errors.has_field("quality"));
/// assert_eq!(
///     errors.iter().next(),
///     Some(&FieldError::new("quality", "Quality must be between 1 and 100"))
/// );
/// ```
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ValidationErrors(Vec<FieldError>);

impl ValidationErrors {
    pub fn single(field: impl Into<String>, message: impl Into<String>) -> Self {
        Self(vec![FieldError::new(field, message)])
    }

    pub fn push(&mut self, field: impl Into<String>, message: impl Into<String>) {
        self.0.push(FieldError::new(field, message));
    }

    pub fn extend(&mut self, other: ValidationErrors) {
        self.0.extend(other.0);
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn iter(&self) -> impl Iterator<Item = &FieldError> {
        self.0.iter()
    }

    pub fn has_field(&self, field: &str) -> bool {
        self.0.iter().any(|e| e.field == field)
    }

    /// Messages reported against `field`, in the order they were found.
    pub fn messages_for(&self, field: &str) -> Vec<&str> {
        self.0
            .iter()
            .filter(|e| e.field == field)
            .map(|e| e.message.as_str())
            .collect()
    }

    pub fn into_inner(self) -> Vec<FieldError> {
        self.0
    }

    /// `Ok(value)` when nothing was collected, otherwise `Err(self)`.
    pub fn into_result<T>(self, value: T) -> Result<T, ValidationErrors> {
        if self.is_empty() {
            Ok(value)
        } else {
            Err(self)
        }
    }
}

impl fmt::Display for ValidationErrors {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut first = true;
        for err in &self.0 {
            if !first {
                f.write_str("; ")?;
            }
            write!(f, "{}: {}", err.field, err.message)?;
            first = false;
        }
        Ok(())
    }
}

impl std::error::Error for ValidationErrors {}

/// Failures raised by a [`Codec`](crate::Codec) implementation.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[non_exhaustive]
pub enum CodecError {
    #[error("failed to decode source image: {0}")]
    Decode(String),

    #[error("failed to encode {format}: {reason}")]
    Encode { format: String, reason: String },

    #[error("no encoder available for {0}")]
    UnsupportedFormat(String),

    #[error("invalid operation: {0}")]
    InvalidOperation(String),
}

/// The single failure outcome of a pipeline run.
///
/// Which step failed is deliberately not part of the rendered message; the
/// underlying [`CodecError`] stays reachable through [`TransformError::cause`]
/// and `Error::source` for logging.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("Error transforming image")]
pub struct TransformError {
    #[source]
    cause: CodecError,
}

impl TransformError {
    pub fn cause(&self) -> &CodecError {
        &self.cause
    }
}

impl From<CodecError> for TransformError {
    fn from(cause: CodecError) -> Self {
        Self { cause }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::error::Error;

    #[test]
    fn transform_error_message_is_opaque() {
        let err = TransformError::from(CodecError::Decode("bad huffman table".into()));
        assert_eq!(err.to_string(), "Error transforming image");
        assert!(err.source().is_some());
        assert!(matches!(err.cause(), CodecError::Decode(_)));
    }

    #[test]
    fn validation_errors_display_joins_fields() {
        let mut errors = ValidationErrors::single("format", "bad format");
        errors.push("quality", "bad quality");
        assert_eq!(errors.to_string(), "format: bad format; quality: bad quality");
    }

    #[test]
    fn validation_errors_serialize_as_plain_list() {
        let errors = ValidationErrors::single("rotate", "Rotate must be a number");
        let json = serde_json::to_value(&errors).unwrap();
        assert_eq!(
            json,
            serde_json::json!([{ "field": "rotate", "message": "Rotate must be a number" }])
        );
    }

    #[test]
    fn into_result_only_errs_when_non_empty() {
        assert_eq!(ValidationErrors::default().into_result(5), Ok(5));
        assert!(ValidationErrors::single("a", "b").into_result(5).is_err());
    }
}

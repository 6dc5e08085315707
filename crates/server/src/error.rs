use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use imgshift::ServiceError;
use serde::{Deserialize, Serialize};
use store::StoreError;
use transform::{FieldError, TransformError, ValidationErrors};

pub type ServerResult<T> = Result<T, ServerError>;

/// Server error types
#[derive(Debug, thiserror::Error)]
pub enum ServerError {
    #[error("{0}")]
    Authentication(String),

    #[error("Too many requests")]
    RateLimitExceeded,

    #[error("{0}")]
    BadRequest(String),

    #[error("Validation failed")]
    Validation(ValidationErrors),

    #[error("{0}")]
    NotFound(String),

    #[error("You are not authorized to access this image")]
    Forbidden,

    #[error("{0}")]
    Conflict(String),

    #[error("Payload too large: max {0}MB allowed")]
    PayloadTooLarge(usize),

    #[error(transparent)]
    Transform(#[from] TransformError),

    #[error("Storage error: {0}")]
    Storage(#[from] StoreError),

    #[error("Internal server error: {0}")]
    Internal(String),
}

/// Body of every error response.
#[derive(Debug, Serialize, Deserialize)]
pub struct ErrorResponse {
    pub success: bool,
    pub message: String,
    pub data: Option<serde_json::Value>,
    pub code: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub errors: Option<Vec<FieldError>>,
}

impl ServerError {
    /// Get HTTP status code for this error
    pub fn status_code(&self) -> StatusCode {
        match self {
            ServerError::Authentication(_) => StatusCode::UNAUTHORIZED,
            ServerError::RateLimitExceeded => StatusCode::TOO_MANY_REQUESTS,
            ServerError::BadRequest(_) | ServerError::Validation(_) => StatusCode::BAD_REQUEST,
            ServerError::NotFound(_) => StatusCode::NOT_FOUND,
            ServerError::Forbidden => StatusCode::FORBIDDEN,
            ServerError::Conflict(_) => StatusCode::CONFLICT,
            ServerError::PayloadTooLarge(_) => StatusCode::PAYLOAD_TOO_LARGE,
            ServerError::Transform(_) => StatusCode::UNPROCESSABLE_ENTITY,
            ServerError::Storage(_) | ServerError::Internal(_) => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
        }
    }

    /// Get error code string
    pub fn error_code(&self) -> &'static str {
        match self {
            ServerError::Authentication(_) => "AUTH_FAILED",
            ServerError::RateLimitExceeded => "RATE_LIMIT_EXCEEDED",
            ServerError::BadRequest(_) => "BAD_REQUEST",
            ServerError::Validation(_) => "VALIDATION_FAILED",
            ServerError::NotFound(_) => "NOT_FOUND",
            ServerError::Forbidden => "FORBIDDEN",
            ServerError::Conflict(_) => "CONFLICT",
            ServerError::PayloadTooLarge(_) => "PAYLOAD_TOO_LARGE",
            ServerError::Transform(_) => "TRANSFORM_FAILED",
            ServerError::Storage(_) => "STORAGE_ERROR",
            ServerError::Internal(_) => "INTERNAL_ERROR",
        }
    }

    /// Message shown to clients. Server-side failures are not described.
    fn public_message(&self) -> String {
        match self {
            ServerError::Storage(_) | ServerError::Internal(_) => {
                "Internal server error".to_string()
            }
            other => other.to_string(),
        }
    }
}

impl IntoResponse for ServerError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        match &self {
            ServerError::Transform(err) => {
                tracing::warn!(cause = %err.cause(), "transform failed");
            }
            _ if status.is_server_error() => {
                tracing::error!(error = %self, "request failed");
            }
            _ => {}
        }

        let body = ErrorResponse {
            success: false,
            message: self.public_message(),
            data: None,
            code: self.error_code().to_string(),
            errors: match self {
                ServerError::Validation(errors) => Some(errors.into_inner()),
                _ => None,
            },
        };

        (status, Json(body)).into_response()
    }
}

impl From<ServiceError> for ServerError {
    fn from(err: ServiceError) -> Self {
        match err {
            ServiceError::Validation(errors) => ServerError::Validation(errors),
            ServiceError::NotFound => ServerError::NotFound("Image not found".to_string()),
            ServiceError::Forbidden => ServerError::Forbidden,
            ServiceError::Transform(err) => ServerError::Transform(err),
            ServiceError::Storage(err) => ServerError::Storage(err),
        }
    }
}

impl From<ValidationErrors> for ServerError {
    fn from(errors: ValidationErrors) -> Self {
        ServerError::Validation(errors)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use transform::CodecError;

    #[test]
    fn service_errors_map_to_distinct_statuses() {
        let cases = [
            (ServiceError::NotFound, StatusCode::NOT_FOUND),
            (ServiceError::Forbidden, StatusCode::FORBIDDEN),
            (
                ServiceError::Validation(ValidationErrors::single("format", "bad")),
                StatusCode::BAD_REQUEST,
            ),
            (
                ServiceError::Transform(CodecError::Decode("x".into()).into()),
                StatusCode::UNPROCESSABLE_ENTITY,
            ),
            (
                ServiceError::Storage(StoreError::backend("down")),
                StatusCode::INTERNAL_SERVER_ERROR,
            ),
        ];
        for (service, status) in cases {
            assert_eq!(ServerError::from(service).status_code(), status);
        }
    }

    #[test]
    fn transform_message_hides_the_cause() {
        let err = ServerError::from(TransformError::from(CodecError::Decode(
            "corrupt huffman table".into(),
        )));
        assert_eq!(err.public_message(), "Error transforming image");
        assert_eq!(err.error_code(), "TRANSFORM_FAILED");
    }

    #[test]
    fn storage_message_is_generic() {
        let err = ServerError::from(StoreError::backend("connection refused on 10.0.0.3"));
        assert_eq!(err.public_message(), "Internal server error");
    }
}

use axum::{
    extract::rejection::{JsonRejection, PathRejection},
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use portal_protocol::ErrorInfo;
use thiserror::Error;
use tracing::error;

#[derive(Error, Debug)]
pub enum ApiError {
    #[error("{0}")]
    Validation(ErrorInfo),

    #[error("{0} not found")]
    NotFound(&'static str),

    #[error("Authentication required")]
    Unauthorized,

    #[error("Internal error: {0}")]
    Internal(String),
}

pub type ApiResult<T> = Result<T, ApiError>;

impl From<ErrorInfo> for ApiError {
    fn from(info: ErrorInfo) -> Self {
        ApiError::Validation(info)
    }
}

// Store and task failures surface as plain strings.
impl From<String> for ApiError {
    fn from(message: String) -> Self {
        ApiError::Internal(message)
    }
}

impl From<JsonRejection> for ApiError {
    fn from(rejection: JsonRejection) -> Self {
        ApiError::Validation(ErrorInfo::new("invalid_json", rejection.body_text()))
    }
}

impl From<PathRejection> for ApiError {
    fn from(rejection: PathRejection) -> Self {
        ApiError::Validation(ErrorInfo::new("invalid_path", rejection.body_text()))
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, body) = match self {
            ApiError::Validation(info) => (StatusCode::BAD_REQUEST, info),
            ApiError::NotFound(what) => (
                StatusCode::NOT_FOUND,
                ErrorInfo::new("not_found", format!("{} not found", what)),
            ),
            ApiError::Unauthorized => (
                StatusCode::UNAUTHORIZED,
                ErrorInfo::new("unauthorized", "authentication required"),
            ),
            ApiError::Internal(message) => {
                error!(error = %message, "Request failed");
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    ErrorInfo::new("internal_error", "internal server error"),
                )
            }
        };

        (status, Json(body)).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn maps_error_kinds_to_status_codes() {
        let cases = [
            (
                ApiError::Validation(ErrorInfo::field("email", "is required")),
                StatusCode::BAD_REQUEST,
            ),
            (ApiError::NotFound("news"), StatusCode::NOT_FOUND),
            (ApiError::Unauthorized, StatusCode::UNAUTHORIZED),
            (
                ApiError::Internal("disk full".to_string()),
                StatusCode::INTERNAL_SERVER_ERROR,
            ),
        ];

        for (error, status) in cases {
            assert_eq!(error.into_response().status(), status);
        }
    }

    #[test]
    fn internal_message_converts_from_store_errors() {
        let err: ApiError = "Failed to open sqlite db".to_string().into();
        assert!(matches!(err, ApiError::Internal(_)));
    }
}

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;
use tracing::error;

use crate::error::{CoreError, StorageError, ValidationError};

#[derive(Debug, thiserror::Error)]
pub enum AppError {
    #[error(transparent)]
    Validation(#[from] ValidationError),

    #[error(transparent)]
    Storage(#[from] StorageError),

    #[error("{0}")]
    Unauthorized(String),

    #[error("{0}")]
    Forbidden(String),
}

impl From<CoreError> for AppError {
    fn from(e: CoreError) -> Self {
        match e {
            CoreError::Validation(v) => Self::Validation(v),
            CoreError::Storage(s) => Self::Storage(s),
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let (status, body) = match self {
            AppError::Validation(v) => (
                StatusCode::BAD_REQUEST,
                json!({
                    "error": "validation failed",
                    "code": "VALIDATION_ERROR",
                    "violations": v.violations,
                }),
            ),
            AppError::Unauthorized(msg) => (
                StatusCode::UNAUTHORIZED,
                json!({ "error": msg, "code": "UNAUTHORIZED" }),
            ),
            AppError::Forbidden(msg) => (
                StatusCode::FORBIDDEN,
                json!({ "error": msg, "code": "FORBIDDEN" }),
            ),
            AppError::Storage(e) => {
                // Backend details stay in the log.
                error!(error = %e, "Request failed on storage");
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    json!({ "error": "internal server error", "code": "INTERNAL_ERROR" }),
                )
            }
        };
        (status, Json(body)).into_response()
    }
}

#[cfg(test)]
mod tests {
    use axum::body::to_bytes;
    use serde_json::Value;

    use super::*;

    async fn body_of(resp: Response) -> Value {
        let bytes = to_bytes(resp.into_body(), usize::MAX).await.unwrap();
        serde_json::from_slice(&bytes).unwrap()
    }

    #[tokio::test]
    async fn validation_lists_violations() {
        let mut err = ValidationError::single("gasThreshold", "must be a number");
        err.push("tempDangerThreshold", "is required");
        let resp = AppError::from(CoreError::from(err)).into_response();

        assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
        let body = body_of(resp).await;
        assert_eq!(body["code"], "VALIDATION_ERROR");
        assert_eq!(body["violations"].as_array().unwrap().len(), 2);
        assert_eq!(body["violations"][0]["field"], "gasThreshold");
    }

    #[tokio::test]
    async fn storage_errors_are_sanitized() {
        let err = StorageError::Unavailable("pg at 10.0.0.5 refused".into());
        let resp = AppError::from(err).into_response();

        assert_eq!(resp.status(), StatusCode::INTERNAL_SERVER_ERROR);
        let body = body_of(resp).await;
        assert_eq!(body["error"], "internal server error");
        assert!(!body.to_string().contains("10.0.0.5"));
    }

    #[tokio::test]
    async fn auth_errors_map_to_401_and_403() {
        let resp = AppError::Unauthorized("Missing Authorization header".into()).into_response();
        assert_eq!(resp.status(), StatusCode::UNAUTHORIZED);

        let resp = AppError::Forbidden("Admin role required".into()).into_response();
        assert_eq!(resp.status(), StatusCode::FORBIDDEN);
    }
}

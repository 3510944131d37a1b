use axum::{
    extract::{FromRequest, Request},
    Json,
};
use serde_json::Value;
use tracing::debug;

use super::errors::AppError;
use crate::error::ValidationError;

/// A JSON request body. Malformed JSON or a missing `application/json`
/// content type is reported as a validation error on `body`.
#[derive(Debug)]
pub struct JsonBody(pub Value);

impl<S: Send + Sync> FromRequest<S> for JsonBody {
    type Rejection = AppError;

    async fn from_request(req: Request, state: &S) -> Result<Self, Self::Rejection> {
        match Json::<Value>::from_request(req, state).await {
            Ok(Json(value)) => Ok(Self(value)),
            Err(rejection) => {
                let reason = rejection.body_text();
                debug!(status = %rejection.status(), reason = %reason, "Rejected request body");
                Err(ValidationError::single("body", reason).into())
            }
        }
    }
}

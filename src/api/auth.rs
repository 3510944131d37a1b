//! Bearer-token authentication.
//!
//! Tokens are issued by the account service and signed with the shared
//! `JWT_SECRET` (HS256). This service only verifies them.

use std::fmt;

use axum::{extract::FromRequestParts, http::request::Parts};
use jsonwebtoken::{decode, DecodingKey, Validation};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::errors::AppError;
use crate::{context::AppContext, db::models::Role};

/// Claims this service relies on. Older tokens carry the subject as `userId`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Claims {
    #[serde(alias = "userId")]
    pub sub: Uuid,
    #[serde(default)]
    pub role: String,
    pub exp: i64,
}

#[derive(Clone)]
pub struct JwtConfig {
    key: DecodingKey,
    validation: Validation,
}

impl JwtConfig {
    pub fn new(secret: &str) -> Self {
        Self {
            key: DecodingKey::from_secret(secret.as_bytes()),
            // HS256; exp is checked.
            validation: Validation::default(),
        }
    }

    pub fn verify(&self, token: &str) -> Result<Claims, jsonwebtoken::errors::Error> {
        decode::<Claims>(token, &self.key, &self.validation).map(|data| data.claims)
    }
}

impl fmt::Debug for JwtConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("JwtConfig").finish_non_exhaustive()
    }
}

/// The authenticated caller, taken from the `Authorization: Bearer` header.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AuthPrincipal {
    pub id: Uuid,
    pub role: Role,
}

impl FromRequestParts<AppContext> for AuthPrincipal {
    type Rejection = AppError;

    async fn from_request_parts(
        parts: &mut Parts,
        ctx: &AppContext,
    ) -> Result<Self, Self::Rejection> {
        let header = parts
            .headers
            .get(axum::http::header::AUTHORIZATION)
            .and_then(|v| v.to_str().ok())
            .ok_or_else(|| AppError::Unauthorized("Missing Authorization header".into()))?;

        let token = header.strip_prefix("Bearer ").ok_or_else(|| {
            AppError::Unauthorized("Invalid Authorization format. Expected: Bearer <token>".into())
        })?;

        let claims = ctx
            .jwt
            .verify(token.trim())
            .map_err(|_| AppError::Unauthorized("Invalid or expired token".into()))?;

        Ok(AuthPrincipal {
            id: claims.sub,
            role: Role::parse_lossy(&claims.role),
        })
    }
}

/// Requires the `admin` role. Rejects with 403 otherwise.
#[derive(Debug, Clone, Copy)]
pub struct RequireAdmin(pub AuthPrincipal);

impl FromRequestParts<AppContext> for RequireAdmin {
    type Rejection = AppError;

    async fn from_request_parts(
        parts: &mut Parts,
        ctx: &AppContext,
    ) -> Result<Self, Self::Rejection> {
        let principal = AuthPrincipal::from_request_parts(parts, ctx).await?;
        if principal.role != Role::Admin {
            return Err(AppError::Forbidden("Admin role required".into()));
        }
        Ok(RequireAdmin(principal))
    }
}

#[cfg(test)]
pub(crate) mod testing {
    use jsonwebtoken::{encode, EncodingKey, Header};

    use super::*;

    /// Sign a token the way the account service does.
    pub fn token(secret: &str, sub: Uuid, role: &str) -> String {
        let claims = Claims {
            sub,
            role: role.to_owned(),
            exp: chrono::Utc::now().timestamp() + 3600,
        };
        encode(&Header::default(), &claims, &EncodingKey::from_secret(secret.as_bytes())).unwrap()
    }
}

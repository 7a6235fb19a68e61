use std::sync::Arc;

use axum::http::HeaderMap;
use jsonwebtoken::{DecodingKey, Validation};
use uuid::Uuid;

use crate::errors::AppError;
use crate::session::SessionError;

/// Verification settings for bearer session tokens. Tokens are issued by the
/// identity provider; this service only validates them.
#[derive(Debug, Clone)]
pub struct JwtConfig {
    pub secret: Arc<Vec<u8>>,
    pub leeway_secs: u64,
}

impl JwtConfig {
    pub fn new(secret: impl Into<Vec<u8>>) -> Self {
        Self {
            secret: Arc::new(secret.into()),
            leeway_secs: 0,
        }
    }

    pub fn from_env() -> Result<Self, AppError> {
        let secret = std::env::var("JWT_SECRET").map_err(|_| AppError::configuration("JWT_SECRET not set"))?;
        let leeway_secs = std::env::var("JWT_LEEWAY_SECS")
            .map(|val| val.parse::<u64>())
            .unwrap_or(Ok(0))
            .map_err(|_| AppError::configuration("JWT_LEEWAY_SECS must be a valid integer"))?;

        Ok(Self {
            secret: Arc::new(secret.into_bytes()),
            leeway_secs,
        })
    }

    pub fn decode(&self, token: &str) -> Result<Claims, SessionError> {
        let mut validation = Validation::default();
        validation.validate_exp = true;
        validation.leeway = self.leeway_secs;

        jsonwebtoken::decode::<Claims>(token, &DecodingKey::from_secret(&self.secret), &validation)
            .map(|data| data.claims)
            .map_err(|err| SessionError::InvalidToken(err.to_string()))
    }
}

#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
pub struct Claims {
    pub sub: Uuid,
    pub exp: usize,
    pub iat: usize,
}

/// Raw token from an `Authorization: Bearer ...` header, if any.
pub fn bearer_token(headers: &HeaderMap) -> Option<&str> {
    headers
        .get(axum::http::header::AUTHORIZATION)
        .and_then(|value| value.to_str().ok())
        .and_then(|value| value.strip_prefix("Bearer "))
        .map(str::trim)
        .filter(|token| !token.is_empty())
}

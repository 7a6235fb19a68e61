//! Identity resolution: "is there a live session, and for whom?"

use std::sync::Arc;

use async_trait::async_trait;
use axum::http::HeaderMap;

use crate::authz::PrincipalId;
use crate::jwt::{bearer_token, JwtConfig};

#[derive(Debug, thiserror::Error)]
pub enum SessionError {
    #[error("invalid session token: {0}")]
    InvalidToken(String),
    #[error("session store unavailable: {0}")]
    Unavailable(String),
}

/// External session store.
#[async_trait]
pub trait SessionStore: Send + Sync {
    async fn current_session(&self) -> Result<Option<PrincipalId>, SessionError>;
}

/// Wraps a [`SessionStore`] and folds every failure into "no session".
///
/// No retries: a failed lookup is reported as an anonymous visitor.
#[derive(Clone)]
pub struct IdentityResolver {
    store: Arc<dyn SessionStore>,
}

impl IdentityResolver {
    pub fn new(store: Arc<dyn SessionStore>) -> Self {
        Self { store }
    }

    pub async fn resolve_session(&self) -> Option<PrincipalId> {
        match self.store.current_session().await {
            Ok(principal) => principal,
            Err(err) => {
                tracing::warn!(error = %err, "session lookup failed, treating visitor as anonymous");
                None
            }
        }
    }
}

/// Session carried by a bearer token on the current request.
#[derive(Debug, Clone)]
pub struct BearerSessionStore {
    jwt: Arc<JwtConfig>,
    token: Option<String>,
}

impl BearerSessionStore {
    pub fn new(jwt: Arc<JwtConfig>, token: Option<String>) -> Self {
        Self { jwt, token }
    }

    pub fn from_headers(jwt: Arc<JwtConfig>, headers: &HeaderMap) -> Self {
        Self::new(jwt, bearer_token(headers).map(str::to_string))
    }
}

#[async_trait]
impl SessionStore for BearerSessionStore {
    async fn current_session(&self) -> Result<Option<PrincipalId>, SessionError> {
        let Some(token) = self.token.as_deref() else {
            return Ok(None);
        };

        let claims = self.jwt.decode(token)?;
        Ok(Some(PrincipalId(claims.sub)))
    }
}

/// A session known up front, e.g. an operator running the CLI on behalf of a user.
#[derive(Debug, Clone, Copy, Default)]
pub struct FixedSessionStore(pub Option<PrincipalId>);

#[async_trait]
impl SessionStore for FixedSessionStore {
    async fn current_session(&self) -> Result<Option<PrincipalId>, SessionError> {
        Ok(self.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::jwt::Claims;
    use jsonwebtoken::{EncodingKey, Header};
    use uuid::Uuid;

    struct BrokenStore;

    #[async_trait]
    impl SessionStore for BrokenStore {
        async fn current_session(&self) -> Result<Option<PrincipalId>, SessionError> {
            Err(SessionError::Unavailable("connection reset".into()))
        }
    }

    fn signed(secret: &str, sub: Uuid) -> String {
        let now = chrono::Utc::now().timestamp();
        let claims = Claims {
            sub,
            exp: (now + 600) as usize,
            iat: now as usize,
        };
        jsonwebtoken::encode(&Header::default(), &claims, &EncodingKey::from_secret(secret.as_bytes())).unwrap()
    }

    #[tokio::test]
    async fn store_failure_resolves_to_no_session() {
        let resolver = IdentityResolver::new(Arc::new(BrokenStore));
        assert_eq!(resolver.resolve_session().await, None);
    }

    #[tokio::test]
    async fn bearer_store_resolves_subject() {
        let jwt = Arc::new(JwtConfig::new("test-secret"));
        let sub = Uuid::new_v4();
        let store = BearerSessionStore::new(jwt, Some(signed("test-secret", sub)));

        let resolver = IdentityResolver::new(Arc::new(store));
        assert_eq!(resolver.resolve_session().await, Some(PrincipalId(sub)));
    }

    #[tokio::test]
    async fn tampered_token_is_anonymous() {
        let jwt = Arc::new(JwtConfig::new("test-secret"));
        let store = BearerSessionStore::new(jwt, Some(signed("wrong-secret", Uuid::new_v4())));

        assert!(store.current_session().await.is_err());
        let resolver = IdentityResolver::new(Arc::new(store));
        assert_eq!(resolver.resolve_session().await, None);
    }

    #[tokio::test]
    async fn missing_token_is_anonymous_without_error() {
        let store = BearerSessionStore::new(Arc::new(JwtConfig::new("x")), None);
        assert!(matches!(store.current_session().await, Ok(None)));
    }
}

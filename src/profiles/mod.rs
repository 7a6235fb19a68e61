//! Profile records: the role, approval and module entitlements of a principal.

mod sqlite;

pub use sqlite::{PriorProfile, SqliteProfileStore};

use async_trait::async_trait;

use crate::authz::{PrincipalId, ProfileRecord};

#[derive(Debug, thiserror::Error)]
pub enum ProfileLookupError {
    #[error("profile store error")]
    Store(#[from] sqlx::Error),
    #[error("malformed profile: {0}")]
    Malformed(String),
}

impl ProfileLookupError {
    pub fn malformed(reason: impl Into<String>) -> Self {
        Self::Malformed(reason.into())
    }
}

/// Read side used by the access engine. Only `role`, approval and
/// `active_modules` are requested.
#[async_trait]
pub trait ProfileStore: Send + Sync {
    async fn fetch_profile(&self, principal: PrincipalId) -> Result<Option<ProfileRecord>, ProfileLookupError>;
}

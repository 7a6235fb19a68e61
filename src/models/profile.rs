use std::collections::{BTreeMap, HashMap};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;
use uuid::Uuid;

use crate::authz::{ModuleId, ProfileRecord, Role};
use crate::events::{Loggable, Severity};
use crate::profiles::ProfileLookupError;

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct Profile {
    pub user_id: Uuid,
    pub full_name: Option<String>,
    pub role: Role,
    /// "status_homologacao" in the source data.
    pub approved: bool,
    pub active_modules: BTreeMap<ModuleId, bool>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Profile {
    pub fn record(&self) -> ProfileRecord {
        ProfileRecord {
            role: self.role,
            approved: self.approved,
            entitled_modules: self.active_modules.iter().map(|(k, v)| (*k, *v)).collect::<HashMap<_, _>>(),
        }
    }
}

impl Loggable for Profile {
    fn entity_type() -> &'static str { "profile" }
    fn subject_id(&self) -> Uuid { self.user_id }
    fn severity(&self) -> Severity { Severity::Critical }
}

/// Row as stored; role and module map are still unvalidated text.
#[derive(Debug, Clone)]
pub struct DbProfile {
    pub user_id: Uuid,
    pub full_name: Option<String>,
    pub role: Option<String>,
    pub status_homologacao: Option<bool>,
    pub active_modules: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl TryFrom<DbProfile> for Profile {
    type Error = ProfileLookupError;

    fn try_from(value: DbProfile) -> Result<Self, Self::Error> {
        let role = value
            .role
            .as_deref()
            .ok_or_else(|| ProfileLookupError::malformed(format!("profile {} has no role", value.user_id)))?
            .parse::<Role>()
            .map_err(|err| ProfileLookupError::malformed(err.to_string()))?;

        let active_modules = match value.active_modules.as_deref() {
            Some(raw) => crate::db::row_parsers::parse_active_modules(raw)?,
            None => BTreeMap::new(),
        };

        Ok(Profile {
            user_id: value.user_id,
            full_name: value.full_name,
            role,
            approved: value.status_homologacao.unwrap_or(false),
            active_modules,
            created_at: value.created_at,
            updated_at: value.updated_at,
        })
    }
}

#[derive(Debug, Deserialize, ToSchema)]
pub struct ProfileUpsertRequest {
    #[schema(example = "Maria Souza")]
    pub full_name: Option<String>,
    pub role: Role,
    #[serde(default)]
    pub approved: bool,
    #[serde(default)]
    pub active_modules: BTreeMap<ModuleId, bool>,
}

#[derive(Debug, Deserialize, ToSchema)]
pub struct RoleUpdateRequest {
    pub role: Role,
}

#[derive(Debug, Deserialize, ToSchema)]
pub struct ApprovalUpdateRequest {
    pub approved: bool,
}

#[derive(Debug, Deserialize, ToSchema)]
pub struct ModuleGrantRequest {
    pub entitled: bool,
}

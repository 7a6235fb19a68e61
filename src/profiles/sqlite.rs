use std::collections::BTreeMap;

use async_trait::async_trait;
use chrono::Utc;
use sqlx::SqlitePool;
use uuid::Uuid;

use crate::authz::{ModuleId, PrincipalId, ProfileRecord, Role};
use crate::db::row_parsers::{db_profile_from_row, encode_active_modules};
use crate::models::profile::{Profile, ProfileUpsertRequest};

use super::{ProfileLookupError, ProfileStore};

const PROFILE_COLUMNS: &str =
    "user_id, full_name, role, status_homologacao, active_modules, created_at, updated_at";

/// State of a row before an administrative write.
#[derive(Debug, Clone, Default)]
pub struct PriorProfile {
    pub existed: bool,
    /// `None` when the row is missing or fails validation.
    pub snapshot: Option<Profile>,
}

/// `profiles` table access: the engine's read path plus administrative writes.
#[derive(Debug, Clone)]
pub struct SqliteProfileStore {
    pool: SqlitePool,
}

impl SqliteProfileStore {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    pub async fn get(&self, user_id: Uuid) -> Result<Option<Profile>, ProfileLookupError> {
        let sql = format!("SELECT {} FROM profiles WHERE user_id = ?", PROFILE_COLUMNS);
        let row = sqlx::query(&sql)
            .bind(user_id.to_string())
            .fetch_optional(&self.pool)
            .await?;

        match row {
            Some(row) => Ok(Some(db_profile_from_row(&row)?.try_into()?)),
            None => Ok(None),
        }
    }

    /// Reads the row ahead of a mutation. A row that fails validation still
    /// counts as existing; store errors are returned.
    pub async fn prior(&self, user_id: Uuid) -> Result<PriorProfile, ProfileLookupError> {
        let sql = format!("SELECT {} FROM profiles WHERE user_id = ?", PROFILE_COLUMNS);
        let Some(row) = sqlx::query(&sql)
            .bind(user_id.to_string())
            .fetch_optional(&self.pool)
            .await?
        else {
            return Ok(PriorProfile::default());
        };

        let snapshot = match db_profile_from_row(&row).and_then(Profile::try_from) {
            Ok(profile) => Some(profile),
            Err(err) => {
                tracing::warn!(user_id = %user_id, error = %err, "existing profile row is malformed");
                None
            }
        };

        Ok(PriorProfile { existed: true, snapshot })
    }

    /// Rows that fail validation are skipped with a warning so one bad row
    /// does not hide the rest from administrators.
    pub async fn list(&self) -> Result<Vec<Profile>, ProfileLookupError> {
        let sql = format!("SELECT {} FROM profiles ORDER BY created_at, user_id", PROFILE_COLUMNS);
        let rows = sqlx::query(&sql).fetch_all(&self.pool).await?;

        let mut profiles = Vec::with_capacity(rows.len());
        for row in &rows {
            match db_profile_from_row(row).and_then(Profile::try_from) {
                Ok(profile) => profiles.push(profile),
                Err(err) => tracing::warn!(error = %err, "skipping malformed profile row"),
            }
        }

        Ok(profiles)
    }

    pub async fn upsert(&self, user_id: Uuid, req: &ProfileUpsertRequest) -> Result<Profile, ProfileLookupError> {
        let now = Utc::now();

        sqlx::query(
            "INSERT INTO profiles (user_id, full_name, role, status_homologacao, active_modules, created_at, updated_at) \
             VALUES (?, ?, ?, ?, ?, ?, ?) \
             ON CONFLICT(user_id) DO UPDATE SET \
               full_name = excluded.full_name, \
               role = excluded.role, \
               status_homologacao = excluded.status_homologacao, \
               active_modules = excluded.active_modules, \
               updated_at = excluded.updated_at",
        )
        .bind(user_id.to_string())
        .bind(&req.full_name)
        .bind(req.role.as_str())
        .bind(req.approved)
        .bind(encode_active_modules(&req.active_modules))
        .bind(now)
        .bind(now)
        .execute(&self.pool)
        .await?;

        self.get(user_id)
            .await?
            .ok_or_else(|| ProfileLookupError::malformed("profile vanished after upsert"))
    }

    pub async fn set_role(&self, user_id: Uuid, role: Role) -> Result<Option<Profile>, ProfileLookupError> {
        let result = sqlx::query("UPDATE profiles SET role = ?, updated_at = ? WHERE user_id = ?")
            .bind(role.as_str())
            .bind(Utc::now())
            .bind(user_id.to_string())
            .execute(&self.pool)
            .await?;

        if result.rows_affected() == 0 {
            return Ok(None);
        }
        self.get(user_id).await
    }

    pub async fn set_approved(&self, user_id: Uuid, approved: bool) -> Result<Option<Profile>, ProfileLookupError> {
        let result = sqlx::query("UPDATE profiles SET status_homologacao = ?, updated_at = ? WHERE user_id = ?")
            .bind(approved)
            .bind(Utc::now())
            .bind(user_id.to_string())
            .execute(&self.pool)
            .await?;

        if result.rows_affected() == 0 {
            return Ok(None);
        }
        self.get(user_id).await
    }

    /// Read-modify-write of the module map inside one transaction.
    pub async fn set_module(
        &self,
        user_id: Uuid,
        module: ModuleId,
        entitled: bool,
    ) -> Result<Option<Profile>, ProfileLookupError> {
        let mut tx = self.pool.begin().await?;

        let current: Option<Option<String>> = sqlx::query_scalar("SELECT active_modules FROM profiles WHERE user_id = ?")
            .bind(user_id.to_string())
            .fetch_optional(&mut *tx)
            .await?;

        let Some(current) = current else {
            return Ok(None);
        };

        let mut modules: BTreeMap<ModuleId, bool> = match current.as_deref() {
            Some(raw) => crate::db::row_parsers::parse_active_modules(raw)?,
            None => BTreeMap::new(),
        };
        modules.insert(module, entitled);

        sqlx::query("UPDATE profiles SET active_modules = ?, updated_at = ? WHERE user_id = ?")
            .bind(encode_active_modules(&modules))
            .bind(Utc::now())
            .bind(user_id.to_string())
            .execute(&mut *tx)
            .await?;

        tx.commit().await?;
        self.get(user_id).await
    }
}

#[async_trait]
impl ProfileStore for SqliteProfileStore {
    async fn fetch_profile(&self, principal: PrincipalId) -> Result<Option<ProfileRecord>, ProfileLookupError> {
        let sql = "SELECT user_id, NULL AS full_name, role, status_homologacao, active_modules, created_at, updated_at \
                   FROM profiles WHERE user_id = ?";
        let row = sqlx::query(sql)
            .bind(principal.to_string())
            .fetch_optional(&self.pool)
            .await?;

        let Some(row) = row else {
            return Ok(None);
        };

        let profile: Profile = db_profile_from_row(&row)?.try_into()?;
        Ok(Some(profile.record()))
    }
}

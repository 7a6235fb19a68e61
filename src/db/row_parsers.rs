use std::collections::BTreeMap;

use chrono::{DateTime, NaiveDate, NaiveDateTime, TimeZone, Utc};
use serde_json::Value;
use sqlx::sqlite::SqliteRow;
use sqlx::Row;
use uuid::Uuid;

use crate::authz::ModuleId;
use crate::models::profile::DbProfile;
use crate::profiles::ProfileLookupError;

pub fn parse_datetime(s: &str) -> Result<DateTime<Utc>, ProfileLookupError> {
    let s = s.trim();

    // RFC3339 (e.g. 2025-11-19T12:34:56Z)
    if let Ok(dt) = DateTime::parse_from_rfc3339(s) {
        return Ok(dt.with_timezone(&Utc));
    }

    // SQLite CURRENT_TIMESTAMP: "YYYY-MM-DD HH:MM:SS" (optional fractional seconds)
    if let Ok(naive) = NaiveDateTime::parse_from_str(s, "%Y-%m-%d %H:%M:%S%.f") {
        return Ok(Utc.from_utc_datetime(&naive));
    }

    if let Ok(naive_date) = NaiveDate::parse_from_str(s, "%Y-%m-%d") {
        let ndt = naive_date
            .and_hms_opt(0, 0, 0)
            .ok_or_else(|| ProfileLookupError::malformed("invalid datetime: date out of range"))?;
        return Ok(Utc.from_utc_datetime(&ndt));
    }

    Err(ProfileLookupError::malformed(format!("invalid datetime: {}", s)))
}

/// Parses the `active_modules` JSON object.
///
/// Unknown module keys are dropped; any value other than `true` is kept as
/// `false`. Anything but a JSON object is malformed.
pub fn parse_active_modules(raw: &str) -> Result<BTreeMap<ModuleId, bool>, ProfileLookupError> {
    let trimmed = raw.trim();
    if trimmed.is_empty() || trimmed == "null" {
        return Ok(BTreeMap::new());
    }

    let value: Value = serde_json::from_str(trimmed)
        .map_err(|e| ProfileLookupError::malformed(format!("active_modules is not JSON: {}", e)))?;
    let object = value
        .as_object()
        .ok_or_else(|| ProfileLookupError::malformed("active_modules must be a JSON object"))?;

    let mut modules = BTreeMap::new();
    for (key, flag) in object {
        match key.parse::<ModuleId>() {
            Ok(module) => {
                modules.insert(module, flag.as_bool() == Some(true));
            }
            Err(_) => tracing::warn!(module = %key, "ignoring unknown module in active_modules"),
        }
    }

    Ok(modules)
}

pub fn encode_active_modules(modules: &BTreeMap<ModuleId, bool>) -> String {
    let object: serde_json::Map<String, Value> = modules
        .iter()
        .map(|(module, flag)| (module.as_str().to_string(), Value::Bool(*flag)))
        .collect();
    Value::Object(object).to_string()
}

pub fn db_profile_from_row(row: &SqliteRow) -> Result<DbProfile, ProfileLookupError> {
    let user_id_s: String = row.try_get("user_id")?;
    let full_name: Option<String> = row.try_get("full_name")?;
    let role: Option<String> = row.try_get("role")?;
    let status_homologacao: Option<bool> = row.try_get("status_homologacao")?;
    let active_modules: Option<String> = row.try_get("active_modules")?;
    let created_at_s: String = row.try_get("created_at")?;
    let updated_at_s: String = row.try_get("updated_at")?;

    let user_id = Uuid::parse_str(&user_id_s)
        .map_err(|e| ProfileLookupError::malformed(format!("invalid uuid: {}", e)))?;

    Ok(DbProfile {
        user_id,
        full_name,
        role,
        status_homologacao,
        active_modules,
        created_at: parse_datetime(&created_at_s)?,
        updated_at: parse_datetime(&updated_at_s)?,
    })
}

//! Profile administration.
//!
//! Every endpoint is gated by the `/admin` catalogue policy. Each mutation is
//! written to the activity log with Critical severity.

use axum::{
    extract::{Path, State},
    http::HeaderMap,
    routing::{get, put},
    Json, Router,
};
use uuid::Uuid;

use crate::app::AppState;
use crate::authz::{catalog, ModuleId, PrincipalId};
use crate::errors::{AppError, AppResult};
use crate::events::{log_activity_with_context, RequestContext};
use crate::models::profile::{
    ApprovalUpdateRequest, ModuleGrantRequest, Profile, ProfileUpsertRequest, RoleUpdateRequest,
};
use crate::routes::access::require_access;

const ADMIN_PATH: &str = "/admin";

pub fn routes() -> Router<AppState> {
    Router::new()
        .route("/profiles", get(list_profiles))
        .route("/profiles/:user_id", put(upsert_profile))
        .route("/profiles/:user_id/role", put(update_role))
        .route("/profiles/:user_id/approval", put(update_approval))
        .route("/profiles/:user_id/modules/:module", put(update_module))
}

async fn require_admin(state: &AppState, headers: &HeaderMap) -> AppResult<Option<PrincipalId>> {
    let route = catalog::find(ADMIN_PATH).ok_or_else(|| AppError::configuration("admin route missing from catalogue"))?;
    require_access(state, headers, &route.policy(), ADMIN_PATH).await
}

fn record(state: &AppState, headers: &HeaderMap, action: &str, actor: Option<PrincipalId>, profile: &Profile, old: Option<&Profile>) {
    log_activity_with_context(
        &state.event_bus,
        action,
        actor.map(|p| p.as_uuid()),
        profile,
        old,
        Some(RequestContext::from_headers(headers)),
    );
}

/// List all profiles
#[utoipa::path(
    get,
    path = "/admin/profiles",
    tag = "Admin",
    responses(
        (status = 200, description = "All profiles", body = Vec<Profile>),
        (status = 401, description = "No session", body = AccessResponse),
        (status = 403, description = "Not an administrator", body = AccessResponse),
    ),
    security(("bearerAuth" = []))
)]
pub async fn list_profiles(State(state): State<AppState>, headers: HeaderMap) -> AppResult<Json<Vec<Profile>>> {
    require_admin(&state, &headers).await?;
    Ok(Json(state.profiles.list().await?))
}

/// Create or replace a profile
#[utoipa::path(
    put,
    path = "/admin/profiles/{user_id}",
    tag = "Admin",
    params(("user_id" = Uuid, Path, description = "Profile owner")),
    request_body = ProfileUpsertRequest,
    responses(
        (status = 200, description = "Stored profile", body = Profile),
        (status = 401, description = "No session", body = AccessResponse),
        (status = 403, description = "Not an administrator", body = AccessResponse),
    ),
    security(("bearerAuth" = []))
)]
pub async fn upsert_profile(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(user_id): Path<Uuid>,
    Json(req): Json<ProfileUpsertRequest>,
) -> AppResult<Json<Profile>> {
    let actor = require_admin(&state, &headers).await?;

    let prior = state.profiles.prior(user_id).await?;
    let profile = state.profiles.upsert(user_id, &req).await?;

    let action = if prior.existed { "updated" } else { "created" };
    record(&state, &headers, action, actor, &profile, prior.snapshot.as_ref());
    tracing::info!(user_id = %user_id, action, "profile stored");

    Ok(Json(profile))
}

/// Change a profile's role
#[utoipa::path(
    put,
    path = "/admin/profiles/{user_id}/role",
    tag = "Admin",
    params(("user_id" = Uuid, Path, description = "Profile owner")),
    request_body = RoleUpdateRequest,
    responses(
        (status = 200, description = "Updated profile", body = Profile),
        (status = 403, description = "Not an administrator", body = AccessResponse),
        (status = 404, description = "Profile not found"),
    ),
    security(("bearerAuth" = []))
)]
pub async fn update_role(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(user_id): Path<Uuid>,
    Json(req): Json<RoleUpdateRequest>,
) -> AppResult<Json<Profile>> {
    let actor = require_admin(&state, &headers).await?;

    let prior = state.profiles.prior(user_id).await?;
    let profile = state
        .profiles
        .set_role(user_id, req.role)
        .await?
        .ok_or_else(|| AppError::not_found("profile not found"))?;

    record(&state, &headers, "role_changed", actor, &profile, prior.snapshot.as_ref());
    tracing::info!(user_id = %user_id, role = %req.role, "profile role changed");

    Ok(Json(profile))
}

/// Approve or revoke approval of a profile
#[utoipa::path(
    put,
    path = "/admin/profiles/{user_id}/approval",
    tag = "Admin",
    params(("user_id" = Uuid, Path, description = "Profile owner")),
    request_body = ApprovalUpdateRequest,
    responses(
        (status = 200, description = "Updated profile", body = Profile),
        (status = 403, description = "Not an administrator", body = AccessResponse),
        (status = 404, description = "Profile not found"),
    ),
    security(("bearerAuth" = []))
)]
pub async fn update_approval(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(user_id): Path<Uuid>,
    Json(req): Json<ApprovalUpdateRequest>,
) -> AppResult<Json<Profile>> {
    let actor = require_admin(&state, &headers).await?;

    let prior = state.profiles.prior(user_id).await?;
    let profile = state
        .profiles
        .set_approved(user_id, req.approved)
        .await?
        .ok_or_else(|| AppError::not_found("profile not found"))?;

    record(&state, &headers, "approval_changed", actor, &profile, prior.snapshot.as_ref());
    tracing::info!(user_id = %user_id, approved = req.approved, "profile approval changed");

    Ok(Json(profile))
}

/// Grant or withdraw a module entitlement
#[utoipa::path(
    put,
    path = "/admin/profiles/{user_id}/modules/{module}",
    tag = "Admin",
    params(
        ("user_id" = Uuid, Path, description = "Profile owner"),
        ("module" = ModuleId, Path, description = "Module key"),
    ),
    request_body = ModuleGrantRequest,
    responses(
        (status = 200, description = "Updated profile", body = Profile),
        (status = 403, description = "Not an administrator", body = AccessResponse),
        (status = 404, description = "Profile not found"),
    ),
    security(("bearerAuth" = []))
)]
pub async fn update_module(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path((user_id, module)): Path<(Uuid, ModuleId)>,
    Json(req): Json<ModuleGrantRequest>,
) -> AppResult<Json<Profile>> {
    let actor = require_admin(&state, &headers).await?;

    let prior = state.profiles.prior(user_id).await?;
    let profile = state
        .profiles
        .set_module(user_id, module, req.entitled)
        .await?
        .ok_or_else(|| AppError::not_found("profile not found"))?;

    record(&state, &headers, "module_changed", actor, &profile, prior.snapshot.as_ref());
    tracing::info!(user_id = %user_id, module = %module, entitled = req.entitled, "profile module changed");

    Ok(Json(profile))
}

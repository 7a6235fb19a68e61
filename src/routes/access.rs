//! Access resolution endpoints.
//!
//! Every request builds its own [`AccessEngine`] over the bearer session, so
//! requests never supersede each other.

use std::sync::Arc;

use axum::{extract::State, http::HeaderMap, routing::{get, post}, Json, Router};

use crate::app::AppState;
use crate::authz::{catalog, navigation, AccessDecision, AccessEngine, PrincipalId, ResourcePolicy};
use crate::errors::{AppError, AppResult};
use crate::models::access::{
    AccessCheckRequest, AccessResponse, NavEntryResponse, NavigationResponse, PolicyEvaluateRequest,
};
use crate::notify::ChannelNotifier;
use crate::profiles::ProfileLookupError;
use crate::session::BearerSessionStore;

pub fn routes() -> Router<AppState> {
    Router::new()
        .route("/check", post(check_route))
        .route("/evaluate", post(evaluate_policy))
        .route("/navigation", get(navigation))
}

/// Evaluates `policy` for the session carried by `headers`.
pub(crate) async fn evaluate_request(
    state: &AppState,
    headers: &HeaderMap,
    policy: &ResourcePolicy,
    requested_path: &str,
) -> AppResult<(AccessDecision, AccessResponse)> {
    let sessions = Arc::new(BearerSessionStore::from_headers(state.jwt.clone(), headers));
    let (notifier, mut notifications) = ChannelNotifier::new();
    let engine = AccessEngine::new(sessions, state.profiles.clone(), Arc::new(notifier));

    let decision = engine
        .evaluate(policy, requested_path)
        .await
        .ok_or_else(|| AppError::internal("access evaluation abandoned"))?;

    let response = AccessResponse::new(&decision, notifications.try_recv().ok(), &state.redirects);
    Ok((decision, response))
}

/// Like [`evaluate_request`], but a denial becomes the error response.
/// Returns the admitted principal, if the policy resolved one.
pub(crate) async fn require_access(
    state: &AppState,
    headers: &HeaderMap,
    policy: &ResourcePolicy,
    requested_path: &str,
) -> AppResult<Option<PrincipalId>> {
    let (decision, response) = evaluate_request(state, headers, policy, requested_path).await?;
    if !decision.is_allowed() {
        return Err(AppError::access_denied(response));
    }
    Ok(decision.principal)
}

fn settle(decision: AccessDecision, response: AccessResponse) -> AppResult<Json<AccessResponse>> {
    if decision.is_allowed() {
        Ok(Json(response))
    } else {
        Err(AppError::access_denied(response))
    }
}

/// Check access to a protected application path
#[utoipa::path(
    post,
    path = "/access/check",
    tag = "Access",
    request_body = AccessCheckRequest,
    responses(
        (status = 200, description = "Access allowed", body = AccessResponse),
        (status = 401, description = "No session; redirect to login", body = AccessResponse),
        (status = 403, description = "Access denied", body = AccessResponse),
        (status = 404, description = "Path is not a protected resource"),
    ),
    security(("bearerAuth" = []))
)]
pub async fn check_route(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(req): Json<AccessCheckRequest>,
) -> AppResult<Json<AccessResponse>> {
    let route = catalog::find(&req.path)
        .ok_or_else(|| AppError::not_found(format!("{} is not a protected resource", req.path)))?;

    let (decision, response) = evaluate_request(&state, &headers, &route.policy(), &req.path).await?;
    tracing::info!(path = %route.path, verdict = ?decision.verdict, "access check");
    settle(decision, response)
}

/// Evaluate an explicit resource policy
#[utoipa::path(
    post,
    path = "/access/evaluate",
    tag = "Access",
    request_body = PolicyEvaluateRequest,
    responses(
        (status = 200, description = "Access allowed", body = AccessResponse),
        (status = 401, description = "No session; redirect to login", body = AccessResponse),
        (status = 403, description = "Access denied", body = AccessResponse),
    ),
    security(("bearerAuth" = []))
)]
pub async fn evaluate_policy(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(req): Json<PolicyEvaluateRequest>,
) -> AppResult<Json<AccessResponse>> {
    let policy = ResourcePolicy::from(req.policy);
    let (decision, response) = evaluate_request(&state, &headers, &policy, &req.path).await?;
    settle(decision, response)
}

/// Dashboard entries visible to the caller's role
#[utoipa::path(
    get,
    path = "/access/navigation",
    tag = "Access",
    responses(
        (status = 200, description = "Visible dashboard entries", body = NavigationResponse),
        (status = 401, description = "No session", body = AccessResponse),
        (status = 404, description = "No profile for this session"),
    ),
    security(("bearerAuth" = []))
)]
pub async fn navigation(State(state): State<AppState>, headers: HeaderMap) -> AppResult<Json<NavigationResponse>> {
    let principal = require_access(&state, &headers, &ResourcePolicy::authenticated(), "/dashboard")
        .await?
        .ok_or_else(|| AppError::unauthorized("no session"))?;

    let profile = match state.profiles.get(principal.as_uuid()).await {
        Ok(Some(profile)) => profile,
        Ok(None) => return Err(AppError::not_found("profile not found")),
        Err(ProfileLookupError::Malformed(reason)) => {
            tracing::warn!(user_id = %principal, reason = %reason, "malformed profile behind navigation");
            return Err(AppError::not_found("profile not found"));
        }
        Err(err) => return Err(err.into()),
    };

    let entries = navigation::visible_entries(profile.role)
        .into_iter()
        .map(NavEntryResponse::from)
        .collect();

    Ok(Json(NavigationResponse { role: profile.role, entries }))
}

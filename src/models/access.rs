use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

use crate::authz::navigation::NavEntry;
use crate::authz::{AccessDecision, ModuleId, RedirectPaths, RedirectTarget, ResourcePolicy, Role, Verdict};
use crate::notify::Notification;

#[derive(Debug, Deserialize, ToSchema)]
pub struct AccessCheckRequest {
    #[schema(example = "/auditoria")]
    pub path: String,
}

#[derive(Debug, Clone, Default, Deserialize, ToSchema)]
pub struct PolicyRequest {
    pub allowed_roles: Option<Vec<Role>>,
    pub required_module: Option<ModuleId>,
}

impl From<PolicyRequest> for ResourcePolicy {
    fn from(value: PolicyRequest) -> Self {
        let policy = ResourcePolicy::roles(value.allowed_roles.unwrap_or_default());
        match value.required_module {
            Some(module) => policy.with_module(module),
            None => policy,
        }
    }
}

#[derive(Debug, Deserialize, ToSchema)]
pub struct PolicyEvaluateRequest {
    #[schema(example = "/riscos")]
    pub path: String,
    #[serde(default)]
    pub policy: PolicyRequest,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, ToSchema)]
pub struct RedirectResponse {
    /// One of `login`, `dashboard`, `upgrade`.
    #[schema(example = "login")]
    pub target: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub return_to: Option<String>,
    #[schema(example = "/auth?redirect_to=%2Fauditoria")]
    pub location: String,
}

impl RedirectResponse {
    pub fn new(target: &RedirectTarget, paths: &RedirectPaths) -> Self {
        let return_to = match target {
            RedirectTarget::Login { return_to } => Some(return_to.clone()),
            _ => None,
        };
        Self {
            target: target.name().to_string(),
            return_to,
            location: paths.location(target),
        }
    }
}

#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct AccessResponse {
    pub verdict: Verdict,
    pub allowed: bool,
    pub redirect: Option<RedirectResponse>,
    pub notification: Option<Notification>,
}

impl AccessResponse {
    pub fn new(decision: &AccessDecision, notification: Option<Notification>, paths: &RedirectPaths) -> Self {
        Self {
            verdict: decision.verdict,
            allowed: decision.is_allowed(),
            redirect: decision.redirect.as_ref().map(|target| RedirectResponse::new(target, paths)),
            notification,
        }
    }
}

#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct NavEntryResponse {
    pub title: String,
    pub path: Option<String>,
}

impl From<NavEntry> for NavEntryResponse {
    fn from(entry: NavEntry) -> Self {
        Self {
            title: entry.title.to_string(),
            path: entry.path.map(str::to_string),
        }
    }
}

#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct NavigationResponse {
    pub role: Role,
    pub entries: Vec<NavEntryResponse>,
}

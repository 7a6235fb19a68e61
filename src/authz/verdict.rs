use serde::Serialize;
use utoipa::ToSchema;

use crate::notify::NotificationCategory;

use super::model::PrincipalId;

/// Terminal outcome of one evaluation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, ToSchema)]
#[serde(rename_all = "snake_case")]
pub enum Verdict {
    Allow,
    DenyNoSession,
    DenyNotApproved,
    DenyRoleMismatch,
    DenyModuleNotEntitled,
    DenyLookupFailed,
}

impl Verdict {
    pub fn is_allow(&self) -> bool {
        matches!(self, Verdict::Allow)
    }

    /// Where a denied visitor is sent. `None` means render the resource.
    pub fn redirect(&self, requested_path: &str) -> Option<RedirectTarget> {
        match self {
            Verdict::Allow => None,
            Verdict::DenyNoSession => Some(RedirectTarget::Login {
                return_to: requested_path.to_string(),
            }),
            Verdict::DenyNotApproved | Verdict::DenyRoleMismatch | Verdict::DenyLookupFailed => {
                Some(RedirectTarget::Dashboard)
            }
            Verdict::DenyModuleNotEntitled => Some(RedirectTarget::Upgrade),
        }
    }

    /// Missing session redirects silently.
    pub fn notification(&self) -> Option<NotificationCategory> {
        match self {
            Verdict::Allow | Verdict::DenyNoSession => None,
            Verdict::DenyRoleMismatch | Verdict::DenyLookupFailed => Some(NotificationCategory::AccessDenied),
            Verdict::DenyNotApproved => Some(NotificationCategory::AwaitingApproval),
            Verdict::DenyModuleNotEntitled => Some(NotificationCategory::ModuleNotPurchased),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "target", rename_all = "snake_case")]
pub enum RedirectTarget {
    /// Login page; `return_to` is where the visitor goes after signing in.
    Login { return_to: String },
    Dashboard,
    Upgrade,
}

impl RedirectTarget {
    pub fn name(&self) -> &'static str {
        match self {
            RedirectTarget::Login { .. } => "login",
            RedirectTarget::Dashboard => "dashboard",
            RedirectTarget::Upgrade => "upgrade",
        }
    }
}

/// Concrete locations for each redirect target.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RedirectPaths {
    pub login: String,
    pub dashboard: String,
    pub upgrade: String,
}

impl Default for RedirectPaths {
    fn default() -> Self {
        Self {
            login: "/auth".to_string(),
            dashboard: "/dashboard".to_string(),
            upgrade: "/upgrade".to_string(),
        }
    }
}

impl RedirectPaths {
    pub fn from_env() -> Self {
        let defaults = Self::default();
        let var = |key: &str, fallback: String| {
            std::env::var(key)
                .ok()
                .filter(|value| !value.trim().is_empty())
                .unwrap_or(fallback)
        };

        Self {
            login: var("AUTH_LOGIN_PATH", defaults.login),
            dashboard: var("AUTH_DASHBOARD_PATH", defaults.dashboard),
            upgrade: var("AUTH_UPGRADE_PATH", defaults.upgrade),
        }
    }

    pub fn location(&self, target: &RedirectTarget) -> String {
        match target {
            RedirectTarget::Login { return_to } if return_to.is_empty() => self.login.clone(),
            RedirectTarget::Login { return_to } => {
                let separator = if self.login.contains('?') { '&' } else { '?' };
                format!("{}{}redirect_to={}", self.login, separator, urlencoding::encode(return_to))
            }
            RedirectTarget::Dashboard => self.dashboard.clone(),
            RedirectTarget::Upgrade => self.upgrade.clone(),
        }
    }
}

/// Verdict plus redirect for a single settled evaluation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AccessDecision {
    pub verdict: Verdict,
    pub redirect: Option<RedirectTarget>,
    /// Present whenever a session was resolved, including denials past the session check.
    pub principal: Option<PrincipalId>,
}

impl AccessDecision {
    pub fn new(verdict: Verdict, requested_path: &str, principal: Option<PrincipalId>) -> Self {
        Self {
            verdict,
            redirect: verdict.redirect(requested_path),
            principal,
        }
    }

    pub fn is_allowed(&self) -> bool {
        self.verdict.is_allow()
    }
}

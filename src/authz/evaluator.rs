use super::model::{ProfileRecord, ResourcePolicy};
use super::verdict::Verdict;

/// Layered policy evaluation over a fetched profile.
///
/// Evaluation order (first match wins):
/// 1. master role -> allow, even when unapproved
/// 2. not approved -> deny
/// 3. role outside `allowed_roles` -> deny
/// 4. required module not entitled -> deny
/// 5. allow
///
/// Session and profile lookups happen before this point; see `AccessEngine`.
#[derive(Debug, Clone, Copy, Default)]
pub struct DefaultPolicyEvaluator;

impl DefaultPolicyEvaluator {
    pub fn new() -> Self {
        Self
    }

    pub fn decide(&self, policy: &ResourcePolicy, profile: &ProfileRecord) -> Verdict {
        if profile.role.is_master() {
            tracing::debug!(role = %profile.role, "master bypass");
            return Verdict::Allow;
        }

        if !profile.approved {
            tracing::debug!(role = %profile.role, "profile awaiting approval");
            return Verdict::DenyNotApproved;
        }

        if !policy.permits_role(profile.role) {
            tracing::debug!(role = %profile.role, "role not allowed");
            return Verdict::DenyRoleMismatch;
        }

        if let Some(module) = policy.required_module {
            if !profile.is_entitled(module) {
                tracing::debug!(role = %profile.role, module = %module, "module not entitled");
                return Verdict::DenyModuleNotEntitled;
            }
        }

        Verdict::Allow
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::authz::model::{ModuleId, Role};

    fn decide(policy: &ResourcePolicy, profile: &ProfileRecord) -> Verdict {
        DefaultPolicyEvaluator::new().decide(policy, profile)
    }

    #[test]
    fn master_bypasses_everything() {
        let policy = ResourcePolicy::roles([Role::Auditor]).with_module(ModuleId::GestaoRiscos);
        let unapproved_master = ProfileRecord::new(Role::Master);

        assert_eq!(decide(&policy, &unapproved_master), Verdict::Allow);
        assert_eq!(decide(&ResourcePolicy::module(ModuleId::Nps), &unapproved_master), Verdict::Allow);
    }

    #[test]
    fn approval_is_checked_before_role_and_module() {
        let policy = ResourcePolicy::roles([Role::Proprietario]).with_module(ModuleId::GestaoRiscos);
        let profile = ProfileRecord::new(Role::Proprietario)
            .approved(false)
            .with_module(ModuleId::GestaoRiscos, true);

        assert_eq!(decide(&policy, &profile), Verdict::DenyNotApproved);
    }

    #[test]
    fn role_membership() {
        let policy = ResourcePolicy::roles([Role::Auditor, Role::TotalQualityIso]);

        let empresa = ProfileRecord::new(Role::Empresa).approved(true);
        let auditor = ProfileRecord::new(Role::Auditor).approved(true);

        assert_eq!(decide(&policy, &empresa), Verdict::DenyRoleMismatch);
        assert_eq!(decide(&policy, &auditor), Verdict::Allow);
    }

    #[test]
    fn module_entitlement() {
        let policy = ResourcePolicy::roles([Role::Master, Role::Proprietario]).with_module(ModuleId::GestaoRiscos);

        let without = ProfileRecord::new(Role::Proprietario)
            .approved(true)
            .with_module(ModuleId::GestaoRiscos, false);
        let with = without.clone().with_module(ModuleId::GestaoRiscos, true);

        assert_eq!(decide(&policy, &without), Verdict::DenyModuleNotEntitled);
        assert_eq!(decide(&policy, &with), Verdict::Allow);
    }

    #[test]
    fn role_mismatch_wins_over_missing_module() {
        let policy = ResourcePolicy::roles([Role::Proprietario]).with_module(ModuleId::Manutencao);
        let profile = ProfileRecord::new(Role::Treinador).approved(true);

        assert_eq!(decide(&policy, &profile), Verdict::DenyRoleMismatch);
    }

    #[test]
    fn module_only_policy_ignores_role() {
        let policy = ResourcePolicy::module(ModuleId::Nps);
        let profile = ProfileRecord::new(Role::Recepcionista)
            .approved(true)
            .with_module(ModuleId::Nps, true);

        assert_eq!(decide(&policy, &profile), Verdict::Allow);
    }
}

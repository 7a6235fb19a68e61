use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use crate::notify::{Notification, Notifier};
use crate::profiles::ProfileStore;
use crate::session::{IdentityResolver, SessionStore};

use super::evaluator::DefaultPolicyEvaluator;
use super::model::{PrincipalId, ResourcePolicy};
use super::verdict::{AccessDecision, Verdict};

/// Generation marker minted at the start of each evaluation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct EvaluationToken(u64);

/// Access control resolution for one caller context (a view, a request).
///
/// Each [`evaluate`](Self::evaluate) supersedes any evaluation still in
/// flight on the same engine (or its clones): only the most recent call can
/// settle. [`cancel`](Self::cancel) abandons the pending one without starting
/// a new one. Dropping the `evaluate` future also abandons it.
#[derive(Clone)]
pub struct AccessEngine {
    identity: IdentityResolver,
    profiles: Arc<dyn ProfileStore>,
    notifier: Arc<dyn Notifier>,
    evaluator: DefaultPolicyEvaluator,
    generation: Arc<AtomicU64>,
}

impl AccessEngine {
    pub fn new(
        sessions: Arc<dyn SessionStore>,
        profiles: Arc<dyn ProfileStore>,
        notifier: Arc<dyn Notifier>,
    ) -> Self {
        Self {
            identity: IdentityResolver::new(sessions),
            profiles,
            notifier,
            evaluator: DefaultPolicyEvaluator::new(),
            generation: Arc::new(AtomicU64::new(0)),
        }
    }

    fn mint(&self) -> EvaluationToken {
        EvaluationToken(self.generation.fetch_add(1, Ordering::SeqCst) + 1)
    }

    fn is_current(&self, token: EvaluationToken) -> bool {
        self.generation.load(Ordering::SeqCst) == token.0
    }

    /// Marks the pending evaluation, if any, as abandoned.
    pub fn cancel(&self) {
        self.generation.fetch_add(1, Ordering::SeqCst);
    }

    /// Resolves the verdict for `policy`. `requested_path` becomes the
    /// return path of a login redirect.
    ///
    /// Returns `None` when the evaluation was superseded or cancelled before
    /// it settled; nothing is notified in that case.
    pub async fn evaluate(&self, policy: &ResourcePolicy, requested_path: &str) -> Option<AccessDecision> {
        let token = self.mint();

        let Some(principal) = self.identity.resolve_session().await else {
            return self.settle(token, AccessDecision::new(Verdict::DenyNoSession, requested_path, None));
        };

        if !self.is_current(token) {
            tracing::debug!(path = %requested_path, "evaluation superseded during session lookup");
            return None;
        }

        if !policy.requires_profile() {
            return self.settle(token, AccessDecision::new(Verdict::Allow, requested_path, Some(principal)));
        }

        let verdict = self.verdict_for(principal, policy).await;
        self.settle(token, AccessDecision::new(verdict, requested_path, Some(principal)))
    }

    async fn verdict_for(&self, principal: PrincipalId, policy: &ResourcePolicy) -> Verdict {
        match self.profiles.fetch_profile(principal).await {
            Ok(Some(profile)) => self.evaluator.decide(policy, &profile),
            Ok(None) => {
                tracing::warn!(user_id = %principal, "no profile for principal");
                Verdict::DenyLookupFailed
            }
            Err(err) => {
                tracing::warn!(user_id = %principal, error = %err, "profile lookup failed");
                Verdict::DenyLookupFailed
            }
        }
    }

    fn settle(&self, token: EvaluationToken, decision: AccessDecision) -> Option<AccessDecision> {
        if !self.is_current(token) {
            tracing::debug!(verdict = ?decision.verdict, "discarding stale evaluation");
            return None;
        }

        if let Some(category) = decision.verdict.notification() {
            self.notifier.notify(Notification::from(category));
        }

        tracing::debug!(
            verdict = ?decision.verdict,
            user_id = ?decision.principal.map(|p| p.to_string()),
            "access evaluated"
        );
        Some(decision)
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;
    use std::sync::atomic::{AtomicBool, AtomicUsize};
    use std::sync::Mutex;
    use std::time::Duration;

    use async_trait::async_trait;
    use tokio::sync::Notify;
    use uuid::Uuid;

    use super::*;
    use crate::authz::model::{ModuleId, ProfileRecord, Role};
    use crate::authz::verdict::RedirectTarget;
    use crate::notify::NotificationCategory;
    use crate::profiles::ProfileLookupError;
    use crate::session::{FixedSessionStore, SessionError};

    #[derive(Default)]
    struct MemoryProfiles {
        profiles: HashMap<PrincipalId, ProfileRecord>,
        fail: bool,
        fetches: AtomicUsize,
    }

    impl MemoryProfiles {
        fn with(principal: PrincipalId, profile: ProfileRecord) -> Self {
            let mut profiles = HashMap::new();
            profiles.insert(principal, profile);
            Self { profiles, ..Default::default() }
        }

        fn failing() -> Self {
            Self { fail: true, ..Default::default() }
        }
    }

    #[async_trait]
    impl ProfileStore for MemoryProfiles {
        async fn fetch_profile(&self, principal: PrincipalId) -> Result<Option<ProfileRecord>, ProfileLookupError> {
            self.fetches.fetch_add(1, Ordering::SeqCst);
            if self.fail {
                return Err(ProfileLookupError::Store(sqlx::Error::PoolTimedOut));
            }
            Ok(self.profiles.get(&principal).cloned())
        }
    }

    /// Holds the first fetch until released; later fetches pass straight through.
    struct GatedProfiles {
        profile: ProfileRecord,
        held: AtomicBool,
        entered: Arc<Notify>,
        release: Arc<Notify>,
    }

    #[async_trait]
    impl ProfileStore for GatedProfiles {
        async fn fetch_profile(&self, _principal: PrincipalId) -> Result<Option<ProfileRecord>, ProfileLookupError> {
            if !self.held.swap(true, Ordering::SeqCst) {
                self.entered.notify_one();
                self.release.notified().await;
            }
            Ok(Some(self.profile.clone()))
        }
    }

    /// Holds the first session lookup until released.
    struct GatedSessions {
        principal: PrincipalId,
        held: AtomicBool,
        entered: Arc<Notify>,
        release: Arc<Notify>,
    }

    #[async_trait]
    impl SessionStore for GatedSessions {
        async fn current_session(&self) -> Result<Option<PrincipalId>, SessionError> {
            if !self.held.swap(true, Ordering::SeqCst) {
                self.entered.notify_one();
                self.release.notified().await;
            }
            Ok(Some(self.principal))
        }
    }

    struct BrokenSessions;

    #[async_trait]
    impl SessionStore for BrokenSessions {
        async fn current_session(&self) -> Result<Option<PrincipalId>, SessionError> {
            Err(SessionError::Unavailable("timeout".into()))
        }
    }

    #[derive(Default)]
    struct RecordingNotifier(Mutex<Vec<Notification>>);

    impl RecordingNotifier {
        fn categories(&self) -> Vec<NotificationCategory> {
            self.0.lock().unwrap().iter().map(|n| n.category).collect()
        }
    }

    impl Notifier for RecordingNotifier {
        fn notify(&self, notification: Notification) {
            self.0.lock().unwrap().push(notification);
        }
    }

    fn principal() -> PrincipalId {
        PrincipalId(Uuid::new_v4())
    }

    fn engine(
        session: Option<PrincipalId>,
        profiles: Arc<dyn ProfileStore>,
    ) -> (AccessEngine, Arc<RecordingNotifier>) {
        let notifier = Arc::new(RecordingNotifier::default());
        let engine = AccessEngine::new(Arc::new(FixedSessionStore(session)), profiles, notifier.clone());
        (engine, notifier)
    }

    fn all_policies() -> Vec<ResourcePolicy> {
        vec![
            ResourcePolicy::authenticated(),
            ResourcePolicy::roles([Role::Master]),
            ResourcePolicy::roles([Role::Auditor, Role::TotalQualityIso]),
            ResourcePolicy::module(ModuleId::Nps),
            ResourcePolicy::roles([Role::Master, Role::Proprietario]).with_module(ModuleId::GestaoRiscos),
        ]
    }

    #[tokio::test]
    async fn session_only_policy_skips_profile_fetch() {
        let id = principal();
        let profiles = Arc::new(MemoryProfiles::default());
        let (engine, notifier) = engine(Some(id), profiles.clone());

        let decision = engine.evaluate(&ResourcePolicy::authenticated(), "/dashboard").await.unwrap();

        assert_eq!(decision.verdict, Verdict::Allow);
        assert_eq!(decision.redirect, None);
        assert_eq!(decision.principal, Some(id));
        assert_eq!(profiles.fetches.load(Ordering::SeqCst), 0);
        assert!(notifier.categories().is_empty());
    }

    #[tokio::test]
    async fn no_session_denies_every_policy_silently() {
        let profiles = Arc::new(MemoryProfiles::default());
        let (engine, notifier) = engine(None, profiles.clone());

        for policy in all_policies() {
            let decision = engine.evaluate(&policy, "/riscos").await.unwrap();
            assert_eq!(decision.verdict, Verdict::DenyNoSession);
            assert_eq!(
                decision.redirect,
                Some(RedirectTarget::Login { return_to: "/riscos".into() })
            );
        }
        assert_eq!(profiles.fetches.load(Ordering::SeqCst), 0);
        assert!(notifier.categories().is_empty());
    }

    #[tokio::test]
    async fn broken_session_store_is_no_session() {
        let notifier = Arc::new(RecordingNotifier::default());
        let engine = AccessEngine::new(Arc::new(BrokenSessions), Arc::new(MemoryProfiles::default()), notifier);

        let decision = engine.evaluate(&ResourcePolicy::authenticated(), "/dashboard").await.unwrap();
        assert_eq!(decision.verdict, Verdict::DenyNoSession);
    }

    #[tokio::test]
    async fn master_allowed_for_every_policy() {
        let id = principal();
        let profiles = Arc::new(MemoryProfiles::with(id, ProfileRecord::new(Role::Master).approved(false)));
        let (engine, notifier) = engine(Some(id), profiles);

        for policy in all_policies() {
            let decision = engine.evaluate(&policy, "/admin").await.unwrap();
            assert_eq!(decision.verdict, Verdict::Allow, "policy {:?}", policy);
        }
        assert!(notifier.categories().is_empty());
    }

    #[tokio::test]
    async fn missing_profile_and_store_error_collapse_to_lookup_failed() {
        let id = principal();
        let policy = ResourcePolicy::roles([Role::Auditor]);

        let (engine_missing, notifier_missing) = engine(Some(id), Arc::new(MemoryProfiles::default()));
        let (engine_error, notifier_error) = engine(Some(id), Arc::new(MemoryProfiles::failing()));

        for (engine, notifier) in [(engine_missing, notifier_missing), (engine_error, notifier_error)] {
            let decision = engine.evaluate(&policy, "/auditoria").await.unwrap();
            assert_eq!(decision.verdict, Verdict::DenyLookupFailed);
            assert_eq!(decision.redirect, Some(RedirectTarget::Dashboard));
            assert_eq!(notifier.categories(), vec![NotificationCategory::AccessDenied]);
        }
    }

    #[tokio::test]
    async fn one_notification_per_denial() {
        let id = principal();
        let profile = ProfileRecord::new(Role::Proprietario)
            .approved(true)
            .with_module(ModuleId::GestaoRiscos, false);
        let (engine, notifier) = engine(Some(id), Arc::new(MemoryProfiles::with(id, profile)));

        let policy = ResourcePolicy::roles([Role::Master, Role::Proprietario]).with_module(ModuleId::GestaoRiscos);
        let decision = engine.evaluate(&policy, "/riscos").await.unwrap();
        assert_eq!(decision.verdict, Verdict::DenyModuleNotEntitled);
        assert_eq!(decision.redirect, Some(RedirectTarget::Upgrade));

        let decision = engine.evaluate(&ResourcePolicy::roles([Role::Auditor]), "/auditoria").await.unwrap();
        assert_eq!(decision.verdict, Verdict::DenyRoleMismatch);

        assert_eq!(
            notifier.categories(),
            vec![NotificationCategory::ModuleNotPurchased, NotificationCategory::AccessDenied]
        );
    }

    #[tokio::test]
    async fn unapproved_principal_on_session_only_resource_is_allowed() {
        let id = principal();
        let profiles = Arc::new(MemoryProfiles::with(id, ProfileRecord::new(Role::Empresa).approved(false)));
        let (engine, _) = engine(Some(id), profiles.clone());

        let decision = engine.evaluate(&ResourcePolicy::authenticated(), "/dashboard").await.unwrap();
        assert_eq!(decision.verdict, Verdict::Allow);

        let decision = engine.evaluate(&ResourcePolicy::roles([Role::Empresa]), "/documentos").await.unwrap();
        assert_eq!(decision.verdict, Verdict::DenyNotApproved);
        assert_eq!(decision.redirect, Some(RedirectTarget::Dashboard));
    }

    #[tokio::test]
    async fn repeated_evaluation_is_deterministic() {
        let id = principal();
        let profile = ProfileRecord::new(Role::Empresa).approved(true);
        let (engine, _) = engine(Some(id), Arc::new(MemoryProfiles::with(id, profile)));
        let policy = ResourcePolicy::roles([Role::Auditor, Role::TotalQualityIso]);

        let first = engine.evaluate(&policy, "/auditoria").await;
        for _ in 0..5 {
            assert_eq!(engine.evaluate(&policy, "/auditoria").await, first);
        }
    }

    #[tokio::test]
    async fn superseded_evaluation_never_settles() {
        let id = principal();
        let entered = Arc::new(Notify::new());
        let release = Arc::new(Notify::new());
        let profiles = Arc::new(GatedProfiles {
            profile: ProfileRecord::new(Role::Master),
            held: AtomicBool::new(false),
            entered: entered.clone(),
            release: release.clone(),
        });
        let (engine, notifier) = engine(Some(id), profiles);

        // first evaluation would allow, but is still waiting on the profile
        let first = {
            let engine = engine.clone();
            tokio::spawn(async move { engine.evaluate(&ResourcePolicy::roles([Role::Auditor]), "/auditoria").await })
        };
        entered.notified().await;

        let second = engine.evaluate(&ResourcePolicy::authenticated(), "/dashboard").await;
        assert_eq!(second.map(|d| d.verdict), Some(Verdict::Allow));

        release.notify_one();
        let first = first.await.unwrap();
        assert!(first.is_none(), "stale evaluation surfaced: {:?}", first);
        assert!(notifier.categories().is_empty());
    }

    #[tokio::test]
    async fn superseded_denial_is_not_notified() {
        let id = principal();
        let entered = Arc::new(Notify::new());
        let release = Arc::new(Notify::new());
        let profiles = Arc::new(GatedProfiles {
            profile: ProfileRecord::new(Role::Empresa).approved(false),
            held: AtomicBool::new(false),
            entered: entered.clone(),
            release: release.clone(),
        });
        let (engine, notifier) = engine(Some(id), profiles);

        let first = {
            let engine = engine.clone();
            tokio::spawn(async move { engine.evaluate(&ResourcePolicy::roles([Role::Empresa]), "/documentos").await })
        };
        entered.notified().await;

        let second = engine.evaluate(&ResourcePolicy::module(ModuleId::Nps), "/nps").await.unwrap();
        assert_eq!(second.verdict, Verdict::DenyNotApproved);

        release.notify_one();
        assert!(first.await.unwrap().is_none());
        assert_eq!(notifier.categories(), vec![NotificationCategory::AwaitingApproval]);
    }

    #[tokio::test]
    async fn cancel_abandons_pending_evaluation() {
        let id = principal();
        let entered = Arc::new(Notify::new());
        let release = Arc::new(Notify::new());
        let profiles = Arc::new(GatedProfiles {
            profile: ProfileRecord::new(Role::Auditor).approved(true),
            held: AtomicBool::new(false),
            entered: entered.clone(),
            release: release.clone(),
        });
        let (engine, notifier) = engine(Some(id), profiles);

        let pending = {
            let engine = engine.clone();
            tokio::spawn(async move { engine.evaluate(&ResourcePolicy::roles([Role::Empresa]), "/documentos").await })
        };
        entered.notified().await;

        engine.cancel();
        release.notify_one();

        assert!(pending.await.unwrap().is_none());
        assert!(notifier.categories().is_empty());
    }

    #[tokio::test]
    async fn dropped_evaluation_is_never_notified() {
        let id = principal();
        let profiles = Arc::new(GatedProfiles {
            profile: ProfileRecord::new(Role::Empresa).approved(false),
            held: AtomicBool::new(false),
            entered: Arc::new(Notify::new()),
            release: Arc::new(Notify::new()),
        });
        let (engine, notifier) = engine(Some(id), profiles);
        let policy = ResourcePolicy::roles([Role::Empresa]);

        // the gated fetch is never released, so the timeout drops the future mid-lookup
        let dropped = tokio::time::timeout(Duration::from_millis(50), engine.evaluate(&policy, "/documentos")).await;
        assert!(dropped.is_err());
        assert!(notifier.categories().is_empty());

        let decision = engine.evaluate(&policy, "/documentos").await.unwrap();
        assert_eq!(decision.verdict, Verdict::DenyNotApproved);
        assert_eq!(notifier.categories(), vec![NotificationCategory::AwaitingApproval]);
    }

    #[tokio::test]
    async fn superseded_during_session_lookup_skips_profile_fetch() {
        let id = principal();
        let entered = Arc::new(Notify::new());
        let release = Arc::new(Notify::new());
        let sessions = Arc::new(GatedSessions {
            principal: id,
            held: AtomicBool::new(false),
            entered: entered.clone(),
            release: release.clone(),
        });
        let profiles = Arc::new(MemoryProfiles::with(id, ProfileRecord::new(Role::Auditor).approved(true)));
        let notifier = Arc::new(RecordingNotifier::default());
        let engine = AccessEngine::new(sessions, profiles.clone(), notifier);

        let first = {
            let engine = engine.clone();
            tokio::spawn(async move { engine.evaluate(&ResourcePolicy::roles([Role::Auditor]), "/auditoria").await })
        };
        entered.notified().await;

        let second = engine.evaluate(&ResourcePolicy::authenticated(), "/dashboard").await;
        assert_eq!(second.map(|d| d.verdict), Some(Verdict::Allow));

        release.notify_one();
        assert!(first.await.unwrap().is_none());
        assert_eq!(profiles.fetches.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn independent_engines_do_not_supersede_each_other() {
        let id = principal();
        let profiles: Arc<dyn ProfileStore> =
            Arc::new(MemoryProfiles::with(id, ProfileRecord::new(Role::Auditor).approved(true)));
        let (a, _) = engine(Some(id), profiles.clone());
        let (b, _) = engine(Some(id), profiles);

        let policy = ResourcePolicy::roles([Role::Auditor]);
        let (left, right) = tokio::join!(a.evaluate(&policy, "/auditoria"), b.evaluate(&policy, "/auditoria"));
        assert_eq!(left.map(|d| d.verdict), Some(Verdict::Allow));
        assert_eq!(right.map(|d| d.verdict), Some(Verdict::Allow));
    }
}

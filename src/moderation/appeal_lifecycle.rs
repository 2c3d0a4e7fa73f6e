/// Appeal lifecycle: filing, editing, withdrawal and audited erasure
use super::actor::Actor;
use super::appeals::{
    Appeal, AppealCause, AppealChanges, AppealFilter, AppealPatch, AppealQuery, AppealStatus,
    AppealStore,
};
use super::audit::{AuditAction, AuditEntry, AuditTrail};
use super::policy::{authorize, Access};
use super::record::{clamp_limit, new_record_id, now, require_text, LifecycleStamps};
use crate::config::ModerationConfig;
use crate::db::within;
use crate::error::{ModerationError, ModResult};
use crate::metrics;
use std::sync::Arc;
use std::time::Duration;

const MODULE: &str = "appeals";
const TABLE: &str = "appeal";

/// Operations on appeals, authorized per actor
#[derive(Clone)]
pub struct AppealLifecycle {
    store: Arc<dyn AppealStore>,
    audit: Arc<dyn AuditTrail>,
    settings: ModerationConfig,
}

impl AppealLifecycle {
    pub fn new(
        store: Arc<dyn AppealStore>,
        audit: Arc<dyn AuditTrail>,
        settings: ModerationConfig,
    ) -> Self {
        Self {
            store,
            audit,
            settings,
        }
    }

    /// File an appeal. Members may only appeal on their own behalf.
    pub async fn create(
        &self,
        actor: &Actor,
        appellant_id: &str,
        cause: AppealCause,
        appeal_reason: &str,
    ) -> ModResult<Appeal> {
        tally(
            self.create_appeal(actor, appellant_id, cause, appeal_reason)
                .await,
        )
    }

    /// Apply a patch. The appellant may only touch `appeal_reason`, and only
    /// while the appeal is pending; staff may touch anything.
    pub async fn update(&self, appeal_id: &str, patch: AppealPatch, actor: &Actor) -> ModResult<Appeal> {
        tally(self.apply_patch(appeal_id, patch, actor).await)
    }

    /// Permanently erase an appeal in a deletable status.
    ///
    /// Succeeds only once the audit entry is written; if the audit trail
    /// rejects it, the appeal is put back and the call fails as transient.
    pub async fn delete(&self, appeal_id: &str, actor: &Actor) -> ModResult<()> {
        tally(self.erase(appeal_id, actor).await)
    }

    /// Withdraw an appeal; only its appellant may do this
    pub async fn soft_retire(&self, appeal_id: &str, actor: &Actor) -> ModResult<Appeal> {
        tally(self.retire(appeal_id, actor).await)
    }

    pub async fn read(&self, appeal_id: &str, actor: &Actor) -> ModResult<Appeal> {
        tally(self.read_appeal(appeal_id, actor).await)
    }

    /// Staff list every appeal; appellants list their own active appeals
    pub async fn list(&self, actor: &Actor, query: AppealQuery) -> ModResult<Vec<Appeal>> {
        let staff = actor.role.is_staff();
        let filter = AppealFilter {
            appellant_id: if staff { None } else { Some(actor.id.clone()) },
            status: query.status,
            include_retired: staff && query.include_retired,
            limit: clamp_limit(
                query.limit,
                self.settings.list_limit_default,
                self.settings.list_limit_max,
            ),
        };

        tally(within(self.timeout(), "list appeals", self.store.list(&filter)).await)
    }

    async fn create_appeal(
        &self,
        actor: &Actor,
        appellant_id: &str,
        cause: AppealCause,
        appeal_reason: &str,
    ) -> ModResult<Appeal> {
        let appellant_id = require_text("appellant_id", appellant_id)?;
        authorize(
            actor,
            Access::OnBehalfOf {
                owner_id: &appellant_id,
            },
        )?;
        let appeal_reason = require_text("appeal_reason", appeal_reason)?;

        let existing = within(
            self.timeout(),
            "find active appeal",
            self.store.find_active(&appellant_id, &cause),
        )
        .await?;
        if let Some(existing) = existing {
            return Err(ModerationError::DuplicateAppeal(format!(
                "{} already appealed this cause (appeal {})",
                appellant_id, existing.id
            )));
        }

        let appeal = Appeal {
            id: new_record_id(),
            appellant_id,
            cause,
            appeal_reason,
            status: AppealStatus::Pending,
            resolution_comment: None,
            resolved_at: None,
            stamps: LifecycleStamps::new(now()),
        };

        within(self.timeout(), "insert appeal", self.store.insert(&appeal)).await?;

        metrics::record_appeal_created();
        tracing::info!(
            appeal_id = %appeal.id,
            appellant = %appeal.appellant_id,
            moderation_action_id = ?appeal.cause.moderation_action_id(),
            flag_report_id = ?appeal.cause.flag_report_id(),
            "appeal filed"
        );

        Ok(appeal)
    }

    async fn apply_patch(&self, appeal_id: &str, patch: AppealPatch, actor: &Actor) -> ModResult<Appeal> {
        let appeal_reason = patch
            .appeal_reason
            .as_deref()
            .map(|reason| require_text("appeal_reason", reason))
            .transpose()?;
        let resolution_comment = patch
            .resolution_comment
            .as_deref()
            .map(|comment| require_text("resolution_comment", comment))
            .transpose()?;

        // Cause references can be replaced but not cleared
        let moderation_action_id = patch
            .moderation_action_id
            .as_deref()
            .map(|id| require_text("moderation_action_id", id))
            .transpose()?;
        let flag_report_id = patch
            .flag_report_id
            .as_deref()
            .map(|id| require_text("flag_report_id", id))
            .transpose()?;

        let mut appeal = self.fetch_active(appeal_id).await?;

        authorize(
            actor,
            Access::EditAppeal {
                owner_id: &appeal.appellant_id,
                status: appeal.status,
                narrative_only: patch.is_narrative_only(),
            },
        )?;

        let reopening = patch.status == Some(AppealStatus::Pending);
        if patch.status.unwrap_or(appeal.status) == AppealStatus::Pending
            && (resolution_comment.is_some() || patch.resolved_at.is_some())
        {
            return Err(ModerationError::Validation(
                "a pending appeal carries no resolution_comment or resolved_at".to_string(),
            ));
        }

        let cause = if patch.touches_cause() {
            Some(AppealCause::new(
                moderation_action_id
                    .as_deref()
                    .or(appeal.cause.moderation_action_id()),
                flag_report_id
                    .as_deref()
                    .or(appeal.cause.flag_report_id()),
            )?)
        } else {
            None
        };

        let stamp = now();
        let concluding = patch.status.is_some_and(|s| s.is_concluded());
        let resolved_at = match patch.resolved_at {
            Some(at) => Some(at),
            None if concluding && appeal.resolved_at.is_none() => Some(stamp),
            None => None,
        };

        let changes = AppealChanges {
            appeal_reason,
            status: patch.status,
            resolution_comment,
            resolved_at,
            cause,
            clear_resolution: reopening,
        };

        // Appellant edits only land while the appeal is still pending
        let required_status = if actor.role.is_staff() {
            None
        } else {
            Some(AppealStatus::Pending)
        };

        let updated = within(
            self.timeout(),
            "update appeal",
            self.store
                .update(&appeal.id, &changes, required_status, stamp),
        )
        .await?;
        if !updated {
            return Err(self.lost_race(&appeal.id, actor).await);
        }

        metrics::record_appeal_updated(actor.role.as_str());
        tracing::info!(
            appeal_id = %appeal.id,
            actor = %actor.id,
            role = actor.role.as_str(),
            from = appeal.status.as_str(),
            to = changes.status.unwrap_or(appeal.status).as_str(),
            "appeal updated"
        );

        if let Some(reason) = changes.appeal_reason {
            appeal.appeal_reason = reason;
        }
        if let Some(status) = changes.status {
            appeal.status = status;
        }
        if changes.clear_resolution {
            appeal.resolution_comment = None;
            appeal.resolved_at = None;
        }
        if let Some(comment) = changes.resolution_comment {
            appeal.resolution_comment = Some(comment);
        }
        if let Some(at) = changes.resolved_at {
            appeal.resolved_at = Some(at);
        }
        if let Some(cause) = changes.cause {
            appeal.cause = cause;
        }
        appeal.stamps.updated_at = stamp;

        Ok(appeal)
    }

    async fn erase(&self, appeal_id: &str, actor: &Actor) -> ModResult<()> {
        authorize(actor, Access::Administer)?;

        // Retired appeals still exist and may be erased
        let appeal = within(self.timeout(), "get appeal", self.store.get(appeal_id))
            .await?
            .ok_or_else(|| not_found(appeal_id))?;

        if !appeal.status.is_deletable() {
            return Err(non_deletable(&appeal));
        }

        let entry = AuditEntry::new(
            actor,
            AuditAction::AppealDeleted,
            TABLE,
            &appeal.id,
            format!(
                "deleted appeal {} of {} (prior status {})",
                appeal.id,
                appeal.appellant_id,
                appeal.status.as_str()
            ),
        );

        // The row stays in place until the audit entry commits with its removal
        let removed = within(
            self.timeout(),
            "hard delete appeal",
            self.store.hard_delete(
                &appeal.id,
                appeal.status,
                self.audit.as_ref(),
                entry,
                self.timeout(),
            ),
        )
        .await
        .inspect_err(|e| {
            tracing::warn!(
                appeal_id = %appeal.id,
                prior_status = appeal.status.as_str(),
                error = %e,
                "appeal delete rolled back"
            )
        })?;
        if !removed {
            // Status moved or the row vanished since it was read
            return Err(
                match within(self.timeout(), "get appeal", self.store.get(appeal_id)).await {
                    Ok(None) => not_found(appeal_id),
                    Ok(Some(current)) if !current.status.is_deletable() => non_deletable(&current),
                    Ok(Some(_)) => ModerationError::Transient(format!(
                        "appeal {} was modified concurrently",
                        appeal_id
                    )),
                    Err(e) => e,
                },
            );
        }

        metrics::record_appeal_deleted();
        tracing::info!(
            appeal_id = %appeal.id,
            actor = %actor.id,
            prior_status = appeal.status.as_str(),
            "appeal deleted"
        );

        Ok(())
    }

    async fn retire(&self, appeal_id: &str, actor: &Actor) -> ModResult<Appeal> {
        let mut appeal = self.fetch_active(appeal_id).await?;

        authorize(
            actor,
            Access::OnBehalfOf {
                owner_id: &appeal.appellant_id,
            },
        )?;

        let stamp = now();
        let retired = within(
            self.timeout(),
            "retire appeal",
            self.store.soft_delete(&appeal.id, stamp),
        )
        .await?;
        if !retired {
            return Err(self.lost_race(&appeal.id, actor).await);
        }

        metrics::record_appeal_retired();
        tracing::info!(appeal_id = %appeal.id, appellant = %actor.id, "appeal withdrawn");

        appeal.stamps.deleted_at = Some(stamp);
        appeal.stamps.updated_at = stamp;
        Ok(appeal)
    }

    async fn read_appeal(&self, appeal_id: &str, actor: &Actor) -> ModResult<Appeal> {
        let appeal = within(self.timeout(), "get appeal", self.store.get(appeal_id))
            .await?
            .ok_or_else(|| not_found(appeal_id))?;

        authorize(
            actor,
            Access::Read {
                owner_id: &appeal.appellant_id,
            },
        )?;

        if appeal.is_retired() && !actor.role.is_staff() {
            return Err(not_found(appeal_id));
        }

        Ok(appeal)
    }

    async fn fetch_active(&self, appeal_id: &str) -> ModResult<Appeal> {
        within(self.timeout(), "get appeal", self.store.get(appeal_id))
            .await?
            .filter(|appeal| !appeal.is_retired())
            .ok_or_else(|| not_found(appeal_id))
    }

    /// Explain a compare-and-set miss
    async fn lost_race(&self, appeal_id: &str, actor: &Actor) -> ModerationError {
        match self.fetch_active(appeal_id).await {
            Ok(current) if !actor.role.is_staff() && current.status != AppealStatus::Pending => {
                ModerationError::Forbidden(format!(
                    "appeal {} is {} and can no longer be edited by its appellant",
                    appeal_id,
                    current.status.as_str()
                ))
            }
            Ok(_) => ModerationError::Transient(format!(
                "appeal {} was modified concurrently",
                appeal_id
            )),
            Err(e) => e,
        }
    }

    fn timeout(&self) -> Duration {
        self.settings.store_timeout()
    }
}

fn not_found(appeal_id: &str) -> ModerationError {
    ModerationError::NotFound(format!("appeal {}", appeal_id))
}

fn non_deletable(appeal: &Appeal) -> ModerationError {
    ModerationError::NonDeletableStatus {
        appeal_id: appeal.id.clone(),
        status: appeal.status.as_str().to_string(),
    }
}

fn tally<T>(result: ModResult<T>) -> ModResult<T> {
    result.inspect_err(|e| metrics::record_error(e, MODULE))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::memory_pool;
    use crate::moderation::appeals::SqliteAppealStore;
    use crate::moderation::audit::MemoryAuditTrail;
    use async_trait::async_trait;
    use chrono::Utc;

    struct FailingTrail;

    #[async_trait]
    impl AuditTrail for FailingTrail {
        async fn append(&self, _entry: AuditEntry) -> ModResult<()> {
            Err(ModerationError::Transient("audit trail offline".to_string()))
        }
    }

    async fn setup_with(audit: Arc<dyn AuditTrail>) -> AppealLifecycle {
        let store = Arc::new(SqliteAppealStore::new(memory_pool().await.unwrap()));
        AppealLifecycle::new(store, audit, ModerationConfig::default())
    }

    async fn setup() -> (AppealLifecycle, Arc<MemoryAuditTrail>) {
        let audit = Arc::new(MemoryAuditTrail::new());
        (setup_with(audit.clone()).await, audit)
    }

    fn by_report(id: &str) -> AppealCause {
        AppealCause::flag_report(id).unwrap()
    }

    fn status(status: AppealStatus) -> AppealPatch {
        AppealPatch {
            status: Some(status),
            ..Default::default()
        }
    }

    #[tokio::test]
    async fn test_create_appeal() {
        let (appeals, _) = setup().await;
        let m1 = Actor::member("m1");

        let appeal = appeals
            .create(&m1, "m1", by_report("r1"), "false positive")
            .await
            .unwrap();
        assert_eq!(appeal.status, AppealStatus::Pending);
        assert_eq!(appeal.resolution_comment, None);
        assert_eq!(appeal.resolved_at, None);
        assert_eq!(appeal.cause.flag_report_id(), Some("r1"));
    }

    #[tokio::test]
    async fn test_create_only_on_own_behalf() {
        let (appeals, _) = setup().await;

        for actor in [Actor::member("m2"), Actor::administrator("admin")] {
            let err = appeals
                .create(&actor, "m1", by_report("r1"), "false positive")
                .await
                .unwrap_err();
            assert!(matches!(err, ModerationError::Forbidden(_)));
        }

        let err = appeals
            .create(&Actor::member("m1"), "m1", by_report("r1"), " ")
            .await
            .unwrap_err();
        assert!(matches!(err, ModerationError::Validation(_)));
    }

    #[tokio::test]
    async fn test_duplicate_appeal_per_cause() {
        let (appeals, _) = setup().await;
        let m1 = Actor::member("m1");

        appeals.create(&m1, "m1", by_report("r1"), "first").await.unwrap();
        let err = appeals
            .create(&m1, "m1", by_report("r1"), "second")
            .await
            .unwrap_err();
        assert!(matches!(err, ModerationError::DuplicateAppeal(_)));

        // A different cause triple is a different appeal
        let both = AppealCause::new(Some("a1"), Some("r1")).unwrap();
        appeals.create(&m1, "m1", both, "with action").await.unwrap();
    }

    #[tokio::test]
    async fn test_appellant_edits_narrative_while_pending() {
        let (appeals, _) = setup().await;
        let m1 = Actor::member("m1");
        let moderator = Actor::moderator("mod");
        let appeal = appeals.create(&m1, "m1", by_report("r1"), "first").await.unwrap();

        let narrative = AppealPatch {
            appeal_reason: Some("clarified".to_string()),
            ..Default::default()
        };
        let edited = appeals.update(&appeal.id, narrative.clone(), &m1).await.unwrap();
        assert_eq!(edited.appeal_reason, "clarified");

        let err = appeals
            .update(&appeal.id, status(AppealStatus::Closed), &m1)
            .await
            .unwrap_err();
        assert!(matches!(err, ModerationError::Forbidden(_)));

        appeals
            .update(&appeal.id, status(AppealStatus::UnderReview), &moderator)
            .await
            .unwrap();
        let err = appeals.update(&appeal.id, narrative, &m1).await.unwrap_err();
        assert!(matches!(err, ModerationError::Forbidden(_)));

        let err = appeals
            .update(
                &appeal.id,
                AppealPatch {
                    appeal_reason: Some("not mine".to_string()),
                    ..Default::default()
                },
                &Actor::member("m2"),
            )
            .await
            .unwrap_err();
        assert!(matches!(err, ModerationError::Forbidden(_)));
    }

    #[tokio::test]
    async fn test_staff_resolution_stamps_resolved_at() {
        let (appeals, _) = setup().await;
        let m1 = Actor::member("m1");
        let moderator = Actor::moderator("mod");
        let appeal = appeals.create(&m1, "m1", by_report("r1"), "first").await.unwrap();

        let resolved = appeals
            .update(
                &appeal.id,
                AppealPatch {
                    status: Some(AppealStatus::Resolved),
                    resolution_comment: Some("action reversed".to_string()),
                    ..Default::default()
                },
                &moderator,
            )
            .await
            .unwrap();
        assert_eq!(resolved.status, AppealStatus::Resolved);
        assert_eq!(resolved.resolution_comment.as_deref(), Some("action reversed"));
        assert!(resolved.resolved_at.is_some());

        let stored = appeals.read(&appeal.id, &moderator).await.unwrap();
        assert_eq!(stored, resolved);
    }

    #[tokio::test]
    async fn test_reopening_clears_resolution() {
        let (appeals, _) = setup().await;
        let moderator = Actor::moderator("mod");
        let appeal = appeals
            .create(&Actor::member("m1"), "m1", by_report("r1"), "first")
            .await
            .unwrap();

        appeals
            .update(
                &appeal.id,
                AppealPatch {
                    status: Some(AppealStatus::Resolved),
                    resolution_comment: Some("upheld".to_string()),
                    ..Default::default()
                },
                &moderator,
            )
            .await
            .unwrap();

        let reopened = appeals
            .update(&appeal.id, status(AppealStatus::Pending), &moderator)
            .await
            .unwrap();
        assert_eq!(reopened.status, AppealStatus::Pending);
        assert_eq!(reopened.resolution_comment, None);
        assert_eq!(reopened.resolved_at, None);
        assert_eq!(appeals.read(&appeal.id, &moderator).await.unwrap(), reopened);

        // Nor can a pending appeal be given a resolution
        let err = appeals
            .update(
                &appeal.id,
                AppealPatch {
                    resolution_comment: Some("premature".to_string()),
                    ..Default::default()
                },
                &moderator,
            )
            .await
            .unwrap_err();
        assert!(matches!(err, ModerationError::Validation(_)));

        let err = appeals
            .update(
                &appeal.id,
                AppealPatch {
                    status: Some(AppealStatus::Pending),
                    resolved_at: Some(Utc::now()),
                    ..Default::default()
                },
                &moderator,
            )
            .await
            .unwrap_err();
        assert!(matches!(err, ModerationError::Validation(_)));
    }

    #[tokio::test]
    async fn test_blank_cause_reference_is_rejected() {
        let (appeals, _) = setup().await;
        let moderator = Actor::moderator("mod");
        let appeal = appeals
            .create(
                &Actor::member("m1"),
                "m1",
                AppealCause::new(Some("a1"), Some("r1")).unwrap(),
                "first",
            )
            .await
            .unwrap();

        let err = appeals
            .update(
                &appeal.id,
                AppealPatch {
                    moderation_action_id: Some("  ".to_string()),
                    ..Default::default()
                },
                &moderator,
            )
            .await
            .unwrap_err();
        assert!(matches!(err, ModerationError::Validation(_)));

        let stored = appeals.read(&appeal.id, &moderator).await.unwrap();
        assert_eq!(stored.cause.moderation_action_id(), Some("a1"));
        assert_eq!(stored.cause.flag_report_id(), Some("r1"));
    }

    #[tokio::test]
    async fn test_cause_change_respects_uniqueness() {
        let (appeals, _) = setup().await;
        let m1 = Actor::member("m1");
        let moderator = Actor::moderator("mod");
        appeals.create(&m1, "m1", by_report("r1"), "first").await.unwrap();
        let second = appeals.create(&m1, "m1", by_report("r2"), "second").await.unwrap();

        let err = appeals
            .update(
                &second.id,
                AppealPatch {
                    flag_report_id: Some("r1".to_string()),
                    ..Default::default()
                },
                &moderator,
            )
            .await
            .unwrap_err();
        assert!(matches!(err, ModerationError::DuplicateAppeal(_)));

        let linked = appeals
            .update(
                &second.id,
                AppealPatch {
                    moderation_action_id: Some("a9".to_string()),
                    ..Default::default()
                },
                &moderator,
            )
            .await
            .unwrap();
        assert_eq!(linked.cause.moderation_action_id(), Some("a9"));
        assert_eq!(linked.cause.flag_report_id(), Some("r2"));
    }

    #[tokio::test]
    async fn test_delete_requires_deletable_status() {
        let (appeals, audit) = setup().await;
        let m1 = Actor::member("m1");
        let moderator = Actor::moderator("mod");
        let admin = Actor::administrator("admin");
        let appeal = appeals.create(&m1, "m1", by_report("r1"), "first").await.unwrap();

        let reviewing = appeals
            .update(&appeal.id, status(AppealStatus::UnderReview), &moderator)
            .await
            .unwrap();

        let err = appeals.delete(&appeal.id, &admin).await.unwrap_err();
        assert!(matches!(err, ModerationError::NonDeletableStatus { .. }));
        assert_eq!(appeals.read(&appeal.id, &admin).await.unwrap(), reviewing);
        assert!(audit.entries().await.is_empty());

        let err = appeals.delete(&appeal.id, &moderator).await.unwrap_err();
        assert!(matches!(err, ModerationError::Forbidden(_)));

        appeals
            .update(&appeal.id, status(AppealStatus::Closed), &moderator)
            .await
            .unwrap();
        appeals.delete(&appeal.id, &admin).await.unwrap();

        let err = appeals.read(&appeal.id, &admin).await.unwrap_err();
        assert!(matches!(err, ModerationError::NotFound(_)));
        let err = appeals.delete(&appeal.id, &admin).await.unwrap_err();
        assert!(matches!(err, ModerationError::NotFound(_)));

        let entries = audit.entries().await;
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].action_category, AuditAction::AppealDeleted);
        assert_eq!(entries[0].target_id, appeal.id);
        assert_eq!(entries[0].actor_id, "admin");
        assert!(entries[0].description.contains("prior status closed"));
    }

    #[tokio::test]
    async fn test_delete_rolls_back_when_audit_fails() {
        let appeals = setup_with(Arc::new(FailingTrail)).await;
        let m1 = Actor::member("m1");
        let admin = Actor::administrator("admin");
        let appeal = appeals.create(&m1, "m1", by_report("r1"), "first").await.unwrap();

        let err = appeals.delete(&appeal.id, &admin).await.unwrap_err();
        assert!(err.is_retryable());

        assert_eq!(appeals.read(&appeal.id, &admin).await.unwrap(), appeal);
    }

    struct StalledTrail;

    #[async_trait]
    impl AuditTrail for StalledTrail {
        async fn append(&self, _entry: AuditEntry) -> ModResult<()> {
            std::future::pending().await
        }
    }

    #[tokio::test]
    async fn test_delete_keeps_the_appeal_when_audit_stalls() {
        let store = Arc::new(SqliteAppealStore::new(memory_pool().await.unwrap()));
        let settings = ModerationConfig {
            store_timeout_ms: 50,
            ..Default::default()
        };
        let appeals = AppealLifecycle::new(store, Arc::new(StalledTrail), settings);
        let admin = Actor::administrator("admin");
        let appeal = appeals
            .create(&Actor::member("m1"), "m1", by_report("r1"), "first")
            .await
            .unwrap();

        let err = appeals.delete(&appeal.id, &admin).await.unwrap_err();
        assert!(err.is_retryable());
        assert_eq!(appeals.read(&appeal.id, &admin).await.unwrap(), appeal);
    }

    /// Audit sink that files the same appeal again through a second desk
    /// while the deletion is pending, then fails.
    struct RefilingTrail {
        desk: AppealLifecycle,
        refiled: tokio::sync::Mutex<Option<ModResult<Appeal>>>,
    }

    #[async_trait]
    impl AuditTrail for RefilingTrail {
        async fn append(&self, _entry: AuditEntry) -> ModResult<()> {
            let outcome = self
                .desk
                .create(&Actor::member("m1"), "m1", by_report("r1"), "refiled")
                .await;
            *self.refiled.lock().await = Some(outcome);
            Err(ModerationError::Transient("audit down".to_string()))
        }
    }

    #[tokio::test]
    async fn test_cause_stays_taken_while_delete_awaits_audit() {
        let dir = tempfile::tempdir().unwrap();
        let pool = crate::db::create_pool(
            &dir.path().join("moderation.sqlite"),
            crate::db::DatabaseOptions::default(),
        )
        .await
        .unwrap();
        crate::db::run_migrations(&pool).await.unwrap();

        let store = Arc::new(SqliteAppealStore::new(pool));
        let trail = Arc::new(RefilingTrail {
            desk: AppealLifecycle::new(
                store.clone(),
                Arc::new(MemoryAuditTrail::new()),
                ModerationConfig::default(),
            ),
            refiled: tokio::sync::Mutex::new(None),
        });
        let appeals = AppealLifecycle::new(store, trail.clone(), ModerationConfig::default());
        let admin = Actor::administrator("admin");
        let appeal = appeals
            .create(&Actor::member("m1"), "m1", by_report("r1"), "first")
            .await
            .unwrap();

        let err = appeals.delete(&appeal.id, &admin).await.unwrap_err();
        assert!(err.is_retryable());

        let refiled = trail.refiled.lock().await.take().unwrap();
        assert!(matches!(refiled, Err(ModerationError::DuplicateAppeal(_))));

        assert_eq!(appeals.read(&appeal.id, &admin).await.unwrap(), appeal);
        let listed = appeals.list(&admin, AppealQuery::default()).await.unwrap();
        assert_eq!(listed.len(), 1);
    }

    #[tokio::test]
    async fn test_retire_by_appellant_only() {
        let (appeals, _) = setup().await;
        let m1 = Actor::member("m1");
        let moderator = Actor::moderator("mod");
        let appeal = appeals.create(&m1, "m1", by_report("r1"), "first").await.unwrap();

        let err = appeals.soft_retire(&appeal.id, &moderator).await.unwrap_err();
        assert!(matches!(err, ModerationError::Forbidden(_)));

        let retired = appeals.soft_retire(&appeal.id, &m1).await.unwrap();
        assert!(retired.is_retired());

        let err = appeals.soft_retire(&appeal.id, &m1).await.unwrap_err();
        assert!(matches!(err, ModerationError::NotFound(_)));

        // Invisible to the appellant, visible to staff
        let err = appeals.read(&appeal.id, &m1).await.unwrap_err();
        assert!(matches!(err, ModerationError::NotFound(_)));
        assert!(appeals.read(&appeal.id, &moderator).await.unwrap().is_retired());

        // The cause is free again
        appeals.create(&m1, "m1", by_report("r1"), "refiled").await.unwrap();
    }

    #[tokio::test]
    async fn test_retired_appeal_can_be_erased() {
        let (appeals, audit) = setup().await;
        let m1 = Actor::member("m1");
        let appeal = appeals.create(&m1, "m1", by_report("r1"), "first").await.unwrap();
        appeals.soft_retire(&appeal.id, &m1).await.unwrap();

        appeals
            .delete(&appeal.id, &Actor::administrator("admin"))
            .await
            .unwrap();
        assert_eq!(audit.entries().await.len(), 1);
    }

    #[tokio::test]
    async fn test_read_and_list_visibility() {
        let (appeals, _) = setup().await;
        let m1 = Actor::member("m1");
        let m2 = Actor::member("m2");
        let moderator = Actor::moderator("mod");
        let mine = appeals.create(&m1, "m1", by_report("r1"), "first").await.unwrap();
        let retired = appeals.create(&m1, "m1", by_report("r2"), "second").await.unwrap();
        appeals.create(&m2, "m2", by_report("r1"), "other").await.unwrap();
        appeals.soft_retire(&retired.id, &m1).await.unwrap();

        let err = appeals.read(&mine.id, &m2).await.unwrap_err();
        assert!(matches!(err, ModerationError::Forbidden(_)));
        assert!(appeals.read(&mine.id, &moderator).await.is_ok());

        let own = appeals
            .list(
                &m1,
                AppealQuery {
                    include_retired: true,
                    ..Default::default()
                },
            )
            .await
            .unwrap();
        assert_eq!(own.len(), 1);
        assert_eq!(own[0].id, mine.id);

        let everything = appeals
            .list(
                &moderator,
                AppealQuery {
                    include_retired: true,
                    ..Default::default()
                },
            )
            .await
            .unwrap();
        assert_eq!(everything.len(), 3);

        let pending = appeals
            .list(
                &moderator,
                AppealQuery {
                    status: Some(AppealStatus::Pending),
                    ..Default::default()
                },
            )
            .await
            .unwrap();
        assert_eq!(pending.len(), 2);
    }
}

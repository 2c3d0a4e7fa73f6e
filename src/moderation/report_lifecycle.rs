/// Report lifecycle: filing, moderation, soft deletion and visibility
use super::actor::Actor;
use super::audit::{append_best_effort, AuditAction, AuditEntry, AuditTrail};
use super::policy::{authorize, Access};
use super::record::{clamp_limit, new_record_id, now, require_text, LifecycleStamps};
use super::reports::{
    ContentReport, ReportFilter, ReportQuery, ReportStatus, ReportStore, ReportTarget,
};
use crate::config::ModerationConfig;
use crate::db::within;
use crate::error::{ModerationError, ModResult};
use crate::metrics;
use std::sync::Arc;

const MODULE: &str = "reports";
const TABLE: &str = "content_report";

/// Operations on content reports, authorized per actor
#[derive(Clone)]
pub struct ReportLifecycle {
    store: Arc<dyn ReportStore>,
    audit: Arc<dyn AuditTrail>,
    settings: ModerationConfig,
}

impl ReportLifecycle {
    pub fn new(
        store: Arc<dyn ReportStore>,
        audit: Arc<dyn AuditTrail>,
        settings: ModerationConfig,
    ) -> Self {
        Self {
            store,
            audit,
            settings,
        }
    }

    /// File a report against a post or comment
    pub async fn create(
        &self,
        reporter_id: &str,
        target: ReportTarget,
        reason: &str,
    ) -> ModResult<ContentReport> {
        tally(self.create_report(reporter_id, target, reason).await)
    }

    /// Attach (or correct) the moderation action taken on a report
    pub async fn attach_moderation_action(
        &self,
        report_id: &str,
        moderation_action_id: &str,
        actor: &Actor,
    ) -> ModResult<ContentReport> {
        tally(
            self.attach_action(report_id, moderation_action_id, actor)
                .await,
        )
    }

    /// Set the status and optionally correct the reason
    pub async fn update_status(
        &self,
        report_id: &str,
        status: ReportStatus,
        reason_patch: Option<&str>,
        actor: &Actor,
    ) -> ModResult<ContentReport> {
        tally(
            self.change_status(report_id, status, reason_patch, actor)
                .await,
        )
    }

    /// Soft-delete; a second call fails with `NotFound`
    pub async fn soft_delete(&self, report_id: &str, actor: &Actor) -> ModResult<()> {
        tally(self.delete_report(report_id, actor).await)
    }

    /// Fetch one report. `include_deleted` only has effect for staff.
    pub async fn read(
        &self,
        report_id: &str,
        actor: &Actor,
        include_deleted: bool,
    ) -> ModResult<ContentReport> {
        tally(self.read_report(report_id, actor, include_deleted).await)
    }

    /// Staff list every report; members list their own active reports
    pub async fn list(&self, actor: &Actor, query: ReportQuery) -> ModResult<Vec<ContentReport>> {
        let staff = actor.role.is_staff();
        let filter = ReportFilter {
            reporter_id: if staff { None } else { Some(actor.id.clone()) },
            status: query.status,
            include_deleted: staff && query.include_deleted,
            limit: clamp_limit(
                query.limit,
                self.settings.list_limit_default,
                self.settings.list_limit_max,
            ),
        };

        tally(within(self.timeout(), "list reports", self.store.list(&filter)).await)
    }

    async fn create_report(
        &self,
        reporter_id: &str,
        target: ReportTarget,
        reason: &str,
    ) -> ModResult<ContentReport> {
        let reporter_id = require_text("reporter_id", reporter_id)?;
        let target = target.validated()?;
        let reason = require_text("reason", reason)?;

        let existing = within(
            self.timeout(),
            "find active report",
            self.store.find_active(&reporter_id, &target),
        )
        .await?;
        if let Some(existing) = existing {
            return Err(ModerationError::DuplicateReport(format!(
                "{} already reported {} {} (report {})",
                reporter_id,
                target.content_type(),
                target.id(),
                existing.id
            )));
        }

        let report = ContentReport {
            id: new_record_id(),
            reporter_id,
            target,
            reason,
            status: ReportStatus::Pending,
            moderation_action_id: None,
            stamps: LifecycleStamps::new(now()),
        };

        // The unique index still catches a concurrent filing
        within(self.timeout(), "insert report", self.store.insert(&report)).await?;

        metrics::record_report_created(report.target.content_type());
        tracing::info!(
            report_id = %report.id,
            reporter = %report.reporter_id,
            content_type = report.target.content_type(),
            content_id = report.target.id(),
            "report filed"
        );

        Ok(report)
    }

    async fn attach_action(
        &self,
        report_id: &str,
        moderation_action_id: &str,
        actor: &Actor,
    ) -> ModResult<ContentReport> {
        authorize(actor, Access::Moderate)?;
        let action_id = require_text("moderation_action_id", moderation_action_id)?;

        let mut report = self.fetch_active(report_id).await?;

        if report.moderation_action_id.as_deref() == Some(action_id.as_str()) {
            metrics::record_report_action("unchanged");
            tracing::debug!(
                report_id = %report.id,
                moderation_action_id = %action_id,
                "moderation action already attached"
            );
            return Ok(report);
        }

        let previous = report.moderation_action_id.clone();
        let stamp = now();
        let swapped = within(
            self.timeout(),
            "set moderation action",
            self.store
                .set_moderation_action(&report.id, previous.as_deref(), &action_id, stamp),
        )
        .await?;
        if !swapped {
            return Err(self.lost_race(&report.id).await);
        }

        match &previous {
            Some(previous) => {
                metrics::record_report_action("corrected");
                let entry = AuditEntry::new(
                    actor,
                    AuditAction::ReportActionCorrected,
                    TABLE,
                    &report.id,
                    format!(
                        "moderation action on report {} changed from {} to {}",
                        report.id, previous, action_id
                    ),
                );
                append_best_effort(self.audit.as_ref(), entry, self.timeout()).await;
            }
            None => metrics::record_report_action("attached"),
        }

        tracing::info!(
            report_id = %report.id,
            actor = %actor.id,
            moderation_action_id = %action_id,
            previous = ?previous,
            "moderation action attached"
        );

        report.moderation_action_id = Some(action_id);
        report.stamps.updated_at = stamp;
        Ok(report)
    }

    async fn change_status(
        &self,
        report_id: &str,
        status: ReportStatus,
        reason_patch: Option<&str>,
        actor: &Actor,
    ) -> ModResult<ContentReport> {
        authorize(actor, Access::Moderate)?;
        let reason = reason_patch
            .map(|reason| require_text("reason", reason))
            .transpose()?;

        let mut report = self.fetch_active(report_id).await?;

        let stamp = now();
        let updated = within(
            self.timeout(),
            "update report status",
            self.store
                .update_status(&report.id, status, reason.as_deref(), stamp),
        )
        .await?;
        if !updated {
            return Err(self.lost_race(&report.id).await);
        }

        metrics::record_report_status(status.as_str());
        if status.is_concluded() && !report.status.is_concluded() {
            metrics::record_report_concluded();
        }
        tracing::info!(
            report_id = %report.id,
            actor = %actor.id,
            from = report.status.as_str(),
            to = status.as_str(),
            reason_changed = reason.is_some(),
            "report status updated"
        );

        report.status = status;
        if let Some(reason) = reason {
            report.reason = reason;
        }
        report.stamps.updated_at = stamp;
        Ok(report)
    }

    async fn delete_report(&self, report_id: &str, actor: &Actor) -> ModResult<()> {
        authorize(actor, Access::Moderate)?;

        let report = self.fetch_active(report_id).await?;

        let deleted = within(
            self.timeout(),
            "soft delete report",
            self.store.soft_delete(&report.id, now()),
        )
        .await?;
        if !deleted {
            return Err(self.lost_race(&report.id).await);
        }

        metrics::record_report_deleted();
        let entry = AuditEntry::new(
            actor,
            AuditAction::ReportDeleted,
            TABLE,
            &report.id,
            format!(
                "soft-deleted report {} on {} {} (status {})",
                report.id,
                report.target.content_type(),
                report.target.id(),
                report.status.as_str()
            ),
        );
        append_best_effort(self.audit.as_ref(), entry, self.timeout()).await;

        tracing::info!(report_id = %report.id, actor = %actor.id, "report soft-deleted");

        Ok(())
    }

    async fn read_report(
        &self,
        report_id: &str,
        actor: &Actor,
        include_deleted: bool,
    ) -> ModResult<ContentReport> {
        let report = within(self.timeout(), "get report", self.store.get(report_id))
            .await?
            .ok_or_else(|| not_found(report_id))?;

        authorize(
            actor,
            Access::Read {
                owner_id: &report.reporter_id,
            },
        )?;

        if report.is_deleted() && !(include_deleted && actor.role.is_staff()) {
            return Err(not_found(report_id));
        }

        Ok(report)
    }

    async fn fetch_active(&self, report_id: &str) -> ModResult<ContentReport> {
        within(self.timeout(), "get report", self.store.get(report_id))
            .await?
            .filter(|report| !report.is_deleted())
            .ok_or_else(|| not_found(report_id))
    }

    /// Explain a compare-and-set miss
    async fn lost_race(&self, report_id: &str) -> ModerationError {
        match self.fetch_active(report_id).await {
            Ok(_) => ModerationError::Transient(format!(
                "report {} was modified concurrently",
                report_id
            )),
            Err(e) => e,
        }
    }

    fn timeout(&self) -> std::time::Duration {
        self.settings.store_timeout()
    }
}

fn not_found(report_id: &str) -> ModerationError {
    ModerationError::NotFound(format!("report {}", report_id))
}

fn tally<T>(result: ModResult<T>) -> ModResult<T> {
    result.inspect_err(|e| metrics::record_error(e, MODULE))
}

/// Appeal records and their store
use super::audit::{append_required, AuditEntry, AuditTrail};
use super::record::{
    format_timestamp, is_unique_violation, optional_ref, parse_optional_timestamp,
    uniqueness_scope, LifecycleStamps, ACTIVE_ONLY,
};
use crate::error::{ModerationError, ModResult};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::sqlite::SqliteRow;
use sqlx::{QueryBuilder, Row, Sqlite, SqlitePool};
use std::time::Duration;

/// Appeal workflow status
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AppealStatus {
    Pending,
    UnderReview,
    Resolved,
    Closed,
}

impl AppealStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            AppealStatus::Pending => "pending",
            AppealStatus::UnderReview => "under_review",
            AppealStatus::Resolved => "resolved",
            AppealStatus::Closed => "closed",
        }
    }

    pub fn from_str(s: &str) -> ModResult<Self> {
        match s.to_lowercase().as_str() {
            "pending" => Ok(AppealStatus::Pending),
            "under_review" => Ok(AppealStatus::UnderReview),
            "resolved" => Ok(AppealStatus::Resolved),
            "closed" => Ok(AppealStatus::Closed),
            _ => Err(ModerationError::Validation(format!("Invalid appeal status: {}", s))),
        }
    }

    /// Statuses an administrator may hard-delete from.
    /// Appeals under review or resolved are compliance records in flight.
    pub fn is_deletable(&self) -> bool {
        matches!(self, AppealStatus::Pending | AppealStatus::Closed)
    }

    /// Statuses that conclude an appeal and carry a resolution stamp
    pub fn is_concluded(&self) -> bool {
        matches!(self, AppealStatus::Resolved | AppealStatus::Closed)
    }
}

/// What an appeal contests: a moderation action, a report, or both
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize)]
pub struct AppealCause {
    moderation_action_id: Option<String>,
    flag_report_id: Option<String>,
}

impl AppealCause {
    /// Blank references count as absent; at least one must remain
    pub fn new(moderation_action_id: Option<&str>, flag_report_id: Option<&str>) -> ModResult<Self> {
        let moderation_action_id = optional_ref(moderation_action_id);
        let flag_report_id = optional_ref(flag_report_id);

        if moderation_action_id.is_none() && flag_report_id.is_none() {
            return Err(ModerationError::Validation(
                "Appeal must reference a moderation action or a report".to_string(),
            ));
        }

        Ok(Self {
            moderation_action_id,
            flag_report_id,
        })
    }

    pub fn moderation_action(id: &str) -> ModResult<Self> {
        Self::new(Some(id), None)
    }

    pub fn flag_report(id: &str) -> ModResult<Self> {
        Self::new(None, Some(id))
    }

    pub fn moderation_action_id(&self) -> Option<&str> {
        self.moderation_action_id.as_deref()
    }

    pub fn flag_report_id(&self) -> Option<&str> {
        self.flag_report_id.as_deref()
    }

    fn from_columns(
        moderation_action_id: Option<String>,
        flag_report_id: Option<String>,
    ) -> ModResult<Self> {
        if moderation_action_id.is_none() && flag_report_id.is_none() {
            return Err(ModerationError::Internal(
                "Corrupt appeal: no cause reference".to_string(),
            ));
        }
        Ok(Self {
            moderation_action_id,
            flag_report_id,
        })
    }
}

/// A member's challenge against a moderation action or report outcome
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Appeal {
    pub id: String,
    pub appellant_id: String,
    #[serde(flatten)]
    pub cause: AppealCause,
    pub appeal_reason: String,
    pub status: AppealStatus,
    pub resolution_comment: Option<String>,
    pub resolved_at: Option<DateTime<Utc>>,
    #[serde(flatten)]
    pub stamps: LifecycleStamps,
}

impl Appeal {
    /// Withdrawn by the appellant
    pub fn is_retired(&self) -> bool {
        !self.stamps.is_active()
    }
}

/// Requested field changes; absent fields are left alone
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
pub struct AppealPatch {
    pub appeal_reason: Option<String>,
    pub status: Option<AppealStatus>,
    pub resolution_comment: Option<String>,
    pub resolved_at: Option<DateTime<Utc>>,
    pub moderation_action_id: Option<String>,
    pub flag_report_id: Option<String>,
}

impl AppealPatch {
    /// Touches nothing but the appellant's narrative
    pub fn is_narrative_only(&self) -> bool {
        self.status.is_none()
            && self.resolution_comment.is_none()
            && self.resolved_at.is_none()
            && !self.touches_cause()
    }

    pub fn touches_cause(&self) -> bool {
        self.moderation_action_id.is_some() || self.flag_report_id.is_some()
    }
}

/// Validated changes handed to the store
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AppealChanges {
    pub appeal_reason: Option<String>,
    pub status: Option<AppealStatus>,
    pub resolution_comment: Option<String>,
    pub resolved_at: Option<DateTime<Utc>>,
    /// Replaces both cause columns when present
    pub cause: Option<AppealCause>,
    /// Null `resolution_comment` and `resolved_at`, for a reopened appeal
    pub clear_resolution: bool,
}

/// Listing filter as accepted from callers
#[derive(Debug, Clone, Default, Deserialize)]
pub struct AppealQuery {
    pub status: Option<AppealStatus>,
    #[serde(default)]
    pub include_retired: bool,
    pub limit: Option<i64>,
}

/// Listing filter as executed by a store
#[derive(Debug, Clone)]
pub struct AppealFilter {
    pub appellant_id: Option<String>,
    pub status: Option<AppealStatus>,
    pub include_retired: bool,
    pub limit: i64,
}

/// Persistence contract for appeals.
///
/// Mutating methods are compare-and-set and return `false` when nothing
/// matched.
#[async_trait]
pub trait AppealStore: Send + Sync {
    /// Insert a new appeal; an active duplicate yields `DuplicateAppeal`
    async fn insert(&self, appeal: &Appeal) -> ModResult<()>;

    /// Active appeal for this appellant and identical cause, if any
    async fn find_active(&self, appellant_id: &str, cause: &AppealCause) -> ModResult<Option<Appeal>>;

    /// Fetch by id, retired rows included
    async fn get(&self, id: &str) -> ModResult<Option<Appeal>>;

    /// Apply changes to an active appeal, optionally only while it has
    /// `required_status`
    async fn update(
        &self,
        id: &str,
        changes: &AppealChanges,
        required_status: Option<AppealStatus>,
        now: DateTime<Utc>,
    ) -> ModResult<bool>;

    /// Stamp `deleted_at` if not already set
    async fn soft_delete(&self, id: &str, now: DateTime<Utc>) -> ModResult<bool>;

    /// Permanently remove the appeal if its status is still `expected_status`.
    ///
    /// The removal and `entry` land together: if the audit write fails or
    /// exceeds `audit_limit`, the row is left untouched and the error is
    /// returned as `Transient`.
    async fn hard_delete(
        &self,
        id: &str,
        expected_status: AppealStatus,
        audit: &dyn AuditTrail,
        entry: AuditEntry,
        audit_limit: Duration,
    ) -> ModResult<bool>;

    /// Newest first
    async fn list(&self, filter: &AppealFilter) -> ModResult<Vec<Appeal>>;
}

const APPEAL_COLUMNS: &str = "id, appellant_id, moderation_action_id, flag_report_id, \
     appeal_reason, status, resolution_comment, resolved_at, created_at, updated_at, deleted_at";

/// Appeal store backed by the `appeal` table
#[derive(Clone)]
pub struct SqliteAppealStore {
    db: SqlitePool,
}

impl SqliteAppealStore {
    pub fn new(db: SqlitePool) -> Self {
        Self { db }
    }

    fn parse_appeal(row: &SqliteRow) -> ModResult<Appeal> {
        let status_str: String = row.try_get("status")?;

        Ok(Appeal {
            id: row.try_get("id")?,
            appellant_id: row.try_get("appellant_id")?,
            cause: AppealCause::from_columns(
                row.try_get("moderation_action_id")?,
                row.try_get("flag_report_id")?,
            )?,
            appeal_reason: row.try_get("appeal_reason")?,
            status: AppealStatus::from_str(&status_str)?,
            resolution_comment: row.try_get("resolution_comment")?,
            resolved_at: parse_optional_timestamp(row, "resolved_at")?,
            stamps: LifecycleStamps::from_row(row)?,
        })
    }

    fn duplicate(appellant_id: &str, cause: &AppealCause) -> ModerationError {
        ModerationError::DuplicateAppeal(format!(
            "{} already has an appeal for action={:?} report={:?}",
            appellant_id,
            cause.moderation_action_id(),
            cause.flag_report_id()
        ))
    }
}

#[async_trait]
impl AppealStore for SqliteAppealStore {
    async fn insert(&self, appeal: &Appeal) -> ModResult<()> {
        let result = sqlx::query(
            r#"
            INSERT INTO appeal
            (id, appellant_id, moderation_action_id, flag_report_id, appeal_reason, status,
             resolution_comment, resolved_at, created_at, updated_at, deleted_at)
            VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(&appeal.id)
        .bind(&appeal.appellant_id)
        .bind(appeal.cause.moderation_action_id())
        .bind(appeal.cause.flag_report_id())
        .bind(&appeal.appeal_reason)
        .bind(appeal.status.as_str())
        .bind(&appeal.resolution_comment)
        .bind(appeal.resolved_at.map(format_timestamp))
        .bind(format_timestamp(appeal.stamps.created_at))
        .bind(format_timestamp(appeal.stamps.updated_at))
        .bind(appeal.stamps.deleted_at.map(format_timestamp))
        .execute(&self.db)
        .await;

        match result {
            Ok(_) => Ok(()),
            Err(e) if is_unique_violation(&e) => {
                Err(Self::duplicate(&appeal.appellant_id, &appeal.cause))
            }
            Err(e) => Err(e.into()),
        }
    }

    async fn find_active(&self, appellant_id: &str, cause: &AppealCause) -> ModResult<Option<Appeal>> {
        let sql = format!(
            "SELECT {} FROM appeal WHERE {} LIMIT 1",
            APPEAL_COLUMNS,
            uniqueness_scope("appellant_id", &["moderation_action_id", "flag_report_id"])
        );

        let row = sqlx::query(&sql)
            .bind(appellant_id)
            .bind(cause.moderation_action_id())
            .bind(cause.flag_report_id())
            .fetch_optional(&self.db)
            .await?;

        row.as_ref().map(Self::parse_appeal).transpose()
    }

    async fn get(&self, id: &str) -> ModResult<Option<Appeal>> {
        let sql = format!("SELECT {} FROM appeal WHERE id = ?", APPEAL_COLUMNS);

        let row = sqlx::query(&sql).bind(id).fetch_optional(&self.db).await?;

        row.as_ref().map(Self::parse_appeal).transpose()
    }

    async fn update(
        &self,
        id: &str,
        changes: &AppealChanges,
        required_status: Option<AppealStatus>,
        now: DateTime<Utc>,
    ) -> ModResult<bool> {
        let cause = changes.cause.as_ref();
        let required = required_status.map(|s| s.as_str());

        let result = sqlx::query(
            r#"
            UPDATE appeal
            SET appeal_reason = COALESCE(?, appeal_reason),
                status = COALESCE(?, status),
                resolution_comment = CASE WHEN ? THEN NULL
                                          ELSE COALESCE(?, resolution_comment) END,
                resolved_at = CASE WHEN ? THEN NULL ELSE COALESCE(?, resolved_at) END,
                moderation_action_id = CASE WHEN ? THEN ? ELSE moderation_action_id END,
                flag_report_id = CASE WHEN ? THEN ? ELSE flag_report_id END,
                updated_at = ?
            WHERE id = ? AND deleted_at IS NULL AND (? IS NULL OR status = ?)
            "#,
        )
        .bind(changes.appeal_reason.as_deref())
        .bind(changes.status.map(|s| s.as_str()))
        .bind(changes.clear_resolution)
        .bind(changes.resolution_comment.as_deref())
        .bind(changes.clear_resolution)
        .bind(changes.resolved_at.map(format_timestamp))
        .bind(cause.is_some())
        .bind(cause.and_then(|c| c.moderation_action_id()))
        .bind(cause.is_some())
        .bind(cause.and_then(|c| c.flag_report_id()))
        .bind(format_timestamp(now))
        .bind(id)
        .bind(required)
        .bind(required)
        .execute(&self.db)
        .await;

        match result {
            Ok(done) => Ok(done.rows_affected() > 0),
            Err(e) if is_unique_violation(&e) => {
                // Only a cause change can collide
                let appellant: Option<String> =
                    sqlx::query_scalar("SELECT appellant_id FROM appeal WHERE id = ?")
                        .bind(id)
                        .fetch_optional(&self.db)
                        .await?;
                match cause {
                    Some(cause) => Err(Self::duplicate(
                        appellant.as_deref().unwrap_or("appellant"),
                        cause,
                    )),
                    None => Err(e.into()),
                }
            }
            Err(e) => Err(e.into()),
        }
    }

    async fn soft_delete(&self, id: &str, now: DateTime<Utc>) -> ModResult<bool> {
        let stamp = format_timestamp(now);
        let result = sqlx::query(
            r#"
            UPDATE appeal
            SET deleted_at = ?,
                updated_at = ?
            WHERE id = ? AND deleted_at IS NULL
            "#,
        )
        .bind(&stamp)
        .bind(&stamp)
        .bind(id)
        .execute(&self.db)
        .await?;

        Ok(result.rows_affected() > 0)
    }

    async fn hard_delete(
        &self,
        id: &str,
        expected_status: AppealStatus,
        audit: &dyn AuditTrail,
        entry: AuditEntry,
        audit_limit: Duration,
    ) -> ModResult<bool> {
        let mut tx = self.db.begin().await?;

        let result = sqlx::query("DELETE FROM appeal WHERE id = ? AND status = ?")
            .bind(id)
            .bind(expected_status.as_str())
            .execute(&mut *tx)
            .await?;

        if result.rows_affected() == 0 {
            tx.rollback().await?;
            return Ok(false);
        }

        if let Err(e) = append_required(audit, &mut tx, entry, audit_limit).await {
            tx.rollback().await?;
            return Err(e);
        }

        tx.commit().await?;
        Ok(true)
    }

    async fn list(&self, filter: &AppealFilter) -> ModResult<Vec<Appeal>> {
        let mut query: QueryBuilder<Sqlite> = QueryBuilder::new("SELECT ");
        query.push(APPEAL_COLUMNS);
        query.push(" FROM appeal WHERE 1 = 1");

        if let Some(appellant_id) = &filter.appellant_id {
            query.push(" AND appellant_id = ").push_bind(appellant_id.clone());
        }
        if let Some(status) = filter.status {
            query.push(" AND status = ").push_bind(status.as_str());
        }
        if !filter.include_retired {
            query.push(" AND ").push(ACTIVE_ONLY);
        }
        query
            .push(" ORDER BY created_at DESC, id DESC LIMIT ")
            .push_bind(filter.limit);

        let rows = query.build().fetch_all(&self.db).await?;

        rows.iter().map(Self::parse_appeal).collect()
    }
}

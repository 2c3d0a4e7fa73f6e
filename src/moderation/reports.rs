/// Content report records and their store
use super::record::{
    format_timestamp, is_unique_violation, uniqueness_scope, LifecycleStamps, ACTIVE_ONLY,
};
use crate::error::{ModerationError, ModResult};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::sqlite::SqliteRow;
use sqlx::{QueryBuilder, Row, Sqlite, SqlitePool};

/// The piece of content a report is filed against
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(tag = "type", content = "id", rename_all = "lowercase")]
pub enum ReportTarget {
    Post(String),
    Comment(String),
}

impl ReportTarget {
    /// Build a target from a `post`/`comment` discriminator and identifier
    pub fn new(content_type: &str, id: &str) -> ModResult<Self> {
        let id = id.trim();
        if id.is_empty() {
            return Err(ModerationError::Validation(
                "Report target identifier must not be empty".to_string(),
            ));
        }

        match content_type.to_lowercase().as_str() {
            "post" => Ok(ReportTarget::Post(id.to_string())),
            "comment" => Ok(ReportTarget::Comment(id.to_string())),
            _ => Err(ModerationError::Validation(format!(
                "Invalid content type: {}",
                content_type
            ))),
        }
    }

    /// Reject targets whose identifier is blank
    pub fn validated(self) -> ModResult<Self> {
        let content_type = self.content_type();
        Self::new(content_type, self.id())
    }

    pub fn content_type(&self) -> &'static str {
        match self {
            ReportTarget::Post(_) => "post",
            ReportTarget::Comment(_) => "comment",
        }
    }

    pub fn id(&self) -> &str {
        match self {
            ReportTarget::Post(id) | ReportTarget::Comment(id) => id,
        }
    }

    pub fn post_id(&self) -> Option<&str> {
        match self {
            ReportTarget::Post(id) => Some(id),
            ReportTarget::Comment(_) => None,
        }
    }

    pub fn comment_id(&self) -> Option<&str> {
        match self {
            ReportTarget::Comment(id) => Some(id),
            ReportTarget::Post(_) => None,
        }
    }

    /// Rebuild from the stored column triple, enforcing exactly-one-of
    fn from_columns(
        content_type: &str,
        post_id: Option<String>,
        comment_id: Option<String>,
    ) -> ModResult<Self> {
        match (content_type, post_id, comment_id) {
            ("post", Some(id), None) => Ok(ReportTarget::Post(id)),
            ("comment", None, Some(id)) => Ok(ReportTarget::Comment(id)),
            (content_type, post, comment) => Err(ModerationError::Internal(format!(
                "Corrupt report target: type={} post={:?} comment={:?}",
                content_type, post, comment
            ))),
        }
    }
}

/// Report status
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ReportStatus {
    Pending,
    Reviewed,
    Resolved,
    Dismissed,
}

impl ReportStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            ReportStatus::Pending => "pending",
            ReportStatus::Reviewed => "reviewed",
            ReportStatus::Resolved => "resolved",
            ReportStatus::Dismissed => "dismissed",
        }
    }

    pub fn from_str(s: &str) -> ModResult<Self> {
        match s.to_lowercase().as_str() {
            "pending" => Ok(ReportStatus::Pending),
            "reviewed" => Ok(ReportStatus::Reviewed),
            "resolved" => Ok(ReportStatus::Resolved),
            "dismissed" => Ok(ReportStatus::Dismissed),
            _ => Err(ModerationError::Validation(format!("Invalid report status: {}", s))),
        }
    }

    /// No further review expected
    pub fn is_concluded(&self) -> bool {
        matches!(self, ReportStatus::Resolved | ReportStatus::Dismissed)
    }
}

/// A member's flag against a post or comment
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ContentReport {
    pub id: String,
    pub reporter_id: String,
    pub target: ReportTarget,
    pub reason: String,
    pub status: ReportStatus,
    pub moderation_action_id: Option<String>,
    #[serde(flatten)]
    pub stamps: LifecycleStamps,
}

impl ContentReport {
    pub fn is_deleted(&self) -> bool {
        !self.stamps.is_active()
    }
}

/// Listing filter as accepted from callers
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ReportQuery {
    pub status: Option<ReportStatus>,
    #[serde(default)]
    pub include_deleted: bool,
    pub limit: Option<i64>,
}

/// Listing filter as executed by a store
#[derive(Debug, Clone)]
pub struct ReportFilter {
    pub reporter_id: Option<String>,
    pub status: Option<ReportStatus>,
    pub include_deleted: bool,
    pub limit: i64,
}

/// Persistence contract for content reports.
///
/// Mutating methods are compare-and-set: they return `false` when no active
/// row matched, and never touch soft-deleted rows.
#[async_trait]
pub trait ReportStore: Send + Sync {
    /// Insert a new report; an active duplicate yields `DuplicateReport`
    async fn insert(&self, report: &ContentReport) -> ModResult<()>;

    /// Active report for this reporter and target, if any
    async fn find_active(
        &self,
        reporter_id: &str,
        target: &ReportTarget,
    ) -> ModResult<Option<ContentReport>>;

    /// Fetch by id, soft-deleted rows included
    async fn get(&self, id: &str) -> ModResult<Option<ContentReport>>;

    /// Set `moderation_action_id` if it currently equals `expected`
    async fn set_moderation_action(
        &self,
        id: &str,
        expected: Option<&str>,
        moderation_action_id: &str,
        now: DateTime<Utc>,
    ) -> ModResult<bool>;

    /// Set status and optionally replace the reason
    async fn update_status(
        &self,
        id: &str,
        status: ReportStatus,
        reason: Option<&str>,
        now: DateTime<Utc>,
    ) -> ModResult<bool>;

    /// Stamp `deleted_at` if not already set
    async fn soft_delete(&self, id: &str, now: DateTime<Utc>) -> ModResult<bool>;

    /// Newest first
    async fn list(&self, filter: &ReportFilter) -> ModResult<Vec<ContentReport>>;
}

const REPORT_COLUMNS: &str = "id, reporter_id, content_type, content_post_id, content_comment_id, \
     reason, status, moderation_action_id, created_at, updated_at, deleted_at";

/// Report store backed by the `content_report` table
#[derive(Clone)]
pub struct SqliteReportStore {
    db: SqlitePool,
}

impl SqliteReportStore {
    pub fn new(db: SqlitePool) -> Self {
        Self { db }
    }

    fn parse_report(row: &SqliteRow) -> ModResult<ContentReport> {
        let content_type: String = row.try_get("content_type")?;
        let target = ReportTarget::from_columns(
            &content_type,
            row.try_get("content_post_id")?,
            row.try_get("content_comment_id")?,
        )?;

        let status_str: String = row.try_get("status")?;

        Ok(ContentReport {
            id: row.try_get("id")?,
            reporter_id: row.try_get("reporter_id")?,
            target,
            reason: row.try_get("reason")?,
            status: ReportStatus::from_str(&status_str)?,
            moderation_action_id: row.try_get("moderation_action_id")?,
            stamps: LifecycleStamps::from_row(row)?,
        })
    }
}

#[async_trait]
impl ReportStore for SqliteReportStore {
    async fn insert(&self, report: &ContentReport) -> ModResult<()> {
        let result = sqlx::query(
            r#"
            INSERT INTO content_report
            (id, reporter_id, content_type, content_post_id, content_comment_id, reason,
             status, moderation_action_id, created_at, updated_at, deleted_at)
            VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(&report.id)
        .bind(&report.reporter_id)
        .bind(report.target.content_type())
        .bind(report.target.post_id())
        .bind(report.target.comment_id())
        .bind(&report.reason)
        .bind(report.status.as_str())
        .bind(&report.moderation_action_id)
        .bind(format_timestamp(report.stamps.created_at))
        .bind(format_timestamp(report.stamps.updated_at))
        .bind(report.stamps.deleted_at.map(format_timestamp))
        .execute(&self.db)
        .await;

        match result {
            Ok(_) => Ok(()),
            Err(e) if is_unique_violation(&e) => Err(ModerationError::DuplicateReport(format!(
                "{} already has an active report on {} {}",
                report.reporter_id,
                report.target.content_type(),
                report.target.id()
            ))),
            Err(e) => Err(e.into()),
        }
    }

    async fn find_active(
        &self,
        reporter_id: &str,
        target: &ReportTarget,
    ) -> ModResult<Option<ContentReport>> {
        let sql = format!(
            "SELECT {} FROM content_report WHERE {} LIMIT 1",
            REPORT_COLUMNS,
            uniqueness_scope("reporter_id", &["content_post_id", "content_comment_id"])
        );

        let row = sqlx::query(&sql)
            .bind(reporter_id)
            .bind(target.post_id())
            .bind(target.comment_id())
            .fetch_optional(&self.db)
            .await?;

        row.as_ref().map(Self::parse_report).transpose()
    }

    async fn get(&self, id: &str) -> ModResult<Option<ContentReport>> {
        let sql = format!("SELECT {} FROM content_report WHERE id = ?", REPORT_COLUMNS);

        let row = sqlx::query(&sql).bind(id).fetch_optional(&self.db).await?;

        row.as_ref().map(Self::parse_report).transpose()
    }

    async fn set_moderation_action(
        &self,
        id: &str,
        expected: Option<&str>,
        moderation_action_id: &str,
        now: DateTime<Utc>,
    ) -> ModResult<bool> {
        let result = sqlx::query(
            r#"
            UPDATE content_report
            SET moderation_action_id = ?,
                updated_at = ?
            WHERE id = ? AND deleted_at IS NULL AND moderation_action_id IS ?
            "#,
        )
        .bind(moderation_action_id)
        .bind(format_timestamp(now))
        .bind(id)
        .bind(expected)
        .execute(&self.db)
        .await?;

        Ok(result.rows_affected() > 0)
    }

    async fn update_status(
        &self,
        id: &str,
        status: ReportStatus,
        reason: Option<&str>,
        now: DateTime<Utc>,
    ) -> ModResult<bool> {
        let result = sqlx::query(
            r#"
            UPDATE content_report
            SET status = ?,
                reason = COALESCE(?, reason),
                updated_at = ?
            WHERE id = ? AND deleted_at IS NULL
            "#,
        )
        .bind(status.as_str())
        .bind(reason)
        .bind(format_timestamp(now))
        .bind(id)
        .execute(&self.db)
        .await?;

        Ok(result.rows_affected() > 0)
    }

    async fn soft_delete(&self, id: &str, now: DateTime<Utc>) -> ModResult<bool> {
        let stamp = format_timestamp(now);
        let result = sqlx::query(
            r#"
            UPDATE content_report
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

    async fn list(&self, filter: &ReportFilter) -> ModResult<Vec<ContentReport>> {
        let mut query: QueryBuilder<Sqlite> = QueryBuilder::new("SELECT ");
        query.push(REPORT_COLUMNS);
        query.push(" FROM content_report WHERE 1 = 1");

        if let Some(reporter_id) = &filter.reporter_id {
            query.push(" AND reporter_id = ").push_bind(reporter_id.clone());
        }
        if let Some(status) = filter.status {
            query.push(" AND status = ").push_bind(status.as_str());
        }
        if !filter.include_deleted {
            query.push(" AND ").push(ACTIVE_ONLY);
        }
        query
            .push(" ORDER BY created_at DESC, id DESC LIMIT ")
            .push_bind(filter.limit);

        let rows = query.build().fetch_all(&self.db).await?;

        rows.iter().map(Self::parse_report).collect()
    }
}

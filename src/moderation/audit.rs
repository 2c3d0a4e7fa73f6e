/// Audit trail integration
///
/// The trail itself is an external collaborator behind the `AuditTrail`
/// trait. This module holds the entry format, the SQLite-backed trail used by
/// the server, an in-process trail, and the two write disciplines the
/// lifecycles use: best-effort and mandatory.
use super::actor::{Actor, Role};
use super::record::format_timestamp;
use crate::db::within;
use crate::error::{ModerationError, ModResult};
use crate::metrics;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::{Executor, Row, Sqlite, SqliteConnection, SqlitePool};
use std::time::Duration;
use tokio::sync::Mutex;

/// Audited action categories
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum AuditAction {
    #[serde(rename = "report.delete")]
    ReportDeleted,
    #[serde(rename = "report.action_corrected")]
    ReportActionCorrected,
    #[serde(rename = "appeal.delete")]
    AppealDeleted,
}

impl AuditAction {
    pub fn as_str(&self) -> &'static str {
        match self {
            AuditAction::ReportDeleted => "report.delete",
            AuditAction::ReportActionCorrected => "report.action_corrected",
            AuditAction::AppealDeleted => "appeal.delete",
        }
    }

    pub fn from_str(s: &str) -> ModResult<Self> {
        match s {
            "report.delete" => Ok(AuditAction::ReportDeleted),
            "report.action_corrected" => Ok(AuditAction::ReportActionCorrected),
            "appeal.delete" => Ok(AuditAction::AppealDeleted),
            _ => Err(ModerationError::Validation(format!("Invalid audit action: {}", s))),
        }
    }
}

/// Append-only audit record
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AuditEntry {
    pub actor_id: String,
    pub actor_type: Role,
    pub action_category: AuditAction,
    pub target_table: String,
    pub target_id: String,
    pub description: String,
    pub timestamp: DateTime<Utc>,
}

impl AuditEntry {
    pub fn new(
        actor: &Actor,
        action_category: AuditAction,
        target_table: &str,
        target_id: &str,
        description: impl Into<String>,
    ) -> Self {
        Self {
            actor_id: actor.id.clone(),
            actor_type: actor.role,
            action_category,
            target_table: target_table.to_string(),
            target_id: target_id.to_string(),
            description: description.into(),
            timestamp: Utc::now(),
        }
    }
}

/// Sink for audit entries
#[async_trait]
pub trait AuditTrail: Send + Sync {
    /// Append one entry
    async fn append(&self, entry: AuditEntry) -> ModResult<()>;

    /// Append through an open transaction on the desk database, so the entry
    /// commits or rolls back with it. Trails kept elsewhere ignore `conn`.
    async fn append_in(&self, _conn: &mut SqliteConnection, entry: AuditEntry) -> ModResult<()> {
        self.append(entry).await
    }
}

/// Audit trail stored in the `audit_log` table
#[derive(Clone)]
pub struct SqliteAuditTrail {
    db: SqlitePool,
}

impl SqliteAuditTrail {
    pub fn new(db: SqlitePool) -> Self {
        Self { db }
    }

    /// Entries recorded against one target, oldest first
    pub async fn entries_for(&self, target_table: &str, target_id: &str) -> ModResult<Vec<AuditEntry>> {
        let rows = sqlx::query(
            r#"
            SELECT actor_id, actor_type, action_category, target_table, target_id,
                   description, timestamp
            FROM audit_log
            WHERE target_table = ? AND target_id = ?
            ORDER BY id ASC
            "#,
        )
        .bind(target_table)
        .bind(target_id)
        .fetch_all(&self.db)
        .await?;

        let mut entries = Vec::with_capacity(rows.len());
        for row in rows {
            let actor_type: String = row.get("actor_type");
            let action: String = row.get("action_category");
            entries.push(AuditEntry {
                actor_id: row.get("actor_id"),
                actor_type: Role::from_str(&actor_type)?,
                action_category: AuditAction::from_str(&action)?,
                target_table: row.get("target_table"),
                target_id: row.get("target_id"),
                description: row.get("description"),
                timestamp: super::record::parse_timestamp(&row, "timestamp")?,
            });
        }

        Ok(entries)
    }
}

async fn insert_entry<'e, E>(executor: E, entry: &AuditEntry) -> ModResult<()>
where
    E: Executor<'e, Database = Sqlite>,
{
    sqlx::query(
        r#"
        INSERT INTO audit_log (actor_id, actor_type, action_category, target_table,
                               target_id, description, timestamp)
        VALUES (?, ?, ?, ?, ?, ?, ?)
        "#,
    )
    .bind(&entry.actor_id)
    .bind(entry.actor_type.as_str())
    .bind(entry.action_category.as_str())
    .bind(&entry.target_table)
    .bind(&entry.target_id)
    .bind(&entry.description)
    .bind(format_timestamp(entry.timestamp))
    .execute(executor)
    .await?;

    Ok(())
}

#[async_trait]
impl AuditTrail for SqliteAuditTrail {
    async fn append(&self, entry: AuditEntry) -> ModResult<()> {
        insert_entry(&self.db, &entry).await
    }

    async fn append_in(&self, conn: &mut SqliteConnection, entry: AuditEntry) -> ModResult<()> {
        insert_entry(&mut *conn, &entry).await
    }
}

/// In-process audit trail
#[derive(Default)]
pub struct MemoryAuditTrail {
    entries: Mutex<Vec<AuditEntry>>,
}

impl MemoryAuditTrail {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn entries(&self) -> Vec<AuditEntry> {
        self.entries.lock().await.clone()
    }
}

#[async_trait]
impl AuditTrail for MemoryAuditTrail {
    async fn append(&self, entry: AuditEntry) -> ModResult<()> {
        self.entries.lock().await.push(entry);
        Ok(())
    }
}

/// Append without failing the caller; failures are logged and counted.
pub(crate) async fn append_best_effort(trail: &dyn AuditTrail, entry: AuditEntry, limit: Duration) {
    let action = entry.action_category;
    let target_id = entry.target_id.clone();

    match within(limit, "audit append", trail.append(entry)).await {
        Ok(()) => metrics::record_audit_entry(action.as_str(), "written"),
        Err(e) => {
            metrics::record_audit_entry(action.as_str(), "failed");
            tracing::warn!(
                action = action.as_str(),
                target_id = %target_id,
                error = %e,
                "audit append failed"
            );
        }
    }
}

/// Append inside the caller's transaction; any failure is transient and the
/// caller must roll back.
pub(crate) async fn append_required(
    trail: &dyn AuditTrail,
    conn: &mut SqliteConnection,
    entry: AuditEntry,
    limit: Duration,
) -> ModResult<()> {
    let action = entry.action_category;

    match within(limit, "audit append", trail.append_in(conn, entry)).await {
        Ok(()) => {
            metrics::record_audit_entry(action.as_str(), "written");
            Ok(())
        }
        Err(e) => {
            metrics::record_audit_entry(action.as_str(), "failed");
            Err(match e {
                ModerationError::Transient(msg) => ModerationError::Transient(msg),
                other => ModerationError::Transient(format!("audit trail unavailable: {}", other)),
            })
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::memory_pool;

    struct BrokenTrail;

    #[async_trait]
    impl AuditTrail for BrokenTrail {
        async fn append(&self, _entry: AuditEntry) -> ModResult<()> {
            Err(ModerationError::Internal("disk full".to_string()))
        }
    }

    fn entry() -> AuditEntry {
        AuditEntry::new(
            &Actor::administrator("admin"),
            AuditAction::AppealDeleted,
            "appeal",
            "appeal-1",
            "deleted appeal appeal-1 (prior status closed)",
        )
    }

    #[tokio::test]
    async fn test_sqlite_trail_round_trip() {
        let trail = SqliteAuditTrail::new(memory_pool().await.unwrap());
        trail.append(entry()).await.unwrap();

        let entries = trail.entries_for("appeal", "appeal-1").await.unwrap();
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].action_category, AuditAction::AppealDeleted);
        assert_eq!(entries[0].actor_type, Role::Administrator);
        assert!(entries[0].description.contains("closed"));
    }

    #[tokio::test]
    async fn test_required_append_failure_is_transient() {
        let pool = memory_pool().await.unwrap();
        let mut conn = pool.acquire().await.unwrap();
        let err = append_required(&BrokenTrail, &mut conn, entry(), Duration::from_secs(1))
            .await
            .unwrap_err();
        assert!(err.is_retryable());
    }

    #[tokio::test]
    async fn test_sqlite_trail_follows_the_transaction() {
        let pool = memory_pool().await.unwrap();
        let trail = SqliteAuditTrail::new(pool.clone());

        let mut tx = pool.begin().await.unwrap();
        append_required(&trail, &mut tx, entry(), Duration::from_secs(1))
            .await
            .unwrap();
        tx.rollback().await.unwrap();
        assert!(trail.entries_for("appeal", "appeal-1").await.unwrap().is_empty());

        let mut tx = pool.begin().await.unwrap();
        append_required(&trail, &mut tx, entry(), Duration::from_secs(1))
            .await
            .unwrap();
        tx.commit().await.unwrap();
        assert_eq!(trail.entries_for("appeal", "appeal-1").await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_best_effort_append_swallows_failure() {
        append_best_effort(&BrokenTrail, entry(), Duration::from_secs(1)).await;

        let memory = MemoryAuditTrail::new();
        append_best_effort(&memory, entry(), Duration::from_secs(1)).await;
        assert_eq!(memory.entries().await.len(), 1);
    }

    #[test]
    fn test_action_names() {
        for action in [
            AuditAction::ReportDeleted,
            AuditAction::ReportActionCorrected,
            AuditAction::AppealDeleted,
        ] {
            assert_eq!(AuditAction::from_str(action.as_str()).unwrap(), action);
        }
    }
}

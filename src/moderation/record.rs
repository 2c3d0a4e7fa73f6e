/// Shared lifecycle-record capability for reports and appeals.
///
/// Both record kinds carry the same created/updated/deleted stamps, the same
/// "active rows only" uniqueness scope, and the same RFC 3339 text encoding in
/// SQLite.
use crate::error::{ModerationError, ModResult};
use chrono::{DateTime, SecondsFormat, SubsecRound, Utc};
use serde::{Deserialize, Serialize};
use sqlx::sqlite::SqliteRow;
use sqlx::Row;
use uuid::Uuid;

/// Creation, mutation and soft-deletion timestamps
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LifecycleStamps {
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub deleted_at: Option<DateTime<Utc>>,
}

impl LifecycleStamps {
    pub fn new(now: DateTime<Utc>) -> Self {
        Self {
            created_at: now,
            updated_at: now,
            deleted_at: None,
        }
    }

    pub fn is_active(&self) -> bool {
        self.deleted_at.is_none()
    }

    pub(crate) fn from_row(row: &SqliteRow) -> ModResult<Self> {
        Ok(Self {
            created_at: parse_timestamp(row, "created_at")?,
            updated_at: parse_timestamp(row, "updated_at")?,
            deleted_at: parse_optional_timestamp(row, "deleted_at")?,
        })
    }
}

/// SQL predicate selecting rows that have not been soft-deleted
pub(crate) const ACTIVE_ONLY: &str = "deleted_at IS NULL";

/// Build the lookup predicate for an active-row uniqueness scope.
///
/// `owner_column` is compared directly; each of `optional_columns` is
/// compared through `IFNULL(.., '')`, mirroring the partial unique indexes so
/// that two absent references count as equal. Bind the owner first, then
/// each optional value in order.
pub(crate) fn uniqueness_scope(owner_column: &str, optional_columns: &[&str]) -> String {
    let mut clause = format!("{} = ?", owner_column);
    for column in optional_columns {
        clause.push_str(&format!(" AND IFNULL({}, '') = IFNULL(?, '')", column));
    }
    clause.push_str(" AND ");
    clause.push_str(ACTIVE_ONLY);
    clause
}

/// Current time at the precision records are stored with
pub fn now() -> DateTime<Utc> {
    Utc::now().trunc_subsecs(6)
}

pub fn new_record_id() -> String {
    Uuid::new_v4().to_string()
}

/// Fixed-width UTC encoding, so text ordering matches time ordering
pub fn format_timestamp(dt: DateTime<Utc>) -> String {
    dt.to_rfc3339_opts(SecondsFormat::Micros, true)
}

pub(crate) fn parse_timestamp(row: &SqliteRow, column: &str) -> ModResult<DateTime<Utc>> {
    let raw: String = row.try_get(column)?;
    DateTime::parse_from_rfc3339(&raw)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|e| ModerationError::Internal(format!("Invalid timestamp in {}: {}", column, e)))
}

pub(crate) fn parse_optional_timestamp(
    row: &SqliteRow,
    column: &str,
) -> ModResult<Option<DateTime<Utc>>> {
    let raw: Option<String> = row.try_get(column)?;
    raw.map(|s| {
        DateTime::parse_from_rfc3339(&s)
            .map(|dt| dt.with_timezone(&Utc))
            .map_err(|e| {
                ModerationError::Internal(format!("Invalid timestamp in {}: {}", column, e))
            })
    })
    .transpose()
}

pub(crate) fn is_unique_violation(err: &sqlx::Error) -> bool {
    match err {
        sqlx::Error::Database(db_err) => db_err.is_unique_violation(),
        _ => false,
    }
}

/// Trim and require a non-empty text field
pub(crate) fn require_text(field: &str, value: &str) -> ModResult<String> {
    let trimmed = value.trim();
    if trimmed.is_empty() {
        return Err(ModerationError::Validation(format!("{} must not be empty", field)));
    }
    Ok(trimmed.to_string())
}

/// Treat blank optional references as absent
pub(crate) fn optional_ref(value: Option<&str>) -> Option<String> {
    value
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(String::from)
}

pub(crate) fn clamp_limit(requested: Option<i64>, default: i64, max: i64) -> i64 {
    requested.unwrap_or(default).clamp(1, max)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_uniqueness_scope_clause() {
        let clause = uniqueness_scope("appellant_id", &["moderation_action_id", "flag_report_id"]);
        assert_eq!(
            clause,
            "appellant_id = ? AND IFNULL(moderation_action_id, '') = IFNULL(?, '') \
             AND IFNULL(flag_report_id, '') = IFNULL(?, '') AND deleted_at IS NULL"
        );
    }

    #[test]
    fn test_timestamp_format_is_sortable() {
        let earlier = DateTime::parse_from_rfc3339("2024-05-01T09:00:00Z")
            .unwrap()
            .with_timezone(&Utc);
        let later = earlier + chrono::Duration::milliseconds(1500);
        assert!(format_timestamp(earlier) < format_timestamp(later));
        assert!(format_timestamp(earlier).ends_with('Z'));
    }

    #[test]
    fn test_text_helpers() {
        assert_eq!(require_text("reason", "  spam ").unwrap(), "spam");
        assert!(require_text("reason", "   ").is_err());
        assert_eq!(optional_ref(Some(" a1 ")), Some("a1".to_string()));
        assert_eq!(optional_ref(Some("")), None);
        assert_eq!(optional_ref(None), None);
    }

    #[test]
    fn test_clamp_limit() {
        assert_eq!(clamp_limit(None, 50, 200), 50);
        assert_eq!(clamp_limit(Some(1000), 50, 200), 200);
        assert_eq!(clamp_limit(Some(0), 50, 200), 1);
    }

    #[test]
    fn test_stamps() {
        let now = now();
        let mut stamps = LifecycleStamps::new(now);
        assert!(stamps.is_active());
        assert_eq!(stamps.created_at, stamps.updated_at);
        stamps.deleted_at = Some(now);
        assert!(!stamps.is_active());
    }
}

/// Metrics and telemetry for the moderation desk
///
/// Provides Prometheus-compatible counters for:
/// - Report creation, status changes and deletion
/// - Appeal creation, edits, withdrawal and erasure
/// - Audit trail writes
/// - Lifecycle errors

use crate::error::{ModerationError, ModResult};
use lazy_static::lazy_static;
use prometheus::{register_int_counter, register_int_counter_vec, Encoder, IntCounter, IntCounterVec, TextEncoder};

lazy_static! {
    // ========== Report Metrics ==========

    /// Reports created by content type
    pub static ref REPORTS_CREATED_TOTAL: IntCounterVec = register_int_counter_vec!(
        "reports_created_total",
        "Total number of content reports created",
        &["content_type"]
    )
    .unwrap();

    /// Report status updates by new status
    pub static ref REPORT_STATUS_UPDATES_TOTAL: IntCounterVec = register_int_counter_vec!(
        "report_status_updates_total",
        "Total number of report status updates",
        &["status"]
    )
    .unwrap();

    /// Moderation action attachments by outcome
    pub static ref REPORT_ACTIONS_ATTACHED_TOTAL: IntCounterVec = register_int_counter_vec!(
        "report_actions_attached_total",
        "Moderation action attachments by outcome (attached, unchanged, corrected)",
        &["outcome"]
    )
    .unwrap();

    /// Reports moved from an open status into a concluded one
    pub static ref REPORTS_CONCLUDED_TOTAL: IntCounter = register_int_counter!(
        "reports_concluded_total",
        "Total number of reports moved into resolved or dismissed"
    )
    .unwrap();

    /// Reports soft-deleted
    pub static ref REPORTS_DELETED_TOTAL: IntCounter = register_int_counter!(
        "reports_deleted_total",
        "Total number of reports soft-deleted"
    )
    .unwrap();

    // ========== Appeal Metrics ==========

    /// Appeals filed
    pub static ref APPEALS_CREATED_TOTAL: IntCounter = register_int_counter!(
        "appeals_created_total",
        "Total number of appeals filed"
    )
    .unwrap();

    /// Appeal edits by the editing role
    pub static ref APPEAL_UPDATES_TOTAL: IntCounterVec = register_int_counter_vec!(
        "appeal_updates_total",
        "Total number of accepted appeal patches",
        &["role"]
    )
    .unwrap();

    /// Appeals withdrawn by their appellant
    pub static ref APPEALS_RETIRED_TOTAL: IntCounter = register_int_counter!(
        "appeals_retired_total",
        "Total number of appeals withdrawn"
    )
    .unwrap();

    /// Appeals permanently erased
    pub static ref APPEALS_DELETED_TOTAL: IntCounter = register_int_counter!(
        "appeals_deleted_total",
        "Total number of appeals hard-deleted"
    )
    .unwrap();

    // ========== Audit Metrics ==========

    /// Audit writes by action and outcome
    pub static ref AUDIT_ENTRIES_TOTAL: IntCounterVec = register_int_counter_vec!(
        "audit_entries_total",
        "Audit trail writes",
        &["action", "outcome"]
    )
    .unwrap();

    // ========== Error Metrics ==========

    /// Errors by error type
    pub static ref MODERATION_ERRORS_TOTAL: IntCounterVec = register_int_counter_vec!(
        "moderation_errors_total",
        "Total number of failed lifecycle operations",
        &["error_type", "module"]
    )
    .unwrap();
}

/// Render metrics in Prometheus text format
pub fn render_metrics() -> ModResult<String> {
    let encoder = TextEncoder::new();
    let metric_families = prometheus::gather();
    let mut buffer = Vec::new();
    encoder
        .encode(&metric_families, &mut buffer)
        .map_err(|e| ModerationError::Internal(format!("Failed to encode metrics: {}", e)))?;
    String::from_utf8(buffer)
        .map_err(|e| ModerationError::Internal(format!("Metrics are not UTF-8: {}", e)))
}

pub fn record_report_created(content_type: &str) {
    REPORTS_CREATED_TOTAL.with_label_values(&[content_type]).inc();
}

pub fn record_report_status(status: &str) {
    REPORT_STATUS_UPDATES_TOTAL.with_label_values(&[status]).inc();
}

pub fn record_report_concluded() {
    REPORTS_CONCLUDED_TOTAL.inc();
}

pub fn record_report_action(outcome: &str) {
    REPORT_ACTIONS_ATTACHED_TOTAL.with_label_values(&[outcome]).inc();
}

pub fn record_report_deleted() {
    REPORTS_DELETED_TOTAL.inc();
}

pub fn record_appeal_created() {
    APPEALS_CREATED_TOTAL.inc();
}

pub fn record_appeal_updated(role: &str) {
    APPEAL_UPDATES_TOTAL.with_label_values(&[role]).inc();
}

pub fn record_appeal_retired() {
    APPEALS_RETIRED_TOTAL.inc();
}

pub fn record_appeal_deleted() {
    APPEALS_DELETED_TOTAL.inc();
}

pub fn record_audit_entry(action: &str, outcome: &str) {
    AUDIT_ENTRIES_TOTAL.with_label_values(&[action, outcome]).inc();
}

/// Record an error
pub fn record_error(error: &ModerationError, module: &str) {
    MODERATION_ERRORS_TOTAL
        .with_label_values(&[error.kind(), module])
        .inc();
}

/// Moderation core
///
/// Content reports, appeals, the access policy both lifecycles share, and
/// the audit trail hard deletes and corrections are recorded in.

pub mod actor;
pub mod appeal_lifecycle;
pub mod appeals;
pub mod audit;
pub mod policy;
pub mod record;
pub mod report_lifecycle;
pub mod reports;

pub use actor::{Actor, Role};
pub use appeal_lifecycle::AppealLifecycle;
pub use appeals::{
    Appeal, AppealCause, AppealPatch, AppealQuery, AppealStatus, AppealStore, SqliteAppealStore,
};
pub use audit::{AuditAction, AuditEntry, AuditTrail, MemoryAuditTrail, SqliteAuditTrail};
pub use policy::{can_access, Access};
pub use record::LifecycleStamps;
pub use report_lifecycle::ReportLifecycle;
pub use reports::{
    ContentReport, ReportQuery, ReportStatus, ReportStore, ReportTarget, SqliteReportStore,
};

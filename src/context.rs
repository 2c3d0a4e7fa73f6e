/// Application context and dependency injection
use crate::{
    config::ServerConfig,
    db,
    error::ModResult,
    moderation::{
        AppealLifecycle, ReportLifecycle, SqliteAppealStore, SqliteAuditTrail, SqliteReportStore,
    },
};
use sqlx::SqlitePool;
use std::sync::Arc;

/// Application context holding all shared services
#[derive(Clone)]
pub struct AppContext {
    pub config: Arc<ServerConfig>,
    pub db: SqlitePool,
    pub reports: Arc<ReportLifecycle>,
    pub appeals: Arc<AppealLifecycle>,
    pub audit: Arc<SqliteAuditTrail>,
}

impl AppContext {
    /// Create a new application context from configuration
    pub async fn new(config: ServerConfig) -> ModResult<Self> {
        // Validate configuration
        config.validate()?;

        let pool = db::create_pool(
            &config.storage.database,
            db::DatabaseOptions {
                max_connections: config.storage.max_connections,
                ..Default::default()
            },
        )
        .await?;

        db::run_migrations(&pool).await?;
        db::test_connection(&pool).await?;

        tracing::info!(database = %config.storage.database.display(), "database ready");

        Ok(Self::with_pool(config, pool))
    }

    /// Wire the services over an already-migrated pool
    pub fn with_pool(config: ServerConfig, pool: SqlitePool) -> Self {
        let audit = Arc::new(SqliteAuditTrail::new(pool.clone()));

        let reports = Arc::new(ReportLifecycle::new(
            Arc::new(SqliteReportStore::new(pool.clone())),
            audit.clone(),
            config.moderation.clone(),
        ));
        let appeals = Arc::new(AppealLifecycle::new(
            Arc::new(SqliteAppealStore::new(pool.clone())),
            audit.clone(),
            config.moderation.clone(),
        ));

        Self {
            config: Arc::new(config),
            db: pool,
            reports,
            appeals,
            audit,
        }
    }

    /// Get the service URL
    pub fn service_url(&self) -> String {
        format!(
            "http://{}:{}",
            self.config.service.hostname, self.config.service.port
        )
    }
}

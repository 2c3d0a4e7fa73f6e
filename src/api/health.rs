/// Health check and metrics endpoints
///
/// Supports two types of probes:
/// - Liveness: Is the application alive? (restart if not)
/// - Readiness: Can the application serve traffic? (database reachable)

use crate::{context::AppContext, db, error::ModResult, metrics};
use axum::{
    extract::State,
    http::{header, StatusCode},
    response::{IntoResponse, Json},
    routing::get,
    Router,
};
use std::time::Instant;

/// Build health check routes
pub fn routes() -> Router<AppContext> {
    Router::new()
        .route("/health", get(health_basic))
        .route("/health/ready", get(readiness_probe))
        .route("/metrics", get(metrics_endpoint))
}

/// Basic health check
///
/// Returns simple JSON with status and version
pub async fn health_basic() -> Json<serde_json::Value> {
    Json(serde_json::json!({
        "status": "ok",
        "version": env!("CARGO_PKG_VERSION")
    }))
}

/// Readiness probe
///
/// Returns 200 once the database answers within the store timeout, 503
/// otherwise.
pub async fn readiness_probe(
    State(ctx): State<AppContext>,
) -> Result<Json<serde_json::Value>, StatusCode> {
    let start = Instant::now();

    if let Err(e) = check_database(&ctx).await {
        tracing::warn!(error = %e, "readiness_probe_failed: database check failed");
        return Err(StatusCode::SERVICE_UNAVAILABLE);
    }

    Ok(Json(serde_json::json!({
        "status": "ready",
        "version": env!("CARGO_PKG_VERSION"),
        "database_ms": start.elapsed().as_millis() as u64
    })))
}

/// Prometheus text exposition
pub async fn metrics_endpoint() -> ModResult<impl IntoResponse> {
    let body = metrics::render_metrics()?;

    Ok((
        [(header::CONTENT_TYPE, "text/plain; version=0.0.4")],
        body,
    ))
}

async fn check_database(ctx: &AppContext) -> ModResult<()> {
    db::within(
        ctx.config.moderation.store_timeout(),
        "database ping",
        db::test_connection(&ctx.db),
    )
    .await
}

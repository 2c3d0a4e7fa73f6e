/// Content report endpoints
use super::{JsonBody, QueryParams};
use crate::{
    auth::ActorContext,
    context::AppContext,
    error::ModResult,
    moderation::{ContentReport, ReportQuery, ReportStatus, ReportTarget},
};
use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    response::Json,
    routing::{get, patch},
    Router,
};
use axum_extra::extract::WithRejection;
use serde::{Deserialize, Serialize};

/// Build report routes
pub fn routes() -> Router<AppContext> {
    Router::new()
        .route("/reports", get(list_reports).post(create_report))
        .route(
            "/reports/:id",
            get(read_report).patch(update_status).delete(delete_report),
        )
        .route("/reports/:id/action", patch(attach_action))
}

#[derive(Debug, Deserialize)]
pub struct CreateReportRequest {
    pub target: ReportTarget,
    pub reason: String,
}

#[derive(Debug, Deserialize)]
pub struct AttachActionRequest {
    pub moderation_action_id: String,
}

#[derive(Debug, Deserialize)]
pub struct UpdateStatusRequest {
    pub status: ReportStatus,
    pub reason: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
pub struct ReadParams {
    #[serde(default)]
    pub include_deleted: bool,
}

#[derive(Debug, Serialize)]
pub struct ReportList {
    pub reports: Vec<ContentReport>,
}

async fn create_report(
    State(ctx): State<AppContext>,
    auth: ActorContext,
    WithRejection(Json(req), _): JsonBody<CreateReportRequest>,
) -> ModResult<(StatusCode, Json<ContentReport>)> {
    let report = ctx
        .reports
        .create(&auth.actor.id, req.target, &req.reason)
        .await?;

    Ok((StatusCode::CREATED, Json(report)))
}

async fn attach_action(
    State(ctx): State<AppContext>,
    auth: ActorContext,
    Path(id): Path<String>,
    WithRejection(Json(req), _): JsonBody<AttachActionRequest>,
) -> ModResult<Json<ContentReport>> {
    let report = ctx
        .reports
        .attach_moderation_action(&id, &req.moderation_action_id, &auth.actor)
        .await?;

    Ok(Json(report))
}

async fn update_status(
    State(ctx): State<AppContext>,
    auth: ActorContext,
    Path(id): Path<String>,
    WithRejection(Json(req), _): JsonBody<UpdateStatusRequest>,
) -> ModResult<Json<ContentReport>> {
    let report = ctx
        .reports
        .update_status(&id, req.status, req.reason.as_deref(), &auth.actor)
        .await?;

    Ok(Json(report))
}

async fn delete_report(
    State(ctx): State<AppContext>,
    auth: ActorContext,
    Path(id): Path<String>,
) -> ModResult<StatusCode> {
    ctx.reports.soft_delete(&id, &auth.actor).await?;

    Ok(StatusCode::NO_CONTENT)
}

async fn read_report(
    State(ctx): State<AppContext>,
    auth: ActorContext,
    Path(id): Path<String>,
    WithRejection(Query(params), _): QueryParams<ReadParams>,
) -> ModResult<Json<ContentReport>> {
    let report = ctx
        .reports
        .read(&id, &auth.actor, params.include_deleted)
        .await?;

    Ok(Json(report))
}

async fn list_reports(
    State(ctx): State<AppContext>,
    auth: ActorContext,
    WithRejection(Query(query), _): QueryParams<ReportQuery>,
) -> ModResult<Json<ReportList>> {
    let reports = ctx.reports.list(&auth.actor, query).await?;

    Ok(Json(ReportList { reports }))
}

/// Appeal endpoints
use super::{JsonBody, QueryParams};
use crate::{
    auth::ActorContext,
    context::AppContext,
    error::ModResult,
    moderation::{Appeal, AppealCause, AppealPatch, AppealQuery},
};
use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    response::Json,
    routing::{get, post},
    Router,
};
use axum_extra::extract::WithRejection;
use serde::{Deserialize, Serialize};

/// Build appeal routes
pub fn routes() -> Router<AppContext> {
    Router::new()
        .route("/appeals", get(list_appeals).post(create_appeal))
        .route(
            "/appeals/:id",
            get(read_appeal).patch(update_appeal).delete(delete_appeal),
        )
        .route("/appeals/:id/retire", post(retire_appeal))
}

#[derive(Debug, Deserialize)]
pub struct CreateAppealRequest {
    /// Defaults to the caller
    pub appellant_id: Option<String>,
    pub moderation_action_id: Option<String>,
    pub flag_report_id: Option<String>,
    pub appeal_reason: String,
}

#[derive(Debug, Serialize)]
pub struct AppealList {
    pub appeals: Vec<Appeal>,
}

async fn create_appeal(
    State(ctx): State<AppContext>,
    auth: ActorContext,
    WithRejection(Json(req), _): JsonBody<CreateAppealRequest>,
) -> ModResult<(StatusCode, Json<Appeal>)> {
    let cause = AppealCause::new(
        req.moderation_action_id.as_deref(),
        req.flag_report_id.as_deref(),
    )?;
    let appellant_id = req.appellant_id.unwrap_or_else(|| auth.actor.id.clone());

    let appeal = ctx
        .appeals
        .create(&auth.actor, &appellant_id, cause, &req.appeal_reason)
        .await?;

    Ok((StatusCode::CREATED, Json(appeal)))
}

async fn update_appeal(
    State(ctx): State<AppContext>,
    auth: ActorContext,
    Path(id): Path<String>,
    WithRejection(Json(patch), _): JsonBody<AppealPatch>,
) -> ModResult<Json<Appeal>> {
    let appeal = ctx.appeals.update(&id, patch, &auth.actor).await?;

    Ok(Json(appeal))
}

async fn delete_appeal(
    State(ctx): State<AppContext>,
    auth: ActorContext,
    Path(id): Path<String>,
) -> ModResult<StatusCode> {
    ctx.appeals.delete(&id, &auth.actor).await?;

    Ok(StatusCode::NO_CONTENT)
}

async fn retire_appeal(
    State(ctx): State<AppContext>,
    auth: ActorContext,
    Path(id): Path<String>,
) -> ModResult<Json<Appeal>> {
    let appeal = ctx.appeals.soft_retire(&id, &auth.actor).await?;

    Ok(Json(appeal))
}

async fn read_appeal(
    State(ctx): State<AppContext>,
    auth: ActorContext,
    Path(id): Path<String>,
) -> ModResult<Json<Appeal>> {
    let appeal = ctx.appeals.read(&id, &auth.actor).await?;

    Ok(Json(appeal))
}

async fn list_appeals(
    State(ctx): State<AppContext>,
    auth: ActorContext,
    WithRejection(Query(query), _): QueryParams<AppealQuery>,
) -> ModResult<Json<AppealList>> {
    let appeals = ctx.appeals.list(&auth.actor, query).await?;

    Ok(Json(AppealList { appeals }))
}

/// API routes and handlers
pub mod appeals;
pub mod health;
pub mod reports;

use crate::{context::AppContext, error::ModerationError};
use axum::{extract::Query, Json, Router};
use axum_extra::extract::WithRejection;

/// JSON body whose rejections surface as `ValidationError`
pub type JsonBody<T> = WithRejection<Json<T>, ModerationError>;

/// Query string whose rejections surface as `ValidationError`
pub type QueryParams<T> = WithRejection<Query<T>, ModerationError>;

/// Build API routes
pub fn routes() -> Router<AppContext> {
    Router::new()
        .merge(health::routes())
        .merge(reports::routes())
        .merge(appeals::routes())
}

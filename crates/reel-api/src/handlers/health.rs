//! Liveness and queue observability.

use axum::{extract::State, http::StatusCode, response::Response};
use serde::Serialize;
use std::sync::Arc;

use reel_db::QueueStats;

use crate::error::{success, HttpError};
use crate::state::AppState;

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct HealthView {
    pub status: &'static str,
    pub database: bool,
    pub queue: Option<QueueStats>,
}

/// GET /health
pub async fn health(State(state): State<Arc<AppState>>) -> Result<Response, HttpError> {
    let database = sqlx::query_scalar::<_, i32>("SELECT 1")
        .fetch_one(&state.pool)
        .await
        .is_ok();

    let queue = if database {
        state.jobs.stats().await.ok()
    } else {
        None
    };

    let status = if database { "ok" } else { "degraded" };
    Ok(success(
        if database {
            StatusCode::OK
        } else {
            StatusCode::SERVICE_UNAVAILABLE
        },
        HealthView {
            status,
            database,
            queue,
        },
    ))
}

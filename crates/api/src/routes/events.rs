//! Internal event-ingest routes, called by the clarification and benchmark
//! paths of the portal once an event has been committed.

use axum::extract::{Path, State};
use axum::routing::post;
use axum::{Json, Router};
use serde::Deserialize;

use portal_common::error::AppError;
use portal_notifier::DispatchReport;

use crate::middleware::auth::InternalCaller;
use crate::state::AppState;

pub fn router() -> Router<AppState> {
    Router::new()
        .route(
            "/internal/clarifications/{id}/answered",
            post(clarification_answered),
        )
        .route(
            "/internal/benchmark_jobs/{id}/finished",
            post(benchmark_job_finished),
        )
}

#[derive(Debug, Default, Deserialize)]
pub struct ClarificationAnsweredRequest {
    /// Set when an existing answer was edited
    #[serde(default)]
    pub updated: bool,
}

/// POST /internal/clarifications/:id/answered
async fn clarification_answered(
    State(state): State<AppState>,
    _caller: InternalCaller,
    Path(id): Path<i64>,
    Json(req): Json<ClarificationAnsweredRequest>,
) -> Result<Json<DispatchReport>, AppError> {
    let clarification = state.events.clarification(id).await?;
    if clarification.answer.is_none() {
        return Err(AppError::Validation(format!(
            "Clarification {} has no answer yet",
            id
        )));
    }

    let report = state
        .notifier
        .notify_clarification_answered(&clarification, req.updated)
        .await?;
    Ok(Json(report))
}

/// POST /internal/benchmark_jobs/:id/finished
async fn benchmark_job_finished(
    State(state): State<AppState>,
    _caller: InternalCaller,
    Path(id): Path<i64>,
) -> Result<Json<DispatchReport>, AppError> {
    let job = state.events.benchmark_job(id).await?;
    let report = state.notifier.notify_benchmark_job_finished(&job).await?;
    Ok(Json(report))
}

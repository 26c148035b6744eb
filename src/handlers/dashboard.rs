// src/handlers/dashboard.rs

use axum::{
    extract::{Query, State},
    http::StatusCode,
    response::{Html, IntoResponse},
    Json,
};
use chrono::Utc;

use crate::{
    common::error::AppError,
    config::AppState,
    // Importamos os models para referenciar no Swagger
    models::{
        dashboard::{ActivityResponse, HealthResponse, LogsResponse, SummaryResponse},
        sync_log::LogQuery,
    },
    services::dashboard_service::render_status_page,
};

// GET /
#[utoipa::path(
    get,
    path = "/",
    tag = "Dashboard",
    responses(
        (status = 200, description = "Página de status (HTML, recarrega sozinha)", content_type = "text/html", body = String)
    )
)]
pub async fn status_page(State(app_state): State<AppState>) -> Result<impl IntoResponse, AppError> {
    let snapshot = app_state.dashboard_service.snapshot().await?;
    Ok(Html(render_status_page(&snapshot)))
}

// GET /api/logs
#[utoipa::path(
    get,
    path = "/api/logs",
    tag = "Dashboard",
    params(LogQuery),
    responses(
        (status = 200, description = "Linhas mais recentes de sync_logs", body = LogsResponse)
    )
)]
pub async fn get_logs(
    State(app_state): State<AppState>,
    Query(query): Query<LogQuery>,
) -> Result<impl IntoResponse, AppError> {
    let logs = app_state.dashboard_service.get_logs(&query).await?;
    Ok((StatusCode::OK, Json(LogsResponse { logs })))
}

// GET /api/summary
#[utoipa::path(
    get,
    path = "/api/summary",
    tag = "Dashboard",
    responses(
        (status = 200, description = "Contadores de clients e leads (v_summary)", body = SummaryResponse)
    )
)]
pub async fn get_summary(State(app_state): State<AppState>) -> Result<impl IntoResponse, AppError> {
    let summary = app_state.dashboard_service.get_summary().await?;
    Ok((StatusCode::OK, Json(SummaryResponse { summary })))
}

// GET /api/activity
#[utoipa::path(
    get,
    path = "/api/activity",
    tag = "Dashboard",
    responses(
        (status = 200, description = "Ações das últimas 24h por status", body = ActivityResponse)
    )
)]
pub async fn get_activity(State(app_state): State<AppState>) -> Result<impl IntoResponse, AppError> {
    let activity = app_state.dashboard_service.get_activity().await?;
    Ok((StatusCode::OK, Json(ActivityResponse { activity })))
}

// GET /health
#[utoipa::path(
    get,
    path = "/health",
    tag = "Health",
    responses(
        (status = 200, description = "Processo vivo", body = HealthResponse)
    )
)]
pub async fn health() -> impl IntoResponse {
    Json(HealthResponse {
        status: "ok".to_string(),
        timestamp: Utc::now().naive_utc(),
    })
}

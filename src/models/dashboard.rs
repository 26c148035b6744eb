// src/models/dashboard.rs

use chrono::NaiveDateTime;
use serde::Serialize;
use sqlx::FromRow;
use utoipa::ToSchema;

use crate::models::sync_log::SyncLogEntry;

// 1. Uma linha de v_summary (clients / leads)
#[derive(Debug, Clone, Serialize, FromRow, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct SummaryRow {
    pub category: String,
    pub total: i64,
    pub opted_in_email: i64,
    pub in_mailchimp: i64,
    pub subscribed: i64,
    pub needs_sync: i64,
    pub last_pabau_sync: Option<NaiveDateTime>,
    pub last_mailchimp_sync: Option<NaiveDateTime>,
}

// 2. Atividade das últimas 24h (v_recent_activity)
#[derive(Debug, Clone, Serialize, FromRow, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct ActivityRow {
    pub action: String,
    pub status: String,
    pub total: i64,
    pub last_at: Option<NaiveDateTime>,
}

// 3. Tudo que a página de status precisa
#[derive(Debug, Clone, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct DashboardSnapshot {
    pub summary: Vec<SummaryRow>,
    pub activity: Vec<ActivityRow>,
    pub recent_logs: Vec<SyncLogEntry>,
    pub generated_at: NaiveDateTime,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct HealthResponse {
    pub status: String,
    pub timestamp: NaiveDateTime,
}

// Envelopes das respostas JSON do painel
#[derive(Debug, Serialize, ToSchema)]
pub struct SummaryResponse {
    pub summary: Vec<SummaryRow>,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct ActivityResponse {
    pub activity: Vec<ActivityRow>,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct LogsResponse {
    pub logs: Vec<SyncLogEntry>,
}

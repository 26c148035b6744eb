// src/db/dashboard_repo.rs

use sqlx::PgPool;

use crate::{
    common::error::AppError,
    models::{
        dashboard::{ActivityRow, SummaryRow},
        sync_log::SyncLogEntry,
    },
};

/// Leituras do painel. Nada aqui escreve no banco.
#[derive(Clone)]
pub struct DashboardRepository {
    pool: PgPool,
}

impl DashboardRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    // 1. Contadores por tabela
    pub async fn get_summary(&self) -> Result<Vec<SummaryRow>, AppError> {
        let rows = sqlx::query_as::<_, SummaryRow>(
            r#"
            SELECT category::TEXT AS category, total, opted_in_email, in_mailchimp,
                   subscribed, needs_sync, last_pabau_sync, last_mailchimp_sync
            FROM v_summary
            ORDER BY category
            "#,
        )
        .fetch_all(&self.pool)
        .await?;

        Ok(rows)
    }

    // 2. Últimas linhas do log (mais recentes primeiro)
    pub async fn get_recent_logs(
        &self,
        limit: i64,
        action: Option<&str>,
    ) -> Result<Vec<SyncLogEntry>, AppError> {
        let logs = sqlx::query_as::<_, SyncLogEntry>(
            r#"
            SELECT id, entity_type, entity_id, pabau_id, email, action, status,
                   message, error_details, field_changes, created_at
            FROM sync_logs
            WHERE ($2::TEXT IS NULL OR action = $2)
            ORDER BY created_at DESC, id DESC
            LIMIT $1
            "#,
        )
        .bind(limit)
        .bind(action)
        .fetch_all(&self.pool)
        .await?;

        Ok(logs)
    }

    // 3. Atividade das últimas 24h
    pub async fn get_activity(&self) -> Result<Vec<ActivityRow>, AppError> {
        let rows = sqlx::query_as::<_, ActivityRow>(
            "SELECT action, status, total, last_at FROM v_recent_activity ORDER BY last_at DESC",
        )
        .fetch_all(&self.pool)
        .await?;

        Ok(rows)
    }
}

// src/services/dashboard_service.rs

use std::fmt::Write;

use chrono::Utc;

use crate::{
    common::error::AppError,
    db::DashboardRepository,
    models::{
        dashboard::{ActivityRow, DashboardSnapshot, SummaryRow},
        sync_log::{LogQuery, SyncLogEntry, DEFAULT_LOG_LIMIT},
    },
};

/// Segundos entre recargas automáticas da página de status
pub const REFRESH_SECONDS: u32 = 60;

#[derive(Clone)]
pub struct DashboardService {
    repo: DashboardRepository,
}

impl DashboardService {
    pub fn new(repo: DashboardRepository) -> Self {
        Self { repo }
    }

    pub async fn get_summary(&self) -> Result<Vec<SummaryRow>, AppError> {
        self.repo.get_summary().await
    }

    pub async fn get_activity(&self) -> Result<Vec<ActivityRow>, AppError> {
        self.repo.get_activity().await
    }

    pub async fn get_logs(&self, query: &LogQuery) -> Result<Vec<SyncLogEntry>, AppError> {
        let action = query
            .action
            .as_deref()
            .map(str::trim)
            .filter(|a| !a.is_empty());
        self.repo
            .get_recent_logs(query.effective_limit(), action)
            .await
    }

    pub async fn snapshot(&self) -> Result<DashboardSnapshot, AppError> {
        Ok(DashboardSnapshot {
            summary: self.repo.get_summary().await?,
            activity: self.repo.get_activity().await?,
            recent_logs: self.repo.get_recent_logs(DEFAULT_LOG_LIMIT, None).await?,
            generated_at: Utc::now().naive_utc(),
        })
    }
}

// =========================================================================
//  HTML
// =========================================================================

fn escape(raw: &str) -> String {
    let mut out = String::with_capacity(raw.len());
    for c in raw.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&#39;"),
            _ => out.push(c),
        }
    }
    out
}

fn opt(value: Option<&str>) -> String {
    value.map(escape).unwrap_or_default()
}

/// Página de status: resumo, atividade das últimas 24h e log recente.
pub fn render_status_page(snapshot: &DashboardSnapshot) -> String {
    let mut html = String::new();

    // `write!` em String não falha
    let _ = write!(
        html,
        r#"<!DOCTYPE html>
<html lang="en">
<head>
<meta charset="utf-8">
<meta http-equiv="refresh" content="{refresh}">
<title>Pabau / Mailchimp sync</title>
<style>
body {{ font-family: system-ui, sans-serif; margin: 2rem; color: #222; }}
table {{ border-collapse: collapse; margin-bottom: 2rem; width: 100%; }}
th, td {{ border: 1px solid #ddd; padding: .4rem .6rem; text-align: left; font-size: .9rem; }}
th {{ background: #f4f4f4; }}
.success {{ color: #1a7f37; }} .error {{ color: #cf222e; }} .skipped {{ color: #9a6700; }}
</style>
</head>
<body>
<h1>Pabau / Mailchimp sync</h1>
<p>Generated at {generated} UTC</p>
"#,
        refresh = REFRESH_SECONDS,
        generated = snapshot.generated_at.format("%Y-%m-%d %H:%M:%S"),
    );

    html.push_str(
        "<h2>Summary</h2>\n<table>\n<tr><th>Category</th><th>Total</th><th>Opted in</th>\
         <th>In Mailchimp</th><th>Subscribed</th><th>Needs sync</th>\
         <th>Last Pabau sync</th><th>Last Mailchimp sync</th></tr>\n",
    );
    for row in &snapshot.summary {
        let _ = writeln!(
            html,
            "<tr><td>{}</td><td>{}</td><td>{}</td><td>{}</td><td>{}</td><td>{}</td><td>{}</td><td>{}</td></tr>",
            escape(&row.category),
            row.total,
            row.opted_in_email,
            row.in_mailchimp,
            row.subscribed,
            row.needs_sync,
            row.last_pabau_sync.map(|t| t.to_string()).unwrap_or_default(),
            row.last_mailchimp_sync.map(|t| t.to_string()).unwrap_or_default(),
        );
    }
    html.push_str("</table>\n");

    html.push_str(
        "<h2>Last 24 hours</h2>\n<table>\n<tr><th>Action</th><th>Status</th><th>Count</th><th>Last</th></tr>\n",
    );
    for row in &snapshot.activity {
        let _ = writeln!(
            html,
            "<tr><td>{}</td><td class=\"{status}\">{status}</td><td>{}</td><td>{}</td></tr>",
            escape(&row.action),
            row.total,
            row.last_at.map(|t| t.to_string()).unwrap_or_default(),
            status = escape(&row.status),
        );
    }
    html.push_str("</table>\n");

    html.push_str(
        "<h2>Recent log</h2>\n<table>\n<tr><th>When</th><th>Action</th><th>Status</th>\
         <th>Type</th><th>Pabau id</th><th>Email</th><th>Message</th></tr>\n",
    );
    for log in &snapshot.recent_logs {
        let message = log
            .message
            .as_deref()
            .or(log.error_details.as_deref());
        let _ = writeln!(
            html,
            "<tr><td>{}</td><td>{}</td><td class=\"{status}\">{status}</td><td>{}</td><td>{}</td><td>{}</td><td>{}</td></tr>",
            log.created_at.format("%Y-%m-%d %H:%M:%S"),
            escape(&log.action),
            opt(log.entity_type.as_deref()),
            log.pabau_id.map(|id| id.to_string()).unwrap_or_default(),
            opt(log.email.as_deref()),
            opt(message),
            status = escape(&log.status),
        );
    }
    html.push_str("</table>\n</body>\n</html>\n");

    html
}

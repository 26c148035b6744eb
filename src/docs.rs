// src/docs.rs

use utoipa::OpenApi;
use crate::handlers;
use crate::models;

#[derive(OpenApi)]
#[openapi(
    paths(
        // --- Dashboard ---
        handlers::dashboard::status_page,
        handlers::dashboard::get_logs,
        handlers::dashboard::get_summary,
        handlers::dashboard::get_activity,

        // --- Health ---
        handlers::dashboard::health,
    ),
    components(
        schemas(
            // --- DASHBOARD ---
            models::dashboard::SummaryRow,
            models::dashboard::ActivityRow,
            models::dashboard::SummaryResponse,
            models::dashboard::ActivityResponse,
            models::dashboard::LogsResponse,
            models::dashboard::HealthResponse,

            // --- SYNC LOG ---
            models::sync_log::SyncLogEntry,
            models::sync_log::SyncStatus,
            models::contact::ContactKind,
        )
    ),
    tags(
        (name = "Dashboard", description = "Status do sync Pabau / Mailchimp (somente leitura)"),
        (name = "Health", description = "Liveness")
    ),
    modifiers(&InfoAddon)
)]
pub struct ApiDoc;

struct InfoAddon;

impl utoipa::Modify for InfoAddon {
    fn modify(&self, openapi: &mut utoipa::openapi::OpenApi) {
        openapi.info.title = "contact-sync".to_string();
        openapi.info.version = env!("CARGO_PKG_VERSION").to_string();
        openapi.info.description =
            Some("Pabau CRM -> Postgres -> Mailchimp contact sync dashboard".to_string());
    }
}

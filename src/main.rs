//src/main.rs

use std::sync::Arc;

use axum::{routing::get, Router};
use clap::{Parser, Subcommand};
use tokio::net::TcpListener;
use tracing_subscriber::EnvFilter;
use utoipa::OpenApi;
use utoipa_swagger_ui::SwaggerUi;

// Declaração dos nossos módulos
mod clients;
mod common;
mod config;
mod db;
mod docs;
mod handlers;
mod models;
mod services;

use crate::{
    common::error::AppError,
    config::{AppState, Settings},
    docs::ApiDoc,
    services::scheduler::{CycleOutcome, SyncStep},
};

#[derive(Parser)]
#[command(name = "contact-sync")]
#[command(about = "Pabau CRM -> Postgres -> Mailchimp contact sync")]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Subcommand)]
enum Command {
    /// Dashboard HTTP + sync agendado (padrão)
    Serve,
    /// Roda um ciclo de sync agora e sai
    Sync {
        #[arg(long, value_enum, default_value = "all")]
        step: SyncStep,
    },
    /// Carga inicial: clients -> leads -> status do Mailchimp
    Backfill {
        #[arg(long)]
        skip_mailchimp: bool,
    },
    /// Só aplica as migrações
    Migrate,
}

fn init_tracing(settings: &Settings) {
    // RUST_LOG tem prioridade sobre LOG_LEVEL
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(&settings.log_level));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .compact()
        .init();
}

async fn run_migrations(app_state: &AppState) -> Result<(), AppError> {
    // Faz o app rodar as migrações do SQLx na inicialização
    sqlx::migrate!().run(&app_state.db_pool).await?;
    tracing::info!("✅ Migrações do banco de dados executadas com sucesso!");
    Ok(())
}

fn router(app_state: AppState) -> Router {
    Router::new()
        .route("/", get(handlers::dashboard::status_page))
        .route("/api/logs", get(handlers::dashboard::get_logs))
        .route("/api/summary", get(handlers::dashboard::get_summary))
        .route("/api/activity", get(handlers::dashboard::get_activity))
        .route("/health", get(handlers::dashboard::health))
        .merge(SwaggerUi::new("/swagger-ui").url("/api-docs/openapi.json", ApiDoc::openapi()))
        .with_state(app_state)
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!("Falha ao escutar Ctrl-C: {}", e);
    }
    tracing::info!("🛑 Desligando...");
}

async fn serve(app_state: AppState) -> anyhow::Result<()> {
    run_migrations(&app_state).await?;

    let runner = Arc::new(app_state.sync_runner()?);
    let scheduler = runner.spawn(
        app_state.settings.sync_interval,
        app_state.settings.run_initial_sync,
    );
    tracing::info!(
        "⏱️ Sync agendado a cada {} minutos (Mailchimp list {} em {})",
        app_state.settings.sync_interval.as_secs() / 60,
        app_state.settings.mailchimp_list_id,
        app_state.settings.mailchimp_server_prefix
    );

    let addr = format!("0.0.0.0:{}", app_state.settings.port);
    let listener = TcpListener::bind(&addr).await?;
    tracing::info!("🚀 Servidor escutando em {}", listener.local_addr()?);

    axum::serve(listener, router(app_state))
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    scheduler.abort();
    Ok(())
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    // Se a configuração falhar, a aplicação não deve iniciar.
    let settings = Settings::from_env()?;
    init_tracing(&settings);

    let app_state = AppState::new(settings).await?;

    match cli.command.unwrap_or(Command::Serve) {
        Command::Serve => serve(app_state).await?,
        Command::Migrate => run_migrations(&app_state).await?,
        Command::Sync { step } => {
            run_migrations(&app_state).await?;
            match app_state.sync_runner()?.run_cycle(step).await? {
                CycleOutcome::Completed(report) => {
                    tracing::info!("Sync {} concluído: {:#?}", report.run_id, report);
                    if !report.failed_steps.is_empty() {
                        anyhow::bail!("sync steps failed: {}", report.failed_steps.join(", "));
                    }
                }
                CycleOutcome::Skipped => {
                    tracing::warn!("Outro ciclo de sync segura o lock; nada foi feito");
                }
            }
        }
        Command::Backfill { skip_mailchimp } => {
            run_migrations(&app_state).await?;
            let report = app_state.backfill_service()?.run(skip_mailchimp).await?;
            tracing::info!("Backfill concluído: {:#?}", report);
        }
    }

    Ok(())
}

// src/config.rs

use std::{sync::Arc, time::Duration};

use sqlx::{postgres::PgPoolOptions, PgPool};

use crate::{
    clients::{MailchimpClient, PabauClient},
    common::error::AppError,
    db::{ContactStore, DashboardRepository, PgContactStore},
    services::{
        backfill::BackfillService, dashboard_service::DashboardService,
        mailchimp_push::MailchimpPushService, pabau_sync::PabauSyncService,
        scheduler::SyncRunner, unsubscribe_sync::UnsubscribeSyncService,
    },
};

pub const DEFAULT_PABAU_API_URL: &str = "https://api.oauth.pabau.com";

/// Tudo que vem do ambiente. Nada aqui tem valor secreto padrão.
#[derive(Debug, Clone, PartialEq)]
pub struct Settings {
    pub database_url: String,
    pub pabau_api_key: String,
    pub pabau_api_url: String,
    pub mailchimp_api_key: String,
    pub mailchimp_list_id: String,
    pub mailchimp_server_prefix: String,
    pub mailchimp_api_url: String,
    pub log_level: String,
    pub port: u16,
    pub sync_interval: Duration,
    pub run_initial_sync: bool,
    pub http_timeout: Duration,
}

fn required(lookup: &impl Fn(&str) -> Option<String>, key: &str) -> Result<String, AppError> {
    lookup(key)
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
        .ok_or_else(|| AppError::Config(format!("{} must be set", key)))
}

fn optional(lookup: &impl Fn(&str) -> Option<String>, key: &str) -> Option<String> {
    lookup(key)
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

fn parsed<T: std::str::FromStr>(
    lookup: &impl Fn(&str) -> Option<String>,
    key: &str,
    default: T,
) -> Result<T, AppError> {
    match optional(lookup, key) {
        None => Ok(default),
        Some(raw) => raw
            .parse()
            .map_err(|_| AppError::Config(format!("{} has an invalid value: '{}'", key, raw))),
    }
}

impl Settings {
    /// Lê `.env` (se existir) e depois o ambiente do processo.
    pub fn from_env() -> Result<Self, AppError> {
        dotenvy::dotenv().ok();
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, AppError> {
        let mailchimp_api_key = required(&lookup, "MAILCHIMP_API_KEY")?;

        // A key do Mailchimp termina com o datacenter, ex: "abc123-us14"
        let mailchimp_server_prefix = optional(&lookup, "MAILCHIMP_SERVER_PREFIX")
            .or_else(|| {
                mailchimp_api_key
                    .rsplit_once('-')
                    .map(|(_, dc)| dc.to_string())
                    .filter(|dc| !dc.is_empty())
            })
            .unwrap_or_else(|| "us1".to_string());

        let mailchimp_api_url = optional(&lookup, "MAILCHIMP_API_URL").unwrap_or_else(|| {
            format!("https://{}.api.mailchimp.com/3.0", mailchimp_server_prefix)
        });

        let interval_minutes: u64 = parsed(&lookup, "SYNC_INTERVAL_MINUTES", 180)?;
        if interval_minutes == 0 {
            return Err(AppError::Config(
                "SYNC_INTERVAL_MINUTES must be greater than zero".into(),
            ));
        }

        let sync_interval = interval_minutes
            .checked_mul(60)
            .map(Duration::from_secs)
            .ok_or_else(|| AppError::Config("SYNC_INTERVAL_MINUTES is too large".into()))?;

        let timeout_secs: u64 = parsed(&lookup, "HTTP_TIMEOUT_SECS", 30)?;
        if timeout_secs == 0 {
            return Err(AppError::Config(
                "HTTP_TIMEOUT_SECS must be greater than zero".into(),
            ));
        }
        let http_timeout = Duration::from_secs(timeout_secs);
        // O dobro vai para o Mailchimp; tem que caber num Duration
        if http_timeout.checked_mul(2).is_none() {
            return Err(AppError::Config("HTTP_TIMEOUT_SECS is too large".into()));
        }

        Ok(Self {
            database_url: required(&lookup, "DATABASE_URL")?,
            pabau_api_key: required(&lookup, "PABAU_API_KEY")?,
            pabau_api_url: optional(&lookup, "PABAU_API_URL")
                .unwrap_or_else(|| DEFAULT_PABAU_API_URL.to_string()),
            mailchimp_list_id: required(&lookup, "MAILCHIMP_LIST_ID")?,
            mailchimp_api_key,
            mailchimp_server_prefix,
            mailchimp_api_url,
            log_level: optional(&lookup, "LOG_LEVEL").unwrap_or_else(|| "info".to_string()),
            port: parsed(&lookup, "PORT", 8000)?,
            sync_interval,
            run_initial_sync: optional(&lookup, "RUN_INITIAL_SYNC")
                .is_some_and(|v| matches!(v.to_lowercase().as_str(), "1" | "true" | "yes")),
            http_timeout,
        })
    }

    pub fn pabau_client(&self) -> Result<PabauClient, AppError> {
        PabauClient::new(&self.pabau_api_url, &self.pabau_api_key, self.http_timeout)
    }

    /// O Mailchimp ganha o dobro do timeout (listagens de 1000 membros)
    pub fn mailchimp_client(&self) -> Result<MailchimpClient, AppError> {
        let timeout = self
            .http_timeout
            .checked_mul(2)
            .ok_or_else(|| AppError::Config("HTTP_TIMEOUT_SECS is too large".into()))?;
        MailchimpClient::new(
            &self.mailchimp_api_url,
            &self.mailchimp_api_key,
            &self.mailchimp_list_id,
            timeout,
        )
    }
}

// O estado compartilhado que será acessível em toda a aplicação
#[derive(Clone)]
pub struct AppState {
    pub db_pool: PgPool,
    pub settings: Settings,
    pub store: Arc<dyn ContactStore>,
    pub dashboard_service: DashboardService,
}

impl AppState {
    pub async fn new(settings: Settings) -> Result<Self, AppError> {
        // Conecta ao banco de dados, usando '?' para propagar erros
        let db_pool = PgPoolOptions::new()
            .max_connections(5)
            .acquire_timeout(Duration::from_secs(3))
            .connect(&settings.database_url)
            .await?;

        tracing::info!("✅ Conexão com o banco de dados estabelecida com sucesso!");

        // --- Monta o gráfico de dependências ---
        let store: Arc<dyn ContactStore> = Arc::new(PgContactStore::new(db_pool.clone()));
        let dashboard_service = DashboardService::new(DashboardRepository::new(db_pool.clone()));

        Ok(Self {
            db_pool,
            settings,
            store,
            dashboard_service,
        })
    }

    pub fn sync_runner(&self) -> Result<SyncRunner, AppError> {
        let pabau = self.settings.pabau_client()?;
        let mailchimp = self.settings.mailchimp_client()?;

        Ok(SyncRunner::new(
            self.store.clone(),
            PabauSyncService::new(pabau, self.store.clone()),
            UnsubscribeSyncService::new(mailchimp.clone(), self.store.clone()),
            MailchimpPushService::new(mailchimp, self.store.clone()),
        ))
    }

    pub fn backfill_service(&self) -> Result<BackfillService, AppError> {
        Ok(BackfillService::new(
            self.settings.pabau_client()?,
            self.settings.mailchimp_client()?,
            self.store.clone(),
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn env(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key: &str| map.get(key).cloned()
    }

    const BASE: [(&str, &str); 4] = [
        ("DATABASE_URL", "postgres://localhost/sync"),
        ("PABAU_API_KEY", "pabau-key"),
        ("MAILCHIMP_API_KEY", "abc123-us14"),
        ("MAILCHIMP_LIST_ID", "list1"),
    ];

    #[test]
    fn defaults_are_applied() {
        let s = Settings::from_lookup(env(&BASE)).unwrap();
        assert_eq!(s.pabau_api_url, DEFAULT_PABAU_API_URL);
        assert_eq!(s.mailchimp_server_prefix, "us14");
        assert_eq!(s.mailchimp_api_url, "https://us14.api.mailchimp.com/3.0");
        assert_eq!(s.port, 8000);
        assert_eq!(s.sync_interval, Duration::from_secs(180 * 60));
        assert!(!s.run_initial_sync);
        assert_eq!(s.http_timeout, Duration::from_secs(30));
    }

    #[test]
    fn explicit_values_win() {
        let mut pairs = BASE.to_vec();
        pairs.extend([
            ("MAILCHIMP_SERVER_PREFIX", "us2"),
            ("PORT", "9090"),
            ("SYNC_INTERVAL_MINUTES", "30"),
            ("RUN_INITIAL_SYNC", "TRUE"),
        ]);
        let s = Settings::from_lookup(env(&pairs)).unwrap();
        assert_eq!(s.mailchimp_api_url, "https://us2.api.mailchimp.com/3.0");
        assert_eq!(s.port, 9090);
        assert_eq!(s.sync_interval, Duration::from_secs(1800));
        assert!(s.run_initial_sync);
    }

    #[test]
    fn key_without_datacenter_falls_back_to_us1() {
        let mut pairs = BASE.to_vec();
        pairs[2] = ("MAILCHIMP_API_KEY", "plainkey");
        let s = Settings::from_lookup(env(&pairs)).unwrap();
        assert_eq!(s.mailchimp_server_prefix, "us1");
    }

    #[test]
    fn missing_or_bad_values_are_config_errors() {
        let err = Settings::from_lookup(env(&BASE[1..])).unwrap_err();
        assert!(matches!(err, AppError::Config(ref m) if m.contains("DATABASE_URL")));

        let mut pairs = BASE.to_vec();
        pairs.push(("PORT", "eighty"));
        let err = Settings::from_lookup(env(&pairs)).unwrap_err();
        assert!(matches!(err, AppError::Config(ref m) if m.contains("PORT")));

        let mut pairs = BASE.to_vec();
        pairs.push(("SYNC_INTERVAL_MINUTES", "0"));
        assert!(Settings::from_lookup(env(&pairs)).is_err());

        let mut pairs = BASE.to_vec();
        pairs.push(("HTTP_TIMEOUT_SECS", "0"));
        let err = Settings::from_lookup(env(&pairs)).unwrap_err();
        assert!(matches!(err, AppError::Config(ref m) if m.contains("HTTP_TIMEOUT_SECS")));
    }

    #[test]
    fn huge_durations_are_rejected_instead_of_overflowing() {
        let mut pairs = BASE.to_vec();
        pairs.push(("SYNC_INTERVAL_MINUTES", "18446744073709551615"));
        let err = Settings::from_lookup(env(&pairs)).unwrap_err();
        assert!(matches!(err, AppError::Config(ref m) if m.contains("SYNC_INTERVAL_MINUTES")));

        let mut pairs = BASE.to_vec();
        pairs.push(("HTTP_TIMEOUT_SECS", "18446744073709551615"));
        let err = Settings::from_lookup(env(&pairs)).unwrap_err();
        assert!(matches!(err, AppError::Config(ref m) if m.contains("HTTP_TIMEOUT_SECS")));
    }

    #[test]
    fn mailchimp_client_survives_an_oversized_timeout() {
        let mut s = Settings::from_lookup(env(&BASE)).unwrap();
        s.http_timeout = Duration::MAX;
        let err = s.mailchimp_client().err().unwrap();
        assert!(matches!(err, AppError::Config(_)));
    }
}

// src/services/pabau_sync.rs

use std::sync::Arc;

use chrono::{NaiveDateTime, Utc};
use tracing::{error, info, warn};

use crate::{
    clients::PabauClient,
    common::error::AppError,
    db::store::ContactStore,
    models::sync_log::{NewSyncLog, SyncStatus},
    services::pabau_contacts::{Clients, Leads, PabauContact},
};

/// Contadores de uma passada (clients ou leads).
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PabauStepReport {
    pub pages: u32,
    pub fetched: usize,
    pub synced: usize,
    pub skipped_old: usize,
    pub skipped_no_email: usize,
    pub failed: usize,
}

impl PabauStepReport {
    fn summary(&self, noun: &str) -> String {
        format!(
            "Synced {} {} from {} fetched ({} not newer, {} without email, {} failed)",
            self.synced, noun, self.fetched, self.skipped_old, self.skipped_no_email, self.failed
        )
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PabauSyncReport {
    pub clients: PabauStepReport,
    pub leads: PabauStepReport,
}

// O que fazer com um registro depois do transform
enum Outcome {
    Synced,
    SkippedOld,
    SkippedNoEmail,
    Failed,
}

/// Só entra quem mudou depois do último sync; sem data, não entra.
/// A API não filtra por data, então o filtro roda aqui depois do fetch.
fn is_newer(changed_at: Option<NaiveDateTime>, cutoff: Option<NaiveDateTime>) -> bool {
    match (cutoff, changed_at) {
        (None, _) => true,
        (Some(_), None) => false,
        (Some(cutoff), Some(at)) => at > cutoff,
    }
}

#[derive(Clone)]
pub struct PabauSyncService {
    pabau: PabauClient,
    store: Arc<dyn ContactStore>,
}

impl PabauSyncService {
    pub fn new(pabau: PabauClient, store: Arc<dyn ContactStore>) -> Self {
        Self { pabau, store }
    }

    /// Clients e depois leads. Uma falha em clients não impede leads;
    /// o primeiro erro é devolvido no fim.
    pub async fn run(&self) -> Result<PabauSyncReport, AppError> {
        let clients = self.sync_clients().await;
        let leads = self.sync_leads().await;

        Ok(PabauSyncReport {
            clients: clients?,
            leads: leads?,
        })
    }

    pub async fn sync_clients(&self) -> Result<PabauStepReport, AppError> {
        self.sync_contacts(&Clients).await
    }

    pub async fn sync_leads(&self) -> Result<PabauStepReport, AppError> {
        self.sync_contacts(&Leads).await
    }

    async fn sync_contacts<K: PabauContact>(&self, kind: &K) -> Result<PabauStepReport, AppError> {
        let noun = K::KIND.table();
        let cutoff = self.store.last_pabau_sync(K::KIND).await?;
        let synced_at = Utc::now().naive_utc();
        let mut report = PabauStepReport::default();

        match cutoff {
            Some(at) => info!("🔄 Sincronizando {} do Pabau alterados depois de {}", noun, at),
            None => info!("🔄 Primeiro sync de {} do Pabau, processando tudo", noun),
        }

        let mut page = 1;
        loop {
            let batch = match kind.fetch_page(&self.pabau, page).await {
                Ok(batch) => batch,
                Err(e) => {
                    error!("❌ Falha na página {} de {} do Pabau: {}", page, noun, e);
                    self.store
                        .log(
                            NewSyncLog::new(K::COMPLETED_ACTION, SyncStatus::Error)
                                .run()
                                .message(format!("Aborted at page {}: {}", page, report.summary(noun)))
                                .error_details(e.to_string()),
                        )
                        .await?;
                    return Err(e);
                }
            };

            // O "total" e o tamanho da página não são confiáveis; só a página vazia encerra
            if batch.is_empty() {
                break;
            }

            report.pages += 1;
            report.fetched += batch.len();

            for payload in &batch {
                match self.sync_one(kind, payload, cutoff, synced_at).await? {
                    Outcome::Synced => report.synced += 1,
                    Outcome::SkippedOld => report.skipped_old += 1,
                    Outcome::SkippedNoEmail => report.skipped_no_email += 1,
                    Outcome::Failed => report.failed += 1,
                }
            }
            page += 1;
        }

        info!("✅ Sync de {} do Pabau concluído: {:?}", noun, report);
        self.store
            .log(
                NewSyncLog::new(K::COMPLETED_ACTION, SyncStatus::Success)
                    .run()
                    .message(report.summary(noun)),
            )
            .await?;

        Ok(report)
    }

    async fn sync_one<K: PabauContact>(
        &self,
        kind: &K,
        payload: &K::Payload,
        cutoff: Option<NaiveDateTime>,
        synced_at: NaiveDateTime,
    ) -> Result<Outcome, AppError> {
        let record = match kind.to_record(payload) {
            Ok(r) => r,
            Err(e) => {
                warn!("Ignorando {} {:?} do Pabau: {}", K::KIND, kind.payload_id(payload), e);
                let mut entry = NewSyncLog::new(K::SYNC_ACTION, SyncStatus::Error)
                    .contact(K::KIND, None)
                    .error_details(e.to_string());
                if let Some(id) = kind.payload_id(payload) {
                    entry = entry.pabau_id(id);
                }
                if let Some(email) = kind.payload_email(payload) {
                    entry = entry.email(email);
                }
                self.store.log(entry).await?;
                return Ok(Outcome::Failed);
            }
        };

        let pabau_id = kind.pabau_id(&record);
        let Some(email) = kind.email(&record).map(str::to_string) else {
            return Ok(Outcome::SkippedNoEmail);
        };
        if !is_newer(kind.changed_at(&record), cutoff) {
            return Ok(Outcome::SkippedOld);
        }

        let previous = kind.find(&*self.store, pabau_id).await?;
        let changes = previous.as_ref().and_then(|old| kind.changes(old, &record));

        let entry = match kind.upsert(&*self.store, &record, synced_at).await {
            Ok(id) => NewSyncLog::new(K::SYNC_ACTION, SyncStatus::Success)
                .contact(K::KIND, Some(id))
                .message(match (&previous, &changes) {
                    (None, _) => format!("{} created", K::LABEL),
                    (Some(_), Some(_)) => format!("{} updated", K::LABEL),
                    (Some(_), None) => format!("{} unchanged", K::LABEL),
                })
                .field_changes(changes),
            Err(e) => {
                warn!("Falha no upsert do {} {}: {}", K::KIND, pabau_id, e);
                self.store
                    .log(
                        NewSyncLog::new(K::SYNC_ACTION, SyncStatus::Error)
                            .contact(K::KIND, previous.as_ref().map(|row| kind.row_id(row)))
                            .pabau_id(pabau_id)
                            .email(email)
                            .error_details(e.to_string()),
                    )
                    .await?;
                return Ok(Outcome::Failed);
            }
        };

        self.store.log(entry.pabau_id(pabau_id).email(email)).await?;
        Ok(Outcome::Synced)
    }
}

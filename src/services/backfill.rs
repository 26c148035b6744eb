// src/services/backfill.rs

use std::sync::Arc;

use chrono::Utc;
use tracing::{info, warn};

use crate::{
    clients::{MailchimpClient, PabauClient},
    common::error::AppError,
    db::store::ContactStore,
    models::sync_log::{NewSyncLog, SyncAction, SyncStatus},
    services::pabau_contacts::{Clients, Leads, PabauContact},
};

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BackfillCounts {
    pub processed: usize,
    pub inserted: usize,
    pub skipped_existing: usize,
    pub skipped_no_email: usize,
    pub failed: usize,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MailchimpBackfillCounts {
    pub checked: usize,
    pub found: usize,
    pub not_found: usize,
    pub already_linked: usize,
    pub failed: usize,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BackfillReport {
    pub clients: BackfillCounts,
    pub leads: BackfillCounts,
    pub mailchimp: Option<MailchimpBackfillCounts>,
}

/// Carga inicial: clients -> leads -> status do Mailchimp.
/// Pode ser interrompida e rodada de novo; o que já está no banco é pulado.
#[derive(Clone)]
pub struct BackfillService {
    pabau: PabauClient,
    mailchimp: MailchimpClient,
    store: Arc<dyn ContactStore>,
}

impl BackfillService {
    pub fn new(pabau: PabauClient, mailchimp: MailchimpClient, store: Arc<dyn ContactStore>) -> Self {
        Self {
            pabau,
            mailchimp,
            store,
        }
    }

    pub async fn run(&self, skip_mailchimp: bool) -> Result<BackfillReport, AppError> {
        info!("📦 Backfill passo 1/3: clients do Pabau");
        let clients = self.backfill_clients().await?;
        info!("📦 Backfill passo 2/3: leads do Pabau");
        let leads = self.backfill_leads().await?;

        let mailchimp = if skip_mailchimp {
            info!("Pulando o backfill de status do Mailchimp");
            None
        } else {
            info!("📦 Backfill passo 3/3: status no Mailchimp");
            Some(self.backfill_mailchimp().await?)
        };

        Ok(BackfillReport {
            clients,
            leads,
            mailchimp,
        })
    }

    pub async fn backfill_clients(&self) -> Result<BackfillCounts, AppError> {
        self.backfill_contacts(&Clients).await
    }

    pub async fn backfill_leads(&self) -> Result<BackfillCounts, AppError> {
        self.backfill_contacts(&Leads).await
    }

    async fn backfill_contacts<K: PabauContact>(&self, kind: &K) -> Result<BackfillCounts, AppError> {
        let noun = K::KIND.table();
        let mut existing = self.store.existing_pabau_ids(K::KIND).await?;
        info!("{} {} já estão no banco", existing.len(), noun);
        let mut counts = BackfillCounts::default();
        let mut page = 1;

        loop {
            let batch = kind.fetch_page(&self.pabau, page).await?;
            if batch.is_empty() {
                break;
            }

            for payload in &batch {
                counts.processed += 1;
                if kind.payload_id(payload).is_some_and(|id| existing.contains(&id)) {
                    counts.skipped_existing += 1;
                    continue;
                }

                let base = NewSyncLog::new(K::BACKFILL_ACTION, SyncStatus::Error).contact(K::KIND, None);
                let record = match kind.to_record(payload) {
                    Ok(r) => r,
                    Err(e) => {
                        warn!("Backfill: {} {:?} inválido: {}", K::KIND, kind.payload_id(payload), e);
                        counts.failed += 1;
                        let mut entry = base.error_details(e.to_string());
                        entry.pabau_id = kind.payload_id(payload);
                        entry.email = kind.payload_email(payload).map(str::to_string);
                        self.store.log(entry).await?;
                        continue;
                    }
                };

                let pabau_id = kind.pabau_id(&record);
                let Some(email) = kind.email(&record).map(str::to_string) else {
                    counts.skipped_no_email += 1;
                    let mut entry = base.pabau_id(pabau_id).message("No email address");
                    entry.status = SyncStatus::Skipped;
                    self.store.log(entry).await?;
                    continue;
                };

                let entry = match kind.upsert(&*self.store, &record, Utc::now().naive_utc()).await {
                    Ok(id) => {
                        counts.inserted += 1;
                        existing.insert(pabau_id);
                        let mut entry = base.message(format!("{} loaded", K::LABEL));
                        entry.entity_id = Some(id);
                        entry.status = SyncStatus::Success;
                        entry
                    }
                    Err(e) => {
                        warn!("Backfill: {} {} falhou: {}", K::KIND, pabau_id, e);
                        counts.failed += 1;
                        base.error_details(e.to_string())
                    }
                };
                self.store.log(entry.pabau_id(pabau_id).email(email)).await?;
            }

            if page % 50 == 0 {
                info!("  página {} de {}: {:?}", page, noun, counts);
            }
            page += 1;
        }

        info!("✅ Backfill de {} concluído: {:?}", noun, counts);
        Ok(counts)
    }

    /// Busca cada contato no Mailchimp pelo hash e grava id/status/tags.
    /// Contatos que já têm `mailchimp_id` são pulados.
    pub async fn backfill_mailchimp(&self) -> Result<MailchimpBackfillCounts, AppError> {
        let contacts = self.store.all_contacts().await?;
        info!("Consultando {} contatos no Mailchimp", contacts.len());
        let mut counts = MailchimpBackfillCounts::default();

        for row in contacts {
            if row.mailchimp_id.is_some() {
                counts.already_linked += 1;
                continue;
            }
            counts.checked += 1;

            let base = NewSyncLog::new(SyncAction::BackfillMailchimp, SyncStatus::Success)
                .contact(row.contact_type, Some(row.entity_id))
                .pabau_id(row.pabau_id)
                .email(row.email.clone());

            let entry = match self.mailchimp.get_member(&row.email).await {
                Ok(Some(member)) => {
                    counts.found += 1;
                    let tags = member.tag_names();
                    self.store
                        .mark_mailchimp_synced(
                            row.contact_type,
                            row.entity_id,
                            &member.id,
                            &member.status,
                            &tags,
                            Utc::now().naive_utc(),
                        )
                        .await?;
                    base.message(format!(
                        "Found in Mailchimp: {}, tags: {:?}",
                        member.status, tags
                    ))
                }
                Ok(None) => {
                    counts.not_found += 1;
                    let mut entry = base.message("Not found in Mailchimp");
                    entry.status = SyncStatus::Skipped;
                    entry
                }
                Err(e) => {
                    warn!("Backfill: consulta no Mailchimp de {} falhou: {}", row.email, e);
                    counts.failed += 1;
                    let mut entry = base.error_details(e.to_string());
                    entry.status = SyncStatus::Error;
                    entry
                }
            };
            self.store.log(entry).await?;
        }

        info!("✅ Backfill do Mailchimp concluído: {:?}", counts);
        Ok(counts)
    }
}

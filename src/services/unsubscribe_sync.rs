// src/services/unsubscribe_sync.rs

use std::sync::Arc;

use tracing::{error, info};

use crate::{
    clients::MailchimpClient,
    common::error::AppError,
    db::store::ContactStore,
    models::sync_log::{NewSyncLog, SyncAction, SyncStatus},
};

/// Status do Mailchimp que significam "não mande e-mail".
pub const SUPPRESSED_STATUSES: [&str; 2] = ["unsubscribed", "cleaned"];

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct UnsubscribeReport {
    pub members: usize,
    pub updated: usize,
    pub already_opted_out: usize,
    pub not_found: usize,
}

/// O Mailchimp é a fonte da verdade para supressão: um unsubscribe lá
/// sempre vence o opt-in local.
#[derive(Clone)]
pub struct UnsubscribeSyncService {
    mailchimp: MailchimpClient,
    store: Arc<dyn ContactStore>,
}

impl UnsubscribeSyncService {
    pub fn new(mailchimp: MailchimpClient, store: Arc<dyn ContactStore>) -> Self {
        Self { mailchimp, store }
    }

    pub async fn run(&self) -> Result<UnsubscribeReport, AppError> {
        match self.reconcile().await {
            Ok(report) => Ok(report),
            Err(e) => {
                error!("❌ Falha no sync de descadastros do Mailchimp: {}", e);
                self.store
                    .log(
                        NewSyncLog::new(SyncAction::MailchimpUnsubscribe, SyncStatus::Error)
                            .run()
                            .error_details(e.to_string()),
                    )
                    .await?;
                Err(e)
            }
        }
    }

    async fn reconcile(&self) -> Result<UnsubscribeReport, AppError> {
        let mut report = UnsubscribeReport::default();

        for status in SUPPRESSED_STATUSES {
            let members = self.mailchimp.list_members(status).await?;
            info!("{} membros {} no Mailchimp", members.len(), status);
            report.members += members.len();

            for member in members {
                let email = member.email_address.trim().to_lowercase();
                let Some(hit) = self
                    .store
                    .apply_unsubscribe(&email, &member.id, &member.status)
                    .await?
                else {
                    report.not_found += 1;
                    continue;
                };

                if !hit.changed {
                    report.already_opted_out += 1;
                    continue;
                }

                report.updated += 1;
                self.store
                    .log(
                        NewSyncLog::new(SyncAction::MailchimpUnsubscribe, SyncStatus::Success)
                            .contact(hit.kind, Some(hit.entity_id))
                            .pabau_id(hit.pabau_id)
                            .email(email)
                            .message(format!(
                                "Updated {} opt_in_email to 0 (Mailchimp status: {})",
                                hit.kind, member.status
                            )),
                    )
                    .await?;
            }
        }

        info!(
            "✅ Descadastros: {} atualizados, {} já sem opt-in, {} fora do banco",
            report.updated, report.already_opted_out, report.not_found
        );
        Ok(report)
    }
}

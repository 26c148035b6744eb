// src/services/mailchimp_push.rs

use std::{collections::BTreeMap, sync::Arc};

use chrono::Utc;
use tracing::{info, warn};

use crate::{
    clients::MailchimpClient,
    common::error::AppError,
    db::store::ContactStore,
    models::{
        contact::{desired_mailchimp_status, ContactRow, STATUS_SUBSCRIBED},
        sync_log::{NewSyncLog, SyncAction, SyncStatus},
    },
    services::unsubscribe_sync::SUPPRESSED_STATUSES,
};

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PushReport {
    pub candidates: usize,
    pub subscribed: usize,
    pub skipped: usize,
    pub failed: usize,
}

enum PushOutcome {
    Subscribed,
    Skipped,
}

/// FNAME/LNAME sempre vão (vazios se preciso); PHONE só quando existe.
pub fn merge_fields(row: &ContactRow) -> BTreeMap<String, String> {
    let mut fields = BTreeMap::new();
    fields.insert("FNAME".to_string(), row.first_name.clone().unwrap_or_default());
    fields.insert("LNAME".to_string(), row.last_name.clone().unwrap_or_default());
    if let Some(phone) = row.phone.as_deref().filter(|p| !p.trim().is_empty()) {
        fields.insert("PHONE".to_string(), phone.to_string());
    }
    fields
}

#[derive(Clone)]
pub struct MailchimpPushService {
    mailchimp: MailchimpClient,
    store: Arc<dyn ContactStore>,
}

impl MailchimpPushService {
    pub fn new(mailchimp: MailchimpClient, store: Arc<dyn ContactStore>) -> Self {
        Self { mailchimp, store }
    }

    /// Envia todas as linhas do predicado "needs sync". Falha em um contato
    /// vira linha de erro no log e o lote continua; a próxima execução tenta
    /// de novo porque a linha continua no predicado.
    pub async fn run(&self) -> Result<PushReport, AppError> {
        let rows = self.store.contacts_needing_sync().await?;
        let mut report = PushReport {
            candidates: rows.len(),
            ..Default::default()
        };
        info!("🔄 Enviando {} contatos para o Mailchimp", rows.len());

        for row in &rows {
            match self.push_one(row).await {
                Ok(PushOutcome::Subscribed) => report.subscribed += 1,
                Ok(PushOutcome::Skipped) => report.skipped += 1,
                Err(e) => {
                    warn!("Falha ao enviar {} para o Mailchimp: {}", row.email, e);
                    report.failed += 1;
                    self.store
                        .log(
                            NewSyncLog::new(SyncAction::SyncToMailchimp, SyncStatus::Error)
                                .contact(row.contact_type, Some(row.entity_id))
                                .pabau_id(row.pabau_id)
                                .email(row.email.clone())
                                .error_details(e.to_string()),
                        )
                        .await?;
                }
            }
        }

        let summary = format!(
            "Uploaded {} of {} contacts to Mailchimp ({} skipped, {} failed)",
            report.subscribed, report.candidates, report.skipped, report.failed
        );
        info!("✅ Envio para o Mailchimp concluído: {:?}", report);
        self.store
            .log(
                NewSyncLog::new(SyncAction::SyncToMailchimpCompleted, SyncStatus::Success)
                    .run()
                    .message(summary),
            )
            .await?;

        Ok(report)
    }

    async fn push_one(&self, row: &ContactRow) -> Result<PushOutcome, AppError> {
        let member = self
            .mailchimp
            .upsert_member(
                &row.email,
                merge_fields(row),
                desired_mailchimp_status(row.opt_in_email),
            )
            .await?;
        let now = Utc::now().naive_utc();

        // 1. Membro ativo: aplica a tag e marca como sincronizado
        if member.status == STATUS_SUBSCRIBED {
            let tag = row.contact_type.mailchimp_tag();
            self.mailchimp.add_tags(&row.email, &[tag]).await?;

            let mut tags = member.tag_names();
            if !tags.iter().any(|t| t == tag) {
                tags.push(tag.to_string());
            }

            self.store
                .mark_mailchimp_synced(
                    row.contact_type,
                    row.entity_id,
                    &member.id,
                    &member.status,
                    &tags,
                    now,
                )
                .await?;
            self.store
                .log(
                    NewSyncLog::new(SyncAction::SyncToMailchimp, SyncStatus::Success)
                        .contact(row.contact_type, Some(row.entity_id))
                        .pabau_id(row.pabau_id)
                        .email(row.email.clone())
                        .message("Synced to Mailchimp"),
                )
                .await?;
            return Ok(PushOutcome::Subscribed);
        }

        // 2. Suprimido lá: o Mailchimp vence e o opt-in local cai
        if SUPPRESSED_STATUSES.contains(&member.status.as_str()) {
            self.store
                .apply_unsubscribe(&row.email, &member.id, &member.status)
                .await?;
            self.store
                .log(
                    NewSyncLog::new(SyncAction::SyncToMailchimp, SyncStatus::Skipped)
                        .contact(row.contact_type, Some(row.entity_id))
                        .pabau_id(row.pabau_id)
                        .email(row.email.clone())
                        .message(format!(
                            "Member is {} in Mailchimp; local opt_in_email cleared",
                            member.status
                        )),
                )
                .await?;
            return Ok(PushOutcome::Skipped);
        }

        // 3. Outros status (ex: pending): guarda o estado e tenta de novo depois
        self.store
            .mark_mailchimp_synced(
                row.contact_type,
                row.entity_id,
                &member.id,
                &member.status,
                &member.tag_names(),
                now,
            )
            .await?;
        self.store
            .log(
                NewSyncLog::new(SyncAction::SyncToMailchimp, SyncStatus::Skipped)
                    .contact(row.contact_type, Some(row.entity_id))
                    .pabau_id(row.pabau_id)
                    .email(row.email.clone())
                    .message(format!("Member is {} in Mailchimp", member.status)),
            )
            .await?;
        Ok(PushOutcome::Skipped)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        clients::mailchimp::subscriber_hash,
        db::memory_store::MemoryStore,
        models::contact::{ClientRecord, ContactKind, LeadRecord},
    };
    use serde_json::json;
    use std::time::Duration;
    use wiremock::{
        matchers::{body_partial_json, method, path, path_regex},
        Mock, MockServer, ResponseTemplate,
    };

    fn service(server: &MockServer, store: Arc<MemoryStore>) -> MailchimpPushService {
        let mc = MailchimpClient::new(&server.uri(), "key-us1", "list123", Duration::from_secs(5))
            .unwrap();
        MailchimpPushService::new(mc, store)
    }

    fn member_path(email: &str) -> String {
        format!("/lists/list123/members/{}", subscriber_hash(email))
    }

    async fn accept_member(server: &MockServer, email: &str, status: &str) {
        Mock::given(method("PUT"))
            .and(path(member_path(email)))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "id": subscriber_hash(email), "email_address": email, "status": status,
                "tags": [{ "id": 1, "name": "VIP" }]
            })))
            .mount(server)
            .await;
    }

    async fn accept_tags(server: &MockServer) {
        Mock::given(method("POST"))
            .and(path_regex(r"^/lists/list123/members/[0-9a-f]{32}/tags$"))
            .respond_with(ResponseTemplate::new(204))
            .mount(server)
            .await;
    }

    async fn store_with(clients: &[(i64, &str, i16)]) -> Arc<MemoryStore> {
        let store = Arc::new(MemoryStore::new());
        for (id, email, opt_in) in clients {
            store
                .upsert_client(
                    &ClientRecord {
                        pabau_id: *id,
                        email: Some(email.to_string()),
                        first_name: Some("Jane".into()),
                        opt_in_email: *opt_in,
                        ..Default::default()
                    },
                    Utc::now().naive_utc(),
                )
                .await
                .unwrap();
        }
        store
    }

    #[test]
    fn merge_fields_skip_blank_phone() {
        let row = ContactRow {
            contact_type: ContactKind::Client,
            entity_id: 1,
            pabau_id: 1,
            email: "a@example.com".into(),
            first_name: Some("Ann".into()),
            last_name: None,
            phone: Some("  ".into()),
            opt_in_email: 1,
            is_active: 1,
            mailchimp_id: None,
            mailchimp_status: None,
        };
        let fields = merge_fields(&row);
        assert_eq!(fields.get("FNAME").map(String::as_str), Some("Ann"));
        assert_eq!(fields.get("LNAME").map(String::as_str), Some(""));
        assert!(!fields.contains_key("PHONE"));
    }

    #[tokio::test]
    async fn successful_push_leaves_the_needs_sync_set() {
        let server = MockServer::start().await;
        Mock::given(method("PUT"))
            .and(path(member_path("jane@example.com")))
            .and(body_partial_json(json!({
                "status_if_new": "subscribed",
                "merge_fields": { "FNAME": "Jane" }
            })))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "id": subscriber_hash("jane@example.com"),
                "email_address": "jane@example.com",
                "status": "subscribed"
            })))
            .expect(1)
            .mount(&server)
            .await;
        accept_tags(&server).await;

        let store = store_with(&[(1, "jane@example.com", 1), (2, "quiet@example.com", 0)]).await;
        assert_eq!(store.contacts_needing_sync().await.unwrap().len(), 1);

        let report = service(&server, store.clone()).run().await.unwrap();

        assert_eq!(report.candidates, 1);
        assert_eq!(report.subscribed, 1);
        assert!(store.contacts_needing_sync().await.unwrap().is_empty());

        let jane = store.client(1).unwrap();
        assert_eq!(jane.mailchimp_status.as_deref(), Some("subscribed"));
        assert_eq!(jane.mailchimp_id.unwrap(), subscriber_hash("jane@example.com"));
        assert_eq!(jane.mailchimp_tags, vec!["Pabau Clients".to_string()]);
        assert!(jane.mailchimp_last_synced_at.is_some());
    }

    #[tokio::test]
    async fn rejected_contact_is_logged_and_batch_continues() {
        let server = MockServer::start().await;
        Mock::given(method("PUT"))
            .and(path(member_path("bad@example.com")))
            .respond_with(ResponseTemplate::new(400).set_body_json(json!({
                "title": "Invalid Resource", "detail": "looks fake or invalid"
            })))
            .mount(&server)
            .await;
        accept_member(&server, "good@example.com", "subscribed").await;
        accept_tags(&server).await;

        let store = store_with(&[(1, "bad@example.com", 1), (2, "good@example.com", 1)]).await;
        let report = service(&server, store.clone()).run().await.unwrap();

        assert_eq!(report.failed, 1);
        assert_eq!(report.subscribed, 1);

        let bad = store.client(1).unwrap();
        assert_eq!(bad.mailchimp_status, None);
        assert_eq!(bad.opt_in_email, 1);

        let good = store.client(2).unwrap();
        assert_eq!(good.mailchimp_tags, vec!["VIP".to_string(), "Pabau Clients".to_string()]);

        let logs = store.logs();
        let error = logs.iter().find(|l| l.status == SyncStatus::Error).unwrap();
        assert_eq!(error.email.as_deref(), Some("bad@example.com"));
        assert!(error.error_details.as_deref().unwrap().contains("400"));
        assert_eq!(logs.last().unwrap().action, SyncAction::SyncToMailchimpCompleted);
    }

    #[tokio::test]
    async fn unsubscribed_member_wins_over_local_opt_in() {
        let server = MockServer::start().await;
        accept_member(&server, "gone@example.com", "unsubscribed").await;

        let store = Arc::new(MemoryStore::new());
        store
            .upsert_lead(
                &LeadRecord {
                    pabau_id: 3,
                    email: Some("gone@example.com".into()),
                    opt_in_email_mailchimp: 1,
                    ..Default::default()
                },
                Utc::now().naive_utc(),
            )
            .await
            .unwrap();

        let report = service(&server, store.clone()).run().await.unwrap();

        assert_eq!(report.skipped, 1);
        let lead = store.lead(3).unwrap();
        assert_eq!(lead.opt_in_email, 0);
        assert_eq!(lead.mailchimp_status.as_deref(), Some("unsubscribed"));
        assert!(store.contacts_needing_sync().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn pending_member_stays_in_the_needs_sync_set() {
        let server = MockServer::start().await;
        accept_member(&server, "wait@example.com", "pending").await;

        let store = store_with(&[(1, "wait@example.com", 1)]).await;
        let report = service(&server, store.clone()).run().await.unwrap();

        assert_eq!(report.skipped, 1);
        let row = store.client(1).unwrap();
        assert_eq!(row.opt_in_email, 1);
        assert_eq!(row.mailchimp_status.as_deref(), Some("pending"));
        assert_eq!(store.contacts_needing_sync().await.unwrap().len(), 1);
    }
}

// src/services/pabau_contacts.rs
//
// O que muda entre clients e leads quando percorremos as páginas do Pabau:
// endpoint, transform, ações de log e as chamadas do store. Os loops de
// `pabau_sync` e `backfill` são genéricos sobre este trait.

use async_trait::async_trait;
use chrono::NaiveDateTime;
use serde_json::Value;
use validator::Validate;

use crate::{
    clients::PabauClient,
    common::{
        error::AppError,
        transforms::{client_changes, lead_changes, transform_client, transform_lead},
    },
    db::store::ContactStore,
    models::{
        contact::{Client, ClientRecord, ContactKind, Lead, LeadRecord},
        pabau::{ClientPayload, LeadPayload},
        sync_log::SyncAction,
    },
};

#[async_trait]
pub trait PabauContact: Send + Sync {
    type Payload: Send + Sync;
    type Record: Validate + Send + Sync;
    type Row: Send + Sync;

    const KIND: ContactKind;
    /// "Client" / "Lead", usado nas mensagens do sync_logs
    const LABEL: &'static str;
    const SYNC_ACTION: SyncAction;
    const COMPLETED_ACTION: SyncAction;
    const BACKFILL_ACTION: SyncAction;

    async fn fetch_page(&self, pabau: &PabauClient, page: u32)
        -> Result<Vec<Self::Payload>, AppError>;

    fn payload_id(&self, payload: &Self::Payload) -> Option<i64>;

    fn payload_email<'a>(&self, payload: &'a Self::Payload) -> Option<&'a str>;

    fn transform(&self, payload: &Self::Payload) -> Result<Self::Record, AppError>;

    fn pabau_id(&self, record: &Self::Record) -> i64;

    fn email<'a>(&self, record: &'a Self::Record) -> Option<&'a str>;

    /// Data comparada com o cutoff do sync incremental
    fn changed_at(&self, record: &Self::Record) -> Option<NaiveDateTime>;

    async fn find(&self, store: &dyn ContactStore, pabau_id: i64)
        -> Result<Option<Self::Row>, AppError>;

    fn row_id(&self, row: &Self::Row) -> i32;

    fn changes(&self, old: &Self::Row, new: &Self::Record) -> Option<Value>;

    async fn upsert(
        &self,
        store: &dyn ContactStore,
        record: &Self::Record,
        synced_at: NaiveDateTime,
    ) -> Result<i32, AppError>;

    /// Transform + validação do e-mail
    fn to_record(&self, payload: &Self::Payload) -> Result<Self::Record, AppError> {
        let record = self.transform(payload)?;
        record.validate()?;
        Ok(record)
    }
}

pub struct Clients;

pub struct Leads;

#[async_trait]
impl PabauContact for Clients {
    type Payload = ClientPayload;
    type Record = ClientRecord;
    type Row = Client;

    const KIND: ContactKind = ContactKind::Client;
    const LABEL: &'static str = "Client";
    const SYNC_ACTION: SyncAction = SyncAction::SyncPabauClient;
    const COMPLETED_ACTION: SyncAction = SyncAction::SyncPabauClientsCompleted;
    const BACKFILL_ACTION: SyncAction = SyncAction::BackfillClient;

    async fn fetch_page(&self, pabau: &PabauClient, page: u32) -> Result<Vec<ClientPayload>, AppError> {
        pabau.get_clients_page(page).await
    }

    fn payload_id(&self, payload: &ClientPayload) -> Option<i64> {
        payload.id()
    }

    fn payload_email<'a>(&self, payload: &'a ClientPayload) -> Option<&'a str> {
        payload.raw_email()
    }

    fn transform(&self, payload: &ClientPayload) -> Result<ClientRecord, AppError> {
        transform_client(payload)
    }

    fn pabau_id(&self, record: &ClientRecord) -> i64 {
        record.pabau_id
    }

    fn email<'a>(&self, record: &'a ClientRecord) -> Option<&'a str> {
        record.email.as_deref()
    }

    // Clients não têm data de alteração na API
    fn changed_at(&self, record: &ClientRecord) -> Option<NaiveDateTime> {
        record.created_date
    }

    async fn find(&self, store: &dyn ContactStore, pabau_id: i64) -> Result<Option<Client>, AppError> {
        store.find_client(pabau_id).await
    }

    fn row_id(&self, row: &Client) -> i32 {
        row.id
    }

    fn changes(&self, old: &Client, new: &ClientRecord) -> Option<Value> {
        client_changes(old, new)
    }

    async fn upsert(
        &self,
        store: &dyn ContactStore,
        record: &ClientRecord,
        synced_at: NaiveDateTime,
    ) -> Result<i32, AppError> {
        store.upsert_client(record, synced_at).await
    }
}

#[async_trait]
impl PabauContact for Leads {
    type Payload = LeadPayload;
    type Record = LeadRecord;
    type Row = Lead;

    const KIND: ContactKind = ContactKind::Lead;
    const LABEL: &'static str = "Lead";
    const SYNC_ACTION: SyncAction = SyncAction::SyncPabauLead;
    const COMPLETED_ACTION: SyncAction = SyncAction::SyncPabauLeadsCompleted;
    const BACKFILL_ACTION: SyncAction = SyncAction::BackfillLead;

    async fn fetch_page(&self, pabau: &PabauClient, page: u32) -> Result<Vec<LeadPayload>, AppError> {
        pabau.get_leads_page(page).await
    }

    fn payload_id(&self, payload: &LeadPayload) -> Option<i64> {
        payload.id
    }

    fn payload_email<'a>(&self, payload: &'a LeadPayload) -> Option<&'a str> {
        payload.email.as_deref()
    }

    fn transform(&self, payload: &LeadPayload) -> Result<LeadRecord, AppError> {
        transform_lead(payload)
    }

    fn pabau_id(&self, record: &LeadRecord) -> i64 {
        record.pabau_id
    }

    fn email<'a>(&self, record: &'a LeadRecord) -> Option<&'a str> {
        record.email.as_deref()
    }

    fn changed_at(&self, record: &LeadRecord) -> Option<NaiveDateTime> {
        record.changed_at()
    }

    async fn find(&self, store: &dyn ContactStore, pabau_id: i64) -> Result<Option<Lead>, AppError> {
        store.find_lead(pabau_id).await
    }

    fn row_id(&self, row: &Lead) -> i32 {
        row.id
    }

    fn changes(&self, old: &Lead, new: &LeadRecord) -> Option<Value> {
        lead_changes(old, new)
    }

    async fn upsert(
        &self,
        store: &dyn ContactStore,
        record: &LeadRecord,
        synced_at: NaiveDateTime,
    ) -> Result<i32, AppError> {
        store.upsert_lead(record, synced_at).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn bad_email_fails_validation() {
        let payload: ClientPayload = serde_json::from_value(json!({
            "details": { "id": 5 },
            "communications": { "email": "not-an-email" }
        }))
        .unwrap();
        let err = Clients.to_record(&payload).unwrap_err();
        assert!(matches!(err, AppError::ValidationError(_)));
    }

    #[test]
    fn leads_compare_on_update_date() {
        let payload: LeadPayload = serde_json::from_value(json!({
            "id": 7,
            "email": "l@example.com",
            "dates": { "created_date": "2023-01-01 09:00:00", "updated_date": "2024-05-01 09:00:00" }
        }))
        .unwrap();
        let record = Leads.to_record(&payload).unwrap();
        assert_eq!(Leads.pabau_id(&record), 7);
        assert_eq!(
            Leads.changed_at(&record).map(|d| d.date().to_string()),
            Some("2024-05-01".to_string())
        );
    }
}

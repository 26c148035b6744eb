// src/db/store.rs

use std::collections::HashSet;

use async_trait::async_trait;
use chrono::NaiveDateTime;

use crate::{
    common::error::AppError,
    models::{
        contact::{Client, ClientRecord, ContactKind, ContactRow, Lead, LeadRecord, UnsubscribeMatch},
        sync_log::NewSyncLog,
    },
};

/// Tudo que os jobs de sync precisam do sistema de registro.
///
/// A implementação real é `PgContactStore`; os testes usam uma versão em memória
/// com as mesmas regras (e-mail único entre tabelas, opt-in derivado do lead,
/// predicado "needs sync").
#[async_trait]
pub trait ContactStore: Send + Sync {
    /// MAX(pabau_last_synced_at) da tabela
    async fn last_pabau_sync(&self, kind: ContactKind) -> Result<Option<NaiveDateTime>, AppError>;

    async fn existing_pabau_ids(&self, kind: ContactKind) -> Result<HashSet<i64>, AppError>;

    async fn find_client(&self, pabau_id: i64) -> Result<Option<Client>, AppError>;

    async fn find_lead(&self, pabau_id: i64) -> Result<Option<Lead>, AppError>;

    /// Upsert pela chave externa. Falha com `EmailConflict` se o e-mail já
    /// pertence a outro contato, em qualquer tabela.
    async fn upsert_client(
        &self,
        record: &ClientRecord,
        synced_at: NaiveDateTime,
    ) -> Result<i32, AppError>;

    async fn upsert_lead(&self, record: &LeadRecord, synced_at: NaiveDateTime)
        -> Result<i32, AppError>;

    /// Casa o membro por e-mail normalizado ou pelo hash e zera o opt-in.
    /// Clients têm prioridade sobre leads.
    async fn apply_unsubscribe(
        &self,
        email: &str,
        member_id: &str,
        status: &str,
    ) -> Result<Option<UnsubscribeMatch>, AppError>;

    async fn contacts_needing_sync(&self) -> Result<Vec<ContactRow>, AppError>;

    async fn all_contacts(&self) -> Result<Vec<ContactRow>, AppError>;

    async fn mark_mailchimp_synced(
        &self,
        kind: ContactKind,
        entity_id: i32,
        member_id: &str,
        status: &str,
        tags: &[String],
        synced_at: NaiveDateTime,
    ) -> Result<(), AppError>;

    async fn log(&self, entry: NewSyncLog) -> Result<(), AppError>;

    /// true se o lock do ciclo foi obtido; false se outro ciclo está rodando.
    async fn try_lock_cycle(&self) -> Result<bool, AppError>;

    async fn unlock_cycle(&self) -> Result<(), AppError>;
}

// src/models/sync_log.rs

use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use sqlx::FromRow;
use utoipa::{IntoParams, ToSchema};

use crate::models::contact::ContactKind;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "lowercase")]
pub enum SyncStatus {
    Success,
    Error,
    Skipped,
}

impl SyncStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            SyncStatus::Success => "success",
            SyncStatus::Error => "error",
            SyncStatus::Skipped => "skipped",
        }
    }
}

/// Nome da ação gravado em `sync_logs.action`
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SyncAction {
    SyncPabauClient,
    SyncPabauLead,
    SyncPabauClientsCompleted,
    SyncPabauLeadsCompleted,
    MailchimpUnsubscribe,
    SyncToMailchimp,
    SyncToMailchimpCompleted,
    BackfillClient,
    BackfillLead,
    BackfillMailchimp,
}

impl SyncAction {
    pub fn as_str(&self) -> &'static str {
        match self {
            SyncAction::SyncPabauClient => "sync_pabau_client",
            SyncAction::SyncPabauLead => "sync_pabau_lead",
            SyncAction::SyncPabauClientsCompleted => "sync_pabau_clients_completed",
            SyncAction::SyncPabauLeadsCompleted => "sync_pabau_leads_completed",
            SyncAction::MailchimpUnsubscribe => "mailchimp_unsubscribe",
            SyncAction::SyncToMailchimp => "sync_to_mailchimp",
            SyncAction::SyncToMailchimpCompleted => "sync_to_mailchimp_completed",
            SyncAction::BackfillClient => "backfill_client",
            SyncAction::BackfillLead => "backfill_lead",
            SyncAction::BackfillMailchimp => "backfill_mailchimp",
        }
    }
}

pub const ENTITY_SYNC_RUN: &str = "sync_run";

// Registro a ser inserido (append-only)
#[derive(Debug, Clone, PartialEq)]
pub struct NewSyncLog {
    pub entity_type: Option<String>,
    pub entity_id: Option<i32>,
    pub pabau_id: Option<i64>,
    pub email: Option<String>,
    pub action: SyncAction,
    pub status: SyncStatus,
    pub message: Option<String>,
    pub error_details: Option<String>,
    pub field_changes: Option<Value>,
}

impl NewSyncLog {
    pub fn new(action: SyncAction, status: SyncStatus) -> Self {
        Self {
            entity_type: None,
            entity_id: None,
            pabau_id: None,
            email: None,
            action,
            status,
            message: None,
            error_details: None,
            field_changes: None,
        }
    }

    pub fn contact(mut self, kind: ContactKind, entity_id: Option<i32>) -> Self {
        self.entity_type = Some(kind.as_str().to_string());
        self.entity_id = entity_id;
        self
    }

    /// Linha de resumo de uma execução inteira
    pub fn run(mut self) -> Self {
        self.entity_type = Some(ENTITY_SYNC_RUN.to_string());
        self
    }

    pub fn pabau_id(mut self, pabau_id: i64) -> Self {
        self.pabau_id = Some(pabau_id);
        self
    }

    pub fn email(mut self, email: impl Into<String>) -> Self {
        self.email = Some(email.into());
        self
    }

    pub fn message(mut self, message: impl Into<String>) -> Self {
        self.message = Some(message.into());
        self
    }

    pub fn error_details(mut self, details: impl Into<String>) -> Self {
        self.error_details = Some(details.into());
        self
    }

    pub fn field_changes(mut self, changes: Option<Value>) -> Self {
        self.field_changes = changes;
        self
    }
}

#[derive(Debug, Clone, Serialize, FromRow, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct SyncLogEntry {
    pub id: i64,
    pub entity_type: Option<String>,
    pub entity_id: Option<i32>,
    pub pabau_id: Option<i64>,
    pub email: Option<String>,
    pub action: String,
    pub status: String,
    pub message: Option<String>,
    pub error_details: Option<String>,
    #[schema(value_type = Option<Object>)]
    pub field_changes: Option<Value>,
    pub created_at: NaiveDateTime,
}

// Query string do endpoint de polling
#[derive(Debug, Deserialize, IntoParams)]
pub struct LogQuery {
    /// Quantidade de linhas (1..=500, padrão 100)
    pub limit: Option<i64>,
    /// Filtra por nome da ação, ex: `sync_to_mailchimp`
    pub action: Option<String>,
}

pub const DEFAULT_LOG_LIMIT: i64 = 100;
pub const MAX_LOG_LIMIT: i64 = 500;

impl LogQuery {
    pub fn effective_limit(&self) -> i64 {
        self.limit
            .unwrap_or(DEFAULT_LOG_LIMIT)
            .clamp(1, MAX_LOG_LIMIT)
    }
}

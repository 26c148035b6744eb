// src/models/contact.rs

use std::fmt;

use chrono::{NaiveDate, NaiveDateTime};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use utoipa::ToSchema;
use validator::Validate;

pub const STATUS_SUBSCRIBED: &str = "subscribed";
pub const STATUS_UNSUBSCRIBED: &str = "unsubscribed";

// --- ENUMS ---

/// Em qual tabela o contato vive.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "lowercase")]
pub enum ContactKind {
    Client,
    Lead,
}

impl ContactKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ContactKind::Client => "client",
            ContactKind::Lead => "lead",
        }
    }

    pub fn table(&self) -> &'static str {
        match self {
            ContactKind::Client => "clients",
            ContactKind::Lead => "leads",
        }
    }

    /// Tag aplicada ao membro no Mailchimp
    pub fn mailchimp_tag(&self) -> &'static str {
        match self {
            ContactKind::Client => "Pabau Clients",
            ContactKind::Lead => "Pabau Leads",
        }
    }

    pub fn other(&self) -> ContactKind {
        match self {
            ContactKind::Client => ContactKind::Lead,
            ContactKind::Lead => ContactKind::Client,
        }
    }
}

impl fmt::Display for ContactKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl TryFrom<String> for ContactKind {
    type Error = String;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        match value.as_str() {
            "client" => Ok(ContactKind::Client),
            "lead" => Ok(ContactKind::Lead),
            other => Err(format!("unknown contact type '{}'", other)),
        }
    }
}

/// Estado desejado no Mailchimp: função pura de `opt_in_email`.
pub fn desired_mailchimp_status(opt_in_email: i16) -> &'static str {
    if opt_in_email == 1 {
        STATUS_SUBSCRIBED
    } else {
        STATUS_UNSUBSCRIBED
    }
}

/// Predicado "needs sync": opt-in E ainda não marcado como subscribed.
pub fn needs_mailchimp_sync(opt_in_email: i16, mailchimp_status: Option<&str>) -> bool {
    opt_in_email == 1 && mailchimp_status != Some(STATUS_SUBSCRIBED)
}

// --- LINHAS DO BANCO ---

#[derive(Debug, Clone, FromRow)]
pub struct Client {
    pub id: i32,
    pub pabau_id: i64,
    pub custom_id: Option<String>,
    pub email: Option<String>,

    pub first_name: Option<String>,
    pub last_name: Option<String>,
    pub salutation: Option<String>,
    pub gender: Option<String>,
    pub dob: Option<NaiveDate>,
    pub location: Option<String>,
    pub is_active: i16,

    pub phone: Option<String>,
    pub mobile: Option<String>,
    pub opt_in_email: i16,
    pub opt_in_sms: i16,
    pub opt_in_phone: i16,
    pub opt_in_post: i16,
    pub opt_in_newsletter: i16,

    pub created_date: Option<NaiveDateTime>,
    pub created_by_name: Option<String>,
    pub created_by_id: Option<i64>,

    pub mailchimp_id: Option<String>,
    pub mailchimp_status: Option<String>,
    pub mailchimp_tags: Vec<String>,

    pub pabau_last_synced_at: Option<NaiveDateTime>,
    pub mailchimp_last_synced_at: Option<NaiveDateTime>,
    pub created_at: NaiveDateTime,
    pub updated_at: NaiveDateTime,
}

#[derive(Debug, Clone, FromRow)]
pub struct Lead {
    pub id: i32,
    pub pabau_id: i64,
    pub contact_id: Option<i64>,
    pub email: Option<String>,

    pub salutation: Option<String>,
    pub first_name: Option<String>,
    pub last_name: Option<String>,
    pub phone: Option<String>,
    pub mobile: Option<String>,
    pub dob: Option<NaiveDate>,

    pub mailing_street: Option<String>,
    pub mailing_postal: Option<String>,
    pub mailing_city: Option<String>,
    pub mailing_county: Option<String>,
    pub mailing_country: Option<String>,

    pub is_active: i16,
    pub lead_status: Option<String>,

    pub owner_id: Option<i64>,
    pub owner_name: Option<String>,
    pub location_id: Option<i64>,
    pub location_name: Option<String>,

    pub created_date: Option<NaiveDateTime>,
    pub updated_date: Option<NaiveDateTime>,
    pub converted_date: Option<NaiveDateTime>,

    pub pipeline_name: Option<String>,
    pub pipeline_stage_id: Option<i64>,
    pub pipeline_stage_name: Option<String>,
    pub deal_value: Option<Decimal>,

    pub opt_in_email_mailchimp: i16,
    // Coluna gerada no banco (espelha opt_in_email_mailchimp)
    pub opt_in_email: i16,

    pub mailchimp_id: Option<String>,
    pub mailchimp_status: Option<String>,
    pub mailchimp_tags: Vec<String>,

    pub pabau_last_synced_at: Option<NaiveDateTime>,
    pub mailchimp_last_synced_at: Option<NaiveDateTime>,
    pub created_at: NaiveDateTime,
    pub updated_at: NaiveDateTime,
}

// --- REGISTROS PARA UPSERT (saída dos transforms) ---

#[derive(Debug, Clone, Default, PartialEq, Validate)]
pub struct ClientRecord {
    pub pabau_id: i64,
    pub custom_id: Option<String>,
    #[validate(email(message = "Invalid email format"))]
    pub email: Option<String>,

    pub first_name: Option<String>,
    pub last_name: Option<String>,
    pub salutation: Option<String>,
    pub gender: Option<String>,
    pub dob: Option<NaiveDate>,
    pub location: Option<String>,
    pub is_active: i16,

    pub phone: Option<String>,
    pub mobile: Option<String>,
    pub opt_in_email: i16,
    pub opt_in_sms: i16,
    pub opt_in_phone: i16,
    pub opt_in_post: i16,
    pub opt_in_newsletter: i16,

    pub created_date: Option<NaiveDateTime>,
    pub created_by_name: Option<String>,
    pub created_by_id: Option<i64>,
}

#[derive(Debug, Clone, Default, PartialEq, Validate)]
pub struct LeadRecord {
    pub pabau_id: i64,
    pub contact_id: Option<i64>,
    #[validate(email(message = "Invalid email format"))]
    pub email: Option<String>,

    pub salutation: Option<String>,
    pub first_name: Option<String>,
    pub last_name: Option<String>,
    pub phone: Option<String>,
    pub mobile: Option<String>,
    pub dob: Option<NaiveDate>,

    pub mailing_street: Option<String>,
    pub mailing_postal: Option<String>,
    pub mailing_city: Option<String>,
    pub mailing_county: Option<String>,
    pub mailing_country: Option<String>,

    pub is_active: i16,
    pub lead_status: Option<String>,

    pub owner_id: Option<i64>,
    pub owner_name: Option<String>,
    pub location_id: Option<i64>,
    pub location_name: Option<String>,

    pub created_date: Option<NaiveDateTime>,
    pub updated_date: Option<NaiveDateTime>,
    pub converted_date: Option<NaiveDateTime>,

    pub pipeline_name: Option<String>,
    pub pipeline_stage_id: Option<i64>,
    pub pipeline_stage_name: Option<String>,
    pub deal_value: Option<Decimal>,

    pub opt_in_email_mailchimp: i16,
}

impl LeadRecord {
    /// `opt_in_email` de um lead não tem valor próprio.
    pub fn opt_in_email(&self) -> i16 {
        self.opt_in_email_mailchimp
    }

    /// Data usada no filtro incremental: última alteração, senão criação.
    pub fn changed_at(&self) -> Option<NaiveDateTime> {
        self.updated_date.or(self.created_date)
    }
}

// --- VIEWS ---

/// Uma linha de `v_all_contacts` / `v_mailchimp_contacts`
#[derive(Debug, Clone, FromRow, PartialEq)]
pub struct ContactRow {
    #[sqlx(try_from = "String")]
    pub contact_type: ContactKind,
    pub entity_id: i32,
    pub pabau_id: i64,
    pub email: String,
    pub first_name: Option<String>,
    pub last_name: Option<String>,
    pub phone: Option<String>,
    pub opt_in_email: i16,
    pub is_active: i16,
    pub mailchimp_id: Option<String>,
    pub mailchimp_status: Option<String>,
}

impl ContactRow {
    pub fn needs_sync(&self) -> bool {
        needs_mailchimp_sync(self.opt_in_email, self.mailchimp_status.as_deref())
    }
}

/// Resultado de aplicar um unsubscribe vindo do Mailchimp.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UnsubscribeMatch {
    pub kind: ContactKind,
    pub entity_id: i32,
    pub pabau_id: i64,
    /// false quando o contato já estava com opt-in 0
    pub changed: bool,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn desired_status_is_a_function_of_opt_in() {
        assert_eq!(desired_mailchimp_status(1), "subscribed");
        assert_eq!(desired_mailchimp_status(0), "unsubscribed");
    }

    #[test]
    fn needs_sync_predicate() {
        assert!(needs_mailchimp_sync(1, None));
        assert!(needs_mailchimp_sync(1, Some("unsubscribed")));
        assert!(needs_mailchimp_sync(1, Some("pending")));
        assert!(!needs_mailchimp_sync(1, Some("subscribed")));
        assert!(!needs_mailchimp_sync(0, None));
        assert!(!needs_mailchimp_sync(0, Some("unsubscribed")));
    }

    #[test]
    fn lead_opt_in_email_mirrors_mailchimp_flag() {
        let lead = LeadRecord {
            pabau_id: 7,
            opt_in_email_mailchimp: 1,
            ..Default::default()
        };
        assert_eq!(lead.opt_in_email(), 1);
    }

    #[test]
    fn lead_changed_at_falls_back_to_created_date() {
        let created = NaiveDate::from_ymd_opt(2024, 1, 1)
            .and_then(|d| d.and_hms_opt(9, 0, 0));
        let mut lead = LeadRecord {
            created_date: created,
            ..Default::default()
        };
        assert_eq!(lead.changed_at(), created);

        let updated = NaiveDate::from_ymd_opt(2024, 2, 1)
            .and_then(|d| d.and_hms_opt(9, 0, 0));
        lead.updated_date = updated;
        assert_eq!(lead.changed_at(), updated);
    }

    #[test]
    fn contact_kind_round_trips_through_strings() {
        assert_eq!(ContactKind::try_from("lead".to_string()), Ok(ContactKind::Lead));
        assert!(ContactKind::try_from("sync_run".to_string()).is_err());
        assert_eq!(ContactKind::Client.other(), ContactKind::Lead);
        assert_eq!(ContactKind::Lead.mailchimp_tag(), "Pabau Leads");
    }

    #[test]
    fn email_validation_rejects_malformed_addresses() {
        let bad = ClientRecord {
            pabau_id: 1,
            email: Some("not-an-email".into()),
            ..Default::default()
        };
        assert!(bad.validate().is_err());

        let good = ClientRecord {
            pabau_id: 1,
            email: Some("jane@example.com".into()),
            ..Default::default()
        };
        assert!(good.validate().is_ok());
    }
}

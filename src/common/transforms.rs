// src/common/transforms.rs
//
// Converte os payloads do Pabau para as colunas do banco.

use std::str::FromStr;

use chrono::{DateTime, NaiveDate, NaiveDateTime};
use rust_decimal::Decimal;
use serde::Serialize;
use serde_json::{json, Map, Value};

use crate::{
    common::error::AppError,
    models::{
        contact::{Client, ClientRecord, Lead, LeadRecord},
        pabau::{ClientPayload, CustomField, LeadPayload},
    },
};

/// Campo customizado do lead que guarda o consentimento de e-mail
pub const LEAD_OPT_IN_FIELD: &str = "opt_in_email_lead";

// =========================================================================
//  NORMALIZAÇÃO
// =========================================================================

pub fn normalize_email(raw: Option<&str>) -> Option<String> {
    raw.map(|e| e.trim().to_lowercase()).filter(|e| !e.is_empty())
}

/// Converte um flag 0/1 vindo da API.
/// Aceita números, booleanos e textos ("1", "yes", "Opted In"...).
/// Número fora de {0, 1} é erro; texto desconhecido vira 0 (sem consentimento).
pub fn normalize_flag(value: Option<&Value>, default: i16) -> Result<i16, AppError> {
    match value {
        None | Some(Value::Null) => Ok(default),
        Some(Value::Bool(b)) => Ok(i16::from(*b)),
        Some(Value::Number(n)) => {
            // 1.0 / 0.0 também chegam da API
            let whole = n.as_i64().or_else(|| {
                n.as_f64()
                    .filter(|f| f.is_finite() && f.fract() == 0.0)
                    .map(|f| f as i64)
            });
            match whole {
                Some(0) => Ok(0),
                Some(1) => Ok(1),
                Some(other) => Err(AppError::InvalidOptIn(other)),
                None => Err(AppError::InvalidRecord(format!(
                    "opt-in flag must be 0 or 1, got {}",
                    n
                ))),
            }
        }
        Some(Value::String(s)) => {
            let s = s.trim().to_lowercase();
            match s.as_str() {
                "1" | "true" | "yes" | "y" | "on" | "opted in" => Ok(1),
                "" | "0" | "false" | "no" | "n" | "off" | "opted out" => Ok(0),
                other => match other.parse::<i64>() {
                    Ok(n) => Err(AppError::InvalidOptIn(n)),
                    Err(_) => Ok(0),
                },
            }
        }
        Some(other) => Err(AppError::InvalidRecord(format!(
            "unexpected opt-in value {}",
            other
        ))),
    }
}

/// Datas do Pabau: "2024-05-01 10:00:00", ISO/RFC3339, só a data, ou dd/mm/yyyy.
/// "0000-00-00 00:00:00" e lixo viram None.
pub fn parse_pabau_datetime(raw: Option<&str>) -> Option<NaiveDateTime> {
    let raw = raw?.trim();
    if raw.is_empty() {
        return None;
    }

    for fmt in ["%Y-%m-%d %H:%M:%S", "%Y-%m-%dT%H:%M:%S", "%d/%m/%Y %H:%M"] {
        if let Ok(dt) = NaiveDateTime::parse_from_str(raw, fmt) {
            return Some(dt);
        }
    }
    if let Ok(dt) = DateTime::parse_from_rfc3339(raw) {
        return Some(dt.naive_utc());
    }
    parse_pabau_date(Some(raw)).and_then(|d| d.and_hms_opt(0, 0, 0))
}

pub fn parse_pabau_date(raw: Option<&str>) -> Option<NaiveDate> {
    let raw = raw?.trim();
    for fmt in ["%Y-%m-%d", "%d/%m/%Y"] {
        if let Ok(d) = NaiveDate::parse_from_str(raw, fmt) {
            return Some(d);
        }
    }
    None
}

fn parse_decimal(value: Option<&Value>) -> Option<Decimal> {
    match value? {
        Value::Number(n) => Decimal::from_str(&n.to_string()).ok(),
        Value::String(s) => Decimal::from_str(s.trim()).ok(),
        _ => None,
    }
}

fn extract_custom_field<'a>(fields: &'a [CustomField], name: &str) -> Option<&'a Value> {
    fields
        .iter()
        .find(|f| f.name.as_deref() == Some(name))
        .and_then(|f| f.value.as_ref())
}

// =========================================================================
//  CLIENTS
// =========================================================================

pub fn transform_client(payload: &ClientPayload) -> Result<ClientRecord, AppError> {
    let details = payload.details.clone().unwrap_or_default();
    let comms = payload.communications.clone().unwrap_or_default();
    let created = payload.created.clone().unwrap_or_default();
    let owner = created
        .owner
        .as_ref()
        .and_then(|owners| owners.first())
        .cloned()
        .unwrap_or_default();

    let pabau_id = details
        .id
        .ok_or_else(|| AppError::InvalidRecord("Pabau client without details.id".into()))?;

    Ok(ClientRecord {
        pabau_id,
        custom_id: details.custom_id,
        email: normalize_email(comms.email.as_deref()),

        first_name: details.first_name,
        last_name: details.last_name,
        salutation: details.salutation,
        gender: details.gender,
        dob: parse_pabau_date(details.dob.as_deref()),
        location: details.location,
        is_active: normalize_flag(details.is_active.as_ref(), 1)?,

        phone: comms.phone,
        mobile: comms.mobile,
        opt_in_email: normalize_flag(comms.opt_in_email.as_ref(), 0)?,
        opt_in_sms: normalize_flag(comms.opt_in_sms.as_ref(), 0)?,
        opt_in_phone: normalize_flag(comms.opt_in_phone.as_ref(), 0)?,
        opt_in_post: normalize_flag(comms.opt_in_post.as_ref(), 0)?,
        opt_in_newsletter: normalize_flag(comms.opt_in_newsletter.as_ref(), 0)?,

        created_date: parse_pabau_datetime(created.created_date.as_deref()),
        created_by_name: owner.full_name,
        created_by_id: owner.created_by_id,
    })
}

// =========================================================================
//  LEADS
// =========================================================================

pub fn transform_lead(payload: &LeadPayload) -> Result<LeadRecord, AppError> {
    let pabau_id = payload
        .id
        .ok_or_else(|| AppError::InvalidRecord("Pabau lead without id".into()))?;

    let owner = payload.owner.clone().unwrap_or_default();
    let location = payload.location.clone().unwrap_or_default();
    let dates = payload.dates.clone().unwrap_or_default();
    let pipeline = payload.pipeline.clone().unwrap_or_default();
    let stage = pipeline.stage.clone().unwrap_or_default();
    let custom_fields = payload.custom_fields.as_deref().unwrap_or(&[]);

    Ok(LeadRecord {
        pabau_id,
        contact_id: payload.contact_id,
        email: normalize_email(payload.email.as_deref()),

        salutation: payload.salutation.clone(),
        first_name: payload.first_name.clone(),
        last_name: payload.last_name.clone(),
        phone: payload.phone.clone(),
        mobile: payload.mobile.clone(),
        dob: parse_pabau_date(payload.dob.as_deref()),

        mailing_street: payload.mailing_street.clone(),
        mailing_postal: payload.mailing_postal.clone(),
        mailing_city: payload.mailing_city.clone(),
        mailing_county: payload.mailing_county.clone(),
        mailing_country: payload.mailing_country.clone(),

        is_active: normalize_flag(payload.is_active.as_ref(), 1)?,
        lead_status: payload.lead_status.clone(),

        owner_id: owner.id,
        owner_name: owner.name,
        location_id: location.id,
        location_name: location.name,

        created_date: parse_pabau_datetime(dates.created_date.as_deref()),
        updated_date: parse_pabau_datetime(dates.updated_date.as_deref()),
        converted_date: parse_pabau_datetime(dates.converted_date.as_deref()),

        pipeline_name: pipeline.name,
        pipeline_stage_id: stage.pipeline_stage_id,
        pipeline_stage_name: stage.pipeline_stage_name,
        deal_value: parse_decimal(payload.deal_value.as_ref()),

        opt_in_email_mailchimp: normalize_flag(
            extract_custom_field(custom_fields, LEAD_OPT_IN_FIELD),
            0,
        )?,
    })
}

// =========================================================================
//  DIFF (sync_logs.field_changes)
// =========================================================================

fn track<T: Serialize + PartialEq>(changes: &mut Map<String, Value>, field: &str, old: &T, new: &T) {
    if old != new {
        changes.insert(field.to_string(), json!({ "old": old, "new": new }));
    }
}

fn finish(changes: Map<String, Value>) -> Option<Value> {
    if changes.is_empty() {
        None
    } else {
        Some(Value::Object(changes))
    }
}

/// Campos que mudariam se `new` fosse gravado por cima de `old`.
pub fn client_changes(old: &Client, new: &ClientRecord) -> Option<Value> {
    let mut c = Map::new();
    track(&mut c, "custom_id", &old.custom_id, &new.custom_id);
    track(&mut c, "email", &old.email, &new.email);
    track(&mut c, "first_name", &old.first_name, &new.first_name);
    track(&mut c, "last_name", &old.last_name, &new.last_name);
    track(&mut c, "salutation", &old.salutation, &new.salutation);
    track(&mut c, "gender", &old.gender, &new.gender);
    track(&mut c, "dob", &old.dob, &new.dob);
    track(&mut c, "location", &old.location, &new.location);
    track(&mut c, "is_active", &old.is_active, &new.is_active);
    track(&mut c, "phone", &old.phone, &new.phone);
    track(&mut c, "mobile", &old.mobile, &new.mobile);
    track(&mut c, "opt_in_email", &old.opt_in_email, &new.opt_in_email);
    track(&mut c, "opt_in_sms", &old.opt_in_sms, &new.opt_in_sms);
    track(&mut c, "opt_in_phone", &old.opt_in_phone, &new.opt_in_phone);
    track(&mut c, "opt_in_post", &old.opt_in_post, &new.opt_in_post);
    track(&mut c, "opt_in_newsletter", &old.opt_in_newsletter, &new.opt_in_newsletter);
    track(&mut c, "created_date", &old.created_date, &new.created_date);
    track(&mut c, "created_by_name", &old.created_by_name, &new.created_by_name);
    track(&mut c, "created_by_id", &old.created_by_id, &new.created_by_id);
    finish(c)
}

pub fn lead_changes(old: &Lead, new: &LeadRecord) -> Option<Value> {
    let mut c = Map::new();
    track(&mut c, "contact_id", &old.contact_id, &new.contact_id);
    track(&mut c, "email", &old.email, &new.email);
    track(&mut c, "salutation", &old.salutation, &new.salutation);
    track(&mut c, "first_name", &old.first_name, &new.first_name);
    track(&mut c, "last_name", &old.last_name, &new.last_name);
    track(&mut c, "phone", &old.phone, &new.phone);
    track(&mut c, "mobile", &old.mobile, &new.mobile);
    track(&mut c, "dob", &old.dob, &new.dob);
    track(&mut c, "mailing_street", &old.mailing_street, &new.mailing_street);
    track(&mut c, "mailing_postal", &old.mailing_postal, &new.mailing_postal);
    track(&mut c, "mailing_city", &old.mailing_city, &new.mailing_city);
    track(&mut c, "mailing_county", &old.mailing_county, &new.mailing_county);
    track(&mut c, "mailing_country", &old.mailing_country, &new.mailing_country);
    track(&mut c, "is_active", &old.is_active, &new.is_active);
    track(&mut c, "lead_status", &old.lead_status, &new.lead_status);
    track(&mut c, "owner_id", &old.owner_id, &new.owner_id);
    track(&mut c, "owner_name", &old.owner_name, &new.owner_name);
    track(&mut c, "location_id", &old.location_id, &new.location_id);
    track(&mut c, "location_name", &old.location_name, &new.location_name);
    track(&mut c, "created_date", &old.created_date, &new.created_date);
    track(&mut c, "updated_date", &old.updated_date, &new.updated_date);
    track(&mut c, "converted_date", &old.converted_date, &new.converted_date);
    track(&mut c, "pipeline_name", &old.pipeline_name, &new.pipeline_name);
    track(&mut c, "pipeline_stage_id", &old.pipeline_stage_id, &new.pipeline_stage_id);
    track(&mut c, "pipeline_stage_name", &old.pipeline_stage_name, &new.pipeline_stage_name);
    track(&mut c, "deal_value", &old.deal_value, &new.deal_value);
    track(
        &mut c,
        "opt_in_email_mailchimp",
        &old.opt_in_email_mailchimp,
        &new.opt_in_email_mailchimp,
    );
    finish(c)
}

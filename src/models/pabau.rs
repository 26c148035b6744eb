// src/models/pabau.rs
//
// Payloads da API do Pabau. A API não é consistente nos tipos (ids às vezes
// vêm como string, flags como "1"/1/true), então os campos escalares são
// lidos de forma tolerante.

use serde::{Deserialize, Deserializer};
use serde_json::Value;

pub fn lenient_string<'de, D>(deserializer: D) -> Result<Option<String>, D::Error>
where
    D: Deserializer<'de>,
{
    let value = Option::<Value>::deserialize(deserializer)?;
    Ok(match value {
        Some(Value::String(s)) if !s.trim().is_empty() => Some(s),
        Some(Value::Number(n)) => Some(n.to_string()),
        Some(Value::Bool(b)) => Some(b.to_string()),
        _ => None,
    })
}

pub fn lenient_i64<'de, D>(deserializer: D) -> Result<Option<i64>, D::Error>
where
    D: Deserializer<'de>,
{
    let value = Option::<Value>::deserialize(deserializer)?;
    Ok(match value {
        Some(Value::Number(n)) => n.as_i64().or_else(|| n.as_f64().map(|f| f as i64)),
        Some(Value::String(s)) => s.trim().parse().ok(),
        _ => None,
    })
}

// =========================================================================
//  CLIENTS
// =========================================================================

#[derive(Debug, Clone, Default, Deserialize)]
pub struct PabauClientsPage {
    #[serde(default)]
    pub clients: Vec<ClientPayload>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct ClientPayload {
    pub details: Option<ClientDetails>,
    pub communications: Option<ClientCommunications>,
    pub created: Option<ClientCreated>,
}

impl ClientPayload {
    pub fn id(&self) -> Option<i64> {
        self.details.as_ref().and_then(|d| d.id)
    }

    pub fn raw_email(&self) -> Option<&str> {
        self.communications.as_ref().and_then(|c| c.email.as_deref())
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct ClientDetails {
    #[serde(default, deserialize_with = "lenient_i64")]
    pub id: Option<i64>,
    #[serde(default, deserialize_with = "lenient_string")]
    pub custom_id: Option<String>,
    #[serde(default, deserialize_with = "lenient_string")]
    pub first_name: Option<String>,
    #[serde(default, deserialize_with = "lenient_string")]
    pub last_name: Option<String>,
    #[serde(default, deserialize_with = "lenient_string")]
    pub salutation: Option<String>,
    #[serde(default, deserialize_with = "lenient_string")]
    pub gender: Option<String>,
    #[serde(rename = "DOB", default, deserialize_with = "lenient_string")]
    pub dob: Option<String>,
    #[serde(default, deserialize_with = "lenient_string")]
    pub location: Option<String>,
    #[serde(default)]
    pub is_active: Option<Value>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct ClientCommunications {
    #[serde(default, deserialize_with = "lenient_string")]
    pub email: Option<String>,
    #[serde(default, deserialize_with = "lenient_string")]
    pub phone: Option<String>,
    #[serde(default, deserialize_with = "lenient_string")]
    pub mobile: Option<String>,
    #[serde(default)]
    pub opt_in_email: Option<Value>,
    #[serde(default)]
    pub opt_in_sms: Option<Value>,
    #[serde(default)]
    pub opt_in_phone: Option<Value>,
    #[serde(default)]
    pub opt_in_post: Option<Value>,
    #[serde(default)]
    pub opt_in_newsletter: Option<Value>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct ClientCreated {
    #[serde(default, deserialize_with = "lenient_string")]
    pub created_date: Option<String>,
    #[serde(default)]
    pub owner: Option<Vec<ClientOwner>>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct ClientOwner {
    #[serde(default, deserialize_with = "lenient_string")]
    pub full_name: Option<String>,
    #[serde(default, deserialize_with = "lenient_i64")]
    pub created_by_id: Option<i64>,
}

// =========================================================================
//  LEADS
// =========================================================================

#[derive(Debug, Clone, Default, Deserialize)]
pub struct PabauLeadsPage {
    #[serde(default)]
    pub leads: Vec<LeadPayload>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct LeadPayload {
    #[serde(default, deserialize_with = "lenient_i64")]
    pub id: Option<i64>,
    #[serde(default, deserialize_with = "lenient_i64")]
    pub contact_id: Option<i64>,
    #[serde(default, deserialize_with = "lenient_string")]
    pub email: Option<String>,

    #[serde(default, deserialize_with = "lenient_string")]
    pub salutation: Option<String>,
    #[serde(default, deserialize_with = "lenient_string")]
    pub first_name: Option<String>,
    #[serde(default, deserialize_with = "lenient_string")]
    pub last_name: Option<String>,
    #[serde(default, deserialize_with = "lenient_string")]
    pub phone: Option<String>,
    #[serde(default, deserialize_with = "lenient_string")]
    pub mobile: Option<String>,
    #[serde(rename = "DOB", default, deserialize_with = "lenient_string")]
    pub dob: Option<String>,

    #[serde(default, deserialize_with = "lenient_string")]
    pub mailing_street: Option<String>,
    #[serde(default, deserialize_with = "lenient_string")]
    pub mailing_postal: Option<String>,
    #[serde(default, deserialize_with = "lenient_string")]
    pub mailing_city: Option<String>,
    #[serde(default, deserialize_with = "lenient_string")]
    pub mailing_county: Option<String>,
    #[serde(default, deserialize_with = "lenient_string")]
    pub mailing_country: Option<String>,

    #[serde(default)]
    pub is_active: Option<Value>,
    #[serde(default, deserialize_with = "lenient_string")]
    pub lead_status: Option<String>,

    #[serde(default)]
    pub owner: Option<NamedRef>,
    #[serde(default)]
    pub location: Option<NamedRef>,
    #[serde(default)]
    pub dates: Option<LeadDates>,
    #[serde(default)]
    pub pipeline: Option<LeadPipeline>,

    #[serde(default)]
    pub deal_value: Option<Value>,
    #[serde(default)]
    pub custom_fields: Option<Vec<CustomField>>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct NamedRef {
    #[serde(default, deserialize_with = "lenient_i64")]
    pub id: Option<i64>,
    #[serde(default, deserialize_with = "lenient_string")]
    pub name: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct LeadDates {
    #[serde(default, deserialize_with = "lenient_string")]
    pub created_date: Option<String>,
    #[serde(default, deserialize_with = "lenient_string")]
    pub updated_date: Option<String>,
    #[serde(default, deserialize_with = "lenient_string")]
    pub converted_date: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct LeadPipeline {
    #[serde(default, deserialize_with = "lenient_string")]
    pub name: Option<String>,
    #[serde(default)]
    pub stage: Option<PipelineStage>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct PipelineStage {
    #[serde(default, deserialize_with = "lenient_i64")]
    pub pipeline_stage_id: Option<i64>,
    #[serde(default, deserialize_with = "lenient_string")]
    pub pipeline_stage_name: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct CustomField {
    #[serde(default, deserialize_with = "lenient_string")]
    pub name: Option<String>,
    #[serde(default)]
    pub value: Option<Value>,
}

// src/models/mailchimp.rs

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

// Corpo do PUT lists/{list}/members/{hash}
#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct MemberUpsert {
    pub email_address: String,
    // Só vale para membros novos; o status de quem já existe é preservado.
    pub status_if_new: String,
    pub merge_fields: BTreeMap<String, String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct TagUpdate {
    pub tags: Vec<TagChange>,
}

#[derive(Debug, Clone, Serialize)]
pub struct TagChange {
    pub name: String,
    pub status: String,
}

#[derive(Debug, Clone, Deserialize, PartialEq)]
pub struct Member {
    /// Hash MD5 do e-mail em minúsculas
    #[serde(default)]
    pub id: String,
    pub email_address: String,
    pub status: String,
    #[serde(default)]
    pub tags: Vec<MemberTag>,
}

impl Member {
    pub fn tag_names(&self) -> Vec<String> {
        self.tags.iter().map(|t| t.name.clone()).collect()
    }
}

#[derive(Debug, Clone, Deserialize, PartialEq)]
pub struct MemberTag {
    pub name: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct MembersPage {
    #[serde(default)]
    pub members: Vec<Member>,
    #[serde(default)]
    pub total_items: u64,
}

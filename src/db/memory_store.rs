// src/db/memory_store.rs
//
// ContactStore em memória para os testes dos jobs de sync.

use std::{
    collections::HashSet,
    sync::{
        atomic::{AtomicBool, Ordering},
        Mutex, MutexGuard,
    },
};

use async_trait::async_trait;
use chrono::{NaiveDateTime, Utc};

use crate::{
    common::error::AppError,
    db::store::ContactStore,
    models::{
        contact::{
            Client, ClientRecord, ContactKind, ContactRow, Lead, LeadRecord,
            UnsubscribeMatch,
        },
        sync_log::NewSyncLog,
    },
};

#[derive(Default)]
struct Tables {
    clients: Vec<Client>,
    leads: Vec<Lead>,
    logs: Vec<NewSyncLog>,
    next_id: i32,
}

#[derive(Default)]
pub struct MemoryStore {
    tables: Mutex<Tables>,
    cycle_locked: AtomicBool,
    /// Faz `log` falhar; simula o banco fora do ar
    pub fail_logs: AtomicBool,
    /// Faz `contacts_needing_sync` entrar em pânico
    pub panic_on_push_query: AtomicBool,
}

fn same_email(a: Option<&str>, b: &str) -> bool {
    a.is_some_and(|a| a.eq_ignore_ascii_case(b))
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn tables(&self) -> MutexGuard<'_, Tables> {
        self.tables.lock().unwrap()
    }

    pub fn clients(&self) -> Vec<Client> {
        self.tables().clients.clone()
    }

    pub fn leads(&self) -> Vec<Lead> {
        self.tables().leads.clone()
    }

    pub fn logs(&self) -> Vec<NewSyncLog> {
        self.tables().logs.clone()
    }

    pub fn client(&self, pabau_id: i64) -> Option<Client> {
        self.tables()
            .clients
            .iter()
            .find(|c| c.pabau_id == pabau_id)
            .cloned()
    }

    pub fn lead(&self, pabau_id: i64) -> Option<Lead> {
        self.tables()
            .leads
            .iter()
            .find(|l| l.pabau_id == pabau_id)
            .cloned()
    }

    /// Ajusta o último sync do Pabau de todas as linhas de uma tabela
    pub fn set_last_pabau_sync(&self, kind: ContactKind, at: NaiveDateTime) {
        let mut t = self.tables();
        match kind {
            ContactKind::Client => t
                .clients
                .iter_mut()
                .for_each(|c| c.pabau_last_synced_at = Some(at)),
            ContactKind::Lead => t
                .leads
                .iter_mut()
                .for_each(|l| l.pabau_last_synced_at = Some(at)),
        }
    }

    pub fn set_mailchimp_state(
        &self,
        kind: ContactKind,
        pabau_id: i64,
        member_id: Option<&str>,
        status: Option<&str>,
    ) {
        let mut t = self.tables();
        match kind {
            ContactKind::Client => {
                if let Some(c) = t.clients.iter_mut().find(|c| c.pabau_id == pabau_id) {
                    c.mailchimp_id = member_id.map(str::to_string);
                    c.mailchimp_status = status.map(str::to_string);
                }
            }
            ContactKind::Lead => {
                if let Some(l) = t.leads.iter_mut().find(|l| l.pabau_id == pabau_id) {
                    l.mailchimp_id = member_id.map(str::to_string);
                    l.mailchimp_status = status.map(str::to_string);
                }
            }
        }
    }

    fn check_email(
        t: &Tables,
        kind: ContactKind,
        email: Option<&str>,
        pabau_id: i64,
    ) -> Result<(), AppError> {
        let Some(email) = email else {
            return Ok(());
        };

        let in_clients = |skip_own: bool| {
            t.clients
                .iter()
                .any(|c| same_email(c.email.as_deref(), email) && !(skip_own && c.pabau_id == pabau_id))
        };
        let in_leads = |skip_own: bool| {
            t.leads
                .iter()
                .any(|l| same_email(l.email.as_deref(), email) && !(skip_own && l.pabau_id == pabau_id))
        };

        let (other_taken, same_taken) = match kind {
            ContactKind::Client => (in_leads(false), in_clients(true)),
            ContactKind::Lead => (in_clients(false), in_leads(true)),
        };

        if other_taken {
            return Err(AppError::EmailConflict {
                email: email.to_string(),
                existing: kind.other(),
            });
        }
        if same_taken {
            return Err(AppError::EmailConflict {
                email: email.to_string(),
                existing: kind,
            });
        }
        Ok(())
    }

    fn row_from_client(c: &Client) -> Option<ContactRow> {
        Some(ContactRow {
            contact_type: ContactKind::Client,
            entity_id: c.id,
            pabau_id: c.pabau_id,
            email: c.email.clone()?,
            first_name: c.first_name.clone(),
            last_name: c.last_name.clone(),
            phone: c.phone.clone(),
            opt_in_email: c.opt_in_email,
            is_active: c.is_active,
            mailchimp_id: c.mailchimp_id.clone(),
            mailchimp_status: c.mailchimp_status.clone(),
        })
    }

    fn row_from_lead(l: &Lead) -> Option<ContactRow> {
        Some(ContactRow {
            contact_type: ContactKind::Lead,
            entity_id: l.id,
            pabau_id: l.pabau_id,
            email: l.email.clone()?,
            first_name: l.first_name.clone(),
            last_name: l.last_name.clone(),
            phone: l.phone.clone(),
            opt_in_email: l.opt_in_email,
            is_active: l.is_active,
            mailchimp_id: l.mailchimp_id.clone(),
            mailchimp_status: l.mailchimp_status.clone(),
        })
    }
}

#[async_trait]
impl ContactStore for MemoryStore {
    async fn last_pabau_sync(&self, kind: ContactKind) -> Result<Option<NaiveDateTime>, AppError> {
        let t = self.tables();
        Ok(match kind {
            ContactKind::Client => t.clients.iter().filter_map(|c| c.pabau_last_synced_at).max(),
            ContactKind::Lead => t.leads.iter().filter_map(|l| l.pabau_last_synced_at).max(),
        })
    }

    async fn existing_pabau_ids(&self, kind: ContactKind) -> Result<HashSet<i64>, AppError> {
        let t = self.tables();
        Ok(match kind {
            ContactKind::Client => t.clients.iter().map(|c| c.pabau_id).collect(),
            ContactKind::Lead => t.leads.iter().map(|l| l.pabau_id).collect(),
        })
    }

    async fn find_client(&self, pabau_id: i64) -> Result<Option<Client>, AppError> {
        Ok(self.client(pabau_id))
    }

    async fn find_lead(&self, pabau_id: i64) -> Result<Option<Lead>, AppError> {
        Ok(self.lead(pabau_id))
    }

    async fn upsert_client(&self, r: &ClientRecord, synced_at: NaiveDateTime) -> Result<i32, AppError> {
        let mut t = self.tables();
        Self::check_email(&t, ContactKind::Client, r.email.as_deref(), r.pabau_id)?;

        let now = Utc::now().naive_utc();
        if let Some(c) = t.clients.iter_mut().find(|c| c.pabau_id == r.pabau_id) {
            c.custom_id = r.custom_id.clone();
            c.email = r.email.clone();
            c.first_name = r.first_name.clone();
            c.last_name = r.last_name.clone();
            c.salutation = r.salutation.clone();
            c.gender = r.gender.clone();
            c.dob = r.dob;
            c.location = r.location.clone();
            c.is_active = r.is_active;
            c.phone = r.phone.clone();
            c.mobile = r.mobile.clone();
            c.opt_in_email = r.opt_in_email;
            c.opt_in_sms = r.opt_in_sms;
            c.opt_in_phone = r.opt_in_phone;
            c.opt_in_post = r.opt_in_post;
            c.opt_in_newsletter = r.opt_in_newsletter;
            c.created_date = r.created_date;
            c.created_by_name = r.created_by_name.clone();
            c.created_by_id = r.created_by_id;
            c.pabau_last_synced_at = Some(synced_at);
            c.updated_at = now;
            return Ok(c.id);
        }

        t.next_id += 1;
        let id = t.next_id;
        t.clients.push(Client {
            id,
            pabau_id: r.pabau_id,
            custom_id: r.custom_id.clone(),
            email: r.email.clone(),
            first_name: r.first_name.clone(),
            last_name: r.last_name.clone(),
            salutation: r.salutation.clone(),
            gender: r.gender.clone(),
            dob: r.dob,
            location: r.location.clone(),
            is_active: r.is_active,
            phone: r.phone.clone(),
            mobile: r.mobile.clone(),
            opt_in_email: r.opt_in_email,
            opt_in_sms: r.opt_in_sms,
            opt_in_phone: r.opt_in_phone,
            opt_in_post: r.opt_in_post,
            opt_in_newsletter: r.opt_in_newsletter,
            created_date: r.created_date,
            created_by_name: r.created_by_name.clone(),
            created_by_id: r.created_by_id,
            mailchimp_id: None,
            mailchimp_status: None,
            mailchimp_tags: Vec::new(),
            pabau_last_synced_at: Some(synced_at),
            mailchimp_last_synced_at: None,
            created_at: now,
            updated_at: now,
        });
        Ok(id)
    }

    async fn upsert_lead(&self, r: &LeadRecord, synced_at: NaiveDateTime) -> Result<i32, AppError> {
        let mut t = self.tables();
        Self::check_email(&t, ContactKind::Lead, r.email.as_deref(), r.pabau_id)?;

        let now = Utc::now().naive_utc();
        let existing = t.leads.iter().position(|l| l.pabau_id == r.pabau_id);
        let (id, mailchimp, created_at) = match existing {
            Some(i) => {
                let l = &t.leads[i];
                (
                    l.id,
                    (l.mailchimp_id.clone(), l.mailchimp_status.clone(), l.mailchimp_tags.clone(), l.mailchimp_last_synced_at),
                    l.created_at,
                )
            }
            None => {
                t.next_id += 1;
                (t.next_id, (None, None, Vec::new(), None), now)
            }
        };

        let lead = Lead {
            id,
            pabau_id: r.pabau_id,
            contact_id: r.contact_id,
            email: r.email.clone(),
            salutation: r.salutation.clone(),
            first_name: r.first_name.clone(),
            last_name: r.last_name.clone(),
            phone: r.phone.clone(),
            mobile: r.mobile.clone(),
            dob: r.dob,
            mailing_street: r.mailing_street.clone(),
            mailing_postal: r.mailing_postal.clone(),
            mailing_city: r.mailing_city.clone(),
            mailing_county: r.mailing_county.clone(),
            mailing_country: r.mailing_country.clone(),
            is_active: r.is_active,
            lead_status: r.lead_status.clone(),
            owner_id: r.owner_id,
            owner_name: r.owner_name.clone(),
            location_id: r.location_id,
            location_name: r.location_name.clone(),
            created_date: r.created_date,
            updated_date: r.updated_date,
            converted_date: r.converted_date,
            pipeline_name: r.pipeline_name.clone(),
            pipeline_stage_id: r.pipeline_stage_id,
            pipeline_stage_name: r.pipeline_stage_name.clone(),
            deal_value: r.deal_value,
            opt_in_email_mailchimp: r.opt_in_email_mailchimp,
            opt_in_email: r.opt_in_email(),
            mailchimp_id: mailchimp.0,
            mailchimp_status: mailchimp.1,
            mailchimp_tags: mailchimp.2,
            pabau_last_synced_at: Some(synced_at),
            mailchimp_last_synced_at: mailchimp.3,
            created_at,
            updated_at: now,
        };

        match existing {
            Some(i) => t.leads[i] = lead,
            None => t.leads.push(lead),
        }
        Ok(id)
    }

    async fn apply_unsubscribe(
        &self,
        email: &str,
        member_id: &str,
        status: &str,
    ) -> Result<Option<UnsubscribeMatch>, AppError> {
        let mut t = self.tables();
        let now = Utc::now().naive_utc();

        if let Some(c) = t.clients.iter_mut().find(|c| {
            same_email(c.email.as_deref(), email) || c.mailchimp_id.as_deref() == Some(member_id)
        }) {
            let changed = c.opt_in_email == 1;
            c.opt_in_email = 0;
            c.mailchimp_status = Some(status.to_string());
            c.mailchimp_id.get_or_insert_with(|| member_id.to_string());
            c.mailchimp_last_synced_at = Some(now);
            return Ok(Some(UnsubscribeMatch {
                kind: ContactKind::Client,
                entity_id: c.id,
                pabau_id: c.pabau_id,
                changed,
            }));
        }

        if let Some(l) = t.leads.iter_mut().find(|l| {
            same_email(l.email.as_deref(), email) || l.mailchimp_id.as_deref() == Some(member_id)
        }) {
            let changed = l.opt_in_email == 1;
            l.opt_in_email_mailchimp = 0;
            l.opt_in_email = 0;
            l.mailchimp_status = Some(status.to_string());
            l.mailchimp_id.get_or_insert_with(|| member_id.to_string());
            l.mailchimp_last_synced_at = Some(now);
            return Ok(Some(UnsubscribeMatch {
                kind: ContactKind::Lead,
                entity_id: l.id,
                pabau_id: l.pabau_id,
                changed,
            }));
        }

        Ok(None)
    }

    async fn contacts_needing_sync(&self) -> Result<Vec<ContactRow>, AppError> {
        if self.panic_on_push_query.load(Ordering::SeqCst) {
            panic!("contacts_needing_sync blew up");
        }
        Ok(self
            .all_contacts()
            .await?
            .into_iter()
            .filter(ContactRow::needs_sync)
            .collect())
    }

    async fn all_contacts(&self) -> Result<Vec<ContactRow>, AppError> {
        let t = self.tables();
        let clients = t.clients.iter().filter_map(Self::row_from_client);
        let leads = t.leads.iter().filter_map(Self::row_from_lead);
        Ok(clients.chain(leads).collect())
    }

    async fn mark_mailchimp_synced(
        &self,
        kind: ContactKind,
        entity_id: i32,
        member_id: &str,
        status: &str,
        tags: &[String],
        synced_at: NaiveDateTime,
    ) -> Result<(), AppError> {
        let mut t = self.tables();
        match kind {
            ContactKind::Client => {
                if let Some(c) = t.clients.iter_mut().find(|c| c.id == entity_id) {
                    c.mailchimp_id = Some(member_id.to_string());
                    c.mailchimp_status = Some(status.to_string());
                    c.mailchimp_tags = tags.to_vec();
                    c.mailchimp_last_synced_at = Some(synced_at);
                }
            }
            ContactKind::Lead => {
                if let Some(l) = t.leads.iter_mut().find(|l| l.id == entity_id) {
                    l.mailchimp_id = Some(member_id.to_string());
                    l.mailchimp_status = Some(status.to_string());
                    l.mailchimp_tags = tags.to_vec();
                    l.mailchimp_last_synced_at = Some(synced_at);
                }
            }
        }
        Ok(())
    }

    async fn log(&self, entry: NewSyncLog) -> Result<(), AppError> {
        if self.fail_logs.load(Ordering::SeqCst) {
            return Err(AppError::InternalServerError(anyhow::anyhow!("log table unavailable")));
        }
        self.tables().logs.push(entry);
        Ok(())
    }

    async fn try_lock_cycle(&self) -> Result<bool, AppError> {
        Ok(self
            .cycle_locked
            .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
            .is_ok())
    }

    async fn unlock_cycle(&self) -> Result<(), AppError> {
        self.cycle_locked.store(false, Ordering::SeqCst);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn now() -> NaiveDateTime {
        Utc::now().naive_utc()
    }

    #[tokio::test]
    async fn email_is_unique_across_tables() {
        let store = MemoryStore::new();
        store
            .upsert_client(
                &ClientRecord { pabau_id: 1, email: Some("a@example.com".into()), ..Default::default() },
                now(),
            )
            .await
            .unwrap();

        let err = store
            .upsert_lead(
                &LeadRecord { pabau_id: 9, email: Some("A@example.com".into()), ..Default::default() },
                now(),
            )
            .await
            .unwrap_err();

        assert!(matches!(
            err,
            AppError::EmailConflict { existing: ContactKind::Client, .. }
        ));
    }

    #[tokio::test]
    async fn lead_opt_in_is_derived() {
        let store = MemoryStore::new();
        store
            .upsert_lead(
                &LeadRecord {
                    pabau_id: 2,
                    email: Some("l@example.com".into()),
                    opt_in_email_mailchimp: 1,
                    ..Default::default()
                },
                now(),
            )
            .await
            .unwrap();

        let rows = store.contacts_needing_sync().await.unwrap();
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].opt_in_email, 1);
    }

    #[tokio::test]
    async fn cycle_lock_is_exclusive() {
        let store = MemoryStore::new();
        assert!(store.try_lock_cycle().await.unwrap());
        assert!(!store.try_lock_cycle().await.unwrap());
        store.unlock_cycle().await.unwrap();
        assert!(store.try_lock_cycle().await.unwrap());
    }
}

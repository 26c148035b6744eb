// src/db/contact_repo.rs

use std::collections::HashSet;

use async_trait::async_trait;
use chrono::NaiveDateTime;
use sqlx::{pool::PoolConnection, PgPool, Postgres, Transaction};
use tokio::sync::Mutex;

use crate::{
    common::{
        db_utils::{release_advisory_lock, try_advisory_lock, SYNC_CYCLE_LOCK_KEY},
        error::AppError,
    },
    db::store::ContactStore,
    models::{
        contact::{Client, ClientRecord, ContactKind, ContactRow, Lead, LeadRecord, UnsubscribeMatch},
        sync_log::NewSyncLog,
    },
};

const CONTACT_COLUMNS: &str = r#"
    contact_type, entity_id, pabau_id, email, first_name, last_name, phone,
    opt_in_email, is_active, mailchimp_id, mailchimp_status
"#;

pub struct PgContactStore {
    pool: PgPool,
    // Conexão que segura o advisory lock do ciclo
    cycle_lock: Mutex<Option<PoolConnection<Postgres>>>,
}

impl PgContactStore {
    pub fn new(pool: PgPool) -> Self {
        Self {
            pool,
            cycle_lock: Mutex::new(None),
        }
    }

    /// Regra "um e-mail, um contato", checada dentro da transação do upsert.
    async fn ensure_email_free(
        tx: &mut Transaction<'_, Postgres>,
        kind: ContactKind,
        email: Option<&str>,
        pabau_id: i64,
    ) -> Result<(), AppError> {
        let Some(email) = email else {
            return Ok(());
        };

        // 1. Outra tabela
        let other = kind.other();
        let in_other: bool = sqlx::query_scalar(&format!(
            "SELECT EXISTS (SELECT 1 FROM {} WHERE lower(email) = lower($1))",
            other.table()
        ))
        .bind(email)
        .fetch_one(&mut **tx)
        .await?;

        if in_other {
            return Err(AppError::EmailConflict {
                email: email.to_string(),
                existing: other,
            });
        }

        // 2. Mesma tabela, outro registro do Pabau
        let in_same: bool = sqlx::query_scalar(&format!(
            "SELECT EXISTS (SELECT 1 FROM {} WHERE lower(email) = lower($1) AND pabau_id <> $2)",
            kind.table()
        ))
        .bind(email)
        .bind(pabau_id)
        .fetch_one(&mut **tx)
        .await?;

        if in_same {
            return Err(AppError::EmailConflict {
                email: email.to_string(),
                existing: kind,
            });
        }

        Ok(())
    }

    /// Converte violação de unicidade (índice ou trigger) no erro tipado.
    fn map_unique_violation(e: sqlx::Error, kind: ContactKind, email: Option<&str>) -> AppError {
        if let sqlx::Error::Database(db_err) = &e {
            if db_err.is_unique_violation() {
                // Índice da própria tabela tem nome; o trigger não tem constraint.
                let existing = match db_err.constraint() {
                    Some(_) => kind,
                    None => kind.other(),
                };
                return AppError::EmailConflict {
                    email: email.unwrap_or_default().to_string(),
                    existing,
                };
            }
        }
        e.into()
    }
}

#[async_trait]
impl ContactStore for PgContactStore {
    async fn last_pabau_sync(&self, kind: ContactKind) -> Result<Option<NaiveDateTime>, AppError> {
        let last: Option<NaiveDateTime> = sqlx::query_scalar(&format!(
            "SELECT MAX(pabau_last_synced_at) FROM {}",
            kind.table()
        ))
        .fetch_one(&self.pool)
        .await?;

        Ok(last)
    }

    async fn existing_pabau_ids(&self, kind: ContactKind) -> Result<HashSet<i64>, AppError> {
        let ids: Vec<i64> = sqlx::query_scalar(&format!("SELECT pabau_id FROM {}", kind.table()))
            .fetch_all(&self.pool)
            .await?;

        Ok(ids.into_iter().collect())
    }

    async fn find_client(&self, pabau_id: i64) -> Result<Option<Client>, AppError> {
        let client = sqlx::query_as::<_, Client>("SELECT * FROM clients WHERE pabau_id = $1")
            .bind(pabau_id)
            .fetch_optional(&self.pool)
            .await?;

        Ok(client)
    }

    async fn find_lead(&self, pabau_id: i64) -> Result<Option<Lead>, AppError> {
        let lead = sqlx::query_as::<_, Lead>("SELECT * FROM leads WHERE pabau_id = $1")
            .bind(pabau_id)
            .fetch_optional(&self.pool)
            .await?;

        Ok(lead)
    }

    async fn upsert_client(
        &self,
        r: &ClientRecord,
        synced_at: NaiveDateTime,
    ) -> Result<i32, AppError> {
        let mut tx = self.pool.begin().await?;

        Self::ensure_email_free(&mut tx, ContactKind::Client, r.email.as_deref(), r.pabau_id)
            .await?;

        let id: i32 = sqlx::query_scalar(
            r#"
            INSERT INTO clients (
                pabau_id, custom_id, email, first_name, last_name,
                salutation, gender, dob, location, is_active,
                phone, mobile,
                opt_in_email, opt_in_sms, opt_in_phone, opt_in_post, opt_in_newsletter,
                created_date, created_by_name, created_by_id,
                pabau_last_synced_at
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12,
                    $13, $14, $15, $16, $17, $18, $19, $20, $21)
            ON CONFLICT (pabau_id) DO UPDATE SET
                custom_id = EXCLUDED.custom_id,
                email = EXCLUDED.email,
                first_name = EXCLUDED.first_name,
                last_name = EXCLUDED.last_name,
                salutation = EXCLUDED.salutation,
                gender = EXCLUDED.gender,
                dob = EXCLUDED.dob,
                location = EXCLUDED.location,
                is_active = EXCLUDED.is_active,
                phone = EXCLUDED.phone,
                mobile = EXCLUDED.mobile,
                opt_in_email = EXCLUDED.opt_in_email,
                opt_in_sms = EXCLUDED.opt_in_sms,
                opt_in_phone = EXCLUDED.opt_in_phone,
                opt_in_post = EXCLUDED.opt_in_post,
                opt_in_newsletter = EXCLUDED.opt_in_newsletter,
                created_date = EXCLUDED.created_date,
                created_by_name = EXCLUDED.created_by_name,
                created_by_id = EXCLUDED.created_by_id,
                pabau_last_synced_at = EXCLUDED.pabau_last_synced_at
            RETURNING id
            "#,
        )
        .bind(r.pabau_id)
        .bind(&r.custom_id)
        .bind(&r.email)
        .bind(&r.first_name)
        .bind(&r.last_name)
        .bind(&r.salutation)
        .bind(&r.gender)
        .bind(r.dob)
        .bind(&r.location)
        .bind(r.is_active)
        .bind(&r.phone)
        .bind(&r.mobile)
        .bind(r.opt_in_email)
        .bind(r.opt_in_sms)
        .bind(r.opt_in_phone)
        .bind(r.opt_in_post)
        .bind(r.opt_in_newsletter)
        .bind(r.created_date)
        .bind(&r.created_by_name)
        .bind(r.created_by_id)
        .bind(synced_at)
        .fetch_one(&mut *tx)
        .await
        .map_err(|e| Self::map_unique_violation(e, ContactKind::Client, r.email.as_deref()))?;

        tx.commit().await?;
        Ok(id)
    }

    async fn upsert_lead(&self, r: &LeadRecord, synced_at: NaiveDateTime) -> Result<i32, AppError> {
        let mut tx = self.pool.begin().await?;

        Self::ensure_email_free(&mut tx, ContactKind::Lead, r.email.as_deref(), r.pabau_id)
            .await?;

        // opt_in_email não aparece aqui: é coluna gerada a partir de opt_in_email_mailchimp
        let id: i32 = sqlx::query_scalar(
            r#"
            INSERT INTO leads (
                pabau_id, contact_id, email, salutation, first_name, last_name,
                phone, mobile, dob,
                mailing_street, mailing_postal, mailing_city, mailing_county, mailing_country,
                is_active, lead_status,
                owner_id, owner_name, location_id, location_name,
                created_date, updated_date, converted_date,
                pipeline_name, pipeline_stage_id, pipeline_stage_name,
                deal_value, opt_in_email_mailchimp,
                pabau_last_synced_at
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14, $15,
                    $16, $17, $18, $19, $20, $21, $22, $23, $24, $25, $26, $27, $28, $29)
            ON CONFLICT (pabau_id) DO UPDATE SET
                contact_id = EXCLUDED.contact_id,
                email = EXCLUDED.email,
                salutation = EXCLUDED.salutation,
                first_name = EXCLUDED.first_name,
                last_name = EXCLUDED.last_name,
                phone = EXCLUDED.phone,
                mobile = EXCLUDED.mobile,
                dob = EXCLUDED.dob,
                mailing_street = EXCLUDED.mailing_street,
                mailing_postal = EXCLUDED.mailing_postal,
                mailing_city = EXCLUDED.mailing_city,
                mailing_county = EXCLUDED.mailing_county,
                mailing_country = EXCLUDED.mailing_country,
                is_active = EXCLUDED.is_active,
                lead_status = EXCLUDED.lead_status,
                owner_id = EXCLUDED.owner_id,
                owner_name = EXCLUDED.owner_name,
                location_id = EXCLUDED.location_id,
                location_name = EXCLUDED.location_name,
                created_date = EXCLUDED.created_date,
                updated_date = EXCLUDED.updated_date,
                converted_date = EXCLUDED.converted_date,
                pipeline_name = EXCLUDED.pipeline_name,
                pipeline_stage_id = EXCLUDED.pipeline_stage_id,
                pipeline_stage_name = EXCLUDED.pipeline_stage_name,
                deal_value = EXCLUDED.deal_value,
                opt_in_email_mailchimp = EXCLUDED.opt_in_email_mailchimp,
                pabau_last_synced_at = EXCLUDED.pabau_last_synced_at
            RETURNING id
            "#,
        )
        .bind(r.pabau_id)
        .bind(r.contact_id)
        .bind(&r.email)
        .bind(&r.salutation)
        .bind(&r.first_name)
        .bind(&r.last_name)
        .bind(&r.phone)
        .bind(&r.mobile)
        .bind(r.dob)
        .bind(&r.mailing_street)
        .bind(&r.mailing_postal)
        .bind(&r.mailing_city)
        .bind(&r.mailing_county)
        .bind(&r.mailing_country)
        .bind(r.is_active)
        .bind(&r.lead_status)
        .bind(r.owner_id)
        .bind(&r.owner_name)
        .bind(r.location_id)
        .bind(&r.location_name)
        .bind(r.created_date)
        .bind(r.updated_date)
        .bind(r.converted_date)
        .bind(&r.pipeline_name)
        .bind(r.pipeline_stage_id)
        .bind(&r.pipeline_stage_name)
        .bind(r.deal_value)
        .bind(r.opt_in_email_mailchimp)
        .bind(synced_at)
        .fetch_one(&mut *tx)
        .await
        .map_err(|e| Self::map_unique_violation(e, ContactKind::Lead, r.email.as_deref()))?;

        tx.commit().await?;
        Ok(id)
    }

    async fn apply_unsubscribe(
        &self,
        email: &str,
        member_id: &str,
        status: &str,
    ) -> Result<Option<UnsubscribeMatch>, AppError> {
        let mut tx = self.pool.begin().await?;

        for kind in [ContactKind::Client, ContactKind::Lead] {
            let found: Option<(i32, i64, i16, Option<String>)> = sqlx::query_as(&format!(
                r#"
                SELECT id, pabau_id, opt_in_email, mailchimp_status
                FROM {}
                WHERE lower(email) = lower($1) OR mailchimp_id = $2
                ORDER BY id
                LIMIT 1
                FOR UPDATE
                "#,
                kind.table()
            ))
            .bind(email)
            .bind(member_id)
            .fetch_optional(&mut *tx)
            .await?;

            let Some((id, pabau_id, opt_in_email, current_status)) = found else {
                continue;
            };

            let changed = opt_in_email == 1;
            if changed || current_status.as_deref() != Some(status) {
                // Em leads o flag gravável é opt_in_email_mailchimp
                let opt_in_column = match kind {
                    ContactKind::Client => "opt_in_email",
                    ContactKind::Lead => "opt_in_email_mailchimp",
                };
                sqlx::query(&format!(
                    r#"
                    UPDATE {}
                    SET {} = 0,
                        mailchimp_status = $2,
                        mailchimp_id = COALESCE(mailchimp_id, $3),
                        mailchimp_last_synced_at = CURRENT_TIMESTAMP
                    WHERE id = $1
                    "#,
                    kind.table(),
                    opt_in_column
                ))
                .bind(id)
                .bind(status)
                .bind(member_id)
                .execute(&mut *tx)
                .await?;
            }

            tx.commit().await?;
            return Ok(Some(UnsubscribeMatch {
                kind,
                entity_id: id,
                pabau_id,
                changed,
            }));
        }

        tx.commit().await?;
        Ok(None)
    }

    async fn contacts_needing_sync(&self) -> Result<Vec<ContactRow>, AppError> {
        let rows = sqlx::query_as::<_, ContactRow>(&format!(
            "SELECT {} FROM v_mailchimp_contacts ORDER BY contact_type, entity_id",
            CONTACT_COLUMNS
        ))
        .fetch_all(&self.pool)
        .await?;

        Ok(rows)
    }

    async fn all_contacts(&self) -> Result<Vec<ContactRow>, AppError> {
        let rows = sqlx::query_as::<_, ContactRow>(&format!(
            "SELECT {} FROM v_all_contacts ORDER BY contact_type, entity_id",
            CONTACT_COLUMNS
        ))
        .fetch_all(&self.pool)
        .await?;

        Ok(rows)
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
        sqlx::query(&format!(
            r#"
            UPDATE {}
            SET mailchimp_id = $2,
                mailchimp_status = $3,
                mailchimp_tags = $4,
                mailchimp_last_synced_at = $5
            WHERE id = $1
            "#,
            kind.table()
        ))
        .bind(entity_id)
        .bind(member_id)
        .bind(status)
        .bind(tags)
        .bind(synced_at)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn log(&self, entry: NewSyncLog) -> Result<(), AppError> {
        sqlx::query(
            r#"
            INSERT INTO sync_logs (
                entity_type, entity_id, pabau_id, email,
                action, status, message, error_details, field_changes
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9)
            "#,
        )
        .bind(&entry.entity_type)
        .bind(entry.entity_id)
        .bind(entry.pabau_id)
        .bind(&entry.email)
        .bind(entry.action.as_str())
        .bind(entry.status.as_str())
        .bind(&entry.message)
        .bind(&entry.error_details)
        .bind(&entry.field_changes)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn try_lock_cycle(&self) -> Result<bool, AppError> {
        let mut held = self.cycle_lock.lock().await;
        if held.is_some() {
            return Ok(false);
        }

        match try_advisory_lock(&self.pool, SYNC_CYCLE_LOCK_KEY).await? {
            Some(conn) => {
                *held = Some(conn);
                Ok(true)
            }
            None => Ok(false),
        }
    }

    async fn unlock_cycle(&self) -> Result<(), AppError> {
        let conn = self.cycle_lock.lock().await.take();
        if let Some(conn) = conn {
            release_advisory_lock(conn, SYNC_CYCLE_LOCK_KEY).await?;
        }
        Ok(())
    }
}

// src/clients/mailchimp.rs

use std::{collections::BTreeMap, time::Duration};

use reqwest::{Client, RequestBuilder, StatusCode};
use serde::de::DeserializeOwned;
use tracing::{debug, error, info};

use crate::{
    common::error::AppError,
    models::mailchimp::{Member, MemberUpsert, MembersPage, TagChange, TagUpdate},
};

/// Máximo permitido pelo Mailchimp por página de membros
pub const MEMBERS_PAGE_SIZE: u64 = 1000;

const SERVICE: &str = "Mailchimp";

/// Identificador do membro: MD5 do e-mail em minúsculas.
pub fn subscriber_hash(email: &str) -> String {
    format!("{:x}", md5::compute(email.trim().to_lowercase().as_bytes()))
}

#[derive(Clone)]
pub struct MailchimpClient {
    http: Client,
    api_url: String,
    api_key: String,
    list_id: String,
}

impl MailchimpClient {
    pub fn new(
        api_url: &str,
        api_key: &str,
        list_id: &str,
        timeout: Duration,
    ) -> Result<Self, AppError> {
        let http = Client::builder().timeout(timeout).build()?;
        Ok(Self {
            http,
            api_url: api_url.trim_end_matches('/').to_string(),
            api_key: api_key.to_string(),
            list_id: list_id.to_string(),
        })
    }

    fn member_url(&self, email: &str) -> String {
        format!(
            "{}/lists/{}/members/{}",
            self.api_url,
            self.list_id,
            subscriber_hash(email)
        )
    }

    // Basic auth com qualquer usuário e a API key como senha
    fn authed(&self, request: RequestBuilder) -> RequestBuilder {
        request.basic_auth("anystring", Some(&self.api_key))
    }

    async fn send_raw(&self, request: RequestBuilder) -> Result<reqwest::Response, AppError> {
        let response = self.authed(request).send().await?;
        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }

        let body = response.text().await.unwrap_or_default();
        if status != StatusCode::NOT_FOUND {
            error!("Erro da API do Mailchimp: {} - {}", status, body);
        }
        Err(AppError::vendor(SERVICE, status.as_u16(), body))
    }

    async fn send<T: DeserializeOwned>(&self, request: RequestBuilder) -> Result<T, AppError> {
        Ok(self.send_raw(request).await?.json::<T>().await?)
    }

    /// Cria ou atualiza o membro (PUT é idempotente).
    /// `status_if_new` só vale para quem ainda não existe na audiência.
    pub async fn upsert_member(
        &self,
        email: &str,
        merge_fields: BTreeMap<String, String>,
        status_if_new: &str,
    ) -> Result<Member, AppError> {
        let body = MemberUpsert {
            email_address: email.to_string(),
            status_if_new: status_if_new.to_string(),
            merge_fields,
        };

        info!("Gravando membro {} no Mailchimp", email);
        self.send(self.http.put(self.member_url(email)).json(&body))
            .await
    }

    pub async fn add_tags(&self, email: &str, tags: &[&str]) -> Result<(), AppError> {
        if tags.is_empty() {
            return Ok(());
        }

        let body = TagUpdate {
            tags: tags
                .iter()
                .map(|t| TagChange {
                    name: t.to_string(),
                    status: "active".to_string(),
                })
                .collect(),
        };

        debug!("Adicionando tags {:?} ao membro {}", tags, email);
        let url = format!("{}/tags", self.member_url(email));
        self.send_raw(self.http.post(url).json(&body)).await?;
        Ok(())
    }

    /// Busca o membro; 404 significa que ele não está na audiência.
    pub async fn get_member(&self, email: &str) -> Result<Option<Member>, AppError> {
        match self.send::<Member>(self.http.get(self.member_url(email))).await {
            Ok(member) => Ok(Some(member)),
            Err(AppError::Vendor { status: 404, .. }) => Ok(None),
            Err(e) => Err(e),
        }
    }

    /// Todos os membros com um status, paginando por offset até `total_items`.
    pub async fn list_members(&self, status: &str) -> Result<Vec<Member>, AppError> {
        let url = format!("{}/lists/{}/members", self.api_url, self.list_id);
        let mut all = Vec::new();
        let mut offset: u64 = 0;

        loop {
            debug!("Buscando membros {} a partir do offset {}", status, offset);
            let page: MembersPage = self
                .send(self.http.get(&url).query(&[
                    ("status", status.to_string()),
                    ("count", MEMBERS_PAGE_SIZE.to_string()),
                    ("offset", offset.to_string()),
                ]))
                .await?;

            if page.members.is_empty() {
                break;
            }
            all.extend(page.members);

            if all.len() as u64 >= page.total_items {
                break;
            }
            offset += MEMBERS_PAGE_SIZE;
        }

        info!("{} membros {} lidos do Mailchimp", all.len(), status);
        Ok(all)
    }
}

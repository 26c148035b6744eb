// src/clients/pabau.rs

use std::time::Duration;

use reqwest::Client;
use serde::de::DeserializeOwned;
use tracing::{debug, error};

use crate::{
    common::error::AppError,
    models::pabau::{ClientPayload, LeadPayload, PabauClientsPage, PabauLeadsPage},
};

/// Máximo aceito pela API do Pabau por página
pub const PAGE_SIZE: usize = 50;

const SERVICE: &str = "Pabau";

/// Cliente da API OAuth do Pabau (somente leitura).
/// A chave vai no path da URL, não em header.
#[derive(Clone)]
pub struct PabauClient {
    http: Client,
    api_url: String,
    api_key: String,
}

impl PabauClient {
    pub fn new(api_url: &str, api_key: &str, timeout: Duration) -> Result<Self, AppError> {
        let http = Client::builder().timeout(timeout).build()?;
        Ok(Self {
            http,
            api_url: api_url.trim_end_matches('/').to_string(),
            api_key: api_key.to_string(),
        })
    }

    async fn get_page<T: DeserializeOwned>(&self, endpoint: &str, page: u32) -> Result<T, AppError> {
        let url = format!("{}/{}/{}", self.api_url, self.api_key, endpoint);
        debug!("GET Pabau {} página {}", endpoint, page);

        let response = self
            .http
            .get(&url)
            .query(&[("page", page.to_string()), ("per_page", PAGE_SIZE.to_string())])
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            error!("Erro da API do Pabau: {} - {}", status, body);
            return Err(AppError::vendor(SERVICE, status.as_u16(), body));
        }

        Ok(response.json::<T>().await?)
    }

    pub async fn get_clients_page(&self, page: u32) -> Result<Vec<ClientPayload>, AppError> {
        let body: PabauClientsPage = self.get_page("clients", page).await?;
        Ok(body.clients)
    }

    pub async fn get_leads_page(&self, page: u32) -> Result<Vec<LeadPayload>, AppError> {
        let body: PabauLeadsPage = self.get_page("leads", page).await?;
        Ok(body.leads)
    }
}

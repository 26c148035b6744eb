use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;
use thiserror::Error;

use crate::models::contact::ContactKind;

// Nosso tipo de erro, com `thiserror` para melhor ergonomia.
#[derive(Debug, Error)]
pub enum AppError {
    #[error("Validation failed: {0}")]
    ValidationError(#[from] validator::ValidationErrors),

    // E-mail já pertence a outro contato (na mesma tabela ou na outra)
    #[error("Email '{email}' already belongs to a {existing}")]
    EmailConflict { email: String, existing: ContactKind },

    #[error("Opt-in flag must be 0 or 1, got {0}")]
    InvalidOptIn(i64),

    // Registro vindo do Pabau que não dá para mapear (ex: sem id)
    #[error("Invalid record: {0}")]
    InvalidRecord(String),

    #[error("Database error: {0}")]
    DatabaseError(#[from] sqlx::Error),

    #[error("Migration error: {0}")]
    MigrationError(#[from] sqlx::migrate::MigrateError),

    // Resposta não-2xx de uma API externa (Pabau ou Mailchimp)
    #[error("{service} API error: {status} - {body}")]
    Vendor {
        service: &'static str,
        status: u16,
        body: String,
    },

    #[error("HTTP request failed: {0}")]
    HttpError(#[from] reqwest::Error),

    #[error("Configuration error: {0}")]
    Config(String),

    // Variante genérica para qualquer outro erro inesperado
    #[error("Internal error: {0}")]
    InternalServerError(#[from] anyhow::Error),
}

impl AppError {
    pub fn vendor(service: &'static str, status: u16, body: impl Into<String>) -> Self {
        Self::Vendor {
            service,
            status,
            body: body.into(),
        }
    }

    /// Status HTTP devolvido pela API externa, quando o erro veio dela.
    pub fn vendor_status(&self) -> Option<u16> {
        match self {
            AppError::Vendor { status, .. } => Some(*status),
            AppError::HttpError(e) => e.status().map(|s| s.as_u16()),
            _ => None,
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let (status, error_message) = match self {
            AppError::ValidationError(errors) => {
                let mut details = std::collections::HashMap::new();
                for (field, field_errors) in errors.field_errors() {
                    let messages: Vec<String> = field_errors
                        .iter()
                        .map(|e| {
                            e.message
                                .as_ref()
                                .map(|m| m.to_string())
                                .unwrap_or_else(|| e.code.to_string())
                        })
                        .collect();
                    details.insert(field.to_string(), messages);
                }
                let body = Json(json!({
                    "error": "One or more fields are invalid.",
                    "details": details,
                }));
                return (StatusCode::BAD_REQUEST, body).into_response();
            }
            AppError::EmailConflict { .. }
            | AppError::InvalidOptIn(_)
            | AppError::InvalidRecord(_) => {
                (StatusCode::CONFLICT, self.to_string())
            }

            // Todos os outros erros viram 500; o detalhe vai só para o log.
            ref e => {
                tracing::error!("Erro Interno do Servidor: {}", e);
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "An unexpected error occurred.".to_string(),
                )
            }
        };

        let body = Json(json!({ "error": error_message }));
        (status, body).into_response()
    }
}

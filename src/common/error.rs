// src/common/error.rs

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;
use thiserror::Error;

// Nosso tipo de erro, com `thiserror` para melhor ergonomia.
// Cada variante é um "kind" distinto do contrato: o chamador consegue
// diferenciar "valor excede o saldo" de uma falha genérica, sem que
// detalhes internos de armazenamento vazem na resposta.
#[derive(Debug, Error)]
pub enum AppError {
    #[error("Erro de validação")]
    ValidationError(#[from] validator::ValidationErrors),

    #[error("{0} não encontrado")]
    NotFound(&'static str),

    #[error("Valor inválido: {0}")]
    InvalidAmount(String),

    #[error("Estado inválido: {0}")]
    InvalidState(String),

    #[error("Limite excedido: {0}")]
    LimitExceeded(String),

    // Conflito de concorrência (lock otimista): o Payment Processor
    // faz retry limitado; se chegar aqui, os retries se esgotaram.
    #[error("Conflito de concorrência, tente novamente")]
    ConcurrencyConflict,

    // Variante para erros de banco de dados
    #[error("Erro de banco de dados")]
    DatabaseError(#[from] sqlx::Error),

    // Variante genérica para qualquer outro erro inesperado
    #[error("Erro interno do servidor")]
    InternalServerError(#[from] anyhow::Error),
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let (status, error_message) = match self {
            // Retorna todos os detalhes da validação, campo a campo.
            AppError::ValidationError(errors) => {
                let mut details = std::collections::HashMap::new();
                for (field, field_errors) in errors.field_errors() {
                    let messages: Vec<String> = field_errors.iter()
                        .filter_map(|e| e.message.as_ref().map(|m| m.to_string()))
                        .collect();
                    details.insert(field.to_string(), messages);
                }
                let body = Json(json!({
                    "error": "Um ou mais campos são inválidos.",
                    "details": details,
                }));
                return (StatusCode::BAD_REQUEST, body).into_response();
            }

            AppError::NotFound(entity) => {
                let body = Json(json!({ "error": format!("{} não encontrado.", entity) }));
                return (StatusCode::NOT_FOUND, body).into_response();
            }
            AppError::InvalidAmount(msg) => {
                let body = Json(json!({ "error": msg }));
                return (StatusCode::UNPROCESSABLE_ENTITY, body).into_response();
            }
            AppError::InvalidState(msg) => {
                let body = Json(json!({ "error": msg }));
                return (StatusCode::CONFLICT, body).into_response();
            }
            AppError::LimitExceeded(msg) => {
                let body = Json(json!({ "error": msg }));
                return (StatusCode::UNPROCESSABLE_ENTITY, body).into_response();
            }
            AppError::ConcurrencyConflict => {
                (StatusCode::CONFLICT, "Outro pagamento está sendo processado para este título. Tente novamente.")
            }

            // Todos os outros erros (DatabaseError, InternalServerError) viram 500.
            // O `tracing` loga a mensagem detalhada que `thiserror` nos deu;
            // o cliente recebe só o genérico.
            ref e => {
                tracing::error!("Erro Interno do Servidor: {}", e);
                (StatusCode::INTERNAL_SERVER_ERROR, "Ocorreu um erro inesperado.")
            }
        };

        // Resposta padrão para erros simples que só têm uma mensagem.
        let body = Json(json!({ "error": error_message }));
        (status, body).into_response()
    }
}

impl AppError {
    /// True apenas para o kind que o processador de pagamentos pode
    /// tentar de novo automaticamente.
    pub fn is_retryable(&self) -> bool {
        matches!(self, AppError::ConcurrencyConflict)
    }
}

// Erro simples usado como rejeição de extratores (ex.: X-Tenant-ID ausente),
// onde ainda não existe um AppError de domínio.
#[derive(Debug)]
pub struct ApiError {
    pub status: StatusCode,
    pub message: String,
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let body = Json(json!({ "error": self.message }));
        (self.status, body).into_response()
    }
}

// src/middleware/tenancy.rs

use axum::{
    extract::FromRequestParts,
    http::{request::Parts, StatusCode},
};
use uuid::Uuid;

use crate::common::error::ApiError;

const TENANT_ID_HEADER: &str = "x-tenant-id";

/// Extrator do tenant: o UUID da clínica dona da requisição.
/// Autenticação é responsabilidade da camada externa; aqui só garantimos
/// o isolamento por clínica.
#[derive(Debug, Clone)]
pub struct TenantContext(pub Uuid);

fn bad_request(message: &str) -> ApiError {
    ApiError {
        status: StatusCode::BAD_REQUEST,
        message: message.to_string(),
    }
}

impl<S> FromRequestParts<S> for TenantContext
where
    S: Send + Sync,
{
    // ApiError já implementa IntoResponse, então serve de rejeição
    type Rejection = ApiError;

    async fn from_request_parts(
        parts: &mut Parts,
        _state: &S,
    ) -> Result<Self, Self::Rejection> {
        let raw = parts
            .headers
            .get(TENANT_ID_HEADER)
            .ok_or_else(|| bad_request("O cabeçalho X-Tenant-ID é obrigatório."))?
            .to_str()
            .map_err(|_| bad_request("Cabeçalho X-Tenant-ID contém caracteres inválidos."))?;

        let clinic_id = Uuid::parse_str(raw)
            .map_err(|_| bad_request("Cabeçalho X-Tenant-ID inválido (não é um UUID)."))?;

        Ok(TenantContext(clinic_id))
    }
}

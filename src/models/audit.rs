// src/models/audit.rs

use serde::{Deserialize, Serialize};
use uuid::Uuid;
use sqlx::FromRow;
use chrono::{DateTime, Utc};
use utoipa::ToSchema;

/// Uma linha da trilha de auditoria. Cada operação mutável bem-sucedida
/// grava exatamente uma entrada, na mesma transação da mutação.
#[derive(Debug, Clone, Serialize, Deserialize, FromRow, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct AuditLog {
    pub id: Uuid,

    #[schema(ignore)]
    pub clinic_id: Uuid,

    #[schema(example = "receivable_title")]
    pub entity: String,
    pub entity_id: Uuid,

    #[schema(example = "payment_recorded")]
    pub action: String,

    pub actor_id: Uuid,

    /// Antes/depois relevantes (saldo, status), em JSON livre.
    #[schema(value_type = Option<Object>)]
    pub detail: Option<serde_json::Value>,

    pub created_at: Option<DateTime<Utc>>,
}

// src/models/commission.rs

use serde::{Deserialize, Serialize};
use uuid::Uuid;
use sqlx::FromRow;
use chrono::{DateTime, Utc, NaiveDate};
use rust_decimal::Decimal;
use utoipa::ToSchema;

use crate::models::finance::PaymentMethod;

// --- Enums (Mapeando o Postgres) ---

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type, ToSchema)]
#[sqlx(type_name = "commission_calc", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum CalculationType {
    Percentage,
    Fixed,
}

/// Base de cálculo da comissão.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type, ToSchema)]
#[sqlx(type_name = "commission_base", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum CommissionBase {
    Gross,    // Valor bruto do procedimento
    Net,      // Líquido da taxa da adquirente
    Received, // Valor efetivamente recebido
}

/// Evento que dispara a provisão. O núcleo dispara RECEIPT (título quitado);
/// APPROVAL e COMPLETION chegam de fora via endpoint de accrual.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type, ToSchema)]
#[sqlx(type_name = "commission_trigger", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum CommissionTrigger {
    Approval,
    Completion,
    Receipt,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type, ToSchema)]
#[sqlx(type_name = "provision_status", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ProvisionStatus {
    Provisionado,
    Aprovado,
    Pago,
    Cancelado,
}

impl ProvisionStatus {
    /// Nenhuma transição pula estado: Provisionado → Aprovado → Pago,
    /// com Cancelado alcançável antes do pagamento.
    pub fn can_approve(&self) -> bool {
        matches!(self, ProvisionStatus::Provisionado)
    }

    pub fn can_pay(&self) -> bool {
        matches!(self, ProvisionStatus::Aprovado)
    }

    pub fn can_cancel(&self) -> bool {
        matches!(self, ProvisionStatus::Provisionado | ProvisionStatus::Aprovado)
    }
}

// --- Structs ---

#[derive(Debug, Clone, Serialize, Deserialize, FromRow, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct CommissionRule {
    pub id: Uuid,

    #[schema(ignore)]
    pub clinic_id: Uuid,

    // Escopo: None significa "vale para todos"
    pub professional_id: Option<Uuid>,
    pub procedure_id: Option<Uuid>,

    pub calculation_type: CalculationType,

    #[schema(example = "25.0")]
    pub percentage: Option<Decimal>,
    #[schema(example = "80.00")]
    pub fixed_amount: Option<Decimal>,

    pub base: CommissionBase,
    pub trigger_kind: CommissionTrigger,

    pub min_guaranteed: Option<Decimal>,
    pub cap: Option<Decimal>,

    pub active: bool,
    pub created_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, Serialize, Deserialize, FromRow, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct CommissionProvision {
    pub id: Uuid,

    #[schema(ignore)]
    pub clinic_id: Uuid,

    pub professional_id: Uuid,

    /// Competência contábil: sempre o dia 1 do mês.
    #[schema(value_type = String, format = Date, example = "2025-06-01")]
    pub competencia: NaiveDate,

    #[schema(example = "1500.00")]
    pub valor_provisionado: Decimal,
    #[schema(example = "300.00")]
    pub valor_adiantamentos: Decimal,
    #[schema(example = "0.00")]
    pub valor_ajustes: Decimal,
    #[schema(example = "1200.00")]
    pub valor_devido: Decimal,

    pub valor_inss: Decimal,
    pub valor_iss: Decimal,
    pub valor_irrf: Decimal,

    #[schema(example = "1056.00")]
    pub valor_liquido_pagar: Decimal,

    pub status: ProvisionStatus,

    pub aprovado_por: Option<Uuid>,
    pub aprovado_em: Option<DateTime<Utc>>,
    pub observacoes: Option<String>,
    pub financial_transaction_id: Option<Uuid>,

    pub created_at: Option<DateTime<Utc>>,
    pub updated_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, Serialize, Deserialize, FromRow, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct CommissionAdvance {
    pub id: Uuid,

    #[schema(ignore)]
    pub clinic_id: Uuid,

    pub professional_id: Uuid,

    #[schema(example = "400.00")]
    pub valor: Decimal,
    #[schema(example = "250.00")]
    pub saldo: Decimal, // O que ainda falta recuperar
    pub quitado: bool,

    #[schema(value_type = String, format = Date, example = "2025-06-05")]
    pub data_adiantamento: NaiveDate,

    pub forma_pagamento: PaymentMethod,
    pub concedido_por: Uuid,

    pub created_at: Option<DateTime<Utc>>,
}

/// Configuração de remuneração do profissional (mantida pelo operador).
#[derive(Debug, Clone, Serialize, Deserialize, FromRow, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct ProfessionalRemuneration {
    #[schema(ignore)]
    pub clinic_id: Uuid,

    pub professional_id: Uuid,
    pub adiantamento_permitido: bool,

    #[schema(example = "500.00")]
    pub limite_adiantamento: Decimal,

    pub created_at: Option<DateTime<Utc>>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn maquina_de_estados_da_provisao() {
        assert!(ProvisionStatus::Provisionado.can_approve());
        assert!(!ProvisionStatus::Aprovado.can_approve());
        assert!(!ProvisionStatus::Pago.can_approve());

        assert!(ProvisionStatus::Aprovado.can_pay());
        assert!(!ProvisionStatus::Provisionado.can_pay());
        assert!(!ProvisionStatus::Cancelado.can_pay());

        assert!(ProvisionStatus::Provisionado.can_cancel());
        assert!(ProvisionStatus::Aprovado.can_cancel());
        assert!(!ProvisionStatus::Pago.can_cancel());
    }
}

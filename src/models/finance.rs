// src/models/finance.rs

use serde::{Deserialize, Serialize};
use uuid::Uuid;
use sqlx::FromRow;
use chrono::{DateTime, Utc, NaiveDate};
use rust_decimal::Decimal;
use utoipa::ToSchema;

// --- Enums (Mapeando o Postgres) ---

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type, ToSchema)]
#[sqlx(type_name = "title_status", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum TitleStatus {
    Open,      // Aberto
    Partial,   // Pago Parcialmente
    Paid,      // Quitado
    Cancelled, // Cancelado
}

impl TitleStatus {
    /// Estados terminais não aceitam mais pagamentos.
    pub fn is_terminal(&self) -> bool {
        matches!(self, TitleStatus::Paid | TitleStatus::Cancelled)
    }

    /// O status é função monotônica do saldo.
    pub fn from_balance(amount: Decimal, balance: Decimal) -> Self {
        if balance.is_zero() {
            TitleStatus::Paid
        } else if balance < amount {
            TitleStatus::Partial
        } else {
            TitleStatus::Open
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type, ToSchema)]
#[sqlx(type_name = "payment_method", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum PaymentMethod {
    Dinheiro,
    Pix,
    CartaoCredito,
    CartaoDebito,
    Boleto,
    Transferencia,
}

impl PaymentMethod {
    /// Métodos de cartão passam pela adquirente (taxa + prazo de repasse).
    pub fn is_card(&self) -> bool {
        matches!(self, PaymentMethod::CartaoCredito | PaymentMethod::CartaoDebito)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type, ToSchema)]
#[sqlx(type_name = "payment_status", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum PaymentStatus {
    Completed,
    Voided, // Estornado
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type, ToSchema)]
#[sqlx(type_name = "transaction_kind", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum TransactionKind {
    Receita,
    Despesa,
}

// --- Structs ---

#[derive(Debug, Clone, Serialize, Deserialize, FromRow, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct ReceivableTitle {
    pub id: Uuid,

    #[schema(example = 1042)]
    pub title_number: i64,

    #[schema(ignore)]
    pub clinic_id: Uuid,

    pub patient_id: Uuid,
    pub budget_id: Option<Uuid>,

    #[schema(example = 2)]
    pub installment_number: i32,
    #[schema(example = 6)]
    pub total_installments: i32,

    #[schema(value_type = String, format = Date, example = "2025-07-10")]
    pub due_date: NaiveDate,

    // Valores
    #[schema(example = "500.00")]
    pub amount: Decimal,
    #[schema(example = "200.00")]
    pub balance: Decimal, // Quanto falta pagar

    pub status: TitleStatus,
    pub payment_method: Option<PaymentMethod>,

    // Campos de cartão (preenchidos no primeiro pagamento com cartão)
    #[schema(example = "3.5")]
    pub acquirer_fee_rate: Option<Decimal>,
    pub settlement_lag_days: Option<i32>,
    #[schema(value_type = Option<String>, format = Date)]
    pub settlement_date: Option<NaiveDate>,
    pub net_value: Option<Decimal>,
    pub anticipated: bool,

    pub created_at: Option<DateTime<Utc>>,
    pub updated_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, Serialize, Deserialize, FromRow, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct Payment {
    pub id: Uuid,

    #[schema(ignore)]
    pub clinic_id: Uuid,

    pub title_id: Uuid,
    pub patient_id: Uuid,

    #[schema(value_type = String, format = Date, example = "2025-06-15")]
    pub payment_date: NaiveDate,

    pub method: PaymentMethod,

    #[schema(example = "150.00")]
    pub value: Decimal,

    pub cash_account_id: Option<Uuid>,
    pub notes: Option<String>,
    pub created_by: Uuid,
    pub status: PaymentStatus,

    pub created_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, Serialize, Deserialize, FromRow, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct FinancialTransaction {
    pub id: Uuid,

    #[schema(ignore)]
    pub clinic_id: Uuid,

    #[schema(value_type = String, format = Date, example = "2025-06-15")]
    pub date: NaiveDate,

    pub kind: TransactionKind,

    #[schema(example = "150.00")]
    pub value: Decimal,

    #[schema(example = "Recebimentos")]
    pub category: String,

    #[schema(example = "payment:550e8400-e29b-41d4-a716-446655440000")]
    pub reference: Option<String>,

    pub created_at: Option<DateTime<Utc>>,
}

/// Item de orçamento: vínculo explícito usado para ratear comissões.
/// Escrito pela superfície de orçamentos; o núcleo financeiro só lê.
#[derive(Debug, Clone, Serialize, Deserialize, FromRow, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct BudgetItem {
    pub id: Uuid,

    #[schema(ignore)]
    pub clinic_id: Uuid,

    pub budget_id: Uuid,
    pub professional_id: Uuid,
    pub procedure_id: Uuid,

    #[schema(example = "1200.00")]
    pub valor: Decimal,

    pub created_at: Option<DateTime<Utc>>,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn dec(s: &str) -> Decimal {
        Decimal::from_str_exact(s).unwrap()
    }

    #[test]
    fn status_segue_o_saldo() {
        let amount = dec("100.00");
        assert_eq!(TitleStatus::from_balance(amount, dec("100.00")), TitleStatus::Open);
        assert_eq!(TitleStatus::from_balance(amount, dec("40.00")), TitleStatus::Partial);
        assert_eq!(TitleStatus::from_balance(amount, dec("0.00")), TitleStatus::Paid);
    }

    #[test]
    fn metodos_de_cartao() {
        assert!(PaymentMethod::CartaoCredito.is_card());
        assert!(PaymentMethod::CartaoDebito.is_card());
        assert!(!PaymentMethod::Pix.is_card());
        assert!(!PaymentMethod::Dinheiro.is_card());
    }
}

// src/db/finance_repo.rs

use sqlx::{PgPool, Postgres, Executor};
use uuid::Uuid;
use rust_decimal::Decimal;
use chrono::NaiveDate;
use crate::{
    common::error::AppError,
    models::finance::{
        BudgetItem, FinancialTransaction, Payment, PaymentMethod,
        ReceivableTitle, TitleStatus, TransactionKind,
    },
};

const TITLE_COLUMNS: &str = r#"
    id, title_number, clinic_id, patient_id, budget_id,
    installment_number, total_installments, due_date,
    amount, balance, status, payment_method,
    acquirer_fee_rate, settlement_lag_days, settlement_date, net_value, anticipated,
    created_at, updated_at
"#;

/// Campos de cartão persistidos no título junto da atualização de saldo.
pub struct CardFields {
    pub payment_method: PaymentMethod,
    pub acquirer_fee_rate: Decimal,
    pub settlement_lag_days: i32,
    pub settlement_date: NaiveDate,
    pub net_value: Decimal,
    pub anticipated: bool,
}

#[derive(Clone)]
pub struct FinanceRepository {
    pool: PgPool,
}

impl FinanceRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    // =========================================================================
    //  TÍTULOS (Contas a Receber)
    // =========================================================================

    pub async fn create_title<'e, E>(
        &self,
        executor: E,
        clinic_id: Uuid,
        patient_id: Uuid,
        budget_id: Option<Uuid>,
        installment_number: i32,
        total_installments: i32,
        due_date: NaiveDate,
        amount: Decimal,
    ) -> Result<ReceivableTitle, AppError>
    where
        E: Executor<'e, Database = Postgres>,
    {
        // No início, balance (o que falta pagar) é igual ao amount
        let sql = format!(
            r#"
            INSERT INTO receivable_titles (
                clinic_id, patient_id, budget_id,
                installment_number, total_installments,
                due_date, amount, balance
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7, $7)
            RETURNING {TITLE_COLUMNS}
            "#
        );

        let title = sqlx::query_as::<_, ReceivableTitle>(&sql)
            .bind(clinic_id)
            .bind(patient_id)
            .bind(budget_id)
            .bind(installment_number)
            .bind(total_installments)
            .bind(due_date)
            .bind(amount)
            .fetch_one(executor)
            .await?;

        Ok(title)
    }

    pub async fn get_title<'e, E>(
        &self,
        executor: E,
        clinic_id: Uuid,
        title_id: Uuid,
    ) -> Result<Option<ReceivableTitle>, AppError>
    where
        E: Executor<'e, Database = Postgres>,
    {
        let sql = format!(
            "SELECT {TITLE_COLUMNS} FROM receivable_titles WHERE id = $1 AND clinic_id = $2"
        );

        let title = sqlx::query_as::<_, ReceivableTitle>(&sql)
            .bind(title_id)
            .bind(clinic_id)
            .fetch_optional(executor)
            .await?;

        Ok(title)
    }

    /// Busca o título travando a linha (FOR UPDATE). Dois pagamentos
    /// concorrentes contra o mesmo título são serializados aqui.
    pub async fn get_title_for_update<'e, E>(
        &self,
        executor: E,
        clinic_id: Uuid,
        title_id: Uuid,
    ) -> Result<Option<ReceivableTitle>, AppError>
    where
        E: Executor<'e, Database = Postgres>,
    {
        let sql = format!(
            "SELECT {TITLE_COLUMNS} FROM receivable_titles WHERE id = $1 AND clinic_id = $2 FOR UPDATE"
        );

        let title = sqlx::query_as::<_, ReceivableTitle>(&sql)
            .bind(title_id)
            .bind(clinic_id)
            .fetch_optional(executor)
            .await?;

        Ok(title)
    }

    pub async fn list_titles<'e, E>(
        &self,
        executor: E,
        clinic_id: Uuid,
    ) -> Result<Vec<ReceivableTitle>, AppError>
    where
        E: Executor<'e, Database = Postgres>,
    {
        let sql = format!(
            "SELECT {TITLE_COLUMNS} FROM receivable_titles WHERE clinic_id = $1 ORDER BY due_date ASC"
        );

        let titles = sqlx::query_as::<_, ReceivableTitle>(&sql)
            .bind(clinic_id)
            .fetch_all(executor)
            .await?;

        Ok(titles)
    }

    /// Títulos em aberto (OPEN/PARTIAL) para o relatório de aging.
    pub async fn list_outstanding_titles<'e, E>(
        &self,
        executor: E,
        clinic_id: Uuid,
    ) -> Result<Vec<ReceivableTitle>, AppError>
    where
        E: Executor<'e, Database = Postgres>,
    {
        let sql = format!(
            r#"
            SELECT {TITLE_COLUMNS}
            FROM receivable_titles
            WHERE clinic_id = $1 AND status IN ('OPEN', 'PARTIAL')
            ORDER BY due_date ASC
            "#
        );

        let titles = sqlx::query_as::<_, ReceivableTitle>(&sql)
            .bind(clinic_id)
            .fetch_all(executor)
            .await?;

        Ok(titles)
    }

    /// Atualiza saldo/status do título, guardado pelo saldo esperado
    /// (compare-and-swap). Retorna o número de linhas afetadas: 0 significa
    /// que outro pagamento mexeu no saldo entre a leitura e a escrita.
    pub async fn update_title_balance<'e, E>(
        &self,
        executor: E,
        clinic_id: Uuid,
        title_id: Uuid,
        expected_balance: Decimal,
        new_balance: Decimal,
        new_status: TitleStatus,
        method: Option<PaymentMethod>,
        card: Option<&CardFields>,
    ) -> Result<u64, AppError>
    where
        E: Executor<'e, Database = Postgres>,
    {
        let result = sqlx::query(
            r#"
            UPDATE receivable_titles SET
                balance = $4,
                status = $5,
                payment_method = COALESCE($6, payment_method),
                acquirer_fee_rate = COALESCE($7, acquirer_fee_rate),
                settlement_lag_days = COALESCE($8, settlement_lag_days),
                settlement_date = COALESCE($9, settlement_date),
                net_value = COALESCE($10, net_value),
                anticipated = anticipated OR $11,
                updated_at = NOW()
            WHERE id = $1 AND clinic_id = $2 AND balance = $3
            "#,
        )
        .bind(title_id)
        .bind(clinic_id)
        .bind(expected_balance)
        .bind(new_balance)
        .bind(new_status)
        .bind(method)
        .bind(card.map(|c| c.acquirer_fee_rate))
        .bind(card.map(|c| c.settlement_lag_days))
        .bind(card.map(|c| c.settlement_date))
        .bind(card.map(|c| c.net_value))
        .bind(card.map(|c| c.anticipated).unwrap_or(false))
        .execute(executor)
        .await?;

        Ok(result.rows_affected())
    }

    /// Cancelamento preserva a trilha: é só transição de status,
    /// a linha nunca é apagada.
    pub async fn cancel_title<'e, E>(
        &self,
        executor: E,
        clinic_id: Uuid,
        title_id: Uuid,
    ) -> Result<u64, AppError>
    where
        E: Executor<'e, Database = Postgres>,
    {
        let result = sqlx::query(
            r#"
            UPDATE receivable_titles
            SET status = 'CANCELLED', updated_at = NOW()
            WHERE id = $1 AND clinic_id = $2 AND status IN ('OPEN', 'PARTIAL')
            "#,
        )
        .bind(title_id)
        .bind(clinic_id)
        .execute(executor)
        .await?;

        Ok(result.rows_affected())
    }

    // =========================================================================
    //  PAGAMENTOS
    // =========================================================================

    pub async fn insert_payment<'e, E>(
        &self,
        executor: E,
        clinic_id: Uuid,
        title_id: Uuid,
        patient_id: Uuid,
        payment_date: NaiveDate,
        method: PaymentMethod,
        value: Decimal,
        cash_account_id: Option<Uuid>,
        notes: Option<&str>,
        created_by: Uuid,
    ) -> Result<Payment, AppError>
    where
        E: Executor<'e, Database = Postgres>,
    {
        let payment = sqlx::query_as::<_, Payment>(
            r#"
            INSERT INTO payments (
                clinic_id, title_id, patient_id, payment_date,
                method, value, cash_account_id, notes, created_by
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9)
            RETURNING *
            "#,
        )
        .bind(clinic_id)
        .bind(title_id)
        .bind(patient_id)
        .bind(payment_date)
        .bind(method)
        .bind(value)
        .bind(cash_account_id)
        .bind(notes)
        .bind(created_by)
        .fetch_one(executor)
        .await?;

        Ok(payment)
    }

    pub async fn get_payment<'e, E>(
        &self,
        executor: E,
        clinic_id: Uuid,
        payment_id: Uuid,
    ) -> Result<Option<Payment>, AppError>
    where
        E: Executor<'e, Database = Postgres>,
    {
        let payment = sqlx::query_as::<_, Payment>(
            "SELECT * FROM payments WHERE id = $1 AND clinic_id = $2",
        )
        .bind(payment_id)
        .bind(clinic_id)
        .fetch_optional(executor)
        .await?;

        Ok(payment)
    }

    /// Marca o pagamento como estornado. Guardado pelo status atual:
    /// estornar duas vezes afeta zero linhas.
    pub async fn mark_payment_voided<'e, E>(
        &self,
        executor: E,
        clinic_id: Uuid,
        payment_id: Uuid,
    ) -> Result<u64, AppError>
    where
        E: Executor<'e, Database = Postgres>,
    {
        let result = sqlx::query(
            r#"
            UPDATE payments SET status = 'VOIDED'
            WHERE id = $1 AND clinic_id = $2 AND status = 'COMPLETED'
            "#,
        )
        .bind(payment_id)
        .bind(clinic_id)
        .execute(executor)
        .await?;

        Ok(result.rows_affected())
    }

    // =========================================================================
    //  FLUXO DE CAIXA
    // =========================================================================

    pub async fn insert_transaction<'e, E>(
        &self,
        executor: E,
        clinic_id: Uuid,
        date: NaiveDate,
        kind: TransactionKind,
        value: Decimal,
        category: &str,
        reference: Option<&str>,
    ) -> Result<FinancialTransaction, AppError>
    where
        E: Executor<'e, Database = Postgres>,
    {
        let transaction = sqlx::query_as::<_, FinancialTransaction>(
            r#"
            INSERT INTO financial_transactions (clinic_id, date, kind, value, category, reference)
            VALUES ($1, $2, $3, $4, $5, $6)
            RETURNING *
            "#,
        )
        .bind(clinic_id)
        .bind(date)
        .bind(kind)
        .bind(value)
        .bind(category)
        .bind(reference)
        .fetch_one(executor)
        .await?;

        Ok(transaction)
    }

    pub async fn list_transactions<'e, E>(
        &self,
        executor: E,
        clinic_id: Uuid,
    ) -> Result<Vec<FinancialTransaction>, AppError>
    where
        E: Executor<'e, Database = Postgres>,
    {
        let transactions = sqlx::query_as::<_, FinancialTransaction>(
            "SELECT * FROM financial_transactions WHERE clinic_id = $1 ORDER BY date DESC, created_at DESC",
        )
        .bind(clinic_id)
        .fetch_all(executor)
        .await?;

        Ok(transactions)
    }

    // =========================================================================
    //  ITENS DE ORÇAMENTO (lidos para o rateio de comissões)
    // =========================================================================

    pub async fn insert_budget_item<'e, E>(
        &self,
        executor: E,
        clinic_id: Uuid,
        budget_id: Uuid,
        professional_id: Uuid,
        procedure_id: Uuid,
        valor: Decimal,
    ) -> Result<BudgetItem, AppError>
    where
        E: Executor<'e, Database = Postgres>,
    {
        let item = sqlx::query_as::<_, BudgetItem>(
            r#"
            INSERT INTO budget_items (clinic_id, budget_id, professional_id, procedure_id, valor)
            VALUES ($1, $2, $3, $4, $5)
            RETURNING *
            "#,
        )
        .bind(clinic_id)
        .bind(budget_id)
        .bind(professional_id)
        .bind(procedure_id)
        .bind(valor)
        .fetch_one(executor)
        .await?;

        Ok(item)
    }

    pub async fn list_budget_items<'e, E>(
        &self,
        executor: E,
        clinic_id: Uuid,
        budget_id: Uuid,
    ) -> Result<Vec<BudgetItem>, AppError>
    where
        E: Executor<'e, Database = Postgres>,
    {
        let items = sqlx::query_as::<_, BudgetItem>(
            "SELECT * FROM budget_items WHERE clinic_id = $1 AND budget_id = $2",
        )
        .bind(clinic_id)
        .bind(budget_id)
        .fetch_all(executor)
        .await?;

        Ok(items)
    }
}

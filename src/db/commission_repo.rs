// src/db/commission_repo.rs

use sqlx::{PgPool, Postgres, Executor};
use uuid::Uuid;
use rust_decimal::Decimal;
use chrono::{DateTime, NaiveDate, Utc};
use crate::{
    common::error::AppError,
    models::commission::{
        CommissionAdvance, CommissionProvision, CommissionRule, ProfessionalRemuneration,
    },
};

#[derive(Clone)]
pub struct CommissionRepository {
    pool: PgPool,
}

impl CommissionRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    // =========================================================================
    //  REGRAS DE COMISSÃO
    // =========================================================================

    #[allow(clippy::too_many_arguments)]
    pub async fn create_rule<'e, E>(
        &self,
        executor: E,
        clinic_id: Uuid,
        rule: &crate::services::commission_service::NewRule,
    ) -> Result<CommissionRule, AppError>
    where
        E: Executor<'e, Database = Postgres>,
    {
        let created = sqlx::query_as::<_, CommissionRule>(
            r#"
            INSERT INTO commission_rules (
                clinic_id, professional_id, procedure_id,
                calculation_type, percentage, fixed_amount,
                base, trigger_kind, min_guaranteed, cap, active
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, TRUE)
            RETURNING *
            "#,
        )
        .bind(clinic_id)
        .bind(rule.professional_id)
        .bind(rule.procedure_id)
        .bind(rule.calculation_type)
        .bind(rule.percentage)
        .bind(rule.fixed_amount)
        .bind(rule.base)
        .bind(rule.trigger_kind)
        .bind(rule.min_guaranteed)
        .bind(rule.cap)
        .fetch_one(executor)
        .await?;

        Ok(created)
    }

    pub async fn list_active_rules<'e, E>(
        &self,
        executor: E,
        clinic_id: Uuid,
    ) -> Result<Vec<CommissionRule>, AppError>
    where
        E: Executor<'e, Database = Postgres>,
    {
        let rules = sqlx::query_as::<_, CommissionRule>(
            "SELECT * FROM commission_rules WHERE clinic_id = $1 AND active ORDER BY created_at DESC",
        )
        .bind(clinic_id)
        .fetch_all(executor)
        .await?;

        Ok(rules)
    }

    pub async fn list_rules<'e, E>(
        &self,
        executor: E,
        clinic_id: Uuid,
    ) -> Result<Vec<CommissionRule>, AppError>
    where
        E: Executor<'e, Database = Postgres>,
    {
        let rules = sqlx::query_as::<_, CommissionRule>(
            "SELECT * FROM commission_rules WHERE clinic_id = $1 ORDER BY created_at DESC",
        )
        .bind(clinic_id)
        .fetch_all(executor)
        .await?;

        Ok(rules)
    }

    // =========================================================================
    //  PROVISÕES
    // =========================================================================

    /// Acúmulo atômico: UPSERT na linha (clínica, profissional, competência).
    /// Tenta INSERIR; se já existir (ON CONFLICT), SOMA ao provisionado.
    /// Isso é atômico e serializa acúmulos concorrentes de títulos que
    /// quitam ao mesmo tempo. Só acumula enquanto a provisão ainda está
    /// em PROVISIONADO; depois disso retorna None (estado inválido).
    pub async fn accrue_provision<'e, E>(
        &self,
        executor: E,
        clinic_id: Uuid,
        professional_id: Uuid,
        competencia: NaiveDate,
        amount: Decimal,
    ) -> Result<Option<CommissionProvision>, AppError>
    where
        E: Executor<'e, Database = Postgres>,
    {
        let provision = sqlx::query_as::<_, CommissionProvision>(
            r#"
            INSERT INTO comissoes_provisoes (
                clinic_id, professional_id, competencia, valor_provisionado
            )
            VALUES ($1, $2, $3, $4)
            ON CONFLICT (clinic_id, professional_id, competencia)
            DO UPDATE SET
                valor_provisionado = comissoes_provisoes.valor_provisionado + EXCLUDED.valor_provisionado,
                updated_at = NOW()
            WHERE comissoes_provisoes.status = 'PROVISIONADO'
            RETURNING *
            "#,
        )
        .bind(clinic_id)
        .bind(professional_id)
        .bind(competencia)
        .bind(amount)
        .fetch_optional(executor)
        .await?;

        Ok(provision)
    }

    /// Decremento guardado pelo status: só desfaz acúmulo de provisão
    /// ainda em PROVISIONADO. None = linha ausente ou já aprovada/paga.
    pub async fn reverse_provision_accrual<'e, E>(
        &self,
        executor: E,
        clinic_id: Uuid,
        professional_id: Uuid,
        competencia: NaiveDate,
        amount: Decimal,
    ) -> Result<Option<CommissionProvision>, AppError>
    where
        E: Executor<'e, Database = Postgres>,
    {
        let provision = sqlx::query_as::<_, CommissionProvision>(
            r#"
            UPDATE comissoes_provisoes
            SET valor_provisionado = valor_provisionado - $4,
                updated_at = NOW()
            WHERE clinic_id = $1 AND professional_id = $2 AND competencia = $3
              AND status = 'PROVISIONADO'
            RETURNING *
            "#,
        )
        .bind(clinic_id)
        .bind(professional_id)
        .bind(competencia)
        .bind(amount)
        .fetch_optional(executor)
        .await?;

        Ok(provision)
    }

    pub async fn get_provision<'e, E>(
        &self,
        executor: E,
        clinic_id: Uuid,
        provision_id: Uuid,
    ) -> Result<Option<CommissionProvision>, AppError>
    where
        E: Executor<'e, Database = Postgres>,
    {
        let provision = sqlx::query_as::<_, CommissionProvision>(
            "SELECT * FROM comissoes_provisoes WHERE id = $1 AND clinic_id = $2",
        )
        .bind(provision_id)
        .bind(clinic_id)
        .fetch_optional(executor)
        .await?;

        Ok(provision)
    }

    /// Trava a linha da provisão para transição de estado.
    pub async fn get_provision_for_update<'e, E>(
        &self,
        executor: E,
        clinic_id: Uuid,
        provision_id: Uuid,
    ) -> Result<Option<CommissionProvision>, AppError>
    where
        E: Executor<'e, Database = Postgres>,
    {
        let provision = sqlx::query_as::<_, CommissionProvision>(
            "SELECT * FROM comissoes_provisoes WHERE id = $1 AND clinic_id = $2 FOR UPDATE",
        )
        .bind(provision_id)
        .bind(clinic_id)
        .fetch_optional(executor)
        .await?;

        Ok(provision)
    }

    pub async fn list_provisions<'e, E>(
        &self,
        executor: E,
        clinic_id: Uuid,
        competencia: Option<NaiveDate>,
    ) -> Result<Vec<CommissionProvision>, AppError>
    where
        E: Executor<'e, Database = Postgres>,
    {
        let provisions = sqlx::query_as::<_, CommissionProvision>(
            r#"
            SELECT * FROM comissoes_provisoes
            WHERE clinic_id = $1 AND ($2::date IS NULL OR competencia = $2)
            ORDER BY competencia DESC, created_at DESC
            "#,
        )
        .bind(clinic_id)
        .bind(competencia)
        .fetch_all(executor)
        .await?;

        Ok(provisions)
    }

    /// Aprova a provisão gravando os valores derivados. Guardado pelo
    /// status: aprovar algo que não está PROVISIONADO afeta zero linhas.
    #[allow(clippy::too_many_arguments)]
    pub async fn approve_provision<'e, E>(
        &self,
        executor: E,
        clinic_id: Uuid,
        provision_id: Uuid,
        valor_adiantamentos: Decimal,
        valor_devido: Decimal,
        valor_inss: Decimal,
        valor_iss: Decimal,
        valor_irrf: Decimal,
        valor_liquido_pagar: Decimal,
        aprovado_por: Uuid,
        aprovado_em: DateTime<Utc>,
        observacoes: Option<&str>,
    ) -> Result<u64, AppError>
    where
        E: Executor<'e, Database = Postgres>,
    {
        let result = sqlx::query(
            r#"
            UPDATE comissoes_provisoes SET
                valor_adiantamentos = $3,
                valor_devido = $4,
                valor_inss = $5,
                valor_iss = $6,
                valor_irrf = $7,
                valor_liquido_pagar = $8,
                status = 'APROVADO',
                aprovado_por = $9,
                aprovado_em = $10,
                observacoes = $11,
                updated_at = NOW()
            WHERE id = $1 AND clinic_id = $2 AND status = 'PROVISIONADO'
            "#,
        )
        .bind(provision_id)
        .bind(clinic_id)
        .bind(valor_adiantamentos)
        .bind(valor_devido)
        .bind(valor_inss)
        .bind(valor_iss)
        .bind(valor_irrf)
        .bind(valor_liquido_pagar)
        .bind(aprovado_por)
        .bind(aprovado_em)
        .bind(observacoes)
        .execute(executor)
        .await?;

        Ok(result.rows_affected())
    }

    pub async fn mark_provision_paid<'e, E>(
        &self,
        executor: E,
        clinic_id: Uuid,
        provision_id: Uuid,
        financial_transaction_id: Option<Uuid>,
    ) -> Result<u64, AppError>
    where
        E: Executor<'e, Database = Postgres>,
    {
        let result = sqlx::query(
            r#"
            UPDATE comissoes_provisoes SET
                status = 'PAGO',
                financial_transaction_id = $3,
                updated_at = NOW()
            WHERE id = $1 AND clinic_id = $2 AND status = 'APROVADO'
            "#,
        )
        .bind(provision_id)
        .bind(clinic_id)
        .bind(financial_transaction_id)
        .execute(executor)
        .await?;

        Ok(result.rows_affected())
    }

    pub async fn cancel_provision<'e, E>(
        &self,
        executor: E,
        clinic_id: Uuid,
        provision_id: Uuid,
    ) -> Result<u64, AppError>
    where
        E: Executor<'e, Database = Postgres>,
    {
        let result = sqlx::query(
            r#"
            UPDATE comissoes_provisoes SET
                status = 'CANCELADO',
                updated_at = NOW()
            WHERE id = $1 AND clinic_id = $2 AND status IN ('PROVISIONADO', 'APROVADO')
            "#,
        )
        .bind(provision_id)
        .bind(clinic_id)
        .execute(executor)
        .await?;

        Ok(result.rows_affected())
    }

    // =========================================================================
    //  ADIANTAMENTOS
    // =========================================================================

    pub async fn insert_advance<'e, E>(
        &self,
        executor: E,
        clinic_id: Uuid,
        professional_id: Uuid,
        valor: Decimal,
        data_adiantamento: NaiveDate,
        forma_pagamento: crate::models::finance::PaymentMethod,
        concedido_por: Uuid,
    ) -> Result<CommissionAdvance, AppError>
    where
        E: Executor<'e, Database = Postgres>,
    {
        // saldo nasce igual ao valor; só diminui a partir daí
        let advance = sqlx::query_as::<_, CommissionAdvance>(
            r#"
            INSERT INTO comissoes_adiantamentos (
                clinic_id, professional_id, valor, saldo,
                data_adiantamento, forma_pagamento, concedido_por
            )
            VALUES ($1, $2, $3, $3, $4, $5, $6)
            RETURNING *
            "#,
        )
        .bind(clinic_id)
        .bind(professional_id)
        .bind(valor)
        .bind(data_adiantamento)
        .bind(forma_pagamento)
        .bind(concedido_por)
        .fetch_one(executor)
        .await?;

        Ok(advance)
    }

    /// Adiantamentos em aberto, do mais antigo para o mais novo, com as
    /// linhas travadas: a recuperação dentro do Approve consome daqui.
    pub async fn list_open_advances_for_update<'e, E>(
        &self,
        executor: E,
        clinic_id: Uuid,
        professional_id: Uuid,
    ) -> Result<Vec<CommissionAdvance>, AppError>
    where
        E: Executor<'e, Database = Postgres>,
    {
        let advances = sqlx::query_as::<_, CommissionAdvance>(
            r#"
            SELECT * FROM comissoes_adiantamentos
            WHERE clinic_id = $1 AND professional_id = $2 AND NOT quitado
            ORDER BY data_adiantamento ASC, created_at ASC
            FOR UPDATE
            "#,
        )
        .bind(clinic_id)
        .bind(professional_id)
        .fetch_all(executor)
        .await?;

        Ok(advances)
    }

    pub async fn list_advances<'e, E>(
        &self,
        executor: E,
        clinic_id: Uuid,
        professional_id: Uuid,
    ) -> Result<Vec<CommissionAdvance>, AppError>
    where
        E: Executor<'e, Database = Postgres>,
    {
        let advances = sqlx::query_as::<_, CommissionAdvance>(
            r#"
            SELECT * FROM comissoes_adiantamentos
            WHERE clinic_id = $1 AND professional_id = $2
            ORDER BY data_adiantamento DESC
            "#,
        )
        .bind(clinic_id)
        .bind(professional_id)
        .fetch_all(executor)
        .await?;

        Ok(advances)
    }

    pub async fn update_advance_saldo<'e, E>(
        &self,
        executor: E,
        clinic_id: Uuid,
        advance_id: Uuid,
        new_saldo: Decimal,
        quitado: bool,
    ) -> Result<u64, AppError>
    where
        E: Executor<'e, Database = Postgres>,
    {
        let result = sqlx::query(
            r#"
            UPDATE comissoes_adiantamentos
            SET saldo = $3, quitado = $4
            WHERE id = $1 AND clinic_id = $2
            "#,
        )
        .bind(advance_id)
        .bind(clinic_id)
        .bind(new_saldo)
        .bind(quitado)
        .execute(executor)
        .await?;

        Ok(result.rows_affected())
    }

    /// Soma dos saldos em aberto; conta contra o teto do profissional.
    pub async fn outstanding_advance_total<'e, E>(
        &self,
        executor: E,
        clinic_id: Uuid,
        professional_id: Uuid,
    ) -> Result<Decimal, AppError>
    where
        E: Executor<'e, Database = Postgres>,
    {
        let row: (Decimal,) = sqlx::query_as(
            r#"
            SELECT COALESCE(SUM(saldo), 0)
            FROM comissoes_adiantamentos
            WHERE clinic_id = $1 AND professional_id = $2 AND NOT quitado
            "#,
        )
        .bind(clinic_id)
        .bind(professional_id)
        .fetch_one(executor)
        .await?;

        Ok(row.0)
    }

    // =========================================================================
    //  REMUNERAÇÃO DO PROFISSIONAL
    // =========================================================================

    pub async fn get_remuneration<'e, E>(
        &self,
        executor: E,
        clinic_id: Uuid,
        professional_id: Uuid,
    ) -> Result<Option<ProfessionalRemuneration>, AppError>
    where
        E: Executor<'e, Database = Postgres>,
    {
        let remuneration = sqlx::query_as::<_, ProfessionalRemuneration>(
            "SELECT * FROM professional_remuneration WHERE clinic_id = $1 AND professional_id = $2",
        )
        .bind(clinic_id)
        .bind(professional_id)
        .fetch_optional(executor)
        .await?;

        Ok(remuneration)
    }

    pub async fn upsert_remuneration<'e, E>(
        &self,
        executor: E,
        clinic_id: Uuid,
        professional_id: Uuid,
        adiantamento_permitido: bool,
        limite_adiantamento: Decimal,
    ) -> Result<ProfessionalRemuneration, AppError>
    where
        E: Executor<'e, Database = Postgres>,
    {
        let remuneration = sqlx::query_as::<_, ProfessionalRemuneration>(
            r#"
            INSERT INTO professional_remuneration (
                clinic_id, professional_id, adiantamento_permitido, limite_adiantamento
            )
            VALUES ($1, $2, $3, $4)
            ON CONFLICT (clinic_id, professional_id)
            DO UPDATE SET
                adiantamento_permitido = EXCLUDED.adiantamento_permitido,
                limite_adiantamento = EXCLUDED.limite_adiantamento
            RETURNING *
            "#,
        )
        .bind(clinic_id)
        .bind(professional_id)
        .bind(adiantamento_permitido)
        .bind(limite_adiantamento)
        .fetch_one(executor)
        .await?;

        Ok(remuneration)
    }
}

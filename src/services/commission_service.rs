// src/services/commission_service.rs

use chrono::{Datelike, NaiveDate, Utc};
use rust_decimal::Decimal;
use serde_json::json;
use sqlx::{Connection, PgConnection};
use uuid::Uuid;

use crate::{
    common::error::AppError,
    config::FinanceConfig,
    db::{AuditRepository, CommissionRepository, FinanceRepository},
    models::commission::{
        CalculationType, CommissionAdvance, CommissionBase, CommissionProvision, CommissionRule,
        CommissionTrigger, ProfessionalRemuneration,
    },
    models::finance::{BudgetItem, PaymentMethod, ReceivableTitle, TransactionKind},
    services::settlement::round_money,
};

// ---
// Entradas de serviço
// ---

pub struct NewRule {
    pub professional_id: Option<Uuid>,
    pub procedure_id: Option<Uuid>,
    pub calculation_type: CalculationType,
    pub percentage: Option<Decimal>,
    pub fixed_amount: Option<Decimal>,
    pub base: CommissionBase,
    pub trigger_kind: CommissionTrigger,
    pub min_guaranteed: Option<Decimal>,
    pub cap: Option<Decimal>,
}

pub struct NewAdvance {
    pub professional_id: Uuid,
    pub valor: Decimal,
    pub data_adiantamento: NaiveDate,
    pub forma_pagamento: PaymentMethod,
}

// ---
// Funções puras: resolução de regra e cálculo
// ---

/// Competência contábil de uma data: o dia 1 do mês.
pub fn competencia_of(date: NaiveDate) -> NaiveDate {
    NaiveDate::from_ymd_opt(date.year(), date.month(), 1).unwrap_or(date)
}

fn rule_specificity(rule: &CommissionRule) -> u8 {
    match (rule.professional_id.is_some(), rule.procedure_id.is_some()) {
        (true, true) => 3,   // profissional + procedimento
        (true, false) => 2,  // só profissional
        (false, true) => 1,  // só procedimento
        (false, false) => 0, // global
    }
}

/// Seleciona a regra aplicável a um (profissional, procedimento).
///
/// Escopo com campo None significa "vale para todos". Entre as regras que
/// casam, ganha a mais específica; empate na mesma especificidade é
/// resolvido pela regra criada mais recentemente (política deliberada,
/// registrada no DESIGN.md).
pub fn resolve_rule<'a>(
    professional_id: Uuid,
    procedure_id: Uuid,
    rules: &'a [CommissionRule],
) -> Option<&'a CommissionRule> {
    rules
        .iter()
        .filter(|r| r.active)
        .filter(|r| r.professional_id.is_none() || r.professional_id == Some(professional_id))
        .filter(|r| r.procedure_id.is_none() || r.procedure_id == Some(procedure_id))
        .max_by_key(|r| (rule_specificity(r), r.created_at))
}

/// Calcula o valor da comissão para uma regra e uma base.
///
/// Percentual: base × percentage/100, com piso (min_guaranteed) aplicado só
/// se o valor ficar abaixo dele e teto (cap) só se ficar acima. Fixo:
/// fixed_amount, indiferente à base.
pub fn compute_commission(rule: &CommissionRule, base_value: Decimal) -> Decimal {
    match rule.calculation_type {
        CalculationType::Fixed => rule.fixed_amount.unwrap_or(Decimal::ZERO),
        CalculationType::Percentage => {
            let pct = rule.percentage.unwrap_or(Decimal::ZERO);
            let mut amount = round_money(base_value * pct / Decimal::ONE_HUNDRED);

            if let Some(min) = rule.min_guaranteed {
                if amount < min {
                    amount = min;
                }
            }
            if let Some(cap) = rule.cap {
                if amount > cap {
                    amount = cap;
                }
            }
            amount
        }
    }
}

/// Rateia as comissões de recebimento de um título quitado.
///
/// Para cada item do orçamento resolve a regra, fica só com gatilho
/// RECEIPT, aplica a base (NET desconta a proporção da taxa de cartão) e
/// agrega por profissional. O valor final de cada profissional é
/// proporcional a share = título.amount / total do orçamento, arredondado
/// ao centavo. O MESMO plano serve para acumular (título quitou) e para
/// estornar (o pagamento quitador foi estornado): acumular e estornar com
/// entradas iguais se anulam exatamente.
pub fn plan_receipt_accruals(
    title: &ReceivableTitle,
    items: &[BudgetItem],
    rules: &[CommissionRule],
) -> Vec<(Uuid, Decimal)> {
    let budget_total: Decimal = items.iter().map(|i| i.valor).sum();
    if budget_total <= Decimal::ZERO {
        return Vec::new();
    }

    let share = title.amount / budget_total;

    // Proporção líquida da taxa de cartão, quando a base da regra é NET
    let net_ratio = match title.net_value {
        Some(net) if !title.amount.is_zero() => net / title.amount,
        _ => Decimal::ONE,
    };

    // Um acúmulo por profissional por título quitado
    let mut per_professional: Vec<(Uuid, Decimal)> = Vec::new();

    for item in items {
        let Some(rule) = resolve_rule(item.professional_id, item.procedure_id, rules) else {
            continue;
        };
        if rule.trigger_kind != CommissionTrigger::Receipt {
            continue;
        }

        let base_value = match rule.base {
            CommissionBase::Gross | CommissionBase::Received => item.valor,
            CommissionBase::Net => item.valor * net_ratio,
        };

        let commission = compute_commission(rule, base_value);

        match per_professional.iter_mut().find(|(p, _)| *p == item.professional_id) {
            Some((_, total)) => *total += commission,
            None => per_professional.push((item.professional_id, commission)),
        }
    }

    per_professional
        .into_iter()
        .map(|(professional_id, full)| (professional_id, round_money(full * share)))
        .filter(|(_, amount)| *amount > Decimal::ZERO)
        .collect()
}

// ---
// Funções puras: recuperação de adiantamentos e retenções
// ---

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AdvanceUpdate {
    pub advance_id: Uuid,
    pub new_saldo: Decimal,
    pub quitado: bool,
}

#[derive(Debug, Clone, Default)]
pub struct AdvanceRecoveryPlan {
    pub total_recovered: Decimal,
    pub updates: Vec<AdvanceUpdate>,
}

/// Planeja a recuperação de adiantamentos contra um valor devido.
///
/// Consome os adiantamentos em aberto do mais antigo para o mais novo,
/// até no máximo `valor_devido`. Este é o ÚNICO ponto do sistema que
/// abate adiantamento de comissão; o saldo de cada adiantamento só
/// diminui, e quitado acende quando chega a zero.
pub fn plan_advance_recovery(
    valor_devido: Decimal,
    advances: &[CommissionAdvance],
) -> AdvanceRecoveryPlan {
    let mut plan = AdvanceRecoveryPlan::default();
    let mut remaining = valor_devido.max(Decimal::ZERO);

    for advance in advances {
        if remaining.is_zero() {
            break;
        }
        if advance.quitado || advance.saldo <= Decimal::ZERO {
            continue;
        }

        let recovered = advance.saldo.min(remaining);
        let new_saldo = advance.saldo - recovered;

        plan.total_recovered += recovered;
        remaining -= recovered;
        plan.updates.push(AdvanceUpdate {
            advance_id: advance.id,
            new_saldo,
            quitado: new_saldo.is_zero(),
        });
    }

    plan
}

/// Permissão e teto de adiantamento de um profissional.
///
/// O limite vale para a exposição total: saldo em aberto mais o novo
/// valor. Profissional sem a permissão habilitada não recebe nada,
/// independente do teto.
pub fn check_advance_allowance(
    remuneration: &ProfessionalRemuneration,
    outstanding: Decimal,
    valor: Decimal,
) -> Result<(), AppError> {
    if !remuneration.adiantamento_permitido {
        return Err(AppError::LimitExceeded(
            "Adiantamentos não estão habilitados para este profissional.".into(),
        ));
    }

    if outstanding + valor > remuneration.limite_adiantamento {
        return Err(AppError::LimitExceeded(format!(
            "Adiantamento excede o limite de {} (saldo em aberto: {}).",
            remuneration.limite_adiantamento, outstanding
        )));
    }

    Ok(())
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Withholdings {
    pub inss: Decimal,
    pub iss: Decimal,
    pub irrf: Decimal,
}

impl Withholdings {
    pub fn total(&self) -> Decimal {
        self.inss + self.iss + self.irrf
    }
}

/// Retenções sobre o valor devido. Os percentuais vêm da configuração do
/// operador; nada aqui opina sobre legislação.
pub fn compute_withholdings(valor_devido: Decimal, config: &FinanceConfig) -> Withholdings {
    let base = valor_devido.max(Decimal::ZERO);
    Withholdings {
        inss: round_money(base * config.inss_percent / Decimal::ONE_HUNDRED),
        iss: round_money(base * config.iss_percent / Decimal::ONE_HUNDRED),
        irrf: round_money(base * config.irrf_percent / Decimal::ONE_HUNDRED),
    }
}

// ---
// Serviço
// ---

#[derive(Clone)]
pub struct CommissionService {
    repo: CommissionRepository,
    finance_repo: FinanceRepository,
    audit_repo: AuditRepository,
    config: FinanceConfig,
}

impl CommissionService {
    pub fn new(
        repo: CommissionRepository,
        finance_repo: FinanceRepository,
        audit_repo: AuditRepository,
        config: FinanceConfig,
    ) -> Self {
        Self { repo, finance_repo, audit_repo, config }
    }

    // --- REGRAS ---

    pub async fn create_rule(
        &self,
        conn: &mut PgConnection,
        clinic_id: Uuid,
        rule: NewRule,
    ) -> Result<CommissionRule, AppError> {
        match rule.calculation_type {
            CalculationType::Percentage if rule.percentage.is_none() => {
                return Err(AppError::InvalidAmount(
                    "Regra percentual exige o campo percentage.".into(),
                ));
            }
            CalculationType::Fixed if rule.fixed_amount.is_none() => {
                return Err(AppError::InvalidAmount(
                    "Regra fixa exige o campo fixedAmount.".into(),
                ));
            }
            _ => {}
        }

        self.repo.create_rule(&mut *conn, clinic_id, &rule).await
    }

    pub async fn list_rules(
        &self,
        conn: &mut PgConnection,
        clinic_id: Uuid,
    ) -> Result<Vec<CommissionRule>, AppError> {
        self.repo.list_rules(&mut *conn, clinic_id).await
    }

    // --- PROVISÕES ---

    /// Acúmulo manual, usado pelos gatilhos externos (APPROVAL/COMPLETION,
    /// que disparam fora do núcleo). O gatilho RECEIPT entra por
    /// `provision_receipt_commissions`, dentro da transação do pagamento.
    pub async fn accrue(
        &self,
        conn: &mut PgConnection,
        clinic_id: Uuid,
        professional_id: Uuid,
        competencia: NaiveDate,
        amount: Decimal,
        reference: Option<&str>,
        actor_id: Uuid,
    ) -> Result<CommissionProvision, AppError> {
        if amount <= Decimal::ZERO {
            return Err(AppError::InvalidAmount(
                "O valor do acúmulo deve ser maior que zero.".into(),
            ));
        }

        let mut tx = conn.begin().await?;

        let provision = self
            .accrue_in_tx(
                &mut *tx,
                clinic_id,
                professional_id,
                competencia_of(competencia),
                round_money(amount),
                reference,
                actor_id,
            )
            .await?;

        tx.commit().await?;
        Ok(provision)
    }

    /// Acúmulo dentro de uma transação já aberta pelo chamador.
    async fn accrue_in_tx(
        &self,
        tx: &mut PgConnection,
        clinic_id: Uuid,
        professional_id: Uuid,
        competencia: NaiveDate,
        amount: Decimal,
        reference: Option<&str>,
        actor_id: Uuid,
    ) -> Result<CommissionProvision, AppError> {
        let provision = self
            .repo
            .accrue_provision(&mut *tx, clinic_id, professional_id, competencia, amount)
            .await?
            .ok_or_else(|| {
                AppError::InvalidState(
                    "A provisão desta competência já foi aprovada ou paga; não aceita mais acúmulos.".into(),
                )
            })?;

        self.audit_repo
            .insert(
                &mut *tx,
                clinic_id,
                "commission_provision",
                provision.id,
                "accrued",
                actor_id,
                Some(json!({
                    "amount": amount,
                    "competencia": competencia,
                    "reference": reference,
                    "valorProvisionado": provision.valor_provisionado,
                })),
            )
            .await?;

        Ok(provision)
    }

    /// Provisiona comissões de um título que acabou de quitar.
    ///
    /// Chamado pelo Payment Processor DENTRO da transação do pagamento:
    /// ou tudo entra (pagamento + provisões), ou nada. O rateio é
    /// proporcional: share = título.amount / total do orçamento, e o
    /// vínculo com o orçamento é a FK explícita de budget_items.
    pub async fn provision_receipt_commissions(
        &self,
        tx: &mut PgConnection,
        clinic_id: Uuid,
        title: &ReceivableTitle,
        items: &[BudgetItem],
        payment_date: NaiveDate,
        actor_id: Uuid,
    ) -> Result<(), AppError> {
        let rules = self.repo.list_active_rules(&mut *tx, clinic_id).await?;
        let accruals = plan_receipt_accruals(title, items, &rules);

        let competencia = competencia_of(payment_date);
        let reference = format!("title:{}", title.id);

        for (professional_id, amount) in accruals {
            self.accrue_in_tx(
                &mut *tx,
                clinic_id,
                professional_id,
                competencia,
                amount,
                Some(&reference),
                actor_id,
            )
            .await?;
        }

        Ok(())
    }

    /// Desfaz as provisões de um título cujo pagamento quitador foi estornado.
    ///
    /// Mesmo plano de rateio do acúmulo, com o sinal trocado: o acúmulo
    /// dispara a cada transição do título PARA quitado, o estorno a cada
    /// transição PARA FORA de quitado, então pagar-estornar-pagar provisiona
    /// exatamente uma vez. Se a provisão da competência já saiu de
    /// PROVISIONADO, o estorno do pagamento é rejeitado.
    pub async fn reverse_receipt_commissions(
        &self,
        tx: &mut PgConnection,
        clinic_id: Uuid,
        title: &ReceivableTitle,
        items: &[BudgetItem],
        payment_date: NaiveDate,
        actor_id: Uuid,
    ) -> Result<(), AppError> {
        let rules = self.repo.list_active_rules(&mut *tx, clinic_id).await?;
        let accruals = plan_receipt_accruals(title, items, &rules);

        let competencia = competencia_of(payment_date);
        let reference = format!("title:{}", title.id);

        for (professional_id, amount) in accruals {
            let provision = self
                .repo
                .reverse_provision_accrual(&mut *tx, clinic_id, professional_id, competencia, amount)
                .await?
                .ok_or_else(|| {
                    AppError::InvalidState(
                        "A provisão da competência já foi aprovada ou paga; cancele-a antes de estornar o pagamento.".into(),
                    )
                })?;

            self.audit_repo
                .insert(
                    &mut *tx,
                    clinic_id,
                    "commission_provision",
                    provision.id,
                    "accrual_reversed",
                    actor_id,
                    Some(json!({
                        "amount": amount,
                        "competencia": competencia,
                        "reference": reference.as_str(),
                        "valorProvisionado": provision.valor_provisionado,
                    })),
                )
                .await?;
        }

        Ok(())
    }

    /// Aprovação: o único passo que abate adiantamentos e aplica retenções.
    pub async fn approve(
        &self,
        conn: &mut PgConnection,
        clinic_id: Uuid,
        provision_id: Uuid,
        approver_id: Uuid,
        observacoes: Option<&str>,
    ) -> Result<CommissionProvision, AppError> {
        let mut tx = conn.begin().await?;

        let provision = self
            .repo
            .get_provision_for_update(&mut *tx, clinic_id, provision_id)
            .await?
            .ok_or(AppError::NotFound("Provisão"))?;

        if !provision.status.can_approve() {
            return Err(AppError::InvalidState(format!(
                "Provisão não pode ser aprovada no status {:?}.",
                provision.status
            )));
        }

        // Valor devido antes dos abatimentos
        let devido_bruto = provision.valor_provisionado + provision.valor_ajustes;

        // Recuperação de adiantamentos (mais antigo primeiro), única e
        // autoritativa: o plano é aplicado linha a linha com as linhas travadas
        let advances = self
            .repo
            .list_open_advances_for_update(&mut *tx, clinic_id, provision.professional_id)
            .await?;
        let recovery = plan_advance_recovery(devido_bruto, &advances);

        for update in &recovery.updates {
            self.repo
                .update_advance_saldo(&mut *tx, clinic_id, update.advance_id, update.new_saldo, update.quitado)
                .await?;
        }

        let valor_devido = devido_bruto - recovery.total_recovered;
        let withholdings = compute_withholdings(valor_devido, &self.config);
        let valor_liquido = valor_devido - withholdings.total();

        let aprovado_em = Utc::now();
        let rows = self
            .repo
            .approve_provision(
                &mut *tx,
                clinic_id,
                provision_id,
                recovery.total_recovered,
                valor_devido,
                withholdings.inss,
                withholdings.iss,
                withholdings.irrf,
                valor_liquido,
                approver_id,
                aprovado_em,
                observacoes,
            )
            .await?;

        if rows == 0 {
            // A linha estava travada, então isso não deveria acontecer
            return Err(AppError::ConcurrencyConflict);
        }

        self.audit_repo
            .insert(
                &mut *tx,
                clinic_id,
                "commission_provision",
                provision_id,
                "approved",
                approver_id,
                Some(json!({
                    "valorDevido": valor_devido,
                    "valorAdiantamentos": recovery.total_recovered,
                    "valorLiquidoPagar": valor_liquido,
                })),
            )
            .await?;

        tx.commit().await?;

        tracing::info!(
            provision_id = %provision_id,
            valor_liquido = %valor_liquido,
            "Provisão de comissão aprovada"
        );

        self.repo
            .get_provision(&mut *conn, clinic_id, provision_id)
            .await?
            .ok_or(AppError::NotFound("Provisão"))
    }

    /// Pagamento: gera a despesa de "Comissões" no fluxo de caixa e
    /// transiciona para PAGO. Exige status APROVADO.
    pub async fn pay(
        &self,
        conn: &mut PgConnection,
        clinic_id: Uuid,
        provision_id: Uuid,
        actor_id: Uuid,
    ) -> Result<CommissionProvision, AppError> {
        let mut tx = conn.begin().await?;

        let provision = self
            .repo
            .get_provision_for_update(&mut *tx, clinic_id, provision_id)
            .await?
            .ok_or(AppError::NotFound("Provisão"))?;

        if !provision.status.can_pay() {
            return Err(AppError::InvalidState(format!(
                "Provisão não pode ser paga no status {:?}.",
                provision.status
            )));
        }

        // Se os adiantamentos consumiram tudo, não há desembolso:
        // marca PAGO sem linha no fluxo de caixa
        let transaction_id = if provision.valor_liquido_pagar > Decimal::ZERO {
            let transaction = self
                .finance_repo
                .insert_transaction(
                    &mut *tx,
                    clinic_id,
                    Utc::now().date_naive(),
                    TransactionKind::Despesa,
                    provision.valor_liquido_pagar,
                    "Comissões",
                    Some(&format!("provisao:{}", provision_id)),
                )
                .await?;
            Some(transaction.id)
        } else {
            None
        };

        let rows = self
            .repo
            .mark_provision_paid(&mut *tx, clinic_id, provision_id, transaction_id)
            .await?;
        if rows == 0 {
            return Err(AppError::ConcurrencyConflict);
        }

        self.audit_repo
            .insert(
                &mut *tx,
                clinic_id,
                "commission_provision",
                provision_id,
                "paid",
                actor_id,
                Some(json!({
                    "valorLiquidoPagar": provision.valor_liquido_pagar,
                    "financialTransactionId": transaction_id,
                })),
            )
            .await?;

        tx.commit().await?;

        self.repo
            .get_provision(&mut *conn, clinic_id, provision_id)
            .await?
            .ok_or(AppError::NotFound("Provisão"))
    }

    pub async fn cancel(
        &self,
        conn: &mut PgConnection,
        clinic_id: Uuid,
        provision_id: Uuid,
        actor_id: Uuid,
        motivo: Option<&str>,
    ) -> Result<CommissionProvision, AppError> {
        let mut tx = conn.begin().await?;

        let provision = self
            .repo
            .get_provision_for_update(&mut *tx, clinic_id, provision_id)
            .await?
            .ok_or(AppError::NotFound("Provisão"))?;

        if !provision.status.can_cancel() {
            return Err(AppError::InvalidState(format!(
                "Provisão não pode ser cancelada no status {:?}.",
                provision.status
            )));
        }

        self.repo.cancel_provision(&mut *tx, clinic_id, provision_id).await?;

        self.audit_repo
            .insert(
                &mut *tx,
                clinic_id,
                "commission_provision",
                provision_id,
                "cancelled",
                actor_id,
                Some(json!({ "motivo": motivo })),
            )
            .await?;

        tx.commit().await?;

        self.repo
            .get_provision(&mut *conn, clinic_id, provision_id)
            .await?
            .ok_or(AppError::NotFound("Provisão"))
    }

    pub async fn list_provisions(
        &self,
        conn: &mut PgConnection,
        clinic_id: Uuid,
        competencia: Option<NaiveDate>,
    ) -> Result<Vec<CommissionProvision>, AppError> {
        self.repo
            .list_provisions(&mut *conn, clinic_id, competencia.map(competencia_of))
            .await
    }

    // --- ADIANTAMENTOS ---

    /// Concede um adiantamento contra comissões futuras, respeitando a
    /// permissão e o teto do profissional. A despesa de "Adiantamentos"
    /// entra no caixa na mesma transação.
    pub async fn grant_advance(
        &self,
        conn: &mut PgConnection,
        clinic_id: Uuid,
        advance: NewAdvance,
        concedido_por: Uuid,
    ) -> Result<CommissionAdvance, AppError> {
        if advance.valor <= Decimal::ZERO {
            return Err(AppError::InvalidAmount(
                "O valor do adiantamento deve ser maior que zero.".into(),
            ));
        }

        let mut tx = conn.begin().await?;

        let remuneration = self
            .repo
            .get_remuneration(&mut *tx, clinic_id, advance.professional_id)
            .await?
            .ok_or(AppError::NotFound("Remuneração do profissional"))?;

        let outstanding = self
            .repo
            .outstanding_advance_total(&mut *tx, clinic_id, advance.professional_id)
            .await?;

        check_advance_allowance(&remuneration, outstanding, advance.valor)?;

        let created = self
            .repo
            .insert_advance(
                &mut *tx,
                clinic_id,
                advance.professional_id,
                advance.valor,
                advance.data_adiantamento,
                advance.forma_pagamento,
                concedido_por,
            )
            .await?;

        self.finance_repo
            .insert_transaction(
                &mut *tx,
                clinic_id,
                advance.data_adiantamento,
                TransactionKind::Despesa,
                advance.valor,
                "Adiantamentos",
                Some(&format!("adiantamento:{}", created.id)),
            )
            .await?;

        self.audit_repo
            .insert(
                &mut *tx,
                clinic_id,
                "commission_advance",
                created.id,
                "granted",
                concedido_por,
                Some(json!({
                    "valor": created.valor,
                    "professionalId": created.professional_id,
                })),
            )
            .await?;

        tx.commit().await?;
        Ok(created)
    }

    pub async fn list_advances(
        &self,
        conn: &mut PgConnection,
        clinic_id: Uuid,
        professional_id: Uuid,
    ) -> Result<Vec<CommissionAdvance>, AppError> {
        self.repo.list_advances(&mut *conn, clinic_id, professional_id).await
    }

    pub async fn upsert_remuneration(
        &self,
        conn: &mut PgConnection,
        clinic_id: Uuid,
        professional_id: Uuid,
        adiantamento_permitido: bool,
        limite_adiantamento: Decimal,
    ) -> Result<crate::models::commission::ProfessionalRemuneration, AppError> {
        self.repo
            .upsert_remuneration(&mut *conn, clinic_id, professional_id, adiantamento_permitido, limite_adiantamento)
            .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::commission::ProvisionStatus;
    use chrono::TimeZone;

    fn dec(s: &str) -> Decimal {
        Decimal::from_str_exact(s).unwrap()
    }

    fn rule(
        professional: Option<Uuid>,
        procedure: Option<Uuid>,
        percentage: &str,
        created_offset_secs: i64,
    ) -> CommissionRule {
        CommissionRule {
            id: Uuid::new_v4(),
            clinic_id: Uuid::new_v4(),
            professional_id: professional,
            procedure_id: procedure,
            calculation_type: CalculationType::Percentage,
            percentage: Some(dec(percentage)),
            fixed_amount: None,
            base: CommissionBase::Received,
            trigger_kind: CommissionTrigger::Receipt,
            min_guaranteed: None,
            cap: None,
            active: true,
            created_at: Some(
                Utc.with_ymd_and_hms(2025, 1, 1, 12, 0, 0).unwrap()
                    + chrono::Duration::seconds(created_offset_secs),
            ),
        }
    }

    #[test]
    fn especificidade_da_regra() {
        let prof_a = Uuid::new_v4();
        let prof_b = Uuid::new_v4();
        let proc_p = Uuid::new_v4();
        let proc_q = Uuid::new_v4();

        let r1 = rule(Some(prof_a), None, "20", 0);
        let r2 = rule(None, Some(proc_p), "10", 1);
        let r3 = rule(Some(prof_a), Some(proc_p), "25", 2);
        let rules = vec![r1.clone(), r2.clone(), r3.clone()];

        // (A, P) -> regra mais específica
        assert_eq!(resolve_rule(prof_a, proc_p, &rules).unwrap().id, r3.id);
        // (A, Q) -> só profissional
        assert_eq!(resolve_rule(prof_a, proc_q, &rules).unwrap().id, r1.id);
        // (B, P) -> só procedimento
        assert_eq!(resolve_rule(prof_b, proc_p, &rules).unwrap().id, r2.id);
        // (B, Q) -> nenhuma regra casa
        assert!(resolve_rule(prof_b, proc_q, &rules).is_none());
    }

    #[test]
    fn empate_vai_para_a_regra_mais_recente() {
        let prof = Uuid::new_v4();
        let antiga = rule(Some(prof), None, "10", 0);
        let recente = rule(Some(prof), None, "15", 100);
        let rules = vec![antiga, recente.clone()];

        assert_eq!(resolve_rule(prof, Uuid::new_v4(), &rules).unwrap().id, recente.id);
    }

    #[test]
    fn regra_inativa_nao_casa() {
        let prof = Uuid::new_v4();
        let mut r = rule(Some(prof), None, "10", 0);
        r.active = false;
        assert!(resolve_rule(prof, Uuid::new_v4(), &[r]).is_none());
    }

    #[test]
    fn comissao_percentual_com_piso_e_teto() {
        let mut r = rule(None, None, "20", 0);
        r.min_guaranteed = Some(dec("50.00"));
        r.cap = Some(dec("300.00"));

        // 20% de 100 = 20 -> sobe para o piso 50
        assert_eq!(compute_commission(&r, dec("100.00")), dec("50.00"));
        // 20% de 1000 = 200 -> dentro da janela
        assert_eq!(compute_commission(&r, dec("1000.00")), dec("200.00"));
        // 20% de 2000 = 400 -> desce para o teto 300
        assert_eq!(compute_commission(&r, dec("2000.00")), dec("300.00"));
    }

    #[test]
    fn comissao_fixa_ignora_a_base() {
        let mut r = rule(None, None, "0", 0);
        r.calculation_type = CalculationType::Fixed;
        r.fixed_amount = Some(dec("80.00"));

        assert_eq!(compute_commission(&r, dec("1.00")), dec("80.00"));
        assert_eq!(compute_commission(&r, dec("99999.00")), dec("80.00"));
    }

    fn advance(saldo: &str, dia: u32) -> CommissionAdvance {
        CommissionAdvance {
            id: Uuid::new_v4(),
            clinic_id: Uuid::new_v4(),
            professional_id: Uuid::new_v4(),
            valor: dec("1000.00"),
            saldo: dec(saldo),
            quitado: dec(saldo).is_zero(),
            data_adiantamento: NaiveDate::from_ymd_opt(2025, 6, dia).unwrap(),
            forma_pagamento: PaymentMethod::Pix,
            concedido_por: Uuid::new_v4(),
            created_at: None,
        }
    }

    #[test]
    fn recuperacao_consome_do_mais_antigo() {
        // Lista já vem ordenada do repo (mais antigo primeiro)
        let a1 = advance("300.00", 1);
        let a2 = advance("400.00", 10);

        let plan = plan_advance_recovery(dec("500.00"), &[a1.clone(), a2.clone()]);

        assert_eq!(plan.total_recovered, dec("500.00"));
        assert_eq!(plan.updates.len(), 2);
        // O mais antigo quita por inteiro
        assert_eq!(plan.updates[0].advance_id, a1.id);
        assert_eq!(plan.updates[0].new_saldo, Decimal::ZERO);
        assert!(plan.updates[0].quitado);
        // O seguinte abate parcialmente
        assert_eq!(plan.updates[1].advance_id, a2.id);
        assert_eq!(plan.updates[1].new_saldo, dec("200.00"));
        assert!(!plan.updates[1].quitado);
    }

    #[test]
    fn recuperacao_nunca_passa_do_devido() {
        let a = advance("1000.00", 1);
        let plan = plan_advance_recovery(dec("250.00"), &[a]);
        assert_eq!(plan.total_recovered, dec("250.00"));
        assert_eq!(plan.updates[0].new_saldo, dec("750.00"));
    }

    #[test]
    fn recuperacao_com_devido_zero_nao_mexe_em_nada() {
        let a = advance("100.00", 1);
        let plan = plan_advance_recovery(Decimal::ZERO, &[a]);
        assert!(plan.updates.is_empty());
        assert_eq!(plan.total_recovered, Decimal::ZERO);
    }

    #[test]
    fn retencoes_configuradas() {
        let config = FinanceConfig {
            inss_percent: dec("11.0"),
            iss_percent: dec("2.0"),
            irrf_percent: dec("1.5"),
            ..FinanceConfig::default()
        };

        let w = compute_withholdings(dec("1000.00"), &config);
        assert_eq!(w.inss, dec("110.00"));
        assert_eq!(w.iss, dec("20.00"));
        assert_eq!(w.irrf, dec("15.00"));
        assert_eq!(w.total(), dec("145.00"));
    }

    #[test]
    fn competencia_normaliza_para_dia_1() {
        let d = NaiveDate::from_ymd_opt(2025, 6, 23).unwrap();
        assert_eq!(competencia_of(d), NaiveDate::from_ymd_opt(2025, 6, 1).unwrap());
    }

    #[test]
    fn status_da_provisao_respeita_a_ordem() {
        assert!(ProvisionStatus::Provisionado.can_approve());
        assert!(!ProvisionStatus::Provisionado.can_pay());
        assert!(ProvisionStatus::Aprovado.can_pay());
        assert!(!ProvisionStatus::Pago.can_cancel());
    }

    fn titulo_quitado(amount: &str, net_value: Option<&str>, budget_id: Uuid) -> ReceivableTitle {
        ReceivableTitle {
            id: Uuid::new_v4(),
            title_number: 1,
            clinic_id: Uuid::new_v4(),
            patient_id: Uuid::new_v4(),
            budget_id: Some(budget_id),
            installment_number: 1,
            total_installments: 1,
            due_date: NaiveDate::from_ymd_opt(2025, 6, 10).unwrap(),
            amount: dec(amount),
            balance: Decimal::ZERO,
            status: crate::models::finance::TitleStatus::Paid,
            payment_method: None,
            acquirer_fee_rate: None,
            settlement_lag_days: None,
            settlement_date: None,
            net_value: net_value.map(dec),
            anticipated: false,
            created_at: None,
            updated_at: None,
        }
    }

    fn item(professional: Uuid, procedure: Uuid, valor: &str, budget_id: Uuid) -> BudgetItem {
        BudgetItem {
            id: Uuid::new_v4(),
            clinic_id: Uuid::new_v4(),
            budget_id,
            professional_id: professional,
            procedure_id: procedure,
            valor: dec(valor),
            created_at: None,
        }
    }

    #[test]
    fn rateio_de_recebimento_proporcional() {
        let budget = Uuid::new_v4();
        let prof_a = Uuid::new_v4();
        let prof_b = Uuid::new_v4();
        let proc_p = Uuid::new_v4();

        // Parcela de 500 sobre um orçamento de 1000: share = 0.5
        let title = titulo_quitado("500.00", None, budget);
        let items = vec![
            item(prof_a, proc_p, "600.00", budget),
            item(prof_b, proc_p, "400.00", budget),
        ];
        // Regra global de 10%; prof_b sem regra própria usa a mesma
        let rules = vec![rule(None, None, "10", 0)];

        let mut plan = plan_receipt_accruals(&title, &items, &rules);
        plan.sort_by_key(|(p, _)| *p == prof_b);

        // 600 × 10% × 0.5 = 30.00; 400 × 10% × 0.5 = 20.00
        assert_eq!(plan, vec![(prof_a, dec("30.00")), (prof_b, dec("20.00"))]);
    }

    #[test]
    fn rateio_ignora_gatilhos_que_nao_sao_recebimento() {
        let budget = Uuid::new_v4();
        let prof = Uuid::new_v4();
        let proc_p = Uuid::new_v4();

        let title = titulo_quitado("1000.00", None, budget);
        let items = vec![item(prof, proc_p, "1000.00", budget)];

        let mut aprovacao = rule(None, None, "10", 0);
        aprovacao.trigger_kind = CommissionTrigger::Approval;

        assert!(plan_receipt_accruals(&title, &items, &[aprovacao]).is_empty());
    }

    #[test]
    fn estornar_e_requitar_provisiona_exatamente_uma_vez() {
        // Pagar, estornar e pagar de novo: o estorno usa o MESMO plano do
        // acúmulo, então o saldo líquido acumulado é o de um único acúmulo
        let budget = Uuid::new_v4();
        let prof = Uuid::new_v4();
        let proc_p = Uuid::new_v4();

        let title = titulo_quitado("500.00", None, budget);
        let items = vec![item(prof, proc_p, "500.00", budget)];
        let rules = vec![rule(None, None, "20", 0)];

        let acumulo = plan_receipt_accruals(&title, &items, &rules);
        let estorno = plan_receipt_accruals(&title, &items, &rules);
        let reacumulo = plan_receipt_accruals(&title, &items, &rules);

        assert_eq!(acumulo, estorno);

        let liquido: Decimal = acumulo.iter().map(|(_, v)| *v).sum::<Decimal>()
            - estorno.iter().map(|(_, v)| *v).sum::<Decimal>()
            + reacumulo.iter().map(|(_, v)| *v).sum::<Decimal>();
        assert_eq!(liquido, dec("100.00")); // 500 × 20%, uma vez só
    }

    fn remuneracao(permitido: bool, limite: &str) -> ProfessionalRemuneration {
        ProfessionalRemuneration {
            clinic_id: Uuid::new_v4(),
            professional_id: Uuid::new_v4(),
            adiantamento_permitido: permitido,
            limite_adiantamento: dec(limite),
            created_at: None,
        }
    }

    #[test]
    fn adiantamento_sem_permissao_rejeitado() {
        let rem = remuneracao(false, "5000.00");
        let err = check_advance_allowance(&rem, Decimal::ZERO, dec("100.00")).unwrap_err();
        assert!(matches!(err, AppError::LimitExceeded(_)));
    }

    #[test]
    fn adiantamento_acima_do_teto_rejeitado() {
        let rem = remuneracao(true, "500.00");
        let err = check_advance_allowance(&rem, Decimal::ZERO, dec("600.00")).unwrap_err();
        assert!(matches!(err, AppError::LimitExceeded(_)));
    }

    #[test]
    fn teto_considera_o_saldo_em_aberto() {
        let rem = remuneracao(true, "500.00");

        // 200 em aberto + 300 novos = exatamente no limite: passa
        assert!(check_advance_allowance(&rem, dec("200.00"), dec("300.00")).is_ok());

        // Um centavo acima do limite: rejeita
        let err = check_advance_allowance(&rem, dec("200.00"), dec("300.01")).unwrap_err();
        assert!(matches!(err, AppError::LimitExceeded(_)));
    }
}

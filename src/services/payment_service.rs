// src/services/payment_service.rs

use chrono::{NaiveDate, Utc};
use rust_decimal::Decimal;
use serde::Serialize;
use serde_json::json;
use sqlx::{Connection, PgConnection};
use utoipa::ToSchema;
use uuid::Uuid;

use crate::{
    common::error::AppError,
    config::FinanceConfig,
    db::{AuditRepository, FinanceRepository, finance_repo::CardFields},
    models::finance::{
        BudgetItem, PaymentMethod, PaymentStatus, ReceivableTitle, TitleStatus, TransactionKind,
    },
    services::{
        aging::{self, AgingSummary},
        commission_service::CommissionService,
        settlement::compute_card_settlement,
    },
};

// ---
// Entradas e saídas do serviço
// ---

pub struct RecordPaymentInput {
    pub title_id: Uuid,
    pub amount: Decimal,
    pub paid_at: Option<NaiveDate>,
    pub method: PaymentMethod,
    pub cash_account_id: Option<Uuid>,
    pub notes: Option<String>,
    pub created_by: Uuid,
    // Campos de cartão, todos opcionais: sem eles valem os defaults da config
    pub taxa_adquirente: Option<Decimal>,
    pub valor_liquido: Option<Decimal>,
    pub data_repasse: Option<NaiveDate>,
    pub antecipado: Option<bool>,
}

pub struct NewTitle {
    pub patient_id: Uuid,
    pub budget_id: Option<Uuid>,
    pub installment_number: i32,
    pub total_installments: i32,
    pub due_date: NaiveDate,
    pub amount: Decimal,
}

#[derive(Debug, Clone, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct PaymentReceipt {
    pub success: bool,
    pub payment_id: Uuid,
    pub title_status: TitleStatus,
    #[schema(example = "200.00")]
    pub title_balance: Decimal,
}

// ---
// Regras puras de transição do título
// ---

/// Valida um pagamento contra o título e devolve (novo saldo, novo status).
///
/// Pré-condições na ordem do contrato, cada uma com seu kind de erro:
/// valor > 0 (InvalidAmount); título fora de estado terminal (InvalidState,
/// checado antes do saldo para que pagar um título quitado nunca vire
/// InvalidAmount); valor ≤ saldo (InvalidAmount). Nada aqui toca o banco.
pub fn apply_payment(
    title: &ReceivableTitle,
    amount: Decimal,
) -> Result<(Decimal, TitleStatus), AppError> {
    if amount <= Decimal::ZERO {
        return Err(AppError::InvalidAmount(
            "O valor do pagamento deve ser maior que zero.".into(),
        ));
    }

    if title.status.is_terminal() {
        return Err(AppError::InvalidState(format!(
            "Título não aceita pagamentos no status {:?}.",
            title.status
        )));
    }

    if amount > title.balance {
        return Err(AppError::InvalidAmount(format!(
            "O valor {} excede o saldo devedor {}.",
            amount, title.balance
        )));
    }

    let new_balance = title.balance - amount;
    let new_status = TitleStatus::from_balance(title.amount, new_balance);

    Ok((new_balance, new_status))
}

/// Resolve os campos de cartão de um pagamento: calculadora pura com os
/// defaults da config, e os campos explícitos do chamador por cima quando
/// vierem. Quando o chamador fixa a data de repasse, o prazo persistido é
/// derivado dela (data_repasse − data do pagamento), para que prazo e data
/// gravados nunca se contradigam.
fn card_fields_for(
    input: &RecordPaymentInput,
    paid_at: NaiveDate,
    default_rate: Decimal,
    default_lag: i32,
) -> CardFields {
    let fee_rate = input.taxa_adquirente.unwrap_or(default_rate);
    let settlement = compute_card_settlement(input.amount, fee_rate, default_lag, paid_at);

    let (settlement_date, lag_days) = match input.data_repasse {
        Some(date) => (date, (date - paid_at).num_days() as i32),
        None => (settlement.settlement_date, default_lag),
    };

    CardFields {
        payment_method: input.method,
        acquirer_fee_rate: fee_rate,
        settlement_lag_days: lag_days,
        settlement_date,
        net_value: input.valor_liquido.unwrap_or(settlement.net_value),
        anticipated: input.antecipado.unwrap_or(false),
    }
}

// ---
// Serviço
// ---

#[derive(Clone)]
pub struct PaymentService {
    repo: FinanceRepository,
    audit_repo: AuditRepository,
    commission_service: CommissionService,
    config: FinanceConfig,
}

impl PaymentService {
    pub fn new(
        repo: FinanceRepository,
        audit_repo: AuditRepository,
        commission_service: CommissionService,
        config: FinanceConfig,
    ) -> Self {
        Self {
            repo,
            audit_repo,
            commission_service,
            config,
        }
    }

    // --- TÍTULOS ---

    /// Cria um título (parcela). Quem chama é a superfície de orçamentos,
    /// ao aprovar um plano de tratamento.
    pub async fn create_title(
        &self,
        conn: &mut PgConnection,
        clinic_id: Uuid,
        input: NewTitle,
        actor_id: Uuid,
    ) -> Result<ReceivableTitle, AppError> {
        if input.amount <= Decimal::ZERO {
            return Err(AppError::InvalidAmount(
                "O valor do título deve ser maior que zero.".into(),
            ));
        }

        let mut tx = conn.begin().await?;

        let title = self
            .repo
            .create_title(
                &mut *tx,
                clinic_id,
                input.patient_id,
                input.budget_id,
                input.installment_number,
                input.total_installments,
                input.due_date,
                input.amount,
            )
            .await?;

        self.audit_repo
            .insert(
                &mut *tx,
                clinic_id,
                "receivable_title",
                title.id,
                "created",
                actor_id,
                Some(json!({ "amount": title.amount, "dueDate": title.due_date })),
            )
            .await?;

        tx.commit().await?;
        Ok(title)
    }

    pub async fn list_titles(
        &self,
        conn: &mut PgConnection,
        clinic_id: Uuid,
    ) -> Result<Vec<ReceivableTitle>, AppError> {
        self.repo.list_titles(&mut *conn, clinic_id).await
    }

    /// Cancelamento é transição de status; a linha fica para auditoria.
    pub async fn cancel_title(
        &self,
        conn: &mut PgConnection,
        clinic_id: Uuid,
        title_id: Uuid,
        actor_id: Uuid,
    ) -> Result<ReceivableTitle, AppError> {
        let mut tx = conn.begin().await?;

        let title = self
            .repo
            .get_title_for_update(&mut *tx, clinic_id, title_id)
            .await?
            .ok_or(AppError::NotFound("Título"))?;

        if title.status.is_terminal() {
            return Err(AppError::InvalidState(format!(
                "Título não pode ser cancelado no status {:?}.",
                title.status
            )));
        }

        let rows = self.repo.cancel_title(&mut *tx, clinic_id, title_id).await?;
        if rows == 0 {
            return Err(AppError::ConcurrencyConflict);
        }

        self.audit_repo
            .insert(
                &mut *tx,
                clinic_id,
                "receivable_title",
                title_id,
                "cancelled",
                actor_id,
                Some(json!({ "balanceAtCancellation": title.balance })),
            )
            .await?;

        tx.commit().await?;

        self.repo
            .get_title(&mut *conn, clinic_id, title_id)
            .await?
            .ok_or(AppError::NotFound("Título"))
    }

    // --- PAGAMENTOS ---

    /// Registra um pagamento contra um título, tudo em uma transação:
    /// pagamento, liquidação de cartão, saldo/status do título, linha de
    /// receita no caixa, provisões de comissão (se o título quitou) e
    /// auditoria. Conflito de concorrência é o único erro com retry
    /// automático, limitado e com backoff.
    pub async fn record_payment(
        &self,
        conn: &mut PgConnection,
        clinic_id: Uuid,
        input: RecordPaymentInput,
    ) -> Result<PaymentReceipt, AppError> {
        let max_retries = self.config.payment_max_retries;

        let mut attempt = 0;
        loop {
            match self.try_record_payment(&mut *conn, clinic_id, &input).await {
                Ok(receipt) => return Ok(receipt),
                Err(e) if e.is_retryable() && attempt < max_retries => {
                    attempt += 1;
                    let delay_ms = self.config.payment_retry_base_ms * u64::from(attempt);
                    tracing::warn!(
                        title_id = %input.title_id,
                        attempt,
                        "Conflito de concorrência no pagamento, tentando de novo em {}ms",
                        delay_ms
                    );
                    tokio::time::sleep(std::time::Duration::from_millis(delay_ms)).await;
                }
                Err(e) => return Err(e),
            }
        }
    }

    async fn try_record_payment(
        &self,
        conn: &mut PgConnection,
        clinic_id: Uuid,
        input: &RecordPaymentInput,
    ) -> Result<PaymentReceipt, AppError> {
        let mut tx = conn.begin().await?;

        // 1. Trava a linha do título: pagamentos concorrentes contra o
        //    mesmo título serializam aqui; títulos diferentes seguem em paralelo
        let title = self
            .repo
            .get_title_for_update(&mut *tx, clinic_id, input.title_id)
            .await?
            .ok_or(AppError::NotFound("Título"))?;

        // 2. Pré-condições + transição, tudo puro
        let (new_balance, new_status) = apply_payment(&title, input.amount)?;

        let paid_at = input.paid_at.unwrap_or_else(|| Utc::now().date_naive());

        // 3. Liquidação de cartão
        let card = if input.method.is_card() {
            let (default_rate, default_lag) = match input.method {
                PaymentMethod::CartaoDebito => {
                    (self.config.debit_fee_rate, self.config.debit_settlement_days)
                }
                _ => (self.config.credit_fee_rate, self.config.credit_settlement_days),
            };
            Some(card_fields_for(input, paid_at, default_rate, default_lag))
        } else {
            None
        };

        // 4. Insere o pagamento (imutável)
        let payment = self
            .repo
            .insert_payment(
                &mut *tx,
                clinic_id,
                title.id,
                title.patient_id,
                paid_at,
                input.method,
                input.amount,
                input.cash_account_id,
                input.notes.as_deref(),
                input.created_by,
            )
            .await?;

        // 5. Atualiza o título, guardado pelo saldo lido (compare-and-swap).
        //    Zero linhas = alguém mexeu no saldo: rollback e retry lá em cima
        let rows = self
            .repo
            .update_title_balance(
                &mut *tx,
                clinic_id,
                title.id,
                title.balance,
                new_balance,
                new_status,
                Some(input.method),
                card.as_ref(),
            )
            .await?;
        if rows == 0 {
            return Err(AppError::ConcurrencyConflict);
        }

        // 6. Linha de receita no fluxo de caixa, na mesma transação
        self.repo
            .insert_transaction(
                &mut *tx,
                clinic_id,
                paid_at,
                TransactionKind::Receita,
                input.amount,
                "Recebimentos",
                Some(&format!("payment:{}", payment.id)),
            )
            .await?;

        // 7. Título quitou e tem orçamento? Provisiona comissões
        //    proporcionais, ainda dentro da mesma transação
        if new_status == TitleStatus::Paid {
            if let Some(budget_id) = title.budget_id {
                let items: Vec<BudgetItem> =
                    self.repo.list_budget_items(&mut *tx, clinic_id, budget_id).await?;

                if !items.is_empty() {
                    let mut settled_title = title.clone();
                    settled_title.balance = new_balance;
                    settled_title.status = new_status;
                    if let Some(c) = &card {
                        settled_title.net_value = Some(c.net_value);
                    }

                    self.commission_service
                        .provision_receipt_commissions(
                            &mut *tx,
                            clinic_id,
                            &settled_title,
                            &items,
                            paid_at,
                            input.created_by,
                        )
                        .await?;
                }
            }
        }

        // 8. Auditoria: saldo/status antes e depois
        self.audit_repo
            .insert(
                &mut *tx,
                clinic_id,
                "receivable_title",
                title.id,
                "payment_recorded",
                input.created_by,
                Some(json!({
                    "paymentId": payment.id,
                    "value": input.amount,
                    "balanceBefore": title.balance,
                    "balanceAfter": new_balance,
                    "statusBefore": title.status,
                    "statusAfter": new_status,
                })),
            )
            .await?;

        tx.commit().await?;

        tracing::info!(
            payment_id = %payment.id,
            title_id = %title.id,
            value = %input.amount,
            "Pagamento registrado"
        );

        Ok(PaymentReceipt {
            success: true,
            payment_id: payment.id,
            title_status: new_status,
            title_balance: new_balance,
        })
    }

    /// Estorno: reabre o título e desfaz os efeitos no caixa, preservando
    /// o pagamento original como VOIDED (nunca apagamos nada).
    pub async fn void_payment(
        &self,
        conn: &mut PgConnection,
        clinic_id: Uuid,
        payment_id: Uuid,
        actor_id: Uuid,
    ) -> Result<PaymentReceipt, AppError> {
        let mut tx = conn.begin().await?;

        let payment = self
            .repo
            .get_payment(&mut *tx, clinic_id, payment_id)
            .await?
            .ok_or(AppError::NotFound("Pagamento"))?;

        if payment.status != PaymentStatus::Completed {
            return Err(AppError::InvalidState(
                "Pagamento já foi estornado.".into(),
            ));
        }

        let title = self
            .repo
            .get_title_for_update(&mut *tx, clinic_id, payment.title_id)
            .await?
            .ok_or(AppError::NotFound("Título"))?;

        if title.status == TitleStatus::Cancelled {
            return Err(AppError::InvalidState(
                "Não é possível estornar pagamento de título cancelado.".into(),
            ));
        }

        let rows = self.repo.mark_payment_voided(&mut *tx, clinic_id, payment_id).await?;
        if rows == 0 {
            return Err(AppError::ConcurrencyConflict);
        }

        // O título estava quitado? Então o estorno o reabre, e as provisões
        // de comissão daquele recebimento caem junto, na mesma transação.
        // (Quando o título quitar de novo, o acúmulo dispara de novo: cada
        // transição para PAID acumula, cada saída de PAID estorna.)
        if title.status == TitleStatus::Paid {
            if let Some(budget_id) = title.budget_id {
                let items: Vec<BudgetItem> =
                    self.repo.list_budget_items(&mut *tx, clinic_id, budget_id).await?;

                if !items.is_empty() {
                    self.commission_service
                        .reverse_receipt_commissions(
                            &mut *tx,
                            clinic_id,
                            &title,
                            &items,
                            payment.payment_date,
                            actor_id,
                        )
                        .await?;
                }
            }
        }

        // Conservação do saldo garante que balance + value <= amount
        let new_balance = title.balance + payment.value;
        let new_status = TitleStatus::from_balance(title.amount, new_balance);

        let rows = self
            .repo
            .update_title_balance(
                &mut *tx,
                clinic_id,
                title.id,
                title.balance,
                new_balance,
                new_status,
                None,
                None,
            )
            .await?;
        if rows == 0 {
            return Err(AppError::ConcurrencyConflict);
        }

        // Linha compensatória no caixa
        self.repo
            .insert_transaction(
                &mut *tx,
                clinic_id,
                Utc::now().date_naive(),
                TransactionKind::Despesa,
                payment.value,
                "Estornos",
                Some(&format!("payment:{}", payment.id)),
            )
            .await?;

        self.audit_repo
            .insert(
                &mut *tx,
                clinic_id,
                "receivable_title",
                title.id,
                "payment_voided",
                actor_id,
                Some(json!({
                    "paymentId": payment.id,
                    "value": payment.value,
                    "balanceBefore": title.balance,
                    "balanceAfter": new_balance,
                })),
            )
            .await?;

        tx.commit().await?;

        Ok(PaymentReceipt {
            success: true,
            payment_id,
            title_status: new_status,
            title_balance: new_balance,
        })
    }

    // --- RELATÓRIOS ---

    /// Aging dos títulos em aberto: leitura pura sobre uma consulta read-only.
    pub async fn aging_report(
        &self,
        conn: &mut PgConnection,
        clinic_id: Uuid,
        today: Option<NaiveDate>,
    ) -> Result<AgingSummary, AppError> {
        let titles = self.repo.list_outstanding_titles(&mut *conn, clinic_id).await?;
        let today = today.unwrap_or_else(|| Utc::now().date_naive());
        Ok(aging::classify(today, &titles))
    }

    /// Trilha de auditoria de um título: criação, pagamentos, estornos,
    /// cancelamento, em ordem cronológica.
    pub async fn title_audit_trail(
        &self,
        conn: &mut PgConnection,
        clinic_id: Uuid,
        title_id: Uuid,
    ) -> Result<Vec<crate::models::audit::AuditLog>, AppError> {
        self.audit_repo
            .list_for_entity(&mut *conn, clinic_id, "receivable_title", title_id)
            .await
    }

    pub async fn list_transactions(
        &self,
        conn: &mut PgConnection,
        clinic_id: Uuid,
    ) -> Result<Vec<crate::models::finance::FinancialTransaction>, AppError> {
        self.repo.list_transactions(&mut *conn, clinic_id).await
    }

    // --- ITENS DE ORÇAMENTO (semeados pela superfície externa) ---

    pub async fn create_budget_item(
        &self,
        conn: &mut PgConnection,
        clinic_id: Uuid,
        budget_id: Uuid,
        professional_id: Uuid,
        procedure_id: Uuid,
        valor: Decimal,
    ) -> Result<BudgetItem, AppError> {
        if valor <= Decimal::ZERO {
            return Err(AppError::InvalidAmount(
                "O valor do item deve ser maior que zero.".into(),
            ));
        }

        self.repo
            .insert_budget_item(&mut *conn, clinic_id, budget_id, professional_id, procedure_id, valor)
            .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn dec(s: &str) -> Decimal {
        Decimal::from_str_exact(s).unwrap()
    }

    fn title(amount: &str, balance: &str, status: TitleStatus) -> ReceivableTitle {
        ReceivableTitle {
            id: Uuid::new_v4(),
            title_number: 7,
            clinic_id: Uuid::new_v4(),
            patient_id: Uuid::new_v4(),
            budget_id: None,
            installment_number: 1,
            total_installments: 1,
            due_date: NaiveDate::from_ymd_opt(2025, 6, 1).unwrap(),
            amount: dec(amount),
            balance: dec(balance),
            status,
            payment_method: None,
            acquirer_fee_rate: None,
            settlement_lag_days: None,
            settlement_date: None,
            net_value: None,
            anticipated: false,
            created_at: None,
            updated_at: None,
        }
    }

    #[test]
    fn pagamento_parcial_e_quitacao() {
        let t = title("500.00", "500.00", TitleStatus::Open);

        let (balance, status) = apply_payment(&t, dec("200.00")).unwrap();
        assert_eq!(balance, dec("300.00"));
        assert_eq!(status, TitleStatus::Partial);

        let mut t2 = t.clone();
        t2.balance = balance;
        t2.status = status;

        let (balance, status) = apply_payment(&t2, dec("300.00")).unwrap();
        assert_eq!(balance, Decimal::ZERO);
        assert_eq!(status, TitleStatus::Paid);
    }

    #[test]
    fn conservacao_do_saldo() {
        // amount - balance == soma dos pagamentos aceitos, sempre
        let mut t = title("1000.00", "1000.00", TitleStatus::Open);
        let payments = ["100.00", "250.00", "400.00", "250.00"];
        let mut accepted = Decimal::ZERO;

        for p in payments {
            let (balance, status) = apply_payment(&t, dec(p)).unwrap();
            accepted += dec(p);
            t.balance = balance;
            t.status = status;
            assert_eq!(t.amount - t.balance, accepted);
            assert!(t.balance >= Decimal::ZERO);
        }
        assert_eq!(t.status, TitleStatus::Paid);
    }

    #[test]
    fn valor_acima_do_saldo_rejeitado_sem_efeito() {
        let t = title("500.00", "100.00", TitleStatus::Partial);
        let err = apply_payment(&t, dec("100.01")).unwrap_err();
        assert!(matches!(err, AppError::InvalidAmount(_)));
        // O título original não muda: a função é pura
        assert_eq!(t.balance, dec("100.00"));
        assert_eq!(t.status, TitleStatus::Partial);
    }

    #[test]
    fn valor_zero_ou_negativo_rejeitado() {
        let t = title("500.00", "500.00", TitleStatus::Open);
        assert!(matches!(
            apply_payment(&t, Decimal::ZERO).unwrap_err(),
            AppError::InvalidAmount(_)
        ));
        assert!(matches!(
            apply_payment(&t, dec("-10.00")).unwrap_err(),
            AppError::InvalidAmount(_)
        ));
    }

    #[test]
    fn titulo_terminal_sempre_invalid_state() {
        // Quitado ou cancelado rejeita com InvalidState, nunca InvalidAmount
        let pago = title("500.00", "0.00", TitleStatus::Paid);
        assert!(matches!(
            apply_payment(&pago, dec("50.00")).unwrap_err(),
            AppError::InvalidState(_)
        ));

        let cancelado = title("500.00", "300.00", TitleStatus::Cancelled);
        assert!(matches!(
            apply_payment(&cancelado, dec("50.00")).unwrap_err(),
            AppError::InvalidState(_)
        ));
    }

    #[test]
    fn dois_pagamentos_concorrentes_so_um_passa() {
        // Ambos leem saldo 100 e pedem 60: o primeiro aplica, o segundo
        // revalida contra o saldo novo e falha — nunca fica negativo
        let t = title("100.00", "100.00", TitleStatus::Open);

        let (balance, status) = apply_payment(&t, dec("60.00")).unwrap();
        assert_eq!(balance, dec("40.00"));

        let mut t_after = t.clone();
        t_after.balance = balance;
        t_after.status = status;

        let err = apply_payment(&t_after, dec("60.00")).unwrap_err();
        assert!(matches!(err, AppError::InvalidAmount(_)));
        assert!(t_after.balance >= Decimal::ZERO);
    }

    #[test]
    fn status_nunca_regride() {
        // open -> partial -> paid seguindo o saldo
        let t = title("300.00", "300.00", TitleStatus::Open);
        let (b1, s1) = apply_payment(&t, dec("100.00")).unwrap();
        assert_eq!(s1, TitleStatus::Partial);

        let mut t2 = t.clone();
        t2.balance = b1;
        t2.status = s1;
        let (_, s2) = apply_payment(&t2, dec("200.00")).unwrap();
        assert_eq!(s2, TitleStatus::Paid);
    }

    fn entrada_cartao(amount: &str) -> RecordPaymentInput {
        RecordPaymentInput {
            title_id: Uuid::new_v4(),
            amount: dec(amount),
            paid_at: None,
            method: PaymentMethod::CartaoCredito,
            cash_account_id: None,
            notes: None,
            created_by: Uuid::new_v4(),
            taxa_adquirente: None,
            valor_liquido: None,
            data_repasse: None,
            antecipado: None,
        }
    }

    #[test]
    fn cartao_sem_override_usa_os_defaults() {
        let input = entrada_cartao("1000.00");
        let paid_at = NaiveDate::from_ymd_opt(2025, 6, 1).unwrap();

        let fields = card_fields_for(&input, paid_at, dec("3.5"), 30);

        assert_eq!(fields.acquirer_fee_rate, dec("3.5"));
        assert_eq!(fields.settlement_lag_days, 30);
        assert_eq!(fields.settlement_date, NaiveDate::from_ymd_opt(2025, 7, 1).unwrap());
        assert_eq!(fields.net_value, dec("965.00"));
        assert!(!fields.anticipated);
    }

    #[test]
    fn data_repasse_informada_recalcula_o_prazo() {
        // Quem informa a data de repasse manda nela E no prazo derivado:
        // os dois campos gravados nunca podem discordar entre si
        let mut input = entrada_cartao("1000.00");
        let paid_at = NaiveDate::from_ymd_opt(2025, 6, 1).unwrap();
        let repasse = NaiveDate::from_ymd_opt(2025, 6, 3).unwrap();
        input.data_repasse = Some(repasse);

        let fields = card_fields_for(&input, paid_at, dec("3.5"), 30);

        assert_eq!(fields.settlement_date, repasse);
        assert_eq!(fields.settlement_lag_days, 2);
        assert_eq!(
            fields.settlement_date,
            paid_at + chrono::Duration::days(fields.settlement_lag_days as i64)
        );
    }
}

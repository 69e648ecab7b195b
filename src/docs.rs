// src/docs.rs

use crate::handlers;
use crate::models;
use crate::services;
use utoipa::OpenApi;

#[derive(OpenApi)]
#[openapi(
    paths(
        // --- Finance: Títulos ---
        handlers::finance::create_title,
        handlers::finance::list_titles,
        handlers::finance::cancel_title,
        handlers::finance::title_audit_trail,

        // --- Finance: Pagamentos ---
        handlers::finance::record_payment,
        handlers::finance::void_payment,

        // --- Finance: Relatórios e Caixa ---
        handlers::finance::aging_report,
        handlers::finance::list_transactions,

        // --- Finance: Orçamento ---
        handlers::finance::create_budget_item,

        // --- Commissions: Regras ---
        handlers::commission::create_rule,
        handlers::commission::list_rules,

        // --- Commissions: Provisões ---
        handlers::commission::accrue,
        handlers::commission::list_provisions,
        handlers::commission::approve_provision,
        handlers::commission::pay_provision,
        handlers::commission::cancel_provision,

        // --- Commissions: Adiantamentos ---
        handlers::commission::grant_advance,
        handlers::commission::list_advances,

        // --- Commissions: Remuneração ---
        handlers::commission::upsert_remuneration,
    ),
    components(
        schemas(
            // --- Finance ---
            models::finance::TitleStatus,
            models::finance::PaymentMethod,
            models::finance::PaymentStatus,
            models::finance::TransactionKind,
            models::finance::ReceivableTitle,
            models::finance::Payment,
            models::finance::FinancialTransaction,
            models::finance::BudgetItem,
            models::audit::AuditLog,

            // --- Commissions ---
            models::commission::CalculationType,
            models::commission::CommissionBase,
            models::commission::CommissionTrigger,
            models::commission::ProvisionStatus,
            models::commission::CommissionRule,
            models::commission::CommissionProvision,
            models::commission::CommissionAdvance,
            models::commission::ProfessionalRemuneration,

            // --- Respostas de serviço ---
            services::payment_service::PaymentReceipt,
            services::aging::AgingSummary,

            // --- Payloads ---
            handlers::finance::CreateTitlePayload,
            handlers::finance::CancelTitlePayload,
            handlers::finance::RecordPaymentPayload,
            handlers::finance::VoidPaymentPayload,
            handlers::finance::CreateBudgetItemPayload,
            handlers::commission::CreateRulePayload,
            handlers::commission::AccruePayload,
            handlers::commission::ApproveProvisionPayload,
            handlers::commission::PayProvisionPayload,
            handlers::commission::CancelProvisionPayload,
            handlers::commission::GrantAdvancePayload,
            handlers::commission::UpsertRemunerationPayload,
        )
    ),
    tags(
        (name = "Finance", description = "Contas a Receber, Pagamentos e Fluxo de Caixa"),
        (name = "Commissions", description = "Regras, Provisões e Adiantamentos de Comissão")
    )
)]
pub struct ApiDoc;

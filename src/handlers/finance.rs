// src/handlers/finance.rs

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    response::IntoResponse,
    Json,
};
use chrono::NaiveDate;
use rust_decimal::Decimal;
use serde::Deserialize;
use utoipa::ToSchema;
use uuid::Uuid;
use validator::{Validate, ValidationError};

use crate::{
    common::{db_utils::get_rls_connection, error::AppError},
    config::AppState,
    middleware::tenancy::TenantContext,
    models::finance::PaymentMethod,
    services::payment_service::{NewTitle, RecordPaymentInput},
};

// ---
// Validação customizada
// ---
pub(crate) fn validate_positive(val: &Decimal) -> Result<(), ValidationError> {
    if *val <= Decimal::ZERO {
        let mut err = ValidationError::new("range");
        err.add_param("min".into(), &0.0);
        err.message = Some("O valor deve ser maior que zero.".into());
        return Err(err);
    }
    Ok(())
}

// =============================================================================
//  1. TÍTULOS (Contas a Receber)
// =============================================================================

#[derive(Debug, Deserialize, Validate, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct CreateTitlePayload {
    #[validate(required(message = "O campo 'patientId' é obrigatório."))]
    pub patient_id: Option<Uuid>,

    pub budget_id: Option<Uuid>,

    #[validate(range(min = 1, message = "A parcela começa em 1."))]
    #[schema(example = 2)]
    pub installment_number: i32,

    #[validate(range(min = 1, message = "O total de parcelas começa em 1."))]
    #[schema(example = 6)]
    pub total_installments: i32,

    #[schema(value_type = String, format = Date, example = "2025-07-10")]
    pub due_date: NaiveDate,

    #[validate(custom(function = "validate_positive"))]
    #[schema(example = "500.00")]
    pub amount: Decimal,

    #[validate(required(message = "O campo 'createdBy' é obrigatório."))]
    pub created_by: Option<Uuid>,
}

// POST /api/finance/titles
#[utoipa::path(
    post,
    path = "/api/finance/titles",
    tag = "Finance",
    request_body = CreateTitlePayload,
    responses(
        (status = 201, description = "Título criado", body = crate::models::finance::ReceivableTitle)
    ),
    params(
        ("x-tenant-id" = Uuid, Header, description = "ID da Clínica")
    )
)]
pub async fn create_title(
    State(app_state): State<AppState>,
    tenant: TenantContext,
    Json(payload): Json<CreateTitlePayload>,
) -> Result<impl IntoResponse, AppError> {
    payload.validate().map_err(AppError::ValidationError)?;

    let mut rls_conn = get_rls_connection(&app_state, &tenant).await?;

    let title = app_state
        .payment_service
        .create_title(
            &mut *rls_conn,
            tenant.0,
            NewTitle {
                patient_id: payload.patient_id.unwrap(),
                budget_id: payload.budget_id,
                installment_number: payload.installment_number,
                total_installments: payload.total_installments,
                due_date: payload.due_date,
                amount: payload.amount,
            },
            payload.created_by.unwrap(),
        )
        .await?;

    Ok((StatusCode::CREATED, Json(title)))
}

// GET /api/finance/titles
#[utoipa::path(
    get,
    path = "/api/finance/titles",
    tag = "Finance",
    responses(
        (status = 200, description = "Lista de títulos", body = Vec<crate::models::finance::ReceivableTitle>)
    ),
    params(
        ("x-tenant-id" = Uuid, Header, description = "ID da Clínica")
    )
)]
pub async fn list_titles(
    State(app_state): State<AppState>,
    tenant: TenantContext,
) -> Result<impl IntoResponse, AppError> {
    let mut rls_conn = get_rls_connection(&app_state, &tenant).await?;

    let titles = app_state
        .payment_service
        .list_titles(&mut *rls_conn, tenant.0)
        .await?;

    Ok(Json(titles))
}

#[derive(Debug, Deserialize, Validate, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct CancelTitlePayload {
    #[validate(required(message = "O campo 'actorId' é obrigatório."))]
    pub actor_id: Option<Uuid>,
}

// POST /api/finance/titles/{id}/cancel
#[utoipa::path(
    post,
    path = "/api/finance/titles/{id}/cancel",
    tag = "Finance",
    request_body = CancelTitlePayload,
    responses(
        (status = 200, description = "Título cancelado", body = crate::models::finance::ReceivableTitle),
        (status = 409, description = "Título em estado terminal")
    ),
    params(
        ("id" = Uuid, Path, description = "ID do título"),
        ("x-tenant-id" = Uuid, Header, description = "ID da Clínica")
    )
)]
pub async fn cancel_title(
    State(app_state): State<AppState>,
    tenant: TenantContext,
    Path(title_id): Path<Uuid>,
    Json(payload): Json<CancelTitlePayload>,
) -> Result<impl IntoResponse, AppError> {
    payload.validate().map_err(AppError::ValidationError)?;

    let mut rls_conn = get_rls_connection(&app_state, &tenant).await?;

    let title = app_state
        .payment_service
        .cancel_title(&mut *rls_conn, tenant.0, title_id, payload.actor_id.unwrap())
        .await?;

    Ok(Json(title))
}

// =============================================================================
//  2. PAGAMENTOS
// =============================================================================

#[derive(Debug, Deserialize, Validate, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct RecordPaymentPayload {
    #[validate(custom(function = "validate_positive"))]
    #[schema(example = "200.00")]
    pub value: Decimal,

    #[schema(value_type = Option<String>, format = Date, example = "2025-06-15")]
    pub payment_date: Option<NaiveDate>,

    pub method: PaymentMethod,

    pub cash_account_id: Option<Uuid>,
    pub notes: Option<String>,

    #[validate(required(message = "O campo 'createdBy' é obrigatório."))]
    pub created_by: Option<Uuid>,

    // Campos de cartão: sem eles valem os defaults configurados
    #[schema(example = "3.5")]
    pub taxa_adquirente: Option<Decimal>,
    pub valor_liquido: Option<Decimal>,
    #[schema(value_type = Option<String>, format = Date)]
    pub data_repasse: Option<NaiveDate>,
    pub antecipado: Option<bool>,
}

// POST /api/finance/titles/{id}/payments
#[utoipa::path(
    post,
    path = "/api/finance/titles/{id}/payments",
    tag = "Finance",
    request_body = RecordPaymentPayload,
    responses(
        (status = 201, description = "Pagamento registrado", body = crate::services::payment_service::PaymentReceipt),
        (status = 409, description = "Título em estado terminal ou conflito de concorrência"),
        (status = 422, description = "Valor inválido ou acima do saldo")
    ),
    params(
        ("id" = Uuid, Path, description = "ID do título"),
        ("x-tenant-id" = Uuid, Header, description = "ID da Clínica")
    )
)]
pub async fn record_payment(
    State(app_state): State<AppState>,
    tenant: TenantContext,
    Path(title_id): Path<Uuid>,
    Json(payload): Json<RecordPaymentPayload>,
) -> Result<impl IntoResponse, AppError> {
    payload.validate().map_err(AppError::ValidationError)?;

    let mut rls_conn = get_rls_connection(&app_state, &tenant).await?;

    let receipt = app_state
        .payment_service
        .record_payment(
            &mut *rls_conn,
            tenant.0,
            RecordPaymentInput {
                title_id,
                amount: payload.value,
                paid_at: payload.payment_date,
                method: payload.method,
                cash_account_id: payload.cash_account_id,
                notes: payload.notes,
                created_by: payload.created_by.unwrap(),
                taxa_adquirente: payload.taxa_adquirente,
                valor_liquido: payload.valor_liquido,
                data_repasse: payload.data_repasse,
                antecipado: payload.antecipado,
            },
        )
        .await?;

    Ok((StatusCode::CREATED, Json(receipt)))
}

#[derive(Debug, Deserialize, Validate, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct VoidPaymentPayload {
    #[validate(required(message = "O campo 'actorId' é obrigatório."))]
    pub actor_id: Option<Uuid>,
}

// POST /api/finance/payments/{id}/void
#[utoipa::path(
    post,
    path = "/api/finance/payments/{id}/void",
    tag = "Finance",
    request_body = VoidPaymentPayload,
    responses(
        (status = 200, description = "Pagamento estornado", body = crate::services::payment_service::PaymentReceipt),
        (status = 409, description = "Pagamento já estornado ou título cancelado")
    ),
    params(
        ("id" = Uuid, Path, description = "ID do pagamento"),
        ("x-tenant-id" = Uuid, Header, description = "ID da Clínica")
    )
)]
pub async fn void_payment(
    State(app_state): State<AppState>,
    tenant: TenantContext,
    Path(payment_id): Path<Uuid>,
    Json(payload): Json<VoidPaymentPayload>,
) -> Result<impl IntoResponse, AppError> {
    payload.validate().map_err(AppError::ValidationError)?;

    let mut rls_conn = get_rls_connection(&app_state, &tenant).await?;

    let receipt = app_state
        .payment_service
        .void_payment(&mut *rls_conn, tenant.0, payment_id, payload.actor_id.unwrap())
        .await?;

    Ok(Json(receipt))
}

// =============================================================================
//  3. RELATÓRIOS E CAIXA
// =============================================================================

#[derive(Debug, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct AgingQuery {
    /// Data de referência; default é hoje.
    #[schema(value_type = Option<String>, format = Date)]
    pub as_of: Option<NaiveDate>,
}

// GET /api/finance/reports/aging
#[utoipa::path(
    get,
    path = "/api/finance/reports/aging",
    tag = "Finance",
    responses(
        (status = 200, description = "Aging dos títulos em aberto", body = crate::services::aging::AgingSummary)
    ),
    params(
        ("asOf" = Option<String>, Query, description = "Data de referência (YYYY-MM-DD)"),
        ("x-tenant-id" = Uuid, Header, description = "ID da Clínica")
    )
)]
pub async fn aging_report(
    State(app_state): State<AppState>,
    tenant: TenantContext,
    Query(query): Query<AgingQuery>,
) -> Result<impl IntoResponse, AppError> {
    let mut rls_conn = get_rls_connection(&app_state, &tenant).await?;

    let summary = app_state
        .payment_service
        .aging_report(&mut *rls_conn, tenant.0, query.as_of)
        .await?;

    Ok(Json(summary))
}

// GET /api/finance/titles/{id}/audit
#[utoipa::path(
    get,
    path = "/api/finance/titles/{id}/audit",
    tag = "Finance",
    responses(
        (status = 200, description = "Trilha de auditoria do título", body = Vec<crate::models::audit::AuditLog>)
    ),
    params(
        ("id" = Uuid, Path, description = "ID do título"),
        ("x-tenant-id" = Uuid, Header, description = "ID da Clínica")
    )
)]
pub async fn title_audit_trail(
    State(app_state): State<AppState>,
    tenant: TenantContext,
    Path(title_id): Path<Uuid>,
) -> Result<impl IntoResponse, AppError> {
    let mut rls_conn = get_rls_connection(&app_state, &tenant).await?;

    let entries = app_state
        .payment_service
        .title_audit_trail(&mut *rls_conn, tenant.0, title_id)
        .await?;

    Ok(Json(entries))
}

// GET /api/finance/transactions
#[utoipa::path(
    get,
    path = "/api/finance/transactions",
    tag = "Finance",
    responses(
        (status = 200, description = "Lançamentos do fluxo de caixa", body = Vec<crate::models::finance::FinancialTransaction>)
    ),
    params(
        ("x-tenant-id" = Uuid, Header, description = "ID da Clínica")
    )
)]
pub async fn list_transactions(
    State(app_state): State<AppState>,
    tenant: TenantContext,
) -> Result<impl IntoResponse, AppError> {
    let mut rls_conn = get_rls_connection(&app_state, &tenant).await?;

    let transactions = app_state
        .payment_service
        .list_transactions(&mut *rls_conn, tenant.0)
        .await?;

    Ok(Json(transactions))
}

// =============================================================================
//  4. ITENS DE ORÇAMENTO
// =============================================================================

#[derive(Debug, Deserialize, Validate, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct CreateBudgetItemPayload {
    #[validate(required(message = "O campo 'budgetId' é obrigatório."))]
    pub budget_id: Option<Uuid>,

    #[validate(required(message = "O campo 'professionalId' é obrigatório."))]
    pub professional_id: Option<Uuid>,

    #[validate(required(message = "O campo 'procedureId' é obrigatório."))]
    pub procedure_id: Option<Uuid>,

    #[validate(custom(function = "validate_positive"))]
    #[schema(example = "350.00")]
    pub valor: Decimal,
}

// POST /api/finance/budget-items
#[utoipa::path(
    post,
    path = "/api/finance/budget-items",
    tag = "Finance",
    request_body = CreateBudgetItemPayload,
    responses(
        (status = 201, description = "Item de orçamento criado", body = crate::models::finance::BudgetItem)
    ),
    params(
        ("x-tenant-id" = Uuid, Header, description = "ID da Clínica")
    )
)]
pub async fn create_budget_item(
    State(app_state): State<AppState>,
    tenant: TenantContext,
    Json(payload): Json<CreateBudgetItemPayload>,
) -> Result<impl IntoResponse, AppError> {
    payload.validate().map_err(AppError::ValidationError)?;

    let mut rls_conn = get_rls_connection(&app_state, &tenant).await?;

    let item = app_state
        .payment_service
        .create_budget_item(
            &mut *rls_conn,
            tenant.0,
            payload.budget_id.unwrap(),
            payload.professional_id.unwrap(),
            payload.procedure_id.unwrap(),
            payload.valor,
        )
        .await?;

    Ok((StatusCode::CREATED, Json(item)))
}

// src/handlers/commission.rs

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
use validator::Validate;

use crate::{
    common::{db_utils::get_rls_connection, error::AppError},
    config::AppState,
    handlers::finance::validate_positive,
    middleware::tenancy::TenantContext,
    models::{
        commission::{CalculationType, CommissionBase, CommissionTrigger},
        finance::PaymentMethod,
    },
    services::commission_service::{NewAdvance, NewRule},
};

// =============================================================================
//  1. REGRAS DE COMISSÃO
// =============================================================================

#[derive(Debug, Deserialize, Validate, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct CreateRulePayload {
    /// Escopo: ambos nulos = regra global da clínica
    pub professional_id: Option<Uuid>,
    pub procedure_id: Option<Uuid>,

    pub calculation_type: CalculationType,

    #[schema(example = "30.0")]
    pub percentage: Option<Decimal>,
    pub fixed_amount: Option<Decimal>,

    pub base: CommissionBase,
    pub trigger: CommissionTrigger,

    pub min_guaranteed: Option<Decimal>,
    pub cap: Option<Decimal>,
}

// POST /api/commissions/rules
#[utoipa::path(
    post,
    path = "/api/commissions/rules",
    tag = "Commissions",
    request_body = CreateRulePayload,
    responses(
        (status = 201, description = "Regra criada", body = crate::models::commission::CommissionRule),
        (status = 400, description = "Parâmetros incoerentes com o tipo de cálculo")
    ),
    params(
        ("x-tenant-id" = Uuid, Header, description = "ID da Clínica")
    )
)]
pub async fn create_rule(
    State(app_state): State<AppState>,
    tenant: TenantContext,
    Json(payload): Json<CreateRulePayload>,
) -> Result<impl IntoResponse, AppError> {
    payload.validate().map_err(AppError::ValidationError)?;

    let mut rls_conn = get_rls_connection(&app_state, &tenant).await?;

    let rule = app_state
        .commission_service
        .create_rule(
            &mut *rls_conn,
            tenant.0,
            NewRule {
                professional_id: payload.professional_id,
                procedure_id: payload.procedure_id,
                calculation_type: payload.calculation_type,
                percentage: payload.percentage,
                fixed_amount: payload.fixed_amount,
                base: payload.base,
                trigger_kind: payload.trigger,
                min_guaranteed: payload.min_guaranteed,
                cap: payload.cap,
            },
        )
        .await?;

    Ok((StatusCode::CREATED, Json(rule)))
}

// GET /api/commissions/rules
#[utoipa::path(
    get,
    path = "/api/commissions/rules",
    tag = "Commissions",
    responses(
        (status = 200, description = "Regras da clínica", body = Vec<crate::models::commission::CommissionRule>)
    ),
    params(
        ("x-tenant-id" = Uuid, Header, description = "ID da Clínica")
    )
)]
pub async fn list_rules(
    State(app_state): State<AppState>,
    tenant: TenantContext,
) -> Result<impl IntoResponse, AppError> {
    let mut rls_conn = get_rls_connection(&app_state, &tenant).await?;

    let rules = app_state
        .commission_service
        .list_rules(&mut *rls_conn, tenant.0)
        .await?;

    Ok(Json(rules))
}

// =============================================================================
//  2. PROVISÕES
// =============================================================================

#[derive(Debug, Deserialize, Validate, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct AccruePayload {
    #[validate(required(message = "O campo 'professionalId' é obrigatório."))]
    pub professional_id: Option<Uuid>,

    /// Qualquer data dentro do mês; a competência é normalizada para o dia 1.
    #[schema(value_type = String, format = Date, example = "2025-06-15")]
    pub competencia: NaiveDate,

    #[validate(custom(function = "validate_positive"))]
    #[schema(example = "150.00")]
    pub valor: Decimal,

    #[schema(example = "title:7b0d...")]
    pub reference: Option<String>,

    #[validate(required(message = "O campo 'actorId' é obrigatório."))]
    pub actor_id: Option<Uuid>,
}

// POST /api/commissions/provisions/accrue
#[utoipa::path(
    post,
    path = "/api/commissions/provisions/accrue",
    tag = "Commissions",
    request_body = AccruePayload,
    responses(
        (status = 200, description = "Valor acumulado na provisão do mês", body = crate::models::commission::CommissionProvision),
        (status = 409, description = "Provisão do mês já foi aprovada ou paga")
    ),
    params(
        ("x-tenant-id" = Uuid, Header, description = "ID da Clínica")
    )
)]
pub async fn accrue(
    State(app_state): State<AppState>,
    tenant: TenantContext,
    Json(payload): Json<AccruePayload>,
) -> Result<impl IntoResponse, AppError> {
    payload.validate().map_err(AppError::ValidationError)?;

    let mut rls_conn = get_rls_connection(&app_state, &tenant).await?;

    let provision = app_state
        .commission_service
        .accrue(
            &mut *rls_conn,
            tenant.0,
            payload.professional_id.unwrap(),
            payload.competencia,
            payload.valor,
            payload.reference.as_deref(),
            payload.actor_id.unwrap(),
        )
        .await?;

    Ok(Json(provision))
}

#[derive(Debug, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct ProvisionsQuery {
    /// Filtra por competência (qualquer data dentro do mês).
    #[schema(value_type = Option<String>, format = Date)]
    pub competencia: Option<NaiveDate>,
}

// GET /api/commissions/provisions
#[utoipa::path(
    get,
    path = "/api/commissions/provisions",
    tag = "Commissions",
    responses(
        (status = 200, description = "Provisões da clínica", body = Vec<crate::models::commission::CommissionProvision>)
    ),
    params(
        ("competencia" = Option<String>, Query, description = "Competência (YYYY-MM-DD)"),
        ("x-tenant-id" = Uuid, Header, description = "ID da Clínica")
    )
)]
pub async fn list_provisions(
    State(app_state): State<AppState>,
    tenant: TenantContext,
    Query(query): Query<ProvisionsQuery>,
) -> Result<impl IntoResponse, AppError> {
    let mut rls_conn = get_rls_connection(&app_state, &tenant).await?;

    let provisions = app_state
        .commission_service
        .list_provisions(&mut *rls_conn, tenant.0, query.competencia)
        .await?;

    Ok(Json(provisions))
}

#[derive(Debug, Deserialize, Validate, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct ApproveProvisionPayload {
    #[validate(required(message = "O campo 'approverId' é obrigatório."))]
    pub approver_id: Option<Uuid>,

    pub observacoes: Option<String>,
}

// POST /api/commissions/provisions/{id}/approve
#[utoipa::path(
    post,
    path = "/api/commissions/provisions/{id}/approve",
    tag = "Commissions",
    request_body = ApproveProvisionPayload,
    responses(
        (status = 200, description = "Provisão aprovada, adiantamentos abatidos e retenções calculadas", body = crate::models::commission::CommissionProvision),
        (status = 409, description = "Provisão fora do status PROVISIONADO")
    ),
    params(
        ("id" = Uuid, Path, description = "ID da provisão"),
        ("x-tenant-id" = Uuid, Header, description = "ID da Clínica")
    )
)]
pub async fn approve_provision(
    State(app_state): State<AppState>,
    tenant: TenantContext,
    Path(provision_id): Path<Uuid>,
    Json(payload): Json<ApproveProvisionPayload>,
) -> Result<impl IntoResponse, AppError> {
    payload.validate().map_err(AppError::ValidationError)?;

    let mut rls_conn = get_rls_connection(&app_state, &tenant).await?;

    let provision = app_state
        .commission_service
        .approve(
            &mut *rls_conn,
            tenant.0,
            provision_id,
            payload.approver_id.unwrap(),
            payload.observacoes.as_deref(),
        )
        .await?;

    Ok(Json(provision))
}

#[derive(Debug, Deserialize, Validate, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct PayProvisionPayload {
    #[validate(required(message = "O campo 'actorId' é obrigatório."))]
    pub actor_id: Option<Uuid>,
}

// POST /api/commissions/provisions/{id}/pay
#[utoipa::path(
    post,
    path = "/api/commissions/provisions/{id}/pay",
    tag = "Commissions",
    request_body = PayProvisionPayload,
    responses(
        (status = 200, description = "Provisão paga e despesa lançada no caixa", body = crate::models::commission::CommissionProvision),
        (status = 409, description = "Provisão fora do status APROVADO")
    ),
    params(
        ("id" = Uuid, Path, description = "ID da provisão"),
        ("x-tenant-id" = Uuid, Header, description = "ID da Clínica")
    )
)]
pub async fn pay_provision(
    State(app_state): State<AppState>,
    tenant: TenantContext,
    Path(provision_id): Path<Uuid>,
    Json(payload): Json<PayProvisionPayload>,
) -> Result<impl IntoResponse, AppError> {
    payload.validate().map_err(AppError::ValidationError)?;

    let mut rls_conn = get_rls_connection(&app_state, &tenant).await?;

    let provision = app_state
        .commission_service
        .pay(&mut *rls_conn, tenant.0, provision_id, payload.actor_id.unwrap())
        .await?;

    Ok(Json(provision))
}

#[derive(Debug, Deserialize, Validate, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct CancelProvisionPayload {
    #[validate(required(message = "O campo 'actorId' é obrigatório."))]
    pub actor_id: Option<Uuid>,

    pub motivo: Option<String>,
}

// POST /api/commissions/provisions/{id}/cancel
#[utoipa::path(
    post,
    path = "/api/commissions/provisions/{id}/cancel",
    tag = "Commissions",
    request_body = CancelProvisionPayload,
    responses(
        (status = 200, description = "Provisão cancelada", body = crate::models::commission::CommissionProvision),
        (status = 409, description = "Provisão já paga")
    ),
    params(
        ("id" = Uuid, Path, description = "ID da provisão"),
        ("x-tenant-id" = Uuid, Header, description = "ID da Clínica")
    )
)]
pub async fn cancel_provision(
    State(app_state): State<AppState>,
    tenant: TenantContext,
    Path(provision_id): Path<Uuid>,
    Json(payload): Json<CancelProvisionPayload>,
) -> Result<impl IntoResponse, AppError> {
    payload.validate().map_err(AppError::ValidationError)?;

    let mut rls_conn = get_rls_connection(&app_state, &tenant).await?;

    let provision = app_state
        .commission_service
        .cancel(
            &mut *rls_conn,
            tenant.0,
            provision_id,
            payload.actor_id.unwrap(),
            payload.motivo.as_deref(),
        )
        .await?;

    Ok(Json(provision))
}

// =============================================================================
//  3. ADIANTAMENTOS
// =============================================================================

#[derive(Debug, Deserialize, Validate, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct GrantAdvancePayload {
    #[validate(required(message = "O campo 'professionalId' é obrigatório."))]
    pub professional_id: Option<Uuid>,

    #[validate(custom(function = "validate_positive"))]
    #[schema(example = "500.00")]
    pub valor: Decimal,

    #[schema(value_type = String, format = Date, example = "2025-06-10")]
    pub data_adiantamento: NaiveDate,

    pub forma_pagamento: PaymentMethod,

    #[validate(required(message = "O campo 'concedidoPor' é obrigatório."))]
    pub concedido_por: Option<Uuid>,
}

// POST /api/commissions/advances
#[utoipa::path(
    post,
    path = "/api/commissions/advances",
    tag = "Commissions",
    request_body = GrantAdvancePayload,
    responses(
        (status = 201, description = "Adiantamento concedido e despesa lançada", body = crate::models::commission::CommissionAdvance),
        (status = 422, description = "Profissional sem permissão ou teto excedido")
    ),
    params(
        ("x-tenant-id" = Uuid, Header, description = "ID da Clínica")
    )
)]
pub async fn grant_advance(
    State(app_state): State<AppState>,
    tenant: TenantContext,
    Json(payload): Json<GrantAdvancePayload>,
) -> Result<impl IntoResponse, AppError> {
    payload.validate().map_err(AppError::ValidationError)?;

    let mut rls_conn = get_rls_connection(&app_state, &tenant).await?;

    let advance = app_state
        .commission_service
        .grant_advance(
            &mut *rls_conn,
            tenant.0,
            NewAdvance {
                professional_id: payload.professional_id.unwrap(),
                valor: payload.valor,
                data_adiantamento: payload.data_adiantamento,
                forma_pagamento: payload.forma_pagamento,
            },
            payload.concedido_por.unwrap(),
        )
        .await?;

    Ok((StatusCode::CREATED, Json(advance)))
}

// GET /api/commissions/advances/{professionalId}
#[utoipa::path(
    get,
    path = "/api/commissions/advances/{professionalId}",
    tag = "Commissions",
    responses(
        (status = 200, description = "Adiantamentos do profissional", body = Vec<crate::models::commission::CommissionAdvance>)
    ),
    params(
        ("professionalId" = Uuid, Path, description = "ID do profissional"),
        ("x-tenant-id" = Uuid, Header, description = "ID da Clínica")
    )
)]
pub async fn list_advances(
    State(app_state): State<AppState>,
    tenant: TenantContext,
    Path(professional_id): Path<Uuid>,
) -> Result<impl IntoResponse, AppError> {
    let mut rls_conn = get_rls_connection(&app_state, &tenant).await?;

    let advances = app_state
        .commission_service
        .list_advances(&mut *rls_conn, tenant.0, professional_id)
        .await?;

    Ok(Json(advances))
}

// =============================================================================
//  4. REMUNERAÇÃO DO PROFISSIONAL
// =============================================================================

#[derive(Debug, Deserialize, Validate, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct UpsertRemunerationPayload {
    #[validate(required(message = "O campo 'professionalId' é obrigatório."))]
    pub professional_id: Option<Uuid>,

    pub adiantamento_permitido: bool,

    #[schema(example = "2000.00")]
    pub limite_adiantamento: Decimal,
}

// PUT /api/commissions/remuneration
#[utoipa::path(
    put,
    path = "/api/commissions/remuneration",
    tag = "Commissions",
    request_body = UpsertRemunerationPayload,
    responses(
        (status = 200, description = "Configuração de remuneração gravada", body = crate::models::commission::ProfessionalRemuneration)
    ),
    params(
        ("x-tenant-id" = Uuid, Header, description = "ID da Clínica")
    )
)]
pub async fn upsert_remuneration(
    State(app_state): State<AppState>,
    tenant: TenantContext,
    Json(payload): Json<UpsertRemunerationPayload>,
) -> Result<impl IntoResponse, AppError> {
    payload.validate().map_err(AppError::ValidationError)?;

    if payload.limite_adiantamento.is_sign_negative() {
        return Err(AppError::InvalidAmount(
            "O limite de adiantamento não pode ser negativo.".into(),
        ));
    }

    let mut rls_conn = get_rls_connection(&app_state, &tenant).await?;

    let remuneration = app_state
        .commission_service
        .upsert_remuneration(
            &mut *rls_conn,
            tenant.0,
            payload.professional_id.unwrap(),
            payload.adiantamento_permitido,
            payload.limite_adiantamento,
        )
        .await?;

    Ok(Json(remuneration))
}

// src/config.rs

use crate::{
    db::{AuditRepository, CommissionRepository, FinanceRepository},
    services::{commission_service::CommissionService, payment_service::PaymentService},
};
use rust_decimal::Decimal;
use sqlx::{postgres::PgPoolOptions, PgPool};
use std::{env, time::Duration};

/// Parâmetros financeiros da instalação. Tudo tem default razoável e
/// pode ser sobrescrito por variável de ambiente.
#[derive(Debug, Clone)]
pub struct FinanceConfig {
    // Retenções sobre comissões (percentuais). Zero por default: quem
    // opera a clínica configura conforme o enquadramento fiscal.
    pub inss_percent: Decimal,
    pub iss_percent: Decimal,
    pub irrf_percent: Decimal,

    // Defaults de adquirente quando o pagamento não informa a taxa
    pub debit_fee_rate: Decimal,
    pub debit_settlement_days: i32,
    pub credit_fee_rate: Decimal,
    pub credit_settlement_days: i32,

    // Retry de pagamento em conflito de concorrência
    pub payment_max_retries: u32,
    pub payment_retry_base_ms: u64,
}

impl Default for FinanceConfig {
    fn default() -> Self {
        Self {
            inss_percent: Decimal::ZERO,
            iss_percent: Decimal::ZERO,
            irrf_percent: Decimal::ZERO,
            debit_fee_rate: Decimal::new(15, 1),  // 1.5%
            debit_settlement_days: 1,             // D+1
            credit_fee_rate: Decimal::new(35, 1), // 3.5%
            credit_settlement_days: 30,           // D+30
            payment_max_retries: 3,
            payment_retry_base_ms: 50,
        }
    }
}

impl FinanceConfig {
    pub fn from_env() -> Self {
        let mut config = Self::default();

        if let Some(v) = env_decimal("FINANCE_INSS_PERCENT") {
            config.inss_percent = v;
        }
        if let Some(v) = env_decimal("FINANCE_ISS_PERCENT") {
            config.iss_percent = v;
        }
        if let Some(v) = env_decimal("FINANCE_IRRF_PERCENT") {
            config.irrf_percent = v;
        }
        if let Some(v) = env_decimal("FINANCE_DEBIT_FEE_RATE") {
            config.debit_fee_rate = v;
        }
        if let Some(v) = env_parse("FINANCE_DEBIT_SETTLEMENT_DAYS") {
            config.debit_settlement_days = v;
        }
        if let Some(v) = env_decimal("FINANCE_CREDIT_FEE_RATE") {
            config.credit_fee_rate = v;
        }
        if let Some(v) = env_parse("FINANCE_CREDIT_SETTLEMENT_DAYS") {
            config.credit_settlement_days = v;
        }
        if let Some(v) = env_parse("FINANCE_PAYMENT_MAX_RETRIES") {
            config.payment_max_retries = v;
        }
        if let Some(v) = env_parse("FINANCE_PAYMENT_RETRY_BASE_MS") {
            config.payment_retry_base_ms = v;
        }

        config
    }
}

fn env_decimal(key: &str) -> Option<Decimal> {
    env::var(key).ok().and_then(|v| v.parse().ok())
}

fn env_parse<T: std::str::FromStr>(key: &str) -> Option<T> {
    env::var(key).ok().and_then(|v| v.parse().ok())
}

#[derive(Clone)]
pub struct AppState {
    pub db_pool: PgPool,
    pub config: FinanceConfig,
    pub payment_service: PaymentService,
    pub commission_service: CommissionService,
}

impl AppState {
    pub async fn new() -> anyhow::Result<Self> {
        dotenvy::dotenv().ok();

        let database_url = env::var("DATABASE_URL").expect("DATABASE_URL deve ser definida");

        let db_pool = PgPoolOptions::new()
            .max_connections(5)
            .acquire_timeout(Duration::from_secs(3))
            .connect(&database_url)
            .await?;

        tracing::info!("✅ Conexão com o banco de dados estabelecida com sucesso!");

        let config = FinanceConfig::from_env();

        // --- Monta o gráfico de dependências ---
        let finance_repo = FinanceRepository::new(db_pool.clone());
        let commission_repo = CommissionRepository::new(db_pool.clone());
        let audit_repo = AuditRepository::new(db_pool.clone());

        let commission_service = CommissionService::new(
            commission_repo,
            finance_repo.clone(),
            audit_repo.clone(),
            config.clone(),
        );
        let payment_service = PaymentService::new(
            finance_repo,
            audit_repo,
            commission_service.clone(),
            config.clone(),
        );

        Ok(Self {
            db_pool,
            config,
            payment_service,
            commission_service,
        })
    }
}

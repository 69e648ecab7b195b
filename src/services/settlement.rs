// src/services/settlement.rs

use chrono::{Days, NaiveDate};
use rust_decimal::{Decimal, RoundingStrategy};
use serde::Serialize;
use utoipa::ToSchema;

/// Casas decimais da moeda (centavos).
const MINOR_UNIT_DP: u32 = 2;

/// Resultado da liquidação de uma transação de cartão.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct CardSettlement {
    #[schema(example = "35.00")]
    pub fee_value: Decimal,
    #[schema(example = "965.00")]
    pub net_value: Decimal,
    #[schema(value_type = String, format = Date, example = "2024-02-09")]
    pub settlement_date: NaiveDate,
}

/// Calcula taxa da adquirente, valor líquido e data de repasse.
///
/// Função pura e livre de política: os defaults (débito ~1.5%/D+1,
/// crédito ~3.5%/D+30) moram na configuração e são aplicados pelo
/// chamador, nunca aqui. Arredondamento half-even (bancário) para o
/// centavo.
pub fn compute_card_settlement(
    gross_amount: Decimal,
    fee_rate_percent: Decimal,
    settlement_lag_days: i32,
    paid_at: NaiveDate,
) -> CardSettlement {
    let fee_value = (gross_amount * fee_rate_percent / Decimal::ONE_HUNDRED)
        .round_dp_with_strategy(MINOR_UNIT_DP, RoundingStrategy::MidpointNearestEven);

    let net_value = gross_amount - fee_value;

    // Dias corridos, não úteis
    let settlement_date = paid_at
        .checked_add_days(Days::new(settlement_lag_days.max(0) as u64))
        .unwrap_or(paid_at);

    CardSettlement {
        fee_value,
        net_value,
        settlement_date,
    }
}

/// Arredonda um valor monetário para o centavo, half-even.
pub fn round_money(value: Decimal) -> Decimal {
    value.round_dp_with_strategy(MINOR_UNIT_DP, RoundingStrategy::MidpointNearestEven)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn dec(s: &str) -> Decimal {
        Decimal::from_str_exact(s).unwrap()
    }

    fn date(s: &str) -> NaiveDate {
        NaiveDate::parse_from_str(s, "%Y-%m-%d").unwrap()
    }

    #[test]
    fn credito_padrao_d30() {
        // 1000.00 a 3.5% com D+30
        let s = compute_card_settlement(dec("1000.00"), dec("3.5"), 30, date("2024-01-10"));
        assert_eq!(s.fee_value, dec("35.00"));
        assert_eq!(s.net_value, dec("965.00"));
        assert_eq!(s.settlement_date, date("2024-02-09"));
    }

    #[test]
    fn debito_padrao_d1() {
        let s = compute_card_settlement(dec("200.00"), dec("1.5"), 1, date("2025-06-30"));
        assert_eq!(s.fee_value, dec("3.00"));
        assert_eq!(s.net_value, dec("197.00"));
        // Vira o mês em dias corridos
        assert_eq!(s.settlement_date, date("2025-07-01"));
    }

    #[test]
    fn arredondamento_half_even() {
        // 12.50 a 1% = 0.125 -> 0.12 (par); 13.50 a 1% = 0.135 -> 0.14 (par)
        let a = compute_card_settlement(dec("12.50"), dec("1.0"), 0, date("2025-01-01"));
        assert_eq!(a.fee_value, dec("0.12"));
        assert_eq!(a.net_value, dec("12.38"));

        let b = compute_card_settlement(dec("13.50"), dec("1.0"), 0, date("2025-01-01"));
        assert_eq!(b.fee_value, dec("0.14"));
        assert_eq!(b.net_value, dec("13.36"));
    }

    #[test]
    fn determinismo() {
        let x = compute_card_settlement(dec("357.89"), dec("2.75"), 14, date("2024-03-01"));
        let y = compute_card_settlement(dec("357.89"), dec("2.75"), 14, date("2024-03-01"));
        assert_eq!(x, y);
    }
}

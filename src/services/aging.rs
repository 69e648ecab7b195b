// src/services/aging.rs

use chrono::NaiveDate;
use rust_decimal::Decimal;
use serde::Serialize;
use utoipa::ToSchema;

use crate::models::finance::ReceivableTitle;

/// Saldos em aberto agrupados por faixa de atraso (dias corridos).
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct AgingSummary {
    #[schema(example = "1200.00")]
    pub not_due: Decimal,
    #[schema(example = "350.00")]
    pub overdue_1_30: Decimal,
    #[schema(example = "80.00")]
    pub overdue_31_60: Decimal,
    #[schema(example = "40.00")]
    pub overdue_60_plus: Decimal,
    #[schema(example = "1670.00")]
    pub total: Decimal,
}

/// Classifica títulos em aberto por dias de atraso, somando o SALDO
/// (não o valor original) em cada faixa. Títulos quitados ou cancelados
/// ficam de fora. Função pura: quem decide o "hoje" é o chamador.
pub fn classify(today: NaiveDate, titles: &[ReceivableTitle]) -> AgingSummary {
    let mut summary = AgingSummary::default();

    for title in titles {
        if title.status.is_terminal() {
            continue;
        }

        let days = (today - title.due_date).num_days();

        let bucket = if days < 0 {
            &mut summary.not_due
        } else if days <= 30 {
            &mut summary.overdue_1_30
        } else if days <= 60 {
            &mut summary.overdue_31_60
        } else {
            &mut summary.overdue_60_plus
        };

        *bucket += title.balance;
        summary.total += title.balance;
    }

    summary
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::finance::TitleStatus;
    use chrono::Days;
    use uuid::Uuid;

    fn dec(s: &str) -> Decimal {
        Decimal::from_str_exact(s).unwrap()
    }

    fn today() -> NaiveDate {
        NaiveDate::from_ymd_opt(2025, 6, 15).unwrap()
    }

    fn title(due: NaiveDate, balance: &str, status: TitleStatus) -> ReceivableTitle {
        ReceivableTitle {
            id: Uuid::new_v4(),
            title_number: 1,
            clinic_id: Uuid::new_v4(),
            patient_id: Uuid::new_v4(),
            budget_id: None,
            installment_number: 1,
            total_installments: 1,
            due_date: due,
            amount: dec("1000.00"),
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
    fn fronteiras_das_faixas() {
        let d = today();
        // Vencido há exatamente 30 dias -> faixa 1-30; há 31 -> faixa 31-60
        let t30 = title(d.checked_sub_days(Days::new(30)).unwrap(), "100.00", TitleStatus::Open);
        let t31 = title(d.checked_sub_days(Days::new(31)).unwrap(), "200.00", TitleStatus::Open);
        let t60 = title(d.checked_sub_days(Days::new(60)).unwrap(), "300.00", TitleStatus::Open);
        let t61 = title(d.checked_sub_days(Days::new(61)).unwrap(), "400.00", TitleStatus::Open);

        let summary = classify(d, &[t30, t31, t60, t61]);
        assert_eq!(summary.overdue_1_30, dec("100.00"));
        assert_eq!(summary.overdue_31_60, dec("500.00"));
        assert_eq!(summary.overdue_60_plus, dec("400.00"));
        assert_eq!(summary.total, dec("1000.00"));
    }

    #[test]
    fn vence_hoje_conta_como_atrasado_1_30() {
        let d = today();
        let t = title(d, "50.00", TitleStatus::Open);
        let summary = classify(d, &[t]);
        assert_eq!(summary.overdue_1_30, dec("50.00"));
        assert_eq!(summary.not_due, Decimal::ZERO);
    }

    #[test]
    fn a_vencer() {
        let d = today();
        let t = title(d.checked_add_days(Days::new(1)).unwrap(), "75.00", TitleStatus::Partial);
        let summary = classify(d, &[t]);
        assert_eq!(summary.not_due, dec("75.00"));
        assert_eq!(summary.total, dec("75.00"));
    }

    #[test]
    fn ignora_quitados_e_cancelados() {
        let d = today();
        let pago = title(d.checked_sub_days(Days::new(10)).unwrap(), "0.00", TitleStatus::Paid);
        let cancelado = title(d.checked_sub_days(Days::new(10)).unwrap(), "500.00", TitleStatus::Cancelled);
        let aberto = title(d.checked_sub_days(Days::new(10)).unwrap(), "120.00", TitleStatus::Partial);

        let summary = classify(d, &[pago, cancelado, aberto]);
        // Soma o saldo, não o valor original
        assert_eq!(summary.overdue_1_30, dec("120.00"));
        assert_eq!(summary.total, dec("120.00"));
    }
}

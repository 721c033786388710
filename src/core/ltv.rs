use super::types::{LoanPosition, LtvReport, LtvSnapshot, MarginCallRung, PriceShockRow, RiskLevel};

/// Fixed early-warning band. Independent of the position's liquidation threshold.
pub const DANGER_LTV_PCT: f64 = 60.0;
pub const CAUTION_LTV_PCT: f64 = 40.0;
/// Distance from the danger band, in LTV points, that marks a shock row as near danger.
pub const NEAR_DANGER_BAND_PCT: f64 = 2.0;
pub const PRICE_SHOCKS_PCT: [f64; 7] = [-50.0, -30.0, -15.0, 0.0, 15.0, 30.0, 50.0];
pub const MARGIN_CALL_LTVS_PCT: [f64; 2] = [70.0, 80.0];

pub fn ltv_ratio_pct(loan_amount: f64, collateral_btc: f64, price: f64) -> f64 {
    (loan_amount / (collateral_btc * price)) * 100.0
}

/// LTV for positions that may carry no debt or no collateral. No debt is 0%
/// whatever backs it; debt with no collateral value behind it is `None`.
pub fn checked_ltv_ratio_pct(loan_amount: f64, collateral_btc: f64, price: f64) -> Option<f64> {
    if loan_amount <= 0.0 {
        return Some(0.0);
    }
    let collateral_value = collateral_btc * price;
    (collateral_value > 0.0).then(|| loan_amount / collateral_value * 100.0)
}

/// Price at which the position's LTV equals `ltv_pct`.
pub fn price_for_ltv(loan_amount: f64, collateral_btc: f64, ltv_pct: f64) -> f64 {
    (loan_amount / collateral_btc) / (ltv_pct / 100.0)
}

pub fn classify(ltv_pct: f64) -> RiskLevel {
    if ltv_pct < CAUTION_LTV_PCT {
        RiskLevel::Safe
    } else if ltv_pct <= DANGER_LTV_PCT {
        RiskLevel::Caution
    } else {
        RiskLevel::Danger
    }
}

pub fn evaluate(position: &LoanPosition) -> LtvSnapshot {
    let collateral_value = position.collateral_btc * position.price;
    let ltv_ratio_pct = ltv_ratio_pct(
        position.loan_amount,
        position.collateral_btc,
        position.price,
    );
    let liquidation_price = price_for_ltv(
        position.loan_amount,
        position.collateral_btc,
        position.liquidation_threshold_pct,
    );

    LtvSnapshot {
        collateral_btc: position.collateral_btc,
        price: position.price,
        loan_amount: position.loan_amount,
        liquidation_threshold_pct: position.liquidation_threshold_pct,
        collateral_value,
        ltv_ratio_pct,
        liquidation_price,
        liquidation_buffer_pct: (1.0 - liquidation_price / position.price) * 100.0,
        risk_level: classify(ltv_ratio_pct),
    }
}

/// Price at which LTV first reaches the danger band.
pub fn danger_price(position: &LoanPosition) -> f64 {
    price_for_ltv(position.loan_amount, position.collateral_btc, DANGER_LTV_PCT)
}

pub fn price_shock_table(position: &LoanPosition) -> Vec<PriceShockRow> {
    PRICE_SHOCKS_PCT
        .iter()
        .map(|&change_pct| {
            let price = position.price * (1.0 + change_pct / 100.0);
            let ltv_pct = ltv_ratio_pct(position.loan_amount, position.collateral_btc, price);
            PriceShockRow {
                change_pct,
                price,
                collateral_value: position.collateral_btc * price,
                ltv_pct,
                risk_level: classify(ltv_pct),
                near_danger: (ltv_pct - DANGER_LTV_PCT).abs() <= NEAR_DANGER_BAND_PCT,
                beyond_liquidation: ltv_pct >= position.liquidation_threshold_pct,
            }
        })
        .collect()
}

/// Trigger prices for 70%, 80% and the liquidation threshold, with the top-up
/// needed at each trigger to bring LTV back to today's level.
pub fn margin_call_ladder(position: &LoanPosition) -> Vec<MarginCallRung> {
    let original_ltv =
        ltv_ratio_pct(position.loan_amount, position.collateral_btc, position.price) / 100.0;

    MARGIN_CALL_LTVS_PCT
        .iter()
        .copied()
        .chain(std::iter::once(position.liquidation_threshold_pct))
        .map(|ltv_pct| {
            let trigger_price = price_for_ltv(position.loan_amount, position.collateral_btc, ltv_pct);
            let collateral_value_at_trigger = position.collateral_btc * trigger_price;
            let required_additional_value =
                (position.loan_amount / original_ltv - collateral_value_at_trigger).max(0.0);
            MarginCallRung {
                ltv_pct,
                trigger_price,
                collateral_value_at_trigger,
                required_additional_value,
                required_additional_btc: required_additional_value / trigger_price,
            }
        })
        .collect()
}

pub fn analyze(position: &LoanPosition) -> LtvReport {
    LtvReport {
        snapshot: evaluate(position),
        danger_price: danger_price(position),
        price_shocks: price_shock_table(position),
        margin_calls: margin_call_ladder(position),
    }
}

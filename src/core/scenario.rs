use tracing::debug;

use super::error::PlanError;
use super::types::{ScenarioName, ScenarioOverrides, ScenarioParameters};

const CONSERVATIVE: ScenarioParameters = ScenarioParameters {
    growth_rate_pct: 20.0,
    volatility_pct: 40.0,
    inflation_pct: 3.0,
    withdrawal_rate_pct: 3.5,
    loan_interest_rate_pct: 6.0,
    post_retirement_growth_pct: 8.0,
    target_annual_ltv_pct: 15.0,
};

const MODERATE: ScenarioParameters = ScenarioParameters {
    growth_rate_pct: 45.0,
    volatility_pct: 70.0,
    inflation_pct: 4.0,
    withdrawal_rate_pct: 4.0,
    loan_interest_rate_pct: 8.0,
    post_retirement_growth_pct: 12.0,
    target_annual_ltv_pct: 25.0,
};

const OPTIMISTIC: ScenarioParameters = ScenarioParameters {
    growth_rate_pct: 70.0,
    volatility_pct: 90.0,
    inflation_pct: 3.0,
    withdrawal_rate_pct: 5.0,
    loan_interest_rate_pct: 10.0,
    post_retirement_growth_pct: 20.0,
    target_annual_ltv_pct: 35.0,
};

/// Resolves a scenario name to its parameter set.
///
/// Presets ignore `overrides`. The custom scenario takes every field from
/// `overrides` and fails on the first missing one instead of borrowing a preset value.
pub fn resolve(
    name: ScenarioName,
    overrides: Option<&ScenarioOverrides>,
) -> Result<ScenarioParameters, PlanError> {
    match name {
        ScenarioName::Conservative => Ok(CONSERVATIVE),
        ScenarioName::Moderate => Ok(MODERATE),
        ScenarioName::Optimistic => Ok(OPTIMISTIC),
        ScenarioName::Custom => {
            let Some(o) = overrides else {
                return Err(PlanError::MissingOverride { field: "overrides" });
            };
            let params = ScenarioParameters {
                growth_rate_pct: required(o.growth_rate_pct, "growthRatePct")?,
                volatility_pct: required(o.volatility_pct, "volatilityPct")?,
                inflation_pct: required(o.inflation_pct, "inflationPct")?,
                withdrawal_rate_pct: required(o.withdrawal_rate_pct, "withdrawalRatePct")?,
                loan_interest_rate_pct: required(
                    o.loan_interest_rate_pct,
                    "loanInterestRatePct",
                )?,
                post_retirement_growth_pct: required(
                    o.post_retirement_growth_pct,
                    "postRetirementGrowthPct",
                )?,
                target_annual_ltv_pct: required(o.target_annual_ltv_pct, "targetAnnualLtvPct")?,
            };
            check_ranges(&params)?;
            debug!(?params, "resolved custom scenario");
            Ok(params)
        }
    }
}

pub fn presets() -> [(ScenarioName, ScenarioParameters); 3] {
    [
        (ScenarioName::Conservative, CONSERVATIVE),
        (ScenarioName::Moderate, MODERATE),
        (ScenarioName::Optimistic, OPTIMISTIC),
    ]
}

fn required(value: Option<f64>, field: &'static str) -> Result<f64, PlanError> {
    match value {
        Some(v) if v.is_finite() => Ok(v),
        Some(_) => Err(PlanError::InvalidInput {
            field: field.to_string(),
            reason: "must be a finite number".to_string(),
        }),
        None => Err(PlanError::MissingOverride { field }),
    }
}

/// Rates at or below -100% wipe out the compounding base; the rest are
/// non-negative by construction.
fn check_ranges(params: &ScenarioParameters) -> Result<(), PlanError> {
    if params.growth_rate_pct <= -100.0 {
        return Err(PlanError::invalid("growthRatePct", "must be > -100"));
    }
    if params.post_retirement_growth_pct <= -100.0 {
        return Err(PlanError::invalid("postRetirementGrowthPct", "must be > -100"));
    }
    if params.inflation_pct <= -100.0 {
        return Err(PlanError::invalid("inflationPct", "must be > -100"));
    }
    let non_negative = [
        (params.volatility_pct, "volatilityPct"),
        (params.withdrawal_rate_pct, "withdrawalRatePct"),
        (params.loan_interest_rate_pct, "loanInterestRatePct"),
    ];
    for (value, field) in non_negative {
        if value < 0.0 {
            return Err(PlanError::invalid(field, "must be >= 0"));
        }
    }
    if !(0.0..=100.0).contains(&params.target_annual_ltv_pct) {
        return Err(PlanError::invalid(
            "targetAnnualLtvPct",
            "must be between 0 and 100",
        ));
    }
    Ok(())
}

use serde::Serialize;
use tracing::info;

use super::accumulation::{self, Randomness, monthly_rate};
use super::error::PlanError;
use super::ltv;
use super::metrics::{self, required_monthly_contribution};
use super::retirement::{self, BORROW_LIQUIDATION_LTV_PCT, required_starting_portfolio};
use super::scenario;
use super::types::{
    AccumulationInputs, AccumulationResult, GoalDraft, Holdings, LoanPosition, LtvReport,
    ProjectionMetrics, RetirementInputs, RetirementResult, RetirementStrategy, ScenarioName,
    ScenarioOverrides, ScenarioParameters, SummaryRequest, YearLedger,
};

#[derive(Debug, Clone)]
pub struct PlanRequest {
    pub goal_name: String,
    pub scenario_name: ScenarioName,
    pub overrides: Option<ScenarioOverrides>,
    pub accumulation: AccumulationInputs,
    pub retirement_years: u32,
    pub desired_annual_income: f64,
    pub strategy: RetirementStrategy,
    pub randomness: Randomness,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PlanResult {
    pub scenario_name: ScenarioName,
    pub scenario: ScenarioParameters,
    pub starting_capital: f64,
    pub accumulation: AccumulationResult,
    pub accumulation_metrics: ProjectionMetrics,
    pub retirement: RetirementResult,
    pub required_portfolio: Option<f64>,
    /// Accumulated value minus the required portfolio; negative is a shortfall.
    pub portfolio_gap: Option<f64>,
    pub required_monthly_contribution: Option<f64>,
    /// First borrow year whose LTV exceeds the scenario's target annual LTV.
    pub first_year_above_target_ltv: Option<u32>,
    /// Risk report for the first year of borrowing.
    pub borrow_position: Option<LtvReport>,
    pub goal: GoalDraft,
    pub summary_request: SummaryRequest,
}

/// Runs the full pipeline: scenario, accumulation, retirement, then derived metrics.
pub fn run_plan(request: &PlanRequest) -> Result<PlanResult, PlanError> {
    let params = scenario::resolve(request.scenario_name, request.overrides.as_ref())?;
    let inputs = &request.accumulation;

    let mut rng = request.randomness.into_rng();
    let accumulation = accumulation::simulate(inputs, &params, &mut rng);

    let starting_capital = match inputs.holdings {
        Holdings::Dollars(amount) => amount,
        Holdings::Bitcoin(units) => units * inputs.starting_price,
    };
    let accumulation_metrics = metrics::summarize(&accumulation.series, starting_capital);

    let retirement_inputs = retirement_handoff(
        &accumulation,
        request.retirement_years,
        request.desired_annual_income,
        request.strategy,
    );
    let retirement = retirement::simulate(&retirement_inputs, &params);

    let required_portfolio = required_starting_portfolio(request.desired_annual_income, &params);
    let portfolio_gap = required_portfolio.map(|required| accumulation.final_value - required);
    let total_months = inputs.years * 12;
    let required_contribution = required_portfolio.and_then(|required| {
        required_monthly_contribution(
            required,
            starting_capital,
            monthly_rate(params.growth_rate()),
            total_months,
        )
    });

    let first_year_above_target_ltv = retirement.series.iter().find_map(|state| match state.ledger {
        YearLedger::Borrow { ltv_pct, .. }
            if ltv_pct.is_none_or(|ltv| ltv > params.target_annual_ltv_pct) =>
        {
            Some(state.year)
        }
        _ => None,
    });
    let borrow_position = first_borrow_position(&retirement).map(|p| ltv::analyze(&p));

    let goal = GoalDraft {
        goal_name: request.goal_name.clone(),
        target_amount: required_portfolio.unwrap_or(accumulation.final_value),
        monthly_contribution: inputs.monthly_contribution,
        total_months,
        strategy: request.strategy,
    };
    let summary_request = SummaryRequest {
        goal_name: request.goal_name.clone(),
        time_horizon: inputs.years,
        final_value: accumulation.final_value,
        monthly_contribution: inputs.monthly_contribution,
        starting_capital,
        growth_scenario: request.scenario_name,
    };

    info!(
        goal = %request.goal_name,
        scenario = %request.scenario_name,
        final_value = accumulation.final_value,
        viable = retirement.viable,
        "plan computed"
    );

    Ok(PlanResult {
        scenario_name: request.scenario_name,
        scenario: params,
        starting_capital,
        accumulation,
        accumulation_metrics,
        retirement,
        required_portfolio,
        portfolio_gap,
        required_monthly_contribution: required_contribution,
        first_year_above_target_ltv,
        borrow_position,
        goal,
        summary_request,
    })
}

/// Retirement starts from the accumulated BTC (dollar balances are converted at
/// the final price) and the final projected price.
pub fn retirement_handoff(
    accumulation: &AccumulationResult,
    retirement_years: u32,
    desired_annual_income: f64,
    strategy: RetirementStrategy,
) -> RetirementInputs {
    let starting_btc = accumulation
        .final_holdings
        .unwrap_or(accumulation.final_value / accumulation.final_price);
    RetirementInputs {
        starting_btc,
        starting_price: accumulation.final_price,
        retirement_years,
        desired_annual_income,
        strategy,
    }
}

fn first_borrow_position(retirement: &RetirementResult) -> Option<LoanPosition> {
    if retirement.strategy != RetirementStrategy::Borrow {
        return None;
    }
    let year = retirement.series.get(1)?;
    if year.loan_principal <= 0.0 || year.btc_holdings <= 0.0 {
        return None;
    }
    Some(LoanPosition {
        collateral_btc: year.btc_holdings,
        price: year.price,
        loan_amount: year.loan_principal,
        liquidation_threshold_pct: BORROW_LIQUIDATION_LTV_PCT,
    })
}

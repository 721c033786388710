use tracing::debug;

use super::ltv::checked_ltv_ratio_pct;
use super::types::{
    RetirementInputs, RetirementPhase, RetirementResult, RetirementState, RetirementStrategy,
    ScenarioParameters, YearLedger,
};

/// LTV above which a borrow-strategy year is flagged as liquidation risk.
pub const BORROW_LIQUIDATION_LTV_PCT: f64 = 75.0;

/// Simulates a fixed-length retirement funded from Bitcoin holdings.
///
/// One state is emitted per year, year 0 being the untouched starting position.
/// The run always covers the full horizon: once a year fails (holdings depleted,
/// or LTV above [`BORROW_LIQUIDATION_LTV_PCT`]) every later year is marked failed
/// as well, and the first failing year is kept in `years_until_depletion`.
/// Years after a borrow-strategy failure keep rolling debt forward and are
/// illustrative only, since a lender would have closed the position.
pub fn simulate(inputs: &RetirementInputs, scenario: &ScenarioParameters) -> RetirementResult {
    let series = match inputs.strategy {
        RetirementStrategy::Sell => simulate_sell(inputs, scenario),
        RetirementStrategy::Borrow => simulate_borrow(inputs, scenario),
    };

    let years_until_depletion = series
        .iter()
        .find(|s| s.is_depleted || s.is_liquidation_risk)
        .map(|s| s.year);
    let final_net_worth = series.last().map(|s| s.net_worth).unwrap_or(0.0);

    debug!(
        strategy = ?inputs.strategy,
        years = inputs.retirement_years,
        ?years_until_depletion,
        final_net_worth,
        "retirement simulation finished"
    );

    RetirementResult {
        strategy: inputs.strategy,
        viable: years_until_depletion.is_none(),
        series,
        years_until_depletion,
        final_net_worth,
    }
}

/// Portfolio needed to fund `desired_annual_income` at the scenario's withdrawal rate.
pub fn required_starting_portfolio(
    desired_annual_income: f64,
    scenario: &ScenarioParameters,
) -> Option<f64> {
    let rate = scenario.withdrawal_rate();
    (rate > 0.0).then(|| desired_annual_income / rate)
}

pub fn projected_price(starting_price: f64, annual_growth: f64, year: u32) -> f64 {
    starting_price * (1.0 + annual_growth).powi(year as i32)
}

pub fn inflated_income(desired_annual_income: f64, inflation: f64, year: u32) -> f64 {
    desired_annual_income * (1.0 + inflation).powi(year as i32)
}

fn simulate_sell(inputs: &RetirementInputs, scenario: &ScenarioParameters) -> Vec<RetirementState> {
    let mut series = Vec::with_capacity(inputs.retirement_years as usize + 1);
    let mut holdings = inputs.starting_btc;
    let mut cumulative_income = 0.0;
    let mut depleted = false;

    series.push(RetirementState {
        year: 0,
        price: inputs.starting_price,
        btc_holdings: holdings,
        loan_principal: 0.0,
        income_drawn: 0.0,
        cumulative_income_drawn: 0.0,
        net_worth: holdings * inputs.starting_price,
        phase: RetirementPhase::Accumulating,
        ledger: YearLedger::Sell { btc_sold: 0.0 },
        is_depleted: false,
        is_liquidation_risk: false,
    });

    for year in 1..=inputs.retirement_years {
        let price = projected_price(
            inputs.starting_price,
            scenario.post_retirement_growth(),
            year,
        );
        let income = inflated_income(inputs.desired_annual_income, scenario.inflation(), year);
        let btc_needed = income / price;
        let btc_sold = btc_needed.min(holdings);
        holdings = (holdings - btc_needed).max(0.0);
        let income_drawn = btc_sold * price;
        cumulative_income += income_drawn;

        if holdings <= 0.0 {
            depleted = true;
        }

        series.push(RetirementState {
            year,
            price,
            btc_holdings: holdings,
            loan_principal: 0.0,
            income_drawn,
            cumulative_income_drawn: cumulative_income,
            net_worth: holdings * price,
            phase: if depleted {
                RetirementPhase::Depleted
            } else {
                RetirementPhase::Drawing
            },
            ledger: YearLedger::Sell { btc_sold },
            is_depleted: depleted,
            is_liquidation_risk: false,
        });
    }

    series
}

fn simulate_borrow(
    inputs: &RetirementInputs,
    scenario: &ScenarioParameters,
) -> Vec<RetirementState> {
    let mut series = Vec::with_capacity(inputs.retirement_years as usize + 1);
    let holdings = inputs.starting_btc;
    let mut principal = 0.0;
    let mut cumulative_income = 0.0;
    let mut at_risk = false;

    series.push(RetirementState {
        year: 0,
        price: inputs.starting_price,
        btc_holdings: holdings,
        loan_principal: 0.0,
        income_drawn: 0.0,
        cumulative_income_drawn: 0.0,
        net_worth: holdings * inputs.starting_price,
        phase: RetirementPhase::Accumulating,
        ledger: YearLedger::Borrow {
            interest_accrued: 0.0,
            ltv_pct: Some(0.0),
        },
        is_depleted: false,
        is_liquidation_risk: false,
    });

    for year in 1..=inputs.retirement_years {
        let price = projected_price(
            inputs.starting_price,
            scenario.post_retirement_growth(),
            year,
        );
        let income = inflated_income(inputs.desired_annual_income, scenario.inflation(), year);
        let interest = principal * scenario.loan_interest_rate();
        principal += interest + income;
        cumulative_income += income;

        let ltv_pct = checked_ltv_ratio_pct(principal, holdings, price);
        if ltv_pct.is_none_or(|ltv| ltv > BORROW_LIQUIDATION_LTV_PCT) {
            at_risk = true;
        }

        series.push(RetirementState {
            year,
            price,
            btc_holdings: holdings,
            loan_principal: principal,
            income_drawn: income,
            cumulative_income_drawn: cumulative_income,
            net_worth: holdings * price - principal,
            phase: if at_risk {
                RetirementPhase::LiquidationRisk
            } else {
                RetirementPhase::Borrowing
            },
            ledger: YearLedger::Borrow {
                interest_accrued: interest,
                ltv_pct,
            },
            is_depleted: false,
            is_liquidation_risk: at_risk,
        });
    }

    series
}

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use tracing::debug;

use super::types::{
    AccumulationInputs, AccumulationResult, GrowthMode, Holdings, ProjectionPoint,
    ScenarioParameters,
};

const MONTHS_PER_YEAR: u32 = 12;

/// Source of the volatile-mode shocks.
///
/// Volatile runs are not reproducible under `Fresh`; only their long-run
/// expectation matches the smooth path. `Seeded` replays the same series.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum Randomness {
    Seeded(u64),
    Fresh,
}

impl Randomness {
    pub fn from_seed(seed: Option<u64>) -> Self {
        seed.map(Randomness::Seeded).unwrap_or(Randomness::Fresh)
    }

    pub fn into_rng(self) -> StdRng {
        match self {
            Randomness::Seeded(seed) => StdRng::seed_from_u64(seed),
            Randomness::Fresh => StdRng::from_os_rng(),
        }
    }
}

#[derive(Debug)]
struct AccumulationState {
    balance_or_holdings: f64,
    price: f64,
    month_index: u32,
    total_contributed: f64,
}

/// Walks the plan month by month and samples one point per year, plus month 0.
///
/// Each month applies growth first and then the contribution. Bitcoin holdings
/// buy units at that month's simulated price; price growth never changes the unit count.
/// Inputs are assumed validated (`years > 0`, `starting_price > 0`).
pub fn simulate<R: Rng + ?Sized>(
    inputs: &AccumulationInputs,
    scenario: &ScenarioParameters,
    rng: &mut R,
) -> AccumulationResult {
    let base_rate = monthly_rate(scenario.growth_rate());
    let total_months = inputs.years * MONTHS_PER_YEAR;
    let start = match inputs.holdings {
        Holdings::Dollars(amount) | Holdings::Bitcoin(amount) => amount,
    };

    let mut state = AccumulationState {
        balance_or_holdings: start,
        price: inputs.starting_price,
        month_index: 0,
        total_contributed: 0.0,
    };

    let mut series = Vec::with_capacity(inputs.years as usize + 1);
    series.push(sample_point(inputs, &state));

    while state.month_index < total_months {
        let rate = match inputs.mode {
            GrowthMode::Smooth => base_rate,
            GrowthMode::Volatile => perturbed_rate(base_rate, scenario.volatility(), rng),
        };
        advance_month(inputs, &mut state, rate);

        if state.month_index % MONTHS_PER_YEAR == 0 {
            series.push(sample_point(inputs, &state));
        }
    }

    let final_value = portfolio_value(inputs.holdings, &state);
    let final_holdings = match inputs.holdings {
        Holdings::Dollars(_) => None,
        Holdings::Bitcoin(_) => Some(state.balance_or_holdings),
    };

    debug!(
        years = inputs.years,
        mode = ?inputs.mode,
        final_value,
        "accumulation finished"
    );

    AccumulationResult {
        series,
        final_value,
        final_price: state.price,
        final_holdings,
        total_contributed: state.total_contributed,
    }
}

/// Effective monthly rate equivalent to `annual_rate` compounded twelve times.
pub fn monthly_rate(annual_rate: f64) -> f64 {
    (1.0 + annual_rate).powf(1.0 / MONTHS_PER_YEAR as f64) - 1.0
}

fn perturbed_rate<R: Rng + ?Sized>(base_rate: f64, volatility: f64, rng: &mut R) -> f64 {
    let half_width = volatility / 2.0;
    if half_width <= 0.0 {
        return base_rate;
    }
    let shock = rng.random_range(-half_width..=half_width);
    base_rate * (1.0 + shock)
}

fn advance_month(inputs: &AccumulationInputs, state: &mut AccumulationState, rate: f64) {
    state.month_index += 1;
    state.price *= 1.0 + rate;

    match inputs.holdings {
        Holdings::Dollars(_) => {
            state.balance_or_holdings *= 1.0 + rate;
            state.balance_or_holdings += inputs.monthly_contribution;
        }
        Holdings::Bitcoin(_) => {
            if inputs.monthly_contribution > 0.0 {
                state.balance_or_holdings += inputs.monthly_contribution / state.price;
            }
        }
    }
    state.total_contributed += inputs.monthly_contribution;
}

fn portfolio_value(holdings: Holdings, state: &AccumulationState) -> f64 {
    match holdings {
        Holdings::Dollars(_) => state.balance_or_holdings,
        Holdings::Bitcoin(_) => state.balance_or_holdings * state.price,
    }
}

fn sample_point(inputs: &AccumulationInputs, state: &AccumulationState) -> ProjectionPoint {
    ProjectionPoint {
        period_index: state.month_index / MONTHS_PER_YEAR,
        month: state.month_index,
        price: state.price,
        portfolio_value: portfolio_value(inputs.holdings, state),
        total_contributed: state.total_contributed,
        target_value: inputs.target_value,
        btc_holdings: match inputs.holdings {
            Holdings::Dollars(_) => None,
            Holdings::Bitcoin(_) => Some(state.balance_or_holdings),
        },
    }
}

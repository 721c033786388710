use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use super::error::PlanError;

#[derive(Copy, Clone, Debug, Eq, PartialEq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ScenarioName {
    Conservative,
    Moderate,
    Optimistic,
    Custom,
}

impl ScenarioName {
    pub const PRESETS: [ScenarioName; 3] = [
        ScenarioName::Conservative,
        ScenarioName::Moderate,
        ScenarioName::Optimistic,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            ScenarioName::Conservative => "conservative",
            ScenarioName::Moderate => "moderate",
            ScenarioName::Optimistic => "optimistic",
            ScenarioName::Custom => "custom",
        }
    }
}

impl fmt::Display for ScenarioName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ScenarioName {
    type Err = PlanError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "conservative" => Ok(ScenarioName::Conservative),
            "moderate" => Ok(ScenarioName::Moderate),
            "optimistic" => Ok(ScenarioName::Optimistic),
            "custom" => Ok(ScenarioName::Custom),
            other => Err(PlanError::UnknownScenario(other.to_string())),
        }
    }
}

/// Growth and risk assumptions for one calculation run. All rates are in percent.
#[derive(Copy, Clone, Debug, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ScenarioParameters {
    pub growth_rate_pct: f64,
    pub volatility_pct: f64,
    pub inflation_pct: f64,
    pub withdrawal_rate_pct: f64,
    pub loan_interest_rate_pct: f64,
    pub post_retirement_growth_pct: f64,
    pub target_annual_ltv_pct: f64,
}

impl ScenarioParameters {
    pub fn growth_rate(&self) -> f64 {
        self.growth_rate_pct / 100.0
    }

    pub fn volatility(&self) -> f64 {
        self.volatility_pct / 100.0
    }

    pub fn inflation(&self) -> f64 {
        self.inflation_pct / 100.0
    }

    pub fn withdrawal_rate(&self) -> f64 {
        self.withdrawal_rate_pct / 100.0
    }

    pub fn loan_interest_rate(&self) -> f64 {
        self.loan_interest_rate_pct / 100.0
    }

    pub fn post_retirement_growth(&self) -> f64 {
        self.post_retirement_growth_pct / 100.0
    }
}

/// User-entered values for the custom scenario. Every field is required there.
#[derive(Copy, Clone, Debug, Default, PartialEq, Deserialize, Serialize)]
#[serde(default, rename_all = "camelCase")]
pub struct ScenarioOverrides {
    pub growth_rate_pct: Option<f64>,
    pub volatility_pct: Option<f64>,
    pub inflation_pct: Option<f64>,
    pub withdrawal_rate_pct: Option<f64>,
    pub loan_interest_rate_pct: Option<f64>,
    pub post_retirement_growth_pct: Option<f64>,
    pub target_annual_ltv_pct: Option<f64>,
}

#[derive(Copy, Clone, Debug, Eq, PartialEq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum GrowthMode {
    Smooth,
    Volatile,
}

/// Starting position: a dollar balance or a Bitcoin unit count.
#[derive(Copy, Clone, Debug, PartialEq, Serialize)]
#[serde(tag = "denomination", content = "amount", rename_all = "lowercase")]
pub enum Holdings {
    Dollars(f64),
    Bitcoin(f64),
}

#[derive(Copy, Clone, Debug, PartialEq)]
pub struct AccumulationInputs {
    pub holdings: Holdings,
    pub starting_price: f64,
    pub monthly_contribution: f64,
    pub years: u32,
    pub mode: GrowthMode,
    pub target_value: Option<f64>,
}

#[derive(Copy, Clone, Debug, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ProjectionPoint {
    pub period_index: u32,
    pub month: u32,
    pub price: f64,
    pub portfolio_value: f64,
    pub total_contributed: f64,
    pub target_value: Option<f64>,
    pub btc_holdings: Option<f64>,
}

#[derive(Clone, Debug, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AccumulationResult {
    pub series: Vec<ProjectionPoint>,
    pub final_value: f64,
    pub final_price: f64,
    pub final_holdings: Option<f64>,
    pub total_contributed: f64,
}

#[derive(Copy, Clone, Debug, Eq, PartialEq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum RetirementStrategy {
    Sell,
    Borrow,
}

#[derive(Copy, Clone, Debug, PartialEq)]
pub struct RetirementInputs {
    pub starting_btc: f64,
    pub starting_price: f64,
    pub retirement_years: u32,
    pub desired_annual_income: f64,
    pub strategy: RetirementStrategy,
}

#[derive(Copy, Clone, Debug, Eq, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub enum RetirementPhase {
    Accumulating,
    Drawing,
    Depleted,
    Borrowing,
    LiquidationRisk,
}

/// What moved in a given year, shaped by the strategy that moved it.
#[derive(Copy, Clone, Debug, PartialEq, Serialize)]
#[serde(tag = "strategy", rename_all = "lowercase", rename_all_fields = "camelCase")]
pub enum YearLedger {
    Sell { btc_sold: f64 },
    /// `ltv_pct` is `None` once debt exists with no collateral value behind it.
    Borrow {
        interest_accrued: f64,
        ltv_pct: Option<f64>,
    },
}

#[derive(Copy, Clone, Debug, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RetirementState {
    pub year: u32,
    pub price: f64,
    pub btc_holdings: f64,
    pub loan_principal: f64,
    pub income_drawn: f64,
    pub cumulative_income_drawn: f64,
    pub net_worth: f64,
    pub phase: RetirementPhase,
    pub ledger: YearLedger,
    pub is_depleted: bool,
    pub is_liquidation_risk: bool,
}

#[derive(Clone, Debug, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RetirementResult {
    pub strategy: RetirementStrategy,
    pub series: Vec<RetirementState>,
    pub viable: bool,
    pub years_until_depletion: Option<u32>,
    pub final_net_worth: f64,
}

#[derive(Copy, Clone, Debug, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct LoanPosition {
    pub collateral_btc: f64,
    pub price: f64,
    pub loan_amount: f64,
    pub liquidation_threshold_pct: f64,
}

#[derive(Copy, Clone, Debug, Eq, PartialEq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum RiskLevel {
    Safe,
    Caution,
    Danger,
}

#[derive(Copy, Clone, Debug, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct LtvSnapshot {
    pub collateral_btc: f64,
    pub price: f64,
    pub loan_amount: f64,
    pub liquidation_threshold_pct: f64,
    pub collateral_value: f64,
    pub ltv_ratio_pct: f64,
    pub liquidation_price: f64,
    /// Percent the price can fall before reaching `liquidation_price`.
    pub liquidation_buffer_pct: f64,
    pub risk_level: RiskLevel,
}

#[derive(Copy, Clone, Debug, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PriceShockRow {
    pub change_pct: f64,
    pub price: f64,
    pub collateral_value: f64,
    pub ltv_pct: f64,
    pub risk_level: RiskLevel,
    pub near_danger: bool,
    pub beyond_liquidation: bool,
}

#[derive(Copy, Clone, Debug, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct MarginCallRung {
    pub ltv_pct: f64,
    pub trigger_price: f64,
    pub collateral_value_at_trigger: f64,
    pub required_additional_value: f64,
    pub required_additional_btc: f64,
}

#[derive(Clone, Debug, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct LtvReport {
    pub snapshot: LtvSnapshot,
    pub danger_price: f64,
    pub price_shocks: Vec<PriceShockRow>,
    pub margin_calls: Vec<MarginCallRung>,
}

/// `None` marks a metric that is undefined for the inputs.
#[derive(Copy, Clone, Debug, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ProjectionMetrics {
    pub initial_value: f64,
    pub final_value: f64,
    pub years: u32,
    pub total_return_pct: Option<f64>,
    pub cagr_pct: Option<f64>,
    pub final_multiple: Option<f64>,
    pub years_to_double: Option<f64>,
}

#[derive(Clone, Debug, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct GoalDraft {
    pub goal_name: String,
    pub target_amount: f64,
    pub monthly_contribution: f64,
    pub total_months: u32,
    pub strategy: RetirementStrategy,
}

#[derive(Clone, Debug, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SummaryRequest {
    pub goal_name: String,
    pub time_horizon: u32,
    pub final_value: f64,
    pub monthly_contribution: f64,
    pub starting_capital: f64,
    pub growth_scenario: ScenarioName,
}

use axum::{
    Router,
    extract::{Json, Path, Query, State},
    http::{HeaderValue, StatusCode, header},
    response::{IntoResponse, Response},
    routing::{get, post},
};
use clap::{Args, ValueEnum};
use serde::{Deserialize, Serialize};
use std::net::SocketAddr;
use std::sync::Arc;
use thiserror::Error;
use tokio::net::TcpListener;
use tracing::{info, warn};

use crate::core::metrics::{display_dollars, display_metric};
use crate::core::retirement::required_starting_portfolio;
use crate::core::{
    AccumulationInputs, GoalProblem, GoalSolveConfig, GoalType, GrowthMode, Holdings,
    LoanPosition, PlanError, PlanRequest, PlanResult, Randomness, RetirementStrategy,
    ScenarioName, ScenarioOverrides, ScenarioParameters, accumulation, ltv, retirement_handoff,
    run_plan, scenario, solve_goal,
};

mod store;

pub use store::{Goal, GoalStore, InMemoryGoalStore};

#[derive(Copy, Clone, Debug, Eq, PartialEq, ValueEnum)]
pub enum CliScenario {
    Conservative,
    Moderate,
    Optimistic,
    Custom,
}

impl From<CliScenario> for ScenarioName {
    fn from(value: CliScenario) -> Self {
        match value {
            CliScenario::Conservative => ScenarioName::Conservative,
            CliScenario::Moderate => ScenarioName::Moderate,
            CliScenario::Optimistic => ScenarioName::Optimistic,
            CliScenario::Custom => ScenarioName::Custom,
        }
    }
}

#[derive(Copy, Clone, Debug, Eq, PartialEq, ValueEnum)]
pub enum CliDenomination {
    Dollars,
    Bitcoin,
}

#[derive(Copy, Clone, Debug, Eq, PartialEq, ValueEnum)]
pub enum CliGrowthMode {
    Smooth,
    Volatile,
}

impl From<CliGrowthMode> for GrowthMode {
    fn from(value: CliGrowthMode) -> Self {
        match value {
            CliGrowthMode::Smooth => GrowthMode::Smooth,
            CliGrowthMode::Volatile => GrowthMode::Volatile,
        }
    }
}

#[derive(Copy, Clone, Debug, Eq, PartialEq, ValueEnum)]
pub enum CliStrategy {
    Sell,
    Borrow,
}

impl From<CliStrategy> for RetirementStrategy {
    fn from(value: CliStrategy) -> Self {
        match value {
            CliStrategy::Sell => RetirementStrategy::Sell,
            CliStrategy::Borrow => RetirementStrategy::Borrow,
        }
    }
}

#[derive(Copy, Clone, Debug, Eq, PartialEq, ValueEnum)]
pub enum CliGoalType {
    RequiredContribution,
    MaxIncome,
}

impl From<CliGoalType> for GoalType {
    fn from(value: CliGoalType) -> Self {
        match value {
            CliGoalType::RequiredContribution => GoalType::RequiredContribution,
            CliGoalType::MaxIncome => GoalType::MaxIncome,
        }
    }
}

#[derive(Copy, Clone, Debug, Eq, PartialEq, Deserialize)]
#[serde(rename_all = "lowercase")]
enum ApiScenario {
    #[serde(alias = "Conservative")]
    Conservative,
    #[serde(alias = "Moderate", alias = "base")]
    Moderate,
    #[serde(alias = "Optimistic", alias = "bull")]
    Optimistic,
    #[serde(alias = "Custom")]
    Custom,
}

impl From<ApiScenario> for CliScenario {
    fn from(value: ApiScenario) -> Self {
        match value {
            ApiScenario::Conservative => CliScenario::Conservative,
            ApiScenario::Moderate => CliScenario::Moderate,
            ApiScenario::Optimistic => CliScenario::Optimistic,
            ApiScenario::Custom => CliScenario::Custom,
        }
    }
}

#[derive(Copy, Clone, Debug, Eq, PartialEq, Deserialize)]
#[serde(rename_all = "lowercase")]
enum ApiDenomination {
    #[serde(alias = "usd", alias = "dollar")]
    Dollars,
    #[serde(alias = "btc")]
    Bitcoin,
}

impl From<ApiDenomination> for CliDenomination {
    fn from(value: ApiDenomination) -> Self {
        match value {
            ApiDenomination::Dollars => CliDenomination::Dollars,
            ApiDenomination::Bitcoin => CliDenomination::Bitcoin,
        }
    }
}

#[derive(Copy, Clone, Debug, Eq, PartialEq, Deserialize)]
#[serde(rename_all = "lowercase")]
enum ApiGrowthMode {
    #[serde(alias = "deterministic")]
    Smooth,
    #[serde(alias = "random")]
    Volatile,
}

impl From<ApiGrowthMode> for CliGrowthMode {
    fn from(value: ApiGrowthMode) -> Self {
        match value {
            ApiGrowthMode::Smooth => CliGrowthMode::Smooth,
            ApiGrowthMode::Volatile => CliGrowthMode::Volatile,
        }
    }
}

#[derive(Copy, Clone, Debug, Eq, PartialEq, Deserialize)]
#[serde(rename_all = "lowercase")]
enum ApiStrategy {
    #[serde(alias = "sell-btc", alias = "sellBtc")]
    Sell,
    #[serde(alias = "borrow-against", alias = "borrowAgainst")]
    Borrow,
}

impl From<ApiStrategy> for CliStrategy {
    fn from(value: ApiStrategy) -> Self {
        match value {
            ApiStrategy::Sell => CliStrategy::Sell,
            ApiStrategy::Borrow => CliStrategy::Borrow,
        }
    }
}

#[derive(Copy, Clone, Debug, Eq, PartialEq, Deserialize)]
#[serde(rename_all = "kebab-case")]
enum ApiGoalType {
    #[serde(alias = "requiredContribution", alias = "required_contribution")]
    RequiredContribution,
    #[serde(alias = "maxIncome", alias = "max_income")]
    MaxIncome,
}

impl From<ApiGoalType> for CliGoalType {
    fn from(value: ApiGoalType) -> Self {
        match value {
            ApiGoalType::RequiredContribution => CliGoalType::RequiredContribution,
            ApiGoalType::MaxIncome => CliGoalType::MaxIncome,
        }
    }
}

/// Inputs for one full plan. Percentages are given in percent, e.g. `45` for 45%.
#[derive(Args, Clone, Debug)]
pub struct PlanArgs {
    #[arg(long, default_value = "My Bitcoin Plan")]
    pub goal_name: String,
    #[arg(long, value_enum, default_value_t = CliScenario::Moderate)]
    pub scenario: CliScenario,
    #[arg(long, help = "Custom scenario: annual BTC growth rate in percent")]
    pub growth_rate: Option<f64>,
    #[arg(long, help = "Custom scenario: annual volatility in percent")]
    pub volatility: Option<f64>,
    #[arg(long, help = "Custom scenario: annual inflation in percent")]
    pub inflation: Option<f64>,
    #[arg(long, help = "Custom scenario: safe withdrawal rate in percent")]
    pub withdrawal_rate: Option<f64>,
    #[arg(long, help = "Custom scenario: loan interest rate in percent")]
    pub loan_interest_rate: Option<f64>,
    #[arg(long, help = "Custom scenario: post-retirement growth in percent")]
    pub post_retirement_growth: Option<f64>,
    #[arg(long, help = "Custom scenario: target annual LTV in percent")]
    pub target_annual_ltv: Option<f64>,
    #[arg(long, value_enum, default_value_t = CliDenomination::Dollars)]
    pub denomination: CliDenomination,
    #[arg(
        long,
        default_value_t = 10_000.0,
        help = "Starting balance in dollars, or BTC units with --denomination=bitcoin"
    )]
    pub starting_balance: f64,
    #[arg(long, default_value_t = 60_000.0, help = "BTC price today in dollars")]
    pub starting_price: f64,
    #[arg(long, default_value_t = 500.0, help = "Monthly purchase in dollars")]
    pub monthly_contribution: f64,
    #[arg(long, default_value_t = 10, help = "Accumulation horizon in years")]
    pub years: u32,
    #[arg(long, value_enum, default_value_t = CliGrowthMode::Smooth)]
    pub growth_mode: CliGrowthMode,
    #[arg(long, help = "Optional flat target line on the projection, in dollars")]
    pub target_value: Option<f64>,
    #[arg(long, help = "Seed for volatile growth; omit for a fresh random run")]
    pub seed: Option<u64>,
    #[arg(long, default_value_t = 30)]
    pub retirement_years: u32,
    #[arg(long, default_value_t = 80_000.0, help = "Year-one retirement income in dollars")]
    pub desired_annual_income: f64,
    #[arg(long, value_enum, default_value_t = CliStrategy::Sell)]
    pub strategy: CliStrategy,
}

#[derive(Args, Clone, Debug)]
pub struct LtvArgs {
    #[arg(long, default_value_t = 1.0)]
    pub collateral_btc: f64,
    #[arg(long, default_value_t = 60_000.0)]
    pub price: f64,
    #[arg(long, default_value_t = 20_000.0)]
    pub loan_amount: f64,
    #[arg(
        long,
        default_value_t = 80.0,
        help = "LTV in percent at which the lender liquidates"
    )]
    pub liquidation_threshold: f64,
}

#[derive(Args, Clone, Debug)]
pub struct SolveArgs {
    #[command(flatten)]
    pub plan: PlanArgs,
    #[arg(long, value_enum, default_value_t = CliGoalType::RequiredContribution)]
    pub goal: CliGoalType,
    #[arg(long, default_value_t = 0.0)]
    pub search_min: f64,
    #[arg(
        long,
        help = "Upper search bound; defaults to 100000 for contributions, 1000000 for income"
    )]
    pub search_max: Option<f64>,
    #[arg(long, default_value_t = 0.01)]
    pub tolerance: f64,
    #[arg(long, default_value_t = 60)]
    pub max_iterations: u32,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default, rename_all = "camelCase")]
struct PlanPayload {
    goal_name: Option<String>,
    scenario: Option<ApiScenario>,

    growth_rate_pct: Option<f64>,
    volatility_pct: Option<f64>,
    inflation_pct: Option<f64>,
    withdrawal_rate_pct: Option<f64>,
    loan_interest_rate_pct: Option<f64>,
    post_retirement_growth_pct: Option<f64>,
    target_annual_ltv_pct: Option<f64>,

    denomination: Option<ApiDenomination>,
    starting_balance: Option<f64>,
    starting_price: Option<f64>,
    monthly_contribution: Option<f64>,
    years: Option<u32>,
    growth_mode: Option<ApiGrowthMode>,
    target_value: Option<f64>,
    seed: Option<u64>,

    retirement_years: Option<u32>,
    desired_annual_income: Option<f64>,
    strategy: Option<ApiStrategy>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default, rename_all = "camelCase")]
struct LtvPayload {
    collateral_btc: Option<f64>,
    price: Option<f64>,
    loan_amount: Option<f64>,
    liquidation_threshold_pct: Option<f64>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default, rename_all = "camelCase")]
struct SolvePayload {
    #[serde(flatten)]
    plan: PlanPayload,
    goal_type: Option<ApiGoalType>,
    search_min: Option<f64>,
    search_max: Option<f64>,
    tolerance: Option<f64>,
    max_iterations: Option<u32>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ProgressPayload {
    months_completed: u32,
}

#[derive(Debug)]
pub struct SolveRequest {
    pub problem: GoalProblem,
    pub scenario: ScenarioParameters,
    pub config: GoalSolveConfig,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct ScenarioEntry {
    name: ScenarioName,
    #[serde(flatten)]
    parameters: ScenarioParameters,
}

#[derive(Debug, Serialize)]
struct ErrorResponse {
    error: String,
}

#[derive(Debug, Error)]
pub enum CliError {
    #[error(transparent)]
    Plan(#[from] PlanError),
    #[error("Failed to encode output: {0}")]
    Encode(#[from] serde_json::Error),
    #[error("Server error: {0}")]
    Io(#[from] std::io::Error),
}

fn ensure_finite(field: &str, value: f64) -> Result<f64, PlanError> {
    if value.is_finite() {
        Ok(value)
    } else {
        Err(PlanError::invalid(field, "must be a finite number"))
    }
}

fn custom_overrides(args: &PlanArgs) -> Option<ScenarioOverrides> {
    let overrides = ScenarioOverrides {
        growth_rate_pct: args.growth_rate,
        volatility_pct: args.volatility,
        inflation_pct: args.inflation,
        withdrawal_rate_pct: args.withdrawal_rate,
        loan_interest_rate_pct: args.loan_interest_rate,
        post_retirement_growth_pct: args.post_retirement_growth,
        target_annual_ltv_pct: args.target_annual_ltv,
    };
    (overrides != ScenarioOverrides::default()).then_some(overrides)
}

pub fn build_plan_request(args: PlanArgs) -> Result<PlanRequest, PlanError> {
    let starting_balance = ensure_finite("startingBalance", args.starting_balance)?;
    let starting_price = ensure_finite("startingPrice", args.starting_price)?;
    let monthly_contribution = ensure_finite("monthlyContribution", args.monthly_contribution)?;
    let desired_annual_income = ensure_finite("desiredAnnualIncome", args.desired_annual_income)?;

    if !(1..=50).contains(&args.years) {
        return Err(PlanError::invalid("years", "must be between 1 and 50"));
    }
    if starting_price <= 0.0 {
        return Err(PlanError::invalid("startingPrice", "must be > 0"));
    }
    if starting_balance < 0.0 {
        return Err(PlanError::invalid("startingBalance", "must be >= 0"));
    }
    if monthly_contribution < 0.0 {
        return Err(PlanError::invalid("monthlyContribution", "must be >= 0"));
    }
    if !(1..=60).contains(&args.retirement_years) {
        return Err(PlanError::invalid(
            "retirementYears",
            "must be between 1 and 60",
        ));
    }
    if desired_annual_income < 0.0 {
        return Err(PlanError::invalid("desiredAnnualIncome", "must be >= 0"));
    }
    if let Some(target) = args.target_value {
        if ensure_finite("targetValue", target)? < 0.0 {
            return Err(PlanError::invalid("targetValue", "must be >= 0"));
        }
    }

    let scenario_name: ScenarioName = args.scenario.into();
    let overrides = custom_overrides(&args);
    scenario::resolve(scenario_name, overrides.as_ref())?;

    let holdings = match args.denomination {
        CliDenomination::Dollars => Holdings::Dollars(starting_balance),
        CliDenomination::Bitcoin => Holdings::Bitcoin(starting_balance),
    };

    Ok(PlanRequest {
        goal_name: args.goal_name,
        scenario_name,
        overrides,
        accumulation: AccumulationInputs {
            holdings,
            starting_price,
            monthly_contribution,
            years: args.years,
            mode: args.growth_mode.into(),
            target_value: args.target_value,
        },
        retirement_years: args.retirement_years,
        desired_annual_income,
        strategy: args.strategy.into(),
        randomness: Randomness::from_seed(args.seed),
    })
}

pub fn build_loan_position(args: LtvArgs) -> Result<LoanPosition, PlanError> {
    let collateral_btc = ensure_finite("collateralBtc", args.collateral_btc)?;
    let price = ensure_finite("price", args.price)?;
    let loan_amount = ensure_finite("loanAmount", args.loan_amount)?;
    let threshold = ensure_finite("liquidationThresholdPct", args.liquidation_threshold)?;

    if collateral_btc <= 0.0 {
        return Err(PlanError::invalid("collateralBtc", "must be > 0"));
    }
    if price <= 0.0 {
        return Err(PlanError::invalid("price", "must be > 0"));
    }
    if loan_amount <= 0.0 {
        return Err(PlanError::invalid("loanAmount", "must be > 0"));
    }
    if threshold <= 0.0 || threshold > 100.0 {
        return Err(PlanError::invalid(
            "liquidationThresholdPct",
            "must be in (0, 100]",
        ));
    }

    Ok(LoanPosition {
        collateral_btc,
        price,
        loan_amount,
        liquidation_threshold_pct: threshold,
    })
}

pub fn build_solve_request(args: SolveArgs) -> Result<SolveRequest, PlanError> {
    let goal_type: GoalType = args.goal.into();
    let config = GoalSolveConfig {
        search_min: args.search_min,
        search_max: args.search_max.unwrap_or(match goal_type {
            GoalType::RequiredContribution => 100_000.0,
            GoalType::MaxIncome => 1_000_000.0,
        }),
        tolerance: args.tolerance,
        max_iterations: args.max_iterations,
    };
    config.validate()?;

    let request = build_plan_request(args.plan)?;
    let params = scenario::resolve(request.scenario_name, request.overrides.as_ref())?;

    let problem = match goal_type {
        GoalType::RequiredContribution => {
            let target_value = request
                .accumulation
                .target_value
                .or_else(|| required_starting_portfolio(request.desired_annual_income, &params))
                .ok_or_else(|| {
                    PlanError::invalid(
                        "targetValue",
                        "is required when the withdrawal rate is zero",
                    )
                })?;
            GoalProblem::RequiredContribution {
                accumulation: request.accumulation,
                target_value,
            }
        }
        GoalType::MaxIncome => {
            let mut rng = request.randomness.into_rng();
            let accumulated = accumulation::simulate(&request.accumulation, &params, &mut rng);
            GoalProblem::MaxIncome {
                retirement: retirement_handoff(
                    &accumulated,
                    request.retirement_years,
                    request.desired_annual_income,
                    request.strategy,
                ),
            }
        }
    };

    Ok(SolveRequest {
        problem,
        scenario: params,
        config,
    })
}

/// Plain-text digest of a plan, undefined metrics shown as `N/A`.
pub fn format_plan_summary(plan: &PlanResult) -> String {
    let metrics = &plan.accumulation_metrics;
    let depletion = plan
        .retirement
        .years_until_depletion
        .map(|year| year.to_string())
        .unwrap_or_else(|| "N/A".to_string());

    [
        format!("Goal: {}", plan.goal.goal_name),
        format!("Scenario: {}", plan.scenario_name),
        format!("Starting capital: ${:.2}", plan.starting_capital),
        format!("Final value: ${:.2}", plan.accumulation.final_value),
        format!(
            "Total return: {}%",
            display_metric(metrics.total_return_pct, 1)
        ),
        format!("CAGR: {}%", display_metric(metrics.cagr_pct, 2)),
        format!("Multiple: {}x", display_metric(metrics.final_multiple, 2)),
        format!(
            "Years to double: {}",
            display_metric(metrics.years_to_double, 1)
        ),
        format!(
            "Required portfolio: {}",
            display_dollars(plan.required_portfolio, 2)
        ),
        format!("Portfolio gap: {}", display_dollars(plan.portfolio_gap, 2)),
        format!(
            "Retirement viable: {} (first failing year: {depletion})",
            plan.retirement.viable
        ),
    ]
    .join("\n")
}

pub fn run_plan_command(args: PlanArgs, summary: bool) -> Result<(), CliError> {
    let request = build_plan_request(args)?;
    let plan = run_plan(&request)?;
    if summary {
        println!("{}", format_plan_summary(&plan));
    } else {
        println!("{}", serde_json::to_string_pretty(&plan)?);
    }
    Ok(())
}

pub fn run_ltv_command(args: LtvArgs) -> Result<(), CliError> {
    let position = build_loan_position(args)?;
    let report = ltv::analyze(&position);
    println!("{}", serde_json::to_string_pretty(&report)?);
    Ok(())
}

pub fn run_solve_command(args: SolveArgs) -> Result<(), CliError> {
    let request = build_solve_request(args)?;
    let result = solve_goal(&request.problem, &request.scenario, request.config)?;
    println!("{}", serde_json::to_string_pretty(&result)?);
    Ok(())
}

#[derive(Clone)]
struct AppState {
    store: Arc<dyn GoalStore>,
}

fn router(store: Arc<dyn GoalStore>) -> Router {
    Router::new()
        .route("/api/scenarios", get(scenarios_handler))
        .route("/api/plan", get(plan_get_handler).post(plan_post_handler))
        .route("/api/ltv", post(ltv_handler))
        .route("/api/solve", post(solve_handler))
        .route(
            "/api/goals",
            get(list_goals_handler).post(create_goal_handler),
        )
        .route("/api/goals/:id", get(get_goal_handler))
        .route("/api/goals/:id/progress", post(progress_handler))
        .fallback(not_found_handler)
        .with_state(AppState { store })
}

pub async fn run_http_server(port: u16, store: Arc<dyn GoalStore>) -> std::io::Result<()> {
    let addr = SocketAddr::from(([0, 0, 0, 0], port));
    let app = router(store);

    let listener = TcpListener::bind(addr).await?;
    info!(%addr, "stackplan HTTP API listening");

    axum::serve(listener, app).await
}

async fn not_found_handler() -> Response {
    error_response(StatusCode::NOT_FOUND, "Not found")
}

async fn scenarios_handler() -> Response {
    let entries: Vec<ScenarioEntry> = scenario::presets()
        .into_iter()
        .map(|(name, parameters)| ScenarioEntry { name, parameters })
        .collect();
    json_response(StatusCode::OK, entries)
}

async fn plan_get_handler(Query(payload): Query<PlanPayload>) -> Response {
    plan_handler_impl(payload).await
}

async fn plan_post_handler(Json(payload): Json<PlanPayload>) -> Response {
    plan_handler_impl(payload).await
}

async fn plan_handler_impl(payload: PlanPayload) -> Response {
    match plan_request_from_payload(payload).and_then(|request| run_plan(&request)) {
        Ok(plan) => json_response(StatusCode::OK, plan),
        Err(err) => plan_error_response(&err),
    }
}

async fn ltv_handler(Json(payload): Json<LtvPayload>) -> Response {
    match build_loan_position(ltv_args_from_payload(payload)) {
        Ok(position) => json_response(StatusCode::OK, ltv::analyze(&position)),
        Err(err) => plan_error_response(&err),
    }
}

async fn solve_handler(Json(payload): Json<SolvePayload>) -> Response {
    let outcome = build_solve_request(solve_args_from_payload(payload))
        .and_then(|request| solve_goal(&request.problem, &request.scenario, request.config));
    match outcome {
        Ok(result) => json_response(StatusCode::OK, result),
        Err(err) => plan_error_response(&err),
    }
}

async fn list_goals_handler(State(state): State<AppState>) -> Response {
    json_response(StatusCode::OK, state.store.list())
}

async fn create_goal_handler(
    State(state): State<AppState>,
    Json(payload): Json<PlanPayload>,
) -> Response {
    let plan = match plan_request_from_payload(payload).and_then(|request| run_plan(&request)) {
        Ok(plan) => plan,
        Err(err) => return plan_error_response(&err),
    };
    let goal = state.store.insert(plan.goal);
    info!(goal_id = goal.id, goal = %goal.goal_name, "goal saved");
    json_response(StatusCode::CREATED, goal)
}

async fn get_goal_handler(State(state): State<AppState>, Path(id): Path<u64>) -> Response {
    match state.store.get(id) {
        Some(goal) => json_response(StatusCode::OK, goal),
        None => plan_error_response(&PlanError::NotFound(format!("goal {id}"))),
    }
}

async fn progress_handler(
    State(state): State<AppState>,
    Path(id): Path<u64>,
    Json(payload): Json<ProgressPayload>,
) -> Response {
    match state.store.record_progress(id, payload.months_completed) {
        Ok(goal) => json_response(StatusCode::OK, goal),
        Err(err) => plan_error_response(&err),
    }
}

fn json_response<T: Serialize>(status: StatusCode, body: T) -> Response {
    let mut response = (status, Json(body)).into_response();
    response
        .headers_mut()
        .insert(header::CACHE_CONTROL, HeaderValue::from_static("no-store"));
    response
}

fn error_response(status: StatusCode, msg: &str) -> Response {
    json_response(
        status,
        ErrorResponse {
            error: msg.to_string(),
        },
    )
}

fn plan_error_response(err: &PlanError) -> Response {
    let status = match err {
        PlanError::NotFound(_) => StatusCode::NOT_FOUND,
        PlanError::InvalidInput { .. }
        | PlanError::MissingOverride { .. }
        | PlanError::UnknownScenario(_) => StatusCode::BAD_REQUEST,
    };
    warn!(%status, error = %err, "request rejected");
    error_response(status, &err.to_string())
}

#[cfg(test)]
fn plan_request_from_json(json: &str) -> Result<PlanRequest, String> {
    let payload = serde_json::from_str::<PlanPayload>(json)
        .map_err(|e| format!("Invalid API JSON payload: {e}"))?;
    plan_request_from_payload(payload).map_err(|e| e.to_string())
}

fn plan_request_from_payload(payload: PlanPayload) -> Result<PlanRequest, PlanError> {
    build_plan_request(plan_args_from_payload(payload))
}

fn plan_args_from_payload(payload: PlanPayload) -> PlanArgs {
    let mut args = default_plan_args();

    if let Some(v) = payload.goal_name {
        args.goal_name = v;
    }
    if let Some(v) = payload.scenario {
        args.scenario = v.into();
    }

    if let Some(v) = payload.growth_rate_pct {
        args.growth_rate = Some(v);
    }
    if let Some(v) = payload.volatility_pct {
        args.volatility = Some(v);
    }
    if let Some(v) = payload.inflation_pct {
        args.inflation = Some(v);
    }
    if let Some(v) = payload.withdrawal_rate_pct {
        args.withdrawal_rate = Some(v);
    }
    if let Some(v) = payload.loan_interest_rate_pct {
        args.loan_interest_rate = Some(v);
    }
    if let Some(v) = payload.post_retirement_growth_pct {
        args.post_retirement_growth = Some(v);
    }
    if let Some(v) = payload.target_annual_ltv_pct {
        args.target_annual_ltv = Some(v);
    }

    if let Some(v) = payload.denomination {
        args.denomination = v.into();
    }
    if let Some(v) = payload.starting_balance {
        args.starting_balance = v;
    }
    if let Some(v) = payload.starting_price {
        args.starting_price = v;
    }
    if let Some(v) = payload.monthly_contribution {
        args.monthly_contribution = v;
    }
    if let Some(v) = payload.years {
        args.years = v;
    }
    if let Some(v) = payload.growth_mode {
        args.growth_mode = v.into();
    }
    if let Some(v) = payload.target_value {
        args.target_value = Some(v);
    }
    if let Some(v) = payload.seed {
        args.seed = Some(v);
    }

    if let Some(v) = payload.retirement_years {
        args.retirement_years = v;
    }
    if let Some(v) = payload.desired_annual_income {
        args.desired_annual_income = v;
    }
    if let Some(v) = payload.strategy {
        args.strategy = v.into();
    }

    args
}

fn ltv_args_from_payload(payload: LtvPayload) -> LtvArgs {
    let mut args = default_ltv_args();
    if let Some(v) = payload.collateral_btc {
        args.collateral_btc = v;
    }
    if let Some(v) = payload.price {
        args.price = v;
    }
    if let Some(v) = payload.loan_amount {
        args.loan_amount = v;
    }
    if let Some(v) = payload.liquidation_threshold_pct {
        args.liquidation_threshold = v;
    }
    args
}

fn solve_args_from_payload(payload: SolvePayload) -> SolveArgs {
    let mut args = SolveArgs {
        plan: plan_args_from_payload(payload.plan),
        goal: CliGoalType::RequiredContribution,
        search_min: 0.0,
        search_max: payload.search_max,
        tolerance: 0.01,
        max_iterations: 60,
    };
    if let Some(v) = payload.goal_type {
        args.goal = v.into();
    }
    if let Some(v) = payload.search_min {
        args.search_min = v;
    }
    if let Some(v) = payload.tolerance {
        args.tolerance = v;
    }
    if let Some(v) = payload.max_iterations {
        args.max_iterations = v;
    }
    args
}

fn default_plan_args() -> PlanArgs {
    PlanArgs {
        goal_name: "My Bitcoin Plan".to_string(),
        scenario: CliScenario::Moderate,
        growth_rate: None,
        volatility: None,
        inflation: None,
        withdrawal_rate: None,
        loan_interest_rate: None,
        post_retirement_growth: None,
        target_annual_ltv: None,
        denomination: CliDenomination::Dollars,
        starting_balance: 10_000.0,
        starting_price: 60_000.0,
        monthly_contribution: 500.0,
        years: 10,
        growth_mode: CliGrowthMode::Smooth,
        target_value: None,
        seed: None,
        retirement_years: 30,
        desired_annual_income: 80_000.0,
        strategy: CliStrategy::Sell,
    }
}

fn default_ltv_args() -> LtvArgs {
    LtvArgs {
        collateral_btc: 1.0,
        price: 60_000.0,
        loan_amount: 20_000.0,
        liquidation_threshold: 80.0,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::accumulation::monthly_rate;
    use crate::core::metrics::required_monthly_contribution;
    use axum::body::to_bytes;
    use serde_json::Value;

    const EPS: f64 = 1e-6;

    fn assert_approx(actual: f64, expected: f64) {
        assert!(
            (actual - expected).abs() <= EPS,
            "expected {expected}, got {actual}"
        );
    }

    fn sample_args() -> PlanArgs {
        default_plan_args()
    }

    async fn body_json(response: Response) -> Value {
        let bytes = to_bytes(response.into_body(), usize::MAX)
            .await
            .expect("body should be readable");
        serde_json::from_slice(&bytes).expect("body should be JSON")
    }

    fn invalid_field(err: PlanError) -> String {
        match err {
            PlanError::InvalidInput { field, .. } => field,
            other => panic!("expected InvalidInput, got {other:?}"),
        }
    }

    #[test]
    fn build_plan_request_uses_defaults() {
        let request = build_plan_request(sample_args()).expect("valid inputs");
        assert_eq!(request.scenario_name, ScenarioName::Moderate);
        assert_eq!(request.overrides, None);
        assert_eq!(request.accumulation.holdings, Holdings::Dollars(10_000.0));
        assert_eq!(request.accumulation.years, 10);
        assert_eq!(request.randomness, Randomness::Fresh);
        assert_eq!(request.strategy, RetirementStrategy::Sell);
    }

    #[test]
    fn build_plan_request_rejects_out_of_range_years() {
        for years in [0, 51] {
            let mut args = sample_args();
            args.years = years;
            let err = build_plan_request(args).expect_err("must reject years");
            assert_eq!(invalid_field(err), "years");
        }
    }

    #[test]
    fn build_plan_request_rejects_bad_amounts() {
        let mut args = sample_args();
        args.starting_price = 0.0;
        assert_eq!(
            invalid_field(build_plan_request(args).expect_err("price")),
            "startingPrice"
        );

        let mut args = sample_args();
        args.starting_balance = -1.0;
        assert_eq!(
            invalid_field(build_plan_request(args).expect_err("balance")),
            "startingBalance"
        );

        let mut args = sample_args();
        args.monthly_contribution = -10.0;
        assert_eq!(
            invalid_field(build_plan_request(args).expect_err("contribution")),
            "monthlyContribution"
        );

        let mut args = sample_args();
        args.desired_annual_income = f64::NAN;
        assert_eq!(
            invalid_field(build_plan_request(args).expect_err("income")),
            "desiredAnnualIncome"
        );

        let mut args = sample_args();
        args.retirement_years = 61;
        assert_eq!(
            invalid_field(build_plan_request(args).expect_err("retirement years")),
            "retirementYears"
        );
    }

    #[test]
    fn build_plan_request_requires_every_custom_override() {
        let mut args = sample_args();
        args.scenario = CliScenario::Custom;
        assert!(matches!(
            build_plan_request(args.clone()),
            Err(PlanError::MissingOverride { field: "overrides" })
        ));

        args.growth_rate = Some(30.0);
        args.volatility = Some(40.0);
        assert!(matches!(
            build_plan_request(args),
            Err(PlanError::MissingOverride { .. })
        ));
    }

    #[test]
    fn build_plan_request_rejects_custom_growth_below_total_loss() {
        let mut args = sample_args();
        args.scenario = CliScenario::Custom;
        args.growth_rate = Some(-150.0);
        args.volatility = Some(0.0);
        args.inflation = Some(3.0);
        args.withdrawal_rate = Some(4.0);
        args.loan_interest_rate = Some(8.0);
        args.post_retirement_growth = Some(10.0);
        args.target_annual_ltv = Some(25.0);
        let err = build_plan_request(args).expect_err("growth below -100% must fail");
        assert_eq!(invalid_field(err), "growthRatePct");
    }

    #[test]
    fn plan_request_from_json_parses_web_keys() {
        let json = r#"{
          "goalName": "Stack sats",
          "scenario": "custom",
          "growthRatePct": 30,
          "volatilityPct": 50,
          "inflationPct": 3,
          "withdrawalRatePct": 4,
          "loanInterestRatePct": 8,
          "postRetirementGrowthPct": 12,
          "targetAnnualLtvPct": 20,
          "denomination": "btc",
          "startingBalance": 0.25,
          "startingPrice": 90000,
          "monthlyContribution": 750,
          "years": 15,
          "growthMode": "volatile",
          "seed": 99,
          "retirementYears": 25,
          "desiredAnnualIncome": 60000,
          "strategy": "borrow"
        }"#;
        let request = plan_request_from_json(json).expect("json should parse");

        assert_eq!(request.goal_name, "Stack sats");
        assert_eq!(request.scenario_name, ScenarioName::Custom);
        let overrides = request.overrides.expect("custom overrides");
        assert_eq!(overrides.growth_rate_pct, Some(30.0));
        assert_eq!(overrides.target_annual_ltv_pct, Some(20.0));
        assert_eq!(request.accumulation.holdings, Holdings::Bitcoin(0.25));
        assert_approx(request.accumulation.starting_price, 90_000.0);
        assert_approx(request.accumulation.monthly_contribution, 750.0);
        assert_eq!(request.accumulation.years, 15);
        assert_eq!(request.accumulation.mode, GrowthMode::Volatile);
        assert_eq!(request.randomness, Randomness::Seeded(99));
        assert_eq!(request.retirement_years, 25);
        assert_approx(request.desired_annual_income, 60_000.0);
        assert_eq!(request.strategy, RetirementStrategy::Borrow);
    }

    #[test]
    fn plan_request_from_json_reports_bad_enum() {
        let err = plan_request_from_json(r#"{"strategy":"yolo"}"#).expect_err("bad enum");
        assert!(err.contains("Invalid API JSON payload"));
    }

    #[test]
    fn build_loan_position_validates_inputs() {
        assert!(build_loan_position(default_ltv_args()).is_ok());

        let mut args = default_ltv_args();
        args.loan_amount = 0.0;
        assert_eq!(
            invalid_field(build_loan_position(args).expect_err("loan")),
            "loanAmount"
        );

        let mut args = default_ltv_args();
        args.collateral_btc = -1.0;
        assert_eq!(
            invalid_field(build_loan_position(args).expect_err("collateral")),
            "collateralBtc"
        );

        for threshold in [0.0, 100.5] {
            let mut args = default_ltv_args();
            args.liquidation_threshold = threshold;
            assert_eq!(
                invalid_field(build_loan_position(args).expect_err("threshold")),
                "liquidationThresholdPct"
            );
        }

        let mut args = default_ltv_args();
        args.liquidation_threshold = 100.0;
        assert!(build_loan_position(args).is_ok());
    }

    #[test]
    fn solve_request_defaults_target_to_required_portfolio() {
        let args = SolveArgs {
            plan: sample_args(),
            goal: CliGoalType::RequiredContribution,
            search_min: 0.0,
            search_max: None,
            tolerance: 0.01,
            max_iterations: 60,
        };
        let request = build_solve_request(args).expect("valid");
        match request.problem {
            GoalProblem::RequiredContribution { target_value, .. } => {
                assert_approx(target_value, 2_000_000.0)
            }
            other => panic!("unexpected problem {other:?}"),
        }
        assert_approx(request.config.search_max, 100_000.0);

        let result =
            solve_goal(&request.problem, &request.scenario, request.config).expect("solves");
        assert!(result.feasible);
        assert!(result.converged);
        let closed_form = required_monthly_contribution(
            2_000_000.0,
            10_000.0,
            monthly_rate(request.scenario.growth_rate()),
            120,
        )
        .expect("defined");
        let solved = result.solved_value.expect("solved");
        assert!(
            (solved - closed_form).abs() <= 0.05,
            "solver {solved} vs closed form {closed_form}"
        );
    }

    #[test]
    fn format_plan_summary_renders_undefined_metrics() {
        let mut args = sample_args();
        args.scenario = CliScenario::Custom;
        args.growth_rate = Some(0.0);
        args.volatility = Some(0.0);
        args.inflation = Some(0.0);
        args.withdrawal_rate = Some(0.0);
        args.loan_interest_rate = Some(0.0);
        args.post_retirement_growth = Some(0.0);
        args.target_annual_ltv = Some(25.0);
        let plan = run_plan(&build_plan_request(args).expect("valid")).expect("plan");

        let text = format_plan_summary(&plan);
        assert!(text.contains("Goal: My Bitcoin Plan"));
        assert!(text.contains("Scenario: custom"));
        assert!(text.contains("Required portfolio: N/A"));
        assert!(text.contains("Portfolio gap: N/A"));
    }

    #[test]
    fn format_plan_summary_signs_a_shortfall_before_the_dollar() {
        let mut args = sample_args();
        args.scenario = CliScenario::Custom;
        args.growth_rate = Some(0.0);
        args.volatility = Some(0.0);
        args.inflation = Some(0.0);
        args.withdrawal_rate = Some(4.0);
        args.loan_interest_rate = Some(0.0);
        args.post_retirement_growth = Some(0.0);
        args.target_annual_ltv = Some(25.0);
        args.starting_balance = 0.0;
        args.monthly_contribution = 0.0;
        let plan = run_plan(&build_plan_request(args).expect("valid")).expect("plan");
        assert!(plan.portfolio_gap.expect("defined") < 0.0);

        let text = format_plan_summary(&plan);
        assert!(text.contains("Required portfolio: $2000000.00"), "{text}");
        assert!(text.contains("Portfolio gap: -$2000000.00"), "{text}");
        assert!(!text.contains("$-"));
    }

    #[tokio::test]
    async fn scenarios_handler_lists_presets() {
        let response = scenarios_handler().await;
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(
            response.headers().get(header::CACHE_CONTROL),
            Some(&HeaderValue::from_static("no-store"))
        );
        let body = body_json(response).await;
        let entries = body.as_array().expect("array");
        assert_eq!(entries.len(), 3);
        assert_eq!(entries[0]["name"], "conservative");
        assert_eq!(entries[1]["growthRatePct"], 45.0);
    }

    #[tokio::test]
    async fn plan_post_handler_returns_full_plan() {
        let payload = PlanPayload {
            seed: Some(3),
            ..PlanPayload::default()
        };
        let response = plan_post_handler(Json(payload)).await;
        assert_eq!(response.status(), StatusCode::OK);
        let body = body_json(response).await;
        assert_eq!(body["scenarioName"], "moderate");
        assert_eq!(body["accumulation"]["series"].as_array().map(Vec::len), Some(11));
        assert_eq!(body["retirement"]["series"].as_array().map(Vec::len), Some(31));
        assert!(body["summaryRequest"]["goalName"].is_string());
    }

    #[tokio::test]
    async fn plan_handler_maps_validation_errors_to_bad_request() {
        let payload = PlanPayload {
            years: Some(0),
            ..PlanPayload::default()
        };
        let response = plan_get_handler(Query(payload)).await;
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        let body = body_json(response).await;
        assert!(body["error"].as_str().unwrap_or_default().contains("years"));
    }

    #[tokio::test]
    async fn ltv_handler_returns_report() {
        let payload = LtvPayload {
            loan_amount: Some(30_000.0),
            ..LtvPayload::default()
        };
        let response = ltv_handler(Json(payload)).await;
        assert_eq!(response.status(), StatusCode::OK);
        let body = body_json(response).await;
        assert_eq!(body["snapshot"]["riskLevel"], "caution");
        assert_eq!(body["priceShocks"].as_array().map(Vec::len), Some(7));
        assert_eq!(body["marginCalls"].as_array().map(Vec::len), Some(3));
    }

    #[tokio::test]
    async fn solve_handler_rejects_bad_config() {
        let payload = SolvePayload {
            tolerance: Some(0.0),
            ..SolvePayload::default()
        };
        let response = solve_handler(Json(payload)).await;
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    }

    #[test]
    fn build_solve_request_rejects_unbounded_iteration_budget() {
        let args = SolveArgs {
            plan: sample_args(),
            goal: CliGoalType::MaxIncome,
            search_min: 0.0,
            search_max: None,
            tolerance: 0.01,
            max_iterations: u32::MAX,
        };
        let err = build_solve_request(args).expect_err("must reject");
        assert_eq!(invalid_field(err), "maxIterations");
    }

    #[tokio::test]
    async fn solve_handler_rejects_huge_max_iterations() {
        let payload = SolvePayload {
            max_iterations: Some(u32::MAX),
            ..SolvePayload::default()
        };
        let response = solve_handler(Json(payload)).await;
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        let body = body_json(response).await;
        assert!(
            body["error"]
                .as_str()
                .unwrap_or_default()
                .contains("maxIterations")
        );
    }

    #[tokio::test]
    async fn solve_handler_finds_max_income() {
        let payload = SolvePayload {
            goal_type: Some(ApiGoalType::MaxIncome),
            ..SolvePayload::default()
        };
        let response = solve_handler(Json(payload)).await;
        assert_eq!(response.status(), StatusCode::OK);
        let body = body_json(response).await;
        assert_eq!(body["goalType"], "maxIncome");
        assert_eq!(body["feasible"], true);
        let solved = body["solvedValue"].as_f64().expect("solved income");
        assert!(solved > 0.0 && solved < 1_000_000.0);
    }

    #[tokio::test]
    async fn goal_handlers_save_list_and_track_progress() {
        let state = AppState {
            store: Arc::new(InMemoryGoalStore::new()),
        };

        let response =
            create_goal_handler(State(state.clone()), Json(PlanPayload::default())).await;
        assert_eq!(response.status(), StatusCode::CREATED);
        let created = body_json(response).await;
        assert_eq!(created["id"], 1);
        assert_eq!(created["monthsCompleted"], 0);
        assert_eq!(created["totalMonths"], 120);

        let listed = body_json(list_goals_handler(State(state.clone())).await).await;
        assert_eq!(listed.as_array().map(Vec::len), Some(1));

        let response = progress_handler(
            State(state.clone()),
            Path(1),
            Json(ProgressPayload {
                months_completed: 60,
            }),
        )
        .await;
        assert_eq!(response.status(), StatusCode::OK);
        let updated = body_json(response).await;
        assert_eq!(updated["currentProgress"], 50.0);

        let fetched = get_goal_handler(State(state.clone()), Path(1)).await;
        assert_eq!(fetched.status(), StatusCode::OK);
    }

    #[tokio::test]
    async fn missing_goal_is_not_found() {
        let state = AppState {
            store: Arc::new(InMemoryGoalStore::new()),
        };
        let response = progress_handler(
            State(state.clone()),
            Path(42),
            Json(ProgressPayload {
                months_completed: 1,
            }),
        )
        .await;
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
        assert_eq!(
            get_goal_handler(State(state), Path(42)).await.status(),
            StatusCode::NOT_FOUND
        );
    }

    #[tokio::test]
    async fn unknown_route_is_json_not_found() {
        let response = not_found_handler().await;
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
        let body = body_json(response).await;
        assert_eq!(body["error"], "Not found");
    }
}
